// Copyright 2025 ModerRAS
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # GPS Calibrator
//!
//! Position calibration and live correction for location-based AR.
//!
//! Consumer phone GPS is biased by several meters. Standing still on a
//! surveyed point, the calibrator samples the position source, rejects
//! outliers and derives the offset between the measured mean and the known
//! coordinates. The live correction loop then adds that offset to every new
//! fix and feeds the result to the renderer in place of the raw position.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gps_calibrator::{
//!     CalibrationSession, LiveCorrectionLoop, LiveLoopConfig, ReplaySource, TracingSink,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let source = Arc::new(ReplaySource::load("track.txt")?.looping());
//!     let session = CalibrationSession::default();
//!
//!     let result = session.run(source.as_ref(), 46.77950, 6.65930).await?;
//!     println!("offset: {:?}, {:.2} m", result.offset_deg, result.distance_meters);
//!
//!     let mut live = LiveCorrectionLoop::new(LiveLoopConfig::default());
//!     live.start(session.current_offset(), source, Arc::new(TracingSink::new()))
//!         .await?;
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(10)).await;
//!     live.stop().await?;
//!     Ok(())
//! }
//! ```

pub mod calibration;
pub mod correction;
pub mod geo;
pub mod journal;
pub mod position;
pub mod settings;
pub mod stats;

pub use calibration::{
    CalibrationConfig, CalibrationError, CalibrationOutcome, CalibrationResult,
    CalibrationSession, CalibrationStats, GpsCalibrator, SessionPhase,
};
pub use correction::{
    LiveCorrectionLoop, LiveLoopConfig, LiveLoopError, LiveLoopState, LoopEvent, LoopStatus,
};
pub use geo::{haversine_distance, PlanarOffset};
pub use journal::{Journal, JournalEntry, JournalLevel};
pub use position::{
    GeoError, OffsetDeg, PositionReading, PositionSink, PositionSource, ReplayError,
    ReplaySource, TracingSink,
};
pub use settings::AppSettings;
pub use stats::{filter_outliers_2d, mean, std_dev, Sample};
