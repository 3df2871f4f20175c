//! Basic usage example for GPS Calibrator.
//!
//! A simulated receiver reports fixes biased by roughly 10 m with some jitter
//! and an occasional wild outlier. The example calibrates against the true
//! position, then runs the live correction loop for a few seconds.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gps_calibrator::{
    CalibrationConfig, CalibrationSession, GeoError, GpsCalibrator, Journal, LiveCorrectionLoop,
    LiveLoopConfig, PositionReading, PositionSource, TracingSink,
};

const TRUE_LAT: f64 = 46.22560;
const TRUE_LON: f64 = 7.37000;

/// Receiver with a constant bias, deterministic jitter and periodic glitches.
struct SimulatedReceiver {
    reads: AtomicUsize,
}

impl PositionSource for SimulatedReceiver {
    async fn fetch_position(&self) -> Result<PositionReading, GeoError> {
        let n = self.reads.fetch_add(1, Ordering::SeqCst);
        if n % 7 == 6 {
            return Err(GeoError::Timeout);
        }
        let jitter = (n as f64 * 1.7).sin() * 2e-6;
        let glitch = if n == 4 { 5e-3 } else { 0.0 };
        Ok(PositionReading::new(
            TRUE_LAT - 9e-5 + jitter + glitch,
            TRUE_LON + 6e-5 - jitter,
        )
        .with_accuracy(8.0))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing for debug output
    tracing_subscriber::fmt::init();

    let source = Arc::new(SimulatedReceiver {
        reads: AtomicUsize::new(0),
    });
    let mut journal = Journal::new();

    // Shorter window than the default so the example finishes quickly
    let config = CalibrationConfig::default()
        .with_min_duration(2000)
        .with_sample_interval(100);
    let session = CalibrationSession::new(GpsCalibrator::new(config));

    println!("🎯 Calibrating against ({}, {})...\n", TRUE_LAT, TRUE_LON);
    let outcome = session.run(source.as_ref(), TRUE_LAT, TRUE_LON).await;
    journal.record_calibration(&outcome);
    println!("{}\n", journal.format_all());

    let mut live: LiveCorrectionLoop<SimulatedReceiver> =
        LiveCorrectionLoop::new(LiveLoopConfig::default().with_interval(500));
    let sink = Arc::new(TracingSink::new());

    if let Err(e) = live
        .start(session.current_offset(), source.clone(), sink.clone())
        .await
    {
        eprintln!("❌ {}", e);
        return Ok(());
    }

    tokio::time::sleep(Duration::from_secs(3)).await;
    live.stop().await?;

    if let Some((lat, lon)) = sink.last_fix() {
        println!("📍 Last corrected fix: {:.6}, {:.6}", lat, lon);
    }

    Ok(())
}
