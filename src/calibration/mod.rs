//! GPS calibration against a surveyed reference point.

mod calibrator;
mod session;

pub use calibrator::{
    CalibrationConfig, CalibrationError, CalibrationResult, CalibrationStats, GpsCalibrator,
    DEFAULT_MAX_DURATION_MS, DEFAULT_MIN_DURATION_MS, DEFAULT_MIN_SAMPLES,
    DEFAULT_SAMPLE_INTERVAL_MS, DEFAULT_Z_THRESHOLD,
};
pub use session::{CalibrationOutcome, CalibrationSession, SessionPhase};
