//! Calibration orchestration: one run at a time, latest result retained.

use std::sync::{Mutex, MutexGuard};

use crate::position::{OffsetDeg, PositionSource};

use super::calibrator::{CalibrationError, CalibrationResult, GpsCalibrator};

/// Whether a run is currently sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Sampling,
}

/// How the most recent run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationOutcome {
    Completed(CalibrationResult),
    Failed(CalibrationError),
}

#[derive(Debug)]
struct SessionState {
    phase: SessionPhase,
    last_outcome: Option<CalibrationOutcome>,
    latest: Option<CalibrationResult>,
}

/// Puts the session back to `Idle` when a run ends, including when the run's
/// future is dropped mid-sampling.
struct SamplingGuard<'a> {
    session: &'a CalibrationSession,
}

impl Drop for SamplingGuard<'_> {
    fn drop(&mut self) {
        self.session.state().phase = SessionPhase::Idle;
    }
}

/// Drives calibration runs and keeps the most recent successful result.
///
/// A second `run` while one is sampling is rejected with
/// [`CalibrationError::Busy`]; the in-flight run is not affected. A failed
/// run never discards the previous successful result.
#[derive(Debug)]
pub struct CalibrationSession {
    calibrator: GpsCalibrator,
    state: Mutex<SessionState>,
}

impl CalibrationSession {
    pub fn new(calibrator: GpsCalibrator) -> Self {
        Self {
            calibrator,
            state: Mutex::new(SessionState {
                phase: SessionPhase::Idle,
                last_outcome: None,
                latest: None,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn phase(&self) -> SessionPhase {
        self.state().phase
    }

    pub fn last_outcome(&self) -> Option<CalibrationOutcome> {
        self.state().last_outcome.clone()
    }

    /// Most recent successful calibration.
    pub fn latest_result(&self) -> Option<CalibrationResult> {
        self.state().latest.clone()
    }

    /// Offset to hand to the live loop, zero until a run completes.
    pub fn current_offset(&self) -> OffsetDeg {
        self.state()
            .latest
            .as_ref()
            .map(|r| r.offset_deg)
            .unwrap_or(OffsetDeg::ZERO)
    }

    /// Run one calibration against `source`.
    pub async fn run<S: PositionSource>(
        &self,
        source: &S,
        known_lat: f64,
        known_lon: f64,
    ) -> Result<CalibrationResult, CalibrationError> {
        {
            let mut state = self.state();
            if state.phase == SessionPhase::Sampling {
                tracing::warn!("Calibration requested while another run is sampling");
                return Err(CalibrationError::Busy);
            }
            state.phase = SessionPhase::Sampling;
        }
        let _sampling = SamplingGuard { session: self };

        let result = self.calibrator.calibrate(source, known_lat, known_lon).await;

        let mut state = self.state();
        match &result {
            Ok(r) => {
                state.latest = Some(r.clone());
                state.last_outcome = Some(CalibrationOutcome::Completed(r.clone()));
            }
            Err(e) => {
                state.last_outcome = Some(CalibrationOutcome::Failed(e.clone()));
            }
        }

        result
    }
}

impl Default for CalibrationSession {
    fn default() -> Self {
        Self::new(GpsCalibrator::default())
    }
}
