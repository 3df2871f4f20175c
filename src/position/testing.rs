//! Test doubles shared by the calibration and correction tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{GeoError, PositionReading, PositionSink, PositionSource};

type Fetch = Result<PositionReading, GeoError>;

/// Position source that replays a fixed script, then a fallback forever.
pub(crate) struct ScriptedSource {
    script: Mutex<VecDeque<Fetch>>,
    fallback: Fetch,
    autonomous: bool,
    fail_pause: bool,
    fail_resume: bool,
    latency: Option<Duration>,
    pub fetches: AtomicUsize,
    pub pauses: AtomicUsize,
    pub resumes: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(script: Vec<Fetch>, fallback: Fetch) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            autonomous: false,
            fail_pause: false,
            fail_resume: false,
            latency: None,
            fetches: AtomicUsize::new(0),
            pauses: AtomicUsize::new(0),
            resumes: AtomicUsize::new(0),
        }
    }

    /// Always returns the same fix.
    pub fn fixed(lat: f64, lon: f64) -> Self {
        Self::new(Vec::new(), Ok(PositionReading::new(lat, lon)))
    }

    /// Every read fails with `error`.
    pub fn failing(error: GeoError) -> Self {
        Self::new(Vec::new(), Err(error))
    }

    pub fn with_autonomous_updates(mut self) -> Self {
        self.autonomous = true;
        self
    }

    pub fn with_failing_pause(mut self) -> Self {
        self.fail_pause = true;
        self
    }

    pub fn with_failing_resume(mut self) -> Self {
        self.fail_resume = true;
        self
    }

    /// Each read takes `latency` of (virtual) time.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn pause_count(&self) -> usize {
        self.pauses.load(Ordering::SeqCst)
    }

    pub fn resume_count(&self) -> usize {
        self.resumes.load(Ordering::SeqCst)
    }

    fn next(&self) -> Fetch {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().unwrap();
        script.pop_front().unwrap_or_else(|| self.fallback.clone())
    }
}

impl PositionSource for ScriptedSource {
    async fn fetch_position(&self) -> Result<PositionReading, GeoError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.next()
    }

    fn supports_autonomous_updates(&self) -> bool {
        self.autonomous
    }

    async fn pause_autonomous_updates(&self) -> Result<(), GeoError> {
        self.pauses.fetch_add(1, Ordering::SeqCst);
        if self.fail_pause {
            return Err(GeoError::Other("pause rejected".into()));
        }
        Ok(())
    }

    async fn resume_autonomous_updates(&self) -> Result<(), GeoError> {
        self.resumes.fetch_add(1, Ordering::SeqCst);
        if self.fail_resume {
            return Err(GeoError::Other("resume rejected".into()));
        }
        Ok(())
    }
}

/// Sink that records every injected `(longitude, latitude)` pair.
#[derive(Default)]
pub(crate) struct RecordingSink {
    calls: Mutex<Vec<(f64, f64)>>,
}

impl RecordingSink {
    pub fn calls(&self) -> Vec<(f64, f64)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl PositionSink for RecordingSink {
    fn inject_corrected_position(&self, longitude: f64, latitude: f64) {
        self.calls.lock().unwrap().push((longitude, latitude));
    }
}
