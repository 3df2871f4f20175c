//! Sink that reports corrected fixes through `tracing`.

use std::sync::Mutex;

use super::PositionSink;

/// Logs every corrected fix and remembers the latest one.
#[derive(Debug, Default)]
pub struct TracingSink {
    last: Mutex<Option<(f64, f64)>>,
}

impl TracingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest injected fix as `(latitude, longitude)`.
    pub fn last_fix(&self) -> Option<(f64, f64)> {
        *self.last.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl PositionSink for TracingSink {
    fn inject_corrected_position(&self, longitude: f64, latitude: f64) {
        tracing::info!("Corrected fix -> lat: {:.6}, lon: {:.6}", latitude, longitude);
        *self.last.lock().unwrap_or_else(|e| e.into_inner()) = Some((latitude, longitude));
    }
}
