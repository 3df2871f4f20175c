//! Position sources, consumer sinks and the values that flow between them.

mod log_sink;
mod replay;
#[cfg(test)]
pub(crate) mod testing;

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::stats::Sample;

pub use log_sink::TracingSink;
pub use replay::{ReplayError, ReplaySource};

/// Errors a position source can report for a single read.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeoError {
    #[error("Permission denied by the browser or OS")]
    PermissionDenied,
    #[error("Position unavailable (sensors or network)")]
    PositionUnavailable,
    #[error("Timed out waiting for a position")]
    Timeout,
    #[error("Malformed reading: {0}")]
    Malformed(String),
    #[error("Position source error: {0}")]
    Other(String),
}

impl GeoError {
    /// Map a W3C geolocation error code (1, 2, 3) to an error.
    pub fn from_code(code: u16, message: impl Into<String>) -> Self {
        match code {
            1 => Self::PermissionDenied,
            2 => Self::PositionUnavailable,
            3 => Self::Timeout,
            _ => Self::Other(message.into()),
        }
    }

    /// Stable short code for logs and UI alerts.
    pub fn code(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::PositionUnavailable => "POSITION_UNAVAILABLE",
            Self::Timeout => "TIMEOUT",
            Self::Malformed(_) => "MALFORMED",
            Self::Other(_) => "ERROR",
        }
    }
}

/// A single fix obtained from a position source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionReading {
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy in meters, when the source reports one.
    pub accuracy: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl PositionReading {
    /// Create a reading stamped with the current time.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    /// Reject non-finite or out-of-range coordinates.
    pub fn validate(&self) -> Result<(), GeoError> {
        if !self.latitude.is_finite() || !self.longitude.is_finite() {
            return Err(GeoError::Malformed(format!(
                "non-finite coordinates ({}, {})",
                self.latitude, self.longitude
            )));
        }
        if self.latitude.abs() > 90.0 || self.longitude.abs() > 180.0 {
            return Err(GeoError::Malformed(format!(
                "coordinates out of range ({}, {})",
                self.latitude, self.longitude
            )));
        }
        Ok(())
    }

    pub fn sample(&self) -> Sample {
        Sample::new(self.latitude, self.longitude)
    }
}

/// Additive correction in degrees, `known - measured` per axis.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OffsetDeg {
    pub d_lat: f64,
    pub d_lon: f64,
}

impl OffsetDeg {
    pub const ZERO: OffsetDeg = OffsetDeg { d_lat: 0.0, d_lon: 0.0 };

    pub fn new(d_lat: f64, d_lon: f64) -> Self {
        Self { d_lat, d_lon }
    }

    /// Translate a raw fix by this offset, independently per axis.
    pub fn apply(&self, latitude: f64, longitude: f64) -> (f64, f64) {
        (latitude + self.d_lat, longitude + self.d_lon)
    }
}

/// A source of position fixes, e.g. a platform geolocation API.
///
/// `fetch_position` must be safe to call repeatedly at sub-second intervals.
/// Sources that also push their own updates to the consumer (the renderer's
/// built-in GPS feed) advertise it through `supports_autonomous_updates`;
/// pause and resume are only called on sources that do.
pub trait PositionSource: Send + Sync + 'static {
    fn fetch_position(&self) -> impl Future<Output = Result<PositionReading, GeoError>> + Send;

    fn supports_autonomous_updates(&self) -> bool {
        false
    }

    fn pause_autonomous_updates(&self) -> impl Future<Output = Result<(), GeoError>> + Send {
        async { Ok(()) }
    }

    fn resume_autonomous_updates(&self) -> impl Future<Output = Result<(), GeoError>> + Send {
        async { Ok(()) }
    }
}

/// Consumer of corrected fixes, shown in place of the real position.
pub trait PositionSink: Send + Sync + 'static {
    fn inject_corrected_position(&self, longitude: f64, latitude: f64);
}

/// Fetch one reading and reject it if malformed.
pub(crate) async fn fetch_valid<S: PositionSource>(
    source: &S,
) -> Result<PositionReading, GeoError> {
    let reading = source.fetch_position().await?;
    reading.validate()?;
    Ok(reading)
}
