//! Position source backed by a recorded track file.
//!
//! Track format, one entry per line:
//!
//! ```text
//! # comment
//! 46.77951, 6.65928, 4.5     lat, lon, optional accuracy in meters
//! error timeout              replayed failure: permission | unavailable | timeout
//! ```

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use super::{GeoError, PositionReading, PositionSource};

static FIX_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([-+]?\d+(?:\.\d+)?)\s*[,;\s]\s*([-+]?\d+(?:\.\d+)?)(?:\s*[,;\s]\s*(\d+(?:\.\d+)?))?\s*$")
        .expect("fix line pattern is valid")
});

static ERROR_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*error\s+(permission|unavailable|timeout)\s*$")
        .expect("error line pattern is valid")
});

/// Errors raised while loading a track.
#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("Failed to read track file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Line {line}: cannot parse {content:?}")]
    Parse { line: usize, content: String },
    #[error("Track contains no entries")]
    Empty,
}

#[derive(Debug, Clone)]
enum TrackEntry {
    Fix {
        latitude: f64,
        longitude: f64,
        accuracy: Option<f64>,
    },
    Failure(GeoError),
}

/// Replays a recorded track, one entry per `fetch_position` call.
///
/// Readings are stamped with the time they are replayed, not recorded.
pub struct ReplaySource {
    entries: Vec<TrackEntry>,
    cursor: AtomicUsize,
    looping: bool,
}

impl ReplaySource {
    /// Load a track file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse track text.
    pub fn parse(content: &str) -> Result<Self, ReplayError> {
        let mut entries = Vec::new();

        for (index, raw) in content.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }

            if let Some(caps) = ERROR_LINE.captures(line) {
                let error = match caps[1].to_lowercase().as_str() {
                    "permission" => GeoError::PermissionDenied,
                    "unavailable" => GeoError::PositionUnavailable,
                    _ => GeoError::Timeout,
                };
                entries.push(TrackEntry::Failure(error));
                continue;
            }

            let parse_error = || ReplayError::Parse {
                line: index + 1,
                content: raw.to_string(),
            };
            let caps = FIX_LINE.captures(line).ok_or_else(parse_error)?;
            let latitude: f64 = caps[1].parse().map_err(|_| parse_error())?;
            let longitude: f64 = caps[2].parse().map_err(|_| parse_error())?;
            let accuracy = match caps.get(3) {
                Some(m) => Some(m.as_str().parse::<f64>().map_err(|_| parse_error())?),
                None => None,
            };

            entries.push(TrackEntry::Fix {
                latitude,
                longitude,
                accuracy,
            });
        }

        if entries.is_empty() {
            return Err(ReplayError::Empty);
        }

        Ok(Self {
            entries,
            cursor: AtomicUsize::new(0),
            looping: false,
        })
    }

    /// Wrap around to the first entry once the track is exhausted.
    pub fn looping(mut self) -> Self {
        self.looping = true;
        self
    }

    /// Number of entries in the track.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn next_entry(&self) -> Option<&TrackEntry> {
        let index = self.cursor.fetch_add(1, Ordering::SeqCst);
        if self.looping {
            self.entries.get(index % self.entries.len())
        } else {
            self.entries.get(index)
        }
    }
}

impl PositionSource for ReplaySource {
    async fn fetch_position(&self) -> Result<PositionReading, GeoError> {
        match self.next_entry() {
            Some(TrackEntry::Fix {
                latitude,
                longitude,
                accuracy,
            }) => {
                let reading = PositionReading::new(*latitude, *longitude);
                Ok(match accuracy {
                    Some(a) => reading.with_accuracy(*a),
                    None => reading,
                })
            }
            Some(TrackEntry::Failure(error)) => Err(error.clone()),
            None => Err(GeoError::PositionUnavailable),
        }
    }
}
