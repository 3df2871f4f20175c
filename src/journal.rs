//! Append-only calibration journal.
//!
//! Human-readable record of calibration runs and live-correction events,
//! kept in memory and optionally mirrored to a file. The calibration and
//! correction code never read it; the command line renders their structured
//! outcomes into it.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::calibration::{CalibrationError, CalibrationResult};
use crate::correction::{LiveLoopError, LoopEvent};
use crate::settings::AppSettings;

/// Journal entry level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JournalLevel {
    Info,
    Success,
    Warning,
    Error,
    Fix,
}

impl JournalLevel {
    /// Get display string for the level.
    pub fn as_str(&self) -> &'static str {
        match self {
            JournalLevel::Info => "INFO",
            JournalLevel::Success => "SUCCESS",
            JournalLevel::Warning => "WARN",
            JournalLevel::Error => "ERROR",
            JournalLevel::Fix => "FIX",
        }
    }

    /// Get emoji for the level.
    pub fn emoji(&self) -> &'static str {
        match self {
            JournalLevel::Info => "ℹ️",
            JournalLevel::Success => "✅",
            JournalLevel::Warning => "⚠️",
            JournalLevel::Error => "❌",
            JournalLevel::Fix => "📍",
        }
    }
}

/// A single journal entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub timestamp: DateTime<Local>,
    pub level: JournalLevel,
    pub message: String,
}

impl JournalEntry {
    pub fn new(level: JournalLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            level,
            message: message.into(),
        }
    }

    /// Format the entry for the terminal.
    pub fn format_display(&self) -> String {
        format!(
            "[{}] {} {}",
            self.timestamp.format("%H:%M:%S"),
            self.level.emoji(),
            self.message
        )
    }

    /// Format the entry for file storage.
    pub fn format_file(&self) -> String {
        format!(
            "[{}] [{}] {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.level.as_str(),
            self.message
        )
    }
}

/// Entries kept in memory before the oldest are dropped.
pub const MAX_JOURNAL_ENTRIES: usize = 1000;

/// In-memory journal, optionally mirrored line by line to a file.
#[derive(Debug, Clone)]
pub struct Journal {
    entries: Vec<JournalEntry>,
    mirror: Option<PathBuf>,
}

impl Default for Journal {
    fn default() -> Self {
        Self::new()
    }
}

impl Journal {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            mirror: None,
        }
    }

    /// Append every new entry to `path` as well.
    pub fn with_mirror(mut self, path: impl Into<PathBuf>) -> Self {
        self.mirror = Some(path.into());
        self
    }

    /// Append an entry.
    pub fn log(&mut self, level: JournalLevel, message: impl Into<String>) {
        let entry = JournalEntry::new(level, message);

        if let Some(ref path) = self.mirror {
            if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
                let _ = writeln!(file, "{}", entry.format_file());
            }
        }

        self.entries.push(entry);

        if self.entries.len() > MAX_JOURNAL_ENTRIES {
            self.entries.remove(0);
        }
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.log(JournalLevel::Info, message);
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.log(JournalLevel::Success, message);
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.log(JournalLevel::Warning, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.log(JournalLevel::Error, message);
    }

    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// All entries formatted for the terminal.
    pub fn format_all(&self) -> String {
        self.entries
            .iter()
            .map(|e| e.format_display())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Write all entries to `path`, replacing its content.
    pub fn save_to(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let mut file = File::create(path)?;
        for entry in &self.entries {
            writeln!(file, "{}", entry.format_file())?;
        }
        Ok(())
    }

    /// Save into the application logs directory, returning the file path.
    pub fn save_to_logs_dir(&self) -> io::Result<PathBuf> {
        let dir = AppSettings::logs_dir().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "Cannot determine logs directory")
        })?;
        fs::create_dir_all(&dir)?;

        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let path = dir.join(format!("calibration_logs_{}.txt", timestamp));
        self.save_to(&path)?;
        Ok(path)
    }

    /// Render a calibration outcome.
    pub fn record_calibration(&mut self, outcome: &Result<CalibrationResult, CalibrationError>) {
        match outcome {
            Ok(result) => {
                let stats = &result.stats;
                self.success(format!(
                    "Calibration OK\nΔlat {:.8}°, Δlon {:.8}°\n≈ distance [m] {:.2} (north {:.2} m, east {:.2} m)\nσ: lat {:.2e}°, lon {:.2e}° | used: {}/{}",
                    result.offset_deg.d_lat,
                    result.offset_deg.d_lon,
                    result.distance_meters,
                    result.planar_offset.d_north_m,
                    result.planar_offset.d_east_m,
                    stats.residual_std_lat,
                    stats.residual_std_lon,
                    stats.samples_used,
                    stats.samples_total
                ));
                if stats.reads_dropped > 0 {
                    self.warning(format!(
                        "{} of {} reads dropped during calibration",
                        stats.reads_dropped, stats.reads_attempted
                    ));
                }
            }
            Err(e) => self.error(format!("Calibration failed: {}", e)),
        }
    }

    /// Render a live-loop event.
    pub fn record_loop_event(&mut self, event: &LoopEvent) {
        match event {
            LoopEvent::Started {
                latitude,
                longitude,
            } => self.success(format!(
                "Live correction started (lat: {:.6}, lon: {:.6})",
                latitude, longitude
            )),
            LoopEvent::Injected {
                latitude,
                longitude,
            } => self.log(
                JournalLevel::Fix,
                format!("Live correction → lat: {:.6}, lon: {:.6}", latitude, longitude),
            ),
            LoopEvent::TickSkipped(e) => self.warning(format!("Tick skipped: {}", e)),
            LoopEvent::Stopped => self.info("Live correction stopped"),
            LoopEvent::HandoffFailed(e) => {
                self.error(format!("Handing updates back to the source failed: {}", e))
            }
        }
    }

    /// Render a live-loop start or stop failure.
    pub fn record_loop_error(&mut self, error: &LiveLoopError) {
        self.error(error.to_string());
    }
}
