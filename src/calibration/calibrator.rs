//! GPS offset calibration against a surveyed reference point.
//!
//! The user stands still on a point whose coordinates are known. The
//! calibrator samples the position source for a bounded window, rejects
//! outliers with a two-axis z-score filter, and derives the additive offset
//! `known - measured mean` that later corrects live fixes.
//!
//! Sampling stops on the first iteration boundary where **both** the minimum
//! duration has elapsed **and** the minimum number of samples was accepted,
//! or when the hard `max_duration_ms` bound is reached.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::{sleep, Instant};
use uuid::Uuid;

use crate::geo::{haversine_distance, PlanarOffset};
use crate::position::{fetch_valid, OffsetDeg, PositionSource};
use crate::stats::{filter_outliers_2d, mean, std_dev, Sample};

/// Minimum sampling window in milliseconds.
pub const DEFAULT_MIN_DURATION_MS: u64 = 5000;

/// Minimum number of accepted samples.
pub const DEFAULT_MIN_SAMPLES: usize = 10;

/// Delay after every read, successful or not, in milliseconds.
pub const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 500;

/// Z-score above which a sample is an outlier.
pub const DEFAULT_Z_THRESHOLD: f64 = 2.5;

/// Hard bound on the sampling window in milliseconds.
pub const DEFAULT_MAX_DURATION_MS: u64 = 30_000;

/// Calibration errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("No samples received during calibration ({attempts} reads attempted)")]
    NoSamplesCollected { attempts: usize },
    #[error("A calibration run is already in progress")]
    Busy,
}

/// Configuration for the sampling window and outlier rejection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    /// Keep sampling at least this long (milliseconds).
    pub min_duration_ms: u64,
    /// Keep sampling until this many readings were accepted.
    pub min_samples: usize,
    /// Fixed delay after each read (milliseconds).
    pub sample_interval_ms: u64,
    /// Outlier threshold in standard deviations.
    pub z_threshold: f64,
    /// Stop sampling after this long even if `min_samples` was not reached.
    /// Never shorter than `min_duration_ms`.
    pub max_duration_ms: u64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            min_duration_ms: DEFAULT_MIN_DURATION_MS,
            min_samples: DEFAULT_MIN_SAMPLES,
            sample_interval_ms: DEFAULT_SAMPLE_INTERVAL_MS,
            z_threshold: DEFAULT_Z_THRESHOLD,
            max_duration_ms: DEFAULT_MAX_DURATION_MS,
        }
    }
}

impl CalibrationConfig {
    pub fn with_min_duration(mut self, ms: u64) -> Self {
        self.min_duration_ms = ms;
        self
    }

    pub fn with_min_samples(mut self, samples: usize) -> Self {
        self.min_samples = samples;
        self
    }

    pub fn with_sample_interval(mut self, ms: u64) -> Self {
        self.sample_interval_ms = ms;
        self
    }

    pub fn with_z_threshold(mut self, z: f64) -> Self {
        self.z_threshold = z;
        self
    }

    pub fn with_max_duration(mut self, ms: u64) -> Self {
        self.max_duration_ms = ms;
        self
    }

    fn min_duration(&self) -> Duration {
        Duration::from_millis(self.min_duration_ms)
    }

    fn max_duration(&self) -> Duration {
        Duration::from_millis(self.max_duration_ms.max(self.min_duration_ms))
    }

    fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

/// Dispersion and bookkeeping for one calibration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationStats {
    /// Accepted readings before outlier rejection.
    pub samples_total: usize,
    /// Readings left after outlier rejection.
    pub samples_used: usize,
    pub z_threshold: f64,
    pub measured_mean_lat: f64,
    pub measured_mean_lon: f64,
    /// Std of the post-correction residuals, in degrees.
    pub residual_std_lat: f64,
    pub residual_std_lon: f64,
    /// Reads requested from the source, including failed ones.
    pub reads_attempted: usize,
    /// Reads that failed or were malformed.
    pub reads_dropped: usize,
    pub elapsed_ms: u64,
}

impl CalibrationStats {
    pub fn outliers_removed(&self) -> usize {
        self.samples_total - self.samples_used
    }
}

/// Outcome of a successful calibration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    pub run_id: Uuid,
    pub completed_at: DateTime<Utc>,
    pub known_lat: f64,
    pub known_lon: f64,
    /// Correction to add to future fixes.
    pub offset_deg: OffsetDeg,
    /// Haversine distance between the known point and the measured mean.
    pub distance_meters: f64,
    /// The same offset as meters north/east (flat-Earth approximation).
    pub planar_offset: PlanarOffset,
    pub stats: CalibrationStats,
}

impl CalibrationResult {
    /// Derive the offset and statistics from a finished sample set.
    ///
    /// Fails only when `samples` is empty. If the filter rejects every sample
    /// (thresholds below sqrt(2) can), the unfiltered set is used instead.
    /// The read bookkeeping in `stats` is left for `calibrate` to fill in.
    pub(crate) fn from_samples(
        known_lat: f64,
        known_lon: f64,
        samples: &[Sample],
        z_threshold: f64,
    ) -> Result<Self, CalibrationError> {
        if samples.is_empty() {
            return Err(CalibrationError::NoSamplesCollected { attempts: 0 });
        }

        let mut filtered = filter_outliers_2d(samples, z_threshold);
        if filtered.is_empty() {
            tracing::warn!(
                "Outlier filter rejected all {} samples at z={}, using them unfiltered",
                samples.len(),
                z_threshold
            );
            filtered = samples.to_vec();
        }
        let lats: Vec<f64> = filtered.iter().map(|s| s.lat).collect();
        let lons: Vec<f64> = filtered.iter().map(|s| s.lon).collect();
        let (mean_lat, mean_lon) = (mean(&lats), mean(&lons));

        let offset_deg = OffsetDeg::new(known_lat - mean_lat, known_lon - mean_lon);

        let lat_residuals: Vec<f64> = lats
            .iter()
            .map(|lat| (known_lat - lat) - offset_deg.d_lat)
            .collect();
        let lon_residuals: Vec<f64> = lons
            .iter()
            .map(|lon| (known_lon - lon) - offset_deg.d_lon)
            .collect();

        Ok(Self {
            run_id: Uuid::new_v4(),
            completed_at: Utc::now(),
            known_lat,
            known_lon,
            offset_deg,
            distance_meters: haversine_distance(known_lat, known_lon, mean_lat, mean_lon),
            planar_offset: PlanarOffset::from_degrees(
                offset_deg.d_lat,
                offset_deg.d_lon,
                known_lat,
            ),
            stats: CalibrationStats {
                samples_total: samples.len(),
                samples_used: filtered.len(),
                z_threshold,
                measured_mean_lat: mean_lat,
                measured_mean_lon: mean_lon,
                residual_std_lat: std_dev(&lat_residuals),
                residual_std_lon: std_dev(&lon_residuals),
                reads_attempted: 0,
                reads_dropped: 0,
                elapsed_ms: 0,
            },
        })
    }
}

/// Samples accumulated by one run. Lives only while the run samples.
struct SampleCollector {
    started: Instant,
    samples: Vec<Sample>,
    attempts: usize,
    dropped: usize,
}

impl SampleCollector {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            samples: Vec::new(),
            attempts: 0,
            dropped: 0,
        }
    }

    fn should_continue(&self, config: &CalibrationConfig) -> bool {
        let elapsed = self.started.elapsed();
        if elapsed >= config.max_duration() {
            return false;
        }
        elapsed < config.min_duration() || self.samples.len() < config.min_samples
    }
}

/// Runs calibrations against a position source.
#[derive(Debug, Clone, Default)]
pub struct GpsCalibrator {
    config: CalibrationConfig,
}

impl GpsCalibrator {
    /// Create a new calibrator with the given configuration.
    pub fn new(config: CalibrationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    /// Sample `source` while standing on `(known_lat, known_lon)` and derive
    /// the offset.
    ///
    /// Failed and malformed reads are dropped without aborting the run. The
    /// only fatal outcome is ending the window with no accepted sample.
    pub async fn calibrate<S: PositionSource>(
        &self,
        source: &S,
        known_lat: f64,
        known_lon: f64,
    ) -> Result<CalibrationResult, CalibrationError> {
        tracing::info!(
            "Calibration started against ({:.6}, {:.6}), min {} ms / {} samples",
            known_lat,
            known_lon,
            self.config.min_duration_ms,
            self.config.min_samples
        );

        if source.supports_autonomous_updates() {
            if let Err(e) = source.pause_autonomous_updates().await {
                tracing::warn!("Could not pause autonomous position updates: {}", e);
            }
        }

        let mut collector = SampleCollector::new();

        while collector.should_continue(&self.config) {
            collector.attempts += 1;
            match fetch_valid(source).await {
                Ok(reading) => {
                    tracing::debug!("lat: {}, lon: {}", reading.latitude, reading.longitude);
                    collector.samples.push(reading.sample());
                }
                Err(e) => {
                    collector.dropped += 1;
                    tracing::debug!("Dropped calibration read: {}", e);
                }
            }
            sleep(self.config.sample_interval()).await;
        }

        let elapsed_ms = collector.started.elapsed().as_millis() as u64;

        if collector.samples.is_empty() {
            tracing::error!(
                "Calibration failed: no samples after {} reads in {} ms",
                collector.attempts,
                elapsed_ms
            );
            return Err(CalibrationError::NoSamplesCollected {
                attempts: collector.attempts,
            });
        }

        if collector.samples.len() < self.config.min_samples {
            tracing::warn!(
                "Calibration window exhausted with {}/{} samples",
                collector.samples.len(),
                self.config.min_samples
            );
        }

        let mut result = CalibrationResult::from_samples(
            known_lat,
            known_lon,
            &collector.samples,
            self.config.z_threshold,
        )?;
        result.stats.reads_attempted = collector.attempts;
        result.stats.reads_dropped = collector.dropped;
        result.stats.elapsed_ms = elapsed_ms;

        tracing::info!(
            "Calibration: {} samples (-{} outliers, thr={}), offset ({:.8}, {:.8}) deg, {:.2} m",
            result.stats.samples_total,
            result.stats.outliers_removed(),
            result.stats.z_threshold,
            result.offset_deg.d_lat,
            result.offset_deg.d_lon,
            result.distance_meters
        );

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::testing::ScriptedSource;
    use crate::position::{GeoError, PositionReading};

    const EPS: f64 = 1e-9;

    #[test]
    fn test_calibration_config_default() {
        let config = CalibrationConfig::default();
        assert_eq!(config.min_duration_ms, 5000);
        assert_eq!(config.min_samples, 10);
        assert_eq!(config.sample_interval_ms, 500);
        assert_eq!(config.z_threshold, 2.5);
    }

    #[test]
    fn test_calibration_config_builder() {
        let config = CalibrationConfig::default()
            .with_min_duration(1000)
            .with_min_samples(3)
            .with_sample_interval(100)
            .with_z_threshold(3.0)
            .with_max_duration(200);

        assert_eq!(config.min_samples, 3);
        assert_eq!(config.z_threshold, 3.0);
        // The hard bound never cuts the minimum window short.
        assert_eq!(config.max_duration(), Duration::from_millis(1000));
    }

    #[test]
    fn test_offset_is_known_minus_measured() {
        let samples = vec![Sample::new(45.999, 7.001); 4];
        let result = CalibrationResult::from_samples(46.0, 7.0, &samples, 2.5).unwrap();

        assert!((result.offset_deg.d_lat - 0.001).abs() < EPS);
        assert!((result.offset_deg.d_lon + 0.001).abs() < EPS);
        assert!((result.stats.measured_mean_lat - 45.999).abs() < EPS);
        assert!((result.stats.measured_mean_lon - 7.001).abs() < EPS);
        // Read bookkeeping belongs to `calibrate`.
        assert_eq!(result.stats.reads_attempted, 0);
        assert_eq!(result.stats.elapsed_ms, 0);
    }

    #[test]
    fn test_threshold_rejecting_everything_falls_back_to_all_samples() {
        // Two points sit exactly one std from their mean on both axes.
        let samples = vec![Sample::new(45.9990, 7.0010), Sample::new(45.9992, 7.0012)];
        let result = CalibrationResult::from_samples(46.0, 7.0, &samples, 0.9).unwrap();

        assert_eq!(result.stats.samples_used, 2);
        assert_eq!(result.stats.outliers_removed(), 0);
        assert!((result.stats.measured_mean_lat - 45.9991).abs() < EPS);
        assert!((result.offset_deg.d_lat - 0.0009).abs() < EPS);
        assert!((result.offset_deg.d_lon + 0.0011).abs() < EPS);
        assert!(result.distance_meters < 200.0);
    }

    #[test]
    fn test_residual_std_matches_filtered_spread() {
        let samples = vec![
            Sample::new(46.0001, 7.0),
            Sample::new(45.9999, 7.0002),
            Sample::new(46.0, 7.0001),
        ];
        let result = CalibrationResult::from_samples(46.0, 7.0, &samples, 2.5).unwrap();

        let lats: Vec<f64> = samples.iter().map(|s| s.lat).collect();
        let lons: Vec<f64> = samples.iter().map(|s| s.lon).collect();
        assert!((result.stats.residual_std_lat - std_dev(&lats)).abs() < 1e-12);
        assert!((result.stats.residual_std_lon - std_dev(&lons)).abs() < 1e-12);
    }

    #[test]
    fn test_distance_is_haversine() {
        let samples = vec![Sample::new(46.7796, 6.6594)];
        let result = CalibrationResult::from_samples(46.7795, 6.6593, &samples, 2.5).unwrap();

        let expected = haversine_distance(46.7795, 6.6593, 46.7796, 6.6594);
        assert!((result.distance_meters - expected).abs() < 1e-9);
        assert!(result.distance_meters > 10.0 && result.distance_meters < 20.0);
        assert!(result.planar_offset.d_north_m < 0.0);
        assert!(result.planar_offset.d_east_m < 0.0);
    }

    #[test]
    fn test_outlier_excluded_from_mean() {
        let mut samples = vec![Sample::new(46.0, 7.0); 9];
        samples.push(Sample::new(100.0, 100.0));
        let result = CalibrationResult::from_samples(46.0, 7.0, &samples, 2.5).unwrap();

        assert_eq!(result.stats.samples_total, 10);
        assert_eq!(result.stats.samples_used, 9);
        assert_eq!(result.stats.outliers_removed(), 1);
        assert!(result.offset_deg.d_lat.abs() < EPS);
        assert!(result.offset_deg.d_lon.abs() < EPS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_on_first_boundary_meeting_both_thresholds() {
        let source = ScriptedSource::fixed(45.999, 7.001);
        let calibrator = GpsCalibrator::default();

        let started = Instant::now();
        let result = calibrator.calibrate(&source, 46.0, 7.0).await.unwrap();
        let elapsed = started.elapsed();

        assert!(elapsed >= Duration::from_millis(5000));
        assert_eq!(result.stats.samples_total, 10);
        assert_eq!(source.fetch_count(), 10);
        assert!((result.offset_deg.d_lat - 0.001).abs() < EPS);
        assert!((result.offset_deg.d_lon + 0.001).abs() < EPS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sample_count_extends_window() {
        // Every other read fails: 10 accepted samples need 20 reads (10 s).
        let mut script = Vec::new();
        for _ in 0..10 {
            script.push(Err(GeoError::Timeout));
            script.push(Ok(PositionReading::new(46.0, 7.0)));
        }
        let source = ScriptedSource::new(script, Err(GeoError::PositionUnavailable));

        let started = Instant::now();
        let result = GpsCalibrator::default()
            .calibrate(&source, 46.0, 7.0)
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_millis(10_000));
        assert_eq!(result.stats.samples_total, 10);
        assert_eq!(result.stats.reads_attempted, 20);
        assert_eq!(result.stats.reads_dropped, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_reads_are_dropped() {
        let script = vec![
            Ok(PositionReading::new(f64::NAN, 7.0)),
            Ok(PositionReading::new(46.0, 200.0)),
        ];
        let source = ScriptedSource::new(script, Ok(PositionReading::new(46.0, 7.0)));

        let result = GpsCalibrator::default()
            .calibrate(&source, 46.0, 7.0)
            .await
            .unwrap();

        assert_eq!(result.stats.reads_dropped, 2);
        assert_eq!(result.stats.samples_total, 10);
        assert!(result.stats.measured_mean_lat.is_finite());
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_reads_failing_is_fatal() {
        let source = ScriptedSource::failing(GeoError::PermissionDenied);
        let config = CalibrationConfig::default().with_max_duration(8000);

        let started = Instant::now();
        let err = GpsCalibrator::new(config)
            .calibrate(&source, 46.0, 7.0)
            .await
            .unwrap_err();

        assert_eq!(err, CalibrationError::NoSamplesCollected { attempts: 16 });
        assert!(started.elapsed() >= Duration::from_millis(8000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_window_keeps_partial_samples() {
        let script = vec![Ok(PositionReading::new(46.0, 7.0)); 3];
        let source = ScriptedSource::new(script, Err(GeoError::Timeout));
        let config = CalibrationConfig::default().with_max_duration(6000);

        let result = GpsCalibrator::new(config)
            .calibrate(&source, 46.0, 7.0)
            .await
            .unwrap();

        assert_eq!(result.stats.samples_total, 3);
        assert_eq!(result.stats.reads_attempted, 12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pauses_autonomous_updates_best_effort() {
        let source = ScriptedSource::fixed(46.0, 7.0)
            .with_autonomous_updates()
            .with_failing_pause();

        let result = GpsCalibrator::default().calibrate(&source, 46.0, 7.0).await;

        assert!(result.is_ok());
        assert_eq!(source.pause_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sources_without_autonomous_updates_are_not_paused() {
        let source = ScriptedSource::fixed(46.0, 7.0);
        GpsCalibrator::default()
            .calibrate(&source, 46.0, 7.0)
            .await
            .unwrap();
        assert_eq!(source.pause_count(), 0);
    }
}
