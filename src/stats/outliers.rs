//! Two-axis z-score outlier rejection.

use serde::{Deserialize, Serialize};

use super::{mean, std_dev};

/// Reduced form of a position reading used by the statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub lat: f64,
    pub lon: f64,
}

impl Sample {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Keep the samples whose latitude **and** longitude z-scores are both within
/// `z_threshold`.
///
/// If neither axis shows any dispersion the input is returned unchanged. An
/// axis with zero dispersion contributes a z-score of 0, so it can never
/// exclude a sample on its own. Surviving samples keep their relative order.
pub fn filter_outliers_2d(samples: &[Sample], z_threshold: f64) -> Vec<Sample> {
    if samples.is_empty() {
        return Vec::new();
    }

    let lats: Vec<f64> = samples.iter().map(|s| s.lat).collect();
    let lons: Vec<f64> = samples.iter().map(|s| s.lon).collect();
    let (mean_lat, std_lat) = (mean(&lats), std_dev(&lats));
    let (mean_lon, std_lon) = (mean(&lons), std_dev(&lons));

    if std_lat == 0.0 && std_lon == 0.0 {
        return samples.to_vec();
    }

    let z = |value: f64, m: f64, s: f64| if s == 0.0 { 0.0 } else { ((value - m) / s).abs() };

    samples
        .iter()
        .filter(|s| {
            z(s.lat, mean_lat, std_lat) <= z_threshold && z(s.lon, mean_lon, std_lon) <= z_threshold
        })
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster_with_outlier() -> Vec<Sample> {
        vec![
            Sample::new(46.0, 7.0),
            Sample::new(46.0, 7.0),
            Sample::new(46.0, 7.0),
            Sample::new(100.0, 100.0),
        ]
    }

    #[test]
    fn test_identical_samples_pass_through() {
        let samples = vec![Sample::new(46.7795, 6.6593); 5];
        assert_eq!(filter_outliers_2d(&samples, 2.5), samples);
    }

    #[test]
    fn test_empty_input() {
        assert!(filter_outliers_2d(&[], 2.5).is_empty());
    }

    #[test]
    fn test_outlier_is_dropped() {
        // Nine identical fixes put the lone outlier at exactly z = 3.
        let mut samples = vec![Sample::new(46.0, 7.0); 9];
        samples.push(Sample::new(100.0, 100.0));

        let filtered = filter_outliers_2d(&samples, 2.5);
        assert_eq!(filtered.len(), 9);
        assert!(filtered.iter().all(|s| *s == Sample::new(46.0, 7.0)));
    }

    #[test]
    fn test_four_point_outlier_survives_default_threshold() {
        // A single outlier among n points cannot exceed z = sqrt(n - 1).
        let samples = cluster_with_outlier();
        assert_eq!(filter_outliers_2d(&samples, 2.5), samples);
    }

    #[test]
    fn test_four_point_outlier_with_tighter_threshold() {
        let filtered = filter_outliers_2d(&cluster_with_outlier(), 1.5);
        assert_eq!(filtered, vec![Sample::new(46.0, 7.0); 3]);

        let lats: Vec<f64> = filtered.iter().map(|s| s.lat).collect();
        let lons: Vec<f64> = filtered.iter().map(|s| s.lon).collect();
        assert_eq!(mean(&lats), 46.0);
        assert_eq!(mean(&lons), 7.0);
    }

    #[test]
    fn test_zero_dispersion_axis_never_excludes() {
        // Latitude is constant, so only longitude can reject.
        let mut samples: Vec<Sample> = (0..9).map(|i| Sample::new(46.0, 7.0 + i as f64 * 1e-6)).collect();
        samples.push(Sample::new(46.0, 8.0));

        let filtered = filter_outliers_2d(&samples, 2.5);
        assert_eq!(filtered.len(), 9);
        assert!(filtered.iter().all(|s| s.lat == 46.0 && s.lon < 7.1));
    }

    #[test]
    fn test_conjunctive_across_axes() {
        // The last point is typical in latitude but far off in longitude.
        let mut samples: Vec<Sample> = (0..10)
            .map(|i| Sample::new(46.0 + (i % 3) as f64 * 1e-5, 7.0 + (i % 2) as f64 * 1e-5))
            .collect();
        samples.push(Sample::new(46.00001, 7.5));

        let filtered = filter_outliers_2d(&samples, 2.5);
        assert!(!filtered.contains(&Sample::new(46.00001, 7.5)));
    }

    #[test]
    fn test_preserves_order_and_never_grows() {
        let samples: Vec<Sample> = (0..20)
            .map(|i| Sample::new(46.0 + (i as f64).sin() * 1e-4, 7.0 + (i as f64).cos() * 1e-4))
            .chain(std::iter::once(Sample::new(47.0, 8.0)))
            .collect();

        let filtered = filter_outliers_2d(&samples, 2.0);
        assert!(filtered.len() <= samples.len());

        let mut cursor = 0;
        for kept in &filtered {
            let pos = samples[cursor..].iter().position(|s| s == kept).map(|p| p + cursor);
            assert!(pos.is_some(), "filtered output reordered samples");
            cursor = pos.unwrap_or(cursor) + 1;
        }
    }
}
