//! Distance metrics between geodetic points.
//!
//! Two metrics are provided:
//! - **Haversine**: great-circle distance on a sphere of mean Earth radius.
//!   This is the canonical calibration distance.
//! - **Planar**: degrees scaled by a fixed meters-per-degree factor, with the
//!   longitude term shrunk by `cos(latitude)`. Only meaningful for short
//!   baselines, reported as a secondary north/east breakdown.

use serde::{Deserialize, Serialize};

/// Mean Earth radius for the spherical model, in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Approximate length of one degree of latitude, in meters.
pub const METERS_PER_DEG_LAT: f64 = 111_320.0;

/// Great-circle distance in meters between two lat/lon points given in degrees.
///
/// # Example
/// ```
/// use gps_calibrator::geo::haversine_distance;
///
/// let d = haversine_distance(0.0, 0.0, 0.0, 1.0);
/// assert!((d - 111_195.0).abs() < 1.0);
/// ```
pub fn haversine_distance(lat0: f64, lon0: f64, lat1: f64, lon1: f64) -> f64 {
    let dlat = (lat1 - lat0).to_radians();
    let dlon = (lon1 - lon0).to_radians();

    let a = (dlat / 2.0).sin().powi(2)
        + lat0.to_radians().cos() * lat1.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    let angle = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * angle
}

/// Meters per degree of latitude and longitude at `lat_deg`.
pub fn meters_per_degree(lat_deg: f64) -> (f64, f64) {
    (
        METERS_PER_DEG_LAT,
        METERS_PER_DEG_LAT * lat_deg.to_radians().cos(),
    )
}

/// A degree offset expressed as meters north and east.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PlanarOffset {
    pub d_north_m: f64,
    pub d_east_m: f64,
}

impl PlanarOffset {
    /// Convert a `(d_lat, d_lon)` degree offset taken at `lat_deg`.
    pub fn from_degrees(d_lat: f64, d_lon: f64, lat_deg: f64) -> Self {
        let (m_lat, m_lon) = meters_per_degree(lat_deg);
        Self {
            d_north_m: d_lat * m_lat,
            d_east_m: d_lon * m_lon,
        }
    }

    /// Euclidean length of the offset in meters.
    pub fn magnitude(&self) -> f64 {
        self.d_north_m.hypot(self.d_east_m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-6;

    #[test]
    fn test_haversine_same_point() {
        assert!(haversine_distance(46.7795, 6.6593, 46.7795, 6.6593).abs() < EPSILON);
    }

    #[test]
    fn test_haversine_one_degree_longitude_at_equator() {
        let d = haversine_distance(0.0, 0.0, 0.0, 1.0);
        // 2 * pi * R / 360
        assert!((d - 111_194.926_644_558_73).abs() < 1e-3);
    }

    #[test]
    fn test_haversine_symmetric() {
        let a = haversine_distance(46.2256, 7.37, 46.2260, 7.3712);
        let b = haversine_distance(46.2260, 7.3712, 46.2256, 7.37);
        assert!((a - b).abs() < EPSILON);
    }

    #[test]
    fn test_planar_agrees_with_haversine_on_short_baseline() {
        let (lat0, lon0) = (46.7795, 6.6593);
        let (lat1, lon1) = (46.7796, 6.6595);

        let planar = PlanarOffset::from_degrees(lat1 - lat0, lon1 - lon0, lat0);
        let great_circle = haversine_distance(lat0, lon0, lat1, lon1);

        // Within 0.5% over ~20 m.
        assert!((planar.magnitude() - great_circle).abs() / great_circle < 5e-3);
    }

    #[test]
    fn test_meters_per_degree_shrinks_with_latitude() {
        let (lat_eq, lon_eq) = meters_per_degree(0.0);
        assert_eq!(lat_eq, METERS_PER_DEG_LAT);
        assert!((lon_eq - METERS_PER_DEG_LAT).abs() < EPSILON);

        let (_, lon_60) = meters_per_degree(60.0);
        assert!((lon_60 - METERS_PER_DEG_LAT / 2.0).abs() < 1e-6);
    }
}
