//! Descriptive statistics over coordinate samples.
//!
//! Both functions are total: an empty slice yields `0.0` rather than an
//! error, so callers further down the calibration pipeline never have to
//! special-case an empty filtered set.

pub mod outliers;

pub use outliers::{filter_outliers_2d, Sample};

/// Arithmetic mean, `0.0` for an empty slice.
pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Population standard deviation (divides by N), `0.0` for an empty slice.
pub fn std_dev(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let m = mean(xs);
    let variance = xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / xs.len() as f64;
    variance.sqrt()
}
