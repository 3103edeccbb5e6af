//! Frequency-domain filters aligned to a zero-centered frequency axis.

use crate::error::{Error, Result};

/// Default steepness of the bandpass filter
pub const DEFAULT_BANDPASS_ORDER: i32 = 50;

/// One-sided weighting: 0 for `f < 0`, 1 at `f == 0`, 2 for `f > 0`.
///
/// Multiplying a spectrum by this filter and inverse-transforming gives the
/// analytic signal with unit amplitude gain. The DC bin is preserved.
pub fn hilbert_filter(frequency_axis: &[f64]) -> Vec<f64> {
    frequency_axis
        .iter()
        .map(|&f| {
            if f > 0.0 {
                2.0
            } else if f == 0.0 {
                1.0
            } else {
                0.0
            }
        })
        .collect()
}

/// Half-bin-shifted weighting: 0 for `f <= 0`, 2 for `f > 0`.
///
/// Strictly right-sided; the DC bin is dropped. Not interchangeable with
/// [`hilbert_filter`].
pub fn hilbert_filter_shifted(frequency_axis: &[f64]) -> Vec<f64> {
    frequency_axis
        .iter()
        .map(|&f| if f > 0.0 { 2.0 } else { 0.0 })
        .collect()
}

/// Smooth bandpass `1 / (1 + (|f - center| / bandwidth)^order)`.
///
/// The absolute value keeps the filter symmetric about `center` for odd
/// `order` too.
pub fn bandpass_filter(
    frequency_axis: &[f64],
    center: f64,
    bandwidth: f64,
    order: i32,
) -> Result<Vec<f64>> {
    if !(bandwidth > 0.0 && bandwidth.is_finite()) {
        return Err(Error::invalid(format!(
            "bandpass bandwidth must be positive and finite, got {bandwidth}"
        )));
    }
    Ok(frequency_axis
        .iter()
        .map(|&f| 1.0 / (1.0 + ((f - center).abs() / bandwidth).powi(order)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_hilbert_around_zero() {
        let freq = [-2.0, -1.0, 0.0, 1.0, 2.0];
        assert_eq!(hilbert_filter(&freq), vec![0.0, 0.0, 1.0, 2.0, 2.0]);
        assert_eq!(hilbert_filter_shifted(&freq), vec![0.0, 0.0, 0.0, 2.0, 2.0]);
    }

    #[test]
    fn test_bandpass_shape() {
        let freq: Vec<f64> = (0..=40).map(|k| k as f64 * 100.0).collect();
        let bp = bandpass_filter(&freq, 2000.0, 500.0, DEFAULT_BANDPASS_ORDER).unwrap();
        assert_eq!(bp[20], 1.0);
        // half power at center ± bandwidth
        assert!((bp[15] - 0.5).abs() < 1e-12);
        assert!((bp[25] - 0.5).abs() < 1e-12);
        assert!(bp[0] < 1e-12);
        assert!(bp[40] < 1e-12);
    }

    #[test]
    fn test_bandpass_rejects_bad_bandwidth() {
        let freq = [0.0, 1.0];
        assert!(matches!(
            bandpass_filter(&freq, 0.0, 0.0, 50),
            Err(Error::InvalidConfiguration(_))
        ));
        assert!(bandpass_filter(&freq, 0.0, -1.0, 50).is_err());
    }

    proptest! {
        #[test]
        fn bandpass_is_symmetric(
            center in -1.0e4f64..1.0e4,
            bandwidth in 1.0f64..5.0e3,
            order in 1i32..80,
            d in 0.0f64..2.0e4,
        ) {
            let bp = bandpass_filter(&[center + d, center - d], center, bandwidth, order).unwrap();
            prop_assert!((bp[0] - bp[1]).abs() < 1e-12);
        }
    }
}
