//! Zero-centered forward and inverse transforms.

use crate::fft_utils::FftProcessor;
use crate::types::Complex;

/// Zero-centered frequency axis for `n` points spaced by `dt`.
///
/// Runs from the most negative to the most positive frequency with the DC
/// bin at index `n / 2`, for both even and odd `n`.
pub fn frequency_axis(n: usize, dt: f64) -> Vec<f64> {
    let resolution = 1.0 / (n as f64 * dt);
    let half = (n / 2) as i64;
    (0..n as i64).map(|k| (k - half) as f64 * resolution).collect()
}

/// DFT of `x` with spectrum and frequency axis both `fft_shift`ed.
///
/// The spectrum is in raw transform units; callers scale by `dt` when they
/// want amplitude per hertz.
pub fn forward_transform(x: &[Complex], dt: f64) -> (Vec<Complex>, Vec<f64>) {
    let processor = FftProcessor::new(x.len());
    let mut buffer = x.to_vec();
    processor.fft_inplace(&mut buffer);
    let spectrum = FftProcessor::fft_shift(&buffer);
    (spectrum, frequency_axis(x.len(), dt))
}

/// [`forward_transform`] of a real sequence
pub fn forward_transform_real(x: &[f64], dt: f64) -> (Vec<Complex>, Vec<f64>) {
    let buffer: Vec<Complex> = x.iter().map(|&v| Complex::new(v, 0.0)).collect();
    forward_transform(&buffer, dt)
}

/// Undo the centering shift and inverse-transform (normalized by `1/n`)
pub fn inverse_transform(spectrum: &[Complex]) -> Vec<Complex> {
    let processor = FftProcessor::new(spectrum.len());
    let mut buffer = FftProcessor::ifft_shift(spectrum);
    processor.ifft_inplace(&mut buffer);
    buffer
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::f64::consts::PI;

    #[test]
    fn test_axis_matches_shifted_fftfreq() {
        for n in [1usize, 2, 7, 8, 9, 64, 65] {
            let dt = 1e-3;
            let expected = FftProcessor::fft_shift(&FftProcessor::fft_freq(n, dt));
            let axis = frequency_axis(n, dt);
            assert_eq!(axis.len(), n);
            for (a, b) in axis.iter().zip(expected.iter()) {
                assert!((a - b).abs() < 1e-9, "n={n}: {a} != {b}");
            }
            assert_eq!(axis[n / 2], 0.0);
            assert!(axis.windows(2).all(|p| p[0] < p[1]));
        }
    }

    #[test]
    fn test_tone_lands_on_bin() {
        let n = 256;
        let dt = 1.0 / 1024.0;
        let x: Vec<f64> = (0..n)
            .map(|k| (2.0 * PI * 64.0 * k as f64 * dt).cos())
            .collect();
        let (spectrum, freq) = forward_transform_real(&x, dt);
        let peak = spectrum
            .iter()
            .enumerate()
            .filter(|(i, _)| freq[*i] > 0.0)
            .max_by(|a, b| a.1.norm().total_cmp(&b.1.norm()))
            .map(|(i, _)| i)
            .unwrap();
        assert!((freq[peak] - 64.0).abs() < 1e-9);
    }

    #[test]
    fn test_odd_length_round_trip() {
        let x = [0.0, 1.0, 0.0, -1.0, 0.0, 1.0, 0.0, -1.0, 0.0];
        let (spectrum, _) = forward_transform_real(&x, 1.0);
        let back = inverse_transform(&spectrum);
        for (a, b) in back.iter().zip(x.iter()) {
            assert!((a.re - b).abs() < 1e-14);
            assert!(a.im.abs() < 1e-14);
        }
    }

    proptest! {
        #[test]
        fn round_trip_recovers_input(
            values in prop::collection::vec((-10.0f64..10.0, -10.0f64..10.0), 1..300),
            dt in 1e-6f64..10.0,
        ) {
            let x: Vec<Complex> = values.iter().map(|&(re, im)| Complex::new(re, im)).collect();
            let (spectrum, freq) = forward_transform(&x, dt);
            prop_assert_eq!(freq.len(), spectrum.len());
            let back = inverse_transform(&spectrum);
            for (a, b) in back.iter().zip(x.iter()) {
                prop_assert!((a - b).norm() < 1e-12);
            }
        }
    }
}
