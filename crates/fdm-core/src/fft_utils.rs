//! FFT plumbing over `rustfft`.
//!
//! [`FftProcessor`] caches forward and inverse plans for one transform size.
//! The shift helpers follow the numpy convention: `fft_shift` rotates the
//! zero-frequency bin to index `n / 2`, `ifft_shift` undoes it. For odd `n`
//! the two are different rotations.

use crate::types::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// FFT processor with cached plans for a fixed size
pub struct FftProcessor {
    size: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

impl FftProcessor {
    /// Plan forward and inverse transforms of length `size`
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::<f64>::new();
        let forward = planner.plan_fft_forward(size);
        let inverse = planner.plan_fft_inverse(size);
        Self {
            size,
            forward,
            inverse,
        }
    }

    /// Transform size
    pub fn size(&self) -> usize {
        self.size
    }

    /// Unnormalized forward transform in place
    pub fn fft_inplace(&self, buffer: &mut [Complex]) {
        debug_assert_eq!(buffer.len(), self.size);
        self.forward.process(buffer);
    }

    /// Inverse transform in place, normalized by `1/n`
    pub fn ifft_inplace(&self, buffer: &mut [Complex]) {
        debug_assert_eq!(buffer.len(), self.size);
        self.inverse.process(buffer);
        if self.size > 0 {
            let scale = 1.0 / self.size as f64;
            for x in buffer.iter_mut() {
                *x *= scale;
            }
        }
    }

    /// Move the zero-frequency bin to the center (`numpy.fft.fftshift`)
    pub fn fft_shift<T: Clone>(data: &[T]) -> Vec<T> {
        let mut out = data.to_vec();
        out.rotate_right(data.len() / 2);
        out
    }

    /// Inverse of [`FftProcessor::fft_shift`] (`numpy.fft.ifftshift`)
    pub fn ifft_shift<T: Clone>(data: &[T]) -> Vec<T> {
        let mut out = data.to_vec();
        out.rotate_left(data.len() / 2);
        out
    }

    /// Unshifted frequency bins (`numpy.fft.fftfreq`) for `n` points at `dt`
    pub fn fft_freq(n: usize, dt: f64) -> Vec<f64> {
        let resolution = 1.0 / (n as f64 * dt);
        (0..n)
            .map(|i| {
                let idx = if i < n.div_ceil(2) {
                    i as i64
                } else {
                    i as i64 - n as i64
                };
                idx as f64 * resolution
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shift_even() {
        let x = [0, 1, 2, 3];
        assert_eq!(FftProcessor::fft_shift(&x), vec![2, 3, 0, 1]);
        assert_eq!(FftProcessor::ifft_shift(&[2, 3, 0, 1]), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_shift_odd() {
        let x = [0, 1, 2, -2, -1];
        let shifted = FftProcessor::fft_shift(&x);
        assert_eq!(shifted, vec![-2, -1, 0, 1, 2]);
        assert_eq!(FftProcessor::ifft_shift(&shifted), x.to_vec());
    }

    #[test]
    fn test_fft_freq_matches_numpy() {
        let f = FftProcessor::fft_freq(5, 0.1);
        let expected = [0.0, 2.0, 4.0, -4.0, -2.0];
        for (a, b) in f.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-12, "{a} != {b}");
        }
        let f = FftProcessor::fft_freq(4, 0.25);
        let expected = [0.0, 1.0, -2.0, -1.0];
        for (a, b) in f.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-12, "{a} != {b}");
        }
    }

    #[test]
    fn test_inverse_is_normalized() {
        let proc = FftProcessor::new(8);
        let original: Vec<Complex> = (0..8).map(|i| Complex::new(i as f64, -(i as f64))).collect();
        let mut buf = original.clone();
        proc.fft_inplace(&mut buf);
        proc.ifft_inplace(&mut buf);
        for (a, b) in buf.iter().zip(original.iter()) {
            assert!((a - b).norm() < 1e-12);
        }
    }
}
