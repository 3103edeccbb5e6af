//! Edge ("cyclicize") window.

use crate::error::{Error, Result};
use std::f64::consts::PI;

/// Symmetric Blackman window of length `size` (`scipy.signal.blackman`)
pub fn blackman(size: usize) -> Vec<f64> {
    match size {
        0 => Vec::new(),
        1 => vec![1.0],
        _ => {
            let m = (size - 1) as f64;
            (0..size)
                .map(|i| {
                    let n = i as f64 / m;
                    0.42 - 0.5 * (2.0 * PI * n).cos() + 0.08 * (4.0 * PI * n).cos()
                })
                .collect()
        }
    }
}

/// Rising Blackman half, flat plateau of 1.0, falling Blackman half.
///
/// The halves come from one symmetric Blackman window of length
/// `2 * rise_samples`, so the result is mirror-symmetric.
pub fn generate_window(total_length: usize, rise_samples: usize) -> Result<Vec<f64>> {
    let edges = rise_samples
        .checked_mul(2)
        .filter(|&e| e <= total_length)
        .ok_or_else(|| {
            Error::invalid(format!(
                "window rise of {rise_samples} samples needs {} samples, signal has {total_length}",
                rise_samples.saturating_mul(2)
            ))
        })?;

    let full = blackman(edges);
    let mut window = Vec::with_capacity(total_length);
    window.extend_from_slice(&full[..rise_samples]);
    window.extend(std::iter::repeat(1.0).take(total_length - edges));
    window.extend_from_slice(&full[rise_samples..]);
    Ok(window)
}
