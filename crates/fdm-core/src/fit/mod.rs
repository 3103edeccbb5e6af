//! Model Fits
//!
//! Weighted nonlinear least squares on top of `levenberg-marquardt`:
//!
//! - [`OscillatorFit`]: damped harmonic oscillator power spectrum fit to an
//!   averaged PSD, with derived quality factor, damping and spring constant.
//! - [`DecayFit`]: `a0 exp(-t/tau) + a1` fit to a demodulated amplitude.
//!
//! Standard errors come from `(JᵀJ)⁻¹ χ²_red` evaluated at the optimum, where
//! `J` is the Jacobian of the weighted residuals.

mod decay;
mod oscillator;

pub use decay::{fit_amplitude_decay, DecayFit};
pub use oscillator::{OscillatorFit, OscillatorParams};

use nalgebra::DMatrix;
use std::fmt;

/// A fitted or derived value and its standard error
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub value: f64,
    pub stderr: f64,
}

impl Estimate {
    pub fn new(value: f64, stderr: f64) -> Self {
        Self { value, stderr }
    }

    /// `stderr / |value|`
    pub fn relative_error(&self) -> f64 {
        self.stderr / self.value.abs()
    }

    /// Whether `truth` lies within `k` standard errors
    pub fn covers(&self, truth: f64, k: f64) -> bool {
        (self.value - truth).abs() <= k * self.stderr
    }
}

impl fmt::Display for Estimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ± {}",
            crate::util::eng(self.value),
            crate::util::eng(self.stderr)
        )
    }
}

/// Parameters a solver last held, carried by
/// [`Error::FitDidNotConverge`](crate::Error::FitDidNotConverge)
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FitParams {
    Oscillator(OscillatorParams),
    Decay { a0: f64, tau: f64, a1: f64 },
}

impl fmt::Display for FitParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FitParams::Oscillator(p) => write!(f, "{p}"),
            FitParams::Decay { a0, tau, a1 } => write!(f, "a0 = {a0}, tau = {tau} s, a1 = {a1}"),
        }
    }
}

/// Restrict the bins an oscillator fit sees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOptions {
    /// Lowest frequency included [Hz]
    pub f_min: Option<f64>,
    /// Highest frequency included [Hz]
    pub f_max: Option<f64>,
    /// Factor converting the PSD to m²/Hz for the derived quantities
    pub power_scale: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            f_min: None,
            f_max: None,
            power_scale: 1.0,
        }
    }
}

impl FitOptions {
    pub fn band(f_min: f64, f_max: f64) -> Self {
        Self {
            f_min: Some(f_min),
            f_max: Some(f_max),
            ..Self::default()
        }
    }

    pub(crate) fn admits(&self, f: f64) -> bool {
        self.f_min.map_or(true, |lo| f >= lo) && self.f_max.map_or(true, |hi| f <= hi)
    }
}

/// Standard errors and reduced chi-square from a column-major weighted
/// Jacobian (`rows x params`) and the weighted residuals.
///
/// `None` when there are no degrees of freedom or `JᵀJ` is singular.
pub(crate) fn standard_errors(
    jacobian: &[f64],
    rows: usize,
    params: usize,
    residuals: &[f64],
) -> Option<(Vec<f64>, f64)> {
    if rows <= params {
        return None;
    }
    let j = DMatrix::from_column_slice(rows, params, jacobian);
    let chi_squared: f64 = residuals.iter().map(|r| r * r).sum();
    let reduced = chi_squared / (rows - params) as f64;

    let covariance = (j.transpose() * &j).try_inverse()? * reduced;
    let errors: Vec<f64> = (0..params).map(|i| covariance[(i, i)].sqrt()).collect();
    if errors.iter().all(|e| e.is_finite()) {
        Some((errors, reduced))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_coverage() {
        let e = Estimate::new(10.0, 0.5);
        assert!(e.covers(10.4, 1.0));
        assert!(!e.covers(11.0, 1.0));
        assert!((e.relative_error() - 0.05).abs() < 1e-15);
    }

    #[test]
    fn test_band() {
        let all = FitOptions::default();
        assert!(all.admits(-1.0));
        let band = FitOptions::band(10.0, 20.0);
        assert!(band.admits(10.0) && band.admits(20.0));
        assert!(!band.admits(9.99) && !band.admits(20.01));
    }

    #[test]
    fn test_straight_line_errors() {
        // y = m x with unit weights; var(m) = chi2_red / sum(x^2)
        let x = [1.0, 2.0, 3.0, 4.0];
        let residuals = [0.1, -0.1, 0.1, -0.1];
        let (errors, reduced) = standard_errors(&x, 4, 1, &residuals).unwrap();
        assert!((reduced - 0.04 / 3.0).abs() < 1e-15);
        assert!((errors[0] - (reduced / 30.0).sqrt()).abs() < 1e-15);
    }

    #[test]
    fn test_no_degrees_of_freedom() {
        assert!(standard_errors(&[1.0, 2.0], 2, 2, &[0.0, 0.0]).is_none());
        assert!(standard_errors(&[0.0; 3], 3, 1, &[1.0; 3]).is_none());
    }
}
