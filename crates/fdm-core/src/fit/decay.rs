//! Exponential decay fit to a demodulated amplitude.

use super::{standard_errors, Estimate, FitParams};
use crate::error::{Error, Result};
use crate::signal::Signal;
use crate::statistics::SeriesStats;
use crate::store::{write_with_abscissa, ArrayData, ContainerHandle, Metadata, RecordStore};
use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use nalgebra::{Const, Dyn, OMatrix, OVector, Owned, Vector3, U3};
use std::fmt;
use tracing::{debug, info};

/// Store paths written by [`DecayFit::save`]
pub const DECAY_TIME: &str = "workup/fit/exp/time";
pub const DECAY_CALC: &str = "workup/fit/exp/y_calc";
pub const DECAY_RESID: &str = "workup/fit/exp/y_resid";

/// `(model - a) / sigma` for `a0 exp(-t/tau) + a1`
struct DecayProblem<'a> {
    time: &'a [f64],
    amplitude: &'a [f64],
    sigma: f64,
    params: Vector3<f64>,
}

impl DecayProblem<'_> {
    fn model(&self, t: f64) -> f64 {
        let (a0, tau, a1) = (self.params[0], self.params[1], self.params[2]);
        a0 * (-t / tau).exp() + a1
    }
}

impl LeastSquaresProblem<f64, Dyn, U3> for DecayProblem<'_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, U3>;
    type ParameterStorage = Owned<f64, U3>;

    fn set_params(&mut self, x: &Vector3<f64>) {
        self.params = *x;
    }

    fn params(&self) -> Vector3<f64> {
        self.params
    }

    fn residuals(&self) -> Option<OVector<f64, Dyn>> {
        let n = self.time.len();
        Some(OVector::<f64, Dyn>::from_fn_generic(Dyn(n), Const::<1>, |i, _| {
            (self.model(self.time[i]) - self.amplitude[i]) / self.sigma
        }))
    }

    fn jacobian(&self) -> Option<OMatrix<f64, Dyn, U3>> {
        let (a0, tau) = (self.params[0], self.params[1]);
        let n = self.time.len();
        Some(OMatrix::<f64, Dyn, U3>::from_fn_generic(
            Dyn(n),
            Const::<3>,
            |i, j| {
                let t = self.time[i];
                let e = (-t / tau).exp();
                let d = match j {
                    0 => e,
                    1 => a0 * e * t / (tau * tau),
                    _ => 1.0,
                };
                d / self.sigma
            },
        ))
    }
}

/// Result of [`fit_amplitude_decay`]
#[derive(Debug, Clone, PartialEq)]
pub struct DecayFit {
    pub a0: Estimate,
    pub tau: Estimate,
    pub a1: Estimate,
    /// Per-point uncertainty used in the second pass
    pub sigma: f64,
    pub chi_squared_reduced: f64,
    pub time: Vec<f64>,
    pub fitted: Vec<f64>,
    pub residual: Vec<f64>,
    pub unit: String,
}

/// One weighted solve, returning the optimum, errors and reduced chi-square
fn solve(
    time: &[f64],
    amplitude: &[f64],
    sigma: f64,
    start: Vector3<f64>,
) -> Result<(Vector3<f64>, Vec<f64>, f64)> {
    let guess = |p: &Vector3<f64>| FitParams::Decay {
        a0: p[0],
        tau: p[1],
        a1: p[2],
    };

    let problem = DecayProblem {
        time,
        amplitude,
        sigma,
        params: start,
    };
    let (problem, report) = LevenbergMarquardt::new().minimize(problem);
    let best = problem.params;
    if !report.termination.was_successful() || best.iter().any(|v| !v.is_finite()) {
        return Err(Error::FitDidNotConverge {
            reason: format!("{:?}", report.termination),
            guess: guess(&best),
        });
    }

    let (jacobian, residuals) = match (problem.jacobian(), problem.residuals()) {
        (Some(j), Some(r)) => (j, r),
        _ => {
            return Err(Error::FitDidNotConverge {
                reason: "model could not be evaluated at the optimum".to_string(),
                guess: guess(&best),
            })
        }
    };
    let (errors, reduced) = standard_errors(jacobian.as_slice(), time.len(), 3, residuals.as_slice())
        .ok_or_else(|| Error::FitDidNotConverge {
            reason: "singular covariance".to_string(),
            guess: guess(&best),
        })?;
    Ok((best, errors, reduced))
}

/// Fit `a(t) = a0 exp(-t/tau) + a1` to the amplitude of a signal that has
/// been through [`Signal::ifft`].
///
/// The first pass uses unit uncertainties. The second restarts from the same
/// guess with the standard deviation of the first-pass residuals as the
/// per-point uncertainty.
pub fn fit_amplitude_decay(signal: &Signal) -> Result<DecayFit> {
    let (amplitude, time) = match (signal.amplitude(), signal.analytic_time()) {
        (Some(a), Some(t)) => (a, t),
        _ => {
            return Err(Error::PrerequisiteMissing {
                stage: "fit_amplitude_decay",
                requires: "ifft",
            })
        }
    };
    if amplitude.len() <= 3 {
        return Err(Error::InsufficientData {
            needed: 4,
            available: amplitude.len(),
        });
    }

    let (first, last) = (amplitude[0], amplitude[amplitude.len() - 1]);
    let span = time[time.len() - 1] - time[0];
    let start = Vector3::new(first - last, (span / 3.0).max(signal.dt()), last);
    debug!(a0 = start[0], tau = start[1], a1 = start[2], "decay initial guess");

    let (pass1, _, _) = solve(time, amplitude, 1.0, start)?;
    let fitted1: Vec<f64> = time
        .iter()
        .map(|&t| pass1[0] * (-t / pass1[1]).exp() + pass1[2])
        .collect();
    let resid1: Vec<f64> = fitted1.iter().zip(amplitude).map(|(m, a)| m - a).collect();
    let mut sigma = SeriesStats::compute(&resid1).std;
    if sigma <= 0.0 || !sigma.is_finite() {
        sigma = 1.0;
    }

    let (best, errors, chi_squared_reduced) = solve(time, amplitude, sigma, start)?;
    let fitted: Vec<f64> = time
        .iter()
        .map(|&t| best[0] * (-t / best[1]).exp() + best[2])
        .collect();
    let residual = fitted.iter().zip(amplitude).map(|(m, a)| (m - a) / sigma).collect();

    let fit = DecayFit {
        a0: Estimate::new(best[0], errors[0]),
        tau: Estimate::new(best[1], errors[1]),
        a1: Estimate::new(best[2], errors[2]),
        sigma,
        chi_squared_reduced,
        time: time.to_vec(),
        fitted,
        residual,
        unit: signal.unit().to_string(),
    };
    info!(tau = fit.tau.value, a0 = fit.a0.value, "amplitude decay fit");
    Ok(fit)
}

impl DecayFit {
    /// Write the time axis, fitted curve and scaled residuals, with the
    /// parameters as metadata on the fitted curve
    pub fn save<S: RecordStore + ?Sized>(&self, store: &mut S, handle: ContainerHandle) -> Result<()> {
        store.write_array(
            handle,
            DECAY_TIME,
            ArrayData::Real(self.time.clone()),
            Metadata::new()
                .with("name", "t")
                .with("unit", "s")
                .with("label", "t [s]")
                .with("help", "time"),
        )?;
        write_with_abscissa(
            store,
            handle,
            DECAY_CALC,
            ArrayData::Real(self.fitted.clone()),
            Metadata::new()
                .with("name", "a (calc)")
                .with("unit", self.unit.as_str())
                .with("label", format!("a (calc) [{}]", self.unit))
                .with("help", "cantilever amplitude (calculated)")
                .with("title", self.title())
                .with("a0", self.a0.value)
                .with("a0_stderr", self.a0.stderr)
                .with("tau", self.tau.value)
                .with("tau_stderr", self.tau.stderr)
                .with("a1", self.a1.value)
                .with("a1_stderr", self.a1.stderr)
                .with("abscissa", DECAY_TIME),
        )?;
        write_with_abscissa(
            store,
            handle,
            DECAY_RESID,
            ArrayData::Real(self.residual.clone()),
            Metadata::new()
                .with("name", "a (resid)")
                .with("unit", "")
                .with("label", "a (resid)")
                .with("help", "cantilever amplitude (residual / sigma)")
                .with("abscissa", DECAY_TIME),
        )
    }

    fn title(&self) -> String {
        format!(
            "a0 = {:.6} +/- {:.6}, tau = {:.6} +/- {:.6}, a1 = {:.6} +/- {:.6}",
            self.a0.value,
            self.a0.stderr,
            self.tau.value,
            self.tau.stderr,
            self.a1.value,
            self.a1.stderr
        )
    }
}

impl fmt::Display for DecayFit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "a(t) = a0*exp(-t/tau) + a1")?;
        writeln!(f, "{}", self.title())?;
        write!(
            f,
            "sigma = {} {}, chi2_red = {:.3}",
            crate::util::eng(self.sigma),
            self.unit,
            self.chi_squared_reduced
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::f64::consts::PI;

    fn decaying(n: usize, tau: f64) -> Signal {
        let dt = 1.0 / 50e3;
        let samples = (0..n)
            .map(|k| {
                let t = k as f64 * dt;
                (100.0 * (-t / tau).exp() + 5.0) * (2.0 * PI * 2e3 * t).cos()
            })
            .collect();
        Signal::new(samples, dt, "x", "nm").unwrap()
    }

    fn analyzed(n: usize, tau: f64) -> Signal {
        let mut s = decaying(n, tau);
        s.cyclicize(1e-3).unwrap();
        s.fft().unwrap();
        s.hilbert().unwrap();
        s.bandpass(1e3, 50).unwrap();
        s.ripple_trim(10e-3).unwrap();
        s.ifft().unwrap();
        s
    }

    #[test]
    fn test_recovers_decay_constant() {
        let s = analyzed(16_384, 0.1);
        let fit = fit_amplitude_decay(&s).unwrap();
        assert!((fit.tau.value - 0.1).abs() < 0.01, "{}", fit.tau.value);
        assert!((fit.a0.value - 100.0).abs() < 10.0, "{}", fit.a0.value);
        assert!(fit.sigma > 0.0);
        assert_eq!(fit.fitted.len(), s.amplitude().unwrap().len());
    }

    #[test]
    fn test_requires_amplitude() {
        let s = decaying(256, 0.1);
        assert!(matches!(
            fit_amplitude_decay(&s),
            Err(Error::PrerequisiteMissing { requires: "ifft", .. })
        ));
    }

    #[test]
    fn test_save_writes_curve_and_residual() {
        let s = analyzed(8192, 0.05);
        let fit = fit_amplitude_decay(&s).unwrap();
        let mut store = MemoryStore::new();
        let h = store.create_container("decay").unwrap();
        fit.save(&mut store, h).unwrap();
        let (_, meta) = store.read_array(h, DECAY_CALC).unwrap();
        assert_eq!(meta.get_text("abscissa"), Some(DECAY_TIME));
        assert!(meta.get_number("tau").is_some());
        assert!(fit.to_string().starts_with("a(t) = a0*exp(-t/tau) + a1"));
    }
}
