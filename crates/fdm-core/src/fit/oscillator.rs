//! Damped harmonic oscillator fit to an averaged power spectrum.
//!
//! ```text
//!            A F0²
//! P(f) = ------------------ + B,   F = π τ0 f,  F0 = π τ0 f0
//!        (F² - F0²)² + F²
//! ```

use super::{standard_errors, Estimate, FitOptions, FitParams};
use crate::error::{Error, Result};
use crate::psd::PsdAccumulator;
use crate::types::BOLTZMANN;
use crate::util::{argmax, eng};
use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use nalgebra::{Const, Dyn, OMatrix, OVector, Owned, Vector4, U4};
use std::f64::consts::PI;
use std::fmt;
use tracing::{debug, info, warn};

/// Point values of the four model parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OscillatorParams {
    /// Peak scale `A` [power units]
    pub amplitude: f64,
    /// Ringdown time `tau0` [s]
    pub tau: f64,
    /// Resonance frequency `f0` [Hz]
    pub f0: f64,
    /// Noise floor `B` [power units]
    pub baseline: f64,
}

impl OscillatorParams {
    /// Model power at frequency `f`
    pub fn power(&self, f: f64) -> f64 {
        let x = PI * self.tau * f;
        let x0 = PI * self.tau * self.f0;
        let d = (x * x - x0 * x0).powi(2) + x * x;
        self.amplitude * x0 * x0 / d + self.baseline
    }

    /// Quality factor `π f0 tau0`
    pub fn quality_factor(&self) -> f64 {
        PI * self.f0 * self.tau
    }

    /// Partial derivatives of [`power`](Self::power) in the order
    /// `(A, B, f0, tau0)`
    fn gradient(&self, f: f64) -> [f64; 4] {
        let (a, tau) = (self.amplitude, self.tau);
        let x = PI * tau * f;
        let x0 = PI * tau * self.f0;
        let (x2, x02) = (x * x, x0 * x0);
        let s = x2 - x02;
        let d = s * s + x2;

        let d_a = x02 / d;
        let d_f0 = a * PI * tau * (2.0 * x0 / d + 4.0 * x0 * x02 * s / (d * d));
        let d_tau = a * (2.0 * x02 / (tau * d) - x02 * (4.0 * s * s + 2.0 * x2) / (tau * d * d));
        [d_a, 1.0, d_f0, d_tau]
    }

    fn to_vector(self) -> Vector4<f64> {
        Vector4::new(self.amplitude, self.baseline, self.f0, self.tau)
    }

    fn from_vector(v: &Vector4<f64>) -> Self {
        Self {
            amplitude: v[0],
            baseline: v[1],
            f0: v[2],
            tau: v[3],
        }
    }

    fn is_finite(&self) -> bool {
        [self.amplitude, self.tau, self.f0, self.baseline]
            .iter()
            .all(|v| v.is_finite())
    }

    /// Every parameter within `tolerance` relative (or absolute near zero)
    fn close_to(&self, other: &Self, tolerance: f64) -> bool {
        let (a, b) = (self.to_vector(), other.to_vector());
        a.iter()
            .zip(b.iter())
            .all(|(x, y)| (x - y).abs() <= tolerance * x.abs().max(y.abs()).max(f64::MIN_POSITIVE))
    }
}

impl fmt::Display for OscillatorParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "A = {}, tau0 = {} s, f0 = {} Hz, B = {}",
            eng(self.amplitude),
            eng(self.tau),
            eng(self.f0),
            eng(self.baseline)
        )
    }
}

/// Weighted residuals `(model - P) w`
struct SpectrumProblem<'a> {
    freq: &'a [f64],
    power: &'a [f64],
    weights: Vec<f64>,
    params: OscillatorParams,
}

impl LeastSquaresProblem<f64, Dyn, U4> for SpectrumProblem<'_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, U4>;
    type ParameterStorage = Owned<f64, U4>;

    fn set_params(&mut self, x: &Vector4<f64>) {
        self.params = OscillatorParams::from_vector(x);
    }

    fn params(&self) -> Vector4<f64> {
        self.params.to_vector()
    }

    fn residuals(&self) -> Option<OVector<f64, Dyn>> {
        let n = self.freq.len();
        Some(OVector::<f64, Dyn>::from_fn_generic(Dyn(n), Const::<1>, |i, _| {
            (self.params.power(self.freq[i]) - self.power[i]) * self.weights[i]
        }))
    }

    fn jacobian(&self) -> Option<OMatrix<f64, Dyn, U4>> {
        let n = self.freq.len();
        let gradients: Vec<[f64; 4]> = self.freq.iter().map(|&f| self.params.gradient(f)).collect();
        Some(OMatrix::<f64, Dyn, U4>::from_fn_generic(
            Dyn(n),
            Const::<4>,
            |i, j| gradients[i][j] * self.weights[i],
        ))
    }
}

/// Fitted oscillator parameters, derived physical quantities and fit
/// statistics. Built only by [`OscillatorFit::fit`].
#[derive(Debug, Clone, PartialEq)]
pub struct OscillatorFit {
    amplitude: Estimate,
    tau: Estimate,
    f0: Estimate,
    baseline: Estimate,
    quality_factor: Estimate,
    damping: Estimate,
    spring_constant: Estimate,
    temperature: f64,
    n_avg: usize,
    bins: usize,
    chi_squared_reduced: f64,
    evaluations: usize,
    guess: OscillatorParams,
}

impl OscillatorFit {
    /// Fit the averaged spectrum of `psd` at temperature `temperature` [K].
    pub fn fit(psd: &PsdAccumulator, temperature: f64, options: &FitOptions) -> Result<Self> {
        if !(temperature > 0.0 && temperature.is_finite()) {
            return Err(Error::invalid(format!(
                "temperature must be positive, got {temperature}"
            )));
        }
        if psd.count() < 2 {
            return Err(Error::InsufficientData {
                needed: 2,
                available: psd.count(),
            });
        }

        let (freq, power): (Vec<f64>, Vec<f64>) = psd
            .frequency_axis()
            .iter()
            .zip(psd.averaged_power())
            .filter(|&(&f, &p)| {
                f > 0.0 && f.is_finite() && p > 0.0 && p.is_finite() && options.admits(f)
            })
            .map(|(&f, &p)| (f, p))
            .unzip();
        if freq.len() <= 4 {
            return Err(Error::InsufficientData {
                needed: 5,
                available: freq.len(),
            });
        }

        let guess = initial_guess(&freq, &power)?;
        debug!(%guess, bins = freq.len(), "oscillator initial guess");

        let weight = (psd.count() as f64).sqrt();
        let data_weights = power.iter().map(|p| weight / p).collect();
        let mut pass = solve(&freq, &power, data_weights, guess)?;
        let mut evaluations = pass.evaluations;

        // Refit weighted by the model so low-fluctuating bins carry no extra
        // weight; repeat until the parameters settle.
        for _ in 0..MAX_REWEIGHTS {
            let weights = model_weights(&freq, &pass.params, weight)?;
            let next = solve(&freq, &power, weights, pass.params)?;
            evaluations += next.evaluations;
            let settled = next.params.close_to(&pass.params, REWEIGHT_TOLERANCE);
            pass = next;
            if settled {
                break;
            }
        }
        let Pass {
            params: best,
            errors,
            chi_squared_reduced,
            ..
        } = pass;

        // the model depends on f0 and tau0 only through their squares
        let amplitude = Estimate::new(best.amplitude, errors[0]);
        let baseline = Estimate::new(best.baseline, errors[1]);
        let f0 = Estimate::new(best.f0.abs(), errors[2]);
        let tau = Estimate::new(best.tau.abs(), errors[3]);

        let scale = options.power_scale;
        let a_si = amplitude.value * scale;
        let (rel_a, rel_f0, rel_tau) = (
            amplitude.relative_error(),
            f0.relative_error(),
            tau.relative_error(),
        );
        let q = PI * f0.value * tau.value;
        let gamma = BOLTZMANN * temperature / (PI * PI * f0.value * f0.value * a_si);
        let k = 2.0 * tau.value * BOLTZMANN * temperature / a_si;

        let fit = Self {
            amplitude,
            tau,
            f0,
            baseline,
            quality_factor: Estimate::new(q, q * rel_f0.hypot(rel_tau)),
            damping: Estimate::new(gamma, gamma * (2.0 * rel_f0).hypot(rel_a)),
            spring_constant: Estimate::new(k, k * rel_tau.hypot(rel_a)),
            temperature,
            n_avg: psd.count(),
            bins: freq.len(),
            chi_squared_reduced,
            evaluations,
            guess,
        };
        info!(
            f0 = fit.f0.value,
            q = fit.quality_factor.value,
            k = fit.spring_constant.value,
            chi2 = chi_squared_reduced,
            "oscillator fit converged"
        );
        Ok(fit)
    }

    /// Peak scale `A`
    pub fn amplitude(&self) -> Estimate {
        self.amplitude
    }

    /// Ringdown time `tau0` [s]
    pub fn tau(&self) -> Estimate {
        self.tau
    }

    /// Resonance frequency `f0` [Hz]
    pub fn f0(&self) -> Estimate {
        self.f0
    }

    /// Noise floor `B`
    pub fn baseline(&self) -> Estimate {
        self.baseline
    }

    pub fn quality_factor(&self) -> Estimate {
        self.quality_factor
    }

    /// Damping coefficient `Γ = kB T / (π² f0² A)` [kg/s]
    pub fn damping(&self) -> Estimate {
        self.damping
    }

    /// Spring constant `k = 2 tau0 kB T / A` [N/m]
    pub fn spring_constant(&self) -> Estimate {
        self.spring_constant
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn n_avg(&self) -> usize {
        self.n_avg
    }

    /// Number of spectral bins fit
    pub fn bins(&self) -> usize {
        self.bins
    }

    pub fn chi_squared_reduced(&self) -> f64 {
        self.chi_squared_reduced
    }

    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    pub fn initial_guess(&self) -> OscillatorParams {
        self.guess
    }

    /// Best-fit parameters as point values
    pub fn params(&self) -> OscillatorParams {
        OscillatorParams {
            amplitude: self.amplitude.value,
            tau: self.tau.value,
            f0: self.f0.value,
            baseline: self.baseline.value,
        }
    }
}

/// Reweighting passes after the first, data-weighted fit
const MAX_REWEIGHTS: usize = 4;

/// Relative parameter change below which reweighting stops
const REWEIGHT_TOLERANCE: f64 = 1e-8;

/// Outcome of one weighted solve
struct Pass {
    params: OscillatorParams,
    errors: Vec<f64>,
    chi_squared_reduced: f64,
    evaluations: usize,
}

/// `sqrt(n_avg) / P(f; params)`, the inverse standard deviation of an
/// averaged periodogram bin
fn model_weights(freq: &[f64], params: &OscillatorParams, weight: f64) -> Result<Vec<f64>> {
    freq.iter()
        .map(|&f| {
            let model = params.power(f);
            if model > 0.0 && model.is_finite() {
                Ok(weight / model)
            } else {
                Err(Error::FitDidNotConverge {
                    reason: format!("model power {model} at {f} Hz cannot weight the fit"),
                    guess: FitParams::Oscillator(*params),
                })
            }
        })
        .collect()
}

fn solve(
    freq: &[f64],
    power: &[f64],
    weights: Vec<f64>,
    start: OscillatorParams,
) -> Result<Pass> {
    let problem = SpectrumProblem {
        freq,
        power,
        weights,
        params: start,
    };
    let (problem, report) = LevenbergMarquardt::new().minimize(problem);
    let best = problem.params;

    if !report.termination.was_successful() {
        warn!(termination = ?report.termination, "oscillator fit failed");
        return Err(Error::FitDidNotConverge {
            reason: format!("{:?}", report.termination),
            guess: FitParams::Oscillator(best),
        });
    }
    if !best.is_finite() {
        return Err(Error::FitDidNotConverge {
            reason: "non-finite parameters".to_string(),
            guess: FitParams::Oscillator(best),
        });
    }

    let (jacobian, residuals) = match (problem.jacobian(), problem.residuals()) {
        (Some(j), Some(r)) => (j, r),
        _ => {
            return Err(Error::FitDidNotConverge {
                reason: "model could not be evaluated at the optimum".to_string(),
                guess: FitParams::Oscillator(best),
            })
        }
    };
    let (errors, chi_squared_reduced) =
        standard_errors(jacobian.as_slice(), freq.len(), 4, residuals.as_slice()).ok_or_else(
            || Error::FitDidNotConverge {
                reason: "singular covariance".to_string(),
                guess: FitParams::Oscillator(best),
            },
        )?;
    debug!(%best, chi2 = chi_squared_reduced, "oscillator pass");
    Ok(Pass {
        params: best,
        errors,
        chi_squared_reduced,
        evaluations: report.number_of_evaluations,
    })
}

/// `A = max P`, `f0` at the maximum, `B = min(P[0], P[last])`,
/// `tau0 = 1 / (2 |f_half - f_peak|)` with `f_half` the frequency of the
/// sample nearest half the maximum.
fn initial_guess(freq: &[f64], power: &[f64]) -> Result<OscillatorParams> {
    let peak = argmax(power).ok_or(Error::InsufficientData {
        needed: 1,
        available: 0,
    })?;
    let amplitude = power[peak];
    let f_peak = freq[peak];
    let baseline = power[0].min(power[power.len() - 1]);

    let half = amplitude / 2.0;
    let nearest = power
        .iter()
        .enumerate()
        .fold((0, f64::INFINITY), |(best, distance), (i, p)| {
            let d = (p - half).abs();
            if d < distance {
                (i, d)
            } else {
                (best, distance)
            }
        })
        .0;
    let guess = OscillatorParams {
        amplitude,
        tau: 1.0 / (2.0 * (freq[nearest] - f_peak).abs()),
        f0: f_peak,
        baseline,
    };
    if !guess.tau.is_finite() {
        return Err(Error::FitDidNotConverge {
            reason: "peak has no half-maximum point".to_string(),
            guess: FitParams::Oscillator(guess),
        });
    }
    Ok(guess)
}

impl fmt::Display for OscillatorFit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Oscillator fit")?;
        writeln!(f, "{}", "═".repeat(50))?;
        writeln!(
            f,
            "model: P(f) = A F0^2 / ((F^2 - F0^2)^2 + F^2) + B, F = pi tau0 f"
        )?;
        writeln!(
            f,
            "{} bins, n_avg = {}, T = {} K, chi2_red = {:.3}, {} evaluations",
            self.bins, self.n_avg, self.temperature, self.chi_squared_reduced, self.evaluations
        )?;
        writeln!(f, "f0    = {} Hz", self.f0)?;
        writeln!(f, "tau0  = {} s", self.tau)?;
        writeln!(f, "A     = {}", self.amplitude)?;
        writeln!(f, "B     = {}", self.baseline)?;
        writeln!(f, "Q     = {}", self.quality_factor)?;
        writeln!(f, "Gamma = {} kg/s", self.damping)?;
        writeln!(f, "k     = {} N/m", self.spring_constant)
    }
}
