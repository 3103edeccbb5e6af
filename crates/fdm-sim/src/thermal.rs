//! Thermal Oscillator Simulation
//!
//! Brownian motion of a damped harmonic oscillator, integrated in reduced
//! units where the resonance angular frequency is one:
//!
//! ```text
//! dx/dτ = p
//! dp/dτ = -x - p/Q + F(τ)        F ~ N(0, 1) per step
//! ```
//!
//! Forward Euler with `dτ = 1/steps_per_cycle`. [`thermal_constants`]
//! converts the reduced position to meters, so the long-run spectrum matches
//! the thermomechanical noise of a cantilever at temperature `T`.

use fdm_core::fit::OscillatorParams;
use fdm_core::types::BOLTZMANN;
use fdm_core::util::nearest_power_of_two;
use fdm_core::{Error, PsdAccumulator, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp1, Normal};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::{debug, info};

/// Meters to picometers
const PM_PER_M: f64 = 1e12;

/// Thermal position and momentum scales `(x_th [m], p_th [kg m/s])` for a
/// reduced time step `dtau`.
///
/// `x_th = sqrt(4 kB T / (k Q dtau))` and `p_th = (k / ω0) x_th`.
pub fn thermal_constants(
    temperature: f64,
    spring_constant: f64,
    f0: f64,
    q: f64,
    dtau: f64,
) -> (f64, f64) {
    let x_th = (4.0 * BOLTZMANN * temperature / (spring_constant * q * dtau)).sqrt();
    let w0 = 2.0 * PI * f0;
    (x_th, spring_constant / w0 * x_th)
}

/// Cantilever and detector for [`ThermalOscillator`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermalConfig {
    /// Temperature [K]
    pub temperature: f64,
    /// Spring constant [N/m]
    pub spring_constant: f64,
    /// Resonance frequency [Hz]
    pub f0: f64,
    /// Quality factor
    pub q: f64,
    /// Detector noise floor [pm²/Hz]
    pub detector_level: f64,
    /// Integration steps per unit reduced time
    pub steps_per_cycle: usize,
    /// Number of segments to average
    pub segments: usize,
    /// Burn-in length in units of `Q` reduced time
    pub burn_in: f64,
    /// Length of each segment in units of `Q` reduced time
    pub segment_span: f64,
    pub seed: u64,
}

impl Default for ThermalConfig {
    fn default() -> Self {
        Self {
            temperature: 300.0,
            spring_constant: 2.8,
            f0: 100e3,
            q: 50.0,
            detector_level: 1e-5,
            steps_per_cycle: 128,
            segments: 8,
            burn_in: 10.0,
            segment_span: 16.0,
            seed: 0,
        }
    }
}

/// Simulated position record split into segments
#[derive(Debug, Clone, PartialEq)]
pub struct ThermalRecord {
    /// Position plus detector noise [pm], one row per segment
    pub segments: Vec<Vec<f64>>,
    /// Sample interval [s]
    pub dt: f64,
    /// Position scale [m]
    pub x_thermal: f64,
    /// Momentum scale [kg m/s]
    pub p_thermal: f64,
}

impl ThermalRecord {
    /// Average the segments' power spectra [pm²/Hz]
    pub fn psd(&self) -> Result<PsdAccumulator> {
        let mut psd = PsdAccumulator::new();
        psd.average_segments(&self.segments, self.dt, "x", "pm", None)?;
        Ok(psd)
    }
}

/// Euler-integrated thermally driven oscillator
#[derive(Debug, Clone)]
pub struct ThermalOscillator {
    config: ThermalConfig,
}

impl ThermalOscillator {
    pub fn new(config: ThermalConfig) -> Result<Self> {
        let positive = [
            ("temperature", config.temperature),
            ("spring_constant", config.spring_constant),
            ("f0", config.f0),
            ("q", config.q),
            ("segment_span", config.segment_span),
        ];
        if let Some((name, value)) = positive.iter().find(|(_, v)| !(*v > 0.0 && v.is_finite())) {
            return Err(Error::InvalidConfiguration(format!(
                "{name} must be positive, got {value}"
            )));
        }
        if config.steps_per_cycle == 0 || config.segments == 0 {
            return Err(Error::InvalidConfiguration(
                "steps_per_cycle and segments must be at least 1".to_string(),
            ));
        }
        if !(config.burn_in >= 0.0 && config.detector_level >= 0.0) {
            return Err(Error::InvalidConfiguration(
                "burn_in and detector_level must be non-negative".to_string(),
            ));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &ThermalConfig {
        &self.config
    }

    /// Reduced time step
    pub fn dtau(&self) -> f64 {
        1.0 / self.config.steps_per_cycle as f64
    }

    /// Sample interval in seconds
    pub fn dt(&self) -> f64 {
        self.dtau() / (2.0 * PI * self.config.f0)
    }

    /// Reduced positions for the full run, starting at rest
    fn integrate(&self, rng: &mut StdRng) -> Vec<f64> {
        let c = &self.config;
        let dtau = self.dtau();
        let duration = c.q * (c.burn_in + c.segments as f64 * c.segment_span);
        let steps = (duration * c.steps_per_cycle as f64).ceil() as usize;

        let mut positions = Vec::with_capacity(steps);
        let (mut x, mut p) = (0.0_f64, 0.0_f64);
        for _ in 0..steps {
            positions.push(x);
            let force: f64 = rng.sample(rand_distr::StandardNormal);
            let (dx, dp) = (p, -x - p / c.q + force);
            x += dtau * dx;
            p += dtau * dp;
        }
        positions
    }

    /// Run the simulation, keep the last power-of-two samples and split them
    /// into `segments` rows with detector noise added.
    pub fn simulate(&self) -> Result<ThermalRecord> {
        let c = &self.config;
        let mut rng = StdRng::seed_from_u64(c.seed);
        let (x_thermal, p_thermal) =
            thermal_constants(c.temperature, c.spring_constant, c.f0, c.q, self.dtau());
        let dt = self.dt();

        let reduced = self.integrate(&mut rng);
        let kept = nearest_power_of_two(reduced.len());
        let per_segment = kept / c.segments;
        if per_segment < 2 {
            return Err(Error::InsufficientData {
                needed: 2 * c.segments,
                available: kept,
            });
        }
        let tail = &reduced[reduced.len() - per_segment * c.segments..];

        let detector = Normal::new(0.0, (c.detector_level / dt).sqrt())
            .map_err(|err| Error::InvalidConfiguration(format!("detector noise: {err}")))?;
        let segments: Vec<Vec<f64>> = tail
            .chunks_exact(per_segment)
            .map(|chunk| {
                chunk
                    .iter()
                    .map(|&x| x * x_thermal * PM_PER_M + detector.sample(&mut rng))
                    .collect()
            })
            .collect();

        debug!(steps = reduced.len(), kept, per_segment, "thermal run split");
        info!(
            x_th_pm = x_thermal * PM_PER_M,
            p_th = p_thermal,
            segments = segments.len(),
            "thermal oscillator simulated"
        );
        Ok(ThermalRecord {
            segments,
            dt,
            x_thermal,
            p_thermal,
        })
    }
}

/// Average of `n_avg` model spectra, each bin scaled by an independent
/// unit exponential (a χ² variate with two degrees of freedom).
pub fn synthetic_dho_psd<R: Rng + ?Sized>(
    params: &OscillatorParams,
    freqs: &[f64],
    n_avg: usize,
    rng: &mut R,
) -> Result<PsdAccumulator> {
    if n_avg == 0 {
        return Err(Error::InsufficientData {
            needed: 1,
            available: 0,
        });
    }
    let mut psd = PsdAccumulator::new();
    for _ in 0..n_avg {
        let power: Vec<f64> = freqs
            .iter()
            .map(|&f| {
                let scale: f64 = Exp1.sample(rng);
                params.power(f) * scale
            })
            .collect();
        psd.contribute(&power, freqs)?;
    }
    Ok(psd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fdm_core::util::argmax;
    use fdm_core::{FitOptions, OscillatorFit};

    fn small() -> ThermalConfig {
        ThermalConfig {
            q: 10.0,
            steps_per_cycle: 64,
            segments: 4,
            ..Default::default()
        }
    }

    #[test]
    fn test_thermal_constants() {
        let dtau = 1.0 / 128.0;
        let (x, p) = thermal_constants(300.0, 2.8, 100e3, 50.0, dtau);
        let lhs = x * x * 2.8 * 50.0 * dtau;
        assert!((lhs / (4.0 * BOLTZMANN * 300.0) - 1.0).abs() < 1e-12);
        assert!((p / x - 2.8 / (2.0 * PI * 100e3)).abs() < 1e-18);
        // about 0.123 nm
        assert!((x - 1.2307e-10).abs() < 1e-13, "{x}");
    }

    #[test]
    fn test_record_shape() {
        // 10 * (10 + 4 * 16) reduced time at 64 steps = 47360 steps
        let sim = ThermalOscillator::new(small()).unwrap();
        let record = sim.simulate().unwrap();
        assert_eq!(record.segments.len(), 4);
        assert!(record.segments.iter().all(|s| s.len() == 8192));
        assert!((record.dt - 1.0 / 64.0 / (2.0 * PI * 100e3)).abs() < 1e-20);
    }

    #[test]
    fn test_seed_reproducible() {
        let a = ThermalOscillator::new(small()).unwrap().simulate().unwrap();
        let b = ThermalOscillator::new(small()).unwrap().simulate().unwrap();
        let c = ThermalOscillator::new(ThermalConfig { seed: 9, ..small() })
            .unwrap()
            .simulate()
            .unwrap();
        assert_eq!(a, b);
        assert_ne!(a.segments[0], c.segments[0]);
    }

    #[test]
    fn test_psd_peaks_at_resonance() {
        let record = ThermalOscillator::new(small()).unwrap().simulate().unwrap();
        let psd = record.psd().unwrap();
        assert_eq!(psd.count(), 4);

        // Skip DC and negative frequencies
        let (freq, power): (Vec<f64>, Vec<f64>) = psd
            .frequency_axis()
            .iter()
            .zip(psd.averaged_power())
            .filter(|(f, _)| **f > 10e3)
            .map(|(f, p)| (*f, *p))
            .unzip();
        let peak = freq[argmax(&power).unwrap()];
        assert!((peak - 100e3).abs() < 10e3, "{peak}");
    }

    #[test]
    fn test_rejects_bad_config() {
        let bad_q = ThermalConfig { q: 0.0, ..small() };
        assert!(matches!(
            ThermalOscillator::new(bad_q),
            Err(Error::InvalidConfiguration(_))
        ));
        let no_segments = ThermalConfig { segments: 0, ..small() };
        assert!(ThermalOscillator::new(no_segments).is_err());
    }

    #[test]
    fn test_synthetic_psd_average() {
        let params = OscillatorParams {
            amplitude: 1.0,
            tau: 100.0 / (PI * 5000.0),
            f0: 5000.0,
            baseline: 0.01,
        };
        let freqs: Vec<f64> = (4800..=5200).map(f64::from).collect();
        let mut rng = StdRng::seed_from_u64(3);
        let psd = synthetic_dho_psd(&params, &freqs, 128, &mut rng).unwrap();
        assert_eq!(psd.count(), 128);
        assert_eq!(psd.averaged_power().len(), 401);

        let peak = psd.averaged_power()[200];
        assert!((peak - params.power(5000.0)).abs() < 0.5, "{peak}");
        assert!(synthetic_dho_psd(&params, &freqs, 0, &mut rng).is_err());
    }

    #[test]
    fn test_oscillator_fit_coverage() {
        let truth = OscillatorParams {
            amplitude: 1.0,
            tau: 100.0 / (PI * 5000.0),
            f0: 5000.0,
            baseline: 0.01,
        };
        let freqs: Vec<f64> = (4800..=5200).map(f64::from).collect();
        let trials: u64 = 200;

        // hits for A, B, f0, tau0
        let mut hits = [0_u64; 4];
        let mut amplitude_pull = 0.0;
        for seed in 0..trials {
            let mut rng = StdRng::seed_from_u64(seed);
            let psd = synthetic_dho_psd(&truth, &freqs, 128, &mut rng).unwrap();
            // A failed fit counts as a miss
            let Ok(fit) = OscillatorFit::fit(&psd, 300.0, &FitOptions::default()) else {
                continue;
            };
            let estimates = [
                (fit.amplitude(), truth.amplitude),
                (fit.baseline(), truth.baseline),
                (fit.f0(), truth.f0),
                (fit.tau(), truth.tau),
            ];
            for (hit, (estimate, value)) in hits.iter_mut().zip(estimates) {
                if estimate.covers(value, 1.0) {
                    *hit += 1;
                }
            }
            amplitude_pull += (fit.amplitude().value - truth.amplitude) / fit.amplitude().stderr;
        }

        // 68% expected; 55% to 80% leaves about three binomial sigma each side
        for (name, &hit) in ["A", "B", "f0", "tau0"].iter().zip(&hits) {
            assert!(
                (110..=160).contains(&hit),
                "{name} covered {hit}/{trials} within one sigma"
            );
        }
        let mean_pull = amplitude_pull / trials as f64;
        assert!(mean_pull.abs() < 0.3, "mean amplitude pull {mean_pull}");
    }
}
