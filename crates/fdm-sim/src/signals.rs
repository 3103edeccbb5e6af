//! Test Signal Generators
//!
//! Each generator is driven by a serde config with defaults that reproduce
//! the standard demonstration signal, and returns a [`TestSignal`] ready to
//! ingest. Noise comes from a `StdRng` seeded by the config's `seed`, so a
//! given config always yields the same samples.

use fdm_core::signal::{BinarateMode, Signal};
use fdm_core::{DemodConfig, Error, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::debug;

/// Generated samples plus what is needed to ingest them
#[derive(Debug, Clone, PartialEq)]
pub struct TestSignal {
    pub name: String,
    pub unit: String,
    /// Sample interval [s]
    pub dt: f64,
    pub samples: Vec<f64>,
}

impl TestSignal {
    fn new(samples: Vec<f64>, dt: f64, unit: &str) -> Self {
        Self {
            name: "x".to_string(),
            unit: unit.to_string(),
            dt,
            samples,
        }
    }

    /// Ingest into a pipeline record
    pub fn into_signal(self) -> Result<Signal> {
        Signal::new(self.samples, self.dt, &self.name, &self.unit)
    }
}

fn gaussian(std_dev: f64) -> Result<Normal<f64>> {
    Normal::new(0.0, std_dev).map_err(|err| {
        Error::InvalidConfiguration(format!("noise rms must be non-negative, got {std_dev}: {err}"))
    })
}

fn check_rate(sample_rate: f64) -> Result<f64> {
    if sample_rate > 0.0 && sample_rate.is_finite() {
        Ok(1.0 / sample_rate)
    } else {
        Err(Error::InvalidConfiguration(format!(
            "sample rate must be positive, got {sample_rate}"
        )))
    }
}

/// Fixed-frequency sinusoid
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SineConfig {
    /// Digitization rate [Hz]
    pub sample_rate: f64,
    /// Signal frequency [Hz]
    pub frequency: f64,
    pub points: usize,
    /// Zero-to-peak amplitude [nm]
    pub amplitude: f64,
    /// Gaussian noise rms [nm]
    pub noise_rms: f64,
    pub seed: u64,
}

impl Default for SineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 50e3,
            frequency: 2e3,
            points: 60_000,
            amplitude: 1.0,
            noise_rms: 0.01,
            seed: 0,
        }
    }
}

impl SineConfig {
    /// Pipeline settings for this signal
    pub fn demod_config(&self) -> DemodConfig {
        DemodConfig::default()
    }
}

/// `amplitude sin(2π f t) + noise`
pub fn sine(config: &SineConfig) -> Result<TestSignal> {
    let dt = check_rate(config.sample_rate)?;
    let noise = gaussian(config.noise_rms)?;
    let mut rng = StdRng::seed_from_u64(config.seed);

    let samples = (0..config.points)
        .map(|k| {
            let t = k as f64 * dt;
            config.amplitude * (2.0 * PI * config.frequency * t).sin() + noise.sample(&mut rng)
        })
        .collect();
    debug!(points = config.points, f = config.frequency, "sine test signal");
    Ok(TestSignal::new(samples, dt, "nm"))
}

/// Flat frequency, linear ramp, flat frequency
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SineFmConfig {
    pub sample_rate: f64,
    /// Frequency before the ramp [Hz]
    pub f_start: f64,
    /// Frequency after the ramp [Hz]
    pub f_end: f64,
    /// Ramp start time [s]
    pub ramp_start: f64,
    /// Ramp end time [s]
    pub ramp_end: f64,
    pub points: usize,
    pub amplitude: f64,
    pub noise_rms: f64,
    pub seed: u64,
}

impl Default for SineFmConfig {
    fn default() -> Self {
        Self {
            sample_rate: 100e3,
            f_start: 4e3,
            f_end: 6e3,
            ramp_start: 0.25,
            ramp_end: 0.75,
            points: 128 * 1024,
            amplitude: 1.0,
            noise_rms: 0.0,
            seed: 0,
        }
    }
}

impl SineFmConfig {
    /// Wide bandpass to pass the whole sweep, shorter chunks
    pub fn demod_config(&self) -> DemodConfig {
        DemodConfig {
            bandwidth: 4e3,
            chunk_time: 200e-6,
            ..DemodConfig::default()
        }
    }

    /// Instantaneous frequency of sample `k` [Hz]
    fn frequency_at(&self, k: usize, n_flat: usize, n_ramp: usize) -> f64 {
        if k < n_flat {
            self.f_start
        } else if k < n_flat + n_ramp {
            let fraction = if n_ramp > 1 {
                (k - n_flat) as f64 / (n_ramp - 1) as f64
            } else {
                1.0
            };
            self.f_start + fraction * (self.f_end - self.f_start)
        } else {
            self.f_end
        }
    }
}

/// Frequency-swept cosine. The phase is the running sum of `f dt`.
pub fn sine_fm(config: &SineFmConfig) -> Result<TestSignal> {
    let dt = check_rate(config.sample_rate)?;
    if !(config.ramp_start >= 0.0 && config.ramp_end > config.ramp_start) {
        return Err(Error::InvalidConfiguration(format!(
            "ramp must run forward in time, got {} s to {} s",
            config.ramp_start, config.ramp_end
        )));
    }
    let n_flat = (config.ramp_start / dt).round() as usize;
    let n_ramp = ((config.ramp_end - config.ramp_start) / dt).round() as usize;
    if n_flat + n_ramp > config.points {
        return Err(Error::InvalidConfiguration(format!(
            "ramp ends at point {} but the signal has {} points",
            n_flat + n_ramp,
            config.points
        )));
    }

    let noise = gaussian(config.noise_rms)?;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut cycles = 0.0;
    let mut samples = Vec::with_capacity(config.points);
    for k in 0..config.points {
        if k > 0 {
            cycles += dt * config.frequency_at(k - 1, n_flat, n_ramp);
        }
        samples.push(config.amplitude * (2.0 * PI * cycles).cos() + noise.sample(&mut rng));
    }
    debug!(points = config.points, n_flat, n_ramp, "swept sine test signal");
    Ok(TestSignal::new(samples, dt, "nm"))
}

/// Exponentially decaying sinusoid
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SineExpConfig {
    pub sample_rate: f64,
    pub frequency: f64,
    /// Amplitude decay time [s]
    pub tau: f64,
    /// Record length [s]
    pub duration: f64,
    pub amplitude: f64,
    pub noise_rms: f64,
    pub seed: u64,
}

impl Default for SineExpConfig {
    fn default() -> Self {
        Self {
            sample_rate: 50e3,
            frequency: 2e3,
            tau: 0.325,
            duration: 2.0,
            amplitude: 100.0,
            noise_rms: 20.0,
            seed: 0,
        }
    }
}

impl SineExpConfig {
    /// Keep the start of the record, no edge window, 10 ms dead time
    pub fn demod_config(&self) -> DemodConfig {
        DemodConfig {
            binarate: Some(BinarateMode::Start),
            window_time: None,
            dead_time: Some(10e-3),
            ..DemodConfig::default()
        }
    }
}

/// `amplitude sin(2π f t) exp(-t/tau) + noise`
pub fn sine_exp(config: &SineExpConfig) -> Result<TestSignal> {
    let dt = check_rate(config.sample_rate)?;
    if !(config.tau > 0.0) {
        return Err(Error::InvalidConfiguration(format!(
            "decay time must be positive, got {}",
            config.tau
        )));
    }
    let noise = gaussian(config.noise_rms)?;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let points = (config.duration * config.sample_rate).round() as usize;

    let samples = (0..points)
        .map(|k| {
            let t = k as f64 * dt;
            config.amplitude * (2.0 * PI * config.frequency * t).sin() * (-t / config.tau).exp()
                + noise.sample(&mut rng)
        })
        .collect();
    debug!(points, tau = config.tau, "decaying sine test signal");
    Ok(TestSignal::new(samples, dt, "nm"))
}

/// Segments of white detector noise
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorNoiseConfig {
    /// Target PSD level averaged over the full frequency axis [pm²/Hz]
    pub level: f64,
    /// Points per segment
    pub points: usize,
    /// Number of segments to average
    pub segments: usize,
    /// Sample interval [s]
    pub dt: f64,
    pub seed: u64,
}

impl Default for DetectorNoiseConfig {
    fn default() -> Self {
        Self {
            level: 1e-5,
            points: 128,
            segments: 64,
            dt: 10e-6,
            seed: 0,
        }
    }
}

/// `segments` independent records of `sqrt(level/dt) N(0, 1)` [pm]
pub fn detector_noise(config: &DetectorNoiseConfig) -> Result<Vec<Vec<f64>>> {
    if !(config.dt > 0.0 && config.level >= 0.0) {
        return Err(Error::InvalidConfiguration(format!(
            "detector noise needs dt > 0 and level >= 0, got dt = {} and level = {}",
            config.dt, config.level
        )));
    }
    let noise = gaussian((config.level / config.dt).sqrt())?;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let segments = (0..config.segments)
        .map(|_| (0..config.points).map(|_| noise.sample(&mut rng)).collect())
        .collect();
    debug!(segments = config.segments, points = config.points, "detector noise segments");
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fdm_core::statistics::SeriesStats;
    use fdm_core::PsdAccumulator;

    #[test]
    fn test_sine_defaults() {
        let test = sine(&SineConfig::default()).unwrap();
        assert_eq!(test.samples.len(), 60_000);
        assert!((test.dt - 20e-6).abs() < 1e-18);
        assert_eq!(test.unit, "nm");
    }

    #[test]
    fn test_seed_reproducible() {
        let a = sine(&SineConfig::default()).unwrap();
        let b = sine(&SineConfig::default()).unwrap();
        let c = sine(&SineConfig { seed: 1, ..Default::default() }).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_sine_demodulates() {
        let mut signal = sine(&SineConfig::default()).unwrap().into_signal().unwrap();
        let config = SineConfig::default().demod_config();
        let fit = signal.demodulate(&config).unwrap();
        let stats = SeriesStats::compute(&fit.frequency);
        assert!((stats.mean - 2e3).abs() < 20.0, "{}", stats.mean);
    }

    #[test]
    fn test_sine_fm_sweeps() {
        let config = SineFmConfig::default();
        let test = sine_fm(&config).unwrap();
        assert_eq!(test.samples.len(), 131_072);
        assert_eq!(test.samples[0], 1.0);

        let mut signal = test.into_signal().unwrap();
        let fit = signal.demodulate(&config.demod_config()).unwrap().clone();
        let at = |time: f64| {
            let i = fit
                .time
                .iter()
                .position(|&t| t >= time)
                .unwrap();
            fit.frequency[i]
        };
        assert!((at(0.2) - 4e3).abs() < 40.0, "{}", at(0.2));
        assert!((at(0.5) - 5e3).abs() < 50.0, "{}", at(0.5));
        assert!((at(0.9) - 6e3).abs() < 60.0, "{}", at(0.9));
    }

    #[test]
    fn test_sine_fm_rejects_long_ramp() {
        let config = SineFmConfig {
            points: 1024,
            ..Default::default()
        };
        assert!(matches!(sine_fm(&config), Err(Error::InvalidConfiguration(_))));
    }

    #[test]
    fn test_sine_exp_length() {
        let test = sine_exp(&SineExpConfig::default()).unwrap();
        assert_eq!(test.samples.len(), 100_000);
        assert!(sine_exp(&SineExpConfig { tau: 0.0, ..Default::default() }).is_err());
    }

    #[test]
    fn test_detector_noise_level() {
        let config = DetectorNoiseConfig::default();
        let segments = detector_noise(&config).unwrap();
        assert_eq!(segments.len(), 64);
        assert!(segments.iter().all(|s| s.len() == 128));

        let mut psd = PsdAccumulator::new();
        psd.average_segments(&segments, config.dt, "x", "pm", None)
            .unwrap();
        let tolerance = 3.0 * config.level / (config.segments as f64).sqrt();
        assert!((psd.mean() - config.level).abs() < tolerance, "{}", psd.mean());
    }
}
