//! Window, transform and filter stages.

use super::{Signal, TimeAxis};
use crate::error::{Error, Result};
use crate::spectral::{
    bandpass_filter, forward_transform, generate_window, hilbert_filter, hilbert_filter_shifted,
    inverse_transform,
};
use crate::types::Complex;
use crate::util::{argmax, unwrap_phase};
use std::f64::consts::PI;
use std::time::Instant;
use tracing::{debug, warn};

/// Blackman edge window and the rise time it actually achieves
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeWindow {
    pub window: Vec<f64>,
    pub rise_samples: usize,
    pub rise_time_target: f64,
    pub rise_time_actual: f64,
}

/// Bandpass filter plus both center-frequency estimates
#[derive(Debug, Clone, PartialEq)]
pub struct Bandpass {
    pub filter: Vec<f64>,
    /// Frequency of the largest Hilbert-filtered spectral magnitude [Hz]
    pub center_peak: f64,
    /// First moment of `H * bp * |FT|` [Hz]
    pub center_refined: f64,
    pub bandwidth: f64,
    pub order: i32,
}

impl Signal {
    /// Taper both ends of the (masked) signal with half-Blackman ramps of
    /// `rise_time` seconds, rounded up to whole samples.
    pub fn cyclicize(&mut self, rise_time: f64) -> Result<&EdgeWindow> {
        if !(rise_time >= 0.0 && rise_time.is_finite()) {
            return Err(Error::invalid(format!(
                "window rise time must be non-negative and finite, got {rise_time}"
            )));
        }

        let rise_samples = (rise_time / self.dt).ceil() as usize;
        let window = generate_window(self.active_len(), rise_samples)?;
        let rise_time_actual = rise_samples as f64 * self.dt;

        self.report.push(format!(
            "Create a windowing function with a rising/falling Blackman filter having \
             a rise/fall time of {:.3} us ({rise_samples} points).",
            1e6 * rise_time_actual
        ));
        debug!(rise_samples, rise_time_actual, len = window.len(), "edge window");

        Ok(self.window.insert(EdgeWindow {
            window,
            rise_samples,
            rise_time_target: rise_time,
            rise_time_actual,
        }))
    }

    /// Fourier transform the masked, windowed signal. The spectrum is scaled
    /// by `dt`, so a signal in nm gives a transform in nm/Hz.
    pub fn fft(&mut self) -> Result<&[Complex]> {
        let start = Instant::now();
        let mut s = self.active_samples();
        if let Some(window) = &self.window {
            if window.window.len() != s.len() {
                return Err(Error::shape("edge window", s.len(), window.window.len()));
            }
            for (x, w) in s.iter_mut().zip(window.window.iter()) {
                *x *= *w;
            }
        }

        let (mut spectrum, freq) = forward_transform(&s, self.dt);
        for x in spectrum.iter_mut() {
            *x *= self.dt;
        }
        let elapsed = start.elapsed();

        self.report.push(format!(
            "Fourier transform the windowed signal ({} points, frequency resolution \
             {:.3} Hz). It took {:.1} ms to compute the FFT.",
            s.len(),
            1.0 / (s.len() as f64 * self.dt),
            elapsed.as_secs_f64() * 1e3
        ));
        debug!(n = s.len(), ?elapsed, "forward transform");

        self.frequency_axis = Some(freq);
        Ok(self.spectrum.insert(spectrum))
    }

    /// Complex Hilbert filter (0 / 1 / 2) over the frequency axis
    pub fn hilbert(&mut self) -> Result<&[f64]> {
        let freq = self.frequency_axis.as_deref().ok_or(Error::PrerequisiteMissing {
            stage: "hilbert",
            requires: "fft",
        })?;
        let filter = hilbert_filter(freq);
        self.report
            .push("Create the complex Hilbert transform filter.".to_string());
        Ok(self.hilbert.insert(filter))
    }

    /// Bandpass filter of `bandwidth` Hz and steepness `order`, centered on
    /// the largest magnitude of the Hilbert-filtered spectrum.
    pub fn bandpass(&mut self, bandwidth: f64, order: i32) -> Result<&Bandpass> {
        let (freq, spectrum) = match (self.frequency_axis.as_deref(), self.spectrum.as_deref()) {
            (Some(f), Some(s)) => (f, s),
            _ => {
                return Err(Error::PrerequisiteMissing {
                    stage: "bandpass",
                    requires: "fft",
                })
            }
        };
        let hilbert = self.hilbert.as_deref().ok_or(Error::PrerequisiteMissing {
            stage: "bandpass",
            requires: "hilbert",
        })?;

        let one_sided: Vec<f64> = hilbert
            .iter()
            .zip(spectrum.iter())
            .map(|(h, s)| h * s.norm())
            .collect();
        let peak = argmax(&one_sided)
            .ok_or_else(|| Error::invalid("spectrum has no finite magnitude"))?;
        let center_peak = freq[peak];

        let filter = bandpass_filter(freq, center_peak, bandwidth, order)?;

        // first moment; only meaningful because the bandpass is already applied
        let (weighted, total) = freq
            .iter()
            .zip(one_sided.iter().zip(filter.iter()))
            .fold((0.0, 0.0), |(fw, w), (f, (a, bp))| {
                let weight = a * bp;
                (fw + f * weight, w + weight)
            });
        let center_refined = if total > 0.0 {
            weighted / total
        } else {
            warn!("bandpass passes no spectral weight; refined center falls back to the peak");
            center_peak
        };

        self.report.push(format!(
            "Create a bandpass filter with center frequency = {:.6} kHz, bandwidth = \
             {:.3} kHz, and order = {order}. Best estimate of the resonance frequency = \
             {:.6} kHz.",
            center_peak / 1e3,
            bandwidth / 1e3,
            center_refined / 1e3
        ));
        debug!(center_peak, center_refined, bandwidth, order, "bandpass filter");

        Ok(self.bandpass.insert(Bandpass {
            filter,
            center_peak,
            center_refined,
            bandwidth,
            order,
        }))
    }

    /// Apply the filters that exist, inverse-transform, trim with the ripple
    /// mask if present, and derive phase (cycles) and amplitude.
    pub fn ifft(&mut self) -> Result<&[Complex]> {
        let spectrum = self.spectrum.as_deref().ok_or(Error::PrerequisiteMissing {
            stage: "ifft",
            requires: "fft",
        })?;
        let n = spectrum.len();

        let mut s: Vec<Complex> = spectrum.iter().map(|x| *x / self.dt).collect();
        if let Some(h) = &self.hilbert {
            for (x, w) in s.iter_mut().zip(h.iter()) {
                *x *= *w;
            }
        }
        if let Some(bp) = &self.bandpass {
            for (x, w) in s.iter_mut().zip(bp.filter.iter()) {
                *x *= *w;
            }
        }

        let mut z = inverse_transform(&s);
        let axis = match &self.ripple {
            Some(ripple) => {
                if ripple.mask.len() != n {
                    return Err(Error::shape("ripple trim mask", n, ripple.mask.len()));
                }
                z = z[ripple.dead_samples..n - ripple.dead_samples].to_vec();
                TimeAxis::Trimmed
            }
            None => self.active_axis(),
        };

        let angle: Vec<f64> = z.iter().map(|c| c.arg()).collect();
        let phase: Vec<f64> = unwrap_phase(&angle).into_iter().map(|p| p / (2.0 * PI)).collect();
        let amplitude: Vec<f64> = z.iter().map(|c| c.norm()).collect();

        let mut filters = Vec::new();
        if self.hilbert.is_some() {
            filters.push("Hilbert");
        }
        if self.bandpass.is_some() {
            filters.push("bandpass");
        }
        let applied = if filters.is_empty() {
            "no filters".to_string()
        } else {
            format!("the {} filter{}", filters.join(" and "), if filters.len() > 1 { "s" } else { "" })
        };
        self.report.push(format!(
            "Apply an inverse Fourier transform with {applied}; {} points of complex \
             signal, phase, and amplitude remain.",
            z.len()
        ));
        debug!(n, kept = z.len(), ?axis, "inverse transform");

        self.phase = Some(phase);
        self.amplitude = Some(amplitude);
        self.analytic_axis = Some(axis);
        Ok(self.analytic.insert(z))
    }

    /// One-sided power spectral density `Hs(f) * |FT|^2 / (n dt)` of the
    /// transformed signal, where `Hs` is the half-bin-shifted Hilbert filter
    /// (the DC bin and negative frequencies are zeroed).
    pub fn power_spectrum(&self) -> Result<Vec<f64>> {
        let (freq, spectrum) = match (self.frequency_axis.as_deref(), self.spectrum.as_deref()) {
            (Some(f), Some(s)) => (f, s),
            _ => {
                return Err(Error::PrerequisiteMissing {
                    stage: "power_spectrum",
                    requires: "fft",
                })
            }
        };
        let duration = spectrum.len() as f64 * self.dt;
        Ok(hilbert_filter_shifted(freq)
            .iter()
            .zip(spectrum.iter())
            .map(|(h, s)| h * s.norm_sqr() / duration)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::BinarateMode;
    use crate::statistics::SeriesStats;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    fn sine(n: usize, fd: f64, f0: f64) -> Signal {
        let dt = 1.0 / fd;
        let samples = (0..n)
            .map(|k| (2.0 * PI * f0 * k as f64 * dt).sin())
            .collect();
        Signal::new(samples, dt, "x", "nm").unwrap()
    }

    #[test]
    fn test_cyclicize_rounds_up() {
        let mut s = sine(1000, 50e3, 2e3);
        let w = s.cyclicize(1.1e-4).unwrap();
        assert_eq!(w.rise_samples, 6);
        assert!((w.rise_time_actual - 1.2e-4).abs() < 1e-15);
        assert_eq!(w.window.len(), 1000);
        assert!(s.report().last().unwrap().contains("120.000 us (6 points)"));
    }

    #[test]
    fn test_cyclicize_follows_length_mask() {
        let mut s = sine(1000, 50e3, 2e3);
        s.binarate(BinarateMode::Middle).unwrap();
        assert_eq!(s.cyclicize(1e-4).unwrap().window.len(), 512);
    }

    #[test]
    fn test_cyclicize_too_long() {
        let mut s = sine(100, 50e3, 2e3);
        assert!(matches!(
            s.cyclicize(1.0),
            Err(Error::InvalidConfiguration(_))
        ));
        assert!(s.window().is_none());
    }

    #[test]
    fn test_fft_output_types() {
        let mut s = sine(512, 50e3, 5e3);
        s.binarate(BinarateMode::Middle).unwrap();
        s.cyclicize(10.0 / 50e3).unwrap();
        s.fft().unwrap();
        s.hilbert().unwrap();

        let freq = s.frequency_axis().unwrap();
        assert_eq!(freq.len(), s.spectrum().unwrap().len());
        let zero = freq.iter().position(|&f| f == 0.0).unwrap();
        assert_eq!(
            &s.hilbert_filter().unwrap()[zero - 1..=zero + 1],
            &[0.0, 1.0, 2.0]
        );
    }

    #[test]
    fn test_stage_prerequisites() {
        let mut s = sine(64, 1e3, 100.0);
        assert_eq!(
            s.hilbert().unwrap_err(),
            Error::PrerequisiteMissing { stage: "hilbert", requires: "fft" }
        );
        assert!(matches!(
            s.bandpass(10.0, 50),
            Err(Error::PrerequisiteMissing { requires: "fft", .. })
        ));
        assert!(matches!(s.ifft(), Err(Error::PrerequisiteMissing { .. })));
        assert!(s.power_spectrum().is_err());
        s.fft().unwrap();
        assert!(matches!(
            s.bandpass(10.0, 50),
            Err(Error::PrerequisiteMissing { requires: "hilbert", .. })
        ));
    }

    #[test]
    fn test_window_length_mismatch() {
        let mut s = sine(1000, 50e3, 2e3);
        s.cyclicize(1e-4).unwrap();
        s.binarate(BinarateMode::Start).unwrap();
        assert!(matches!(s.fft(), Err(Error::ShapeMismatch { .. })));
        assert!(s.spectrum().is_none());
    }

    #[test]
    fn test_odd_length_round_trip_through_stages() {
        let x = vec![0.0, 1.0, 0.0, -1.0, 0.0, 1.0, 0.0, -1.0, 0.0];
        let mut s = Signal::new(x.clone(), 1.0, "x", "nm").unwrap();
        s.fft().unwrap();
        let z = s.ifft().unwrap();
        for (a, b) in z.iter().zip(x.iter()) {
            assert!((a.re - b).abs() < 1e-14);
            assert!(a.im.abs() < 1e-14);
        }
        assert_eq!(s.analytic_time().unwrap().len(), 9);
    }

    #[test]
    fn test_bandpass_finds_tone() {
        let mut s = sine(4096, 50e3, 2e3);
        s.cyclicize(1e-3).unwrap();
        s.fft().unwrap();
        s.hilbert().unwrap();
        let bp = s.bandpass(1000.0, 50).unwrap();
        let resolution = 50e3 / 4096.0;
        assert!((bp.center_peak - 2e3).abs() <= resolution);
        assert!((bp.center_refined - 2e3).abs() < resolution);
        assert!(s.report().last().unwrap().contains("Best estimate"));
    }

    #[test]
    fn test_analytic_amplitude_matches_cosine() {
        let fd = 50e3;
        let amplitude = 0.75;
        let dt = 1.0 / fd;
        let samples = (0..16_384)
            .map(|k| amplitude * (2.0 * PI * 2e3 * k as f64 * dt).cos())
            .collect();
        let mut s = Signal::new(samples, dt, "x", "nm").unwrap();
        s.cyclicize(2e-3).unwrap();
        s.fft().unwrap();
        s.hilbert().unwrap();
        s.bandpass(1000.0, 50).unwrap();
        s.ripple_trim(20e-3).unwrap();
        s.ifft().unwrap();

        let stats = SeriesStats::compute(s.amplitude().unwrap());
        assert!((stats.mean - amplitude).abs() < 0.03 * amplitude, "{}", stats.mean);
        assert_eq!(s.analytic_time().unwrap().len(), s.amplitude().unwrap().len());
    }

    #[test]
    fn test_white_noise_power_level() {
        // one-sided PSD averaged over all bins equals the two-sided level
        let dt: f64 = 1e-5;
        let level = 1e-5;
        let noise = Normal::new(0.0, (level / dt).sqrt()).unwrap();
        let mut rng = StdRng::seed_from_u64(12345);
        let samples: Vec<f64> = (0..4096).map(|_| noise.sample(&mut rng)).collect();
        let mut s = Signal::new(samples, dt, "x", "pm").unwrap();
        s.fft().unwrap();
        let psd = s.power_spectrum().unwrap();
        let zero = s.frequency_axis().unwrap().iter().position(|&f| f == 0.0).unwrap();
        assert!(psd[..=zero].iter().all(|&p| p == 0.0));
        let mean = SeriesStats::compute(&psd).mean;
        assert!((mean - level).abs() < 0.1 * level, "{mean}");
    }
}
