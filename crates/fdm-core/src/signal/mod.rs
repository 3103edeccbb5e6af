//! Signal Pipeline
//!
//! A [`Signal`] owns one time series and every array derived from it. Stages
//! run in a fixed order and each one extends the record:
//!
//! 1. ingest ([`Signal::new`]) - samples, `dt`, time axis
//! 2. [`Signal::binarate`] - power-of-two length mask
//! 3. [`Signal::cyclicize`] - Blackman edge window
//! 4. [`Signal::fft`] - spectrum scaled by `dt`
//! 5. [`Signal::hilbert`] - one-sided filter
//! 6. [`Signal::bandpass`] - bandpass around the spectral peak
//! 7. [`Signal::ripple_trim`] - edge exclusion mask
//! 8. [`Signal::ifft`] - analytic signal, phase, amplitude
//! 9. [`Signal::fit_phase`] - chunked linear fit for frequency vs time
//!
//! Running a stage before its prerequisite fails with
//! [`Error::PrerequisiteMissing`]. A failing stage leaves the record as it
//! was. Every successful stage appends one sentence to the report.

mod chunk;
mod mask;
mod persist;
mod stages;

pub use chunk::{chunked_slopes, ChunkFit};
pub use mask::{BinarateMode, LengthMask, RippleMask};
pub use stages::{Bandpass, EdgeWindow};

use crate::config::DemodConfig;
use crate::error::{Error, Result};
use crate::statistics::SeriesStats;
use crate::types::Complex;
use crate::util::eng;
use std::fmt;
use tracing::debug;

/// Which time axis an array is sampled on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeAxis {
    /// Full ingest axis
    Original,
    /// After the length mask
    Masked,
    /// After the ripple trim mask
    Trimmed,
}

/// One signal and its progressively derived workup
#[derive(Debug, Clone)]
pub struct Signal {
    name: String,
    unit: String,
    dt: f64,
    samples: Vec<Complex>,
    is_complex: bool,
    time: Vec<f64>,

    length_mask: Option<LengthMask>,
    time_masked: Option<Vec<f64>>,
    window: Option<EdgeWindow>,
    spectrum: Option<Vec<Complex>>,
    frequency_axis: Option<Vec<f64>>,
    hilbert: Option<Vec<f64>>,
    bandpass: Option<Bandpass>,
    ripple: Option<RippleMask>,
    time_trimmed: Option<Vec<f64>>,
    analytic: Option<Vec<Complex>>,
    analytic_axis: Option<TimeAxis>,
    phase: Option<Vec<f64>>,
    amplitude: Option<Vec<f64>>,
    chunk_fit: Option<ChunkFit>,

    report: Vec<String>,
}

impl Signal {
    /// Ingest real samples spaced by `dt` seconds
    pub fn new(samples: Vec<f64>, dt: f64, name: &str, unit: &str) -> Result<Self> {
        let samples = samples.into_iter().map(|s| Complex::new(s, 0.0)).collect();
        Self::ingest(samples, false, dt, name, unit)
    }

    /// Ingest complex samples spaced by `dt` seconds
    pub fn from_complex(samples: Vec<Complex>, dt: f64, name: &str, unit: &str) -> Result<Self> {
        Self::ingest(samples, true, dt, name, unit)
    }

    fn ingest(
        samples: Vec<Complex>,
        is_complex: bool,
        dt: f64,
        name: &str,
        unit: &str,
    ) -> Result<Self> {
        if !(dt > 0.0 && dt.is_finite()) {
            return Err(Error::invalid(format!(
                "time step must be positive and finite, got {dt}"
            )));
        }
        if samples.is_empty() {
            return Err(Error::invalid("signal has no samples"));
        }

        let n = samples.len();
        let time = (0..n).map(|k| k as f64 * dt).collect();
        let report = format!(
            "Add a signal {name}[{unit}] of length {n}, time step {:.3} us, and duration {:.3} s.",
            1e6 * dt,
            n as f64 * dt
        );
        debug!(name, unit, n, dt, "signal ingested");

        Ok(Self {
            name: name.to_string(),
            unit: unit.to_string(),
            dt,
            samples,
            is_complex,
            time,
            length_mask: None,
            time_masked: None,
            window: None,
            spectrum: None,
            frequency_axis: None,
            hilbert: None,
            bandpass: None,
            ripple: None,
            time_trimmed: None,
            analytic: None,
            analytic_axis: None,
            phase: None,
            amplitude: None,
            chunk_fit: None,
            report: vec![report],
        })
    }

    /// Run stages 2 through 9 with the given configuration
    pub fn demodulate(&mut self, config: &DemodConfig) -> Result<&ChunkFit> {
        config.validate()?;
        if let Some(mode) = config.binarate {
            self.binarate(mode)?;
        }
        if let Some(rise) = config.window_time {
            self.cyclicize(rise)?;
        }
        self.fft()?;
        self.hilbert()?;
        self.bandpass(config.bandwidth, config.order)?;
        if let Some(dead) = config.dead_time {
            self.ripple_trim(dead)?;
        }
        self.ifft()?;
        self.fit_phase(config.chunk_time)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Sample interval [s]
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Number of ingested samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Whether the samples were ingested as complex values
    pub fn is_complex(&self) -> bool {
        self.is_complex
    }

    pub fn samples(&self) -> &[Complex] {
        &self.samples
    }

    /// Real part of the ingested samples
    pub fn real_samples(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.re).collect()
    }

    /// Ingest time axis `t_k = k dt`
    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn length_mask(&self) -> Option<&LengthMask> {
        self.length_mask.as_ref()
    }

    /// Time axis after the length mask
    pub fn time_masked(&self) -> Option<&[f64]> {
        self.time_masked.as_deref()
    }

    pub fn window(&self) -> Option<&EdgeWindow> {
        self.window.as_ref()
    }

    /// Spectrum in units of `unit/Hz`
    pub fn spectrum(&self) -> Option<&[Complex]> {
        self.spectrum.as_deref()
    }

    pub fn frequency_axis(&self) -> Option<&[f64]> {
        self.frequency_axis.as_deref()
    }

    pub fn hilbert_filter(&self) -> Option<&[f64]> {
        self.hilbert.as_deref()
    }

    pub fn bandpass_filter(&self) -> Option<&Bandpass> {
        self.bandpass.as_ref()
    }

    pub fn ripple_mask(&self) -> Option<&RippleMask> {
        self.ripple.as_ref()
    }

    /// Time axis after the ripple trim mask
    pub fn time_trimmed(&self) -> Option<&[f64]> {
        self.time_trimmed.as_deref()
    }

    pub fn analytic_signal(&self) -> Option<&[Complex]> {
        self.analytic.as_deref()
    }

    /// Unwrapped phase in cycles
    pub fn phase(&self) -> Option<&[f64]> {
        self.phase.as_deref()
    }

    pub fn amplitude(&self) -> Option<&[f64]> {
        self.amplitude.as_deref()
    }

    /// Time axis of the analytic signal, phase and amplitude
    pub fn analytic_time(&self) -> Option<&[f64]> {
        self.analytic_axis.map(|axis| self.axis(axis))
    }

    pub fn chunk_fit(&self) -> Option<&ChunkFit> {
        self.chunk_fit.as_ref()
    }

    /// Processing log, one sentence per stage
    pub fn report(&self) -> &[String] {
        &self.report
    }

    /// Append a free-form line to the report
    pub fn note(&mut self, message: impl Into<String>) {
        self.report.push(message.into());
    }

    fn axis(&self, axis: TimeAxis) -> &[f64] {
        match axis {
            TimeAxis::Original => &self.time,
            TimeAxis::Masked => self.time_masked.as_deref().unwrap_or(&self.time),
            TimeAxis::Trimmed => self.time_trimmed.as_deref().unwrap_or(&self.time),
        }
    }

    /// Time axis in effect for the spectral stages: masked if a length mask
    /// exists, otherwise the ingest axis
    fn active_axis(&self) -> TimeAxis {
        if self.length_mask.is_some() {
            TimeAxis::Masked
        } else {
            TimeAxis::Original
        }
    }

    fn active_len(&self) -> usize {
        self.axis(self.active_axis()).len()
    }

    /// Samples selected by the length mask (all samples without one)
    fn active_samples(&self) -> Vec<Complex> {
        match &self.length_mask {
            Some(mask) => self.samples[mask.start..mask.stop].to_vec(),
            None => self.samples.clone(),
        }
    }

    /// Name, unit, time step and range of the ingested samples
    pub fn summary(&self) -> String {
        let stats = SeriesStats::compute(&self.real_samples());
        let mut output = String::new();
        output.push_str("Signal\n");
        output.push_str(&"═".repeat(50));
        output.push('\n');
        output.push_str(&format!("signal name: {}\n", self.name));
        output.push_str(&format!("signal unit: {}\n", self.unit));
        output.push_str(&format!("time step = {:.3} us\n", self.dt * 1e6));
        output.push_str(&format!("rms = {}\n", eng(stats.rms)));
        output.push_str(&format!("max = {}\n", eng(stats.max)));
        output.push_str(&format!("min = {}\n", eng(stats.min)));
        output
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Signal report")?;
        writeln!(f, "=============")?;
        for (i, line) in self.report.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "* {line}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_time_axis() {
        let s = Signal::new(vec![0.0, 1.0, 2.0], 10e-6, "x", "nm").unwrap();
        assert_eq!(s.len(), 3);
        for (t, expected) in s.time().iter().zip([0.0, 10e-6, 20e-6]) {
            assert!((t - expected).abs() < 1e-15);
        }
        assert_eq!(s.real_samples(), vec![0.0, 1.0, 2.0]);
        assert!(!s.is_complex());
        assert_eq!(s.report().len(), 1);
        assert!(s.report()[0].starts_with("Add a signal x[nm] of length 3"));
    }

    #[test]
    fn test_ingest_rejects_bad_input() {
        assert!(matches!(
            Signal::new(vec![1.0], 0.0, "x", "nm"),
            Err(Error::InvalidConfiguration(_))
        ));
        assert!(Signal::new(vec![1.0], f64::NAN, "x", "nm").is_err());
        assert!(Signal::new(vec![], 1.0, "x", "nm").is_err());
    }

    #[test]
    fn test_display_lists_report() {
        let mut s = Signal::new(vec![0.0; 8], 1.0, "x", "nm").unwrap();
        s.note("second entry");
        let text = s.to_string();
        assert!(text.starts_with("Signal report\n"));
        assert!(text.contains("* second entry"));
    }

    #[test]
    fn test_summary() {
        let s = Signal::new(vec![-2.0, 2.0], 1e-5, "x", "nm").unwrap();
        let text = s.summary();
        assert!(text.contains("signal unit: nm"));
        assert!(text.contains("time step = 10.000 us"));
        assert!(text.contains("max = 2"));
        assert!(text.contains("min = -2"));
    }
}
