//! Spectral Averaging
//!
//! [`PsdAccumulator`] keeps a running mean of one-sided power spectra that
//! share a frequency axis:
//!
//! ```text
//! avg(n+1) = n/(n+1) avg(n) + 1/(n+1) sample
//! ```
//!
//! After every contribution the mean and population standard deviation of
//! the averaged array are refreshed. Merging is serial and in call order;
//! [`PsdAccumulator::average_segments`] computes segment spectra in parallel
//! and then merges them in segment order.

use crate::error::{Error, Result};
use crate::signal::Signal;
use crate::statistics::SeriesStats;
use crate::store::{write_with_abscissa, ArrayData, ContainerHandle, MetaValue, Metadata, RecordStore};
use rayon::prelude::*;
use tracing::{debug, info};

/// Running average of power spectra
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PsdAccumulator {
    frequency_axis: Vec<f64>,
    averaged_power: Vec<f64>,
    count: usize,
    mean: f64,
    std: f64,
    report: Vec<String>,
}

impl PsdAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one power spectrum. The first contribution fixes the frequency
    /// axis; later ones must match its length.
    pub fn contribute(&mut self, power: &[f64], frequency_axis: &[f64]) -> Result<()> {
        if power.len() != frequency_axis.len() {
            return Err(Error::shape("power spectrum", frequency_axis.len(), power.len()));
        }

        if self.count == 0 {
            self.frequency_axis = frequency_axis.to_vec();
            self.averaged_power = power.to_vec();
            self.report
                .push(format!("Add a psd signal of length {}.", frequency_axis.len()));
        } else {
            if power.len() != self.averaged_power.len() {
                return Err(Error::shape(
                    "averaged power spectrum",
                    self.averaged_power.len(),
                    power.len(),
                ));
            }
            let n = self.count as f64;
            let (old, new) = (n / (n + 1.0), 1.0 / (n + 1.0));
            for (avg, p) in self.averaged_power.iter_mut().zip(power.iter()) {
                *avg = old * *avg + new * p;
            }
        }
        self.count += 1;

        let stats = SeriesStats::compute(&self.averaged_power);
        self.mean = stats.mean;
        self.std = stats.std;
        debug!(count = self.count, mean = self.mean, std = self.std, "psd contribution");
        Ok(())
    }

    /// Add the power spectrum of a signal that has been through
    /// [`Signal::fft`]
    pub fn contribute_signal(&mut self, signal: &Signal) -> Result<()> {
        let power = signal.power_spectrum()?;
        let freq = signal.frequency_axis().ok_or(Error::PrerequisiteMissing {
            stage: "contribute_signal",
            requires: "fft",
        })?;
        self.contribute(&power, freq)
    }

    /// Transform each segment (ingest, optional edge window, FFT, power
    /// spectrum) in parallel, then merge the spectra in segment order.
    ///
    /// Nothing is merged unless every segment transforms and all spectra
    /// share one length.
    pub fn average_segments(
        &mut self,
        segments: &[Vec<f64>],
        dt: f64,
        name: &str,
        unit: &str,
        rise_time: Option<f64>,
    ) -> Result<()> {
        let spectra = segments
            .par_iter()
            .map(|segment| -> Result<(Vec<f64>, Vec<f64>)> {
                let mut signal = Signal::new(segment.clone(), dt, name, unit)?;
                if let Some(rise) = rise_time {
                    signal.cyclicize(rise)?;
                }
                signal.fft()?;
                let power = signal.power_spectrum()?;
                let freq = signal.frequency_axis().map(<[f64]>::to_vec).unwrap_or_default();
                Ok((power, freq))
            })
            .collect::<Result<Vec<_>>>()?;

        let expected = if self.count > 0 {
            Some(self.averaged_power.len())
        } else {
            spectra.first().map(|(p, _)| p.len())
        };
        if let Some(expected) = expected {
            if let Some((p, _)) = spectra.iter().find(|(p, _)| p.len() != expected) {
                return Err(Error::shape("segment power spectrum", expected, p.len()));
            }
        }

        for (power, freq) in &spectra {
            self.contribute(power, freq)?;
        }
        info!(segments = segments.len(), n_avg = self.count, "psd segments averaged");
        Ok(())
    }

    pub fn frequency_axis(&self) -> &[f64] {
        &self.frequency_axis
    }

    pub fn averaged_power(&self) -> &[f64] {
        &self.averaged_power
    }

    /// Number of spectra averaged
    pub fn count(&self) -> usize {
        self.count
    }

    /// Mean of the averaged spectrum over all bins
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Population standard deviation of the averaged spectrum over all bins
    pub fn std(&self) -> f64 {
        self.std
    }

    pub fn report(&self) -> &[String] {
        &self.report
    }

    /// Write `freq` and `psd` (with `n_avg`) and the report
    pub fn save<S: RecordStore + ?Sized>(
        &self,
        store: &mut S,
        handle: ContainerHandle,
        unit: &str,
    ) -> Result<()> {
        if self.count == 0 {
            return Err(Error::InsufficientData { needed: 1, available: 0 });
        }
        store.write_array(
            handle,
            "freq",
            ArrayData::Real(self.frequency_axis.clone()),
            Metadata::new()
                .with("name", "f")
                .with("unit", "Hz")
                .with("label", "f [Hz]")
                .with("label_latex", "$f \\: [\\mathrm{Hz}]$")
                .with("help", "frequency"),
        )?;
        let psd_unit = format!("{unit}^2/Hz");
        write_with_abscissa(
            store,
            handle,
            "psd",
            ArrayData::Real(self.averaged_power.clone()),
            Metadata::new()
                .with("name", "P")
                .with("unit", psd_unit.as_str())
                .with("label", format!("P [{psd_unit}]"))
                .with("label_latex", format!("$P \\: [\\mathrm{{{psd_unit}}}]$"))
                .with("help", "power spectrum")
                .with("n_avg", self.count)
                .with("abscissa", "freq"),
        )?;
        store.set_attribute(handle, "report", MetaValue::TextList(self.report.clone()))?;
        info!(n_avg = self.count, bins = self.averaged_power.len(), "psd saved");
        Ok(())
    }
}
