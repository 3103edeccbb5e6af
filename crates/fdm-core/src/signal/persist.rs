//! Saving a signal's workup to a record store and reopening it.

use super::{Signal, TimeAxis};
use crate::error::{Error, Result};
use crate::store::{write_with_abscissa, ArrayData, ContainerHandle, MetaValue, Metadata, RecordStore};
use tracing::info;

pub const TIME: &str = "time";
pub const SIGNAL: &str = "signal";
pub const LENGTH_MASK: &str = "workup/time/length_mask";
pub const TIME_MASKED: &str = "workup/time/time_masked";
pub const WINDOW: &str = "workup/time/window";
pub const FREQUENCY: &str = "workup/freq/freq";
pub const SPECTRUM: &str = "workup/freq/spectrum";
pub const HILBERT: &str = "workup/freq/filter/hilbert";
pub const BANDPASS: &str = "workup/freq/filter/bandpass";
pub const RIPPLE_MASK: &str = "workup/time/ripple_mask";
pub const TIME_TRIMMED: &str = "workup/time/time_trimmed";
pub const ANALYTIC: &str = "workup/time/analytic";
pub const PHASE: &str = "workup/time/phase";
pub const AMPLITUDE: &str = "workup/time/amplitude";
pub const FIT_TIME: &str = "workup/fit/time";
pub const FIT_FREQUENCY: &str = "workup/fit/frequency";

/// Container attribute holding the report sentences
pub const REPORT: &str = "report";

fn describe(name: &str, unit: &str, help: &str) -> Metadata {
    let label = if unit.is_empty() {
        name.to_string()
    } else {
        format!("{name} [{unit}]")
    };
    let label_latex = if unit.is_empty() {
        format!("${name}$")
    } else {
        format!("${name} \\: [\\mathrm{{{unit}}}]$")
    };
    Metadata::new()
        .with("name", name)
        .with("unit", unit)
        .with("label", label)
        .with("label_latex", label_latex)
        .with("help", help)
}

fn axis_path(axis: TimeAxis) -> &'static str {
    match axis {
        TimeAxis::Original => TIME,
        TimeAxis::Masked => TIME_MASKED,
        TimeAxis::Trimmed => TIME_TRIMMED,
    }
}

impl Signal {
    /// Write the samples, every derived array that exists, and the report.
    ///
    /// Each array carries `name`, `unit`, `label`, `label_latex` and `help`
    /// metadata, and `abscissa` names the axis it is sampled on.
    pub fn save<S: RecordStore + ?Sized>(&self, store: &mut S, handle: ContainerHandle) -> Result<()> {
        store.write_array(
            handle,
            TIME,
            ArrayData::Real(self.time.clone()),
            describe("t", "s", "time")
                .with("initial", 0.0)
                .with("step", self.dt),
        )?;
        let samples = if self.is_complex {
            ArrayData::Complex(self.samples.clone())
        } else {
            ArrayData::Real(self.real_samples())
        };
        write_with_abscissa(
            store,
            handle,
            SIGNAL,
            samples,
            describe(&self.name, &self.unit, "cantilever displacement")
                .with("step", self.dt)
                .with("abscissa", TIME),
        )?;

        if let Some(mask) = &self.length_mask {
            write_with_abscissa(
                store,
                handle,
                LENGTH_MASK,
                ArrayData::Bool(mask.mask.clone()),
                describe("mask", "", "mask to make data a power of two in length")
                    .with("mode", mask.mode.to_string())
                    .with("abscissa", TIME),
            )?;
        }
        if let Some(t) = &self.time_masked {
            store.write_array(
                handle,
                TIME_MASKED,
                ArrayData::Real(t.clone()),
                describe("t", "s", "time after the length mask"),
            )?;
        }
        let active = axis_path(self.active_axis());
        if let Some(window) = &self.window {
            write_with_abscissa(
                store,
                handle,
                WINDOW,
                ArrayData::Real(window.window.clone()),
                describe("w", "", "edge window")
                    .with("rise_time", window.rise_time_actual)
                    .with("abscissa", active),
            )?;
        }
        if let Some(freq) = &self.frequency_axis {
            store.write_array(
                handle,
                FREQUENCY,
                ArrayData::Real(freq.clone()),
                describe("f", "Hz", "frequency")
                    .with("initial", freq.first().copied().unwrap_or(0.0))
                    .with("step", 1.0 / (freq.len() as f64 * self.dt)),
            )?;
        }
        if let Some(spectrum) = &self.spectrum {
            write_with_abscissa(
                store,
                handle,
                SPECTRUM,
                ArrayData::Complex(spectrum.clone()),
                describe("FT(x)", &format!("{}/Hz", self.unit), "Fourier transform of the windowed signal")
                    .with("abscissa", FREQUENCY),
            )?;
        }
        if let Some(h) = &self.hilbert {
            write_with_abscissa(
                store,
                handle,
                HILBERT,
                ArrayData::Real(h.clone()),
                describe("rh", "", "Hilbert transform filter").with("abscissa", FREQUENCY),
            )?;
        }
        if let Some(bp) = &self.bandpass {
            write_with_abscissa(
                store,
                handle,
                BANDPASS,
                ArrayData::Real(bp.filter.clone()),
                describe("bp", "", "bandpass filter")
                    .with("center_peak", bp.center_peak)
                    .with("center_refined", bp.center_refined)
                    .with("bandwidth", bp.bandwidth)
                    .with("order", bp.order as i64)
                    .with("abscissa", FREQUENCY),
            )?;
        }
        if let Some(ripple) = &self.ripple {
            write_with_abscissa(
                store,
                handle,
                RIPPLE_MASK,
                ArrayData::Bool(ripple.mask.clone()),
                describe("mask", "", "mask to remove leading and trailing ripple")
                    .with("dead_time", ripple.dead_time_actual)
                    .with("abscissa", active),
            )?;
        }
        if let Some(t) = &self.time_trimmed {
            store.write_array(
                handle,
                TIME_TRIMMED,
                ArrayData::Real(t.clone()),
                describe("t", "s", "time after the ripple trim mask"),
            )?;
        }
        if let Some(axis) = self.analytic_axis {
            let abscissa = axis_path(axis);
            if let Some(z) = &self.analytic {
                write_with_abscissa(
                    store,
                    handle,
                    ANALYTIC,
                    ArrayData::Complex(z.clone()),
                    describe("z", &self.unit, "analytic signal").with("abscissa", abscissa),
                )?;
            }
            if let Some(p) = &self.phase {
                write_with_abscissa(
                    store,
                    handle,
                    PHASE,
                    ArrayData::Real(p.clone()),
                    describe("p", "cyc", "phase").with("abscissa", abscissa),
                )?;
            }
            if let Some(a) = &self.amplitude {
                write_with_abscissa(
                    store,
                    handle,
                    AMPLITUDE,
                    ArrayData::Real(a.clone()),
                    describe("a", &self.unit, "amplitude").with("abscissa", abscissa),
                )?;
            }
        }
        if let Some(fit) = &self.chunk_fit {
            store.write_array(
                handle,
                FIT_TIME,
                ArrayData::Real(fit.time.clone()),
                describe("t", "s", "time at the middle of each chunk")
                    .with("chunk_duration", fit.chunk_duration),
            )?;
            write_with_abscissa(
                store,
                handle,
                FIT_FREQUENCY,
                ArrayData::Real(fit.frequency.clone()),
                describe("f", "cyc/s", "best-fit slope").with("abscissa", FIT_TIME),
            )?;
        }

        store.set_attribute(handle, REPORT, MetaValue::TextList(self.report.clone()))?;
        info!(name = %self.name, "signal saved");
        Ok(())
    }

    /// Rebuild the ingested signal and its report from a saved container.
    /// Derived arrays stay in the store; rerun the stages to recompute them.
    pub fn open<S: RecordStore + ?Sized>(store: &S, handle: ContainerHandle) -> Result<Self> {
        let (data, meta) = store.read_array(handle, SIGNAL)?;
        let dt = meta
            .get_number("step")
            .ok_or_else(|| Error::invalid("saved signal has no `step` attribute"))?;
        let name = meta.get_text("name").unwrap_or("x").to_string();
        let unit = meta.get_text("unit").unwrap_or("").to_string();

        let mut signal = match data {
            ArrayData::Real(x) => Signal::new(x, dt, &name, &unit)?,
            ArrayData::Complex(z) => Signal::from_complex(z, dt, &name, &unit)?,
            ArrayData::Bool(_) => {
                return Err(Error::invalid("saved signal is a boolean array"));
            }
        };
        if let Some(report) = store
            .attributes(handle)?
            .get(REPORT)
            .and_then(MetaValue::as_text_list)
        {
            signal.report = report.to_vec();
        }
        Ok(signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DemodConfig;
    use crate::store::{JsonStore, MemoryStore};
    use std::f64::consts::PI;

    fn demodulated() -> Signal {
        let dt = 1.0 / 50e3;
        let samples = (0..8192)
            .map(|k| (2.0 * PI * 2e3 * k as f64 * dt).sin())
            .collect();
        let mut s = Signal::new(samples, dt, "x", "nm").unwrap();
        let config = DemodConfig {
            window_time: Some(1e-3),
            dead_time: Some(5e-3),
            ..DemodConfig::default()
        };
        s.demodulate(&config).unwrap();
        s
    }

    #[test]
    fn test_save_writes_every_stage() {
        let s = demodulated();
        let mut store = MemoryStore::new();
        let h = store.create_container("sine").unwrap();
        s.save(&mut store, h).unwrap();

        let contents = store.list_contents(h).unwrap();
        for path in [
            TIME, SIGNAL, LENGTH_MASK, TIME_MASKED, WINDOW, FREQUENCY, SPECTRUM, HILBERT,
            BANDPASS, RIPPLE_MASK, TIME_TRIMMED, ANALYTIC, PHASE, AMPLITUDE, FIT_TIME,
            FIT_FREQUENCY,
        ] {
            assert!(contents.iter().any(|c| c == path), "missing {path}");
        }

        let (_, meta) = store.read_array(h, PHASE).unwrap();
        assert_eq!(meta.get_text("abscissa"), Some(TIME_TRIMMED));
        assert_eq!(meta.get_text("label"), Some("p [cyc]"));
        let (_, meta) = store.read_array(h, FREQUENCY).unwrap();
        assert_eq!(meta.get_text("unit"), Some("Hz"));
    }

    #[test]
    fn test_open_restores_signal_and_report() {
        let s = demodulated();
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonStore::new(dir.path()).unwrap();
        let h = store.create_container("sine").unwrap();
        s.save(&mut store, h).unwrap();
        store.close(h).unwrap();

        let h = store.open_container("sine").unwrap();
        let reopened = Signal::open(&store, h).unwrap();
        assert_eq!(reopened.len(), s.len());
        assert_eq!(reopened.dt(), s.dt());
        assert_eq!(reopened.unit(), "nm");
        assert_eq!(reopened.report(), s.report());
        assert!(reopened.phase().is_none());
    }

    #[test]
    fn test_complex_samples_survive() {
        let z = vec![crate::Complex::new(1.0, -1.0), crate::Complex::new(0.5, 2.0)];
        let s = Signal::from_complex(z.clone(), 1e-3, "z", "V").unwrap();
        let mut store = MemoryStore::new();
        let h = store.create_container("z").unwrap();
        s.save(&mut store, h).unwrap();
        let back = Signal::open(&store, h).unwrap();
        assert!(back.is_complex());
        assert_eq!(back.samples(), z.as_slice());
    }
}
