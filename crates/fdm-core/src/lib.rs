//! # fdm-core: Frequency Demodulation Core
//!
//! Extracts the time-varying amplitude, phase and instantaneous frequency of a
//! quasi-sinusoidal signal (for example a cantilever's displacement) with a
//! windowed-FFT demodulation pipeline, and characterizes the underlying
//! oscillator from averaged power spectra.
//!
//! ## Pipeline
//!
//! ```text
//! samples ─► binarate ─► cyclicize ─► FFT ─► Hilbert ─► bandpass
//!                                     │                     │
//!                                     ▼                     ▼
//!                               power spectrum      ripple trim ─► IFFT
//!                                     │                              │
//!                                     ▼                              ▼
//!                              PsdAccumulator           phase / amplitude
//!                                     │                              │
//!                                     ▼                              ▼
//!                              OscillatorFit                 chunked fit f(t)
//! ```
//!
//! ## Example
//!
//! ```rust
//! use fdm_core::signal::{BinarateMode, Signal};
//!
//! let dt = 1.0 / 50_000.0;
//! let samples: Vec<f64> = (0..60_000)
//!     .map(|k| (2.0 * std::f64::consts::PI * 2_000.0 * k as f64 * dt).sin())
//!     .collect();
//!
//! let mut signal = Signal::new(samples, dt, "x", "nm")?;
//! signal.binarate(BinarateMode::Middle)?;
//! signal.cyclicize(3e-3)?;
//! signal.fft()?;
//! signal.hilbert()?;
//! signal.bandpass(1_000.0, 50)?;
//! signal.ripple_trim(15e-3)?;
//! signal.ifft()?;
//! let fit = signal.fit_phase(221.34e-6)?;
//! assert!(!fit.frequency.is_empty());
//! # Ok::<(), fdm_core::Error>(())
//! ```

pub mod config;
pub mod error;
pub mod fft_utils;
pub mod fit;
pub mod psd;
pub mod signal;
pub mod spectral;
pub mod statistics;
pub mod store;
pub mod types;
pub mod util;

pub use config::DemodConfig;
pub use error::{Error, Result};
pub use fit::{fit_amplitude_decay, DecayFit, Estimate, FitOptions, OscillatorFit, OscillatorParams};
pub use psd::PsdAccumulator;
pub use signal::{BinarateMode, ChunkFit, Signal};
pub use types::Complex;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::DemodConfig;
    pub use crate::error::{Error, Result};
    pub use crate::fit::{FitOptions, OscillatorFit};
    pub use crate::psd::PsdAccumulator;
    pub use crate::signal::{BinarateMode, Signal};
    pub use crate::store::{MemoryStore, RecordStore};
}
