//! # fdm-sim: Test Signals and Thermal Oscillator Simulation
//!
//! Canned inputs for the demodulation pipeline in `fdm-core`, each
//! reproducible from a seed:
//!
//! - **Sine**: fixed-frequency sinusoid with optional Gaussian noise
//! - **Sine FM**: linear frequency ramp between two flat sections
//! - **Sine exp**: exponentially decaying sinusoid
//! - **Detector noise**: segments of white noise at a target PSD level
//! - **Thermal oscillator**: Euler-integrated Brownian motion of a damped
//!   harmonic oscillator plus detector noise
//! - **Synthetic DHO PSD**: averaged noisy model spectra for fit checks
//!
//! ## Usage
//!
//! ```rust
//! use fdm_sim::signals::{sine, SineConfig};
//! use fdm_core::DemodConfig;
//!
//! let test = sine(&SineConfig { noise_rms: 0.0, ..Default::default() })?;
//! let mut signal = test.into_signal()?;
//! let fit = signal.demodulate(&DemodConfig::default())?;
//! assert!(!fit.frequency.is_empty());
//! # Ok::<(), fdm_core::Error>(())
//! ```

pub mod signals;
pub mod thermal;

pub use signals::{
    detector_noise, sine, sine_exp, sine_fm, DetectorNoiseConfig, SineConfig, SineExpConfig,
    SineFmConfig, TestSignal,
};
pub use thermal::{
    synthetic_dho_psd, thermal_constants, ThermalConfig, ThermalOscillator, ThermalRecord,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::signals::{SineConfig, TestSignal};
    pub use crate::thermal::{ThermalConfig, ThermalOscillator};
}
