//! Spectral Primitives
//!
//! Pure functions on arrays: the forward/inverse transform pair with
//! zero-centered frequency axes, the Blackman edge window, and the
//! frequency-domain filters used to build an analytic signal.
//!
//! ## Filters
//!
//! - **Hilbert** ([`hilbert_filter`]): 0 / 1 / 2 for negative / zero /
//!   positive frequency. Keeps the DC bin.
//! - **Shifted Hilbert** ([`hilbert_filter_shifted`]): 0 at or below zero,
//!   2 above. Drops the DC bin; used for one-sided power spectra.
//! - **Bandpass** ([`bandpass_filter`]): `1 / (1 + (|f - fc| / bw)^n)`

pub mod filter;
pub mod transform;
pub mod window;

pub use filter::{bandpass_filter, hilbert_filter, hilbert_filter_shifted, DEFAULT_BANDPASS_ORDER};
pub use transform::{forward_transform, forward_transform_real, frequency_axis, inverse_transform};
pub use window::{blackman, generate_window};
