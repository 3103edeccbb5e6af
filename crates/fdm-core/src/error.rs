//! Error taxonomy for the demodulation core.
//!
//! Every error is local to the operation that raised it; nothing in the core
//! retries. The fix is always to correct the input and re-run from the
//! failing stage.

use crate::fit::FitParams;
use crate::store::StoreError;
use thiserror::Error;

/// Errors raised by the pipeline, the PSD accumulator and the model fits
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// A stage ran before the stage that produces the state it reads
    #[error("stage `{stage}` requires `{requires}` to run first")]
    PrerequisiteMissing {
        stage: &'static str,
        requires: &'static str,
    },

    /// A parameter is geometrically or physically impossible
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Array lengths that must agree do not
    #[error("shape mismatch in {context}: expected length {expected}, found {found}")]
    ShapeMismatch {
        context: String,
        expected: usize,
        found: usize,
    },

    /// The nonlinear solver failed or produced non-finite parameters
    #[error("fit did not converge: {reason} (last guess: {guess})")]
    FitDidNotConverge {
        reason: String,
        guess: FitParams,
    },

    /// Not enough data to weight or fit
    #[error("insufficient data: need {needed}, have {available}")]
    InsufficientData { needed: usize, available: usize },

    /// Record store failure
    #[error("record store: {0}")]
    Store(#[from] StoreError),
}

/// Result alias for fdm-core operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidConfiguration(msg.into())
    }

    pub(crate) fn shape(context: impl Into<String>, expected: usize, found: usize) -> Self {
        Error::ShapeMismatch {
            context: context.into(),
            expected,
            found,
        }
    }
}
