//! Error and diagnostic types for the zero-field-splitting engine.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An enumerated type for fatal failures of a zero-field-splitting calculation.
///
/// None of these are retried: every one of them means that the inputs themselves are unusable, or
/// that one of the workers has aborted and the global sum can no longer be trusted.
#[derive(Clone, Debug, Error)]
pub enum ZfsError {
    /// Invalid or inconsistent inputs: mismatched grids, inconsistent spin channels, a dipolar
    /// kernel built for another geometry, malformed cells or coefficient arrays.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A collective reduction over the process group could not be completed.
    #[error("collective reduction failed: {0}")]
    Communication(String),

    /// A numeric backend failed after it had been selected for this process.
    #[error("numeric backend failure: {0}")]
    Backend(String),
}

impl ZfsError {
    /// Convenience constructor for [`ZfsError::Configuration`].
    pub(crate) fn configuration<S: Into<String>>(msg: S) -> Self {
        ZfsError::Configuration(msg.into())
    }
}

/// An enumerated type for non-fatal events recorded during a calculation and surfaced to the
/// caller alongside the result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ZfsDiagnostic {
    /// The trace of the symmetrised tensor, relative to its norm, exceeded the tolerance before it
    /// was removed. This usually indicates a truncated or severely under-sampled grid.
    NumericalWarning {
        /// The relative trace residual that was observed.
        trace_residual: f64,

        /// The tolerance that was exceeded.
        tolerance: f64,
    },

    /// The requested acceleration backend could not be used and the standard backend was used in
    /// its place.
    BackendUnavailable {
        /// The backend that had been requested.
        requested: String,

        /// The reason the requested backend could not be used.
        reason: String,
    },
}

impl fmt::Display for ZfsDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZfsDiagnostic::NumericalWarning {
                trace_residual,
                tolerance,
            } => write!(
                f,
                "Numerical warning: relative trace residual {trace_residual:.3e} exceeds tolerance {tolerance:.3e}"
            ),
            ZfsDiagnostic::BackendUnavailable { requested, reason } => write!(
                f,
                "Backend unavailable: `{requested}` could not be used ({reason}); falling back to the standard backend"
            ),
        }
    }
}
