//! Result and error types representing the outcome of running an analysis over a function.

use crate::settings::SetError;
use crate::verifier::VerifierErrors;
use thiserror::Error;

/// An analysis error.
///
/// Analyses never fail because they lack precision; imprecision is always resolved toward the
/// conservative answer. These errors report malformed input or configuration.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MidendError {
    /// A list of IR verifier errors.
    ///
    /// This always represents a bug, either in the code that generated the IR, or a bug in one of
    /// the transformations of this crate (assertion insertion and removal rewrite the function).
    #[error("Verifier errors")]
    Verifier(#[from] VerifierErrors),

    /// A setting could not be applied.
    #[error("Invalid setting: {0}")]
    Settings(#[from] SetError),

    /// The function has no entry block, so there is nothing to analyze.
    #[error("Function has no entry block")]
    MissingEntry,
}

/// A convenient alias for a `Result` that uses `MidendError` as the error type.
pub type MidendResult<T> = Result<T, MidendError>;
