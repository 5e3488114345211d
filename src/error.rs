//! Error taxonomy for the batch synthesis pipeline.
//!
//! Callers match on the variant to decide whether a failure is their fault
//! (`Validation`) or the service's (everything else). Internals below the
//! engine adapter use `anyhow` and are converted at the seam.

use thiserror::Error;

/// Failures surfaced by the batch synthesis pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// The request itself is malformed (empty batch, oversized chunk, ...).
    #[error("validation error: {0}")]
    Validation(String),

    /// The model session could not be built (missing files, bad config).
    #[error("engine load error: {0}")]
    EngineLoad(String),

    /// The loaded engine failed during generation or produced inconsistent
    /// output shapes.
    #[error("engine generation error: {0}")]
    EngineGeneration(String),

    /// The one-time warmup pass failed. Logged and swallowed, never fatal.
    #[error("warmup error: {0}")]
    Warmup(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True when the failure is attributable to the caller's request.
    pub fn is_caller_fault(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}
