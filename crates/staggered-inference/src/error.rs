//! Error types for inference.

use staggered_estimate::EstimateError;
use thiserror::Error;

/// Errors that stop an inference run
#[derive(Debug, Error)]
pub enum InferenceError {
    /// Estimation on the full sample failed
    #[error("Estimation error: {0}")]
    Estimate(#[from] EstimateError),

    /// Cancellation requested through the token
    #[error("Inference cancelled")]
    Cancelled,

    /// Significance level outside (0, 1)
    #[error("Invalid alpha {0}: must lie strictly between 0 and 1")]
    InvalidAlpha(f64),
}
