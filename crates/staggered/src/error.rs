//! Error type of the end-to-end pipeline.

use staggered_estimate::{ConfigError, EstimateError};
use staggered_inference::InferenceError;
use staggered_output::ResultSetError;
use staggered_panel::PanelError;
use thiserror::Error;

/// Errors returned by [`StaggeredDid`](crate::StaggeredDid).
#[derive(Debug, Error)]
pub enum FitError {
    /// Configuration rejected before computation
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Panel could not be built from the input table
    #[error("Panel error: {0}")]
    Panel(#[from] PanelError),

    /// Group-time estimation failed
    #[error("Estimation error: {0}")]
    Estimate(#[from] EstimateError),

    /// Inference failed
    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    /// Results could not be assembled
    #[error("Result error: {0}")]
    ResultSet(#[from] ResultSetError),
}

impl FitError {
    /// Whether the run stopped because cancellation was requested
    pub const fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Estimate(EstimateError::Cancelled)
                | Self::Inference(InferenceError::Cancelled | InferenceError::Estimate(EstimateError::Cancelled))
        )
    }

    /// Whether every group-time cell was infeasible
    pub const fn is_infeasible(&self) -> bool {
        matches!(self, Self::Estimate(EstimateError::NoFeasibleCells { .. }))
    }
}
