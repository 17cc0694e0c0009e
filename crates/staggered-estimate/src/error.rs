//! Error types for estimation.

use crate::config::ConfigError;
use staggered_panel::PanelError;
use thiserror::Error;

/// Errors that stop a group-time estimation run.
///
/// Problems confined to a single cell never surface here; they are recorded
/// as skipped cells or diagnostics instead.
#[derive(Debug, Error)]
pub enum EstimateError {
    /// Configuration rejected before computation
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Panel construction failed
    #[error("Panel error: {0}")]
    Panel(#[from] PanelError),

    /// Every cell was skipped
    #[error("No feasible group-time cell: {cohorts} cohorts, {skipped} cells skipped")]
    NoFeasibleCells {
        /// Treated cohorts considered
        cohorts: usize,
        /// Cells skipped
        skipped: usize,
    },

    /// Cancellation requested through the token
    #[error("Estimation cancelled")]
    Cancelled,
}
