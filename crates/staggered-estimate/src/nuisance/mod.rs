//! Nuisance models for the group-time comparisons.
//!
//! Two models feed the doubly robust estimator:
//! ```text
//! outcome regression:  E[ΔY | X, D = 0] = X'β        (weighted least squares on controls)
//! propensity score:    P(D = 1 | X)     = Λ(X'γ)     (logistic regression on the cell)
//! ```
//!
//! Both expose their asymptotically linear representation, the per-unit
//! contribution `ψ_i` with `θ̂ - θ ≈ (1/n) Σ ψ_i`, which the cell estimators
//! need to account for nuisance estimation in the influence function.

pub mod linalg;
pub mod logistic;
pub mod ols;

pub use linalg::{EigenDecomposition, jacobi_eigendecomp, symmetric_inverse};
pub use logistic::{LogisticConfig, LogisticRegression};
pub use ols::LinearRegression;

use ndarray::{Array1, Array2};
use thiserror::Error;

/// Errors from fitting or evaluating a nuisance model
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NuisanceError {
    /// The normal equations or the Hessian are singular
    #[error("Singular design: smallest eigenvalue {min_eigenvalue:.3e} relative to largest {max_eigenvalue:.3e}")]
    Singular {
        /// Smallest eigenvalue
        min_eigenvalue: f64,
        /// Largest eigenvalue
        max_eigenvalue: f64,
    },

    /// Newton iterations did not converge
    #[error("Logistic fit did not converge after {iterations} iterations (last step {last_step:.3e})")]
    NotConverged {
        /// Iterations performed
        iterations: usize,
        /// Largest coefficient change in the final step
        last_step: f64,
    },

    /// Array dimensions do not agree
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected dimension
        expected: usize,
        /// Actual dimension
        actual: usize,
    },

    /// No observations carry positive weight
    #[error("Empty estimation sample")]
    EmptySample,

    /// `predict` called before `fit`
    #[error("Model has not been fitted")]
    NotFitted,
}

/// A model fitted per group-time cell.
pub trait NuisanceModel: Send + Sync {
    /// Model name for logging
    fn name(&self) -> &'static str;

    /// Fit on a design matrix (intercept included), target and observation weights
    fn fit(
        &mut self,
        design: &Array2<f64>,
        target: &Array1<f64>,
        weights: &Array1<f64>,
    ) -> Result<(), NuisanceError>;

    /// Predict for every row of the design matrix
    fn predict(&self, design: &Array2<f64>) -> Result<Array1<f64>, NuisanceError>;

    /// Fitted coefficients, if fitted
    fn coefficients(&self) -> Option<&Array1<f64>>;

    /// Asymptotically linear representation of the coefficients.
    ///
    /// Row `i` holds unit `i`'s contribution, so the returned matrix has one
    /// row per observation and one column per coefficient.
    fn linear_representation(
        &self,
        design: &Array2<f64>,
        target: &Array1<f64>,
        weights: &Array1<f64>,
    ) -> Result<Array2<f64>, NuisanceError>;
}

/// Check that a design matrix, target and weights agree in length
pub(crate) fn check_dimensions(
    design: &Array2<f64>,
    target: &Array1<f64>,
    weights: &Array1<f64>,
) -> Result<(), NuisanceError> {
    let n = design.nrows();
    if target.len() != n {
        return Err(NuisanceError::DimensionMismatch {
            expected: n,
            actual: target.len(),
        });
    }
    if weights.len() != n {
        return Err(NuisanceError::DimensionMismatch {
            expected: n,
            actual: weights.len(),
        });
    }
    if n == 0 || weights.sum() <= 0.0 {
        return Err(NuisanceError::EmptySample);
    }
    Ok(())
}

/// Check that a coefficient vector matches the design's column count
pub(crate) fn check_columns(
    design: &Array2<f64>,
    coefficients: &Array1<f64>,
) -> Result<(), NuisanceError> {
    if design.ncols() != coefficients.len() {
        return Err(NuisanceError::DimensionMismatch {
            expected: coefficients.len(),
            actual: design.ncols(),
        });
    }
    Ok(())
}
