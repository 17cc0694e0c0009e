//! Weighted least squares outcome regression.
//!
//! ```text
//! β̂ = (X'WX)⁻¹ X'Wy
//! ψ_i = w_i (y_i − x_i'β̂) x_i' (X'WX / n)⁻¹
//! ```

use super::linalg::{DEFAULT_RCOND, symmetric_inverse};
use super::{NuisanceError, NuisanceModel, check_columns, check_dimensions};
use ndarray::{Array1, Array2, Axis};

/// Weighted linear regression with an intercept supplied in the design.
#[derive(Debug, Clone, Default)]
pub struct LinearRegression {
    coefficients: Option<Array1<f64>>,
    bread: Option<Array2<f64>>,
}

impl LinearRegression {
    /// Create an unfitted regression
    pub fn new() -> Self {
        Self::default()
    }
}

impl NuisanceModel for LinearRegression {
    fn name(&self) -> &'static str {
        "outcome regression"
    }

    fn fit(
        &mut self,
        design: &Array2<f64>,
        target: &Array1<f64>,
        weights: &Array1<f64>,
    ) -> Result<(), NuisanceError> {
        check_dimensions(design, target, weights)?;
        let n = design.nrows() as f64;

        let weighted = design * &weights.view().insert_axis(Axis(1));
        let gram = design.t().dot(&weighted) / n;
        let moment = weighted.t().dot(target) / n;
        let bread = symmetric_inverse(&gram, DEFAULT_RCOND)?;

        self.coefficients = Some(bread.dot(&moment));
        self.bread = Some(bread);
        Ok(())
    }

    fn predict(&self, design: &Array2<f64>) -> Result<Array1<f64>, NuisanceError> {
        let beta = self.coefficients.as_ref().ok_or(NuisanceError::NotFitted)?;
        check_columns(design, beta)?;
        Ok(design.dot(beta))
    }

    fn coefficients(&self) -> Option<&Array1<f64>> {
        self.coefficients.as_ref()
    }

    fn linear_representation(
        &self,
        design: &Array2<f64>,
        target: &Array1<f64>,
        weights: &Array1<f64>,
    ) -> Result<Array2<f64>, NuisanceError> {
        check_dimensions(design, target, weights)?;
        let bread = self.bread.as_ref().ok_or(NuisanceError::NotFitted)?;
        let residuals = target - &self.predict(design)?;
        let scores = design * &(weights * &residuals).insert_axis(Axis(1));
        Ok(scores.dot(bread))
    }
}
