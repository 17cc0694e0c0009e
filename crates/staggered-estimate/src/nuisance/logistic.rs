//! Logistic propensity score model fitted by Newton-Raphson.
//!
//! ```text
//! p_i   = Λ(x_i'γ) = 1 / (1 + exp(−x_i'γ))
//! score = X'W(y − p) / n
//! H     = X'W diag(p(1 − p)) X / n
//! γ    ← γ + H⁻¹ score            (halved until the log-likelihood does not fall)
//! ψ_i   = w_i (y_i − p_i) x_i' H⁻¹
//! ```
//!
//! Perfect separation shows up as a singular Hessian or as diverging
//! coefficients; both are reported as errors rather than clamped.

use super::linalg::{DEFAULT_RCOND, symmetric_inverse};
use super::{NuisanceError, NuisanceModel, check_columns, check_dimensions};
use ndarray::{Array1, Array2, Axis, Zip};
use serde::{Deserialize, Serialize};

const MAX_STEP_HALVINGS: usize = 30;

/// Newton-Raphson settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogisticConfig {
    /// Maximum Newton iterations (default: 50)
    pub max_iterations: usize,
    /// Relative coefficient change at which the fit has converged (default: 1e-10)
    pub tolerance: f64,
}

impl Default for LogisticConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            tolerance: 1e-10,
        }
    }
}

/// Weighted logistic regression with an intercept supplied in the design.
#[derive(Debug, Clone, Default)]
pub struct LogisticRegression {
    config: LogisticConfig,
    coefficients: Option<Array1<f64>>,
    bread: Option<Array2<f64>>,
}

impl LogisticRegression {
    /// Create an unfitted model
    pub const fn new(config: LogisticConfig) -> Self {
        Self {
            config,
            coefficients: None,
            bread: None,
        }
    }

    /// Inverse of the scaled Hessian `X'W diag(p(1 − p)) X / n`
    fn inverse_hessian(
        design: &Array2<f64>,
        weights: &Array1<f64>,
        prob: &Array1<f64>,
    ) -> Result<Array2<f64>, NuisanceError> {
        let n = design.nrows() as f64;
        let curvature = Zip::from(weights)
            .and(prob)
            .map_collect(|&w, &p| w * p * (1.0 - p));
        let weighted = design * &curvature.insert_axis(Axis(1));
        symmetric_inverse(&(design.t().dot(&weighted) / n), DEFAULT_RCOND)
    }
}

fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

fn log_likelihood(
    design: &Array2<f64>,
    target: &Array1<f64>,
    weights: &Array1<f64>,
    gamma: &Array1<f64>,
) -> f64 {
    let eta = design.dot(gamma);
    Zip::from(&eta)
        .and(target)
        .and(weights)
        .fold(0.0, |acc, &e, &y, &w| {
            // log(1 + exp(e)) without overflow
            let softplus = e.max(0.0) + (-e.abs()).exp().ln_1p();
            acc + w * (y * e - softplus)
        })
}

impl NuisanceModel for LogisticRegression {
    fn name(&self) -> &'static str {
        "propensity score"
    }

    fn fit(
        &mut self,
        design: &Array2<f64>,
        target: &Array1<f64>,
        weights: &Array1<f64>,
    ) -> Result<(), NuisanceError> {
        check_dimensions(design, target, weights)?;
        let n = design.nrows() as f64;

        let mut gamma = Array1::<f64>::zeros(design.ncols());
        let mut loglik = log_likelihood(design, target, weights, &gamma);
        let mut last_step = f64::INFINITY;

        for iteration in 0..self.config.max_iterations {
            let prob = design.dot(&gamma).mapv(sigmoid);
            let residual = Zip::from(weights)
                .and(target)
                .and(&prob)
                .map_collect(|&w, &y, &p| w * (y - p));
            let score = design.t().dot(&residual) / n;
            let step = Self::inverse_hessian(design, weights, &prob)?.dot(&score);

            let mut scale = 1.0;
            let mut candidate = &gamma + &step;
            let mut candidate_loglik = log_likelihood(design, target, weights, &candidate);
            let mut halvings = 0;
            while candidate_loglik < loglik - 1e-12 * loglik.abs() {
                halvings += 1;
                if halvings > MAX_STEP_HALVINGS {
                    return Err(NuisanceError::NotConverged {
                        iterations: iteration + 1,
                        last_step,
                    });
                }
                scale /= 2.0;
                candidate = &gamma + &(&step * scale);
                candidate_loglik = log_likelihood(design, target, weights, &candidate);
            }

            last_step = step.iter().fold(0.0_f64, |m, s| m.max((s * scale).abs()));
            gamma = candidate;
            loglik = candidate_loglik;

            if gamma.iter().any(|g| !g.is_finite()) {
                break;
            }

            let magnitude = gamma.iter().fold(0.0_f64, |m, g| m.max(g.abs()));
            if last_step < self.config.tolerance * (1.0 + magnitude) {
                let prob = design.dot(&gamma).mapv(sigmoid);
                self.bread = Some(Self::inverse_hessian(design, weights, &prob)?);
                self.coefficients = Some(gamma);
                log::trace!("Logistic fit converged after {} iterations", iteration + 1);
                return Ok(());
            }
        }

        Err(NuisanceError::NotConverged {
            iterations: self.config.max_iterations,
            last_step,
        })
    }

    fn predict(&self, design: &Array2<f64>) -> Result<Array1<f64>, NuisanceError> {
        let gamma = self.coefficients.as_ref().ok_or(NuisanceError::NotFitted)?;
        check_columns(design, gamma)?;
        Ok(design.dot(gamma).mapv(sigmoid))
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
        let prob = self.predict(design)?;
        let residual = Zip::from(weights)
            .and(target)
            .and(&prob)
            .map_collect(|&w, &y, &p| w * (y - p));
        let scores = design * &residual.insert_axis(Axis(1));
        Ok(scores.dot(bread))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_intercept_only_matches_logit_of_mean() {
        let x = Array2::ones((5, 1));
        let y = array![1.0, 0.0, 0.0, 1.0, 1.0];
        let mut model = LogisticRegression::default();
        model.fit(&x, &y, &Array1::ones(5)).unwrap();

        let gamma = model.coefficients().unwrap();
        assert_abs_diff_eq!(gamma[0], (0.6_f64 / 0.4).ln(), epsilon = 1e-9);
        assert_abs_diff_eq!(model.predict(&x).unwrap()[0], 0.6, epsilon = 1e-9);
    }

    #[test]
    fn test_score_vanishes_at_solution() {
        let x = array![
            [1.0, -1.5],
            [1.0, -0.5],
            [1.0, 0.2],
            [1.0, 0.4],
            [1.0, 1.1],
            [1.0, 2.0],
            [1.0, -0.2],
            [1.0, 0.9]
        ];
        let y = array![0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 1.0, 0.0];
        let w = Array1::ones(8);
        let mut model = LogisticRegression::default();
        model.fit(&x, &y, &w).unwrap();

        let rep = model.linear_representation(&x, &y, &w).unwrap();
        for col in rep.columns() {
            assert_abs_diff_eq!(col.sum(), 0.0, epsilon = 1e-8);
        }
        assert!(model.coefficients().unwrap()[1] > 0.0);
    }

    #[test]
    fn test_perfect_separation_fails() {
        let x = array![[1.0, -2.0], [1.0, -1.0], [1.0, 1.0], [1.0, 2.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let result = LogisticRegression::default().fit(&x, &y, &Array1::ones(4));
        assert!(result.is_err());
    }

    #[test]
    fn test_sigmoid_is_stable() {
        assert_abs_diff_eq!(sigmoid(800.0), 1.0);
        assert_abs_diff_eq!(sigmoid(-800.0), 0.0);
        assert_abs_diff_eq!(sigmoid(0.0), 0.5);
    }
}
