//! Estimators for a single group-time comparison.
//!
//! A cell compares the outcome change `ΔY = Y_t − Y_base` of cohort units
//! (`D = 1`) with that of control units (`D = 0`). With `m(X)` the outcome
//! regression fitted on controls and `π(X)` the propensity score:
//!
//! ```text
//! dr:   ATT = E_n[D (ΔY − m)] / E_n[D]  −  E_n[w (ΔY − m)] / E_n[w],   w = π (1 − D) / (1 − π)
//! ipw:  ATT = E_n[D ΔY] / E_n[D]        −  E_n[w ΔY] / E_n[w]
//! reg:  ATT = E_n[D ΔY] / E_n[D]        −  E_n[D m] / E_n[D]
//! ```
//!
//! Each estimator also returns the influence function `ψ_i` over the cell
//! sample, normalised so that `ATT̂ − ATT ≈ (1/n) Σ ψ_i`, including the terms
//! from estimating the nuisance models.
//!
//! # References
//! - Sant'Anna, P. H. C. and Zhao, J. (2020). "Doubly robust
//!   difference-in-differences estimators." Journal of Econometrics, 219(1).

use crate::config::{EstimationMethod, EstimatorConfig};
use crate::nuisance::{
    LinearRegression, LogisticConfig, LogisticRegression, NuisanceError, NuisanceModel,
};
use ndarray::{Array1, Array2, Zip};
use std::fmt;

/// Units entering one group-time comparison.
#[derive(Debug, Clone)]
pub struct CellSample {
    units: Vec<usize>,
    treated: Array1<f64>,
    delta_y: Array1<f64>,
    design: Array2<f64>,
}

impl CellSample {
    /// Assemble a sample.
    ///
    /// # Arguments
    /// * `units` - Panel index of each row
    /// * `treated` - 1.0 for cohort units, 0.0 for controls
    /// * `delta_y` - Outcome change between the base period and `t`
    /// * `design` - Base-period covariates with a leading intercept column
    pub fn new(
        units: Vec<usize>,
        treated: Array1<f64>,
        delta_y: Array1<f64>,
        design: Array2<f64>,
    ) -> Result<Self, NuisanceError> {
        let n = units.len();
        for len in [treated.len(), delta_y.len(), design.nrows()] {
            if len != n {
                return Err(NuisanceError::DimensionMismatch {
                    expected: n,
                    actual: len,
                });
            }
        }
        if n == 0 {
            return Err(NuisanceError::EmptySample);
        }
        Ok(Self {
            units,
            treated,
            delta_y,
            design,
        })
    }

    /// Panel indices of the rows
    pub fn units(&self) -> &[usize] {
        &self.units
    }

    /// Treatment indicator
    pub const fn treated(&self) -> &Array1<f64> {
        &self.treated
    }

    /// Outcome changes
    pub const fn delta_y(&self) -> &Array1<f64> {
        &self.delta_y
    }

    /// Design matrix
    pub const fn design(&self) -> &Array2<f64> {
        &self.design
    }

    /// Rows in the sample
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Whether the sample has no rows
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Number of cohort units
    pub fn n_treated(&self) -> usize {
        self.treated.iter().filter(|&&d| d > 0.5).count()
    }

    /// Number of control units
    pub fn n_control(&self) -> usize {
        self.len() - self.n_treated()
    }
}

/// One unit's contribution to a cell, before assembly into arrays
#[derive(Debug, Clone, Copy)]
pub(crate) struct CellRow<'a> {
    pub(crate) unit: usize,
    pub(crate) treated: bool,
    pub(crate) delta_y: f64,
    pub(crate) covariates: &'a [f64],
}

impl CellSample {
    /// Assemble a sample with an intercept plus `n_covariates` columns
    pub(crate) fn from_rows(rows: &[CellRow<'_>], n_covariates: usize) -> Self {
        let n = rows.len();
        let mut units = Vec::with_capacity(n);
        let mut treated = Array1::zeros(n);
        let mut delta_y = Array1::zeros(n);
        let mut design = Array2::ones((n, 1 + n_covariates));
        for (i, row) in rows.iter().enumerate() {
            units.push(row.unit);
            treated[i] = if row.treated { 1.0 } else { 0.0 };
            delta_y[i] = row.delta_y;
            for (j, &value) in row.covariates.iter().take(n_covariates).enumerate() {
                design[[i, j + 1]] = value;
            }
        }
        Self {
            units,
            treated,
            delta_y,
            design,
        }
    }

    /// Whether the design holds only the intercept
    pub fn is_intercept_only(&self) -> bool {
        self.design.ncols() == 1
    }
}

/// Point estimate and influence function for one cell.
#[derive(Debug, Clone)]
pub struct CellFit {
    /// ATT estimate
    pub att: f64,
    /// Influence function over the cell sample
    pub influence: Array1<f64>,
}

/// Strategy for estimating one cell.
pub trait DidEstimator: Send + Sync + fmt::Debug {
    /// Method implemented by this estimator
    fn method(&self) -> EstimationMethod;

    /// Estimate the ATT and its influence function
    fn estimate(&self, sample: &CellSample) -> Result<CellFit, NuisanceError>;
}

/// Propensity score settings shared by `dr` and `ipw`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PropensityOptions {
    /// Newton-Raphson settings
    pub logistic: LogisticConfig,
    /// Scores are clipped to [ε, 1 − ε]
    pub epsilon: f64,
}

impl Default for PropensityOptions {
    fn default() -> Self {
        Self {
            logistic: LogisticConfig::default(),
            epsilon: 1e-6,
        }
    }
}

impl PropensityOptions {
    /// Options taken from an estimator configuration
    pub const fn from_config(config: &EstimatorConfig) -> Self {
        Self {
            logistic: LogisticConfig {
                max_iterations: config.max_iterations,
                tolerance: config.tolerance,
            },
            epsilon: config.pscore_epsilon,
        }
    }
}

/// Build the estimator selected by the configuration
pub fn estimator_for(config: &EstimatorConfig) -> Box<dyn DidEstimator> {
    let propensity = PropensityOptions::from_config(config);
    match config.estimation_method {
        EstimationMethod::DoublyRobust => Box::new(DoublyRobust::new(propensity)),
        EstimationMethod::InverseProbability => Box::new(InverseProbability::new(propensity)),
        EstimationMethod::OutcomeRegression => Box::new(OutcomeRegression),
    }
}

/// Fitted values and linear representation of a nuisance model
struct NuisanceFit {
    fitted: Array1<f64>,
    representation: Array2<f64>,
}

fn fit_nuisance<M: NuisanceModel>(
    mut model: M,
    design: &Array2<f64>,
    target: &Array1<f64>,
    weights: &Array1<f64>,
) -> Result<NuisanceFit, NuisanceError> {
    model.fit(design, target, weights)?;
    let fitted = model.predict(design)?;
    let representation = model.linear_representation(design, target, weights)?;
    if fitted.iter().any(|v| !v.is_finite()) {
        return Err(NuisanceError::Singular {
            min_eigenvalue: f64::NAN,
            max_eigenvalue: f64::NAN,
        });
    }
    log::trace!("{} fitted on {} rows", model.name(), design.nrows());
    Ok(NuisanceFit {
        fitted,
        representation,
    })
}

/// Outcome regression on the control rows, predicted for every row
fn outcome_model(sample: &CellSample) -> Result<NuisanceFit, NuisanceError> {
    let control = sample.treated.mapv(|d| 1.0 - d);
    fit_nuisance(LinearRegression::new(), &sample.design, &sample.delta_y, &control)
}

/// Propensity score on all rows, clipped
fn propensity_model(
    sample: &CellSample,
    options: &PropensityOptions,
) -> Result<NuisanceFit, NuisanceError> {
    let weights = Array1::ones(sample.len());
    let mut fit = fit_nuisance(
        LogisticRegression::new(options.logistic),
        &sample.design,
        &sample.treated,
        &weights,
    )?;
    let eps = options.epsilon;
    fit.fitted.mapv_inplace(|p| p.clamp(eps, 1.0 - eps));
    Ok(fit)
}

/// Control weights `π (1 − D) / (1 − π)`
fn control_weights(treated: &Array1<f64>, pscore: &Array1<f64>) -> Array1<f64> {
    Zip::from(treated)
        .and(pscore)
        .map_collect(|&d, &p| p * (1.0 - d) / (1.0 - p))
}

/// Column means of `X` weighted by `v`: `(1/n) X'v`
fn weighted_column_means(design: &Array2<f64>, v: &Array1<f64>) -> Array1<f64> {
    design.t().dot(v) / design.nrows() as f64
}

fn positive_mean(values: &Array1<f64>) -> Result<f64, NuisanceError> {
    let mean = values.mean().unwrap_or(0.0);
    if mean > 0.0 && mean.is_finite() {
        Ok(mean)
    } else {
        Err(NuisanceError::EmptySample)
    }
}

/// Doubly robust estimator.
#[derive(Debug, Clone, Default)]
pub struct DoublyRobust {
    propensity: PropensityOptions,
}

impl DoublyRobust {
    /// Create with the given propensity score options
    pub const fn new(propensity: PropensityOptions) -> Self {
        Self { propensity }
    }
}

impl DidEstimator for DoublyRobust {
    fn method(&self) -> EstimationMethod {
        EstimationMethod::DoublyRobust
    }

    fn estimate(&self, sample: &CellSample) -> Result<CellFit, NuisanceError> {
        let d = &sample.treated;
        let x = &sample.design;
        let outcome = outcome_model(sample)?;
        let pscore = propensity_model(sample, &self.propensity)?;

        let w_cont = control_weights(d, &pscore.fitted);
        let residual = &sample.delta_y - &outcome.fitted;
        let mean_treat = positive_mean(d)?;
        let mean_cont = positive_mean(&w_cont)?;

        let dr_treat = d * &residual;
        let dr_cont = &w_cont * &residual;
        let eta_treat = dr_treat.mean().unwrap_or(0.0) / mean_treat;
        let eta_cont = dr_cont.mean().unwrap_or(0.0) / mean_cont;

        // treated component, corrected for the outcome regression
        let m1 = weighted_column_means(x, d);
        let inf_treat =
            (&dr_treat - &(d * eta_treat) - outcome.representation.dot(&m1)) / mean_treat;

        // control component, corrected for both nuisance fits
        let m2 = weighted_column_means(x, &(&w_cont * &residual.mapv(|r| r - eta_cont)));
        let m3 = weighted_column_means(x, &w_cont);
        let inf_cont = (&dr_cont - &(&w_cont * eta_cont) + pscore.representation.dot(&m2)
            - outcome.representation.dot(&m3))
            / mean_cont;

        Ok(CellFit {
            att: eta_treat - eta_cont,
            influence: inf_treat - inf_cont,
        })
    }
}

/// Inverse probability weighting estimator.
#[derive(Debug, Clone, Default)]
pub struct InverseProbability {
    propensity: PropensityOptions,
}

impl InverseProbability {
    /// Create with the given propensity score options
    pub const fn new(propensity: PropensityOptions) -> Self {
        Self { propensity }
    }
}

impl DidEstimator for InverseProbability {
    fn method(&self) -> EstimationMethod {
        EstimationMethod::InverseProbability
    }

    fn estimate(&self, sample: &CellSample) -> Result<CellFit, NuisanceError> {
        let d = &sample.treated;
        let dy = &sample.delta_y;
        let pscore = propensity_model(sample, &self.propensity)?;

        let w_cont = control_weights(d, &pscore.fitted);
        let mean_treat = positive_mean(d)?;
        let mean_cont = positive_mean(&w_cont)?;

        let ipw_treat = d * dy;
        let ipw_cont = &w_cont * dy;
        let eta_treat = ipw_treat.mean().unwrap_or(0.0) / mean_treat;
        let eta_cont = ipw_cont.mean().unwrap_or(0.0) / mean_cont;

        let inf_treat = (&ipw_treat - &(d * eta_treat)) / mean_treat;
        let m2 = weighted_column_means(
            &sample.design,
            &(&w_cont * &dy.mapv(|v| v - eta_cont)),
        );
        let inf_cont =
            (&ipw_cont - &(&w_cont * eta_cont) + pscore.representation.dot(&m2)) / mean_cont;

        Ok(CellFit {
            att: eta_treat - eta_cont,
            influence: inf_treat - inf_cont,
        })
    }
}

/// Outcome regression estimator.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutcomeRegression;

impl DidEstimator for OutcomeRegression {
    fn method(&self) -> EstimationMethod {
        EstimationMethod::OutcomeRegression
    }

    fn estimate(&self, sample: &CellSample) -> Result<CellFit, NuisanceError> {
        let d = &sample.treated;
        let outcome = outcome_model(sample)?;
        let mean_treat = positive_mean(d)?;

        let reg_treat = d * &sample.delta_y;
        let reg_cont = d * &outcome.fitted;
        let eta_treat = reg_treat.mean().unwrap_or(0.0) / mean_treat;
        let eta_cont = reg_cont.mean().unwrap_or(0.0) / mean_treat;

        let inf_treat = (&reg_treat - &(d * eta_treat)) / mean_treat;
        let m1 = weighted_column_means(&sample.design, d);
        let inf_cont =
            (&reg_cont - &(d * eta_cont) + outcome.representation.dot(&m1)) / mean_treat;

        Ok(CellFit {
            att: eta_treat - eta_cont,
            influence: inf_treat - inf_cont,
        })
    }
}

/// Difference in mean outcome changes, ignoring covariates.
///
/// Used when a nuisance fit fails; it cannot fail itself once the sample
/// holds both treated and control rows.
pub fn unadjusted(sample: &CellSample) -> Result<CellFit, NuisanceError> {
    let n = sample.len() as f64;
    let n_treated = sample.n_treated() as f64;
    let n_control = n - n_treated;
    if n_treated == 0.0 || n_control == 0.0 {
        return Err(NuisanceError::EmptySample);
    }

    let (sum_treated, sum_control) = Zip::from(&sample.treated)
        .and(&sample.delta_y)
        .fold((0.0, 0.0), |(st, sc), &d, &dy| {
            if d > 0.5 { (st + dy, sc) } else { (st, sc + dy) }
        });
    let mean_treated = sum_treated / n_treated;
    let mean_control = sum_control / n_control;
    let share_treated = n_treated / n;
    let share_control = n_control / n;

    let influence = Zip::from(&sample.treated)
        .and(&sample.delta_y)
        .map_collect(|&d, &dy| {
            if d > 0.5 {
                (dy - mean_treated) / share_treated
            } else {
                -(dy - mean_control) / share_control
            }
        });

    Ok(CellFit {
        att: mean_treated - mean_control,
        influence,
    })
}
