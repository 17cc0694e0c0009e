//! End-to-end estimation pipeline.
//!
//! Group-time effects are estimated first, the configured aggregation is
//! built from them, inference runs over every estimand and the pieces are
//! assembled into a [`ResultSet`].

use crate::error::FitError;
use polars::prelude::DataFrame;
use staggered_estimate::{CancelToken, EstimatorConfig, GroupTimeEngine};
use staggered_inference::{InferenceEngine, collect_estimands};
use staggered_output::{ResultSet, ResultSetBuilder};
use staggered_panel::{ColumnBindings, PanelTable};

/// Anticipation windows used when no explicit list is given.
pub const DEFAULT_ANTICIPATION_SWEEP: [u32; 4] = [0, 1, 7, 14];

/// Staggered-adoption difference-in-differences estimator.
#[derive(Debug, Clone)]
pub struct StaggeredDid {
    config: EstimatorConfig,
    cancel: Option<CancelToken>,
}

impl StaggeredDid {
    /// Create an estimator, validating the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`FitError::Config`] if a value is out of range.
    pub fn new(config: EstimatorConfig) -> Result<Self, FitError> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: None,
        })
    }

    /// Stop between cells and bootstrap replicates once the token is cancelled
    pub fn with_cancellation(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Configuration of this estimator
    pub const fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Fit on a validated panel.
    ///
    /// # Errors
    ///
    /// Returns an error if no group-time cell is feasible, if the run is
    /// cancelled, or if inference fails.
    pub fn fit(&self, panel: &PanelTable) -> Result<ResultSet, FitError> {
        Self::fit_with(&self.config, self.cancel.as_ref(), panel)
    }

    /// Build the panel from a table and fit on it.
    ///
    /// # Errors
    ///
    /// Returns [`FitError::Panel`] if the table does not validate, otherwise
    /// the errors of [`fit`](Self::fit).
    pub fn fit_dataframe(
        &self,
        df: &DataFrame,
        bindings: &ColumnBindings,
    ) -> Result<ResultSet, FitError> {
        let panel = PanelTable::from_dataframe(df, bindings)?;
        self.fit(&panel)
    }

    /// Fit once per anticipation window.
    ///
    /// Windows that leave no feasible cell are logged and left out of the
    /// result; every other error stops the sweep.
    ///
    /// # Arguments
    /// * `panel` - Panel to fit
    /// * `windows` - Anticipation values, in the order they are reported
    ///
    /// # Returns
    /// * `(anticipation, results)` for each feasible window
    pub fn anticipation_sweep(
        &self,
        panel: &PanelTable,
        windows: &[u32],
    ) -> Result<Vec<(u32, ResultSet)>, FitError> {
        let mut runs = Vec::with_capacity(windows.len());
        for &anticipation in windows {
            let config = self.config.with_anticipation(anticipation);
            match Self::fit_with(&config, self.cancel.as_ref(), panel) {
                Ok(results) => runs.push((anticipation, results)),
                Err(e) if e.is_infeasible() => {
                    log::warn!("Anticipation {anticipation}: {e}, skipping");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(runs)
    }

    fn fit_with(
        config: &EstimatorConfig,
        cancel: Option<&CancelToken>,
        panel: &PanelTable,
    ) -> Result<ResultSet, FitError> {
        log::info!(
            "Fitting {} units over {} periods ({} control, {} estimator, anticipation {})",
            panel.n_units(),
            panel.n_periods(),
            config.control_group,
            config.estimation_method,
            config.anticipation
        );

        let mut engine = GroupTimeEngine::new(config)?;
        if let Some(token) = cancel {
            engine = engine.with_cancellation(token.clone());
        }
        let table = engine.estimate(panel)?;
        log::info!(
            "Estimated {} group-time cells, {} skipped",
            table.effects().len(),
            table.skipped().len()
        );

        let estimands = collect_estimands(&table, config.aggregate);

        let mut inference = InferenceEngine::new(config)?;
        if let Some(token) = cancel {
            inference = inference.with_cancellation(token.clone());
        }
        let report = inference.infer(panel, &estimands)?;
        log::info!(
            "Inference done: {} estimands via {}",
            report.results().len(),
            report.method()
        );

        let results = ResultSetBuilder::new()
            .config(config.clone())
            .panel(panel)
            .table(&table)
            .inference(&report)
            .build()?;
        Ok(results)
    }
}
