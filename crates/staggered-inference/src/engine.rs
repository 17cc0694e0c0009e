//! Standard errors for every estimand of a fit.

use crate::analytic::cluster_robust_variance;
use crate::bootstrap::{BootstrapDraws, ClusterBootstrap};
use crate::error::InferenceError;
use crate::estimand::{Estimand, EstimandValue, collect_estimands};
use crate::interval::{Inference, percentile_interval, sample_std, two_sided_p_value};
use serde::{Deserialize, Serialize};
use staggered_estimate::{
    CancelToken, Diagnostic, EstimatorConfig, GroupTimeEngine, IntervalMethod,
};
use staggered_panel::PanelTable;
use std::collections::BTreeMap;
use std::fmt;

/// How standard errors were obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceMethod {
    /// Cluster-robust influence-function variance
    Analytic,
    /// Cluster bootstrap
    Bootstrap {
        /// Replicates drawn
        replicates: usize,
    },
}

impl fmt::Display for InferenceMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Analytic => write!(f, "analytic (influence function)"),
            Self::Bootstrap { replicates } => {
                write!(f, "cluster bootstrap ({replicates} replicates)")
            }
        }
    }
}

/// Inference for every estimand of a fit
#[derive(Debug, Clone)]
pub struct InferenceReport {
    method: InferenceMethod,
    n_clusters: usize,
    results: BTreeMap<Estimand, Inference>,
    diagnostics: Vec<Diagnostic>,
}

impl InferenceReport {
    /// Method used
    pub const fn method(&self) -> InferenceMethod {
        self.method
    }

    /// Clusters in the panel
    pub const fn n_clusters(&self) -> usize {
        self.n_clusters
    }

    /// All results
    pub const fn results(&self) -> &BTreeMap<Estimand, Inference> {
        &self.results
    }

    /// Result for one estimand
    pub fn get(&self, estimand: &Estimand) -> Option<&Inference> {
        self.results.get(estimand)
    }

    /// Degenerate variances and dropped replicates
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }
}

/// Computes inference by the method selected in the configuration.
///
/// `n_bootstrap = 0` selects the analytic variance; otherwise the full
/// group-time pipeline is re-run on `n_bootstrap` cluster resamples.
#[derive(Debug, Clone)]
pub struct InferenceEngine {
    config: EstimatorConfig,
    cancel: Option<CancelToken>,
}

impl InferenceEngine {
    /// Create an engine for the given configuration
    pub fn new(config: &EstimatorConfig) -> Result<Self, InferenceError> {
        if !(config.alpha > 0.0 && config.alpha < 1.0) {
            return Err(InferenceError::InvalidAlpha(config.alpha));
        }
        Ok(Self {
            config: config.clone(),
            cancel: None,
        })
    }

    /// Stop between replicates and cells once the token is cancelled
    pub fn with_cancellation(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Inference for every estimand.
    ///
    /// # Arguments
    /// * `panel` - Full-sample panel the estimands were computed on
    /// * `estimands` - Point estimates and influence functions
    pub fn infer(
        &self,
        panel: &PanelTable,
        estimands: &BTreeMap<Estimand, EstimandValue>,
    ) -> Result<InferenceReport, InferenceError> {
        let mut diagnostics = Vec::new();
        let n_clusters = panel.n_clusters();
        if n_clusters < 2 {
            log::warn!("Only {n_clusters} cluster available, variances are degenerate");
            diagnostics.push(Diagnostic::SingleCluster);
        }

        let (method, results) = if self.config.uses_bootstrap() {
            let draws = self.bootstrap(panel)?;
            let results = self.bootstrap_results(&draws, estimands, &mut diagnostics);
            (
                InferenceMethod::Bootstrap {
                    replicates: draws.n_replicates(),
                },
                results,
            )
        } else {
            (
                InferenceMethod::Analytic,
                self.analytic_results(panel, estimands),
            )
        };

        let degenerate: Vec<&Estimand> = results
            .iter()
            .filter(|(_, r)| r.is_degenerate())
            .map(|(k, _)| k)
            .collect();
        if !degenerate.is_empty() && n_clusters >= 2 {
            log::warn!("{} estimands have a degenerate variance", degenerate.len());
        }
        diagnostics.extend(degenerate.into_iter().map(|k| Diagnostic::DegenerateVariance {
            estimand: k.to_string(),
        }));

        Ok(InferenceReport {
            method,
            n_clusters,
            results,
            diagnostics,
        })
    }

    fn analytic_results(
        &self,
        panel: &PanelTable,
        estimands: &BTreeMap<Estimand, EstimandValue>,
    ) -> BTreeMap<Estimand, Inference> {
        let clusters = panel.unit_clusters();
        let n_clusters = panel.n_clusters();
        estimands
            .iter()
            .map(|(&key, value)| {
                let se = cluster_robust_variance(&value.influence, &clusters, n_clusters)
                    .map_or(0.0, f64::sqrt);
                (key, Inference::from_se(value.estimate, se, self.config.alpha))
            })
            .collect()
    }

    fn bootstrap(&self, panel: &PanelTable) -> Result<BootstrapDraws, InferenceError> {
        let mut engine = GroupTimeEngine::new(&self.config)?.quiet();
        let mut bootstrap = ClusterBootstrap::new(self.config.n_bootstrap, self.config.seed);
        if let Some(token) = &self.cancel {
            engine = engine.with_cancellation(token.clone());
            bootstrap = bootstrap.with_cancellation(token.clone());
        }
        let aggregation = self.config.aggregate;

        log::info!(
            "Running {} bootstrap replicates over {} clusters",
            self.config.n_bootstrap,
            panel.n_clusters()
        );
        bootstrap.run(panel, |sample| match engine.estimate(sample) {
            Ok(table) => Some(
                collect_estimands(&table, aggregation)
                    .into_iter()
                    .map(|(key, value)| (key, value.estimate))
                    .collect(),
            ),
            Err(err) => {
                log::debug!("Bootstrap replicate infeasible: {err}");
                None
            }
        })
    }

    fn bootstrap_results(
        &self,
        draws: &BootstrapDraws,
        estimands: &BTreeMap<Estimand, EstimandValue>,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> BTreeMap<Estimand, Inference> {
        let alpha = self.config.alpha;
        let total = draws.n_replicates();

        estimands
            .iter()
            .map(|(&key, value)| {
                let estimate = value.estimate;
                let mut replicates = draws.values(&key);
                let dropped = total - replicates.len();
                if dropped > 0 {
                    diagnostics.push(Diagnostic::ReplicatesDropped {
                        estimand: key.to_string(),
                        dropped,
                        total,
                    });
                }

                let Some(se) = sample_std(&replicates) else {
                    return (key, Inference::degenerate(estimate, 0.0));
                };
                let inference = match self.config.interval {
                    IntervalMethod::Normal => Inference::from_se(estimate, se, alpha),
                    IntervalMethod::Percentile => {
                        replicates.sort_by(f64::total_cmp);
                        match percentile_interval(&replicates, alpha) {
                            Some(conf_int) if se > 0.0 => Inference {
                                se,
                                conf_int,
                                p_value: Some(two_sided_p_value(estimate / se)),
                            },
                            _ => Inference::degenerate(estimate, se),
                        }
                    }
                };
                (key, inference)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};
    use staggered_panel::PanelRecord;

    /// Cohorts 3 and 4 over periods 1..=4, noisy outcomes
    fn noisy_panel(n_per_group: usize, seed: u64) -> PanelTable {
        let mut rng = StdRng::seed_from_u64(seed);
        let noise = Normal::new(0.0, 1.0).unwrap();
        let mut records = Vec::new();
        for (label, first_treat) in [("a", 3), ("b", 4), ("n", 0)] {
            for i in 0..n_per_group {
                let level = noise.sample(&mut rng);
                for t in 1..=4i64 {
                    let treated = first_treat > 0 && t >= first_treat;
                    records.push(PanelRecord {
                        unit: format!("{label}{i:03}"),
                        time: t,
                        outcome: level + 0.5 * t as f64
                            + if treated { 1.0 } else { 0.0 }
                            + noise.sample(&mut rng),
                        first_treat,
                        cluster: None,
                        covariates: Vec::new(),
                    });
                }
            }
        }
        PanelTable::from_records(records, vec![], 0).unwrap()
    }

    fn estimands(panel: &PanelTable, config: &EstimatorConfig) -> BTreeMap<Estimand, EstimandValue> {
        let table = GroupTimeEngine::new(config).unwrap().estimate(panel).unwrap();
        collect_estimands(&table, config.aggregate)
    }

    #[test]
    fn test_analytic_and_bootstrap_agree() {
        let panel = noisy_panel(150, 5);
        let analytic_config = EstimatorConfig::default();
        let values = estimands(&panel, &analytic_config);

        let analytic = InferenceEngine::new(&analytic_config)
            .unwrap()
            .infer(&panel, &values)
            .unwrap();
        let bootstrap_config = EstimatorConfig {
            n_bootstrap: 299,
            ..EstimatorConfig::default()
        };
        let bootstrap = InferenceEngine::new(&bootstrap_config)
            .unwrap()
            .infer(&panel, &values)
            .unwrap();

        assert_eq!(analytic.method(), InferenceMethod::Analytic);
        assert_eq!(bootstrap.method(), InferenceMethod::Bootstrap { replicates: 299 });

        let a = analytic.get(&Estimand::Overall).unwrap().se;
        let b = bootstrap.get(&Estimand::Overall).unwrap().se;
        let ratio = b / a;
        assert!(ratio > 0.75 && ratio < 1.33, "analytic {a}, bootstrap {b}");
        assert!(analytic.diagnostics().is_empty());
    }

    #[test]
    fn test_bootstrap_is_bit_identical_across_runs() {
        let panel = noisy_panel(30, 9);
        let config = EstimatorConfig {
            n_bootstrap: 40,
            seed: 2024,
            ..EstimatorConfig::default()
        };
        let values = estimands(&panel, &config);
        let engine = InferenceEngine::new(&config).unwrap();
        let first = engine.infer(&panel, &values).unwrap();
        let second = engine.infer(&panel, &values).unwrap();

        for (key, result) in first.results() {
            let other = second.get(key).unwrap();
            assert_eq!(result.se.to_bits(), other.se.to_bits(), "{key}");
            assert_eq!(result.conf_int, other.conf_int);
        }
    }

    #[test]
    fn test_percentile_interval_brackets_estimate() {
        let panel = noisy_panel(60, 13);
        let config = EstimatorConfig {
            n_bootstrap: 199,
            interval: IntervalMethod::Percentile,
            ..EstimatorConfig::default()
        };
        let values = estimands(&panel, &config);
        let report = InferenceEngine::new(&config)
            .unwrap()
            .infer(&panel, &values)
            .unwrap();

        let overall = report.get(&Estimand::Overall).unwrap();
        let estimate = values[&Estimand::Overall].estimate;
        assert!(overall.conf_int.0 < estimate && estimate < overall.conf_int.1);
        assert!(overall.p_value.is_some());
    }

    #[test]
    fn test_noiseless_panel_is_degenerate() {
        let mut records = Vec::new();
        for (unit, first_treat) in [("a", 2), ("b", 2), ("c", 0), ("d", 0)] {
            for t in 1..=2i64 {
                records.push(PanelRecord {
                    unit: unit.to_string(),
                    time: t,
                    outcome: t as f64 + if first_treat > 0 && t >= first_treat { 3.0 } else { 0.0 },
                    first_treat,
                    cluster: None,
                    covariates: Vec::new(),
                });
            }
        }
        let panel = PanelTable::from_records(records, vec![], 0).unwrap();
        let config = EstimatorConfig::default();
        let values = estimands(&panel, &config);
        let report = InferenceEngine::new(&config)
            .unwrap()
            .infer(&panel, &values)
            .unwrap();

        let overall = report.get(&Estimand::Overall).unwrap();
        assert_eq!(overall.p_value, None);
        assert_eq!(overall.conf_int, (3.0, 3.0));
        assert!(report.diagnostics().contains(&Diagnostic::DegenerateVariance {
            estimand: "overall".to_string()
        }));
    }

    #[test]
    fn test_single_cluster() {
        let records = ["a", "b", "c", "d"]
            .iter()
            .enumerate()
            .flat_map(|(i, unit)| {
                (1..=2i64).map(move |t| PanelRecord {
                    unit: unit.to_string(),
                    time: t,
                    outcome: (i as f64).powi(2) * t as f64 + if i < 2 && t == 2 { 1.0 } else { 0.0 },
                    first_treat: if i < 2 { 2 } else { 0 },
                    cluster: Some("state".to_string()),
                    covariates: Vec::new(),
                })
            })
            .collect();
        let panel = PanelTable::from_records(records, vec![], 0).unwrap();
        let config = EstimatorConfig::default();
        let values = estimands(&panel, &config);
        let report = InferenceEngine::new(&config)
            .unwrap()
            .infer(&panel, &values)
            .unwrap();

        assert_eq!(report.n_clusters(), 1);
        assert!(report.diagnostics().contains(&Diagnostic::SingleCluster));
        assert!(report.results().values().all(Inference::is_degenerate));
    }

    #[test]
    fn test_invalid_alpha() {
        let config = EstimatorConfig {
            alpha: 1.5,
            ..EstimatorConfig::default()
        };
        assert!(matches!(
            InferenceEngine::new(&config),
            Err(InferenceError::InvalidAlpha(_))
        ));
    }

    #[test]
    fn test_cancelled_bootstrap() {
        let panel = noisy_panel(10, 1);
        let config = EstimatorConfig {
            n_bootstrap: 20,
            ..EstimatorConfig::default()
        };
        let values = estimands(&panel, &config);
        let token = CancelToken::new();
        token.cancel();
        let result = InferenceEngine::new(&config)
            .unwrap()
            .with_cancellation(token)
            .infer(&panel, &values);
        assert!(matches!(result, Err(InferenceError::Cancelled)));
    }
}
