//! Synthetic staggered-adoption panels.
//!
//! Unit `i` in period `t` has outcome
//!
//! ```text
//! y_it = a_i + (trend + confounding * x_i) * t + effect_it + e_it
//! ```
//!
//! where `a_i ~ N(0, unit_fe_sd²)`, `e_it ~ N(0, noise_sd²)` and `x_i ~ N(0, 1)`.
//! A unit adopts with probability `Λ(logit(1 − never_treated_share) + confounding * x_i)`
//! and then joins one of `cohorts` uniformly. From adoption on, `effect_it` is
//! `effect + dynamic_effect * (t − g)`; in the `anticipation` periods before
//! adoption it is `anticipation_effect`.
//!
//! Periods run from 1 to `n_periods` and never-treated units carry
//! `first_treat = 0`. Every draw comes from one generator seeded with `seed`.

use polars::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use staggered_panel::{PanelRecord, PanelTable};

/// Sentinel used for never-treated units.
pub const NEVER_TREATED: i64 = 0;

/// Name of the simulated covariate column.
pub const COVARIATE: &str = "x";

/// Parameters of the synthetic panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Number of units (default: 500)
    pub n_units: usize,
    /// Number of periods, numbered from 1 (default: 10)
    pub n_periods: i64,
    /// Adoption periods (default: 4, 6, 8)
    pub cohorts: Vec<i64>,
    /// Probability of never adopting at `x = 0` (default: 0.3)
    pub never_treated_share: f64,
    /// Effect at the adoption period (default: 2.0)
    pub effect: f64,
    /// Effect growth per period since adoption (default: 0.0)
    pub dynamic_effect: f64,
    /// Periods before adoption in which treated units already react (default: 0)
    pub anticipation: u32,
    /// Effect during the anticipation periods (default: 0.0)
    pub anticipation_effect: f64,
    /// Standard deviation of unit fixed effects (default: 1.0)
    pub unit_fe_sd: f64,
    /// Common slope of the outcome in time (default: 0.1)
    pub time_trend: f64,
    /// Idiosyncratic noise standard deviation (default: 1.0)
    pub noise_sd: f64,
    /// Strength with which `x` shifts both adoption and trend (default: 0.0)
    pub confounding: f64,
    /// Emit `x` as a covariate column (default: false)
    pub include_covariate: bool,
    /// Assign units round-robin to this many clusters; `None` clusters by unit
    pub n_clusters: Option<usize>,
    /// Generator seed (default: 42)
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            n_units: 500,
            n_periods: 10,
            cohorts: vec![4, 6, 8],
            never_treated_share: 0.3,
            effect: 2.0,
            dynamic_effect: 0.0,
            anticipation: 0,
            anticipation_effect: 0.0,
            unit_fe_sd: 1.0,
            time_trend: 0.1,
            noise_sd: 1.0,
            confounding: 0.0,
            include_covariate: false,
            n_clusters: None,
            seed: 42,
        }
    }
}

impl SimulationConfig {
    /// Treatment effect of a unit adopting at `group`, observed at `time`
    pub fn effect_at(&self, group: i64, time: i64) -> f64 {
        if time >= group {
            self.effect + self.dynamic_effect * (time - group) as f64
        } else if time >= group - i64::from(self.anticipation) {
            self.anticipation_effect
        } else {
            0.0
        }
    }

    fn adoption_probability(&self, x: f64) -> f64 {
        let share = self.never_treated_share;
        if share <= 0.0 {
            return 1.0;
        }
        if share >= 1.0 {
            return 0.0;
        }
        let index = ((1.0 - share) / share).ln() + self.confounding * x;
        1.0 / (1.0 + (-index).exp())
    }
}

/// Draw the rows of a synthetic panel, ordered by unit then period.
pub fn simulate_records(config: &SimulationConfig) -> Vec<PanelRecord> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let n_periods = config.n_periods.max(0) as usize;
    let mut records = Vec::with_capacity(config.n_units * n_periods);

    for i in 0..config.n_units {
        let x: f64 = rng.sample(StandardNormal);
        let unit_fe = config.unit_fe_sd * rng.sample::<f64, _>(StandardNormal);

        let adopts = rng.gen_bool(config.adoption_probability(x).clamp(0.0, 1.0));
        let group = if adopts && !config.cohorts.is_empty() {
            config.cohorts[rng.gen_range(0..config.cohorts.len())]
        } else {
            NEVER_TREATED
        };

        let cluster = config
            .n_clusters
            .filter(|&c| c > 0)
            .map(|c| format!("c{:03}", i % c));
        let slope = config.time_trend + config.confounding * x;

        for t in 1..=config.n_periods {
            let noise = config.noise_sd * rng.sample::<f64, _>(StandardNormal);
            let effect = if group == NEVER_TREATED {
                0.0
            } else {
                config.effect_at(group, t)
            };
            records.push(PanelRecord {
                unit: format!("unit{i:05}"),
                time: t,
                outcome: unit_fe + slope * t as f64 + effect + noise,
                first_treat: group,
                cluster: cluster.clone(),
                covariates: if config.include_covariate {
                    vec![x]
                } else {
                    Vec::new()
                },
            });
        }
    }

    records
}

/// Draw a synthetic panel.
///
/// # Errors
///
/// Returns an error when the configuration cannot form a valid panel, for
/// example a cohort outside `1..=n_periods`.
pub fn simulate_panel(config: &SimulationConfig) -> staggered_panel::Result<PanelTable> {
    let covariates = if config.include_covariate {
        vec![COVARIATE.to_string()]
    } else {
        Vec::new()
    };
    PanelTable::from_records(simulate_records(config), covariates, NEVER_TREATED)
}

/// Draw a synthetic panel as a table with columns `unit`, `time`,
/// `outcome`, `first_treat`, plus `cluster` and `x` when configured.
///
/// # Errors
///
/// Returns an error if the table cannot be assembled.
pub fn simulate_dataframe(config: &SimulationConfig) -> PolarsResult<DataFrame> {
    let records = simulate_records(config);

    let mut df = df!(
        "unit" => records.iter().map(|r| r.unit.clone()).collect::<Vec<_>>(),
        "time" => records.iter().map(|r| r.time).collect::<Vec<_>>(),
        "outcome" => records.iter().map(|r| r.outcome).collect::<Vec<_>>(),
        "first_treat" => records.iter().map(|r| r.first_treat).collect::<Vec<_>>(),
    )?;

    if config.n_clusters.is_some_and(|c| c > 0) {
        let clusters: Vec<Option<String>> = records.iter().map(|r| r.cluster.clone()).collect();
        df.with_column(Series::new("cluster".into(), clusters))?;
    }
    if config.include_covariate {
        let x: Vec<f64> = records
            .iter()
            .map(|r| r.covariates.first().copied().unwrap_or(f64::NAN))
            .collect();
        df.with_column(Series::new(COVARIATE.into(), x))?;
    }

    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[test]
    fn test_same_seed_same_panel() {
        let config = SimulationConfig {
            n_units: 40,
            ..SimulationConfig::default()
        };
        let a = simulate_records(&config);
        let b = simulate_records(&config);
        assert_eq!(a, b);
        assert_eq!(a.len(), 400);

        let other = simulate_records(&SimulationConfig { seed: 7, ..config });
        assert_ne!(a, other);
    }

    #[rstest]
    #[case(4, 3, 0.0)]
    #[case(4, 4, 2.0)]
    #[case(4, 6, 3.0)]
    fn test_effect_profile(#[case] group: i64, #[case] time: i64, #[case] expected: f64) {
        let config = SimulationConfig {
            dynamic_effect: 0.5,
            ..SimulationConfig::default()
        };
        assert_relative_eq!(config.effect_at(group, time), expected);
    }

    #[test]
    fn test_anticipation_window() {
        let config = SimulationConfig {
            anticipation: 2,
            anticipation_effect: 0.7,
            ..SimulationConfig::default()
        };
        assert_relative_eq!(config.effect_at(6, 4), 0.7);
        assert_relative_eq!(config.effect_at(6, 5), 0.7);
        assert_relative_eq!(config.effect_at(6, 3), 0.0);
    }

    #[test]
    fn test_adoption_share() {
        let config = SimulationConfig {
            n_units: 4000,
            n_periods: 2,
            cohorts: vec![2],
            never_treated_share: 0.25,
            ..SimulationConfig::default()
        };
        let records = simulate_records(&config);
        let never = records
            .iter()
            .filter(|r| r.time == 1 && r.first_treat == NEVER_TREATED)
            .count();
        let share = never as f64 / 4000.0;
        assert!((share - 0.25).abs() < 0.03, "share {share}");
    }

    #[test]
    fn test_panel_and_dataframe() {
        let config = SimulationConfig {
            n_units: 30,
            n_clusters: Some(5),
            include_covariate: true,
            ..SimulationConfig::default()
        };
        let panel = simulate_panel(&config).unwrap();
        assert_eq!(panel.n_units(), 30);
        assert_eq!(panel.n_periods(), 10);
        assert_eq!(panel.n_clusters(), 5);
        assert_eq!(panel.covariate_names(), [COVARIATE.to_string()]);

        let df = simulate_dataframe(&config).unwrap();
        assert_eq!(df.height(), 300);
        assert!(df.column("cluster").is_ok());
        assert!(df.column(COVARIATE).is_ok());
    }

    #[test]
    fn test_cohort_outside_panel_is_rejected() {
        let config = SimulationConfig {
            n_units: 20,
            cohorts: vec![12],
            never_treated_share: 0.5,
            ..SimulationConfig::default()
        };
        assert!(simulate_panel(&config).is_err());
    }
}
