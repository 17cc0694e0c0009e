//! Estimator configuration.
//!
//! Every option has a snake_case name so configuration can come from the
//! command line or a JSON file. [`EstimatorConfig::validate`] runs before any
//! computation and rejects out-of-range values.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors in estimator configuration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Unknown control group name
    #[error("Unknown control group '{0}' (expected never_treated or not_yet_treated)")]
    UnknownControlGroup(String),

    /// Unknown estimation method name
    #[error("Unknown estimation method '{0}' (expected dr, ipw or reg)")]
    UnknownEstimationMethod(String),

    /// Unknown aggregation name
    #[error("Unknown aggregation '{0}' (expected overall, event_study, group or none)")]
    UnknownAggregation(String),

    /// Unknown base period name
    #[error("Unknown base period '{0}' (expected universal or varying)")]
    UnknownBasePeriod(String),

    /// Unknown interval name
    #[error("Unknown interval '{0}' (expected normal or percentile)")]
    UnknownInterval(String),

    /// Significance level outside (0, 1)
    #[error("Invalid alpha {0}: must lie strictly between 0 and 1")]
    InvalidAlpha(f64),

    /// Propensity clipping bound outside (0, 0.5)
    #[error("Invalid propensity score epsilon {0}: must lie strictly between 0 and 0.5")]
    InvalidEpsilon(f64),

    /// Minimum cohort size of zero
    #[error("Invalid minimum cohort size {0}: must be at least 1")]
    InvalidMinCohortSize(usize),

    /// Logistic fit settings that cannot converge
    #[error("Invalid solver settings: {0}")]
    InvalidSolver(String),
}

/// Which units serve as controls for cohort `g` at period `t`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlGroup {
    /// Units that never adopt
    #[default]
    NeverTreated,
    /// Never-treated units plus cohorts that adopt after both `t` and the base period
    NotYetTreated,
}

impl ControlGroup {
    /// Configuration name
    pub const fn name(&self) -> &'static str {
        match self {
            Self::NeverTreated => "never_treated",
            Self::NotYetTreated => "not_yet_treated",
        }
    }
}

impl fmt::Display for ControlGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ControlGroup {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "never_treated" | "nevertreated" => Ok(Self::NeverTreated),
            "not_yet_treated" | "notyettreated" => Ok(Self::NotYetTreated),
            _ => Err(ConfigError::UnknownControlGroup(s.to_string())),
        }
    }
}

/// How each group-time comparison is estimated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EstimationMethod {
    /// Doubly robust: outcome regression and inverse propensity weighting
    #[default]
    #[serde(rename = "dr")]
    DoublyRobust,
    /// Inverse propensity weighting
    #[serde(rename = "ipw")]
    InverseProbability,
    /// Outcome regression
    #[serde(rename = "reg")]
    OutcomeRegression,
}

impl EstimationMethod {
    /// Configuration name
    pub const fn name(&self) -> &'static str {
        match self {
            Self::DoublyRobust => "dr",
            Self::InverseProbability => "ipw",
            Self::OutcomeRegression => "reg",
        }
    }

    /// Whether the method fits an outcome regression
    pub const fn uses_outcome_model(&self) -> bool {
        matches!(self, Self::DoublyRobust | Self::OutcomeRegression)
    }

    /// Whether the method fits a propensity score
    pub const fn uses_propensity_model(&self) -> bool {
        matches!(self, Self::DoublyRobust | Self::InverseProbability)
    }
}

impl fmt::Display for EstimationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for EstimationMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dr" | "doubly_robust" => Ok(Self::DoublyRobust),
            "ipw" | "inverse_probability" => Ok(Self::InverseProbability),
            "reg" | "regression" | "outcome_regression" => Ok(Self::OutcomeRegression),
            _ => Err(ConfigError::UnknownEstimationMethod(s.to_string())),
        }
    }
}

/// Base period used for each comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BasePeriod {
    /// `g - 1 - k` for every period of cohort `g`
    #[default]
    Universal,
    /// `g - 1 - k` after adoption, the preceding period before it
    Varying,
}

impl BasePeriod {
    /// Configuration name
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Universal => "universal",
            Self::Varying => "varying",
        }
    }
}

impl fmt::Display for BasePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for BasePeriod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "universal" => Ok(Self::Universal),
            "varying" => Ok(Self::Varying),
            _ => Err(ConfigError::UnknownBasePeriod(s.to_string())),
        }
    }
}

/// How group-time effects are summarised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// Single cohort-size weighted post-period effect
    #[default]
    Overall,
    /// Effects indexed by time since adoption
    EventStudy,
    /// One effect per adoption cohort
    Group,
    /// Raw group-time effects only
    None,
}

impl Aggregation {
    /// Configuration name
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Overall => "overall",
            Self::EventStudy => "event_study",
            Self::Group => "group",
            Self::None => "none",
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Aggregation {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "overall" | "simple" => Ok(Self::Overall),
            "event_study" | "dynamic" => Ok(Self::EventStudy),
            "group" => Ok(Self::Group),
            "none" => Ok(Self::None),
            _ => Err(ConfigError::UnknownAggregation(s.to_string())),
        }
    }
}

/// Confidence interval construction for bootstrap inference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalMethod {
    /// `estimate ± z * se`
    #[default]
    Normal,
    /// Empirical quantiles of the replicates
    Percentile,
}

impl IntervalMethod {
    /// Configuration name
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Percentile => "percentile",
        }
    }
}

impl fmt::Display for IntervalMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for IntervalMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "percentile" => Ok(Self::Percentile),
            _ => Err(ConfigError::UnknownInterval(s.to_string())),
        }
    }
}

/// Full estimator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Control group policy (default: never_treated)
    pub control_group: ControlGroup,

    /// Estimation method (default: dr)
    pub estimation_method: EstimationMethod,

    /// Anticipation window in periods (default: 0)
    pub anticipation: u32,

    /// Base period choice (default: universal)
    pub base_period: BasePeriod,

    /// Bootstrap replicates; 0 selects analytic inference (default: 0)
    pub n_bootstrap: usize,

    /// Seed for bootstrap resampling (default: 42)
    pub seed: u64,

    /// Significance level for intervals (default: 0.05)
    pub alpha: f64,

    /// Bootstrap interval construction (default: normal)
    pub interval: IntervalMethod,

    /// Aggregation reported alongside the group-time effects (default: overall)
    pub aggregate: Aggregation,

    /// Cohorts with fewer units are skipped (default: 1)
    pub min_cohort_size: usize,

    /// Propensity scores are clipped to [ε, 1 − ε] (default: 1e-6)
    pub pscore_epsilon: f64,

    /// Newton iterations for the propensity score (default: 50)
    pub max_iterations: usize,

    /// Convergence tolerance for the propensity score (default: 1e-10)
    pub tolerance: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            control_group: ControlGroup::NeverTreated,
            estimation_method: EstimationMethod::DoublyRobust,
            anticipation: 0,
            base_period: BasePeriod::Universal,
            n_bootstrap: 0,
            seed: 42,
            alpha: 0.05,
            interval: IntervalMethod::Normal,
            aggregate: Aggregation::Overall,
            min_cohort_size: 1,
            pscore_epsilon: 1e-6,
            max_iterations: 50,
            tolerance: 1e-10,
        }
    }
}

impl EstimatorConfig {
    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(ConfigError::InvalidAlpha(self.alpha));
        }
        if !(self.pscore_epsilon > 0.0 && self.pscore_epsilon < 0.5) {
            return Err(ConfigError::InvalidEpsilon(self.pscore_epsilon));
        }
        if self.min_cohort_size == 0 {
            return Err(ConfigError::InvalidMinCohortSize(self.min_cohort_size));
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::InvalidSolver(
                "max_iterations must be positive".to_string(),
            ));
        }
        if !(self.tolerance > 0.0 && self.tolerance.is_finite()) {
            return Err(ConfigError::InvalidSolver(format!(
                "tolerance {} must be positive and finite",
                self.tolerance
            )));
        }
        Ok(())
    }

    /// Anticipation window as a period offset
    pub fn anticipation_periods(&self) -> i64 {
        i64::from(self.anticipation)
    }

    /// Whether inference uses the cluster bootstrap
    pub const fn uses_bootstrap(&self) -> bool {
        self.n_bootstrap > 0
    }

    /// Copy of this configuration with a different anticipation window
    pub fn with_anticipation(&self, anticipation: u32) -> Self {
        Self {
            anticipation,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_defaults() {
        let config = EstimatorConfig::default();
        assert_eq!(config.control_group, ControlGroup::NeverTreated);
        assert_eq!(config.estimation_method, EstimationMethod::DoublyRobust);
        assert_eq!(config.seed, 42);
        assert!(!config.uses_bootstrap());
        assert!(config.validate().is_ok());
    }

    #[rstest]
    #[case("never_treated", ControlGroup::NeverTreated)]
    #[case("not_yet_treated", ControlGroup::NotYetTreated)]
    #[case(" Not_Yet_Treated ", ControlGroup::NotYetTreated)]
    fn test_control_group_from_str(#[case] raw: &str, #[case] expected: ControlGroup) {
        assert_eq!(raw.parse::<ControlGroup>().unwrap(), expected);
    }

    #[rstest]
    #[case("dr", EstimationMethod::DoublyRobust)]
    #[case("ipw", EstimationMethod::InverseProbability)]
    #[case("reg", EstimationMethod::OutcomeRegression)]
    fn test_method_names_round_trip(#[case] raw: &str, #[case] expected: EstimationMethod) {
        let parsed: EstimationMethod = raw.parse().unwrap();
        assert_eq!(parsed, expected);
        assert_eq!(parsed.to_string(), raw);
    }

    #[test]
    fn test_unknown_names_rejected() {
        assert!(matches!(
            "sometimes".parse::<ControlGroup>(),
            Err(ConfigError::UnknownControlGroup(_))
        ));
        assert!(matches!(
            "ols".parse::<EstimationMethod>(),
            Err(ConfigError::UnknownEstimationMethod(_))
        ));
        assert!(matches!(
            "calendar".parse::<Aggregation>(),
            Err(ConfigError::UnknownAggregation(_))
        ));
        assert!(matches!(
            "short".parse::<BasePeriod>(),
            Err(ConfigError::UnknownBasePeriod(_))
        ));
        assert!(matches!(
            "bca".parse::<IntervalMethod>(),
            Err(ConfigError::UnknownInterval(_))
        ));
    }

    #[rstest]
    #[case(0.0)]
    #[case(1.0)]
    #[case(f64::NAN)]
    fn test_invalid_alpha(#[case] alpha: f64) {
        let config = EstimatorConfig {
            alpha,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidAlpha(_))));
    }

    #[test]
    fn test_invalid_epsilon_and_cohort_size() {
        let config = EstimatorConfig {
            pscore_epsilon: 0.5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidEpsilon(_))));

        let config = EstimatorConfig {
            min_cohort_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidMinCohortSize(0))
        ));
    }

    #[test]
    fn test_deserialize_partial_json() {
        let json = r#"{"control_group":"not_yet_treated","estimation_method":"ipw","anticipation":7,"aggregate":"event_study"}"#;
        let config: EstimatorConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.control_group, ControlGroup::NotYetTreated);
        assert_eq!(config.estimation_method, EstimationMethod::InverseProbability);
        assert_eq!(config.anticipation, 7);
        assert_eq!(config.aggregate, Aggregation::EventStudy);
        assert_eq!(config.seed, 42);
    }
}
