//! Non-fatal conditions reported alongside estimates.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a group-time cell produced no estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No cohort unit is observed at both the base period and `t`
    NoTreatedUnits,
    /// No control unit is observed at both the base period and `t`
    NoControlUnits,
    /// The base period is not a panel period
    BaseOutsidePanel,
    /// The cohort is smaller than the configured minimum
    CohortTooSmall,
}

impl SkipReason {
    /// Short description
    pub const fn description(&self) -> &'static str {
        match self {
            Self::NoTreatedUnits => "no treated units observed",
            Self::NoControlUnits => "no usable control group",
            Self::BaseOutsidePanel => "base period outside panel",
            Self::CohortTooSmall => "cohort below minimum size",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// A warning attached to a fit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// Rows dropped during panel validation
    RowsDropped {
        /// Number of rows
        count: usize,
    },
    /// A cohort was skipped entirely
    CohortTooSmall {
        /// Adoption period
        cohort: i64,
        /// Units in the cohort
        size: usize,
        /// Configured minimum
        minimum: usize,
    },
    /// Units lacking the base period or `t` were excluded from a cell
    UnbalancedUnitsDropped {
        /// Cohort
        group: i64,
        /// Period
        time: i64,
        /// Units excluded
        dropped: usize,
    },
    /// A nuisance fit failed and the cell used the unadjusted comparison
    NuisanceFallback {
        /// Cohort
        group: i64,
        /// Period
        time: i64,
        /// Error from the failed fit
        reason: String,
    },
    /// Only one cohort contributes to an event time
    LowPowerEventTime {
        /// Time since adoption
        event_time: i64,
    },
    /// The variance of an estimand collapsed to zero or could not be computed
    DegenerateVariance {
        /// Estimand label
        estimand: String,
    },
    /// Inference clusters on a single cluster
    SingleCluster,
    /// Bootstrap replicates where an estimand was infeasible
    ReplicatesDropped {
        /// Estimand label
        estimand: String,
        /// Replicates without a value
        dropped: usize,
        /// Replicates requested
        total: usize,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RowsDropped { count } => {
                write!(f, "{count} rows with missing or non-finite values dropped")
            }
            Self::CohortTooSmall {
                cohort,
                size,
                minimum,
            } => write!(
                f,
                "cohort {cohort} skipped: {size} units, minimum is {minimum}"
            ),
            Self::UnbalancedUnitsDropped {
                group,
                time,
                dropped,
            } => write!(
                f,
                "ATT({group},{time}): {dropped} units without both periods excluded"
            ),
            Self::NuisanceFallback {
                group,
                time,
                reason,
            } => write!(
                f,
                "ATT({group},{time}): nuisance fit failed ({reason}), unadjusted comparison used"
            ),
            Self::LowPowerEventTime { event_time } => {
                write!(f, "event time {event_time}: single contributing cohort")
            }
            Self::DegenerateVariance { estimand } => {
                write!(f, "{estimand}: degenerate variance")
            }
            Self::SingleCluster => write!(f, "only one cluster available for inference"),
            Self::ReplicatesDropped {
                estimand,
                dropped,
                total,
            } => write!(
                f,
                "{estimand}: {dropped} of {total} bootstrap replicates infeasible"
            ),
        }
    }
}
