//! Quantities that receive standard errors.

use ndarray::Array1;
use staggered_estimate::{AggregateEffect, Aggregation, Aggregator, GroupTimeTable};
use std::collections::BTreeMap;
use std::fmt;

/// A reported effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Estimand {
    /// A single group-time cell
    Cell {
        /// Cohort
        group: i64,
        /// Period
        time: i64,
    },
    /// Cohort-weighted average of post-adoption cells
    Overall,
    /// Event-study coefficient at `e = t − g`
    EventTime(i64),
    /// Average post-adoption effect of one cohort
    Group(i64),
}

impl fmt::Display for Estimand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cell { group, time } => write!(f, "ATT({group},{time})"),
            Self::Overall => write!(f, "overall"),
            Self::EventTime(e) => write!(f, "event time {e}"),
            Self::Group(g) => write!(f, "cohort {g}"),
        }
    }
}

/// Point estimate with its influence function over panel units
#[derive(Debug, Clone)]
pub struct EstimandValue {
    /// Point estimate
    pub estimate: f64,
    /// Influence function, `θ̂ − θ ≈ (1/N) Σ ψ_i`
    pub influence: Array1<f64>,
}

impl From<&AggregateEffect> for EstimandValue {
    fn from(effect: &AggregateEffect) -> Self {
        Self {
            estimate: effect.estimate(),
            influence: effect.influence().clone(),
        }
    }
}

/// Every estimand implied by a table and an aggregation mode.
///
/// Cells are always included. `overall` adds the overall effect,
/// `event_study` adds event-time coefficients and the overall effect,
/// `group` adds per-cohort effects and the overall effect.
pub fn collect_estimands(
    table: &GroupTimeTable,
    aggregation: Aggregation,
) -> BTreeMap<Estimand, EstimandValue> {
    let mut estimands: BTreeMap<Estimand, EstimandValue> = table
        .effects()
        .values()
        .map(|effect| {
            let key = effect.key();
            let value = EstimandValue {
                estimate: effect.att(),
                influence: effect.influence().clone(),
            };
            (
                Estimand::Cell {
                    group: key.group,
                    time: key.time,
                },
                value,
            )
        })
        .collect();

    if aggregation == Aggregation::None {
        return estimands;
    }
    if let Some(overall) = Aggregator::overall(table) {
        estimands.insert(Estimand::Overall, EstimandValue::from(&overall));
    }
    match aggregation {
        Aggregation::EventStudy => {
            for (e, effect) in Aggregator::event_study(table) {
                estimands.insert(Estimand::EventTime(e), EstimandValue::from(&effect));
            }
        }
        Aggregation::Group => {
            for (g, effect) in Aggregator::by_group(table) {
                estimands.insert(Estimand::Group(g), EstimandValue::from(&effect));
            }
        }
        Aggregation::Overall | Aggregation::None => {}
    }
    estimands
}
