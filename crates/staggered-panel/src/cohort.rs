//! Adoption cohorts derived from a panel.

use crate::table::UnitSeries;
use std::collections::BTreeMap;

/// Units sharing the same first-treatment period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cohort {
    period: i64,
    members: Vec<usize>,
}

impl Cohort {
    /// First-treatment period shared by the members
    pub const fn period(&self) -> i64 {
        self.period
    }

    /// Indices of the member units in the owning panel
    pub fn members(&self) -> &[usize] {
        &self.members
    }

    /// Number of member units
    pub fn size(&self) -> usize {
        self.members.len()
    }
}

/// Group treated units by adoption period, ascending.
pub(crate) fn group_cohorts(units: &[UnitSeries]) -> Vec<Cohort> {
    let mut by_period: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (idx, unit) in units.iter().enumerate() {
        if let Some(period) = unit.first_treat() {
            by_period.entry(period).or_default().push(idx);
        }
    }

    by_period
        .into_iter()
        .map(|(period, members)| Cohort { period, members })
        .collect()
}
