//! Aggregation of group-time effects.
//!
//! ```text
//! overall:      θ      = Σ_{t ≥ g − k} w_gt ATT(g,t),       w_gt ∝ π_g = n_g / N
//! event study:  θ(e)   = Σ_{t − g = e} w_gt ATT(g,t),       w_gt ∝ π_g
//! group:        θ(g)   = mean_{t ≥ g − k} ATT(g,t)
//! ```
//! where `k` is the anticipation window: the `k` periods before adoption
//! count as post-period cells.
//!
//! Cohort shares `π_g` are estimated, so the influence function of a
//! cohort-weighted average carries a weight term. With `s = Σ_k π_{g_k}`
//! over the averaged cells:
//! ```text
//! ψ_i = Σ_k w_k ψ_i^k + (A_i − θ B_i) / s
//! A_i = Σ_{k : g_k = G_i} ATT_k,     B_i = #{k : g_k = G_i}
//! ```
//! which is the delta-method term `Σ_k ATT_k ∂w_k/∂π · (1{G_i = g} − π_g)`
//! after simplification.

use crate::diagnostics::Diagnostic;
use crate::group_time::{GroupTimeEffect, GroupTimeTable};
use ndarray::Array1;
use std::collections::BTreeMap;

/// An aggregated effect and its influence function over panel units
#[derive(Debug, Clone)]
pub struct AggregateEffect {
    estimate: f64,
    influence: Array1<f64>,
    total_cohort_size: usize,
    cohorts: Vec<i64>,
    n_cells: usize,
}

impl AggregateEffect {
    /// Point estimate
    pub const fn estimate(&self) -> f64 {
        self.estimate
    }

    /// Influence function, same scale as the cell influence functions
    pub const fn influence(&self) -> &Array1<f64> {
        &self.influence
    }

    /// Sum of cohort sizes over the averaged cells
    pub const fn total_cohort_size(&self) -> usize {
        self.total_cohort_size
    }

    /// Distinct cohorts contributing, ascending
    pub fn cohorts(&self) -> &[i64] {
        &self.cohorts
    }

    /// Number of cells averaged
    pub const fn n_cells(&self) -> usize {
        self.n_cells
    }

    /// Whether a single cohort drives the estimate
    pub fn is_low_power(&self) -> bool {
        self.cohorts.len() == 1
    }
}

/// Collapses a [`GroupTimeTable`] into summary effects.
#[derive(Debug, Clone, Copy, Default)]
pub struct Aggregator;

impl Aggregator {
    /// Cohort-size weighted average of post-period cells
    pub fn overall(table: &GroupTimeTable) -> Option<AggregateEffect> {
        let cells: Vec<&GroupTimeEffect> = table.post_effects().collect();
        cohort_weighted(table, &cells)
    }

    /// Cohort-size weighted average per event time `e = t − g`
    pub fn event_study(table: &GroupTimeTable) -> BTreeMap<i64, AggregateEffect> {
        let mut by_event: BTreeMap<i64, Vec<&GroupTimeEffect>> = BTreeMap::new();
        for effect in table.effects().values() {
            by_event
                .entry(effect.key().event_time())
                .or_default()
                .push(effect);
        }

        by_event
            .into_iter()
            .filter_map(|(e, cells)| cohort_weighted(table, &cells).map(|agg| (e, agg)))
            .collect()
    }

    /// Equal-weight average of each cohort's post-period cells
    pub fn by_group(table: &GroupTimeTable) -> BTreeMap<i64, AggregateEffect> {
        let mut by_cohort: BTreeMap<i64, Vec<&GroupTimeEffect>> = BTreeMap::new();
        for effect in table.post_effects() {
            by_cohort.entry(effect.key().group).or_default().push(effect);
        }

        by_cohort
            .into_iter()
            .map(|(group, cells)| {
                let m = cells.len() as f64;
                let mut influence = Array1::zeros(table.n_units());
                for cell in &cells {
                    influence.scaled_add(1.0 / m, cell.influence());
                }
                let aggregate = AggregateEffect {
                    estimate: cells.iter().map(|c| c.att()).sum::<f64>() / m,
                    influence,
                    total_cohort_size: table.cohort_sizes().get(&group).copied().unwrap_or(0)
                        * cells.len(),
                    cohorts: vec![group],
                    n_cells: cells.len(),
                };
                (group, aggregate)
            })
            .collect()
    }

    /// Overall effect recovered from the event times `e ≥ −k`.
    ///
    /// Weights each `θ(e)` by the total size of its contributing cohorts;
    /// equals [`Aggregator::overall`] up to rounding when `anticipation` is
    /// the window the table was estimated with.
    pub fn overall_from_event_study(
        profile: &BTreeMap<i64, AggregateEffect>,
        anticipation: i64,
    ) -> Option<f64> {
        let (weighted, total) = profile
            .range(-anticipation..)
            .fold((0.0, 0.0), |(acc, tot), (_, effect)| {
                let w = effect.total_cohort_size as f64;
                (acc + w * effect.estimate, tot + w)
            });
        (total > 0.0).then(|| weighted / total)
    }

    /// Event times estimated from a single cohort
    pub fn low_power_diagnostics(profile: &BTreeMap<i64, AggregateEffect>) -> Vec<Diagnostic> {
        profile
            .iter()
            .filter(|(_, effect)| effect.is_low_power())
            .map(|(&event_time, _)| Diagnostic::LowPowerEventTime { event_time })
            .collect()
    }
}

fn cohort_weighted(table: &GroupTimeTable, cells: &[&GroupTimeEffect]) -> Option<AggregateEffect> {
    let n_units = table.n_units();
    if cells.is_empty() || n_units == 0 {
        return None;
    }
    let n = n_units as f64;
    let sizes = table.cohort_sizes();
    let size_of = |cell: &GroupTimeEffect| sizes.get(&cell.key().group).copied().unwrap_or(0);

    let shares: Vec<f64> = cells.iter().map(|c| size_of(*c) as f64 / n).collect();
    let share_total: f64 = shares.iter().sum();
    if share_total <= 0.0 {
        return None;
    }

    let mut estimate = 0.0;
    let mut influence = Array1::zeros(n_units);
    for (cell, &share) in cells.iter().zip(&shares) {
        let weight = share / share_total;
        estimate += weight * cell.att();
        influence.scaled_add(weight, cell.influence());
    }

    // estimated-weight term, per cohort
    let mut cohort_terms: BTreeMap<i64, (f64, f64)> = BTreeMap::new();
    for cell in cells {
        let entry = cohort_terms.entry(cell.key().group).or_insert((0.0, 0.0));
        entry.0 += cell.att();
        entry.1 += 1.0;
    }
    for (value, cohort) in influence.iter_mut().zip(table.unit_cohorts()) {
        if let Some((sum_att, count)) = cohort.and_then(|g| cohort_terms.get(&g)) {
            *value += (sum_att - estimate * count) / share_total;
        }
    }

    Some(AggregateEffect {
        estimate,
        influence,
        total_cohort_size: cells.iter().map(|c| size_of(*c)).sum(),
        cohorts: cohort_terms.keys().copied().collect(),
        n_cells: cells.len(),
    })
}
