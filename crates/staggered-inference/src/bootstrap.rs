//! Cluster bootstrap.
//!
//! Each replicate draws `G` clusters with replacement from the `G` clusters
//! of the panel, rebuilds the panel from the drawn clusters and re-runs the
//! estimation pipeline on it. Replicate `b` uses its own generator seeded
//! with `seed + b`, and replicates are collected by index, so the draws do
//! not depend on how rayon schedules the work.

use crate::error::InferenceError;
use crate::estimand::Estimand;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use staggered_estimate::CancelToken;
use staggered_panel::PanelTable;
use std::collections::BTreeMap;

/// Estimates of one replicate, `None` when the replicate was infeasible
pub type Replicate = Option<BTreeMap<Estimand, f64>>;

/// Resamples clusters and re-runs a pipeline per replicate.
#[derive(Debug, Clone)]
pub struct ClusterBootstrap {
    n_replicates: usize,
    seed: u64,
    cancel: Option<CancelToken>,
}

impl ClusterBootstrap {
    /// Create a bootstrap with `n_replicates` draws
    pub const fn new(n_replicates: usize, seed: u64) -> Self {
        Self {
            n_replicates,
            seed,
            cancel: None,
        }
    }

    /// Stop between replicates once the token is cancelled
    pub fn with_cancellation(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Number of replicates
    pub const fn n_replicates(&self) -> usize {
        self.n_replicates
    }

    /// Cluster indices drawn for replicate `replicate`
    pub fn draw(&self, replicate: usize, n_clusters: usize) -> Vec<usize> {
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(replicate as u64));
        (0..n_clusters)
            .map(|_| rng.gen_range(0..n_clusters))
            .collect()
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }

    /// Run `pipeline` on every resampled panel.
    ///
    /// # Arguments
    /// * `panel` - Full-sample panel whose clusters are resampled
    /// * `pipeline` - Estimates for one resampled panel, `None` if infeasible
    ///
    /// # Returns
    /// * Replicate estimates in replicate order, or `Cancelled`
    pub fn run<F>(&self, panel: &PanelTable, pipeline: F) -> Result<BootstrapDraws, InferenceError>
    where
        F: Fn(&PanelTable) -> Replicate + Sync,
    {
        let n_clusters = panel.n_clusters();
        if self.is_cancelled() {
            return Err(InferenceError::Cancelled);
        }

        let replicates: Vec<Option<Replicate>> = (0..self.n_replicates)
            .into_par_iter()
            .map(|b| {
                if self.is_cancelled() {
                    return None;
                }
                let sample = panel.resample(&self.draw(b, n_clusters));
                Some(pipeline(&sample))
            })
            .collect();

        if self.is_cancelled() {
            return Err(InferenceError::Cancelled);
        }
        let replicates = replicates
            .into_iter()
            .collect::<Option<Vec<Replicate>>>()
            .ok_or(InferenceError::Cancelled)?;

        let draws = BootstrapDraws { replicates };
        log::debug!(
            "Bootstrap finished: {} replicates over {n_clusters} clusters, {} infeasible",
            draws.n_replicates(),
            draws.n_infeasible()
        );
        Ok(draws)
    }
}

/// Replicate estimates of a bootstrap run
#[derive(Debug, Clone)]
pub struct BootstrapDraws {
    replicates: Vec<Replicate>,
}

impl BootstrapDraws {
    /// Replicates requested
    pub fn n_replicates(&self) -> usize {
        self.replicates.len()
    }

    /// Replicates where the whole pipeline failed
    pub fn n_infeasible(&self) -> usize {
        self.replicates.iter().filter(|r| r.is_none()).count()
    }

    /// Values of one estimand, in replicate order, skipping replicates
    /// where it was not estimable
    pub fn values(&self, estimand: &Estimand) -> Vec<f64> {
        self.replicates
            .iter()
            .filter_map(|r| r.as_ref()?.get(estimand).copied())
            .filter(|v| v.is_finite())
            .collect()
    }
}
