//! Cluster-robust variance from influence functions.
//!
//! ```text
//! V = G / (G − 1) · Σ_c (Σ_{i ∈ c} ψ_i)² / N²
//! ```
//! With every unit its own cluster this is the usual `Σ ψ_i² / N²` up to the
//! small-sample factor `N / (N − 1)`.

use ndarray::Array1;

/// Variance of `(1/N) Σ ψ_i` with influence summed within clusters.
///
/// # Arguments
/// * `influence` - Per-unit influence function, length `N`
/// * `clusters` - Cluster index of every unit, in `0..n_clusters`
/// * `n_clusters` - Number of clusters `G`
///
/// # Returns
/// * `None` with fewer than two clusters or mismatched lengths
pub fn cluster_robust_variance(
    influence: &Array1<f64>,
    clusters: &[usize],
    n_clusters: usize,
) -> Option<f64> {
    let n = influence.len();
    if n == 0 || clusters.len() != n || n_clusters < 2 {
        return None;
    }

    let mut sums = vec![0.0; n_clusters];
    for (&psi, &cluster) in influence.iter().zip(clusters) {
        *sums.get_mut(cluster)? += psi;
    }

    let g = n_clusters as f64;
    let meat: f64 = sums.iter().map(|s| s * s).sum();
    Some(g / (g - 1.0) * meat / (n as f64).powi(2))
}
