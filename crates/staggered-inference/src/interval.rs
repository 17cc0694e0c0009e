//! Confidence intervals and p-values.

use serde::{Deserialize, Serialize};
use statrs::function::erf::{erfc, erfc_inv};
use std::f64::consts::SQRT_2;

/// Standard error, interval and p-value of one estimand
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Inference {
    /// Standard error
    pub se: f64,
    /// Confidence interval `(lower, upper)`
    pub conf_int: (f64, f64),
    /// Two-sided p-value against zero, absent when the variance is degenerate
    pub p_value: Option<f64>,
}

impl Inference {
    /// Normal-theory inference from a standard error.
    ///
    /// Falls back to [`Inference::degenerate`] when `se` is not a positive
    /// finite number.
    pub fn from_se(estimate: f64, se: f64, alpha: f64) -> Self {
        if !(se > 0.0 && se.is_finite()) {
            return Self::degenerate(estimate, se);
        }
        Self {
            se,
            conf_int: normal_interval(estimate, se, alpha),
            p_value: Some(two_sided_p_value(estimate / se)),
        }
    }

    /// Interval collapsed to the point estimate and no p-value
    pub fn degenerate(estimate: f64, se: f64) -> Self {
        Self {
            se: if se.is_finite() { se.max(0.0) } else { 0.0 },
            conf_int: (estimate, estimate),
            p_value: None,
        }
    }

    /// Whether the variance collapsed
    pub const fn is_degenerate(&self) -> bool {
        self.p_value.is_none()
    }

    /// Whether the p-value is below `alpha`
    pub fn is_significant(&self, alpha: f64) -> bool {
        self.p_value.is_some_and(|p| p < alpha)
    }
}

/// Quantile of the standard normal distribution
pub fn normal_quantile(p: f64) -> f64 {
    -SQRT_2 * erfc_inv(2.0 * p)
}

/// `2 (1 − Φ(|z|))`
pub fn two_sided_p_value(z: f64) -> f64 {
    erfc(z.abs() / SQRT_2).min(1.0)
}

/// `θ̂ ± z_{1−α/2} · se`
pub fn normal_interval(estimate: f64, se: f64, alpha: f64) -> (f64, f64) {
    let z = normal_quantile(1.0 - alpha / 2.0);
    (estimate - z * se, estimate + z * se)
}

/// Empirical `α/2` and `1 − α/2` quantiles of sorted replicates
pub fn percentile_interval(sorted: &[f64], alpha: f64) -> Option<(f64, f64)> {
    Some((
        quantile_sorted(sorted, alpha / 2.0)?,
        quantile_sorted(sorted, 1.0 - alpha / 2.0)?,
    ))
}

/// Linearly interpolated quantile of an ascending slice
pub fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }
    let h = (sorted.len() - 1) as f64 * q;
    let lo = h.floor() as usize;
    let hi = (lo + 1).min(sorted.len() - 1);
    Some(sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo]))
}

/// Sample standard deviation with `n − 1` denominator
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let ss = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>();
    Some((ss / (n - 1.0)).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rstest::rstest;

    #[rstest]
    #[case(0.975, 1.959_964)]
    #[case(0.95, 1.644_854)]
    #[case(0.5, 0.0)]
    fn test_normal_quantile(#[case] p: f64, #[case] expected: f64) {
        assert_abs_diff_eq!(normal_quantile(p), expected, epsilon = 1e-5);
    }

    #[test]
    fn test_p_value_matches_interval() {
        let z = normal_quantile(0.975);
        assert_abs_diff_eq!(two_sided_p_value(z), 0.05, epsilon = 1e-9);
        assert_abs_diff_eq!(two_sided_p_value(-z), 0.05, epsilon = 1e-9);
        assert_abs_diff_eq!(two_sided_p_value(0.0), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_interval_excludes_zero_iff_significant() {
        for estimate in [0.5, 1.9, 2.0, 2.5, -3.0] {
            let inference = Inference::from_se(estimate, 1.0, 0.05);
            let (lo, hi) = inference.conf_int;
            let excludes_zero = lo > 0.0 || hi < 0.0;
            assert_eq!(excludes_zero, inference.is_significant(0.05), "estimate {estimate}");
        }
    }

    #[test]
    fn test_degenerate() {
        let inference = Inference::from_se(1.5, 0.0, 0.05);
        assert!(inference.is_degenerate());
        assert_eq!(inference.conf_int, (1.5, 1.5));
        assert_eq!(inference.se, 0.0);
        assert!(!inference.is_significant(0.05));

        let nan = Inference::from_se(1.5, f64::NAN, 0.05);
        assert_eq!(nan.se, 0.0);
    }

    #[test]
    fn test_percentile_interval() {
        let values: Vec<f64> = (0..=100).map(f64::from).collect();
        let (lo, hi) = percentile_interval(&values, 0.1).unwrap();
        assert_abs_diff_eq!(lo, 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(hi, 95.0, epsilon = 1e-12);
        assert!(percentile_interval(&[], 0.1).is_none());
    }

    #[test]
    fn test_quantile_interpolates() {
        let values = [1.0, 2.0, 4.0];
        assert_abs_diff_eq!(quantile_sorted(&values, 0.75).unwrap(), 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(quantile_sorted(&values, 1.0).unwrap(), 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sample_std() {
        let sd = sample_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_abs_diff_eq!(sd, (32.0_f64 / 7.0).sqrt(), epsilon = 1e-12);
        assert!(sample_std(&[1.0]).is_none());
    }
}
