//! Symmetric matrix routines for the nuisance fits.
//!
//! Normal equations and logistic Hessians are small symmetric matrices
//! (one row per covariate plus the intercept), so a Jacobi eigenvalue
//! decomposition is accurate and fast enough, and its eigenvalues double as
//! the singularity check.

use super::NuisanceError;
use ndarray::{Array1, Array2};

/// Eigenvalues below this fraction of the largest one mark a singular matrix
pub const DEFAULT_RCOND: f64 = 1e-12;

/// Result of eigenvalue decomposition
#[derive(Debug, Clone)]
pub struct EigenDecomposition {
    /// Eigenvalues (sorted in descending order)
    pub eigenvalues: Array1<f64>,
    /// Eigenvectors (columns are eigenvectors)
    pub eigenvectors: Array2<f64>,
}

/// Jacobi eigenvalue decomposition for symmetric matrices
///
/// # Arguments
/// * `matrix` - Symmetric matrix to decompose
/// * `max_rotations` - Maximum number of Jacobi rotations
/// * `tolerance` - Convergence tolerance for off-diagonal elements
///
/// # Returns
/// * Eigenvalues and eigenvectors
pub fn jacobi_eigendecomp(
    matrix: &Array2<f64>,
    max_rotations: usize,
    tolerance: f64,
) -> Result<EigenDecomposition, NuisanceError> {
    let n = matrix.nrows();
    if n != matrix.ncols() {
        return Err(NuisanceError::DimensionMismatch {
            expected: n,
            actual: matrix.ncols(),
        });
    }

    let mut a = matrix.clone();
    let mut v = Array2::<f64>::eye(n);
    let scale = matrix.iter().fold(0.0_f64, |m, x| m.max(x.abs())).max(1.0);

    for _ in 0..max_rotations {
        let Some((p, q, apq)) = largest_off_diagonal(&a) else {
            break;
        };
        if apq.abs() < tolerance * scale {
            break;
        }

        let (cos_theta, sin_theta) = rotation(a[[p, p]], a[[q, q]], apq);
        rotate(&mut a, &mut v, p, q, cos_theta, sin_theta);
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| a[[j, j]].total_cmp(&a[[i, i]]));

    let eigenvalues = order.iter().map(|&i| a[[i, i]]).collect();
    let mut eigenvectors = Array2::<f64>::zeros((n, n));
    for (new_idx, &old_idx) in order.iter().enumerate() {
        eigenvectors.column_mut(new_idx).assign(&v.column(old_idx));
    }

    Ok(EigenDecomposition {
        eigenvalues,
        eigenvectors,
    })
}

/// Inverse of a symmetric positive definite matrix.
///
/// Fails with [`NuisanceError::Singular`] when the smallest eigenvalue is not
/// positive or falls below `rcond` times the largest.
pub fn symmetric_inverse(matrix: &Array2<f64>, rcond: f64) -> Result<Array2<f64>, NuisanceError> {
    let n = matrix.nrows();
    if n == 0 {
        return Err(NuisanceError::EmptySample);
    }
    if matrix.iter().any(|v| !v.is_finite()) {
        return Err(NuisanceError::Singular {
            min_eigenvalue: f64::NAN,
            max_eigenvalue: f64::NAN,
        });
    }

    let symmetric = (matrix + &matrix.t()) / 2.0;
    let decomp = jacobi_eigendecomp(&symmetric, 50 * n * n + 10, 1e-15)?;
    let max_eigenvalue = decomp.eigenvalues[0];
    let min_eigenvalue = decomp.eigenvalues[n - 1];
    if max_eigenvalue <= 0.0 || min_eigenvalue <= rcond * max_eigenvalue {
        return Err(NuisanceError::Singular {
            min_eigenvalue,
            max_eigenvalue,
        });
    }

    // V Λ⁻¹ Vᵀ
    let scaled = &decomp.eigenvectors / &decomp.eigenvalues;
    Ok(scaled.dot(&decomp.eigenvectors.t()))
}

fn largest_off_diagonal(matrix: &Array2<f64>) -> Option<(usize, usize, f64)> {
    let n = matrix.nrows();
    let mut best: Option<(usize, usize, f64)> = None;
    for i in 0..n {
        for j in (i + 1)..n {
            let val = matrix[[i, j]];
            if best.is_none_or(|(_, _, b)| val.abs() > b.abs()) {
                best = Some((i, j, val));
            }
        }
    }
    best
}

fn rotation(app: f64, aqq: f64, apq: f64) -> (f64, f64) {
    if apq == 0.0 {
        return (1.0, 0.0);
    }

    let tau = (aqq - app) / (2.0 * apq);
    let t = if tau >= 0.0 {
        1.0 / (tau + (1.0 + tau * tau).sqrt())
    } else {
        -1.0 / (-tau + (1.0 + tau * tau).sqrt())
    };

    let cos_theta = 1.0 / (1.0 + t * t).sqrt();
    (cos_theta, t * cos_theta)
}

fn rotate(
    a: &mut Array2<f64>,
    v: &mut Array2<f64>,
    p: usize,
    q: usize,
    cos_theta: f64,
    sin_theta: f64,
) {
    let n = a.nrows();
    let app = a[[p, p]];
    let aqq = a[[q, q]];
    let apq = a[[p, q]];

    a[[p, p]] = cos_theta * cos_theta * app - 2.0 * cos_theta * sin_theta * apq
        + sin_theta * sin_theta * aqq;
    a[[q, q]] = sin_theta * sin_theta * app
        + 2.0 * cos_theta * sin_theta * apq
        + cos_theta * cos_theta * aqq;
    a[[p, q]] = 0.0;
    a[[q, p]] = 0.0;

    for i in 0..n {
        if i != p && i != q {
            let aip = a[[i, p]];
            let aiq = a[[i, q]];
            a[[i, p]] = cos_theta * aip - sin_theta * aiq;
            a[[p, i]] = a[[i, p]];
            a[[i, q]] = sin_theta * aip + cos_theta * aiq;
            a[[q, i]] = a[[i, q]];
        }
    }

    for i in 0..n {
        let vip = v[[i, p]];
        let viq = v[[i, q]];
        v[[i, p]] = cos_theta * vip - sin_theta * viq;
        v[[i, q]] = sin_theta * vip + cos_theta * viq;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_eigendecomp_diagonal() {
        let matrix = array![[1.0, 0.0, 0.0], [0.0, 4.0, 0.0], [0.0, 0.0, 2.0]];
        let decomp = jacobi_eigendecomp(&matrix, 100, 1e-15).unwrap();

        assert_abs_diff_eq!(decomp.eigenvalues[0], 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(decomp.eigenvalues[1], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(decomp.eigenvalues[2], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_eigendecomp_two_by_two() {
        // eigenvalues 3 and -1
        let matrix = array![[1.0, 2.0], [2.0, 1.0]];
        let decomp = jacobi_eigendecomp(&matrix, 100, 1e-15).unwrap();

        assert_abs_diff_eq!(decomp.eigenvalues[0], 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(decomp.eigenvalues[1], -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_symmetric_inverse() {
        let matrix = array![[4.0, 1.0, 0.5], [1.0, 3.0, 0.2], [0.5, 0.2, 2.0]];
        let inverse = symmetric_inverse(&matrix, DEFAULT_RCOND).unwrap();
        let identity = matrix.dot(&inverse);

        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_abs_diff_eq!(identity[[i, j]], expected, epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn test_singular_matrix_rejected() {
        let matrix = array![[1.0, 2.0], [2.0, 4.0]];
        let err = symmetric_inverse(&matrix, DEFAULT_RCOND).unwrap_err();
        assert!(matches!(err, NuisanceError::Singular { .. }));
    }

    #[test]
    fn test_indefinite_matrix_rejected() {
        let matrix = array![[1.0, 2.0], [2.0, 1.0]];
        assert!(symmetric_inverse(&matrix, DEFAULT_RCOND).is_err());
    }

    #[test]
    fn test_one_by_one() {
        let inverse = symmetric_inverse(&array![[0.25]], DEFAULT_RCOND).unwrap();
        assert_abs_diff_eq!(inverse[[0, 0]], 4.0, epsilon = 1e-14);
    }
}
