//! Small dense linear algebra used by the abundance correction and the
//! calibration fits. Matrices here are at most a few dozen columns wide.

use ndarray::{Array1, Array2, Axis};
use std::cmp::Ordering;

/// Full discrete convolution (`len(a) + len(b) - 1` values).
pub fn convolve(a: &[f64], b: &[f64]) -> Vec<f64> {
    if a.is_empty() || b.is_empty() {
        return Vec::new();
    }
    let mut out = vec![0.0; a.len() + b.len() - 1];
    for (i, x) in a.iter().enumerate() {
        for (j, y) in b.iter().enumerate() {
            out[i + j] += x * y;
        }
    }
    out
}

/// Solves `a x = b` by Gaussian elimination with partial pivoting.
/// Returns `None` for singular systems.
pub fn solve(mut a: Array2<f64>, mut b: Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return None;
    }
    let scale = a.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    if scale == 0.0 {
        return if n == 0 { Some(b) } else { None };
    }
    let eps = scale * f64::EPSILON * n as f64;

    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| {
            a[[i, col]]
                .abs()
                .partial_cmp(&a[[j, col]].abs())
                .unwrap_or(Ordering::Equal)
        })?;
        if a[[pivot, col]].abs() <= eps {
            return None;
        }
        if pivot != col {
            for k in 0..n {
                a.swap([pivot, k], [col, k]);
            }
            b.swap(pivot, col);
        }
        for row in col + 1..n {
            let factor = a[[row, col]] / a[[col, col]];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[[row, k]] -= factor * a[[col, k]];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = Array1::<f64>::zeros(n);
    for row in (0..n).rev() {
        let mut acc = b[row];
        for k in row + 1..n {
            acc -= a[[row, k]] * x[k];
        }
        x[row] = acc / a[[row, row]];
    }
    Some(x)
}

/// Unconstrained least squares through the normal equations.
pub fn least_squares(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let normal = a.t().dot(a);
    let rhs = a.t().dot(b);
    solve(normal, rhs)
}

/// Moore-Penrose inverse through a one-sided Jacobi SVD.
///
/// Singular values below `max(m, n) · ε · σ_max` are treated as zero, so
/// rank-deficient matrices get the minimum-norm inverse. Returns `None` only
/// for non-finite input.
pub fn pseudo_inverse(a: &Array2<f64>) -> Option<Array2<f64>> {
    if a.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let (m, n) = a.dim();
    let (u, v) = jacobi_svd(a);

    // u 的第 j 欄 = σ_j · 左奇異向量
    let sigmas: Vec<f64> = u
        .axis_iter(Axis(1))
        .map(|column| column.dot(&column).sqrt())
        .collect();
    let sigma_max = sigmas.iter().cloned().fold(0.0_f64, f64::max);
    let cutoff = m.max(n) as f64 * f64::EPSILON * sigma_max;

    let mut inverse = Array2::<f64>::zeros((n, m));
    for (j, sigma) in sigmas.iter().enumerate() {
        if *sigma <= cutoff {
            continue;
        }
        let left = u.column(j).to_owned().insert_axis(Axis(0));
        let right = v.column(j).to_owned().insert_axis(Axis(1));
        inverse = inverse + right.dot(&left) / (sigma * sigma);
    }
    Some(inverse)
}

/// Hestenes one-sided Jacobi: returns `(A V, V)` with mutually orthogonal
/// columns in `A V`.
fn jacobi_svd(a: &Array2<f64>) -> (Array2<f64>, Array2<f64>) {
    const MAX_SWEEPS: usize = 60;
    let n = a.ncols();
    let mut u = a.clone();
    let mut v = Array2::<f64>::eye(n);

    for _ in 0..MAX_SWEEPS {
        let mut rotated = false;
        for p in 0..n {
            for q in p + 1..n {
                let alpha = u.column(p).dot(&u.column(p));
                let beta = u.column(q).dot(&u.column(q));
                let gamma = u.column(p).dot(&u.column(q));
                if alpha == 0.0 || beta == 0.0 || gamma.abs() <= f64::EPSILON * (alpha * beta).sqrt() {
                    continue;
                }
                rotated = true;

                let zeta = (beta - alpha) / (2.0 * gamma);
                let t = zeta.signum() / (zeta.abs() + (1.0 + zeta * zeta).sqrt());
                let c = 1.0 / (1.0 + t * t).sqrt();
                let s = c * t;
                rotate_columns(&mut u, p, q, c, s);
                rotate_columns(&mut v, p, q, c, s);
            }
        }
        if !rotated {
            break;
        }
    }
    (u, v)
}

fn rotate_columns(matrix: &mut Array2<f64>, p: usize, q: usize, c: f64, s: f64) {
    for row in 0..matrix.nrows() {
        let x = matrix[[row, p]];
        let y = matrix[[row, q]];
        matrix[[row, p]] = c * x - s * y;
        matrix[[row, q]] = s * x + c * y;
    }
}

/// Non-negative least squares (Lawson-Hanson active set):
/// `argmin ||a x - b||²` subject to `x >= 0`.
pub fn nnls(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.ncols();
    let mut x = Array1::<f64>::zeros(n);
    if n == 0 {
        return Some(x);
    }

    let max_abs = a.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    let tol = 10.0 * f64::EPSILON * max_abs * a.nrows().max(n) as f64;
    let max_iterations = 30 * n;
    let mut passive = vec![false; n];
    let mut iterations = 0;

    loop {
        let gradient = a.t().dot(&(b - &a.dot(&x)));
        let entering = (0..n)
            .filter(|&j| !passive[j] && gradient[j] > tol)
            .max_by(|&i, &j| {
                gradient[i]
                    .partial_cmp(&gradient[j])
                    .unwrap_or(Ordering::Equal)
            });
        let Some(entering) = entering else {
            break;
        };
        passive[entering] = true;

        loop {
            iterations += 1;
            if iterations > max_iterations {
                tracing::warn!("NNLS stopped after {} iterations", max_iterations);
                return Some(x);
            }

            let z = solve_on_passive_set(a, b, &passive)?;
            if (0..n).filter(|&j| passive[j]).all(|j| z[j] > 0.0) {
                x = z;
                break;
            }

            let alpha = (0..n)
                .filter(|&j| passive[j] && z[j] <= 0.0 && x[j] - z[j] > 0.0)
                .map(|j| x[j] / (x[j] - z[j]))
                .fold(f64::INFINITY, f64::min);
            let alpha = if alpha.is_finite() { alpha } else { 0.0 };

            x = &x + &((&z - &x) * alpha);
            for j in 0..n {
                if passive[j] && x[j] <= tol {
                    passive[j] = false;
                    x[j] = 0.0;
                }
            }
        }
    }

    Some(x)
}

fn solve_on_passive_set(a: &Array2<f64>, b: &Array1<f64>, passive: &[bool]) -> Option<Array1<f64>> {
    let indices: Vec<usize> = (0..passive.len()).filter(|&j| passive[j]).collect();
    let sub = a.select(Axis(1), &indices);
    let partial = least_squares(&sub, b)?;

    let mut z = Array1::<f64>::zeros(passive.len());
    for (k, &j) in indices.iter().enumerate() {
        z[j] = partial[k];
    }
    Some(z)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
}

/// Ordinary least squares line through `(x, y)`.
pub fn linear_regression(x: &[f64], y: &[f64]) -> Option<LinearFit> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let n = x.len() as f64;
    let x_mean = x.iter().sum::<f64>() / n;
    let y_mean = y.iter().sum::<f64>() / n;

    let (mut ss_xx, mut ss_xy, mut ss_yy) = (0.0, 0.0, 0.0);
    for (xi, yi) in x.iter().zip(y) {
        let dx = xi - x_mean;
        let dy = yi - y_mean;
        ss_xx += dx * dx;
        ss_xy += dx * dy;
        ss_yy += dy * dy;
    }
    if ss_xx == 0.0 {
        return None;
    }

    let slope = ss_xy / ss_xx;
    let r = if ss_yy == 0.0 {
        0.0
    } else {
        (ss_xy / (ss_xx * ss_yy).sqrt()).clamp(-1.0, 1.0)
    };

    Some(LinearFit {
        slope,
        intercept: y_mean - slope * x_mean,
        r_squared: r * r,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{} != {}", a, b);
    }

    #[test]
    fn test_convolve() {
        assert_eq!(convolve(&[1.0, 2.0], &[1.0, 1.0, 1.0]), vec![1.0, 3.0, 3.0, 2.0]);
        assert_eq!(convolve(&[1.0], &[0.25, 0.75]), vec![0.25, 0.75]);
        assert!(convolve(&[], &[1.0]).is_empty());
    }

    #[test]
    fn test_solve_with_pivoting() {
        let a = array![[0.0, 2.0], [3.0, 1.0]];
        let b = array![4.0, 5.0];
        let x = solve(a, b).unwrap();
        assert_close(x[0], 1.0);
        assert_close(x[1], 2.0);
    }

    #[test]
    fn test_solve_singular() {
        let a = array![[1.0, 2.0], [2.0, 4.0]];
        assert!(solve(a, array![1.0, 2.0]).is_none());
    }

    #[test]
    fn test_pseudo_inverse_of_tall_matrix() {
        let a = array![[1.0, 0.0], [0.0, 1.0], [1.0, 1.0]];
        let pinv = pseudo_inverse(&a).unwrap();
        let identity = pinv.dot(&a);
        assert_close(identity[[0, 0]], 1.0);
        assert_close(identity[[0, 1]], 0.0);
        assert_close(identity[[1, 0]], 0.0);
        assert_close(identity[[1, 1]], 1.0);
    }

    #[test]
    fn test_pseudo_inverse_of_rank_deficient_matrix() {
        // 兩欄相同，rank 1
        let a = array![[1.0, 1.0], [2.0, 2.0], [0.0, 0.0]];
        let pinv = pseudo_inverse(&a).unwrap();
        assert_eq!(pinv.dim(), (2, 3));

        // pinv(a) = aᵀ / ||a||²_F for a rank-1 matrix
        let expected = a.t().to_owned() / 10.0;
        for (got, want) in pinv.iter().zip(expected.iter()) {
            assert_close(*got, *want);
        }

        // a · pinv · a = a
        let back = a.dot(&pinv).dot(&a);
        for (got, want) in back.iter().zip(a.iter()) {
            assert_close(*got, *want);
        }
    }

    #[test]
    fn test_pseudo_inverse_with_zero_column() {
        let a = array![[2.0, 0.0], [0.0, 0.0]];
        let pinv = pseudo_inverse(&a).unwrap();
        assert_close(pinv[[0, 0]], 0.5);
        assert_close(pinv[[0, 1]], 0.0);
        assert_close(pinv[[1, 0]], 0.0);
        assert_close(pinv[[1, 1]], 0.0);

        assert_eq!(pseudo_inverse(&array![[0.0]]).unwrap(), array![[0.0]]);
        assert!(pseudo_inverse(&array![[f64::NAN]]).is_none());
    }

    #[test]
    fn test_nnls_matches_least_squares_for_positive_solution() {
        let a = array![[1.0, 0.0], [0.5, 1.0], [0.0, 0.5]];
        let truth = array![2.0, 3.0];
        let b = a.dot(&truth);

        let x = nnls(&a, &b).unwrap();
        assert_close(x[0], 2.0);
        assert_close(x[1], 3.0);
    }

    #[test]
    fn test_nnls_clamps_negative_component() {
        // Unconstrained solution is (1, -1); the constrained optimum drops x1.
        let a = array![[1.0, 0.0], [0.0, 1.0]];
        let b = array![1.0, -1.0];

        let x = nnls(&a, &b).unwrap();
        assert_close(x[0], 1.0);
        assert_close(x[1], 0.0);
    }

    #[test]
    fn test_nnls_all_negative_target() {
        let a = array![[1.0, 0.2], [0.1, 1.0]];
        let b = array![-1.0, -2.0];
        let x = nnls(&a, &b).unwrap();
        assert!(x.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_linear_regression_exact_line() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let y = [3.0, 5.0, 7.0, 9.0];
        let fit = linear_regression(&x, &y).unwrap();
        assert_close(fit.slope, 2.0);
        assert_close(fit.intercept, 1.0);
        assert_close(fit.r_squared, 1.0);
    }

    #[test]
    fn test_linear_regression_degenerate_x() {
        assert!(linear_regression(&[2.0, 2.0, 2.0], &[1.0, 2.0, 3.0]).is_none());
        assert!(linear_regression(&[1.0], &[1.0]).is_none());
    }
}
