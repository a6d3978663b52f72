//! Small dense linear algebra helpers for 3x3 symmetric matrices.
//!
//! Both local surface normals and least squares planes reduce to the same problem: the
//! eigenvector of the smallest eigenvalue of a point covariance matrix. Two solvers are
//! provided:
//!
//! * [`smallest_eigenvector_closed_form`] uses the trigonometric solution of the
//!   characteristic cubic and recovers the eigenvector from cross products of the rows of
//!   `A - λI`. It is fast but loses precision when eigenvalues are close.
//! * [`symmetric_eigen_jacobi`] runs cyclic Jacobi rotations until the off diagonal
//!   entries vanish. It is slower but accurate for any symmetric input.

use glam::{DMat3, DVec3};

const JACOBI_MAX_SWEEPS: usize = 32;

/// Compute the centroid and the covariance matrix of a subset of points.
///
/// # Arguments
///
/// * `points` - The full set of points.
/// * `indices` - The indices of the points to use.
///
/// # Returns
///
/// `None` if `indices` is empty, otherwise the centroid and the (biased) covariance
/// matrix `1/n Σ (p - c)(p - c)^T`.
pub fn compute_mean_and_covariance(
    points: &[[f64; 3]],
    indices: &[usize],
) -> Option<(DVec3, DMat3)> {
    if indices.is_empty() {
        return None;
    }

    let inv_n = 1.0 / indices.len() as f64;
    let centroid = indices
        .iter()
        .fold(DVec3::ZERO, |acc, &i| acc + DVec3::from_array(points[i]))
        * inv_n;

    let mut cov = DMat3::ZERO;
    for &i in indices {
        let d = DVec3::from_array(points[i]) - centroid;
        cov += DMat3::from_cols(d * d.x, d * d.y, d * d.z);
    }

    Some((centroid, cov * inv_n))
}

/// Eigen decomposition of a symmetric 3x3 matrix with the cyclic Jacobi method.
///
/// # Returns
///
/// The eigenvalues in ascending order and the matching unit eigenvectors.
pub fn symmetric_eigen_jacobi(m: &DMat3) -> ([f64; 3], [DVec3; 3]) {
    // row major working copy, `m` is symmetric so the layout does not matter
    let mut a = m.to_cols_array_2d();
    let mut v = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

    let total_norm: f64 = a.iter().flatten().map(|x| x * x).sum();

    for _ in 0..JACOBI_MAX_SWEEPS {
        let off_norm = a[0][1] * a[0][1] + a[0][2] * a[0][2] + a[1][2] * a[1][2];
        if off_norm <= f64::EPSILON * f64::EPSILON * total_norm {
            break;
        }

        for (p, q) in [(0, 1), (0, 2), (1, 2)] {
            if a[p][q] == 0.0 {
                continue;
            }

            let theta = (a[q][q] - a[p][p]) / (2.0 * a[p][q]);
            let sign = if theta >= 0.0 { 1.0 } else { -1.0 };
            let t = sign / (theta.abs() + (theta * theta + 1.0).sqrt());
            let c = 1.0 / (t * t + 1.0).sqrt();
            let s = t * c;

            // A <- A P
            for row in a.iter_mut() {
                let (akp, akq) = (row[p], row[q]);
                row[p] = c * akp - s * akq;
                row[q] = s * akp + c * akq;
            }
            // A <- P^T A
            for k in 0..3 {
                let (apk, aqk) = (a[p][k], a[q][k]);
                a[p][k] = c * apk - s * aqk;
                a[q][k] = s * apk + c * aqk;
            }
            // V <- V P
            for row in v.iter_mut() {
                let (vkp, vkq) = (row[p], row[q]);
                row[p] = c * vkp - s * vkq;
                row[q] = s * vkp + c * vkq;
            }
        }
    }

    let mut order = [0usize, 1, 2];
    order.sort_by(|&i, &j| a[i][i].total_cmp(&a[j][j]));

    let eigenvalues = order.map(|i| a[i][i]);
    let eigenvectors = order.map(|i| DVec3::new(v[0][i], v[1][i], v[2][i]).normalize_or(DVec3::Z));

    (eigenvalues, eigenvectors)
}

/// Unit eigenvector of the smallest eigenvalue of a symmetric positive semi-definite 3x3
/// matrix, computed in closed form.
///
/// Returns `+Z` when the matrix is a multiple of the identity (every direction is an
/// eigenvector).
pub fn smallest_eigenvector_closed_form(m: &DMat3) -> DVec3 {
    // scale to avoid over/underflow of the cubic coefficients
    let max_coeff = m.to_cols_array().iter().fold(0.0f64, |acc, x| acc.max(x.abs()));
    if max_coeff == 0.0 || !max_coeff.is_finite() {
        return DVec3::Z;
    }
    let a = *m * (1.0 / max_coeff);

    let a00 = a.x_axis.x;
    let a01 = a.y_axis.x;
    let a02 = a.z_axis.x;
    let a11 = a.y_axis.y;
    let a12 = a.z_axis.y;
    let a22 = a.z_axis.z;

    // shift by the mean eigenvalue: B = A - mI
    let m_ = (a00 + a11 + a22) / 3.0;
    let b00 = a00 - m_;
    let b11 = a11 - m_;
    let b22 = a22 - m_;

    let p = (b00 * b00 + b11 * b11 + b22 * b22 + 2.0 * (a01 * a01 + a02 * a02 + a12 * a12)) / 6.0;
    if p <= f64::EPSILON {
        return DVec3::Z;
    }
    let q = (b00 * (b11 * b22 - a12 * a12) - a01 * (a01 * b22 - a12 * a02)
        + a02 * (a01 * a12 - b11 * a02))
        / 2.0;

    let sqrt_p = p.sqrt();
    let phi = (q / (p * sqrt_p)).clamp(-1.0, 1.0).acos() / 3.0;
    let lambda = m_ + 2.0 * sqrt_p * (phi + 2.0 * std::f64::consts::FRAC_PI_3).cos();

    let r0 = DVec3::new(a00 - lambda, a01, a02);
    let r1 = DVec3::new(a01, a11 - lambda, a12);
    let r2 = DVec3::new(a02, a12, a22 - lambda);

    // the null space of A - λI is orthogonal to all its rows
    let candidates = [r0.cross(r1), r0.cross(r2), r1.cross(r2)];
    let best = candidates
        .into_iter()
        .max_by(|x, y| x.length_squared().total_cmp(&y.length_squared()))
        .unwrap_or(DVec3::Z);

    if best.length_squared() > 1e-24 {
        return best.normalize();
    }

    // repeated smallest eigenvalue: A - λI has rank one, any vector orthogonal to its
    // non zero row is an eigenvector
    let row = [r0, r1, r2]
        .into_iter()
        .max_by(|x, y| x.length_squared().total_cmp(&y.length_squared()))
        .unwrap_or(DVec3::Z);
    match row.try_normalize() {
        Some(row) => row.any_orthonormal_vector(),
        None => DVec3::Z,
    }
}
