//! Small dense linear algebra helpers on top of [`nalgebra`]

use nalgebra::{Matrix3, Vector3};
use ordered_float::OrderedFloat;

/// Computes the SVD `A = U Σ Vᵀ` of a 3×3 matrix with singular values sorted
/// in descending order
///
/// nalgebra doesn't always order singular values
/// (<https://github.com/dimforge/nalgebra/issues/1215>), so the factor
/// columns are permuted here to guarantee `σ₁ ≥ σ₂ ≥ σ₃ ≥ 0`.
pub fn svd3(m: &Matrix3<f64>) -> (Matrix3<f64>, Vector3<f64>, Matrix3<f64>) {
    let svd = nalgebra::linalg::SVD::new(*m, true, true);
    let u = svd.u.unwrap();
    let v = svd.v_t.unwrap().transpose();
    let s = svd.singular_values;

    let mut order = [0usize, 1, 2];
    order.sort_by_key(|&i| std::cmp::Reverse(OrderedFloat(s[i])));

    let mut u_sorted = Matrix3::zeros();
    let mut v_sorted = Matrix3::zeros();
    let mut s_sorted = Vector3::zeros();
    for (dst, &src) in order.iter().enumerate() {
        u_sorted.set_column(dst, &u.column(src));
        v_sorted.set_column(dst, &v.column(src));
        s_sorted[dst] = s[src];
    }
    (u_sorted, s_sorted, v_sorted)
}

/// Solves the over-determined system `rows · x = rhs` in the least-squares
/// sense with Tikhonov regularization
///
/// Minimizes `‖A x − b‖² + damping·‖x‖²` through the damped normal
/// equations; the damping keeps the 3×3 system invertible even when the rows
/// are rank-deficient (e.g. all surface normals parallel).
pub fn least_squares3(rows: &[(Vector3<f64>, f64)], damping: f64) -> Vector3<f64> {
    let mut ata = Matrix3::zeros();
    let mut atb = Vector3::zeros();
    for (a, b) in rows {
        ata += a * a.transpose();
        atb += a * *b;
    }
    ata += Matrix3::identity() * damping;
    match ata.try_inverse() {
        Some(inv) => inv * atb,
        None => Vector3::zeros(),
    }
}
