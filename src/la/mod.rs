//! Sparse linear algebra services
//!
//! Two solvers back the deformation and parametrization code: a sparse
//! Cholesky factorization (through [`nalgebra_sparse`]) for symmetric
//! positive-definite systems that are solved repeatedly, and a matrix-free
//! BiCGSTAB iteration for everything else.

use crate::Error;
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::factorization::CscCholesky;
use nalgebra_sparse::{CooMatrix, CscMatrix};

/// Square sparse matrix assembled row by row
#[derive(Clone, Debug)]
pub struct SparseMatrix {
    rows: Vec<Vec<(usize, f64)>>,
}

impl SparseMatrix {
    pub fn new(size: usize) -> Self {
        Self { rows: vec![Vec::new(); size] }
    }

    pub fn size(&self) -> usize {
        self.rows.len()
    }

    /// Sets entry `(i, j)`, replacing any previous value
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        let row = &mut self.rows[i];
        for entry in row.iter_mut() {
            if entry.0 == j {
                entry.1 = value;
                return;
            }
        }
        row.push((j, value));
    }

    /// Adds to entry `(i, j)`
    pub fn add(&mut self, i: usize, j: usize, value: f64) {
        let row = &mut self.rows[i];
        for entry in row.iter_mut() {
            if entry.0 == j {
                entry.1 += value;
                return;
            }
        }
        row.push((j, value));
    }

    /// Matrix-vector product
    pub fn apply(&self, x: &DVector<f64>) -> DVector<f64> {
        let mut out = DVector::zeros(self.rows.len());
        for (i, row) in self.rows.iter().enumerate() {
            let mut sum = 0.0;
            for &(j, v) in row {
                sum += v * x[j];
            }
            out[i] = sum;
        }
        out
    }

    fn to_csc(&self) -> CscMatrix<f64> {
        let n = self.rows.len();
        let mut coo = CooMatrix::new(n, n);
        for (i, row) in self.rows.iter().enumerate() {
            for &(j, v) in row {
                coo.push(i, j, v);
            }
        }
        CscMatrix::from(&coo)
    }
}

/// Cached Cholesky factorization of a symmetric positive-definite
/// [`SparseMatrix`]
///
/// Factoring once and solving many right-hand sides is the intended use;
/// the deformation code keeps one of these alive for as long as the set of
/// constrained vertices is unchanged.
pub struct SparseCholesky {
    factor: CscCholesky<f64>,
}

impl SparseCholesky {
    pub fn new(mat: &SparseMatrix) -> Result<Self, Error> {
        let factor =
            CscCholesky::factor(&mat.to_csc()).map_err(|_| Error::NotPositiveDefinite)?;
        Ok(Self { factor })
    }

    /// Solves `A x = b` for a single right-hand side
    pub fn solve(&self, b: &DVector<f64>) -> DVector<f64> {
        let rhs = DMatrix::from_column_slice(b.len(), 1, b.as_slice());
        DVector::from_column_slice(self.factor.solve(&rhs).as_slice())
    }

    /// Solves `A X = B` where each row of `b` is a `C`-tuple, returning the
    /// solution in the same layout
    pub fn solve_columns<const C: usize>(&self, b: &[[f64; C]]) -> Vec<[f64; C]> {
        let n = b.len();
        let rhs = DMatrix::from_fn(n, C, |i, j| b[i][j]);
        let sol = self.factor.solve(&rhs);
        (0..n)
            .map(|i| {
                let mut row = [0.0; C];
                for (j, r) in row.iter_mut().enumerate() {
                    *r = sol[(i, j)];
                }
                row
            })
            .collect()
    }
}

/// Iterative solver for large (possibly unsymmetric) linear systems
pub trait LinearSolver {
    /// Solves `A x = b` where `A` is only available as the product
    /// `apply(x)`; `init` optionally warm-starts the iteration
    fn solve_linear_system(
        &self,
        apply: &dyn Fn(&DVector<f64>) -> DVector<f64>,
        b: &DVector<f64>,
        init: Option<&DVector<f64>>,
    ) -> DVector<f64>;
}

/// Biconjugate gradient stabilized method
///
/// Returns the best iterate found when `max_iters` runs out; callers that
/// care should check the residual themselves.
#[derive(Copy, Clone, Debug)]
pub struct BiCgStab {
    pub max_iters: usize,
    /// Convergence threshold on the mean squared residual
    pub mse_tolerance: f64,
}

impl Default for BiCgStab {
    fn default() -> Self {
        Self { max_iters: 5000, mse_tolerance: 1e-16 }
    }
}

/// Smallest positive double, used in place of exactly-zero denominators
fn nonzero(x: f64) -> f64 {
    if x == 0.0 {
        f64::from_bits(1)
    } else {
        x
    }
}

impl LinearSolver for BiCgStab {
    fn solve_linear_system(
        &self,
        apply: &dyn Fn(&DVector<f64>) -> DVector<f64>,
        b: &DVector<f64>,
        init: Option<&DVector<f64>>,
    ) -> DVector<f64> {
        let n = b.len();
        if n == 0 {
            return DVector::zeros(0);
        }
        let mse = |r: &DVector<f64>| r.norm_squared() / n as f64;

        let mut x = match init {
            Some(v) => v.clone(),
            None => DVector::zeros(n),
        };
        let mut r = b - apply(&x);
        if mse(&r) < self.mse_tolerance {
            return x;
        }
        let r_hat = r.clone();
        let mut rho = 1.0;
        let mut alpha = 1.0;
        let mut omega = 1.0;
        let mut v = DVector::zeros(n);
        let mut p = DVector::zeros(n);

        for _ in 0..self.max_iters {
            let rho1 = r_hat.dot(&r);
            let beta = (rho1 / nonzero(rho)) * (alpha / nonzero(omega));
            p = &r + (&p - &v * omega) * beta;
            v = apply(&p);
            alpha = rho1 / nonzero(r_hat.dot(&v));
            let h = &x + &p * alpha;
            let s = &r - &v * alpha;
            if mse(&s) < self.mse_tolerance {
                return h;
            }
            let t = apply(&s);
            omega = t.dot(&s) / nonzero(t.dot(&t));
            x = &h + &s * omega;
            r = &s - &t * omega;
            if mse(&r) < self.mse_tolerance {
                return x;
            }
            rho = rho1;
        }
        x
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn laplacian_chain(n: usize) -> SparseMatrix {
        // Tridiagonal SPD matrix: 2 on the diagonal, -1 off it.
        let mut m = SparseMatrix::new(n);
        for i in 0..n {
            m.set(i, i, 2.0);
            if i > 0 {
                m.set(i, i - 1, -1.0);
            }
            if i + 1 < n {
                m.set(i, i + 1, -1.0);
            }
        }
        m
    }

    #[test]
    fn cholesky_solves_spd_system() {
        let n = 20;
        let m = laplacian_chain(n);
        let chol = SparseCholesky::new(&m).unwrap();
        let expected = DVector::from_fn(n, |i, _| (i as f64 * 0.37).sin());
        let b = m.apply(&expected);
        let x = chol.solve(&b);
        assert!((x - expected).norm() < 1e-9);
    }

    #[test]
    fn cholesky_multi_column() {
        let n = 10;
        let m = laplacian_chain(n);
        let chol = SparseCholesky::new(&m).unwrap();
        let expected: Vec<[f64; 3]> = (0..n)
            .map(|i| [i as f64, (i as f64).cos(), 1.0 - i as f64 * 0.1])
            .collect();
        let mut b = vec![[0.0; 3]; n];
        for j in 0..3 {
            let col = DVector::from_fn(n, |i, _| expected[i][j]);
            let bc = m.apply(&col);
            for (i, row) in b.iter_mut().enumerate() {
                row[j] = bc[i];
            }
        }
        let x = chol.solve_columns(&b);
        for i in 0..n {
            for j in 0..3 {
                assert!((x[i][j] - expected[i][j]).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn bicgstab_matches_cholesky() {
        let n = 50;
        let m = laplacian_chain(n);
        let expected = DVector::from_fn(n, |i, _| (i as f64 * 0.13).cos());
        let b = m.apply(&expected);
        let solver = BiCgStab::default();
        let x = solver.solve_linear_system(&|v| m.apply(v), &b, None);
        assert!((&x - &expected).norm() < 1e-4);

        // Warm starts from the answer converge immediately.
        let x2 = solver.solve_linear_system(&|v| m.apply(v), &b, Some(&x));
        assert!((x2 - expected).norm() < 1e-4);
    }

    #[test]
    fn not_positive_definite_is_an_error() {
        let mut m = SparseMatrix::new(2);
        m.set(0, 0, 0.0);
        m.set(1, 1, -1.0);
        assert!(SparseCholesky::new(&m).is_err());
    }
}
