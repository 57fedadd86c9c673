//! As-rigid-as-possible mesh deformation
//!
//! Implements the local/global alternation of Sorkine & Alexa's
//! "As-Rigid-As-Possible Surface Modeling": per-vertex rotations are fit by
//! SVD, then vertex positions are re-solved through the cotangent-weighted
//! Laplace-Beltrami operator with constrained vertices substituted into the
//! right-hand side.  The sparse Cholesky factorization of the reduced system
//! is cached for as long as the constrained vertex set stays the same.

use crate::coord_map::CoordMap;
use crate::geom::{svd3, Vec3};
use crate::la::{SparseCholesky, SparseMatrix};
use crate::mesh::Mesh;
use crate::Error;
use nalgebra::Matrix3;
use std::collections::HashMap;

/// Default convergence tolerance on the relative energy decrease
pub const DEFAULT_TOLERANCE: f64 = 1e-3;

/// Default maximum number of local/global iterations
pub const DEFAULT_MAX_ITERATIONS: usize = 5000;

/// Default minimum number of iterations before early stopping is allowed
pub const DEFAULT_MIN_ITERATIONS: usize = 2;

/// Maps original mesh coordinates to their pinned target positions
pub type Constraints = CoordMap<Vec3>;

/// Edge weighting for the linear solve and the rotation fit
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum WeightingScheme {
    /// Cotangent weights from the paper; note the resulting energy can go
    /// negative on meshes with very obtuse angles
    #[default]
    Cotangent,
    /// Absolute cotangent weights
    AbsCotangent,
    /// All edges weigh the same
    Uniform,
}

impl WeightingScheme {
    fn weight(self, cot: f64) -> f64 {
        match self {
            WeightingScheme::Cotangent => cot,
            WeightingScheme::AbsCotangent => cot.abs(),
            WeightingScheme::Uniform => 1.0,
        }
    }
}

/// As-rigid-as-possible deformation operator for a fixed mesh topology
///
/// Construction copies the topology and precomputes edge weights; the same
/// operator can then run many deformations.
pub struct Arap {
    coord_to_idx: CoordMap<usize>,
    coords: Vec<Vec3>,
    neighbors: Vec<Vec<usize>>,
    weights: Vec<Vec<f64>>,
    rot_weights: Vec<Vec<f64>>,
    triangles: Vec<[usize; 3]>,

    tolerance: f64,
    max_iters: usize,
    min_iters: usize,
}

impl Arap {
    /// Builds an operator with cotangent weights
    ///
    /// Cotangent weights are only guaranteed to behave on meshes whose
    /// angles stay below a right angle; see [`Arap::new_weighted`] for other
    /// options.
    pub fn new(m: &Mesh) -> Self {
        Self::new_weighted(m, WeightingScheme::Cotangent, WeightingScheme::Cotangent)
    }

    /// Builds an operator with separate weighting schemes for the global
    /// linear solve and for the rigid-rotation fit
    pub fn new_weighted(m: &Mesh, linear: WeightingScheme, rotation: WeightingScheme) -> Self {
        let mut coord_to_idx = CoordMap::new();
        let mut coords = Vec::new();
        let mut triangles = Vec::new();
        let mut neighbors: Vec<Vec<usize>> = Vec::new();

        let mut edge_to_tri: HashMap<(usize, usize), Vec<usize>> = HashMap::new();
        for t in m.triangles() {
            let mut t_idxs = [0usize; 3];
            for (i, &c) in t.0.iter().enumerate() {
                t_idxs[i] = match coord_to_idx.get(c) {
                    Some(&idx) => idx,
                    None => {
                        let idx = coords.len();
                        coord_to_idx.insert(c, idx);
                        coords.push(c);
                        neighbors.push(Vec::new());
                        idx
                    }
                };
            }
            let tri_idx = triangles.len();
            triangles.push(t_idxs);

            for (i1, &c1) in t_idxs.iter().enumerate() {
                for (i2, &c2) in t_idxs.iter().enumerate() {
                    if i1 == i2 {
                        continue;
                    }
                    if i2 > i1 {
                        edge_to_tri.entry(ordered_edge(c1, c2)).or_default().push(tri_idx);
                    }
                    if !neighbors[c1].contains(&c2) {
                        neighbors[c1].push(c2);
                    }
                }
            }
        }

        let mut weights = Vec::with_capacity(coords.len());
        let mut rot_weights = Vec::with_capacity(coords.len());
        for (c1, ns) in neighbors.iter().enumerate() {
            let mut w = Vec::with_capacity(ns.len());
            let mut rw = Vec::with_capacity(ns.len());
            for &c2 in ns {
                let mut cotangent_sum = 0.0;
                for &t in &edge_to_tri[&ordered_edge(c1, c2)] {
                    let other = triangles[t]
                        .iter()
                        .copied()
                        .find(|&c3| c3 != c1 && c3 != c2)
                        .unwrap();
                    let c3_point = coords[other];
                    let v1 = (coords[c1] - c3_point).normalize();
                    let v2 = (coords[c2] - c3_point).normalize();
                    let cos_theta = v1.dot(v2);
                    // The max() clamps obtuse angles to zero weight rather
                    // than letting the square root go imaginary; downstream
                    // weights depend on this exact behavior.
                    cotangent_sum += cos_theta / (0.0f64.max(1.0 - cos_theta * cos_theta)).sqrt();
                }
                w.push(linear.weight(cotangent_sum / 2.0));
                rw.push(rotation.weight(cotangent_sum / 2.0));
            }
            weights.push(w);
            rot_weights.push(rw);
        }

        Self {
            coord_to_idx,
            coords,
            neighbors,
            weights,
            rot_weights,
            triangles,
            tolerance: DEFAULT_TOLERANCE,
            max_iters: DEFAULT_MAX_ITERATIONS,
            min_iters: DEFAULT_MIN_ITERATIONS,
        }
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Changes the convergence tolerance; lower values run longer but land
    /// closer to the optimum
    pub fn set_tolerance(&mut self, t: f64) {
        self.tolerance = t;
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iters
    }

    pub fn set_max_iterations(&mut self, m: usize) {
        self.max_iters = m;
    }

    pub fn min_iterations(&self) -> usize {
        self.min_iters
    }

    pub fn set_min_iterations(&mut self, m: usize) {
        self.min_iters = m;
    }

    /// Adds constraints pinning every vertex within `radius` of `center`,
    /// moved so that `center` would land on `target`
    pub fn constraints_around(
        &self,
        constraints: &mut Constraints,
        center: Vec3,
        radius: f64,
        target: Vec3,
    ) {
        let offset = target - center;
        for &c in &self.coords {
            if center.dist(c) <= radius {
                constraints.insert(c, c + offset);
            }
        }
    }

    /// Deforms the mesh so that each constrained coordinate lands exactly
    /// on its target
    pub fn deform(&self, constraints: &Constraints) -> Result<Mesh, Error> {
        let mut op = Operator::new(self, self.index_constraints(constraints)?);
        let out = self.deform_slice(&mut op, None)?;
        Ok(self.coords_to_mesh(&out))
    }

    /// Like [`deform`](Self::deform), but returns the full old→new
    /// coordinate mapping and accepts an optional initial guess
    pub fn deform_map(
        &self,
        constraints: &Constraints,
        initial_guess: Option<&CoordMap<Vec3>>,
    ) -> Result<CoordMap<Vec3>, Error> {
        let mut op = Operator::new(self, self.index_constraints(constraints)?);
        let init = match initial_guess {
            Some(m) => Some(self.guess_slice(m)?),
            None => None,
        };
        let out = self.deform_slice(&mut op, init)?;
        Ok(self.coords_to_map(&out))
    }

    /// Deforms with a single Laplacian solve instead of the full
    /// alternation
    ///
    /// This is the initial guess used by [`deform`](Self::deform); it is
    /// cheap but does not preserve local rigidity.
    pub fn laplace(&self, constraints: &Constraints) -> Result<CoordMap<Vec3>, Error> {
        let mut op = Operator::new(self, self.index_constraints(constraints)?);
        let out = self.laplace_slice(&mut op)?;
        Ok(self.coords_to_map(&out))
    }

    /// Creates a stateful deformer that reuses the Cholesky factorization
    /// across calls
    ///
    /// With `cold_start` false, each call also warm-starts from the
    /// previous deformation, which speeds up animation-style usage.
    pub fn seq_deformer(&self, cold_start: bool) -> SeqDeformer<'_> {
        SeqDeformer { arap: self, cold_start, current: None, op: None }
    }

    fn laplace_slice(&self, op: &mut Operator) -> Result<Vec<Vec3>, Error> {
        let full = Operator::new(self, HashMap::new());
        let targets = full.apply(&self.coords);
        op.lin_solve(&targets)
    }

    fn deform_slice(&self, op: &mut Operator, init: Option<Vec<Vec3>>) -> Result<Vec<Vec3>, Error> {
        let init = match init {
            Some(v) => v,
            None => self.laplace_slice(op)?,
        };

        // Clamp the starting point onto the constraints.
        let mut current = op.unsqueeze(&op.squeeze(&init));
        let mut rotations = self.rotations(&current);
        let mut last_energy = self.energy(&current, &rotations);
        for iter in 0..self.max_iters {
            let targets = op.targets(&rotations);
            current = op.lin_solve(&targets)?;
            rotations = self.rotations(&current);
            let energy = self.energy(&current, &rotations);
            if iter + 1 >= self.min_iters
                && (energy == 0.0 || 1.0 - energy / last_energy < self.tolerance)
            {
                break;
            }
            last_energy = energy;
        }
        Ok(current)
    }

    /// Rotations-of-best-fit for the current positions
    fn rotations(&self, current: &[Vec3]) -> Vec<Matrix3<f64>> {
        let mut rotations = Vec::with_capacity(self.coords.len());
        for (i, &c) in self.coords.iter().enumerate() {
            let mut covariance = Matrix3::zeros();
            for (j, &n) in self.neighbors[i].iter().enumerate() {
                let weight = self.rot_weights[i][j];
                let orig_diff = (self.coords[n] - c).to_na();
                let new_diff = (current[n] - current[i]).to_na();
                covariance += orig_diff * new_diff.transpose() * weight;
            }
            let (mut u, _s, v) = svd3(&covariance);
            let mut rot = v * u.transpose();
            if rot.determinant() < 0.0 {
                // Flip the column with the smallest singular value.
                let col = -u.column(2);
                u.set_column(2, &col);
                rot = v * u.transpose();
            }
            rotations.push(rot);
        }
        rotations
    }

    /// The deformation energy being minimized
    fn energy(&self, current: &[Vec3], rotations: &[Matrix3<f64>]) -> f64 {
        let mut energy = 0.0;
        for (i, neighbors) in self.neighbors.iter().enumerate() {
            let rotation = rotations[i];
            for (j, &n) in neighbors.iter().enumerate() {
                let w = self.weights[i][j];
                let rotated = Vec3::from_na(rotation * (self.coords[i] - self.coords[n]).to_na());
                let diff = current[i] - current[n] - rotated;
                energy += w * diff.dot(diff);
            }
        }
        energy
    }

    fn index_constraints(&self, constraints: &Constraints) -> Result<HashMap<usize, Vec3>, Error> {
        let mut res = HashMap::with_capacity(constraints.len());
        for (&input, &output) in constraints.iter() {
            match self.coord_to_idx.get(input) {
                Some(&idx) => {
                    res.insert(idx, output);
                }
                None => return Err(Error::UnknownVertex(input)),
            }
        }
        Ok(res)
    }

    fn guess_slice(&self, m: &CoordMap<Vec3>) -> Result<Vec<Vec3>, Error> {
        let mut res = self.coords.clone();
        for (&k, &v) in m.iter() {
            match self.coord_to_idx.get(k) {
                Some(&idx) => res[idx] = v,
                None => return Err(Error::UnknownVertex(k)),
            }
        }
        Ok(res)
    }

    fn coords_to_map(&self, s: &[Vec3]) -> CoordMap<Vec3> {
        let mut res = CoordMap::with_capacity(s.len());
        for (i, &c) in s.iter().enumerate() {
            res.insert(self.coords[i], c);
        }
        res
    }

    fn coords_to_mesh(&self, s: &[Vec3]) -> Mesh {
        let mut m = Mesh::new();
        for t in &self.triangles {
            m.add(crate::geom::Triangle::new(s[t[0]], s[t[1]], s[t[2]]));
        }
        m
    }
}

fn ordered_edge(i1: usize, i2: usize) -> (usize, usize) {
    if i1 < i2 {
        (i1, i2)
    } else {
        (i2, i1)
    }
}

/// Stateful deformer produced by [`Arap::seq_deformer`]
pub struct SeqDeformer<'a> {
    arap: &'a Arap,
    cold_start: bool,
    current: Option<Vec<Vec3>>,
    op: Option<Operator<'a>>,
}

impl SeqDeformer<'_> {
    pub fn deform(&mut self, constraints: &Constraints) -> Result<Mesh, Error> {
        let indexed = self.arap.index_constraints(constraints)?;
        match &mut self.op {
            Some(op) => op.update(indexed),
            None => self.op = Some(Operator::new(self.arap, indexed)),
        }
        let op = self.op.as_mut().unwrap();
        let init = if self.cold_start { None } else { self.current.take() };
        let out = self.arap.deform_slice(op, init)?;
        let mesh = self.arap.coords_to_mesh(&out);
        self.current = Some(out);
        Ok(mesh)
    }
}

/// The Laplace-Beltrami operator with constrained vertices substituted out
///
/// Solves happen over the "squeezed" (unconstrained) index space; the
/// Cholesky factorization is built on first use and survives constraint
/// retargeting as long as the constrained index set is unchanged.
struct Operator<'a> {
    arap: &'a Arap,
    constraints: HashMap<usize, Vec3>,
    squeezed_to_full: Vec<usize>,
    full_to_squeezed: Vec<Option<usize>>,
    chol: Option<SparseCholesky>,
}

impl<'a> Operator<'a> {
    fn new(arap: &'a Arap, constraints: HashMap<usize, Vec3>) -> Self {
        let mut squeezed_to_full = Vec::with_capacity(arap.coords.len() - constraints.len());
        let mut full_to_squeezed = Vec::with_capacity(arap.coords.len());
        for i in 0..arap.coords.len() {
            if constraints.contains_key(&i) {
                full_to_squeezed.push(None);
            } else {
                full_to_squeezed.push(Some(squeezed_to_full.len()));
                squeezed_to_full.push(i);
            }
        }
        Self { arap, constraints, squeezed_to_full, full_to_squeezed, chol: None }
    }

    /// Swaps in new constraints, keeping the factorization when the
    /// constrained index set is unchanged
    fn update(&mut self, constraints: HashMap<usize, Vec3>) {
        let same_keys = constraints.len() == self.constraints.len()
            && constraints.keys().all(|k| self.constraints.contains_key(k));
        if same_keys {
            self.constraints = constraints;
        } else {
            *self = Operator::new(self.arap, constraints);
        }
    }

    /// Solves `L x = b` where `b` and `x` are full-rank; constrained rows
    /// of `b` are ignored
    fn lin_solve(&mut self, b: &[Vec3]) -> Result<Vec<Vec3>, Error> {
        if self.squeezed_to_full.is_empty() {
            // Every vertex is constrained.
            return Ok(self.unsqueeze(&self.squeeze(b)));
        }

        let mut b = self.squeeze(b);
        for (i, c) in self.squeeze_delta().into_iter().enumerate() {
            b[i] += c;
        }

        if self.chol.is_none() {
            self.chol = Some(SparseCholesky::new(&self.squeezed_matrix())?);
        }
        let ins: Vec<[f64; 3]> = b.iter().map(|v| v.array()).collect();
        let outs = self.chol.as_ref().unwrap().solve_columns(&ins);
        let out_coords: Vec<Vec3> = outs.into_iter().map(Vec3::from_array).collect();
        Ok(self.unsqueeze(&out_coords))
    }

    fn squeeze(&self, full: &[Vec3]) -> Vec<Vec3> {
        self.squeezed_to_full.iter().map(|&j| full[j]).collect()
    }

    fn unsqueeze(&self, squeezed: &[Vec3]) -> Vec<Vec3> {
        self.full_to_squeezed
            .iter()
            .enumerate()
            .map(|(i, s)| match s {
                Some(j) => squeezed[*j],
                None => self.constraints[&i],
            })
            .collect()
    }

    /// Contribution of the substituted constraints to the right-hand side
    fn squeeze_delta(&self) -> Vec<Vec3> {
        self.squeezed_to_full
            .iter()
            .map(|&full_idx| {
                let mut result = Vec3::ZERO;
                for (j, &n) in self.arap.neighbors[full_idx].iter().enumerate() {
                    let w = self.arap.weights[full_idx][j];
                    if self.full_to_squeezed[n].is_none() {
                        result += self.constraints[&n] * w;
                    }
                }
                result
            })
            .collect()
    }

    /// Applies the squeezed operator to a squeezed vector
    fn apply(&self, v: &[Vec3]) -> Vec<Vec3> {
        self.squeezed_to_full
            .iter()
            .enumerate()
            .map(|(i, &full_idx)| {
                let p = v[i];
                let mut result = Vec3::ZERO;
                for (j, &n) in self.arap.neighbors[full_idx].iter().enumerate() {
                    let w = self.arap.weights[full_idx][j];
                    result += p * w;
                    if let Some(ns) = self.full_to_squeezed[n] {
                        result -= v[ns] * w;
                    }
                }
                result
            })
            .collect()
    }

    /// Right-hand side of the global step from the fitted rotations
    fn targets(&self, rotations: &[Matrix3<f64>]) -> Vec<Vec3> {
        self.arap
            .coords
            .iter()
            .enumerate()
            .map(|(i, &p)| {
                let mut result = Vec3::ZERO;
                for (j, &n) in self.arap.neighbors[i].iter().enumerate() {
                    let rotation = rotations[i] + rotations[n];
                    let w = self.arap.weights[i][j] / 2.0;
                    let diff = (p - self.arap.coords[n]) * w;
                    result += Vec3::from_na(rotation * diff.to_na());
                }
                result
            })
            .collect()
    }

    fn squeezed_matrix(&self) -> SparseMatrix {
        let mut mat = SparseMatrix::new(self.squeezed_to_full.len());
        for (i, &full_idx) in self.squeezed_to_full.iter().enumerate() {
            let mut diagonal = 0.0;
            for (j, &n) in self.arap.neighbors[full_idx].iter().enumerate() {
                let w = self.arap.weights[full_idx][j];
                diagonal += w;
                if let Some(ns) = self.full_to_squeezed[n] {
                    mat.set(i, ns, -w);
                }
            }
            mat.set(i, i, diagonal);
        }
        mat
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mesh::shapes;

    fn icosphere_arap() -> (Mesh, Arap) {
        let m = shapes::icosphere(Vec3::new(1.0, 2.0, 3.0), 1.5, 3);
        let arap = Arap::new(&m);
        (m, arap)
    }

    #[test]
    fn identity_constraint_is_identity() {
        let (_, arap) = icosphere_arap();
        let pinned = Vec3::new(1.0 + 1.5, 2.0, 3.0);
        let mut constraints = Constraints::new();
        constraints.insert(pinned, pinned);

        let out = arap.deform_map(&constraints, None).unwrap();
        out.for_each(|orig, new| {
            assert!(orig.dist(*new) < 1e-8, "{orig:?} moved to {new:?}");
        });
    }

    #[test]
    fn translation_constraints_translate() {
        let (mut m, arap) = icosphere_arap();
        let offset = Vec3::new(0.5, 0.0, 0.0);
        let mut constraints = Constraints::new();
        for v in m.vertices() {
            constraints.insert(v, v + offset);
        }
        let out = arap.deform_map(&constraints, None).unwrap();
        out.for_each(|orig, new| {
            assert!((orig + offset).dist(*new) < 1e-4);
        });
    }

    #[test]
    fn constraints_are_fixed_points() {
        let (mut m, arap) = icosphere_arap();
        let anchor = m.vertices()[0];
        let target = anchor + Vec3::new(0.3, -0.2, 0.1);
        let far = m
            .vertices()
            .into_iter()
            .max_by(|a, b| a.dist(anchor).total_cmp(&b.dist(anchor)))
            .unwrap();

        let mut constraints = Constraints::new();
        constraints.insert(anchor, target);
        constraints.insert(far, far);

        let out = arap.deform_map(&constraints, None).unwrap();
        assert_eq!(out.get(anchor), Some(&target));
        assert_eq!(out.get(far), Some(&far));
    }

    #[test]
    fn energy_is_monotone() {
        // Drive the loop manually to watch the energy between iterations.
        let (mut m, arap) = icosphere_arap();
        let anchor = m.vertices()[0];
        let mut constraints = Constraints::new();
        constraints.insert(anchor, anchor + Vec3::new(0.4, 0.4, 0.0));
        let opposite = m
            .vertices()
            .into_iter()
            .max_by(|a, b| a.dist(anchor).total_cmp(&b.dist(anchor)))
            .unwrap();
        constraints.insert(opposite, opposite);

        let mut op = Operator::new(&arap, arap.index_constraints(&constraints).unwrap());
        let init = arap.laplace_slice(&mut op).unwrap();
        let mut current = op.unsqueeze(&op.squeeze(&init));
        let mut rotations = arap.rotations(&current);
        let mut last = arap.energy(&current, &rotations);
        for _ in 0..10 {
            let targets = op.targets(&rotations);
            current = op.lin_solve(&targets).unwrap();
            rotations = arap.rotations(&current);
            let energy = arap.energy(&current, &rotations);
            assert!(energy <= last * (1.0 + 1e-9), "energy rose: {last} -> {energy}");
            last = energy;
        }
    }

    #[test]
    fn unknown_constraint_is_an_error() {
        let (_, arap) = icosphere_arap();
        let mut constraints = Constraints::new();
        constraints.insert(Vec3::new(100.0, 0.0, 0.0), Vec3::ZERO);
        assert!(matches!(
            arap.deform(&constraints),
            Err(Error::UnknownVertex(_))
        ));
    }

    #[test]
    fn seq_deformer_reuses_factorization() {
        let (mut m, arap) = icosphere_arap();
        let anchor = m.vertices()[0];
        let opposite = m
            .vertices()
            .into_iter()
            .max_by(|a, b| a.dist(anchor).total_cmp(&b.dist(anchor)))
            .unwrap();

        let mut deformer = arap.seq_deformer(false);
        for step in 0..3 {
            let offset = Vec3::new(0.1, 0.0, 0.0) * step as f64;
            let mut constraints = Constraints::new();
            constraints.insert(anchor, anchor + offset);
            constraints.insert(opposite, opposite);
            let out = deformer.deform(&constraints).unwrap();
            assert_eq!(out.len(), 20 * 64);
        }
    }
}
