//! Stretch-minimizing parametrization
//!
//! Re-weights the Floater system by per-vertex stretch and re-solves,
//! following "A fast and simple stretch-minimizing mesh parameterization"
//! (Yoshizawa et al., 2004).  Stretch itself is the measure of Sander et
//! al., "Texture Mapping Progressive Meshes".

use super::floater::{floater97, floater97_with_init};
use crate::coord_map::{CoordMap, DirectedEdgeMap};
use crate::geom::Triangle;
use crate::la::LinearSolver;
use crate::mesh::{Mesh, TriangleId};
use crate::Error;
use log::debug;
use nalgebra::Vector2;
use std::collections::HashSet;

/// Iteratively minimizes parametrization stretch
///
/// `edge_weights` is consumed as the starting weighting and left holding
/// the weights of the final solve.  `n_iters` bounds the number of
/// re-weighting steps (`None` iterates until the objective stops
/// improving); `eta` in (0, 1] is the step size, 1 being the standard
/// update.  Returns the last improving solution.
pub fn stretch_minimizing(
    m: &mut Mesh,
    boundary: &CoordMap<Vector2<f64>>,
    edge_weights: &mut DirectedEdgeMap<f64>,
    solver: Option<&dyn LinearSolver>,
    n_iters: Option<usize>,
    eta: f64,
) -> Result<CoordMap<Vector2<f64>>, Error> {
    let mut solution = floater97(m, boundary, edge_weights, solver)?;

    // Triangles entirely on the boundary are constants of the system;
    // counting their stretch would let the boundary dominate the weights.
    let mut boundary_tris: HashSet<TriangleId> = HashSet::new();
    for (id, t) in m.iter_with_ids() {
        if t.0.iter().all(|c| boundary.contains_key(*c)) {
            boundary_tris.insert(id);
        }
    }

    let mut prev_solution = solution.clone();
    let mut prev_total = f64::INFINITY;
    let mut iter = 0;
    while n_iters.map_or(true, |n| iter < n) {
        let (stretches, total) = vertex_stretches(m, &boundary_tris, &solution, eta)?;
        debug!("stretch iteration {iter}: total={total}");
        if total >= prev_total {
            return Ok(prev_solution);
        }

        let mut weight_sums: CoordMap<f64> = CoordMap::new();
        let mut unnormalized = DirectedEdgeMap::new();
        for (&(center, neighbor), &value) in edge_weights.iter() {
            let new_value = value / stretches.get_or_default(neighbor);
            if !new_value.is_finite() {
                return Err(Error::InvalidStretch);
            }
            unnormalized.insert(center, neighbor, new_value);
            weight_sums.add(center, new_value);
        }
        for (&(center, neighbor), &value) in unnormalized.iter() {
            edge_weights.insert(center, neighbor, value / weight_sums.get_or_default(center));
        }

        prev_total = total;
        prev_solution = solution.clone();
        solution = floater97_with_init(m, boundary, edge_weights, solver, Some(&solution))?;
        iter += 1;
    }
    Ok(solution)
}

/// Per-vertex stretch (to the power η/2) and the area-weighted total
fn vertex_stretches(
    m: &Mesh,
    boundary_tris: &HashSet<TriangleId>,
    param: &CoordMap<Vector2<f64>>,
    eta: f64,
) -> Result<(CoordMap<f64>, f64), Error> {
    let mut total_stretch = 0.0;
    let mut total_area = 0.0;
    // Accumulate the per-vertex numerator and denominator directly.
    let mut sums: CoordMap<(f64, f64)> = CoordMap::new();
    for (id, t) in m.iter_with_ids() {
        if boundary_tris.contains(&id) {
            for &c in &t.0 {
                sums.entry(c).or_insert((0.0, 0.0));
            }
            continue;
        }
        let (stretch_sq, area) = triangle_stretch_and_area(t, param)?;
        total_stretch += area * stretch_sq;
        total_area += area;
        for &c in &t.0 {
            let e = sums.entry(c).or_insert((0.0, 0.0));
            e.0 += area * stretch_sq;
            e.1 += area;
        }
    }

    let mut result = CoordMap::with_capacity(sums.len());
    for (&c, &(num, den)) in sums.iter() {
        result.insert(c, (num / den).powf(eta / 2.0));
    }
    if total_area == 0.0 {
        return Ok((result, 0.0));
    }
    Ok((result, total_stretch / total_area))
}

/// Squared stretch and parameter-space area of one triangle
fn triangle_stretch_and_area(
    t: &Triangle,
    param: &CoordMap<Vector2<f64>>,
) -> Result<(f64, f64), Error> {
    let mut p2d = [Vector2::zeros(); 3];
    for (i, &c) in t.0.iter().enumerate() {
        p2d[i] = *param.get(c).ok_or(Error::UnknownVertex(c))?;
    }

    let (s1, s2, s3) = (p2d[0].x, p2d[1].x, p2d[2].x);
    let (t1, t2, t3) = (p2d[0].y, p2d[1].y, p2d[2].y);
    let area = ((s2 - s1) * (t3 - t1) - (s3 - s1) * (t2 - t1)) / 2.0;
    let ss = (t.0[0] * (t2 - t3) + t.0[1] * (t3 - t1) + t.0[2] * (t1 - t2)) / (2.0 * area);
    let st = (t.0[0] * (s3 - s2) + t.0[1] * (s1 - s3) + t.0[2] * (s2 - s1)) / (2.0 * area);
    let a = ss.dot(ss);
    let c = st.dot(st);
    Ok(((a + c) / 2.0, t.area()))
}
