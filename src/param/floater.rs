//! Convex-combination parametrization (Floater 1997)
//!
//! Solves for interior vertex positions as convex combinations of their
//! neighbors with the boundary pinned: row `i` of the sparse system fixes
//! `-x_i + Σ_j w_ij x_j = -Σ_b w_ib boundary(b)`.
//!
//! Based on "Parametrization and smooth approximation of surface
//! triangulations" (Floater, 1997).

use crate::coord_map::{CoordMap, DirectedEdgeMap};
use crate::geom::Vec3;
use crate::la::{BiCgStab, LinearSolver, SparseMatrix};
use crate::mesh::Mesh;
use crate::Error;
use nalgebra::{DVector, Vector2};

/// Default stopping criteria for the parametrization solver
pub fn default_solver() -> BiCgStab {
    BiCgStab { max_iters: 5000, mse_tolerance: 1e-16 }
}

/// Computes the 2D parametrization of a disk-like mesh
///
/// `boundary` maps every boundary vertex to a point on a convex polygon;
/// `edge_weights` maps each (interior center, neighbor) pair to a
/// non-negative weight, with each center's weights summing to 1.  The
/// returned mapping covers every vertex of the mesh, boundary included.
pub fn floater97(
    m: &mut Mesh,
    boundary: &CoordMap<Vector2<f64>>,
    edge_weights: &DirectedEdgeMap<f64>,
    solver: Option<&dyn LinearSolver>,
) -> Result<CoordMap<Vector2<f64>>, Error> {
    floater97_with_init(m, boundary, edge_weights, solver, None)
}

pub(super) fn floater97_with_init(
    m: &mut Mesh,
    boundary: &CoordMap<Vector2<f64>>,
    edge_weights: &DirectedEdgeMap<f64>,
    solver: Option<&dyn LinearSolver>,
    previous_param: Option<&CoordMap<Vector2<f64>>>,
) -> Result<CoordMap<Vector2<f64>>, Error> {
    let neighbors = m.all_vertex_neighbors();

    // Rows of the system are the non-boundary vertices.
    let mut non_boundary_to_index: CoordMap<usize> = CoordMap::new();
    let mut non_boundary: Vec<Vec3> = Vec::new();
    for v in m.vertices() {
        if !boundary.contains_key(v) {
            non_boundary_to_index.insert(v, non_boundary.len());
            non_boundary.push(v);
        }
    }

    let mut matrix = SparseMatrix::new(non_boundary.len());
    let mut bias = vec![Vector2::zeros(); non_boundary.len()];
    for (i, &center) in non_boundary.iter().enumerate() {
        matrix.set(i, i, -1.0);
        let mut total_weight = 0.0;
        for &neighbor in neighbors.get(center).map(Vec::as_slice).unwrap_or(&[]) {
            let weight = *edge_weights
                .get(center, neighbor)
                .ok_or(Error::MissingWeight(center, neighbor))?;
            if weight < 0.0 {
                return Err(Error::BadWeight(weight));
            }
            total_weight += weight;

            match non_boundary_to_index.get(neighbor) {
                Some(&j) => matrix.set(i, j, weight),
                // Boundary neighbors are constants and move to the
                // right-hand side.
                None => bias[i] -= boundary.get(neighbor).unwrap() * weight,
            }
        }
        if (total_weight - 1.0).abs() > 1e-4 {
            return Err(Error::UnnormalizedWeights(total_weight));
        }
    }

    let fallback = default_solver();
    let solver: &dyn LinearSolver = solver.unwrap_or(&fallback);
    let mut solution = vec![Vector2::zeros(); non_boundary.len()];
    for axis in 0..2 {
        let b = DVector::from_fn(non_boundary.len(), |j, _| bias[j][axis]);
        let init = previous_param.map(|prev| {
            DVector::from_fn(non_boundary.len(), |j, _| prev.get(non_boundary[j]).unwrap()[axis])
        });
        let x = solver.solve_linear_system(&|v| matrix.apply(v), &b, init.as_ref());
        for (j, s) in solution.iter_mut().enumerate() {
            s[axis] = x[j];
        }
    }

    let mut result = CoordMap::with_capacity(boundary.len() + non_boundary.len());
    for (&k, &v) in boundary.iter() {
        result.insert(k, v);
    }
    for (point, &uv) in non_boundary.iter().zip(&solution) {
        result.insert(*point, uv);
    }
    Ok(result)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::geom::Triangle;
    use crate::mesh::shapes;
    use crate::param::{circle_boundary, shape_preserving_weights, uniform_weights};

    #[test]
    fn single_triangle_is_the_identity() {
        let mut m = Mesh::from_triangles([Triangle::new(
            Vec3::ZERO,
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        )]);
        let mut boundary = CoordMap::new();
        boundary.insert(Vec3::ZERO, Vector2::new(0.0, 0.0));
        boundary.insert(Vec3::new(1.0, 0.0, 0.0), Vector2::new(1.0, 0.0));
        boundary.insert(Vec3::new(0.0, 1.0, 0.0), Vector2::new(0.0, 1.0));

        let weights = uniform_weights(&m);
        let out = floater97(&mut m, &boundary, &weights, None).unwrap();
        assert_eq!(out.len(), 3);
        for (k, v) in out.iter() {
            assert!((v.x - k.x).abs() < 1e-12 && (v.y - k.y).abs() < 1e-12);
        }
    }

    /// Interior vertices must be the convex combination of their neighbors
    fn assert_fixed_point(
        m: &Mesh,
        boundary: &CoordMap<Vector2<f64>>,
        weights: &DirectedEdgeMap<f64>,
        out: &CoordMap<Vector2<f64>>,
    ) {
        let neighbors = m.all_vertex_neighbors();
        for (&v, ns) in neighbors.iter() {
            if boundary.contains_key(v) {
                continue;
            }
            let mut combo = Vector2::zeros();
            for &n in ns {
                combo += out.get(n).unwrap() * *weights.get(v, n).unwrap();
            }
            let x = out.get(v).unwrap();
            assert!((combo - x).norm() < 1e-6, "vertex {v:?}: {combo:?} vs {x:?}");
        }
    }

    /// An open, non-planar patch: the z = 0 face of a subdivided box,
    /// lifted into a bump
    fn bump_patch() -> Mesh {
        let mut patch = Mesh::new();
        for t in shapes::rect(Vec3::ZERO, Vec3::new(1.0, 1.0, 1.0))
            .subdivide_edges(5)
            .triangles()
        {
            if t.0.iter().all(|v| v.z == 0.0) {
                patch.add(*t);
            }
        }
        patch.map_coords(|c| {
            Vec3::new(c.x, c.y, c.x * (1.0 - c.x) * c.y * (1.0 - c.y))
        })
    }

    #[test]
    fn patch_interior_is_a_convex_combination() {
        let mut patch = bump_patch();
        let boundary = circle_boundary(&mut patch).unwrap();

        let uniform = uniform_weights(&patch);
        let out = floater97(&mut patch, &boundary, &uniform, None).unwrap();
        assert_fixed_point(&patch, &boundary, &uniform, &out);

        let shaped = shape_preserving_weights(&mut patch).unwrap();
        let out = floater97(&mut patch, &boundary, &shaped, None).unwrap();
        assert_fixed_point(&patch, &boundary, &shaped, &out);
    }

    #[test]
    fn negative_weights_are_rejected() {
        let mut m = Mesh::from_triangles([Triangle::new(
            Vec3::ZERO,
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        )]);
        // No interior vertices, so craft a fake one by leaving a vertex off
        // the boundary with a bogus weight.
        let mut boundary = CoordMap::new();
        boundary.insert(Vec3::new(1.0, 0.0, 0.0), Vector2::new(1.0, 0.0));
        boundary.insert(Vec3::new(0.0, 1.0, 0.0), Vector2::new(0.0, 1.0));
        let mut weights = DirectedEdgeMap::new();
        weights.insert(Vec3::ZERO, Vec3::new(1.0, 0.0, 0.0), 1.5);
        weights.insert(Vec3::ZERO, Vec3::new(0.0, 1.0, 0.0), -0.5);
        assert!(matches!(
            floater97(&mut m, &boundary, &weights, None),
            Err(Error::BadWeight(_))
        ));
    }
}
