//! Convex-combination weight schemes for the Floater parametrization
//!
//! All schemes produce directed weights: `(center, neighbor) -> w` with the
//! weights around each interior center summing to 1.

use super::boundary::boundary_sequence;
use crate::coord_map::{CoordMap, DirectedEdgeMap};
use crate::geom::Vec3;
use crate::mesh::Mesh;
use crate::Error;
use nalgebra::{Matrix2, Vector2};

/// Uniform weights, `1 / deg(center)`
///
/// The simplest scheme; as shown in Floater (1997) it minimizes the sum of
/// squared edge lengths of the parametrization, at the cost of distortion.
pub fn uniform_weights(m: &Mesh) -> DirectedEdgeMap<f64> {
    let mut res = DirectedEdgeMap::new();
    for (&k, neighbors) in m.all_vertex_neighbors().iter() {
        let w = 1.0 / neighbors.len() as f64;
        for &n in neighbors {
            res.insert(k, n, w);
        }
    }
    res
}

/// Inverse chord-length weights, `1 / ‖center − neighbor‖^r`, normalized
/// per center
pub fn inv_chord_length_weights(m: &Mesh, r: f64) -> DirectedEdgeMap<f64> {
    let mut res = DirectedEdgeMap::new();
    for (&k, neighbors) in m.all_vertex_neighbors().iter() {
        let weights: Vec<f64> = neighbors
            .iter()
            .map(|&n| 1.0 / k.dist(n).powf(r))
            .collect();
        let total: f64 = weights.iter().sum();
        for (&n, w) in neighbors.iter().zip(&weights) {
            res.insert(k, n, w / total);
        }
    }
    res
}

/// Shape-preserving weights from Floater (1997)
///
/// Each interior one-ring is flattened by proportionally scaling its angles
/// to sum to 2π; every neighbor then contributes the barycentric
/// coordinates of the flattened origin in the triangle it forms with the
/// opposite edge, averaged over all neighbors.
///
/// The mesh must be properly connected, consistently oriented, and have
/// exactly one boundary loop.
pub fn shape_preserving_weights(m: &mut Mesh) -> Result<DirectedEdgeMap<f64>, Error> {
    let mut on_boundary: CoordMap<bool> = CoordMap::new();
    for c in boundary_sequence(m)? {
        on_boundary.insert(c, true);
    }

    let mut res = DirectedEdgeMap::new();
    for center in m.vertices() {
        if on_boundary.contains_key(center) {
            // The flattening strategy is meaningless for boundary vertices,
            // and the linear system never uses them as centers.
            continue;
        }
        let (neighbors, weights) = local_parameterization_weights(m, center)?;
        for (n, w) in neighbors.into_iter().zip(weights) {
            res.insert(center, n, w);
        }
    }
    Ok(res)
}

/// Flattens the one-ring around `center` and computes the barycentric
/// contributions of each neighbor
fn local_parameterization_weights(
    m: &mut Mesh,
    center: Vec3,
) -> Result<(Vec<Vec3>, Vec<f64>), Error> {
    let ps = ordered_neighbors(m, center)?;
    let n = ps.len();

    // Cumulative angles, proportionally rescaled to total 2π.
    let mut angles = vec![0.0; n];
    let mut total_angle = 0.0;
    for i in 0..n {
        let p1 = ps[i];
        let p2 = ps[(i + 1) % n];
        angles[i] = total_angle;
        let v1 = (p1 - center).normalize();
        let v2 = (p2 - center).normalize();
        total_angle += v1.dot(v2).clamp(0.0, 1.0).acos();
    }
    for a in &mut angles {
        *a *= 2.0 * std::f64::consts::PI / total_angle;
    }
    let ps2d: Vec<Vector2<f64>> = angles
        .iter()
        .zip(&ps)
        .map(|(&theta, &p)| Vector2::new(theta.cos(), theta.sin()) * p.dist(center))
        .collect();

    let mut bary = vec![0.0; n];
    for (i, &theta) in angles.iter().enumerate() {
        let mut opposite = theta + std::f64::consts::PI;
        if opposite > 2.0 * std::f64::consts::PI {
            opposite -= 2.0 * std::f64::consts::PI;
        }
        let index = angles.partition_point(|&a| a < opposite);
        let i1 = (index + n - 1) % n;
        let i2 = index % n;
        if i1 == i || i2 == i {
            return Err(Error::DegenerateTriangle);
        }

        let p1 = ps2d[i];
        let p2 = ps2d[i1];
        let p3 = ps2d[i2];

        // Barycentric coordinates of the origin in (p1, p2, p3).
        let mat = Matrix2::from_columns(&[p2 - p1, p3 - p1]);
        let det = mat.determinant();
        if det == 0.0 {
            return Err(Error::DegenerateTriangle);
        }
        let rhs = -p1;
        let b2 = ((mat[(1, 1)] * rhs.x - mat[(0, 1)] * rhs.y) / det).clamp(0.0, 1.0);
        let b3 = ((-mat[(1, 0)] * rhs.x + mat[(0, 0)] * rhs.y) / det).clamp(0.0, 1.0);
        let b1 = (1.0 - (b2 + b3)).max(0.0);

        bary[i] += b1 / n as f64;
        bary[i1] += b2 / n as f64;
        bary[i2] += b3 / n as f64;
    }

    Ok((ps, bary))
}

/// The one-ring of `center`, ordered by the shared winding of its faces
fn ordered_neighbors(m: &mut Mesh, center: Vec3) -> Result<Vec<Vec3>, Error> {
    let mut vertex_to_next: CoordMap<Vec3> = CoordMap::new();
    let mut start = None;
    for id in m.find_vertex(center) {
        let t = *m.get(id).unwrap();
        for i in 0..3 {
            let p1 = t.0[i];
            let p2 = t.0[(i + 1) % 3];
            if p1 == center || p2 == center {
                continue;
            }
            vertex_to_next.insert(p1, p2);
            start = Some(p1);
        }
    }
    let start = start.ok_or(Error::BadOrientation)?;

    let mut res = vec![start];
    let mut cur = *vertex_to_next.get(start).ok_or(Error::BadOrientation)?;
    while cur != start {
        res.push(cur);
        cur = match vertex_to_next.get(cur) {
            Some(&next) => next,
            None => return Err(Error::BadOrientation),
        };
    }
    if res.len() != vertex_to_next.len() {
        return Err(Error::BadOrientation);
    }
    Ok(res)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::geom::Triangle;

    /// A fan of triangles around an interior vertex, open along the outside
    fn wheel(center: Vec3, spokes: usize, radius: f64) -> Mesh {
        let mut m = Mesh::new();
        for i in 0..spokes {
            let angle = |k: usize| 2.0 * std::f64::consts::PI * k as f64 / spokes as f64;
            let p1 = center + Vec3::new(angle(i).cos(), angle(i).sin(), 0.0) * radius;
            let p2 = center + Vec3::new(angle(i + 1).cos(), angle(i + 1).sin(), 0.0) * radius;
            m.add(Triangle::new(center, p1, p2));
        }
        m
    }

    fn assert_convex(weights: &DirectedEdgeMap<f64>, center: Vec3, neighbors: usize) {
        let mut total = 0.0;
        let mut count = 0;
        weights.for_each(|a, _, &w| {
            if a == center {
                assert!(w >= 0.0);
                total += w;
                count += 1;
            }
        });
        assert_eq!(count, neighbors);
        assert!((total - 1.0).abs() < 1e-9, "weights sum to {total}");
    }

    #[test]
    fn uniform_weights_are_convex() {
        let center = Vec3::new(1.0, 2.0, 3.0);
        let m = wheel(center, 6, 1.0);
        let w = uniform_weights(&m);
        assert_convex(&w, center, 6);
    }

    #[test]
    fn inv_chord_weights_prefer_close_neighbors() {
        let center = Vec3::ZERO;
        let m = wheel(center, 5, 1.0);
        let w = inv_chord_length_weights(&m, 2.0);
        assert_convex(&w, center, 5);
    }

    #[test]
    fn shape_preserving_weights_are_convex() {
        let center = Vec3::new(0.5, 0.5, 0.0);
        let mut m = wheel(center, 7, 0.8);
        let w = shape_preserving_weights(&mut m).unwrap();
        assert_convex(&w, center, 7);

        // A symmetric wheel should weigh all spokes equally.
        let mut values = Vec::new();
        w.for_each(|a, _, &val| {
            if a == center {
                values.push(val);
            }
        });
        for v in &values {
            assert!((v - 1.0 / 7.0).abs() < 1e-9, "uneven weight {v}");
        }
    }
}
