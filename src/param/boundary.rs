//! Boundary extraction and convex boundary maps

use crate::coord_map::CoordMap;
use crate::geom::Vec3;
use crate::mesh::Mesh;
use crate::Error;
use nalgebra::Vector2;

/// Walks the boundary cycle of a disk-like mesh
///
/// The mesh must be consistently oriented and manifold except along the
/// boundary, which must be a single connected cycle of at least three
/// segments.
pub fn boundary_sequence(m: &mut Mesh) -> Result<Vec<Vec3>, Error> {
    let mut vertex_to_next: CoordMap<Vec3> = CoordMap::new();
    let mut start = None;
    for t in m.triangle_vec() {
        for i in 0..3 {
            let (p1, p2) = (t.0[i], t.0[(i + 1) % 3]);
            if m.find_edge(p1, p2).len() == 1 {
                vertex_to_next.insert(p1, p2);
                start = Some(p1);
            }
        }
    }
    let Some(start) = start else {
        return Err(Error::NoBoundary);
    };

    let mut res = vec![start];
    let mut cur = *vertex_to_next.get(start).unwrap();
    while cur != start {
        res.push(cur);
        cur = match vertex_to_next.get(cur) {
            Some(&next) => next,
            None => return Err(Error::BadOrientation),
        };
    }
    if res.len() < vertex_to_next.len() {
        return Err(Error::MultipleBoundaries);
    }
    Ok(res)
}

/// Maps the boundary onto the unit circle, with angle proportional to
/// cumulative edge length
pub fn circle_boundary(m: &mut Mesh) -> Result<CoordMap<Vector2<f64>>, Error> {
    let points = boundary_sequence(m)?;
    let mut total_length = 0.0;
    for (i, &p) in points.iter().enumerate() {
        total_length += points[(i + 1) % points.len()].dist(p);
    }

    let mut mapping = CoordMap::with_capacity(points.len());
    mapping.insert(points[0], Vector2::new(1.0, 0.0));
    let mut cur_length = 0.0;
    for (i, &p) in points.iter().enumerate() {
        let p1 = points[(i + 1) % points.len()];
        cur_length += p1.dist(p);
        let theta = 2.0 * std::f64::consts::PI * cur_length / total_length;
        mapping.insert(p1, Vector2::new(theta.cos(), theta.sin()));
    }
    Ok(mapping)
}

/// Maps the boundary onto the unit square by radially rescaling the circle
/// map
///
/// Corner-adjacent boundary triangles can end up with three colinear
/// parameter points; prefer [`p_norm_boundary`] when that matters.
pub fn square_boundary(m: &mut Mesh) -> Result<CoordMap<Vector2<f64>>, Error> {
    let circle = circle_boundary(m)?;
    let mut res = CoordMap::with_capacity(circle.len());
    for (&k, v) in circle.iter() {
        let scale = v.x.abs().max(v.y.abs());
        res.insert(k, v / scale);
    }
    Ok(res)
}

/// Maps the boundary onto the unit disk of an arbitrary p-norm
///
/// `p = 2` reproduces [`circle_boundary`]; large `p` approaches the square
/// without ever producing colinear corner points.
pub fn p_norm_boundary(m: &mut Mesh, p: f64) -> Result<CoordMap<Vector2<f64>>, Error> {
    let circle = circle_boundary(m)?;
    let mut res = CoordMap::with_capacity(circle.len());
    for (&k, v) in circle.iter() {
        let norm = (v.x.abs().powf(p) + v.y.abs().powf(p)).powf(1.0 / p);
        res.insert(k, v / norm);
    }
    Ok(res)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::geom::Triangle;
    use crate::mesh::shapes;

    fn open_patch() -> Mesh {
        // A 4x4 subdivided square in the plane z = 0.
        let mut patch = Mesh::new();
        for t in shapes::rect(Vec3::ZERO, Vec3::new(1.0, 1.0, 1.0))
            .subdivide_edges(4)
            .triangles()
        {
            if t.0.iter().all(|v| v.z == 0.0) {
                patch.add(*t);
            }
        }
        patch
    }

    #[test]
    fn boundary_of_open_patch_is_a_cycle() {
        let mut patch = open_patch();
        let seq = boundary_sequence(&mut patch).unwrap();
        assert_eq!(seq.len(), 16);
        for p in &seq {
            assert!(
                p.x == 0.0 || p.x == 1.0 || p.y == 0.0 || p.y == 1.0,
                "interior vertex {p:?} on boundary"
            );
        }
    }

    #[test]
    fn closed_mesh_has_no_boundary() {
        let mut m = shapes::icosphere(Vec3::ZERO, 1.0, 1);
        assert!(matches!(boundary_sequence(&mut m), Err(Error::NoBoundary)));
    }

    #[test]
    fn two_patches_are_rejected() {
        let mut m = open_patch();
        let other = open_patch().translate(Vec3::new(5.0, 0.0, 0.0));
        m.add_mesh(&other);
        assert!(matches!(
            boundary_sequence(&mut m),
            Err(Error::MultipleBoundaries)
        ));
    }

    #[test]
    fn circle_boundary_lands_on_unit_circle() {
        let mut patch = open_patch();
        let mapping = circle_boundary(&mut patch).unwrap();
        assert_eq!(mapping.len(), 16);
        for (_, v) in mapping.iter() {
            assert!((v.norm() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn p_norm_boundary_stays_off_the_square() {
        let mut patch = open_patch();
        let square = square_boundary(&mut patch).unwrap();
        for (_, v) in square.iter() {
            assert!((v.x.abs().max(v.y.abs()) - 1.0).abs() < 1e-12);
        }

        let pnorm = p_norm_boundary(&mut patch, 4.0).unwrap();
        for (_, v) in pnorm.iter() {
            let n4 = (v.x.abs().powf(4.0) + v.y.abs().powf(4.0)).powf(0.25);
            assert!((n4 - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn single_triangle_boundary() {
        let mut m = Mesh::from_triangles([Triangle::new(
            Vec3::ZERO,
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        )]);
        assert_eq!(boundary_sequence(&mut m).unwrap().len(), 3);
    }
}
