//! Primitive mesh generators

use super::Mesh;
use crate::coord_map::EdgeMap;
use crate::geom::{Segment, Triangle, Vec3};

/// Golden ratio, used to place icosahedron vertices
const PHI: f64 = 1.618033988749895;

/// Builds an axis-aligned box with outward-oriented faces
pub fn rect(min: Vec3, max: Vec3) -> Mesh {
    let v = |x, y, z| Vec3::new(x, y, z);
    let (x0, y0, z0) = (min.x, min.y, min.z);
    let (x1, y1, z1) = (max.x, max.y, max.z);

    let a = v(x0, y0, z0);
    let b = v(x1, y0, z0);
    let c = v(x1, y1, z0);
    let d = v(x0, y1, z0);
    let e = v(x0, y0, z1);
    let f = v(x1, y0, z1);
    let g = v(x1, y1, z1);
    let h = v(x0, y1, z1);

    // Each quad is wound counter-clockwise seen from outside.
    let quads = [
        [a, d, c, b], // bottom
        [e, f, g, h], // top
        [a, b, f, e], // y = min
        [c, d, h, g], // y = max
        [d, a, e, h], // x = min
        [b, c, g, f], // x = max
    ];
    let mut m = Mesh::new();
    for q in quads {
        m.add(Triangle::new(q[0], q[1], q[2]));
        m.add(Triangle::new(q[0], q[2], q[3]));
    }
    m
}

/// Builds a sphere by subdividing an icosahedron
///
/// Each subdivision splits every face into four and reprojects new vertices
/// onto the sphere, so the face count is `20 · 4^subdivisions`.
pub fn icosphere(center: Vec3, radius: f64, subdivisions: usize) -> Mesh {
    let verts = [
        Vec3::new(-1.0, PHI, 0.0),
        Vec3::new(1.0, PHI, 0.0),
        Vec3::new(-1.0, -PHI, 0.0),
        Vec3::new(1.0, -PHI, 0.0),
        Vec3::new(0.0, -1.0, PHI),
        Vec3::new(0.0, 1.0, PHI),
        Vec3::new(0.0, -1.0, -PHI),
        Vec3::new(0.0, 1.0, -PHI),
        Vec3::new(PHI, 0.0, -1.0),
        Vec3::new(PHI, 0.0, 1.0),
        Vec3::new(-PHI, 0.0, -1.0),
        Vec3::new(-PHI, 0.0, 1.0),
    ];
    let faces: [[usize; 3]; 20] = [
        [0, 11, 5],
        [0, 5, 1],
        [0, 1, 7],
        [0, 7, 10],
        [0, 10, 11],
        [1, 5, 9],
        [5, 11, 4],
        [11, 10, 2],
        [10, 7, 6],
        [7, 1, 8],
        [3, 9, 4],
        [3, 4, 2],
        [3, 2, 6],
        [3, 6, 8],
        [3, 8, 9],
        [4, 9, 5],
        [2, 4, 11],
        [6, 2, 10],
        [8, 6, 7],
        [9, 8, 3],
    ];

    let project = |p: Vec3| p.normalize() * radius;
    let mut tris: Vec<Triangle> = faces
        .iter()
        .map(|f| Triangle::new(project(verts[f[0]]), project(verts[f[1]]), project(verts[f[2]])))
        .collect();

    for _ in 0..subdivisions {
        // Cache midpoints per edge so neighbors share the exact same vertex.
        let mut midpoints: EdgeMap<Vec3> = EdgeMap::new();
        let mut mid = |a: Vec3, b: Vec3, midpoints: &mut EdgeMap<Vec3>| {
            let seg = Segment::new(a, b);
            if let Some(&m) = midpoints.get_seg(seg) {
                m
            } else {
                let m = project(a.mid(b));
                midpoints.insert_seg(seg, m);
                m
            }
        };
        let mut next = Vec::with_capacity(tris.len() * 4);
        for t in &tris {
            let [a, b, c] = t.0;
            let ab = mid(a, b, &mut midpoints);
            let bc = mid(b, c, &mut midpoints);
            let ca = mid(c, a, &mut midpoints);
            next.push(Triangle::new(a, ab, ca));
            next.push(Triangle::new(ab, b, bc));
            next.push(Triangle::new(ca, bc, c));
            next.push(Triangle::new(ab, bc, ca));
        }
        tris = next;
    }

    Mesh::from_triangles(
        tris.iter()
            .map(|t| Triangle::new(t.0[0] + center, t.0[1] + center, t.0[2] + center)),
    )
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rect_is_manifold_and_oriented() {
        let m = rect(Vec3::new(-1.0, 0.0, 2.0), Vec3::new(1.0, 3.0, 4.0));
        assert_eq!(m.len(), 12);
        assert!(!m.needs_repair());
        assert!((m.volume() - 12.0).abs() < 1e-12);
    }

    #[test]
    fn icosphere_is_manifold_and_round() {
        let center = Vec3::new(0.5, -1.0, 2.0);
        let mut m = icosphere(center, 2.0, 2);
        assert_eq!(m.len(), 20 * 16);
        assert!(!m.needs_repair());
        for v in m.vertices() {
            assert!((v.dist(center) - 2.0).abs() < 1e-12);
        }
    }
}
