//! Mesh subdivision

use super::Mesh;
use crate::coord_map::{CoordMap, EdgeMap};
use crate::geom::{Segment, Triangle, Vec3};
use crate::Error;

impl Mesh {
    /// Subdivides the mesh `iters` times using the Loop subdivision rule,
    /// producing a smoother surface with more triangles
    ///
    /// Fails on meshes with singular edges.
    pub fn loop_subdivide(&self, iters: usize) -> Result<Mesh, Error> {
        let mut m = Mesh::from_triangles(self.triangles().copied());
        for _ in 0..iters {
            m = loop_subdivide_once(&mut m)?;
        }
        Ok(m)
    }

    /// Sub-divides each edge into `n` segments and fills each original
    /// triangle with `n²` coplanar triangles
    pub fn subdivide_edges(&self, n: usize) -> Mesh {
        assert!(n >= 1, "number of sub-edges must be at least 1");

        let mut res = Mesh::new();
        let mut side1 = vec![Vec3::ZERO; n + 1];
        let mut side2 = vec![Vec3::ZERO; n + 1];
        for t in self.triangles() {
            divide_segment(t.0[0], t.0[1], &mut side1);
            divide_segment(t.0[0], t.0[2], &mut side2);

            for i in 0..n {
                let mut narrow = vec![Vec3::ZERO; i + 1];
                let mut wide = vec![Vec3::ZERO; i + 2];
                divide_segment(side1[i], side2[i], &mut narrow);
                divide_segment(side1[i + 1], side2[i + 1], &mut wide);
                for j in 0..narrow.len() {
                    res.add(Triangle::new(narrow[j], wide[j], wide[j + 1]));
                    if j > 0 {
                        res.add(Triangle::new(narrow[j], narrow[j - 1], wide[j]));
                    }
                }
            }
        }
        res
    }
}

fn loop_subdivide_once(m: &mut Mesh) -> Result<Mesh, Error> {
    let mut edge_points: EdgeMap<Vec3> = EdgeMap::new();
    for t in m.triangle_vec() {
        for seg in t.segments() {
            if edge_points.contains(seg) {
                continue;
            }
            let ts = m.find_edge(seg.0[0], seg.0[1]);
            if ts.len() != 2 {
                return Err(Error::SingularEdge(ts.len()));
            }
            let o1 = seg.other(m.get(ts[0]).unwrap());
            let o2 = seg.other(m.get(ts[1]).unwrap());
            let p = (seg.0[0] + seg.0[1]) * (3.0 / 8.0) + (o1 + o2) * (1.0 / 8.0);
            edge_points.insert_seg(seg, p);
        }
    }

    let mut corner_points: CoordMap<Vec3> = CoordMap::new();
    for (&corner, neighbors) in m.all_vertex_neighbors().iter() {
        let beta = if neighbors.len() == 3 {
            3.0 / 16.0
        } else {
            3.0 / (8.0 * neighbors.len() as f64)
        };
        let mut point = Vec3::ZERO;
        for &c in neighbors {
            point += c;
        }
        let point = corner * (1.0 - neighbors.len() as f64 * beta) + point * beta;
        corner_points.insert(corner, point);
    }

    let mut res = Mesh::new();
    for t in m.triangles() {
        // Each face becomes four:
        //
        //            c1
        //          /    \
        //         m3 -- m1
        //        /  \ /   \
        //       c3-- m2 --c2
        let c1 = *corner_points.get(t.0[0]).unwrap();
        let c2 = *corner_points.get(t.0[1]).unwrap();
        let c3 = *corner_points.get(t.0[2]).unwrap();
        let m1 = *edge_points.get_seg(Segment::new(t.0[0], t.0[1])).unwrap();
        let m2 = *edge_points.get_seg(Segment::new(t.0[1], t.0[2])).unwrap();
        let m3 = *edge_points.get_seg(Segment::new(t.0[2], t.0[0])).unwrap();

        res.add(Triangle::new(m1, m2, m3));
        res.add(Triangle::new(c1, m1, m3));
        res.add(Triangle::new(m1, c2, m2));
        res.add(Triangle::new(m3, m2, c3));
    }
    Ok(res)
}

/// Fills `result` with evenly spaced points from `c1` to `c2`
///
/// Rounding could make the interior points depend on endpoint order, so the
/// endpoints are canonicalized first.
fn divide_segment(c1: Vec3, c2: Vec3, result: &mut [Vec3]) {
    if result.len() == 1 {
        result[0] = c1;
        return;
    }
    let seg = Segment::new(c1, c2);
    if seg.0[0] != c1 {
        divide_segment(c2, c1, result);
        result.reverse();
        return;
    }
    let n = result.len();
    result[0] = c1;
    result[n - 1] = c2;
    for (i, r) in result.iter_mut().enumerate().take(n - 1).skip(1) {
        let t = i as f64 / (n - 1) as f64;
        *r = c1 * (1.0 - t) + c2 * t;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mesh::shapes;

    #[test]
    fn loop_subdivide_quadruples_faces() {
        let m = shapes::icosphere(Vec3::ZERO, 1.0, 1);
        let sub = m.loop_subdivide(2).unwrap();
        assert_eq!(sub.len(), m.len() * 16);
        assert!(!sub.needs_repair());
        // Loop subdivision of a convex shape stays strictly inside it.
        let mut sub = sub;
        for v in sub.vertices() {
            assert!(v.norm() < 1.0);
        }
    }

    #[test]
    fn loop_subdivide_rejects_singular_edges() {
        let mut m = shapes::rect(Vec3::ZERO, Vec3::new(1.0, 1.0, 1.0));
        let id = m.ids()[0];
        m.remove(id);
        assert!(m.loop_subdivide(1).is_err());
    }

    #[test]
    fn subdivide_edges_preserves_shape() {
        let m = shapes::rect(Vec3::ZERO, Vec3::new(1.0, 2.0, 3.0));
        let sub = m.subdivide_edges(3);
        assert_eq!(sub.len(), m.len() * 9);
        assert!(!sub.needs_repair());
        assert!((sub.volume() - m.volume()).abs() < 1e-9);
    }
}
