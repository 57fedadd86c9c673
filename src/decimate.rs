//! Mesh decimation by vertex removal
//!
//! Implements the algorithm of Schroeder, Zarge & Lorensen, "Decimation of
//! Triangle Meshes": each vertex is classified against its one-ring (simple,
//! edge, or corner, by counting feature creases), tested against a distance
//! criterion, and, if removable, deleted with its ring re-triangulated by a
//! recursive split search.  Replacements that would create duplicate faces
//! or non-manifold edges are rolled back.
//!
//! Input meshes must be closed and manifold.

use crate::geom::{Segment, Triangle, Vec3};
use crate::mesh::ptr::{CoordHandle, PtrMesh, TriHandle};
use crate::mesh::Mesh;

/// Default minimum aspect ratio accepted for triangulation splits
pub const DEFAULT_MIN_ASPECT_RATIO: f64 = 0.1;

/// Default dihedral angle (radians) above which an edge is a feature edge
pub const DEFAULT_FEATURE_ANGLE: f64 = 0.5;

/// Decimates a mesh with a single distance epsilon and default parameters
pub fn decimate_simple(m: &Mesh, epsilon: f64) -> Mesh {
    Decimator {
        plane_distance: epsilon,
        boundary_distance: epsilon,
        ..Decimator::default()
    }
    .decimate(m)
}

/// Configurable decimator
#[derive(Default)]
pub struct Decimator {
    /// Minimum dihedral angle (radians) between two faces for their shared
    /// edge to count as a feature edge; 0 means
    /// [`DEFAULT_FEATURE_ANGLE`]
    pub feature_angle: f64,

    /// Maximum distance of a simple vertex from its average plane for it to
    /// be deleted
    pub plane_distance: f64,

    /// Maximum distance of an edge vertex from its feature line for it to
    /// be deleted
    pub boundary_distance: f64,

    /// Evaluate all vertices with `plane_distance`, ignoring feature lines
    pub no_edge_preservation: bool,

    /// Also delete corner vertices (more than two feature creases)
    pub eliminate_corners: bool,

    /// Minimum aspect ratio for splits; 0 means
    /// [`DEFAULT_MIN_ASPECT_RATIO`]
    pub minimum_aspect_ratio: f64,

    /// Vetoes individual vertices; a vertex may only be removed when the
    /// filter returns true for it
    pub filter: Option<Box<dyn Fn(Vec3) -> bool>>,
}

impl Decimator {
    /// Decimates `m`, repeating passes until no vertex can be removed
    pub fn decimate(&self, m: &Mesh) -> Mesh {
        let mut pm = PtrMesh::from_mesh(m);
        while self.pass(&mut pm) > 0 {}
        pm.to_mesh()
    }

    fn pass(&self, pm: &mut PtrMesh) -> usize {
        let feature_angle = if self.feature_angle == 0.0 {
            DEFAULT_FEATURE_ANGLE
        } else {
            self.feature_angle
        };
        let min_ratio = if self.minimum_aspect_ratio == 0.0 {
            DEFAULT_MIN_ASPECT_RATIO
        } else {
            self.minimum_aspect_ratio
        };

        let mut eliminated = 0;
        for c in pm.live_coords() {
            if pm.coord_tris(c).is_empty() {
                continue;
            }
            let Some(v) = DecVertex::new(pm, c, feature_angle) else {
                continue;
            };
            if self.can_remove(pm, &v) && attempt_remove(pm, &v, min_ratio) {
                eliminated += 1;
            }
        }
        eliminated
    }

    fn can_remove(&self, pm: &PtrMesh, v: &DecVertex) -> bool {
        let pos = pm.pos(v.vertex);
        if let Some(filter) = &self.filter {
            if !filter(pos) {
                return false;
            }
        }
        if v.simple()
            || (v.edge() && self.no_edge_preservation)
            || (v.corner() && self.eliminate_corners)
        {
            v.avg_plane.eval(pos).abs() < self.plane_distance
        } else if v.edge() {
            let seg = Segment::new(
                pm.pos(v.ring[v.feature_endpoints[0]]),
                pm.pos(v.ring[v.feature_endpoints[1]]),
            );
            seg.dist(pos) < self.boundary_distance
        } else {
            false
        }
    }
}

/// The plane `normal · x - bias = 0` with a unit normal
#[derive(Copy, Clone)]
struct Plane {
    normal: Vec3,
    bias: f64,
}

impl Plane {
    fn through_point(normal: Vec3, point: Vec3) -> Self {
        Plane { normal, bias: point.dot(normal) }
    }

    /// Area-weighted average plane of a set of faces
    fn average(tris: &[Triangle]) -> Self {
        let mut normal = Vec3::ZERO;
        let mut avg_point = Vec3::ZERO;
        let mut total_weight = 0.0;
        for t in tris {
            let weight = t.area();
            total_weight += weight;
            normal += t.normal() * weight;
            avg_point += t.centroid() * weight;
        }
        Plane::through_point(normal.normalize(), avg_point / total_weight)
    }

    /// Signed distance from the plane
    fn eval(&self, c: Vec3) -> f64 {
        self.normal.dot(c) - self.bias
    }
}

/// Everything needed to decide whether one vertex can be deleted
struct DecVertex {
    vertex: CoordHandle,
    /// One-ring in cyclic winding order
    ring: Vec<CoordHandle>,
    /// Incident faces, aligned so face `k` spans `ring[k]` to `ring[k+1]`
    ring_tris: Vec<TriHandle>,
    avg_plane: Plane,
    /// Ring indices where a feature crease meets the ring
    feature_endpoints: Vec<usize>,
}

impl DecVertex {
    fn new(pm: &PtrMesh, vertex: CoordHandle, feature_angle: f64) -> Option<Self> {
        let (ring, ring_tris) = pm.sorted_loop(vertex)?;
        let faces: Vec<Triangle> = ring_tris.iter().map(|&t| pm.triangle(t)).collect();
        let avg_plane = Plane::average(&faces);

        let n = faces.len();
        let mut feature_endpoints = Vec::new();
        for i in 0..n {
            let a = faces[i].normal();
            let b = faces[(i + 1) % n].normal();
            let angle = a.dot(b).clamp(-1.0, 1.0).acos();
            if angle > feature_angle {
                // The crease edge between faces i and i+1 runs through ring
                // vertex i+1.
                feature_endpoints.push((i + 1) % n);
            }
        }
        feature_endpoints.sort_unstable();

        Some(DecVertex { vertex, ring, ring_tris, avg_plane, feature_endpoints })
    }

    fn simple(&self) -> bool {
        self.feature_endpoints.is_empty()
    }

    fn edge(&self) -> bool {
        self.feature_endpoints.len() == 2
    }

    fn corner(&self) -> bool {
        !self.simple() && !self.edge()
    }
}

fn attempt_remove(pm: &mut PtrMesh, v: &DecVertex, min_ratio: f64) -> bool {
    let n = v.ring.len();
    // Join the two feature endpoints, unless that would create an empty
    // sub-loop because they are ring-adjacent.
    let new_tris = if v.edge()
        && v.feature_endpoints[1] != v.feature_endpoints[0] + 1
        && v.feature_endpoints[0] != (v.feature_endpoints[1] + 1) % n
    {
        let Some((loop1, loop2, ratio)) = create_subloops(
            pm,
            &v.avg_plane,
            &v.ring,
            v.feature_endpoints[0],
            v.feature_endpoints[1],
        ) else {
            return false;
        };
        let _ = ratio;
        fill_loops(pm, &v.avg_plane, &loop1, &loop2, min_ratio)
    } else {
        fill_loop(pm, &v.avg_plane, &v.ring, min_ratio)
    };
    let Some(new_tris) = new_tris else {
        return false;
    };

    let old: Vec<(TriHandle, [CoordHandle; 3])> = v
        .ring_tris
        .iter()
        .map(|&t| (t, pm.tri_coords(t)))
        .collect();
    for &(t, _) in &old {
        pm.remove_triangle(t);
    }
    let added: Vec<TriHandle> = new_tris.iter().map(|&verts| pm.add_triangle(verts)).collect();

    let roll_back = |pm: &mut PtrMesh| {
        for &t in &added {
            pm.remove_triangle(t);
        }
        for &(_, verts) in &old {
            pm.add_triangle(verts);
        }
    };

    // Over-eliminating can flatten a region into a duplicated face.
    for &t in &added {
        let verts = pm.tri_coords(t);
        let incident = pm.coord_tris(verts[0]).to_vec();
        for t1 in incident {
            if t1 != t {
                let other = pm.tri_coords(t1);
                if verts.iter().all(|c| other.contains(c)) {
                    roll_back(pm);
                    return false;
                }
            }
        }
    }

    // Every new edge must still touch exactly two faces.
    for &t in &added {
        let verts = pm.tri_coords(t);
        for i in 0..3 {
            let (a, b) = (verts[i], verts[(i + 1) % 3]);
            let count = pm
                .coord_tris(a)
                .iter()
                .filter(|&&t1| pm.tri_coords(t1).contains(&b))
                .count();
            if count != 2 {
                roll_back(pm);
                return false;
            }
        }
    }

    true
}

/// Fills a ring of vertices with triangles, recursively splitting along the
/// diagonal whose aspect ratio is closest to 1
fn fill_loop(
    pm: &PtrMesh,
    avg_plane: &Plane,
    coords: &[CoordHandle],
    min_ratio: f64,
) -> Option<Vec<[CoordHandle; 3]>> {
    assert!(coords.len() >= 3, "loop must contain at least three vertices");
    if coords.len() == 3 {
        return Some(vec![[coords[0], coords[1], coords[2]]]);
    }

    let mut best_ratio = 0.0;
    let mut best: Option<(Vec<CoordHandle>, Vec<CoordHandle>)> = None;
    for i in 0..coords.len() {
        for j in i + 2..coords.len() {
            if i + coords.len() - j < 2 {
                continue;
            }
            let Some((loop1, loop2, ratio)) = create_subloops(pm, avg_plane, coords, i, j)
            else {
                continue;
            };
            if best.is_none() || (ratio - 1.0).abs() < (best_ratio - 1.0f64).abs() {
                best_ratio = ratio;
                best = Some((loop1, loop2));
            }
        }
    }

    let (loop1, loop2) = best?;
    if best_ratio < min_ratio {
        return None;
    }
    fill_loops(pm, avg_plane, &loop1, &loop2, min_ratio)
}

fn fill_loops(
    pm: &PtrMesh,
    avg_plane: &Plane,
    loop1: &[CoordHandle],
    loop2: &[CoordHandle],
    min_ratio: f64,
) -> Option<Vec<[CoordHandle; 3]>> {
    let mut tris = fill_loop(pm, avg_plane, loop1, min_ratio)?;
    tris.extend(fill_loop(pm, avg_plane, loop2, min_ratio)?);
    Some(tris)
}

/// Splits a ring along the diagonal `(i, j)`
///
/// Returns the two sub-loops and the split's aspect ratio (minimum distance
/// of interior vertices to the split plane, divided by the split length), or
/// `None` when the diagonal doesn't separate the ring cleanly.
fn create_subloops(
    pm: &PtrMesh,
    avg_plane: &Plane,
    coords: &[CoordHandle],
    i: usize,
    j: usize,
) -> Option<(Vec<CoordHandle>, Vec<CoordHandle>, f64)> {
    let c1 = pm.pos(coords[i]);
    let c2 = pm.pos(coords[j]);
    let sep_line = c2 - c1;
    let sep_normal = sep_line.cross(avg_plane.normal).normalize();
    let sep_plane = Plane::through_point(sep_normal, c1);

    let cyclic = |start: usize, end: usize| -> Vec<CoordHandle> {
        let end = if end < start { end + coords.len() } else { end };
        (start..=end).map(|k| coords[k % coords.len()]).collect()
    };

    let loop1 = cyclic(i, j);
    let (sign1, min_abs1) = subloop_split_dist(pm, &loop1, &sep_plane)?;
    let loop2 = cyclic(j, i);
    let (sign2, min_abs2) = subloop_split_dist(pm, &loop2, &sep_plane)?;
    if sign1 == sign2 {
        return None;
    }
    let ratio = min_abs1.min(min_abs2) / sep_line.norm();
    Some((loop1, loop2, ratio))
}

/// Checks that all interior vertices of a sub-loop are strictly on one side
/// of the split plane, returning that side and the closest distance
fn subloop_split_dist(pm: &PtrMesh, ring: &[CoordHandle], p: &Plane) -> Option<(i8, f64)> {
    let mut sign = 0i8;
    let mut min_abs = 0.0f64;
    for (i, &c) in ring[1..ring.len() - 1].iter().enumerate() {
        let dist = p.eval(pm.pos(c));
        if dist == 0.0 {
            return None;
        }
        let cur = if dist < 0.0 { -1 } else { 1 };
        if i == 0 {
            sign = cur;
            min_abs = dist.abs();
        } else {
            if sign != cur {
                return None;
            }
            min_abs = min_abs.min(dist.abs());
        }
    }
    Some((sign, min_abs))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mesh::shapes;

    #[test]
    fn coplanar_faces_collapse() {
        // A box with heavily subdivided (coplanar) faces decimates down
        // without losing shape.
        let m = shapes::rect(Vec3::ZERO, Vec3::new(1.0, 1.0, 1.0)).subdivide_edges(4);
        let dec = decimate_simple(&m, 1e-8);
        assert!(dec.len() < m.len());
        assert!(!dec.needs_repair());
        assert!((dec.volume() - 1.0).abs() < 1e-9);
        let (_, flips) = dec.repair_normals(1e-8);
        assert_eq!(flips, 0);
    }

    #[test]
    fn sphere_decimation_stays_round() {
        let m = shapes::icosphere(Vec3::ZERO, 1.0, 4);
        let dec = Decimator {
            plane_distance: 0.01,
            boundary_distance: 0.01,
            ..Decimator::default()
        }
        .decimate(&m);
        assert!(dec.len() < m.len());
        assert!(!dec.needs_repair());
        let mut dec = dec;
        for v in dec.vertices() {
            let r = v.norm();
            assert!(r > 0.9 && r < 1.01, "vertex escaped to radius {r}");
        }
    }

    #[test]
    fn filter_vetoes_vertices() {
        let m = shapes::rect(Vec3::ZERO, Vec3::new(1.0, 1.0, 1.0)).subdivide_edges(2);
        let dec = Decimator {
            plane_distance: 1e-8,
            boundary_distance: 1e-8,
            filter: Some(Box::new(|_| false)),
            ..Decimator::default()
        }
        .decimate(&m);
        assert_eq!(dec.len(), m.len());
    }
}
