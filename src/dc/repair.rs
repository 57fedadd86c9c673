//! Manifold repair for Dual Contouring output
//!
//! The plain algorithm can emit singular edges (an edge touched by 2k faces)
//! and singular vertices (a vertex whose faces form several fans).  Singular
//! edges are split into k disjoint edges by pairing faces around the edge
//! axis; singular vertices are duplicated once per fan.  Vertices created
//! while splitting edges are never themselves singular, which lets the two
//! passes run in sequence.

use super::layout::CubeLayout;
use crate::coord_map::{CoordMap, EdgeMap};
use crate::geom::{Segment, Triangle, Vec3};
use crate::mesh::ops::segment_orientation;
use crate::mesh::ptr::PtrMesh;
use crate::mesh::{Mesh, TriangleId};

pub(super) struct SingularEdgeGroup {
    groups: Vec<[TriangleId; 2]>,
    edge: Segment,
}

impl SingularEdgeGroup {
    fn new(m: &Mesh, edge: Segment, mut tris: Vec<TriangleId>) -> Self {
        assert!(tris.len() % 2 == 0, "odd face count on a singular edge");
        let axis = (edge.0[0] - edge.0[1]).normalize();
        let (b1, b2) = axis.ortho_basis();
        let mp = edge.mid();
        // Sort the faces by azimuth around the edge axis; adjacent faces
        // then bound one of the k wedges of volume.
        tris.sort_by(|&a, &b| {
            let theta = |id: TriangleId| {
                let v = (edge.other(m.get(id).unwrap()) - mp).normalize();
                b1.dot(v).atan2(b2.dot(v))
            };
            theta(a).total_cmp(&theta(b))
        });

        let groups = tris.chunks_exact(2).map(|c| [c[0], c[1]]).collect();
        SingularEdgeGroup { groups, edge }
    }

    /// Clamps every vertex of the group's faces into its grid cube, minus
    /// `epsilon`, recording the moves into `mapping`
    fn constrain(
        &self,
        m: &Mesh,
        epsilon: f64,
        layout: &CubeLayout,
        mapping: &mut CoordMap<Vec3>,
    ) {
        for group in &self.groups {
            for &id in group {
                for &c in &m.get(id).unwrap().0 {
                    if !mapping.contains_key(c) {
                        let (min, max) = layout.point_cube_min_max(c);
                        let min = min.add_scalar(epsilon);
                        let max = max.add_scalar(-epsilon);
                        mapping.insert(c, c.min(max).max(min));
                    }
                }
            }
        }
    }

    fn map(&mut self, mapping: &CoordMap<Vec3>) {
        for p in &mut self.edge.0 {
            if let Some(&v) = mapping.get(*p) {
                *p = v;
            }
        }
    }

    fn repair(&self, m: &mut Mesh, epsilon: f64) {
        // A previous repair may have replaced some of our faces, so re-find
        // and re-pair them.
        let tris = m.find_edge(self.edge.0[0], self.edge.0[1]);
        let regrouped = SingularEdgeGroup::new(m, self.edge, tris);

        let mp = self.edge.mid();
        for group in &regrouped.groups {
            let o0 = self.edge.other(m.get(group[0]).unwrap());
            let o1 = self.edge.other(m.get(group[1]).unwrap());
            let d = (o0.mid(o1) - mp).normalize();
            let new_mp = mp + d * epsilon;
            assert!(
                m.find_vertex(new_mp).is_empty(),
                "repair produced an existing vertex"
            );
            for &id in group {
                let t = *m.get(id).unwrap();
                let other = self.edge.other(&t);
                let mut t1 = Triangle::new(other, self.edge.0[0], new_mp);
                let mut t2 = Triangle::new(other, new_mp, self.edge.0[1]);
                let shared = Segment::new(other, self.edge.0[0]);
                if segment_orientation(&t1, &shared) != segment_orientation(&t, &shared) {
                    t1.0.swap(0, 1);
                    t2.0.swap(0, 1);
                }
                m.remove(id);
                m.add(t1);
                m.add(t2);
            }
        }
    }
}

pub(super) fn singular_edge_groups(m: &Mesh) -> Vec<SingularEdgeGroup> {
    let mut counts: EdgeMap<Vec<TriangleId>> = EdgeMap::new();
    for (id, t) in m.iter_with_ids() {
        for seg in t.segments() {
            counts.append(seg, id);
        }
    }
    counts
        .iter()
        .filter(|(_, tris)| tris.len() > 2)
        .map(|(seg, tris)| SingularEdgeGroup::new(m, *seg, tris.clone()))
        .collect()
}

pub(super) struct SingularVertexGroup {
    groups: Vec<Vec<TriangleId>>,
    vertex: Vec3,
}

impl SingularVertexGroup {
    /// Like [`SingularEdgeGroup::constrain`], but only vertices present
    /// before edge repair may move; midpoints introduced by edge repair
    /// were already placed inside their cube
    fn constrain(
        &self,
        m: &Mesh,
        epsilon: f64,
        layout: &CubeLayout,
        orig_points: &CoordMap<bool>,
        mapping: &mut CoordMap<Vec3>,
    ) {
        for group in &self.groups {
            for &id in group {
                for &c in &m.get(id).unwrap().0 {
                    if mapping.contains_key(c) || !orig_points.contains_key(c) {
                        continue;
                    }
                    let (min, max) = layout.point_cube_min_max(c);
                    let min = min.add_scalar(epsilon);
                    let max = max.add_scalar(-epsilon);
                    mapping.insert(c, c.min(max).max(min));
                }
            }
        }
    }

    fn map(&mut self, mapping: &CoordMap<Vec3>) {
        if let Some(&v) = mapping.get(self.vertex) {
            self.vertex = v;
        }
    }

    fn repair(&self, m: &mut Mesh, epsilon: f64) {
        for group in &self.groups {
            let mut d = Vec3::ZERO;
            for &id in group {
                for &c in &m.get(id).unwrap().0 {
                    if c != self.vertex {
                        d += c - self.vertex;
                    }
                }
            }
            let new_point = self.vertex + d.normalize() * epsilon;
            for &id in group {
                // Keep the id: the triangle may also belong to another
                // singular vertex group.
                let mut t = *m.get(id).unwrap();
                for c in &mut t.0 {
                    if *c == self.vertex {
                        *c = new_point;
                    }
                }
                m.replace(id, t);
            }
        }
    }
}

pub(super) fn singular_vertex_groups(m: &mut Mesh) -> Vec<SingularVertexGroup> {
    let pm = PtrMesh::from_mesh(m);
    let mut results = Vec::new();
    for c in pm.live_coords() {
        let clusters = pm.clusters(c);
        if clusters.len() <= 1 {
            continue;
        }
        let vertex = pm.pos(c);
        let groups = clusters
            .into_iter()
            .map(|cluster| {
                cluster
                    .into_iter()
                    .map(|t| {
                        let tri = pm.triangle(t);
                        m.find_triangle(tri.0[0], tri.0[1], tri.0[2])[0]
                    })
                    .collect()
            })
            .collect();
        results.push(SingularVertexGroup { groups, vertex });
    }
    results
}

/// Rewrites every triangle touching a remapped coordinate, preserving
/// triangle ids (the repair groups hold ids across this rewrite)
pub(super) fn map_in_place(m: &mut Mesh, mapping: &CoordMap<Vec3>) {
    m.iterate(|m, id, t| {
        if t.0.iter().any(|c| mapping.contains_key(*c)) {
            let mut t1 = t;
            for c in &mut t1.0 {
                if let Some(&v) = mapping.get(*c) {
                    *c = v;
                }
            }
            m.replace(id, t1);
        }
    });
}

/// Splits singular edges; returns the vertex set present before repair
pub(super) fn repair_singular_edges(
    m: &mut Mesh,
    layout: &CubeLayout,
    epsilon: f64,
    clip: bool,
) -> CoordMap<bool> {
    let mut groups = singular_edge_groups(m);
    if groups.is_empty() {
        return vertex_set(m);
    }

    if clip {
        // Pull vertices off the cube walls first so that the new midpoints
        // cannot land inside a neighboring cube and self-intersect.
        let mut mapping = CoordMap::new();
        for g in &groups {
            g.constrain(m, epsilon, layout, &mut mapping);
        }
        map_in_place(m, &mapping);
        for g in &mut groups {
            g.map(&mapping);
        }
    }
    let orig = vertex_set(m);
    for g in &groups {
        g.repair(m, epsilon);
    }
    orig
}

pub(super) fn repair_singular_vertices(
    m: &mut Mesh,
    layout: &CubeLayout,
    epsilon: f64,
    clip: bool,
    orig_points: &CoordMap<bool>,
) {
    let mut groups = singular_vertex_groups(m);
    if groups.is_empty() {
        return;
    }

    if clip {
        let mut mapping = CoordMap::new();
        for g in &groups {
            g.constrain(m, epsilon, layout, orig_points, &mut mapping);
        }
        map_in_place(m, &mapping);
        for g in &mut groups {
            g.map(&mapping);
        }
    }
    for g in &groups {
        g.repair(m, epsilon);
    }
}

fn vertex_set(m: &mut Mesh) -> CoordMap<bool> {
    let mut set = CoordMap::new();
    for v in m.vertices() {
        set.insert(v, true);
    }
    set
}
