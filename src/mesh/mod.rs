//! Triangle meshes
//!
//! A [`Mesh`] is a set of owned triangles plus a lazily-built index from
//! vertices to incident faces.  Triangles are stored in a slab and addressed
//! by [`TriangleId`], so two structurally-equal triangles can coexist (which
//! the repair passes rely on).  Queries that need the vertex index take
//! `&mut self` so the index can materialize on first use; `add` and `remove`
//! keep a materialized index consistent.

pub(crate) mod ops;
pub(crate) mod ptr;
pub mod shapes;
mod subdivide;

use crate::coord_map::{CoordMap, EdgeMap};
use crate::geom::{Segment, Triangle, Vec3};

/// Identity of a triangle within one [`Mesh`]
///
/// Ids are never reused for the lifetime of the mesh they came from, but
/// carry no meaning across meshes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TriangleId(u32);

impl TriangleId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// A set of triangles with topology queries and edits
#[derive(Default)]
pub struct Mesh {
    tris: Vec<Option<Triangle>>,
    len: usize,
    vertex_index: Option<CoordMap<Vec<TriangleId>>>,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_triangles(tris: impl IntoIterator<Item = Triangle>) -> Self {
        let mut m = Self::new();
        for t in tris {
            m.add(t);
        }
        m
    }

    /// Number of triangles currently in the mesh
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Adds a triangle, returning its id
    pub fn add(&mut self, t: Triangle) -> TriangleId {
        let id = TriangleId(self.tris.len() as u32);
        self.tris.push(Some(t));
        self.len += 1;
        if let Some(index) = &mut self.vertex_index {
            for &v in &t.0 {
                index.append(v, id);
            }
        }
        id
    }

    /// Removes a triangle by id, returning it if it was present
    pub fn remove(&mut self, id: TriangleId) -> Option<Triangle> {
        let t = self.tris.get_mut(id.index())?.take()?;
        self.len -= 1;
        if let Some(index) = &mut self.vertex_index {
            for &v in &t.0 {
                if let Some(ids) = index.get_mut(v) {
                    if let Some(pos) = ids.iter().position(|&i| i == id) {
                        ids.swap_remove(pos);
                    }
                    if ids.is_empty() {
                        index.remove(v);
                    }
                }
            }
        }
        Some(t)
    }

    pub fn get(&self, id: TriangleId) -> Option<&Triangle> {
        self.tris.get(id.index()).and_then(|t| t.as_ref())
    }

    /// Swaps the triangle stored under `id` for a new one, keeping the id
    ///
    /// Used by repair passes that remap coordinates but hold on to
    /// triangle identities across the rewrite.
    pub(crate) fn replace(&mut self, id: TriangleId, t: Triangle) -> Option<Triangle> {
        let slot = self.tris.get_mut(id.index())?;
        if slot.is_none() {
            return None;
        }
        let old = slot.replace(t).unwrap();
        if let Some(index) = &mut self.vertex_index {
            for &v in &old.0 {
                if let Some(ids) = index.get_mut(v) {
                    if let Some(pos) = ids.iter().position(|&i| i == id) {
                        ids.swap_remove(pos);
                    }
                    if ids.is_empty() {
                        index.remove(v);
                    }
                }
            }
            for &v in &t.0 {
                index.append(v, id);
            }
        }
        Some(old)
    }

    /// Snapshot of every live triangle id
    pub fn ids(&self) -> Vec<TriangleId> {
        self.tris
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_some())
            .map(|(i, _)| TriangleId(i as u32))
            .collect()
    }

    pub fn triangles(&self) -> impl Iterator<Item = &Triangle> {
        self.tris.iter().flatten()
    }

    pub fn iter_with_ids(&self) -> impl Iterator<Item = (TriangleId, &Triangle)> {
        self.tris
            .iter()
            .enumerate()
            .filter_map(|(i, t)| t.as_ref().map(|t| (TriangleId(i as u32), t)))
    }

    pub fn triangle_vec(&self) -> Vec<Triangle> {
        self.triangles().copied().collect()
    }

    /// Calls `f` for every triangle present when iteration started
    ///
    /// The triangle set is snapshotted first, so `f` is free to add or
    /// remove triangles; removed-but-not-yet-visited triangles are skipped.
    pub fn iterate(&mut self, mut f: impl FnMut(&mut Mesh, TriangleId, Triangle)) {
        for id in self.ids() {
            if let Some(&t) = self.get(id) {
                f(self, id, t);
            }
        }
    }

    fn vertex_index(&mut self) -> &CoordMap<Vec<TriangleId>> {
        if self.vertex_index.is_none() {
            let mut index = CoordMap::new();
            for (id, t) in self.iter_with_ids() {
                for &v in &t.0 {
                    index.append(v, id);
                }
            }
            self.vertex_index = Some(index);
        }
        self.vertex_index.as_ref().unwrap()
    }

    pub(crate) fn clear_vertex_index(&mut self) {
        self.vertex_index = None;
    }

    /// Triangles incident on the given vertex
    pub fn find_vertex(&mut self, v: Vec3) -> Vec<TriangleId> {
        self.vertex_index().get(v).cloned().unwrap_or_default()
    }

    /// Triangles incident on the edge `(a, b)`
    pub fn find_edge(&mut self, a: Vec3, b: Vec3) -> Vec<TriangleId> {
        let mut out = self.find_vertex(a);
        out.retain(|&id| self.get(id).is_some_and(|t| t.contains_vertex(b)));
        out
    }

    /// Triangles whose vertex set is exactly `{a, b, c}`
    pub fn find_triangle(&mut self, a: Vec3, b: Vec3, c: Vec3) -> Vec<TriangleId> {
        let mut out = self.find_vertex(a);
        out.retain(|&id| {
            self.get(id)
                .is_some_and(|t| t.contains_vertex(b) && t.contains_vertex(c))
        });
        out
    }

    /// All distinct vertices of the mesh
    pub fn vertices(&mut self) -> Vec<Vec3> {
        self.vertex_index().keys().copied().collect()
    }

    /// Triangles sharing an edge with the given triangle
    pub fn neighbors(&mut self, id: TriangleId) -> Vec<TriangleId> {
        let Some(&t) = self.get(id) else { return vec![] };
        let mut out = Vec::new();
        for seg in t.segments() {
            for other in self.find_edge(seg.0[0], seg.0[1]) {
                if other != id && !out.contains(&other) {
                    out.push(other);
                }
            }
        }
        out
    }

    /// Maps every vertex to the set of vertices it shares an edge with
    pub fn all_vertex_neighbors(&self) -> CoordMap<Vec<Vec3>> {
        let mut res: CoordMap<Vec<Vec3>> = CoordMap::new();
        for t in self.triangles() {
            for (i, &a) in t.0.iter().enumerate() {
                for (j, &b) in t.0.iter().enumerate() {
                    if i != j {
                        let cur = res.entry(a).or_default();
                        if !cur.contains(&b) {
                            cur.push(b);
                        }
                    }
                }
            }
        }
        res
    }

    /// Adds every triangle of `other` to this mesh
    pub fn add_mesh(&mut self, other: &Mesh) {
        for &t in other.triangles().collect::<Vec<_>>() {
            self.add(t);
        }
    }

    /// Builds a new mesh by applying `f` to every coordinate
    pub fn map_coords(&self, mut f: impl FnMut(Vec3) -> Vec3) -> Mesh {
        // Map each distinct vertex exactly once so that shared vertices stay
        // shared even when f isn't bit-deterministic across calls.
        let mut mapping = CoordMap::new();
        for t in self.triangles() {
            for &v in &t.0 {
                if !mapping.contains_key(v) {
                    let fv = f(v);
                    mapping.insert(v, fv);
                }
            }
        }
        Mesh::from_triangles(self.triangles().map(|t| {
            Triangle::new(
                *mapping.get(t.0[0]).unwrap(),
                *mapping.get(t.0[1]).unwrap(),
                *mapping.get(t.0[2]).unwrap(),
            )
        }))
    }

    pub fn translate(&self, offset: Vec3) -> Mesh {
        self.map_coords(|c| c + offset)
    }

    pub fn scale(&self, s: f64) -> Mesh {
        self.map_coords(|c| c * s)
    }

    /// Rotates the mesh around `axis` (through the origin) by `angle`
    /// radians
    pub fn rotate(&self, axis: Vec3, angle: f64) -> Mesh {
        let rot = nalgebra::Rotation3::from_axis_angle(
            &nalgebra::Unit::new_normalize(axis.to_na()),
            angle,
        );
        self.map_coords(|c| Vec3::from_na(rot * c.to_na()))
    }

    /// Volume enclosed by the mesh, via the divergence theorem
    ///
    /// Requires a closed, consistently outward-oriented mesh.
    pub fn volume(&self) -> f64 {
        self.triangles().map(|t| t.signed_volume()).sum()
    }

    /// Counts incident faces for every edge of the mesh
    pub(crate) fn edge_faces(&self) -> EdgeMap<Vec<TriangleId>> {
        let mut counts: EdgeMap<Vec<TriangleId>> = EdgeMap::new();
        for (id, t) in self.iter_with_ids() {
            for seg in t.segments() {
                counts.append(seg, id);
            }
        }
        counts
    }

    /// True if any edge is touched by a number of faces other than two
    pub fn needs_repair(&self) -> bool {
        let mut counts: EdgeMap<u32> = EdgeMap::new();
        for t in self.triangles() {
            for seg in t.segments() {
                counts.add(seg, 1);
            }
        }
        let result = counts.iter().any(|(_, &c)| c != 2);
        result
    }

    /// Vertices whose incident faces don't form a single edge-connected fan
    ///
    /// These are the points where two pieces of volume touch at a single
    /// coordinate.
    pub fn singular_vertices(&mut self) -> Vec<Vec3> {
        self.vertex_index();
        let index = self.vertex_index.as_ref().unwrap();
        let tris = &self.tris;
        let tri_at = |id: TriangleId| tris[id.index()].as_ref().unwrap();
        let mut res = Vec::new();
        for (&vertex, ids) in index.iter() {
            if ids.is_empty() {
                continue;
            }
            // Breadth-first flood across shared edges from the first face.
            let mut visited = vec![false; ids.len()];
            visited[0] = true;
            let mut queue = vec![0];
            let mut seen = 1;
            while let Some(i) = queue.pop() {
                for (j, v) in visited.iter_mut().enumerate() {
                    if !*v && tri_at(ids[i]).shares_edge(tri_at(ids[j])) {
                        *v = true;
                        seen += 1;
                        queue.push(j);
                    }
                }
            }
            if seen != ids.len() {
                res.push(vertex);
            }
        }
        res
    }

    /// Area-weighted vertex normals
    pub fn vertex_normals(&self) -> CoordMap<Vec3> {
        let mut sums: CoordMap<Vec3> = CoordMap::new();
        for t in self.triangles() {
            let weighted = t.normal() * t.area();
            for &v in &t.0 {
                sums.add(v, weighted);
            }
        }
        let mut res = CoordMap::with_capacity(sums.len());
        for (&v, &n) in sums.iter() {
            res.insert(v, n.normalize());
        }
        res
    }

    pub(crate) fn segments(&self) -> Vec<Segment> {
        let mut seen = EdgeMap::<bool>::new();
        let mut res = Vec::new();
        for t in self.triangles() {
            for seg in t.segments() {
                if seen.insert_seg(seg, true).is_none() {
                    res.push(seg);
                }
            }
        }
        res
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mesh::shapes;

    #[test]
    fn add_remove_updates_index() {
        let mut m = shapes::rect(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 2.0, 3.0));
        let corner = Vec3::new(-1.0, -1.0, -1.0);
        let before = m.find_vertex(corner).len();
        assert_eq!(before, 3, "box corner should touch three faces");

        let id = m.find_vertex(corner)[0];
        let t = m.remove(id).unwrap();
        assert_eq!(m.find_vertex(corner).len(), 2);
        m.add(t);
        assert_eq!(m.find_vertex(corner).len(), 3);
    }

    #[test]
    fn needs_repair_on_missing_and_duplicate() {
        let mut m = shapes::rect(Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 1.0, 1.0));
        assert!(!m.needs_repair());

        for id in m.ids() {
            let t = m.remove(id).unwrap();
            assert!(m.needs_repair(), "missing face must need repair");
            m.add(t);
            assert!(!m.needs_repair());

            let dup = m.add(t);
            assert!(m.needs_repair(), "duplicate face must need repair");
            m.remove(dup);
        }
    }

    #[test]
    fn singular_vertices_of_joined_boxes() {
        let m1 = shapes::rect(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(1.0, 2.0, 3.0));
        let m2 = shapes::rect(Vec3::new(1.0, 2.0, 3.0), Vec3::new(2.0, 3.0, 4.0));

        let mut joined = Mesh::new();
        joined.add_mesh(&m1);
        joined.add_mesh(&m2);
        assert_eq!(joined.singular_vertices(), vec![Vec3::new(1.0, 2.0, 3.0)]);
    }

    #[test]
    fn volume_of_box_and_sphere() {
        let m = shapes::rect(Vec3::new(0.0, 0.0, 0.0), Vec3::new(2.0, 1.0, 0.5));
        assert!((m.volume() - 1.0).abs() < 1e-12);

        let s = shapes::icosphere(Vec3::new(1.0, 2.0, 3.0), 1.0, 4);
        let expected = 4.0 * std::f64::consts::PI / 3.0;
        assert!((s.volume() - expected).abs() / expected < 0.01);
    }

    #[test]
    fn vertex_normals_of_sphere() {
        let center = Vec3::new(1.0, 2.0, 3.0);
        let m = shapes::icosphere(center, 1.5, 3);
        m.vertex_normals().for_each(|v, &n| {
            let expected = (v - center).normalize();
            assert!(n.dist(expected) < 2e-2, "normal at {v:?} was {n:?}");
        });
    }

    #[test]
    fn map_coords_preserves_sharing() {
        let m = shapes::rect(Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 1.0, 1.0));
        let mut rotated = m.rotate(Vec3::new(1.0, 2.0, 3.0), 5.7);
        assert_eq!(rotated.vertices().len(), 8);
        assert!(!rotated.needs_repair());
        assert!((rotated.volume() - 1.0).abs() < 1e-9);
    }
}
