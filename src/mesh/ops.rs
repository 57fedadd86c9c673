//! Whole-mesh transformations: vertex coalescing, orientation repair,
//! smoothing, and edge elimination

use super::Mesh;
use crate::coord_map::CoordMap;
use crate::geom::{Segment, Triangle, Vec3};
use std::collections::{HashMap, HashSet};

/// True if the directed edge `s[0] -> s[1]` appears in winding order in `t`
pub(crate) fn segment_orientation(t: &Triangle, s: &Segment) -> bool {
    for (i, &p) in t.0.iter().enumerate() {
        if p == s.0[0] {
            return t.0[(i + 1) % 3] == s.0[1];
        }
    }
    panic!("first segment point not in triangle");
}

fn find_root(parent: &mut Vec<usize>, mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

fn union(parent: &mut Vec<usize>, a: usize, b: usize) {
    let ra = find_root(parent, a);
    let rb = find_root(parent, b);
    // The smaller root wins, so each class is represented by its
    // first-inserted vertex.
    if ra < rb {
        parent[rb] = ra;
    } else {
        parent[ra] = rb;
    }
}

impl Mesh {
    /// Coalesces vertices that are within `epsilon` of each other along
    /// every axis
    ///
    /// Each vertex is hashed into the eight grid cells of size `epsilon`
    /// surrounding it; vertices sharing a cell are merged transitively, and
    /// each class is replaced by its first-inserted member.
    pub fn repair(&self, epsilon: f64) -> Mesh {
        let mut verts: Vec<Vec3> = Vec::new();
        let mut vert_idx: CoordMap<usize> = CoordMap::new();
        for t in self.triangles() {
            for &v in &t.0 {
                if !vert_idx.contains_key(v) {
                    vert_idx.insert(v, verts.len());
                    verts.push(v);
                }
            }
        }

        let mut parent: Vec<usize> = (0..verts.len()).collect();
        let mut cells: HashMap<[i64; 3], usize> = HashMap::new();
        for (i, c) in verts.iter().enumerate() {
            let base = [
                (c.x / epsilon).round() as i64,
                (c.y / epsilon).round() as i64,
                (c.z / epsilon).round() as i64,
            ];
            for dx in 0..2 {
                for dy in 0..2 {
                    for dz in 0..2 {
                        let key = [base[0] + dx, base[1] + dy, base[2] + dz];
                        match cells.entry(key) {
                            std::collections::hash_map::Entry::Occupied(e) => {
                                union(&mut parent, i, *e.get());
                            }
                            std::collections::hash_map::Entry::Vacant(e) => {
                                e.insert(i);
                            }
                        }
                    }
                }
            }
        }

        self.map_coords(|c| {
            let i = *vert_idx.get(c).unwrap();
            verts[find_root(&mut parent, i)]
        })
    }

    /// Orients all faces consistently and outward
    ///
    /// Orientation is seeded from an arbitrary face of each connected
    /// component, flooded across shared edges, and finally flipped wholesale
    /// if the component's signed volume is negative.  Returns the repaired
    /// mesh and the number of faces that were flipped.  `epsilon` guards the
    /// volume-sign test against numerically empty components.
    pub fn repair_normals(&self, epsilon: f64) -> (Mesh, usize) {
        let ids: Vec<_> = self.iter_with_ids().map(|(id, _)| id).collect();
        let tri = |id| *self.get(id).unwrap();

        let adjacency: crate::coord_map::EdgeMap<Vec<super::TriangleId>> = self.edge_faces();
        // keep[id] = whether the face keeps its input winding
        let mut keep: HashMap<super::TriangleId, bool> = HashMap::new();
        let mut flips = 0;

        for &seed in &ids {
            if keep.contains_key(&seed) {
                continue;
            }
            keep.insert(seed, true);
            let mut component = vec![seed];
            let mut queue = vec![seed];
            while let Some(cur) = queue.pop() {
                let cur_keep = keep[&cur];
                let cur_tri = tri(cur);
                for seg in cur_tri.segments() {
                    let faces = match adjacency.get_seg(seg) {
                        Some(f) => f.clone(),
                        None => continue,
                    };
                    for other in faces {
                        if other == cur || keep.contains_key(&other) {
                            continue;
                        }
                        // Two consistently oriented neighbors traverse the
                        // shared edge in opposite directions.
                        let consistent = segment_orientation(&cur_tri, &seg)
                            != segment_orientation(&tri(other), &seg);
                        keep.insert(other, consistent == cur_keep);
                        component.push(other);
                        queue.push(other);
                    }
                }
            }

            let vol: f64 = component
                .iter()
                .map(|&id| {
                    let t = tri(id);
                    if keep[&id] {
                        t.signed_volume()
                    } else {
                        t.flipped().signed_volume()
                    }
                })
                .sum();
            if vol < -epsilon {
                for id in &component {
                    let k = keep.get_mut(id).unwrap();
                    *k = !*k;
                }
            }
        }
        let mut out = Mesh::new();
        for &id in &ids {
            let t = tri(id);
            if keep[&id] {
                out.add(t);
            } else {
                out.add(t.flipped());
                flips += 1;
            }
        }
        (out, flips)
    }

    /// Moves every vertex towards the mean of its neighbors
    ///
    /// A rate of 0 leaves vertices alone and 1 moves them all the way to the
    /// neighbor mean; negative rates sharpen.  Passing multiple rates runs
    /// one smoothing pass per rate.
    pub fn blur(&self, rates: &[f64]) -> Mesh {
        let mut coord_to_idx: CoordMap<usize> = CoordMap::new();
        let mut coords: Vec<Vec3> = Vec::new();
        let mut neighbors: Vec<Vec<usize>> = Vec::new();
        for t in self.triangles() {
            let mut indices = [0usize; 3];
            for (i, &c) in t.0.iter().enumerate() {
                indices[i] = match coord_to_idx.get(c) {
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
            for &i1 in &indices {
                for &i2 in &indices {
                    if i1 != i2 && !neighbors[i1].contains(&i2) {
                        neighbors[i1].push(i2);
                    }
                }
            }
        }

        for &rate in rates {
            let mut next = Vec::with_capacity(coords.len());
            for (i, &c) in coords.iter().enumerate() {
                let mut avg = Vec3::ZERO;
                for &n in &neighbors[i] {
                    avg += coords[n];
                }
                avg = avg / neighbors[i].len() as f64;
                next.push(avg * rate + c * (1.0 - rate));
            }
            coords = next;
        }

        Mesh::from_triangles(self.triangles().map(|t| {
            Triangle::new(
                coords[*coord_to_idx.get(t.0[0]).unwrap()],
                coords[*coord_to_idx.get(t.0[1]).unwrap()],
                coords[*coord_to_idx.get(t.0[2]).unwrap()],
            )
        }))
    }

    /// Iteratively collapses segments approved by `f` into their midpoints
    ///
    /// A segment is only collapsed when doing so is locally safe: no
    /// duplicate faces appear and no face normal flips.  Repeats until no
    /// more segments can be removed.
    pub fn eliminate_edges(&self, mut f: impl FnMut(&mut Mesh, Segment) -> bool) -> Mesh {
        let mut result = Mesh::from_triangles(self.triangles().copied());
        let mut changed = true;
        while changed {
            changed = false;
            let mut remaining: HashSet<Segment> = result.segments().into_iter().collect();
            while let Some(&segment) = remaining.iter().next() {
                remaining.remove(&segment);
                if !can_eliminate_segment(&mut result, segment) || !f(&mut result, segment) {
                    continue;
                }
                eliminate_segment(&mut result, segment, &mut remaining);
                changed = true;
            }
        }
        result
    }

    /// Collapses segments whose surrounding faces are all coplanar within
    /// `epsilon`
    pub fn eliminate_coplanar(&self, epsilon: f64) -> Mesh {
        self.eliminate_edges(|m, s| {
            let mut normal = None;
            for &p in &s.0 {
                for id in m.find_vertex(p) {
                    let n = m.get(id).unwrap().normal();
                    match normal {
                        None => normal = Some(n),
                        Some(first) => {
                            if (n.dot(first) - 1.0).abs() > epsilon {
                                return false;
                            }
                        }
                    }
                }
            }
            true
        })
    }

    /// Flips edges until every interior edge satisfies the Delaunay
    /// criterion (opposite angles summing to at most π)
    pub fn flip_delaunay(&self) -> Mesh {
        let mut m = Mesh::from_triangles(self.triangles().copied());
        // The flip search revisits every edge per pass; a fixpoint is
        // normally reached quickly, but cap the passes to stay safe against
        // cyclic flips from floating-point ties.
        for _ in 0..100 {
            let mut flipped_any = false;
            for seg in m.segments() {
                let tris = m.find_edge(seg.0[0], seg.0[1]);
                if tris.len() != 2 {
                    continue;
                }
                let t0 = *m.get(tris[0]).unwrap();
                let t1 = *m.get(tris[1]).unwrap();
                let o0 = seg.other(&t0);
                let o1 = seg.other(&t1);

                let angle = |other: Vec3| {
                    let v1 = (seg.0[0] - other).normalize();
                    let v2 = (seg.0[1] - other).normalize();
                    v1.dot(v2).clamp(-1.0, 1.0).acos()
                };
                if angle(o0) + angle(o1) <= std::f64::consts::PI + 2e-8 {
                    continue;
                }
                if !m.find_edge(o0, o1).is_empty() {
                    continue;
                }

                // Rebuild the quad around the other diagonal, preserving
                // t0's winding.
                let i = t0.0.iter().position(|&p| p == o0).unwrap();
                let u = t0.0[(i + 1) % 3];
                let v = t0.0[(i + 2) % 3];
                let n0 = t0.normal() + t1.normal();
                let new0 = Triangle::new(o0, u, o1);
                let new1 = Triangle::new(o1, v, o0);
                if new0.normal().dot(n0) <= 0.0 || new1.normal().dot(n0) <= 0.0 {
                    // The quad is concave; flipping would fold it.
                    continue;
                }
                m.remove(tris[0]);
                m.remove(tris[1]);
                m.add(new0);
                m.add(new1);
                flipped_any = true;
            }
            if !flipped_any {
                break;
            }
        }
        m
    }

    /// Flattens the bottom of the mesh onto its lowest z-plane
    ///
    /// Every vertex touching a face whose normal points down within
    /// `max_angle` radians of straight down is snapped to the minimum z of
    /// the mesh.  A `max_angle` of 0 selects a default of π/4.  Vertices
    /// only ever move downward, so the enclosed solid can only grow.
    pub fn flatten_base(&self, max_angle: f64) -> Mesh {
        let max_angle = if max_angle == 0.0 {
            std::f64::consts::FRAC_PI_4
        } else {
            max_angle
        };
        let cos_limit = -max_angle.cos();

        let mut base_z = f64::INFINITY;
        for t in self.triangles() {
            for &v in &t.0 {
                base_z = base_z.min(v.z);
            }
        }

        let mut snap: CoordMap<bool> = CoordMap::new();
        for t in self.triangles() {
            if t.normal().z <= cos_limit {
                for &v in &t.0 {
                    snap.insert(v, true);
                }
            }
        }
        self.map_coords(|c| {
            if snap.contains_key(c) {
                Vec3::new(c.x, c.y, base_z)
            } else {
                c
            }
        })
    }
}

fn can_eliminate_segment(m: &mut Mesh, seg: Segment) -> bool {
    // Both endpoints must disappear into the midpoint.
    if seg.0[0] == seg.0[1] {
        return false;
    }

    let neighbors = [m.find_vertex(seg.0[0]), m.find_vertex(seg.0[1])];
    let mut other_segs: Vec<Segment> = Vec::new();
    for (i, ids) in neighbors.iter().enumerate() {
        for &id in ids {
            let t = *m.get(id).unwrap();
            let (mut p1, mut p2) = (t.0[0], t.0[1]);
            if seg.contains(p1) {
                (p1, p2) = (p2, t.0[2]);
            } else if seg.contains(p2) {
                p2 = t.0[2];
            }
            if seg.contains(p2) {
                // The triangle contains the whole segment and will be
                // removed outright.
                continue;
            }
            let other_seg = Segment::new(p1, p2);
            if i == 1 && other_segs.contains(&other_seg) {
                // Two triangles would become duplicates.
                return false;
            }
            other_segs.push(other_seg);

            let t1 = Triangle::new(p1, p2, seg.0[0]);
            let t2 = Triangle::new(p1, p2, seg.0[1]);
            if t1.normal().dot(t2.normal()) < 0.0 {
                return false;
            }
        }
    }
    true
}

fn eliminate_segment(m: &mut Mesh, segment: Segment, remaining: &mut HashSet<Segment>) {
    let mp = segment.mid();
    for (i, &endpoint) in segment.0.iter().enumerate() {
        for id in m.find_vertex(endpoint) {
            let t = *m.get(id).unwrap();
            let mut removed_segs = 0;
            for s in t.segments() {
                if segment.contains(s.0[0]) || segment.contains(s.0[1]) {
                    remaining.remove(&s);
                    removed_segs += 1;
                }
            }

            if removed_segs == 3 {
                // Contains the segment itself; drop it once.
                if i == 0 {
                    m.remove(id);
                }
                continue;
            }

            let mut new_t = t;
            for (j, p) in t.0.iter().enumerate() {
                if segment.contains(*p) {
                    new_t.0[j] = mp;
                    remaining.insert(Segment::new(mp, new_t.0[(j + 1) % 3]));
                    remaining.insert(Segment::new(mp, new_t.0[(j + 2) % 3]));
                    break;
                }
            }
            m.remove(id);
            m.add(new_t);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mesh::shapes;
    use rand::{Rng, SeedableRng};
    use std::collections::HashMap;

    fn ordered_segments(m: &Mesh) -> HashMap<(Vec3, Vec3), usize> {
        let mut res = HashMap::new();
        for t in m.triangles() {
            for i in 0..3 {
                *res.entry((t.0[i], t.0[(i + 1) % 3])).or_default() += 1;
            }
        }
        res
    }

    fn meshes_equal(a: &Mesh, b: &Mesh) -> bool {
        ordered_segments(a) == ordered_segments(b)
    }

    #[test]
    fn repair_rounding_edge_case() {
        // Nearly identical coordinates that round to different grid cells.
        let mut m = Mesh::new();
        m.add(Triangle::new(
            Vec3::new(2.8934311810738533, 1.8152061242737787, 1.5906772555075124),
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(2.9520256962330107, 1.7164450046354633, 1.6228898626401937),
        ));
        m.add(Triangle::new(
            Vec3::new(2.8934311810738533, 1.8152061242737787, 1.5906772555075124),
            Vec3::new(2.95202569111261, 1.7164449974385279, 1.6228898570817343),
            Vec3::new(1.0, 1.0, 1.0),
        ));
        let mut m1 = m.repair(1e-5);
        let tris = m1.triangle_vec();
        let shared = if tris[0].0[1].x != 0.0 { tris[1] } else { tris[0] };
        assert_eq!(m1.find_edge(shared.0[0], shared.0[2]).len(), 2);
    }

    #[test]
    fn repair_noisy_sphere() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let sphere = shapes::icosphere(Vec3::ZERO, 3.0, 4);
        let mut noisy = Mesh::new();
        for mut t in sphere.triangle_vec() {
            t.0[0] += Vec3::new(rng.gen::<f64>(), rng.gen::<f64>(), rng.gen::<f64>()) * 1e-8;
            noisy.add(t);
        }
        assert!(noisy.needs_repair());
        let repaired = noisy.repair(1e-5);
        assert!(!repaired.needs_repair());
        // Idempotence: a second repair changes nothing.
        assert!(meshes_equal(&repaired.repair(1e-5), &repaired));
    }

    #[test]
    fn repair_normals_counts_flips() {
        let mesh = shapes::icosphere(Vec3::new(0.3, 0.0, -1.0), 1.0, 3);
        let (same, n) = mesh.repair_normals(1e-8);
        assert_eq!(n, 0);
        assert!(meshes_equal(&mesh, &same));

        let mut rng = rand::rngs::StdRng::seed_from_u64(11);
        let mut flipped = Mesh::new();
        let mut expected = 0;
        for t in mesh.triangles() {
            if rng.gen_bool(0.5) {
                flipped.add(*t);
            } else {
                flipped.add(t.flipped());
                expected += 1;
            }
        }
        let (fixed, n) = flipped.repair_normals(1e-8);
        assert_eq!(n, expected);
        assert!(meshes_equal(&mesh, &fixed));
    }

    #[test]
    fn eliminate_preserves_minimal_mesh() {
        // A tetrahedron has no removable edges.
        let m = Mesh::from_triangles([
            Triangle::new(Vec3::new(0., 0., 1.), Vec3::new(1., 0., 0.), Vec3::new(0., 1., 0.)),
            Triangle::new(Vec3::new(0., 0., 0.), Vec3::new(0., 1., 0.), Vec3::new(1., 0., 0.)),
            Triangle::new(Vec3::new(0., 0., 0.), Vec3::new(0., 0., 1.), Vec3::new(0., 1., 0.)),
            Triangle::new(Vec3::new(0., 0., 0.), Vec3::new(1., 0., 0.), Vec3::new(0., 0., 1.)),
        ]);
        let elim = m.eliminate_edges(|_, _| true);
        assert!(meshes_equal(&m, &elim));
    }

    #[test]
    fn blur_shrinks_sphere() {
        let m = shapes::icosphere(Vec3::ZERO, 1.0, 3);
        let blurred = m.blur(&[0.5]);
        assert_eq!(m.len(), blurred.len());
        assert!(blurred.volume() < m.volume());
        assert!(!blurred.needs_repair());
        // Rate 0 is the identity.
        assert!(meshes_equal(&m, &m.blur(&[0.0])));
    }

    #[test]
    fn flip_delaunay_flips_thin_quads() {
        // A kite split along its long diagonal: the opposite angles sum to
        // well over π, so the diagonal must flip.
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(1.0, -0.1, 0.0);
        let c = Vec3::new(2.0, 0.0, 0.0);
        let d = Vec3::new(1.0, 0.1, 0.0);
        let m = Mesh::from_triangles([Triangle::new(a, b, c), Triangle::new(a, c, d)]);

        let mut flipped = m.flip_delaunay();
        assert_eq!(flipped.len(), 2);
        assert_eq!(flipped.find_edge(b, d).len(), 2, "diagonal should flip to b-d");
        assert!(flipped.find_edge(a, c).is_empty());

        // Vertices are preserved, and the result is stable.
        assert_eq!(flipped.vertices().len(), 4);
        let again = flipped.flip_delaunay();
        assert_eq!(again.len(), 2);
        let mut again = again;
        assert_eq!(again.find_edge(b, d).len(), 2);
    }

    #[test]
    fn flatten_base_flattens_bottom() {
        let mut m = shapes::icosphere(Vec3::ZERO, 1.0, 3);
        let base = m
            .vertices()
            .iter()
            .map(|v| v.z)
            .fold(f64::INFINITY, f64::min);

        let mut flat = m.flatten_base(0.6);
        let mut on_base = 0;
        for v in flat.vertices() {
            assert!(v.z >= base - 1e-12, "vertex moved below the base plane");
            if v.z == base {
                on_base += 1;
            }
        }
        assert!(on_base > 1, "flattening should produce a flat cap");
        assert!(flat.volume() > m.volume(), "flattening should only grow the solid");
    }
}
