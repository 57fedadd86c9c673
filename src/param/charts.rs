//! Splitting meshes into simply-connected plane graphs
//!
//! Greedy region growing: starting from an arbitrary face, neighbors of the
//! current boundary are absorbed in priority order (most coplanar first,
//! then insertion order), skipping any face whose inclusion would pinch the
//! boundary into two loops.  Each grown region is homeomorphic to a disk
//! and suitable for the Floater solve.

use crate::coord_map::{CoordMap, EdgeMap};
use crate::geom::Triangle;
use crate::mesh::{Mesh, TriangleId};
use std::collections::{BinaryHeap, HashMap};

/// Cosine bins for the growth priority
///
/// Using the exact normal dot product makes the growth front trace out
/// rounding-error artifacts on automatically generated meshes; discretizing
/// resists the jitter, though artifacts remain possible at bin thresholds.
const COSINE_BINS: f64 = 10.0;

/// Splits `m` into simply-connected triangulated plane graphs
///
/// The input must be manifold or a subset of a manifold mesh; in
/// particular, re-splitting a returned chart is the identity.
pub fn mesh_to_plane_graphs(m: &Mesh) -> Vec<Mesh> {
    mesh_to_plane_graphs_limited(m, 0)
}

/// Like [`mesh_to_plane_graphs`], but caps the number of triangles per
/// chart (0 means unlimited)
pub fn mesh_to_plane_graphs_limited(m: &Mesh, max_size: usize) -> Vec<Mesh> {
    let mut work = Mesh::from_triangles(m.triangles().copied());
    let mut res = Vec::new();
    loop {
        let next = next_discs(&mut work, max_size);
        if next.is_empty() {
            return res;
        }
        res.extend(next);
    }
}

#[derive(PartialEq, Eq)]
struct QueueNode {
    normal_dot: i64,
    uid: u64,
    tri: TriangleId,
}

impl Ord for QueueNode {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Highest bin first; ties go to the earliest-inserted node, which
        // spreads growth evenly over uniformly curved regions.
        self.normal_dot
            .cmp(&other.normal_dot)
            .then(other.uid.cmp(&self.uid))
    }
}

impl PartialOrd for QueueNode {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

fn dot_bin(a: &Triangle, b: &Triangle) -> i64 {
    (COSINE_BINS * (a.normal().dot(b.normal()) + 1.0) / 2.0).round() as i64
}

fn neighbors_of(m: &mut Mesh, t: &Triangle) -> Vec<TriangleId> {
    let mut out = Vec::new();
    for seg in t.segments() {
        for id in m.find_edge(seg.0[0], seg.0[1]) {
            if !out.contains(&id) {
                out.push(id);
            }
        }
    }
    out
}

/// Grows one disk out of `m`, removing its triangles
///
/// Usually returns one chart; a boundary that closes on itself (the region
/// covered a whole sphere) yields two, split at the median cumulative area.
fn next_discs(m: &mut Mesh, max_size: usize) -> Vec<Mesh> {
    let Some(first) = m.ids().first().copied() else {
        return Vec::new();
    };
    let t1 = m.remove(first).unwrap();

    // Cumulative areas per added triangle, in case the boundary closes and
    // the region must be split into two halves.
    let mut tris = vec![t1];
    let mut cum_areas = vec![t1.area()];

    // The current boundary, as segments plus reference-counted vertices.
    let mut segments: EdgeMap<bool> = EdgeMap::new();
    let mut vertices: CoordMap<i64> = CoordMap::new();
    for s in t1.segments() {
        segments.insert_seg(s, true);
    }
    for &c in &t1.0 {
        vertices.insert(c, 1);
    }

    let mut uid = 0u64;
    let mut queue: BinaryHeap<QueueNode> = BinaryHeap::new();
    let mut in_queue: HashMap<TriangleId, (i64, u64)> = HashMap::new();
    for id in neighbors_of(m, &t1) {
        uid += 1;
        let node = QueueNode { normal_dot: dot_bin(&t1, m.get(id).unwrap()), uid, tri: id };
        in_queue.insert(id, (node.normal_dot, node.uid));
        queue.push(node);
    }

    while !in_queue.is_empty() && (max_size == 0 || tris.len() < max_size) {
        let Some(node) = queue.pop() else { break };
        match in_queue.get(&node.tri) {
            // Superseded or already-consumed heap entry.
            Some(&(bin, id)) if bin == node.normal_dot && id == node.uid => {}
            _ => continue,
        }
        in_queue.remove(&node.tri);
        let next = *m.get(node.tri).unwrap();

        // Adding a face with a vertex on the boundary but no edge there
        // would split the boundary into two disjoint loops:
        //
        //   ---old-boundary----
        //    new \   / other
        //    half \ /  half
        //          +
        //   ---old-boundary----
        //
        // Such a face may become addable later, once a neighbor joins the
        // boundary first, so it is only skipped, not discarded.
        let mut touching = [false; 3];
        for (i, &c) in next.0.iter().enumerate() {
            let c1 = next.0[(i + 1) % 3];
            if segments.get(c, c1).copied().unwrap_or(false) {
                touching[i] = true;
                touching[(i + 1) % 3] = true;
            }
        }
        let would_divide = next
            .0
            .iter()
            .enumerate()
            .any(|(i, c)| vertices.get_or_default(*c) > 0 && !touching[i]);
        if would_divide {
            continue;
        }

        m.remove(node.tri);
        cum_areas.push(cum_areas.last().unwrap() + next.area());
        tris.push(next);
        for seg in next.segments() {
            if segments.get_seg(seg).copied().unwrap_or(false) {
                segments.remove(seg);
                for &p in &seg.0 {
                    if vertices.add(p, -1) == 0 {
                        vertices.remove(p);
                    }
                }
            } else {
                segments.insert_seg(seg, true);
                for &p in &seg.0 {
                    vertices.add(p, 1);
                }
            }
        }

        for id in neighbors_of(m, &next) {
            uid += 1;
            let bin = dot_bin(&next, m.get(id).unwrap());
            match in_queue.get(&id) {
                Some(&(old_bin, _)) if old_bin >= bin => {}
                _ => {
                    // New, or more coplanar with this face than with the
                    // one that first discovered it.
                    in_queue.insert(id, (bin, uid));
                    queue.push(QueueNode { normal_dot: bin, uid, tri: id });
                }
            }
        }
    }

    if segments.is_empty() {
        // The region covered a closed surface with no boundary left; emit
        // two halves split as evenly as possible by area.
        let half = cum_areas.last().unwrap() / 2.0;
        let index = cum_areas
            .partition_point(|&a| a < half)
            .min(tris.len() - 1);
        return vec![
            Mesh::from_triangles(tris[..index].iter().copied()),
            Mesh::from_triangles(tris[index..].iter().copied()),
        ];
    }

    vec![Mesh::from_triangles(tris)]
}
