//! Doubly-linked topology overlay for local mesh surgery
//!
//! Decimation and hierarchy extraction need O(1) edits of the
//! coordinate↔face incidence structure.  Rather than reference-counted
//! nodes, the overlay is two arenas addressed by `u32` handles; removal
//! tombstones a slot.  An overlay is built by snapshotting a [`Mesh`] and
//! never writes back to its source.

use super::Mesh;
use crate::coord_map::CoordMap;
use crate::geom::{Triangle, Vec3};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct CoordHandle(u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct TriHandle(u32);

struct PtrCoord {
    pos: Vec3,
    tris: Vec<TriHandle>,
}

struct PtrTri {
    verts: [CoordHandle; 3],
    alive: bool,
}

pub(crate) struct PtrMesh {
    coords: Vec<PtrCoord>,
    tris: Vec<PtrTri>,
    index: CoordMap<CoordHandle>,
    live: usize,
}

impl PtrMesh {
    pub fn from_mesh(m: &Mesh) -> Self {
        let mut pm = PtrMesh {
            coords: Vec::new(),
            tris: Vec::new(),
            index: CoordMap::new(),
            live: 0,
        };
        for t in m.triangles() {
            let verts = [
                pm.intern_coord(t.0[0]),
                pm.intern_coord(t.0[1]),
                pm.intern_coord(t.0[2]),
            ];
            pm.add_triangle(verts);
        }
        pm
    }

    fn intern_coord(&mut self, v: Vec3) -> CoordHandle {
        if let Some(&h) = self.index.get(v) {
            return h;
        }
        let h = CoordHandle(self.coords.len() as u32);
        self.coords.push(PtrCoord { pos: v, tris: Vec::new() });
        self.index.insert(v, h);
        h
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn pos(&self, c: CoordHandle) -> Vec3 {
        self.coords[c.0 as usize].pos
    }

    pub fn coord_tris(&self, c: CoordHandle) -> &[TriHandle] {
        &self.coords[c.0 as usize].tris
    }

    pub fn tri_coords(&self, t: TriHandle) -> [CoordHandle; 3] {
        self.tris[t.0 as usize].verts
    }

    pub fn triangle(&self, t: TriHandle) -> Triangle {
        let verts = self.tri_coords(t);
        Triangle::new(self.pos(verts[0]), self.pos(verts[1]), self.pos(verts[2]))
    }

    /// Any coordinate that still has incident faces
    pub fn peek(&self) -> Option<CoordHandle> {
        self.coords
            .iter()
            .position(|c| !c.tris.is_empty())
            .map(|i| CoordHandle(i as u32))
    }

    pub fn live_coords(&self) -> Vec<CoordHandle> {
        self.coords
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.tris.is_empty())
            .map(|(i, _)| CoordHandle(i as u32))
            .collect()
    }

    pub fn live_tris(&self) -> Vec<TriHandle> {
        self.tris
            .iter()
            .enumerate()
            .filter(|(_, t)| t.alive)
            .map(|(i, _)| TriHandle(i as u32))
            .collect()
    }

    pub fn add_triangle(&mut self, verts: [CoordHandle; 3]) -> TriHandle {
        let h = TriHandle(self.tris.len() as u32);
        self.tris.push(PtrTri { verts, alive: true });
        for v in verts {
            self.coords[v.0 as usize].tris.push(h);
        }
        self.live += 1;
        h
    }

    pub fn remove_triangle(&mut self, t: TriHandle) {
        let slot = &mut self.tris[t.0 as usize];
        assert!(slot.alive, "triangle removed twice");
        slot.alive = false;
        let verts = slot.verts;
        for v in verts {
            let tris = &mut self.coords[v.0 as usize].tris;
            let pos = tris.iter().position(|&x| x == t).unwrap();
            tris.swap_remove(pos);
        }
        self.live -= 1;
    }

    pub fn to_mesh(&self) -> Mesh {
        Mesh::from_triangles(self.live_tris().into_iter().map(|t| self.triangle(t)))
    }

    /// Partitions the faces around `c` into edge-connected groups
    ///
    /// More than one group means `c` is a singular vertex.
    pub fn clusters(&self, c: CoordHandle) -> Vec<Vec<TriHandle>> {
        let tris = &self.coords[c.0 as usize].tris;
        let mut assigned = vec![false; tris.len()];
        let mut res = Vec::new();
        for start in 0..tris.len() {
            if assigned[start] {
                continue;
            }
            assigned[start] = true;
            let mut group = vec![tris[start]];
            let mut queue = vec![start];
            while let Some(i) = queue.pop() {
                let vi = self.tri_coords(tris[i]);
                for (j, done) in assigned.iter_mut().enumerate() {
                    if *done {
                        continue;
                    }
                    let vj = self.tri_coords(tris[j]);
                    let shared = vi.iter().filter(|v| vj.contains(v)).count();
                    if shared == 2 {
                        *done = true;
                        group.push(tris[j]);
                        queue.push(j);
                    }
                }
            }
            res.push(group);
        }
        res
    }

    /// Returns the one-ring of `c` in cyclic winding order, along with the
    /// incident faces aligned so that face `k` spans `loop[k]` to
    /// `loop[k + 1]`
    ///
    /// Returns `None` when the faces around `c` do not form a single closed
    /// fan (boundary or singular vertex).
    pub fn sorted_loop(&self, c: CoordHandle) -> Option<(Vec<CoordHandle>, Vec<TriHandle>)> {
        let tris = &self.coords[c.0 as usize].tris;
        if tris.is_empty() {
            return None;
        }
        let mut next: std::collections::HashMap<CoordHandle, (CoordHandle, TriHandle)> =
            std::collections::HashMap::with_capacity(tris.len());
        for &t in tris {
            let verts = self.tri_coords(t);
            let i = verts.iter().position(|&v| v == c)?;
            let a = verts[(i + 1) % 3];
            let b = verts[(i + 2) % 3];
            if next.insert(a, (b, t)).is_some() {
                // Two faces leave the same ring vertex: singular.
                return None;
            }
        }

        let start = *next.keys().next().unwrap();
        let mut ring = vec![start];
        let mut faces = Vec::with_capacity(tris.len());
        let mut cur = start;
        loop {
            let &(n, t) = next.get(&cur)?;
            faces.push(t);
            if n == start {
                break;
            }
            ring.push(n);
            cur = n;
        }
        if ring.len() != tris.len() {
            return None;
        }
        Some((ring, faces))
    }

    /// Strips every face edge-connected to `c` out of the overlay and
    /// returns them as plain triangles
    pub fn remove_all_connected(&mut self, c: CoordHandle) -> Vec<Triangle> {
        let mut result = Vec::new();
        let mut queue: Vec<TriHandle> = self.coords[c.0 as usize].tris.clone();
        for &t in &queue {
            result.push(self.triangle(t));
            self.remove_triangle(t);
        }
        let mut idx = 0;
        while idx < queue.len() {
            let t = queue[idx];
            idx += 1;
            for v in self.tri_coords(t) {
                for &t1 in self.coords[v.0 as usize].tris.clone().iter() {
                    result.push(self.triangle(t1));
                    self.remove_triangle(t1);
                    queue.push(t1);
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mesh::shapes;

    #[test]
    fn round_trip() {
        let m = shapes::icosphere(Vec3::ZERO, 1.0, 1);
        let pm = PtrMesh::from_mesh(&m);
        assert_eq!(pm.len(), m.len());
        let back = pm.to_mesh();
        assert_eq!(back.len(), m.len());
        assert!(!back.needs_repair());
    }

    #[test]
    fn sorted_loop_is_cyclic() {
        let m = shapes::icosphere(Vec3::ZERO, 1.0, 1);
        let pm = PtrMesh::from_mesh(&m);
        for c in pm.live_coords() {
            let (ring, faces) = pm.sorted_loop(c).expect("closed manifold fan");
            assert_eq!(ring.len(), pm.coord_tris(c).len());
            assert_eq!(faces.len(), ring.len());
            for (k, &f) in faces.iter().enumerate() {
                let verts = pm.tri_coords(f);
                assert!(verts.contains(&c));
                assert!(verts.contains(&ring[k]));
                assert!(verts.contains(&ring[(k + 1) % ring.len()]));
            }
        }
    }

    #[test]
    fn clusters_detect_singular_vertex() {
        let shared = Vec3::new(1.0, 1.0, 1.0);
        let mut m = shapes::rect(Vec3::new(0.0, 0.0, 0.0), shared);
        m.add_mesh(&shapes::rect(shared, Vec3::new(2.0, 2.0, 2.0)));

        let pm = PtrMesh::from_mesh(&m);
        let mut singular = 0;
        for c in pm.live_coords() {
            if pm.clusters(c).len() > 1 {
                singular += 1;
                assert_eq!(pm.pos(c), shared);
            }
        }
        assert_eq!(singular, 1);
    }

    #[test]
    fn remove_all_connected_splits_shells() {
        let mut m = shapes::rect(Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 1.0, 1.0));
        m.add_mesh(&shapes::rect(Vec3::new(3.0, 0.0, 0.0), Vec3::new(4.0, 1.0, 1.0)));
        let mut pm = PtrMesh::from_mesh(&m);

        let first = pm.peek().unwrap();
        let shell = pm.remove_all_connected(first);
        assert_eq!(shell.len(), 12);
        assert_eq!(pm.len(), 12);
        assert!(!Mesh::from_triangles(shell).needs_repair());
    }
}
