//! Containment trees over closed shells
//!
//! A [`MeshHierarchy`] is a tree where every node is a closed, simple
//! surface and children lie inside their parents.  Containment of a point
//! follows the even-odd rule: inside the root but outside every child.

use crate::coord_map::CoordMap;
use crate::geom::Vec3;
use crate::mesh::ptr::PtrMesh;
use crate::mesh::Mesh;
use crate::solid::{MeshSolid, Solid};
use crate::Error;

/// Rotation applied before extraction so that no two vertices tie on the x
/// axis; chosen once, arbitrarily, and inverted on output
const MISALIGN_AXIS: Vec3 = Vec3 { x: 0.95177695, y: 0.26858931, z: -0.14825794 };
const MISALIGN_ANGLE: f64 = 0.5037616150469717;

/// One shell of a containment tree
pub struct MeshHierarchy {
    /// The root shape of this (sub-)hierarchy
    pub mesh: Mesh,
    /// Ray-cast containment oracle for `mesh`
    pub solid: MeshSolid,
    pub children: Vec<MeshHierarchy>,
}

/// Splits a manifold mesh into closed shells and arranges them into
/// containment trees, one per exterior shell
///
/// The mesh must be manifold (`needs_repair()` false) and free of
/// self-intersections.
pub fn mesh_to_hierarchy(m: &Mesh) -> Result<Vec<MeshHierarchy>, Error> {
    if m.needs_repair() {
        return Err(Error::NeedsRepair);
    }

    let mut inverse: CoordMap<Vec3> = CoordMap::new();
    let rot = nalgebra::Rotation3::from_axis_angle(
        &nalgebra::Unit::new_normalize(MISALIGN_AXIS.to_na()),
        MISALIGN_ANGLE,
    );
    let misaligned = m.map_coords(|c| {
        let c1 = Vec3::from_na(rot * c.to_na());
        inverse.insert(c1, c);
        c1
    });

    let hierarchy = misaligned_to_hierarchy(&misaligned);
    Ok(hierarchy
        .into_iter()
        .map(|tree| tree.map_coords(&mut |c| *inverse.get(c).expect("coordinate not misaligned")))
        .collect())
}

fn misaligned_to_hierarchy(m: &Mesh) -> Vec<MeshHierarchy> {
    let mut pm = PtrMesh::from_mesh(m);
    let mut result: Vec<MeshHierarchy> = Vec::new();

    while let Some(first) = pm.peek() {
        // The shell holding the globally smallest x is always either a new
        // root or a direct leaf of an existing tree: anything nested deeper
        // would have produced an even smaller x before it.
        let mut min_vertex = first;
        for c in pm.live_coords() {
            if pm.pos(c).x < pm.pos(min_vertex).x {
                min_vertex = c;
            }
        }
        let min_pos = pm.pos(min_vertex);

        let stripped = pm.remove_all_connected(min_vertex);
        let solid = MeshSolid::new(stripped.clone());
        let mesh = Mesh::from_triangles(stripped);

        match result.iter_mut().find(|r| r.solid.contains(min_pos)) {
            Some(root) => root.insert_leaf(mesh, solid),
            None => result.push(MeshHierarchy { mesh, solid, children: Vec::new() }),
        }
    }
    result
}

impl MeshHierarchy {
    /// Inserts a shell known to be a leaf somewhere under this node
    fn insert_leaf(&mut self, mesh: Mesh, solid: MeshSolid) {
        let v = *mesh.triangles().next().expect("empty shell").0.first().unwrap();
        match self.children.iter_mut().find(|c| c.solid.contains(v)) {
            Some(child) => child.insert_leaf(mesh, solid),
            None => self.children.push(MeshHierarchy { mesh, solid, children: Vec::new() }),
        }
    }

    /// Recombines the root shell with all of its descendants
    pub fn full_mesh(&self) -> Mesh {
        let mut res = Mesh::from_triangles(self.mesh.triangles().copied());
        for child in &self.children {
            res.add_mesh(&child.full_mesh());
        }
        res
    }

    /// Rebuilds the hierarchy with `f` applied to every coordinate
    pub fn map_coords(&self, f: &mut impl FnMut(Vec3) -> Vec3) -> MeshHierarchy {
        let mesh = self.mesh.map_coords(&mut *f);
        let solid = MeshSolid::new(mesh.triangle_vec());
        MeshHierarchy {
            mesh,
            solid,
            children: self.children.iter().map(|c| c.map_coords(&mut *f)).collect(),
        }
    }

    /// Minimum corner of the outer shell's bounding box
    pub fn min(&self) -> Vec3 {
        self.solid.min()
    }

    /// Maximum corner of the outer shell's bounding box
    pub fn max(&self) -> Vec3 {
        self.solid.max()
    }

    /// Even-odd containment: inside this shell but outside every child
    pub fn contains(&self, c: Vec3) -> bool {
        self.solid.contains(c) && !self.children.iter().any(|child| child.contains(c))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mesh::shapes;
    use std::collections::HashMap;

    fn tri_multiset(m: &Mesh) -> HashMap<[Vec3; 3], usize> {
        let mut res = HashMap::new();
        for t in m.triangles() {
            *res.entry(t.0).or_default() += 1;
        }
        res
    }

    #[test]
    fn nested_boxes_form_a_chain() {
        let mut m = Mesh::new();
        m.add_mesh(&shapes::rect(Vec3::splat(-3.0), Vec3::splat(3.0)));
        m.add_mesh(&shapes::rect(Vec3::splat(-2.0), Vec3::splat(2.0)));
        m.add_mesh(&shapes::rect(Vec3::splat(-1.0), Vec3::splat(1.0)));

        let h = mesh_to_hierarchy(&m).unwrap();
        assert_eq!(h.len(), 1);
        assert_eq!(h[0].children.len(), 1);
        assert_eq!(h[0].children[0].children.len(), 1);
        assert!(h[0].children[0].children[0].children.is_empty());

        // Even-odd rule: in, out, in again as the shells alternate.
        assert!(h[0].contains(Vec3::new(2.5, 0.0, 0.0)));
        assert!(!h[0].contains(Vec3::new(1.5, 0.0, 0.0)));
        assert!(h[0].contains(Vec3::ZERO));
    }

    #[test]
    fn siblings_are_separate_roots() {
        let mut m = Mesh::new();
        m.add_mesh(&shapes::rect(Vec3::new(0.0, 0.0, 0.0), Vec3::splat(1.0)));
        m.add_mesh(&shapes::rect(Vec3::new(5.0, 0.0, 0.0), Vec3::new(6.0, 1.0, 1.0)));

        let h = mesh_to_hierarchy(&m).unwrap();
        assert_eq!(h.len(), 2);
        assert!(h.iter().all(|t| t.children.is_empty()));
    }

    #[test]
    fn full_mesh_round_trips() {
        let mut m = Mesh::new();
        m.add_mesh(&shapes::icosphere(Vec3::ZERO, 2.0, 2));
        m.add_mesh(&shapes::icosphere(Vec3::new(0.5, 0.0, 0.0), 0.5, 1));
        m.add_mesh(&shapes::icosphere(Vec3::new(10.0, 0.0, 0.0), 1.0, 1));

        let h = mesh_to_hierarchy(&m).unwrap();
        let mut combined = Mesh::new();
        for tree in &h {
            combined.add_mesh(&tree.full_mesh());
        }
        assert_eq!(tri_multiset(&m), tri_multiset(&combined));
    }

    #[test]
    fn non_manifold_input_is_rejected() {
        let mut m = shapes::rect(Vec3::ZERO, Vec3::splat(1.0));
        let id = m.ids()[0];
        m.remove(id);
        assert!(matches!(mesh_to_hierarchy(&m), Err(Error::NeedsRepair)));
    }
}
