//! Dual Contouring
//!
//! Converts a [`Solid`] oracle into a triangle mesh: sample membership on a
//! jittered grid, compute hermite data (surface point + normal) on every
//! sign-changing edge, place one vertex per active cube by minimizing a
//! quadratic error function, and emit a quad for every active edge.
//!
//! By default the engine tries to produce manifold meshes, repairing
//! singular edges and vertices after emission.  This can cost some edge
//! quality; disable `repair` to keep raw output.  Pairing `repair` with
//! `clip` keeps repaired vertices inside their cubes, which is what makes
//! the manifold guarantee hold in practice.
//!
//! ```no_run
//! use isomesh::{dc::DualContouring, solid::Sphere, surface::SurfaceEstimator, Vec3};
//!
//! let sphere = Sphere { center: Vec3::ZERO, radius: 1.0 };
//! let mut dc = DualContouring::new(SurfaceEstimator::new(&sphere));
//! dc.delta = 0.05;
//! let mesh = dc.mesh()?;
//! assert!(!mesh.needs_repair());
//! # Ok::<(), isomesh::Error>(())
//! ```

mod layout;
mod repair;

use crate::geom::{least_squares3, Triangle, Vec3};
use crate::mesh::Mesh;
use crate::solid::{bounds_valid, Solid};
use crate::surface::SurfaceEstimator;
use crate::Error;
use arrayvec::ArrayVec;
use layout::CubeLayout;
use rayon::prelude::*;

/// Default soft limit on the number of cached grid samples held in memory
pub const DEFAULT_BUFFER_SIZE: usize = 1_000_000;

/// Default vertex displacement used when splitting singularities, relative
/// to the grid spacing
pub const DEFAULT_REPAIR_EPSILON: f64 = 0.01;

/// Default margin kept between clipped vertices and their cube walls,
/// relative to the grid spacing
pub const DEFAULT_CUBE_MARGIN: f64 = 0.001;

/// Damping used by the per-cube quadratic error solve
const QEF_DAMPING: f64 = 0.1;

/// Configurable Dual Contouring engine
pub struct DualContouring<'a, S: Solid + ?Sized> {
    /// Estimator used to compute hermite data on sign-changing edges
    pub s: SurfaceEstimator<'a, S>,

    /// Grid spacing
    pub delta: f64,

    /// Disables the small deterministic jitter applied to grid coordinates
    ///
    /// The jitter avoids common failure modes when estimating normals
    /// exactly on the faces of boxy solids.
    pub no_jitter: bool,

    /// Worker threads for the data-parallel phases; 0 uses all hardware
    /// threads
    pub threads: usize,

    /// Soft limit on cached grid samples; 0 means [`DEFAULT_BUFFER_SIZE`]
    pub buffer_size: usize,

    /// Split singular edges and vertices after meshing
    ///
    /// Not guaranteed to produce a manifold mesh unless `clip` is also set.
    pub repair: bool,

    /// Clamp cube vertices into their cubes (with `cube_margin` slack)
    pub clip: bool,

    /// Margin between a clipped vertex and its cube walls, relative to
    /// `delta`; 0 means [`DEFAULT_CUBE_MARGIN`]
    pub cube_margin: f64,

    /// Distance singular features are displaced when repairing, relative to
    /// `delta`; 0 means [`DEFAULT_REPAIR_EPSILON`]
    pub repair_epsilon: f64,
}

impl<'a, S: Solid + ?Sized> DualContouring<'a, S> {
    /// Builds an engine with manifold repair and clipping enabled
    pub fn new(s: SurfaceEstimator<'a, S>) -> Self {
        Self {
            s,
            delta: 0.0,
            no_jitter: false,
            threads: 0,
            buffer_size: 0,
            repair: true,
            clip: true,
            cube_margin: 0.0,
            repair_epsilon: 0.0,
        }
    }

    /// Computes a mesh for the solid's surface
    pub fn mesh(&self) -> Result<Mesh, Error> {
        if !bounds_valid(self.s.solid) || self.delta <= 0.0 {
            return Err(Error::InvalidBounds);
        }
        let solid = self.s.solid;
        let buf_size = if self.buffer_size == 0 {
            DEFAULT_BUFFER_SIZE
        } else {
            self.buffer_size
        };
        let mut layout = CubeLayout::new(
            solid.min(),
            solid.max(),
            self.delta,
            self.no_jitter,
            buf_size,
        );
        if layout.zs.len() < 3 {
            return Err(Error::InvalidBounds);
        }

        let mut run = || -> Result<Mesh, Error> {
            let mut mesh = Mesh::new();
            loop {
                self.populate_corners(&mut layout);
                self.populate_edges(&mut layout);
                self.populate_cubes(&mut layout);
                self.append_mesh(&mut layout, &mut mesh)?;
                if layout.remaining() == 0 {
                    break;
                }
                layout.shift();
            }

            if self.repair {
                let epsilon = self.repair_epsilon() * 0.49;
                let orig =
                    repair::repair_singular_edges(&mut mesh, &layout, epsilon, self.clip);
                repair::repair_singular_vertices(
                    &mut mesh, &layout, epsilon, self.clip, &orig,
                );
                mesh.clear_vertex_index();
            }
            Ok(mesh)
        };

        if self.threads == 0 {
            run()
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.threads)
                .build()
                .expect("failed to build worker pool");
            pool.install(run)
        }
    }

    fn populate_corners(&self, layout: &mut CubeLayout) {
        let solid = self.s.solid;
        layout.corners.par_iter_mut().for_each(|corner| {
            if !corner.populated {
                corner.populated = true;
                corner.value = solid.contains(corner.coord);
            }
        });
    }

    fn populate_edges(&self, layout: &mut CubeLayout) {
        let dims = layout.dims();
        let corners = &layout.corners;
        let est = &self.s;
        layout.edges.par_iter_mut().enumerate().for_each(|(i, edge)| {
            if edge.populated {
                return;
            }
            edge.populated = true;
            let [i1, i2] = dims.edge_corners(i);
            let (c1, c2) = (&corners[i1], &corners[i2]);
            edge.active = c1.value != c2.value;
            if edge.active {
                edge.coord = est.bisect(c1.coord, c2.coord);
                edge.normal = est.normal(edge.coord);
            }
        });
    }

    fn populate_cubes(&self, layout: &mut CubeLayout) {
        let dims = layout.dims();
        let margin = if self.cube_margin == 0.0 {
            DEFAULT_CUBE_MARGIN
        } else {
            self.cube_margin
        } * self.delta;
        let clip = self.clip;

        let corners = &layout.corners;
        let edges = &layout.edges;
        layout.cubes.par_iter_mut().enumerate().for_each(|(i, cube)| {
            if cube.populated {
                return;
            }
            cube.populated = true;

            let corner_idxs = dims.cube_corners(i);
            let first = corners[corner_idxs[0]].value;
            if corner_idxs[1..].iter().all(|&c| corners[c].value == first) {
                return;
            }

            let mut active: ArrayVec<&layout::EdgeSlot, 12> = ArrayVec::new();
            let mut mass_point = Vec3::ZERO;
            for e in dims.cube_edges(i) {
                let edge = &edges[e];
                if edge.active {
                    mass_point += edge.coord;
                    active.push(edge);
                }
            }
            assert!(!active.is_empty(), "active cube with no active edges");
            mass_point = mass_point / active.len() as f64;

            let rows: Vec<_> = active
                .iter()
                .map(|e| (e.normal.to_na(), (e.coord - mass_point).dot(e.normal)))
                .collect();
            let mut p = Vec3::from_na(least_squares3(&rows, QEF_DAMPING)) + mass_point;

            if clip {
                let mut min = corners[corner_idxs[0]].coord;
                let mut max = min;
                for &c in &corner_idxs[1..] {
                    min = min.min(corners[c].coord);
                    max = max.max(corners[c].coord);
                }
                p = p.max(min.add_scalar(margin)).min(max.add_scalar(-margin));
            }
            cube.vertex = p;
        });
    }

    fn append_mesh(&self, layout: &mut CubeLayout, mesh: &mut Mesh) -> Result<(), Error> {
        let usable = layout.usable_edges();
        let dims = layout.dims();
        let cubes = &layout.cubes;
        let quads: Result<Vec<ArrayVec<Triangle, 2>>, Error> = layout.edges[..usable]
            .par_iter_mut()
            .enumerate()
            .map(|(i, edge)| {
                let mut out = ArrayVec::new();
                if edge.triangulated || !edge.active {
                    return Ok(out);
                }
                edge.triangulated = true;

                let mut vs = [Vec3::ZERO; 4];
                for (k, c) in dims.edge_cubes(i).into_iter().enumerate() {
                    match c {
                        Some(ci) => vs[k] = cubes[ci].vertex,
                        // An active edge next to an unsampled cube means
                        // the solid leaks past its padded bounding box.
                        None => return Err(Error::SolidOutOfBounds),
                    }
                }

                // Of the two quad diagonals, keep the one with the sharper
                // crease between its triangles, preserving feature edges.
                let t1a = Triangle::new(vs[0], vs[1], vs[2]);
                let t2a = Triangle::new(vs[1], vs[3], vs[2]);
                let t1b = Triangle::new(vs[1], vs[3], vs[0]);
                let t2b = Triangle::new(vs[3], vs[2], vs[0]);
                let dot_a = t1a.normal().dot(t2a.normal());
                let dot_b = t1b.normal().dot(t2b.normal());
                let (mut t1, mut t2) = if dot_a > dot_b { (t1b, t2b) } else { (t1a, t2a) };

                // Orient the quad to match the hermite normal.
                if t1.normal().dot(edge.normal) < 0.0 {
                    t1.0.swap(0, 1);
                    t2.0.swap(0, 1);
                }
                out.push(t1);
                out.push(t2);
                Ok(out)
            })
            .collect();

        for quad in quads? {
            for t in quad {
                mesh.add(t);
            }
        }
        Ok(())
    }

    fn repair_epsilon(&self) -> f64 {
        if self.repair_epsilon == 0.0 {
            DEFAULT_REPAIR_EPSILON * self.delta
        } else {
            self.repair_epsilon * self.delta
        }
    }
}
