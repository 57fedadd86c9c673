//! Implicit-solid meshing and triangle-mesh processing.
//!
//! The crate is built around two representations of a 3D model and the
//! conversions between them:
//!
//! - a [`Solid`](solid::Solid): a membership oracle with a bounding box,
//! - a [`Mesh`](mesh::Mesh): a set of triangles with topology queries.
//!
//! [Dual Contouring](dc::DualContouring) turns a solid into a manifold
//! mesh; [`MeshSolid`](solid::MeshSolid) goes the other way.  On top of the
//! mesh sit the heavier algorithms:
//!
//! - [`decimate`]: vertex-removal simplification with feature preservation,
//! - [`arap`]: as-rigid-as-possible constrained deformation,
//! - [`param`]: Floater-style parametrization, stretch minimization, and
//!   automatic UV atlas packing,
//! - [`hierarchy`]: classification of closed shells into containment trees.
//!
//! ```no_run
//! use isomesh::{dc::DualContouring, solid::Sphere, surface::SurfaceEstimator, Vec3};
//!
//! let sphere = Sphere { center: Vec3::ZERO, radius: 1.0 };
//! let mut dc = DualContouring::new(SurfaceEstimator::new(&sphere));
//! dc.delta = 0.02;
//! let mesh = dc.mesh()?;
//! println!("{} triangles, volume {:.3}", mesh.len(), mesh.volume());
//! # Ok::<(), isomesh::Error>(())
//! ```

pub mod arap;
pub mod coord_map;
pub mod dc;
pub mod decimate;
mod error;
pub mod geom;
pub mod hierarchy;
pub mod la;
pub mod mesh;
pub mod param;
pub mod solid;
pub mod surface;

pub use error::Error;
pub use geom::{Segment, Triangle, Vec3};
pub use mesh::{Mesh, TriangleId};
