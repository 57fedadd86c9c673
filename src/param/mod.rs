//! Surface parametrization
//!
//! Maps disk-like surface patches onto the plane: a convex boundary map
//! plus Floater's convex-combination solve for the interior, optionally
//! iterated to minimize stretch.  Arbitrary manifold meshes are first split
//! into disk-like charts, which can then be packed into a single texture
//! rectangle.
//!
//! The all-in-one entry point is [`build_automatic_uv_map`]; the individual
//! stages are exposed for callers that want control over boundaries,
//! weights, or packing.

mod boundary;
mod charts;
mod floater;
mod pack;
mod stretch;
mod weights;

pub use boundary::{boundary_sequence, circle_boundary, p_norm_boundary, square_boundary};
pub use charts::{mesh_to_plane_graphs, mesh_to_plane_graphs_limited};
pub use floater::{default_solver, floater97};
pub use pack::{build_automatic_uv_map, extend_boundary_uvs, pack_mesh_uv_maps, MeshUvMap};
pub use stretch::stretch_minimizing;
pub use weights::{inv_chord_length_weights, shape_preserving_weights, uniform_weights};
