//! Geometric primitives: coordinates, segments, triangles, and small dense
//! linear algebra helpers

mod mat;
mod triangle;
mod vec3;

pub use mat::{least_squares3, svd3};
pub use triangle::{Segment, Triangle};
pub use vec3::Vec3;
