//! Module containing the universal error type for this crate
use thiserror::Error;

/// Universal error type for mesh construction and processing
#[derive(Error, Debug)]
pub enum Error {
    #[error("solid has an invalid bounding box")]
    InvalidBounds,

    #[error("solid is non-empty on the padded grid border")]
    SolidOutOfBounds,

    #[error("mesh has an edge with other than two incident faces")]
    NeedsRepair,

    #[error("coordinate {0:?} is not a vertex of the mesh")]
    UnknownVertex(crate::geom::Vec3),

    #[error("edge weight {0} must not be negative")]
    BadWeight(f64),

    #[error("missing edge weight between {0:?} and {1:?}")]
    MissingWeight(crate::geom::Vec3, crate::geom::Vec3),

    #[error("per-vertex edge weights must sum to 1, got {0}")]
    UnnormalizedWeights(f64),

    #[error("mesh has no boundary edges")]
    NoBoundary,

    #[error("mesh boundary is not a single connected cycle")]
    MultipleBoundaries,

    #[error("mesh is inconsistently oriented around a vertex or boundary")]
    BadOrientation,

    #[error("singular edge touched by {0} faces")]
    SingularEdge(usize),

    #[error("degenerate triangle where a non-degenerate one is required")]
    DegenerateTriangle,

    #[error("matrix is not positive-definite")]
    NotPositiveDefinite,

    #[error("resolution {0} is not a power of two")]
    BadResolution(usize),

    #[error("mesh parametrization produced an invalid (NaN or infinite) stretch")]
    InvalidStretch,
}
