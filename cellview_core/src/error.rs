//! Error types for the CellView core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while evaluating kinematics, binding meshes or
/// building hull geometry.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CellviewError {
    /// Joint state length does not match the DH table
    #[error("Dimension mismatch: expected {expected} joint values, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A scene graph lookup referenced a node that does not exist
    #[error("Scene node not found: {0}")]
    NodeNotFound(String),

    /// The mesh asset could not be decoded into a scene graph
    #[error("Mesh load failure: {0}")]
    MeshLoadFailure(String),

    /// Too few or coplanar points to build a 3D hull
    #[error("Degenerate hull: {0}")]
    DegenerateHull(String),

    /// A kinematic chain was constructed without DH parameters
    #[error("DH parameter table is empty")]
    MissingDhTable,

    /// A primitive descriptor has non-finite or non-positive dimensions
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    /// The visualization sink rejected a record
    #[error("Sink error: {0}")]
    Sink(String),
}

impl CellviewError {
    /// Creates a node-not-found error.
    pub fn node_not_found(node: impl Into<String>) -> Self {
        Self::NodeNotFound(node.into())
    }

    /// Creates a mesh load error.
    pub fn mesh_load(msg: impl std::fmt::Display) -> Self {
        Self::MeshLoadFailure(msg.to_string())
    }

    /// Creates a degenerate hull error.
    pub fn degenerate(msg: impl Into<String>) -> Self {
        Self::DegenerateHull(msg.into())
    }

    /// Creates a sink error.
    pub fn sink(msg: impl std::fmt::Display) -> Self {
        Self::Sink(msg.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CellviewError>;

/// A recoverable failure local to one entity or one sample.
///
/// Diagnostics never abort processing; they are reported next to the
/// geometry that could still be produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Entity path (or sample label) that was skipped
    pub entity: String,

    /// Human-readable reason
    pub reason: String,
}

impl Diagnostic {
    pub fn new(entity: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self {
            entity: entity.into(),
            reason: reason.to_string(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "skipped {}: {}", self.entity, self.reason)
    }
}
