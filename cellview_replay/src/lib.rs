//! CellView trajectory replay
//!
//! Loads a robot cell description (DH table, mounting, mesh asset, collision
//! geometry, recorded trajectories) and replays it into a visualization sink.

pub mod exporter;
pub mod input;
pub mod replay;

pub use exporter::ReplayExport;
pub use input::{load_config, CellDescription, MeshSource, ReplayError};
pub use replay::{run, ReplayOptions, ReplaySummary};
