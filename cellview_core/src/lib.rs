//! CellView Core - robot cell visualization from kinematics and mesh assets
//!
//! Combines two independent descriptions of the same machine:
//! 1. **Kinematic model**: a Denavit–Hartenberg chain evaluated per joint state
//! 2. **Visual model**: an authored mesh hierarchy with its own node names,
//!    rest transforms, units and Y-up convention
//!
//! [`JointMeshBinder`] maps mesh fragments onto kinematic frames,
//! [`HullExtractor`] turns point clouds and primitives into outlines and
//! solid meshes, and [`TrajectoryStreamCompiler`] batches a whole trajectory
//! into per-entity pose columns for a [`VisualizationSink`].

pub mod binder;
pub mod collision_scene;
pub mod config;
pub mod error;
pub mod hull;
pub mod kinematics;
pub mod pose;
pub mod scene_graph;
pub mod shapes;
pub mod sink;
pub mod stream;

#[cfg(feature = "visualization")]
pub mod visualization;

// Re-export key types for convenience
pub use binder::{CollisionGeometry, JointMeshBinder, LinkCollisionGeometry};
pub use collision_scene::{Collider, CollisionScene, SafetyZone};
pub use config::{HullConfig, VisualizerConfig};
pub use error::{CellviewError, Diagnostic, Result};
pub use hull::{HullExtractor, HullMesh, HullPolygon};
pub use kinematics::{DhParameter, KinematicChain};
pub use pose::{AxisAngle, Pose};
pub use scene_graph::{MeshSceneGraph, SceneGraphDescription};
pub use shapes::{RenderableGeometry, Shape};
pub use sink::{RecordingBuffer, SinkRecord, VisualizationSink};
pub use stream::{
    emit, CompiledTrajectory, Timeline, TimingMode, TrajectorySample, TrajectoryStreamCompiler,
};

#[cfg(feature = "visualization")]
pub use visualization::RerunSink;
