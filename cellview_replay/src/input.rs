//! Replay input: one robot cell plus its recorded trajectories.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use cellview_core::{
    CellviewError, Collider, CollisionGeometry, DhParameter, LinkCollisionGeometry,
    MeshSceneGraph, Pose, SafetyZone, SceneGraphDescription, TrajectorySample, VisualizerConfig,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while loading replay inputs.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Cellview(#[from] CellviewError),
}

impl ReplayError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn json(path: &Path, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.to_path_buf(),
            source,
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ReplayError> {
    let text = std::fs::read_to_string(path).map_err(|e| ReplayError::io(path, e))?;
    serde_json::from_str(&text).map_err(|e| ReplayError::json(path, e))
}

/// Reads a [`VisualizerConfig`]; missing fields take their defaults.
pub fn load_config(path: impl AsRef<Path>) -> Result<VisualizerConfig, ReplayError> {
    read_json(path.as_ref())
}

/// Where the decoded mesh asset comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MeshSource {
    /// JSON scene description file, relative to the cell file
    Path(PathBuf),
    Inline(SceneGraphDescription),
}

/// A robot cell and the motions to replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellDescription {
    pub dh_parameters: Vec<DhParameter>,

    #[serde(default)]
    pub mounting: Pose,

    #[serde(default)]
    pub mesh: Option<MeshSource>,

    #[serde(default)]
    pub link_geometries: Vec<LinkCollisionGeometry>,

    #[serde(default)]
    pub tcp_geometries: Vec<CollisionGeometry>,

    #[serde(default)]
    pub colliders: BTreeMap<String, Collider>,

    #[serde(default)]
    pub safety_zones: Vec<SafetyZone>,

    /// Trajectories in replay order
    #[serde(default)]
    pub trajectories: Vec<Vec<TrajectorySample>>,

    /// Directory relative mesh paths resolve against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl CellDescription {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        let path = path.as_ref();
        let mut cell: CellDescription = read_json(path)?;
        cell.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(cell)
    }

    /// Decodes the mesh asset, if any. Failures are returned, not raised, so
    /// the caller can fall back to primitive-only rendering.
    pub fn scene_graph(&self) -> Option<cellview_core::Result<MeshSceneGraph>> {
        match self.mesh.as_ref()? {
            MeshSource::Path(path) => Some(MeshSceneGraph::load_json(self.base_dir.join(path))),
            MeshSource::Inline(description) => Some(MeshSceneGraph::from_description(description)),
        }
    }

    pub fn sample_count(&self) -> usize {
        self.trajectories.iter().map(Vec::len).sum()
    }
}
