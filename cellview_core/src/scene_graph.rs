//! Read-only index over a decoded mesh asset.
//!
//! Nodes live in an arena and refer to their parent by index, so parent
//! lookups are O(1) and there are no back-references to manage. Rest
//! transforms are in the asset's own unit and Y-up convention.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CellviewError, Result};
use crate::pose::{self, Pose, Transform};
use crate::shapes::{Shape, TriangleMesh};

/// Geometry attached to a scene node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GeometryPayload {
    /// Triangulated mesh with optional per-vertex RGBA colors
    Mesh(TriangleMesh),

    /// Simplified primitive with its own local pose
    Primitive {
        shape: Shape,
        #[serde(default)]
        local_pose: Pose,
    },
}

#[derive(Debug, Clone)]
pub struct SceneNode {
    pub name: String,
    pub parent: Option<usize>,
    pub children: Vec<usize>,

    /// Parent → node rest transform (identity for the root)
    pub rest: Transform,

    pub geometry: Option<GeometryPayload>,
}

// ============================================================================
// DECODED ASSET DESCRIPTION
// ============================================================================

/// One parent → child edge of a decoded asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeDescription {
    pub parent: String,
    pub child: String,

    /// Row-major rest transform
    #[serde(default = "identity_rows")]
    pub transform: [[f64; 4]; 4],

    /// Key into [`SceneGraphDescription::geometries`]
    #[serde(default)]
    pub geometry: Option<String>,
}

/// Node/edge/geometry graph as produced by a mesh decoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneGraphDescription {
    pub root: String,
    pub edges: Vec<EdgeDescription>,

    #[serde(default)]
    pub geometries: HashMap<String, GeometryPayload>,
}

fn identity_rows() -> [[f64; 4]; 4] {
    pose::to_rows(&Transform::identity())
}

// ============================================================================
// SCENE GRAPH
// ============================================================================

#[derive(Debug, Clone)]
pub struct MeshSceneGraph {
    nodes: Vec<SceneNode>,
    index: HashMap<String, usize>,

    /// Child node names in edge order
    edge_order: Vec<String>,
}

impl MeshSceneGraph {
    /// Builds the arena from a decoded asset.
    ///
    /// Fails with `MeshLoadFailure` when a node has two parents, a geometry
    /// key is unknown, or some node does not hang below the root.
    pub fn from_description(description: &SceneGraphDescription) -> Result<Self> {
        let mut graph = Self {
            nodes: Vec::with_capacity(description.edges.len() + 1),
            index: HashMap::new(),
            edge_order: Vec::with_capacity(description.edges.len()),
        };
        let root = graph.intern(&description.root);

        for edge in &description.edges {
            let parent = graph.intern(&edge.parent);
            let child = graph.intern(&edge.child);

            if child == root || graph.nodes[child].parent.is_some() {
                let reason = format!("node '{}' has more than one parent", edge.child);
                return Err(CellviewError::mesh_load(reason));
            }

            let geometry = match &edge.geometry {
                Some(key) => Some(description.geometries.get(key).cloned().ok_or_else(|| {
                    CellviewError::mesh_load(format!("unknown geometry '{}'", key))
                })?),
                None => None,
            };

            let node = &mut graph.nodes[child];
            node.parent = Some(parent);
            node.rest = pose::from_rows(&edge.transform);
            node.geometry = geometry;
            graph.nodes[parent].children.push(child);
            graph.edge_order.push(edge.child.clone());
        }

        graph.check_rooted(root)?;
        Ok(graph)
    }

    /// Reads a JSON-encoded [`SceneGraphDescription`].
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let failed = |e: &dyn std::fmt::Display| {
            CellviewError::mesh_load(format!("{}: {}", path.display(), e))
        };
        let text = std::fs::read_to_string(path).map_err(|e| failed(&e))?;
        let description: SceneGraphDescription =
            serde_json::from_str(&text).map_err(|e| failed(&e))?;
        Self::from_description(&description)
    }

    fn intern(&mut self, name: &str) -> usize {
        if let Some(&idx) = self.index.get(name) {
            return idx;
        }
        let idx = self.nodes.len();
        self.nodes.push(SceneNode {
            name: name.to_string(),
            parent: None,
            children: Vec::new(),
            rest: Transform::identity(),
            geometry: None,
        });
        self.index.insert(name.to_string(), idx);
        idx
    }

    /// Every node must reach the root within `nodes.len()` parent hops.
    fn check_rooted(&self, root: usize) -> Result<()> {
        for (idx, node) in self.nodes.iter().enumerate() {
            let mut current = idx;
            let mut hops = 0;
            while current != root {
                current = match self.nodes[current].parent {
                    Some(parent) => parent,
                    None => {
                        let reason = format!("node '{}' is not connected to the root", node.name);
                        return Err(CellviewError::mesh_load(reason));
                    }
                };
                hops += 1;
                if hops > self.nodes.len() {
                    let reason = format!("cycle through node '{}'", node.name);
                    return Err(CellviewError::mesh_load(reason));
                }
            }
        }
        Ok(())
    }

    fn lookup(&self, name: &str) -> Result<usize> {
        self.index.get(name).copied().ok_or_else(|| CellviewError::node_not_found(name))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn node(&self, name: &str) -> Result<&SceneNode> {
        Ok(&self.nodes[self.lookup(name)?])
    }

    /// Child names of every edge, in the order the asset listed them.
    pub fn edge_children(&self) -> impl Iterator<Item = &str> {
        self.edge_order.iter().map(String::as_str)
    }

    /// Composition of rest transforms from the root down to `name`.
    pub fn cumulative_transform(&self, name: &str) -> Result<Transform> {
        let mut current = Some(self.lookup(name)?);
        let mut cumulative = Transform::identity();
        while let Some(idx) = current {
            let node = &self.nodes[idx];
            cumulative = node.rest * cumulative;
            current = node.parent;
        }
        Ok(cumulative)
    }

    pub fn parent_of(&self, name: &str) -> Result<Option<&str>> {
        let node = self.node(name)?;
        Ok(node.parent.map(|p| self.nodes[p].name.as_str()))
    }

    pub fn children_of(&self, name: &str) -> Result<Vec<&str>> {
        let node = self.node(name)?;
        Ok(node.children.iter().map(|&c| self.nodes[c].name.as_str()).collect())
    }

    pub fn geometry_of(&self, name: &str) -> Result<Option<&GeometryPayload>> {
        Ok(self.node(name)?.geometry.as_ref())
    }
}
