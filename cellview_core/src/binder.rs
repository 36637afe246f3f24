//! Joint discovery and mesh binding.
//!
//! The binder attaches fragments of an authored mesh asset to the frames of
//! a [`KinematicChain`]. Discovery runs once when a scene is attached;
//! binding runs per joint state and yields one world pose per rendered
//! entity plus, the first time an entity is seen, its raw geometry.
//!
//! For a fragment of link `i` the pose is
//!
//! ```text
//! final = frame[i] · RotZ(dh[i].theta) · remap(Y-up → Z-up) · S(correction)
//! ```
//!
//! where `correction = cum(joint_i)⁻¹ · cum(boundary)` in mesh units and `S`
//! scales its translation by `mesh_unit_scale`. Link 0 is anchored to the
//! mesh root, so its correction is `cum(boundary)` alone.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::VisualizerConfig;
use crate::error::{CellviewError, Diagnostic, Result};
use crate::hull::HullExtractor;
use crate::kinematics::KinematicChain;
use crate::pose::{self, Pose, Transform};
use crate::scene_graph::{GeometryPayload, MeshSceneGraph};
use crate::shapes::{RenderStyle, RenderableGeometry, Shape};

const JOINT_MARKER: &str = "_J0";
const FLANGE_MARKER: &str = "_FLG";

/// Maps `c` to `(c / 255)^gamma * 255` on the RGB channels; alpha is kept.
pub fn gamma_lift(color: [u8; 4], gamma: f64) -> [u8; 4] {
    let lift = |c: u8| ((c as f64 / 255.0).powf(gamma) * 255.0) as u8;
    [lift(color[0]), lift(color[1]), lift(color[2]), color[3]]
}

/// Ordinal of a `_J0<digits>` joint marker.
pub fn joint_ordinal(name: &str) -> Option<u32> {
    name.match_indices(JOINT_MARKER).find_map(|(idx, _)| {
        let rest = &name[idx + JOINT_MARKER.len()..];
        let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        digits.parse().ok()
    })
}

pub fn is_flange(name: &str) -> bool {
    name.contains(FLANGE_MARKER)
}

// ============================================================================
// INPUT / OUTPUT TYPES
// ============================================================================

/// Simplified collision primitive authored in kinematic space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollisionGeometry {
    pub shape: Shape,

    /// Pose relative to the owning link frame
    #[serde(default)]
    pub init_pose: Pose,
}

/// Collision primitive attached to a link index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkCollisionGeometry {
    pub link_index: usize,

    #[serde(flatten)]
    pub geometry: CollisionGeometry,
}

/// World pose of one entity for one joint state.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityPose {
    pub path: String,
    pub transform: Transform,
}

/// Geometry to register once per entity path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryRegistration {
    pub path: String,
    pub geometry: RenderableGeometry,
}

/// Result of binding one joint state.
#[derive(Debug, Clone, Default)]
pub struct BoundFrame {
    /// Kinematic frames of the joint state, mounting first
    pub frames: Vec<Transform>,

    /// Every bound entity, registered or not
    pub poses: Vec<EntityPose>,

    /// Entities seen for the first time
    pub registrations: Vec<GeometryRegistration>,

    pub diagnostics: Vec<Diagnostic>,
}

/// Entity paths whose geometry has already been registered, plus the paths
/// whose geometry could not be built.
///
/// Both sets grow monotonically for the lifetime of a binder.
#[derive(Debug, Clone, Default)]
pub struct LoggedGeometryCache {
    paths: HashSet<String>,
    failed: HashSet<String>,
}

impl LoggedGeometryCache {
    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    /// Returns `true` if the path was not cached yet.
    pub fn insert(&mut self, path: &str) -> bool {
        self.paths.insert(path.to_string())
    }

    pub fn has_failed(&self, path: &str) -> bool {
        self.failed.contains(path)
    }

    /// Returns `true` the first time a path is marked.
    pub fn mark_failed(&mut self, path: &str) -> bool {
        self.failed.insert(path.to_string())
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Mesh node bound to a link, with its precomputed correction.
#[derive(Debug, Clone)]
struct MeshFragment {
    node: String,
    path: String,

    /// Translation already in kinematic units
    correction: Transform,
}

/// Discovered joint node and the visual layer of its link.
#[derive(Debug, Clone)]
pub struct JointBinding {
    pub link_index: usize,
    pub joint_node: String,

    /// Geometry-carrying nodes of the layer
    pub layer: Vec<String>,

    fragments: Vec<MeshFragment>,
}

// ============================================================================
// BINDER
// ============================================================================

pub struct JointMeshBinder {
    chain: KinematicChain,
    scene: Option<MeshSceneGraph>,
    bindings: Vec<JointBinding>,
    link_geometries: BTreeMap<usize, Vec<CollisionGeometry>>,
    tcp_geometries: Vec<CollisionGeometry>,
    cache: LoggedGeometryCache,
    config: VisualizerConfig,
    extractor: HullExtractor,

    /// Discovery-time diagnostics, handed out with the next bound frame
    pending: Vec<Diagnostic>,
}

impl JointMeshBinder {
    /// Creates a binder without a mesh asset (collision primitives only).
    pub fn new(chain: KinematicChain, config: VisualizerConfig) -> Self {
        let extractor = HullExtractor::new(config.hull.coplanar_tolerance);
        Self {
            chain,
            scene: None,
            bindings: Vec::new(),
            link_geometries: BTreeMap::new(),
            tcp_geometries: Vec::new(),
            cache: LoggedGeometryCache::default(),
            config,
            extractor,
            pending: Vec::new(),
        }
    }

    /// Attaches a mesh asset and runs joint discovery.
    ///
    /// Without any discovered joint the binder stays in no-mesh mode.
    pub fn with_scene(mut self, scene: MeshSceneGraph) -> Self {
        let (bindings, diagnostics) = discover(&scene, &self.chain, &self.config);
        self.pending.extend(diagnostics);

        if bindings.is_empty() {
            warn!("No joint nodes found in mesh asset, rendering collision primitives only");
            self.pending.push(Diagnostic::new(self.mesh_root_path(), "no joint nodes discovered"));
            return self;
        }

        info!(
            "Discovered {} joint nodes, {} mesh fragments",
            bindings.len(),
            bindings.iter().map(|b| b.fragments.len()).sum::<usize>()
        );
        self.bindings = bindings;
        self.scene = Some(scene);
        self
    }

    /// Attaches the outcome of loading a mesh asset; a load failure degrades
    /// to no-mesh mode.
    pub fn with_mesh_result(self, scene: Result<MeshSceneGraph>) -> Self {
        match scene {
            Ok(scene) => self.with_scene(scene),
            Err(e) => {
                warn!("Failed to load mesh: {}", e);
                let mut binder = self;
                binder.pending.push(Diagnostic::new(binder.mesh_root_path(), &e));
                binder
            }
        }
    }

    /// Sets the collision primitives attached to links.
    ///
    /// Primitives on a link index without a kinematic frame are dropped.
    pub fn with_link_geometries(mut self, geometries: Vec<LinkCollisionGeometry>) -> Self {
        let frame_count = self.chain.joint_count() + 1;
        for entry in geometries {
            if entry.link_index >= frame_count {
                let base = self.config.base_path();
                let path = format!("{}/collision/links/link_{}", base, entry.link_index);
                warn!("Dropping collision geometry of {}: no kinematic frame", path);
                self.pending.push(Diagnostic::new(path, "link index has no kinematic frame"));
                continue;
            }
            self.link_geometries.entry(entry.link_index).or_default().push(entry.geometry);
        }
        self
    }

    /// Sets the collision primitives attached to the last frame.
    pub fn with_tcp_geometries(mut self, geometries: Vec<CollisionGeometry>) -> Self {
        self.tcp_geometries = geometries;
        self
    }

    pub fn chain(&self) -> &KinematicChain {
        &self.chain
    }

    pub fn config(&self) -> &VisualizerConfig {
        &self.config
    }

    pub fn extractor(&self) -> &HullExtractor {
        &self.extractor
    }

    pub fn cache(&self) -> &LoggedGeometryCache {
        &self.cache
    }

    pub fn joint_bindings(&self) -> &[JointBinding] {
        &self.bindings
    }

    /// Whether mesh fragments are rendered.
    pub fn mesh_enabled(&self) -> bool {
        self.scene.is_some() && !self.bindings.is_empty()
    }

    fn mesh_root_path(&self) -> String {
        format!("{}/mesh", self.config.base_path())
    }

    /// Binds one joint state.
    ///
    /// Fails only with `DimensionMismatch`; per-entity problems end up in
    /// [`BoundFrame::diagnostics`], once per entity. An entity whose geometry
    /// failed is skipped on every later call.
    pub fn bind(&mut self, joints: &[f64]) -> Result<BoundFrame> {
        let frames = self.chain.forward(joints)?;
        let mut out = BoundFrame {
            diagnostics: std::mem::take(&mut self.pending),
            ..BoundFrame::default()
        };

        let Self {
            chain,
            scene,
            bindings,
            link_geometries,
            tcp_geometries,
            cache,
            config,
            extractor,
            ..
        } = self;
        let (chain, config, extractor): (&KinematicChain, &VisualizerConfig, &HullExtractor) =
            (chain, config, extractor);

        if let Some(scene) = scene.as_ref() {
            let remap = pose::y_up_to_z_up();
            for binding in bindings.iter() {
                let Some(link_frame) = frames.get(binding.link_index) else {
                    continue;
                };
                let align = match chain.dh_parameters().get(binding.link_index) {
                    Some(dh) if config.align_dh_theta_offset => pose::rotation_z(dh.theta),
                    _ => Transform::identity(),
                };
                let link_base = link_frame * align * remap;

                for fragment in &binding.fragments {
                    let payload = match scene.geometry_of(&fragment.node) {
                        Ok(Some(payload)) => payload,
                        Ok(None) => continue,
                        Err(e) => {
                            if cache.mark_failed(&fragment.path) {
                                skip(&mut out, &fragment.path, e);
                            }
                            continue;
                        }
                    };

                    let mut transform = link_base * fragment.correction;
                    if let GeometryPayload::Primitive { local_pose, .. } = payload {
                        transform *= local_pose.to_matrix();
                    }

                    let build = || mesh_renderable(payload, config, extractor);
                    if register(cache, &mut out, &fragment.path, build) {
                        out.poses.push(EntityPose {
                            path: fragment.path.clone(),
                            transform,
                        });
                    }
                }
            }
        }

        let base = config.base_path();
        for (link_index, geometries) in link_geometries.iter() {
            let Some(link_frame) = frames.get(*link_index) else {
                continue;
            };
            for (j, geometry) in geometries.iter().enumerate() {
                let path =
                    format!("{}/collision/links/link_{}/geometry_{}", base, link_index, j);
                bind_primitive(cache, &mut out, path, link_frame, geometry, config, extractor);
            }
        }

        if let Some(tcp_frame) = frames.last() {
            for (j, geometry) in tcp_geometries.iter().enumerate() {
                let path = format!("{}/collision/tcp/geometry_{}", base, j);
                bind_primitive(cache, &mut out, path, tcp_frame, geometry, config, extractor);
            }
        }

        out.frames = frames;
        Ok(out)
    }
}

fn skip(out: &mut BoundFrame, path: &str, reason: impl std::fmt::Display) {
    warn!("Skipping {}: {}", path, reason);
    out.diagnostics.push(Diagnostic::new(path, reason));
}

/// Registers geometry for `path` unless cached. Returns whether the entity
/// is renderable (cached or freshly registered).
fn register(
    cache: &mut LoggedGeometryCache,
    out: &mut BoundFrame,
    path: &str,
    build: impl FnOnce() -> Result<RenderableGeometry>,
) -> bool {
    if cache.contains(path) {
        return true;
    }
    if cache.has_failed(path) {
        return false;
    }
    match build() {
        Ok(geometry) => {
            debug!("Registering geometry for {}", path);
            cache.insert(path);
            out.registrations.push(GeometryRegistration {
                path: path.to_string(),
                geometry,
            });
            true
        }
        Err(e) => {
            cache.mark_failed(path);
            skip(out, path, e);
            false
        }
    }
}

fn bind_primitive(
    cache: &mut LoggedGeometryCache,
    out: &mut BoundFrame,
    path: String,
    frame: &Transform,
    geometry: &CollisionGeometry,
    config: &VisualizerConfig,
    extractor: &HullExtractor,
) {
    let transform = frame * geometry.init_pose.to_matrix();
    if register(cache, out, &path, || primitive_renderable(&geometry.shape, config, extractor)) {
        out.poses.push(EntityPose { path, transform });
    }
}

fn primitive_renderable(
    shape: &Shape,
    config: &VisualizerConfig,
    extractor: &HullExtractor,
) -> Result<RenderableGeometry> {
    // Static poses overlap the mesh exactly; shrink capsules a little
    let shape = if config.static_transform {
        shape.shrunk(config.static_shrink)
    } else {
        shape.clone()
    };

    Ok(match shape.renderable(RenderStyle::Solid, extractor, &config.hull)? {
        RenderableGeometry::Mesh(mesh) => RenderableGeometry::Mesh(mesh.with_albedo(config.albedo)),
        other => other,
    })
}

fn mesh_renderable(
    payload: &GeometryPayload,
    config: &VisualizerConfig,
    extractor: &HullExtractor,
) -> Result<RenderableGeometry> {
    match payload {
        GeometryPayload::Mesh(mesh) => {
            if mesh.vertices.is_empty() {
                return Err(CellviewError::InvalidGeometry("mesh has no vertices".to_string()));
            }
            let mut mesh = mesh.clone().scaled(config.mesh_unit_scale).with_vertex_normals();
            if let Some(colors) = mesh.vertex_colors.as_mut() {
                for color in colors.iter_mut() {
                    *color = gamma_lift(*color, config.color_gamma);
                }
            }
            Ok(RenderableGeometry::Mesh(mesh))
        }
        GeometryPayload::Primitive { shape, .. } => primitive_renderable(shape, config, extractor),
    }
}

// ============================================================================
// DISCOVERY
// ============================================================================

/// Joint nodes in link order: ordinal joints sorted by ordinal, then flanges.
fn joint_nodes(scene: &MeshSceneGraph) -> Vec<String> {
    let mut ordinals = Vec::new();
    let mut flanges = Vec::new();

    for child in scene.edge_children() {
        if let Some(ordinal) = joint_ordinal(child) {
            ordinals.push((ordinal, child.to_string()));
        }
        if is_flange(child) {
            flanges.push(child.to_string());
        }
    }

    ordinals.sort_by_key(|(ordinal, _)| *ordinal);
    ordinals.into_iter().map(|(_, name)| name).chain(flanges).collect()
}

fn discover(
    scene: &MeshSceneGraph,
    chain: &KinematicChain,
    config: &VisualizerConfig,
) -> (Vec<JointBinding>, Vec<Diagnostic>) {
    let joints = joint_nodes(scene);
    let joint_set: HashSet<&str> = joints.iter().map(String::as_str).collect();
    let frame_count = chain.joint_count() + 1;
    let base = config.base_path();

    let mut bindings = Vec::with_capacity(joints.len());
    let mut diagnostics = Vec::new();

    for (link_index, joint) in joints.iter().enumerate() {
        let link_path = format!("{}/mesh/links/link_{}", base, link_index);

        if link_index >= frame_count {
            warn!("Joint node {} has no kinematic frame (link {})", joint, link_index);
            let reason = format!("joint node '{}' has no kinematic frame", joint);
            diagnostics.push(Diagnostic::new(link_path, reason));
            continue;
        }

        let anchor = if link_index == 0 {
            Ok(Transform::identity())
        } else {
            scene.cumulative_transform(joint).map(|t| pose::rigid_inverse(&t))
        };
        let anchor = match anchor {
            Ok(anchor) => anchor,
            Err(e) => {
                diagnostics.push(Diagnostic::new(link_path, e));
                continue;
            }
        };

        let siblings = match scene.parent_of(joint) {
            Ok(Some(parent)) => scene.children_of(parent).unwrap_or_default(),
            Ok(None) => Vec::new(),
            Err(e) => {
                diagnostics.push(Diagnostic::new(link_path, e));
                continue;
            }
        };

        let mut binding = JointBinding {
            link_index,
            joint_node: joint.clone(),
            layer: Vec::new(),
            fragments: Vec::new(),
        };

        for boundary in siblings.into_iter().filter(|s| !joint_set.contains(s)) {
            let boundary_rest = match scene.cumulative_transform(boundary) {
                Ok(t) => t,
                Err(e) => {
                    let path = format!("{}/mesh/{}", link_path, boundary);
                    diagnostics.push(Diagnostic::new(path, e));
                    continue;
                }
            };
            let correction =
                pose::scale_translation(&(anchor * boundary_rest), config.mesh_unit_scale);

            // Depth-first below the boundary, stopping at the next joint
            let mut stack = vec![boundary];
            while let Some(node) = stack.pop() {
                if matches!(scene.geometry_of(node), Ok(Some(_))) {
                    binding.layer.push(node.to_string());
                    binding.fragments.push(MeshFragment {
                        node: node.to_string(),
                        path: format!("{}/mesh/{}", link_path, node),
                        correction,
                    });
                }
                if let Ok(children) = scene.children_of(node) {
                    stack.extend(children.into_iter().rev().filter(|c| !joint_set.contains(c)));
                }
            }
        }

        debug!("Link {} ({}): {} layer nodes", link_index, joint, binding.layer.len());
        bindings.push(binding);
    }

    (bindings, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinematics::DhParameter;
    use crate::scene_graph::{EdgeDescription, SceneGraphDescription};
    use crate::shapes::TriangleMesh;
    use approx::assert_relative_eq;
    use std::collections::HashMap;
    use std::f64::consts::FRAC_PI_2;

    fn edge(parent: &str, child: &str, t: Transform, geometry: Option<&str>) -> EdgeDescription {
        EdgeDescription {
            parent: parent.to_string(),
            child: child.to_string(),
            transform: pose::to_rows(&t),
            geometry: geometry.map(str::to_string),
        }
    }

    fn colored_mesh() -> GeometryPayload {
        GeometryPayload::Mesh(TriangleMesh {
            vertices: vec![[0.0, 0.0, 0.0], [0.1, 0.0, 0.0], [0.0, 0.1, 0.0]],
            triangles: vec![[0, 1, 2]],
            normals: None,
            vertex_colors: Some(vec![[128, 128, 128, 255]; 3]),
            albedo: None,
        })
    }

    /// Y-up asset in meters matching `chain()`: J01 sits 0.1 above J00.
    fn scene() -> MeshSceneGraph {
        let mut geometries = HashMap::new();
        geometries.insert("mesh".to_string(), colored_mesh());
        let description = SceneGraphDescription {
            root: "world".to_string(),
            edges: vec![
                edge("world", "ur_J00", Transform::identity(), None),
                edge("world", "base_link", pose::translation(0.0, 0.02, 0.0), Some("mesh")),
                edge("ur_J00", "ur_J01", pose::translation(0.0, 0.1, 0.0), None),
                edge("ur_J00", "shoulder", pose::translation(0.0, 0.05, 0.0), Some("mesh")),
                edge("shoulder", "shoulder_cover", Transform::identity(), Some("mesh")),
                edge("ur_J01", "ur_FLG", pose::translation(0.2, 0.0, 0.0), None),
                edge("ur_J01", "upper_arm", Transform::identity(), Some("mesh")),
                edge("ur_FLG", "tool", Transform::identity(), Some("mesh")),
            ],
            geometries,
        };
        MeshSceneGraph::from_description(&description).unwrap()
    }

    fn chain() -> KinematicChain {
        KinematicChain::new(
            vec![DhParameter::new(0.0, 0.0, 100.0, 0.0), DhParameter::new(200.0, 0.0, 0.0, 0.0)],
            &Pose::identity(),
        )
        .unwrap()
    }

    fn binder() -> JointMeshBinder {
        JointMeshBinder::new(chain(), VisualizerConfig::default()).with_scene(scene())
    }

    fn pose_of<'a>(frame: &'a BoundFrame, path: &str) -> &'a Transform {
        &frame.poses.iter().find(|p| p.path == path).unwrap().transform
    }

    #[test]
    fn test_gamma_lift() {
        assert_eq!(gamma_lift([128, 128, 128, 255], 0.5), [180, 180, 180, 255]);
        assert_eq!(gamma_lift([0, 255, 64, 10], 1.0), [0, 255, 64, 10]);
    }

    #[test]
    fn test_joint_markers() {
        assert_eq!(joint_ordinal("UR5e_J00"), Some(0));
        assert_eq!(joint_ordinal("UR5e_J05_extra"), Some(5));
        assert_eq!(joint_ordinal("UR5e_J0"), None);
        assert_eq!(joint_ordinal("base_link"), None);
        assert!(is_flange("UR5e_FLG"));
        assert!(!is_flange("UR5e_J03"));
    }

    #[test]
    fn test_joint_order_follows_ordinals() {
        let description = SceneGraphDescription {
            root: "r".to_string(),
            edges: vec![
                edge("r", "x_FLG", Transform::identity(), None),
                edge("r", "x_J02", Transform::identity(), None),
                edge("r", "x_J00", Transform::identity(), None),
                edge("r", "x_J01", Transform::identity(), None),
            ],
            geometries: HashMap::new(),
        };
        let scene = MeshSceneGraph::from_description(&description).unwrap();
        assert_eq!(joint_nodes(&scene), vec!["x_J00", "x_J01", "x_J02", "x_FLG"]);
    }

    #[test]
    fn test_layers_stop_at_next_joint() {
        let binder = binder();
        assert!(binder.mesh_enabled());

        let layers: Vec<(&str, Vec<&str>)> = binder
            .joint_bindings()
            .iter()
            .map(|b| (b.joint_node.as_str(), b.layer.iter().map(String::as_str).collect()))
            .collect();
        assert_eq!(
            layers,
            vec![
                ("ur_J00", vec!["base_link"]),
                ("ur_J01", vec!["shoulder", "shoulder_cover"]),
                ("ur_FLG", vec!["upper_arm"]),
            ]
        );
    }

    #[test]
    fn test_zero_state_fragment_poses() {
        let mut binder = binder();
        let frame = binder.bind(&[0.0, 0.0]).unwrap();

        // Link 0 is anchored to the mesh root: 0.02 m up becomes 20 mm on Z
        let base = pose_of(&frame, "motion/mesh/links/link_0/mesh/base_link");
        assert_relative_eq!(base[(2, 3)], 20.0, epsilon = 1e-9);

        // Shoulder sits 50 mm below J01, which is frame[1] at z = 100
        let shoulder = pose_of(&frame, "motion/mesh/links/link_1/mesh/shoulder");
        assert_relative_eq!(shoulder[(0, 3)], 0.0, epsilon = 1e-9);
        assert_relative_eq!(shoulder[(2, 3)], 50.0, epsilon = 1e-9);

        // Descendants share the correction of their boundary node
        let cover = pose_of(&frame, "motion/mesh/links/link_1/mesh/shoulder_cover");
        assert_relative_eq!(*cover, *shoulder, epsilon = 1e-12);
    }

    #[test]
    fn test_fragments_follow_joint_motion() {
        let mut binder = binder();
        let frame = binder.bind(&[0.0, FRAC_PI_2]).unwrap();

        // upper_arm pivots about joint 2, which sits at J01 (0, 0, 100)
        let arm = pose_of(&frame, "motion/mesh/links/link_2/mesh/upper_arm");
        assert_relative_eq!(arm[(0, 3)], 0.0, epsilon = 1e-9);
        assert_relative_eq!(arm[(1, 3)], 0.0, epsilon = 1e-9);
        assert_relative_eq!(arm[(2, 3)], 100.0, epsilon = 1e-9);

        // and its X axis swings onto +Y with the joint
        assert_relative_eq!(arm[(0, 0)], 0.0, epsilon = 1e-9);
        assert_relative_eq!(arm[(1, 0)], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_registration_is_idempotent() {
        let mut binder = binder();

        let first = binder.bind(&[0.0, 0.0]).unwrap();
        let cached = binder.cache().len();
        assert_eq!(first.registrations.len(), 4);
        assert_eq!(cached, 4);

        let second = binder.bind(&[0.3, -0.2]).unwrap();
        assert!(second.registrations.is_empty());
        assert_eq!(binder.cache().len(), cached);
        assert_eq!(second.poses.len(), first.poses.len());
        assert_ne!(second.poses, first.poses);
    }

    #[test]
    fn test_mesh_registration_scales_and_lifts_colors() {
        let mut binder = binder();
        let frame = binder.bind(&[0.0, 0.0]).unwrap();
        let registration = &frame.registrations[0];
        match &registration.geometry {
            RenderableGeometry::Mesh(mesh) => {
                assert_relative_eq!(mesh.vertices[1][0], 100.0, epsilon = 1e-4);
                assert_eq!(mesh.vertex_colors.as_ref().unwrap()[0], [180, 180, 180, 255]);

                // The asset carries no normals; the face normal is filled in
                let normals = mesh.normals.as_ref().unwrap();
                assert_eq!(normals.len(), 3);
                for n in normals {
                    assert_relative_eq!(n[2], 1.0, epsilon = 1e-6);
                }
            }
            other => panic!("expected mesh, got {:?}", other),
        }
    }

    #[test]
    fn test_failed_geometry_is_reported_once() {
        let mut binder = JointMeshBinder::new(chain(), VisualizerConfig::default())
            .with_tcp_geometries(vec![
                CollisionGeometry {
                    shape: Shape::Sphere { radius: -1.0 },
                    init_pose: Pose::identity(),
                },
                CollisionGeometry {
                    shape: Shape::Sphere { radius: 10.0 },
                    init_pose: Pose::identity(),
                },
            ]);

        let mut diagnostics = Vec::new();
        for i in 0..50 {
            let frame = binder.bind(&[0.0, i as f64 * 0.01]).unwrap();
            assert_eq!(frame.poses.len(), 1);
            assert_eq!(frame.poses[0].path, "motion/collision/tcp/geometry_1");
            diagnostics.extend(frame.diagnostics);
        }

        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].entity, "motion/collision/tcp/geometry_0");
        assert!(binder.cache().has_failed("motion/collision/tcp/geometry_0"));
        assert_eq!(binder.cache().len(), 1);
    }

    #[test]
    fn test_bound_frame_carries_kinematic_frames() {
        let mut binder = binder();
        let frame = binder.bind(&[0.0, FRAC_PI_2]).unwrap();
        assert_eq!(frame.frames, chain().forward(&[0.0, FRAC_PI_2]).unwrap());
    }

    #[test]
    fn test_no_mesh_mode() {
        let mut binder = JointMeshBinder::new(chain(), VisualizerConfig::default())
            .with_mesh_result(Err(CellviewError::mesh_load("truncated file")))
            .with_tcp_geometries(vec![CollisionGeometry {
                shape: Shape::Sphere { radius: 10.0 },
                init_pose: Pose::identity(),
            }]);
        assert!(!binder.mesh_enabled());

        let frame = binder.bind(&[0.0, 0.0]).unwrap();
        assert_eq!(frame.diagnostics.len(), 1);
        assert_eq!(frame.diagnostics[0].entity, "motion/mesh");
        assert_eq!(frame.poses.len(), 1);
        assert_eq!(frame.poses[0].path, "motion/collision/tcp/geometry_0");

        let frame = binder.bind(&[0.0, 0.0]).unwrap();
        assert!(frame.diagnostics.is_empty());
    }

    #[test]
    fn test_scene_without_joints_degrades() {
        let description = SceneGraphDescription {
            root: "r".to_string(),
            edges: vec![edge("r", "plain", Transform::identity(), None)],
            geometries: HashMap::new(),
        };
        let binder = JointMeshBinder::new(chain(), VisualizerConfig::default())
            .with_scene(MeshSceneGraph::from_description(&description).unwrap());
        assert!(!binder.mesh_enabled());
    }

    #[test]
    fn test_collision_primitives_use_link_and_tcp_frames() {
        let capsule = CollisionGeometry {
            shape: Shape::Capsule { radius: 20.0, cylinder_height: 80.0 },
            init_pose: Pose::from_rotation_vector([0.0, 0.0, 10.0], [0.0, 0.0, 0.0]),
        };
        let mut binder = JointMeshBinder::new(chain(), VisualizerConfig::default())
            .with_link_geometries(vec![
                LinkCollisionGeometry { link_index: 1, geometry: capsule.clone() },
                LinkCollisionGeometry { link_index: 9, geometry: capsule.clone() },
            ])
            .with_tcp_geometries(vec![capsule]);

        let frame = binder.bind(&[0.0, FRAC_PI_2]).unwrap();
        assert_eq!(frame.diagnostics.len(), 1);

        let link = pose_of(&frame, "motion/collision/links/link_1/geometry_0");
        assert_relative_eq!(link[(2, 3)], 110.0, epsilon = 1e-9);

        let tcp = pose_of(&frame, "motion/collision/tcp/geometry_0");
        assert_relative_eq!(tcp[(1, 3)], 200.0, epsilon = 1e-9);
        assert_relative_eq!(tcp[(2, 3)], 110.0, epsilon = 1e-9);

        assert!(frame.registrations.iter().all(|r| matches!(
            &r.geometry,
            RenderableGeometry::Mesh(m) if m.albedo == Some([255, 255, 255])
        )));
    }

    #[test]
    fn test_static_mode_shrinks_capsules() {
        let config = VisualizerConfig {
            static_transform: true,
            ..VisualizerConfig::default()
        };
        let shape = Shape::Capsule { radius: 100.0, cylinder_height: 0.0 };
        let extractor = HullExtractor::default();
        let geometry = primitive_renderable(&shape, &config, &extractor).unwrap();
        let RenderableGeometry::Mesh(mesh) = geometry else {
            panic!("capsules render as meshes");
        };
        let max_z = mesh.vertices.iter().map(|v| v[2]).fold(f32::MIN, f32::max);
        assert_relative_eq!(max_z, 99.0, epsilon = 1e-3);
    }

    #[test]
    fn test_dimension_mismatch_is_returned() {
        let mut binder = binder();
        let err = binder.bind(&[0.0]).unwrap_err();
        assert_eq!(err, CellviewError::DimensionMismatch { expected: 2, actual: 1 });
        assert!(binder.cache().is_empty());
    }
}
