//! Visualizer configuration.

use serde::{Deserialize, Serialize};

/// Tessellation and tolerance settings for hull-derived geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HullConfig {
    /// Relative tolerance for coplanar facet merging and vertex welding
    pub coplanar_tolerance: f64,

    /// Longitudinal segments of a sampled sphere
    pub sphere_segments: usize,

    /// Longitudinal segments of a sampled capsule
    pub capsule_segments: usize,
}

impl Default for HullConfig {
    fn default() -> Self {
        Self {
            coplanar_tolerance: 1e-6,
            sphere_segments: 16,
            capsule_segments: 12,
        }
    }
}

/// Settings for one robot visualizer instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualizerConfig {
    /// Entity path prefix, e.g. the motion group name
    pub base_entity_path: String,

    /// Mesh length unit → kinematic length unit (meters → millimeters)
    pub mesh_unit_scale: f64,

    /// Gamma applied to mesh vertex colors at registration (< 1 brightens)
    pub color_gamma: f64,

    /// Color of primitive collision geometry
    pub albedo: [u8; 3],

    /// Log poses as static instead of on the timeline
    pub static_transform: bool,

    /// Capsule shrink factor for static poses (avoids z-fighting with meshes)
    pub static_shrink: f64,

    /// Rotate mesh layers by the DH theta offset of their link
    pub align_dh_theta_offset: bool,

    /// Name of the time column
    pub timeline: String,

    pub hull: HullConfig,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            base_entity_path: "motion".to_string(),
            mesh_unit_scale: 1000.0,
            color_gamma: 0.5,
            albedo: [255, 255, 255],
            static_transform: false,
            static_shrink: 0.99,
            align_dh_theta_offset: true,
            timeline: "time_interval_0.016".to_string(),
            hull: HullConfig::default(),
        }
    }
}

impl VisualizerConfig {
    /// Base path without trailing separators.
    pub fn base_path(&self) -> &str {
        self.base_entity_path.trim_end_matches('/')
    }

    pub fn with_base_entity_path(mut self, path: impl Into<String>) -> Self {
        self.base_entity_path = path.into();
        self
    }
}
