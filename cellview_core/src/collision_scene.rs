//! Static cell geometry: colliders and safety zones.
//!
//! Both are logged once and never move. Spheres and boxes keep their
//! primitive form; every other shape becomes hull outlines in world space.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::HullConfig;
use crate::error::{Diagnostic, Result};
use crate::hull::{transform_polygons, HullExtractor, HullPolygon};
use crate::pose::{decompose, AxisAngle, Pose, Transform};
use crate::shapes::{RenderStyle, RenderableGeometry, Shape};
use crate::sink::VisualizationSink;

/// Line color of collider and zone outlines.
pub const COLLIDER_COLOR: [u8; 4] = [221, 193, 193, 255];

/// Entity path prefix of colliders.
pub const COLLIDER_PATH: &str = "colliders";

/// Obstacle placed in world space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collider {
    pub shape: Shape,

    #[serde(default)]
    pub pose: Pose,
}

/// Safety zone in the robot base frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyZone {
    pub id: i64,
    pub geometry: Shape,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StaticRecord {
    /// Primitive geometry with its world pose
    Primitive {
        path: String,
        geometry: RenderableGeometry,
        translation: [f64; 3],
        rotation: AxisAngle,
    },
    /// Hull outlines already in world space
    Outlines { path: String, polygons: Vec<HullPolygon> },
}

impl StaticRecord {
    pub fn path(&self) -> &str {
        match self {
            StaticRecord::Primitive { path, .. } | StaticRecord::Outlines { path, .. } => path,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CollisionScene {
    pub records: Vec<StaticRecord>,
    pub diagnostics: Vec<Diagnostic>,
}

impl CollisionScene {
    pub fn new() -> Self {
        Self::default()
    }

    fn skip(&mut self, path: &str, reason: impl std::fmt::Display) {
        warn!("Skipping {}: {}", path, reason);
        self.diagnostics.push(Diagnostic::new(path, reason));
    }

    fn outlines(
        &mut self,
        path: String,
        shape: &Shape,
        placement: &Transform,
        extractor: &HullExtractor,
        config: &HullConfig,
    ) {
        match shape.outlines(placement, extractor, config) {
            Ok(polygons) => self.records.push(StaticRecord::Outlines { path, polygons }),
            Err(e) => self.skip(&path, e),
        }
    }

    /// Adds colliders keyed by id under `colliders/{id}`.
    pub fn add_colliders(
        &mut self,
        colliders: &BTreeMap<String, Collider>,
        extractor: &HullExtractor,
        config: &HullConfig,
    ) {
        for (id, collider) in colliders {
            let path = format!("{}/{}", COLLIDER_PATH, id);
            let placement = collider.pose.to_matrix();

            match &collider.shape {
                Shape::Sphere { .. } | Shape::Box { .. } => {
                    match collider.shape.renderable(RenderStyle::Wireframe, extractor, config) {
                        Ok(geometry) => {
                            let (translation, rotation) = decompose(&placement);
                            self.records.push(StaticRecord::Primitive {
                                path,
                                geometry,
                                translation,
                                rotation,
                            });
                        }
                        Err(e) => self.skip(&path, e),
                    }
                }
                Shape::Capsule { .. } | Shape::ConvexHull { .. } | Shape::Compound { .. } => {
                    self.outlines(path, &collider.shape, &placement, extractor, config)
                }
            }
        }
        info!("Prepared {} collider records", self.records.len());
    }

    /// Adds safety zones under `{base}/zones/zone_{id}`, placed by the robot
    /// mounting.
    pub fn add_safety_zones(
        &mut self,
        base: &str,
        zones: &[SafetyZone],
        mounting: &Pose,
        extractor: &HullExtractor,
        config: &HullConfig,
    ) {
        let mounting = mounting.to_matrix();
        for zone in zones {
            let path = format!("{}/zones/zone_{}", base, zone.id);
            let before = self.records.len();
            self.outlines(path, &zone.geometry, &Transform::identity(), extractor, config);

            // Outlines are computed in the base frame, then moved as polygons
            if self.records.len() > before {
                if let Some(StaticRecord::Outlines { polygons, .. }) = self.records.last_mut() {
                    *polygons = transform_polygons(polygons, &mounting);
                }
            }
        }
    }

    /// Logs every record as static.
    pub fn emit(&self, sink: &mut dyn VisualizationSink) -> Result<()> {
        for record in &self.records {
            match record {
                StaticRecord::Primitive {
                    path,
                    geometry,
                    translation,
                    rotation,
                } => {
                    sink.log_geometry(path, geometry)?;
                    sink.log_static_pose(path, *translation, *rotation)?;
                }
                StaticRecord::Outlines { path, polygons } => {
                    let strips: Vec<Vec<[f64; 3]>> = polygons
                        .iter()
                        .map(|p| p.closed_strip().iter().map(|q| [q.x, q.y, q.z]).collect())
                        .collect();
                    sink.log_polylines(path, &strips, Some(COLLIDER_COLOR))?;
                }
            }
        }
        Ok(())
    }
}
