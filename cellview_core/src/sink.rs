//! Output boundary towards a visualization backend.
//!
//! The compiler only talks to [`VisualizationSink`]. [`RecordingBuffer`]
//! keeps every record in memory (tests, JSON export); the Rerun-backed sink
//! lives in `visualization` behind the `visualization` feature.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::pose::AxisAngle;
use crate::shapes::RenderableGeometry;

/// Severity of a text record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextLevel {
    Info,
    Warn,
}

/// A visualization backend.
///
/// Static records (`log_geometry`, `log_static_pose`, `log_polylines`) are
/// timeless. Column records carry one value per entry of `times`.
pub trait VisualizationSink {
    /// Registers raw geometry for an entity path.
    fn log_geometry(&mut self, path: &str, geometry: &RenderableGeometry) -> Result<()>;

    /// Logs a single timeless pose.
    fn log_static_pose(
        &mut self,
        path: &str,
        translation: [f64; 3],
        rotation: AxisAngle,
    ) -> Result<()>;

    /// Sends one pose per timestamp.
    fn send_pose_columns(
        &mut self,
        timeline: &str,
        times: &[f64],
        path: &str,
        translations: &[[f64; 3]],
        rotations: &[AxisAngle],
    ) -> Result<()>;

    /// Sends one scalar per timestamp.
    fn send_scalar_columns(
        &mut self,
        timeline: &str,
        times: &[f64],
        path: &str,
        values: &[f64],
    ) -> Result<()>;

    /// Sends one polyline per timestamp.
    fn send_polyline_columns(
        &mut self,
        timeline: &str,
        times: &[f64],
        path: &str,
        polylines: &[Vec<[f64; 3]>],
    ) -> Result<()>;

    /// Logs timeless line strips.
    fn log_polylines(
        &mut self,
        path: &str,
        strips: &[Vec<[f64; 3]>],
        color: Option<[u8; 4]>,
    ) -> Result<()>;

    fn log_text(&mut self, path: &str, level: TextLevel, text: &str) -> Result<()>;
}

/// One record as received by a [`RecordingBuffer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum SinkRecord {
    Geometry {
        path: String,
        geometry: RenderableGeometry,
    },
    StaticPose {
        path: String,
        translation: [f64; 3],
        rotation: AxisAngle,
    },
    PoseColumns {
        path: String,
        timeline: String,
        times: Vec<f64>,
        translations: Vec<[f64; 3]>,
        rotations: Vec<AxisAngle>,
    },
    ScalarColumns {
        path: String,
        timeline: String,
        times: Vec<f64>,
        values: Vec<f64>,
    },
    PolylineColumns {
        path: String,
        timeline: String,
        times: Vec<f64>,
        polylines: Vec<Vec<[f64; 3]>>,
    },
    Polylines {
        path: String,
        strips: Vec<Vec<[f64; 3]>>,
        color: Option<[u8; 4]>,
    },
    Text {
        path: String,
        level: TextLevel,
        text: String,
    },
}

impl SinkRecord {
    pub fn path(&self) -> &str {
        match self {
            SinkRecord::Geometry { path, .. }
            | SinkRecord::StaticPose { path, .. }
            | SinkRecord::PoseColumns { path, .. }
            | SinkRecord::ScalarColumns { path, .. }
            | SinkRecord::PolylineColumns { path, .. }
            | SinkRecord::Polylines { path, .. }
            | SinkRecord::Text { path, .. } => path,
        }
    }
}

/// In-memory sink.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordingBuffer {
    records: Vec<SinkRecord>,
}

impl RecordingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[SinkRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<SinkRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of geometry registrations for `path`.
    pub fn geometry_count(&self, path: &str) -> usize {
        self.records
            .iter()
            .filter(|r| matches!(r, SinkRecord::Geometry { .. }) && r.path() == path)
            .count()
    }

    /// Records addressed to `path`, in arrival order.
    pub fn records_for<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a SinkRecord> + 'a {
        self.records.iter().filter(move |r| r.path() == path)
    }
}

impl VisualizationSink for RecordingBuffer {
    fn log_geometry(&mut self, path: &str, geometry: &RenderableGeometry) -> Result<()> {
        self.records.push(SinkRecord::Geometry {
            path: path.to_string(),
            geometry: geometry.clone(),
        });
        Ok(())
    }

    fn log_static_pose(
        &mut self,
        path: &str,
        translation: [f64; 3],
        rotation: AxisAngle,
    ) -> Result<()> {
        self.records.push(SinkRecord::StaticPose {
            path: path.to_string(),
            translation,
            rotation,
        });
        Ok(())
    }

    fn send_pose_columns(
        &mut self,
        timeline: &str,
        times: &[f64],
        path: &str,
        translations: &[[f64; 3]],
        rotations: &[AxisAngle],
    ) -> Result<()> {
        self.records.push(SinkRecord::PoseColumns {
            path: path.to_string(),
            timeline: timeline.to_string(),
            times: times.to_vec(),
            translations: translations.to_vec(),
            rotations: rotations.to_vec(),
        });
        Ok(())
    }

    fn send_scalar_columns(
        &mut self,
        timeline: &str,
        times: &[f64],
        path: &str,
        values: &[f64],
    ) -> Result<()> {
        self.records.push(SinkRecord::ScalarColumns {
            path: path.to_string(),
            timeline: timeline.to_string(),
            times: times.to_vec(),
            values: values.to_vec(),
        });
        Ok(())
    }

    fn send_polyline_columns(
        &mut self,
        timeline: &str,
        times: &[f64],
        path: &str,
        polylines: &[Vec<[f64; 3]>],
    ) -> Result<()> {
        self.records.push(SinkRecord::PolylineColumns {
            path: path.to_string(),
            timeline: timeline.to_string(),
            times: times.to_vec(),
            polylines: polylines.to_vec(),
        });
        Ok(())
    }

    fn log_polylines(
        &mut self,
        path: &str,
        strips: &[Vec<[f64; 3]>],
        color: Option<[u8; 4]>,
    ) -> Result<()> {
        self.records.push(SinkRecord::Polylines {
            path: path.to_string(),
            strips: strips.to_vec(),
            color,
        });
        Ok(())
    }

    fn log_text(&mut self, path: &str, level: TextLevel, text: &str) -> Result<()> {
        self.records.push(SinkRecord::Text {
            path: path.to_string(),
            level,
            text: text.to_string(),
        });
        Ok(())
    }
}
