//! Rerun-backed visualization sink.
//!
//! Poses go out through `send_columns` (one Transform3D row per sample on a
//! duration timeline); geometry and outlines are logged static. Diagnostics
//! are regular rows so every one of them stays visible in the text log.
//!
//! Enable with the `visualization` feature flag.

use rerun::{RecordingStream, RecordingStreamBuilder};

use crate::error::{CellviewError, Result};
use crate::pose::AxisAngle;
use crate::shapes::{RenderableGeometry, TriangleMesh};
use crate::sink::{TextLevel, VisualizationSink};

fn to_f32(p: &[f64; 3]) -> [f32; 3] {
    [p[0] as f32, p[1] as f32, p[2] as f32]
}

fn rotation(r: &AxisAngle) -> rerun::RotationAxisAngle {
    rerun::RotationAxisAngle::new(to_f32(&r.axis), rerun::Angle::from_radians(r.angle as f32))
}

fn strip(points: &[[f64; 3]]) -> Vec<[f32; 3]> {
    points.iter().map(to_f32).collect()
}

fn rgba(c: [u8; 4]) -> rerun::Color {
    rerun::Color::from_unmultiplied_rgba(c[0], c[1], c[2], c[3])
}

fn mesh3d(mesh: &TriangleMesh) -> rerun::Mesh3D {
    let mut archetype = rerun::Mesh3D::new(mesh.vertices.iter().copied())
        .with_triangle_indices(mesh.triangles.iter().copied());
    if let Some(normals) = &mesh.normals {
        archetype = archetype.with_vertex_normals(normals.iter().copied());
    }
    if let Some(colors) = &mesh.vertex_colors {
        archetype = archetype.with_vertex_colors(colors.iter().map(|c| rgba(*c)));
    }
    if let Some([r, g, b]) = mesh.albedo {
        archetype = archetype.with_albedo_factor(rerun::Color::from_rgb(r, g, b));
    }
    archetype
}

/// Sink that streams to a Rerun viewer or an `.rrd` file.
pub struct RerunSink {
    rec: RecordingStream,
}

impl RerunSink {
    /// Spawns a Rerun viewer and connects to it.
    pub fn spawn(app_id: &str) -> Result<Self> {
        let rec = RecordingStreamBuilder::new(app_id).spawn().map_err(CellviewError::sink)?;
        Self::from_stream(rec)
    }

    /// Writes the recording to a file (for sharing).
    pub fn save(app_id: &str, path: &str) -> Result<Self> {
        let rec = RecordingStreamBuilder::new(app_id).save(path).map_err(CellviewError::sink)?;
        Self::from_stream(rec)
    }

    fn from_stream(rec: RecordingStream) -> Result<Self> {
        rec.log_static("/", &rerun::ViewCoordinates::RIGHT_HAND_Z_UP())
            .map_err(CellviewError::sink)?;
        Ok(Self { rec })
    }

    fn time_column(timeline: &str, times: &[f64]) -> rerun::TimeColumn {
        rerun::TimeColumn::new_duration_secs(timeline, times.iter().copied())
    }
}

impl VisualizationSink for RerunSink {
    fn log_geometry(&mut self, path: &str, geometry: &RenderableGeometry) -> Result<()> {
        let result = match geometry {
            RenderableGeometry::Mesh(mesh) => self.rec.log_static(path, &mesh3d(mesh)),
            RenderableGeometry::Ellipsoid { half_sizes } => self.rec.log_static(
                path,
                &rerun::Ellipsoids3D::from_half_sizes([to_f32(half_sizes)])
                    .with_fill_mode(rerun::FillMode::Solid),
            ),
            RenderableGeometry::Box { half_sizes } => self.rec.log_static(
                path,
                &rerun::Boxes3D::from_half_sizes([to_f32(half_sizes)])
                    .with_fill_mode(rerun::FillMode::Solid),
            ),
            RenderableGeometry::Outlines { polygons } => self.rec.log_static(
                path,
                &rerun::LineStrips3D::new(polygons.iter().map(|p| {
                    p.closed_strip()
                        .iter()
                        .map(|q| [q.x as f32, q.y as f32, q.z as f32])
                        .collect::<Vec<_>>()
                })),
            ),
        };
        result.map_err(CellviewError::sink)
    }

    fn log_static_pose(
        &mut self,
        path: &str,
        translation: [f64; 3],
        rotation_aa: AxisAngle,
    ) -> Result<()> {
        let transform = rerun::Transform3D::from_translation_rotation(
            to_f32(&translation),
            rotation(&rotation_aa),
        );
        self.rec.log_static(path, &transform).map_err(CellviewError::sink)
    }

    fn send_pose_columns(
        &mut self,
        timeline: &str,
        times: &[f64],
        path: &str,
        translations: &[[f64; 3]],
        rotations: &[AxisAngle],
    ) -> Result<()> {
        let columns = rerun::Transform3D::update_fields()
            .with_many_translation(translations.iter().map(to_f32))
            .with_many_rotation_axis_angle(rotations.iter().map(rotation))
            .columns_of_unit_batches()
            .map_err(CellviewError::sink)?;

        self.rec
            .send_columns(path, [Self::time_column(timeline, times)], columns)
            .map_err(CellviewError::sink)
    }

    fn send_scalar_columns(
        &mut self,
        timeline: &str,
        times: &[f64],
        path: &str,
        values: &[f64],
    ) -> Result<()> {
        let columns = rerun::Scalars::new(values.iter().copied())
            .columns_of_unit_batches()
            .map_err(CellviewError::sink)?;

        self.rec
            .send_columns(path, [Self::time_column(timeline, times)], columns)
            .map_err(CellviewError::sink)
    }

    fn send_polyline_columns(
        &mut self,
        timeline: &str,
        times: &[f64],
        path: &str,
        polylines: &[Vec<[f64; 3]>],
    ) -> Result<()> {
        let columns = rerun::LineStrips3D::new(polylines.iter().map(|line| strip(line)))
            .columns_of_unit_batches()
            .map_err(CellviewError::sink)?;

        self.rec
            .send_columns(path, [Self::time_column(timeline, times)], columns)
            .map_err(CellviewError::sink)
    }

    fn log_polylines(
        &mut self,
        path: &str,
        strips: &[Vec<[f64; 3]>],
        color: Option<[u8; 4]>,
    ) -> Result<()> {
        let mut archetype = rerun::LineStrips3D::new(strips.iter().map(|line| strip(line)));
        if let Some(c) = color {
            archetype = archetype.with_colors([rgba(c)]);
        }
        self.rec.log_static(path, &archetype).map_err(CellviewError::sink)
    }

    fn log_text(&mut self, path: &str, level: TextLevel, text: &str) -> Result<()> {
        let level = match level {
            TextLevel::Info => rerun::TextLogLevel::INFO,
            TextLevel::Warn => rerun::TextLogLevel::WARN,
        };
        self.rec
            .log(path, &rerun::TextLog::new(text).with_level(level))
            .map_err(CellviewError::sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore] // Requires Rerun viewer
    fn test_sink_creation() {
        let sink = RerunSink::spawn("cellview_test");
        assert!(sink.is_ok());
    }

    #[test]
    fn test_every_diagnostic_is_kept() {
        let (rec, storage) = RecordingStreamBuilder::new("cellview_test").memory().unwrap();
        let mut sink = RerunSink::from_stream(rec).unwrap();
        sink.log_text("logs", TextLevel::Warn, "skipped motion/mesh").unwrap();
        sink.log_text("logs", TextLevel::Warn, "skipped motion/samples/3").unwrap();

        let logs = rerun::EntityPath::from("logs");
        let chunks: Vec<rerun::log::Chunk> = storage
            .take()
            .iter()
            .filter_map(|msg| match msg {
                rerun::log::LogMsg::ArrowMsg(_, arrow) => {
                    rerun::log::Chunk::from_arrow_msg(arrow).ok()
                }
                _ => None,
            })
            .filter(|chunk| chunk.entity_path() == &logs)
            .collect();

        assert_eq!(chunks.iter().map(|c| c.num_rows()).sum::<usize>(), 2);
        assert!(chunks.iter().all(|c| !c.is_static()));
    }
}
