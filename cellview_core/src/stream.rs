//! Column-batched pose streams for one trajectory.
//!
//! Samples are processed strictly in order: geometry registrations from the
//! binder come first, every rendered entity then gets one translation and
//! one axis-angle rotation per accepted sample, parallel to a shared time
//! column.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::binder::{GeometryRegistration, JointMeshBinder};
use crate::error::{Diagnostic, Result};
use crate::kinematics;
use crate::pose::{decompose, AxisAngle, Pose};
use crate::sink::{TextLevel, VisualizationSink};

/// Entity path of text diagnostics.
pub const LOG_PATH: &str = "logs";

/// One timestamped joint state. Time in seconds from trajectory start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectorySample {
    pub time: f64,
    pub joint_position: Vec<f64>,

    /// Flange pose reported with the sample (mm, rotation vector)
    #[serde(default)]
    pub tcp_pose: Option<Pose>,

    #[serde(default)]
    pub joint_velocity: Option<Vec<f64>>,

    #[serde(default)]
    pub joint_acceleration: Option<Vec<f64>>,
}

/// Highest sample time, used as the trajectory duration.
pub fn duration(samples: &[TrajectorySample]) -> f64 {
    samples.iter().map(|s| s.time).fold(0.0, f64::max)
}

// ============================================================================
// TIMING
// ============================================================================

/// How a new trajectory is placed on the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimingMode {
    /// Start at the requested offset
    Reset,
    /// Start where the previous trajectory ended
    #[default]
    Continue,
    /// Start together with the previous trajectory
    Sync,
    /// Start at the requested offset and forget earlier trajectories
    Override,
}

/// Start and end markers of the trajectories placed so far.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Timeline {
    last_start: f64,
    end: f64,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the time offset for a trajectory of `duration` seconds and
    /// advances the markers.
    pub fn place(&mut self, mode: TimingMode, requested_offset: f64, duration: f64) -> f64 {
        let offset = match mode {
            TimingMode::Reset | TimingMode::Override => requested_offset,
            TimingMode::Continue => self.end + requested_offset,
            TimingMode::Sync => self.last_start + requested_offset,
        };

        self.end = match mode {
            TimingMode::Override => offset + duration,
            _ => self.end.max(offset + duration),
        };
        self.last_start = offset;
        offset
    }

    pub fn end(&self) -> f64 {
        self.end
    }
}

// ============================================================================
// COMPILED OUTPUT
// ============================================================================

/// Per-entity pose columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityStream {
    pub path: String,
    pub translations: Vec<[f64; 3]>,
    pub rotations: Vec<AxisAngle>,
}

impl EntityStream {
    fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            translations: Vec::new(),
            rotations: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.translations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.translations.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarStream {
    pub path: String,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolylineStream {
    pub path: String,
    pub polylines: Vec<Vec<[f64; 3]>>,
}

/// Everything one trajectory produces, ready for [`emit`].
///
/// Every column has exactly `times.len()` entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompiledTrajectory {
    pub timeline: String,
    pub times: Vec<f64>,

    /// Log every pose stream as a single static pose (last sample)
    pub static_poses: bool,

    pub registrations: Vec<GeometryRegistration>,
    pub streams: Vec<EntityStream>,

    /// Kinematic skeleton per sample
    pub skeleton: Option<PolylineStream>,

    /// Reported TCP pose per sample
    pub tcp: Option<EntityStream>,

    pub scalars: Vec<ScalarStream>,

    /// Whole TCP path as one static polyline
    pub trajectory: Option<(String, Vec<[f64; 3]>)>,

    pub diagnostics: Vec<Diagnostic>,
}

impl CompiledTrajectory {
    pub fn stream(&self, path: &str) -> Option<&EntityStream> {
        self.streams.iter().find(|s| s.path == path)
    }

    pub fn scalar(&self, path: &str) -> Option<&ScalarStream> {
        self.scalars.iter().find(|s| s.path == path)
    }
}

// ============================================================================
// COMPILER
// ============================================================================

/// Turns joint-state samples into column-oriented entity streams for one
/// robot instance.
pub struct TrajectoryStreamCompiler {
    binder: JointMeshBinder,
}

/// Scalar series keyed by path, in first-seen order.
#[derive(Default)]
struct ScalarColumns {
    order: Vec<String>,
    values: HashMap<String, Vec<f64>>,
}

impl ScalarColumns {
    fn push(&mut self, path: String, value: f64) {
        if !self.values.contains_key(&path) {
            self.order.push(path.clone());
        }
        self.values.entry(path).or_default().push(value);
    }

    fn into_streams(mut self, expected: usize) -> Vec<ScalarStream> {
        self.order
            .into_iter()
            .filter_map(|path| {
                let values = self.values.remove(&path)?;
                if values.len() != expected {
                    let got = values.len();
                    debug!("Dropping partial scalar series {} ({}/{})", path, got, expected);
                    return None;
                }
                Some(ScalarStream { path, values })
            })
            .collect()
    }
}

impl TrajectoryStreamCompiler {
    pub fn new(binder: JointMeshBinder) -> Self {
        Self { binder }
    }

    pub fn binder(&self) -> &JointMeshBinder {
        &self.binder
    }

    /// Compiles samples whose times are shifted by `time_offset`.
    ///
    /// A sample whose joint count does not match the chain is dropped with
    /// a diagnostic; the remaining samples still form parallel columns.
    pub fn compile(
        &mut self,
        samples: &[TrajectorySample],
        time_offset: f64,
    ) -> CompiledTrajectory {
        let config = self.binder.config().clone();
        let base = config.base_path().to_string();

        let mut compiled = CompiledTrajectory {
            timeline: config.timeline.clone(),
            static_poses: config.static_transform,
            ..CompiledTrajectory::default()
        };

        let mut stream_index: HashMap<String, usize> = HashMap::new();
        let mut skeleton = Vec::with_capacity(samples.len());
        let mut tcp = EntityStream::new(format!("{}/tcp_position", base));
        let mut path_points = Vec::with_capacity(samples.len());
        let mut scalars = ScalarColumns::default();

        for (i, sample) in samples.iter().enumerate() {
            let frame = match self.binder.bind(&sample.joint_position) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("Dropping sample {} at t={:.3}s: {}", i, sample.time, e);
                    compiled
                        .diagnostics
                        .push(Diagnostic::new(format!("{}/samples/{}", base, i), e));
                    continue;
                }
            };

            compiled.times.push(time_offset + sample.time);
            compiled.registrations.extend(frame.registrations);
            compiled.diagnostics.extend(frame.diagnostics);

            for entity in frame.poses {
                let idx = *stream_index.entry(entity.path.clone()).or_insert_with(|| {
                    compiled.streams.push(EntityStream::new(entity.path.clone()));
                    compiled.streams.len() - 1
                });
                let (translation, rotation) = decompose(&entity.transform);
                compiled.streams[idx].translations.push(translation);
                compiled.streams[idx].rotations.push(rotation);
            }

            let joints = kinematics::frame_origins(&frame.frames);
            if let Some(flange) = joints.last() {
                if sample.tcp_pose.is_none() {
                    path_points.push([flange.x, flange.y, flange.z]);
                }
            }
            skeleton.push(joints.iter().map(|p| [p.x, p.y, p.z]).collect::<Vec<_>>());

            if let Some(tcp_pose) = &sample.tcp_pose {
                let (translation, rotation) = decompose(&tcp_pose.to_matrix());
                tcp.translations.push(translation);
                tcp.rotations.push(rotation);
                path_points.push(translation);
            }

            for (n, value) in sample.joint_position.iter().enumerate() {
                scalars.push(format!("{}/joint_position_{}", base, n + 1), *value);
            }
            for (kind, values) in [
                ("velocity", &sample.joint_velocity),
                ("acceleration", &sample.joint_acceleration),
            ] {
                for (n, value) in values.iter().flatten().enumerate() {
                    scalars.push(format!("{}/joint_{}_{}", base, kind, n + 1), *value);
                }
            }
        }

        let expected = compiled.times.len();
        compiled.streams.retain(|stream| {
            let aligned = stream.len() == expected;
            if !aligned {
                warn!("Dropping misaligned stream {} ({}/{})", stream.path, stream.len(), expected);
            }
            aligned
        });

        if expected > 0 {
            compiled.skeleton = Some(PolylineStream {
                path: format!("{}/dh_parameters", base),
                polylines: skeleton,
            });
            // Mixed samples (some with TCP pose, some without) keep the path but no TCP stream
            if tcp.len() == expected {
                compiled.tcp = Some(tcp);
            }
            compiled.trajectory = Some((format!("{}/trajectory", base), path_points));
        }
        compiled.scalars = scalars.into_streams(expected);

        info!(
            "Compiled {} samples into {} entity streams ({} registrations, {} diagnostics)",
            expected,
            compiled.streams.len(),
            compiled.registrations.len(),
            compiled.diagnostics.len()
        );
        compiled
    }
}

/// Sends a compiled trajectory to a sink: registrations and diagnostics
/// first, then the columns.
pub fn emit(compiled: &CompiledTrajectory, sink: &mut dyn VisualizationSink) -> Result<()> {
    for registration in &compiled.registrations {
        sink.log_geometry(&registration.path, &registration.geometry)?;
    }
    for diagnostic in &compiled.diagnostics {
        sink.log_text(LOG_PATH, TextLevel::Warn, &diagnostic.to_string())?;
    }

    if compiled.times.is_empty() {
        return Ok(());
    }

    let timeline = compiled.timeline.as_str();
    let times = compiled.times.as_slice();

    for stream in compiled.streams.iter().chain(compiled.tcp.iter()) {
        if compiled.static_poses {
            let last = stream.translations.last().zip(stream.rotations.last());
            if let Some((translation, rotation)) = last {
                sink.log_static_pose(&stream.path, *translation, *rotation)?;
            }
        } else {
            let (translations, rotations) = (&stream.translations, &stream.rotations);
            sink.send_pose_columns(timeline, times, &stream.path, translations, rotations)?;
        }
    }

    if let Some(skeleton) = &compiled.skeleton {
        sink.send_polyline_columns(timeline, times, &skeleton.path, &skeleton.polylines)?;
    }
    for scalar in &compiled.scalars {
        sink.send_scalar_columns(timeline, times, &scalar.path, &scalar.values)?;
    }
    if let Some((path, points)) = &compiled.trajectory {
        sink.log_polylines(path, std::slice::from_ref(points), Some([255, 255, 255, 255]))?;
    }

    Ok(())
}
