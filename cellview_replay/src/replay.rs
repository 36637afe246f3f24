//! Replays one cell description into a visualization sink.

use cellview_core::stream::{self, LOG_PATH};
use cellview_core::sink::TextLevel;
use cellview_core::{
    emit, CollisionScene, Diagnostic, JointMeshBinder, KinematicChain, Timeline, TimingMode,
    TrajectoryStreamCompiler, VisualizationSink, VisualizerConfig,
};
use tracing::info;

use crate::input::{CellDescription, ReplayError};

/// How trajectories are laid out on the timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplayOptions {
    pub timing: TimingMode,
    pub time_offset: f64,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            timing: TimingMode::Continue,
            time_offset: 0.0,
        }
    }
}

/// Outcome of a replay.
#[derive(Debug, Clone, Default)]
pub struct ReplaySummary {
    pub trajectories: usize,
    pub samples: usize,
    pub end_time: f64,
    pub diagnostics: Vec<Diagnostic>,
}

/// Emits the static cell geometry, then every trajectory.
///
/// Only a missing DH table and sink failures are fatal.
pub fn run(
    cell: &CellDescription,
    config: VisualizerConfig,
    options: &ReplayOptions,
    sink: &mut dyn VisualizationSink,
) -> Result<ReplaySummary, ReplayError> {
    let chain = KinematicChain::new(cell.dh_parameters.clone(), &cell.mounting)?;
    let base = config.base_path().to_string();
    let mut summary = ReplaySummary::default();

    let mut binder = JointMeshBinder::new(chain, config.clone())
        .with_link_geometries(cell.link_geometries.clone())
        .with_tcp_geometries(cell.tcp_geometries.clone());
    if let Some(scene) = cell.scene_graph() {
        binder = binder.with_mesh_result(scene);
    }

    let mut scene = CollisionScene::new();
    scene.add_colliders(&cell.colliders, binder.extractor(), &config.hull);
    let zones = &cell.safety_zones;
    scene.add_safety_zones(&base, zones, &cell.mounting, binder.extractor(), &config.hull);
    scene.emit(sink)?;
    for diagnostic in &scene.diagnostics {
        sink.log_text(LOG_PATH, TextLevel::Warn, &diagnostic.to_string())?;
    }
    summary.diagnostics.extend(scene.diagnostics);

    let mut compiler = TrajectoryStreamCompiler::new(binder);
    let mut timeline = Timeline::new();

    for (i, samples) in cell.trajectories.iter().enumerate() {
        let offset = timeline.place(options.timing, options.time_offset, stream::duration(samples));
        let compiled = compiler.compile(samples, offset);
        info!("Trajectory {} placed at {:.3}s ({} samples)", i, offset, compiled.times.len());

        emit(&compiled, sink)?;
        summary.trajectories += 1;
        summary.samples += compiled.times.len();
        summary.diagnostics.extend(compiled.diagnostics);
    }

    summary.end_time = timeline.end();
    Ok(summary)
}
