//! CellView replay CLI
//!
//! Replays recorded robot trajectories into a Rerun viewer or a JSON export.

use cellview_core::{RecordingBuffer, TimingMode, VisualizerConfig};
use cellview_replay::{
    load_config, run, CellDescription, ReplayExport, ReplayOptions, ReplaySummary,
};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Timing {
    Reset,
    Continue,
    Sync,
    Override,
}

impl From<Timing> for TimingMode {
    fn from(timing: Timing) -> Self {
        match timing {
            Timing::Reset => TimingMode::Reset,
            Timing::Continue => TimingMode::Continue,
            Timing::Sync => TimingMode::Sync,
            Timing::Override => TimingMode::Override,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "cellview-replay")]
#[command(about = "Replay recorded robot trajectories for visualization", long_about = None)]
struct Args {
    /// Cell description (JSON)
    input: PathBuf,

    /// Visualizer configuration (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Entity path prefix, overrides the configuration
    #[arg(short, long)]
    base_entity_path: Option<String>,

    /// How trajectories are placed on the timeline
    #[arg(long, value_enum, default_value = "continue")]
    timing: Timing,

    /// Offset in seconds added by the timing mode
    #[arg(long, default_value = "0")]
    time_offset: f64,

    /// Export all sink records to a JSON file
    #[arg(long)]
    export: Option<String>,

    /// Stream to a spawned Rerun viewer (requires the `visualization` feature)
    #[arg(long, conflicts_with = "export")]
    spawn: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn report(summary: &ReplaySummary) {
    info!(
        "Replayed {} trajectories, {} samples, timeline ends at {:.3}s",
        summary.trajectories, summary.samples, summary.end_time
    );
    for diagnostic in &summary.diagnostics {
        warn!("{}", diagnostic);
    }
}

#[cfg(feature = "visualization")]
fn replay_to_viewer(
    cell: &CellDescription,
    config: VisualizerConfig,
    options: &ReplayOptions,
) -> Result<ReplaySummary, Box<dyn std::error::Error>> {
    let mut sink = cellview_core::RerunSink::spawn("cellview_replay")?;
    Ok(run(cell, config, options, &mut sink)?)
}

#[cfg(not(feature = "visualization"))]
fn replay_to_viewer(
    cell: &CellDescription,
    config: VisualizerConfig,
    options: &ReplayOptions,
) -> Result<ReplaySummary, Box<dyn std::error::Error>> {
    warn!(
        "Rerun visualization not available (compile with --features visualization), \
         recording in memory"
    );
    let mut buffer = RecordingBuffer::new();
    Ok(run(cell, config, options, &mut buffer)?)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => VisualizerConfig::default(),
    };
    if let Some(base) = &args.base_entity_path {
        config = config.with_base_entity_path(base.clone());
    }

    let cell = CellDescription::load(&args.input).map_err(|e| {
        error!("{}", e);
        e
    })?;
    info!(
        "Loaded {} ({} joints, {} trajectories, {} samples)",
        args.input.display(),
        cell.dh_parameters.len(),
        cell.trajectories.len(),
        cell.sample_count()
    );

    let options = ReplayOptions {
        timing: args.timing.into(),
        time_offset: args.time_offset,
    };

    if args.spawn {
        let summary = replay_to_viewer(&cell, config, &options)?;
        report(&summary);
        return Ok(());
    }

    let mut buffer = RecordingBuffer::new();
    let summary = run(&cell, config.clone(), &options, &mut buffer)?;
    report(&summary);

    if let Some(export_path) = &args.export {
        let mut export = ReplayExport::new(config.base_path(), &config.timeline);
        export.trajectories = summary.trajectories;
        export.samples = summary.samples;
        export.duration_sec = summary.end_time;
        export.diagnostics = summary.diagnostics;
        export.records = buffer.into_records();
        export.write_to_file(export_path)?;
        info!("Exported {} records to {}", export.records.len(), export_path);
    }

    Ok(())
}
