//! JSON exporter for replay output.
//!
//! Writes every sink record of a replay so it can be inspected or fed to a
//! viewer later without re-running the kinematics.

use cellview_core::{Diagnostic, SinkRecord};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;

/// Complete replay export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayExport {
    /// Entity path prefix of the robot
    pub base_entity_path: String,

    /// Time column name
    pub timeline: String,

    pub trajectories: usize,

    /// Accepted samples over all trajectories
    pub samples: usize,

    /// End of the last placed trajectory in seconds
    pub duration_sec: f64,

    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub diagnostics: Vec<Diagnostic>,

    /// Sink records in emission order
    pub records: Vec<SinkRecord>,
}

impl ReplayExport {
    /// Creates a new export container.
    pub fn new(base_entity_path: &str, timeline: &str) -> Self {
        Self {
            base_entity_path: base_entity_path.to_string(),
            timeline: timeline.to_string(),
            trajectories: 0,
            samples: 0,
            duration_sec: 0.0,
            diagnostics: Vec::new(),
            records: Vec::new(),
        }
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellview_core::sink::TextLevel;

    #[test]
    fn test_write_and_read_back() {
        let mut export = ReplayExport::new("motion", "time_interval_0.016");
        export.samples = 3;
        export.records.push(SinkRecord::Text {
            path: "logs".to_string(),
            level: TextLevel::Warn,
            text: "skipped motion/mesh: no joint nodes discovered".to_string(),
        });

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        export.write_to_file(path.to_str().unwrap()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let back: ReplayExport = serde_json::from_str(&text).unwrap();
        assert_eq!(back.samples, 3);
        assert_eq!(back.records, export.records);
        assert!(!text.contains("\"diagnostics\""));
    }
}
