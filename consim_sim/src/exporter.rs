//! JSON export of simulation runs for offline inspection.

use consim_core::{GlobalStats, Snapshot};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;

/// One recorded tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimFrame {
    pub tick: u64,
    pub time_sec: f64,
    pub lambdas: Vec<f64>,
    pub stats: GlobalStats,
    pub nodes: Vec<NodePosition>,
}

impl SimFrame {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        Self {
            tick: snapshot.tick,
            time_sec: snapshot.time,
            lambdas: snapshot.lambdas.clone(),
            stats: snapshot.global_stats.clone(),
            nodes: snapshot
                .nodes
                .iter()
                .map(|n| NodePosition {
                    id: n.id,
                    x: n.x,
                    y: n.y,
                    phase: n.phase,
                    cluster_id: n.cluster_id,
                })
                .collect(),
        }
    }
}

/// Node position for visualization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodePosition {
    pub id: u64,
    pub x: f64,
    pub y: f64,
    pub phase: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<usize>,
}

/// Notable event during a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimEvent {
    pub tick: u64,
    pub message: String,
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Simulated seconds covered by the frames
    pub duration_sec: f64,

    pub frames: Vec<SimFrame>,
    pub events: Vec<SimEvent>,

    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            frames: Vec::new(),
            events: Vec::new(),
            passed: false,
            failure_reason: None,
        }
    }

    /// Records a snapshot as a frame.
    pub fn add_frame(&mut self, snapshot: &Snapshot) {
        let frame = SimFrame::from_snapshot(snapshot);
        self.duration_sec = self.duration_sec.max(frame.time_sec);
        self.frames.push(frame);
    }

    pub fn add_event(&mut self, tick: u64, message: impl Into<String>) {
        self.events.push(SimEvent {
            tick,
            message: message.into(),
        });
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, failure_reason: Option<String>) {
        self.passed = passed;
        self.failure_reason = failure_reason;
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
    use consim_core::{Engine, EngineConfig};

    #[test]
    fn test_export_frames() {
        let config = EngineConfig {
            initial_nodes: 5,
            ..EngineConfig::default()
        };
        let mut engine = Engine::with_seed(config).unwrap();
        let mut export = SimExport::new("unit", 42);
        for _ in 0..3 {
            engine.step();
            export.add_frame(&engine.snapshot());
        }
        export.add_event(3, "done");
        export.finalize(true, None);

        assert_eq!(export.frames.len(), 3);
        assert_eq!(export.frames[2].tick, 3);
        assert_eq!(export.frames[0].nodes.len(), 5);
        assert!(export.duration_sec > 0.0);

        let json = serde_json::to_string(&export).unwrap();
        assert!(json.contains("\"scenario\":\"unit\""));
        assert!(!json.contains("failure_reason"));
    }
}
