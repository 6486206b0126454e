//! SimWorld - synchronous simulation harness around one engine.
//!
//! The world queues commands exactly like the command channel would, drains
//! them at the start of each tick, steps the engine and hands the resulting
//! snapshot to the invariant oracle. The virtual clock advances by one tick
//! interval per tick.

use crate::context::SimContext;
use crate::exporter::SimExport;
use crate::oracle::InvariantOracle;

use consim_core::{
    Command, CommandError, CommandOutcome, ConfigError, Engine, EngineConfig, EngineRngs, Snapshot, TickReport,
};
use consim_env::ConsimContext;
use std::sync::Arc;

/// Configuration for a simulation run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Engine configuration; its seed is overridden by `seed`
    pub engine: EngineConfig,

    /// Record an export frame every N ticks (0 = never)
    pub export_every: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            engine: EngineConfig::default(),
            export_every: 0,
        }
    }
}

/// Totals accumulated over a run.
#[derive(Debug, Clone, Default)]
pub struct WorldTotals {
    pub commands_applied: u64,
    pub commands_rejected: u64,
    pub tunneled: u64,
    pub reflected: u64,
    pub faults: u64,
}

/// The SimWorld - container for a single deterministic run.
pub struct SimWorld {
    pub config: SimConfig,

    /// Shared simulation context (virtual clock)
    pub context: Arc<SimContext>,

    pub oracle: InvariantOracle,

    engine: Engine,
    pending: Vec<Command>,
    outcomes: Vec<Result<CommandOutcome, CommandError>>,
    totals: WorldTotals,
    export: Option<SimExport>,
}

impl SimWorld {
    /// Creates a new SimWorld with the given configuration.
    pub fn new(config: SimConfig) -> Result<Self, ConfigError> {
        let context = SimContext::shared(config.seed);
        let engine_config = EngineConfig {
            seed: config.seed,
            ..config.engine.clone()
        };
        let engine = Engine::new(engine_config, EngineRngs::from_context(context.as_ref()))?;
        let mut oracle = InvariantOracle::new(engine.config());
        oracle.check(&engine.snapshot());

        Ok(Self {
            config,
            context,
            oracle,
            engine,
            pending: Vec::new(),
            outcomes: Vec::new(),
            totals: WorldTotals::default(),
            export: None,
        })
    }

    /// Starts recording frames under the given scenario name.
    pub fn record(&mut self, scenario: &str) {
        let mut export = SimExport::new(scenario, self.config.seed);
        export.add_frame(&self.engine.snapshot());
        self.export = Some(export);
    }

    /// Queues a command for the next tick boundary.
    pub fn submit(&mut self, command: Command) {
        self.pending.push(command);
    }

    /// Applies queued commands without advancing time.
    ///
    /// A reset rewinds the tick counter, so its snapshot is audited here.
    pub fn drain(&mut self) -> &[Result<CommandOutcome, CommandError>] {
        let commands = std::mem::take(&mut self.pending);
        self.outcomes = if commands.is_empty() {
            Vec::new()
        } else {
            let reset = commands.iter().any(|c| matches!(c, Command::Reset));
            let outcomes = self.engine.apply_batch(commands);
            if reset {
                self.oracle.note_reset();
                self.oracle.check(&self.engine.snapshot());
            }
            outcomes
        };

        for outcome in &self.outcomes {
            match outcome {
                Ok(_) => self.totals.commands_applied += 1,
                Err(_) => self.totals.commands_rejected += 1,
            }
        }
        &self.outcomes
    }

    /// Drains queued commands, steps the engine and audits the snapshot.
    pub fn tick(&mut self) -> TickReport {
        self.drain();

        let report = self.engine.step();
        self.context.advance_time(self.engine.config().tick_interval());

        self.totals.tunneled += report.tunneled as u64;
        self.totals.reflected += report.reflected as u64;
        self.totals.faults += report.faults as u64;

        let snapshot = self.engine.snapshot();
        self.oracle.check(&snapshot);

        if let Some(export) = self.export.as_mut() {
            let every = self.config.export_every.max(1);
            if report.tick % every == 0 {
                export.add_frame(&snapshot);
            }
        }

        report
    }

    /// Runs `ticks` ticks.
    pub fn run(&mut self, ticks: u64) {
        for _ in 0..ticks {
            self.tick();
        }
    }

    /// Outcomes of the commands drained by the most recent tick.
    pub fn last_outcomes(&self) -> &[Result<CommandOutcome, CommandError>] {
        &self.outcomes
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.engine.snapshot()
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn totals(&self) -> &WorldTotals {
        &self.totals
    }

    /// Takes the recorded export, if recording was started.
    pub fn take_export(&mut self) -> Option<SimExport> {
        self.export.take()
    }

    /// Returns the current virtual time in seconds.
    pub fn time(&self) -> f64 {
        self.context.now().as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world(seed: u64, nodes: usize) -> SimWorld {
        SimWorld::new(SimConfig {
            seed,
            engine: EngineConfig {
                initial_nodes: nodes,
                ..EngineConfig::default()
            },
            export_every: 0,
        })
        .unwrap()
    }

    #[test]
    fn test_sim_world_creation() {
        let world = world(42, 10);
        assert_eq!(world.engine().node_count(), 10);
        assert_eq!(world.engine().config().seed, 42);
        assert_eq!(world.time(), 0.0);
    }

    #[test]
    fn test_commands_apply_at_tick_boundary() {
        let mut world = world(1, 0);
        world.submit(Command::AddNode { x: 10.0, y: 10.0 });
        assert_eq!(world.engine().node_count(), 0);

        let report = world.tick();
        assert_eq!(report.node_count, 1);
        assert_eq!(world.last_outcomes().len(), 1);
        assert_eq!(world.totals().commands_applied, 1);
        assert!(world.oracle.is_clean());
    }

    #[test]
    fn test_virtual_time_advances() {
        let mut world = world(3, 4);
        world.run(10);
        let expected = 10.0 * world.engine().config().dt();
        assert!((world.time() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_same_seed_same_snapshots() {
        let mut a = world(99, 32);
        let mut b = world(99, 32);
        a.run(60);
        b.run(60);
        assert_eq!(*a.snapshot(), *b.snapshot());
    }

    #[test]
    fn test_reset_keeps_oracle_clean() {
        let mut world = world(5, 16);
        world.run(5);
        world.submit(Command::Reset);
        world.tick();
        assert_eq!(world.engine().node_count(), 0);
        assert!(world.oracle.is_clean());
    }

    #[test]
    fn test_recording() {
        let mut world = SimWorld::new(SimConfig {
            export_every: 5,
            ..SimConfig::default()
        })
        .unwrap();
        world.record("unit");
        world.run(20);
        let export = world.take_export().unwrap();
        // Initial frame plus ticks 5, 10, 15, 20
        assert_eq!(export.frames.len(), 5);
    }
}
