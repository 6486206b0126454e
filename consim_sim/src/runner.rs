//! Scenario runner - executes deterministic simulation scenarios.

use crate::context::SimContext;
use crate::exporter::SimExport;
use crate::oracle::InvariantOracle;
use crate::scenarios::ScenarioId;
use crate::subscriber::SimSubscriber;
use crate::world::{SimConfig, SimWorld};

use consim_core::cluster::ClusterDetector;
use consim_core::physics::{Boundary, BoundaryOutcome};
use consim_core::runtime::ticks_for;
use consim_core::{
    pump, BoundaryMode, Command, CommandError, EngineConfig, ParameterUpdate, PhysicsParams, PointerInteraction,
    PointerMode, SimulationRuntime, Snapshot,
};
use consim_env::{Envelope, FrameSink, SubscriberId};
use nalgebra::Vector2;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Boundary-crossing trials in the tunnel scenario.
pub const TUNNEL_TRIALS: usize = 10_000;

/// Results from running a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Total ticks executed
    pub total_ticks: u64,

    /// Final simulation time in seconds
    pub final_time_secs: f64,

    pub final_node_count: usize,
    pub final_cluster_count: usize,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,

    /// Recorded frames, when export was requested
    pub export: Option<SimExport>,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default)]
pub struct ScenarioMetrics {
    pub commands_applied: u64,
    pub commands_rejected: u64,

    /// Frames handed to subscriber sinks
    pub frames_delivered: u64,

    /// Published frames a subscriber never saw (latest-wins overwrites)
    pub frames_skipped: u64,

    pub tunneled: u64,
    pub reflected: u64,

    /// Numeric-fault culls
    pub faults: u64,

    /// Snapshots audited by the invariant oracle
    pub invariant_checks: u64,
}

/// Runs simulation scenarios.
pub struct ScenarioRunner {
    /// Configuration seed
    seed: u64,

    /// Simulated duration in seconds
    duration_secs: f64,

    /// Export cadence in ticks (0 = no export)
    export_every: u64,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            duration_secs: 10.0,
            export_every: 0,
        }
    }

    /// Sets the simulated duration.
    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration_secs = secs;
        self
    }

    /// Records a frame every `every` ticks.
    pub fn with_export(mut self, every: u64) -> Self {
        self.export_every = every;
        self
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        match scenario {
            ScenarioId::FrictionDecay => self.run_friction_decay(),
            ScenarioId::TunnelRate => self.run_tunnel_rate(),
            ScenarioId::ResetDefaults => self.run_reset_defaults(),
            ScenarioId::ClusterPermutation => self.run_cluster_permutation(),
            ScenarioId::SnapshotRoundtrip => self.run_snapshot_roundtrip(),
            ScenarioId::SimplexDrift => self.run_simplex_drift(),
            ScenarioId::SlowSubscriber => self.run_slow_subscriber(),
            ScenarioId::CapacityLimit => self.run_capacity_limit(),
        }
    }

    // ========================================================================
    // SETUP
    // ========================================================================

    fn engine_config(&self, initial_nodes: usize) -> EngineConfig {
        EngineConfig {
            seed: self.seed,
            initial_nodes,
            ..EngineConfig::default()
        }
    }

    fn target_ticks(&self, config: &EngineConfig) -> u64 {
        ticks_for(config, Duration::from_secs_f64(self.duration_secs.max(0.0))).max(1)
    }

    fn world(&self, scenario: ScenarioId, engine: EngineConfig) -> Result<SimWorld, String> {
        let mut world = SimWorld::new(SimConfig {
            seed: self.seed,
            engine,
            export_every: self.export_every,
        })
        .map_err(|e| format!("invalid configuration: {e}"))?;
        if self.export_every > 0 {
            world.record(scenario.name());
        }
        Ok(world)
    }

    /// Builds the result for a world-based scenario.
    ///
    /// Oracle violations fail the scenario even when its own assertion held.
    fn finish(&self, scenario: ScenarioId, mut world: SimWorld, failure: Option<String>) -> ScenarioResult {
        let failure = failure.or_else(|| {
            world.oracle.violations().first().map(|v| {
                format!(
                    "{} invariant violations, first at tick {}: {}",
                    world.oracle.violations().len(),
                    v.tick,
                    v.description
                )
            })
        });
        let passed = failure.is_none();

        let snapshot = world.snapshot();
        let totals = world.totals().clone();
        let metrics = ScenarioMetrics {
            commands_applied: totals.commands_applied,
            commands_rejected: totals.commands_rejected,
            tunneled: totals.tunneled,
            reflected: totals.reflected,
            faults: totals.faults,
            invariant_checks: world.oracle.invariant_checks(),
            ..ScenarioMetrics::default()
        };
        let export = world.take_export().map(|mut export| {
            export.finalize(passed, failure.clone());
            export
        });

        if passed {
            info!("✓ {} complete: {} checks", scenario.name(), metrics.invariant_checks);
        } else {
            warn!("✗ {} failed: {}", scenario.name(), failure.as_deref().unwrap_or("unknown"));
        }

        ScenarioResult {
            scenario,
            seed: self.seed,
            passed,
            total_ticks: world.engine().tick(),
            final_time_secs: world.time(),
            final_node_count: snapshot.node_count(),
            final_cluster_count: snapshot.cluster_count(),
            failure_reason: failure,
            metrics,
            export,
        }
    }

    fn setup_failure(&self, scenario: ScenarioId, reason: String) -> ScenarioResult {
        warn!("✗ {} could not start: {}", scenario.name(), reason);
        ScenarioResult {
            scenario,
            seed: self.seed,
            passed: false,
            total_ticks: 0,
            final_time_secs: 0.0,
            final_node_count: 0,
            final_cluster_count: 0,
            failure_reason: Some(reason),
            metrics: ScenarioMetrics::default(),
            export: None,
        }
    }

    // ========================================================================
    // SCENARIOS
    // ========================================================================

    /// SIM-001: FrictionDecay.
    ///
    /// A lone node at the origin is kicked by a push pointer, then gravity,
    /// field strength and the pointer are switched off. Friction is the only
    /// remaining influence, so the speed must strictly decrease every tick.
    fn run_friction_decay(&self) -> ScenarioResult {
        let scenario = ScenarioId::FrictionDecay;
        let config = self.engine_config(0);
        let ticks = self.target_ticks(&config);
        let mut world = match self.world(scenario, config) {
            Ok(world) => world,
            Err(reason) => return self.setup_failure(scenario, reason),
        };

        world.submit(Command::AddNode { x: 0.0, y: 0.0 });
        world.submit(Command::MouseInfluence(PointerInteraction {
            position: Vector2::new(30.0, 0.0),
            mode: PointerMode::Push,
            active: true,
        }));
        world.run(10);

        world.submit(Command::ParameterUpdate(ParameterUpdate {
            gravity: Some(0.0),
            field_strength: Some(0.0),
            ..ParameterUpdate::default()
        }));
        world.submit(Command::MouseInfluence(PointerInteraction::default()));

        let speed = |snapshot: &Snapshot| snapshot.nodes.first().map(|n| n.vx.hypot(n.vy));
        let mut previous = speed(world.snapshot().as_ref());
        let mut failure = match previous {
            Some(v) if v > 0.0 => None,
            Some(_) => Some("kick left the node at rest".to_string()),
            None => Some("node was not spawned".to_string()),
        };

        for _ in 0..ticks {
            if failure.is_some() {
                break;
            }
            let report = world.tick();
            let current = speed(world.snapshot().as_ref());
            match (previous, current) {
                (Some(before), Some(after)) if after < before => {}
                (before, after) => {
                    failure = Some(format!(
                        "speed did not decrease at tick {}: {:?} -> {:?}",
                        report.tick, before, after
                    ));
                }
            }
            previous = current;
        }

        debug!("  final speed {:?}", previous);
        self.finish(scenario, world, failure)
    }

    /// SIM-002: TunnelRate.
    ///
    /// Drives the boundary resolver directly with a node just past the edge.
    /// The observed fraction must fall inside the 95% normal-approximation
    /// interval around p_tunnel.
    fn run_tunnel_rate(&self) -> ScenarioResult {
        let scenario = ScenarioId::TunnelRate;
        let config = self.engine_config(0);
        let boundary = Boundary {
            half_extent: config.world_half_extent,
            mode: BoundaryMode::Reflect,
            tunnel_probability: config.tunnel_probability,
        };
        let physics_seed = self.seed.wrapping_mul(0x9e3779b97f4a7c15);
        let mut rng = ChaCha8Rng::seed_from_u64(physics_seed);

        let mut metrics = ScenarioMetrics::default();
        for _ in 0..TUNNEL_TRIALS {
            let mut pos = boundary.half_extent + 1.0;
            let mut vel = 10.0;
            match boundary.resolve(&mut pos, &mut vel, 0.8, &mut rng) {
                BoundaryOutcome::Tunneled => metrics.tunneled += 1,
                BoundaryOutcome::Reflected => metrics.reflected += 1,
                _ => {}
            }
        }

        let p = boundary.tunnel_probability;
        let n = TUNNEL_TRIALS as f64;
        let observed = metrics.tunneled as f64 / n;
        let half_width = 1.96 * (p * (1.0 - p) / n).sqrt();
        let passed = (observed - p).abs() <= half_width;

        let failure_reason = (!passed).then(|| {
            format!(
                "tunnel fraction {:.4} outside [{:.4}, {:.4}]",
                observed,
                p - half_width,
                p + half_width
            )
        });
        info!(
            "{} TunnelRate: {}/{} crossings tunneled ({:.4})",
            if passed { "✓" } else { "✗" },
            metrics.tunneled,
            TUNNEL_TRIALS,
            observed
        );

        ScenarioResult {
            scenario,
            seed: self.seed,
            passed,
            total_ticks: 0,
            final_time_secs: 0.0,
            final_node_count: 0,
            final_cluster_count: 0,
            failure_reason,
            metrics,
            export: None,
        }
    }

    /// SIM-003: ResetDefaults.
    fn run_reset_defaults(&self) -> ScenarioResult {
        let scenario = ScenarioId::ResetDefaults;
        let config = self.engine_config(128);
        let ticks = self.target_ticks(&config);
        let branch_count = config.branch_count;
        let mut world = match self.world(scenario, config) {
            Ok(world) => world,
            Err(reason) => return self.setup_failure(scenario, reason),
        };

        world.run(ticks / 2);
        world.submit(Command::QuantumCollapse { x: 0.0, y: 0.0 });
        world.submit(Command::ParameterUpdate(ParameterUpdate {
            gravity: Some(4.0),
            ..ParameterUpdate::default()
        }));
        world.tick();

        world.submit(Command::AddNode { x: 5.0, y: 5.0 });
        world.submit(Command::Reset);
        let superseded = matches!(world.drain().first(), Some(Err(CommandError::Superseded)));

        let snapshot = world.snapshot();
        let uniform = 1.0 / branch_count as f64;
        let mut failure = if !superseded {
            Some("command queued before reset was not superseded".to_string())
        } else if snapshot.node_count() != 0 || snapshot.cluster_count() != 0 {
            Some(format!(
                "reset left {} nodes and {} clusters",
                snapshot.node_count(),
                snapshot.cluster_count()
            ))
        } else if snapshot.lambdas.iter().any(|w| (w - uniform).abs() > 1e-12) {
            Some(format!("reset weights {:?} are not uniform", snapshot.lambdas))
        } else if snapshot.params != PhysicsParams::default() {
            Some("reset did not restore default parameters".to_string())
        } else {
            None
        };

        world.run(ticks / 2);
        let after = world.snapshot();
        if failure.is_none() && after.node_count() != 0 {
            failure = Some(format!("{} nodes appeared after reset", after.node_count()));
        }

        self.finish(scenario, world, failure)
    }

    /// SIM-004: ClusterPermutation.
    fn run_cluster_permutation(&self) -> ScenarioResult {
        let scenario = ScenarioId::ClusterPermutation;
        let config = EngineConfig {
            world_half_extent: 250.0,
            ..self.engine_config(256)
        };
        let ticks = self.target_ticks(&config).min(120);
        let detector = ClusterDetector::from_config(&config);
        let mut world = match self.world(scenario, config) {
            Ok(world) => world,
            Err(reason) => return self.setup_failure(scenario, reason),
        };
        world.run(ticks);

        let partition = |nodes: &[consim_core::state::Node]| -> Vec<Vec<u64>> {
            detector.detect(nodes).into_iter().map(|c| c.members).collect()
        };

        let mut nodes = world.engine().store().nodes.clone();
        let baseline = partition(nodes.as_slice());
        let published: Vec<Vec<u64>> = world.snapshot().clusters.iter().map(|c| c.node_ids.clone()).collect();

        let mut failure = (baseline != published).then(|| "detector disagrees with published clusters".to_string());
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed ^ 0x5eed);
        for round in 0..10 {
            if failure.is_some() {
                break;
            }
            nodes.shuffle(&mut rng);
            if partition(nodes.as_slice()) != baseline {
                failure = Some(format!("partition changed after shuffle {}", round + 1));
            }
        }

        debug!("  {} clusters over {} nodes", baseline.len(), nodes.len());
        self.finish(scenario, world, failure)
    }

    /// SIM-005: SnapshotRoundtrip.
    ///
    /// Every snapshot goes through the wire form and back; statistics
    /// recomputed from the decoded copy must equal the engine's own.
    fn run_snapshot_roundtrip(&self) -> ScenarioResult {
        let scenario = ScenarioId::SnapshotRoundtrip;
        let config = self.engine_config(128);
        let ticks = self.target_ticks(&config);
        let mut world = match self.world(scenario, config) {
            Ok(world) => world,
            Err(reason) => return self.setup_failure(scenario, reason),
        };

        let mut failure = None;
        for tick in 0..ticks {
            if tick % 100 == 50 {
                world.submit(Command::QuantumCollapse { x: 0.0, y: 0.0 });
            }
            world.tick();
            let snapshot = world.snapshot();
            if let Err(reason) = round_trip(&snapshot) {
                failure = Some(format!("tick {}: {}", snapshot.tick, reason));
                break;
            }
        }

        self.finish(scenario, world, failure)
    }

    /// SIM-006: SimplexDrift.
    fn run_simplex_drift(&self) -> ScenarioResult {
        let scenario = ScenarioId::SimplexDrift;
        let config = self.engine_config(64);
        let ticks = self.target_ticks(&config);
        let mut world = match self.world(scenario, config) {
            Ok(world) => world,
            Err(reason) => return self.setup_failure(scenario, reason),
        };

        let centers: Vec<(f64, f64)> = world
            .engine()
            .branches()
            .branches()
            .iter()
            .map(|b| (b.center.x, b.center.y))
            .collect();

        let mut worst = 0.0f64;
        for tick in 0..ticks {
            if tick % 50 == 0 {
                let (x, y) = centers[(tick / 50) as usize % centers.len()];
                world.submit(Command::QuantumCollapse { x, y });
            }
            world.tick();
            let sum: f64 = world.snapshot().lambdas.iter().sum();
            worst = worst.max((sum - 1.0).abs());
        }

        debug!("  worst |Σλ - 1| = {:e}", worst);
        self.finish(scenario, world, None)
    }

    /// SIM-007: SlowSubscriber.
    ///
    /// Runs the async clock loop on the virtual clock with one fast, one
    /// lagging and one failing subscriber. The loop must complete every tick
    /// and each subscriber must see strictly increasing ticks.
    fn run_slow_subscriber(&self) -> ScenarioResult {
        let scenario = ScenarioId::SlowSubscriber;
        let config = self.engine_config(64);
        let ticks = self.target_ticks(&config);
        let every = config.broadcast_every_ticks;

        let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(rt) => rt,
            Err(e) => return self.setup_failure(scenario, format!("tokio runtime: {e}")),
        };

        let outcome = rt.block_on(async move {
            let ctx = SimContext::shared(self.seed);
            let (runtime, handle) =
                SimulationRuntime::new(ctx.clone(), config).map_err(|e| format!("invalid configuration: {e}"))?;
            let clock = tokio::spawn(runtime.with_max_ticks(ticks).run());

            let sinks = [
                SimSubscriber::new(SubscriberId::from_seed(1)),
                SimSubscriber::new(SubscriberId::from_seed(2)).with_lag(64),
                SimSubscriber::new(SubscriberId::from_seed(3)).failing_after(5),
            ];
            let mut pumps = Vec::new();
            for mut sink in sinks {
                let subscription = handle
                    .subscribe(sink.subscriber_id())
                    .await
                    .map_err(|e| format!("subscribe failed: {e}"))?;
                pumps.push(tokio::spawn(async move {
                    let result = pump(subscription, &mut sink).await;
                    (sink, result)
                }));
            }

            let summary = clock
                .await
                .map_err(|e| format!("clock task panicked: {e}"))?
                .map_err(|e| format!("clock loop failed: {e}"))?;

            let mut delivered = Vec::new();
            for task in pumps {
                delivered.push(task.await.map_err(|e| format!("pump task panicked: {e}"))?);
            }
            Ok::<_, String>((summary, delivered, handle.state(), ctx))
        });

        let (summary, delivered, snapshot, ctx) = match outcome {
            Ok(outcome) => outcome,
            Err(reason) => return self.setup_failure(scenario, reason),
        };

        let mut metrics = ScenarioMetrics {
            commands_applied: summary.commands_applied,
            commands_rejected: summary.commands_rejected,
            ..ScenarioMetrics::default()
        };
        for (sink, _) in &delivered {
            metrics.frames_delivered += sink.received.len() as u64;
            metrics.frames_skipped += sink.skipped(every);
        }

        let mut oracle = InvariantOracle::new(&self.engine_config(64));
        oracle.check(&snapshot);
        metrics.invariant_checks = oracle.invariant_checks();

        let failure = if summary.ticks != ticks {
            Some(format!("clock completed {} of {} ticks", summary.ticks, ticks))
        } else if let Some((sink, _)) = delivered.iter().find(|(sink, _)| !sink.in_order()) {
            Some(format!("subscriber {} saw ticks out of order", sink.subscriber_id()))
        } else if delivered.iter().take(2).any(|(sink, _)| sink.received.is_empty()) {
            Some("a healthy subscriber received nothing".to_string())
        } else if !matches!(delivered.get(2), Some((_, Err(_)))) {
            Some("failing subscriber was never cut off".to_string())
        } else {
            oracle.violations().first().map(|v| v.description.clone())
        };
        let passed = failure.is_none();

        info!(
            "{} SlowSubscriber: {} ticks, {} frames published, {} delivered, {} skipped",
            if passed { "✓" } else { "✗" },
            summary.ticks,
            summary.frames_published,
            metrics.frames_delivered,
            metrics.frames_skipped
        );

        ScenarioResult {
            scenario,
            seed: self.seed,
            passed,
            total_ticks: summary.ticks,
            final_time_secs: ctx_seconds(&ctx),
            final_node_count: snapshot.node_count(),
            final_cluster_count: snapshot.cluster_count(),
            failure_reason: failure,
            metrics,
            export: None,
        }
    }

    /// SIM-008: CapacityLimit.
    fn run_capacity_limit(&self) -> ScenarioResult {
        let scenario = ScenarioId::CapacityLimit;
        let config = EngineConfig {
            max_nodes: 16,
            ..self.engine_config(0)
        };
        let max = config.max_nodes;
        let mut world = match self.world(scenario, config) {
            Ok(world) => world,
            Err(reason) => return self.setup_failure(scenario, reason),
        };

        for i in 0..max + 4 {
            let angle = i as f64 * std::f64::consts::TAU / (max + 4) as f64;
            world.submit(Command::AddNode {
                x: 300.0 * angle.cos(),
                y: 300.0 * angle.sin(),
            });
        }
        let outcomes = world.drain();
        let accepted = outcomes.iter().filter(|o| o.is_ok()).count();
        let capacity_errors = outcomes
            .iter()
            .filter(|o| matches!(o, Err(CommandError::CapacityExceeded { .. })))
            .count();

        world.tick();
        world.submit(Command::AddNode { x: 0.0, y: 0.0 });
        world.tick();
        let late_rejected = matches!(
            world.last_outcomes().first(),
            Some(Err(CommandError::CapacityExceeded { .. }))
        );

        let count = world.snapshot().node_count();
        let failure = if accepted != max || capacity_errors != 4 {
            Some(format!("{} accepted, {} rejected for capacity {}", accepted, capacity_errors, max))
        } else if !late_rejected {
            Some("add_node at capacity was accepted".to_string())
        } else if count != max {
            Some(format!("{} nodes after filling to {}", count, max))
        } else {
            None
        };

        self.finish(scenario, world, failure)
    }
}

/// Serializes, parses and re-checks one snapshot.
fn round_trip(snapshot: &Snapshot) -> Result<(), String> {
    let json = snapshot.to_json(snapshot.time).map_err(|e| e.to_string())?;
    let envelope = Envelope::from_json(&json).map_err(|e| e.to_string())?;
    let decoded = Snapshot::from_envelope(&envelope).map_err(|e| e.to_string())?;

    if decoded != *snapshot {
        return Err("decoded snapshot differs".to_string());
    }
    if decoded.recompute_stats() != snapshot.global_stats {
        return Err("recomputed statistics differ from published".to_string());
    }
    Ok(())
}

fn ctx_seconds(ctx: &SimContext) -> f64 {
    Duration::from_nanos(ctx.time_ns()).as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner(seed: u64) -> ScenarioRunner {
        ScenarioRunner::new(seed).with_duration(2.0)
    }

    #[test]
    fn test_friction_decay_passes() {
        let result = runner(42).run(ScenarioId::FrictionDecay);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.final_node_count, 1);
    }

    #[test]
    fn test_tunnel_rate_across_seeds() {
        for seed in [1, 2, 3, 42, 100] {
            let result = runner(seed).run(ScenarioId::TunnelRate);
            assert!(result.passed, "seed {}: {:?}", seed, result.failure_reason);
            assert_eq!(
                result.metrics.tunneled + result.metrics.reflected,
                TUNNEL_TRIALS as u64
            );
        }
    }

    #[test]
    fn test_reset_defaults_passes() {
        let result = runner(42).run(ScenarioId::ResetDefaults);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.final_node_count, 0);
        assert_eq!(result.final_cluster_count, 0);
    }

    #[test]
    fn test_cluster_permutation_passes() {
        let result = runner(7).run(ScenarioId::ClusterPermutation);
        assert!(result.passed, "{:?}", result.failure_reason);
    }

    #[test]
    fn test_snapshot_roundtrip_passes() {
        let result = runner(42).run(ScenarioId::SnapshotRoundtrip);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.invariant_checks > 100);
    }

    #[test]
    fn test_simplex_drift_passes() {
        let result = runner(3).run(ScenarioId::SimplexDrift);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert!(result.metrics.commands_applied >= 2);
    }

    #[test]
    fn test_slow_subscriber_passes() {
        let result = runner(42).run(ScenarioId::SlowSubscriber);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.total_ticks, 125);
        assert!(result.metrics.frames_delivered > 0);
    }

    #[test]
    fn test_capacity_limit_passes() {
        let result = runner(42).run(ScenarioId::CapacityLimit);
        assert!(result.passed, "{:?}", result.failure_reason);
        assert_eq!(result.final_node_count, 16);
        assert_eq!(result.metrics.commands_rejected, 5);
    }

    #[test]
    fn test_export_recording() {
        let result = ScenarioRunner::new(42)
            .with_duration(1.0)
            .with_export(10)
            .run(ScenarioId::SimplexDrift);
        let export = result.export.unwrap();
        assert_eq!(export.scenario, "simplex_drift");
        assert!(export.passed);
        assert!(!export.frames.is_empty());
    }

    #[test]
    fn test_deterministic_results() {
        let a = runner(9).run(ScenarioId::SimplexDrift);
        let b = runner(9).run(ScenarioId::SimplexDrift);
        assert_eq!(a.metrics.tunneled, b.metrics.tunneled);
        assert_eq!(a.metrics.reflected, b.metrics.reflected);
        assert_eq!(a.final_cluster_count, b.final_cluster_count);
    }
}
