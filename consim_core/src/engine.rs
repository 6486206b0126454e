//! The synchronous engine - one tick is "apply queued commands, then step".
//!
//! `Engine` owns the State Store and every component. It has no notion of
//! wall time or I/O; the async runtime (and the deterministic harness) drive
//! it tick by tick.

use consim_env::ConsimContext;
use nalgebra::Vector2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::f64::consts::{PI, TAU};
use std::sync::Arc;
use tracing::{debug, info};

use crate::branches::{BranchDynamics, BranchManager};
use crate::cluster::ClusterDetector;
use crate::command::{Command, CommandOutcome};
use crate::config::EngineConfig;
use crate::error::{CommandError, ConfigError};
use crate::field::{wrap_phase, FieldEngine};
use crate::metrics::GlobalStats;
use crate::physics::PhysicsIntegrator;
use crate::snapshot::{NodeView, Snapshot};
use crate::state::{Cognition, Node, StateStore};

/// Outward speed (units/s) imparted at the center of a collapse.
const COLLAPSE_IMPULSE: f64 = 5.0 * 60.0;

/// Random stream selectors.
const PHYSICS_STREAM: u64 = 1;
const BRANCH_STREAM: u64 = 2;
const SPAWN_STREAM: u64 = 3;

/// Independent random streams, one per consumer.
#[derive(Debug, Clone)]
pub struct EngineRngs {
    /// Jitter and tunneling draws
    pub physics: ChaCha8Rng,
    /// Branch geometry and drift noise
    pub branches: ChaCha8Rng,
    /// New-node attributes
    pub spawn: ChaCha8Rng,
}

impl EngineRngs {
    /// Derives the streams the same way `ConsimContext::derive_rng` does for
    /// a seeded context. A zero seed draws from OS entropy.
    pub fn from_seed(seed: u64) -> Self {
        let derive = |stream: u64| {
            if seed == 0 {
                ChaCha8Rng::from_entropy()
            } else {
                ChaCha8Rng::seed_from_u64(seed.wrapping_mul(0x517cc1b727220a95) ^ stream)
            }
        };
        Self {
            physics: derive(PHYSICS_STREAM),
            branches: derive(BRANCH_STREAM),
            spawn: derive(SPAWN_STREAM),
        }
    }

    pub fn from_context<Ctx: ConsimContext>(ctx: &Ctx) -> Self {
        Self {
            physics: ctx.derive_rng(PHYSICS_STREAM),
            branches: ctx.derive_rng(BRANCH_STREAM),
            spawn: ctx.derive_rng(SPAWN_STREAM),
        }
    }
}

/// What happened during one `step`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    pub node_count: usize,
    pub cluster_count: usize,
    pub tunneled: usize,
    pub reflected: usize,
    pub wrapped: usize,
    /// Nodes culled this tick
    pub faults: usize,
}

/// Owns the simulation state and advances it.
pub struct Engine {
    config: EngineConfig,
    store: StateStore,
    branches: BranchManager,
    field: FieldEngine,
    physics: PhysicsIntegrator,
    clusters: ClusterDetector,
    rngs: EngineRngs,
    latest: Arc<Snapshot>,
}

impl Engine {
    /// Builds an engine and spawns the initial population.
    pub fn new(config: EngineConfig, mut rngs: EngineRngs) -> Result<Self, ConfigError> {
        config.validate()?;

        let dynamics = BranchDynamics {
            drift_rate: config.branch_drift_rate,
            drift_noise: config.branch_drift_noise,
            collapse_strength: config.collapse_strength,
            relaxation_secs: config.collapse_relaxation_secs,
        };
        let branches = BranchManager::new(config.branch_count, dynamics, &mut rngs.branches);
        let store = StateStore::new(config.fault_log_capacity);
        let latest = Arc::new(Snapshot::capture(&store, &branches, &[]));

        let mut engine = Self {
            field: FieldEngine::new(config.attention_sigma),
            physics: PhysicsIntegrator::from_config(&config),
            clusters: ClusterDetector::from_config(&config),
            config,
            store,
            branches,
            rngs,
            latest,
        };

        let w = engine.config.world_half_extent;
        for _ in 0..engine.config.initial_nodes {
            let position = Vector2::new(
                engine.rngs.spawn.gen_range(-w..=w),
                engine.rngs.spawn.gen_range(-w..=w),
            );
            let node = engine.create_node(position);
            engine.store.nodes.push(node);
        }
        engine.field.refresh(&mut engine.store.nodes);
        let clusters = engine.clusters.assign(&mut engine.store.nodes);
        engine.latest = Arc::new(Snapshot::capture(&engine.store, &engine.branches, &clusters));

        info!(
            "Engine ready: {} nodes, {} branches, seed {}",
            engine.store.node_count(),
            engine.branches.len(),
            engine.config.seed
        );
        Ok(engine)
    }

    /// Convenience constructor seeding every stream from `config.seed`.
    pub fn with_seed(config: EngineConfig) -> Result<Self, ConfigError> {
        let rngs = EngineRngs::from_seed(config.seed);
        Self::new(config, rngs)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn branches(&self) -> &BranchManager {
        &self.branches
    }

    /// The snapshot of the last completed tick (or of the last reset).
    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.latest)
    }

    pub fn stats(&self) -> &GlobalStats {
        &self.latest.global_stats
    }

    pub fn tick(&self) -> u64 {
        self.store.tick
    }

    pub fn node_count(&self) -> usize {
        self.store.node_count()
    }

    // ========================================================================
    // COMMANDS
    // ========================================================================

    /// Validates and applies one command.
    pub fn apply(&mut self, command: Command) -> Result<CommandOutcome, CommandError> {
        command.validate(&self.config)?;

        match command {
            Command::AddNode { x, y } => {
                if self.store.node_count() >= self.config.max_nodes {
                    return Err(CommandError::CapacityExceeded {
                        max: self.config.max_nodes,
                    });
                }
                let node = self.create_node(Vector2::new(x, y));
                let id = node.id;
                self.store.nodes.push(node);
                self.field.refresh(&mut self.store.nodes);

                let view = self
                    .store
                    .node(id)
                    .map(NodeView::from)
                    .unwrap_or_default();
                debug!("Added node {} at ({:.1}, {:.1})", id, x, y);
                Ok(CommandOutcome::NodeAdded { node: view })
            }
            Command::ParameterUpdate(update) => {
                update.apply_to(&mut self.store.params);
                debug!("Parameters updated: {:?}", self.store.params);
                Ok(CommandOutcome::ParametersUpdated {
                    params: self.store.params,
                })
            }
            Command::MouseInfluence(pointer) => {
                self.store.pointer = pointer;
                Ok(CommandOutcome::PointerUpdated { pointer })
            }
            Command::QuantumCollapse { x, y } => {
                let (affected, branch) = self.collapse(Vector2::new(x, y));
                info!(
                    "Quantum collapse at ({:.1}, {:.1}): {} nodes, branch {} favoured",
                    x, y, affected, branch
                );
                Ok(CommandOutcome::CollapseTriggered { affected, branch })
            }
            Command::Reset => {
                self.reset();
                Ok(CommandOutcome::Reset)
            }
            Command::SetMode(mode) => {
                self.store.mode = mode;
                Ok(CommandOutcome::ModeChanged { mode })
            }
        }
    }

    /// Applies one tick's worth of queued commands in receipt order.
    ///
    /// A reset is exclusive: every command queued before the last reset in
    /// the batch is discarded as `Superseded` and the reset runs first.
    pub fn apply_batch(&mut self, commands: Vec<Command>) -> Vec<Result<CommandOutcome, CommandError>> {
        let last_reset = commands.iter().rposition(|c| matches!(c, Command::Reset));

        commands
            .into_iter()
            .enumerate()
            .map(|(i, command)| match last_reset {
                Some(r) if i < r => Err(CommandError::Superseded),
                _ => self.apply(command),
            })
            .collect()
    }

    fn create_node(&mut self, position: Vector2<f64>) -> Node {
        let id = self.store.allocate_id();
        let [low, high] = self.config.frequency_band;
        let rng = &mut self.rngs.spawn;

        let frequency = rng.gen_range(low..=high);
        let phase = wrap_phase(rng.gen_range(0.0..TAU));
        let branch = self.branches.assign(rng);
        let cognition = Cognition::new(
            Vector2::new(rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0)),
            Vector2::new(rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0)),
            Vector2::new(rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0)),
        );

        Node::new(id, position, frequency, phase, branch, self.config.base_radius).with_cognition(cognition)
    }

    /// Region effect around `point`; returns (affected nodes, favoured branch).
    fn collapse(&mut self, point: Vector2<f64>) -> (usize, usize) {
        let branch = self.branches.collapse(point);
        let reach = self.config.collapse_radius;

        let mut affected = 0;
        for node in self.store.nodes.iter_mut() {
            let offset = node.position - point;
            let d = offset.norm();
            if d > reach {
                continue;
            }
            affected += 1;
            node.phase = wrap_phase(node.phase + PI);
            node.collapse_pending = true;
            node.cognition.thought_intensity = 1.0;
            if d > 0.0 && reach > 0.0 {
                node.velocity += offset / d * (reach - d) / reach * COLLAPSE_IMPULSE;
            }
        }
        (affected, branch)
    }

    /// Empties the population and restores every default.
    pub fn reset(&mut self) {
        self.store.reset();
        self.branches.reset();
        self.latest = Arc::new(Snapshot::capture(&self.store, &self.branches, &[]));
        info!("Simulation reset");
    }

    // ========================================================================
    // TICK
    // ========================================================================

    /// Advances the simulation by one tick and captures its snapshot.
    pub fn step(&mut self) -> TickReport {
        let dt = self.config.dt();
        let params = self.store.params;
        let dt_eff = dt * params.time_dilation;

        self.store.tick += 1;
        self.store.time += dt_eff;
        let (tick, time) = (self.store.tick, self.store.time);

        self.branches.step(dt_eff, &mut self.rngs.branches);
        self.field
            .step(&mut self.store.nodes, &self.branches, dt, params.time_dilation, time);

        let physics = self.physics.step(
            &mut self.store.nodes,
            &params,
            &self.store.pointer,
            dt,
            time,
            tick,
            &mut self.rngs.physics,
        );
        let faults = physics.faults.len();
        for fault in physics.faults {
            self.store.record_fault(fault);
        }

        let clusters = self.clusters.assign(&mut self.store.nodes);
        self.latest = Arc::new(Snapshot::capture(&self.store, &self.branches, &clusters));

        if self.config.stats_log_every_ticks > 0 && tick % self.config.stats_log_every_ticks == 0 {
            let stats = &self.latest.global_stats;
            debug!(
                "Tick {}: {} nodes, {} clusters, |C|={:.4}, resonance={:.3}",
                tick, stats.node_count, stats.cluster_count, stats.consciousness_magnitude, stats.global_resonance
            );
        }

        TickReport {
            tick,
            node_count: self.store.node_count(),
            cluster_count: clusters.len(),
            tunneled: physics.tunneled,
            reflected: physics.reflected,
            wrapped: physics.wrapped,
            faults,
        }
    }
}
