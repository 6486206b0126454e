//! The State Store - canonical node set, global parameters and fault log.
//!
//! The store is owned by the `Engine`; every other component borrows it only
//! for the duration of the tick phase it runs in.

use nalgebra::{Complex, Vector2};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::str::FromStr;

use crate::config::PhysicsParams;
use crate::error::ValidationError;

// ============================================================================
// MODES
// ============================================================================

/// Kernel shape of the pointer-interaction force.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerMode {
    #[default]
    Push,
    Pull,
    Vortex,
    Wave,
    String,
}

impl PointerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PointerMode::Push => "push",
            PointerMode::Pull => "pull",
            PointerMode::Vortex => "vortex",
            PointerMode::Wave => "wave",
            PointerMode::String => "string",
        }
    }
}

impl FromStr for PointerMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "push" => Ok(PointerMode::Push),
            "pull" => Ok(PointerMode::Pull),
            "vortex" => Ok(PointerMode::Vortex),
            "wave" => Ok(PointerMode::Wave),
            "string" => Ok(PointerMode::String),
            other => Err(ValidationError::UnknownPointerMode(other.to_string())),
        }
    }
}

/// Rendering mode echoed to renderers. Has no effect on the physics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    Consciousness,
    Attention,
    Frequency,
    Temporal,
    Multiverse,
}

impl ViewMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewMode::Consciousness => "consciousness",
            ViewMode::Attention => "attention",
            ViewMode::Frequency => "frequency",
            ViewMode::Temporal => "temporal",
            ViewMode::Multiverse => "multiverse",
        }
    }
}

impl FromStr for ViewMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "consciousness" => Ok(ViewMode::Consciousness),
            "attention" => Ok(ViewMode::Attention),
            "frequency" => Ok(ViewMode::Frequency),
            "temporal" => Ok(ViewMode::Temporal),
            "multiverse" => Ok(ViewMode::Multiverse),
            other => Err(ValidationError::UnknownViewMode(other.to_string())),
        }
    }
}

/// Externally injected pointer force, applied while `active` is set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerInteraction {
    pub position: Vector2<f64>,
    pub mode: PointerMode,
    pub active: bool,
}

impl Default for PointerInteraction {
    fn default() -> Self {
        Self {
            position: Vector2::zeros(),
            mode: PointerMode::Push,
            active: false,
        }
    }
}

// ============================================================================
// NODE
// ============================================================================

/// Per-node cognition tensors and the emergent scalars derived from them.
#[derive(Debug, Clone, PartialEq)]
pub struct Cognition {
    pub logic: Vector2<f64>,
    pub memory: Vector2<f64>,
    pub processing: Vector2<f64>,
    /// Spikes to 1 on collapse, decays at 0.5/s
    pub thought_intensity: f64,
    /// min(1, mean tensor magnitude)
    pub consciousness_depth: f64,
    /// min(1, 0.8·|logic| + 0.2·thought_intensity)
    pub self_awareness: f64,
}

impl Cognition {
    /// Coupling rate per tick at unit time dilation.
    const EVOLUTION_RATE: f64 = 0.02;

    pub fn new(logic: Vector2<f64>, memory: Vector2<f64>, processing: Vector2<f64>) -> Self {
        let mut cognition = Self {
            logic,
            memory,
            processing,
            thought_intensity: 0.0,
            consciousness_depth: 0.0,
            self_awareness: 0.0,
        };
        cognition.derive();
        cognition
    }

    /// Logic feeds memory, memory feeds processing. Components saturate at 1.
    pub fn evolve(&mut self, dt: f64, time_dilation: f64) {
        let rate = Self::EVOLUTION_RATE * time_dilation;
        self.memory = (self.memory + self.logic * rate * 0.1).map(|c| c.min(1.0));
        self.processing = (self.processing + self.memory * rate * 0.15).map(|c| c.min(1.0));
        self.thought_intensity = (self.thought_intensity - dt * 0.5).max(0.0);
        self.derive();
    }

    fn derive(&mut self) {
        let logic = self.logic.norm();
        let mean = (logic + self.memory.norm() + self.processing.norm()) / 3.0;
        self.consciousness_depth = mean.min(1.0);
        self.self_awareness = (logic * 0.8 + self.thought_intensity * 0.2).min(1.0);
    }
}

impl Default for Cognition {
    fn default() -> Self {
        let half = Vector2::new(0.5, 0.5);
        Self::new(half, half, half)
    }
}

/// A point entity on the consciousness manifold.
///
/// Every field is explicit; derived fields are recomputed each tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Unique for the lifetime of the process (never reused after removal)
    pub id: u64,
    pub position: Vector2<f64>,
    pub velocity: Vector2<f64>,
    /// A ∈ [0, 1], renormalized across the population each tick
    pub attention: f64,
    /// Φ at creation, inside the configured band
    pub base_frequency: f64,
    /// Φ after branch modulation (Hz)
    pub frequency: f64,
    /// τ ∈ [0, 2π)
    pub phase: f64,
    /// Assigned universe branch
    pub branch: usize,
    pub base_radius: f64,
    pub radius: f64,
    /// A·e^(iτ), zero on the tick after a collapse
    pub consciousness: Complex<f64>,
    pub cognition: Cognition,
    /// Valid for the current tick only
    pub cluster_id: Option<usize>,
    /// Set by a collapse; cleared by the next field update
    pub collapse_pending: bool,
}

impl Node {
    /// Creates a node at rest.
    pub fn new(id: u64, position: Vector2<f64>, frequency: f64, phase: f64, branch: usize, base_radius: f64) -> Self {
        Self {
            id,
            position,
            velocity: Vector2::zeros(),
            attention: 0.0,
            base_frequency: frequency,
            frequency,
            phase,
            branch,
            base_radius,
            radius: base_radius,
            consciousness: Complex::new(0.0, 0.0),
            cognition: Cognition::default(),
            cluster_id: None,
            collapse_pending: false,
        }
    }

    /// Returns the node with the given cognition tensors.
    pub fn with_cognition(mut self, cognition: Cognition) -> Self {
        self.cognition = cognition;
        self
    }

    /// True if position and velocity are finite.
    pub fn is_finite(&self) -> bool {
        self.position.iter().all(|c| c.is_finite()) && self.velocity.iter().all(|c| c.is_finite())
    }
}

/// A node culled because its kinematics became non-finite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericFault {
    pub node_id: u64,
    pub tick: u64,
    pub reason: String,
}

// ============================================================================
// STATE STORE
// ============================================================================

/// Authoritative mutable simulation state.
#[derive(Debug, Clone)]
pub struct StateStore {
    /// Live nodes, in creation order
    pub nodes: Vec<Node>,

    /// Runtime-tunable physics
    pub params: PhysicsParams,

    /// Current pointer interaction
    pub pointer: PointerInteraction,

    /// Current view mode
    pub mode: ViewMode,

    /// Completed ticks since start or last reset
    pub tick: u64,

    /// Dilated simulation time in seconds
    pub time: f64,

    /// Next node id (monotonic across resets)
    next_id: u64,

    /// Most recent numeric faults
    faults: VecDeque<NumericFault>,

    /// Total numeric faults since start or last reset
    fault_total: u64,

    /// Bound on `faults`
    fault_capacity: usize,
}

impl StateStore {
    /// Creates an empty store.
    pub fn new(fault_capacity: usize) -> Self {
        Self {
            nodes: Vec::new(),
            params: PhysicsParams::default(),
            pointer: PointerInteraction::default(),
            mode: ViewMode::default(),
            tick: 0,
            time: 0.0,
            next_id: 0,
            faults: VecDeque::with_capacity(fault_capacity),
            fault_total: 0,
            fault_capacity,
        }
    }

    /// Reserves the next node id.
    pub fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Returns the number of live nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Looks up a node by id.
    pub fn node(&self, id: u64) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Records a numeric fault, evicting the oldest record when full.
    pub fn record_fault(&mut self, fault: NumericFault) {
        self.fault_total += 1;
        if self.fault_capacity == 0 {
            return;
        }
        if self.faults.len() == self.fault_capacity {
            self.faults.pop_front();
        }
        self.faults.push_back(fault);
    }

    /// Most recent numeric faults, oldest first.
    pub fn faults(&self) -> impl Iterator<Item = &NumericFault> {
        self.faults.iter()
    }

    /// Total numeric faults recorded.
    pub fn fault_total(&self) -> u64 {
        self.fault_total
    }

    /// Reinitializes everything except the id counter.
    pub fn reset(&mut self) {
        self.nodes.clear();
        self.params = PhysicsParams::default();
        self.pointer = PointerInteraction::default();
        self.mode = ViewMode::default();
        self.tick = 0;
        self.time = 0.0;
        self.faults.clear();
        self.fault_total = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("vortex".parse::<PointerMode>().unwrap(), PointerMode::Vortex);
        assert_eq!("string".parse::<PointerMode>().unwrap(), PointerMode::String);
        assert!(matches!(
            "spin".parse::<PointerMode>(),
            Err(ValidationError::UnknownPointerMode(_))
        ));

        assert_eq!("temporal".parse::<ViewMode>().unwrap(), ViewMode::Temporal);
        assert!("Temporal".parse::<ViewMode>().is_err());
    }

    #[test]
    fn test_fault_log_is_bounded() {
        let mut store = StateStore::new(2);
        for i in 0..5 {
            store.record_fault(NumericFault {
                node_id: i,
                tick: i,
                reason: "nan".into(),
            });
        }

        let ids: Vec<u64> = store.faults().map(|f| f.node_id).collect();
        assert_eq!(ids, vec![3, 4]);
        assert_eq!(store.fault_total(), 5);
    }

    #[test]
    fn test_reset_keeps_ids_monotonic() {
        let mut store = StateStore::new(4);
        let first = store.allocate_id();
        store.nodes.push(Node::new(first, Vector2::zeros(), 40.0, 0.0, 0, 3.0));
        store.params.gravity = 3.0;
        store.tick = 10;

        store.reset();

        assert_eq!(store.node_count(), 0);
        assert_eq!(store.params, PhysicsParams::default());
        assert_eq!(store.tick, 0);
        assert!(store.allocate_id() > first);
    }

    #[test]
    fn test_cognition_saturates() {
        let mut cognition = Cognition::new(Vector2::new(1.0, 1.0), Vector2::new(0.9, 0.9), Vector2::new(0.9, 0.9));
        cognition.thought_intensity = 1.0;
        for _ in 0..10_000 {
            cognition.evolve(0.016, 1.0);
        }

        assert!(cognition.memory.iter().all(|c| *c <= 1.0));
        assert!(cognition.processing.iter().all(|c| *c <= 1.0));
        assert!(cognition.consciousness_depth <= 1.0);
        assert_eq!(cognition.thought_intensity, 0.0);
    }
}
