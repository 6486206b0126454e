//! Engine configuration and runtime-tunable physics parameters.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{ConfigError, ValidationError};

// ============================================================================
// ENGINE CONFIGURATION
// ============================================================================

/// What happens to a node that leaves the domain without tunneling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryMode {
    /// Clamp to the edge and bounce back
    #[default]
    Reflect,
    /// Re-enter from the opposite edge, velocity kept
    Wrap,
}

/// Static configuration for one simulation instance.
///
/// Loaded from JSON (every field optional) and then overridden by CLI flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Master seed (0 = OS entropy)
    pub seed: u64,

    /// Number of universe branches N (default: 3)
    pub branch_count: usize,

    /// Nodes spawned when the engine starts (default: 128)
    pub initial_nodes: usize,

    /// Capacity for `add_node` (default: 2048)
    pub max_nodes: usize,

    /// Fixed tick cadence in milliseconds (default: 16)
    pub tick_interval_ms: u64,

    /// Push a snapshot to subscribers every N ticks (default: 2)
    pub broadcast_every_ticks: u64,

    /// Domain is [-W, W] on both axes (default: 500)
    pub world_half_extent: f64,

    /// Reflect or wrap at the boundary
    pub boundary_mode: BoundaryMode,

    /// Probability of tunneling on a boundary crossing (default: 0.05)
    pub tunnel_probability: f64,

    /// Frequency band [low, high] in Hz for new nodes (default: 35-45)
    pub frequency_band: [f64; 2],

    /// Node radius before consciousness scaling
    pub base_radius: f64,

    /// Extra separation added to r_i + r_j before nodes repel
    pub contact_margin: f64,

    /// Standard deviation of the Gaussian attention envelope around the origin
    pub attention_sigma: f64,

    /// Cluster link: maximum circular phase distance (radians)
    pub cluster_phase_threshold: f64,

    /// Cluster link: maximum frequency difference (Hz)
    pub cluster_frequency_threshold: f64,

    /// Cluster link: maximum spatial distance
    pub cluster_distance_threshold: f64,

    /// Smallest component reported as a cluster
    pub min_cluster_size: usize,

    /// Radius of the `quantum_collapse` region effect
    pub collapse_radius: f64,

    /// How far a collapse moves λ toward the chosen branch (0-1)
    pub collapse_strength: f64,

    /// Time constant of the post-collapse relaxation (seconds)
    pub collapse_relaxation_secs: f64,

    /// Mean-reversion rate of the branch drift
    pub branch_drift_rate: f64,

    /// Noise amplitude of the branch drift
    pub branch_drift_noise: f64,

    /// Numeric-fault records retained for inspection
    pub fault_log_capacity: usize,

    /// Emit a stats line every N ticks at DEBUG level (0 = never)
    pub stats_log_every_ticks: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            branch_count: 3,
            initial_nodes: 128,
            max_nodes: 2048,
            tick_interval_ms: 16,
            broadcast_every_ticks: 2,
            world_half_extent: 500.0,
            boundary_mode: BoundaryMode::Reflect,
            tunnel_probability: 0.05,
            frequency_band: [35.0, 45.0],
            base_radius: 3.0,
            contact_margin: 0.0,
            attention_sigma: 200.0,
            cluster_phase_threshold: 0.5,
            cluster_frequency_threshold: 5.0,
            cluster_distance_threshold: 80.0,
            min_cluster_size: 2,
            collapse_radius: 200.0,
            collapse_strength: 0.8,
            collapse_relaxation_secs: 1.5,
            branch_drift_rate: 0.5,
            branch_drift_noise: 0.05,
            fault_log_capacity: 64,
            stats_log_every_ticks: 300,
        }
    }
}

impl EngineConfig {
    /// Parses a configuration from JSON text. Missing fields take defaults.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Checks cross-field consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.branch_count == 0 {
            return invalid("branch_count must be at least 1");
        }
        if self.initial_nodes > self.max_nodes {
            return invalid("initial_nodes exceeds max_nodes");
        }
        if self.tick_interval_ms == 0 {
            return invalid("tick_interval_ms must be positive");
        }
        if self.broadcast_every_ticks == 0 {
            return invalid("broadcast_every_ticks must be at least 1");
        }
        if !(self.world_half_extent.is_finite() && self.world_half_extent > 0.0) {
            return invalid("world_half_extent must be positive");
        }
        if !(0.0..=1.0).contains(&self.tunnel_probability) {
            return invalid("tunnel_probability must lie in [0, 1]");
        }
        let [low, high] = self.frequency_band;
        if !(low.is_finite() && high.is_finite() && 0.0 < low && low <= high) {
            return invalid("frequency_band must satisfy 0 < low <= high");
        }
        if !(self.base_radius > 0.0) || self.contact_margin < 0.0 {
            return invalid("base_radius must be positive and contact_margin non-negative");
        }
        if !(self.attention_sigma > 0.0) {
            return invalid("attention_sigma must be positive");
        }
        if !(self.cluster_distance_threshold > 0.0)
            || self.cluster_phase_threshold < 0.0
            || self.cluster_frequency_threshold < 0.0
        {
            return invalid("cluster thresholds must be non-negative (distance positive)");
        }
        if self.min_cluster_size < 2 {
            return invalid("min_cluster_size must be at least 2");
        }
        if !(0.0..=1.0).contains(&self.collapse_strength) || self.collapse_radius < 0.0 {
            return invalid("collapse_strength must lie in [0, 1] and collapse_radius be non-negative");
        }
        if !(self.collapse_relaxation_secs > 0.0) {
            return invalid("collapse_relaxation_secs must be positive");
        }
        if self.branch_drift_rate < 0.0 || self.branch_drift_noise < 0.0 {
            return invalid("branch drift rate and noise must be non-negative");
        }
        Ok(())
    }

    /// Tick cadence as a `Duration`.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Tick length in seconds (before time dilation).
    pub fn dt(&self) -> f64 {
        self.tick_interval_ms as f64 / 1000.0
    }

    /// Nominal ticks per second.
    pub fn target_tick_rate(&self) -> f64 {
        1000.0 / self.tick_interval_ms as f64
    }

    /// Returns true if the point lies inside the domain.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x.abs() <= self.world_half_extent && y.abs() <= self.world_half_extent
    }
}

// ============================================================================
// PHYSICS PARAMETERS
// ============================================================================

/// Accepted interval of one physics parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamRange {
    pub min: f64,
    pub max: f64,
    pub min_inclusive: bool,
    pub max_inclusive: bool,
}

impl ParamRange {
    /// `[min, max]`
    pub const fn closed(min: f64, max: f64) -> Self {
        Self { min, max, min_inclusive: true, max_inclusive: true }
    }

    /// `[min, max)`
    pub const fn open_above(min: f64, max: f64) -> Self {
        Self { min, max, min_inclusive: true, max_inclusive: false }
    }

    /// `(min, max]`
    pub const fn open_below(min: f64, max: f64) -> Self {
        Self { min, max, min_inclusive: false, max_inclusive: true }
    }

    /// False for NaN.
    pub fn contains(&self, value: f64) -> bool {
        let above = if self.min_inclusive { value >= self.min } else { value > self.min };
        let below = if self.max_inclusive { value <= self.max } else { value < self.max };
        above && below
    }
}

pub const GRAVITY_RANGE: ParamRange = ParamRange::closed(0.0, 10.0);
pub const FRICTION_RANGE: ParamRange = ParamRange::open_above(0.0, 1.0);
pub const ELASTICITY_RANGE: ParamRange = ParamRange::closed(0.0, 2.0);
pub const TIME_DILATION_RANGE: ParamRange = ParamRange::open_below(0.0, 5.0);
pub const FIELD_STRENGTH_RANGE: ParamRange = ParamRange::closed(0.0, 5.0);

/// Physics parameters adjustable at runtime via `parameter_update`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicsParams {
    /// Attraction toward the origin
    pub gravity: f64,
    /// Velocity multiplier applied once per tick (< 1)
    pub friction: f64,
    /// Scales collision repulsion and boundary restitution
    pub elasticity: f64,
    /// Multiplies dt for phase, branches and integration
    pub time_dilation: f64,
    /// Scales pointer reach/force and stochastic jitter
    pub field_strength: f64,
}

impl Default for PhysicsParams {
    fn default() -> Self {
        Self {
            gravity: 1.0,
            friction: 0.99,
            elasticity: 0.8,
            time_dilation: 1.0,
            field_strength: 1.0,
        }
    }
}

/// Any subset of the physics parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ParameterUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gravity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friction: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elasticity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_dilation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_strength: Option<f64>,
}

impl ParameterUpdate {
    /// Returns true if no parameter is named.
    pub fn is_empty(&self) -> bool {
        self.fields().iter().all(|(_, value, _)| value.is_none())
    }

    fn fields(&self) -> [(&'static str, Option<f64>, ParamRange); 5] {
        [
            ("gravity", self.gravity, GRAVITY_RANGE),
            ("friction", self.friction, FRICTION_RANGE),
            ("elasticity", self.elasticity, ELASTICITY_RANGE),
            ("time_dilation", self.time_dilation, TIME_DILATION_RANGE),
            ("field_strength", self.field_strength, FIELD_STRENGTH_RANGE),
        ]
    }

    /// Checks every named parameter against its range.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.is_empty() {
            return Err(ValidationError::EmptyParameterUpdate);
        }
        for (name, value, range) in self.fields() {
            if let Some(value) = value {
                if !range.contains(value) {
                    return Err(ValidationError::ParameterOutOfRange {
                        name,
                        value,
                        min: range.min,
                        max: range.max,
                    });
                }
            }
        }
        Ok(())
    }

    /// Overwrites the named parameters.
    pub fn apply_to(&self, params: &mut PhysicsParams) {
        if let Some(v) = self.gravity {
            params.gravity = v;
        }
        if let Some(v) = self.friction {
            params.friction = v;
        }
        if let Some(v) = self.elasticity {
            params.elasticity = v;
        }
        if let Some(v) = self.time_dilation {
            params.time_dilation = v;
        }
        if let Some(v) = self.field_strength {
            params.field_strength = v;
        }
    }
}
