//! Error taxonomy for the CONSIM engine.
//!
//! A fault affecting one node or one command is isolated and reported; it
//! never halts the tick loop. Only `EngineError` is fatal.

use thiserror::Error;

/// A command was malformed or out of range. Nothing was mutated.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Envelope `type` is not a known command or query
    #[error("unknown message type: {0}")]
    UnknownType(String),

    /// Envelope `data` does not match the schema of its type
    #[error("malformed {kind} payload: {reason}")]
    MalformedData { kind: String, reason: String },

    /// A coordinate is NaN or infinite
    #[error("non-finite coordinate ({x}, {y})")]
    NonFiniteCoordinate { x: f64, y: f64 },

    /// A coordinate lies outside the simulation domain
    #[error("coordinate ({x}, {y}) outside domain ±{limit}")]
    OutOfBounds { x: f64, y: f64, limit: f64 },

    /// Pointer-interaction mode not one of push/pull/vortex/wave/string
    #[error("unknown pointer mode: {0}")]
    UnknownPointerMode(String),

    /// View mode not recognised
    #[error("unknown view mode: {0}")]
    UnknownViewMode(String),

    /// Physics parameter outside its accepted range
    #[error("parameter {name}={value} outside its accepted range ({min} to {max})")]
    ParameterOutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    /// `parameter_update` carried no parameters
    #[error("parameter update names no parameters")]
    EmptyParameterUpdate,
}

/// Why a command was not applied.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    /// Rejected before reaching the state store
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// `add_node` while the population is at its configured maximum
    #[error("capacity exceeded: node count at maximum {max}")]
    CapacityExceeded { max: usize },

    /// Discarded because a later `reset` in the same batch wiped the state
    #[error("superseded by a reset queued in the same tick")]
    Superseded,

    /// The simulation loop is no longer running
    #[error("engine stopped")]
    EngineStopped,
}

impl CommandError {
    /// Stable machine-readable code for transports.
    pub fn code(&self) -> &'static str {
        match self {
            CommandError::Validation(_) => "validation_error",
            CommandError::CapacityExceeded { .. } => "capacity_exceeded",
            CommandError::Superseded => "superseded",
            CommandError::EngineStopped => "engine_stopped",
        }
    }
}

/// Invalid engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Fatal scheduler faults.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The context clock went backwards
    #[error("clock regression: {previous_ms}ms -> {current_ms}ms")]
    ClockRegression { previous_ms: u128, current_ms: u128 },
}
