//! The Command Channel vocabulary - typed commands, parsing and validation.
//!
//! Validation is pure: a command that fails it is rejected before it is
//! queued and can never touch the State Store.

use consim_env::Envelope;
use nalgebra::Vector2;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, ParameterUpdate, PhysicsParams};
use crate::error::ValidationError;
use crate::snapshot::NodeView;
use crate::state::{PointerInteraction, PointerMode, ViewMode};

/// An external mutation request, applied at a tick boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    AddNode { x: f64, y: f64 },
    ParameterUpdate(ParameterUpdate),
    MouseInfluence(PointerInteraction),
    QuantumCollapse { x: f64, y: f64 },
    Reset,
    SetMode(ViewMode),
}

#[derive(Deserialize)]
struct PointData {
    x: f64,
    y: f64,
}

#[derive(Deserialize)]
struct MouseData {
    x: f64,
    y: f64,
    #[serde(default)]
    active: bool,
    #[serde(default)]
    mode: Option<String>,
}

#[derive(Deserialize)]
struct ModeData {
    mode: String,
}

fn decode<T: DeserializeOwned>(kind: &str, data: &serde_json::Value) -> Result<T, ValidationError> {
    serde_json::from_value(data.clone()).map_err(|e| ValidationError::MalformedData {
        kind: kind.to_string(),
        reason: e.to_string(),
    })
}

impl Command {
    /// Wire name of the command.
    pub fn kind(&self) -> &'static str {
        match self {
            Command::AddNode { .. } => "add_node",
            Command::ParameterUpdate(_) => "parameter_update",
            Command::MouseInfluence(_) => "mouse_influence",
            Command::QuantumCollapse { .. } => "quantum_collapse",
            Command::Reset => "reset",
            Command::SetMode(_) => "set_mode",
        }
    }

    /// Returns true if `kind` names a command (as opposed to a query).
    pub fn is_command_kind(kind: &str) -> bool {
        matches!(
            kind,
            "add_node" | "parameter_update" | "mouse_influence" | "quantum_collapse" | "reset" | "set_mode"
        )
    }

    /// Parses a client envelope. Ranges are checked by [`Command::validate`].
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, ValidationError> {
        let kind = envelope.kind.as_str();
        let data = &envelope.data;
        match kind {
            "add_node" => {
                let p: PointData = decode(kind, data)?;
                Ok(Command::AddNode { x: p.x, y: p.y })
            }
            "parameter_update" => {
                let update = if data.is_null() {
                    ParameterUpdate::default()
                } else {
                    decode(kind, data)?
                };
                Ok(Command::ParameterUpdate(update))
            }
            "mouse_influence" => {
                let m: MouseData = decode(kind, data)?;
                let mode = match m.mode.as_deref() {
                    Some(name) => name.parse()?,
                    None => PointerMode::Push,
                };
                Ok(Command::MouseInfluence(PointerInteraction {
                    position: Vector2::new(m.x, m.y),
                    mode,
                    active: m.active,
                }))
            }
            "quantum_collapse" => {
                let p: PointData = decode(kind, data)?;
                Ok(Command::QuantumCollapse { x: p.x, y: p.y })
            }
            "reset" => Ok(Command::Reset),
            "set_mode" => {
                let m: ModeData = decode(kind, data)?;
                Ok(Command::SetMode(m.mode.parse()?))
            }
            other => Err(ValidationError::UnknownType(other.to_string())),
        }
    }

    /// Checks coordinates and parameter ranges against the configuration.
    pub fn validate(&self, config: &EngineConfig) -> Result<(), ValidationError> {
        match self {
            Command::AddNode { x, y } | Command::QuantumCollapse { x, y } => check_point(*x, *y, config),
            Command::MouseInfluence(pointer) => {
                let (x, y) = (pointer.position.x, pointer.position.y);
                if x.is_finite() && y.is_finite() {
                    Ok(())
                } else {
                    Err(ValidationError::NonFiniteCoordinate { x, y })
                }
            }
            Command::ParameterUpdate(update) => update.validate(),
            Command::Reset | Command::SetMode(_) => Ok(()),
        }
    }
}

fn check_point(x: f64, y: f64, config: &EngineConfig) -> Result<(), ValidationError> {
    if !x.is_finite() || !y.is_finite() {
        return Err(ValidationError::NonFiniteCoordinate { x, y });
    }
    if !config.contains(x, y) {
        return Err(ValidationError::OutOfBounds {
            x,
            y,
            limit: config.world_half_extent,
        });
    }
    Ok(())
}

/// Result of a successfully applied command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommandOutcome {
    NodeAdded { node: NodeView },
    ParametersUpdated { params: PhysicsParams },
    PointerUpdated { pointer: PointerInteraction },
    CollapseTriggered { affected: usize, branch: usize },
    Reset,
    ModeChanged { mode: ViewMode },
}
