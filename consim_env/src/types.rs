//! Common types for the CONSIM environment abstraction.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::EnvError;

/// Unique identifier for a snapshot subscriber (one renderer connection).
///
/// Uses UUID v4 for global uniqueness without coordination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubscriberId(pub Uuid);

impl SubscriberId {
    /// Creates a new random SubscriberId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a deterministic SubscriberId from a seed (for simulation).
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&seed.to_le_bytes());
        bytes[8..16].copy_from_slice(&seed.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show first 8 chars for readability
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Message envelope shared by every transport: `{type, data, timestamp}`.
///
/// The payload stays untyped here; the engine decides what a given
/// `type` means and validates `data` accordingly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message type, e.g. `add_node` or `state`
    #[serde(rename = "type")]
    pub kind: String,

    /// Type-specific payload
    #[serde(default)]
    pub data: JsonValue,

    /// Sender's clock in milliseconds since the Unix epoch
    #[serde(default)]
    pub timestamp: f64,
}

impl Envelope {
    /// Creates a new envelope.
    pub fn new(kind: impl Into<String>, data: JsonValue, timestamp: f64) -> Self {
        Self {
            kind: kind.into(),
            data,
            timestamp,
        }
    }

    /// Parses an envelope from JSON text.
    pub fn from_json(text: &str) -> Result<Self, EnvError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Serializes the envelope to JSON text.
    pub fn to_json(&self) -> Result<String, EnvError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_parses_wire_shape() {
        let env = Envelope::from_json(r#"{"type":"add_node","data":{"x":1.5,"y":-2.0},"timestamp":1700000000000}"#)
            .unwrap();
        assert_eq!(env.kind, "add_node");
        assert_eq!(env.data, json!({"x": 1.5, "y": -2.0}));
        assert_eq!(env.timestamp, 1_700_000_000_000.0);
    }

    #[test]
    fn test_envelope_missing_data_defaults_to_null() {
        let env = Envelope::from_json(r#"{"type":"reset"}"#).unwrap();
        assert_eq!(env.kind, "reset");
        assert!(env.data.is_null());
        assert_eq!(env.timestamp, 0.0);
    }

    #[test]
    fn test_envelope_rejects_missing_type() {
        let err = Envelope::from_json(r#"{"data":{}}"#).unwrap_err();
        assert!(matches!(err, EnvError::Serialization(_)));
    }

    #[test]
    fn test_subscriber_id_from_seed_is_stable() {
        assert_eq!(SubscriberId::from_seed(7), SubscriberId::from_seed(7));
        assert_ne!(SubscriberId::from_seed(7), SubscriberId::from_seed(8));
        assert_eq!(SubscriberId::from_seed(7).to_string().len(), 8);
    }
}
