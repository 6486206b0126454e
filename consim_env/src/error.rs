//! Error types for the CONSIM environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Delivery to a subscriber failed (socket error, peer gone, etc.)
    #[error("Transport fault: {0}")]
    TransportFault(String),

    /// Envelope serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl EnvError {
    /// Creates a transport fault.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::TransportFault(msg.into())
    }
}

impl From<serde_json::Error> for EnvError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
