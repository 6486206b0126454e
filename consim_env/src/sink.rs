//! Subscriber sink abstraction for snapshot delivery.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::EnvError;
use crate::types::SubscriberId;

/// One serialized snapshot, ready for delivery.
///
/// The payload is serialized once per broadcast and shared by every
/// subscriber, so cloning a frame is cheap.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Tick the snapshot was taken at
    pub tick: u64,

    /// Serialized envelope text
    pub payload: Arc<str>,
}

impl Frame {
    /// Creates a frame from serialized text.
    pub fn new(tick: u64, payload: impl Into<Arc<str>>) -> Self {
        Self {
            tick,
            payload: payload.into(),
        }
    }

    /// Returns the payload size in bytes.
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

/// Abstraction for delivering frames to one renderer.
///
/// # Implementations
///
/// - **Production**: WebSocket connection (`consim_server`)
/// - **Simulation**: in-memory recorder with fault injection (`consim_sim`)
///
/// # Frame Flow
///
/// ```text
/// Clock loop            Broadcaster               Sink
///   |                       |                       |
///   |-- publish(frame) ---->|  (depth-1, latest)    |
///   |                       |-- next_frame() ------>|
///   |                       |                       |-- send_frame()
/// ```
#[async_trait]
pub trait FrameSink: Send + 'static {
    /// Delivers a frame to the subscriber.
    ///
    /// # Returns
    /// * `Ok(())` - Frame handed to the transport
    /// * `Err(EnvError::TransportFault)` - The subscriber should be dropped
    async fn send_frame(&mut self, frame: &Frame) -> Result<(), EnvError>;

    /// Returns the subscriber this sink delivers to.
    fn subscriber_id(&self) -> SubscriberId;
}
