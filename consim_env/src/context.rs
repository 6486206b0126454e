//! Core environment context trait for the CONSIM engine.

use async_trait::async_trait;
use rand_chacha::ChaCha8Rng;
use std::time::{Duration, SystemTime};

/// The central interface for Environment Interaction.
///
/// This trait abstracts the "real world" so that the simulation clock can run
/// in both production (tokio) and deterministic simulation.
///
/// # Implementations
///
/// - **Production**: `TokioContext` - wraps `tokio::time`, OS entropy or a fixed seed
/// - **Simulation**: `SimContext` (in `consim_sim`) - virtual clock, `ChaCha8Rng(seed)`
///
/// # Determinism
///
/// All methods that would normally introduce non-determinism
/// (time, randomness) are controlled by the implementation.
#[async_trait]
pub trait ConsimContext: Send + Sync + 'static {
    /// Returns the current monotonic time since context creation.
    ///
    /// The simulation clock measures tick overruns against this.
    fn now(&self) -> Duration;

    /// Returns the wall-clock time used for envelope timestamps.
    fn system_time(&self) -> SystemTime;

    /// Suspends execution for the given duration.
    ///
    /// In production: wraps `tokio::time::sleep`
    /// In simulation: advances the virtual clock
    async fn sleep(&self, duration: Duration);

    /// Derives an independent random stream.
    ///
    /// The engine keeps physics, branch drift and spawning on separate
    /// streams so that, for example, adding a node does not shift the
    /// jitter sequence of every other node.
    ///
    /// # Arguments
    /// * `stream` - Stream selector combined with the context seed
    fn derive_rng(&self, stream: u64) -> ChaCha8Rng;

    /// Returns the context's seed (for logging/debugging).
    ///
    /// Returns 0 when the context draws from OS entropy.
    fn seed(&self) -> u64;

    /// Milliseconds since the Unix epoch, as carried in `Envelope::timestamp`.
    fn timestamp_ms(&self) -> f64 {
        self.system_time()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs_f64() * 1000.0)
            .unwrap_or(0.0)
    }
}
