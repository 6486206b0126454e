//! CONSIM Core - Real-Time Consciousness-Field Simulation Engine
//!
//! This library owns the authoritative simulation state and everything that
//! mutates it:
//! 1. **Field**: complex per-node values `A·e^(iτ)` and their aggregates
//! 2. **Branches**: N universes whose weights λ stay on the probability simplex
//! 3. **Physics**: explicit integration with collisions, pointer forces and tunneling
//! 4. **Clusters**: order-independent union-find over an alignment predicate
//!
//! Commands are queued and applied only at tick boundaries; snapshots leave
//! through per-subscriber latest-wins slots so the clock never waits on I/O.

pub mod branches;
pub mod broadcast;
pub mod cluster;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod field;
pub mod metrics;
pub mod physics;
pub mod runtime;
pub mod snapshot;
pub mod spatial;
pub mod state;

// Re-export key types for convenience
pub use broadcast::{pump, Broadcaster, Subscription};
pub use command::{Command, CommandOutcome};
pub use config::{BoundaryMode, EngineConfig, ParameterUpdate, PhysicsParams};
pub use engine::{Engine, EngineRngs, TickReport};
pub use error::{CommandError, ConfigError, EngineError, ValidationError};
pub use metrics::GlobalStats;
pub use runtime::{EngineHandle, EngineStatus, RunSummary, SimulationRuntime};
pub use snapshot::{ClusterView, NodeView, Snapshot, UniverseView};
pub use state::{NumericFault, PointerInteraction, PointerMode, ViewMode};
