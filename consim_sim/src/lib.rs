//! CONSIM Deterministic Simulation Testing (DST) Harness
//!
//! Runs the engine in a controlled environment where every run is
//! reproducible from its seed.
//!
//! # Core Principle: The Reactor Pattern
//!
//! All sources of non-determinism are intercepted and controlled:
//! - **Time**: Virtual clock advances only when the clock loop sleeps
//! - **Subscribers**: In-memory sinks with injectable lag and failures
//! - **Randomness**: All entropy derived from a single 64-bit seed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         SimWorld                            │
//! │  ┌──────────────────────────────────────────────────────┐   │
//! │  │ SimContext (Virtual Clock + Seeded Streams)          │   │
//! │  └──────────────────────────────────────────────────────┘   │
//! │       │                                                     │
//! │  ┌────▼─────────────┐  commands  ┌─────────────────┐        │
//! │  │      Engine      │◄───────────│  Scenario plan  │        │
//! │  └────┬─────────────┘            └─────────────────┘        │
//! │       │ snapshot per tick                                   │
//! │  ┌────▼─────────────────────────────┐                       │
//! │  │         InvariantOracle          │                       │
//! │  │  (simplex, phases, stats, ...)   │                       │
//! │  └──────────────────────────────────┘                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use consim_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::TunnelRate);
//! assert!(result.passed);
//! ```

mod context;
mod exporter;
mod oracle;
mod runner;
mod subscriber;
mod world;
pub mod scenarios;

pub use context::SimContext;
pub use exporter::{NodePosition, SimEvent, SimExport, SimFrame};
pub use oracle::{InvariantOracle, Violation, SIMPLEX_EPSILON};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner, TUNNEL_TRIALS};
pub use subscriber::SimSubscriber;
pub use world::{SimConfig, SimWorld, WorldTotals};
