//! CONSIM Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" abstraction allowing the CONSIM engine
//! to run in both **Production** (tokio, wall clock) and **Simulation**
//! (virtual clock, seeded entropy) environments.
//!
//! # Core Concept: The Reactor Pattern
//!
//! The simulation loop never touches I/O directly. It reaches the outside
//! world only through:
//! - Time (`now()`, `sleep()`)
//! - Entropy (`derive_rng()`)
//! - Subscriber sinks (`FrameSink::send_frame()`)
//!
//! By deriving all entropy from a single 64-bit seed, any run becomes
//! reproducible via its seed number.
//!
//! # Example
//!
//! ```ignore
//! use consim_env::{ConsimContext, FrameSink};
//!
//! async fn clock_loop<Ctx: ConsimContext>(ctx: &Ctx) {
//!     loop {
//!         let started = ctx.now();
//!         tick();
//!         ctx.sleep(Duration::from_millis(16).saturating_sub(ctx.now() - started)).await;
//!     }
//! }
//! ```

mod context;
mod sink;
mod types;
mod error;
mod tokio_impl;

pub use context::ConsimContext;
pub use sink::{Frame, FrameSink};
pub use types::{Envelope, SubscriberId};
pub use error::EnvError;
pub use tokio_impl::TokioContext;
