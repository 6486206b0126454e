//! Simulation Runtime - drives the `Engine` on a fixed cadence.
//!
//! This module is the integration layer between the synchronous engine and
//! the environment abstraction (`ConsimContext`).
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     SimulationRuntime                        │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │              Context: ConsimContext                    │  │
//! │  │  • now()   → overrun detection                         │  │
//! │  │  • sleep() → tick cadence                              │  │
//! │  │  • derive_rng() → physics / branch / spawn streams     │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! │                                                              │
//! │  requests ──► drain ──► Engine::apply_batch ──► Engine::step │
//! │                                          │                   │
//! │                            latest watch ◄┴► Broadcaster      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! All mutation happens on the loop. Transports talk to it only through an
//! `EngineHandle`: requests in over an mpsc channel, snapshots out over
//! `watch` slots.
//!
//! # Usage
//!
//! ```ignore
//! use consim_core::{EngineConfig, SimulationRuntime};
//! use consim_env::TokioContext;
//!
//! let ctx = Arc::new(TokioContext::with_seed(42));
//! let (runtime, handle) = SimulationRuntime::new(ctx, EngineConfig::default())?;
//! tokio::spawn(runtime.run());
//!
//! handle.add_node(0.0, 0.0).await?;
//! ```

use consim_env::{ConsimContext, Envelope, SubscriberId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::broadcast::{Broadcaster, Subscription};
use crate::command::{Command, CommandOutcome};
use crate::config::{EngineConfig, ParameterUpdate, PhysicsParams};
use crate::engine::{Engine, EngineRngs};
use crate::error::{CommandError, ConfigError, EngineError, ValidationError};
use crate::metrics::GlobalStats;
use crate::snapshot::Snapshot;
use crate::state::{PointerInteraction, ViewMode};

/// Message from a handle to the clock loop.
#[derive(Debug)]
pub enum EngineRequest {
    Command {
        command: Command,
        reply: oneshot::Sender<Result<CommandOutcome, CommandError>>,
    },
    Subscribe {
        id: SubscriberId,
        reply: oneshot::Sender<Subscription>,
    },
    Unsubscribe {
        id: SubscriberId,
    },
    Shutdown,
}

/// Liveness summary exposed by the `status` operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub running: bool,
    pub connected_clients: usize,
    pub node_count: usize,
    pub cluster_count: usize,
    pub tick: u64,
    pub time: f64,
    pub target_tick_rate: f64,
    pub fault_total: u64,
}

/// Totals reported when the loop exits.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub ticks: u64,
    pub final_tick: u64,
    pub commands_applied: u64,
    pub commands_rejected: u64,
    pub overruns: u64,
    pub frames_published: u64,
}

/// The authoritative clock loop.
pub struct SimulationRuntime<Ctx: ConsimContext> {
    ctx: Arc<Ctx>,
    engine: Engine,
    requests: mpsc::UnboundedReceiver<EngineRequest>,
    broadcaster: Broadcaster,
    latest: watch::Sender<Arc<Snapshot>>,
    status: watch::Sender<EngineStatus>,
    max_ticks: Option<u64>,
}

impl<Ctx: ConsimContext> SimulationRuntime<Ctx> {
    /// Builds the engine (entropy from `ctx`) and the handle that talks to it.
    pub fn new(ctx: Arc<Ctx>, config: EngineConfig) -> Result<(Self, EngineHandle), ConfigError> {
        let rngs = EngineRngs::from_context(ctx.as_ref());
        let engine = Engine::new(config.clone(), rngs)?;

        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (latest_tx, latest_rx) = watch::channel(engine.snapshot());
        let (status_tx, status_rx) = watch::channel(EngineStatus {
            running: true,
            node_count: engine.node_count(),
            target_tick_rate: config.target_tick_rate(),
            ..EngineStatus::default()
        });

        let runtime = Self {
            ctx,
            broadcaster: Broadcaster::new(config.broadcast_every_ticks),
            engine,
            requests: request_rx,
            latest: latest_tx,
            status: status_tx,
            max_ticks: None,
        };
        let handle = EngineHandle {
            requests: request_tx,
            latest: latest_rx,
            status: status_rx,
            config: Arc::new(config),
        };
        Ok((runtime, handle))
    }

    /// Stops the loop after `ticks` ticks (used by tests and batch runs).
    pub fn with_max_ticks(mut self, ticks: u64) -> Self {
        self.max_ticks = Some(ticks);
        self
    }

    /// Runs until shutdown, until every handle is dropped, or until the
    /// tick limit. Only a clock fault ends it with an error.
    pub async fn run(mut self) -> Result<RunSummary, EngineError> {
        let interval = self.engine.config().tick_interval();
        info!(
            "Simulation loop starting: {:.1} Hz, {} nodes, seed {}",
            self.engine.config().target_tick_rate(),
            self.engine.node_count(),
            self.ctx.seed()
        );

        let mut summary = RunSummary::default();
        let mut previous = self.ctx.now();

        let result = loop {
            let started = self.ctx.now();
            if started < previous {
                break Err(EngineError::ClockRegression {
                    previous_ms: previous.as_millis(),
                    current_ms: started.as_millis(),
                });
            }
            previous = started;

            // 1. Drain the queue (tick boundary)
            let stop = self.drain(&mut summary);

            // 2. Advance one tick unless stopping
            if stop {
                break Ok(());
            }
            let report = self.engine.step();
            summary.ticks += 1;
            summary.final_tick = report.tick;

            // 3. Publish
            let snapshot = self.engine.snapshot();
            self.latest.send_replace(Arc::clone(&snapshot));
            if self.broadcaster.should_publish(report.tick) {
                match snapshot.to_frame(self.ctx.timestamp_ms()) {
                    Ok(frame) => {
                        self.broadcaster.publish(frame);
                        summary.frames_published += 1;
                    }
                    Err(e) => warn!("Failed to serialize snapshot for tick {}: {}", report.tick, e),
                }
            }
            self.publish_status(true);

            if self.max_ticks.is_some_and(|max| summary.ticks >= max) {
                break Ok(());
            }

            // 4. Hold the cadence; an overrun slips the clock but skips nothing
            let elapsed = self.ctx.now().saturating_sub(started);
            if elapsed < interval {
                self.ctx.sleep(interval - elapsed).await;
            } else {
                summary.overruns += 1;
                debug!("Tick {} overran its {:?} budget by {:?}", report.tick, interval, elapsed - interval);
                tokio::task::yield_now().await;
            }
        };

        self.broadcaster.close();
        self.publish_status(false);
        info!(
            "Simulation loop stopped after {} ticks ({} commands applied, {} rejected)",
            summary.ticks, summary.commands_applied, summary.commands_rejected
        );
        result.map(|()| summary)
    }

    /// Applies every queued request. Returns true if the loop should stop.
    fn drain(&mut self, summary: &mut RunSummary) -> bool {
        let mut commands = Vec::new();
        let mut replies = Vec::new();
        let mut joining = Vec::new();
        let mut stop = false;

        loop {
            match self.requests.try_recv() {
                Ok(EngineRequest::Command { command, reply }) => {
                    commands.push(command);
                    replies.push(reply);
                }
                Ok(EngineRequest::Subscribe { id, reply }) => joining.push((id, reply)),
                Ok(EngineRequest::Unsubscribe { id }) => {
                    self.broadcaster.unsubscribe(&id);
                }
                Ok(EngineRequest::Shutdown) => {
                    info!("Shutdown requested");
                    stop = true;
                    break;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    info!("All engine handles dropped");
                    stop = true;
                    break;
                }
            }
        }

        let results = self.engine.apply_batch(commands);
        let reset = results.iter().any(|r| matches!(r, Ok(CommandOutcome::Reset)));
        for (result, reply) in results.into_iter().zip(replies) {
            match &result {
                Ok(_) => summary.commands_applied += 1,
                Err(e) => {
                    summary.commands_rejected += 1;
                    warn!("Command rejected: {}", e);
                }
            }
            let _ = reply.send(result);
        }
        if reset {
            self.broadcaster.forget_last_frame();
        }

        // Joined after the batch so a same-drain reset never hands out a stale frame
        for (id, reply) in joining {
            let subscription = self.broadcaster.subscribe(id);
            // The requester may have given up waiting
            let _ = reply.send(subscription);
        }
        stop
    }

    fn publish_status(&self, running: bool) {
        let snapshot = self.engine.snapshot();
        self.status.send_replace(EngineStatus {
            running,
            connected_clients: self.broadcaster.subscriber_count(),
            node_count: snapshot.node_count(),
            cluster_count: snapshot.cluster_count(),
            tick: snapshot.tick,
            time: snapshot.time,
            target_tick_rate: self.engine.config().target_tick_rate(),
            fault_total: self.engine.store().fault_total(),
        });
    }
}

// ============================================================================
// HANDLE
// ============================================================================

/// Cloneable client of the clock loop.
///
/// Exposes the same operations to every transport, push or pull.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    requests: mpsc::UnboundedSender<EngineRequest>,
    latest: watch::Receiver<Arc<Snapshot>>,
    status: watch::Receiver<EngineStatus>,
    config: Arc<EngineConfig>,
}

impl EngineHandle {
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validates locally, queues for the next tick boundary and waits for
    /// the outcome.
    pub async fn execute(&self, command: Command) -> Result<CommandOutcome, CommandError> {
        command.validate(&self.config)?;
        let (reply, outcome) = oneshot::channel();
        self.requests
            .send(EngineRequest::Command { command, reply })
            .map_err(|_| CommandError::EngineStopped)?;
        outcome.await.map_err(|_| CommandError::EngineStopped)?
    }

    /// Parses and executes a client envelope.
    pub async fn submit(&self, envelope: &Envelope) -> Result<CommandOutcome, CommandError> {
        let command = Command::from_envelope(envelope)?;
        self.execute(command).await
    }

    pub async fn add_node(&self, x: f64, y: f64) -> Result<CommandOutcome, CommandError> {
        self.execute(Command::AddNode { x, y }).await
    }

    pub async fn update_parameters(&self, update: ParameterUpdate) -> Result<CommandOutcome, CommandError> {
        self.execute(Command::ParameterUpdate(update)).await
    }

    pub async fn mouse_influence(&self, pointer: PointerInteraction) -> Result<CommandOutcome, CommandError> {
        self.execute(Command::MouseInfluence(pointer)).await
    }

    pub async fn collapse(&self, x: f64, y: f64) -> Result<CommandOutcome, CommandError> {
        self.execute(Command::QuantumCollapse { x, y }).await
    }

    pub async fn reset(&self) -> Result<CommandOutcome, CommandError> {
        self.execute(Command::Reset).await
    }

    pub async fn set_mode(&self, mode: ViewMode) -> Result<CommandOutcome, CommandError> {
        self.execute(Command::SetMode(mode)).await
    }

    /// Latest completed snapshot (full-state fetch).
    pub fn state(&self) -> Arc<Snapshot> {
        Arc::clone(&self.latest.borrow())
    }

    pub fn stats(&self) -> GlobalStats {
        self.latest.borrow().global_stats.clone()
    }

    pub fn parameters(&self) -> PhysicsParams {
        self.latest.borrow().params
    }

    pub fn status(&self) -> EngineStatus {
        self.status.borrow().clone()
    }

    /// Registers a push subscriber.
    pub async fn subscribe(&self, id: SubscriberId) -> Result<Subscription, CommandError> {
        let (reply, subscription) = oneshot::channel();
        self.requests
            .send(EngineRequest::Subscribe { id, reply })
            .map_err(|_| CommandError::EngineStopped)?;
        subscription.await.map_err(|_| CommandError::EngineStopped)
    }

    /// Removes a push subscriber. A stopped engine has none to remove.
    pub fn unsubscribe(&self, id: SubscriberId) {
        let _ = self.requests.send(EngineRequest::Unsubscribe { id });
    }

    /// Asks the loop to stop after applying what is already queued.
    pub fn shutdown(&self) {
        let _ = self.requests.send(EngineRequest::Shutdown);
    }

    /// Waits until a snapshot at or past `tick` is available.
    pub async fn wait_for_tick(&self, tick: u64) -> Result<Arc<Snapshot>, CommandError> {
        let mut latest = self.latest.clone();
        loop {
            {
                let snapshot = latest.borrow_and_update();
                if snapshot.tick >= tick {
                    return Ok(Arc::clone(&snapshot));
                }
            }
            latest.changed().await.map_err(|_| CommandError::EngineStopped)?;
        }
    }

    /// Answers one client envelope, query or command, with a reply envelope.
    ///
    /// Queries: `status`, `stats`, `state`, `parameters`. Commands reply
    /// with `command_result` or `command_error { code, reason }`.
    pub async fn dispatch(&self, request: &Envelope, timestamp: f64) -> Envelope {
        let kind = request.kind.as_str();
        let query = match kind {
            "status" => Some(serde_json::to_value(self.status())),
            "stats" => Some(serde_json::to_value(self.stats())),
            "state" => Some(serde_json::to_value(self.state().as_ref())),
            "parameters" => Some(serde_json::to_value(self.parameters())),
            _ => None,
        };

        if let Some(value) = query {
            return match value {
                Ok(data) => Envelope::new(kind, data, timestamp),
                Err(e) => error_envelope(kind, "serialization_error", &e.to_string(), timestamp),
            };
        }

        if !Command::is_command_kind(kind) {
            let err = CommandError::from(ValidationError::UnknownType(kind.to_string()));
            return error_envelope(kind, err.code(), &err.to_string(), timestamp);
        }

        match self.submit(request).await {
            Ok(outcome) => {
                let result = serde_json::to_value(&outcome).unwrap_or(JsonValue::Null);
                Envelope::new("command_result", json!({ "command": kind, "result": result }), timestamp)
            }
            Err(e) => error_envelope(kind, e.code(), &e.to_string(), timestamp),
        }
    }
}

fn error_envelope(command: &str, code: &str, reason: &str, timestamp: f64) -> Envelope {
    Envelope::new(
        "command_error",
        json!({ "command": command, "code": code, "reason": reason }),
        timestamp,
    )
}

/// Ticks needed to cover `duration` at the configured cadence.
pub fn ticks_for(config: &EngineConfig, duration: Duration) -> u64 {
    (duration.as_millis() as u64).div_ceil(config.tick_interval_ms.max(1))
}
