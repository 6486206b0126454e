//! CONSIM Server - streams the simulation to renderers over WebSocket.

mod ws_server;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use consim_core::{BoundaryMode, EngineConfig, SimulationRuntime};
use consim_env::TokioContext;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// CONSIM simulation server
#[derive(Parser, Debug)]
#[command(name = "consim-server")]
#[command(about = "Run the CONSIM engine and stream snapshots over WebSocket", long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:8765")]
    bind: String,

    /// JSON engine configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Master seed (0 = OS entropy); overrides the config file
    #[arg(short, long)]
    seed: Option<u64>,

    /// Nodes spawned at start
    #[arg(long)]
    initial_nodes: Option<usize>,

    /// Tick interval in milliseconds
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Publish a snapshot every N ticks
    #[arg(long)]
    broadcast_every: Option<u64>,

    /// Wrap at the domain edge instead of reflecting
    #[arg(long)]
    wrap: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_json_file(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => EngineConfig::default(),
        };
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(nodes) = self.initial_nodes {
            config.initial_nodes = nodes;
        }
        if let Some(ms) = self.tick_ms {
            config.tick_interval_ms = ms;
        }
        if let Some(every) = self.broadcast_every {
            config.broadcast_every_ticks = every;
        }
        if self.wrap {
            config.boundary_mode = BoundaryMode::Wrap;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; RUST_LOG overrides the default level
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = args.engine_config()?;
    info!("CONSIM Server v{}", env!("CARGO_PKG_VERSION"));

    let ctx = Arc::new(if config.seed == 0 {
        TokioContext::new()
    } else {
        TokioContext::with_seed(config.seed)
    });
    let (runtime, handle) = SimulationRuntime::new(ctx, config)?;
    let mut clock = tokio::spawn(runtime.run());

    let listener = ws_server::bind(&args.bind).await?;
    let server = ws_server::serve(listener, handle.clone());

    tokio::select! {
        result = server => {
            if let Err(err) = result {
                warn!("WebSocket server stopped: {:#}", err);
            }
        }
        result = &mut clock => {
            let summary = result??;
            info!("Simulation loop ended after {} ticks", summary.ticks);
            return Ok(());
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
        }
    }

    handle.shutdown();
    let summary = clock.await??;
    info!(
        "Stopped at tick {} ({} frames published, {} overruns)",
        summary.final_tick, summary.frames_published, summary.overruns
    );
    Ok(())
}
