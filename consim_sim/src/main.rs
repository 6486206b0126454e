//! CONSIM Deterministic Simulation CLI
//!
//! Runs named scenarios against the engine on a virtual clock.

use anyhow::{bail, Context, Result};
use clap::Parser;
use consim_sim::scenarios::ScenarioId;
use consim_sim::{ScenarioResult, ScenarioRunner};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Export cadence used by `--export`, in ticks.
const EXPORT_EVERY_TICKS: u64 = 10;

/// CONSIM Deterministic Simulation Testing CLI
#[derive(Parser, Debug)]
#[command(name = "consim-sim")]
#[command(about = "Run deterministic simulation scenarios for CONSIM", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (friction_decay, tunnel_rate, reset_defaults, ..., all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Simulated duration in seconds
    #[arg(short, long, default_value = "10")]
    duration: f64,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export recorded frames to a JSON file (single scenario only)
    #[arg(long)]
    export: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging; RUST_LOG overrides the default level
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if !args.json {
        info!("CONSIM Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        let id = args.scenario.parse::<ScenarioId>().map_err(anyhow::Error::msg).with_context(|| {
            let names: Vec<&str> = ScenarioId::all().iter().map(|s| s.name()).collect();
            format!("available scenarios: {}, all", names.join(", "))
        })?;
        vec![id]
    };

    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .context("system clock before UNIX epoch")?
            .as_nanos() as u64
    } else {
        args.seed
    };

    if let Some(path) = &args.export {
        if scenarios.len() > 1 || args.seeds > 1 {
            bail!("--export only supports a single scenario and seed");
        }
        info!("Running with export to: {}", path);
        let result = ScenarioRunner::new(base_seed)
            .with_duration(args.duration)
            .with_export(EXPORT_EVERY_TICKS)
            .run(scenarios[0]);

        match &result.export {
            Some(export) => {
                export
                    .write_to_file(path)
                    .with_context(|| format!("failed to write export to {path}"))?;
                info!("Exported {} frames to {}", export.frames.len(), path);
            }
            None => info!("{} records no frames; nothing exported", scenarios[0].name()),
        }
        report(&[result], args.json)?;
        return Ok(());
    }

    let mut all_results: Vec<ScenarioResult> = Vec::new();
    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let runner = ScenarioRunner::new(seed).with_duration(args.duration);

        for scenario in &scenarios {
            let result = runner.run(*scenario);
            if !args.json {
                if result.passed {
                    info!("✓ {} (seed={}) PASSED", scenario.name(), seed);
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }
            all_results.push(result);
        }
    }

    report(&all_results, args.json)
}

/// Prints the summary and exits non-zero if anything failed.
fn report(results: &[ScenarioResult], json: bool) -> Result<()> {
    let total = results.len();
    let failed: Vec<&ScenarioResult> = results.iter().filter(|r| !r.passed).collect();

    if json {
        let summary = serde_json::json!({
            "total": total,
            "passed": total - failed.len(),
            "failed": failed.len(),
            "results": results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "ticks": r.total_ticks,
                    "time_secs": r.final_time_secs,
                    "nodes": r.final_node_count,
                    "clusters": r.final_cluster_count,
                    "invariant_checks": r.metrics.invariant_checks,
                    "frames_delivered": r.metrics.frames_delivered,
                    "frames_skipped": r.metrics.frames_skipped,
                    "failure_reason": r.failure_reason,
                })
            }).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if failed.is_empty() {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed.len(), total);
            for result in &failed {
                error!(
                    "  - {} seed={}: {}",
                    result.scenario.name(),
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
    }

    // Exit with proper code for CI
    if !failed.is_empty() {
        std::process::exit(1);
    }
    Ok(())
}
