//! Apex Coach - real-time corner coaching for time-trial telemetry
//!
//! # Usage
//!
//! ```bash
//! # Run against the built-in lap simulator
//! cargo run --release
//!
//! # Replay decoded telemetry (JSON lines) from a file or stdin
//! ./apex-coach --input session.jsonl --references refs.json
//! ./simulation --laps 10 | ./apex-coach --stdin
//! ```
//!
//! # Environment Variables
//!
//! - `APEX_COACH_CONFIG`: Path to the coach config TOML
//! - `RUST_LOG`: Logging level (default: info)

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use apex_coach::coaching::ActionSelector;
use apex_coach::config::{self, defaults::SIMULATION_BASE_DELAY_MS, watcher, CoachConfig};
use apex_coach::observability::TracingObserver;
use apex_coach::pipeline::{
    CoachingCoordinator, JsonLinesSource, ProcessingLoop, SessionHooks, SyntheticSource, TelemetrySource,
};
use apex_coach::simulation::SimulationParams;
use apex_coach::storage::{ActionSink, InMemoryActionStore, InMemoryReferenceStore, SledActionStore};
use apex_coach::types::CornerAnalysisSession;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "apex-coach")]
#[command(about = "Real-time corner coaching for time-trial telemetry")]
#[command(version)]
struct CliArgs {
    /// Read JSON-lines telemetry from stdin
    /// Use with simulator: ./simulation | ./apex-coach --stdin
    #[arg(long, conflicts_with = "input")]
    stdin: bool,

    /// Path to a JSON-lines telemetry file
    #[arg(long)]
    input: Option<PathBuf>,

    /// Corner references (JSON). Synthetic mode derives its own when omitted.
    #[arg(long)]
    references: Option<PathBuf>,

    /// Coach config TOML (overrides APEX_COACH_CONFIG and ./coach_config.toml)
    #[arg(long, env = "APEX_COACH_CONFIG")]
    config: Option<PathBuf>,

    /// Reload the config file when it changes
    #[arg(long)]
    watch_config: bool,

    /// Persist selected actions to a sled database at this path
    #[arg(long)]
    actions_db: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    /// Speed multiplier for synthetic replay (1 = realtime, 0 = no delay)
    #[arg(long, default_value = "0")]
    speed: u64,

    /// Synthetic laps to drive
    #[arg(long, default_value = "10")]
    laps: u16,

    /// Random seed for the synthetic driver
    #[arg(long)]
    seed: Option<u64>,

    /// Corner ordinal the synthetic driver loses time in
    #[arg(long)]
    slow_corner: Option<u32>,

    /// Synthetic tyre slip level (0.0-1.0)
    #[arg(long, default_value = "0.3")]
    slip_level: f64,
}

// ============================================================================
// Session Output
// ============================================================================

/// Prints the coaching block of every analysed lap.
struct ConsoleHooks;

impl SessionHooks for ConsoleHooks {
    fn on_session(&mut self, session: &CornerAnalysisSession) {
        let selector = ActionSelector::new(config::get().language.locale);
        println!(
            "Lap {} | {} corners ranked | {:.0} ms expected gain",
            session.lap_number,
            session.corner_impacts.len(),
            session.total_expected_gain_ms()
        );
        println!("{}", selector.format_session_output(&session.selected_actions, None));
    }
}

// ============================================================================
// Setup
// ============================================================================

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
    }
}

/// Install the global config; returns the file it came from, if any.
fn init_config(path: Option<&Path>) -> Result<Option<PathBuf>> {
    match path {
        Some(p) => {
            config::init_from_file(p).with_context(|| format!("Failed to load config {}", p.display()))?;
            info!(path = %p.display(), "Loaded coach config");
            Ok(Some(p.to_path_buf()))
        }
        None => {
            let (loaded, source) = CoachConfig::load_with_source();
            if let Some(p) = &source {
                config::set_source(p);
            }
            config::init(loaded);
            Ok(source)
        }
    }
}

fn spawn_config_watcher(path: PathBuf, cancel: CancellationToken) {
    let (tx, mut rx) = mpsc::channel(4);
    tokio::spawn(watcher::run_config_watcher(path, tx, cancel));
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                watcher::ConfigEvent::Reloaded(changes) => {
                    info!(changes = changes.len(), "Config reloaded");
                }
                watcher::ConfigEvent::Error(e) => warn!(error = %e, "Config reload rejected"),
            }
        }
    });
}

fn action_sink(path: Option<&Path>) -> Result<Arc<dyn ActionSink>> {
    Ok(match path {
        Some(p) => Arc::new(
            SledActionStore::open(p).with_context(|| format!("Failed to open action store {}", p.display()))?,
        ),
        None => Arc::new(InMemoryActionStore::new()),
    })
}

async fn run<S: TelemetrySource>(
    mut source: S,
    references: InMemoryReferenceStore,
    sink: Arc<dyn ActionSink>,
    cancel: CancellationToken,
) -> Result<()> {
    let observer = Arc::new(TracingObserver::new());
    let coordinator = CoachingCoordinator::new(Arc::new(references), sink, observer.clone());
    let stats = ProcessingLoop::new(coordinator, ConsoleHooks, cancel)
        .run(&mut source)
        .await;

    info!("{}", observer.metrics().snapshot());
    if stats.laps_dropped > 0 {
        warn!(dropped = stats.laps_dropped, "Some laps were not analysed");
    }
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_json);

    let config_source = init_config(args.config.as_deref())?;
    let cfg = config::get();
    info!(
        locale = %cfg.language.locale,
        assist = %cfg.driver.assist_filter,
        device = %cfg.driver.device_filter,
        budget_ms = cfg.performance.latency_budget_ms,
        "Apex Coach starting"
    );

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    if args.watch_config {
        match config_source {
            Some(path) => spawn_config_watcher(path, cancel_token.clone()),
            None => warn!("--watch-config given but no config file in use"),
        }
    }

    let references = match &args.references {
        Some(p) => InMemoryReferenceStore::load_json(p)
            .with_context(|| format!("Failed to load references {}", p.display()))?,
        None => InMemoryReferenceStore::new(),
    };
    let sink = action_sink(args.actions_db.as_deref())?;

    if args.stdin {
        info!("Input: stdin (JSON lines)");
        run(JsonLinesSource::stdin(), references, sink, cancel_token).await?;
    } else if let Some(path) = &args.input {
        info!(path = %path.display(), "Input: telemetry file");
        let source = JsonLinesSource::open(path).await?;
        run(source, references, sink, cancel_token).await?;
    } else {
        let delay_ms = if args.speed == 0 {
            0
        } else {
            SIMULATION_BASE_DELAY_MS / args.speed
        };
        let params = SimulationParams {
            seed: args.seed,
            laps: args.laps,
            slip_level: args.slip_level.clamp(0.0, 1.0),
            slow_corner: args.slow_corner.map(|c| (c, 0.15)),
            ..Default::default()
        };
        let track_id = params.track_id;
        let source = SyntheticSource::new(params, delay_ms)?;
        if args.references.is_none() {
            for reference in source.simulator().reference_corners() {
                references.insert(track_id, reference)?;
            }
        }
        info!(laps = args.laps, delay_ms, "Input: synthetic laps");
        run(source, references, sink, cancel_token).await?;
    }

    info!("Apex Coach shutdown complete");
    Ok(())
}
