//! Time-Trial Telemetry Simulation
//!
//! Generates decoded telemetry for a synthetic driver on a five-corner track
//! and writes it as JSON lines. Scenarios:
//! - Clean laps with small timing noise
//! - One corner driven too slowly (ranking and pace coaching)
//! - High tyre slip (Yellow/Red ampels and the safety gate)
//! - Invalid laps (lap discarding)
//!
//! # Usage
//! ```bash
//! ./simulation --laps 10 --slow-corner 3 --references-out refs.json | ./apex-coach --stdin --references refs.json
//! ```

use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use apex_coach::config::defaults::SIMULATION_BASE_DELAY_MS;
use apex_coach::simulation::{LapSimulator, SimulationParams};
use apex_coach::storage::TrackReferences;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "simulation")]
#[command(about = "Time-trial telemetry simulation for apex-coach testing")]
#[command(version)]
struct Args {
    /// Laps to drive (1-500)
    #[arg(short, long, default_value = "10", value_parser = clap::value_parser!(u16).range(1..=500))]
    laps: u16,

    /// Time compression factor (1 = real-time, 0 = as fast as possible)
    #[arg(short, long, default_value = "0")]
    speed: u64,

    /// Samples per second
    #[arg(long, default_value = "20")]
    sample_rate: f64,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Corner ordinal driven too slowly
    #[arg(long)]
    slow_corner: Option<u32>,

    /// Extra time share lost in the slow corner
    #[arg(long, default_value = "0.15")]
    slow_share: f64,

    /// Timing noise as a share of each phase's duration
    #[arg(long, default_value = "0.005")]
    timing_noise: f64,

    /// Tyre slip level (0.0-1.0)
    #[arg(long, default_value = "0.3")]
    slip_level: f64,

    /// Lap numbers reported invalid (repeatable)
    #[arg(long = "invalid-lap")]
    invalid_laps: Vec<u16>,

    /// Session unique id
    #[arg(long, default_value = "1")]
    session_uid: u64,

    /// Track id
    #[arg(long, default_value = "0")]
    track_id: i32,

    /// Write matching corner references (JSON) to this path
    #[arg(long)]
    references_out: Option<PathBuf>,

    /// Suppress the summary on stderr
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let params = SimulationParams {
        seed: args.seed,
        laps: args.laps,
        sample_rate_hz: args.sample_rate,
        timing_noise: args.timing_noise,
        slip_level: args.slip_level.clamp(0.0, 1.0),
        slow_corner: args.slow_corner.map(|c| (c, args.slow_share)),
        invalid_laps: args.invalid_laps.clone(),
        session_uid: args.session_uid,
        track_id: args.track_id,
    };
    let mut simulator = LapSimulator::new(params)?;

    if let Some(path) = &args.references_out {
        let tracks = vec![TrackReferences {
            track_id: args.track_id,
            references: simulator.reference_corners(),
        }];
        let json = serde_json::to_string_pretty(&tracks)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    }

    let delay = (args.speed > 0).then(|| Duration::from_millis(SIMULATION_BASE_DELAY_MS / args.speed));
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    for sample in simulator.generate_session() {
        serde_json::to_writer(&mut out, &sample)?;
        out.write_all(b"\n")?;
        if let Some(d) = delay {
            out.flush()?;
            std::thread::sleep(d);
        }
    }
    out.flush()?;

    if !args.quiet {
        eprintln!(
            "Generated {} samples over {} laps ({} corners per lap)",
            simulator.samples_generated(),
            args.laps,
            simulator.corner_count()
        );
    }
    Ok(())
}
