//! Telemetry source abstraction.
//!
//! Provides a unified trait for reading decoded telemetry samples from
//! different sources: in-memory replay, JSON lines (stdin or file), and the
//! built-in lap simulator.

use std::collections::VecDeque;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::simulation::{LapSimulator, SimulationParams};
use crate::types::TelemetrySample;

/// Events produced by a telemetry source.
pub enum SourceEvent {
    /// A decoded sample was read.
    Sample(TelemetrySample),
    /// Source reached end of data.
    Eof,
}

/// Trait abstracting where telemetry samples come from.
///
/// Implementations handle format parsing and pacing internally.
/// The processing loop calls [`next_sample`](TelemetrySource::next_sample) in a
/// `select!` with cancellation.
#[async_trait]
pub trait TelemetrySource: Send + 'static {
    /// Read the next sample. Returns `SourceEvent::Eof` when no more data is available.
    async fn next_sample(&mut self) -> Result<SourceEvent>;

    /// Human-readable name for logging (e.g. "replay", "stdin").
    fn source_name(&self) -> &str;
}

async fn pace(delay_ms: u64, yielded_first: bool) {
    // No delay before the first sample
    if yielded_first && delay_ms > 0 {
        tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
    }
}

// ============================================================================
// Replay Source
// ============================================================================

/// Replays pre-loaded samples with optional inter-sample delay.
pub struct ReplaySource {
    samples: std::vec::IntoIter<TelemetrySample>,
    delay_ms: u64,
    yielded_first: bool,
}

impl ReplaySource {
    pub fn new(samples: Vec<TelemetrySample>, delay_ms: u64) -> Self {
        Self {
            samples: samples.into_iter(),
            delay_ms,
            yielded_first: false,
        }
    }
}

#[async_trait]
impl TelemetrySource for ReplaySource {
    async fn next_sample(&mut self) -> Result<SourceEvent> {
        pace(self.delay_ms, self.yielded_first).await;
        match self.samples.next() {
            Some(s) => {
                self.yielded_first = true;
                Ok(SourceEvent::Sample(s))
            }
            None => Ok(SourceEvent::Eof),
        }
    }

    fn source_name(&self) -> &str {
        "replay"
    }
}

// ============================================================================
// JSON Lines Source (stdin or file, one sample per line)
// ============================================================================

/// Reads JSON-encoded samples, one per line.
///
/// Used with the simulation harness:
/// `simulation --laps 10 | apex-coach --stdin`
pub struct JsonLinesSource<R> {
    reader: R,
    line_buffer: String,
    name: String,
    malformed_lines: u64,
}

impl JsonLinesSource<BufReader<tokio::io::Stdin>> {
    pub fn stdin() -> Self {
        Self::from_reader(BufReader::new(tokio::io::stdin()), "stdin")
    }
}

impl JsonLinesSource<BufReader<tokio::fs::File>> {
    pub async fn open(path: &Path) -> Result<Self> {
        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("Failed to open telemetry file {}", path.display()))?;
        Ok(Self::from_reader(BufReader::new(file), &path.display().to_string()))
    }
}

impl<R> JsonLinesSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    pub fn from_reader(reader: R, name: &str) -> Self {
        Self {
            reader,
            line_buffer: String::with_capacity(1024),
            name: name.to_string(),
            malformed_lines: 0,
        }
    }

    pub fn malformed_lines(&self) -> u64 {
        self.malformed_lines
    }
}

#[async_trait]
impl<R> TelemetrySource for JsonLinesSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    async fn next_sample(&mut self) -> Result<SourceEvent> {
        loop {
            self.line_buffer.clear();
            let bytes = self.reader.read_line(&mut self.line_buffer).await?;
            if bytes == 0 {
                return Ok(SourceEvent::Eof);
            }
            let line = self.line_buffer.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<TelemetrySample>(line) {
                Ok(sample) => return Ok(SourceEvent::Sample(sample)),
                Err(e) => {
                    // Skip malformed lines and keep reading
                    self.malformed_lines += 1;
                    tracing::warn!(source = %self.name, "Failed to parse telemetry sample: {}", e);
                }
            }
        }
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// Synthetic Source (lap simulator)
// ============================================================================

/// Generates laps on demand from the built-in simulator.
pub struct SyntheticSource {
    simulator: LapSimulator,
    buffer: VecDeque<TelemetrySample>,
    laps_remaining: u16,
    closed: bool,
    delay_ms: u64,
    yielded_first: bool,
}

impl SyntheticSource {
    pub fn new(params: SimulationParams, delay_ms: u64) -> Result<Self> {
        let laps_remaining = params.laps;
        Ok(Self {
            simulator: LapSimulator::new(params)?,
            buffer: VecDeque::new(),
            laps_remaining,
            closed: false,
            delay_ms,
            yielded_first: false,
        })
    }

    pub fn simulator(&self) -> &LapSimulator {
        &self.simulator
    }

    fn refill(&mut self) {
        if self.laps_remaining > 0 {
            self.laps_remaining -= 1;
            self.buffer.extend(self.simulator.generate_lap());
        } else if !self.closed {
            self.closed = true;
            self.buffer.push_back(self.simulator.closing_sample());
        }
    }
}

#[async_trait]
impl TelemetrySource for SyntheticSource {
    async fn next_sample(&mut self) -> Result<SourceEvent> {
        pace(self.delay_ms, self.yielded_first).await;
        if self.buffer.is_empty() {
            self.refill();
        }
        match self.buffer.pop_front() {
            Some(s) => {
                self.yielded_first = true;
                Ok(SourceEvent::Sample(s))
            }
            None => Ok(SourceEvent::Eof),
        }
    }

    fn source_name(&self) -> &str {
        "synthetic"
    }
}
