//! Unified sample processing loop shared across all input modes.
//!
//! Ingestion and analysis run on separate tasks. The ingestion side feeds every
//! sample through the [`StreamContext`] and hands finished laps over a bounded
//! channel; the analysis worker owns the [`CoachingCoordinator`]. A slow
//! analysis therefore never stalls ingestion: when the channel is full the lap
//! is dropped and counted.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::context::{LapAnalysisRequest, LapStats, StreamContext};
use super::coordinator::{CoachingCoordinator, CoordinatorStats};
use super::source::{SourceEvent, TelemetrySource};
use crate::config::defaults::{ANALYSIS_CHANNEL_CAPACITY, GATING_SUMMARY_INTERVAL};
use crate::config::{self, CoachConfig};
use crate::gating::GatingMetrics;
use crate::types::CornerAnalysisSession;

// ============================================================================
// Session Hooks
// ============================================================================

/// Extension point for consumers of finished lap analyses.
///
/// Runs on the analysis worker after every lap. Pass `()` when nothing beyond
/// the coordinator's own observer is needed.
pub trait SessionHooks: Send + 'static {
    fn on_session(&mut self, session: &CornerAnalysisSession);
}

/// No-op implementation.
impl SessionHooks for () {
    fn on_session(&mut self, _session: &CornerAnalysisSession) {}
}

/// Forward every session to a channel.
impl SessionHooks for mpsc::UnboundedSender<CornerAnalysisSession> {
    fn on_session(&mut self, session: &CornerAnalysisSession) {
        if self.send(session.clone()).is_err() {
            warn!(lap = session.lap_number, "Session receiver dropped");
        }
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Final statistics of one processing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub samples_processed: u64,
    pub laps_queued: u64,
    /// Laps dropped because the analysis worker was saturated
    pub laps_dropped: u64,
    pub gating: GatingMetrics,
    pub laps: LapStats,
    pub coordinator: CoordinatorStats,
}

// ============================================================================
// Processing Loop
// ============================================================================

/// Owns all state needed for the processing loop.
///
/// Built with [`new()`](ProcessingLoop::new), optionally pinned to a config with
/// [`with_config()`](ProcessingLoop::with_config), then consumed by
/// [`run()`](ProcessingLoop::run).
pub struct ProcessingLoop<H: SessionHooks> {
    coordinator: CoachingCoordinator,
    hooks: H,
    cancel_token: CancellationToken,
    /// Fixed config; `None` follows the global (hot-reloadable) config
    config: Option<Arc<CoachConfig>>,
}

impl<H: SessionHooks> ProcessingLoop<H> {
    pub fn new(coordinator: CoachingCoordinator, hooks: H, cancel_token: CancellationToken) -> Self {
        Self {
            coordinator,
            hooks,
            cancel_token,
            config: None,
        }
    }

    /// Use this config instead of the global one.
    pub fn with_config(mut self, config: Arc<CoachConfig>) -> Self {
        self.config = Some(config);
        self
    }

    /// Run until the source is exhausted or cancellation.
    ///
    /// Returns final statistics once every queued lap has been analysed.
    pub async fn run<S: TelemetrySource>(self, source: &mut S) -> LoopStats {
        let stream_config = self.config.clone().unwrap_or_else(config::get);
        let mut context = StreamContext::new(&stream_config);
        let mut stats = LoopStats::default();

        let (tx, rx) = mpsc::channel::<LapAnalysisRequest>(ANALYSIS_CHANNEL_CAPACITY);
        let worker = tokio::spawn(analysis_worker(self.coordinator, self.hooks, self.config, rx));

        info!("Processing telemetry from {}...", source.source_name());

        loop {
            let event = tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("[ProcessingLoop] Shutdown signal received");
                    break;
                }
                result = source.next_sample() => {
                    match result {
                        Ok(ev) => ev,
                        Err(e) => {
                            warn!("[ProcessingLoop] Source error: {}", e);
                            break;
                        }
                    }
                }
            };

            let sample = match event {
                SourceEvent::Sample(s) => s,
                SourceEvent::Eof => {
                    info!(
                        "[ProcessingLoop] Source reached end ({} samples processed)",
                        stats.samples_processed
                    );
                    break;
                }
            };

            stats.samples_processed += 1;
            if let Some(request) = context.ingest(&sample) {
                let lap = request.lap_number;
                match tx.try_send(request) {
                    Ok(()) => stats.laps_queued += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        stats.laps_dropped += 1;
                        warn!(lap, "Analysis worker saturated, lap dropped");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        warn!(lap, "Analysis worker stopped, ending ingestion");
                        break;
                    }
                }
            }

            if stats.samples_processed % GATING_SUMMARY_INTERVAL == 0 {
                info!("{}", context.gating_metrics());
            }
        }

        // Let the worker drain what is queued
        drop(tx);
        stats.coordinator = match worker.await {
            Ok(s) => s,
            Err(e) => {
                warn!("[ProcessingLoop] Analysis worker failed: {}", e);
                CoordinatorStats::default()
            }
        };
        stats.gating = context.gating_metrics();
        stats.laps = context.lap_stats();

        info!("FINAL STATISTICS");
        info!("   Samples Processed:   {}", stats.samples_processed);
        info!("   {}", stats.gating);
        info!(
            "   Laps Completed:      {} (discarded {}, dropped {})",
            stats.laps.laps_completed, stats.laps.laps_discarded, stats.laps_dropped
        );
        info!("   Corners Segmented:   {}", stats.laps.segments_completed);
        info!("   Coordinator:         {}", stats.coordinator);

        stats
    }
}

async fn analysis_worker<H: SessionHooks>(
    mut coordinator: CoachingCoordinator,
    mut hooks: H,
    config: Option<Arc<CoachConfig>>,
    mut rx: mpsc::Receiver<LapAnalysisRequest>,
) -> CoordinatorStats {
    while let Some(request) = rx.recv().await {
        let cfg = config.clone().unwrap_or_else(config::get);
        let session = coordinator.analyze_lap_offloaded(&cfg, &request).await;
        hooks.on_session(&session);
    }
    coordinator.stats()
}
