//! Polling-based config file watcher.
//!
//! Checks the config file's mtime every 2 seconds. On a change it waits
//! 500ms for editors to finish writing, then calls `config::reload()` and
//! reports the outcome over an mpsc channel.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::ConfigChange;
use super::defaults::{CONFIG_DEBOUNCE_MS, CONFIG_POLL_INTERVAL_SECS};

/// Events emitted by the config watcher.
#[derive(Debug)]
pub enum ConfigEvent {
    /// Config was reloaded with these changes.
    Reloaded(Vec<ConfigChange>),
    /// Reload failed; the previous config remains active.
    Error(String),
}

/// Run the config file watcher loop until `cancel` fires or the receiver is dropped.
pub async fn run_config_watcher(
    path: PathBuf,
    tx: mpsc::Sender<ConfigEvent>,
    cancel: CancellationToken,
) {
    tracing::info!(path = %path.display(), "Config watcher started");

    let poll = Duration::from_secs(CONFIG_POLL_INTERVAL_SECS);
    let debounce = Duration::from_millis(CONFIG_DEBOUNCE_MS);
    let mut last_mtime = get_mtime(&path);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("Config watcher cancelled");
                return;
            }
            _ = tokio::time::sleep(poll) => {}
        }

        // File deleted or unreadable: keep polling with the current config
        let Some(current) = get_mtime(&path) else {
            if last_mtime.is_some() {
                tracing::warn!(
                    path = %path.display(),
                    "Config file not accessible, keeping current config"
                );
                last_mtime = None;
            }
            continue;
        };

        if last_mtime == Some(current) {
            continue;
        }

        tokio::time::sleep(debounce).await;
        if get_mtime(&path) != Some(current) {
            // Still being written
            continue;
        }
        last_mtime = Some(current);

        let event = match super::reload() {
            Ok(changes) => ConfigEvent::Reloaded(changes),
            Err(e) => {
                tracing::error!(error = %e, "Config hot-reload failed, keeping previous config");
                ConfigEvent::Error(e.to_string())
            }
        };

        if tx.send(event).await.is_err() {
            tracing::debug!("Config watcher channel closed, stopping");
            return;
        }
    }
}

fn get_mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).ok().and_then(|m| m.modified().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_watcher_stops_on_cancel() {
        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let handle = tokio::spawn(run_config_watcher(
            PathBuf::from("does-not-exist.toml"),
            tx,
            cancel,
        ));
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("watcher should exit promptly")
            .expect("watcher task should not panic");
    }
}
