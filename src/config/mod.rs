//! Coach Configuration Module
//!
//! Every pipeline threshold is an operator-tunable TOML value.
//!
//! ## Loading Order
//!
//! 1. `APEX_COACH_CONFIG` environment variable (path to TOML file)
//! 2. `coach_config.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! Call `config::init()` once at startup, then `config::get()` anywhere:
//!
//! ```ignore
//! config::init(CoachConfig::load());
//!
//! let cfg = config::get();
//! let green = cfg.ampel.entry.green_max;
//! ```
//!
//! `get()` hands out an `Arc` snapshot. A hot reload swaps the whole config
//! atomically; holders of an older snapshot keep seeing consistent values.

mod coach_config;
pub mod defaults;
pub mod validation;
pub mod watcher;

pub use coach_config::*;

use arc_swap::ArcSwap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Global coach configuration.
static COACH_CONFIG: OnceLock<ArcSwap<CoachConfig>> = OnceLock::new();

/// Set once `init()` has installed an explicit config.
static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// File the active config was loaded from; `reload()` re-reads it.
static CONFIG_SOURCE: OnceLock<PathBuf> = OnceLock::new();

fn cell() -> &'static ArcSwap<CoachConfig> {
    COACH_CONFIG.get_or_init(|| ArcSwap::from_pointee(CoachConfig::default()))
}

/// Initialize the global coach configuration.
///
/// Only the first call takes effect. Use `store()` or `reload()` to replace
/// the config afterwards.
pub fn init(config: CoachConfig) {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        tracing::warn!("config::init() called more than once, ignoring");
        return;
    }
    cell().store(Arc::new(config));
}

/// Initialize from a file and remember it as the reload source.
pub fn init_from_file(path: &Path) -> Result<(), ConfigError> {
    let config = CoachConfig::load_from_file(path)?;
    set_source(path);
    init(config);
    Ok(())
}

/// Remember `path` as the file `reload()` reads.
pub fn set_source(path: &Path) {
    if CONFIG_SOURCE.set(path.to_path_buf()).is_err() {
        tracing::debug!(path = %path.display(), "Config source already set, keeping the first one");
    }
}

/// File the config is reloaded from, if any.
pub fn source() -> Option<&'static Path> {
    CONFIG_SOURCE.get().map(PathBuf::as_path)
}

/// Snapshot of the current configuration.
///
/// Falls back to built-in defaults if `init()` was never called.
pub fn get() -> Arc<CoachConfig> {
    cell().load_full()
}

/// Whether `init()` has been called.
pub fn is_initialized() -> bool {
    INITIALIZED.load(Ordering::SeqCst)
}

/// Replace the active config, returning what changed.
pub fn store(config: CoachConfig) -> Vec<ConfigChange> {
    let previous = cell().swap(Arc::new(config));
    diff(&previous, &get())
}

/// Re-read the source file, validate it and swap it in.
///
/// On any error the previous config stays active.
pub fn reload() -> Result<Vec<ConfigChange>, ConfigError> {
    let path = CONFIG_SOURCE
        .get()
        .cloned()
        .unwrap_or_else(|| PathBuf::from(LOCAL_CONFIG_FILE));
    let config = CoachConfig::load_from_file(&path)?;
    let changes = store(config);
    if changes.is_empty() {
        tracing::debug!(path = %path.display(), "Config reloaded, no changes");
    } else {
        for change in &changes {
            tracing::info!(key = %change.key, old = %change.old, new = %change.new, "Config value changed");
        }
    }
    Ok(changes)
}

/// One changed config value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigChange {
    /// Dotted key path, e.g. `ampel.exit.green_max`
    pub key: String,
    pub old: String,
    pub new: String,
}

impl std::fmt::Display for ConfigChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {} -> {}", self.key, self.old, self.new)
    }
}

/// Leaf-by-leaf difference between two configs, sorted by key.
pub fn diff(old: &CoachConfig, new: &CoachConfig) -> Vec<ConfigChange> {
    let (Ok(old_value), Ok(new_value)) = (toml::Value::try_from(old), toml::Value::try_from(new))
    else {
        return Vec::new();
    };

    let mut old_leaves = Vec::new();
    let mut new_leaves = Vec::new();
    flatten(&old_value, "", &mut old_leaves);
    flatten(&new_value, "", &mut new_leaves);

    let old_map: std::collections::BTreeMap<_, _> = old_leaves.into_iter().collect();
    let new_map: std::collections::BTreeMap<_, _> = new_leaves.into_iter().collect();

    new_map
        .iter()
        .filter_map(|(key, new)| {
            let old = old_map.get(key).cloned().unwrap_or_default();
            (old != *new).then(|| ConfigChange {
                key: key.clone(),
                old,
                new: new.clone(),
            })
        })
        .collect()
}

fn flatten(value: &toml::Value, prefix: &str, out: &mut Vec<(String, String)>) {
    match value {
        toml::Value::Table(table) => {
            for (k, v) in table {
                let path = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{prefix}.{k}")
                };
                flatten(v, &path, out);
            }
        }
        other => out.push((prefix.to_string(), other.to_string())),
    }
}
