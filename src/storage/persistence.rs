//! Storage traits and in-memory backends
//!
//! Implementations must be thread-safe (Send + Sync) so one store can be
//! shared between the ingestion task and the analysis worker.

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::types::{ActionResult, CornerReference, SelectedAction};

/// Read-only source of corner references.
pub trait ReferenceStore: Send + Sync {
    /// References for a track built under the given assist and device profile.
    fn get_references(
        &self,
        track_id: i32,
        assist_filter: &str,
        device_filter: &str,
    ) -> Result<Vec<CornerReference>, PersistenceError>;
}

/// Destination for selected actions and their evaluated outcomes.
pub trait ActionSink: Send + Sync {
    fn save_action(&self, action: &SelectedAction) -> Result<(), PersistenceError>;

    fn save_action_result(&self, result: &ActionResult) -> Result<(), PersistenceError>;

    /// Most recent actions for a corner, newest first.
    fn actions_for_corner(&self, corner_id: u32, limit: usize) -> Result<Vec<SelectedAction>, PersistenceError>;

    /// Share of evaluated actions in a corner that succeeded; None without results.
    fn success_rate(&self, corner_id: u32) -> Result<Option<f64>, PersistenceError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

/// Persistence errors
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        PersistenceError::Serialization(err.to_string())
    }
}

impl From<sled::Error> for PersistenceError {
    fn from(err: sled::Error) -> Self {
        PersistenceError::Storage(err.to_string())
    }
}

pub(crate) fn success_rate_of<'a>(results: impl Iterator<Item = &'a ActionResult>) -> Option<f64> {
    let (total, succeeded) = results.fold((0usize, 0usize), |(t, s), r| (t + 1, s + usize::from(r.success)));
    (total > 0).then(|| succeeded as f64 / total as f64)
}

// ============================================================================
// References
// ============================================================================

/// One track's references as stored in a JSON reference file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackReferences {
    pub track_id: i32,
    pub references: Vec<CornerReference>,
}

/// In-memory reference store
///
/// A reference with an empty assist or device filter matches any profile.
#[derive(Default)]
pub struct InMemoryReferenceStore {
    tracks: RwLock<HashMap<i32, Vec<CornerReference>>>,
}

impl InMemoryReferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON array of `TrackReferences`.
    pub fn load_json(path: &Path) -> Result<Self, PersistenceError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PersistenceError::Storage(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self, PersistenceError> {
        let tracks: Vec<TrackReferences> = serde_json::from_str(content)?;
        let store = Self::new();
        for track in tracks {
            for reference in track.references {
                store.insert(track.track_id, reference)?;
            }
        }
        Ok(store)
    }

    /// Add or replace the reference for a corner.
    pub fn insert(&self, track_id: i32, reference: CornerReference) -> Result<(), PersistenceError> {
        let mut tracks = self
            .tracks
            .write()
            .map_err(|e| PersistenceError::Storage(e.to_string()))?;
        let refs = tracks.entry(track_id).or_default();
        refs.retain(|r| {
            !(r.corner_id == reference.corner_id
                && r.assist_filter == reference.assist_filter
                && r.device_filter == reference.device_filter)
        });
        refs.push(reference);
        Ok(())
    }

    pub fn track_count(&self) -> usize {
        self.tracks.read().map(|t| t.len()).unwrap_or(0)
    }
}

impl ReferenceStore for InMemoryReferenceStore {
    fn get_references(
        &self,
        track_id: i32,
        assist_filter: &str,
        device_filter: &str,
    ) -> Result<Vec<CornerReference>, PersistenceError> {
        let tracks = self
            .tracks
            .read()
            .map_err(|e| PersistenceError::Storage(e.to_string()))?;
        let matches = |field: &str, wanted: &str| field.is_empty() || field == wanted;
        Ok(tracks
            .get(&track_id)
            .map(|refs| {
                refs.iter()
                    .filter(|r| matches(&r.assist_filter, assist_filter) && matches(&r.device_filter, device_filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

// ============================================================================
// Actions
// ============================================================================

/// In-memory action store
///
/// Not durable; bounded to `max_actions`, oldest evicted first.
pub struct InMemoryActionStore {
    actions: RwLock<Vec<SelectedAction>>,
    results: RwLock<Vec<ActionResult>>,
    max_actions: usize,
}

impl InMemoryActionStore {
    pub fn new() -> Self {
        Self {
            actions: RwLock::new(Vec::new()),
            results: RwLock::new(Vec::new()),
            max_actions: 10_000,
        }
    }

    pub fn action_count(&self) -> usize {
        self.actions.read().map(|a| a.len()).unwrap_or(0)
    }

    pub fn all_actions(&self) -> Vec<SelectedAction> {
        self.actions.read().map(|a| a.clone()).unwrap_or_default()
    }
}

impl Default for InMemoryActionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionSink for InMemoryActionStore {
    fn save_action(&self, action: &SelectedAction) -> Result<(), PersistenceError> {
        let mut store = self
            .actions
            .write()
            .map_err(|e| PersistenceError::Storage(e.to_string()))?;
        store.push(action.clone());
        if store.len() > self.max_actions {
            store.remove(0);
        }
        Ok(())
    }

    fn save_action_result(&self, result: &ActionResult) -> Result<(), PersistenceError> {
        let known = self
            .actions
            .read()
            .map_err(|e| PersistenceError::Storage(e.to_string()))?
            .iter()
            .any(|a| a.action_id == result.action_id);
        if !known {
            return Err(PersistenceError::NotFound(result.action_id.clone()));
        }
        self.results
            .write()
            .map_err(|e| PersistenceError::Storage(e.to_string()))?
            .push(result.clone());
        Ok(())
    }

    fn actions_for_corner(&self, corner_id: u32, limit: usize) -> Result<Vec<SelectedAction>, PersistenceError> {
        let store = self
            .actions
            .read()
            .map_err(|e| PersistenceError::Storage(e.to_string()))?;
        Ok(store
            .iter()
            .rev()
            .filter(|a| a.corner_id == corner_id)
            .take(limit)
            .cloned()
            .collect())
    }

    fn success_rate(&self, corner_id: u32) -> Result<Option<f64>, PersistenceError> {
        let results = self
            .results
            .read()
            .map_err(|e| PersistenceError::Storage(e.to_string()))?;
        Ok(success_rate_of(results.iter().filter(|r| r.corner_id == corner_id)))
    }

    fn backend_name(&self) -> &'static str {
        "InMemory"
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{DateTime, Utc};

    use crate::types::{ActionIntensity, ActionResult, ActionType, AmpelColor, SelectedAction};

    pub fn action(id: &str, corner_id: u32, generated_at: DateTime<Utc>) -> SelectedAction {
        SelectedAction {
            action_id: id.to_string(),
            corner_id,
            phase: ActionType::BrakeEarlier.phase(),
            action_type: ActionType::BrakeEarlier,
            intensity: ActionIntensity::Progressive,
            expected_gain_ms: 30.0,
            confidence: 0.9,
            safety_ampel_color: AmpelColor::Green,
            generated_at,
            user_text: "Früher bremsen".to_string(),
            focus_hint: None,
        }
    }

    pub fn result(action_id: &str, corner_id: u32, success: bool) -> ActionResult {
        ActionResult {
            action_id: action_id.to_string(),
            corner_id,
            attempt_detected: true,
            success,
            overtrained: false,
            actual_gain_ms: success.then_some(25.0),
            slip_violations: Vec::new(),
            evaluation_laps: 3,
            evaluation_completed_at: Utc::now(),
        }
    }
}
