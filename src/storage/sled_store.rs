//! Durable action log on sled
//!
//! Trees:
//! - `actions`: key = generated_at nanos (u64 big-endian) ++ action id, value = JSON `SelectedAction`
//! - `results`: key = action id, value = JSON `ActionResult`
//!
//! Big-endian timestamp keys sort chronologically, so reverse iteration
//! yields newest first.

use std::path::Path;

use tracing::{info, warn};

use super::persistence::{success_rate_of, ActionSink, PersistenceError};
use crate::types::{ActionResult, SelectedAction};

const ACTIONS_TREE: &str = "actions";
const RESULTS_TREE: &str = "results";

#[derive(Clone)]
pub struct SledActionStore {
    db: sled::Db,
    actions: sled::Tree,
    results: sled::Tree,
}

impl SledActionStore {
    /// Open or create the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PersistenceError> {
        let path = path.as_ref();
        let db = sled::open(path)?;
        let actions = db.open_tree(ACTIONS_TREE)?;
        let results = db.open_tree(RESULTS_TREE)?;
        info!(path = %path.display(), actions = actions.len(), "Action store opened");
        Ok(Self { db, actions, results })
    }

    fn action_key(action: &SelectedAction) -> Vec<u8> {
        let nanos = action
            .generated_at
            .timestamp_nanos_opt()
            .unwrap_or_else(|| action.generated_at.timestamp() * 1_000_000_000);
        let mut key = (nanos.max(0) as u64).to_be_bytes().to_vec();
        key.extend_from_slice(action.action_id.as_bytes());
        key
    }

    pub fn action_count(&self) -> usize {
        self.actions.len()
    }

    pub fn result_count(&self) -> usize {
        self.results.len()
    }

    /// Look an action up by id (linear scan).
    pub fn get_action(&self, action_id: &str) -> Result<Option<SelectedAction>, PersistenceError> {
        for item in self.actions.iter() {
            let (key, value) = item?;
            if key.ends_with(action_id.as_bytes()) {
                let action: SelectedAction = serde_json::from_slice(&value)?;
                if action.action_id == action_id {
                    return Ok(Some(action));
                }
            }
        }
        Ok(None)
    }

    /// Flush pending writes to disk
    pub fn flush(&self) -> Result<(), PersistenceError> {
        self.db.flush()?;
        Ok(())
    }
}

impl ActionSink for SledActionStore {
    fn save_action(&self, action: &SelectedAction) -> Result<(), PersistenceError> {
        let value = serde_json::to_vec(action)?;
        self.actions.insert(Self::action_key(action), value)?;
        Ok(())
    }

    fn save_action_result(&self, result: &ActionResult) -> Result<(), PersistenceError> {
        if self.get_action(&result.action_id)?.is_none() {
            return Err(PersistenceError::NotFound(result.action_id.clone()));
        }
        let value = serde_json::to_vec(result)?;
        self.results.insert(result.action_id.as_bytes(), value)?;
        Ok(())
    }

    fn actions_for_corner(&self, corner_id: u32, limit: usize) -> Result<Vec<SelectedAction>, PersistenceError> {
        let mut actions = Vec::with_capacity(limit);
        for item in self.actions.iter().rev() {
            if actions.len() >= limit {
                break;
            }
            let (_key, value) = item?;
            match serde_json::from_slice::<SelectedAction>(&value) {
                Ok(action) if action.corner_id == corner_id => actions.push(action),
                Ok(_) => {}
                Err(e) => warn!("Skipping unreadable stored action: {}", e),
            }
        }
        Ok(actions)
    }

    fn success_rate(&self, corner_id: u32) -> Result<Option<f64>, PersistenceError> {
        let mut results = Vec::new();
        for item in self.results.iter() {
            let (_key, value) = item?;
            match serde_json::from_slice::<ActionResult>(&value) {
                Ok(result) if result.corner_id == corner_id => results.push(result),
                Ok(_) => {}
                Err(e) => warn!("Skipping unreadable stored result: {}", e),
            }
        }
        Ok(success_rate_of(results.iter()))
    }

    fn backend_name(&self) -> &'static str {
        "Sled"
    }
}
