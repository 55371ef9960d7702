//! Reference and action storage
//!
//! The decision core only sees the `ReferenceStore` and `ActionSink` traits.
//! Backends:
//! - `InMemoryReferenceStore`: references per track, loadable from JSON
//! - `InMemoryActionStore`: actions and results for tests and replays
//! - `SledActionStore`: durable sled-backed action log

pub mod persistence;
pub mod sled_store;

pub use persistence::{
    ActionSink, InMemoryActionStore, InMemoryReferenceStore, PersistenceError, ReferenceStore,
    TrackReferences,
};
pub use sled_store::SledActionStore;
