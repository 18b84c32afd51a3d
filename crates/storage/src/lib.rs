//! Tidal Storage - the persistent key/value boundary.
//!
//! Persistent collections keep their contents in a [`KvStore`] across runs.
//! This crate provides:
//!
//! - [`KvStore`]: transactional tuple store with staged writes
//! - [`MemoryStore`]: in-memory backend
//! - [`FileStore`]: snapshot-file backend (`bincode`)
//! - [`Journal`]: staged writes and their net diff
//! - [`StoreMirror`] / [`MirrorSet`]: apply a tick's persistent changes
//!
//! # Example
//!
//! ```rust
//! use tidal_core::{tuple, Value};
//! use tidal_storage::{KvStore, MemoryStore};
//!
//! let mut store = MemoryStore::new("kv");
//! store.put(vec![Value::Int64(1)], tuple![1, "a"]).unwrap();
//! store.commit().unwrap();
//! assert_eq!(store.get(&[Value::Int64(1)]).unwrap(), Some(tuple![1, "a"]));
//! ```

pub mod file;
pub mod journal;
pub mod mirror;
pub mod store;

pub use file::FileStore;
pub use journal::{Journal, JournalEntry, Key, StoreDiff};
pub use mirror::{Backend, MirrorSet, StoreMirror};
pub use store::{KvStore, MemoryStore};
