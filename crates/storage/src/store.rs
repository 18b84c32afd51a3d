//! The key/value boundary for persistent collections.

use crate::journal::{Journal, Key, StoreDiff};
use std::collections::BTreeMap;
use tidal_core::{Error, Result, Tuple, Value};

/// A transactional tuple store.
///
/// Writes are staged until [`commit`](KvStore::commit); reads see staged
/// writes. After [`close`](KvStore::close) every operation fails with a
/// storage error.
pub trait KvStore: Send {
    /// Name the store was opened under.
    fn name(&self) -> &str;

    fn get(&self, key: &[Value]) -> Result<Option<Tuple>>;

    fn put(&mut self, key: Key, t: Tuple) -> Result<()>;

    /// Returns true if a value was removed.
    fn delete(&mut self, key: &[Value]) -> Result<bool>;

    /// Every visible value, ordered by key.
    fn scan(&self) -> Result<Vec<Tuple>>;

    /// Makes staged writes durable.
    fn commit(&mut self) -> Result<()>;

    /// Discards staged writes.
    fn rollback(&mut self) -> Result<()>;

    /// Stages removal of every value.
    fn truncate(&mut self) -> Result<()>;

    /// Releases the store. Closing twice is a no-op.
    fn close(&mut self) -> Result<()>;

    fn is_closed(&self) -> bool;
}

/// Committed map plus journal; shared by the store backends.
#[derive(Debug, Default)]
pub(crate) struct Staged {
    pub(crate) committed: BTreeMap<Key, Tuple>,
    journal: Journal,
}

impl Staged {
    pub(crate) fn with(committed: BTreeMap<Key, Tuple>) -> Self {
        Self {
            committed,
            journal: Journal::new(),
        }
    }

    pub(crate) fn get(&self, key: &[Value]) -> Option<Tuple> {
        match self.journal.lookup(key) {
            Some(staged) => staged.cloned(),
            None => self.committed.get(key).cloned(),
        }
    }

    pub(crate) fn put(&mut self, key: Key, t: Tuple) {
        let old = self.get(&key);
        if old.as_ref() == Some(&t) {
            return;
        }
        self.journal.record_put(key, old, t);
    }

    pub(crate) fn delete(&mut self, key: &[Value]) -> bool {
        match self.get(key) {
            Some(old) => {
                self.journal.record_delete(key.to_vec(), old);
                true
            }
            None => false,
        }
    }

    pub(crate) fn scan(&self) -> Vec<Tuple> {
        let mut view: BTreeMap<&Key, &Tuple> = self.committed.iter().collect();
        let diff = self.journal.diff();
        for key in diff.deleted().keys() {
            view.remove(key);
        }
        for (key, t) in diff.added() {
            view.insert(key, t);
        }
        for (key, (_, t)) in diff.modified() {
            view.insert(key, t);
        }
        view.into_values().cloned().collect()
    }

    pub(crate) fn truncate(&mut self) {
        let mut visible: Vec<Key> = self.committed.keys().cloned().collect();
        visible.extend(self.journal.diff().added().keys().cloned());
        for key in visible {
            self.delete(&key);
        }
    }

    pub(crate) fn is_dirty(&self) -> bool {
        !self.journal.is_empty()
    }

    /// Applies staged writes to the committed map.
    pub(crate) fn commit(&mut self) -> StoreDiff {
        let diff = self.journal.commit();
        for key in diff.deleted().keys() {
            self.committed.remove(key);
        }
        for (key, t) in diff.added() {
            self.committed.insert(key.clone(), t.clone());
        }
        for (key, (_, t)) in diff.modified() {
            self.committed.insert(key.clone(), t.clone());
        }
        diff
    }

    pub(crate) fn rollback(&mut self) {
        self.journal.rollback();
    }
}

pub(crate) fn closed(name: &str) -> Error {
    Error::storage(format!("store {} is closed", name))
}

/// Store kept in memory; contents last as long as the handle.
#[derive(Debug)]
pub struct MemoryStore {
    name: String,
    data: Staged,
    closed: bool,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: Staged::default(),
            closed: false,
        }
    }

    fn check(&self) -> Result<()> {
        if self.closed {
            return Err(closed(&self.name));
        }
        Ok(())
    }
}

impl KvStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &[Value]) -> Result<Option<Tuple>> {
        self.check()?;
        Ok(self.data.get(key))
    }

    fn put(&mut self, key: Key, t: Tuple) -> Result<()> {
        self.check()?;
        self.data.put(key, t);
        Ok(())
    }

    fn delete(&mut self, key: &[Value]) -> Result<bool> {
        self.check()?;
        Ok(self.data.delete(key))
    }

    fn scan(&self) -> Result<Vec<Tuple>> {
        self.check()?;
        Ok(self.data.scan())
    }

    fn commit(&mut self) -> Result<()> {
        self.check()?;
        self.data.commit();
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.check()?;
        self.data.rollback();
        Ok(())
    }

    fn truncate(&mut self) -> Result<()> {
        self.check()?;
        self.data.truncate();
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.data.rollback();
            self.closed = true;
            tracing::debug!(store = %self.name, "memory store closed");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}
