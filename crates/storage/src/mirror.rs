//! Mirrors of persistent collections.
//!
//! A mirror pairs a collection's schema with the store that keeps its
//! contents across runs. The evaluator reports per-tick changes as deltas;
//! the mirror turns them into keyed puts and deletes and commits them as one
//! unit.

use crate::file::FileStore;
use crate::store::{KvStore, MemoryStore};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tidal_core::{Result, Schema, Tuple};
use tidal_incremental::{ChangeSet, Delta};

/// Where persistent collections are kept.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Backend {
    /// In-memory stores; contents are lost when the instance stops.
    #[default]
    Memory,
    /// One snapshot file per collection under this directory.
    Dir(PathBuf),
}

impl Backend {
    pub fn from_dir(dir: Option<&Path>) -> Self {
        match dir {
            Some(d) => Backend::Dir(d.to_path_buf()),
            None => Backend::Memory,
        }
    }

    /// Opens the store for collection `name`.
    pub fn open(&self, name: &str) -> Result<Box<dyn KvStore>> {
        Ok(match self {
            Backend::Memory => Box::new(MemoryStore::new(name)),
            Backend::Dir(dir) => Box::new(FileStore::open(dir, name)?),
        })
    }
}

/// One collection's store.
pub struct StoreMirror {
    schema: Schema,
    store: Box<dyn KvStore>,
}

impl StoreMirror {
    /// Wraps an open store. With `truncate`, existing contents are dropped.
    pub fn new(schema: Schema, mut store: Box<dyn KvStore>, truncate: bool) -> Result<Self> {
        if truncate {
            store.truncate()?;
            store.commit()?;
        }
        Ok(Self { schema, store })
    }

    pub fn name(&self) -> &str {
        self.schema.name()
    }

    /// Stored contents, to load into the collection on start-up.
    pub fn load(&self) -> Result<Vec<Tuple>> {
        self.store.scan()
    }

    /// Applies one tick's deltas and commits. Nothing is kept if any write
    /// fails.
    pub fn apply(&mut self, deltas: &[Delta<Tuple>]) -> Result<usize> {
        match self.write(deltas) {
            Ok(n) => {
                self.store.commit()?;
                Ok(n)
            }
            Err(e) => {
                self.store.rollback()?;
                Err(e)
            }
        }
    }

    fn write(&mut self, deltas: &[Delta<Tuple>]) -> Result<usize> {
        for d in deltas {
            let key = self.schema.key_of(&d.data);
            if d.is_delete() {
                // a replaced key is deleted and re-inserted in the same batch
                if self.store.get(&key)?.as_ref() == Some(&d.data) {
                    self.store.delete(&key)?;
                }
            } else {
                self.store.put(key, d.data.clone())?;
            }
        }
        Ok(deltas.len())
    }

    pub fn close(&mut self) -> Result<()> {
        self.store.close()
    }

    pub fn is_closed(&self) -> bool {
        self.store.is_closed()
    }
}

/// Mirrors of every persistent collection of one instance.
#[derive(Default)]
pub struct MirrorSet {
    mirrors: BTreeMap<String, StoreMirror>,
}

impl MirrorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a mirror for each schema.
    pub fn open<'a>(
        backend: &Backend,
        schemas: impl IntoIterator<Item = &'a Schema>,
        truncate: bool,
    ) -> Result<Self> {
        let mut set = Self::new();
        for schema in schemas {
            let store = backend.open(schema.name())?;
            set.insert(StoreMirror::new(schema.clone(), store, truncate)?);
        }
        tracing::debug!(mirrors = set.len(), ?backend, "persistent stores opened");
        Ok(set)
    }

    pub fn insert(&mut self, mirror: StoreMirror) {
        self.mirrors.insert(String::from(mirror.name()), mirror);
    }

    pub fn get(&self, name: &str) -> Option<&StoreMirror> {
        self.mirrors.get(name)
    }

    pub fn len(&self) -> usize {
        self.mirrors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mirrors.is_empty()
    }

    /// Stored contents per collection.
    pub fn load_all(&self) -> Result<Vec<(String, Vec<Tuple>)>> {
        self.mirrors
            .iter()
            .map(|(name, m)| Ok((name.clone(), m.load()?)))
            .collect()
    }

    /// Applies a tick's change set. Collections without a mirror are
    /// ignored.
    pub fn apply(&mut self, changes: &ChangeSet) -> Result<usize> {
        let mut written = 0;
        for name in changes.collections() {
            if let Some(m) = self.mirrors.get_mut(name) {
                written += m.apply(changes.get(name))?;
            }
        }
        Ok(written)
    }

    /// Closes every store; already-closed stores are skipped.
    pub fn close_all(&mut self) -> Result<()> {
        let mut first_err = None;
        for m in self.mirrors.values_mut() {
            if let Err(e) = m.close() {
                tracing::warn!(store = m.name(), error = %e, "closing store failed");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidal_core::tuple;

    fn schema() -> Schema {
        Schema::new("kv", &["k"], &["v"]).unwrap()
    }

    #[test]
    fn test_apply_change_set() {
        let mut set = MirrorSet::new();
        let store = Backend::Memory.open("kv").unwrap();
        set.insert(StoreMirror::new(schema(), store, false).unwrap());

        let mut changes = ChangeSet::new();
        changes.push("kv", Delta::insert(tuple![1, "a"]));
        changes.push("kv", Delta::insert(tuple![2, "b"]));
        changes.push("other", Delta::insert(tuple![9]));
        assert_eq!(set.apply(&changes).unwrap(), 2);

        let mut changes = ChangeSet::new();
        changes.push("kv", Delta::delete(tuple![1, "a"]));
        changes.push("kv", Delta::insert(tuple![1, "z"]));
        changes.push("kv", Delta::delete(tuple![2, "b"]));
        changes.consolidate();
        set.apply(&changes).unwrap();

        assert_eq!(
            set.load_all().unwrap(),
            vec![(String::from("kv"), vec![tuple![1, "z"]])]
        );
    }

    #[test]
    fn test_truncate_on_open() {
        let mut store = Backend::Memory.open("kv").unwrap();
        store.put(vec![tidal_core::Value::Int64(1)], tuple![1, "a"]).unwrap();
        store.commit().unwrap();
        let m = StoreMirror::new(schema(), store, true).unwrap();
        assert!(m.load().unwrap().is_empty());
    }

    #[test]
    fn test_close_all() {
        let schemas = vec![schema()];
        let mut set = MirrorSet::open(&Backend::Memory, &schemas, false).unwrap();
        set.close_all().unwrap();
        assert!(set.get("kv").unwrap().is_closed());
        set.close_all().unwrap();
    }
}
