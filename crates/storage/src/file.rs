//! File-backed store.
//!
//! The committed map is kept in memory and written out as a `bincode`
//! snapshot on every commit that changed something. The snapshot is written
//! to a sibling `.tmp` file first and renamed over the old one.

use crate::journal::Key;
use crate::store::{closed, KvStore, Staged};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tidal_core::{Error, Result, Tuple, Value};

/// Store persisted to a single snapshot file.
#[derive(Debug)]
pub struct FileStore {
    name: String,
    path: PathBuf,
    data: Staged,
    closed: bool,
}

fn io_error(path: &Path, e: impl std::fmt::Display) -> Error {
    Error::storage(format!("{}: {}", path.display(), e))
}

impl FileStore {
    /// Opens `dir/<name>.tdb`, creating the directory if needed.
    pub fn open(dir: impl AsRef<Path>, name: &str) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;
        let path = dir.join(format!("{}.tdb", name));
        let committed: BTreeMap<Key, Tuple> = if path.exists() {
            let file = File::open(&path).map_err(|e| io_error(&path, e))?;
            bincode::deserialize_from(BufReader::new(file)).map_err(|e| io_error(&path, e))?
        } else {
            BTreeMap::new()
        };
        tracing::debug!(store = name, path = %path.display(), tuples = committed.len(), "file store opened");
        Ok(Self {
            name: String::from(name),
            path,
            data: Staged::with(committed),
            closed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check(&self) -> Result<()> {
        if self.closed {
            return Err(closed(&self.name));
        }
        Ok(())
    }

    fn write_snapshot(&self) -> Result<()> {
        let tmp = self.path.with_extension("tmp");
        let file = File::create(&tmp).map_err(|e| io_error(&tmp, e))?;
        let mut writer = BufWriter::new(file);
        bincode::serialize_into(&mut writer, &self.data.committed).map_err(|e| io_error(&tmp, e))?;
        writer.flush().map_err(|e| io_error(&tmp, e))?;
        drop(writer);
        fs::rename(&tmp, &self.path).map_err(|e| io_error(&self.path, e))
    }
}

impl KvStore for FileStore {
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
        if !self.data.is_dirty() {
            return Ok(());
        }
        let diff = self.data.commit();
        self.write_snapshot()?;
        tracing::trace!(
            store = %self.name,
            added = diff.added().len(),
            modified = diff.modified().len(),
            deleted = diff.deleted().len(),
            "file store committed"
        );
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
        if self.closed {
            return Ok(());
        }
        self.data.rollback();
        self.closed = true;
        tracing::debug!(store = %self.name, "file store closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tidal_core::tuple;

    static NEXT_DIR: AtomicU32 = AtomicU32::new(0);

    fn scratch_dir() -> PathBuf {
        let n = NEXT_DIR.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!("tidal-file-store-{}-{}", std::process::id(), n))
    }

    #[test]
    fn test_reopen_sees_committed() {
        let dir = scratch_dir();
        let mut s = FileStore::open(&dir, "kv").unwrap();
        s.put(vec![Value::Int64(1)], tuple![1, "a"]).unwrap();
        s.put(vec![Value::Int64(2)], tuple![2, "b"]).unwrap();
        s.commit().unwrap();
        s.put(vec![Value::Int64(3)], tuple![3, "c"]).unwrap();
        s.close().unwrap();

        let s = FileStore::open(&dir, "kv").unwrap();
        assert_eq!(s.scan().unwrap(), vec![tuple![1, "a"], tuple![2, "b"]]);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_delete_persists() {
        let dir = scratch_dir();
        let mut s = FileStore::open(&dir, "kv").unwrap();
        s.put(vec![Value::Int64(1)], tuple![1, "a"]).unwrap();
        s.commit().unwrap();
        assert!(s.delete(&[Value::Int64(1)]).unwrap());
        s.commit().unwrap();
        s.close().unwrap();

        let s = FileStore::open(&dir, "kv").unwrap();
        assert!(s.scan().unwrap().is_empty());
        assert!(s.path().ends_with("kv.tdb"));
        let _ = fs::remove_dir_all(&dir);
    }
}
