//! Journal of uncommitted store writes.
//!
//! Writes to a store are staged here until `commit`. The journal keeps both
//! the ordered entry list and the net diff per key, so reads can see staged
//! values and a rollback can discard them.

use std::collections::BTreeMap;
use tidal_core::{Tuple, Value};

/// Store key: the key columns of a tuple.
pub type Key = Vec<Value>;

/// A single staged write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JournalEntry {
    /// A value was written, replacing `old` if present.
    Put {
        key: Key,
        old: Option<Tuple>,
        new: Tuple,
    },
    /// A value was removed.
    Delete { key: Key, old: Tuple },
}

impl JournalEntry {
    pub fn key(&self) -> &Key {
        match self {
            JournalEntry::Put { key, .. } => key,
            JournalEntry::Delete { key, .. } => key,
        }
    }
}

/// Net effect of the staged writes.
#[derive(Clone, Debug, Default)]
pub struct StoreDiff {
    added: BTreeMap<Key, Tuple>,
    /// key → (committed, staged)
    modified: BTreeMap<Key, (Tuple, Tuple)>,
    deleted: BTreeMap<Key, Tuple>,
}

impl StoreDiff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a write of a key with no committed value.
    pub fn add(&mut self, key: Key, t: Tuple) {
        if let Some(old) = self.deleted.remove(&key) {
            self.modified.insert(key, (old, t));
        } else {
            self.added.insert(key, t);
        }
    }

    /// Records a write over an existing value.
    pub fn modify(&mut self, key: Key, old: Tuple, new: Tuple) {
        if self.added.contains_key(&key) {
            self.added.insert(key, new);
        } else if let Some((original, _)) = self.modified.remove(&key) {
            self.modified.insert(key, (original, new));
        } else {
            self.modified.insert(key, (old, new));
        }
    }

    /// Records a removal.
    pub fn delete(&mut self, key: Key, old: Tuple) {
        if self.added.remove(&key).is_some() {
            return;
        }
        match self.modified.remove(&key) {
            Some((original, _)) => self.deleted.insert(key, original),
            None => self.deleted.insert(key, old),
        };
    }

    /// Staged state of `key`: `Some(Some(t))` written, `Some(None)` removed,
    /// `None` untouched.
    pub fn lookup(&self, key: &[Value]) -> Option<Option<&Tuple>> {
        if let Some(t) = self.added.get(key) {
            return Some(Some(t));
        }
        if let Some((_, t)) = self.modified.get(key) {
            return Some(Some(t));
        }
        if self.deleted.contains_key(key) {
            return Some(None);
        }
        None
    }

    pub fn added(&self) -> &BTreeMap<Key, Tuple> {
        &self.added
    }

    pub fn modified(&self) -> &BTreeMap<Key, (Tuple, Tuple)> {
        &self.modified
    }

    pub fn deleted(&self) -> &BTreeMap<Key, Tuple> {
        &self.deleted
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    /// The diff that undoes this one.
    pub fn reverse(&self) -> Self {
        let mut reverse = Self::new();
        for (key, t) in &self.added {
            reverse.deleted.insert(key.clone(), t.clone());
        }
        for (key, (old, new)) in &self.modified {
            reverse.modified.insert(key.clone(), (new.clone(), old.clone()));
        }
        for (key, t) in &self.deleted {
            reverse.added.insert(key.clone(), t.clone());
        }
        reverse
    }

    /// `(before, after)` pairs, one per touched key.
    pub fn as_modifications(&self) -> Vec<(Option<Tuple>, Option<Tuple>)> {
        let mut mods = Vec::new();
        for t in self.added.values() {
            mods.push((None, Some(t.clone())));
        }
        for (old, new) in self.modified.values() {
            mods.push((Some(old.clone()), Some(new.clone())));
        }
        for t in self.deleted.values() {
            mods.push((Some(t.clone()), None));
        }
        mods
    }
}

/// Staged writes of one store.
#[derive(Clone, Debug, Default)]
pub struct Journal {
    diff: StoreDiff,
    entries: Vec<JournalEntry>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a write. `old` is the value visible before it.
    pub fn record_put(&mut self, key: Key, old: Option<Tuple>, new: Tuple) {
        match &old {
            Some(o) => self.diff.modify(key.clone(), o.clone(), new.clone()),
            None => self.diff.add(key.clone(), new.clone()),
        }
        self.entries.push(JournalEntry::Put { key, old, new });
    }

    /// Records a removal of the visible value `old`.
    pub fn record_delete(&mut self, key: Key, old: Tuple) {
        self.diff.delete(key.clone(), old.clone());
        self.entries.push(JournalEntry::Delete { key, old });
    }

    pub fn lookup(&self, key: &[Value]) -> Option<Option<&Tuple>> {
        self.diff.lookup(key)
    }

    pub fn diff(&self) -> &StoreDiff {
        &self.diff
    }

    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drains the journal, returning the net diff to apply.
    pub fn commit(&mut self) -> StoreDiff {
        self.entries.clear();
        core::mem::take(&mut self.diff)
    }

    /// Discards every staged write.
    pub fn rollback(&mut self) {
        self.entries.clear();
        self.diff = StoreDiff::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidal_core::tuple;

    fn key(k: i64) -> Key {
        vec![Value::Int64(k)]
    }

    #[test]
    fn test_journal_put_then_lookup() {
        let mut j = Journal::new();
        j.record_put(key(1), None, tuple![1, "a"]);
        assert_eq!(j.lookup(&key(1)), Some(Some(&tuple![1, "a"])));
        assert_eq!(j.lookup(&key(2)), None);
        assert_eq!(j.entries().len(), 1);
    }

    #[test]
    fn test_journal_rollback() {
        let mut j = Journal::new();
        j.record_put(key(1), None, tuple![1, "a"]);
        j.record_delete(key(2), tuple![2, "b"]);
        j.rollback();
        assert!(j.is_empty());
        assert!(j.diff().is_empty());
    }

    #[test]
    fn test_diff_add_delete_cancels() {
        let mut d = StoreDiff::new();
        d.add(key(1), tuple![1, "a"]);
        d.delete(key(1), tuple![1, "a"]);
        assert!(d.is_empty());
    }

    #[test]
    fn test_diff_delete_then_add_is_modify() {
        let mut d = StoreDiff::new();
        d.delete(key(1), tuple![1, "a"]);
        d.add(key(1), tuple![1, "b"]);
        assert_eq!(
            d.modified().get(&key(1)),
            Some(&(tuple![1, "a"], tuple![1, "b"]))
        );
    }

    #[test]
    fn test_diff_modify_keeps_original() {
        let mut d = StoreDiff::new();
        d.modify(key(1), tuple![1, "a"], tuple![1, "b"]);
        d.modify(key(1), tuple![1, "b"], tuple![1, "c"]);
        assert_eq!(
            d.modified().get(&key(1)),
            Some(&(tuple![1, "a"], tuple![1, "c"]))
        );
        d.delete(key(1), tuple![1, "c"]);
        assert_eq!(d.deleted().get(&key(1)), Some(&tuple![1, "a"]));
    }

    #[test]
    fn test_diff_reverse() {
        let mut d = StoreDiff::new();
        d.add(key(1), tuple![1, "a"]);
        d.modify(key(2), tuple![2, "x"], tuple![2, "y"]);
        d.delete(key(3), tuple![3, "z"]);
        let r = d.reverse();
        assert!(r.deleted().contains_key(&key(1)));
        assert_eq!(r.modified().get(&key(2)), Some(&(tuple![2, "y"], tuple![2, "x"])));
        assert!(r.added().contains_key(&key(3)));
        assert_eq!(d.as_modifications().len(), 3);
    }
}
