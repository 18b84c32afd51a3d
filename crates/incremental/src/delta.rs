//! Tuple-level changes reported at the end of a tick.
//!
//! The evaluator reports, per persistent collection, which tuples were added
//! and which were removed so an external store can mirror them.

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;
use tidal_core::Tuple;

/// A change to a data item: `+1` for insertion, `-1` for removal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delta<T> {
    pub data: T,
    pub diff: i32,
}

impl<T> Delta<T> {
    #[inline]
    pub fn insert(data: T) -> Self {
        Self { data, diff: 1 }
    }

    #[inline]
    pub fn delete(data: T) -> Self {
        Self { data, diff: -1 }
    }

    #[inline]
    pub fn is_insert(&self) -> bool {
        self.diff > 0
    }

    #[inline]
    pub fn is_delete(&self) -> bool {
        self.diff < 0
    }
}

/// Changes grouped by collection name, in the order they were recorded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeSet {
    changes: BTreeMap<String, Vec<Delta<Tuple>>>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a change for `collection`.
    pub fn push(&mut self, collection: &str, delta: Delta<Tuple>) {
        match self.changes.get_mut(collection) {
            Some(list) => list.push(delta),
            None => {
                self.changes.insert(String::from(collection), alloc::vec![delta]);
            }
        }
    }

    /// Returns true if no changes were recorded.
    pub fn is_empty(&self) -> bool {
        self.changes.values().all(|v| v.is_empty())
    }

    /// Returns the collections with recorded changes.
    pub fn collections(&self) -> impl Iterator<Item = &str> {
        self.changes
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(k, _)| k.as_str())
    }

    /// Returns the changes recorded for `collection`.
    pub fn get(&self, collection: &str) -> &[Delta<Tuple>] {
        self.changes
            .get(collection)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Cancels out removals and insertions of the same tuple, keeping the
    /// net effect per collection.
    pub fn consolidate(&mut self) {
        for list in self.changes.values_mut() {
            let mut net: BTreeMap<Tuple, i32> = BTreeMap::new();
            for d in list.drain(..) {
                *net.entry(d.data).or_insert(0) += d.diff;
            }
            // removals first so a replaced key is cleared before its new value lands
            let (dels, ins): (Vec<_>, Vec<_>) = net
                .into_iter()
                .filter(|(_, diff)| *diff != 0)
                .partition(|(_, diff)| *diff < 0);
            list.extend(dels.into_iter().map(|(t, _)| Delta::delete(t)));
            list.extend(ins.into_iter().map(|(t, _)| Delta::insert(t)));
        }
        self.changes.retain(|_, v| !v.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidal_core::tuple;

    #[test]
    fn test_delta_insert_delete() {
        let d = Delta::insert(42);
        assert!(d.is_insert());
        assert!(!d.is_delete());
        assert!(Delta::delete(42).is_delete());
    }

    #[test]
    fn test_changeset_groups_by_collection() {
        let mut cs = ChangeSet::new();
        cs.push("a", Delta::insert(tuple![1]));
        cs.push("b", Delta::delete(tuple![2]));
        cs.push("a", Delta::insert(tuple![3]));
        assert_eq!(cs.get("a").len(), 2);
        assert_eq!(cs.get("b").len(), 1);
        assert!(cs.get("c").is_empty());
        assert_eq!(cs.collections().count(), 2);
    }

    #[test]
    fn test_changeset_consolidate() {
        let mut cs = ChangeSet::new();
        cs.push("t", Delta::delete(tuple![1, "x"]));
        cs.push("t", Delta::insert(tuple![1, "x"]));
        cs.push("t", Delta::insert(tuple![1, "y"]));
        cs.push("u", Delta::insert(tuple![5]));
        cs.push("u", Delta::delete(tuple![5]));
        cs.consolidate();
        assert_eq!(cs.get("t"), &[Delta::insert(tuple![1, "y"])]);
        assert!(cs.get("u").is_empty());
        assert_eq!(cs.collections().collect::<Vec<_>>(), alloc::vec!["t"]);
    }
}
