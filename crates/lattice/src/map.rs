//! Map lattice: keys map to lattice values, merged key-wise.

use crate::boolean::BoolLattice;
use crate::ordered::MaxLattice;
use crate::value::{LatticeKind, LatticeValue};
use crate::Lattice;
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::vec::Vec;
use tidal_core::{Error, Result, Value};

/// A map from plain values to lattice values.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MapLattice {
    v: BTreeMap<Value, LatticeValue>,
}

impl MapLattice {
    /// Creates a map lattice from entries. Entries sharing a key are merged.
    pub fn new(entries: impl IntoIterator<Item = (Value, LatticeValue)>) -> Result<Self> {
        let mut v: BTreeMap<Value, LatticeValue> = BTreeMap::new();
        for (k, val) in entries {
            let merged = match v.get(&k) {
                Some(existing) => existing.merge(&val)?,
                None => val,
            };
            v.insert(k, merged);
        }
        Ok(Self { v })
    }

    /// Creates a single-entry map.
    pub fn singleton(k: Value, val: LatticeValue) -> Self {
        let mut v = BTreeMap::new();
        v.insert(k, val);
        Self { v }
    }

    /// Returns the entries.
    #[inline]
    pub fn reveal(&self) -> &BTreeMap<Value, LatticeValue> {
        &self.v
    }

    /// Morphism: the value under `k`, or bottom of `default` if absent.
    ///
    /// Without a default kind a missing key is an error.
    pub fn at(&self, k: &Value, default: Option<LatticeKind>) -> Result<LatticeValue> {
        match (self.v.get(k), default) {
            (Some(val), _) => Ok(val.clone()),
            (None, Some(kind)) => Ok(LatticeValue::bottom(kind)),
            (None, None) => Err(Error::type_error(
                "lmap#at",
                format!("missing key {} and no default lattice", k),
            )),
        }
    }

    /// Morphism: key membership.
    pub fn key(&self, k: &Value) -> BoolLattice {
        BoolLattice::new(self.v.contains_key(k))
    }

    /// Order-preserving map: number of keys.
    pub fn size(&self) -> MaxLattice {
        MaxLattice::new(Value::Int64(self.v.len() as i64))
    }

    /// Morphism: maps each entry.
    pub fn pro<T>(&self, mut f: impl FnMut(&Value, &LatticeValue) -> T) -> Vec<T> {
        self.v.iter().map(|(k, v)| f(k, v)).collect()
    }

    /// Morphism: common keys, with their values merged.
    pub fn intersect(&self, other: &MapLattice) -> Result<MapLattice> {
        let (scan, probe) = if self.v.len() < other.v.len() {
            (&self.v, &other.v)
        } else {
            (&other.v, &self.v)
        };
        let mut rv = BTreeMap::new();
        for (k, val) in scan {
            if let Some(p) = probe.get(k) {
                rv.insert(k.clone(), val.merge(p)?);
            }
        }
        Ok(Self { v: rv })
    }

    /// Subsumption: every key of `self` is in `other` with a value no smaller.
    pub fn lt_eq(&self, other: &MapLattice) -> Result<BoolLattice> {
        for (k, v) in &self.v {
            match other.v.get(k) {
                None => return Ok(BoolLattice::new(false)),
                Some(ov) => {
                    if !v.leq(ov)? {
                        return Ok(BoolLattice::new(false));
                    }
                }
            }
        }
        Ok(BoolLattice::new(true))
    }
}

impl Lattice for MapLattice {
    fn bottom() -> Self {
        Self { v: BTreeMap::new() }
    }

    fn merge(&self, other: &Self) -> Result<Self> {
        let mut rv = self.v.clone();
        for (k, val) in &other.v {
            let merged = match rv.get(k) {
                Some(existing) => existing.merge(val)?,
                None => val.clone(),
            };
            rv.insert(k.clone(), merged);
        }
        Ok(Self { v: rv })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MaxLattice;

    fn max(v: i64) -> LatticeValue {
        LatticeValue::Max(MaxLattice::new(Value::Int64(v)))
    }

    fn map(entries: &[(&str, i64)]) -> MapLattice {
        MapLattice::new(entries.iter().map(|(k, v)| (Value::from(*k), max(*v)))).unwrap()
    }

    #[test]
    fn test_map_keywise_merge() {
        let m = map(&[("a", 1), ("b", 5)]).merge(&map(&[("a", 3), ("c", 2)])).unwrap();
        assert_eq!(m, map(&[("a", 3), ("b", 5), ("c", 2)]));
        assert_eq!(m.size().reveal(), Some(&Value::Int64(3)));
    }

    #[test]
    fn test_map_at_and_key() {
        let m = map(&[("a", 1)]);
        assert_eq!(m.at(&Value::from("a"), None).unwrap(), max(1));
        assert_eq!(
            m.at(&Value::from("z"), Some(LatticeKind::Max)).unwrap(),
            LatticeValue::bottom(LatticeKind::Max)
        );
        assert!(m.at(&Value::from("z"), None).is_err());
        assert!(m.key(&Value::from("a")).reveal());
        assert!(!m.key(&Value::from("z")).reveal());
    }

    #[test]
    fn test_map_intersect() {
        let m = map(&[("a", 1), ("b", 5)]).intersect(&map(&[("b", 7), ("c", 1)])).unwrap();
        assert_eq!(m, map(&[("b", 7)]));
    }

    #[test]
    fn test_map_lt_eq() {
        let small = map(&[("a", 1)]);
        let big = map(&[("a", 2), ("b", 1)]);
        assert!(small.lt_eq(&big).unwrap().reveal());
        assert!(!big.lt_eq(&small).unwrap().reveal());
        assert!(!map(&[("a", 3)]).lt_eq(&big).unwrap().reveal());
    }

    #[test]
    fn test_map_kind_mismatch_is_type_error() {
        let a = MapLattice::singleton(Value::from("k"), max(1));
        let b = MapLattice::singleton(
            Value::from("k"),
            LatticeValue::Bool(crate::BoolLattice::new(true)),
        );
        assert!(a.merge(&b).is_err());
    }
}
