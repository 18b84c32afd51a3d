//! Set-valued lattices.

use crate::boolean::BoolLattice;
use crate::ordered::MaxLattice;
use crate::Lattice;
use alloc::collections::BTreeSet;
use alloc::format;
use alloc::vec;
use alloc::vec::Vec;
use hashbrown::HashSet;
use tidal_core::{Error, Result, Value};

/// Grow-only set, ordered for deterministic iteration.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SetLattice {
    v: BTreeSet<Value>,
}

impl SetLattice {
    /// Creates a set from elements. Duplicates are dropped.
    pub fn new(elems: impl IntoIterator<Item = Value>) -> Self {
        Self {
            v: elems.into_iter().collect(),
        }
    }

    /// Returns the elements.
    #[inline]
    pub fn reveal(&self) -> &BTreeSet<Value> {
        &self.v
    }

    /// Morphism: elements present in both sets.
    pub fn intersect(&self, other: &SetLattice) -> SetLattice {
        Self {
            v: self.v.intersection(&other.v).cloned().collect(),
        }
    }

    /// Morphism: cartesian product, each pair packed as a two-element list.
    pub fn product(&self, other: &SetLattice) -> SetLattice {
        let mut rv = BTreeSet::new();
        for a in &self.v {
            for b in &other.v {
                rv.insert(Value::List(vec![a.clone(), b.clone()]));
            }
        }
        Self { v: rv }
    }

    /// Morphism: membership test.
    pub fn contains(&self, k: &Value) -> BoolLattice {
        BoolLattice::new(self.v.contains(k))
    }

    /// Morphism: maps each element, typically to tuples for a relational target.
    pub fn pro<T>(&self, f: impl FnMut(&Value) -> T) -> Vec<T> {
        self.v.iter().map(f).collect()
    }

    /// Order-preserving map: number of elements.
    pub fn size(&self) -> MaxLattice {
        MaxLattice::new(Value::Int64(self.v.len() as i64))
    }
}

impl Lattice for SetLattice {
    fn bottom() -> Self {
        Self { v: BTreeSet::new() }
    }

    fn merge(&self, other: &Self) -> Result<Self> {
        Ok(Self {
            v: self.v.union(&other.v).cloned().collect(),
        })
    }
}

/// A set of non-negative numbers, which makes its sum order-preserving.
///
/// Duplicate elimination means `pos_sum` computes a sum over distinct values.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PositiveSetLattice {
    inner: SetLattice,
}

impl PositiveSetLattice {
    /// Creates a positive set, rejecting negative or non-numeric elements.
    pub fn new(elems: impl IntoIterator<Item = Value>) -> Result<Self> {
        let inner = SetLattice::new(elems);
        for n in inner.reveal() {
            let ok = match n {
                Value::Int64(i) => *i >= 0,
                Value::Float64(f) => *f >= 0.0,
                _ => false,
            };
            if !ok {
                return Err(Error::type_error(
                    "lpset#initialize",
                    format!("not a non-negative number: {}", n),
                ));
            }
        }
        Ok(Self { inner })
    }

    /// Returns the elements.
    #[inline]
    pub fn reveal(&self) -> &BTreeSet<Value> {
        self.inner.reveal()
    }

    /// Morphism: elements present in both sets.
    pub fn intersect(&self, other: &PositiveSetLattice) -> PositiveSetLattice {
        Self {
            inner: self.inner.intersect(&other.inner),
        }
    }

    /// Order-preserving map: sum of the elements.
    pub fn pos_sum(&self) -> MaxLattice {
        let mut sum = Value::Int64(0);
        for n in self.inner.reveal() {
            sum = sum.checked_add(n).unwrap_or(Value::Float64(f64::INFINITY));
        }
        MaxLattice::new(sum)
    }

    /// Order-preserving map: number of elements.
    pub fn size(&self) -> MaxLattice {
        self.inner.size()
    }
}

impl Lattice for PositiveSetLattice {
    fn bottom() -> Self {
        Self {
            inner: SetLattice::bottom(),
        }
    }

    fn merge(&self, other: &Self) -> Result<Self> {
        Ok(Self {
            inner: self.inner.merge(&other.inner)?,
        })
    }
}

/// Grow-only set backed by a hash table; cheaper merges for large sets.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HashSetLattice {
    v: HashSet<Value>,
}

impl HashSetLattice {
    /// Creates a hash set from elements.
    pub fn new(elems: impl IntoIterator<Item = Value>) -> Self {
        Self {
            v: elems.into_iter().collect(),
        }
    }

    /// Returns the elements.
    #[inline]
    pub fn reveal(&self) -> &HashSet<Value> {
        &self.v
    }

    /// Morphism: elements present in both sets.
    pub fn intersect(&self, other: &HashSetLattice) -> HashSetLattice {
        let (scan, probe) = if self.v.len() < other.v.len() {
            (&self.v, &other.v)
        } else {
            (&other.v, &self.v)
        };
        Self {
            v: scan.iter().filter(|e| probe.contains(*e)).cloned().collect(),
        }
    }

    /// Morphism: cartesian product, each pair packed as a two-element list.
    pub fn product(&self, other: &HashSetLattice) -> HashSetLattice {
        let mut rv = HashSet::new();
        for a in &self.v {
            for b in &other.v {
                rv.insert(Value::List(vec![a.clone(), b.clone()]));
            }
        }
        Self { v: rv }
    }

    /// Morphism: membership test.
    pub fn contains(&self, k: &Value) -> BoolLattice {
        BoolLattice::new(self.v.contains(k))
    }

    /// Morphism: maps each element.
    pub fn pro<T>(&self, f: impl FnMut(&Value) -> T) -> Vec<T> {
        self.v.iter().map(f).collect()
    }

    /// Order-preserving map: number of elements.
    pub fn size(&self) -> MaxLattice {
        MaxLattice::new(Value::Int64(self.v.len() as i64))
    }
}

impl Lattice for HashSetLattice {
    fn bottom() -> Self {
        Self { v: HashSet::new() }
    }

    fn merge(&self, other: &Self) -> Result<Self> {
        let mut v = self.v.clone();
        v.extend(other.v.iter().cloned());
        Ok(Self { v })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(xs: &[i64]) -> SetLattice {
        SetLattice::new(xs.iter().map(|x| Value::Int64(*x)))
    }

    #[test]
    fn test_set_union_dedup() {
        let s = set(&[1, 2, 2]).merge(&set(&[2, 3])).unwrap();
        assert_eq!(s, set(&[1, 2, 3]));
        assert_eq!(s.size().reveal(), Some(&Value::Int64(3)));
    }

    #[test]
    fn test_set_intersect_product() {
        assert_eq!(set(&[1, 2, 3]).intersect(&set(&[2, 3, 4])), set(&[2, 3]));
        let p = set(&[1, 2]).product(&set(&[9]));
        assert_eq!(p.reveal().len(), 2);
        assert!(p
            .contains(&Value::List(vec![Value::Int64(1), Value::Int64(9)]))
            .reveal());
    }

    #[test]
    fn test_positive_set() {
        let s = PositiveSetLattice::new([Value::Int64(3), Value::Int64(4), Value::Int64(3)]).unwrap();
        assert_eq!(s.pos_sum().reveal(), Some(&Value::Int64(7)));
        assert!(PositiveSetLattice::new([Value::Int64(-1)]).is_err());
        assert!(PositiveSetLattice::new([Value::from("a")]).is_err());
    }

    #[test]
    fn test_hash_set_matches_set() {
        let a = HashSetLattice::new([Value::Int64(1), Value::Int64(2)]);
        let b = HashSetLattice::new([Value::Int64(2), Value::Int64(5)]);
        let m = a.merge(&b).unwrap();
        assert_eq!(m.reveal().len(), 3);
        assert_eq!(a.intersect(&b), HashSetLattice::new([Value::Int64(2)]));
        assert_eq!(m.size().reveal(), Some(&Value::Int64(3)));
    }
}
