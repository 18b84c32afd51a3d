//! Dynamic lattice values stored in lattice collections.

use crate::{
    BagLattice, BoolLattice, HashSetLattice, Lattice, MapLattice, MaxLattice, MinLattice,
    PositiveSetLattice, SealedLattice, SetLattice,
};
use alloc::format;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;
use tidal_core::{Error, Result, Value};

/// The lattice kinds a collection can be declared with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LatticeKind {
    Max,
    Min,
    Bool,
    Set,
    PositiveSet,
    HashSet,
    Map,
    Bag,
    Sealed,
}

/// How a lattice function relates to the lattice order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FunctionClass {
    /// Monotone and distributes over merge; safe on deltas.
    Morphism,
    /// Monotone but needs the whole value.
    OrderPreserving,
    /// Neither; only legal in non-monotone rules.
    NonMonotone,
}

impl LatticeKind {
    /// Short name, as used in rule listings.
    pub fn name(&self) -> &'static str {
        match self {
            LatticeKind::Max => "lmax",
            LatticeKind::Min => "lmin",
            LatticeKind::Bool => "lbool",
            LatticeKind::Set => "lset",
            LatticeKind::PositiveSet => "lpset",
            LatticeKind::HashSet => "lhset",
            LatticeKind::Map => "lmap",
            LatticeKind::Bag => "lbag",
            LatticeKind::Sealed => "lseal",
        }
    }

    /// Classifies a function of this lattice by name.
    ///
    /// `merge` is always a morphism and `reveal` is never monotone. Unknown
    /// names are treated as non-monotone.
    pub fn classify(&self, func: &str) -> FunctionClass {
        use FunctionClass::*;
        if func == "merge" {
            return Morphism;
        }
        if func == "reveal" {
            return NonMonotone;
        }
        match (self, func) {
            (LatticeKind::Max, "gt" | "gt_eq" | "+" | "add" | "min_of") => Morphism,
            (LatticeKind::Min, "lt" | "+" | "add") => Morphism,
            (LatticeKind::Bool, "when_true") => Morphism,
            (
                LatticeKind::Set | LatticeKind::HashSet,
                "intersect" | "product" | "contains" | "pro",
            ) => Morphism,
            (LatticeKind::Set | LatticeKind::HashSet, "size") => OrderPreserving,
            (LatticeKind::PositiveSet, "intersect") => Morphism,
            (LatticeKind::PositiveSet, "pos_sum" | "size") => OrderPreserving,
            (LatticeKind::Map, "at" | "key" | "pro" | "intersect") => Morphism,
            (LatticeKind::Map, "size" | "lt_eq") => OrderPreserving,
            (LatticeKind::Bag, "intersect" | "mult" | "sum" | "+") => Morphism,
            (LatticeKind::Bag, "size") => OrderPreserving,
            (LatticeKind::Sealed, "safely") => Morphism,
            _ => NonMonotone,
        }
    }
}

impl fmt::Display for LatticeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A lattice value of any kind.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LatticeValue {
    Max(MaxLattice),
    Min(MinLattice),
    Bool(BoolLattice),
    Set(SetLattice),
    PositiveSet(PositiveSetLattice),
    HashSet(HashSetLattice),
    Map(MapLattice),
    Bag(BagLattice),
    Sealed(SealedLattice),
}

impl LatticeValue {
    /// Bottom of the given kind.
    pub fn bottom(kind: LatticeKind) -> Self {
        match kind {
            LatticeKind::Max => LatticeValue::Max(MaxLattice::bottom()),
            LatticeKind::Min => LatticeValue::Min(MinLattice::bottom()),
            LatticeKind::Bool => LatticeValue::Bool(BoolLattice::bottom()),
            LatticeKind::Set => LatticeValue::Set(SetLattice::bottom()),
            LatticeKind::PositiveSet => LatticeValue::PositiveSet(PositiveSetLattice::bottom()),
            LatticeKind::HashSet => LatticeValue::HashSet(HashSetLattice::bottom()),
            LatticeKind::Map => LatticeValue::Map(MapLattice::bottom()),
            LatticeKind::Bag => LatticeValue::Bag(BagLattice::bottom()),
            LatticeKind::Sealed => LatticeValue::Sealed(SealedLattice::bottom()),
        }
    }

    /// The kind of this value.
    pub fn kind(&self) -> LatticeKind {
        match self {
            LatticeValue::Max(_) => LatticeKind::Max,
            LatticeValue::Min(_) => LatticeKind::Min,
            LatticeValue::Bool(_) => LatticeKind::Bool,
            LatticeValue::Set(_) => LatticeKind::Set,
            LatticeValue::PositiveSet(_) => LatticeKind::PositiveSet,
            LatticeValue::HashSet(_) => LatticeKind::HashSet,
            LatticeValue::Map(_) => LatticeKind::Map,
            LatticeValue::Bag(_) => LatticeKind::Bag,
            LatticeValue::Sealed(_) => LatticeKind::Sealed,
        }
    }

    /// Builds a lattice value of `kind` from a plain value.
    ///
    /// Collection kinds accept a list (its elements) or a scalar (a single
    /// element). Maps and sealed values have no plain encoding.
    pub fn from_value(kind: LatticeKind, v: &Value) -> Result<Self> {
        let elems = || -> Vec<Value> {
            match v {
                Value::Null => Vec::new(),
                Value::List(items) => items.clone(),
                other => vec![other.clone()],
            }
        };
        Ok(match kind {
            LatticeKind::Max => LatticeValue::Max(MaxLattice::new(v.clone())),
            LatticeKind::Min => LatticeValue::Min(MinLattice::new(v.clone())),
            LatticeKind::Bool => match v {
                Value::Null => LatticeValue::Bool(BoolLattice::bottom()),
                Value::Boolean(b) => LatticeValue::Bool(BoolLattice::new(*b)),
                other => {
                    return Err(Error::type_error(
                        "lbool#initialize",
                        format!("expected a boolean, got {}", other.type_name()),
                    ))
                }
            },
            LatticeKind::Set => LatticeValue::Set(SetLattice::new(elems())),
            LatticeKind::PositiveSet => LatticeValue::PositiveSet(PositiveSetLattice::new(elems())?),
            LatticeKind::HashSet => LatticeValue::HashSet(HashSetLattice::new(elems())),
            LatticeKind::Bag => {
                let mut counts = alloc::collections::BTreeMap::new();
                for e in elems() {
                    *counts.entry(e).or_insert(0u64) += 1;
                }
                LatticeValue::Bag(BagLattice::new(counts)?)
            }
            LatticeKind::Map | LatticeKind::Sealed => {
                return Err(Error::type_error(
                    "LatticeValue::from_value",
                    format!("{} cannot be built from a plain value", kind),
                ))
            }
        })
    }

    /// Least upper bound. Merging different kinds is a type error.
    pub fn merge(&self, other: &LatticeValue) -> Result<LatticeValue> {
        use LatticeValue::*;
        Ok(match (self, other) {
            (Max(a), Max(b)) => Max(a.merge(b)?),
            (Min(a), Min(b)) => Min(a.merge(b)?),
            (Bool(a), Bool(b)) => Bool(a.merge(b)?),
            (Set(a), Set(b)) => Set(a.merge(b)?),
            (PositiveSet(a), PositiveSet(b)) => PositiveSet(a.merge(b)?),
            (HashSet(a), HashSet(b)) => HashSet(a.merge(b)?),
            (Map(a), Map(b)) => Map(a.merge(b)?),
            (Bag(a), Bag(b)) => Bag(a.merge(b)?),
            (Sealed(a), Sealed(b)) => Sealed(a.merge(b)?),
            (a, b) => {
                return Err(Error::type_error(
                    "merge",
                    format!("cannot merge {} with {}", a.kind(), b.kind()),
                ))
            }
        })
    }

    /// Merges `other` into `self`, returning true if the value changed.
    pub fn merge_assign(&mut self, other: &LatticeValue) -> Result<bool> {
        let merged = self.merge(other)?;
        if merged == *self {
            Ok(false)
        } else {
            *self = merged;
            Ok(true)
        }
    }

    /// `self <= other` in the lattice order.
    pub fn leq(&self, other: &LatticeValue) -> Result<bool> {
        Ok(&self.merge(other)? == other)
    }

    /// True if this is the bottom of its kind.
    pub fn is_bottom(&self) -> bool {
        *self == LatticeValue::bottom(self.kind())
    }

    /// Plain rendering of the revealed value, used when lattice contents are
    /// copied into tuples. Sets and bags render in sorted order.
    pub fn to_value(&self) -> Value {
        match self {
            LatticeValue::Max(m) => m.reveal().cloned().unwrap_or(Value::Null),
            LatticeValue::Min(m) => m.reveal().cloned().unwrap_or(Value::Null),
            LatticeValue::Bool(b) => Value::Boolean(b.reveal()),
            LatticeValue::Set(s) => Value::List(s.reveal().iter().cloned().collect()),
            LatticeValue::PositiveSet(s) => Value::List(s.reveal().iter().cloned().collect()),
            LatticeValue::HashSet(s) => {
                let mut items: Vec<Value> = s.reveal().iter().cloned().collect();
                items.sort();
                Value::List(items)
            }
            LatticeValue::Map(m) => Value::List(
                m.reveal()
                    .iter()
                    .map(|(k, v)| Value::List(vec![k.clone(), v.to_value()]))
                    .collect(),
            ),
            LatticeValue::Bag(b) => Value::List(
                b.reveal()
                    .iter()
                    .map(|(k, m)| Value::List(vec![k.clone(), Value::from(*m)]))
                    .collect(),
            ),
            LatticeValue::Sealed(s) => s.reveal().map(|v| v.to_value()).unwrap_or(Value::Null),
        }
    }
}

impl fmt::Display for LatticeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}: {}>", self.kind(), self.to_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bottom_kind_roundtrip() {
        for kind in [
            LatticeKind::Max,
            LatticeKind::Min,
            LatticeKind::Bool,
            LatticeKind::Set,
            LatticeKind::PositiveSet,
            LatticeKind::HashSet,
            LatticeKind::Map,
            LatticeKind::Bag,
            LatticeKind::Sealed,
        ] {
            let b = LatticeValue::bottom(kind);
            assert_eq!(b.kind(), kind);
            assert!(b.is_bottom());
        }
    }

    #[test]
    fn test_from_value_folds_scalars() {
        let m = LatticeValue::from_value(LatticeKind::Max, &Value::Int64(4)).unwrap();
        assert_eq!(m.to_value(), Value::Int64(4));
        let s = LatticeValue::from_value(
            LatticeKind::Set,
            &Value::List(vec![Value::Int64(2), Value::Int64(1), Value::Int64(2)]),
        )
        .unwrap();
        assert_eq!(s.to_value(), Value::List(vec![Value::Int64(1), Value::Int64(2)]));
        assert!(LatticeValue::from_value(LatticeKind::Bool, &Value::from("x")).is_err());
        assert!(LatticeValue::from_value(LatticeKind::Map, &Value::Int64(1)).is_err());
    }

    #[test]
    fn test_kind_mismatch() {
        let a = LatticeValue::bottom(LatticeKind::Max);
        let b = LatticeValue::bottom(LatticeKind::Min);
        assert!(matches!(a.merge(&b), Err(Error::Type { .. })));
    }

    #[test]
    fn test_merge_assign_no_change() {
        let mut v = LatticeValue::from_value(LatticeKind::Max, &Value::Int64(13)).unwrap();
        let same = v.clone();
        assert!(!v.merge_assign(&same).unwrap());
        let bigger = LatticeValue::from_value(LatticeKind::Max, &Value::Int64(14)).unwrap();
        assert!(v.merge_assign(&bigger).unwrap());
    }

    #[test]
    fn test_classify() {
        assert_eq!(LatticeKind::Max.classify("gt"), FunctionClass::Morphism);
        assert_eq!(LatticeKind::Set.classify("size"), FunctionClass::OrderPreserving);
        assert_eq!(LatticeKind::Map.classify("at"), FunctionClass::Morphism);
        assert_eq!(LatticeKind::Max.classify("reveal"), FunctionClass::NonMonotone);
        assert_eq!(LatticeKind::Bag.classify("nope"), FunctionClass::NonMonotone);
        assert_eq!(LatticeKind::Sealed.classify("merge"), FunctionClass::Morphism);
    }
}
