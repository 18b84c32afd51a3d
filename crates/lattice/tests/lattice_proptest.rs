//! Property-based tests for lattice merge laws.
//!
//! Every lattice kind must merge idempotently and commutatively, and any
//! partition of the inputs must fold to the same final value.

use proptest::prelude::*;
use tidal_core::Value;
use tidal_lattice::{
    BagLattice, BoolLattice, HashSetLattice, LatticeValue, MapLattice, MaxLattice, MinLattice,
    PositiveSetLattice, SealedLattice, SetLattice,
};

fn small_int() -> impl Strategy<Value = i64> {
    -50i64..50i64
}

fn small_nat() -> impl Strategy<Value = i64> {
    0i64..50i64
}

/// Strategy for a lattice value of a randomly chosen non-sealed kind.
fn lattice_of_kind(kind: u8) -> BoxedStrategy<LatticeValue> {
    match kind {
        0 => small_int()
            .prop_map(|v| LatticeValue::Max(MaxLattice::new(Value::Int64(v))))
            .boxed(),
        1 => small_int()
            .prop_map(|v| LatticeValue::Min(MinLattice::new(Value::Int64(v))))
            .boxed(),
        2 => any::<bool>()
            .prop_map(|b| LatticeValue::Bool(BoolLattice::new(b)))
            .boxed(),
        3 => prop::collection::vec(small_int(), 0..8)
            .prop_map(|xs| LatticeValue::Set(SetLattice::new(xs.into_iter().map(Value::Int64))))
            .boxed(),
        4 => prop::collection::vec(small_nat(), 0..8)
            .prop_map(|xs| {
                LatticeValue::PositiveSet(
                    PositiveSetLattice::new(xs.into_iter().map(Value::Int64)).unwrap(),
                )
            })
            .boxed(),
        5 => prop::collection::vec(small_int(), 0..8)
            .prop_map(|xs| {
                LatticeValue::HashSet(HashSetLattice::new(xs.into_iter().map(Value::Int64)))
            })
            .boxed(),
        6 => prop::collection::vec((0i64..6, small_int()), 0..6)
            .prop_map(|entries| {
                LatticeValue::Map(
                    MapLattice::new(entries.into_iter().map(|(k, v)| {
                        (Value::Int64(k), LatticeValue::Max(MaxLattice::new(Value::Int64(v))))
                    }))
                    .unwrap(),
                )
            })
            .boxed(),
        _ => prop::collection::vec((0i64..6, 1u64..5), 0..6)
            .prop_map(|entries| {
                LatticeValue::Bag(
                    BagLattice::new(entries.into_iter().map(|(k, m)| (Value::Int64(k), m)))
                        .unwrap(),
                )
            })
            .boxed(),
    }
}

/// Three values of the same kind.
fn triple() -> impl Strategy<Value = (LatticeValue, LatticeValue, LatticeValue)> {
    (0u8..8).prop_flat_map(|k| (lattice_of_kind(k), lattice_of_kind(k), lattice_of_kind(k)))
}

/// A list of values of the same kind.
fn values() -> impl Strategy<Value = Vec<LatticeValue>> {
    (0u8..8).prop_flat_map(|k| prop::collection::vec(lattice_of_kind(k), 1..10))
}

fn fold(items: &[LatticeValue]) -> LatticeValue {
    let mut acc = LatticeValue::bottom(items[0].kind());
    for v in items {
        acc.merge_assign(v).unwrap();
    }
    acc
}

proptest! {
    /// Property: merge(a, a) == a.
    #[test]
    fn merge_is_idempotent((a, _, _) in triple()) {
        prop_assert_eq!(a.merge(&a).unwrap(), a);
    }

    /// Property: merge(a, b) == merge(b, a).
    #[test]
    fn merge_is_commutative((a, b, _) in triple()) {
        prop_assert_eq!(a.merge(&b).unwrap(), b.merge(&a).unwrap());
    }

    /// Property: merge(merge(a, b), c) == merge(a, merge(b, c)).
    #[test]
    fn merge_is_associative((a, b, c) in triple()) {
        let left = a.merge(&b).unwrap().merge(&c).unwrap();
        let right = a.merge(&b.merge(&c).unwrap()).unwrap();
        prop_assert_eq!(left, right);
    }

    /// Property: bottom is the identity.
    #[test]
    fn bottom_is_identity((a, _, _) in triple()) {
        let bottom = LatticeValue::bottom(a.kind());
        prop_assert_eq!(bottom.merge(&a).unwrap(), a.clone());
        prop_assert!(bottom.leq(&a).unwrap());
    }

    /// Property: folding any partition of the inputs yields the same value.
    #[test]
    fn partitioned_fold_matches_sequential_fold(items in values(), split in 0usize..10) {
        let split = split.min(items.len());
        let whole = fold(&items);
        let (left, right) = items.split_at(split);
        let mut parts = LatticeValue::bottom(items[0].kind());
        if !left.is_empty() {
            parts.merge_assign(&fold(left)).unwrap();
        }
        if !right.is_empty() {
            parts.merge_assign(&fold(right)).unwrap();
        }
        let mut reversed: Vec<LatticeValue> = items.clone();
        reversed.reverse();
        prop_assert_eq!(&parts, &whole);
        prop_assert_eq!(fold(&reversed), whole);
    }

    /// Property: the merged value is an upper bound of both inputs.
    #[test]
    fn merge_is_upper_bound((a, b, _) in triple()) {
        let m = a.merge(&b).unwrap();
        prop_assert!(a.leq(&m).unwrap());
        prop_assert!(b.leq(&m).unwrap());
    }

    /// Property: a sealed value accepts exactly the inputs it already subsumes.
    #[test]
    fn sealed_accepts_only_subsumed(a in lattice_of_kind(3), b in lattice_of_kind(3)) {
        let sealed = SealedLattice::new(a.clone());
        let input = SealedLattice::new(b.clone());
        let result = tidal_lattice::Lattice::merge(&sealed, &input);
        if b.leq(&a).unwrap() {
            prop_assert_eq!(result.unwrap(), sealed);
        } else {
            prop_assert!(result.is_err());
        }
    }
}
