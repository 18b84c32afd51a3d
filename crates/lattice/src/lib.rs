//! Tidal Lattice - monotone merge-based values.
//!
//! A lattice value is a single value whose `merge` is associative,
//! commutative and idempotent. Lattice collections grow by merging instead of
//! by inserting tuples, so repeated or reordered inputs converge to the same
//! result.
//!
//! Functions over lattice values come in two flavours:
//!
//! - **morphisms** are monotone and may be applied to any partial value,
//!   including the delta of a single semi-naive iteration
//! - **order-preserving maps** need the final value and may only be used by
//!   rules flagged as non-monotone (or inside a `Sealed` wrapper)
//!
//! # Example
//!
//! ```rust
//! use tidal_core::Value;
//! use tidal_lattice::{Lattice, MaxLattice};
//!
//! let mut m = MaxLattice::bottom();
//! for v in [5, 10, 3, 13] {
//!     m.merge_assign(&MaxLattice::new(Value::from(v))).unwrap();
//! }
//! assert_eq!(m.reveal(), Some(&Value::Int64(13)));
//! assert!(m.gt(&Value::from(12)).reveal());
//! ```

#![no_std]

extern crate alloc;

mod bag;
mod boolean;
mod map;
mod ordered;
mod sealed;
mod set;
mod value;

pub use bag::BagLattice;
pub use boolean::BoolLattice;
pub use map::MapLattice;
pub use ordered::{MaxLattice, MinLattice};
pub use sealed::SealedLattice;
pub use set::{HashSetLattice, PositiveSetLattice, SetLattice};
pub use value::{FunctionClass, LatticeKind, LatticeValue};

use tidal_core::Result;

/// A join-semilattice.
///
/// `merge` must be commutative, associative and idempotent; `bottom` is its
/// identity.
pub trait Lattice: Clone + PartialEq + core::fmt::Debug {
    /// The bottom element.
    fn bottom() -> Self;

    /// Least upper bound of `self` and `other`.
    fn merge(&self, other: &Self) -> Result<Self>;

    /// `self <= other` in the lattice order, i.e. `self ⊔ other == other`.
    fn leq(&self, other: &Self) -> Result<bool> {
        Ok(&self.merge(other)? == other)
    }

    /// Merges `other` into `self`, returning true if the value changed.
    fn merge_assign(&mut self, other: &Self) -> Result<bool> {
        let merged = self.merge(other)?;
        if merged == *self {
            Ok(false)
        } else {
            *self = merged;
            Ok(true)
        }
    }
}
