//! Boolean-or lattice.

use crate::Lattice;
use tidal_core::Result;

/// A flag that can only go from false to true.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BoolLattice {
    v: bool,
}

impl BoolLattice {
    /// Creates a bool lattice.
    pub fn new(v: bool) -> Self {
        Self { v }
    }

    /// Returns the current value.
    #[inline]
    pub fn reveal(&self) -> bool {
        self.v
    }

    /// Morphism: runs `f` once the flag is true.
    pub fn when_true<T>(&self, f: impl FnOnce() -> T) -> Option<T> {
        if self.v {
            Some(f())
        } else {
            None
        }
    }
}

impl Lattice for BoolLattice {
    fn bottom() -> Self {
        Self { v: false }
    }

    fn merge(&self, other: &Self) -> Result<Self> {
        Ok(Self {
            v: self.v || other.v,
        })
    }
}
