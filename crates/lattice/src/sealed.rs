//! Sealed lattice: a value that may be set once.

use crate::value::LatticeValue;
use crate::Lattice;
use alloc::boxed::Box;
use alloc::format;
use tidal_core::{Error, Result};

/// Wraps another lattice value and refuses to let it change once present.
///
/// Merging with bottom (either side) returns the other operand. Merging a
/// present value with an input that would change it is a hard error, which
/// makes a sealed value usable as a one-shot coordination barrier.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SealedLattice {
    v: Option<Box<LatticeValue>>,
}

impl SealedLattice {
    /// Seals a value.
    pub fn new(v: LatticeValue) -> Self {
        Self {
            v: Some(Box::new(v)),
        }
    }

    /// Returns the sealed value, if set.
    #[inline]
    pub fn reveal(&self) -> Option<&LatticeValue> {
        self.v.as_deref()
    }

    /// Order-preserving map: applies `f` to the sealed value once it is present.
    pub fn safely<T>(&self, f: impl FnOnce(&LatticeValue) -> T) -> Option<T> {
        self.v.as_deref().map(f)
    }
}

impl Lattice for SealedLattice {
    fn bottom() -> Self {
        Self { v: None }
    }

    fn merge(&self, other: &Self) -> Result<Self> {
        let (mine, theirs) = match (&self.v, &other.v) {
            (_, None) => return Ok(self.clone()),
            (None, Some(_)) => return Ok(other.clone()),
            (Some(a), Some(b)) => (a, b),
        };
        let merged = mine.merge(theirs)?;
        if merged == **mine {
            Ok(self.clone())
        } else {
            Err(Error::SealedConflict {
                current: format!("{:?}", mine),
                input: format!("{:?}", theirs),
            })
        }
    }
}
