//! Multiset lattice.

use crate::ordered::MaxLattice;
use crate::Lattice;
use alloc::collections::BTreeMap;
use alloc::format;
use tidal_core::{Error, Result, Value};

/// A multiset. Merge takes the per-element maximum multiplicity, which keeps
/// it idempotent; `sum` adds multiplicities.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct BagLattice {
    v: BTreeMap<Value, u64>,
}

impl BagLattice {
    /// Creates a bag from `(element, multiplicity)` pairs. Multiplicities must be positive.
    pub fn new(entries: impl IntoIterator<Item = (Value, u64)>) -> Result<Self> {
        let mut v = BTreeMap::new();
        for (k, mult) in entries {
            if mult == 0 {
                return Err(Error::type_error(
                    "lbag#initialize",
                    format!("multiplicity of {} must be positive", k),
                ));
            }
            let slot = v.entry(k).or_insert(0u64);
            *slot = (*slot).max(mult);
        }
        Ok(Self { v })
    }

    /// Returns the multiplicities.
    #[inline]
    pub fn reveal(&self) -> &BTreeMap<Value, u64> {
        &self.v
    }

    /// Morphism: per-element minimum multiplicity over common elements.
    pub fn intersect(&self, other: &BagLattice) -> BagLattice {
        let (scan, probe) = if self.v.len() < other.v.len() {
            (&self.v, &other.v)
        } else {
            (&other.v, &self.v)
        };
        let v = scan
            .iter()
            .filter_map(|(k, m)| probe.get(k).map(|p| (k.clone(), (*m).min(*p))))
            .collect();
        Self { v }
    }

    /// Morphism: multiplicity of `k` (zero if absent).
    pub fn mult(&self, k: &Value) -> MaxLattice {
        let m = self.v.get(k).copied().unwrap_or(0);
        MaxLattice::new(Value::Int64(m as i64))
    }

    /// Morphism: adds multiplicities element-wise.
    pub fn sum(&self, other: &BagLattice) -> BagLattice {
        let mut v = self.v.clone();
        for (k, m) in &other.v {
            let slot = v.entry(k.clone()).or_insert(0);
            *slot = slot.saturating_add(*m);
        }
        Self { v }
    }

    /// Order-preserving map: number of distinct elements.
    pub fn size(&self) -> MaxLattice {
        MaxLattice::new(Value::Int64(self.v.len() as i64))
    }
}

impl Lattice for BagLattice {
    fn bottom() -> Self {
        Self { v: BTreeMap::new() }
    }

    fn merge(&self, other: &Self) -> Result<Self> {
        let mut v = self.v.clone();
        for (k, m) in &other.v {
            let slot = v.entry(k.clone()).or_insert(0);
            *slot = (*slot).max(*m);
        }
        Ok(Self { v })
    }
}
