//! Max and Min lattices over totally ordered values.

use crate::boolean::BoolLattice;
use crate::Lattice;
use alloc::format;
use tidal_core::{Error, Result, Value};

fn require_numeric(site: &str, v: &Value) -> Result<()> {
    if v.is_numeric() {
        Ok(())
    } else {
        Err(Error::type_error(
            site,
            format!("expected a number, got {}", v.type_name()),
        ))
    }
}

/// Keeps the largest value seen. `None` is bottom.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct MaxLattice {
    v: Option<Value>,
}

impl MaxLattice {
    /// Creates a max lattice holding `v`. A null value is bottom.
    pub fn new(v: Value) -> Self {
        if v.is_null() {
            Self { v: None }
        } else {
            Self { v: Some(v) }
        }
    }

    /// Returns the current value.
    #[inline]
    pub fn reveal(&self) -> Option<&Value> {
        self.v.as_ref()
    }

    /// Morphism: true once the value exceeds `k`.
    pub fn gt(&self, k: &Value) -> BoolLattice {
        BoolLattice::new(matches!(&self.v, Some(v) if v > k))
    }

    /// Morphism: true once the value reaches `k`.
    pub fn gt_eq(&self, k: &Value) -> BoolLattice {
        BoolLattice::new(matches!(&self.v, Some(v) if v >= k))
    }

    /// Morphism: shifts the value by a number.
    pub fn add(&self, i: &Value) -> Result<Self> {
        require_numeric("lmax#+", i)?;
        match &self.v {
            None => Ok(self.clone()),
            Some(v) => {
                let sum = v
                    .checked_add(i)
                    .ok_or_else(|| Error::type_error("lmax#+", "overflow or non-numeric value"))?;
                Ok(Self { v: Some(sum) })
            }
        }
    }

    /// Morphism: the smaller of the current value and `i`.
    pub fn min_of(&self, i: &Value) -> Result<Self> {
        require_numeric("lmax#min_of", i)?;
        match &self.v {
            Some(v) if v <= i => Ok(self.clone()),
            _ => Ok(Self { v: Some(i.clone()) }),
        }
    }

    /// True if the current value is at most `k`.
    pub fn lt_eq(&self, k: &Value) -> BoolLattice {
        BoolLattice::new(match &self.v {
            None => true,
            Some(v) => v <= k,
        })
    }
}

impl Lattice for MaxLattice {
    fn bottom() -> Self {
        Self { v: None }
    }

    fn merge(&self, other: &Self) -> Result<Self> {
        Ok(match (&self.v, &other.v) {
            (None, _) => other.clone(),
            (_, None) => self.clone(),
            (Some(a), Some(b)) => {
                if b > a {
                    other.clone()
                } else {
                    self.clone()
                }
            }
        })
    }
}

/// Keeps the smallest value seen. `None` is bottom.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct MinLattice {
    v: Option<Value>,
}

impl MinLattice {
    /// Creates a min lattice holding `v`. A null value is bottom.
    pub fn new(v: Value) -> Self {
        if v.is_null() {
            Self { v: None }
        } else {
            Self { v: Some(v) }
        }
    }

    /// Returns the current value.
    #[inline]
    pub fn reveal(&self) -> Option<&Value> {
        self.v.as_ref()
    }

    /// Morphism: true once the value drops below `k`.
    pub fn lt(&self, k: &Value) -> BoolLattice {
        BoolLattice::new(matches!(&self.v, Some(v) if v < k))
    }

    /// Morphism: shifts the value by a number.
    pub fn add(&self, i: &Value) -> Result<Self> {
        require_numeric("lmin#+", i)?;
        match &self.v {
            None => Ok(self.clone()),
            Some(v) => {
                let sum = v
                    .checked_add(i)
                    .ok_or_else(|| Error::type_error("lmin#+", "overflow or non-numeric value"))?;
                Ok(Self { v: Some(sum) })
            }
        }
    }
}

impl Lattice for MinLattice {
    fn bottom() -> Self {
        Self { v: None }
    }

    fn merge(&self, other: &Self) -> Result<Self> {
        Ok(match (&self.v, &other.v) {
            (None, _) => other.clone(),
            (_, None) => self.clone(),
            (Some(a), Some(b)) => {
                if b < a {
                    other.clone()
                } else {
                    self.clone()
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn max(v: i64) -> MaxLattice {
        MaxLattice::new(Value::Int64(v))
    }

    #[test]
    fn test_max_merge() {
        let m = max(5).merge(&max(10)).unwrap().merge(&max(3)).unwrap();
        assert_eq!(m.reveal(), Some(&Value::Int64(10)));
        assert_eq!(MaxLattice::bottom().merge(&max(1)).unwrap(), max(1));
    }

    #[test]
    fn test_max_morphs() {
        let m = max(10);
        assert!(m.gt(&Value::Int64(9)).reveal());
        assert!(!m.gt(&Value::Int64(10)).reveal());
        assert!(m.gt_eq(&Value::Int64(10)).reveal());
        assert_eq!(m.add(&Value::Int64(5)).unwrap(), max(15));
        assert_eq!(m.min_of(&Value::Int64(4)).unwrap(), max(4));
        assert_eq!(m.min_of(&Value::Int64(40)).unwrap(), max(10));
        assert!(m.add(&Value::from("x")).is_err());
        assert!(!MaxLattice::bottom().gt(&Value::Int64(0)).reveal());
    }

    #[test]
    fn test_min_merge_and_lt() {
        let m = MinLattice::new(Value::Int64(5))
            .merge(&MinLattice::new(Value::Int64(2)))
            .unwrap();
        assert_eq!(m.reveal(), Some(&Value::Int64(2)));
        assert!(m.lt(&Value::Int64(3)).reveal());
        assert!(!m.lt(&Value::Int64(2)).reveal());
    }

    #[test]
    fn test_merge_assign_reports_change() {
        let mut m = max(13);
        assert!(!m.merge_assign(&max(13)).unwrap());
        assert!(!m.merge_assign(&max(2)).unwrap());
        assert!(m.merge_assign(&max(14)).unwrap());
    }
}
