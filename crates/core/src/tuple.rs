//! Tuple structure for tidal collections.
//!
//! A `Tuple` is a fixed-length ordered sequence of values. Tuples are
//! compared by value: two tuples with the same columns are the same fact.

use crate::value::Value;
use alloc::vec::Vec;
use core::fmt;
use core::ops::Index;

/// A tuple of values, indexed by column position.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Tuple {
    values: Vec<Value>,
}

impl Tuple {
    /// Creates a new tuple with the given values.
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Creates a tuple of `arity` nulls.
    pub fn nulls(arity: usize) -> Self {
        Self {
            values: (0..arity).map(|_| Value::Null).collect(),
        }
    }

    /// Returns a reference to the values.
    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Consumes the tuple and returns its values.
    #[inline]
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Gets a value by column index.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Sets a value at the given column index. Returns false if out of range.
    pub fn set(&mut self, index: usize, value: Value) -> bool {
        match self.values.get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Returns the number of columns.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the tuple has no columns.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Copies out the values at the given column positions. Missing columns read as null.
    pub fn project(&self, columns: &[usize]) -> Vec<Value> {
        columns
            .iter()
            .map(|&c| self.values.get(c).cloned().unwrap_or(Value::Null))
            .collect()
    }

    /// Concatenates two tuples (used for join results).
    pub fn concat(&self, other: &Tuple) -> Tuple {
        let mut values = Vec::with_capacity(self.len() + other.len());
        values.extend_from_slice(&self.values);
        values.extend_from_slice(&other.values);
        Tuple { values }
    }

    /// Returns a copy of the tuple without the column at `index`.
    pub fn without(&self, index: usize) -> Tuple {
        Tuple {
            values: self
                .values
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != index)
                .map(|(_, v)| v.clone())
                .collect(),
        }
    }

    /// Returns a copy of the columns in `start..end`.
    pub fn slice(&self, start: usize, end: usize) -> Tuple {
        let end = end.min(self.values.len());
        let start = start.min(end);
        Tuple {
            values: self.values[start..end].to_vec(),
        }
    }

    /// Fits the tuple to `arity` columns: short tuples are padded with nulls,
    /// long tuples keep `arity - 1` columns and pack the rest into a trailing list.
    pub fn fit_arity(mut self, arity: usize) -> Tuple {
        if self.values.len() < arity {
            self.values.resize(arity, Value::Null);
        } else if self.values.len() > arity && arity > 0 {
            let extras = self.values.split_off(arity - 1);
            self.values.push(Value::List(extras));
        }
        self
    }

    /// Returns an iterator over the values.
    pub fn iter(&self) -> core::slice::Iter<'_, Value> {
        self.values.iter()
    }
}

impl Index<usize> for Tuple {
    type Output = Value;

    fn index(&self, index: usize) -> &Value {
        &self.values[index]
    }
}

impl From<Vec<Value>> for Tuple {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Tuple {
    fn from(values: [T; N]) -> Self {
        Self::new(values.into_iter().map(Into::into).collect())
    }
}

impl FromIterator<Value> for Tuple {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Tuple {
    type Item = &'a Value;
    type IntoIter = core::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, v) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, ")")
    }
}

/// Builds a tuple from heterogeneous values: `tuple![1, "a", 2.5]`.
#[macro_export]
macro_rules! tuple {
    ($($v:expr),* $(,)?) => {
        $crate::Tuple::from_iter([$($crate::Value::from($v)),*])
    };
}
