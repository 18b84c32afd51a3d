//! Rule bodies as a small operator algebra.
//!
//! A [`Plan`] is a tree of operators over named collections. Wiring turns each
//! node into a dataflow element; closures run once per tuple and receive the
//! tick's [`EvalContext`].

use crate::operators::{AggSpec, ArgKind};
use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use tidal_core::{Result, Tuple};
use tidal_lattice::LatticeValue;

/// Per-tick values visible to rule closures.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EvalContext {
    /// Logical clock: number of completed ticks.
    pub budtime: u64,
    /// Wall-clock time captured at the start of the tick.
    pub clock_ms: u64,
}

/// A unit of data flowing between elements.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Item {
    Tuple(Tuple),
    Lattice(LatticeValue),
}

impl From<Tuple> for Item {
    fn from(t: Tuple) -> Self {
        Item::Tuple(t)
    }
}

impl From<LatticeValue> for Item {
    fn from(v: LatticeValue) -> Self {
        Item::Lattice(v)
    }
}

pub type TupleFn = Arc<dyn Fn(&Tuple, &EvalContext) -> Result<Tuple> + Send + Sync>;
pub type TuplesFn = Arc<dyn Fn(&Tuple, &EvalContext) -> Result<Vec<Tuple>> + Send + Sync>;
pub type PredicateFn = Arc<dyn Fn(&Tuple, &EvalContext) -> Result<bool> + Send + Sync>;
pub type MorphFn = Arc<dyn Fn(&LatticeValue, &EvalContext) -> Result<Vec<Item>> + Send + Sync>;

/// A column of one join input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ColumnRef {
    /// Column `column` of the `occurrence`-th scan of `collection` among the inputs.
    Named {
        collection: String,
        occurrence: usize,
        column: String,
    },
    /// Column index `column` of input number `input`.
    Positional { input: usize, column: usize },
}

impl ColumnRef {
    /// Column of the first input scanning `collection`.
    pub fn new(collection: impl Into<String>, column: impl Into<String>) -> Self {
        ColumnRef::Named {
            collection: collection.into(),
            occurrence: 0,
            column: column.into(),
        }
    }

    /// Column of the `occurrence`-th input scanning `collection` (self-joins).
    pub fn nth(collection: impl Into<String>, occurrence: usize, column: impl Into<String>) -> Self {
        ColumnRef::Named {
            collection: collection.into(),
            occurrence,
            column: column.into(),
        }
    }

    /// Column by position.
    pub fn at(input: usize, column: usize) -> Self {
        ColumnRef::Positional { input, column }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnRef::Named {
                collection,
                occurrence: 0,
                column,
            } => write!(f, "{}.{}", collection, column),
            ColumnRef::Named {
                collection,
                occurrence,
                column,
            } => write!(f, "{}#{}.{}", collection, occurrence, column),
            ColumnRef::Positional { input, column } => write!(f, "${}.{}", input, column),
        }
    }
}

/// An operator tree.
#[derive(Clone)]
pub enum Plan {
    Scan(String),
    Values(Vec<Tuple>),
    Map {
        input: Box<Plan>,
        f: TupleFn,
    },
    FlatMap {
        input: Box<Plan>,
        f: TuplesFn,
    },
    Filter {
        input: Box<Plan>,
        f: PredicateFn,
    },
    Join {
        inputs: Vec<Plan>,
        preds: Vec<(ColumnRef, ColumnRef)>,
        outer: bool,
    },
    NotIn {
        input: Box<Plan>,
        other: Box<Plan>,
        /// `(input column, other column)` pairs; empty means whole-tuple equality.
        preds: Vec<(usize, usize)>,
    },
    Group {
        input: Box<Plan>,
        keys: Vec<usize>,
        aggs: Vec<AggSpec>,
    },
    ArgAgg {
        input: Box<Plan>,
        kind: ArgKind,
        keys: Vec<usize>,
        column: usize,
    },
    Morph {
        input: Box<Plan>,
        func: String,
        f: MorphFn,
    },
}

impl Plan {
    /// Reads a collection.
    pub fn scan(name: impl Into<String>) -> Plan {
        Plan::Scan(name.into())
    }

    /// A constant set of tuples.
    pub fn values(tuples: impl IntoIterator<Item = Tuple>) -> Plan {
        Plan::Values(tuples.into_iter().collect())
    }

    /// Equi-join of two or more inputs.
    pub fn join(inputs: Vec<Plan>, preds: Vec<(ColumnRef, ColumnRef)>) -> Plan {
        Plan::Join {
            inputs,
            preds,
            outer: false,
        }
    }

    /// Left outer join: left tuples without a match are padded with nulls.
    pub fn outer_join(left: Plan, right: Plan, preds: Vec<(ColumnRef, ColumnRef)>) -> Plan {
        Plan::Join {
            inputs: alloc::vec![left, right],
            preds,
            outer: true,
        }
    }

    pub fn map<F>(self, f: F) -> Plan
    where
        F: Fn(&Tuple, &EvalContext) -> Result<Tuple> + Send + Sync + 'static,
    {
        Plan::Map {
            input: Box::new(self),
            f: Arc::new(f),
        }
    }

    pub fn flat_map<F>(self, f: F) -> Plan
    where
        F: Fn(&Tuple, &EvalContext) -> Result<Vec<Tuple>> + Send + Sync + 'static,
    {
        Plan::FlatMap {
            input: Box::new(self),
            f: Arc::new(f),
        }
    }

    pub fn filter<F>(self, f: F) -> Plan
    where
        F: Fn(&Tuple, &EvalContext) -> Result<bool> + Send + Sync + 'static,
    {
        Plan::Filter {
            input: Box::new(self),
            f: Arc::new(f),
        }
    }

    /// Tuples of `self` with no match in `other`.
    pub fn not_in(self, other: Plan, preds: Vec<(usize, usize)>) -> Plan {
        Plan::NotIn {
            input: Box::new(self),
            other: Box::new(other),
            preds,
        }
    }

    /// Groups by `keys`; output is the key columns followed by one column per aggregate.
    pub fn group(self, keys: Vec<usize>, aggs: Vec<AggSpec>) -> Plan {
        Plan::Group {
            input: Box::new(self),
            keys,
            aggs,
        }
    }

    /// Per group, every tuple whose `column` is minimal.
    pub fn argmin(self, keys: Vec<usize>, column: usize) -> Plan {
        Plan::ArgAgg {
            input: Box::new(self),
            kind: ArgKind::Min,
            keys,
            column,
        }
    }

    /// Per group, every tuple whose `column` is maximal.
    pub fn argmax(self, keys: Vec<usize>, column: usize) -> Plan {
        Plan::ArgAgg {
            input: Box::new(self),
            kind: ArgKind::Max,
            keys,
            column,
        }
    }

    /// Applies a named lattice function. The name decides whether the rule
    /// needs the non-monotone flag.
    pub fn morph<F>(self, func: impl Into<String>, f: F) -> Plan
    where
        F: Fn(&LatticeValue, &EvalContext) -> Result<Vec<Item>> + Send + Sync + 'static,
    {
        Plan::Morph {
            input: Box::new(self),
            func: func.into(),
            f: Arc::new(f),
        }
    }

    /// Collections read by this plan, in first-use order.
    pub fn source_refs(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_sources(&mut out);
        out
    }

    fn collect_sources(&self, out: &mut Vec<String>) {
        match self {
            Plan::Scan(name) => {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
            Plan::Values(_) => {}
            Plan::Map { input, .. }
            | Plan::FlatMap { input, .. }
            | Plan::Filter { input, .. }
            | Plan::Group { input, .. }
            | Plan::ArgAgg { input, .. }
            | Plan::Morph { input, .. } => input.collect_sources(out),
            Plan::Join { inputs, .. } => {
                for i in inputs {
                    i.collect_sources(out);
                }
            }
            Plan::NotIn { input, other, .. } => {
                input.collect_sources(out);
                other.collect_sources(out);
            }
        }
    }

    /// True if the plan contains an operator that needs complete input.
    pub fn has_blocking(&self) -> bool {
        match self {
            Plan::Scan(_) | Plan::Values(_) => false,
            Plan::NotIn { .. } | Plan::Group { .. } | Plan::ArgAgg { .. } => true,
            Plan::Join { inputs, outer, .. } => *outer || inputs.iter().any(|p| p.has_blocking()),
            Plan::Map { input, .. }
            | Plan::FlatMap { input, .. }
            | Plan::Filter { input, .. }
            | Plan::Morph { input, .. } => input.has_blocking(),
        }
    }

    /// Short operator label.
    pub fn label(&self) -> String {
        use alloc::format;
        match self {
            Plan::Scan(name) => format!("scan({})", name),
            Plan::Values(t) => format!("values[{}]", t.len()),
            Plan::Map { .. } => String::from("map"),
            Plan::FlatMap { .. } => String::from("flat_map"),
            Plan::Filter { .. } => String::from("filter"),
            Plan::Join { inputs, outer, .. } => {
                format!("{}join/{}", if *outer { "outer_" } else { "" }, inputs.len())
            }
            Plan::NotIn { .. } => String::from("not_in"),
            Plan::Group { keys, aggs, .. } => format!("group({:?}; {})", keys, aggs.len()),
            Plan::ArgAgg { kind, keys, column, .. } => {
                format!("arg{}({:?}, {})", kind.name(), keys, column)
            }
            Plan::Morph { func, .. } => format!("morph({})", func),
        }
    }
}

impl fmt::Debug for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Plan::Scan(_) | Plan::Values(_) => f.write_str(&self.label()),
            Plan::Map { input, .. }
            | Plan::FlatMap { input, .. }
            | Plan::Filter { input, .. }
            | Plan::Group { input, .. }
            | Plan::ArgAgg { input, .. }
            | Plan::Morph { input, .. } => write!(f, "{}({:?})", self.label(), input),
            Plan::Join { inputs, .. } => write!(f, "{}{:?}", self.label(), inputs),
            Plan::NotIn { input, other, .. } => write!(f, "not_in({:?}, {:?})", input, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::AggSpec;
    use alloc::vec;
    use tidal_core::tuple;

    #[test]
    fn test_source_refs_dedup() {
        let p = Plan::join(
            vec![Plan::scan("link"), Plan::scan("path"), Plan::scan("link")],
            vec![],
        )
        .not_in(Plan::scan("blocked"), vec![(0, 0)]);
        assert_eq!(p.source_refs(), vec!["link", "path", "blocked"]);
    }

    #[test]
    fn test_has_blocking() {
        let p = Plan::scan("a").map(|t, _| Ok(t.clone()));
        assert!(!p.has_blocking());
        assert!(p.clone().group(vec![0], vec![AggSpec::count()]).has_blocking());
        assert!(Plan::outer_join(Plan::scan("a"), Plan::scan("b"), vec![]).has_blocking());
        assert!(!Plan::values([tuple![1]]).has_blocking());
    }

    #[test]
    fn test_column_ref_display() {
        assert_eq!(alloc::format!("{}", ColumnRef::new("link", "to")), "link.to");
        assert_eq!(alloc::format!("{}", ColumnRef::nth("link", 1, "to")), "link#1.to");
        assert_eq!(alloc::format!("{}", ColumnRef::at(2, 0)), "$2.0");
    }
}
