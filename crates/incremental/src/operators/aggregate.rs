//! Grouping and exemplary aggregates.
//!
//! Both operators absorb tuples as they arrive and produce their output only
//! when asked, which the evaluator does at the end of a stratum. Input is
//! treated as a set: a tuple seen twice contributes once.

use alloc::collections::BTreeSet;
use alloc::format;
use alloc::vec::Vec;
use hashbrown::{HashMap, HashSet};
use tidal_core::{Error, Result, Tuple, Value};

/// Aggregate functions available to `group`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AggFunc {
    Min,
    Max,
    Sum,
    Count,
    Avg,
    /// One value per group; the smallest, so the choice is stable.
    Choose,
    /// All distinct values, as a sorted list.
    Accum,
}

impl AggFunc {
    pub fn name(&self) -> &'static str {
        match self {
            AggFunc::Min => "min",
            AggFunc::Max => "max",
            AggFunc::Sum => "sum",
            AggFunc::Count => "count",
            AggFunc::Avg => "avg",
            AggFunc::Choose => "choose",
            AggFunc::Accum => "accum",
        }
    }
}

/// An aggregate over one input column (`Count` needs none).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AggSpec {
    pub func: AggFunc,
    pub column: Option<usize>,
}

impl AggSpec {
    pub fn min(column: usize) -> Self {
        Self { func: AggFunc::Min, column: Some(column) }
    }

    pub fn max(column: usize) -> Self {
        Self { func: AggFunc::Max, column: Some(column) }
    }

    pub fn sum(column: usize) -> Self {
        Self { func: AggFunc::Sum, column: Some(column) }
    }

    pub fn count() -> Self {
        Self { func: AggFunc::Count, column: None }
    }

    pub fn avg(column: usize) -> Self {
        Self { func: AggFunc::Avg, column: Some(column) }
    }

    pub fn choose(column: usize) -> Self {
        Self { func: AggFunc::Choose, column: Some(column) }
    }

    pub fn accum(column: usize) -> Self {
        Self { func: AggFunc::Accum, column: Some(column) }
    }

    /// Output column name for the aggregate at position `i`.
    pub fn column_name(&self, i: usize) -> alloc::string::String {
        format!("{}_{}", self.func.name(), i)
    }
}

/// Running state of one aggregate within one group.
#[derive(Clone, Debug, PartialEq)]
enum AggState {
    Min(Option<Value>),
    Max(Option<Value>),
    Sum(Option<Value>),
    Count(u64),
    Avg { sum: f64, n: u64 },
    Choose(Option<Value>),
    Accum(BTreeSet<Value>),
}

impl AggState {
    fn init(func: AggFunc) -> Self {
        match func {
            AggFunc::Min => AggState::Min(None),
            AggFunc::Max => AggState::Max(None),
            AggFunc::Sum => AggState::Sum(None),
            AggFunc::Count => AggState::Count(0),
            AggFunc::Avg => AggState::Avg { sum: 0.0, n: 0 },
            AggFunc::Choose => AggState::Choose(None),
            AggFunc::Accum => AggState::Accum(BTreeSet::new()),
        }
    }

    fn trans(&mut self, v: &Value) -> Result<()> {
        match self {
            AggState::Count(n) => *n += 1,
            _ if v.is_null() => {}
            AggState::Min(cur) | AggState::Choose(cur) => {
                if cur.as_ref().map_or(true, |c| v < c) {
                    *cur = Some(v.clone());
                }
            }
            AggState::Max(cur) => {
                if cur.as_ref().map_or(true, |c| v > c) {
                    *cur = Some(v.clone());
                }
            }
            AggState::Sum(cur) => {
                let next = match cur {
                    None if v.is_numeric() => Some(v.clone()),
                    None => None,
                    Some(c) => c.checked_add(v),
                };
                match next {
                    Some(n) => *cur = Some(n),
                    None => {
                        return Err(Error::type_error(
                            "sum",
                            format!("cannot add {} value", v.type_name()),
                        ))
                    }
                }
            }
            AggState::Avg { sum, n } => match v.as_f64() {
                Some(f) => {
                    *sum += f;
                    *n += 1;
                }
                None => {
                    return Err(Error::type_error(
                        "avg",
                        format!("cannot average {} value", v.type_name()),
                    ))
                }
            },
            AggState::Accum(set) => {
                set.insert(v.clone());
            }
        }
        Ok(())
    }

    fn finalize(&self) -> Value {
        match self {
            AggState::Min(v) | AggState::Max(v) | AggState::Sum(v) | AggState::Choose(v) => {
                v.clone().unwrap_or(Value::Null)
            }
            AggState::Count(n) => Value::from(*n),
            AggState::Avg { n: 0, .. } => Value::Null,
            AggState::Avg { sum, n } => Value::Float64(*sum / *n as f64),
            AggState::Accum(set) => Value::List(set.iter().cloned().collect()),
        }
    }
}

/// Grouped aggregation state.
#[derive(Clone, Debug)]
pub struct GroupState {
    keys: Vec<usize>,
    aggs: Vec<AggSpec>,
    seen: HashSet<Tuple>,
    groups: HashMap<Vec<Value>, Vec<AggState>>,
}

impl GroupState {
    pub fn new(keys: Vec<usize>, aggs: Vec<AggSpec>) -> Self {
        Self {
            keys,
            aggs,
            seen: HashSet::new(),
            groups: HashMap::new(),
        }
    }

    /// Absorbs a tuple. Returns false if it was already seen.
    pub fn insert(&mut self, t: &Tuple) -> Result<bool> {
        if self.seen.contains(t) {
            return Ok(false);
        }
        let key = t.project(&self.keys);
        let aggs = &self.aggs;
        let states = self
            .groups
            .entry(key)
            .or_insert_with(|| aggs.iter().map(|a| AggState::init(a.func)).collect());
        for (state, spec) in states.iter_mut().zip(aggs.iter()) {
            let v = match spec.column {
                Some(c) => t.get(c).cloned().unwrap_or(Value::Null),
                None => Value::Null,
            };
            state.trans(&v)?;
        }
        self.seen.insert(t.clone());
        Ok(true)
    }

    /// One tuple per group: key columns followed by the aggregate values.
    pub fn results(&self) -> Vec<Tuple> {
        let mut out: Vec<Tuple> = self
            .groups
            .iter()
            .map(|(key, states)| {
                let mut values = key.clone();
                values.extend(states.iter().map(|s| s.finalize()));
                Tuple::new(values)
            })
            .collect();
        out.sort();
        out
    }

    /// Number of distinct input tuples absorbed.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn clear(&mut self) {
        self.seen.clear();
        self.groups.clear();
    }
}

/// Direction of an exemplary aggregate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArgKind {
    Min,
    Max,
}

impl ArgKind {
    pub fn name(&self) -> &'static str {
        match self {
            ArgKind::Min => "min",
            ArgKind::Max => "max",
        }
    }

    fn better(&self, candidate: &Value, best: &Value) -> bool {
        match self {
            ArgKind::Min => candidate < best,
            ArgKind::Max => candidate > best,
        }
    }
}

/// Keeps, per group, every tuple tied on the extreme value of a column.
#[derive(Clone, Debug)]
pub struct ArgAggState {
    kind: ArgKind,
    keys: Vec<usize>,
    column: usize,
    seen: HashSet<Tuple>,
    best: HashMap<Vec<Value>, (Value, Vec<Tuple>)>,
}

impl ArgAggState {
    pub fn new(kind: ArgKind, keys: Vec<usize>, column: usize) -> Self {
        Self {
            kind,
            keys,
            column,
            seen: HashSet::new(),
            best: HashMap::new(),
        }
    }

    /// Absorbs a tuple. Returns false if it was already seen.
    pub fn insert(&mut self, t: &Tuple) -> bool {
        if !self.seen.insert(t.clone()) {
            return false;
        }
        let key = t.project(&self.keys);
        let v = t.get(self.column).cloned().unwrap_or(Value::Null);
        match self.best.get_mut(&key) {
            None => {
                self.best.insert(key, (v, alloc::vec![t.clone()]));
            }
            Some((best, tups)) => {
                if self.kind.better(&v, best) {
                    *best = v;
                    tups.clear();
                    tups.push(t.clone());
                } else if v == *best {
                    tups.push(t.clone());
                }
            }
        }
        true
    }

    /// The exemplary tuples of every group.
    pub fn results(&self) -> Vec<Tuple> {
        let mut out: Vec<Tuple> = self
            .best
            .values()
            .flat_map(|(_, tups)| tups.iter().cloned())
            .collect();
        out.sort();
        out
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn clear(&mut self) {
        self.seen.clear();
        self.best.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use tidal_core::tuple;

    #[test]
    fn test_group_aggregates() {
        let mut g = GroupState::new(
            vec![0],
            vec![
                AggSpec::min(1),
                AggSpec::max(1),
                AggSpec::sum(1),
                AggSpec::count(),
                AggSpec::avg(1),
                AggSpec::accum(1),
            ],
        );
        for t in [tuple!["a", 3], tuple!["a", 1], tuple!["b", 5], tuple!["a", 1]] {
            g.insert(&t).unwrap();
        }
        let rows = g.results();
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0],
            tuple![
                "a",
                1,
                3,
                4,
                2u64,
                2.0,
                Value::List(vec![Value::Int64(1), Value::Int64(3)])
            ]
        );
        assert_eq!(g.len(), 3);
    }

    #[test]
    fn test_group_without_keys() {
        let mut g = GroupState::new(vec![], vec![AggSpec::count()]);
        g.insert(&tuple![1]).unwrap();
        g.insert(&tuple![2]).unwrap();
        assert_eq!(g.results(), vec![tuple![2u64]]);
        g.clear();
        assert!(g.results().is_empty());
    }

    #[test]
    fn test_sum_rejects_strings() {
        let mut g = GroupState::new(vec![], vec![AggSpec::sum(0)]);
        g.insert(&tuple![1]).unwrap();
        assert!(g.insert(&tuple!["x"]).is_err());
    }

    #[test]
    fn test_choose_is_stable() {
        let mut a = GroupState::new(vec![0], vec![AggSpec::choose(1)]);
        let mut b = GroupState::new(vec![0], vec![AggSpec::choose(1)]);
        for t in [tuple!["k", 9], tuple!["k", 4]] {
            a.insert(&t).unwrap();
        }
        for t in [tuple!["k", 4], tuple!["k", 9]] {
            b.insert(&t).unwrap();
        }
        assert_eq!(a.results(), b.results());
    }

    #[test]
    fn test_argmin_keeps_ties() {
        let mut s = ArgAggState::new(ArgKind::Min, vec![0, 1], 3);
        s.insert(&tuple!["a", "b", "b", 4]);
        s.insert(&tuple!["a", "b", "b", 1]);
        s.insert(&tuple!["a", "b", "x", 1]);
        s.insert(&tuple!["a", "c", "b", 2]);
        assert!(!s.insert(&tuple!["a", "c", "b", 2]));
        assert_eq!(
            s.results(),
            vec![
                tuple!["a", "b", "b", 1],
                tuple!["a", "b", "x", 1],
                tuple!["a", "c", "b", 2]
            ]
        );
    }

    #[test]
    fn test_argmax() {
        let mut s = ArgAggState::new(ArgKind::Max, vec![0], 1);
        s.insert(&tuple!["a", 1]);
        s.insert(&tuple!["a", 7]);
        assert_eq!(s.results(), vec![tuple!["a", 7]]);
    }
}
