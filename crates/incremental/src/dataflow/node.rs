//! Dataflow element definitions.

use crate::collection::RuleOp;
use crate::operators::{ArgAggState, GroupState, JoinState, NotInState};
use crate::plan::{Item, MorphFn, PredicateFn, TupleFn, TuplesFn};
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use hashbrown::HashSet;
use tidal_core::Tuple;

/// Index of an element in the dataflow arena.
pub type ElementId = usize;

/// What an element does with the items pushed into it.
pub enum ElementKind {
    /// Reads a collection (index into the catalog).
    Scanner { collection: usize },
    /// Constant tuples.
    Values(Vec<Tuple>),
    Map(TupleFn),
    FlatMap(TuplesFn),
    Filter(PredicateFn),
    Join(JoinState),
    NotIn(NotInState),
    Group(GroupState),
    ArgAgg(ArgAggState),
    Morph { func: String, f: MorphFn },
    /// Writes into the rule's head collection.
    Sink { target: usize, op: RuleOp },
}

impl ElementKind {
    /// Elements that cache their input across iterations and ticks.
    pub fn is_stateful(&self) -> bool {
        matches!(
            self,
            ElementKind::Join(_) | ElementKind::NotIn(_) | ElementKind::Group(_) | ElementKind::ArgAgg(_)
        )
    }

    /// Elements that emit only once their input is complete.
    pub fn is_blocking(&self) -> bool {
        match self {
            ElementKind::NotIn(_) | ElementKind::Group(_) | ElementKind::ArgAgg(_) => true,
            ElementKind::Join(j) => j.is_outer(),
            _ => false,
        }
    }
}

/// A node of a stratum's push dataflow.
pub struct Element {
    pub id: ElementId,
    pub stratum: usize,
    pub label: String,
    pub kind: ElementKind,
    /// Rule the element was built for; scanners are shared and have none.
    pub rule: Option<usize>,
    /// Feeding element per input port.
    pub inputs: Vec<ElementId>,
    /// `(consumer, port)` pairs.
    pub outputs: Vec<(ElementId, usize)>,
    /// Re-emit everything on the first iteration of this tick.
    pub rescan: bool,
    /// Drop cached state before this tick's evaluation.
    pub invalidate: bool,
    /// Absorbed new input since the last blocking emission.
    pub dirty: bool,
    /// Tuples emitted by a blocking element during the current tick.
    pub emitted: HashSet<Tuple>,
    pub rescans: u64,
    pub invalidations: u64,
}

impl Element {
    pub fn new(id: ElementId, stratum: usize, label: String, kind: ElementKind, rule: Option<usize>) -> Self {
        Self {
            id,
            stratum,
            label,
            kind,
            rule,
            inputs: Vec::new(),
            outputs: Vec::new(),
            rescan: false,
            invalidate: false,
            dirty: false,
            emitted: HashSet::new(),
            rescans: 0,
            invalidations: 0,
        }
    }

    #[inline]
    pub fn is_scanner(&self) -> bool {
        matches!(self.kind, ElementKind::Scanner { .. })
    }

    #[inline]
    pub fn is_stateful(&self) -> bool {
        self.kind.is_stateful()
    }

    #[inline]
    pub fn is_blocking(&self) -> bool {
        self.kind.is_blocking()
    }

    /// Collection read by a scanner.
    pub fn scanned(&self) -> Option<usize> {
        match self.kind {
            ElementKind::Scanner { collection, .. } => Some(collection),
            _ => None,
        }
    }

    /// Collection written by a sink.
    pub fn sink_target(&self) -> Option<(usize, RuleOp)> {
        match self.kind {
            ElementKind::Sink { target, op } => Some((target, op)),
            _ => None,
        }
    }

    /// Number of cached tuples.
    pub fn cache_size(&self) -> usize {
        match &self.kind {
            ElementKind::Join(j) => j.cache_size(),
            ElementKind::NotIn(n) => n.cache_size(),
            ElementKind::Group(g) => g.len(),
            ElementKind::ArgAgg(a) => a.len(),
            _ => 0,
        }
    }

    /// Clears cached state. `ports[i]` says whether input port `i` is cleared.
    pub fn invalidate_cache(&mut self, ports: &[bool]) {
        match &mut self.kind {
            ElementKind::Join(j) => {
                for (port, clear) in ports.iter().enumerate() {
                    if *clear {
                        j.invalidate_port(port);
                    }
                }
            }
            ElementKind::NotIn(n) => {
                if ports.first().copied().unwrap_or(false) {
                    n.clear_input();
                }
                if ports.get(1).copied().unwrap_or(false) {
                    n.clear_other();
                }
            }
            ElementKind::Group(g) => g.clear(),
            ElementKind::ArgAgg(a) => a.clear(),
            _ => {}
        }
        self.invalidations += 1;
    }

    /// Clears the per-tick emission record.
    pub fn reset_tick(&mut self) {
        self.emitted.clear();
        self.dirty = false;
    }

    /// Introspection snapshot.
    pub fn stats(&self) -> ElementStats {
        ElementStats {
            id: self.id,
            stratum: self.stratum,
            label: self.label.clone(),
            rescans: self.rescans,
            invalidations: self.invalidations,
            cache_size: self.cache_size(),
            port_sizes: match &self.kind {
                ElementKind::Join(j) => (0..j.ports()).map(|p| j.port_len(p)).collect(),
                _ => vec![],
            },
        }
    }
}

/// Per-element counters reported by the evaluator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ElementStats {
    pub id: ElementId,
    pub stratum: usize,
    pub label: String,
    /// Ticks on which the element rescanned.
    pub rescans: u64,
    /// Ticks on which its cache was dropped.
    pub invalidations: u64,
    pub cache_size: usize,
    /// Cached tuples per join input.
    pub port_sizes: Vec<usize>,
}

/// Views an item as a tuple; lattice values become one-column tuples.
pub fn item_tuple(item: Item) -> Tuple {
    match item {
        Item::Tuple(t) => t,
        Item::Lattice(v) => Tuple::new(vec![v.to_value()]),
    }
}
