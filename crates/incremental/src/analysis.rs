//! Rescan/invalidation analysis.
//!
//! Run once after wiring. An element that *rescans* re-emits everything it
//! can see on the first iteration of a tick instead of only what is new; an
//! element that is *invalidated* drops its cached state first. The default
//! sets cover collections whose contents may shrink every tick (scratch-like
//! kinds, heads of deletion and non-monotone rules). For every other table
//! the extra elements needed when that table turns out to be invalidated at
//! run time (a deletion or a replaced key) are cached as a diff against the
//! defaults.

use crate::catalog::Catalog;
use crate::collection::{CollectionKind, RuleOp};
use crate::dataflow::{Dataflow, ElementId};
use crate::rule::RuleDescriptor;
use alloc::vec::Vec;
use hashbrown::{HashMap, HashSet};

/// Extra rescans and invalidations for one collection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InvalidationDiff {
    pub rescan: Vec<ElementId>,
    pub invalidate: Vec<ElementId>,
}

impl InvalidationDiff {
    pub fn is_empty(&self) -> bool {
        self.rescan.is_empty() && self.invalidate.is_empty()
    }
}

/// Result of the analysis.
#[derive(Clone, Debug, Default)]
pub struct Analysis {
    /// Collections invalidated on every tick.
    pub default_collections: HashSet<usize>,
    pub default_rescan: HashSet<ElementId>,
    pub default_invalidate: HashSet<ElementId>,
    /// Keyed by collection index.
    pub diffs: HashMap<usize, InvalidationDiff>,
}

impl Analysis {
    pub fn run(df: &Dataflow, catalog: &Catalog, rules: &[RuleDescriptor]) -> Self {
        let mut defaults: HashSet<usize> = HashSet::new();
        for (id, c) in catalog.iter().enumerate() {
            if c.kind().is_scratch_like() {
                defaults.insert(id);
            }
        }
        for rule in rules {
            if rule.non_monotone || rule.op == RuleOp::Delete {
                if let Ok(id) = catalog.lookup(&rule.lhs) {
                    defaults.insert(id);
                }
            }
        }

        let (rescan, invalidate) = closure(df, catalog, &defaults);

        let mut diffs = HashMap::new();
        for (id, c) in catalog.iter().enumerate() {
            let dynamic = matches!(c.kind(), CollectionKind::Table | CollectionKind::Persistent);
            if !dynamic || defaults.contains(&id) {
                continue;
            }
            let mut with = defaults.clone();
            with.insert(id);
            let (r, i) = closure(df, catalog, &with);
            let mut diff = InvalidationDiff {
                rescan: r.difference(&rescan).copied().collect(),
                invalidate: i.difference(&invalidate).copied().collect(),
            };
            diff.rescan.sort_unstable();
            diff.invalidate.sort_unstable();
            diffs.insert(id, diff);
        }

        tracing::debug!(
            elements = df.len(),
            strata = df.strata.len(),
            default_collections = defaults.len(),
            default_rescan = rescan.len(),
            default_invalidate = invalidate.len(),
            "invalidation analysis"
        );

        Self {
            default_collections: defaults,
            default_rescan: rescan,
            default_invalidate: invalidate,
            diffs,
        }
    }

    /// Diff to apply when `collection` reports an invalidation.
    pub fn diff(&self, collection: usize) -> Option<&InvalidationDiff> {
        self.diffs.get(&collection)
    }
}

/// Grows the rescan and invalidate sets implied by `invalidated` collections
/// until they stop changing.
fn closure(
    df: &Dataflow,
    catalog: &Catalog,
    invalidated: &HashSet<usize>,
) -> (HashSet<ElementId>, HashSet<ElementId>) {
    let mut rescan: HashSet<ElementId> = HashSet::new();
    let mut invalidate: HashSet<ElementId> = HashSet::new();

    for e in &df.elements {
        if let Some(c) = e.scanned() {
            if invalidated.contains(&c) {
                rescan.insert(e.id);
            }
        }
    }

    loop {
        let before = (rescan.len(), invalidate.len());
        for e in &df.elements {
            if e.is_scanner() {
                continue;
            }
            if e.inputs.iter().any(|i| rescan.contains(i)) {
                rescan.insert(e.id);
                if e.is_stateful() {
                    invalidate.insert(e.id);
                }
            }
            if invalidate.contains(&e.id) {
                rescan.insert(e.id);
            }
            if let Some((target, op)) = e.sink_target() {
                let scratch = catalog.by_id(target).kind().is_scratch_like();
                if op == RuleOp::Delete || (scratch && invalidated.contains(&target)) {
                    rescan.insert(e.id);
                }
            }
            // stateless elements pull a full re-emission from their inputs
            if rescan.contains(&e.id) && !e.is_stateful() {
                for i in &e.inputs {
                    rescan.insert(*i);
                }
            }
        }
        if (rescan.len(), invalidate.len()) == before {
            break;
        }
    }
    (rescan, invalidate)
}
