//! The tick evaluator.
//!
//! One call to [`Evaluator::tick`] runs a full timestep: collections advance,
//! inbound tuples land, every stratum is driven to its fixpoint with
//! semi-naive iterations, and the tick's outputs are flushed.
//!
//! Within a stratum the first iteration pushes what is new this tick (or
//! everything, for elements that rescan); later iterations push only the
//! delta derived by the previous iteration. Blocking elements hold their
//! output until the stratum's input is complete.

use crate::analysis::Analysis;
use crate::catalog::{Catalog, HALT};
use crate::collection::{Collection, CollectionKind, LatticeCell, Outbound, Relation, RuleOp};
use crate::dataflow::{item_tuple, Dataflow, Element, ElementKind, ElementStats};
use crate::delta::{ChangeSet, Delta};
use crate::plan::{EvalContext, Item};
use crate::rule::{Program, RuleDescriptor};
use alloc::format;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use tidal_core::{Error, Result, Tuple};
use tidal_lattice::LatticeValue;

/// Evaluator options.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EvalConfig {
    /// Rescan and invalidate every element on every tick.
    pub safe_mode: bool,
}

impl EvalConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn safe_mode(mut self, on: bool) -> Self {
        self.safe_mode = on;
        self
    }
}

/// Where the evaluator is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvalPhase {
    NotBootstrapped,
    Bootstrapping,
    Wiring,
    Iterating { stratum: usize },
    Flushing,
    /// Between ticks.
    Done,
}

/// Input of one tick.
#[derive(Clone, Debug, Default)]
pub struct TickInput {
    /// Tuples delivered by the network or the host, by collection name.
    pub inbound: Vec<(String, Tuple)>,
    /// Wall-clock time, in milliseconds, to expose to rules.
    pub now_ms: u64,
}

impl TickInput {
    pub fn new(now_ms: u64) -> Self {
        Self {
            inbound: Vec::new(),
            now_ms,
        }
    }

    /// Adds an inbound tuple.
    pub fn deliver(mut self, collection: impl Into<String>, t: Tuple) -> Self {
        self.inbound.push((collection.into(), t));
        self
    }
}

/// Output of one tick.
#[derive(Clone, Debug, Default)]
pub struct TickOutput {
    /// Logical time of the tick that produced this output.
    pub budtime: u64,
    /// Messages buffered on channels.
    pub outbound: Vec<Outbound>,
    /// Collections that gained tuples during the tick.
    pub changed: Vec<String>,
    /// Net changes to persistent collections.
    pub changes: ChangeSet,
    /// True if the `halt` collection is non-empty.
    pub halted: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Pass {
    Iterate { first: bool },
    StratumEnd,
}

/// Runs a wired program tick by tick.
pub struct Evaluator {
    catalog: Catalog,
    rules: Vec<RuleDescriptor>,
    bootstrap: Vec<(String, Vec<Tuple>)>,
    df: Dataflow,
    analysis: Option<Analysis>,
    inbox: Vec<Vec<(usize, Item)>>,
    config: EvalConfig,
    budtime: u64,
    clock: Option<u64>,
    phase: EvalPhase,
    halted: bool,
    /// The last tick failed; the next one rescans and rebuilds every cache.
    recover: bool,
}

impl Evaluator {
    /// Validates and wires `program`. Nothing runs until the first tick.
    pub fn new(program: Program, config: EvalConfig) -> Result<Self> {
        let Program {
            catalog,
            rules,
            bootstrap,
        } = program;
        let df = Dataflow::wire(&catalog, &rules)?;
        tracing::debug!(
            collections = catalog.len(),
            rules = rules.len(),
            elements = df.len(),
            strata = df.strata.len(),
            "program wired"
        );
        let inbox = (0..df.len()).map(|_| Vec::new()).collect();
        Ok(Self {
            catalog,
            rules,
            bootstrap,
            df,
            analysis: None,
            inbox,
            config,
            budtime: 0,
            clock: None,
            phase: EvalPhase::NotBootstrapped,
            halted: false,
            recover: false,
        })
    }

    /// Number of completed ticks.
    #[inline]
    pub fn budtime(&self) -> u64 {
        self.budtime
    }

    /// The current tick's wall-clock time; only readable during a tick.
    pub fn clock(&self) -> Result<u64> {
        self.clock
            .ok_or_else(|| Error::usage("clock is only readable during a tick"))
    }

    #[inline]
    pub fn phase(&self) -> EvalPhase {
        self.phase
    }

    #[inline]
    pub fn config(&self) -> EvalConfig {
        self.config
    }

    #[inline]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    #[inline]
    pub fn rules(&self) -> &[RuleDescriptor] {
        &self.rules
    }

    /// True once any tick left a tuple in `halt`.
    #[inline]
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn collection(&self, name: &str) -> Result<&Collection> {
        self.catalog
            .get(name)
            .ok_or_else(|| Error::collection_not_found(name))
    }

    pub fn relation(&self, name: &str) -> Result<&Relation> {
        self.collection(name)?
            .as_relation()
            .ok_or_else(|| Error::type_error(name, "not a relational collection"))
    }

    pub fn lattice(&self, name: &str) -> Result<&LatticeCell> {
        self.collection(name)?
            .as_lattice()
            .ok_or_else(|| Error::type_error(name, "not a lattice collection"))
    }

    /// Committed contents in sorted order. A lattice reads as one
    /// single-column tuple holding its revealed value.
    pub fn contents(&self, name: &str) -> Result<Vec<Tuple>> {
        match self.collection(name)? {
            Collection::Relation(r) => Ok(r.sorted()),
            Collection::Lattice(l) => Ok(vec![Tuple::new(vec![l.current().to_value()])]),
        }
    }

    /// Queues `t` for `name`; it becomes visible on the next tick.
    pub fn insert(&mut self, name: &str, t: Tuple) -> Result<bool> {
        match self.collection_mut(name)? {
            Collection::Relation(r) => r.merge_next_tick(t),
            Collection::Lattice(l) => {
                let v = l.coerce(&t)?;
                l.merge_next_tick(&v)
            }
        }
    }

    /// Marks `t` for removal at the next tick boundary.
    pub fn delete(&mut self, name: &str, t: Tuple) -> Result<()> {
        match self.collection_mut(name)? {
            Collection::Relation(r) if r.kind().accepts(RuleOp::Delete) => {
                r.mark_delete(t);
                Ok(())
            }
            c => Err(Error::illegal_operator(c.name(), RuleOp::Delete.symbol())),
        }
    }

    /// Adds facts loaded before the first tick's evaluation.
    pub fn preload(&mut self, name: &str, tuples: impl IntoIterator<Item = Tuple>) -> Result<()> {
        if self.analysis.is_some() {
            return Err(Error::usage(format!(
                "preload into {} after the first tick",
                name
            )));
        }
        self.catalog.lookup(name)?;
        self.bootstrap
            .push((String::from(name), tuples.into_iter().collect()));
        Ok(())
    }

    /// Per-element counters, in element order.
    pub fn element_stats(&self) -> Vec<ElementStats> {
        self.df.elements.iter().map(Element::stats).collect()
    }

    fn collection_mut(&mut self, name: &str) -> Result<&mut Collection> {
        self.catalog
            .get_mut(name)
            .ok_or_else(|| Error::collection_not_found(name))
    }

    /// Runs one timestep.
    ///
    /// On error the tick is rolled back: `budtime` does not advance, the
    /// tick's inbound and derived tuples are discarded and its outbound
    /// messages are never sent. Host inserts and deletes applied at its
    /// boundary stay applied. The next tick rescans every source.
    #[tracing::instrument(level = "debug", skip_all, fields(budtime = self.budtime))]
    pub fn tick(&mut self, input: TickInput) -> Result<TickOutput> {
        self.clock = Some(input.now_ms);
        let result = self.run_tick(input);
        self.clock = None;
        self.phase = EvalPhase::Done;
        match result {
            Ok(out) => {
                self.bootstrap.clear();
                self.budtime += 1;
                Ok(out)
            }
            Err(e) => {
                tracing::warn!(budtime = self.budtime, error = %e, "tick aborted");
                self.abort();
                Err(e)
            }
        }
    }

    fn abort(&mut self) {
        for c in self.catalog.iter_mut() {
            c.abort();
        }
        for items in &mut self.inbox {
            items.clear();
        }
        for e in &mut self.df.elements {
            e.reset_tick();
        }
        if self.budtime == 0 {
            // Bootstrap facts were rolled back with the rest.
            self.analysis = None;
        }
        self.recover = true;
    }

    fn run_tick(&mut self, input: TickInput) -> Result<TickOutput> {
        for c in self.catalog.iter_mut() {
            c.tick()?;
        }

        let first = self.analysis.is_none();
        if first {
            self.phase = EvalPhase::Bootstrapping;
            self.load_bootstrap()?;
            self.phase = EvalPhase::Wiring;
            self.analysis = Some(Analysis::run(&self.df, &self.catalog, &self.rules));
        }

        let full = first || core::mem::take(&mut self.recover);
        self.apply_flags(full);
        self.invalidate_caches(full);
        self.receive(input.inbound)?;

        for stratum in 0..self.df.strata.len() {
            self.phase = EvalPhase::Iterating { stratum };
            self.run_stratum(stratum)?;
        }

        self.phase = EvalPhase::Flushing;
        Ok(self.flush())
    }

    fn load_bootstrap(&mut self) -> Result<()> {
        let facts = self.bootstrap.clone();
        for (name, tuples) in facts {
            let c = self.collection_mut(&name)?;
            for t in tuples {
                store(c, t)?;
            }
        }
        Ok(())
    }

    /// Sets this tick's rescan and invalidate flags.
    fn apply_flags(&mut self, full: bool) {
        let all = full || self.config.safe_mode;
        for e in &mut self.df.elements {
            e.reset_tick();
            e.rescan = all;
            e.invalidate = all;
        }
        if all {
            return;
        }
        let analysis = match &self.analysis {
            Some(a) => a,
            None => return,
        };
        for &id in &analysis.default_rescan {
            self.df.elements[id].rescan = true;
        }
        for &id in &analysis.default_invalidate {
            self.df.elements[id].invalidate = true;
        }
        for (cid, c) in self.catalog.iter().enumerate() {
            if !c.is_invalidated() {
                continue;
            }
            if let Some(diff) = analysis.diff(cid) {
                tracing::debug!(
                    collection = c.name(),
                    rescan = diff.rescan.len(),
                    invalidate = diff.invalidate.len(),
                    "collection invalidated"
                );
                for &id in &diff.rescan {
                    self.df.elements[id].rescan = true;
                }
                for &id in &diff.invalidate {
                    self.df.elements[id].invalidate = true;
                }
            }
        }
    }

    /// Drops cached state of invalidated elements and counts rescans.
    fn invalidate_caches(&mut self, full: bool) {
        let all = full || self.config.safe_mode;
        for id in 0..self.df.elements.len() {
            let e = &mut self.df.elements[id];
            if e.rescan {
                e.rescans += 1;
            }
            if !e.invalidate || !e.is_stateful() {
                continue;
            }
            let ports: Vec<bool> = self.df.elements[id]
                .inputs
                .iter()
                .map(|&i| all || self.df.elements[i].rescan)
                .collect();
            self.df.elements[id].invalidate_cache(&ports);
        }
    }

    /// Stores inbound tuples. Tuples for unknown collections are dropped.
    fn receive(&mut self, inbound: Vec<(String, Tuple)>) -> Result<()> {
        for (name, t) in inbound {
            match self.catalog.get_mut(&name) {
                Some(c) => {
                    store(c, t)?;
                }
                None => tracing::warn!(collection = %name, "inbound tuple for unknown collection dropped"),
            }
        }
        Ok(())
    }

    /// Drives one stratum to its fixpoint and commits its targets.
    fn run_stratum(&mut self, stratum: usize) -> Result<()> {
        let mut first = true;
        let mut iterations = 0usize;
        loop {
            loop {
                let found = self.propagate(stratum, Pass::Iterate { first })?;
                first = false;
                iterations += 1;
                let grew = self.tick_targets(stratum)?;
                if !found && !grew {
                    break;
                }
            }
            self.propagate(stratum, Pass::StratumEnd)?;
            if !self.tick_targets(stratum)? {
                break;
            }
        }

        for &t in &self.df.strata[stratum].targets {
            self.catalog.by_id_mut(t).commit()?;
        }
        for &id in &self.df.strata[stratum].elements {
            if let ElementKind::Join(j) = &mut self.df.elements[id].kind {
                j.commit();
            }
        }
        tracing::trace!(stratum, iterations, "stratum reached fixpoint");
        Ok(())
    }

    /// Advances the deltas of the stratum's merge-now targets. True if any
    /// of them derived something new.
    fn tick_targets(&mut self, stratum: usize) -> Result<bool> {
        let mut grew = false;
        for &t in &self.df.strata[stratum].targets {
            grew |= self.catalog.by_id_mut(t).tick_deltas()?;
        }
        Ok(grew)
    }

    /// Pushes one pass through the stratum's elements in topological order.
    /// Returns true if a join absorbed new input.
    fn propagate(&mut self, stratum: usize, pass: Pass) -> Result<bool> {
        let ctx = EvalContext {
            budtime: self.budtime,
            clock_ms: self.clock.unwrap_or(0),
        };
        let mut found = false;
        for k in 0..self.df.strata[stratum].elements.len() {
            let id = self.df.strata[stratum].elements[k];
            let items = core::mem::take(&mut self.inbox[id]);
            let element = &mut self.df.elements[id];
            let rule = element.rule;
            let out = step(element, items, pass, &ctx, &mut self.catalog, &mut found)
                .map_err(|e| match rule {
                    Some(ri) => e.in_rule(self.rules[ri].name.clone()),
                    None => e,
                })?;
            if out.is_empty() {
                continue;
            }
            for &(consumer, port) in &self.df.elements[id].outputs {
                self.inbox[consumer].extend(out.iter().cloned().map(|item| (port, item)));
            }
        }
        Ok(found)
    }

    fn flush(&mut self) -> TickOutput {
        let mut out = TickOutput {
            budtime: self.budtime,
            ..TickOutput::default()
        };
        for c in self.catalog.iter_mut() {
            if c.gained() {
                out.changed.push(String::from(c.name()));
            }
            let r = match c.as_relation_mut() {
                Some(r) => r,
                None => continue,
            };
            match r.kind() {
                CollectionKind::Channel => out.outbound.extend(r.take_outbound()),
                CollectionKind::Persistent => {
                    for t in r.removed() {
                        out.changes.push(r.name(), Delta::delete(t.clone()));
                    }
                    for t in r.tick_delta() {
                        out.changes.push(r.name(), Delta::insert(t.clone()));
                    }
                }
                _ => {}
            }
        }
        out.changes.consolidate();
        out.halted = self
            .catalog
            .get(HALT)
            .and_then(|c| c.as_relation())
            .map(|r| !r.is_empty())
            .unwrap_or(false);
        self.halted |= out.halted;

        for e in &mut self.df.elements {
            e.rescan = false;
            e.invalidate = false;
        }
        tracing::debug!(
            outbound = out.outbound.len(),
            changed = out.changed.len(),
            halted = out.halted,
            "tick flushed"
        );
        out
    }
}

/// Inserts straight into storage.
fn store(c: &mut Collection, t: Tuple) -> Result<bool> {
    match c {
        Collection::Relation(r) => r.insert(t),
        Collection::Lattice(l) => {
            let v = l.coerce(&t)?;
            l.insert(&v)
        }
    }
}

/// Runs one element over the items queued for it and returns what it emits.
fn step(
    e: &mut Element,
    items: Vec<(usize, Item)>,
    pass: Pass,
    ctx: &EvalContext,
    catalog: &mut Catalog,
    found: &mut bool,
) -> Result<Vec<Item>> {
    let Element {
        kind,
        rescan,
        dirty,
        emitted,
        ..
    } = e;
    let first = pass == Pass::Iterate { first: true };
    let mut out = Vec::new();

    match kind {
        ElementKind::Scanner { collection } => {
            let more = match pass {
                Pass::Iterate { first } => first,
                Pass::StratumEnd => return Ok(out),
            };
            match catalog.by_id(*collection) {
                Collection::Relation(r) => {
                    if more && *rescan {
                        out.extend(r.iter().chain(r.iter_delta()).cloned().map(Item::Tuple));
                    } else if more {
                        out.extend(r.tick_delta().iter().chain(r.iter_delta()).cloned().map(Item::Tuple));
                    } else {
                        out.extend(r.iter_delta().cloned().map(Item::Tuple));
                    }
                }
                Collection::Lattice(l) => {
                    let changed = if more {
                        *rescan || !l.tick_delta().is_bottom() || !l.delta().is_bottom()
                    } else {
                        !l.delta().is_bottom()
                    };
                    if changed {
                        let v = l.visible()?;
                        if !v.is_bottom() {
                            out.push(Item::Lattice(v));
                        }
                    }
                }
            }
        }
        ElementKind::Values(tuples) => {
            if first && *rescan {
                out.extend(tuples.iter().cloned().map(Item::Tuple));
            }
        }
        ElementKind::Map(f) => {
            for (_, item) in items {
                out.push(Item::Tuple(f(&item_tuple(item), ctx)?));
            }
        }
        ElementKind::FlatMap(f) => {
            for (_, item) in items {
                out.extend(f(&item_tuple(item), ctx)?.into_iter().map(Item::Tuple));
            }
        }
        ElementKind::Filter(f) => {
            for (_, item) in items {
                let t = item_tuple(item);
                if f(&t, ctx)? {
                    out.push(Item::Tuple(t));
                }
            }
        }
        ElementKind::Join(j) => {
            for (port, item) in items {
                *dirty |= j.insert(port, item_tuple(item));
            }
            *found |= j.tick_deltas();
            out.extend(j.delta_matches().into_iter().map(Item::Tuple));
            if first && *rescan {
                out.extend(j.storage_matches().into_iter().map(Item::Tuple));
            }
            if pass == Pass::StratumEnd && j.is_outer() && (*rescan || *dirty) {
                for t in j.padding() {
                    if emitted.insert(t.clone()) {
                        out.push(Item::Tuple(t));
                    }
                }
                *dirty = false;
            }
        }
        ElementKind::NotIn(n) => {
            for (port, item) in items {
                let t = item_tuple(item);
                *dirty |= if port == 0 { n.insert_input(t) } else { n.insert_other(t) };
            }
            if pass == Pass::StratumEnd {
                emit_blocking(n.results(), rescan, dirty, emitted, &mut out);
            }
        }
        ElementKind::Group(g) => {
            for (_, item) in items {
                *dirty |= g.insert(&item_tuple(item))?;
            }
            if pass == Pass::StratumEnd {
                emit_blocking(g.results(), rescan, dirty, emitted, &mut out);
            }
        }
        ElementKind::ArgAgg(a) => {
            for (_, item) in items {
                *dirty |= a.insert(&item_tuple(item));
            }
            if pass == Pass::StratumEnd {
                emit_blocking(a.results(), rescan, dirty, emitted, &mut out);
            }
        }
        ElementKind::Morph { func, f } => {
            for (_, item) in items {
                match item {
                    Item::Lattice(v) => out.extend(f(&v, ctx)?),
                    Item::Tuple(_) => {
                        return Err(Error::type_error(func.clone(), "expects a lattice value"))
                    }
                }
            }
        }
        ElementKind::Sink { target, op } => {
            let c = catalog.by_id_mut(*target);
            for (_, item) in items {
                write(c, *op, item)?;
            }
        }
    }
    Ok(out)
}

/// Emits a blocking element's results once per tick.
fn emit_blocking(
    results: Vec<Tuple>,
    rescan: &bool,
    dirty: &mut bool,
    emitted: &mut hashbrown::HashSet<Tuple>,
    out: &mut Vec<Item>,
) {
    if !*rescan && !*dirty {
        return;
    }
    for t in results {
        if emitted.insert(t.clone()) {
            out.push(Item::Tuple(t));
        }
    }
    *dirty = false;
}

/// Applies a rule head operator.
fn write(c: &mut Collection, op: RuleOp, item: Item) -> Result<()> {
    match c {
        Collection::Relation(r) => {
            let t = item_tuple(item);
            match op {
                RuleOp::MergeNow => {
                    r.merge_now(t)?;
                }
                RuleOp::MergeNextTick => {
                    r.merge_next_tick(t)?;
                }
                RuleOp::Async => r.async_send(t)?,
                RuleOp::Delete => r.mark_delete(t),
            }
        }
        Collection::Lattice(l) => {
            let v: LatticeValue = match item {
                Item::Lattice(v) => v,
                Item::Tuple(t) => l.coerce(&t)?,
            };
            match op {
                RuleOp::MergeNow => {
                    l.merge_now(&v)?;
                }
                RuleOp::MergeNextTick => {
                    l.merge_next_tick(&v)?;
                }
                RuleOp::Async | RuleOp::Delete => {
                    return Err(Error::illegal_operator(l.name(), op.symbol()))
                }
            }
        }
    }
    Ok(())
}
