//! Four-partition collections and their tick transitions.
//!
//! Every collection keeps tuples in `storage` (visible this tick), `pending`
//! (visible from the next tick), `delta` (derived in the previous semi-naive
//! iteration) and `new_delta` (derived in the current iteration). Relations
//! enforce key uniqueness across the visible partitions; lattice cells hold a
//! single merged value per partition instead.

use alloc::string::{String, ToString};
use alloc::vec::Vec;
use hashbrown::{HashMap, HashSet};
use tidal_core::{Error, Result, Schema, Tuple, Value};
use tidal_lattice::{LatticeKind, LatticeValue};

/// Rule operators, as seen by a collection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RuleOp {
    /// `<=`: visible in the current tick.
    MergeNow,
    /// `<+`: visible from the next tick.
    MergeNextTick,
    /// `<~`: sent over the network at the end of the tick.
    Async,
    /// `<-`: removed at the start of the next tick.
    Delete,
}

impl RuleOp {
    /// Operator symbol.
    pub fn symbol(&self) -> &'static str {
        match self {
            RuleOp::MergeNow => "<=",
            RuleOp::MergeNextTick => "<+",
            RuleOp::Async => "<~",
            RuleOp::Delete => "<-",
        }
    }
}

/// The kind of a declared collection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CollectionKind {
    /// Persists across ticks.
    Table,
    /// Emptied at every tick boundary.
    Scratch,
    /// Network channel; reads see the messages received this tick.
    Channel,
    /// Receives `[ident, time_ms]` each time its timer fires.
    Periodic { period_ms: u64 },
    /// Filled from outside the rule set only.
    ReadOnly,
    /// Table whose contents are mirrored into a key/value store.
    Persistent,
    /// A single lattice value.
    Lattice { kind: LatticeKind, scratch: bool },
}

impl CollectionKind {
    /// Kinds whose visible contents are rebuilt every tick.
    pub fn is_scratch_like(&self) -> bool {
        matches!(
            self,
            CollectionKind::Scratch
                | CollectionKind::Channel
                | CollectionKind::Periodic { .. }
                | CollectionKind::ReadOnly
                | CollectionKind::Lattice { scratch: true, .. }
        )
    }

    /// Returns true for lattice collections.
    pub fn is_lattice(&self) -> bool {
        matches!(self, CollectionKind::Lattice { .. })
    }

    /// Short name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            CollectionKind::Table => "table",
            CollectionKind::Scratch => "scratch",
            CollectionKind::Channel => "channel",
            CollectionKind::Periodic { .. } => "periodic",
            CollectionKind::ReadOnly => "readonly",
            CollectionKind::Persistent => "persistent",
            CollectionKind::Lattice { .. } => "lattice",
        }
    }

    /// Returns true if rules may write into this kind with `op`.
    pub fn accepts(&self, op: RuleOp) -> bool {
        use CollectionKind::*;
        match op {
            RuleOp::MergeNow | RuleOp::MergeNextTick => {
                matches!(self, Table | Scratch | Persistent | Lattice { .. })
            }
            RuleOp::Async => matches!(self, Channel),
            RuleOp::Delete => matches!(self, Table | Persistent),
        }
    }
}

/// A message buffered by a channel for delivery at the end of the tick.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Outbound {
    /// Destination collection (same name at the receiver).
    pub collection: String,
    /// Destination address; `None` means loopback.
    pub address: Option<String>,
    /// Payload, with the address column removed.
    pub tuple: Tuple,
}

type Partition = HashMap<Vec<Value>, Tuple>;

/// A keyed set of tuples with the four-partition layout.
#[derive(Debug)]
pub struct Relation {
    /// Declared schema (a channel keeps its address column here).
    declared: Schema,
    /// Schema of stored tuples.
    schema: Schema,
    kind: CollectionKind,
    storage: Partition,
    delta: Partition,
    new_delta: Partition,
    pending: Partition,
    to_delete: Vec<Tuple>,
    outbound: Vec<Outbound>,
    outbound_seen: HashSet<Outbound>,
    /// Tuples that became visible during the current tick.
    tick_delta: Vec<Tuple>,
    /// Tuples removed at the last tick boundary.
    removed: Vec<Tuple>,
    invalidated: bool,
    /// Length of `tick_delta` when the boundary finished; later entries
    /// were added by the running tick.
    boundary_len: usize,
    /// The last tick was aborted; its boundary changes are still unreported.
    carry: bool,
}

impl Relation {
    /// Creates an empty relation.
    pub fn new(schema: Schema, kind: CollectionKind) -> Self {
        let stored = schema.without_address();
        Self {
            declared: schema,
            schema: stored,
            kind,
            storage: HashMap::new(),
            delta: HashMap::new(),
            new_delta: HashMap::new(),
            pending: HashMap::new(),
            to_delete: Vec::new(),
            outbound: Vec::new(),
            outbound_seen: HashSet::new(),
            tick_delta: Vec::new(),
            removed: Vec::new(),
            invalidated: false,
            boundary_len: 0,
            carry: false,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        self.schema.name()
    }

    /// Schema of stored tuples.
    #[inline]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Schema as declared, including any address column.
    #[inline]
    pub fn declared_schema(&self) -> &Schema {
        &self.declared
    }

    #[inline]
    pub fn kind(&self) -> CollectionKind {
        self.kind
    }

    /// Number of tuples in storage.
    #[inline]
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Looks up a stored tuple by key.
    pub fn get(&self, key: &[Value]) -> Option<&Tuple> {
        self.storage.get(key)
    }

    /// Returns true if `t` is stored exactly.
    pub fn contains(&self, t: &Tuple) -> bool {
        let key = self.schema.key_of(t);
        self.storage.get(&key) == Some(t)
    }

    /// Iterates over storage.
    pub fn iter(&self) -> impl Iterator<Item = &Tuple> {
        self.storage.values()
    }

    /// Iterates over the current delta.
    pub fn iter_delta(&self) -> impl Iterator<Item = &Tuple> {
        self.delta.values()
    }

    /// Iterates over tuples derived in the current iteration.
    pub fn iter_new_delta(&self) -> impl Iterator<Item = &Tuple> {
        self.new_delta.values()
    }

    /// Iterates over tuples waiting for the next tick.
    pub fn iter_pending(&self) -> impl Iterator<Item = &Tuple> {
        self.pending.values()
    }

    /// Storage in sorted order.
    pub fn sorted(&self) -> Vec<Tuple> {
        let mut out: Vec<Tuple> = self.storage.values().cloned().collect();
        out.sort();
        out
    }

    /// Tuples that became visible during the current tick.
    #[inline]
    pub fn tick_delta(&self) -> &[Tuple] {
        &self.tick_delta
    }

    /// Tuples removed at the last tick boundary.
    #[inline]
    pub fn removed(&self) -> &[Tuple] {
        &self.removed
    }

    /// True if stored tuples were removed or replaced at the last boundary.
    #[inline]
    pub fn is_invalidated(&self) -> bool {
        self.invalidated
    }

    fn prep(&self, t: Tuple) -> Tuple {
        t.fit_arity(self.schema.arity())
    }

    fn conflict(&self, key: Vec<Value>, existing: &Tuple, incoming: Tuple) -> Error {
        Error::key_constraint(self.name(), key, existing.clone(), incoming)
    }

    /// Checks `t` against a partition; `Ok(true)` if the key is free.
    fn check(&self, part: &Partition, key: &[Value], t: &Tuple) -> Result<bool> {
        match part.get(key) {
            None => Ok(true),
            Some(old) if old == t => Ok(false),
            Some(old) => Err(self.conflict(key.to_vec(), old, t.clone())),
        }
    }

    /// Inserts straight into storage (bootstrap facts, inbound messages,
    /// external inserts). Returns false for an identical duplicate.
    pub fn insert(&mut self, t: Tuple) -> Result<bool> {
        let t = self.prep(t);
        let key = self.schema.key_of(&t);
        if !self.check(&self.storage, &key, &t)?
            || !self.check(&self.delta, &key, &t)?
            || !self.check(&self.new_delta, &key, &t)?
        {
            return Ok(false);
        }
        self.tick_delta.push(t.clone());
        self.storage.insert(key, t);
        Ok(true)
    }

    /// Merges a derived tuple into `new_delta`. Returns false if it is already
    /// visible.
    pub fn merge_now(&mut self, t: Tuple) -> Result<bool> {
        let t = self.prep(t);
        let key = self.schema.key_of(&t);
        if !self.check(&self.storage, &key, &t)?
            || !self.check(&self.delta, &key, &t)?
            || !self.check(&self.new_delta, &key, &t)?
        {
            return Ok(false);
        }
        self.new_delta.insert(key, t);
        Ok(true)
    }

    /// Buffers a tuple for the next tick.
    pub fn merge_next_tick(&mut self, t: Tuple) -> Result<bool> {
        let t = self.prep(t);
        let key = self.schema.key_of(&t);
        if !self.check(&self.pending, &key, &t)? {
            return Ok(false);
        }
        self.pending.insert(key, t);
        Ok(true)
    }

    /// Marks a tuple for removal at the next tick boundary.
    pub fn mark_delete(&mut self, t: Tuple) {
        let t = self.prep(t);
        self.to_delete.push(t);
    }

    /// Buffers a message. `t` is laid out by the declared schema; its address
    /// column is split off here.
    pub fn async_send(&mut self, t: Tuple) -> Result<()> {
        if self.kind != CollectionKind::Channel {
            return Err(Error::illegal_operator(self.name(), RuleOp::Async.symbol()));
        }
        let t = t.fit_arity(self.declared.arity());
        let (address, payload) = match self.declared.address() {
            None => (None, t),
            Some(pos) => {
                let address = match t.get(pos) {
                    None | Some(Value::Null) => None,
                    Some(Value::String(s)) => Some(s.clone()),
                    Some(other) => Some(other.to_string()),
                };
                (address, t.without(pos))
            }
        };
        let msg = Outbound {
            collection: self.name().to_string(),
            address,
            tuple: payload,
        };
        if self.outbound_seen.insert(msg.clone()) {
            self.outbound.push(msg);
        }
        Ok(())
    }

    /// Drains buffered messages.
    pub fn take_outbound(&mut self) -> Vec<Outbound> {
        self.outbound_seen.clear();
        core::mem::take(&mut self.outbound)
    }

    /// Advances to the next tick.
    pub fn tick(&mut self) {
        debug_assert!(self.delta.is_empty() && self.new_delta.is_empty());
        if !core::mem::take(&mut self.carry) {
            self.tick_delta.clear();
            self.removed.clear();
            self.invalidated = false;
        }
        self.storage.extend(self.delta.drain());
        self.storage.extend(self.new_delta.drain());

        if self.kind.is_scratch_like() {
            self.storage.clear();
            self.to_delete.clear();
            self.tick_delta.clear();
            for (key, t) in self.pending.drain() {
                self.tick_delta.push(t.clone());
                self.storage.insert(key, t);
            }
            self.boundary_len = self.tick_delta.len();
            return;
        }

        for t in self.to_delete.drain(..) {
            let key = self.schema.key_of(&t);
            if self.storage.get(&key) == Some(&t) {
                self.storage.remove(&key);
                self.removed.push(t);
                self.invalidated = true;
            }
        }
        for (key, t) in self.pending.drain() {
            match self.storage.insert(key, t.clone()) {
                Some(old) if old == t => continue,
                Some(old) => {
                    self.removed.push(old);
                    self.invalidated = true;
                }
                None => {}
            }
            self.tick_delta.push(t);
        }
        self.boundary_len = self.tick_delta.len();
    }

    /// Undoes everything the running tick did after its boundary: stored
    /// tuples it added leave storage, and its derived, buffered and
    /// outgoing tuples are dropped. The boundary's own changes stay and are
    /// reported by the next tick.
    pub fn abort(&mut self) {
        let added = self.tick_delta.split_off(self.boundary_len.min(self.tick_delta.len()));
        for t in added {
            let key = self.schema.key_of(&t);
            if self.storage.get(&key) == Some(&t) {
                self.storage.remove(&key);
            }
        }
        self.delta.clear();
        self.new_delta.clear();
        self.pending.clear();
        self.to_delete.clear();
        self.outbound.clear();
        self.outbound_seen.clear();
        self.carry = true;
    }

    /// Moves `delta` into storage and `new_delta` into `delta`. Returns true
    /// if the new delta is non-empty.
    pub fn tick_deltas(&mut self) -> bool {
        for (key, t) in self.delta.drain() {
            self.tick_delta.push(t.clone());
            self.storage.insert(key, t);
        }
        core::mem::swap(&mut self.delta, &mut self.new_delta);
        !self.delta.is_empty()
    }

    /// Installs every derived tuple into storage.
    pub fn commit(&mut self) {
        while self.tick_deltas() {}
    }

    /// Drops every tuple, including buffered ones.
    pub fn truncate(&mut self) {
        self.storage.clear();
        self.delta.clear();
        self.new_delta.clear();
        self.pending.clear();
        self.to_delete.clear();
        self.tick_delta.clear();
        self.invalidated = true;
    }
}

/// A lattice-valued collection.
#[derive(Debug)]
pub struct LatticeCell {
    name: String,
    kind: LatticeKind,
    scratch: bool,
    storage: LatticeValue,
    delta: LatticeValue,
    new_delta: LatticeValue,
    pending: LatticeValue,
    /// Everything merged into storage during the current tick.
    tick_delta: LatticeValue,
    /// `(storage, tick_delta)` as the boundary left them, saved before the
    /// running tick first changes storage.
    saved: Option<(LatticeValue, LatticeValue)>,
    carry: bool,
}

impl LatticeCell {
    pub fn new(name: impl Into<String>, kind: LatticeKind, scratch: bool) -> Self {
        Self {
            name: name.into(),
            kind,
            scratch,
            storage: LatticeValue::bottom(kind),
            delta: LatticeValue::bottom(kind),
            new_delta: LatticeValue::bottom(kind),
            pending: LatticeValue::bottom(kind),
            tick_delta: LatticeValue::bottom(kind),
            saved: None,
            carry: false,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn lattice_kind(&self) -> LatticeKind {
        self.kind
    }

    /// The collection kind.
    pub fn kind(&self) -> CollectionKind {
        CollectionKind::Lattice {
            kind: self.kind,
            scratch: self.scratch,
        }
    }

    /// The committed value.
    #[inline]
    pub fn current(&self) -> &LatticeValue {
        &self.storage
    }

    /// The value visible to a full scan: storage merged with delta.
    pub fn visible(&self) -> Result<LatticeValue> {
        self.storage.merge(&self.delta)
    }

    #[inline]
    pub fn delta(&self) -> &LatticeValue {
        &self.delta
    }

    /// Everything that became visible during the current tick.
    #[inline]
    pub fn tick_delta(&self) -> &LatticeValue {
        &self.tick_delta
    }

    /// Converts a tuple into a value of this cell's kind. Single-column
    /// tuples convert their only column; wider tuples convert as a list.
    pub fn coerce(&self, t: &Tuple) -> Result<LatticeValue> {
        let converted = match t.values() {
            [only] => LatticeValue::from_value(self.kind, only),
            values => LatticeValue::from_value(self.kind, &Value::List(values.to_vec())),
        };
        converted.map_err(|e| match e {
            Error::Type { message, .. } => Error::type_error(self.name.clone(), message),
            other => other,
        })
    }

    fn check_kind(&self, v: &LatticeValue) -> Result<()> {
        if v.kind() == self.kind {
            Ok(())
        } else {
            Err(Error::type_error(
                self.name.clone(),
                alloc::format!("expected {}, got {}", self.kind, v.kind()),
            ))
        }
    }

    fn save(&mut self) {
        if self.saved.is_none() {
            self.saved = Some((self.storage.clone(), self.tick_delta.clone()));
        }
    }

    /// Merges straight into storage.
    pub fn insert(&mut self, v: &LatticeValue) -> Result<bool> {
        self.check_kind(v)?;
        self.save();
        let changed = self.storage.merge_assign(v)?;
        if changed {
            self.tick_delta.merge_assign(v)?;
        }
        Ok(changed)
    }

    /// Merges into `new_delta`.
    pub fn merge_now(&mut self, v: &LatticeValue) -> Result<bool> {
        self.check_kind(v)?;
        self.new_delta.merge_assign(v)
    }

    /// Merges into `pending`.
    pub fn merge_next_tick(&mut self, v: &LatticeValue) -> Result<bool> {
        self.check_kind(v)?;
        self.pending.merge_assign(v)
    }

    /// Advances to the next tick.
    pub fn tick(&mut self) -> Result<()> {
        let bottom = LatticeValue::bottom(self.kind);
        let pending = core::mem::replace(&mut self.pending, bottom.clone());
        self.delta = bottom.clone();
        self.new_delta = bottom.clone();
        self.saved = None;
        let carry = core::mem::take(&mut self.carry);
        if self.scratch {
            self.tick_delta = pending.clone();
            self.storage = pending;
        } else if self.storage.merge_assign(&pending)? {
            if carry {
                self.tick_delta.merge_assign(&pending)?;
            } else {
                self.tick_delta = pending;
            }
        } else if !carry {
            self.tick_delta = bottom;
        }
        Ok(())
    }

    /// Restores the value the boundary of the running tick left and drops
    /// everything derived or buffered since.
    pub fn abort(&mut self) {
        if let Some((storage, tick_delta)) = self.saved.take() {
            self.storage = storage;
            self.tick_delta = tick_delta;
        }
        let bottom = LatticeValue::bottom(self.kind);
        self.delta = bottom.clone();
        self.new_delta = bottom.clone();
        self.pending = bottom;
        self.carry = true;
    }

    /// Moves `delta` into storage; `new_delta` becomes the next delta only if
    /// it adds something to storage. Returns true in that case.
    pub fn tick_deltas(&mut self) -> Result<bool> {
        let bottom = LatticeValue::bottom(self.kind);
        let delta = core::mem::replace(&mut self.delta, bottom.clone());
        if !delta.is_bottom() {
            self.save();
        }
        self.storage.merge_assign(&delta)?;
        self.tick_delta.merge_assign(&delta)?;
        let new_delta = core::mem::replace(&mut self.new_delta, bottom);
        if new_delta.leq(&self.storage)? {
            Ok(false)
        } else {
            self.delta = new_delta;
            Ok(true)
        }
    }

    /// Installs every derived value into storage.
    pub fn commit(&mut self) -> Result<()> {
        while self.tick_deltas()? {}
        Ok(())
    }
}

/// A declared collection of either flavour.
#[derive(Debug)]
pub enum Collection {
    Relation(Relation),
    Lattice(LatticeCell),
}

impl Collection {
    pub fn name(&self) -> &str {
        match self {
            Collection::Relation(r) => r.name(),
            Collection::Lattice(l) => l.name(),
        }
    }

    pub fn kind(&self) -> CollectionKind {
        match self {
            Collection::Relation(r) => r.kind(),
            Collection::Lattice(l) => l.kind(),
        }
    }

    pub fn as_relation(&self) -> Option<&Relation> {
        match self {
            Collection::Relation(r) => Some(r),
            Collection::Lattice(_) => None,
        }
    }

    pub fn as_relation_mut(&mut self) -> Option<&mut Relation> {
        match self {
            Collection::Relation(r) => Some(r),
            Collection::Lattice(_) => None,
        }
    }

    pub fn as_lattice(&self) -> Option<&LatticeCell> {
        match self {
            Collection::Lattice(l) => Some(l),
            Collection::Relation(_) => None,
        }
    }

    pub fn as_lattice_mut(&mut self) -> Option<&mut LatticeCell> {
        match self {
            Collection::Lattice(l) => Some(l),
            Collection::Relation(_) => None,
        }
    }

    pub fn tick(&mut self) -> Result<()> {
        match self {
            Collection::Relation(r) => {
                r.tick();
                Ok(())
            }
            Collection::Lattice(l) => l.tick(),
        }
    }

    pub fn tick_deltas(&mut self) -> Result<bool> {
        match self {
            Collection::Relation(r) => Ok(r.tick_deltas()),
            Collection::Lattice(l) => l.tick_deltas(),
        }
    }

    pub fn commit(&mut self) -> Result<()> {
        match self {
            Collection::Relation(r) => {
                r.commit();
                Ok(())
            }
            Collection::Lattice(l) => l.commit(),
        }
    }

    /// Rolls back the running tick; see [`Relation::abort`].
    pub fn abort(&mut self) {
        match self {
            Collection::Relation(r) => r.abort(),
            Collection::Lattice(l) => l.abort(),
        }
    }

    /// True if the collection gained anything during the current tick.
    pub fn gained(&self) -> bool {
        match self {
            Collection::Relation(r) => !r.tick_delta().is_empty(),
            Collection::Lattice(l) => !l.tick_delta().is_bottom(),
        }
    }

    /// True if stored contents were removed or replaced at the last boundary.
    pub fn is_invalidated(&self) -> bool {
        match self {
            Collection::Relation(r) => r.is_invalidated(),
            Collection::Lattice(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidal_core::tuple;
    use tidal_lattice::MaxLattice;

    fn table() -> Relation {
        let schema = Schema::new("t", &["k", "x"], &["v"]).unwrap();
        Relation::new(schema, CollectionKind::Table)
    }

    #[test]
    fn test_merge_now_dedup_and_conflict() {
        let mut t = table();
        assert!(t.merge_now(tuple![1, "x", 10]).unwrap());
        assert!(!t.merge_now(tuple![1, "x", 10]).unwrap());
        let err = t.merge_now(tuple![1, "x", 20]).unwrap_err();
        assert!(err.is_key_constraint());
    }

    #[test]
    fn test_conflict_against_storage() {
        let mut t = table();
        t.insert(tuple![1, "x", 10]).unwrap();
        assert!(t.merge_now(tuple![1, "x", 20]).is_err());
        assert!(t.insert(tuple![1, "x", 30]).is_err());
    }

    #[test]
    fn test_tick_deltas_moves_partitions() {
        let mut t = table();
        t.merge_now(tuple![1, "a", 1]).unwrap();
        assert!(t.tick_deltas());
        assert_eq!(t.iter_delta().count(), 1);
        assert!(t.is_empty());
        assert!(!t.tick_deltas());
        assert_eq!(t.len(), 1);
        assert_eq!(t.tick_delta().len(), 1);
    }

    #[test]
    fn test_pending_not_visible_until_tick() {
        let mut t = table();
        t.merge_next_tick(tuple![1, "a", 1]).unwrap();
        assert!(t.is_empty());
        assert!(t.merge_next_tick(tuple![1, "a", 2]).is_err());
        t.tick();
        assert!(t.contains(&tuple![1, "a", 1]));
        assert_eq!(t.tick_delta(), &[tuple![1, "a", 1]]);
    }

    #[test]
    fn test_delete_exact_match_only() {
        let mut t = table();
        t.insert(tuple![1, "a", 1]).unwrap();
        t.insert(tuple![2, "b", 2]).unwrap();
        t.mark_delete(tuple![1, "a", 1]);
        t.mark_delete(tuple![2, "b", 99]);
        t.tick();
        assert_eq!(t.sorted(), alloc::vec![tuple![2, "b", 2]]);
        assert_eq!(t.removed(), &[tuple![1, "a", 1]]);
        assert!(t.is_invalidated());
        t.tick();
        assert!(!t.is_invalidated());
    }

    #[test]
    fn test_pending_replaces_stored_key() {
        let mut t = table();
        t.insert(tuple![1, "a", 1]).unwrap();
        t.merge_next_tick(tuple![1, "a", 2]).unwrap();
        t.tick();
        assert_eq!(t.sorted(), alloc::vec![tuple![1, "a", 2]]);
        assert_eq!(t.removed(), &[tuple![1, "a", 1]]);
        assert!(t.is_invalidated());
    }

    #[test]
    fn test_abort_keeps_only_boundary() {
        let mut t = table();
        t.merge_next_tick(tuple![2, "b", 2]).unwrap();
        t.tick();
        t.insert(tuple![3, "c", 3]).unwrap();
        t.merge_now(tuple![4, "d", 4]).unwrap();
        t.commit();
        t.merge_now(tuple![5, "e", 5]).unwrap();
        t.merge_next_tick(tuple![6, "f", 6]).unwrap();
        t.abort();
        assert_eq!(t.sorted(), alloc::vec![tuple![2, "b", 2]]);
        assert_eq!(t.iter_delta().count() + t.iter_new_delta().count(), 0);
        assert_eq!(t.iter_pending().count(), 0);

        // the boundary insert is still reported by the next tick
        t.tick();
        assert_eq!(t.tick_delta(), &[tuple![2, "b", 2]]);
        t.tick();
        assert!(t.tick_delta().is_empty());
    }

    #[test]
    fn test_scratch_tick_clears() {
        let schema = Schema::new("s", &["k"], &[]).unwrap();
        let mut s = Relation::new(schema, CollectionKind::Scratch);
        s.insert(tuple![1]).unwrap();
        s.merge_next_tick(tuple![2]).unwrap();
        s.tick();
        assert_eq!(s.sorted(), alloc::vec![tuple![2]]);
        s.tick();
        assert!(s.is_empty());
    }

    #[test]
    fn test_arity_fitting() {
        let mut t = table();
        t.insert(tuple![7]).unwrap();
        assert!(t.contains(&tuple![7, Value::Null, Value::Null]));
        t.insert(tuple![8, "b", 1, 2]).unwrap();
        assert!(t.contains(&tuple![8, "b", Value::List(alloc::vec![Value::Int64(1), Value::Int64(2)])]));
    }

    #[test]
    fn test_channel_strips_address() {
        let schema = tidal_core::SchemaBuilder::new("chan")
            .unwrap()
            .add_key("@addr")
            .unwrap()
            .add_key("k")
            .unwrap()
            .add_value("v")
            .unwrap()
            .build()
            .unwrap();
        let mut c = Relation::new(schema, CollectionKind::Channel);
        assert_eq!(c.schema().arity(), 2);
        c.async_send(tuple!["127.0.0.1:9000", 1, "hi"]).unwrap();
        c.async_send(tuple!["127.0.0.1:9000", 1, "hi"]).unwrap();
        c.async_send(tuple![Value::Null, 2, "self"]).unwrap();
        let out = c.take_outbound();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].address.as_deref(), Some("127.0.0.1:9000"));
        assert_eq!(out[0].tuple, tuple![1, "hi"]);
        assert_eq!(out[1].address, None);
        assert!(c.take_outbound().is_empty());
    }

    #[test]
    fn test_kind_accepts() {
        assert!(CollectionKind::Table.accepts(RuleOp::Delete));
        assert!(!CollectionKind::Scratch.accepts(RuleOp::Delete));
        assert!(!CollectionKind::Channel.accepts(RuleOp::MergeNow));
        assert!(CollectionKind::Channel.accepts(RuleOp::Async));
        assert!(!CollectionKind::ReadOnly.accepts(RuleOp::MergeNow));
        let lat = CollectionKind::Lattice {
            kind: LatticeKind::Max,
            scratch: false,
        };
        assert!(lat.accepts(RuleOp::MergeNow));
        assert!(!lat.accepts(RuleOp::Delete));
    }

    fn max(v: i64) -> LatticeValue {
        LatticeValue::Max(MaxLattice::new(Value::Int64(v)))
    }

    #[test]
    fn test_lattice_tick_deltas_only_on_change() {
        let mut cell = LatticeCell::new("m", LatticeKind::Max, false);
        for v in [5, 10, 3] {
            cell.merge_now(&max(v)).unwrap();
        }
        assert!(cell.tick_deltas().unwrap());
        cell.merge_now(&max(13)).unwrap();
        assert!(cell.tick_deltas().unwrap());
        assert!(!cell.tick_deltas().unwrap());
        assert_eq!(cell.current(), &max(13));
        cell.merge_now(&max(13)).unwrap();
        assert!(!cell.tick_deltas().unwrap());
    }

    #[test]
    fn test_lattice_kind_checked() {
        let mut cell = LatticeCell::new("m", LatticeKind::Max, false);
        let b = LatticeValue::bottom(LatticeKind::Bool);
        assert!(matches!(cell.merge_now(&b), Err(Error::Type { .. })));
        assert_eq!(cell.coerce(&tuple![4]).unwrap(), max(4));
    }

    #[test]
    fn test_lattice_abort_restores_boundary() {
        let mut cell = LatticeCell::new("m", LatticeKind::Max, false);
        cell.merge_next_tick(&max(4)).unwrap();
        cell.tick().unwrap();
        cell.merge_now(&max(9)).unwrap();
        cell.commit().unwrap();
        assert_eq!(cell.current(), &max(9));
        cell.merge_next_tick(&max(20)).unwrap();
        cell.abort();
        assert_eq!(cell.current(), &max(4));
        assert_eq!(cell.tick_delta(), &max(4));

        cell.tick().unwrap();
        assert_eq!(cell.current(), &max(4));
        assert_eq!(cell.tick_delta(), &max(4));
        cell.tick().unwrap();
        assert!(cell.tick_delta().is_bottom());
    }

    #[test]
    fn test_scratch_lattice_resets() {
        let mut cell = LatticeCell::new("m", LatticeKind::Max, true);
        cell.insert(&max(4)).unwrap();
        cell.merge_next_tick(&max(2)).unwrap();
        cell.tick().unwrap();
        assert_eq!(cell.current(), &max(2));
        cell.tick().unwrap();
        assert!(cell.current().is_bottom());
    }
}
