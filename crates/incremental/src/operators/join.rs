//! Semi-naive multi-way equi-join.
//!
//! Each input port keeps the same three partitions as a collection: tuples
//! already joined (`storage`), tuples arrived in the previous iteration
//! (`delta`) and tuples arriving now (`new_delta`). After
//! [`JoinState::tick_deltas`], [`JoinState::delta_matches`] yields only the
//! combinations that involve at least one delta tuple:
//!
//! ```text
//! new = U_j  (S u D)_0 .. (S u D)_{j-1}  x  D_j  x  S_{j+1} .. S_{n-1}
//! ```
//!
//! so every combination is produced exactly once over the life of the cache.

use alloc::vec;
use alloc::vec::Vec;
use hashbrown::{HashMap, HashSet};
use tidal_core::{Tuple, Value};

/// `left.0` column `left.1` equals `right.0` column `right.1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct JoinPredicate {
    pub left: (usize, usize),
    pub right: (usize, usize),
}

impl JoinPredicate {
    pub fn new(left: (usize, usize), right: (usize, usize)) -> Self {
        Self { left, right }
    }

    /// The column of `port` and the `(port, column)` it is compared with.
    fn oriented(&self, port: usize) -> Option<(usize, (usize, usize))> {
        if self.left.0 == port {
            Some((self.left.1, self.right))
        } else if self.right.0 == port {
            Some((self.right.1, self.left))
        } else {
            None
        }
    }
}

#[derive(Clone, Debug, Default)]
struct JoinInput {
    storage: HashSet<Tuple>,
    delta: HashSet<Tuple>,
    new_delta: HashSet<Tuple>,
}

impl JoinInput {
    fn contains(&self, t: &Tuple) -> bool {
        self.storage.contains(t) || self.delta.contains(t) || self.new_delta.contains(t)
    }

    fn clear(&mut self) {
        self.storage.clear();
        self.delta.clear();
        self.new_delta.clear();
    }

    fn len(&self) -> usize {
        self.storage.len() + self.delta.len() + self.new_delta.len()
    }
}

/// Which partitions of a port take part in one term of the expansion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Part {
    Storage,
    Delta,
    Both,
}

/// Cached state of one join element.
#[derive(Clone, Debug)]
pub struct JoinState {
    inputs: Vec<JoinInput>,
    preds: Vec<JoinPredicate>,
    /// Right-hand arity for outer-join padding.
    outer: Option<usize>,
    found_delta: bool,
}

impl JoinState {
    pub fn new(ports: usize, preds: Vec<JoinPredicate>) -> Self {
        Self {
            inputs: vec![JoinInput::default(); ports],
            preds,
            outer: None,
            found_delta: false,
        }
    }

    /// A two-input left outer join; unmatched left tuples are padded with
    /// `right_arity` nulls.
    pub fn outer(preds: Vec<JoinPredicate>, right_arity: usize) -> Self {
        let mut s = Self::new(2, preds);
        s.outer = Some(right_arity);
        s
    }

    #[inline]
    pub fn ports(&self) -> usize {
        self.inputs.len()
    }

    #[inline]
    pub fn is_outer(&self) -> bool {
        self.outer.is_some()
    }

    /// True if the last [`tick_deltas`](Self::tick_deltas) found new input.
    #[inline]
    pub fn found_delta(&self) -> bool {
        self.found_delta
    }

    /// Buffers a tuple on `port`. Returns false if the port has seen it.
    pub fn insert(&mut self, port: usize, t: Tuple) -> bool {
        match self.inputs.get_mut(port) {
            Some(input) if !input.contains(&t) => input.new_delta.insert(t),
            _ => false,
        }
    }

    /// Moves each port's delta into storage and its new arrivals into delta.
    pub fn tick_deltas(&mut self) -> bool {
        let mut found = false;
        for input in self.inputs.iter_mut() {
            let delta = core::mem::take(&mut input.delta);
            input.storage.extend(delta);
            input.delta = core::mem::take(&mut input.new_delta);
            found |= !input.delta.is_empty();
        }
        self.found_delta = found;
        found
    }

    /// Moves everything into storage at the end of a stratum.
    pub fn commit(&mut self) {
        for input in self.inputs.iter_mut() {
            let delta = core::mem::take(&mut input.delta);
            let new_delta = core::mem::take(&mut input.new_delta);
            input.storage.extend(delta);
            input.storage.extend(new_delta);
        }
        self.found_delta = false;
    }

    /// Drops the cache of one port.
    pub fn invalidate_port(&mut self, port: usize) {
        if let Some(input) = self.inputs.get_mut(port) {
            input.clear();
        }
    }

    pub fn invalidate(&mut self) {
        for input in self.inputs.iter_mut() {
            input.clear();
        }
    }

    /// Number of cached tuples on `port`.
    pub fn port_len(&self, port: usize) -> usize {
        self.inputs.get(port).map_or(0, |i| i.len())
    }

    /// Number of cached tuples over all ports.
    pub fn cache_size(&self) -> usize {
        self.inputs.iter().map(|i| i.len()).sum()
    }

    /// Combinations involving at least one delta tuple.
    pub fn delta_matches(&self) -> Vec<Tuple> {
        let n = self.inputs.len();
        let mut out = Vec::new();
        for j in 0..n {
            if self.inputs[j].delta.is_empty() {
                continue;
            }
            let parts: Vec<Part> = (0..n)
                .map(|p| match p.cmp(&j) {
                    core::cmp::Ordering::Less => Part::Both,
                    core::cmp::Ordering::Equal => Part::Delta,
                    core::cmp::Ordering::Greater => Part::Storage,
                })
                .collect();
            self.term(j, &parts, &mut out);
        }
        out
    }

    /// Combinations over storage only.
    pub fn storage_matches(&self) -> Vec<Tuple> {
        let parts = vec![Part::Storage; self.inputs.len()];
        let mut out = Vec::new();
        if !parts.is_empty() {
            self.term(0, &parts, &mut out);
        }
        out
    }

    /// Left tuples with no match on the right, padded with nulls.
    pub fn padding(&self) -> Vec<Tuple> {
        let right_arity = match self.outer {
            Some(a) => a,
            None => return Vec::new(),
        };
        let (left, right) = (&self.inputs[0], &self.inputs[1]);
        let mut out: Vec<Tuple> = left
            .storage
            .iter()
            .chain(left.delta.iter())
            .filter(|l| {
                !right
                    .storage
                    .iter()
                    .chain(right.delta.iter())
                    .any(|r| self.pair_matches(l, r))
            })
            .map(|l| l.concat(&Tuple::nulls(right_arity)))
            .collect();
        out.sort();
        out
    }

    fn pair_matches(&self, l: &Tuple, r: &Tuple) -> bool {
        let slots = [Some(l), Some(r)];
        self.preds.iter().all(|p| Self::holds(p, &slots))
    }

    fn tuples(&self, port: usize, part: Part) -> impl Iterator<Item = &Tuple> {
        let input = &self.inputs[port];
        let (a, b) = match part {
            Part::Storage => (Some(&input.storage), None),
            Part::Delta => (Some(&input.delta), None),
            Part::Both => (Some(&input.storage), Some(&input.delta)),
        };
        a.into_iter().flatten().chain(b.into_iter().flatten())
    }

    fn holds(pred: &JoinPredicate, slots: &[Option<&Tuple>]) -> bool {
        let l = slots[pred.left.0].and_then(|t| t.get(pred.left.1));
        let r = slots[pred.right.0].and_then(|t| t.get(pred.right.1));
        match (l, r) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Evaluates one term, starting from port `first` and extending with the
    /// remaining ports in order.
    fn term(&self, first: usize, parts: &[Part], out: &mut Vec<Tuple>) {
        let n = self.inputs.len();
        let mut bound = vec![false; n];
        bound[first] = true;
        let mut partials: Vec<Vec<Option<&Tuple>>> = self
            .tuples(first, parts[first])
            .filter(|t| self.local_preds_hold(first, t))
            .map(|t| {
                let mut slots = vec![None; n];
                slots[first] = Some(t);
                slots
            })
            .collect();

        for p in (0..n).filter(|p| *p != first) {
            if partials.is_empty() {
                return;
            }
            // predicates linking `p` with ports bound so far
            let linking: Vec<&JoinPredicate> = self
                .preds
                .iter()
                .filter(|pr| match pr.oriented(p) {
                    Some((_, (other, _))) => other != p && bound[other],
                    None => false,
                })
                .collect();
            let candidates = self
                .tuples(p, parts[p])
                .filter(|t| self.local_preds_hold(p, t));
            let mut next = Vec::new();
            match linking.first().and_then(|pr| pr.oriented(p)) {
                Some((col, (bport, bcol))) => {
                    let mut index: HashMap<&Value, Vec<&Tuple>> = HashMap::new();
                    for t in candidates {
                        if let Some(v) = t.get(col) {
                            index.entry(v).or_default().push(t);
                        }
                    }
                    for slots in partials.iter() {
                        let probe = match slots[bport].and_then(|t| t.get(bcol)) {
                            Some(v) => v,
                            None => continue,
                        };
                        if let Some(matches) = index.get(probe) {
                            for t in matches {
                                let mut ext = slots.clone();
                                ext[p] = Some(*t);
                                if linking[1..].iter().all(|pr| Self::holds(pr, &ext)) {
                                    next.push(ext);
                                }
                            }
                        }
                    }
                }
                None => {
                    let candidates: Vec<&Tuple> = candidates.collect();
                    for slots in partials.iter() {
                        for t in candidates.iter() {
                            let mut ext = slots.clone();
                            ext[p] = Some(*t);
                            next.push(ext);
                        }
                    }
                }
            }
            bound[p] = true;
            partials = next;
        }

        for slots in partials {
            let mut values = Vec::new();
            for t in slots.into_iter().flatten() {
                values.extend(t.iter().cloned());
            }
            out.push(Tuple::new(values));
        }
    }

    /// Predicates comparing two columns of the same port.
    fn local_preds_hold(&self, port: usize, t: &Tuple) -> bool {
        self.preds
            .iter()
            .filter(|p| p.left.0 == port && p.right.0 == port)
            .all(|p| t.get(p.left.1) == t.get(p.right.1))
    }
}
