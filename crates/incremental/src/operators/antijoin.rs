//! Anti-join state for `not_in`.

use alloc::vec::Vec;
use hashbrown::HashSet;
use tidal_core::{Tuple, Value};

/// Tuples of the input with no match in the other side.
///
/// With no predicates two tuples match when they are equal; otherwise they
/// match when every `(input column, other column)` pair is equal.
#[derive(Clone, Debug, Default)]
pub struct NotInState {
    preds: Vec<(usize, usize)>,
    input: HashSet<Tuple>,
    other: HashSet<Tuple>,
    other_keys: HashSet<Vec<Value>>,
}

impl NotInState {
    pub fn new(preds: Vec<(usize, usize)>) -> Self {
        Self {
            preds,
            ..Default::default()
        }
    }

    pub fn insert_input(&mut self, t: Tuple) -> bool {
        self.input.insert(t)
    }

    pub fn insert_other(&mut self, t: Tuple) -> bool {
        if self.other.contains(&t) {
            return false;
        }
        if !self.preds.is_empty() {
            let cols: Vec<usize> = self.preds.iter().map(|p| p.1).collect();
            self.other_keys.insert(t.project(&cols));
        }
        self.other.insert(t)
    }

    fn excluded(&self, t: &Tuple) -> bool {
        if self.preds.is_empty() {
            return self.other.contains(t);
        }
        let cols: Vec<usize> = self.preds.iter().map(|p| p.0).collect();
        self.other_keys.contains(&t.project(&cols))
    }

    /// Input tuples that survive, sorted.
    pub fn results(&self) -> Vec<Tuple> {
        let mut out: Vec<Tuple> = self
            .input
            .iter()
            .filter(|t| !self.excluded(t))
            .cloned()
            .collect();
        out.sort();
        out
    }

    pub fn clear_input(&mut self) {
        self.input.clear();
    }

    pub fn clear_other(&mut self) {
        self.other.clear();
        self.other_keys.clear();
    }

    pub fn cache_size(&self) -> usize {
        self.input.len() + self.other.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use tidal_core::tuple;

    #[test]
    fn test_not_in_whole_tuple() {
        let mut s = NotInState::new(vec![]);
        s.insert_input(tuple![1, "a"]);
        s.insert_input(tuple![2, "b"]);
        s.insert_other(tuple![2, "b"]);
        assert_eq!(s.results(), vec![tuple![1, "a"]]);
    }

    #[test]
    fn test_not_in_on_columns() {
        let mut s = NotInState::new(vec![(1, 0)]);
        s.insert_input(tuple![1, "a"]);
        s.insert_input(tuple![2, "b"]);
        s.insert_other(tuple!["b", 99]);
        assert_eq!(s.results(), vec![tuple![1, "a"]]);
        s.clear_other();
        assert_eq!(s.results().len(), 2);
        assert_eq!(s.cache_size(), 2);
    }
}
