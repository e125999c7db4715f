use rustc_hash::{FxHashMap, FxHashSet};

use super::ExprRef;

/// Memo table for a monotone, possibly self-referential, computation keyed
/// by node.
///
/// A key that is re-entered while being computed yields its current
/// approximation (starting at `bottom`).  The outermost computation repeats
/// rounds until no key in the table changed, and only then marks every key
/// visited during the rounds as settled.  Inner keys are recomputed once per
/// round.
pub(crate) struct Fixpoint<V> {
    bottom: V,
    values: FxHashMap<ExprRef, V>,
    settled: FxHashSet<ExprRef>,
    visited: FxHashSet<ExprRef>,
    depth: usize,
    changed: bool,
    rounds: usize,
}

impl<V: Clone + PartialEq> Fixpoint<V> {
    pub fn new(bottom: V) -> Self {
        Fixpoint {
            bottom,
            values: FxHashMap::default(),
            settled: FxHashSet::default(),
            visited: FxHashSet::default(),
            depth: 0,
            changed: false,
            rounds: 0,
        }
    }

    /// The value to use for `key` right now, or `None` if it has to be
    /// computed (again) in this round.
    pub fn lookup(&self, key: ExprRef) -> Option<V> {
        if self.settled.contains(&key) || self.visited.contains(&key) {
            Some(self.values.get(&key).unwrap_or(&self.bottom).clone())
        } else {
            None
        }
    }

    /// Start computing `key`; returns true for the outermost computation.
    pub fn enter(&mut self, key: ExprRef) -> bool {
        self.visited.insert(key);
        if !self.values.contains_key(&key) {
            self.values.insert(key, self.bottom.clone());
        }
        self.depth += 1;
        self.depth == 1
    }

    pub fn leave(&mut self, key: ExprRef, value: V) {
        assert!(self.depth > 0);
        self.depth -= 1;
        if self.values.get(&key) != Some(&value) {
            self.changed = true;
            self.values.insert(key, value);
        }
    }

    /// Called by the outermost computation after each round.  Returns true
    /// when nothing changed, i.e., the values are final.
    pub fn settle(&mut self) -> bool {
        assert!(self.depth == 0);
        self.rounds += 1;
        if self.changed {
            self.changed = false;
            self.visited.clear();
            false
        } else {
            self.settled.extend(self.visited.drain());
            true
        }
    }

    pub fn num_settled(&self) -> usize {
        self.settled.len()
    }

    pub fn num_rounds(&self) -> usize {
        self.rounds
    }
}
