// Continuation contexts.
//
// A context maps continuation positions to the contexts of their callers; all
// contexts together form a graph that stands in for the call stack.  Contexts
// live in an arena and refer to each other by index.  The arena is split in
// two: contexts created for the current offset are "pending" and may still
// grow, older ones are "sealed" and never change again.  During a step all
// reads go to sealed contexts and all writes to pending ones.

use rustc_hash::FxHashMap;

use super::ExprRef;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct ContextId(u32);

impl ContextId {
    #[inline(always)]
    pub fn as_usize(&self) -> usize {
        self.0 as usize
    }
}

/// A sorted set of contexts without duplicates.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct ContextSet(Vec<ContextId>);

impl ContextSet {
    pub fn single(id: ContextId) -> Self {
        ContextSet(vec![id])
    }

    pub fn insert(&mut self, id: ContextId) {
        if let Err(idx) = self.0.binary_search(&id) {
            self.0.insert(idx, id);
        }
    }

    pub fn extend_from(&mut self, other: &ContextSet) {
        if other.0.is_empty() {
            return;
        }
        if self.0.is_empty() {
            self.0.extend_from_slice(&other.0);
            return;
        }
        let mut merged = Vec::with_capacity(self.0.len() + other.0.len());
        let (mut i, mut j) = (0, 0);
        while i < self.0.len() && j < other.0.len() {
            let (a, b) = (self.0[i], other.0[j]);
            if a <= b {
                merged.push(a);
                i += 1;
                if a == b {
                    j += 1;
                }
            } else {
                merged.push(b);
                j += 1;
            }
        }
        merged.extend_from_slice(&self.0[i..]);
        merged.extend_from_slice(&other.0[j..]);
        self.0 = merged;
    }

    pub fn iter(&self) -> impl Iterator<Item = ContextId> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Continuation position -> contexts to resume with.
pub type Callbacks = FxHashMap<ExprRef, ContextSet>;

#[derive(Clone, Default, Debug)]
pub struct Context {
    callbacks: Callbacks,
}

impl Context {
    pub fn add_context(&mut self, cont: ExprRef, ctx: ContextId) {
        self.callbacks.entry(cont).or_default().insert(ctx);
    }

    pub fn add_context_set(&mut self, cont: ExprRef, set: &ContextSet) {
        self.callbacks.entry(cont).or_default().extend_from(set);
    }

    /// Take over all continuations of `other`.
    pub fn merge(&mut self, other: &Context) {
        for (cont, set) in other.callbacks.iter() {
            self.add_context_set(*cont, set);
        }
    }

    pub fn callbacks(&self) -> impl Iterator<Item = (ExprRef, &ContextSet)> + '_ {
        self.callbacks.iter().map(|(e, s)| (*e, s))
    }
}

#[derive(Clone, Default)]
pub struct ContextArena {
    sealed: Vec<Context>,
    pending: Vec<Context>,
}

impl ContextArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_contexts(&self) -> usize {
        self.sealed.len() + self.pending.len()
    }

    pub fn alloc(&mut self) -> ContextId {
        let id = ContextId(self.num_contexts() as u32);
        self.pending.push(Context::default());
        id
    }

    /// Freeze everything allocated so far.
    pub fn seal(&mut self) {
        self.sealed.append(&mut self.pending);
    }

    #[inline(always)]
    pub fn is_sealed(&self, id: ContextId) -> bool {
        id.as_usize() < self.sealed.len()
    }

    #[inline(always)]
    pub fn get(&self, id: ContextId) -> &Context {
        assert!(
            self.is_sealed(id),
            "internal error: context {:?} read before it was sealed",
            id
        );
        &self.sealed[id.as_usize()]
    }

    /// Both halves at once: sealed contexts to read from, and the pending
    /// one `id` to write into.
    #[inline(always)]
    pub fn split(&mut self, id: ContextId) -> (&[Context], &mut Context) {
        let base = self.sealed.len();
        assert!(
            id.as_usize() >= base,
            "internal error: context {:?} written after it was sealed",
            id
        );
        (&self.sealed, &mut self.pending[id.as_usize() - base])
    }

    pub fn get_mut(&mut self, id: ContextId) -> &mut Context {
        self.split(id).1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[u32]) -> ContextSet {
        let mut s = ContextSet::default();
        for &i in ids {
            s.insert(ContextId(i));
        }
        s
    }

    #[test]
    fn test_context_set_is_sorted_and_unique() {
        let s = set(&[5, 1, 3, 1, 5]);
        assert_eq!(
            s.iter().collect::<Vec<_>>(),
            vec![ContextId(1), ContextId(3), ContextId(5)]
        );

        let mut a = set(&[1, 4, 9]);
        a.extend_from(&set(&[0, 4, 10]));
        assert_eq!(a, set(&[0, 1, 4, 9, 10]));
        a.extend_from(&ContextSet::default());
        assert_eq!(a.len(), 5);
    }

    #[test]
    fn test_arena_seal() {
        let mut arena = ContextArena::new();
        let a = arena.alloc();
        arena.seal();
        let b = arena.alloc();
        let cont = ExprRef::new(0, 7);
        arena.get_mut(b).add_context(cont, a);
        arena.seal();
        assert!(arena.is_sealed(b));
        let cbs = arena.get(b).callbacks().collect::<Vec<_>>();
        assert_eq!(cbs, vec![(cont, &ContextSet::single(a))]);
        assert_eq!(arena.get(a).callbacks().count(), 0);
        assert_eq!(arena.num_contexts(), 2);
    }

    #[test]
    #[should_panic(expected = "read before it was sealed")]
    fn test_pending_read_panics() {
        let mut arena = ContextArena::new();
        let a = arena.alloc();
        arena.get(a);
    }
}
