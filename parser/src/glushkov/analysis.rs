// Static analysis of a grammar in the style of the Glushkov construction:
// every terminal and every call site is a "position", and the grammar is
// described by which positions may start and end each expression, and by
// which positions may directly follow each other.  Rule bodies are only
// linked through call sets, never through pairs.

use std::collections::BTreeSet;

use anyhow::{bail, ensure, Result};
use rustc_hash::FxHashMap;

use super::{fixpoint::Fixpoint, ExprRef, Grammar, Node, RuleRef};

pub type PosSet = BTreeSet<ExprRef>;

/// `from` may be directly followed by `to` within one rule body.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Pair {
    pub from: ExprRef,
    pub to: ExprRef,
}

/// After `invoke` completes, control resumes at `cont`.  With `context`
/// unset, the continuation belongs to whoever made the call being analyzed;
/// otherwise it is pending inside the given rule, which was entered at the
/// same offset.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct CallEntry {
    pub context: Option<RuleRef>,
    pub cont: ExprRef,
    pub invoke: RuleRef,
}

pub struct Analyzer<'a> {
    grammar: &'a Grammar,
    nullable_fp: Fixpoint<bool>,
    rules_fp: Fixpoint<BTreeSet<RuleRef>>,
    call_fp: Fixpoint<BTreeSet<CallEntry>>,
    first_cache: FxHashMap<ExprRef, PosSet>,
    last_cache: FxHashMap<ExprRef, PosSet>,
}

impl<'a> Analyzer<'a> {
    /// Fails if the grammar uses a construct the analysis does not support.
    pub fn new(grammar: &'a Grammar) -> Result<Self> {
        validate(grammar)?;
        Ok(Analyzer {
            grammar,
            nullable_fp: Fixpoint::new(false),
            rules_fp: Fixpoint::new(BTreeSet::new()),
            call_fp: Fixpoint::new(BTreeSet::new()),
            first_cache: FxHashMap::default(),
            last_cache: FxHashMap::default(),
        })
    }

    pub fn grammar(&self) -> &'a Grammar {
        self.grammar
    }

    fn nullable_table(&mut self) -> &mut Fixpoint<bool> {
        &mut self.nullable_fp
    }

    fn rules_table(&mut self) -> &mut Fixpoint<BTreeSet<RuleRef>> {
        &mut self.rules_fp
    }

    fn call_table(&mut self) -> &mut Fixpoint<BTreeSet<CallEntry>> {
        &mut self.call_fp
    }

    fn fixpoint<V: Clone + PartialEq>(
        &mut self,
        key: ExprRef,
        table: fn(&mut Self) -> &mut Fixpoint<V>,
        compute: impl Fn(&mut Self) -> V,
    ) -> V {
        if let Some(v) = table(self).lookup(key) {
            return v;
        }
        loop {
            let outermost = table(self).enter(key);
            let value = compute(self);
            table(self).leave(key, value.clone());
            if !outermost || table(self).settle() {
                return value;
            }
        }
    }

    pub fn nullable(&mut self, e: ExprRef) -> bool {
        if self.grammar.is_terminal(e) {
            return false;
        }
        match self.grammar.node(e) {
            Node::Alt(l, r) => {
                let l = self.nullable(l);
                let r = self.nullable(r);
                l || r
            }
            Node::Seq(l, r) => {
                let l = self.nullable(l);
                let r = self.nullable(r);
                l && r
            }
            Node::Plus(c) => self.nullable(c),
            Node::Eps => true,
            Node::Call { rule, .. } => {
                let body = self.grammar.rule_body(rule);
                self.fixpoint(e, Self::nullable_table, move |a| a.nullable(body))
            }
            Node::Final => false,
            Node::Equal(_)
            | Node::LessOrEqual(_)
            | Node::GreaterOrEqual(_)
            | Node::Any
            | Node::Conj(..) => unsupported(self.grammar, e),
        }
    }

    pub fn first_set(&mut self, e: ExprRef) -> PosSet {
        if let Some(s) = self.first_cache.get(&e) {
            return s.clone();
        }
        let res = self.first_set_inner(e);
        self.first_cache.insert(e, res.clone());
        res
    }

    fn first_set_inner(&mut self, e: ExprRef) -> PosSet {
        if self.grammar.is_terminal(e) {
            return PosSet::from([e]);
        }
        match self.grammar.node(e) {
            Node::Alt(l, r) => {
                let mut res = self.first_set(l);
                res.extend(self.first_set(r));
                res
            }
            Node::Seq(l, r) => {
                let mut res = self.first_set(l);
                if self.nullable(l) {
                    res.extend(self.first_set(r));
                }
                res
            }
            Node::Plus(c) => self.first_set(c),
            Node::Eps => PosSet::new(),
            Node::Call { .. } | Node::Final => PosSet::from([e]),
            Node::Equal(_)
            | Node::LessOrEqual(_)
            | Node::GreaterOrEqual(_)
            | Node::Any
            | Node::Conj(..) => unsupported(self.grammar, e),
        }
    }

    pub fn last_set(&mut self, e: ExprRef) -> PosSet {
        if let Some(s) = self.last_cache.get(&e) {
            return s.clone();
        }
        let res = self.last_set_inner(e);
        self.last_cache.insert(e, res.clone());
        res
    }

    fn last_set_inner(&mut self, e: ExprRef) -> PosSet {
        if self.grammar.is_terminal(e) {
            return PosSet::from([e]);
        }
        match self.grammar.node(e) {
            Node::Alt(l, r) => {
                let mut res = self.last_set(l);
                res.extend(self.last_set(r));
                res
            }
            Node::Seq(l, r) => {
                let mut res = self.last_set(r);
                if self.nullable(r) {
                    res.extend(self.last_set(l));
                }
                res
            }
            Node::Plus(c) => self.last_set(c),
            Node::Eps => PosSet::new(),
            Node::Call { .. } | Node::Final => PosSet::from([e]),
            Node::Equal(_)
            | Node::LessOrEqual(_)
            | Node::GreaterOrEqual(_)
            | Node::Any
            | Node::Conj(..) => unsupported(self.grammar, e),
        }
    }

    pub fn pair_set(&mut self, e: ExprRef) -> BTreeSet<Pair> {
        let mut res = BTreeSet::new();
        self.add_pairs(e, &mut res);
        res
    }

    fn add_cross(&mut self, from: ExprRef, to: ExprRef, res: &mut BTreeSet<Pair>) {
        let last = self.last_set(from);
        let first = self.first_set(to);
        for &a in &last {
            for &b in &first {
                res.insert(Pair { from: a, to: b });
            }
        }
    }

    fn add_pairs(&mut self, e: ExprRef, res: &mut BTreeSet<Pair>) {
        if self.grammar.is_terminal(e) {
            return;
        }
        match self.grammar.node(e) {
            Node::Alt(l, r) => {
                self.add_pairs(l, res);
                self.add_pairs(r, res);
            }
            Node::Seq(l, r) => {
                self.add_pairs(l, res);
                self.add_pairs(r, res);
                self.add_cross(l, r, res);
            }
            Node::Plus(c) => {
                self.add_pairs(c, res);
                self.add_cross(c, c, res);
            }
            Node::Eps | Node::Call { .. } | Node::Final => {}
            Node::Equal(_)
            | Node::LessOrEqual(_)
            | Node::GreaterOrEqual(_)
            | Node::Any
            | Node::Conj(..) => unsupported(self.grammar, e),
        }
    }

    /// Continuations registered when control enters the call site `call`.
    pub fn call_set(&mut self, call: ExprRef) -> Result<BTreeSet<CallEntry>> {
        ensure!(
            self.grammar.is_call(call),
            "call_set() needs a rule call, got {}",
            self.grammar.expr_to_string(call)
        );
        Ok(self.call_set_inner(call))
    }

    pub(crate) fn call_set_inner(&mut self, call: ExprRef) -> BTreeSet<CallEntry> {
        self.fixpoint(call, Self::call_table, move |a| a.compute_call_set(call))
    }

    fn compute_call_set(&mut self, call: ExprRef) -> BTreeSet<CallEntry> {
        let rule = match self.grammar.call_rule(call) {
            Some(rule) => rule,
            None => unsupported(self.grammar, call),
        };
        let body = self.grammar.rule_body(rule);
        let mut res = BTreeSet::new();
        res.insert(CallEntry {
            context: None,
            cont: call,
            invoke: rule,
        });

        let last = self.last_set(body);
        let inner_calls = self
            .first_set(body)
            .into_iter()
            .filter(|&p| self.grammar.is_call(p))
            .collect::<Vec<_>>();

        for inner in inner_calls {
            // the body is exactly this call: it is an alias, so when the
            // inner rule finishes we can resume our own continuation
            let is_alias = last.contains(&inner);
            for entry in self.call_set_inner(inner) {
                res.insert(CallEntry {
                    context: Some(entry.context.unwrap_or(rule)),
                    ..entry
                });
                if is_alias && entry.context.is_none() {
                    res.insert(CallEntry {
                        context: None,
                        cont: call,
                        invoke: entry.invoke,
                    });
                }
            }
        }

        res
    }

    /// Rules reachable from `e`.
    pub fn rules(&mut self, e: ExprRef) -> BTreeSet<RuleRef> {
        if self.grammar.is_terminal(e) {
            return BTreeSet::new();
        }
        match self.grammar.node(e) {
            Node::Alt(l, r) | Node::Seq(l, r) => {
                let mut res = self.rules(l);
                res.extend(self.rules(r));
                res
            }
            Node::Plus(c) => self.rules(c),
            Node::Eps | Node::Final => BTreeSet::new(),
            Node::Call { rule, .. } => {
                let body = self.grammar.rule_body(rule);
                self.fixpoint(e, Self::rules_table, move |a| {
                    let mut res = a.rules(body);
                    res.insert(rule);
                    res
                })
            }
            Node::Equal(_)
            | Node::LessOrEqual(_)
            | Node::GreaterOrEqual(_)
            | Node::Any
            | Node::Conj(..) => unsupported(self.grammar, e),
        }
    }

    pub fn num_fixpoint_rounds(&self) -> usize {
        self.nullable_fp.num_rounds() + self.rules_fp.num_rounds() + self.call_fp.num_rounds()
    }

    pub fn num_settled_calls(&self) -> usize {
        self.call_fp.num_settled()
    }
}

/// Every shape reaching this point was supposed to be rejected by
/// `validate()`.
fn unsupported(grammar: &Grammar, e: ExprRef) -> ! {
    panic!(
        "internal error: unsupported grammar construct: {}",
        grammar.expr_to_string(e)
    )
}

/// Reject shapes the structural recursion cannot handle, before any of it
/// runs.  At the moment that is a conjunction over anything but terminals.
pub fn validate(grammar: &Grammar) -> Result<()> {
    for e in grammar.all_exprs() {
        if let Node::Conj(l, r) = grammar.node(e) {
            if !grammar.is_terminal(e) {
                let culprit = if grammar.is_terminal(l) { r } else { l };
                bail!(
                    "unsupported grammar construct: {} (conjunction operand {} is not a terminal)",
                    grammar.expr_to_string(e),
                    grammar.expr_to_string(culprit)
                );
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glushkov::Token;
    use crate::GrammarBuilder;

    fn t(c: char) -> Token {
        c as Token
    }

    #[test]
    fn test_sets_of_sequence() {
        let mut b = GrammarBuilder::new();
        let a = b.equal(t('a'));
        let bb = b.equal(t('b'));
        let mb = b.maybe(bb);
        let c = b.equal(t('c'));
        let root = b.join(&[a, mb, c]);
        let g = b.finalize(root).unwrap();
        let mut an = Analyzer::new(&g).unwrap();

        assert!(!an.nullable(g.root()));
        assert_eq!(an.first_set(g.root()), PosSet::from([a]));
        assert_eq!(an.last_set(g.root()), PosSet::from([c]));
        let pairs = an.pair_set(g.root());
        let expected = BTreeSet::from([
            Pair { from: a, to: bb },
            Pair { from: a, to: c },
            Pair { from: bb, to: c },
        ]);
        assert_eq!(pairs, expected);
    }

    #[test]
    fn test_plus_closes_loop() {
        let mut b = GrammarBuilder::new();
        let x = b.equal(t('x'));
        let y = b.equal(t('y'));
        let xy = b.seq(x, y);
        let root = b.star(xy);
        let g = b.finalize(root).unwrap();
        let mut an = Analyzer::new(&g).unwrap();

        assert!(an.nullable(g.root()));
        assert_eq!(an.first_set(g.root()), PosSet::from([x]));
        assert_eq!(an.last_set(g.root()), PosSet::from([y]));
        assert_eq!(
            an.pair_set(g.root()),
            BTreeSet::from([Pair { from: x, to: y }, Pair { from: y, to: x }])
        );
    }

    #[test]
    fn test_terminal_alt_is_one_position() {
        let mut b = GrammarBuilder::new();
        let x = b.equal(t('x'));
        let y = b.equal(t('y'));
        let root = b.alt(x, y);
        let g = b.finalize(root).unwrap();
        let mut an = Analyzer::new(&g).unwrap();
        assert_eq!(an.first_set(g.root()), PosSet::from([g.root()]));
        assert!(an.pair_set(g.root()).is_empty());
    }

    #[test]
    fn test_nullable_through_recursion() {
        // r ::= r r | eps
        let mut b = GrammarBuilder::new();
        let r = b.rule("r");
        let c1 = b.call(r);
        let c2 = b.call(r);
        let rr = b.seq(c1, c2);
        let eps = b.eps();
        let body = b.alt(rr, eps);
        b.set_body(r, body).unwrap();
        // s ::= s 'a', never nullable
        let s = b.rule("s");
        let c3 = b.call(s);
        let a = b.equal(t('a'));
        let body = b.seq(c3, a);
        b.set_body(s, body).unwrap();
        let cr = b.call(r);
        let cs = b.call(s);
        let root = b.alt(cr, cs);
        let g = b.finalize(root).unwrap();
        let mut an = Analyzer::new(&g).unwrap();

        assert!(an.nullable(cr));
        assert!(an.nullable(c1));
        assert!(!an.nullable(cs));
        assert!(an.nullable(g.root()));
        assert_eq!(an.rules(g.root()), BTreeSet::from([r, s]));
        assert_eq!(an.rules(cr), BTreeSet::from([r]));
    }

    #[test]
    fn test_call_set_of_right_recursion() {
        // list ::= 'a' list?
        let mut b = GrammarBuilder::new();
        let list = b.rule("list");
        let a = b.equal(t('a'));
        let rec = b.call(list);
        let tail = b.maybe(rec);
        let body = b.seq(a, tail);
        b.set_body(list, body).unwrap();
        let root = b.call(list);
        let g = b.finalize(root).unwrap();
        let mut an = Analyzer::new(&g).unwrap();

        assert_eq!(
            an.call_set(root).unwrap(),
            BTreeSet::from([CallEntry {
                context: None,
                cont: root,
                invoke: list
            }])
        );
        assert_eq!(an.first_set(body), PosSet::from([a]));
        assert_eq!(an.last_set(body), PosSet::from([a, rec]));
    }

    #[test]
    fn test_call_set_of_left_recursion() {
        // e ::= e '+' | 'x'
        let mut b = GrammarBuilder::new();
        let e = b.rule("e");
        let rec = b.call(e);
        let plus = b.equal(t('+'));
        let l = b.seq(rec, plus);
        let x = b.equal(t('x'));
        let body = b.alt(l, x);
        b.set_body(e, body).unwrap();
        let root = b.call(e);
        let g = b.finalize(root).unwrap();
        let mut an = Analyzer::new(&g).unwrap();

        assert_eq!(
            an.call_set(root).unwrap(),
            BTreeSet::from([
                CallEntry {
                    context: None,
                    cont: root,
                    invoke: e
                },
                CallEntry {
                    context: Some(e),
                    cont: rec,
                    invoke: e
                },
            ])
        );
    }

    #[test]
    fn test_alias_chain_of_three() {
        // a ::= b; b ::= c; c ::= 'x'
        let mut b = GrammarBuilder::new();
        let ra = b.rule("a");
        let rb = b.rule("b");
        let rc = b.rule("c");
        let cb = b.call(rb);
        b.set_body(ra, cb).unwrap();
        let cc = b.call(rc);
        b.set_body(rb, cc).unwrap();
        let x = b.equal(t('x'));
        b.set_body(rc, x).unwrap();
        let root = b.call(ra);
        let g = b.finalize(root).unwrap();
        let mut an = Analyzer::new(&g).unwrap();

        let cs = an.call_set(root).unwrap();
        for invoke in [ra, rb, rc] {
            assert!(
                cs.contains(&CallEntry {
                    context: None,
                    cont: root,
                    invoke
                }),
                "missing direct continuation for {:?} in {:?}",
                invoke,
                cs
            );
        }
        assert!(cs.contains(&CallEntry {
            context: Some(ra),
            cont: cb,
            invoke: rb
        }));
        // pending inside b, which was entered at the same offset
        assert!(cs.contains(&CallEntry {
            context: Some(rb),
            cont: cc,
            invoke: rc
        }));
        assert_eq!(an.num_settled_calls(), 3);
        assert!(an.call_set(x).is_err());
    }

    #[test]
    fn test_mutual_alias_terminates() {
        // a ::= b | 'x'; b ::= a | 'y'
        let mut b = GrammarBuilder::new();
        let ra = b.rule("a");
        let rb = b.rule("b");
        let cb = b.call(rb);
        let x = b.equal(t('x'));
        let body = b.alt(cb, x);
        b.set_body(ra, body).unwrap();
        let ca = b.call(ra);
        let y = b.equal(t('y'));
        let body = b.alt(ca, y);
        b.set_body(rb, body).unwrap();
        let root = b.call(ra);
        let g = b.finalize(root).unwrap();
        let mut an = Analyzer::new(&g).unwrap();

        let cs = an.call_set(root).unwrap();
        assert!(cs.contains(&CallEntry {
            context: None,
            cont: root,
            invoke: rb
        }));
        assert!(cs.contains(&CallEntry {
            context: Some(rb),
            cont: ca,
            invoke: ra
        }));
        assert_eq!(an.rules(root), BTreeSet::from([ra, rb]));
    }

    #[test]
    fn test_conj_over_non_terminal_is_rejected() {
        let mut b = GrammarBuilder::new();
        let ab = b.literal("ab");
        let any = b.any();
        let root = b.conj(ab, any);
        let g = b.finalize(root).unwrap();
        let err = Analyzer::new(&g).err().unwrap();
        let msg = err.to_string();
        assert!(msg.starts_with("unsupported grammar construct:"), "{}", msg);
        assert!(msg.contains("seq(eq('a'), eq('b'))"), "{}", msg);
    }

    #[test]
    fn test_conj_over_rule_call_is_rejected() {
        let mut b = GrammarBuilder::new();
        let r = b.rule("r");
        let x = b.equal(t('x'));
        b.set_body(r, x).unwrap();
        let c = b.call(r);
        let any = b.any();
        let root = b.conj(any, c);
        let g = b.finalize(root).unwrap();
        let err = Analyzer::new(&g).err().unwrap();
        assert!(err.to_string().contains("<r_0>"), "{}", err);
    }
}
