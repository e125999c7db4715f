use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::{ensure, Result};

use crate::glushkov::{ExprRef, Grammar, Node, NodeData, RuleDecl, RuleRef, Token};

/// Builds grammars out of combinators.
///
/// Nodes are linear: the first time a node is used as an operand it is
/// installed in place; any later use installs a structural copy instead.
/// This way two occurrences of "the same" sub-grammar are always distinct
/// positions, and `ExprRef` can stay `Copy` without the caller having to
/// think about it.
///
/// Rules are built in two phases: `rule()` declares a rule, `call()` creates
/// call sites for it (possibly before the body exists), and `set_body()`
/// assigns the body exactly once.
pub struct GrammarBuilder {
    grammar_id: u32,
    nodes: Vec<NodeData>,
    installed: Vec<bool>,
    rules: Vec<RuleDecl>,
}

impl Default for GrammarBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GrammarBuilder {
    pub fn new() -> Self {
        static COUNTER: AtomicU32 = AtomicU32::new(1);
        GrammarBuilder {
            grammar_id: COUNTER.fetch_add(1, Ordering::Relaxed),
            nodes: vec![],
            installed: vec![],
            rules: vec![],
        }
    }

    fn add_node(&mut self, node: Node) -> ExprRef {
        let terminal = match node {
            Node::Equal(_) | Node::LessOrEqual(_) | Node::GreaterOrEqual(_) | Node::Any => true,
            Node::Alt(l, r) | Node::Conj(l, r) => self.is_terminal(l) && self.is_terminal(r),
            Node::Eps | Node::Seq(..) | Node::Plus(_) | Node::Call { .. } | Node::Final => false,
        };
        let r = ExprRef::new(self.grammar_id, self.nodes.len());
        self.nodes.push(NodeData { node, terminal });
        self.installed.push(false);
        r
    }

    fn owns(&self, e: ExprRef) -> bool {
        e.grammar_id() == self.grammar_id && e.as_usize() < self.nodes.len()
    }

    fn owns_rule(&self, rule: RuleRef) -> bool {
        rule.grammar_id() == self.grammar_id && rule.as_usize() < self.rules.len()
    }

    fn check(&self, e: ExprRef) {
        assert!(self.owns(e), "node {:?} does not belong to this builder", e);
    }

    fn check_rule(&self, rule: RuleRef) {
        assert!(
            self.owns_rule(rule),
            "rule {:?} does not belong to this builder",
            rule
        );
    }

    pub fn node(&self, e: ExprRef) -> Node {
        self.check(e);
        self.nodes[e.as_usize()].node
    }

    pub fn is_terminal(&self, e: ExprRef) -> bool {
        self.check(e);
        self.nodes[e.as_usize()].terminal
    }

    pub fn is_installed(&self, e: ExprRef) -> bool {
        self.check(e);
        self.installed[e.as_usize()]
    }

    /// Transfer ownership of `e` to a new parent: `e` itself on first use,
    /// a fresh copy afterwards.
    pub fn consume(&mut self, e: ExprRef) -> ExprRef {
        let e = if self.is_installed(e) {
            self.copy(e)
        } else {
            e
        };
        self.installed[e.as_usize()] = true;
        e
    }

    /// Structural copy; children are consumed, and hence copied too.
    pub fn copy(&mut self, e: ExprRef) -> ExprRef {
        let node = match self.node(e) {
            n @ (Node::Equal(_)
            | Node::LessOrEqual(_)
            | Node::GreaterOrEqual(_)
            | Node::Any
            | Node::Eps
            | Node::Final) => n,
            Node::Alt(l, r) => Node::Alt(self.consume(l), self.consume(r)),
            Node::Seq(l, r) => Node::Seq(self.consume(l), self.consume(r)),
            Node::Conj(l, r) => Node::Conj(self.consume(l), self.consume(r)),
            Node::Plus(c) => Node::Plus(self.consume(c)),
            Node::Call { rule, .. } => return self.call(rule),
        };
        self.add_node(node)
    }

    pub fn equal(&mut self, tok: Token) -> ExprRef {
        self.add_node(Node::Equal(tok))
    }

    pub fn less_or_equal(&mut self, tok: Token) -> ExprRef {
        self.add_node(Node::LessOrEqual(tok))
    }

    pub fn greater_or_equal(&mut self, tok: Token) -> ExprRef {
        self.add_node(Node::GreaterOrEqual(tok))
    }

    pub fn any(&mut self) -> ExprRef {
        self.add_node(Node::Any)
    }

    pub fn eps(&mut self) -> ExprRef {
        self.add_node(Node::Eps)
    }

    /// `a | b`
    pub fn alt(&mut self, a: ExprRef, b: ExprRef) -> ExprRef {
        let a = self.consume(a);
        let b = self.consume(b);
        self.add_node(Node::Alt(a, b))
    }

    /// `a >> b`
    pub fn seq(&mut self, a: ExprRef, b: ExprRef) -> ExprRef {
        let a = self.consume(a);
        let b = self.consume(b);
        self.add_node(Node::Seq(a, b))
    }

    /// `a & b`; both operands have to be terminals, which is checked when
    /// the grammar is analyzed.
    pub fn conj(&mut self, a: ExprRef, b: ExprRef) -> ExprRef {
        let a = self.consume(a);
        let b = self.consume(b);
        self.add_node(Node::Conj(a, b))
    }

    pub fn plus(&mut self, e: ExprRef) -> ExprRef {
        let e = self.consume(e);
        self.add_node(Node::Plus(e))
    }

    pub fn maybe(&mut self, e: ExprRef) -> ExprRef {
        let eps = self.eps();
        self.alt(e, eps)
    }

    pub fn star(&mut self, e: ExprRef) -> ExprRef {
        let p = self.plus(e);
        self.maybe(p)
    }

    /// Alternation of all the options; an empty list is `eps`.
    pub fn select(&mut self, options: &[ExprRef]) -> ExprRef {
        match options.split_first() {
            None => self.eps(),
            Some((&first, rest)) => rest.iter().fold(first, |acc, &e| self.alt(acc, e)),
        }
    }

    /// Sequence of all the values; an empty list is `eps`.
    pub fn join(&mut self, values: &[ExprRef]) -> ExprRef {
        match values.split_first() {
            None => self.eps(),
            Some((&first, rest)) => rest.iter().fold(first, |acc, &e| self.seq(acc, e)),
        }
    }

    /// The tokens of `s`, one `equal` per char.
    pub fn literal(&mut self, s: &str) -> ExprRef {
        let toks = s
            .chars()
            .map(|c| self.equal(c as Token))
            .collect::<Vec<_>>();
        self.join(&toks)
    }

    /// Tokens in `lo..=hi`.
    pub fn token_range(&mut self, lo: Token, hi: Token) -> ExprRef {
        let ge = self.greater_or_equal(lo);
        let le = self.less_or_equal(hi);
        self.conj(ge, le)
    }

    pub fn rule(&mut self, name: &str) -> RuleRef {
        let r = RuleRef::new(self.grammar_id, self.rules.len());
        self.rules.push(RuleDecl {
            name: name.to_string(),
            body: None,
            num_calls: 0,
        });
        r
    }

    /// A fresh call site of `rule`.
    pub fn call(&mut self, rule: RuleRef) -> ExprRef {
        self.check_rule(rule);
        let decl = &mut self.rules[rule.as_usize()];
        let site = decl.num_calls;
        decl.num_calls += 1;
        self.add_node(Node::Call { rule, site })
    }

    pub fn has_body(&self, rule: RuleRef) -> bool {
        self.check_rule(rule);
        self.rules[rule.as_usize()].body.is_some()
    }

    pub fn set_body(&mut self, rule: RuleRef, body: ExprRef) -> Result<()> {
        ensure!(
            self.owns_rule(rule),
            "rule {:?} does not belong to this builder",
            rule
        );
        ensure!(
            self.owns(body),
            "body {:?} does not belong to this builder",
            body
        );
        ensure!(
            !self.has_body(rule),
            "rule <{}> already has a body",
            self.rules[rule.as_usize()].name
        );
        let body = self.consume(body);
        self.rules[rule.as_usize()].body = Some(body);
        Ok(())
    }

    /// Declare a rule and build its body in one go; the closure gets the
    /// rule handle, so the body may call the rule recursively.
    pub fn define(
        &mut self,
        name: &str,
        f: impl FnOnce(&mut Self, RuleRef) -> ExprRef,
    ) -> Result<RuleRef> {
        let rule = self.rule(name);
        let body = f(self, rule);
        self.set_body(rule, body)?;
        Ok(rule)
    }

    pub fn finalize(mut self, root: ExprRef) -> Result<Grammar> {
        ensure!(
            self.owns(root),
            "root {:?} does not belong to this builder",
            root
        );
        let root = self.consume(root);
        Grammar::from_parts(self.grammar_id, self.nodes, self.rules, root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reuse_makes_copies() {
        let mut b = GrammarBuilder::new();
        let a = b.equal('a' as Token);
        let s = b.seq(a, a);
        let Node::Seq(l, r) = b.node(s) else {
            panic!("expected seq");
        };
        assert_eq!(l, a);
        assert_ne!(r, a);
        assert_eq!(b.node(r), Node::Equal('a' as Token));
        assert!(b.is_installed(l) && b.is_installed(r));
    }

    #[test]
    fn test_copy_is_deep() {
        let mut b = GrammarBuilder::new();
        let x = b.literal("xy");
        let p = b.plus(x);
        let q = b.alt(p, p);
        let Node::Alt(l, r) = b.node(q) else {
            panic!("expected alt");
        };
        let (Node::Plus(lc), Node::Plus(rc)) = (b.node(l), b.node(r)) else {
            panic!("expected plus");
        };
        assert_ne!(lc, rc);
        let (Node::Seq(l1, l2), Node::Seq(r1, r2)) = (b.node(lc), b.node(rc)) else {
            panic!("expected seq");
        };
        assert_ne!(l1, r1);
        assert_ne!(l2, r2);
        assert_eq!(b.node(l2), b.node(r2));
    }

    #[test]
    fn test_copied_calls_get_new_sites() {
        let mut b = GrammarBuilder::new();
        let r = b.rule("r");
        let c = b.call(r);
        let s = b.seq(c, c);
        let Node::Seq(l, rr) = b.node(s) else {
            panic!("expected seq");
        };
        assert_eq!(b.node(l), Node::Call { rule: r, site: 0 });
        assert_eq!(b.node(rr), Node::Call { rule: r, site: 1 });
    }

    #[test]
    fn test_terminal_flags() {
        let mut b = GrammarBuilder::new();
        let a = b.equal(1);
        let c = b.any();
        let alt = b.alt(a, c);
        assert!(b.is_terminal(alt));
        let cls = b.token_range(10, 20);
        assert!(b.is_terminal(cls));
        let e = b.eps();
        let m = b.alt(cls, e);
        assert!(!b.is_terminal(m));
        let s = b.literal("ab");
        assert!(!b.is_terminal(s));
        let mixed = b.conj(s, alt);
        assert!(!b.is_terminal(mixed));
    }

    #[test]
    fn test_rule_body_once() {
        let mut b = GrammarBuilder::new();
        let r = b.rule("r");
        let a = b.equal(1);
        b.set_body(r, a).unwrap();
        let a2 = b.equal(2);
        let err = b.set_body(r, a2).unwrap_err();
        assert!(err.to_string().contains("already has a body"), "{}", err);
    }

    #[test]
    fn test_missing_body() {
        let mut b = GrammarBuilder::new();
        let r = b.rule("dangling");
        let root = b.call(r);
        let err = b.finalize(root).err().unwrap();
        assert!(err.to_string().contains("<dangling> has no body"), "{}", err);
    }

    #[test]
    fn test_foreign_handles() {
        let mut a = GrammarBuilder::new();
        let x = a.equal('x' as Token);
        let y = a.equal('y' as Token);
        let from_a = a.seq(x, y);
        let ra = a.rule("ra");

        let mut b = GrammarBuilder::new();
        let z = b.literal("zzzz");
        let rb = b.rule("rb");
        let err = b.set_body(ra, z).unwrap_err();
        assert!(err.to_string().contains("does not belong"), "{}", err);
        let err = b.set_body(rb, from_a).unwrap_err();
        assert!(err.to_string().contains("does not belong"), "{}", err);
        let err = b.finalize(from_a).err().unwrap();
        assert!(err.to_string().contains("does not belong"), "{}", err);
    }

    #[test]
    #[should_panic(expected = "does not belong to this builder")]
    fn test_foreign_operand_panics() {
        let mut a = GrammarBuilder::new();
        let x = a.literal("xy");
        let mut b = GrammarBuilder::new();
        let _z = b.literal("zzzz");
        b.plus(x);
    }

    #[test]
    #[should_panic(expected = "does not belong to this builder")]
    fn test_foreign_rule_call_panics() {
        let mut a = GrammarBuilder::new();
        let r = a.rule("r");
        let mut b = GrammarBuilder::new();
        b.call(r);
    }

    #[test]
    fn test_define_recursive() {
        let mut b = GrammarBuilder::new();
        let list = b
            .define("list", |b, list| {
                let a = b.equal('a' as Token);
                let rec = b.call(list);
                let tail = b.maybe(rec);
                b.seq(a, tail)
            })
            .unwrap();
        let root = b.call(list);
        let g = b.finalize(root).unwrap();
        assert_eq!(
            g.rule_to_string(list),
            "list ::= seq(eq('a'), alt(<list_0>, eps))"
        );
        assert_eq!(g.expr_to_string(g.root()), "<list_1>");
    }
}
