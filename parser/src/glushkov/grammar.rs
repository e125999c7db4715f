use std::fmt::Debug;

use anyhow::{bail, Result};

/// Tokens are opaque integral codes; the recognizer never interprets them
/// beyond the comparisons of the terminal predicates.
pub type Token = u32;

/// Handle to an expression node.  Every node has its own identity, which is
/// what the analysis keys all of its sets on.  Handles remember the builder
/// that created them, so they cannot be mixed up between grammars.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprRef {
    grammar_id: u32,
    idx: u32,
}

impl ExprRef {
    #[inline(always)]
    pub(crate) fn new(grammar_id: u32, idx: usize) -> Self {
        ExprRef {
            grammar_id,
            idx: idx as u32,
        }
    }

    #[inline(always)]
    pub fn as_usize(&self) -> usize {
        self.idx as usize
    }

    #[inline(always)]
    pub(crate) fn grammar_id(&self) -> u32 {
        self.grammar_id
    }
}

impl Debug for ExprRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.idx)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RuleRef {
    grammar_id: u32,
    idx: u32,
}

impl RuleRef {
    #[inline(always)]
    pub(crate) fn new(grammar_id: u32, idx: usize) -> Self {
        RuleRef {
            grammar_id,
            idx: idx as u32,
        }
    }

    #[inline(always)]
    pub fn as_usize(&self) -> usize {
        self.idx as usize
    }

    #[inline(always)]
    pub(crate) fn grammar_id(&self) -> u32 {
        self.grammar_id
    }
}

impl Debug for RuleRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "R{}", self.idx)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Node {
    // Terminals:
    Equal(Token),
    LessOrEqual(Token),
    GreaterOrEqual(Token),
    Any,

    // Composites:
    Eps,
    Alt(ExprRef, ExprRef),
    Seq(ExprRef, ExprRef),
    /// Only valid over terminal operands.
    Conj(ExprRef, ExprRef),
    Plus(ExprRef),
    /// A call site; `site` numbers the calls of one rule.
    Call { rule: RuleRef, site: u32 },

    /// Acceptance sentinel; matches no token.
    Final,
}

#[derive(Clone, Debug)]
pub(crate) struct NodeData {
    pub node: Node,
    pub terminal: bool,
}

/// A rule as declared in the builder; the body arrives later.
#[derive(Clone, Debug)]
pub(crate) struct RuleDecl {
    pub name: String,
    pub body: Option<ExprRef>,
    pub num_calls: u32,
}

#[derive(Clone, Debug)]
struct RuleData {
    name: String,
    body: ExprRef,
}

/// A finalized grammar: an arena of expression nodes, the rules whose bodies
/// live in that arena, the root expression, and the `Final` sentinel.
#[derive(Clone)]
pub struct Grammar {
    grammar_id: u32,
    nodes: Vec<NodeData>,
    rules: Vec<RuleData>,
    root: ExprRef,
    final_expr: ExprRef,
}

impl Grammar {
    pub(crate) fn from_parts(
        grammar_id: u32,
        mut nodes: Vec<NodeData>,
        decls: Vec<RuleDecl>,
        root: ExprRef,
    ) -> Result<Self> {
        let mut rules = Vec::with_capacity(decls.len());
        for decl in decls {
            match decl.body {
                Some(body) => rules.push(RuleData {
                    name: decl.name,
                    body,
                }),
                None => bail!("rule <{}> has no body", decl.name),
            }
        }
        let final_expr = ExprRef::new(grammar_id, nodes.len());
        nodes.push(NodeData {
            node: Node::Final,
            terminal: false,
        });
        Ok(Grammar {
            grammar_id,
            nodes,
            rules,
            root,
            final_expr,
        })
    }

    pub fn root(&self) -> ExprRef {
        self.root
    }

    pub fn final_expr(&self) -> ExprRef {
        self.final_expr
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn num_rules(&self) -> usize {
        self.rules.len()
    }

    pub fn all_rules(&self) -> impl Iterator<Item = RuleRef> + '_ {
        (0..self.rules.len()).map(|idx| RuleRef::new(self.grammar_id, idx))
    }

    #[inline(always)]
    pub fn node(&self, e: ExprRef) -> Node {
        self.nodes[e.as_usize()].node
    }

    #[inline(always)]
    pub fn is_terminal(&self, e: ExprRef) -> bool {
        self.nodes[e.as_usize()].terminal
    }

    #[inline(always)]
    pub fn is_call(&self, e: ExprRef) -> bool {
        matches!(self.node(e), Node::Call { .. })
    }

    pub fn call_rule(&self, e: ExprRef) -> Option<RuleRef> {
        match self.node(e) {
            Node::Call { rule, .. } => Some(rule),
            _ => None,
        }
    }

    pub fn rule_name(&self, rule: RuleRef) -> &str {
        &self.rules[rule.as_usize()].name
    }

    pub fn rule_body(&self, rule: RuleRef) -> ExprRef {
        self.rules[rule.as_usize()].body
    }

    pub fn rule_by_name(&self, name: &str) -> Option<RuleRef> {
        self.rules
            .iter()
            .position(|r| r.name == name)
            .map(|idx| RuleRef::new(self.grammar_id, idx))
    }

    pub fn all_exprs(&self) -> impl Iterator<Item = ExprRef> + '_ {
        (0..self.nodes.len()).map(|idx| ExprRef::new(self.grammar_id, idx))
    }

    /// Terminal positions and call sites in the tree rooted at `e`, in
    /// left-to-right order.  Children of terminal alternatives and
    /// conjunctions are part of their parent's position.
    pub fn positions(&self, e: ExprRef) -> Vec<ExprRef> {
        let mut res = vec![];
        let mut todo = vec![e];
        while let Some(e) = todo.pop() {
            if self.is_terminal(e) || self.is_call(e) {
                res.push(e);
                continue;
            }
            match self.node(e) {
                Node::Alt(l, r) | Node::Seq(l, r) | Node::Conj(l, r) => {
                    todo.push(r);
                    todo.push(l);
                }
                Node::Plus(c) => todo.push(c),
                _ => {}
            }
        }
        res
    }

    /// Does the terminal predicate at `e` accept `token`?
    /// Only terminals and `Final` may be asked.
    pub fn matches(&self, e: ExprRef, token: Token) -> bool {
        match self.node(e) {
            Node::Equal(v) => token == v,
            Node::LessOrEqual(v) => token <= v,
            Node::GreaterOrEqual(v) => token >= v,
            Node::Any => true,
            Node::Alt(l, r) => self.matches(l, token) || self.matches(r, token),
            Node::Conj(l, r) => self.matches(l, token) && self.matches(r, token),
            Node::Final => false,
            Node::Eps | Node::Seq(..) | Node::Plus(_) | Node::Call { .. } => {
                panic!(
                    "internal error: {} is not a terminal position",
                    self.expr_to_string(e)
                )
            }
        }
    }

    pub fn call_name(&self, e: ExprRef) -> String {
        match self.node(e) {
            Node::Call { rule, site } => format!("{}_{}", self.rule_name(rule), site),
            _ => self.expr_to_string(e),
        }
    }

    pub fn expr_to_string(&self, e: ExprRef) -> String {
        match self.node(e) {
            Node::Equal(v) => format!("eq({})", token_to_string(v)),
            Node::LessOrEqual(v) => format!("le({})", token_to_string(v)),
            Node::GreaterOrEqual(v) => format!("ge({})", token_to_string(v)),
            Node::Any => "any".to_string(),
            Node::Eps => "eps".to_string(),
            Node::Alt(l, r) => format!(
                "alt({}, {})",
                self.expr_to_string(l),
                self.expr_to_string(r)
            ),
            Node::Seq(l, r) => format!(
                "seq({}, {})",
                self.expr_to_string(l),
                self.expr_to_string(r)
            ),
            Node::Conj(l, r) => format!(
                "conj({}, {})",
                self.expr_to_string(l),
                self.expr_to_string(r)
            ),
            Node::Plus(c) => format!("plus({})", self.expr_to_string(c)),
            Node::Call { .. } => format!("<{}>", self.call_name(e)),
            Node::Final => "$final".to_string(),
        }
    }

    pub fn rule_to_string(&self, rule: RuleRef) -> String {
        format!(
            "{} ::= {}",
            self.rule_name(rule),
            self.expr_to_string(self.rule_body(rule))
        )
    }
}

pub(crate) fn token_to_string(v: Token) -> String {
    match char::from_u32(v) {
        Some(c) if c.is_ascii_graphic() => format!("{:?}", c),
        _ => format!("{}", v),
    }
}
