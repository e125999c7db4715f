// Online recognizer over the tables of a `CGrammar`.
//
// The state after each token is a frontier of entries: a terminal position
// that may match the next token, together with the contexts to continue
// with once the rule owning that position completes.  A step matches the
// token against every entry, follows the transitions of the matched
// positions, and enters the rules whose call sites were reached.

use std::sync::Arc;

use instant::Instant;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::{
    compiled::CGrammar,
    context::{ContextArena, ContextId, ContextSet},
    ExprRef, RuleRef, Token,
};
use crate::{api::ParseResult, api::ParserOptions, infoln, warn, Logger};

const TRACE: bool = false;
const DEBUG: bool = true;

macro_rules! trace {
    ($($arg:tt)*) => {
        if cfg!(feature = "logging") && TRACE {
            eprintln!($($arg)*);
        }
    }
}

macro_rules! debug {
    ($($arg:tt)*) => {
        if cfg!(feature = "logging") && DEBUG {
            eprintln!($($arg)*);
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct ParserStats {
    pub steps: usize,
    pub matched_entries: usize,
    pub largest_frontier: usize,
    pub contexts: usize,
    pub compute_time_us: u64,
}

impl ParserStats {
    pub fn max(&self, other: &ParserStats) -> ParserStats {
        ParserStats {
            steps: self.steps.max(other.steps),
            matched_entries: self.matched_entries.max(other.matched_entries),
            largest_frontier: self.largest_frontier.max(other.largest_frontier),
            contexts: self.contexts.max(other.contexts),
            compute_time_us: self.compute_time_us.max(other.compute_time_us),
        }
    }
}

type Entries = FxHashMap<ExprRef, ContextSet>;

/// Scratch state of one offset.
#[derive(Default)]
struct Step {
    terminals: Entries,
    // one context per rule entered at this offset
    calls: FxHashMap<RuleRef, ContextId>,
}

impl Step {
    fn rule_context(&mut self, contexts: &mut ContextArena, rule: RuleRef) -> ContextId {
        *self.calls.entry(rule).or_insert_with(|| contexts.alloc())
    }
}

#[derive(Clone)]
pub struct Parser {
    grammar: Arc<CGrammar>,
    options: ParserOptions,
    contexts: ContextArena,
    entries: Entries,
    offset: usize,
    rejected_at: Option<usize>,
    stats: ParserStats,
    pub logger: Logger,
}

impl Parser {
    pub fn new(grammar: Arc<CGrammar>, options: ParserOptions, logger: Logger) -> Self {
        let mut contexts = ContextArena::new();
        let root = contexts.alloc();
        contexts.seal();

        let mut r = Parser {
            grammar,
            options,
            contexts,
            entries: Entries::default(),
            offset: 0,
            rejected_at: None,
            stats: ParserStats::default(),
            logger,
        };

        let mut step = Step::default();
        let root_set = ContextSet::single(root);
        let grammar = r.grammar.clone();
        for &e in grammar.root_first() {
            r.accept(&mut step, e, &root_set);
        }
        r.finish_step(step);
        r
    }

    pub fn grammar(&self) -> &Arc<CGrammar> {
        &self.grammar
    }

    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    pub fn stats(&self) -> &ParserStats {
        &self.stats
    }

    /// Number of tokens consumed so far; a rejected token does not count.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Index of the first token that could not be consumed.
    pub fn rejected_at(&self) -> Option<usize> {
        self.rejected_at
    }

    pub fn is_rejected(&self) -> bool {
        self.rejected_at.is_some()
    }

    /// Number of entries in the current frontier.
    pub fn num_entries(&self) -> usize {
        self.entries.len()
    }

    /// Whether the tokens consumed so far form a sentence of the grammar.
    pub fn is_accepting(&self) -> bool {
        if self.is_rejected() {
            false
        } else if self.offset == 0 {
            self.grammar.root_nullable()
        } else {
            self.entries
                .contains_key(&self.grammar.grammar().final_expr())
        }
    }

    /// Advance by one token.  Returns false if the token cannot be
    /// consumed; the parser is then rejected and ignores further tokens.
    pub fn consume_token(&mut self, token: Token) -> bool {
        if let Some(pos) = self.rejected_at {
            warn!(
                self,
                "token {} ignored; input already rejected at offset {}",
                super::grammar::token_to_string(token),
                pos
            );
            return false;
        }

        let t0 = Instant::now();
        let entries = std::mem::take(&mut self.entries);
        let mut step = Step::default();
        for (&e, set) in entries.iter() {
            self.process_entry(&mut step, e, set, token);
        }
        self.finish_step(step);

        let pos = self.offset;
        self.stats.steps += 1;
        self.stats.compute_time_us += t0.elapsed().as_micros() as u64;

        if self.options.trace_steps {
            self.trace_frontier(pos + 1, token);
        }

        if self.entries.is_empty() {
            self.rejected_at = Some(pos);
            infoln!(
                self,
                "rejected token {} at offset {}",
                super::grammar::token_to_string(token),
                pos
            );
            false
        } else {
            self.offset += 1;
            true
        }
    }

    /// Result for the tokens consumed so far.
    pub fn finish(&self) -> ParseResult {
        if let Some(offset) = self.rejected_at {
            ParseResult::Reject { offset }
        } else if self.is_accepting() {
            ParseResult::Accept
        } else {
            ParseResult::Reject {
                offset: self.offset,
            }
        }
    }

    pub fn parse(&mut self, tokens: &[Token]) -> ParseResult {
        for &t in tokens {
            if !self.consume_token(t) {
                break;
            }
        }
        self.finish()
    }

    pub fn recognize(&mut self, tokens: &[Token]) -> bool {
        self.parse(tokens).is_accept()
    }

    fn process_entry(&mut self, step: &mut Step, e: ExprRef, set: &ContextSet, token: Token) {
        let grammar = self.grammar.clone();
        if !grammar.matches(e, token) {
            return;
        }
        self.stats.matched_entries += 1;
        debug!(
            "  match {} with {} contexts",
            grammar.grammar().expr_to_string(e),
            set.len()
        );

        for &next in grammar.transitions(e) {
            self.accept(step, next, set);
        }

        if grammar.in_tail_position(e) {
            // the rule owning `e` completes here; resume its callers
            let mut resumed = vec![];
            for ctx in set.iter() {
                for (cont, cont_set) in self.contexts.get(ctx).callbacks() {
                    resumed.push((cont, cont_set.clone()));
                }
            }
            for (cont, cont_set) in resumed {
                for &next in grammar.transitions(cont) {
                    self.accept(step, next, &cont_set);
                }
            }
        }
    }

    fn accept(&mut self, step: &mut Step, e: ExprRef, set: &ContextSet) {
        let grammar = self.grammar.clone();
        if !grammar.is_call(e) {
            step.terminals.entry(e).or_default().extend_from(set);
            return;
        }

        trace!("  enter {}", grammar.grammar().expr_to_string(e));
        for entry in grammar.call_entries(e) {
            let target = step.rule_context(&mut self.contexts, entry.invoke);
            match entry.context {
                Some(rule) => {
                    let src = step.rule_context(&mut self.contexts, rule);
                    self.contexts.get_mut(target).add_context(entry.cont, src);
                }
                None => {
                    self.contexts
                        .get_mut(target)
                        .add_context_set(entry.cont, set);
                }
            }
        }

        if grammar.in_tail_position(e) {
            // the callee completes whenever the caller does, so it can
            // resume the caller's continuations directly
            for &child in grammar.direct_rule_children(e) {
                let target = step.rule_context(&mut self.contexts, child);
                let (sealed, ctx) = self.contexts.split(target);
                for src in set.iter() {
                    ctx.merge(&sealed[src.as_usize()]);
                }
            }
        }
    }

    fn finish_step(&mut self, mut step: Step) {
        let grammar = self.grammar.clone();
        for (&rule, &ctx) in step.calls.iter() {
            for &term in grammar.rule_term_first(rule) {
                step.terminals.entry(term).or_default().insert(ctx);
            }
        }
        self.contexts.seal();
        self.entries = step.terminals;
        self.stats.contexts = self.contexts.num_contexts();
        self.stats.largest_frontier = self.stats.largest_frontier.max(self.entries.len());
    }

    fn trace_frontier(&mut self, step: usize, token: Token) {
        let grammar = self.grammar.clone();
        let g = grammar.grammar();
        let mut keys = self.entries.keys().copied().collect::<Vec<_>>();
        keys.sort();
        infoln!(
            self,
            "step {} token {}: {} entries, {} contexts",
            step,
            super::grammar::token_to_string(token),
            keys.len(),
            self.contexts.num_contexts()
        );
        for e in keys {
            let n = self.entries[&e].len();
            infoln!(self, "  {} x{}", g.expr_to_string(e), n);
        }
    }
}
