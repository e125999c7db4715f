use std::fmt::Write;

use anyhow::Result;
use instant::Instant;
use serde::{Deserialize, Serialize};

use super::{
    analysis::{Analyzer, CallEntry},
    ExprRef, Grammar, RuleRef, Token,
};
use crate::{api::ParserOptions, loginfo, Logger};

/// Derived tables the recognizer runs on.  Immutable once built, and shared
/// between parsers through an `Arc`.
#[derive(Clone)]
pub struct CGrammar {
    grammar: Grammar,
    rules: Vec<RuleRef>,
    // indexed by ExprRef
    transitions: Vec<Vec<ExprRef>>,
    in_tail_position: Vec<bool>,
    call_entries: Vec<Vec<CallEntry>>,
    direct_rule_children: Vec<Vec<RuleRef>>,
    // indexed by RuleRef
    rule_term_first: Vec<Vec<ExprRef>>,
    root_first: Vec<ExprRef>,
    root_nullable: bool,
    stats: CGrammarStats,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CGrammarStats {
    pub rules: usize,
    pub positions: usize,
    pub transitions: usize,
    pub call_entries: usize,
    pub pruned_call_entries: usize,
    pub fixpoint_rounds: usize,
    pub compile_time_us: u64,
}

fn add_unique(v: &mut Vec<ExprRef>, e: ExprRef) {
    if !v.contains(&e) {
        v.push(e);
    }
}

impl CGrammar {
    pub fn from_grammar(
        grammar: Grammar,
        options: &ParserOptions,
        logger: &mut Logger,
    ) -> Result<Self> {
        let t0 = Instant::now();
        let n = grammar.num_nodes();
        let mut transitions = vec![vec![]; n];
        let mut in_tail_position = vec![false; n];
        let mut rule_term_first = vec![vec![]; grammar.num_rules()];
        let mut call_entries = vec![vec![]; n];
        let mut direct_rule_children = vec![vec![]; n];
        let mut stats = CGrammarStats::default();

        let mut an = Analyzer::new(&grammar)?;
        let root = grammar.root();
        let rules = an.rules(root).into_iter().collect::<Vec<_>>();
        for rule in grammar.all_rules() {
            if !rules.contains(&rule) {
                logger.warn(&format!(
                    "rule {} is not reachable from the root",
                    grammar.rule_name(rule)
                ));
            }
        }

        let mut bodies = vec![];
        for &rule in &rules {
            let body = grammar.rule_body(rule);
            bodies.push(body);
            for pair in an.pair_set(body) {
                add_unique(&mut transitions[pair.from.as_usize()], pair.to);
            }
            rule_term_first[rule.as_usize()] = an
                .first_set(body)
                .into_iter()
                .filter(|&p| !grammar.is_call(p))
                .collect();
            for p in an.last_set(body) {
                in_tail_position[p.as_usize()] = true;
            }
        }

        for pair in an.pair_set(root) {
            add_unique(&mut transitions[pair.from.as_usize()], pair.to);
        }
        for p in an.last_set(root) {
            in_tail_position[p.as_usize()] = true;
            add_unique(&mut transitions[p.as_usize()], grammar.final_expr());
        }
        let root_first = an.first_set(root).into_iter().collect::<Vec<_>>();
        let root_nullable = an.nullable(root);

        bodies.push(root);
        for &top in &bodies {
            for e in grammar.positions(top) {
                stats.positions += 1;
                if !grammar.is_call(e) {
                    continue;
                }
                let entries = an.call_set_inner(e);
                let mut children = vec![];
                for entry in &entries {
                    if entry.context.is_none() && !children.contains(&entry.invoke) {
                        children.push(entry.invoke);
                    }
                }
                let total = entries.len();
                let live = entries
                    .into_iter()
                    .filter(|entry| {
                        !options.prune_dead_continuations
                            || !transitions[entry.cont.as_usize()].is_empty()
                    })
                    .collect::<Vec<_>>();
                stats.pruned_call_entries += total - live.len();
                stats.call_entries += live.len();
                call_entries[e.as_usize()] = live;
                direct_rule_children[e.as_usize()] = children;
            }
        }

        stats.rules = rules.len();
        stats.transitions = transitions.iter().map(|t| t.len()).sum();
        stats.fixpoint_rounds = an.num_fixpoint_rounds();
        stats.compile_time_us = t0.elapsed().as_micros() as u64;

        loginfo!(
            logger,
            "grammar: {} rules, {} positions, {} transitions, {} call entries ({} pruned); {} fixpoint rounds; {}us",
            stats.rules,
            stats.positions,
            stats.transitions,
            stats.call_entries,
            stats.pruned_call_entries,
            stats.fixpoint_rounds,
            stats.compile_time_us
        );
        if logger.level_enabled(3) {
            for &rule in &rules {
                writeln!(logger.info_logger(), "  {}", grammar.rule_to_string(rule)).unwrap();
            }
        }

        Ok(CGrammar {
            grammar,
            rules,
            transitions,
            in_tail_position,
            call_entries,
            direct_rule_children,
            rule_term_first,
            root_first,
            root_nullable,
            stats,
        })
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    pub fn stats(&self) -> &CGrammarStats {
        &self.stats
    }

    /// Rules reachable from the root.
    pub fn rules(&self) -> &[RuleRef] {
        &self.rules
    }

    #[inline(always)]
    pub fn transitions(&self, e: ExprRef) -> &[ExprRef] {
        &self.transitions[e.as_usize()]
    }

    #[inline(always)]
    pub fn in_tail_position(&self, e: ExprRef) -> bool {
        self.in_tail_position[e.as_usize()]
    }

    /// Call entries of the call site `e`, minus the pruned ones.
    #[inline(always)]
    pub fn call_entries(&self, e: ExprRef) -> &[CallEntry] {
        &self.call_entries[e.as_usize()]
    }

    /// Rules that the call site `e` enters with the caller's own context.
    #[inline(always)]
    pub fn direct_rule_children(&self, e: ExprRef) -> &[RuleRef] {
        &self.direct_rule_children[e.as_usize()]
    }

    #[inline(always)]
    pub fn rule_term_first(&self, rule: RuleRef) -> &[ExprRef] {
        &self.rule_term_first[rule.as_usize()]
    }

    pub fn root_first(&self) -> &[ExprRef] {
        &self.root_first
    }

    pub fn root_nullable(&self) -> bool {
        self.root_nullable
    }

    #[inline(always)]
    pub fn is_call(&self, e: ExprRef) -> bool {
        self.grammar.is_call(e)
    }

    #[inline(always)]
    pub fn matches(&self, e: ExprRef, token: Token) -> bool {
        self.grammar.matches(e, token)
    }
}
