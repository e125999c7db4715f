use glushkov_parser::{
    glushkov::{ExprRef, Token},
    Grammar, GrammarBuilder, Logger, ParseResult, ParserFactory, ParserOptions,
};
use lazy_static::lazy_static;

pub fn tokens(s: &str) -> Vec<Token> {
    s.chars().map(|c| c as Token).collect()
}

pub fn tok(c: char) -> Token {
    c as Token
}

/// `list ::= 'a' list?`
pub fn right_list() -> Grammar {
    let mut b = GrammarBuilder::new();
    let list = b
        .define("list", |b, list| {
            let a = b.equal(tok('a'));
            let rec = b.call(list);
            let tail = b.maybe(rec);
            b.seq(a, tail)
        })
        .unwrap();
    let root = b.call(list);
    b.finalize(root).unwrap()
}

/// `list ::= list list | 'a'`
pub fn ambiguous_list() -> Grammar {
    let mut b = GrammarBuilder::new();
    let list = b
        .define("list", |b, list| {
            let l = b.call(list);
            let r = b.call(list);
            let pair = b.seq(l, r);
            let a = b.equal(tok('a'));
            b.alt(pair, a)
        })
        .unwrap();
    let root = b.call(list);
    b.finalize(root).unwrap()
}

/// `list ::= 'a'? list?`; nullable and recursive in tail position.
pub fn nullable_list() -> Grammar {
    let mut b = GrammarBuilder::new();
    let list = b
        .define("list", |b, list| {
            let a = b.equal(tok('a'));
            let ma = b.maybe(a);
            let rec = b.call(list);
            let mr = b.maybe(rec);
            b.seq(ma, mr)
        })
        .unwrap();
    let root = b.call(list);
    b.finalize(root).unwrap()
}

/// `a ::= b; b ::= 't' a?`
pub fn indirect_list() -> Grammar {
    let mut b = GrammarBuilder::new();
    let ra = b.rule("a");
    let rb = b.rule("b");
    let cb = b.call(rb);
    b.set_body(ra, cb).unwrap();
    let t = b.equal(tok('t'));
    let ca = b.call(ra);
    let ma = b.maybe(ca);
    let body = b.seq(t, ma);
    b.set_body(rb, body).unwrap();
    let root = b.call(ra);
    b.finalize(root).unwrap()
}

/// `s ::= s s | 'a'`; every split of the input is a derivation.
pub fn super_ambiguous() -> Grammar {
    let mut b = GrammarBuilder::new();
    let s = b
        .define("s", |b, s| {
            let l = b.call(s);
            let r = b.call(s);
            let ss = b.seq(l, r);
            let a = b.equal(tok('a'));
            b.alt(ss, a)
        })
        .unwrap();
    let root = b.call(s);
    b.finalize(root).unwrap()
}

/// `r1 ::= 'a' r2 | 'x'; r2 ::= 'b' r3; ...; rN ::= 'z' r1`
/// in the order given by `letters`; every rule is only reachable through
/// the others.
pub fn indirect_recursion(letters: &str) -> Grammar {
    let mut b = GrammarBuilder::new();
    let rules = letters
        .chars()
        .map(|c| b.rule(&format!("r{}", c)))
        .collect::<Vec<_>>();
    for (idx, c) in letters.chars().enumerate() {
        let t = b.equal(tok(c));
        let next = b.call(rules[(idx + 1) % rules.len()]);
        let mut body = b.seq(t, next);
        if idx == 0 {
            let x = b.equal(tok('x'));
            body = b.alt(body, x);
        }
        b.set_body(rules[idx], body).unwrap();
    }
    let root = b.call(rules[0]);
    b.finalize(root).unwrap()
}

/// `a0 ::= a1; a1 ::= a2; ...; a{n} ::= 'x' | '(' a0 ')'`
pub fn alias_chain(n: usize) -> Grammar {
    let mut b = GrammarBuilder::new();
    let rules = (0..=n)
        .map(|i| b.rule(&format!("a{}", i)))
        .collect::<Vec<_>>();
    for i in 0..n {
        let next = b.call(rules[i + 1]);
        b.set_body(rules[i], next).unwrap();
    }
    let x = b.equal(tok('x'));
    let open = b.equal(tok('('));
    let inner = b.call(rules[0]);
    let close = b.equal(tok(')'));
    let paren = b.join(&[open, inner, close]);
    let last = b.alt(x, paren);
    b.set_body(rules[n], last).unwrap();
    let root = b.call(rules[0]);
    b.finalize(root).unwrap()
}

/// Three rules aliasing each other in a cycle:
/// `a ::= b | 'x' | '(' a ')'; b ::= c | 'y'; c ::= a | 'z'`
pub fn mutual_alias() -> Grammar {
    let mut b = GrammarBuilder::new();
    let ra = b.rule("a");
    let rb = b.rule("b");
    let rc = b.rule("c");

    let cb = b.call(rb);
    let x = b.equal(tok('x'));
    let open = b.equal(tok('('));
    let inner = b.call(ra);
    let close = b.equal(tok(')'));
    let paren = b.join(&[open, inner, close]);
    let body = b.select(&[cb, x, paren]);
    b.set_body(ra, body).unwrap();

    let cc = b.call(rc);
    let y = b.equal(tok('y'));
    let body = b.alt(cc, y);
    b.set_body(rb, body).unwrap();

    let ca = b.call(ra);
    let z = b.equal(tok('z'));
    let body = b.alt(ca, z);
    b.set_body(rc, body).unwrap();

    let root = b.call(ra);
    b.finalize(root).unwrap()
}

/// `e ::= e '+' 'x' | 'x'`
pub fn left_recursive_sum() -> Grammar {
    let mut b = GrammarBuilder::new();
    let e = b
        .define("e", |b, e| {
            let rec = b.call(e);
            let plus = b.literal("+x");
            let sum = b.seq(rec, plus);
            let x = b.equal(tok('x'));
            b.alt(sum, x)
        })
        .unwrap();
    let root = b.call(e);
    b.finalize(root).unwrap()
}

fn operator(b: &mut GrammarBuilder, ops: &str) -> ExprRef {
    let ops = ops.chars().map(|c| b.equal(tok(c))).collect::<Vec<_>>();
    b.select(&ops)
}

/// `expr ::= expr op expr | '1'` over `+ - * /`.
pub fn amb_expr() -> Grammar {
    let mut b = GrammarBuilder::new();
    let expr = b
        .define("expr", |b, expr| {
            let l = b.call(expr);
            let op = operator(b, "+-*/");
            let r = b.call(expr);
            let bin = b.join(&[l, op, r]);
            let one = b.equal(tok('1'));
            b.alt(bin, one)
        })
        .unwrap();
    let root = b.call(expr);
    b.finalize(root).unwrap()
}

/// Precedence-layered, left-associative expressions:
/// ```text
/// sum     ::= sum ('+' | '-') product | product
/// product ::= product ('*' | '/') atom | atom
/// atom    ::= number | '(' sum ')'
/// number  ::= ['0'-'9']+
/// ```
pub fn manual_expr() -> Grammar {
    let mut b = GrammarBuilder::new();
    let sum = b.rule("sum");
    let product = b.rule("product");
    let atom = b.rule("atom");
    let number = b.rule("number");

    let digit = b.token_range(tok('0'), tok('9'));
    let digits = b.plus(digit);
    b.set_body(number, digits).unwrap();

    let num = b.call(number);
    let open = b.equal(tok('('));
    let inner = b.call(sum);
    let close = b.equal(tok(')'));
    let paren = b.join(&[open, inner, close]);
    let body = b.alt(num, paren);
    b.set_body(atom, body).unwrap();

    let l = b.call(product);
    let op = operator(&mut b, "*/");
    let r = b.call(atom);
    let bin = b.join(&[l, op, r]);
    let single = b.call(atom);
    let body = b.alt(bin, single);
    b.set_body(product, body).unwrap();

    let l = b.call(sum);
    let op = operator(&mut b, "+-");
    let r = b.call(product);
    let bin = b.join(&[l, op, r]);
    let single = b.call(product);
    let body = b.alt(bin, single);
    b.set_body(sum, body).unwrap();

    let root = b.call(sum);
    b.finalize(root).unwrap()
}

/// `parens ::= ('(' parens ')')*`
pub fn balanced_parens() -> Grammar {
    let mut b = GrammarBuilder::new();
    let parens = b
        .define("parens", |b, parens| {
            let open = b.equal(tok('('));
            let inner = b.call(parens);
            let close = b.equal(tok(')'));
            let group = b.join(&[open, inner, close]);
            b.star(group)
        })
        .unwrap();
    let root = b.call(parens);
    b.finalize(root).unwrap()
}

/// Comma-separated identifiers, `[a-z_][a-z0-9_]*`, where the character
/// classes are built from `ge`/`le` conjunctions.
pub fn identifier_list() -> Grammar {
    let mut b = GrammarBuilder::new();
    let ident = b
        .define("ident", |b, _| {
            let lower = b.token_range(tok('a'), tok('z'));
            let under = b.equal(tok('_'));
            let head = b.alt(lower, under);
            let lower = b.token_range(tok('a'), tok('z'));
            let digit = b.token_range(tok('0'), tok('9'));
            let under = b.equal(tok('_'));
            let rest = b.select(&[lower, digit, under]);
            let rest = b.star(rest);
            b.seq(head, rest)
        })
        .unwrap();
    let first = b.call(ident);
    let comma = b.equal(tok(','));
    let next = b.call(ident);
    let more = b.seq(comma, next);
    let more = b.star(more);
    let root = b.seq(first, more);
    b.finalize(root).unwrap()
}

/// `1+1-1*1/...1` with `n` operators.
pub fn expr_input(n: usize) -> String {
    let ops = ['+', '-', '*', '/'];
    let mut s = String::new();
    for i in 0..n {
        s.push('1');
        s.push(ops[i % ops.len()]);
    }
    s.push('1');
    s
}

pub fn quiet_factory(grammar: Grammar, options: ParserOptions) -> ParserFactory {
    ParserFactory::with_options(grammar, options, &mut Logger::quiet()).unwrap()
}

pub fn factory(grammar: Grammar) -> ParserFactory {
    quiet_factory(grammar, ParserOptions::default())
}

pub fn parse_str(factory: &ParserFactory, input: &str) -> ParseResult {
    factory.parse(&tokens(input))
}

pub fn check_accepts(factory: &ParserFactory, inputs: &[&str]) {
    for input in inputs {
        let res = parse_str(factory, input);
        assert_eq!(res, ParseResult::Accept, "expected {:?} to be accepted", input);
    }
}

/// Each input with the offset it is expected to be rejected at.
pub fn check_rejects(factory: &ParserFactory, inputs: &[(&str, usize)]) {
    for &(input, offset) in inputs {
        let res = parse_str(factory, input);
        assert_eq!(
            res,
            ParseResult::Reject { offset },
            "expected {:?} to be rejected at {}",
            input,
            offset
        );
    }
}

/// Same verdict with and without continuation pruning.
pub fn check_pruning_is_invisible(grammar: fn() -> Grammar, inputs: &[&str]) {
    let pruned = factory(grammar());
    let unpruned = quiet_factory(
        grammar(),
        ParserOptions {
            prune_dead_continuations: false,
            ..Default::default()
        },
    );
    assert!(
        unpruned.grammar().stats().call_entries >= pruned.grammar().stats().call_entries,
        "pruning added call entries"
    );
    for input in inputs {
        assert_eq!(
            parse_str(&pruned, input),
            parse_str(&unpruned, input),
            "pruning changed the verdict on {:?}",
            input
        );
    }
}

lazy_static! {
    pub static ref AMB_EXPR: ParserFactory = factory(amb_expr());
    pub static ref MANUAL_EXPR: ParserFactory = factory(manual_expr());
    pub static ref SUPER_AMBIGUOUS: ParserFactory = factory(super_ambiguous());
}
