use std::{env, process};

use anyhow::{bail, Result};
use glushkov_parser::{Grammar, Logger, ParserFactory, ParserOptions, ParserStats};
use instant::Instant;
use sample_parser::{amb_expr, expr_input, manual_expr, super_ambiguous, tokens};

struct Bench {
    name: &'static str,
    grammar: fn() -> Grammar,
    sizes: Vec<usize>,
    input: fn(usize) -> String,
}

fn benches() -> Vec<Bench> {
    vec![
        Bench {
            name: "a",
            grammar: super_ambiguous,
            sizes: (60..=120).step_by(5).collect(),
            input: |n| "a".repeat(n),
        },
        Bench {
            name: "ambexpr",
            grammar: amb_expr,
            sizes: (30..=150).step_by(5).collect(),
            input: expr_input,
        },
        Bench {
            name: "manexpr",
            grammar: manual_expr,
            sizes: (3000..=7000).step_by(100).collect(),
            input: expr_input,
        },
    ]
}

fn run(bench: &Bench) -> Result<()> {
    // set to 2 for grammar statistics
    let mut logger = Logger::new(0, 1);
    let factory =
        ParserFactory::with_options((bench.grammar)(), ParserOptions::default(), &mut logger)?;
    eprintln!("{}", serde_json::to_string(factory.grammar().stats())?);
    let mut total = ParserStats::default();
    for &n in &bench.sizes {
        let input = tokens(&(bench.input)(n));
        let t0 = Instant::now();
        let mut parser = factory.create_parser();
        if !parser.recognize(&input) {
            bail!("failed to recognize input of size {}", n);
        }
        println!("{} {:.6}", n, t0.elapsed().as_secs_f64());
        total = total.max(parser.stats());
    }
    eprintln!("{}", serde_json::to_string_pretty(&total)?);
    Ok(())
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let benches = benches();
    let bench = args
        .get(1)
        .and_then(|name| benches.iter().find(|b| b.name == name.as_str()));
    let Some(bench) = bench else {
        let names = benches.iter().map(|b| b.name).collect::<Vec<_>>();
        eprintln!("Usage: {} <{}>", args[0], names.join("|"));
        process::exit(1);
    };
    if let Err(e) = run(bench) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
