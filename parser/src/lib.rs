pub mod api;
pub mod glushkov;

mod factory;
mod grammar_builder;
mod logging;

pub use api::{ParseResult, ParserOptions};
pub use factory::ParserFactory;
pub use glushkov::{CGrammar, Grammar, Parser, ParserStats};
pub use grammar_builder::GrammarBuilder;
pub use logging::Logger;

use anyhow::Result;
use glushkov::Token;

#[macro_export]
macro_rules! loginfo {
    ($s:expr, $($arg:tt)*) => {
        if $s.level_enabled(2) {
            use std::fmt::Write;
            writeln!($s.info_logger(), $($arg)*).unwrap();
        }
    };
}

#[macro_export]
macro_rules! infoln {
    ($s:expr, $($arg:tt)*) => {
        if $s.logger.level_enabled(2) {
            use std::fmt::Write;
            writeln!($s.logger.info_logger(), $($arg)*).unwrap();
        }
    };
}

#[macro_export]
macro_rules! warn {
    ($s:expr, $($arg:tt)*) => {
        if $s.logger.level_enabled(1) {
            use std::fmt::Write;
            $s.logger.write_warning("Warning: ");
            writeln!($s.logger.warning_logger(), $($arg)*).unwrap();
        }
    };
}

/// One-shot recognition with default options and no logging.
pub fn recognize(grammar: Grammar, tokens: &[Token]) -> Result<bool> {
    let factory =
        ParserFactory::with_options(grammar, ParserOptions::default(), &mut Logger::quiet())?;
    Ok(factory.recognize(tokens))
}
