use std::sync::Arc;

use anyhow::Result;

use crate::{
    api::{ParseResult, ParserOptions},
    glushkov::{CGrammar, Grammar, Token},
    Logger, Parser,
};

/// Compiles a grammar once and hands out parsers that share its tables.
pub struct ParserFactory {
    grammar: Arc<CGrammar>,
    options: ParserOptions,
    stderr_log_level: u32,
    buffer_log_level: u32,
}

impl ParserFactory {
    pub fn new(grammar: Grammar) -> Result<Self> {
        Self::with_options(grammar, ParserOptions::default(), &mut Logger::new(0, 1))
    }

    /// Log levels of `logger` carry over to the parsers; the compilation
    /// log ends up in its buffer.
    pub fn with_options(
        grammar: Grammar,
        options: ParserOptions,
        logger: &mut Logger,
    ) -> Result<Self> {
        let grammar = CGrammar::from_grammar(grammar, &options, logger)?;
        Ok(ParserFactory {
            grammar: Arc::new(grammar),
            options,
            stderr_log_level: logger.stderr_level(),
            buffer_log_level: logger.buffer_level(),
        })
    }

    pub fn grammar(&self) -> &Arc<CGrammar> {
        &self.grammar
    }

    pub fn options(&self) -> &ParserOptions {
        &self.options
    }

    /// Options for parsers created from now on.  Pruning is fixed when the
    /// tables are built and is not affected.
    pub fn options_mut(&mut self) -> &mut ParserOptions {
        &mut self.options
    }

    pub fn quiet(&mut self) -> &mut Self {
        self.stderr_log_level = 0;
        self.buffer_log_level = 0;
        self
    }

    pub fn set_buffer_log_level(&mut self, level: u32) -> &mut Self {
        self.buffer_log_level = level;
        self
    }

    pub fn set_stderr_log_level(&mut self, level: u32) -> &mut Self {
        self.stderr_log_level = level;
        self
    }

    pub fn create_parser(&self) -> Parser {
        self.create_parser_ext(self.buffer_log_level)
    }

    pub fn create_parser_ext(&self, buffer_log_level: u32) -> Parser {
        Parser::new(
            self.grammar.clone(),
            self.options.clone(),
            Logger::new(buffer_log_level, self.stderr_log_level),
        )
    }

    pub fn parse(&self, tokens: &[Token]) -> ParseResult {
        self.create_parser().parse(tokens)
    }

    pub fn recognize(&self, tokens: &[Token]) -> bool {
        self.parse(tokens).is_accept()
    }
}
