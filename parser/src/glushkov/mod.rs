mod analysis;
mod compiled;
mod context;
mod fixpoint;
mod grammar;
mod parser;

pub use analysis::{validate, Analyzer, CallEntry, Pair, PosSet};
pub use compiled::{CGrammar, CGrammarStats};
pub use context::{ContextId, ContextSet};
pub use grammar::{ExprRef, Grammar, Node, RuleRef, Token};
pub use parser::{Parser, ParserStats};

pub(crate) use grammar::{NodeData, RuleDecl};
