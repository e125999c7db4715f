use serde::{Deserialize, Serialize};

/// Knobs for building and running a parser.
/// Missing fields take their default values when deserializing.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct ParserOptions {
    /// Drop call continuations that have no outgoing transition, as they can
    /// never lead to further progress or acceptance.
    /// This only affects speed, never the result.
    pub prune_dead_continuations: bool,

    /// Log the frontier after every token (at info level).
    pub trace_steps: bool,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            prune_dead_continuations: true,
            trace_steps: false,
        }
    }
}

/// Outcome of running a parser over a whole input.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseResult {
    Accept,
    /// No derivation can continue with the token at `offset`; when
    /// `offset` equals the input length, the input is a proper prefix of
    /// the language but not in it.
    Reject { offset: usize },
}

impl ParseResult {
    pub fn is_accept(&self) -> bool {
        matches!(self, ParseResult::Accept)
    }

    pub fn reject_offset(&self) -> Option<usize> {
        match self {
            ParseResult::Accept => None,
            ParseResult::Reject { offset } => Some(*offset),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_defaults() {
        let opts: ParserOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(opts, ParserOptions::default());
        assert!(opts.prune_dead_continuations);

        let opts: ParserOptions =
            serde_json::from_str(r#"{"prune_dead_continuations": false}"#).unwrap();
        assert!(!opts.prune_dead_continuations);
        assert!(!opts.trace_steps);
    }

    #[test]
    fn test_parse_result_json() {
        let r = ParseResult::Reject { offset: 3 };
        assert_eq!(
            serde_json::to_string(&r).unwrap(),
            r#"{"Reject":{"offset":3}}"#
        );
        assert_eq!(r.reject_offset(), Some(3));
        assert!(ParseResult::Accept.is_accept());
    }
}
