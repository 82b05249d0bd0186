// ABOUTME: Error types for the parser and evaluator

use thiserror::Error;

/// Errors raised while normalizing/tokenizing/parsing source text into a
/// `CallNode` tree.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unterminated call to {0}")]
    UnterminatedCall(String),

    #[error("expected '(' to start a call, found \"{0}\"")]
    ExpectedOpenParen(String),

    #[error("call has no form selector")]
    EmptySelector,

    #[error("unexpected \")\" with no matching \"(\"")]
    UnmatchedCloseParen,
}

/// Runtime errors raised by the evaluator. Every variant carries the
/// offending call's printed Lisp-style form (`(name arg1 arg2)`) for
/// context, captured as a `String` at construction time rather than as a
/// live AST reference — by the time an error is built the evaluator may
/// already have mutated or moved the frame that produced it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("Reference to unknown symbol \"{name}\" in \"{in_call}\".")]
    UnknownSymbol { name: String, in_call: String },

    #[error("Expected {} {expected} argument{} for \"{name}\", got {got}.", if *exact { "exactly" } else { "at least" }, if expected == "1" { "" } else { "s" })]
    ArityError {
        name: String,
        got: usize,
        expected: String,
        exact: bool,
    },

    #[error("\"let\" requires an odd number of arguments (name/value pairs plus a body), at least 3, in \"{in_call}\".")]
    LetArityError { in_call: String },

    #[error("\"cond\" requires an even, non-zero number of arguments (condition/action pairs) in \"{in_call}\".")]
    CondArityError { in_call: String },

    #[error("\"'*\" must be the last parameter if present, in \"{in_call}\".")]
    ParamStarNotLastError { in_call: String },

    #[error("\"{name}\" is not a function, it is {actual} (in \"{in_call}\").")]
    NotCallable {
        name: String,
        actual: String,
        in_call: String,
    },

    #[error("\"flatten\" requires a Str or List argument, in \"{in_call}\".")]
    FlattenNotIterableError { in_call: String },

    #[error("could not read \"{path}\": {message}")]
    IoError { path: String, message: String },

    #[error("{message}, in \"{in_call}\".")]
    TypeError { message: String, in_call: String },
}

/// Top-level error type for `run_source`, composing the parser and evaluator
/// error enums at the CLI boundary.
#[derive(Error, Debug, Clone)]
pub enum LalError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Eval(#[from] EvalError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arity_error_pluralises_correctly() {
        let one = EvalError::ArityError {
            name: "sqrt".to_string(),
            got: 2,
            expected: "1".to_string(),
            exact: true,
        };
        assert_eq!(
            one.to_string(),
            "Expected exactly 1 argument for \"sqrt\", got 2."
        );

        let many = EvalError::ArityError {
            name: "eq".to_string(),
            got: 1,
            expected: "2".to_string(),
            exact: false,
        };
        assert_eq!(
            many.to_string(),
            "Expected at least 2 arguments for \"eq\", got 1."
        );
    }

    #[test]
    fn lal_error_delegates_display() {
        let e: LalError = ParseError::UnmatchedCloseParen.into();
        assert_eq!(e.to_string(), "unexpected \")\" with no matching \"(\"");
    }
}
