//! Statement and template language.
//!
//! Statements are short author-written expressions such as
//! `{p1.json.score} >= 0.5 && {state.retries} < 3`. Context values are only
//! reachable through `{path}` placeholders; the grammar has literals,
//! arithmetic, comparisons, `contains` and boolean operators, and no way to
//! name anything else. Evaluation is a tree walk over the parsed statement,
//! so there is nothing to escape from.

pub mod eval;
pub mod lexer;
pub mod parser;
pub mod template;

use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use strand_core::error::StrandError;

pub use eval::{is_truthy, loose_eq, to_text};
pub use parser::{parse, Expr};
pub use template::{placeholders, DummyScope, Resolve};

/// Lexing or parsing failure, with the byte offset it was detected at.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at position {position}")]
pub struct ExprError {
    pub position: usize,
    pub message: String,
}

impl ExprError {
    pub fn new(position: usize, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

impl From<ExprError> for StrandError {
    fn from(e: ExprError) -> Self {
        StrandError::Expression {
            position: e.position,
            message: e.message,
        }
    }
}

/// Evaluate a statement, reporting malformed input.
pub fn evaluate(statement: &str, scope: &dyn Resolve) -> Result<Value, ExprError> {
    let expr = parse(statement)?;
    Ok(eval::eval(&expr, scope))
}

/// Evaluate a statement; malformed statements log a warning and yield `false`.
pub fn run_statement(statement: &str, scope: &dyn Resolve) -> Value {
    match evaluate(statement, scope) {
        Ok(value) => value,
        Err(e) => {
            warn!(statement, error = %e, "Statement evaluation failed");
            Value::Bool(false)
        }
    }
}

/// Whether a statement is well formed, checked with every placeholder set to `0`.
pub fn validate_statement(statement: &str) -> bool {
    evaluate(statement, &DummyScope).is_ok()
}

/// Substitute placeholders in free text. Strings are inserted as-is, other
/// values as JSON.
pub fn interpolate(text: &str, scope: &dyn Resolve) -> String {
    template::substitute(text, scope)
}
