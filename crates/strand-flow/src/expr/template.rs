use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::Value;

use super::eval::to_text;
use crate::context::{lookup_path, ExecutionContext};

/// Source of placeholder values.
pub trait Resolve {
    /// Value at a dotted path; missing paths are `null`.
    fn resolve(&self, path: &str) -> Value;
}

impl Resolve for Value {
    fn resolve(&self, path: &str) -> Value {
        lookup_path(self, path).cloned().unwrap_or(Value::Null)
    }
}

impl Resolve for ExecutionContext {
    fn resolve(&self, path: &str) -> Value {
        self.get_path(path).cloned().unwrap_or(Value::Null)
    }
}

/// Resolves every placeholder to `0`, for validating statements without data.
pub struct DummyScope;

impl Resolve for DummyScope {
    fn resolve(&self, _path: &str) -> Value {
        Value::from(0)
    }
}

/// `{...}` with at most one nested `{...}` inside.
fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{([^{}]*(?:\{[^{}]*\}[^{}]*)*)\}").expect("placeholder pattern is valid")
    })
}

fn inner_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([^{}]*)\}").expect("inner placeholder pattern is valid"))
}

/// Resolve a placeholder body. Inner placeholders are substituted first to
/// build the outer path, so `items.{state.i}` reads `items.2` when `state.i`
/// is 2.
pub fn resolve_placeholder(body: &str, scope: &dyn Resolve) -> Value {
    if !body.contains('{') {
        return scope.resolve(body.trim());
    }
    let path = inner_re().replace_all(body, |caps: &Captures| {
        to_text(&scope.resolve(caps[1].trim()))
    });
    scope.resolve(path.trim())
}

/// Replace every placeholder in `text` with its resolved value.
pub fn substitute(text: &str, scope: &dyn Resolve) -> String {
    if !text.contains('{') {
        return text.to_string();
    }
    placeholder_re()
        .replace_all(text, |caps: &Captures| {
            to_text(&resolve_placeholder(&caps[1], scope))
        })
        .into_owned()
}

/// Placeholder bodies referenced by `text`, in order of appearance.
pub fn placeholders(text: &str) -> Vec<String> {
    placeholder_re()
        .captures_iter(text)
        .map(|caps| caps[1].trim().to_string())
        .collect()
}
