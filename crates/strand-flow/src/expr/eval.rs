use std::cmp::Ordering;

use serde_json::Value;

use super::parser::{BinaryOp, Expr, UnaryOp};
use super::template::{resolve_placeholder, substitute, Resolve};

/// Script-style truthiness: `null`, `false`, `0`, NaN and `""` are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Strings as-is, everything else as JSON.
pub fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Number result; integral values stay integers, non-finite ones become null.
fn number(f: f64) -> Value {
    if !f.is_finite() {
        return Value::Null;
    }
    if f.fract() == 0.0 && f.abs() < 9_007_199_254_740_992.0 {
        return Value::from(f as i64);
    }
    serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number)
}

/// Numeric view used by comparisons: numbers, booleans and numeric strings.
fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) if !s.trim().is_empty() => s.trim().parse().ok(),
        _ => None,
    }
}

/// Loose equality: numbers compare by value across representations, and a
/// number equals a string or boolean that reads as the same number.
pub fn loose_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => {
            left == right
        }
        _ => match (coerce_number(left), coerce_number(right)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => coerce_number(left)?.partial_cmp(&coerce_number(right)?),
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::String(s) => s.contains(to_text(needle).as_str()),
        Value::Array(items) => items.iter().any(|item| loose_eq(item, needle)),
        Value::Object(map) => map.contains_key(&to_text(needle)),
        _ => false,
    }
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Value {
    if op == BinaryOp::Add && (left.is_string() || right.is_string()) {
        return Value::String(to_text(left) + &to_text(right));
    }

    if let (Some(x), Some(y)) = (left.as_i64(), right.as_i64()) {
        let exact = match op {
            BinaryOp::Add => x.checked_add(y),
            BinaryOp::Sub => x.checked_sub(y),
            BinaryOp::Mul => x.checked_mul(y),
            BinaryOp::Rem => x.checked_rem(y),
            BinaryOp::Div if x.checked_rem(y) == Some(0) => x.checked_div(y),
            _ => None,
        };
        if let Some(n) = exact {
            return Value::from(n);
        }
    }

    let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) else {
        return Value::Null;
    };
    number(match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        BinaryOp::Rem => a % b,
        _ => f64::NAN,
    })
}

/// Evaluate a parsed statement. Evaluation itself cannot fail: type
/// mismatches produce `null` or `false`.
pub fn eval(expr: &Expr, scope: &dyn Resolve) -> Value {
    match expr {
        Expr::Literal(value) => value.clone(),
        Expr::Text(text) => Value::String(substitute(text, scope)),
        Expr::Path(body) => resolve_placeholder(body, scope),
        Expr::Unary(UnaryOp::Not, inner) => Value::Bool(!is_truthy(&eval(inner, scope))),
        Expr::Unary(UnaryOp::Neg, inner) => match eval(inner, scope) {
            Value::Number(n) => match n.as_i64().and_then(i64::checked_neg) {
                Some(i) => Value::from(i),
                None => n.as_f64().map_or(Value::Null, |f| number(-f)),
            },
            _ => Value::Null,
        },
        Expr::Binary(BinaryOp::And, left, right) => {
            let l = eval(left, scope);
            if is_truthy(&l) {
                eval(right, scope)
            } else {
                l
            }
        }
        Expr::Binary(BinaryOp::Or, left, right) => {
            let l = eval(left, scope);
            if is_truthy(&l) {
                l
            } else {
                eval(right, scope)
            }
        }
        Expr::Binary(op, left, right) => {
            let l = eval(left, scope);
            let r = eval(right, scope);
            match op {
                BinaryOp::Eq => Value::Bool(loose_eq(&l, &r)),
                BinaryOp::NotEq => Value::Bool(!loose_eq(&l, &r)),
                BinaryOp::Lt => Value::Bool(compare(&l, &r) == Some(Ordering::Less)),
                BinaryOp::Le => Value::Bool(matches!(
                    compare(&l, &r),
                    Some(Ordering::Less | Ordering::Equal)
                )),
                BinaryOp::Gt => Value::Bool(compare(&l, &r) == Some(Ordering::Greater)),
                BinaryOp::Ge => Value::Bool(matches!(
                    compare(&l, &r),
                    Some(Ordering::Greater | Ordering::Equal)
                )),
                BinaryOp::Contains => Value::Bool(contains(&l, &r)),
                _ => arithmetic(*op, &l, &r),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parser::parse;
    use serde_json::json;

    fn run(src: &str, ctx: Value) -> Value {
        eval(&parse(src).unwrap(), &ctx)
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(is_truthy(&json!("0")));
        assert!(is_truthy(&json!([])));
        assert!(is_truthy(&json!(-1.5)));
    }

    #[test]
    fn test_arithmetic_keeps_integers() {
        assert_eq!(run("7 / 2", json!({})), json!(3.5));
        assert_eq!(run("8 / 2", json!({})), json!(4));
        assert_eq!(run("7 % 3 + 2 * 3", json!({})), json!(7));
        assert_eq!(run("0.5 + 0.5", json!({})), json!(1));
        assert_eq!(run("-{n}", json!({"n": 4})), json!(-4));
    }

    #[test]
    fn test_non_finite_and_mismatched_are_null() {
        assert_eq!(run("1 / 0", json!({})), Value::Null);
        assert_eq!(run("1 % 0", json!({})), Value::Null);
        assert_eq!(run("true * 2", json!({})), Value::Null);
        assert_eq!(run("{missing} - 1", json!({})), Value::Null);
    }

    #[test]
    fn test_string_concatenation() {
        assert_eq!(run("'n=' + {n}", json!({"n": 3})), json!("n=3"));
        assert_eq!(run("{a} + {b}", json!({"a": "x", "b": null})), json!("xnull"));
    }

    #[test]
    fn test_loose_equality() {
        assert_eq!(run("{n} == '3'", json!({"n": 3})), json!(true));
        assert_eq!(run("{n} = 3.0", json!({"n": 3})), json!(true));
        assert_eq!(run("{flag} == 1", json!({"flag": true})), json!(true));
        assert_eq!(run("{missing} == null", json!({})), json!(true));
        assert_eq!(run("{missing} == 0", json!({})), json!(false));
        assert_eq!(run("{list} == {list}", json!({"list": [1, 2]})), json!(true));
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(run("{x} > 5", json!({"x": 10})), json!(true));
        assert_eq!(run("'apple' < 'banana'", json!({})), json!(true));
        assert_eq!(run("'10' >= 9", json!({})), json!(true));
        // incomparable
        assert_eq!(run("'abc' < 1", json!({})), json!(false));
        assert_eq!(run("'abc' >= 1", json!({})), json!(false));
        assert_eq!(run("{missing} < 1", json!({})), json!(false));
    }

    #[test]
    fn test_contains() {
        let ctx = json!({"msg": "hello world", "tags": ["a", 2], "obj": {"k": 1}});
        assert_eq!(run("{msg} contains 'world'", ctx.clone()), json!(true));
        assert_eq!(run("{tags} contains '2'", ctx.clone()), json!(true));
        assert_eq!(run("{obj} contains 'k'", ctx.clone()), json!(true));
        assert_eq!(run("{obj} contains 'z'", ctx), json!(false));
    }

    #[test]
    fn test_logical_operators_short_circuit() {
        assert_eq!(run("{name} || 'anon'", json!({"name": ""})), json!("anon"));
        assert_eq!(run("0 && (1 / 0)", json!({})), json!(0));
        assert_eq!(run("!{a} or {b}", json!({"a": 1, "b": 2})), json!(2));
    }

    #[test]
    fn test_string_literals_interpolate() {
        assert_eq!(
            run("'{user.name}' == 'ada'", json!({"user": {"name": "ada"}})),
            json!(true)
        );
    }

    #[test]
    fn test_nested_placeholder_path() {
        let ctx = json!({"items": ["a", "b", "c"], "state": {"i": 2}});
        assert_eq!(run("{items.{state.i}}", ctx), json!("c"));
    }
}
