//! Placeholder interpolation
//!
//! Node configurations may embed `${token}` markers resolved against the
//! execution context. The grammar is intentionally small: dotted identifiers
//! only, resolved with a single regex pass and a recursive container walk.
//!
//! Resolution rules:
//! - `${input}` is the whole input map, `${input.a.b}` a path into it
//! - `${variables.x}` or bare `${x}` is a path into the variables map
//! - a string that is exactly one placeholder resolves to the native value
//! - a string with surrounding text coerces every resolved value to a string
//! - malformed tokens (double dots, leading/trailing dot, invalid characters)
//!   are rejected in both modes

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;
use thiserror::Error;

/// How unresolvable tokens are handled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InterpolationMode {
    /// Unresolvable tokens raise an error
    #[default]
    Strict,
    /// Unresolvable tokens are left in place literally
    Lenient,
}

/// Interpolation failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InterpolationError {
    /// Token violates the dotted-identifier grammar
    #[error("invalid placeholder token: ${{{0}}}")]
    InvalidToken(String),

    /// Token is well-formed but resolves to nothing (strict mode only)
    #[error("cannot resolve placeholder: ${{{0}}}")]
    Unresolved(String),
}

/// Resolution scope: the input payload plus the variables map.
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub input: &'a Value,
    pub variables: &'a Map<String, Value>,
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^}]*)\}").expect("placeholder regex"))
}

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9_]+(\.[a-zA-Z0-9_]+)*$").expect("token regex"))
}

fn walk_path<'a>(mut current: &'a Value, path: &str) -> Option<&'a Value> {
    for key in path.split('.') {
        current = current.as_object()?.get(key)?;
    }
    Some(current)
}

fn resolve_token(token: &str, scope: Scope<'_>) -> Option<Value> {
    if token == "input" {
        return Some(scope.input.clone());
    }
    if token == "variables" {
        return Some(Value::Object(scope.variables.clone()));
    }
    if let Some(path) = token.strip_prefix("input.") {
        return walk_path(scope.input, path).cloned();
    }
    let path = token.strip_prefix("variables.").unwrap_or(token);
    let (head, rest) = match path.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    };
    let root = scope.variables.get(head)?;
    match rest {
        Some(rest) => walk_path(root, rest).cloned(),
        None => Some(root.clone()),
    }
}

fn coerce_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Resolve placeholders within a single string.
///
/// Returns the native resolved value when the whole string is exactly one
/// placeholder; otherwise substitutes string-coerced values in place.
pub fn resolve_str(
    raw: &str,
    scope: Scope<'_>,
    mode: InterpolationMode,
) -> Result<Value, InterpolationError> {
    let re = placeholder_re();

    // Token grammar is validated up front in both modes.
    for captures in re.captures_iter(raw) {
        let token = &captures[1];
        if !token_re().is_match(token) {
            return Err(InterpolationError::InvalidToken(token.to_string()));
        }
    }

    // Whole-string placeholder returns the native value.
    if let Some(captures) = re.captures(raw) {
        if captures.get(0).map(|m| m.as_str()) == Some(raw) {
            let token = &captures[1];
            return match resolve_token(token, scope) {
                Some(value) => Ok(value),
                None => match mode {
                    InterpolationMode::Strict => {
                        Err(InterpolationError::Unresolved(token.to_string()))
                    }
                    InterpolationMode::Lenient => Ok(Value::String(raw.to_string())),
                },
            };
        }
    }

    let mut result = String::with_capacity(raw.len());
    let mut last_end = 0;
    for captures in re.captures_iter(raw) {
        let whole = captures.get(0).expect("capture 0");
        let token = &captures[1];
        result.push_str(&raw[last_end..whole.start()]);

        match resolve_token(token, scope) {
            Some(value) => result.push_str(&coerce_to_string(&value)),
            None => match mode {
                InterpolationMode::Strict => {
                    return Err(InterpolationError::Unresolved(token.to_string()));
                }
                InterpolationMode::Lenient => result.push_str(whole.as_str()),
            },
        }
        last_end = whole.end();
    }
    result.push_str(&raw[last_end..]);

    Ok(Value::String(result))
}

/// Recursively resolve placeholders in a JSON value.
pub fn resolve_value(
    value: &Value,
    scope: Scope<'_>,
    mode: InterpolationMode,
) -> Result<Value, InterpolationError> {
    match value {
        Value::String(s) => resolve_str(s, scope, mode),
        Value::Object(map) => {
            let mut resolved = Map::with_capacity(map.len());
            for (key, entry) in map {
                resolved.insert(key.clone(), resolve_value(entry, scope, mode)?);
            }
            Ok(Value::Object(resolved))
        }
        Value::Array(items) => {
            let resolved = items
                .iter()
                .map(|item| resolve_value(item, scope, mode))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Array(resolved))
        }
        other => Ok(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scope_fixture() -> (Value, Map<String, Value>) {
        let input = json!({"city": "tokyo", "profile": {"age": 30}});
        let variables = json!({
            "greeting": "hello",
            "user": {"name": "alice"},
            "flag": true,
            "x": 1,
            "deep": {"a": {"b": {"c": {"d": "bottom"}}}}
        });
        let Value::Object(variables) = variables else {
            unreachable!()
        };
        (input, variables)
    }

    #[test]
    fn test_mixed_string_coerces_values() {
        let (input, variables) = scope_fixture();
        let scope = Scope {
            input: &input,
            variables: &variables,
        };

        let resolved = resolve_str(
            "${greeting}, ${user.name}!",
            scope,
            InterpolationMode::Strict,
        )
        .unwrap();
        assert_eq!(resolved, json!("hello, alice!"));
    }

    #[test]
    fn test_single_placeholder_returns_native_value() {
        let (input, variables) = scope_fixture();
        let scope = Scope {
            input: &input,
            variables: &variables,
        };

        assert_eq!(
            resolve_str("${user}", scope, InterpolationMode::Strict).unwrap(),
            json!({"name": "alice"})
        );
        assert_eq!(
            resolve_str("${flag}", scope, InterpolationMode::Strict).unwrap(),
            json!(true)
        );
        assert_eq!(
            resolve_str("${input}", scope, InterpolationMode::Strict).unwrap(),
            input
        );
        assert_eq!(
            resolve_str("${input.profile.age}", scope, InterpolationMode::Strict).unwrap(),
            json!(30)
        );
    }

    #[test]
    fn test_one_character_and_deep_paths() {
        let (input, variables) = scope_fixture();
        let scope = Scope {
            input: &input,
            variables: &variables,
        };

        assert_eq!(
            resolve_str("${x}", scope, InterpolationMode::Strict).unwrap(),
            json!(1)
        );
        assert_eq!(
            resolve_str("${deep.a.b.c.d}", scope, InterpolationMode::Strict).unwrap(),
            json!("bottom")
        );
    }

    #[test]
    fn test_strict_rejects_unresolved() {
        let (input, variables) = scope_fixture();
        let scope = Scope {
            input: &input,
            variables: &variables,
        };

        let err = resolve_str("${missing}", scope, InterpolationMode::Strict).unwrap_err();
        assert_eq!(err, InterpolationError::Unresolved("missing".to_string()));
    }

    #[test]
    fn test_lenient_leaves_literal() {
        let (input, variables) = scope_fixture();
        let scope = Scope {
            input: &input,
            variables: &variables,
        };

        assert_eq!(
            resolve_str("${missing}", scope, InterpolationMode::Lenient).unwrap(),
            json!("${missing}")
        );
        assert_eq!(
            resolve_str("a ${missing} b", scope, InterpolationMode::Lenient).unwrap(),
            json!("a ${missing} b")
        );
    }

    #[test]
    fn test_malformed_tokens_rejected_in_both_modes() {
        let (input, variables) = scope_fixture();
        let scope = Scope {
            input: &input,
            variables: &variables,
        };

        for raw in ["${a..b}", "${.a}", "${a.}", "${a-b}", "${}"] {
            for mode in [InterpolationMode::Strict, InterpolationMode::Lenient] {
                let err = resolve_str(raw, scope, mode).unwrap_err();
                assert!(matches!(err, InterpolationError::InvalidToken(_)), "{raw}");
            }
        }
    }

    #[test]
    fn test_containers_walked_recursively() {
        let (input, variables) = scope_fixture();
        let scope = Scope {
            input: &input,
            variables: &variables,
        };

        let params = json!({
            "message": "${greeting} from ${input.city}",
            "user": "${user}",
            "list": ["${x}", {"nested": "${flag}"}],
            "untouched": 42
        });
        let resolved = resolve_value(&params, scope, InterpolationMode::Strict).unwrap();
        assert_eq!(
            resolved,
            json!({
                "message": "hello from tokyo",
                "user": {"name": "alice"},
                "list": [1, {"nested": true}],
                "untouched": 42
            })
        );
    }
}
