//! Condition node executor
//!
//! Evaluates `config.condition` to a boolean. The expression grammar is
//! deliberately tiny: after interpolation the expression must be a boolean
//! literal, a single resolved value (coerced by JSON truthiness), or one
//! `lhs == rhs` / `lhs != rhs` comparison. Branch selection happens in the
//! engine via edge condition tags.

use async_trait::async_trait;
use serde_json::{json, Value};

use axon_domain::{NodeSpec, NodeType};

use crate::context::RunContext;
use crate::executor::traits::{ExecutorError, NodeExecutor};
use crate::interpolate::resolve_str;

/// JSON truthiness: null, false, 0, "", and empty containers are false.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    s.strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .or_else(|| {
            s.strip_prefix('\'')
                .and_then(|inner| inner.strip_suffix('\''))
        })
        .unwrap_or(s)
}

/// Evaluate an already-interpolated expression value.
fn evaluate(resolved: &Value, original: &str) -> Result<bool, ExecutorError> {
    // A single placeholder resolved to a native value: truthiness.
    let Value::String(expr) = resolved else {
        return Ok(truthy(resolved));
    };

    let expr = expr.trim();
    match expr {
        "true" | "True" => return Ok(true),
        "false" | "False" => return Ok(false),
        _ => {}
    }

    if let Some((lhs, rhs)) = expr.split_once("==") {
        if !lhs.contains('=') && !rhs.starts_with('=') {
            return Ok(strip_quotes(lhs) == strip_quotes(rhs));
        }
    }
    if let Some((lhs, rhs)) = expr.split_once("!=") {
        return Ok(strip_quotes(lhs) != strip_quotes(rhs));
    }

    Err(ExecutorError::ConditionUnsupported(original.to_string()))
}

pub struct ConditionNodeExecutor;

#[async_trait]
impl NodeExecutor for ConditionNodeExecutor {
    async fn execute(&self, node: &NodeSpec, ctx: &mut RunContext) -> Result<Value, ExecutorError> {
        let condition = node
            .config
            .get("condition")
            .and_then(Value::as_str)
            .unwrap_or("true")
            .to_string();

        let resolved = resolve_str(&condition, ctx.scope(), ctx.interpolation_mode)?;
        let result = evaluate(&resolved, &condition)?;

        tracing::debug!(node_id = %node.id, %condition, result, "condition evaluated");
        Ok(json!({"condition": condition, "result": result}))
    }

    fn node_type(&self) -> NodeType {
        NodeType::Condition
    }
}
