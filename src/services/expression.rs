//! Expression evaluation seam.
//!
//! The engine treats expression languages as an opaque service. The bundled
//! [`SimpleExpressionEvaluator`] understands literals, binding paths, negation
//! and equality, enough for plans that only reference variables.

use serde_json::Value;

use crate::error::{Result, StepperError};

/// Values visible to expressions, nearest scope wins
pub type Bindings = serde_json::Map<String, Value>;

pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate(&self, expression: &str, bindings: &Bindings) -> Result<Value>;
}

/// Evaluates:
/// - JSON literals (`true`, `12`, `"text"`, `{"a": 1}`) and `'single quoted'` strings
/// - binding paths (`user.name`, `rows.0.id`)
/// - `!expr`, `a == b`, `a != b`
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleExpressionEvaluator;

impl SimpleExpressionEvaluator {
    fn evaluate_operand(&self, expression: &str, bindings: &Bindings) -> Result<Value> {
        let expression = expression.trim();
        if expression.is_empty() {
            return Err(StepperError::expression(expression, "empty expression"));
        }

        if let Some(negated) = expression.strip_prefix('!') {
            return match self.evaluate_operand(negated, bindings)? {
                Value::Bool(b) => Ok(Value::Bool(!b)),
                other => Err(StepperError::expression(
                    expression,
                    format!("cannot negate {other}"),
                )),
            };
        }

        if expression.len() >= 2 && expression.starts_with('\'') && expression.ends_with('\'') {
            return Ok(Value::String(expression[1..expression.len() - 1].to_string()));
        }

        if let Ok(literal) = serde_json::from_str::<Value>(expression) {
            return Ok(literal);
        }

        resolve_path(expression, bindings)
    }
}

impl ExpressionEvaluator for SimpleExpressionEvaluator {
    fn evaluate(&self, expression: &str, bindings: &Bindings) -> Result<Value> {
        if let Some((lhs, rhs)) = expression.split_once("==") {
            let equal = self.evaluate_operand(lhs, bindings)? == self.evaluate_operand(rhs, bindings)?;
            return Ok(Value::Bool(equal));
        }
        if let Some((lhs, rhs)) = expression.split_once("!=") {
            let different =
                self.evaluate_operand(lhs, bindings)? != self.evaluate_operand(rhs, bindings)?;
            return Ok(Value::Bool(different));
        }
        self.evaluate_operand(expression, bindings)
    }
}

fn resolve_path(path: &str, bindings: &Bindings) -> Result<Value> {
    let mut segments = path.split('.');
    let head = segments.next().unwrap_or_default();
    let mut current = bindings
        .get(head)
        .ok_or_else(|| StepperError::expression(path, format!("unknown binding '{head}'")))?;

    for segment in segments {
        let next = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        current = next.ok_or_else(|| {
            StepperError::expression(path, format!("no property '{segment}'"))
        })?;
    }

    Ok(current.clone())
}
