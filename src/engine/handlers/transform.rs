//! Data step handler
//!
//! `config.transform` maps output keys to one of:
//! - `{"$path": "user.name"}` - a lookup in data and variables
//! - `{"$expr": "amount * 2"}` - an expression value (fails closed to `false`)
//! - anything else - a static value, with `${{ }}` placeholders resolved

use serde_json::{Map, Value};

use crate::engine::error::StepError;
use crate::engine::executor::{StepContext, StepOutput};
use crate::workflow::{evaluate, interpolate_value, ExpressionScope, Step};

pub fn data(step: &Step, ctx: &StepContext) -> Result<StepOutput, StepError> {
    let mut merged = ctx.data.clone();

    let transform = match step.config.get("transform") {
        None => return Ok(data_output(merged)),
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(StepError::InvalidParameter(format!(
                "transform must be an object, got {}",
                other
            )))
        }
    };

    let scope = ExpressionScope::new(&ctx.data, &ctx.variables);
    for (key, rule) in transform {
        let value = match derivation(rule) {
            Some(("$path", path)) => scope.lookup_path(path).unwrap_or(Value::Null),
            Some((_, expr)) => evaluate(expr, &ctx.data, &ctx.variables),
            None => interpolate_value(rule, &ctx.data, &ctx.variables)?,
        };
        merged.insert(key.clone(), value);
    }

    Ok(data_output(merged))
}

/// The reshaped data map. A `variables` key in data stays data; it is never
/// read back as variable updates.
fn data_output(merged: Map<String, Value>) -> StepOutput {
    StepOutput {
        output: Value::Object(merged),
        ..StepOutput::default()
    }
}

/// `{"$path": ..}` or `{"$expr": ..}` with a string argument
fn derivation(rule: &Value) -> Option<(&'static str, &str)> {
    let map: &Map<String, Value> = rule.as_object()?;
    if map.len() != 1 {
        return None;
    }
    ["$path", "$expr"]
        .into_iter()
        .find_map(|kind| map.get(kind).and_then(Value::as_str).map(|arg| (kind, arg)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{StepType, WorkflowDefinition};
    use serde_json::json;
    use std::sync::Arc;

    fn ctx() -> StepContext {
        StepContext {
            execution_id: "e".to_string(),
            definition: Arc::new(WorkflowDefinition::new("d")),
            data: json!({"user": {"name": "Ada"}, "amount": 21})
                .as_object()
                .cloned()
                .unwrap(),
            variables: json!({"rate": 2}).as_object().cloned().unwrap(),
        }
    }

    #[test]
    fn test_transform_rules() {
        let step = Step::new("shape", StepType::Data).with_config(
            "transform",
            json!({
                "customer": {"$path": "user.name"},
                "total": {"$expr": "amount * rate"},
                "source": "import",
                "missing": {"$path": "nope.deeper"}
            }),
        );

        let out = data(&step, &ctx()).unwrap();
        assert_eq!(out.output["customer"], json!("Ada"));
        assert_eq!(out.output["total"], json!(42));
        assert_eq!(out.output["source"], json!("import"));
        assert_eq!(out.output["missing"], Value::Null);
        assert_eq!(out.output["amount"], json!(21));
    }

    #[test]
    fn test_bad_expression_fails_closed() {
        let step = Step::new("shape", StepType::Data)
            .with_config("transform", json!({"flag": {"$expr": "amount >"}}));
        let out = data(&step, &ctx()).unwrap();
        assert_eq!(out.output["flag"], json!(false));
    }

    #[test]
    fn test_variables_key_in_data_is_not_a_variable_update() {
        let mut context = ctx();
        context
            .data
            .insert("variables".to_string(), json!({"rate": 1}));

        let passthrough = Step::new("shape", StepType::Data);
        let out = data(&passthrough, &context).unwrap();
        assert!(out.variables.is_empty());

        let reshaped = Step::new("shape", StepType::Data)
            .with_config("transform", json!({"source": "import"}));
        let out = data(&reshaped, &context).unwrap();
        assert!(out.variables.is_empty());
        assert_eq!(out.output["source"], json!("import"));
    }

    #[test]
    fn test_non_object_transform_rejected() {
        let step = Step::new("shape", StepType::Data).with_config("transform", json!([1]));
        assert!(matches!(
            data(&step, &ctx()),
            Err(StepError::InvalidParameter(_))
        ));
    }
}
