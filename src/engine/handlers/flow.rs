//! Control-flow step handlers: trigger, action, condition, delay

use chrono::Utc;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{debug, info};

use super::{config_value, optional_str};
use crate::engine::error::StepError;
use crate::engine::executor::{StepContext, StepExecutor, StepOutput};
use crate::workflow::{evaluate_condition, Step};

pub fn trigger(step: &Step) -> Result<StepOutput, StepError> {
    Ok(StepOutput::new(json!({
        "triggered": true,
        "stepId": step.id,
        "timestamp": Utc::now().to_rfc3339(),
    })))
}

/// Run a registered action, or return the placeholder result when no
/// action with that name is registered
pub async fn action(
    executor: &StepExecutor,
    step: &Step,
    ctx: &StepContext,
) -> Result<StepOutput, StepError> {
    let name = step
        .config_str("action")
        .unwrap_or(step.name.as_str())
        .to_string();

    if let Some(registered) = executor.capabilities().actions.get(&name) {
        info!("Running action: {}", name);
        let mut config = Map::new();
        for key in step.config.keys() {
            if let Some(value) = config_value(step, key, ctx)? {
                config.insert(key.clone(), value);
            }
        }
        let result = registered
            .run(&config, &ctx.data)
            .await
            .map_err(|e| StepError::ActionFailed(format!("{}: {}", name, e)))?;

        let mut output = StepOutput::new(json!({ "action": name, "result": result }));
        if let Some(vars) = result_variables(&output.output) {
            output.variables = vars;
        }
        return Ok(output);
    }

    debug!(
        "No action registered for '{}' (registered: {:?}), using placeholder",
        name,
        executor.capabilities().actions.names()
    );
    let data = config_value(step, "data", ctx)?.unwrap_or_else(|| Value::Object(Map::new()));
    Ok(StepOutput::new(json!({
        "action": name,
        "result": "success",
        "data": data,
    })))
}

fn result_variables(output: &Value) -> Option<Map<String, Value>> {
    output
        .get("result")
        .and_then(|r| r.get("variables"))
        .and_then(Value::as_object)
        .cloned()
}

pub fn condition(step: &Step, ctx: &StepContext) -> Result<StepOutput, StepError> {
    let branches = step.conditions.as_ref();
    let expression = step
        .config_str("condition")
        .or_else(|| branches.and_then(|b| b.condition.as_deref()))
        .ok_or_else(|| StepError::MissingParameter("condition".to_string()))?;

    let result = evaluate_condition(expression, &ctx.data, &ctx.variables);
    let next: Vec<String> = branches
        .map(|b| {
            if result {
                b.then_steps.clone()
            } else {
                b.else_steps.clone()
            }
        })
        .unwrap_or_default();

    info!("Condition '{}' on {} -> {}", expression, step.id, result);

    let mut output = StepOutput::new(json!({
        "condition": expression,
        "result": result,
        "nextSteps": next,
    }));
    // An empty branch falls through to the declaration-order successor
    if !next.is_empty() {
        output.next_steps = Some(next);
    }
    Ok(output)
}

pub async fn delay(step: &Step, ctx: &StepContext) -> Result<StepOutput, StepError> {
    let amount = config_value(step, "delay", ctx)?
        .ok_or_else(|| StepError::MissingParameter("delay".to_string()))?;
    let amount = amount
        .as_f64()
        .or_else(|| amount.as_str().and_then(|s| s.trim().parse().ok()))
        .filter(|n| n.is_finite() && *n >= 0.0)
        .ok_or_else(|| StepError::InvalidParameter(format!("delay: {}", amount)))?;

    let unit = optional_str(step, "unit", ctx)?.unwrap_or_else(|| "ms".to_string());
    let factor = match unit.as_str() {
        "ms" | "milliseconds" => 1.0,
        "s" | "seconds" => 1_000.0,
        "m" | "minutes" => 60_000.0,
        "h" | "hours" => 3_600_000.0,
        other => {
            return Err(StepError::InvalidParameter(format!(
                "unknown delay unit: {}",
                other
            )))
        }
    };

    let millis = (amount * factor).round() as u64;
    debug!("Delaying {} for {}ms", step.id, millis);
    tokio::time::sleep(Duration::from_millis(millis)).await;

    Ok(StepOutput::new(json!({
        "delayed": millis,
        "unit": "ms",
    })))
}
