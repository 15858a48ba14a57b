//! Loop step handler
//!
//! Every iteration sets `variables.loopIndex`, checks the guard, runs the
//! body steps in order and then publishes `loopIndex` and `loopResult` so
//! the next guard check sees them. Body steps work on a loop-local copy of
//! data and variables; only the loop variables and the per-iteration
//! results flow back to the execution.

use serde_json::{json, Map, Value};
use tracing::{debug, info};

use super::config_value;
use crate::engine::error::StepError;
use crate::engine::executor::{NestedOutcome, StepContext, StepExecutor, StepOutput};
use crate::workflow::{evaluate_condition, ExpressionScope, LoopKind, Step};

pub async fn run_loop(
    executor: &StepExecutor,
    step: &Step,
    ctx: StepContext,
) -> Result<StepOutput, StepError> {
    let lp = step.loop_config.clone().unwrap_or_default();
    let max_iterations = lp
        .max_iterations
        .unwrap_or(executor.config().default_max_iterations);

    let items = match lp.kind {
        LoopKind::Foreach => Some(foreach_items(step, &ctx)?),
        _ => None,
    };
    let guard = lp.condition.clone();
    let count = match (&guard, lp.kind) {
        (None, LoopKind::For) => loop_count(step, &ctx)?,
        _ => None,
    };
    if guard.is_none() && count.is_none() && items.is_none() {
        return Err(StepError::MissingParameter("loop.condition".to_string()));
    }

    let mut data = ctx.data.clone();
    let mut variables = ctx.variables.clone();
    let mut results = Vec::new();
    let mut nested = Vec::new();
    let mut index: u32 = 0;

    while index < max_iterations {
        variables.insert("loopIndex".to_string(), json!(index));

        if let Some(items) = &items {
            match items.get(index as usize) {
                Some(item) => {
                    variables.insert("loopItem".to_string(), item.clone());
                }
                None => break,
            }
        }

        if count.is_some_and(|limit| index >= limit) {
            debug!("Loop {} reached count {}", step.id, index);
            break;
        }

        if let Some(guard) = &guard {
            if !evaluate_condition(guard, &data, &variables) {
                debug!("Loop {} guard false at iteration {}", step.id, index);
                break;
            }
        }

        let result = if lp.steps.is_empty() {
            json!({ "iteration": index })
        } else {
            let mut outputs = Map::new();
            for body_id in &lp.steps {
                let body = ctx
                    .definition
                    .step(body_id)
                    .ok_or_else(|| StepError::StepNotFound(body_id.clone()))?;
                let body_ctx = StepContext {
                    execution_id: ctx.execution_id.clone(),
                    definition: ctx.definition.clone(),
                    data: data.clone(),
                    variables: variables.clone(),
                };

                match executor.execute(body, body_ctx).await {
                    Ok(out) => {
                        merge_object(&mut data, &out.output);
                        for (key, value) in &out.variables {
                            variables.insert(key.clone(), value.clone());
                        }
                        outputs.insert(body_id.clone(), out.output.clone());
                        nested.push(NestedOutcome::completed(body_id, out.output));
                        nested.extend(out.nested);
                    }
                    Err(e) => {
                        outputs.insert(body_id.clone(), json!({ "error": e.to_string() }));
                        nested.push(NestedOutcome::failed(body_id, e.to_string()));
                    }
                }
            }
            Value::Object(outputs)
        };

        results.push(result.clone());
        index += 1;
        variables.insert("loopIndex".to_string(), json!(index));
        variables.insert("loopResult".to_string(), result);
    }

    info!("Loop {} finished after {} iteration(s)", step.id, index);

    let mut loop_vars = Map::new();
    for key in ["loopIndex", "loopResult"] {
        if let Some(value) = variables.get(key) {
            loop_vars.insert(key.to_string(), value.clone());
        }
    }

    Ok(StepOutput {
        output: json!({
            "loop": lp.kind,
            "iterations": index,
            "results": results,
        }),
        variables: loop_vars,
        iterations: Some(index),
        nested,
        ..StepOutput::default()
    })
}

/// `config.count` for `for` loops: a number or a template resolving to one
fn loop_count(step: &Step, ctx: &StepContext) -> Result<Option<u32>, StepError> {
    let Some(raw) = config_value(step, "count", ctx)? else {
        return Ok(None);
    };
    let count = match &raw {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    count
        .map(|n| Some(u32::try_from(n).unwrap_or(u32::MAX)))
        .ok_or_else(|| StepError::InvalidParameter(format!("count: {}", raw)))
}

/// `config.items`: a literal array, a `${{ }}` template or a path/expression
fn foreach_items(step: &Step, ctx: &StepContext) -> Result<Vec<Value>, StepError> {
    let raw = config_value(step, "items", ctx)?
        .ok_or_else(|| StepError::MissingParameter("items".to_string()))?;

    let resolved = match raw {
        Value::String(path) => {
            let scope = ExpressionScope::new(&ctx.data, &ctx.variables);
            scope
                .lookup_path(&path)
                .unwrap_or_else(|| crate::workflow::evaluate(&path, &ctx.data, &ctx.variables))
        }
        other => other,
    };

    match resolved {
        Value::Array(items) => Ok(items),
        other => Err(StepError::InvalidParameter(format!(
            "items must resolve to an array, got {}",
            other
        ))),
    }
}

fn merge_object(target: &mut Map<String, Value>, output: &Value) {
    if let Value::Object(map) = output {
        for (key, value) in map {
            if key != "variables" {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::Capabilities;
    use crate::workflow::{EngineConfig, LoopConfig, StepType, WorkflowDefinition};
    use std::sync::Arc;

    fn executor(max: u32) -> StepExecutor {
        StepExecutor::new(
            Capabilities::new(),
            Arc::new(EngineConfig {
                default_max_iterations: max,
                ..EngineConfig::default()
            }),
        )
    }

    fn ctx_for(def: WorkflowDefinition, data: Value) -> StepContext {
        StepContext {
            execution_id: "e".to_string(),
            definition: Arc::new(def),
            data: data.as_object().cloned().unwrap_or_default(),
            variables: Map::new(),
        }
    }

    #[tokio::test]
    async fn test_guard_bounds_iterations() {
        let step = Step::new("repeat", StepType::Loop).with_loop(LoopConfig {
            condition: Some("variables.loopIndex < 3".to_string()),
            max_iterations: Some(10),
            ..LoopConfig::default()
        });
        let def = WorkflowDefinition::new("l").with_step(step.clone());

        let out = run_loop(&executor(100), &step, ctx_for(def, json!({})))
            .await
            .unwrap();
        assert_eq!(out.iterations, Some(3));
        assert_eq!(out.output["results"].as_array().unwrap().len(), 3);
        assert_eq!(out.variables.get("loopIndex"), Some(&json!(3)));
    }

    #[tokio::test]
    async fn test_engine_default_cap_applies() {
        let step = Step::new("forever", StepType::Loop).with_loop(LoopConfig {
            condition: Some("true".to_string()),
            ..LoopConfig::default()
        });
        let def = WorkflowDefinition::new("l").with_step(step.clone());

        let out = run_loop(&executor(7), &step, ctx_for(def, json!({})))
            .await
            .unwrap();
        assert_eq!(out.iterations, Some(7));
    }

    #[tokio::test]
    async fn test_foreach_over_data_path() {
        let step = Step::new("each", StepType::Loop)
            .with_config("items", json!("data.orders"))
            .with_loop(LoopConfig {
                kind: LoopKind::Foreach,
                steps: vec!["tally".to_string()],
                ..LoopConfig::default()
            });
        let body = Step::new("tally", StepType::Data).with_config(
            "transform",
            json!({"lastItem": {"$path": "variables.loopItem"}}),
        );
        let def = WorkflowDefinition::new("l")
            .with_step(step.clone())
            .with_step(body);

        let out = run_loop(
            &executor(100),
            &step,
            ctx_for(def, json!({"orders": ["a", "b"]})),
        )
        .await
        .unwrap();
        assert_eq!(out.iterations, Some(2));
        assert_eq!(out.output["results"][1]["tally"]["lastItem"], json!("b"));
        assert_eq!(out.nested.len(), 2);
    }

    #[tokio::test]
    async fn test_for_count_shorthand() {
        let step = Step::new("count", StepType::Loop)
            .with_config("count", json!(4))
            .with_loop(LoopConfig {
                kind: LoopKind::For,
                ..LoopConfig::default()
            });
        let def = WorkflowDefinition::new("l").with_step(step.clone());

        let out = run_loop(&executor(100), &step, ctx_for(def, json!({})))
            .await
            .unwrap();
        assert_eq!(out.iterations, Some(4));
    }

    #[tokio::test]
    async fn test_for_count_from_template() {
        let step = Step::new("count", StepType::Loop)
            .with_config("count", json!("${{ data.n }}"))
            .with_loop(LoopConfig {
                kind: LoopKind::For,
                ..LoopConfig::default()
            });
        let def = WorkflowDefinition::new("l").with_step(step.clone());

        let out = run_loop(&executor(100), &step, ctx_for(def, json!({"n": 4})))
            .await
            .unwrap();
        assert_eq!(out.iterations, Some(4));
        assert_eq!(out.variables.get("loopIndex"), Some(&json!(4)));
    }

    #[tokio::test]
    async fn test_for_count_must_be_numeric() {
        let step = Step::new("count", StepType::Loop)
            .with_config("count", json!("${{ data.n }}"))
            .with_loop(LoopConfig {
                kind: LoopKind::For,
                ..LoopConfig::default()
            });
        let def = WorkflowDefinition::new("l").with_step(step.clone());

        let err = run_loop(&executor(100), &step, ctx_for(def, json!({"n": "lots"})))
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::InvalidParameter(_)));
    }

    #[tokio::test]
    async fn test_malformed_guard_runs_zero_iterations() {
        let step = Step::new("broken", StepType::Loop).with_loop(LoopConfig {
            condition: Some("loopIndex <<< 3".to_string()),
            ..LoopConfig::default()
        });
        let def = WorkflowDefinition::new("l").with_step(step.clone());

        let out = run_loop(&executor(100), &step, ctx_for(def, json!({})))
            .await
            .unwrap();
        assert_eq!(out.iterations, Some(0));
    }
}
