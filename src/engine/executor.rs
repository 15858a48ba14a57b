//! Step Executor - Runs a single step against a snapshot of execution state
//!
//! The executor:
//! 1. Dispatches on the step type to a handler in `engine::handlers`
//! 2. Hands each handler the execution's data and variables
//! 3. Returns the step output plus any variable updates and routing hints
//!
//! Loop and parallel handlers call back into the executor for their body and
//! branch steps, so `execute` returns a boxed future.

use futures::future::{BoxFuture, FutureExt};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::adapters::Capabilities;
use crate::engine::error::StepError;
use crate::engine::execution::{BranchResult, StepStatus};
use crate::engine::handlers::{flow, integration, iteration, parallel, transform};
use crate::workflow::{EngineConfig, Step, StepType, WorkflowDefinition};

/// Everything a handler may read while running one step
#[derive(Debug, Clone)]
pub struct StepContext {
    pub execution_id: String,
    pub definition: Arc<WorkflowDefinition>,
    pub data: Map<String, Value>,
    pub variables: Map<String, Value>,
}

/// Result of a step that ran nested steps (loop body or parallel branch)
#[derive(Debug, Clone)]
pub struct NestedOutcome {
    pub step_id: String,
    pub status: StepStatus,
    pub output: Option<Value>,
    pub error: Option<String>,
}

impl NestedOutcome {
    pub fn completed(step_id: &str, output: Value) -> Self {
        Self {
            step_id: step_id.to_string(),
            status: StepStatus::Completed,
            output: Some(output),
            error: None,
        }
    }

    pub fn failed(step_id: &str, error: impl Into<String>) -> Self {
        Self {
            step_id: step_id.to_string(),
            status: StepStatus::Failed,
            output: None,
            error: Some(error.into()),
        }
    }

    pub fn skipped(step_id: &str) -> Self {
        Self {
            step_id: step_id.to_string(),
            status: StepStatus::Skipped,
            output: None,
            error: None,
        }
    }
}

/// What a successful step hands back to the orchestrator
#[derive(Debug, Clone, Default)]
pub struct StepOutput {
    pub output: Value,
    /// Merged into the execution's variables
    pub variables: Map<String, Value>,
    /// Explicit successors; `None` means "next step in declaration order"
    pub next_steps: Option<Vec<String>>,
    pub iterations: Option<u32>,
    pub branch_results: Option<BTreeMap<String, BranchResult>>,
    /// Steps run on this step's behalf
    pub nested: Vec<NestedOutcome>,
}

impl StepOutput {
    /// Wrap an output value; an object-valued `variables` key becomes the
    /// variable updates
    pub fn new(output: Value) -> Self {
        let variables = output
            .get("variables")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        Self {
            output,
            variables,
            ..Self::default()
        }
    }
}

/// Runs individual steps; cheap to clone for parallel branches
#[derive(Clone)]
pub struct StepExecutor {
    capabilities: Capabilities,
    config: Arc<EngineConfig>,
}

impl StepExecutor {
    pub fn new(capabilities: Capabilities, config: Arc<EngineConfig>) -> Self {
        Self {
            capabilities,
            config,
        }
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one step
    pub fn execute<'a>(
        &'a self,
        step: &'a Step,
        ctx: StepContext,
    ) -> BoxFuture<'a, Result<StepOutput, StepError>> {
        async move {
            debug!(
                execution_id = %ctx.execution_id,
                "Executing step: {} ({:?})",
                step.id,
                step.step_type
            );

            match step.step_type {
                StepType::Trigger => flow::trigger(step),
                StepType::Action => flow::action(self, step, &ctx).await,
                StepType::Condition => flow::condition(step, &ctx),
                StepType::Delay => flow::delay(step, &ctx).await,
                StepType::Loop => iteration::run_loop(self, step, ctx).await,
                StepType::Parallel => parallel::run_parallel(self, step, ctx).await,
                StepType::Webhook | StepType::Api => {
                    integration::http_call(self, step, &ctx).await
                }
                StepType::Email => integration::email(self, step, &ctx).await,
                StepType::Ai => integration::ai(self, step, &ctx).await,
                StepType::Database => integration::database(self, step, &ctx).await,
                StepType::Data => transform::data(step, &ctx),
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_output_extracts_variables() {
        let out = StepOutput::new(json!({"ok": true, "variables": {"count": 2}}));
        assert_eq!(out.variables.get("count"), Some(&json!(2)));
        assert!(out.next_steps.is_none());

        let plain = StepOutput::new(json!("text"));
        assert!(plain.variables.is_empty());
    }

    #[tokio::test]
    async fn test_trigger_step() {
        let executor = StepExecutor::new(Capabilities::new(), Arc::new(EngineConfig::default()));
        let step = Step::new("start", StepType::Trigger);
        let def = WorkflowDefinition::new("t").with_step(step.clone());
        let ctx = StepContext {
            execution_id: "e".to_string(),
            definition: Arc::new(def),
            data: Map::new(),
            variables: Map::new(),
        };

        let out = executor.execute(&step, ctx).await.unwrap();
        assert_eq!(out.output["triggered"], json!(true));
        assert_eq!(out.output["stepId"], json!("start"));
    }
}
