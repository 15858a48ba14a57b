//! Execution Orchestrator - Drives one execution through its step graph
//!
//! Traversal is breadth-first from the trigger steps:
//! 1. Check the execution status (stop on cancel, wait while paused)
//! 2. Pop the next step id and skip it if already visited
//! 3. Run the step and fold its output into the execution
//! 4. Enqueue the successors: the step's explicit next steps, or else the
//!    next step in declaration order that no other step wires to
//!
//! A failing step is recorded and traversal carries on.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use crate::engine::error::{EngineError, StepError};
use crate::engine::execution::{Execution, ExecutionStatus, LogLevel, StepStatus};
use crate::engine::executor::{StepContext, StepExecutor, StepOutput};
use crate::engine::store::ExecutionStore;
use crate::workflow::{Step, WorkflowDefinition};

pub struct Orchestrator {
    executions: Arc<ExecutionStore>,
    executor: StepExecutor,
}

impl Orchestrator {
    pub fn new(executions: Arc<ExecutionStore>, executor: StepExecutor) -> Self {
        Self {
            executions,
            executor,
        }
    }

    /// Run an already-stored execution to a terminal state
    #[instrument(skip(self, definition), fields(workflow = %definition.name))]
    pub async fn run(
        &self,
        execution_id: &str,
        definition: Arc<WorkflowDefinition>,
    ) -> Result<ExecutionStatus, EngineError> {
        let outcome = self.traverse(execution_id, &definition).await;

        self.executions
            .update(execution_id, |exec| finalize(exec, outcome))
            .await
            .ok_or_else(|| EngineError::ExecutionNotFound(execution_id.to_string()))
    }

    async fn traverse(
        &self,
        execution_id: &str,
        definition: &Arc<WorkflowDefinition>,
    ) -> Result<(), EngineError> {
        let mut status_rx = self
            .executions
            .subscribe(execution_id)
            .await
            .ok_or_else(|| EngineError::ExecutionNotFound(execution_id.to_string()))?;

        let wired = definition.wired_ids();
        let mut queue: VecDeque<String> = definition.trigger_ids().into();
        let mut visited: HashSet<String> = HashSet::new();

        let triggers = queue.len();
        self.log(
            execution_id,
            LogLevel::Info,
            format!("Starting traversal from {} trigger(s)", triggers),
            None,
        )
        .await?;

        loop {
            if !wait_while_paused(&mut status_rx).await {
                self.log(execution_id, LogLevel::Info, "Traversal stopped", None)
                    .await?;
                return Ok(());
            }

            let Some(step_id) = queue.pop_front() else {
                break;
            };
            if !visited.insert(step_id.clone()) {
                continue;
            }

            let Some(step) = definition.step(&step_id) else {
                warn!("Queued step {} is not in the definition", step_id);
                continue;
            };

            let ctx = self
                .executions
                .update(execution_id, |exec| begin_step(exec, step, definition))
                .await
                .ok_or_else(|| EngineError::ExecutionNotFound(execution_id.to_string()))?;
            let Some(ctx) = ctx else {
                continue;
            };

            let result = self.executor.execute(step, ctx).await;

            let hint = self
                .executions
                .update(execution_id, |exec| {
                    finish_step(exec, step, result, &mut visited)
                })
                .await
                .ok_or_else(|| EngineError::ExecutionNotFound(execution_id.to_string()))?;

            let next = hint.unwrap_or_else(|| implicit_successor(definition, step, &wired));
            queue.extend(next.into_iter().filter(|id| !visited.contains(id)));
        }

        Ok(())
    }

    async fn log(
        &self,
        execution_id: &str,
        level: LogLevel,
        message: impl Into<String>,
        step_id: Option<&str>,
    ) -> Result<(), EngineError> {
        let message = message.into();
        self.executions
            .update(execution_id, |exec| exec.log(level, message, step_id))
            .await
            .ok_or_else(|| EngineError::ExecutionNotFound(execution_id.to_string()))
    }
}

/// Settle the final status once traversal has returned. A pause that lands
/// after the last step has nothing left to hold back, so it completes too.
fn finalize(exec: &mut Execution, outcome: Result<(), EngineError>) -> ExecutionStatus {
    match outcome {
        Err(e) if !exec.status.is_terminal() => {
            exec.status = ExecutionStatus::Failed;
            exec.paused_at = None;
            exec.error = Some(e.to_string());
            exec.log(LogLevel::Error, format!("Execution failed: {}", e), None);
        }
        Err(_) => {}
        Ok(()) => {
            if matches!(exec.status, ExecutionStatus::Running | ExecutionStatus::Paused) {
                exec.status = ExecutionStatus::Completed;
                exec.paused_at = None;
                exec.log(LogLevel::Info, "Execution completed", None);
            }
        }
    }
    if exec.completed_at.is_none() {
        exec.completed_at = Some(chrono::Utc::now());
    }
    exec.status
}

/// Returns `true` to keep going, `false` once the execution stopped running
async fn wait_while_paused(status_rx: &mut watch::Receiver<ExecutionStatus>) -> bool {
    loop {
        let status = *status_rx.borrow_and_update();
        match status {
            ExecutionStatus::Running => return true,
            ExecutionStatus::Paused => {
                if status_rx.changed().await.is_err() {
                    return false;
                }
            }
            _ => return false,
        }
    }
}

fn begin_step(
    exec: &mut Execution,
    step: &Step,
    definition: &Arc<WorkflowDefinition>,
) -> Option<StepContext> {
    let Some(record) = exec.record_mut(&step.id) else {
        exec.log(
            LogLevel::Warn,
            "No execution record for step, skipping",
            Some(&step.id),
        );
        return None;
    };
    record.start();

    exec.log(
        LogLevel::Info,
        format!("Executing step: {}", step.name),
        Some(&step.id),
    );

    Some(StepContext {
        execution_id: exec.id.clone(),
        definition: definition.clone(),
        data: exec.data.clone(),
        variables: exec.variables.clone(),
    })
}

/// Fold a step result into the execution; returns the explicit successors
fn finish_step(
    exec: &mut Execution,
    step: &Step,
    result: Result<StepOutput, StepError>,
    visited: &mut HashSet<String>,
) -> Option<Vec<String>> {
    match result {
        Ok(out) => {
            if let Some(record) = exec.record_mut(&step.id) {
                record.complete(out.output.clone());
                record.iterations = out.iterations;
                record.branch_results = out.branch_results.clone();
            }
            exec.merge_output(&step.id, &out.output);
            exec.merge_variables(&out.variables);

            for nested in &out.nested {
                visited.insert(nested.step_id.clone());
                if let Some(record) = exec.record_mut(&nested.step_id) {
                    match nested.status {
                        StepStatus::Completed => {
                            record.complete(nested.output.clone().unwrap_or_default())
                        }
                        StepStatus::Failed => record.fail(nested.error.clone().unwrap_or_default()),
                        StepStatus::Skipped => record.skip(),
                        StepStatus::Pending | StepStatus::Running => {}
                    }
                }
            }

            exec.log(LogLevel::Info, "Step completed", Some(&step.id));
            out.next_steps
        }
        Err(e) => {
            if let Some(branch_results) = e.branch_results() {
                for (branch_id, branch) in branch_results {
                    visited.insert(branch_id.clone());
                    if let Some(record) = exec.record_mut(branch_id) {
                        record.fail(branch.error.clone().unwrap_or_default());
                    }
                }
            }

            let message = e.to_string();
            if let Some(record) = exec.record_mut(&step.id) {
                record.fail(message.clone());
                record.branch_results = e.branch_results().cloned();
            }
            exec.log(
                LogLevel::Error,
                format!("Step failed: {}", message),
                Some(&step.id),
            );
            None
        }
    }
}

/// The next step in declaration order that is not an explicit edge target
fn implicit_successor(
    definition: &WorkflowDefinition,
    step: &Step,
    wired: &HashSet<&str>,
) -> Vec<String> {
    let Some(index) = definition.step_index(&step.id) else {
        return Vec::new();
    };
    definition.steps[index + 1..]
        .iter()
        .find(|s| !wired.contains(s.id.as_str()))
        .map(|s| vec![s.id.clone()])
        .unwrap_or_default()
}
