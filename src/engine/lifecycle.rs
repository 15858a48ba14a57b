//! Pause, resume and cancel requests plus per-definition run statistics

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

use crate::engine::execution::{ExecutionStatus, LogLevel};
use crate::engine::store::{DefinitionStore, ExecutionStore};

pub struct LifecycleManager {
    definitions: Arc<DefinitionStore>,
    executions: Arc<ExecutionStore>,
    statistics_window: usize,
}

impl LifecycleManager {
    pub fn new(
        definitions: Arc<DefinitionStore>,
        executions: Arc<ExecutionStore>,
        statistics_window: usize,
    ) -> Self {
        Self {
            definitions,
            executions,
            statistics_window: statistics_window.max(1),
        }
    }

    /// running -> paused
    pub async fn pause(&self, execution_id: &str) -> bool {
        self.executions
            .update(execution_id, |exec| {
                if exec.status != ExecutionStatus::Running {
                    return false;
                }
                exec.status = ExecutionStatus::Paused;
                exec.paused_at = Some(Utc::now());
                exec.log(LogLevel::Info, "Execution paused", None);
                true
            })
            .await
            .unwrap_or(false)
    }

    /// paused -> running
    pub async fn resume(&self, execution_id: &str) -> bool {
        self.executions
            .update(execution_id, |exec| {
                if exec.status != ExecutionStatus::Paused {
                    return false;
                }
                exec.status = ExecutionStatus::Running;
                exec.paused_at = None;
                exec.log(LogLevel::Info, "Execution resumed", None);
                true
            })
            .await
            .unwrap_or(false)
    }

    /// running | paused -> cancelled. The step in flight, if any, finishes;
    /// nothing after it starts.
    pub async fn cancel(&self, execution_id: &str) -> bool {
        self.executions
            .update(execution_id, |exec| {
                if !matches!(
                    exec.status,
                    ExecutionStatus::Running | ExecutionStatus::Paused
                ) {
                    return false;
                }
                exec.status = ExecutionStatus::Cancelled;
                exec.completed_at = Some(Utc::now());
                exec.log(LogLevel::Warn, "Execution cancelled", None);
                true
            })
            .await
            .unwrap_or(false)
    }

    /// Fold a finished execution into its definition's statistics. Returns
    /// `false` when the execution is unknown, still running, or its
    /// definition no longer exists.
    pub async fn record_run(&self, execution_id: &str) -> bool {
        let Some(execution) = self.executions.get(execution_id).await else {
            return false;
        };
        if !execution.status.is_terminal() {
            debug!("Execution {} has not finished, statistics unchanged", execution_id);
            return false;
        }

        let duration = execution.duration_ms().unwrap_or(0.0);
        let recent = self
            .executions
            .recent_terminal_statuses(&execution.workflow_id, self.statistics_window)
            .await;
        let completed = recent
            .iter()
            .filter(|s| **s == ExecutionStatus::Completed)
            .count();
        let success_rate = if recent.is_empty() {
            0.0
        } else {
            completed as f64 * 100.0 / recent.len() as f64
        };

        let updated = self
            .definitions
            .modify(&execution.workflow_id, |def| {
                def.execution_count += 1;
                let n = def.execution_count as f64;
                def.average_execution_time =
                    (def.average_execution_time * (n - 1.0) + duration) / n;
                def.success_rate = success_rate;
                def.last_run = Some(Utc::now());
                def.execution_count
            })
            .await;

        match updated {
            Some(count) => {
                info!(
                    "Workflow {} statistics: {} run(s), {:.1}% success",
                    execution.workflow_id, count, success_rate
                );
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::execution::Execution;
    use crate::workflow::{Step, StepType, WorkflowDefinition};
    use serde_json::Map;

    async fn setup() -> (LifecycleManager, Arc<ExecutionStore>, WorkflowDefinition) {
        let definitions = Arc::new(DefinitionStore::new());
        let executions = Arc::new(ExecutionStore::new());
        let def = definitions
            .create(WorkflowDefinition::new("stats").with_step(Step::new("s", StepType::Trigger)))
            .await
            .unwrap();
        (
            LifecycleManager::new(definitions, executions.clone(), 10),
            executions,
            def,
        )
    }

    #[tokio::test]
    async fn test_pause_resume_cancel_transitions() {
        let (lifecycle, executions, def) = setup().await;
        let exec = Execution::new(&def, Map::new());
        let id = exec.id.clone();
        executions.insert(exec).await;

        assert!(!lifecycle.resume(&id).await);
        assert!(lifecycle.pause(&id).await);
        assert!(!lifecycle.pause(&id).await);
        assert!(executions.get(&id).await.unwrap().paused_at.is_some());

        assert!(lifecycle.resume(&id).await);
        assert!(executions.get(&id).await.unwrap().paused_at.is_none());

        assert!(lifecycle.cancel(&id).await);
        assert!(!lifecycle.cancel(&id).await);
        assert!(!lifecycle.pause(&id).await);

        let exec = executions.get(&id).await.unwrap();
        assert_eq!(exec.status, ExecutionStatus::Cancelled);
        assert!(exec.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_unknown_execution_is_false() {
        let (lifecycle, _, _) = setup().await;
        assert!(!lifecycle.pause("missing").await);
        assert!(!lifecycle.record_run("missing").await);
    }

    #[tokio::test]
    async fn test_running_execution_not_counted() {
        let (lifecycle, executions, def) = setup().await;
        let exec = Execution::new(&def, Map::new());
        let id = exec.id.clone();
        executions.insert(exec).await;
        assert!(!lifecycle.record_run(&id).await);
    }
}
