//! In-memory stores for definitions and executions
//!
//! Both stores are keyed by id and guarded by a tokio `RwLock`. Mutations run
//! a closure under the write guard so a read-modify-write is never torn.
//! Every execution also owns a `watch` channel carrying its status, which the
//! orchestrator uses to notice pause, resume and cancel requests.

use std::collections::HashMap;
use tokio::sync::{watch, RwLock};
use tracing::debug;

use crate::engine::execution::{Execution, ExecutionStatus};
use crate::workflow::{DefinitionError, WorkflowDefinition};

// ============================================================================
// Definitions
// ============================================================================

#[derive(Debug, Default)]
pub struct DefinitionStore {
    definitions: RwLock<HashMap<String, WorkflowDefinition>>,
}

impl DefinitionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and store a definition under a fresh id
    pub async fn create(
        &self,
        mut definition: WorkflowDefinition,
    ) -> Result<WorkflowDefinition, DefinitionError> {
        definition.validate()?;
        definition.id = uuid::Uuid::new_v4().to_string();

        debug!("Storing workflow '{}' as {}", definition.name, definition.id);
        self.definitions
            .write()
            .await
            .insert(definition.id.clone(), definition.clone());
        Ok(definition)
    }

    pub async fn get(&self, id: &str) -> Option<WorkflowDefinition> {
        self.definitions.read().await.get(id).cloned()
    }

    /// Replace the structure of a stored definition. The id and run
    /// statistics of the stored copy are kept.
    pub async fn update(
        &self,
        id: &str,
        mut definition: WorkflowDefinition,
    ) -> Result<Option<WorkflowDefinition>, DefinitionError> {
        definition.validate()?;

        let mut definitions = self.definitions.write().await;
        let Some(existing) = definitions.get_mut(id) else {
            return Ok(None);
        };

        definition.id = existing.id.clone();
        definition.execution_count = existing.execution_count;
        definition.success_rate = existing.success_rate;
        definition.average_execution_time = existing.average_execution_time;
        definition.last_run = existing.last_run;

        *existing = definition.clone();
        Ok(Some(definition))
    }

    /// Run a mutation against a stored definition
    pub async fn modify<F, R>(&self, id: &str, f: F) -> Option<R>
    where
        F: FnOnce(&mut WorkflowDefinition) -> R,
    {
        self.definitions.write().await.get_mut(id).map(f)
    }

    pub async fn delete(&self, id: &str) -> Option<WorkflowDefinition> {
        self.definitions.write().await.remove(id)
    }

    /// All definitions, sorted by name
    pub async fn list(&self) -> Vec<WorkflowDefinition> {
        let mut all: Vec<_> = self.definitions.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        all
    }
}

// ============================================================================
// Executions
// ============================================================================

#[derive(Debug)]
struct ExecutionEntry {
    execution: Execution,
    /// Insertion order, breaks ties between equal start times
    seq: u64,
    status_tx: watch::Sender<ExecutionStatus>,
}

#[derive(Debug, Default)]
struct ExecutionTable {
    entries: HashMap<String, ExecutionEntry>,
    next_seq: u64,
}

#[derive(Debug, Default)]
pub struct ExecutionStore {
    table: RwLock<ExecutionTable>,
}

impl ExecutionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new execution and return a receiver for its status
    pub async fn insert(&self, execution: Execution) -> watch::Receiver<ExecutionStatus> {
        let (status_tx, status_rx) = watch::channel(execution.status);
        let mut table = self.table.write().await;
        let seq = table.next_seq;
        table.next_seq += 1;
        table.entries.insert(
            execution.id.clone(),
            ExecutionEntry {
                execution,
                seq,
                status_tx,
            },
        );
        status_rx
    }

    pub async fn get(&self, id: &str) -> Option<Execution> {
        self.table
            .read()
            .await
            .entries
            .get(id)
            .map(|e| e.execution.clone())
    }

    /// Run a mutation against a stored execution. A status change made by
    /// the closure is broadcast to subscribers.
    pub async fn update<F, R>(&self, id: &str, f: F) -> Option<R>
    where
        F: FnOnce(&mut Execution) -> R,
    {
        let mut table = self.table.write().await;
        let entry = table.entries.get_mut(id)?;

        let before = entry.execution.status;
        let result = f(&mut entry.execution);
        let after = entry.execution.status;

        if before != after {
            entry.status_tx.send_replace(after);
        }
        Some(result)
    }

    pub async fn subscribe(&self, id: &str) -> Option<watch::Receiver<ExecutionStatus>> {
        self.table
            .read()
            .await
            .entries
            .get(id)
            .map(|e| e.status_tx.subscribe())
    }

    /// Executions of one workflow, most recent first
    pub async fn list_by_workflow(&self, workflow_id: &str) -> Vec<Execution> {
        let table = self.table.read().await;
        let mut matching: Vec<&ExecutionEntry> = table
            .entries
            .values()
            .filter(|e| e.execution.workflow_id == workflow_id)
            .collect();
        matching.sort_by(|a, b| {
            b.execution
                .started_at
                .cmp(&a.execution.started_at)
                .then_with(|| b.seq.cmp(&a.seq))
        });
        matching.into_iter().map(|e| e.execution.clone()).collect()
    }

    /// Statuses of the most recent finished executions of one workflow
    pub async fn recent_terminal_statuses(
        &self,
        workflow_id: &str,
        limit: usize,
    ) -> Vec<ExecutionStatus> {
        self.list_by_workflow(workflow_id)
            .await
            .into_iter()
            .map(|e| e.status)
            .filter(ExecutionStatus::is_terminal)
            .take(limit)
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
