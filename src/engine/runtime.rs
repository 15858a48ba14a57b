//! WorkflowEngine - the public entry point
//!
//! Owns the definition and execution stores, the orchestrator and the
//! lifecycle manager, and wires them together. Cloning is cheap; clones
//! share the same stores.

use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::adapters::{Capabilities, ReqwestHttpAdapter};
use crate::engine::error::EngineError;
use crate::engine::execution::Execution;
use crate::engine::executor::StepExecutor;
use crate::engine::lifecycle::LifecycleManager;
use crate::engine::orchestrator::Orchestrator;
use crate::engine::store::{DefinitionStore, ExecutionStore};
use crate::workflow::{EngineConfig, WorkflowDefinition};

#[derive(Clone)]
pub struct WorkflowEngine {
    config: Arc<EngineConfig>,
    definitions: Arc<DefinitionStore>,
    executions: Arc<ExecutionStore>,
    orchestrator: Arc<Orchestrator>,
    lifecycle: Arc<LifecycleManager>,
}

/// An execution running in the background
pub struct RunningExecution {
    pub id: String,
    handle: JoinHandle<Option<Execution>>,
}

impl RunningExecution {
    /// Wait for the run to finish and its statistics to be recorded
    pub async fn wait(self) -> Result<Execution, EngineError> {
        match self.handle.await {
            Ok(Some(execution)) => Ok(execution),
            Ok(None) => Err(EngineError::ExecutionNotFound(self.id)),
            Err(e) => Err(EngineError::Internal(format!("execution task failed: {}", e))),
        }
    }
}

impl WorkflowEngine {
    /// Engine with the bundled reqwest HTTP adapter and no other capabilities
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let http = ReqwestHttpAdapter::from_config(&config.http)?;
        Ok(Self::with_capabilities(
            config,
            Capabilities::new().with_http(Arc::new(http)),
        ))
    }

    pub fn with_capabilities(config: EngineConfig, capabilities: Capabilities) -> Self {
        let config = Arc::new(config);
        let definitions = Arc::new(DefinitionStore::new());
        let executions = Arc::new(ExecutionStore::new());

        let executor = StepExecutor::new(capabilities, config.clone());
        let orchestrator = Arc::new(Orchestrator::new(executions.clone(), executor));
        let lifecycle = Arc::new(LifecycleManager::new(
            definitions.clone(),
            executions.clone(),
            config.statistics_window,
        ));

        Self {
            config,
            definitions,
            executions,
            orchestrator,
            lifecycle,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn definitions(&self) -> &DefinitionStore {
        &self.definitions
    }

    pub fn executions(&self) -> &ExecutionStore {
        &self.executions
    }

    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    // ------------------------------------------------------------------------
    // Definitions
    // ------------------------------------------------------------------------

    pub async fn create_workflow(
        &self,
        definition: WorkflowDefinition,
    ) -> Result<WorkflowDefinition, EngineError> {
        Ok(self.definitions.create(definition).await?)
    }

    pub async fn get_workflow(&self, id: &str) -> Option<WorkflowDefinition> {
        self.definitions.get(id).await
    }

    pub async fn update_workflow(
        &self,
        id: &str,
        definition: WorkflowDefinition,
    ) -> Result<WorkflowDefinition, EngineError> {
        self.definitions
            .update(id, definition)
            .await?
            .ok_or_else(|| EngineError::WorkflowNotFound(id.to_string()))
    }

    pub async fn delete_workflow(&self, id: &str) -> Result<WorkflowDefinition, EngineError> {
        self.definitions
            .delete(id)
            .await
            .ok_or_else(|| EngineError::WorkflowNotFound(id.to_string()))
    }

    pub async fn list_workflows(&self) -> Vec<WorkflowDefinition> {
        self.definitions.list().await
    }

    // ------------------------------------------------------------------------
    // Executions
    // ------------------------------------------------------------------------

    /// Run a workflow to completion and return the final execution
    pub async fn execute(
        &self,
        workflow_id: &str,
        trigger_data: Map<String, Value>,
    ) -> Result<Execution, EngineError> {
        let (execution_id, definition) = self.prepare(workflow_id, trigger_data).await?;
        self.drive(&execution_id, definition)
            .await
            .ok_or(EngineError::ExecutionNotFound(execution_id))
    }

    /// Start a workflow in the background. The execution record exists by
    /// the time this returns, so pause/resume/cancel can target it at once.
    pub async fn start(
        &self,
        workflow_id: &str,
        trigger_data: Map<String, Value>,
    ) -> Result<RunningExecution, EngineError> {
        let (execution_id, definition) = self.prepare(workflow_id, trigger_data).await?;

        let engine = self.clone();
        let id = execution_id.clone();
        let handle = tokio::spawn(async move { engine.drive(&id, definition).await });

        Ok(RunningExecution {
            id: execution_id,
            handle,
        })
    }

    pub async fn pause(&self, execution_id: &str) -> bool {
        self.lifecycle.pause(execution_id).await
    }

    pub async fn resume(&self, execution_id: &str) -> bool {
        self.lifecycle.resume(execution_id).await
    }

    pub async fn cancel(&self, execution_id: &str) -> bool {
        self.lifecycle.cancel(execution_id).await
    }

    pub async fn get_execution(&self, execution_id: &str) -> Option<Execution> {
        self.executions.get(execution_id).await
    }

    /// Executions of a workflow, most recent first
    pub async fn list_executions(&self, workflow_id: &str) -> Vec<Execution> {
        self.executions.list_by_workflow(workflow_id).await
    }

    /// Snapshot the definition and create the execution record
    async fn prepare(
        &self,
        workflow_id: &str,
        trigger_data: Map<String, Value>,
    ) -> Result<(String, Arc<WorkflowDefinition>), EngineError> {
        let definition = self
            .definitions
            .get(workflow_id)
            .await
            .ok_or_else(|| EngineError::WorkflowNotFound(workflow_id.to_string()))?;

        let execution = Execution::new(&definition, trigger_data);
        let execution_id = execution.id.clone();
        info!(
            "Starting execution {} of workflow '{}'",
            execution_id, definition.name
        );
        self.executions.insert(execution).await;

        Ok((execution_id, Arc::new(definition)))
    }

    async fn drive(
        &self,
        execution_id: &str,
        definition: Arc<WorkflowDefinition>,
    ) -> Option<Execution> {
        match self.orchestrator.run(execution_id, definition).await {
            Ok(status) => info!("Execution {} finished: {:?}", execution_id, status),
            Err(e) => error!("Execution {} could not finish: {}", execution_id, e),
        }
        self.lifecycle.record_run(execution_id).await;
        self.executions.get(execution_id).await
    }
}
