//! # Flowpilot
//!
//! A declarative workflow execution engine. Workflows are graphs of typed
//! steps (triggers, actions, conditions, loops, parallel branches, delays and
//! external calls) that the engine drives to completion while tracking
//! per-step state, variables and an execution log.
//!
//! ## Features
//!
//! - **YAML or JSON definitions** - Load workflows from files or build them in code
//! - **Branching and iteration** - Condition steps pick a branch, loop steps repeat a body
//! - **Parallel branches** - Join on all, any or first with per-branch results
//! - **Expressions** - A small, sandboxed expression language for guards and templates
//! - **Lifecycle control** - Pause, resume and cancel running executions
//! - **Pluggable capabilities** - HTTP, messaging, inference, query and named actions
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use flowpilot::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let yaml = r#"
//! name: approvals
//! variables:
//!   threshold: 100
//! steps:
//!   - id: start
//!     type: trigger
//!   - id: check
//!     type: condition
//!     config:
//!       condition: "data.amount > variables.threshold"
//!     conditions:
//!       then: [approve]
//!       else: [reject]
//!   - id: approve
//!     type: action
//!   - id: reject
//!     type: action
//! "#;
//!
//!     let engine = WorkflowEngine::new(EngineConfig::default())?;
//!     let workflow = engine
//!         .create_workflow(serde_yaml::from_str(yaml)?)
//!         .await?;
//!
//!     let data = serde_json::json!({ "amount": 150 });
//!     let execution = engine
//!         .execute(&workflow.id, data.as_object().cloned().unwrap_or_default())
//!         .await?;
//!
//!     println!("Execution finished: {:?}", execution.status);
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod engine;
pub mod workflow;

// Re-export main types
pub use adapters::{
    Action, ActionRegistry, AdapterError, Capabilities, HttpAdapter, HttpRequest, HttpResponse,
    InferenceAdapter, MessageSender, QueryAdapter, ReqwestHttpAdapter,
};
pub use engine::{
    BranchResult, DefinitionStore, EngineError, Execution, ExecutionLog, ExecutionStatus,
    ExecutionStore, LifecycleManager, LogEntry, LogLevel, RunningExecution, StepError,
    StepExecutionRecord, StepStatus, WorkflowEngine,
};
pub use workflow::{
    ConditionBranches, DefinitionError, DefinitionLoader, EngineConfig, ExpressionError,
    HttpConfig, LoadError, LoopConfig, LoopKind, ParallelConfig, Step, StepType, WaitFor,
    WorkflowDefinition, WorkflowStatus,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::adapters::{
        Action, AdapterError, Capabilities, HttpAdapter, HttpRequest, HttpResponse,
        InferenceAdapter, MessageSender, QueryAdapter,
    };
    pub use crate::engine::{
        EngineError, Execution, ExecutionStatus, LogLevel, RunningExecution, StepError,
        StepStatus, WorkflowEngine,
    };
    pub use crate::workflow::{
        evaluate, evaluate_condition, DefinitionLoader, EngineConfig, LoadError, LoopConfig,
        LoopKind, Step, StepType, WaitFor, WorkflowDefinition, WorkflowStatus,
    };
}
