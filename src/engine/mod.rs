//! Workflow execution engine module
//!
//! This module contains:
//! - `runtime` - The `WorkflowEngine` facade
//! - `orchestrator` - Breadth-first traversal of one execution
//! - `executor` - Per-step dispatch
//! - `handlers` - Step handlers by step type
//! - `lifecycle` - Pause/resume/cancel and run statistics
//! - `store` - Definition and execution stores
//! - `execution` - Execution, step record and log types
//! - `error` - Engine and step error types

pub mod error;
pub mod execution;
pub mod executor;
pub mod handlers;
pub mod lifecycle;
pub mod orchestrator;
pub mod runtime;
pub mod store;

pub use error::{EngineError, StepError};
pub use execution::{
    BranchResult, Execution, ExecutionLog, ExecutionStatus, LogEntry, LogLevel,
    StepExecutionRecord, StepStatus,
};
pub use executor::{NestedOutcome, StepContext, StepExecutor, StepOutput};
pub use lifecycle::LifecycleManager;
pub use orchestrator::Orchestrator;
pub use runtime::{RunningExecution, WorkflowEngine};
pub use store::{DefinitionStore, ExecutionStore};
