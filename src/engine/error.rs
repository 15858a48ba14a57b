//! Engine and step error types

use serde_json::Value;
use std::collections::BTreeMap;

use crate::adapters::AdapterError;
use crate::engine::execution::BranchResult;
use crate::workflow::{DefinitionError, ExpressionError};

/// Errors surfaced by the engine to its callers
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("Invalid workflow: {0}")]
    InvalidDefinition(#[from] DefinitionError),

    #[error("Execution not found: {0}")]
    ExecutionNotFound(String),

    #[error("Adapter setup failed: {0}")]
    Adapter(#[from] AdapterError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised by a step handler; recorded on the step, never fatal to the run
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Step not found: {0}")]
    StepNotFound(String),

    #[error("No {0} adapter configured")]
    CapabilityUnavailable(&'static str),

    #[error("HTTP error: status {status}")]
    HttpStatus { status: u16, body: Value },

    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("Expression error: {0}")]
    Expression(#[from] ExpressionError),

    #[error("No parallel branch succeeded ({} failed)", .branch_results.len())]
    NoBranchSucceeded {
        branch_results: BTreeMap<String, BranchResult>,
    },

    #[error("Action failed: {0}")]
    ActionFailed(String),
}

impl StepError {
    /// Per-branch outcomes carried by a failed parallel step
    pub fn branch_results(&self) -> Option<&BTreeMap<String, BranchResult>> {
        match self {
            StepError::NoBranchSucceeded { branch_results } => Some(branch_results),
            _ => None,
        }
    }
}
