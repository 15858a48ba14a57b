//! Workflow types and definitions
//!
//! This module contains all types for defining and loading workflows:
//! - `definition` - WorkflowDefinition, Step and the per-type blocks
//! - `context` - ExpressionScope for name resolution
//! - `expressions` - The condition/guard expression language
//! - `loader` - Load definitions from files and directories
//! - `template` - `${{ }}` interpolation of step config values
//! - `engine_config` - Engine-wide settings

pub mod context;
pub mod definition;
pub mod engine_config;
pub mod expressions;
pub mod loader;
pub mod template;

// Re-export all public types for convenience
pub use context::ExpressionScope;
pub use definition::{
    ConditionBranches, DefinitionError, LoopConfig, LoopKind, ParallelConfig, Step, StepType,
    WaitFor, WorkflowDefinition, WorkflowStatus,
};
pub use engine_config::{EngineConfig, HttpConfig};
pub use expressions::{evaluate, evaluate_condition, try_evaluate, ExpressionError};
pub use loader::{DefinitionLoader, LoadError};
pub use template::{interpolate, interpolate_value};
