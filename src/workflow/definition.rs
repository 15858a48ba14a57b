//! Workflow definition and step types
//!
//! A definition is a declaration-ordered list of typed steps plus the
//! initial variables every execution starts from. Field names are camelCase
//! so the same document loads from YAML or JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;

// ============================================================================
// Workflow
// ============================================================================

/// Lifecycle status of a definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    #[default]
    Draft,
    Active,
    Inactive,
    Testing,
    Error,
}

/// A complete workflow definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    /// Engine-assigned identifier (empty until stored)
    #[serde(default)]
    pub id: String,

    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub status: WorkflowStatus,

    /// Steps in declaration order (not execution order)
    #[serde(default)]
    pub steps: Vec<Step>,

    /// Initial variables, copied into every execution
    #[serde(default)]
    pub variables: Map<String, Value>,

    #[serde(default)]
    pub category: String,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub execution_count: u64,

    /// Percentage of completed runs among the most recent executions
    #[serde(default)]
    pub success_rate: f64,

    /// Running average in milliseconds
    #[serde(default)]
    pub average_execution_time: f64,

    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

/// Validation failures for a definition
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DefinitionError {
    #[error("Workflow name must not be empty")]
    EmptyName,

    #[error("Duplicate step id: {0}")]
    DuplicateStep(String),

    #[error("Step '{step}' references unknown step '{target}'")]
    UnknownTarget { step: String, target: String },

    #[error("Loop step '{0}' must allow at least one iteration")]
    ZeroIterations(String),
}

impl WorkflowDefinition {
    /// Create an empty draft definition
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            description: String::new(),
            version: default_version(),
            status: WorkflowStatus::Draft,
            steps: Vec::new(),
            variables: Map::new(),
            category: String::new(),
            tags: Vec::new(),
            execution_count: 0,
            success_rate: 0.0,
            average_execution_time: 0.0,
            last_run: None,
        }
    }

    /// Append a step (builder style)
    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Set an initial variable (builder style)
    pub fn with_variable(mut self, key: &str, value: Value) -> Self {
        self.variables.insert(key.to_string(), value);
        self
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn step_index(&self, id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == id)
    }

    /// Ids of all trigger steps, in declaration order
    pub fn trigger_ids(&self) -> Vec<String> {
        self.steps
            .iter()
            .filter(|s| s.step_type == StepType::Trigger)
            .map(|s| s.id.clone())
            .collect()
    }

    /// Steps reached only through an explicit edge: condition branches,
    /// parallel branches and loop bodies. These never act as the implicit
    /// "next in declaration order" successor of another step.
    pub fn wired_ids(&self) -> HashSet<&str> {
        self.steps
            .iter()
            .flat_map(|s| s.wired_targets())
            .collect()
    }

    /// Check structural consistency
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.name.trim().is_empty() {
            return Err(DefinitionError::EmptyName);
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.id.as_str()) {
                return Err(DefinitionError::DuplicateStep(step.id.clone()));
            }
        }

        for step in &self.steps {
            for target in step.wired_targets() {
                if !seen.contains(target) {
                    return Err(DefinitionError::UnknownTarget {
                        step: step.id.clone(),
                        target: target.to_string(),
                    });
                }
            }
            if let Some(lp) = &step.loop_config {
                if lp.max_iterations == Some(0) {
                    return Err(DefinitionError::ZeroIterations(step.id.clone()));
                }
            }
        }

        Ok(())
    }
}

// ============================================================================
// Step
// ============================================================================

/// The kind of work a step performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    Trigger,
    Action,
    Condition,
    Loop,
    Parallel,
    Delay,
    Webhook,
    Email,
    Data,
    Ai,
    Database,
    Api,
}

/// A typed unit of work in a workflow graph
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub id: String,

    #[serde(rename = "type")]
    pub step_type: StepType,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Type-specific configuration, interpreted only by the matching handler
    #[serde(default)]
    pub config: Map<String, Value>,

    /// Declared input names (informational)
    #[serde(default)]
    pub inputs: Vec<String>,

    /// Declared output names (informational)
    #[serde(default)]
    pub outputs: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<ConditionBranches>,

    #[serde(default, rename = "loop", skip_serializing_if = "Option::is_none")]
    pub loop_config: Option<LoopConfig>,

    #[serde(default, rename = "parallel", skip_serializing_if = "Option::is_none")]
    pub parallel_config: Option<ParallelConfig>,
}

/// `if` / `then` / `else` block of a condition step
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConditionBranches {
    #[serde(default, rename = "if")]
    pub condition: Option<String>,

    #[serde(default, rename = "then")]
    pub then_steps: Vec<String>,

    #[serde(default, rename = "else")]
    pub else_steps: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LoopKind {
    For,
    #[default]
    While,
    Foreach,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LoopConfig {
    #[serde(default, rename = "type")]
    pub kind: LoopKind,

    /// Guard expression, evaluated before every iteration
    #[serde(default)]
    pub condition: Option<String>,

    /// Upper bound on iterations; the engine default applies when unset
    #[serde(default)]
    pub max_iterations: Option<u32>,

    /// Body step ids, run in order once per iteration
    #[serde(default)]
    pub steps: Vec<String>,
}

/// How a parallel step joins its branches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WaitFor {
    /// Wait for every branch to settle
    #[default]
    All,
    /// Resolve on the first branch that succeeds
    Any,
    /// Resolve on the first branch that settles, success or failure
    First,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ParallelConfig {
    #[serde(default)]
    pub branches: Vec<String>,

    #[serde(default)]
    pub wait_for: WaitFor,
}

impl Step {
    pub fn new(id: impl Into<String>, step_type: StepType) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            step_type,
            description: String::new(),
            config: Map::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            conditions: None,
            loop_config: None,
            parallel_config: None,
        }
    }

    /// Set a config entry (builder style)
    pub fn with_config(mut self, key: &str, value: Value) -> Self {
        self.config.insert(key.to_string(), value);
        self
    }

    pub fn with_branches(mut self, then_steps: &[&str], else_steps: &[&str]) -> Self {
        self.conditions = Some(ConditionBranches {
            condition: None,
            then_steps: then_steps.iter().map(|s| s.to_string()).collect(),
            else_steps: else_steps.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    pub fn with_loop(mut self, loop_config: LoopConfig) -> Self {
        self.loop_config = Some(loop_config);
        self
    }

    pub fn with_parallel(mut self, branches: &[&str], wait_for: WaitFor) -> Self {
        self.parallel_config = Some(ParallelConfig {
            branches: branches.iter().map(|s| s.to_string()).collect(),
            wait_for,
        });
        self
    }

    /// String config value
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }

    /// Step ids this step reaches through an explicit edge
    pub fn wired_targets(&self) -> impl Iterator<Item = &str> {
        let conditions = self
            .conditions
            .iter()
            .flat_map(|c| c.then_steps.iter().chain(c.else_steps.iter()));
        let body = self.loop_config.iter().flat_map(|l| l.steps.iter());
        let branches = self.parallel_config.iter().flat_map(|p| p.branches.iter());

        conditions.chain(body).chain(branches).map(String::as_str)
    }
}
