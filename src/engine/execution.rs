//! Execution records, per-step records and the execution log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

use crate::workflow::WorkflowDefinition;

// ============================================================================
// Status
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    /// No further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

// ============================================================================
// Step records
// ============================================================================

/// Outcome of one parallel branch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchResult {
    pub result: Value,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BranchResult {
    pub fn succeeded(result: Value) -> Self {
        Self {
            result,
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            result: Value::Null,
            success: false,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepExecutionRecord {
    pub step_id: String,
    pub status: StepStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub output: Option<Value>,
    pub error: Option<String>,
    /// Iterations performed (loop steps)
    pub iterations: Option<u32>,
    /// Per-branch outcomes (parallel steps)
    pub branch_results: Option<BTreeMap<String, BranchResult>>,
}

impl StepExecutionRecord {
    pub fn pending(step_id: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            status: StepStatus::Pending,
            started_at: None,
            completed_at: None,
            output: None,
            error: None,
            iterations: None,
            branch_results: None,
        }
    }

    pub fn start(&mut self) {
        self.status = StepStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn complete(&mut self, output: Value) {
        self.status = StepStatus::Completed;
        self.output = Some(output);
        self.error = None;
        self.finish();
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = StepStatus::Failed;
        self.error = Some(error.into());
        self.finish();
    }

    pub fn skip(&mut self) {
        self.status = StepStatus::Skipped;
        self.finish();
    }

    fn finish(&mut self) {
        let now = Utc::now();
        self.started_at.get_or_insert(now);
        self.completed_at = Some(now);
    }
}

// ============================================================================
// Log
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
}

/// Append-only, timestamped log of one execution
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionLog {
    entries: Vec<LogEntry>,
}

impl ExecutionLog {
    pub fn push(&mut self, level: LogLevel, message: impl Into<String>, step_id: Option<&str>) {
        self.entries.push(LogEntry {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            step_id: step_id.map(str::to_string),
        });
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Execution
// ============================================================================

/// One run of a workflow definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub id: String,
    pub workflow_id: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    /// Trigger data, extended with step outputs as the run progresses
    pub data: Map<String, Value>,
    pub variables: Map<String, Value>,
    /// One record per declared step, in declaration order
    pub steps: Vec<StepExecutionRecord>,
    pub logs: ExecutionLog,
}

impl Execution {
    pub fn new(definition: &WorkflowDefinition, trigger_data: Map<String, Value>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            workflow_id: definition.id.clone(),
            status: ExecutionStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            paused_at: None,
            error: None,
            data: trigger_data,
            variables: definition.variables.clone(),
            steps: definition
                .steps
                .iter()
                .map(|s| StepExecutionRecord::pending(&s.id))
                .collect(),
            logs: ExecutionLog::default(),
        }
    }

    pub fn record(&self, step_id: &str) -> Option<&StepExecutionRecord> {
        self.steps.iter().find(|r| r.step_id == step_id)
    }

    pub fn record_mut(&mut self, step_id: &str) -> Option<&mut StepExecutionRecord> {
        self.steps.iter_mut().find(|r| r.step_id == step_id)
    }

    /// Wall time in milliseconds, once finished
    pub fn duration_ms(&self) -> Option<f64> {
        self.completed_at
            .map(|end| (end - self.started_at).num_microseconds().unwrap_or(0) as f64 / 1000.0)
    }

    /// Merge a step output into `data`. The `variables` key is reserved for
    /// variable updates and never lands in `data`. Non-object outputs are
    /// stored under the step id.
    pub fn merge_output(&mut self, step_id: &str, output: &Value) {
        match output {
            Value::Object(map) => {
                for (key, value) in map {
                    if key != "variables" {
                        self.data.insert(key.clone(), value.clone());
                    }
                }
            }
            Value::Null => {}
            other => {
                self.data.insert(step_id.to_string(), other.clone());
            }
        }
    }

    pub fn merge_variables(&mut self, variables: &Map<String, Value>) {
        for (key, value) in variables {
            self.variables.insert(key.clone(), value.clone());
        }
    }

    /// Append to the execution log and mirror the entry to tracing
    pub fn log(&mut self, level: LogLevel, message: impl Into<String>, step_id: Option<&str>) {
        let message = message.into();
        let step = step_id.unwrap_or("-");
        match level {
            LogLevel::Debug => debug!(execution_id = %self.id, step, "{}", message),
            LogLevel::Info => info!(execution_id = %self.id, step, "{}", message),
            LogLevel::Warn => warn!(execution_id = %self.id, step, "{}", message),
            LogLevel::Error => error!(execution_id = %self.id, step, "{}", message),
        }
        self.logs.push(level, message, step_id);
    }
}
