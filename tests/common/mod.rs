#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use flowpilot::prelude::*;
use serde_json::{json, Map, Value};
use tempfile::TempDir;

pub fn create_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

pub fn write_workflow(dir: &Path, filename: &str, content: &str) {
    fs::write(dir.join(filename), content).expect("Failed to write workflow file");
}

pub fn write_engine_config(dir: &Path, content: &str) {
    fs::write(dir.join("engine.yaml"), content).expect("Failed to write engine.yaml");
}

/// Turn a `json!` object into trigger data
pub fn data(value: Value) -> Map<String, Value> {
    value.as_object().cloned().expect("trigger data must be an object")
}

// ============================================================================
// Workflow documents
// ============================================================================

pub fn simple_workflow(name: &str) -> String {
    format!(
        r#"
name: {}
steps:
  - id: start
    type: trigger
  - id: work
    type: action
    config:
      action: noop
"#,
        name
    )
}

/// trigger -> condition -> (approve | reject), with a threshold variable
pub fn approval_workflow(name: &str) -> String {
    format!(
        r#"
name: {}
variables:
  threshold: 100
steps:
  - id: start
    type: trigger
  - id: check
    type: condition
    config:
      condition: "data.amount > variables.threshold"
    conditions:
      then: [approve]
      else: [reject]
  - id: approve
    type: action
    config:
      action: approve
  - id: reject
    type: action
    config:
      action: reject
"#,
        name
    )
}

/// A workflow whose only action always fails
pub fn failing_workflow(name: &str) -> String {
    format!(
        r#"
name: {}
steps:
  - id: start
    type: trigger
  - id: call
    type: api
    config:
      url: "http://127.0.0.1:1/unreachable"
"#,
        name
    )
}

// ============================================================================
// Definitions built in code
// ============================================================================

pub fn approval_definition() -> WorkflowDefinition {
    serde_yaml::from_str(&approval_workflow("approvals")).expect("valid approval workflow")
}

pub fn linear_definition(ids: &[&str]) -> WorkflowDefinition {
    let mut def = WorkflowDefinition::new("linear").with_step(Step::new("start", StepType::Trigger));
    for id in ids {
        def = def.with_step(Step::new(*id, StepType::Action));
    }
    def
}

pub fn loop_step(id: &str, condition: &str, max_iterations: Option<u32>) -> Step {
    Step::new(id, StepType::Loop).with_loop(LoopConfig {
        condition: Some(condition.to_string()),
        max_iterations,
        ..LoopConfig::default()
    })
}

pub fn failing_action(id: &str) -> Step {
    Step::new(id, StepType::Action).with_config("action", json!("explode"))
}

pub fn slow_step(id: &str, ms: u64) -> Step {
    Step::new(id, StepType::Delay).with_config("delay", json!(ms))
}

// ============================================================================
// Capabilities
// ============================================================================

/// Always fails
pub struct ExplodingAction;

#[async_trait]
impl Action for ExplodingAction {
    async fn run(
        &self,
        _config: &Map<String, Value>,
        _data: &Map<String, Value>,
    ) -> Result<Value, AdapterError> {
        Err(AdapterError::Provider("exploded".to_string()))
    }
}

/// Counts invocations and echoes a counter as a variable
#[derive(Default)]
pub struct CountingAction {
    pub calls: Mutex<u32>,
}

#[async_trait]
impl Action for CountingAction {
    async fn run(
        &self,
        _config: &Map<String, Value>,
        _data: &Map<String, Value>,
    ) -> Result<Value, AdapterError> {
        let mut calls = self.calls.lock().unwrap();
        *calls += 1;
        Ok(json!({ "count": *calls, "variables": { "counted": *calls } }))
    }
}

/// Records every request and answers with a fixed status
pub struct MockHttp {
    pub status: u16,
    pub requests: Mutex<Vec<HttpRequest>>,
}

impl MockHttp {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            requests: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl HttpAdapter for MockHttp {
    async fn invoke(&self, request: HttpRequest) -> Result<HttpResponse, AdapterError> {
        self.requests.lock().unwrap().push(request);
        Ok(HttpResponse {
            status: self.status,
            headers: Default::default(),
            body: json!({ "received": true }),
            elapsed_ms: 1,
        })
    }
}

/// Engine with an exploding action and no other capabilities
pub fn test_engine() -> WorkflowEngine {
    engine_with(Capabilities::new())
}

pub fn engine_with(capabilities: Capabilities) -> WorkflowEngine {
    WorkflowEngine::with_capabilities(
        EngineConfig::default(),
        capabilities.with_action("explode", Arc::new(ExplodingAction)),
    )
}

/// Store a definition and run it once
pub async fn run_definition(
    engine: &WorkflowEngine,
    definition: WorkflowDefinition,
    trigger: Value,
) -> Execution {
    let workflow = engine
        .create_workflow(definition)
        .await
        .expect("definition should be valid");
    engine
        .execute(&workflow.id, data(trigger))
        .await
        .expect("execution should run")
}

pub fn step_status(execution: &Execution, step_id: &str) -> StepStatus {
    execution
        .steps
        .iter()
        .find(|r| r.step_id == step_id)
        .map(|r| r.status)
        .unwrap_or_else(|| panic!("no record for step {}", step_id))
}
