//! Capability adapters for steps that reach outside the engine
//!
//! The engine never talks to a provider directly. Webhook/api, email, ai and
//! database steps go through these narrow traits, and action steps look up
//! named actions in an [`ActionRegistry`]. The surrounding application
//! supplies implementations through [`Capabilities`]:
//! - `http`: outbound HTTP via reqwest (bundled)
//! - everything else: provided by the host

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

pub mod http;

pub use http::ReqwestHttpAdapter;

/// Common error type for adapter calls
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Provider error: {0}")]
    Provider(String),
}

/// An outbound HTTP-like call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpRequest {
    pub url: String,
    pub method: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Value,
    pub elapsed_ms: u64,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// `invoke(url, method, headers, body) -> (status, body)`
#[async_trait]
pub trait HttpAdapter: Send + Sync {
    async fn invoke(&self, request: HttpRequest) -> Result<HttpResponse, AdapterError>;
}

/// `send(to, subject, body) -> confirmation`
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<Value, AdapterError>;
}

/// `infer(kind, payload) -> result`, e.g. sentiment or classification
#[async_trait]
pub trait InferenceAdapter: Send + Sync {
    async fn infer(&self, kind: &str, payload: Value) -> Result<Value, AdapterError>;
}

/// `query(op, payload) -> rows`
#[async_trait]
pub trait QueryAdapter: Send + Sync {
    async fn query(&self, operation: &str, payload: Value) -> Result<Vec<Value>, AdapterError>;
}

/// A named effect an action step can run
#[async_trait]
pub trait Action: Send + Sync {
    async fn run(
        &self,
        config: &Map<String, Value>,
        data: &Map<String, Value>,
    ) -> Result<Value, AdapterError>;
}

/// Actions keyed by the name action steps put in `config.action`
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn Action>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, action: Arc<dyn Action>) {
        self.actions.insert(name.into(), action);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(name).cloned()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Every adapter available to step handlers
#[derive(Clone, Default)]
pub struct Capabilities {
    pub http: Option<Arc<dyn HttpAdapter>>,
    pub messaging: Option<Arc<dyn MessageSender>>,
    pub inference: Option<Arc<dyn InferenceAdapter>>,
    pub query: Option<Arc<dyn QueryAdapter>>,
    pub actions: ActionRegistry,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_http(mut self, adapter: Arc<dyn HttpAdapter>) -> Self {
        self.http = Some(adapter);
        self
    }

    pub fn with_messaging(mut self, sender: Arc<dyn MessageSender>) -> Self {
        self.messaging = Some(sender);
        self
    }

    pub fn with_inference(mut self, adapter: Arc<dyn InferenceAdapter>) -> Self {
        self.inference = Some(adapter);
        self
    }

    pub fn with_query(mut self, adapter: Arc<dyn QueryAdapter>) -> Self {
        self.query = Some(adapter);
        self
    }

    pub fn with_action(mut self, name: impl Into<String>, action: Arc<dyn Action>) -> Self {
        self.actions.register(name, action);
        self
    }
}
