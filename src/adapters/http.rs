//! reqwest-backed HTTP adapter for webhook and api steps
//!
//! Single attempt per call; retry policy belongs to the caller. Response
//! bodies are parsed as JSON when possible and kept as a string otherwise.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{AdapterError, HttpAdapter, HttpRequest, HttpResponse};
use crate::workflow::HttpConfig;

#[derive(Debug)]
pub struct ReqwestHttpAdapter {
    config: HttpConfig,
    client: reqwest::Client,
}

impl ReqwestHttpAdapter {
    pub fn new(config: HttpConfig) -> Result<Self, AdapterError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| AdapterError::RequestFailed(e.to_string()))?;

        Ok(Self { config, client })
    }

    pub fn from_config(config: &HttpConfig) -> Result<Self, AdapterError> {
        Self::new(config.clone())
    }

    fn apply_headers(
        &self,
        mut request: reqwest::RequestBuilder,
        extra_headers: &HashMap<String, String>,
    ) -> reqwest::RequestBuilder {
        for (key, value) in &self.config.headers {
            request = request.header(key, value);
        }

        for (key, value) in extra_headers {
            request = request.header(key, value);
        }

        request
    }
}

#[async_trait]
impl HttpAdapter for ReqwestHttpAdapter {
    async fn invoke(&self, request: HttpRequest) -> Result<HttpResponse, AdapterError> {
        let start = Instant::now();
        let url = request.url.as_str();

        let mut builder = match request.method.to_uppercase().as_str() {
            "GET" => self.client.get(url),
            "POST" => self.client.post(url),
            "PUT" => self.client.put(url),
            "PATCH" => self.client.patch(url),
            "DELETE" => self.client.delete(url),
            "HEAD" => self.client.head(url),
            other => {
                return Err(AdapterError::Unsupported(format!(
                    "Unknown HTTP method: {}",
                    other
                )))
            }
        };

        builder = self.apply_headers(builder, &request.headers);

        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        debug!("Executing {} {}", request.method, url);

        let response = builder.send().await.map_err(|e| {
            warn!("Request failed: {}", e);
            AdapterError::RequestFailed(e.to_string())
        })?;

        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
            .collect();

        let body_text = response
            .text()
            .await
            .map_err(|e| AdapterError::RequestFailed(e.to_string()))?;

        let body: Value = if body_text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&body_text).unwrap_or(Value::String(body_text))
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;
        info!("{} {} -> {} ({}ms)", request.method, url, status, elapsed_ms);

        Ok(HttpResponse {
            status,
            headers,
            body,
            elapsed_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_method_rejected() {
        let adapter = ReqwestHttpAdapter::new(HttpConfig::default()).unwrap();
        let err = adapter
            .invoke(HttpRequest {
                url: "http://localhost".to_string(),
                method: "BREW".to_string(),
                headers: HashMap::new(),
                body: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_connection_failure_is_request_error() {
        let adapter = ReqwestHttpAdapter::new(HttpConfig {
            timeout_ms: 500,
            ..HttpConfig::default()
        })
        .unwrap();
        let err = adapter
            .invoke(HttpRequest {
                url: "http://127.0.0.1:1/unreachable".to_string(),
                method: "GET".to_string(),
                headers: HashMap::new(),
                body: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::RequestFailed(_)));
    }
}
