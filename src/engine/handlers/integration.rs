//! Handlers for steps that call out through an adapter:
//! webhook, api, email, ai, database

use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tracing::{info, warn};

use super::{config_value, optional_str, required_str};
use crate::adapters::HttpRequest;
use crate::engine::error::StepError;
use crate::engine::executor::{StepContext, StepExecutor, StepOutput};
use crate::workflow::{Step, StepType};

/// Webhook and api steps. Webhooks default to POST with the execution data
/// as body; api calls default to GET with no body.
pub async fn http_call(
    executor: &StepExecutor,
    step: &Step,
    ctx: &StepContext,
) -> Result<StepOutput, StepError> {
    let adapter = executor
        .capabilities()
        .http
        .clone()
        .ok_or(StepError::CapabilityUnavailable("http"))?;

    let url = required_str(step, "url", ctx)?;
    let is_webhook = step.step_type == StepType::Webhook;
    let method = optional_str(step, "method", ctx)?
        .unwrap_or_else(|| (if is_webhook { "POST" } else { "GET" }).to_string())
        .to_uppercase();

    let mut headers = HashMap::new();
    if let Some(Value::Object(map)) = config_value(step, "headers", ctx)? {
        for (key, value) in map {
            let value = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            headers.insert(key, value);
        }
    }

    let body = match config_value(step, "body", ctx)? {
        Some(body) => Some(body),
        None if is_webhook => Some(Value::Object(ctx.data.clone())),
        None => None,
    };

    let response = adapter
        .invoke(HttpRequest {
            url: url.clone(),
            method: method.clone(),
            headers,
            body,
        })
        .await?;

    if !response.is_success() {
        warn!("{} {} returned {}", method, url, response.status);
        return Err(StepError::HttpStatus {
            status: response.status,
            body: response.body,
        });
    }

    info!("{} {} -> {}", method, url, response.status);
    Ok(StepOutput::new(json!({
        "url": url,
        "method": method,
        "status": response.status,
        "response": response.body,
    })))
}

pub async fn email(
    executor: &StepExecutor,
    step: &Step,
    ctx: &StepContext,
) -> Result<StepOutput, StepError> {
    let sender = executor
        .capabilities()
        .messaging
        .clone()
        .ok_or(StepError::CapabilityUnavailable("messaging"))?;

    let to = required_str(step, "to", ctx)?;
    let subject = optional_str(step, "subject", ctx)?.unwrap_or_default();
    let body = optional_str(step, "body", ctx)?.unwrap_or_default();

    let confirmation = sender.send(&to, &subject, &body).await?;
    info!("Email sent to {}", to);

    Ok(StepOutput::new(json!({
        "sent": true,
        "to": to,
        "subject": subject,
        "confirmation": confirmation,
    })))
}

/// `config.operation` names the inference kind; `config.input` is the
/// payload, defaulting to the execution data
pub async fn ai(
    executor: &StepExecutor,
    step: &Step,
    ctx: &StepContext,
) -> Result<StepOutput, StepError> {
    let adapter = executor
        .capabilities()
        .inference
        .clone()
        .ok_or(StepError::CapabilityUnavailable("inference"))?;

    let kind = required_str(step, "operation", ctx)?;
    let payload =
        config_value(step, "input", ctx)?.unwrap_or_else(|| Value::Object(ctx.data.clone()));

    let result = adapter.infer(&kind, payload).await?;
    Ok(StepOutput::new(json!({
        "operation": kind,
        "result": result,
    })))
}

/// Every config key except `operation` forms the query payload
pub async fn database(
    executor: &StepExecutor,
    step: &Step,
    ctx: &StepContext,
) -> Result<StepOutput, StepError> {
    let adapter = executor
        .capabilities()
        .query
        .clone()
        .ok_or(StepError::CapabilityUnavailable("query"))?;

    let operation = required_str(step, "operation", ctx)?;
    let mut payload = Map::new();
    for key in step.config.keys().filter(|k| k.as_str() != "operation") {
        if let Some(value) = config_value(step, key, ctx)? {
            payload.insert(key.clone(), value);
        }
    }

    let rows = adapter.query(&operation, Value::Object(payload)).await?;
    let count = rows.len();
    Ok(StepOutput::new(json!({
        "operation": operation,
        "rows": rows,
        "count": count,
    })))
}
