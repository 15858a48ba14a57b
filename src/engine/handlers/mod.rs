//! Step handlers by step type
//!
//! Each submodule holds the logic for a family of step types:
//! - `flow` - trigger, action, condition, delay
//! - `iteration` - loop
//! - `parallel` - parallel fan-out and join
//! - `integration` - webhook, api, email, ai, database
//! - `transform` - data

pub mod flow;
pub mod integration;
pub mod iteration;
pub mod parallel;
pub mod transform;

use serde_json::Value;

use crate::engine::error::StepError;
use crate::engine::executor::StepContext;
use crate::workflow::{interpolate_value, Step};

/// A config value with `${{ }}` placeholders resolved
pub(crate) fn config_value(
    step: &Step,
    key: &str,
    ctx: &StepContext,
) -> Result<Option<Value>, StepError> {
    match step.config.get(key) {
        Some(raw) => Ok(Some(interpolate_value(raw, &ctx.data, &ctx.variables)?)),
        None => Ok(None),
    }
}

/// A required string config value with placeholders resolved
pub(crate) fn required_str(step: &Step, key: &str, ctx: &StepContext) -> Result<String, StepError> {
    match config_value(step, key, ctx)? {
        Some(Value::String(s)) if !s.is_empty() => Ok(s),
        Some(Value::String(_)) | None => Err(StepError::MissingParameter(key.to_string())),
        Some(other) => Err(StepError::InvalidParameter(format!(
            "{} must be a string, got {}",
            key, other
        ))),
    }
}

/// An optional string config value with placeholders resolved
pub(crate) fn optional_str(
    step: &Step,
    key: &str,
    ctx: &StepContext,
) -> Result<Option<String>, StepError> {
    match config_value(step, key, ctx)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => Ok(Some(other.to_string())),
    }
}
