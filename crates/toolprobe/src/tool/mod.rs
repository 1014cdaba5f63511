pub mod builtins;
pub mod descriptor;
pub mod registry;

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

pub use descriptor::{ParamKind, QualifiedName, ResultType, ToolDescriptor, ToolParam};
pub use registry::ToolRegistry;

/// Output of a tool invocation.
///
/// Tool failures are values, not errors: the model sees the content either
/// way and decides what to do next.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }

    /// Numeric result, rendered without a trailing `.0` for whole values.
    pub fn number(value: f64) -> Self {
        Self::success(value.to_string())
    }
}

impl fmt::Display for ToolOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.content)
    }
}

/// Arguments passed to a tool, already checked against its input schema.
#[derive(Debug, Clone)]
pub struct ToolArgs(Value);

impl ToolArgs {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn str(&self, name: &str) -> Result<&str, String> {
        self.0
            .get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| format!("missing string argument '{name}'"))
    }

    pub fn number(&self, name: &str) -> Result<f64, String> {
        self.0
            .get(name)
            .and_then(Value::as_f64)
            .ok_or_else(|| format!("missing numeric argument '{name}'"))
    }

    pub fn into_inner(self) -> Value {
        self.0
    }
}

/// A callable operation exposed to the model.
pub trait Tool: Send + Sync {
    fn descriptor(&self) -> &ToolDescriptor;

    fn invoke(&self, args: ToolArgs) -> Pin<Box<dyn Future<Output = ToolOutput> + Send + '_>>;
}

/// Check `input` against a JSON schema.
///
/// An invalid schema is logged and skipped rather than rejecting every call.
pub fn validate_tool_input(schema: &Value, input: &Value) -> Result<(), String> {
    let validator = match jsonschema::validator_for(schema) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "invalid tool schema, skipping validation");
            return Ok(());
        }
    };

    let errors: Vec<String> = validator
        .iter_errors(input)
        .map(|e| e.to_string())
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(format!("Input validation failed: {}", errors.join("; ")))
    }
}
