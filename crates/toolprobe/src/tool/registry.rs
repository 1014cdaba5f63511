use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::error::Error;
use crate::llm::types::ToolDefinition;
use crate::observer::CallSink;
use crate::tool::{QualifiedName, Tool, ToolArgs, ToolOutput, validate_tool_input};

/// Qualified name to tool mapping for one session.
///
/// Every invocation through the registry is reported to the session's
/// [`CallSink`] before the tool does any work of its own.
pub struct ToolRegistry {
    tools: HashMap<QualifiedName, Arc<dyn Tool>>,
    order: Vec<QualifiedName>,
    sink: CallSink,
}

impl ToolRegistry {
    pub fn new(sink: CallSink) -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
            sink,
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), Error> {
        let name = tool.descriptor().name.clone();
        if self.tools.contains_key(&name) {
            return Err(Error::Config(format!("tool '{name}' registered twice")));
        }
        self.order.push(name.clone());
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn register_all(
        &mut self,
        tools: impl IntoIterator<Item = Arc<dyn Tool>>,
    ) -> Result<(), Error> {
        for tool in tools {
            self.register(tool)?;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Registered names in registration order.
    pub fn names(&self) -> &[QualifiedName] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Definitions to advertise to the model, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|tool| tool.descriptor().definition())
            .collect()
    }

    /// Resolve one model-requested call.
    ///
    /// Never fails: unknown names and bad arguments come back as error
    /// outputs for the model to read. Unknown names are not recorded.
    pub async fn invoke(&self, name: &str, input: Value) -> ToolOutput {
        let Some(tool) = self.tools.get(name) else {
            warn!(tool = name, "model requested unknown tool");
            return ToolOutput::error(format!("Tool not found: {name}"));
        };

        self.sink.emit(name);
        info!(tool = name, args = %input, "invoking tool");

        let descriptor = tool.descriptor();
        if let Err(e) = validate_tool_input(&descriptor.input_schema(), &input) {
            warn!(tool = name, error = %e, "rejected tool arguments");
            return ToolOutput::error(e);
        }

        tool.invoke(ToolArgs::new(input)).await
    }
}
