use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::Error;
use crate::tool::{
    QualifiedName, ResultType, Tool, ToolArgs, ToolDescriptor, ToolOutput, ToolParam,
};

/// A two-operand arithmetic operation.
pub struct BinaryOpTool {
    descriptor: ToolDescriptor,
    op: fn(f64, f64) -> f64,
}

impl Tool for BinaryOpTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    fn invoke(&self, args: ToolArgs) -> Pin<Box<dyn Future<Output = ToolOutput> + Send + '_>> {
        Box::pin(async move {
            let (a, b) = match (args.number("a"), args.number("b")) {
                (Ok(a), Ok(b)) => (a, b),
                (Err(e), _) | (_, Err(e)) => return ToolOutput::error(e),
            };
            ToolOutput::number((self.op)(a, b))
        })
    }
}

pub(super) fn math_tools() -> Result<Vec<Arc<dyn Tool>>, Error> {
    let add = BinaryOpTool {
        descriptor: ToolDescriptor::new(
            QualifiedName::new("Math", "Add")?,
            "Adds two numbers together",
        )
        .param(ToolParam::number("a", "The first number"))
        .param(ToolParam::number("b", "The second number"))
        .returns(ResultType::Number),
        op: |a, b| a + b,
    };
    let subtract = BinaryOpTool {
        descriptor: ToolDescriptor::new(
            QualifiedName::new("Math", "Subtract")?,
            "Subtracts the second number from the first",
        )
        .param(ToolParam::number("a", "The number to subtract from"))
        .param(ToolParam::number("b", "The number to subtract"))
        .returns(ResultType::Number),
        op: |a, b| a - b,
    };
    let tools: Vec<Arc<dyn Tool>> = vec![Arc::new(add), Arc::new(subtract)];
    Ok(tools)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn tool(name: &str) -> Arc<dyn Tool> {
        math_tools()
            .unwrap()
            .into_iter()
            .find(|t| t.descriptor().name == name)
            .unwrap()
    }

    #[tokio::test]
    async fn add_returns_sum() {
        let out = tool("Math.Add")
            .invoke(ToolArgs::new(json!({"a": 5, "b": 3})))
            .await;
        assert_eq!(out, ToolOutput::success("8"));
    }

    #[tokio::test]
    async fn subtract_takes_second_from_first() {
        let out = tool("Math.Subtract")
            .invoke(ToolArgs::new(json!({"a": 20, "b": 7})))
            .await;
        assert_eq!(out.content, "13");

        let out = tool("Math.Subtract")
            .invoke(ToolArgs::new(json!({"a": 1.5, "b": 4})))
            .await;
        assert_eq!(out.content, "-2.5");
    }

    #[tokio::test]
    async fn missing_operand_is_error_output() {
        let out = tool("Math.Add").invoke(ToolArgs::new(json!({"a": 1}))).await;
        assert!(out.is_error);
        assert!(out.content.contains("'b'"));
    }

    #[test]
    fn descriptors_declare_numeric_params() {
        let add = tool("Math.Add");
        let desc = add.descriptor();
        assert_eq!(desc.result, ResultType::Number);
        assert_eq!(desc.params.len(), 2);
        assert_eq!(desc.params[0].description, "The first number");
    }
}
