pub mod config;
pub mod driver;
pub mod error;
pub mod eval;
pub mod llm;
pub mod observer;
pub mod tool;

pub use config::{HarnessConfig, ModelConfig, ToolsConfig, TurnConfig};
pub use driver::{ChatDriver, SYSTEM_POLICY, Transcript, TurnLimits};
pub use error::Error;
pub use eval::{
    Check, Expectation, Failure, Outcome, RunObserver, RunSummary, TestCase, TestResult,
    TestRunner, Verdict, Verifier, default_cases,
};
pub use llm::openai::OpenAiCompatProvider;
pub use llm::types::{
    CompletionRequest, ContentBlock, Message, Role, StopReason, StreamEvent, TokenUsage, ToolCall,
    ToolDefinition, ToolResult,
};
pub use llm::{CompletionStream, LlmProvider, OnText};
pub use observer::{CallObserver, CallRecord, CallSink};
pub use tool::{
    QualifiedName, Tool, ToolArgs, ToolDescriptor, ToolOutput, ToolRegistry, validate_tool_input,
};
