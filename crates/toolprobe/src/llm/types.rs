use serde::Serialize;

use crate::tool::ToolOutput;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// One part of a conversation message. Providers map these onto their own
/// wire shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },
}

/// Conversation history entry. Tool results travel as user-role messages.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    /// Assistant message carrying the text streamed in one round plus the
    /// tool calls the model requested in it.
    pub fn assistant_with_calls(text: impl Into<String>, calls: &[ToolCall]) -> Self {
        let text = text.into();
        let mut content = Vec::with_capacity(calls.len() + 1);
        if !text.is_empty() {
            content.push(ContentBlock::Text { text });
        }
        content.extend(calls.iter().map(|call| ContentBlock::ToolUse {
            id: call.id.clone(),
            name: call.name.clone(),
            input: call.input.clone(),
        }));
        Self {
            role: Role::Assistant,
            content,
        }
    }

    pub fn tool_results(results: Vec<ToolResult>) -> Self {
        Self {
            role: Role::User,
            content: results
                .into_iter()
                .map(|r| ContentBlock::ToolResult {
                    tool_use_id: r.tool_use_id,
                    content: r.content,
                    is_error: r.is_error,
                })
                .collect(),
        }
    }
}

/// What the model is told about a tool.
///
/// `name` is the qualified `Provider.Operation` name; providers translate it
/// to whatever their wire format accepts.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Everything one completion round needs. The model id belongs to the
/// provider, not the request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndTurn,
    ToolUse,
    MaxTokens,
}

/// Tokens reported by the endpoint, summed across the rounds of a turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens as u64 + self.output_tokens as u64
    }
}

impl std::ops::AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens = self.input_tokens.saturating_add(rhs.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(rhs.output_tokens);
    }
}

/// One incremental event of a streamed completion.
///
/// Text arrives as many small `TextDelta`s. Tool calls are only emitted once
/// their arguments are complete, and `Done` is always the last event of a
/// well-formed stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    TextDelta(String),
    ToolUse(ToolCall),
    Done {
        stop_reason: StopReason,
        usage: TokenUsage,
    },
}

/// A tool call requested by the model, name already in qualified form.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// Result of executing a tool, addressed back to the call that asked for it.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub tool_use_id: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn from_output(tool_use_id: impl Into<String>, output: ToolOutput) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            content: output.content,
            is_error: output.is_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(id: &str, name: &str) -> ToolCall {
        ToolCall {
            id: id.into(),
            name: name.into(),
            input: json!({"a": 5, "b": 3}),
        }
    }

    #[test]
    fn user_message_is_single_text_block() {
        let msg = Message::user("What is 5 + 3?");
        assert_eq!(msg.role, Role::User);
        assert_eq!(
            msg.content,
            vec![ContentBlock::Text {
                text: "What is 5 + 3?".into()
            }]
        );
    }

    #[test]
    fn assistant_with_calls_keeps_text_then_calls() {
        let calls = [call("c1", "Math.Add"), call("c2", "Math.Subtract")];
        let msg = Message::assistant_with_calls("Let me compute.", &calls);
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.content.len(), 3);
        assert!(matches!(&msg.content[0], ContentBlock::Text { text } if text == "Let me compute."));
        assert!(matches!(&msg.content[1], ContentBlock::ToolUse { name, .. } if name == "Math.Add"));
        assert!(
            matches!(&msg.content[2], ContentBlock::ToolUse { name, .. } if name == "Math.Subtract")
        );
    }

    #[test]
    fn assistant_with_calls_skips_empty_text() {
        let msg = Message::assistant_with_calls("", &[call("c1", "Math.Add")]);
        assert_eq!(msg.content.len(), 1);
        assert!(matches!(&msg.content[0], ContentBlock::ToolUse { id, .. } if id == "c1"));
    }

    #[test]
    fn tool_results_keep_call_ids_and_error_flags() {
        let msg = Message::tool_results(vec![
            ToolResult::from_output("c1", ToolOutput::number(8.0)),
            ToolResult::from_output(
                "c2",
                ToolOutput::error("No coordinates found for location: Atlantis"),
            ),
        ]);
        assert_eq!(msg.role, Role::User);
        assert_eq!(
            msg.content,
            vec![
                ContentBlock::ToolResult {
                    tool_use_id: "c1".into(),
                    content: "8".into(),
                    is_error: false,
                },
                ContentBlock::ToolResult {
                    tool_use_id: "c2".into(),
                    content: "No coordinates found for location: Atlantis".into(),
                    is_error: true,
                },
            ]
        );
    }

    #[test]
    fn usage_accumulates_across_rounds() {
        let mut usage = TokenUsage::default();
        for (input, output) in [(120, 14), (180, 9)] {
            usage += TokenUsage {
                input_tokens: input,
                output_tokens: output,
            };
        }
        assert_eq!(usage.input_tokens, 300);
        assert_eq!(usage.output_tokens, 23);
        assert_eq!(usage.total(), 323);
    }

    #[test]
    fn usage_saturates_instead_of_overflowing() {
        let mut usage = TokenUsage {
            input_tokens: u32::MAX - 1,
            output_tokens: 7,
        };
        usage += TokenUsage {
            input_tokens: 10,
            output_tokens: 3,
        };
        assert_eq!(usage.input_tokens, u32::MAX);
        assert_eq!(usage.output_tokens, 10);
    }
}
