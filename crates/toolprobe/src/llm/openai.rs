use std::collections::{BTreeMap, VecDeque};

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::Error;
use crate::llm::types::{
    CompletionRequest, ContentBlock, Role, StopReason, StreamEvent, TokenUsage, ToolCall,
    ToolDefinition,
};
use crate::llm::{CompletionStream, LlmProvider};

/// Provider for any OpenAI-compatible `/chat/completions` endpoint
/// (Ollama, LM Studio, vLLM, llama.cpp server, ...).
///
/// Always requests a streamed response. Qualified tool names are sent as
/// `Provider-Operation` because most servers reject dots in function names.
pub struct OpenAiCompatProvider {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiCompatProvider {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl LlmProvider for OpenAiCompatProvider {
    async fn stream(&self, request: CompletionRequest) -> Result<CompletionStream, Error> {
        let body = build_request(&self.model, &request)?;
        let url = format!("{}/chat/completions", self.base_url);
        debug!(
            url = %url,
            model = %self.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "sending streaming completion request"
        );

        let mut builder = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            // Sanitize body for auth failures to avoid leaking key fragments in logs
            let message = if status.as_u16() == 401 || status.as_u16() == 403 {
                format!("authentication failed (HTTP {})", status.as_u16())
            } else {
                response
                    .text()
                    .await
                    .unwrap_or_else(|e| format!("<body read error: {e}>"))
            };
            return Err(Error::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(sse_events(response.bytes_stream()))
    }
}

/// `Math.Add` -> `Math-Add`.
pub fn to_wire_name(name: &str) -> String {
    name.replacen('.', "-", 1)
}

/// `Math-Add` -> `Math.Add`. Names that are already dotted pass through.
pub fn from_wire_name(name: &str) -> String {
    if name.contains('.') {
        name.to_string()
    } else {
        name.replacen('-', ".", 1)
    }
}

// --- Request building ---

fn build_request(model: &str, request: &CompletionRequest) -> Result<Value, Error> {
    let mut messages = Vec::new();

    if !request.system.is_empty() {
        messages.push(json!({
            "role": "system",
            "content": request.system,
        }));
    }

    for msg in &request.messages {
        match msg.role {
            Role::User => {
                let mut text_parts = Vec::new();
                for block in &msg.content {
                    match block {
                        ContentBlock::Text { text } => text_parts.push(text.as_str()),
                        ContentBlock::ToolResult {
                            tool_use_id,
                            content,
                            is_error,
                        } => {
                            // No is_error field on the wire; prefix so the model sees it
                            let content = if *is_error {
                                format!("[ERROR] {content}")
                            } else {
                                content.clone()
                            };
                            messages.push(json!({
                                "role": "tool",
                                "tool_call_id": tool_use_id,
                                "content": content,
                            }));
                        }
                        ContentBlock::ToolUse { .. } => {}
                    }
                }
                if !text_parts.is_empty() {
                    messages.push(json!({
                        "role": "user",
                        "content": text_parts.join("\n\n"),
                    }));
                }
            }
            Role::Assistant => {
                let text: String = msg
                    .content
                    .iter()
                    .filter_map(|b| match b {
                        ContentBlock::Text { text } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect();

                let mut tool_calls = Vec::new();
                for block in &msg.content {
                    if let ContentBlock::ToolUse { id, name, input } = block {
                        tool_calls.push(json!({
                            "id": id,
                            "type": "function",
                            "function": {
                                "name": to_wire_name(name),
                                "arguments": serde_json::to_string(input)?,
                            }
                        }));
                    }
                }

                let mut msg_json = json!({ "role": "assistant" });
                msg_json["content"] = if text.is_empty() {
                    Value::Null
                } else {
                    Value::String(text)
                };
                if !tool_calls.is_empty() {
                    msg_json["tool_calls"] = Value::Array(tool_calls);
                }
                messages.push(msg_json);
            }
        }
    }

    let mut body = json!({
        "model": model,
        "messages": messages,
        "max_tokens": request.max_tokens,
        "stream": true,
    });

    if !request.tools.is_empty() {
        body["tools"] = Value::Array(request.tools.iter().map(tool_to_wire).collect());
        body["tool_choice"] = json!("auto");
    }

    Ok(body)
}

fn tool_to_wire(tool: &ToolDefinition) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": to_wire_name(&tool.name),
            "description": tool.description,
            "parameters": tool.input_schema,
        }
    })
}

// --- SSE decoding ---

#[derive(Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Incremental decoder for `data:` framed chat completion chunks.
///
/// Bytes are buffered until a full line is available, so multi-byte
/// characters split across network chunks decode correctly. Tool call
/// fragments are keyed by their `index` and only released once the stream
/// finishes.
#[derive(Default)]
struct SseDecoder {
    buffer: Vec<u8>,
    tool_calls: BTreeMap<usize, PartialToolCall>,
    finish_reason: Option<String>,
    usage: TokenUsage,
    done: bool,
}

impl SseDecoder {
    fn push(&mut self, chunk: &[u8]) -> Result<Vec<StreamEvent>, Error> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while !self.done
            && let Some(pos) = self.buffer.iter().position(|&b| b == b'\n')
        {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.process_line(&line, &mut events)?;
        }
        Ok(events)
    }

    /// Flush state when the byte stream ends. Servers that close the
    /// connection without `[DONE]` still get their tool calls and `Done`.
    fn finish(&mut self) -> Result<Vec<StreamEvent>, Error> {
        let mut events = Vec::new();
        if self.done {
            return Ok(events);
        }
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.process_line(&line, &mut events)?;
        }
        if !self.done {
            debug!("stream ended without [DONE] marker");
            events.extend(self.complete());
        }
        Ok(events)
    }

    fn process_line(&mut self, raw: &[u8], events: &mut Vec<StreamEvent>) -> Result<(), Error> {
        let line = std::str::from_utf8(raw)
            .map_err(|e| Error::Stream(format!("invalid UTF-8 in stream: {e}")))?
            .trim();

        // Blank separators, `:` comments, and `event:`/`id:` fields carry nothing for us
        let Some(data) = line.strip_prefix("data:") else {
            return Ok(());
        };
        let data = data.trim_start();
        if data == "[DONE]" {
            events.extend(self.complete());
            return Ok(());
        }

        let chunk: Value = serde_json::from_str(data)
            .map_err(|e| Error::Stream(format!("undecodable chunk {data:?}: {e}")))?;

        if let Some(err) = chunk.get("error") {
            let message = err
                .get("message")
                .and_then(Value::as_str)
                .map(String::from)
                .unwrap_or_else(|| err.to_string());
            // String codes ("rate_limit_exceeded") and out-of-range numbers map to 0
            let status = err
                .get("code")
                .and_then(Value::as_u64)
                .and_then(|c| u16::try_from(c).ok())
                .unwrap_or(0);
            return Err(Error::Api { status, message });
        }

        if let Some(usage) = chunk.get("usage").filter(|u| !u.is_null()) {
            self.usage = TokenUsage {
                input_tokens: token_count(&usage["prompt_tokens"]),
                output_tokens: token_count(&usage["completion_tokens"]),
            };
        }

        let Some(choice) = chunk["choices"].get(0) else {
            return Ok(());
        };
        let delta = &choice["delta"];

        if let Some(text) = delta["content"].as_str()
            && !text.is_empty()
        {
            events.push(StreamEvent::TextDelta(text.to_string()));
        }

        if let Some(calls) = delta["tool_calls"].as_array() {
            for call in calls {
                let index = call["index"].as_u64().unwrap_or(0) as usize;
                let entry = self.tool_calls.entry(index).or_default();
                if let Some(id) = call["id"].as_str()
                    && !id.is_empty()
                {
                    entry.id = id.to_string();
                }
                let function = &call["function"];
                if let Some(name) = function["name"].as_str() {
                    entry.name.push_str(name);
                }
                match &function["arguments"] {
                    Value::String(fragment) => entry.arguments.push_str(fragment),
                    // Some servers send the arguments as a finished object
                    args @ Value::Object(_) => entry.arguments = args.to_string(),
                    _ => {}
                }
            }
        }

        if let Some(reason) = choice["finish_reason"].as_str() {
            self.finish_reason = Some(reason.to_string());
        }

        Ok(())
    }

    fn complete(&mut self) -> Vec<StreamEvent> {
        self.done = true;
        let mut events = Vec::new();

        for (index, call) in std::mem::take(&mut self.tool_calls) {
            let input = if call.arguments.trim().is_empty() {
                json!({})
            } else {
                match serde_json::from_str(&call.arguments) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!(
                            tool = %call.name,
                            error = %e,
                            "malformed tool call arguments, defaulting to {{}}"
                        );
                        json!({})
                    }
                }
            };
            let id = if call.id.is_empty() {
                format!("call_{index}")
            } else {
                call.id
            };
            events.push(StreamEvent::ToolUse(ToolCall {
                id,
                name: from_wire_name(&call.name),
                input,
            }));
        }

        // Requested tool calls always win over whatever finish_reason claimed
        let stop_reason = if !events.is_empty() {
            StopReason::ToolUse
        } else {
            match self.finish_reason.as_deref() {
                Some("length") => StopReason::MaxTokens,
                _ => StopReason::EndTurn,
            }
        };
        events.push(StreamEvent::Done {
            stop_reason,
            usage: self.usage,
        });
        events
    }
}

fn token_count(value: &Value) -> u32 {
    value
        .as_u64()
        .map_or(0, |n| u32::try_from(n).unwrap_or(u32::MAX))
}

struct SseState {
    bytes: BoxStream<'static, Result<Bytes, Error>>,
    decoder: SseDecoder,
    pending: VecDeque<StreamEvent>,
    finished: bool,
}

/// Turn a raw response body into completion events. The stream ends after
/// the first error.
fn sse_events<S, E>(bytes: S) -> CompletionStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<Error>,
{
    let state = SseState {
        bytes: bytes.map(|r| r.map_err(Into::into)).boxed(),
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    Box::pin(futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(event) = st.pending.pop_front() {
                return Some((Ok(event), st));
            }
            if st.finished {
                return None;
            }
            let result = match st.bytes.next().await {
                Some(Ok(chunk)) => st.decoder.push(&chunk),
                Some(Err(e)) => Err(e),
                None => {
                    st.finished = true;
                    st.decoder.finish()
                }
            };
            match result {
                Ok(events) => {
                    st.pending.extend(events);
                    if st.decoder.done {
                        st.finished = true;
                    }
                }
                Err(e) => {
                    st.finished = true;
                    st.pending.clear();
                    return Some((Err(e), st));
                }
            }
        }
    }))
}
