use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::Error;
use crate::llm::types::{CompletionRequest, Message, StreamEvent, TokenUsage, ToolResult};
use crate::llm::{LlmProvider, OnText};
use crate::observer::{CallObserver, CallRecord};
use crate::tool::ToolRegistry;

/// Routing instruction sent as the system message of every turn.
pub const SYSTEM_POLICY: &str = "You are a helpful assistant. For general knowledge questions \
(like capitals, facts, etc.), answer directly using your knowledge. For weather, temperature, \
or other weather-related queries about a specific location, you MUST first use \
Geolocation-GetCoordinates to get the coordinates for the location name, then use \
Weather-GetWeatherByCoordinates with those coordinates. Never use hardcoded coordinates for \
weather queries.";

pub const DEFAULT_MAX_ROUNDS: usize = 8;
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Observable outcome of one turn.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Transcript {
    /// Every text fragment of the turn, in arrival order.
    pub reply: String,
    pub calls: Vec<CallRecord>,
    pub usage: TokenUsage,
    /// Completion rounds used, including the final text-only one.
    pub rounds: usize,
}

impl Transcript {
    pub fn call_names(&self) -> Vec<&str> {
        self.calls.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn was_called(&self, name: &str) -> bool {
        self.calls.iter().any(|c| c.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnLimits {
    /// Completion rounds allowed before the turn is abandoned.
    pub max_rounds: usize,
    pub max_tokens: u32,
    /// Wall-clock bound on the whole turn. `None` waits indefinitely.
    pub deadline: Option<Duration>,
}

impl Default for TurnLimits {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
            max_tokens: DEFAULT_MAX_TOKENS,
            deadline: None,
        }
    }
}

/// Runs one conversational turn with tool calling enabled.
///
/// The driver owns its session: the registry it resolves calls against and
/// the observer those calls are reported to. Build a new driver per test
/// case.
pub struct ChatDriver<P: LlmProvider> {
    provider: Arc<P>,
    registry: ToolRegistry,
    observer: CallObserver,
    system_prompt: String,
    limits: TurnLimits,
    cancel: CancellationToken,
}

impl<P: LlmProvider> ChatDriver<P> {
    pub fn new(provider: Arc<P>, registry: ToolRegistry, observer: CallObserver) -> Self {
        Self {
            provider,
            registry,
            observer,
            system_prompt: SYSTEM_POLICY.into(),
            limits: TurnLimits::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_limits(mut self, limits: TurnLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn limits(&self) -> TurnLimits {
        self.limits
    }

    /// Submit `prompt` and resolve tool calls until the model answers in text.
    ///
    /// Every fragment is passed to `on_text` as soon as it arrives. Any
    /// transport or model fault aborts the turn; nothing is retried.
    pub async fn run_turn(&mut self, prompt: &str, on_text: &OnText) -> Result<Transcript, Error> {
        self.observer.reset();
        let deadline = self.limits.deadline;

        let outcome = {
            let turn = self.drive(prompt, on_text);
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(Error::Cancelled),
                result = within_deadline(turn, deadline) => result,
            }
        };
        let (reply, usage, rounds) = outcome?;

        let calls = self.observer.snapshot();
        info!(
            rounds,
            calls = calls.len(),
            reply_len = reply.len(),
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "turn complete"
        );
        Ok(Transcript {
            reply,
            calls,
            usage,
            rounds,
        })
    }

    async fn drive(
        &self,
        prompt: &str,
        on_text: &OnText,
    ) -> Result<(String, TokenUsage, usize), Error> {
        let tools = self.registry.definitions();
        let mut messages = vec![Message::user(prompt)];
        let mut reply = String::new();
        let mut usage = TokenUsage::default();

        for round in 1..=self.limits.max_rounds {
            debug!(round, messages = messages.len(), "starting completion round");
            let request = CompletionRequest {
                system: self.system_prompt.clone(),
                messages: messages.clone(),
                tools: tools.clone(),
                max_tokens: self.limits.max_tokens,
            };

            let mut stream = self.provider.stream(request).await?;
            let mut round_text = String::new();
            let mut calls = Vec::new();
            while let Some(event) = stream.next().await {
                match event? {
                    StreamEvent::TextDelta(text) => {
                        on_text(&text);
                        reply.push_str(&text);
                        round_text.push_str(&text);
                    }
                    StreamEvent::ToolUse(call) => calls.push(call),
                    StreamEvent::Done {
                        stop_reason,
                        usage: round_usage,
                    } => {
                        usage += round_usage;
                        debug!(round, ?stop_reason, "completion round finished");
                    }
                }
            }

            if calls.is_empty() {
                return Ok((reply, usage, round));
            }

            messages.push(Message::assistant_with_calls(round_text, &calls));
            let mut results = Vec::with_capacity(calls.len());
            for call in calls {
                let output = self.registry.invoke(&call.name, call.input).await;
                results.push(ToolResult::from_output(call.id, output));
            }
            messages.push(Message::tool_results(results));
        }

        Err(Error::MaxRoundsExceeded(self.limits.max_rounds))
    }
}

async fn within_deadline<T>(
    fut: impl Future<Output = Result<T, Error>>,
    deadline: Option<Duration>,
) -> Result<T, Error> {
    match deadline {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| Error::Timeout(limit))?,
        None => fut.await,
    }
}
