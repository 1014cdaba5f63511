pub mod openai;
pub mod types;

use std::pin::Pin;

use futures::Stream;

use crate::error::Error;
use crate::llm::types::{CompletionRequest, StreamEvent};

/// Incremental completion events, ending with [`StreamEvent::Done`].
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, Error>> + Send>>;

/// Callback for streaming text deltas.
pub type OnText = dyn Fn(&str) + Send + Sync;

/// Trait for LLM providers.
///
/// Implementors must be thread-safe (`Send + Sync`) so one provider can back
/// every session of a run.
pub trait LlmProvider: Send + Sync {
    /// Start a streamed completion. Transport and status errors surface here;
    /// errors found mid-stream are yielded as stream items.
    fn stream(
        &self,
        request: CompletionRequest,
    ) -> impl std::future::Future<Output = Result<CompletionStream, Error>> + Send;
}
