use crate::context::{ContextEntry, ConversationContext};
use crate::Result;
use futures_util::stream::{BoxStream, StreamExt};
use std::sync::Arc;

/// Lazily produced answer fragments, in arrival order.
///
/// An empty fragment means "no text this step". An `Err` item ends the answer.
pub type FragmentStream = BoxStream<'static, Result<String>>;

#[async_trait::async_trait]
pub trait CompletionBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Open a streamed completion over `messages`. Errors here are errors
    /// establishing the stream; errors while draining arrive as stream items.
    async fn stream(&self, messages: &[ContextEntry]) -> Result<FragmentStream>;
}

#[derive(Clone)]
pub struct CompletionClient {
    backend: Arc<dyn CompletionBackend>,
}

impl CompletionClient {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Sends `context` followed by `query` as the final user message.
    pub async fn complete(&self, query: &str, context: &ConversationContext) -> Result<FragmentStream> {
        let mut messages = Vec::with_capacity(context.len() + 1);
        messages.extend_from_slice(context.entries());
        messages.push(ContextEntry::user(query));
        tracing::debug!(
            backend = self.backend.name(),
            messages = messages.len(),
            "requesting streamed completion"
        );
        self.backend.stream(&messages).await
    }
}

/// Drain `stream` into one string, calling `on_fragment` for each non-empty
/// fragment as it arrives.
pub async fn collect_fragments<F>(mut stream: FragmentStream, mut on_fragment: F) -> Result<String>
where
    F: FnMut(&str),
{
    let mut answer = String::new();
    while let Some(fragment) = stream.next().await {
        let fragment = fragment?;
        if fragment.is_empty() {
            continue;
        }
        on_fragment(&fragment);
        answer.push_str(&fragment);
    }
    Ok(answer)
}
