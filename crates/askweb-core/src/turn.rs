use crate::context::{ContextEntry, ConversationContext};
use crate::stream::{collect_fragments, CompletionClient};
use crate::{Error, ExtractedText, PageExtractor, Result, SearchClient};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    Idle,
    Searching,
    Extracting,
    ContextUpdatingPre,
    Generating,
    ContextUpdatingPost,
    Reporting,
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub answer: String,
    /// URLs that were fetched this turn, in provider order.
    pub sources: Vec<String>,
    /// Concatenated excerpts (each followed by a newline) as folded into context.
    pub retrieved_text: String,
    pub extractions: Vec<ExtractedText>,
}

/// Presentation hook for a running turn. Both methods default to no-ops.
pub trait TurnObserver: Send {
    fn phase(&mut self, _phase: TurnPhase) {}
    fn fragment(&mut self, _fragment: &str) {}
}

impl TurnObserver for () {}

/// Drives one query/answer turn at a time and owns the conversation memory.
pub struct Orchestrator {
    search: SearchClient,
    extractor: Arc<dyn PageExtractor>,
    completion: CompletionClient,
    context: ConversationContext,
    phase: TurnPhase,
}

impl Orchestrator {
    pub fn new(
        search: SearchClient,
        extractor: Arc<dyn PageExtractor>,
        completion: CompletionClient,
    ) -> Self {
        Self::with_context(search, extractor, completion, ConversationContext::new())
    }

    pub fn with_context(
        search: SearchClient,
        extractor: Arc<dyn PageExtractor>,
        completion: CompletionClient,
        context: ConversationContext,
    ) -> Self {
        Self {
            search,
            extractor,
            completion,
            context,
            phase: TurnPhase::Idle,
        }
    }

    pub fn context(&self) -> &ConversationContext {
        &self.context
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    fn enter<O: TurnObserver>(&mut self, phase: TurnPhase, observer: &mut O) {
        tracing::debug!(from = ?self.phase, to = ?phase, "turn phase");
        self.phase = phase;
        observer.phase(phase);
    }

    pub async fn run_turn(&mut self, query: &str) -> Result<TurnOutcome> {
        self.run_turn_observed(query, &mut ()).await
    }

    /// Like [`Orchestrator::run_turn`], reporting phase changes and answer
    /// fragments to `observer` as they happen. The outcome is the same.
    pub async fn run_turn_observed<O: TurnObserver>(
        &mut self,
        query: &str,
        observer: &mut O,
    ) -> Result<TurnOutcome> {
        let outcome = self.drive(query, observer).await;
        self.enter(TurnPhase::Idle, observer);
        outcome
    }

    async fn drive<O: TurnObserver>(&mut self, query: &str, observer: &mut O) -> Result<TurnOutcome> {
        self.enter(TurnPhase::Searching, observer);
        let results = self.search.search(query).await;

        self.enter(TurnPhase::Extracting, observer);
        let mut sources = Vec::new();
        let mut extractions = Vec::new();
        let mut retrieved_text = String::new();
        for r in results {
            if r.url.is_empty() {
                tracing::debug!(title = ?r.title, "skipping search result without a link");
                continue;
            }
            let ex = self.extractor.extract(&r.url).await;
            if ex.is_failed() {
                tracing::warn!(url = %r.url, "page extraction failed; folding error text into context");
            }
            retrieved_text.push_str(&ex.text);
            retrieved_text.push('\n');
            sources.push(r.url);
            extractions.push(ex);
        }

        self.enter(TurnPhase::ContextUpdatingPre, observer);
        self.context.push(ContextEntry::assistant(retrieved_text.clone()));
        self.context.push(ContextEntry::user(query));

        self.enter(TurnPhase::Generating, observer);
        let answer = match self.completion.complete(query, &self.context).await {
            Ok(stream) => collect_fragments(stream, |f| observer.fragment(f)).await,
            Err(e) => Err(e),
        }
        .map_err(|e| match e {
            Error::Llm(msg) => Error::Llm(msg),
            other => Error::Llm(other.to_string()),
        })?;

        self.enter(TurnPhase::ContextUpdatingPost, observer);
        self.context.push(ContextEntry::assistant(answer.clone()));

        self.enter(TurnPhase::Reporting, observer);
        Ok(TurnOutcome {
            answer,
            sources,
            retrieved_text,
            extractions,
        })
    }
}
