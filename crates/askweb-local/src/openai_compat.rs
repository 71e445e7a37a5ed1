use crate::env;
use askweb_core::{CompletionBackend, ContextEntry, Error, FragmentStream, Result};
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::pin::Pin;

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai";
pub const DEFAULT_MODEL: &str = "mixtral-8x7b-32768";

pub fn openai_compat_base_url_from_env() -> Option<String> {
    env("ASKWEB_LLM_BASE_URL")
}

pub fn openai_compat_api_key_from_env() -> Option<String> {
    env("ASKWEB_LLM_API_KEY").or_else(|| env("GROQ_API_KEY"))
}

pub fn openai_compat_model_from_env() -> Option<String> {
    env("ASKWEB_LLM_MODEL")
}

/// Fixed sampling parameters sent with every completion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    pub temperature: f64,
    pub top_p: f64,
    pub max_completion_tokens: u64,
}

impl Default for Sampling {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            top_p: 1.0,
            max_completion_tokens: 1024,
        }
    }
}

/// Streaming chat-completions client for OpenAI-compatible servers (Groq by default).
#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    sampling: Sampling,
}

impl OpenAiCompatClient {
    pub fn new(
        client: reqwest::Client,
        base_url: Option<String>,
        api_key: Option<String>,
        model: Option<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            sampling: Sampling::default(),
        }
    }

    /// `model_override` wins over `ASKWEB_LLM_MODEL`; anything unset falls back to the Groq defaults.
    pub fn from_env(client: reqwest::Client, model_override: Option<String>) -> Self {
        Self::new(
            client,
            openai_compat_base_url_from_env(),
            openai_compat_api_key_from_env(),
            model_override.or_else(openai_compat_model_from_env),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn endpoint_chat_completions(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.base_url.trim_end_matches('/')
        )
    }

    fn request(&self, messages: &[ContextEntry]) -> ChatCompletionsRequest {
        ChatCompletionsRequest {
            model: self.model.clone(),
            messages: messages
                .iter()
                .map(|m| Message {
                    role: m.role().as_str().to_string(),
                    content: m.content().to_string(),
                })
                .collect(),
            temperature: self.sampling.temperature,
            top_p: self.sampling.top_p,
            max_completion_tokens: self.sampling.max_completion_tokens,
            stream: true,
            stop: None,
        }
    }
}

#[async_trait::async_trait]
impl CompletionBackend for OpenAiCompatClient {
    fn name(&self) -> &'static str {
        "openai_compat"
    }

    async fn stream(&self, messages: &[ContextEntry]) -> Result<FragmentStream> {
        let mut rb = self
            .client
            .post(self.endpoint_chat_completions())
            .header(reqwest::header::ACCEPT, "text/event-stream");
        if let Some(k) = &self.api_key {
            rb = rb.bearer_auth(k);
        }

        let resp = rb
            .json(&self.request(messages))
            .send()
            .await
            .map_err(|e| Error::Llm(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let body = askweb_core::truncate_chars(body.trim(), 300);
            return Err(Error::Llm(format!(
                "openai_compat chat.completions HTTP {status}: {body}"
            )));
        }

        Ok(fragments_from_sse(resp.bytes_stream()))
    }
}

struct SseState<S> {
    body: Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<String>,
    done: bool,
}

/// Turn a raw SSE byte stream into answer fragments.
pub fn fragments_from_sse<S, B, E>(body: S) -> FragmentStream
where
    S: futures_util::Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = SseState {
        body: Box::pin(body),
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        done: false,
    };
    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(f) = st.pending.pop_front() {
                return Some((Ok(f), st));
            }
            if st.done {
                return None;
            }
            match st.body.next().await {
                Some(Ok(chunk)) => {
                    for ev in st.decoder.push(chunk.as_ref()) {
                        match ev {
                            SseEvent::Fragment(f) => st.pending.push_back(f),
                            SseEvent::Done => {
                                st.done = true;
                                break;
                            }
                        }
                    }
                }
                Some(Err(e)) => {
                    st.done = true;
                    return Some((Err(Error::Llm(format!("stream interrupted: {e}"))), st));
                }
                None => {
                    st.done = true;
                    for ev in st.decoder.finish() {
                        if let SseEvent::Fragment(f) = ev {
                            st.pending.push_back(f);
                        }
                    }
                }
            }
        }
    })
    .boxed()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Fragment(String),
    Done,
}

/// Line-buffered decoder for chat-completion server-sent events.
///
/// Network chunks may split lines (and UTF-8 sequences) anywhere; only
/// complete lines are decoded.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            if let Some(ev) = decode_line(&line) {
                out.push(ev);
            }
        }
        out
    }

    /// Flush a trailing line that had no terminating newline.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let line = std::mem::take(&mut self.buf);
        decode_line(&line).into_iter().collect()
    }
}

fn decode_line(raw: &[u8]) -> Option<SseEvent> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim();
    // Blank separators and `:` keep-alive comments.
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    let data = line.strip_prefix("data:")?.trim_start();
    if data == "[DONE]" {
        return Some(SseEvent::Done);
    }
    match serde_json::from_str::<ChatCompletionChunk>(data) {
        Ok(chunk) => Some(SseEvent::Fragment(
            chunk
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.delta.content)
                .unwrap_or_default(),
        )),
        Err(e) => {
            tracing::debug!(error = %e, "skipping unparsable completion chunk");
            None
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionsRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f64,
    top_p: f64,
    max_completion_tokens: u64,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Delta {
    content: Option<String>,
}
