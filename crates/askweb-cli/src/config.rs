use askweb_core::{CompletionClient, ConversationContext, Orchestrator, SearchClient};
use askweb_local::openai_compat::{self, OpenAiCompatClient};
use askweb_local::search::{self, SerperSearchProvider};
use askweb_local::HtmlPageExtractor;
use serde::Serialize;
use std::sync::Arc;

/// Non-secret knobs. API keys are only ever read from the environment.
#[derive(clap::Args, Debug, Clone)]
pub struct BackendArgs {
    /// Search endpoint (serper.dev-compatible).
    #[arg(long, global = true, env = "ASKWEB_SERPER_ENDPOINT")]
    pub serper_endpoint: Option<String>,

    /// Base URL of the OpenAI-compatible completion server.
    #[arg(long, global = true, env = "ASKWEB_LLM_BASE_URL")]
    pub llm_base_url: Option<String>,

    /// Model identifier sent with every completion request.
    #[arg(long, global = true, env = "ASKWEB_LLM_MODEL")]
    pub model: Option<String>,

    /// Log a warning once the conversation holds more than this many entries.
    #[arg(long, global = true, env = "ASKWEB_CONTEXT_WARN_ENTRIES", default_value_t = 200)]
    pub context_warn_entries: usize,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub serper_endpoint: Option<String>,
    pub serper_api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub llm_api_key: Option<String>,
    pub model: Option<String>,
    pub context_warn_entries: usize,
}

impl Settings {
    pub fn resolve(args: &BackendArgs) -> Self {
        Self {
            serper_endpoint: args.serper_endpoint.clone(),
            serper_api_key: search::serper_api_key_from_env(),
            llm_base_url: args.llm_base_url.clone(),
            llm_api_key: openai_compat::openai_compat_api_key_from_env(),
            model: args.model.clone(),
            context_warn_entries: args.context_warn_entries,
        }
    }

    pub fn warn_missing_keys(&self) {
        if self.serper_api_key.is_none() {
            tracing::warn!("SERPER_API_KEY is not set; searches will fail and answers will not be augmented");
        }
        if self.llm_api_key.is_none() {
            tracing::warn!("GROQ_API_KEY is not set; the completion server will likely reject requests");
        }
    }

    pub fn build_orchestrator(&self) -> anyhow::Result<Orchestrator> {
        let client = askweb_local::http_client()?;
        let search = SerperSearchProvider::new(
            client.clone(),
            self.serper_api_key.clone(),
            self.serper_endpoint.clone(),
        );
        let extractor = HtmlPageExtractor::new(client.clone());
        let llm = OpenAiCompatClient::new(
            client,
            self.llm_base_url.clone(),
            self.llm_api_key.clone(),
            self.model.clone(),
        );
        tracing::info!(
            search_endpoint = search.endpoint(),
            llm_base_url = llm.base_url(),
            model = llm.model(),
            "backends configured"
        );
        Ok(Orchestrator::with_context(
            SearchClient::new(Arc::new(search)),
            Arc::new(extractor),
            CompletionClient::new(Arc::new(llm)),
            ConversationContext::with_growth_warning(self.context_warn_entries),
        ))
    }

    /// Configuration summary without secret values.
    pub fn doctor(&self) -> anyhow::Result<DoctorReport> {
        let client = askweb_local::http_client()?;
        let search = SerperSearchProvider::new(
            client.clone(),
            self.serper_api_key.clone(),
            self.serper_endpoint.clone(),
        );
        let llm = OpenAiCompatClient::new(
            client,
            self.llm_base_url.clone(),
            self.llm_api_key.clone(),
            self.model.clone(),
        );
        Ok(DoctorReport {
            schema_version: 1,
            kind: "doctor",
            ok: true,
            name: "askweb",
            version: env!("CARGO_PKG_VERSION"),
            search: DoctorSearch {
                provider: "serper",
                endpoint: search.endpoint().to_string(),
                api_key_present: search.has_api_key(),
            },
            llm: DoctorLlm {
                base_url: llm.base_url().to_string(),
                model: llm.model().to_string(),
                api_key_present: llm.has_api_key(),
            },
            dotenv_enabled: dotenv_enabled(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct DoctorReport {
    pub schema_version: u32,
    pub kind: &'static str,
    pub ok: bool,
    pub name: &'static str,
    pub version: &'static str,
    pub search: DoctorSearch,
    pub llm: DoctorLlm,
    pub dotenv_enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct DoctorSearch {
    pub provider: &'static str,
    pub endpoint: String,
    pub api_key_present: bool,
}

#[derive(Debug, Serialize)]
pub struct DoctorLlm {
    pub base_url: String,
    pub model: String,
    pub api_key_present: bool,
}

/// `.env` autoload is on unless `ASKWEB_DOTENV` is `0`/`false`/`off`.
pub fn dotenv_enabled() -> bool {
    !matches!(
        std::env::var("ASKWEB_DOTENV")
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
            .as_str(),
        "0" | "false" | "no" | "off"
    )
}
