use askweb_core::{Error, Result};
use std::time::Duration;

pub mod extract;
pub mod openai_compat;
pub mod search;

pub use extract::HtmlPageExtractor;
pub use openai_compat::OpenAiCompatClient;
pub use search::SerperSearchProvider;

pub(crate) fn env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Shared HTTP client for all three backends.
///
/// Only the connect phase is bounded here. Search and page fetches set their
/// own per-request timeouts; completion streams run until the server ends them.
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("askweb/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(10))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| Error::NotConfigured(format!("http client: {e}")))
}


#[cfg(test)]
mod tests {
    use super::*;

    struct EnvGuard {
        k: &'static str,
        prev: Option<String>,
    }

    impl EnvGuard {
        fn set(k: &'static str, v: &str) -> Self {
            let prev = std::env::var(k).ok();
            std::env::set_var(k, v);
            Self { k, prev }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            if let Some(v) = self.prev.take() {
                std::env::set_var(self.k, v);
            } else {
                std::env::remove_var(self.k);
            }
        }
    }

    #[test]
    fn blank_env_values_are_treated_as_missing() {
        let _g1 = EnvGuard::set("ASKWEB_TEST_BLANK", "   ");
        let _g2 = EnvGuard::set("ASKWEB_TEST_SET", "  value ");
        assert!(env("ASKWEB_TEST_BLANK").is_none());
        assert_eq!(env("ASKWEB_TEST_SET").as_deref(), Some("value"));
        assert!(env("ASKWEB_TEST_DEFINITELY_UNSET").is_none());
    }

    #[test]
    fn providers_pick_up_env_overrides() {
        let _g1 = EnvGuard::set("ASKWEB_SERPER_ENDPOINT", "http://127.0.0.1:9/search");
        let _g2 = EnvGuard::set("ASKWEB_LLM_BASE_URL", "http://127.0.0.1:9");
        let _g3 = EnvGuard::set("ASKWEB_LLM_MODEL", "env-model");
        let client = http_client().unwrap();

        let s = SerperSearchProvider::from_env(client.clone());
        assert_eq!(s.endpoint(), "http://127.0.0.1:9/search");

        let c = OpenAiCompatClient::from_env(client.clone(), None);
        assert_eq!(c.base_url(), "http://127.0.0.1:9");
        assert_eq!(c.model(), "env-model");

        let c = OpenAiCompatClient::from_env(client, Some("flag-model".to_string()));
        assert_eq!(c.model(), "flag-model");
    }
}
