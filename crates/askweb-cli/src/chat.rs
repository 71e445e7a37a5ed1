use askweb_core::{Orchestrator, TurnObserver, TurnOutcome, TurnPhase};
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

pub const EXIT_WORD: &str = "salir";

fn strip_newline(line: &str) -> &str {
    line.trim_end_matches(['\r', '\n'])
}

/// Only the bare word quits; padded input is an ordinary query.
pub fn is_exit(line: &str) -> bool {
    strip_newline(line).eq_ignore_ascii_case(EXIT_WORD)
}

/// Prints status lines, and with `stream` set echoes answer fragments as they arrive.
pub struct Console<W: Write + Send> {
    out: W,
    stream: bool,
}

impl<W: Write + Send> Console<W> {
    pub fn new(out: W, stream: bool) -> Self {
        Self { out, stream }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn report(&mut self, outcome: &TurnOutcome) -> std::io::Result<()> {
        if self.stream {
            writeln!(self.out)?;
        } else {
            writeln!(self.out, "\n> askweb: {}", outcome.answer)?;
        }
        writeln!(self.out, "\nReferences:")?;
        for url in &outcome.sources {
            writeln!(self.out, "- {url}")?;
        }
        self.out.flush()
    }
}

// Write errors on stdout are not actionable mid-turn; `report` surfaces them.
impl<W: Write + Send> TurnObserver for Console<W> {
    fn phase(&mut self, phase: TurnPhase) {
        let line = match phase {
            TurnPhase::Searching => "\n> askweb: ** Searching the web... **",
            TurnPhase::Generating => "\n> askweb: ** Generating response... **",
            _ => return,
        };
        let _ = writeln!(self.out, "{line}");
        if self.stream && phase == TurnPhase::Generating {
            let _ = write!(self.out, "\n> askweb: ");
        }
        let _ = self.out.flush();
    }

    fn fragment(&mut self, fragment: &str) {
        if self.stream {
            let _ = write!(self.out, "{fragment}");
            let _ = self.out.flush();
        }
    }
}

/// Reads one query per line until `salir` or EOF. Generation failures and
/// undecodable lines are printed to stderr and the loop carries on.
pub async fn run<R, W>(
    orchestrator: &mut Orchestrator,
    mut input: R,
    out: W,
    stream: bool,
) -> anyhow::Result<W>
where
    R: AsyncBufRead + Unpin,
    W: Write + Send,
{
    let mut console = Console::new(out, stream);
    writeln!(console.out, "Welcome to askweb. Type '{EXIT_WORD}' to quit.")?;
    let mut raw = Vec::new();
    loop {
        write!(console.out, "> you: ")?;
        console.out.flush()?;
        raw.clear();
        if input.read_until(b'\n', &mut raw).await? == 0 {
            writeln!(console.out)?;
            break;
        }
        let line = match std::str::from_utf8(&raw) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "skipping input line that is not valid UTF-8");
                eprintln!("input is not valid UTF-8, line ignored");
                continue;
            }
        };
        if is_exit(line) {
            break;
        }
        let query = strip_newline(line);
        match orchestrator.run_turn_observed(query, &mut console).await {
            Ok(outcome) => console.report(&outcome)?,
            Err(e) => {
                if stream {
                    writeln!(console.out)?;
                }
                eprintln!("response generation failed: {e}");
            }
        }
    }
    console.out.flush()?;
    Ok(console.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use askweb_core::{
        CompletionBackend, CompletionClient, ContextEntry, Error, ExtractedText, FragmentStream,
        PageExtractor, SearchClient, SearchProvider, SearchQuery, SearchResponse, SearchResult,
    };
    use futures_util::stream::{self, StreamExt};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    struct OneHit;

    #[async_trait::async_trait]
    impl SearchProvider for OneHit {
        fn name(&self) -> &'static str {
            "one"
        }

        async fn search(&self, _q: &SearchQuery) -> askweb_core::Result<SearchResponse> {
            Ok(SearchResponse {
                results: vec![SearchResult {
                    url: "https://src.test/a".to_string(),
                    title: None,
                    source: "one".to_string(),
                }],
                provider: "one".to_string(),
                timings_ms: BTreeMap::new(),
            })
        }
    }

    struct Echo;

    #[async_trait::async_trait]
    impl PageExtractor for Echo {
        async fn extract(&self, url: &str) -> ExtractedText {
            ExtractedText::retrieved(url, "page")
        }
    }

    struct Answer(bool);

    #[async_trait::async_trait]
    impl CompletionBackend for Answer {
        fn name(&self) -> &'static str {
            "answer"
        }

        async fn stream(&self, _m: &[ContextEntry]) -> askweb_core::Result<FragmentStream> {
            if !self.0 {
                return Err(Error::Llm("HTTP 500".to_string()));
            }
            Ok(stream::iter(vec![Ok("Hel".to_string()), Ok("lo".to_string())]).boxed())
        }
    }

    fn orchestrator(ok: bool) -> Orchestrator {
        Orchestrator::new(
            SearchClient::new(Arc::new(OneHit)),
            Arc::new(Echo),
            CompletionClient::new(Arc::new(Answer(ok))),
        )
    }

    async fn session(o: &mut Orchestrator, stdin: &str, stream: bool) -> String {
        session_bytes(o, stdin.as_bytes(), stream).await
    }

    async fn session_bytes(o: &mut Orchestrator, stdin: &[u8], stream: bool) -> String {
        let out = run(o, stdin, Vec::new(), stream).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn exit_word_is_exact_apart_from_case() {
        assert!(is_exit("salir"));
        assert!(is_exit("SALIR\n"));
        assert!(is_exit("Salir\r\n"));
        assert!(!is_exit("  salir \n"));
        assert!(!is_exit("salir ahora"));
        assert!(!is_exit(""));
    }

    #[tokio::test]
    async fn padded_exit_word_is_sent_as_a_query() {
        let mut o = orchestrator(true);
        let out = session(&mut o, "  salir \nsalir\n", false).await;
        assert_eq!(out.matches("References:").count(), 1);
        assert_eq!(o.context().entries()[1].content(), "  salir ");
    }

    #[tokio::test]
    async fn invalid_utf8_line_is_skipped_and_session_continues() {
        let mut o = orchestrator(true);
        let out = session_bytes(&mut o, b"caf\xe9\nhi\nsalir\n", false).await;
        assert_eq!(out.matches("References:").count(), 1);
        assert_eq!(o.phase(), askweb_core::TurnPhase::Idle);
        assert_eq!(o.context().entries()[1].content(), "hi");
    }

    #[tokio::test]
    async fn one_turn_prints_status_answer_and_references() {
        let mut o = orchestrator(true);
        let out = session(&mut o, "hi\nsalir\n", false).await;
        let searching = out.find("** Searching the web... **").unwrap();
        let generating = out.find("** Generating response... **").unwrap();
        let answer = out.find("> askweb: Hello").unwrap();
        let refs = out.find("References:\n- https://src.test/a").unwrap();
        assert!(searching < generating && generating < answer && answer < refs);
        assert_eq!(o.context().len(), 3);
    }

    #[tokio::test]
    async fn streaming_mode_echoes_fragments_once() {
        let mut o = orchestrator(true);
        let out = session(&mut o, "hi\n", true).await;
        assert_eq!(out.matches("Hello").count(), 1);
        assert!(out.contains("References:"));
    }

    #[tokio::test]
    async fn eof_ends_the_session_without_a_turn() {
        let mut o = orchestrator(true);
        let out = session(&mut o, "", false).await;
        assert!(out.starts_with("Welcome to askweb."));
        assert!(o.context().is_empty());
    }

    #[tokio::test]
    async fn generation_failure_does_not_end_the_session() {
        let mut o = orchestrator(false);
        let out = session(&mut o, "one\ntwo\nSalir\n", false).await;
        assert!(!out.contains("References:"));
        // Both turns ran and each left its two pre-generation entries.
        assert_eq!(o.context().len(), 4);
    }
}
