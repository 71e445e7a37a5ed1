use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use askweb_cli::chat;
use askweb_cli::config::{self, BackendArgs, Settings};

#[derive(Parser, Debug)]
#[command(name = "askweb")]
#[command(about = "Chat with an LLM whose answers are grounded in live web search", long_about = None)]
struct Cli {
    #[command(flatten)]
    backend: BackendArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Interactive session (default). Type `salir` or send EOF to quit.
    Chat {
        /// Print answer fragments as they arrive.
        #[arg(long, default_value_t = false)]
        stream: bool,
    },
    /// Run a single turn and exit.
    Ask {
        query: String,
        /// Print `{answer, sources}` as JSON instead of the chat transcript.
        #[arg(long, default_value_t = false)]
        json: bool,
        #[arg(long, default_value_t = false, conflicts_with = "json")]
        stream: bool,
    },
    /// Print configuration as JSON (key presence only, never values).
    Doctor,
    /// Print version as JSON.
    Version {
        /// `json` (default) or `text`.
        #[arg(long, default_value = "json")]
        output: String,
    },
}

fn init_tracing() {
    // Logs go to stderr so stdout stays clean for answers and JSON.
    let filter = EnvFilter::try_from_env("ASKWEB_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

async fn ask(settings: &Settings, query: &str, json: bool, stream: bool) -> Result<()> {
    let mut orchestrator = settings.build_orchestrator()?;
    if json {
        let outcome = orchestrator.run_turn(query).await?;
        let v = serde_json::json!({
            "answer": outcome.answer,
            "sources": outcome.sources,
        });
        println!("{v}");
        return Ok(());
    }
    let mut console = chat::Console::new(std::io::stdout(), stream);
    match orchestrator.run_turn_observed(query, &mut console).await {
        Ok(outcome) => {
            console.report(&outcome)?;
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!("response generation failed: {e}")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    if config::dotenv_enabled() {
        dotenvy::dotenv().ok();
    }

    let cli = Cli::parse();
    init_tracing();

    let settings = Settings::resolve(&cli.backend);

    match cli.command.unwrap_or(Commands::Chat { stream: false }) {
        Commands::Chat { stream } => {
            settings.warn_missing_keys();
            let mut orchestrator = settings.build_orchestrator()?;
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            chat::run(&mut orchestrator, stdin, std::io::stdout(), stream).await?;
        }
        Commands::Ask {
            query,
            json,
            stream,
        } => {
            settings.warn_missing_keys();
            ask(&settings, &query, json, stream).await?;
        }
        Commands::Doctor => {
            println!("{}", serde_json::to_string(&settings.doctor()?)?);
        }
        Commands::Version { output } => {
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "version",
                "ok": true,
                "name": "askweb",
                "version": env!("CARGO_PKG_VERSION"),
            });
            match output.to_ascii_lowercase().as_str() {
                "text" => println!("askweb {}", env!("CARGO_PKG_VERSION")),
                _ => println!("{v}"),
            }
        }
    }
    Ok(())
}
