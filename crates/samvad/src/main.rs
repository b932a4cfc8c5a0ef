//! Command-line chat surface over the agent engine.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use samvad::config::AgentConfig;
use samvad::embeddings::GeminiEmbeddingClient;
use samvad::engine::AgentEngine;
use samvad::llm::GeminiClient;

#[derive(Parser)]
#[command(name = "samvad", about = "Document-grounded conversational agent", version)]
struct Cli {
    /// Path to a JSON config file (defaults apply when omitted).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest documents and/or a URL into a fresh index.
    Ingest {
        /// Files to ingest (pdf, csv, txt, xls, xlsx, json).
        paths: Vec<PathBuf>,
        /// Web page to fetch and ingest alongside the files.
        #[arg(long)]
        url: Option<String>,
    },
    /// Interactive chat. Type q, quit, or exit to leave.
    Chat {
        /// Resume an existing session instead of starting a new one.
        #[arg(long)]
        session: Option<String>,
        /// Indexes to ground answers in.
        #[arg(long = "index")]
        indexes: Vec<String>,
    },
    /// List sessions that have at least one stored turn.
    Sessions,
    /// Print the stored history of one session.
    History { session_id: String },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<AgentConfig> {
    match path {
        Some(p) => AgentConfig::from_file(p).map_err(|e| anyhow::anyhow!(e)),
        None => Ok(AgentConfig::default()),
    }
}

fn build_engine(config: &AgentConfig) -> anyhow::Result<AgentEngine> {
    let api_key = config
        .services
        .resolve_api_key()
        .context("no API key: set services.api_key in the config or GEMINI_API_KEY in the environment")?;
    let timeout = Duration::from_secs(config.services.request_timeout_secs);

    let generation = Arc::new(GeminiClient::new(
        api_key.clone(),
        config.services.generation_model.clone(),
        config.services.endpoint_base.clone(),
        timeout,
    ));
    let embeddings = Arc::new(GeminiEmbeddingClient::new(
        api_key,
        config.services.embedding_model.clone(),
        config.services.endpoint_base.clone(),
        timeout,
    ));

    Ok(AgentEngine::new(config, generation, embeddings)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("samvad=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;
    config.validate().map_err(|e| anyhow::anyhow!(e))?;

    match cli.command {
        Command::Ingest { paths, url } => {
            if paths.is_empty() && url.is_none() {
                bail!("nothing to ingest: pass file paths and/or --url");
            }
            let engine = build_engine(&config)?;
            match engine.ingest(&paths, url.as_deref()).await? {
                Some(report) => {
                    println!(
                        "Indexed {} chunks under '{}'",
                        report.chunk_count, report.index_id
                    );
                }
                None => println!("No indexable content found."),
            }
        }
        Command::Chat { session, indexes } => {
            let engine = build_engine(&config)?;
            let session_id = session.unwrap_or_else(|| engine.sessions().create_session());
            run_repl(&engine, &session_id, &indexes).await?;
        }
        Command::Sessions => {
            let engine = build_engine(&config)?;
            for id in engine.sessions().list_sessions()? {
                println!("{}", id);
            }
        }
        Command::History { session_id } => {
            let engine = build_engine(&config)?;
            for turn in engine.sessions().get_history(&session_id)? {
                println!("[{}] {}: {}", turn.timestamp, turn.role.as_str(), turn.content);
            }
        }
    }

    Ok(())
}

async fn run_repl(engine: &AgentEngine, session_id: &str, indexes: &[String]) -> anyhow::Result<()> {
    println!("Session {}", session_id);
    if !indexes.is_empty() {
        println!("Grounded in: {}", indexes.join(", "));
    }

    // Print any prior turns so resuming a session shows its context.
    for turn in engine.sessions().get_history(session_id)? {
        println!("{}: {}", turn.role.as_str(), turn.content);
    }

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    loop {
        print!("you: ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if matches!(message, "q" | "quit" | "exit") {
            break;
        }

        match engine.interact(message, session_id, indexes).await {
            Ok(result) => {
                println!("ai: {}", result.final_text);
                if let Some(output) = result.tool_output {
                    println!("    (last tool result: {})", output);
                }
            }
            Err(e) => eprintln!("error: {}", e),
        }
    }

    Ok(())
}
