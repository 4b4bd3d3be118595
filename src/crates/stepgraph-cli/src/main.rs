//! # stepgraph
//!
//! Console agent with durable pause/resume. Configuration comes from flags,
//! the environment, or a `.env` file in the working directory.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use stepgraph_checkpoint::SqliteCheckpointStore;
use stepgraph_cli::agent::is_affirmative;
use stepgraph_cli::{build_agent, ChatSession, OpenAiCompatClient, OpenAiSettings, Turn};
use stepgraph_core::ExecutionEngine;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stepgraph")]
#[command(about = "Confirm-before-answering chat agent with durable checkpoints", long_about = None)]
#[command(version)]
struct Cli {
    /// SQLite checkpoint database
    #[arg(long, env = "STEPGRAPH_DB", default_value = "stepgraph_checkpoints.sqlite", global = true)]
    db: PathBuf,

    /// Conversation thread
    #[arg(long, env = "STEPGRAPH_THREAD", default_value = "stepgraph-agent-demo", global = true)]
    thread: String,

    #[command(flatten)]
    completion: CompletionArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the agent (default)
    Chat,
    /// Print the thread's current state as JSON
    State,
    /// Print the thread's checkpoint history as JSON, newest first
    History {
        /// Maximum number of checkpoints
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Print the agent graph as a Mermaid diagram
    Graph,
}

#[derive(Args)]
struct CompletionArgs {
    /// OpenAI-compatible endpoint, e.g. http://localhost:8000/v1
    #[arg(long, env = "OPENAI_BASE_URL", global = true)]
    base_url: Option<String>,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    #[arg(long, env = "OPENAI_MODEL", global = true)]
    model: Option<String>,

    #[arg(long, env = "OPENAI_MAX_TOKENS", global = true)]
    max_tokens: Option<u32>,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 120, global = true)]
    timeout: u64,
}

impl CompletionArgs {
    fn into_settings(self) -> OpenAiSettings {
        OpenAiSettings::resolve(self.base_url, self.api_key, self.model, self.max_tokens)
            .with_timeout(Duration::from_secs(self.timeout))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => chat(&cli.db, &cli.thread, cli.completion).await,
        Commands::State => {
            let engine = open_engine(&cli.db).await?;
            match engine.get_state(&cli.thread).await? {
                Some(snapshot) => println!("{}", serde_json::to_string_pretty(&snapshot)?),
                None => eprintln!("No checkpoints for thread '{}'", cli.thread),
            }
            Ok(())
        }
        Commands::History { limit } => {
            let engine = open_engine(&cli.db).await?;
            let history = engine.get_state_history(&cli.thread, limit).await?;
            println!("{}", serde_json::to_string_pretty(&history)?);
            Ok(())
        }
        Commands::Graph => {
            println!("{}", build_agent()?.to_mermaid());
            Ok(())
        }
    }
}

async fn open_engine(db: &Path) -> anyhow::Result<ExecutionEngine> {
    let store = SqliteCheckpointStore::open(db)
        .await
        .with_context(|| format!("failed to open checkpoint database {}", db.display()))?;
    Ok(ExecutionEngine::new(build_agent()?, Arc::new(store)))
}

async fn chat(db: &Path, thread: &str, args: CompletionArgs) -> anyhow::Result<()> {
    let client = OpenAiCompatClient::new(args.into_settings())?;
    tracing::info!(?client, "Completion service configured");

    let engine = open_engine(db).await?.with_completion(Arc::new(client));
    let session = ChatSession::new(engine, thread);
    let mut console = Console::new();

    if session.pending_confirmation().await?.is_some() {
        let Some(decision) = console
            .prompt("The last session stopped at the confirmation step. Answer now? yes/no ")
            .await?
        else {
            return Ok(());
        };
        let turn = session.decide(&decision).await?;
        print_turn(&turn);
    } else if let Some(steps) = session.unfinished_steps().await? {
        let Some(decision) = console
            .prompt(&format!(
                "The last session stopped before '{}' finished. Continue it? yes/no ",
                steps.join(", ")
            ))
            .await?
        else {
            return Ok(());
        };
        if is_affirmative(&decision) {
            let turn = session.continue_run().await?;
            print_turn(&turn);
        }
    }

    loop {
        let Some(question) = console.prompt("What would you like to ask? (exit to quit) ").await?
        else {
            break;
        };
        let question = question.trim();
        if question.is_empty() || question.eq_ignore_ascii_case("exit") {
            break;
        }

        let mut turn = session.ask(question).await?;
        while let Turn::AwaitingConfirmation(prompt) = &turn {
            let Some(decision) = console.prompt(&format!("{} ", prompt)).await? else {
                return Ok(());
            };
            turn = session.decide(&decision).await?;
        }
        print_turn(&turn);
    }

    Ok(())
}

fn print_turn(turn: &Turn) {
    if let Turn::Finished(Some(reply)) = turn {
        println!("Agent: {}", reply);
    }
}

/// Line-oriented stdin reader
struct Console {
    lines: Lines<BufReader<Stdin>>,
}

impl Console {
    fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    /// Print `prompt` and read one line; `None` at end of input
    async fn prompt(&mut self, prompt: &str) -> anyhow::Result<Option<String>> {
        print!("{}", prompt);
        std::io::stdout().flush()?;
        Ok(self.lines.next_line().await?)
    }
}
