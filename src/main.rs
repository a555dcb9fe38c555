//! # Adaptive RAG CLI (`arag`)
//!
//! Ask questions against an embedded document store, keep multi-turn
//! conversations, and serve the same pipeline over HTTP.
//!
//! ## Usage
//!
//! ```bash
//! arag --config ./config/arag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `arag init` | Create the SQLite database and run schema migrations |
//! | `arag ask "<query>"` | Run one turn and print the answer |
//! | `arag chat` | Interactive conversation on one thread |
//! | `arag history <thread>` | Print a thread's turns |
//! | `arag threads` | List known threads |
//! | `arag stats` | Database and memory overview |
//! | `arag serve` | Start the HTTP server |
//!
//! ## Logging
//!
//! Logs go to stderr and are filtered with `RUST_LOG`
//! (default `adaptive_rag=info,adaptive_rag_core=info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use adaptive_rag::config;
use adaptive_rag::{chat, migrate, server, stats};

/// Adaptive RAG: routed, multi-stage retrieval-augmented answering with
/// conversation memory.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/arag.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "arag",
    about = "Adaptive RAG: routed retrieval-augmented answering with conversation memory",
    version,
    long_about = "Adaptive RAG classifies each question as general or retrieval-worthy. \
    Retrieval questions are expanded into several queries, searched in a vector store, \
    deduplicated, compressed, reranked, and answered with citations. Every turn is \
    recorded per conversation thread."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/arag.toml`. Model, embedding, store, pipeline,
    /// and server settings are read from this file.
    #[arg(long, global = true, default_value = "./config/arag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (conversations, turns, chunks). Running it again is safe.
    Init,

    /// Ask one question.
    ///
    /// Prints the answer, the route taken, and any cited sources. Without
    /// `--thread` a new thread is started and its id is printed.
    Ask {
        /// The question.
        query: String,

        /// Continue an existing conversation thread.
        #[arg(long)]
        thread: Option<String>,

        /// Also print the turn's state trace and routing rationale.
        #[arg(long)]
        trace: bool,
    },

    /// Start an interactive conversation.
    ///
    /// Reads questions from stdin until EOF, `exit`, or `quit`.
    Chat {
        /// Continue an existing conversation thread.
        #[arg(long)]
        thread: Option<String>,
    },

    /// Print every turn of a conversation thread.
    History {
        /// Thread identifier.
        thread: String,
    },

    /// List known conversation threads.
    Threads,

    /// Show database statistics.
    Stats,

    /// Start the HTTP server.
    ///
    /// Binds to `[server].bind` and serves `POST /chat`, `GET /threads`,
    /// `GET /threads/{id}`, and `GET /health`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("adaptive_rag=info".parse()?)
                .add_directive("adaptive_rag_core=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ask {
            query,
            thread,
            trace,
        } => {
            chat::run_ask(&cfg, &query, thread, trace).await?;
        }
        Commands::Chat { thread } => {
            chat::run_chat(&cfg, thread).await?;
        }
        Commands::History { thread } => {
            chat::run_history(&cfg, &thread).await?;
        }
        Commands::Threads => {
            chat::run_threads(&cfg).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
