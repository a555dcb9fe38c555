//! Interactive commands: `ask`, `chat`, `history`, and `threads`.
//!
//! `ask` and `chat` drive [`WorkflowOrchestrator::run_turn`]; `history`
//! and `threads` only read conversation memory, so they work without a
//! configured language model.

use anyhow::Result;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

use adaptive_rag_core::{TurnOutcome, TurnRequest, WorkflowOrchestrator};

use crate::config::Config;
use crate::pipeline;

fn new_thread_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn print_outcome(outcome: &TurnOutcome, trace: bool) {
    let response = &outcome.response;
    println!("{}", response.answer);
    println!();
    println!("  route: {}", response.path_taken);
    if !response.citations.is_empty() {
        println!("  sources:");
        for citation in &response.citations {
            println!("    - {}", citation);
        }
    }

    if trace {
        let states: Vec<String> = outcome
            .trace
            .states()
            .iter()
            .map(|s| format!("{:?}", s))
            .collect();
        println!("  trace: {}", states.join(" -> "));
        if let Some(confidence) = outcome.decision.confidence {
            println!("  confidence: {:.2}", confidence);
        }
        if let Some(rationale) = &outcome.decision.rationale {
            println!("  rationale: {}", rationale);
        }
    }
}

/// Run a single turn and print the answer.
pub async fn run_ask(
    config: &Config,
    query: &str,
    thread: Option<String>,
    trace: bool,
) -> Result<()> {
    let orchestrator = pipeline::build_orchestrator(config).await?;

    let generated = thread.is_none();
    let thread_id = thread.unwrap_or_else(new_thread_id);

    let outcome = orchestrator
        .run_turn(&TurnRequest::new(query, &thread_id))
        .await?;
    print_outcome(&outcome, trace);

    if generated {
        println!("  thread: {}", thread_id);
    }
    Ok(())
}

/// Read questions from stdin until EOF, `exit`, or `quit`.
pub async fn run_chat(config: &Config, thread: Option<String>) -> Result<()> {
    let orchestrator = pipeline::build_orchestrator(config).await?;
    let thread_id = thread.unwrap_or_else(new_thread_id);

    println!("Chatting on thread {} (type 'exit' to quit)", thread_id);
    chat_loop(&orchestrator, &thread_id).await
}

async fn chat_loop(orchestrator: &WorkflowOrchestrator, thread_id: &str) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };
        let query = line.trim();
        if query.is_empty() {
            continue;
        }
        if query.eq_ignore_ascii_case("exit") || query.eq_ignore_ascii_case("quit") {
            break;
        }

        match orchestrator
            .run_turn(&TurnRequest::new(query, thread_id))
            .await
        {
            Ok(outcome) => print_outcome(&outcome, false),
            Err(e) => eprintln!("Error: {}", e),
        }
        println!();
    }

    Ok(())
}

/// Print every persisted turn of a thread.
pub async fn run_history(config: &Config, thread_id: &str) -> Result<()> {
    let pool = pipeline::open_database(config).await?;
    let store = pipeline::conversation_store(config, &pool);

    let Some(state) = store.load(thread_id).await? else {
        println!("No turns for thread {}.", thread_id);
        pool.close().await;
        return Ok(());
    };

    println!("Thread {} ({} turns)", state.thread_id, state.turns.len());
    for (i, turn) in state.turns.iter().enumerate() {
        println!();
        println!(
            "[{}] {} ({})",
            i + 1,
            turn.timestamp.format("%Y-%m-%d %H:%M:%S"),
            turn.path_taken
        );
        println!("  Q: {}", turn.query);
        println!("  A: {}", turn.response);
        if !turn.citations.is_empty() {
            println!("  sources: {}", turn.citations.join(", "));
        }
    }

    pool.close().await;
    Ok(())
}

/// List known thread identifiers.
pub async fn run_threads(config: &Config) -> Result<()> {
    let pool = pipeline::open_database(config).await?;
    let store = pipeline::conversation_store(config, &pool);

    let threads = store.list_threads().await?;
    if threads.is_empty() {
        println!("No threads.");
    }
    for thread_id in threads {
        println!("{}", thread_id);
    }

    pool.close().await;
    Ok(())
}
