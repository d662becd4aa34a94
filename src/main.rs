//! chat-sync - interactive client for a remote chat thread
//!
//! Reads lines from stdin and sends them to the configured thread API.
//! The conversation is restored from the local database on startup.

use chat_sync::{
    Database, DatabaseStore, HttpTransport, LoggingTransport, SendOutcome, SkipReason, Thread,
    ThreadEngine, TransportConfig,
};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type Engine = ThreadEngine<LoggingTransport<HttpTransport>, DatabaseStore>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so they don't interleave with the conversation
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chat_sync=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    // Configuration
    let Some(config) = TransportConfig::from_env() else {
        return Err("CHAT_SYNC_API_URL is not set".into());
    };

    let db_path = std::env::var("CHAT_SYNC_DB_PATH").unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        format!("{home}/.chat-sync/state.db")
    });

    if let Some(parent) = PathBuf::from(&db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %db_path, "Opening database");
    let db = Database::open(&db_path)?;

    tracing::info!(
        base_url = %config.base_url,
        timeout_secs = config.timeout.as_secs(),
        authenticated = config.api_token.is_some(),
        "Thread API configured"
    );
    let transport = LoggingTransport::new(HttpTransport::new(&config)?);
    let engine: Engine = ThreadEngine::restore(transport, DatabaseStore::new(db)).await;

    if let Some(thread) = engine.thread() {
        println!("Resumed thread {} ({} messages)", thread.id, thread.messages().len());
    }
    println!("Commands: /new /reload /reset /history /quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "/quit" => break,
            "/new" => match engine.new_chat().await {
                Ok(id) => println!("Started thread {id}"),
                Err(e) => eprintln!("error: {e}"),
            },
            "/reload" => match engine.reload_thread().await {
                Ok(thread) => print_thread(&thread),
                Err(e) => eprintln!("error: {e}"),
            },
            "/reset" => {
                engine.reset().await;
                println!("Conversation cleared");
            }
            "/history" => match engine.thread() {
                Some(thread) => print_thread(&thread),
                None => println!("No conversation yet"),
            },
            text => match engine.send_message(text).await {
                Ok(SendOutcome::Sent { assistant, .. }) => println!("{}", assistant.content),
                Ok(SendOutcome::Skipped(SkipReason::SendInProgress)) => {
                    eprintln!("A message is still being sent");
                }
                Ok(SendOutcome::Skipped(SkipReason::EmptyText)) => {}
                Err(e) => eprintln!("error: {e}"),
            },
        }
    }

    Ok(())
}

fn print_thread(thread: &Thread) {
    if let Some(title) = &thread.metadata.title {
        println!("# {title}");
    }
    println!("thread {}", thread.id);
    for message in thread.messages() {
        println!("[{}] {}", message.role, message.content);
    }
}
