//! RAG chatbot that answers questions based on provided documents.
//!
//! ```bash
//! cargo run --bin rag-chat -- --question "What is covered?" --files notes.md,faq.txt
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use critique_researcher::chat::{load_documents, ChatSession, LineInput, StaticRetriever};
use critique_researcher::{Config, OllamaModel};

#[derive(Parser, Debug)]
#[command(
    name = "rag-chat",
    version,
    about = "RAG chatbot that answers questions based on provided documents"
)]
struct Args {
    /// The question to ask
    #[arg(long)]
    question: String,

    /// Comma-separated list of document file paths (.pdf, .txt, .md)
    #[arg(long)]
    files: String,

    /// The Ollama model to use
    #[arg(short = 'm', long = "model", env = "OLLAMA_MODEL")]
    model: Option<String>,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long = "verbose", default_value = "false")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::from_env()?;
    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    if let Some(model) = args.model {
        config.model = model;
    }
    config.validate()?;

    let documents = load_documents(&args.files).context("Failed to load documents")?;
    info!(count = documents.len(), "Documents loaded");

    let model = Arc::new(OllamaModel::new(
        &config.ollama_host,
        config.model.clone(),
        config.temperature,
    ));
    let retriever = Arc::new(StaticRetriever::new(documents));
    let mut session = ChatSession::new(model, retriever);

    let stdin = std::io::stdin();
    let mut input = LineInput::new(stdin.lock());
    let mut stdout = std::io::stdout();

    let end = session
        .run(&args.question, &mut input, &mut stdout)
        .await
        .context("Chat session failed")?;

    info!(reason = ?end, "Chat ended");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parsing() {
        let args = Args::parse_from(["rag-chat", "--question", "What?", "--files", "a.txt,b.md"]);
        assert_eq!(args.question, "What?");
        assert_eq!(args.files, "a.txt,b.md");
    }
}
