//! # Critique Researcher
//!
//! Researches a topic in a loop: search, answer, review, and search again
//! with a bigger budget until the reviewer is satisfied.
//!
//! ```bash
//! cargo run -- "What are the latest developments in Rust?"
//! ```

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use critique_researcher::{Config, ResearchAgent};

/// Topic researched when none is given on the command line.
const DEFAULT_TOPIC: &str = "In quantum mechanics, how do electrons travel between orbitals through a zone of probability density 0?";

// =============================================================================
// CLI ARGUMENTS
// =============================================================================
#[derive(Parser, Debug)]
#[command(
    name = "critique-researcher",
    version,
    about = "Researches a topic with a search -> answer -> review loop",
    long_about = r#"
Critique Researcher - research that checks its own work.

The loop:
  1. Optimise the topic into a short search query
  2. Search DuckDuckGo (15 results, +5 on every further round)
  3. Compile an answer from all research gathered so far
  4. Ask a reviewer model whether the answer is sufficient;
     if not, go back to step 2

PREREQUISITES:
  1. Install Ollama: https://ollama.ai
  2. Pull a model: ollama pull llama3.2
  3. Start Ollama: ollama serve

EXAMPLES:
  critique-researcher "Why is the sky blue?"
  critique-researcher --max-rounds 3 --model qwen2.5 "Rust async runtimes"
"#
)]
struct Args {
    /// The research topic or question to investigate
    #[arg(value_name = "TOPIC", default_value = DEFAULT_TOPIC)]
    topic: String,

    /// The Ollama model for query optimisation and answers
    #[arg(short = 'm', long = "model", env = "OLLAMA_MODEL")]
    model: Option<String>,

    /// The Ollama model for the reviewer (defaults to --model)
    #[arg(long = "reviewer-model", env = "REVIEWER_MODEL")]
    reviewer_model: Option<String>,

    /// Stop after this many search rounds even if the reviewer wants more
    #[arg(long = "max-rounds", env = "MAX_RESEARCH_ROUNDS")]
    max_rounds: Option<u32>,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long = "verbose", default_value = "false")]
    verbose: bool,
}

// =============================================================================
// MAIN FUNCTION
// =============================================================================
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::from_env()?;
    init_logging(&config.log_level, args.verbose)?;

    if let Some(model) = args.model {
        info!(model = %model, "Using model from command line");
        config.reviewer_model = model.clone();
        config.model = model;
    }
    if let Some(reviewer) = args.reviewer_model {
        config.reviewer_model = reviewer;
    }
    if args.max_rounds.is_some() {
        config.max_rounds = args.max_rounds;
    }

    config.validate()?;

    info!(
        model = %config.model,
        reviewer = %config.reviewer_model,
        host = %config.ollama_host,
        "Configuration loaded"
    );

    let agent = ResearchAgent::new(config)?;
    info!(topic = %args.topic, "Building research loop");

    match agent.research(&args.topic).await {
        Ok(run) => {
            info!("Done.");
            println!("Answer: {}", run.answer());
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Research failed");
            eprintln!("\nResearch failed: {e:#}");

            let detail = format!("{e:#}");
            if detail.contains("connection refused") || detail.contains("Connection refused") {
                eprintln!("\nTip: Make sure Ollama is running:");
                eprintln!("   ollama serve");
            } else if detail.contains("model") {
                eprintln!("\nTip: Make sure the model is installed:");
                eprintln!("   ollama pull llama3.2");
            }

            Err(e)
        }
    }
}

// =============================================================================
// LOGGING INITIALIZATION
// =============================================================================
/// Logs go to stderr so stdout carries only the answers.
fn init_logging(log_level: &str, verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    Ok(())
}
