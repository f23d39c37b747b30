//! # Configuration Module
//!
//! Loads the research loop's settings from environment variables (and an
//! optional `.env` file). Defaults reproduce the reference behaviour: three
//! search attempts, a 1.5 second backoff unit, 15 results on the first round
//! and 5 more on every loop-back.

use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::tools::RetryPolicy;

// =============================================================================
// CONFIGURATION STRUCT
// =============================================================================
/// Main configuration for the researcher and the chat binary.
///
/// # Rust Concept: Derive Macros
/// - Debug: Allows printing with {:?} format
/// - Clone: Creates a deep copy of the struct
#[derive(Debug, Clone)]
pub struct Config {
    /// The Ollama model used for query optimisation and answer compilation
    pub model: String,

    /// The Ollama model used by the reviewer (defaults to `model`)
    pub reviewer_model: String,

    /// Ollama server URL (default: http://localhost:11434)
    pub ollama_host: String,

    /// Temperature for LLM responses (0.0 = deterministic, 1.0 = creative)
    pub temperature: f32,

    /// How many times a search is attempted before giving up
    pub search_attempts: u32,

    /// Backoff unit; the delay before attempt `k + 1` is `unit * k`
    pub search_backoff: Duration,

    /// Result budget of the first search round
    pub base_search_results: usize,

    /// Extra results requested on every further round
    pub search_results_step: usize,

    /// Optional cap on search rounds. `None` lets the reviewer loop forever.
    pub max_rounds: Option<u32>,

    /// Log level for the application
    pub log_level: String,
}

// =============================================================================
// DEFAULT IMPLEMENTATION
// =============================================================================
impl Default for Config {
    fn default() -> Self {
        Self {
            model: "llama3.2".to_string(),
            reviewer_model: "llama3.2".to_string(),
            ollama_host: "http://localhost:11434".to_string(),
            temperature: 0.7,
            search_attempts: 3,
            search_backoff: Duration::from_millis(1500),
            base_search_results: 15,
            search_results_step: 5,
            max_rounds: None,
            log_level: "info".to_string(),
        }
    }
}

// =============================================================================
// CONFIGURATION LOADING
// =============================================================================
impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Example
    /// ```no_run
    /// let config = critique_researcher::Config::from_env()?;
    /// println!("Using model: {}", config.model);
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (silently ignore if not found)
        let _ = dotenvy::dotenv();

        let mut config = Config::default();

        if let Ok(val) = env::var("OLLAMA_MODEL") {
            config.model = val.clone();
            config.reviewer_model = val;
        }

        if let Ok(val) = env::var("REVIEWER_MODEL") {
            config.reviewer_model = val;
        }

        if let Ok(val) = env::var("OLLAMA_API_BASE_URL") {
            config.ollama_host = val;
        }

        if let Some(val) = parse_var::<f32>("TEMPERATURE", "a valid floating-point number (e.g., 0.7)")? {
            config.temperature = val;
        }

        if let Some(val) = parse_var::<u32>("SEARCH_ATTEMPTS", "a positive integer")? {
            config.search_attempts = val;
        }

        if let Some(val) = parse_var::<u64>("SEARCH_BACKOFF_MS", "a number of milliseconds")? {
            config.search_backoff = Duration::from_millis(val);
        }

        if let Some(val) = parse_var::<usize>("BASE_SEARCH_RESULTS", "a positive integer")? {
            config.base_search_results = val;
        }

        if let Some(val) = parse_var::<usize>("SEARCH_RESULTS_STEP", "a non-negative integer")? {
            config.search_results_step = val;
        }

        if let Some(val) = parse_var::<u32>("MAX_RESEARCH_ROUNDS", "a positive integer")? {
            config.max_rounds = Some(val);
        }

        if let Ok(val) = env::var("RUST_LOG") {
            config.log_level = val;
        }

        Ok(config)
    }

    /// Validate the configuration before any model or search call is made.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.temperature) {
            anyhow::bail!(
                "Temperature must be between 0.0 and 2.0, got: {}",
                self.temperature
            );
        }

        if self.search_attempts == 0 {
            anyhow::bail!("SEARCH_ATTEMPTS must be at least 1");
        }

        if self.base_search_results == 0 {
            anyhow::bail!("BASE_SEARCH_RESULTS must be at least 1");
        }

        if self.max_rounds == Some(0) {
            anyhow::bail!("MAX_RESEARCH_ROUNDS must be at least 1 when set");
        }

        if self.model.is_empty() || self.reviewer_model.is_empty() {
            anyhow::bail!("OLLAMA_MODEL cannot be empty");
        }

        Ok(())
    }

    /// Retry settings for the search tool adapter.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.search_attempts, self.search_backoff)
    }
}

/// Parse an optional environment variable, failing with a readable message.
fn parse_var<T>(name: &str, expected: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{name} must be {expected}, got {raw:?}")),
        Err(_) => Ok(None),
    }
}
