//! # Agent Module
//!
//! Builds a ready-to-run research [`Controller`] from a [`Config`]:
//! two Ollama-backed models (writer and reviewer) and a retrying DuckDuckGo
//! search tool.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::Config;
use crate::llm::{LanguageModel, OllamaModel};
use crate::research::{Controller, ResearchRun, SearchBudget};
use crate::tools::{DuckDuckGoSearch, SearchProvider, SearchTool};

// =============================================================================
// RESEARCH AGENT STRUCT
// =============================================================================
/// The research agent: configuration plus the controller it drives.
///
/// # Rust Concept: Dependency Injection
///
/// The models and the search provider are created once here and handed to
/// the controller as trait objects. Nothing is global, so tests can build a
/// `Controller` directly with stubs instead.
pub struct ResearchAgent {
    config: Config,
    controller: Controller,
}

impl ResearchAgent {
    /// Wire up the production ports.
    pub fn new(config: Config) -> Result<Self> {
        let writer: Arc<dyn LanguageModel> = Arc::new(OllamaModel::new(
            &config.ollama_host,
            config.model.clone(),
            config.temperature,
        ));
        let reviewer: Arc<dyn LanguageModel> = Arc::new(OllamaModel::new(
            &config.ollama_host,
            config.reviewer_model.clone(),
            config.temperature,
        ));
        let provider: Arc<dyn SearchProvider> =
            Arc::new(DuckDuckGoSearch::new().context("Failed to build search client")?);

        debug!(
            host = %config.ollama_host,
            writer = %config.model,
            reviewer = %config.reviewer_model,
            "Ports configured"
        );

        Ok(Self::with_ports(config, writer, reviewer, provider))
    }

    /// Wire up arbitrary ports with the configured loop settings.
    pub fn with_ports(
        config: Config,
        writer: Arc<dyn LanguageModel>,
        reviewer: Arc<dyn LanguageModel>,
        provider: Arc<dyn SearchProvider>,
    ) -> Self {
        let search = SearchTool::new(provider, config.retry_policy());
        debug!(
            attempts = search.policy().max_attempts(),
            backoff_ms = search.policy().delay_before(2).as_millis() as u64,
            "Search tool configured"
        );

        let controller = Controller::new(writer, reviewer, search)
            .with_budget(SearchBudget::new(
                config.base_search_results,
                config.search_results_step,
            ))
            .with_max_rounds(config.max_rounds);

        Self { config, controller }
    }

    /// Don't echo intermediate answers.
    pub fn quiet(mut self) -> Self {
        self.controller = self.controller.quiet();
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Research a topic until the reviewer is satisfied.
    pub async fn research(&self, topic: &str) -> Result<ResearchRun> {
        info!(topic = %topic, model = %self.config.model, "Starting research task");

        let run = self
            .controller
            .run(topic)
            .await
            .context("Research run failed")?;

        info!(rounds = run.state.research_calls, "Research completed");
        Ok(run)
    }
}
