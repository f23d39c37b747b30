//! The four research stages.
//!
//! Each stage reads the current [`ResearchState`] and returns a
//! [`StatePatch`]; the controller merges it. Stages never mutate the state
//! themselves and hold no state of their own.

use tracing::{debug, info, warn};

use crate::error::{ModelError, ResearchError};
use crate::llm::{LanguageModel, Message, OutputSchema};
use crate::tools::{SearchResult, SearchTool};

use super::prompts;
use super::state::{ResearchState, ReviewVerdict, StatePatch};

/// How many results to ask for on each round.
///
/// Round `n` (0-based, i.e. `research_calls == n`) requests `base + n * step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchBudget {
    pub base: usize,
    pub step: usize,
}

impl Default for SearchBudget {
    fn default() -> Self {
        Self { base: 15, step: 5 }
    }
}

impl SearchBudget {
    pub fn new(base: usize, step: usize) -> Self {
        Self { base, step }
    }

    pub fn for_round(&self, research_calls: u32) -> usize {
        self.base + research_calls as usize * self.step
    }
}

/// Join search hits into the single text block stored per round.
///
/// Hits are numbered from 1 and separated by a blank line. An empty page
/// becomes a placeholder naming the query, so the compiler still sees that
/// the round happened.
pub fn render_results(query: &str, results: &[SearchResult]) -> String {
    if results.is_empty() {
        return format!("(No search results returned for: {query})");
    }

    results
        .iter()
        .enumerate()
        .map(|(i, r)| format!("[{}] {}\n{}", i + 1, r.title, r.body))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Shorten long values for log lines without splitting a character.
fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

// =============================================================================
// STAGE 1: OPTIMISE SEARCH QUERY
// =============================================================================
pub async fn optimise_query(
    model: &dyn LanguageModel,
    state: &ResearchState,
) -> Result<StatePatch, ResearchError> {
    info!(topic = %state.topic(), "Optimising search query");

    let messages = [
        Message::system(prompts::QUERY_OPTIMISER_SYSTEM),
        Message::human(prompts::query_optimiser_human(state.topic())),
    ];
    let query = model.generate(&messages).await?;

    info!(query = %preview(&query, 80), "Search query optimised");
    Ok(StatePatch::new().with_query(query))
}

// =============================================================================
// STAGE 2: RETRIEVE SEARCH RESULTS
// =============================================================================
pub async fn retrieve_results(
    search: &SearchTool,
    budget: SearchBudget,
    state: &ResearchState,
) -> Result<StatePatch, ResearchError> {
    let query = state.search_query();
    let max_items = budget.for_round(state.research_calls);

    info!(query = %preview(query, 60), max_items, round = state.research_calls + 1, "Running search");

    let results = search.search(query, max_items).await?;
    let content = render_results(query, &results);

    if results.is_empty() {
        warn!("Search returned 0 results");
    } else {
        info!(count = results.len(), chars = content.len(), "Search results collected");
    }

    Ok(StatePatch::new()
        .with_research_item(content)
        .with_research_calls(state.research_calls + 1))
}

// =============================================================================
// STAGE 3: COMPILE ANSWER
// =============================================================================
/// Every accumulated round is re-sent, not just the latest one.
pub async fn compile_answer(
    model: &dyn LanguageModel,
    state: &ResearchState,
) -> Result<StatePatch, ResearchError> {
    if state.research_items.is_empty() {
        return Err(ResearchError::MalformedState("research_items"));
    }

    info!(topic = %state.topic(), rounds = state.research_items.len(), "Compiling answer");

    let research = serde_json::to_string(&state.research_items)?;
    debug!(research_chars = research.len(), "Serialized research items");

    let messages = [
        Message::system(prompts::COMPILER_SYSTEM),
        Message::human(prompts::compiler_human(state.topic(), &research)),
    ];
    let answer = model.generate(&messages).await?;

    info!(chars = answer.len(), "Answer ready");
    Ok(StatePatch::new().with_answer(answer))
}

// =============================================================================
// STAGE 4: REVIEW ANSWER
// =============================================================================
pub async fn review_answer(
    model: &dyn LanguageModel,
    state: &ResearchState,
) -> Result<StatePatch, ResearchError> {
    let answer = state
        .answer
        .as_deref()
        .ok_or(ResearchError::MalformedState("answer"))?;

    info!("Reviewing answer");

    let messages = [
        Message::system(prompts::REVIEWER_SYSTEM),
        Message::human(prompts::reviewer_human(state.topic(), answer)),
    ];
    let schema = OutputSchema::new(prompts::REVIEW_SCHEMA_NAME, prompts::review_schema());
    let value = model.generate_structured(&messages, &schema).await?;

    let raw = value
        .get(prompts::REVIEW_FIELD)
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            ModelError::MalformedOutput(format!("missing `{}` in {value}", prompts::REVIEW_FIELD))
        })?;
    let verdict: ReviewVerdict = raw.parse()?;

    info!(verdict = %verdict, "Review complete");
    Ok(StatePatch::new().with_review(verdict))
}
