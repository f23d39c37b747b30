//! The research-critique loop as an explicit finite-state machine.
//!
//! ```text
//! Start -> OptimiseQuery -> Search -> CompileAnswer -> Review --Sufficient--> Terminate
//!                             ^                          |
//!                             +-------- Elaborate -------+
//! ```
//!
//! The optimiser runs once; loop-backs re-enter at `Search` with a larger
//! result budget. Nothing bounds the loop unless a round cap is configured.

use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::ResearchError;
use crate::llm::LanguageModel;
use crate::tools::SearchTool;

use super::stages::{self, SearchBudget};
use super::state::{ResearchState, ReviewVerdict, StatePatch};

/// A position in the research loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Start,
    OptimiseQuery,
    Search,
    CompileAnswer,
    Review,
    Terminate,
}

impl Step {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminate)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::OptimiseQuery => "optimise_query",
            Self::Search => "search",
            Self::CompileAnswer => "compile_answer",
            Self::Review => "review",
            Self::Terminate => "terminate",
        };
        f.write_str(name)
    }
}

/// The transition function.
///
/// Only `Review` consults the verdict, and it must be present: leaving the
/// reviewer without a verdict is a malformed state, not a silent stop.
pub fn transition(step: Step, review: Option<ReviewVerdict>) -> Result<Step, ResearchError> {
    let next = match step {
        Step::Start => Step::OptimiseQuery,
        Step::OptimiseQuery => Step::Search,
        Step::Search => Step::CompileAnswer,
        Step::CompileAnswer => Step::Review,
        Step::Review => match review.ok_or(ResearchError::MalformedState("review"))? {
            ReviewVerdict::Elaborate => Step::Search,
            ReviewVerdict::Sufficient => Step::Terminate,
        },
        Step::Terminate => Step::Terminate,
    };
    Ok(next)
}

/// Outcome of a finished run.
#[derive(Debug, Clone)]
pub struct ResearchRun {
    /// Final research state
    pub state: ResearchState,

    /// Every stage executed, in order (excludes `Start` and `Terminate`)
    pub trace: Vec<Step>,

    /// True when the round cap, not the reviewer, ended the run
    pub stopped_by_round_cap: bool,
}

impl ResearchRun {
    pub fn answer(&self) -> &str {
        self.state.final_answer()
    }

    /// How many times `step` ran.
    pub fn visits(&self, step: Step) -> usize {
        self.trace.iter().filter(|s| **s == step).count()
    }
}

/// Drives the stages against injected model and search ports.
pub struct Controller {
    writer: Arc<dyn LanguageModel>,
    reviewer: Arc<dyn LanguageModel>,
    search: SearchTool,
    budget: SearchBudget,
    max_rounds: Option<u32>,
    echo_answers: bool,
}

impl Controller {
    /// `writer` optimises queries and compiles answers; `reviewer` judges them.
    pub fn new(
        writer: Arc<dyn LanguageModel>,
        reviewer: Arc<dyn LanguageModel>,
        search: SearchTool,
    ) -> Self {
        Self {
            writer,
            reviewer,
            search,
            budget: SearchBudget::default(),
            max_rounds: None,
            echo_answers: true,
        }
    }

    pub fn with_budget(mut self, budget: SearchBudget) -> Self {
        self.budget = budget;
        self
    }

    /// Stop after `rounds` search rounds even if the reviewer wants more.
    pub fn with_max_rounds(mut self, rounds: Option<u32>) -> Self {
        self.max_rounds = rounds;
        self
    }

    /// Don't print intermediate answers to stdout.
    pub fn quiet(mut self) -> Self {
        self.echo_answers = false;
        self
    }

    pub async fn run(&self, topic: impl Into<String>) -> Result<ResearchRun, ResearchError> {
        let mut state = ResearchState::new(topic);
        let mut trace = Vec::new();
        let mut stopped_by_round_cap = false;
        let mut step = transition(Step::Start, None)?;

        info!(topic = %state.topic(), "Starting research");

        while !step.is_terminal() {
            let patch = self.execute(step, &state).await?;
            state.apply(patch);
            trace.push(step);

            if step == Step::CompileAnswer && self.echo_answers {
                print_answer(state.final_answer());
            }

            let mut next = transition(step, state.review)?;

            if step == Step::Review && next == Step::Search {
                match self.max_rounds {
                    Some(cap) if state.research_calls >= cap => {
                        warn!(rounds = state.research_calls, cap, "Round cap reached, stopping with latest answer");
                        stopped_by_round_cap = true;
                        next = Step::Terminate;
                    }
                    _ => info!(round = state.research_calls + 1, "Reviewer asked to elaborate, searching again"),
                }
            } else if next == Step::Terminate {
                info!(rounds = state.research_calls, "Reviewer judged the answer sufficient");
            }

            step = next;
        }

        Ok(ResearchRun {
            state,
            trace,
            stopped_by_round_cap,
        })
    }

    async fn execute(&self, step: Step, state: &ResearchState) -> Result<StatePatch, ResearchError> {
        match step {
            Step::OptimiseQuery => stages::optimise_query(self.writer.as_ref(), state).await,
            Step::Search => stages::retrieve_results(&self.search, self.budget, state).await,
            Step::CompileAnswer => stages::compile_answer(self.writer.as_ref(), state).await,
            Step::Review => stages::review_answer(self.reviewer.as_ref(), state).await,
            Step::Start | Step::Terminate => Ok(StatePatch::new()),
        }
    }
}

fn print_answer(answer: &str) {
    let rule = "─".repeat(60);
    println!("\n{rule}\nAnswer:\n{rule}\n{answer}\n{rule}\n");
}
