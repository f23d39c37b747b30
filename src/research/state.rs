//! Research state threaded through the loop, and the patches stages return.
//!
//! Merge policy per field:
//!
//! | Field | Policy |
//! |---|---|
//! | `optimised_search_query` | overwrite |
//! | `research_items` | append |
//! | `answer` | overwrite |
//! | `review` | overwrite |
//! | `research_calls` | overwrite |
//!
//! `topic` is fixed at construction and no patch can touch it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ResearchError;

/// Placeholder printed when a run ends without a compiled answer.
pub const MISSING_ANSWER: &str = "N/A";

/// The reviewer's binary judgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReviewVerdict {
    /// The answer fully answers the question; stop.
    Sufficient,
    /// The answer is missing or wrong; search again.
    Elaborate,
}

impl ReviewVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sufficient => "Sufficient",
            Self::Elaborate => "Elaborate",
        }
    }
}

impl fmt::Display for ReviewVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewVerdict {
    type Err = ResearchError;

    /// Exact match only. Anything else is a malformed judgement, never a
    /// silent "sufficient".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Sufficient" => Ok(Self::Sufficient),
            "Elaborate" => Ok(Self::Elaborate),
            other => Err(ResearchError::MalformedJudgement(other.to_string())),
        }
    }
}

/// The accumulating record of one research run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchState {
    topic: String,

    /// Latest optimised query; empty until the optimiser has run
    pub optimised_search_query: String,

    /// One combined text block per completed search round, oldest first
    pub research_items: Vec<String>,

    /// Latest compiled answer
    pub answer: Option<String>,

    /// Latest reviewer verdict
    pub review: Option<ReviewVerdict>,

    /// Completed search rounds
    pub research_calls: u32,
}

impl ResearchState {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Self::default()
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The query the next search should use: the optimised query, or the
    /// topic when no usable query has been produced.
    pub fn search_query(&self) -> &str {
        if self.optimised_search_query.is_empty() {
            &self.topic
        } else {
            &self.optimised_search_query
        }
    }

    /// The final answer, or [`MISSING_ANSWER`].
    pub fn final_answer(&self) -> &str {
        self.answer.as_deref().unwrap_or(MISSING_ANSWER)
    }

    /// Merge a stage's patch into this state.
    pub fn apply(&mut self, patch: StatePatch) {
        if let Some(query) = patch.optimised_search_query {
            self.optimised_search_query = query;
        }
        self.research_items.extend(patch.research_items);
        if let Some(answer) = patch.answer {
            self.answer = Some(answer);
        }
        if let Some(review) = patch.review {
            self.review = Some(review);
        }
        if let Some(calls) = patch.research_calls {
            self.research_calls = calls;
        }
    }
}

/// A partial update produced by one stage. Unset fields leave the state as is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatePatch {
    pub optimised_search_query: Option<String>,
    pub research_items: Vec<String>,
    pub answer: Option<String>,
    pub review: Option<ReviewVerdict>,
    pub research_calls: Option<u32>,
}

impl StatePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.optimised_search_query = Some(query.into());
        self
    }

    pub fn with_research_item(mut self, item: impl Into<String>) -> Self {
        self.research_items.push(item.into());
        self
    }

    pub fn with_answer(mut self, answer: impl Into<String>) -> Self {
        self.answer = Some(answer.into());
        self
    }

    pub fn with_review(mut self, review: ReviewVerdict) -> Self {
        self.review = Some(review);
        self
    }

    pub fn with_research_calls(mut self, calls: u32) -> Self {
        self.research_calls = Some(calls);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
