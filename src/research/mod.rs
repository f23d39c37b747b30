//! Research-critique loop: optimise a query, search, compile an answer, let
//! a reviewer decide whether to search again.

pub mod controller;
pub mod prompts;
pub mod stages;
pub mod state;

pub use controller::{transition, Controller, ResearchRun, Step};
pub use stages::{render_results, SearchBudget};
pub use state::{ResearchState, ReviewVerdict, StatePatch, MISSING_ANSWER};
