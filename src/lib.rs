//! # Critique Researcher
//!
//! An iterative research-critique loop built on local LLMs:
//!
//! 1. turn the topic into a short search query
//! 2. search the web (retrying with linear backoff)
//! 3. compile an answer from every round of research so far
//! 4. let a reviewer model judge it `Sufficient` or `Elaborate`
//!
//! `Elaborate` loops back to step 2 with five more search results per round.
//!
//! The crate also ships a small retrieval-augmented chat over local
//! documents ([`chat`]).
//!
//! ## Quick Start
//! ```bash
//! cargo run -- "How do electrons move between orbitals?"
//! cargo run --bin rag-chat -- --question "What is this about?" --files notes.md
//! ```

/// Configuration management
pub mod config;

/// Error taxonomy
pub mod error;

/// Language model port and the Ollama implementation
pub mod llm;

/// Web search provider and retrying search tool
pub mod tools;

/// The research-critique state machine
pub mod research;

/// Production wiring of the research loop
pub mod agent;

/// Retrieval-augmented chat session
pub mod chat;

pub use agent::ResearchAgent;
pub use config::Config;
pub use error::{ChatError, ModelError, ResearchError, SearchError, SearchFailure};
pub use llm::{LanguageModel, Message, OllamaModel, OutputSchema, Role};
pub use research::{Controller, ResearchRun, ResearchState, ReviewVerdict, StatePatch, Step};
pub use tools::{DuckDuckGoSearch, RetryPolicy, SearchProvider, SearchResult, SearchTool};
