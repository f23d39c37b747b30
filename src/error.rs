//! # Error Module
//!
//! Typed errors for every failure the research loop and the chat session can
//! surface. Library code returns these; the binaries wrap them in `anyhow`.

use thiserror::Error;

// =============================================================================
// SEARCH ERRORS
// =============================================================================
/// A single failed attempt against a search provider.
///
/// # Rust Concept: `#[from]`
///
/// `#[from]` generates a `From<reqwest::Error>` impl, so `?` converts
/// network errors into `SearchError::NetworkError` automatically.
#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Failed to perform web search: {0}")]
    SearchFailed(String),

    #[error("Rate limited by search provider, please wait")]
    RateLimited,

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

/// Every retry attempt raised; carries the error from the final attempt.
#[derive(Error, Debug)]
#[error("search failed after {attempts} attempt(s): {last}")]
pub struct SearchFailure {
    pub attempts: u32,
    #[source]
    pub last: SearchError,
}

// =============================================================================
// MODEL ERRORS
// =============================================================================
#[derive(Error, Debug)]
pub enum ModelError {
    /// The provider call itself failed (connection, HTTP, provider error).
    #[error("Model invocation failed: {0}")]
    Invocation(String),

    /// The model answered, but not in the requested structured shape.
    #[error("Malformed structured output: {0}")]
    MalformedOutput(String),
}

// =============================================================================
// RESEARCH LOOP ERRORS
// =============================================================================
/// Top-level error of a research run. Every variant aborts the run.
#[derive(Error, Debug)]
pub enum ResearchError {
    #[error(transparent)]
    Search(#[from] SearchFailure),

    #[error(transparent)]
    Model(#[from] ModelError),

    /// The reviewer returned something other than `Sufficient` or `Elaborate`.
    #[error("Reviewer returned an unknown judgement: {0:?}")]
    MalformedJudgement(String),

    /// A stage or transition needed a state field that was never written.
    #[error("Research state is missing `{0}`")]
    MalformedState(&'static str),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// =============================================================================
// CHAT ERRORS
// =============================================================================
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Unsupported file type: {0}")]
    UnsupportedDocument(String),

    #[error("Failed to read document {path}: {source}")]
    DocumentRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to extract text from {path}: {message}")]
    DocumentParse { path: String, message: String },

    #[error("No documents were provided")]
    NoDocuments,

    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
