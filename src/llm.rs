//! # LLM Module
//!
//! The Language Model Port: the only way the research loop and the chat
//! session talk to a model.
//!
//! Two capabilities are exposed:
//! - `generate` turns a role-tagged message sequence into free text
//! - `generate_structured` turns the same sequence into a JSON value shaped
//!   by an [`OutputSchema`]
//!
//! Stages receive the port as `&dyn LanguageModel`, so tests can script a
//! model and production code can plug in [`OllamaModel`].

use async_trait::async_trait;
use rig::client::{CompletionClient, ProviderClient};
use rig::completion::Prompt;
use rig::providers::ollama;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::ModelError;

// =============================================================================
// MESSAGES
// =============================================================================
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    Human,
    Assistant,
}

/// A single role-tagged message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: Role::Human,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

// =============================================================================
// STRUCTURED OUTPUT
// =============================================================================
/// JSON schema a structured call must satisfy.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSchema {
    pub name: String,
    pub schema: Value,
}

impl OutputSchema {
    pub fn new(name: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }

    /// System instruction appended to constrain a free-text model to JSON.
    pub fn instruction(&self) -> String {
        format!(
            "Respond ONLY with a single JSON object named {} that matches this JSON schema. \
             Do not add any other text.\n{}",
            self.name, self.schema
        )
    }
}

/// Pull the first JSON object out of a model reply.
///
/// Models tend to wrap JSON in code fences or a sentence of preamble. Parsing
/// starts at the first `{` and stops after one complete value, so trailing
/// text (braces included) is ignored.
pub fn extract_json(text: &str) -> Result<Value, ModelError> {
    let Some(start) = text.find('{') else {
        return Err(ModelError::MalformedOutput(format!(
            "no JSON object in reply: {text}"
        )));
    };

    let mut values = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
    match values.next() {
        Some(Ok(value)) => Ok(value),
        Some(Err(e)) => Err(ModelError::MalformedOutput(format!("{e}: {text}"))),
        None => Err(ModelError::MalformedOutput(format!(
            "no JSON object in reply: {text}"
        ))),
    }
}

// =============================================================================
// LANGUAGE MODEL PORT
// =============================================================================
/// Provider-agnostic text generation.
///
/// # Rust Concept: async-trait
///
/// Native `async fn` in traits is not object-safe yet; `#[async_trait]`
/// boxes the futures so the port can live behind `Arc<dyn LanguageModel>`.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate free text from a message sequence.
    async fn generate(&self, messages: &[Message]) -> Result<String, ModelError>;

    /// Generate a JSON value matching `schema`.
    ///
    /// The default asks `generate` for JSON and parses the reply. Providers
    /// with native structured output should override it.
    async fn generate_structured(
        &self,
        messages: &[Message],
        schema: &OutputSchema,
    ) -> Result<Value, ModelError> {
        let mut constrained = messages.to_vec();
        constrained.push(Message::system(schema.instruction()));
        let reply = self.generate(&constrained).await?;
        extract_json(&reply)
    }

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// Structured call deserialized straight into `T`.
pub async fn generate_typed<T: DeserializeOwned>(
    model: &dyn LanguageModel,
    messages: &[Message],
    schema: &OutputSchema,
) -> Result<T, ModelError> {
    let value = model.generate_structured(messages, schema).await?;
    serde_json::from_value(value.clone())
        .map_err(|e| ModelError::MalformedOutput(format!("{e}: {value}")))
}

// =============================================================================
// OLLAMA IMPLEMENTATION
// =============================================================================
/// `LanguageModel` backed by a local Ollama server through Rig.
pub struct OllamaModel {
    client: ollama::Client,
    model: String,
    temperature: f64,
}

impl OllamaModel {
    /// Connect to the Ollama server at `host`.
    ///
    /// Rig's Ollama client reads `OLLAMA_API_BASE_URL`, so the host is
    /// exported before the client is built.
    pub fn new(host: &str, model: impl Into<String>, temperature: f32) -> Self {
        std::env::set_var("OLLAMA_API_BASE_URL", host);
        let client = ollama::Client::from_env();

        Self {
            client,
            model: model.into(),
            temperature: f64::from(temperature),
        }
    }
}

/// System messages become the agent preamble; everything else the prompt.
fn split_messages(messages: &[Message]) -> (String, String) {
    let preamble = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let prompt = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    (preamble, prompt)
}

#[async_trait]
impl LanguageModel for OllamaModel {
    async fn generate(&self, messages: &[Message]) -> Result<String, ModelError> {
        let (preamble, prompt) = split_messages(messages);

        debug!(
            model = %self.model,
            preamble_chars = preamble.len(),
            prompt_chars = prompt.len(),
            "Invoking Ollama"
        );

        let agent = self
            .client
            .agent(&self.model)
            .preamble(&preamble)
            .temperature(self.temperature)
            .build();

        agent
            .prompt(&prompt)
            .await
            .map_err(|e| ModelError::Invocation(e.to_string()))
    }

    fn name(&self) -> &str {
        "ollama"
    }
}
