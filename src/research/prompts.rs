//! Fixed prompts for the four research stages.
//!
//! The wording is reproduced exactly so that any model fed through the port
//! sees the same instructions.

use serde_json::{json, Value};

pub const QUERY_OPTIMISER_SYSTEM: &str = r#"You are a search query optimiser. Your ONLY job is to output a single, short search engine query (e.g. 3–8 words, keyword-style) that would best find answers to the user's question.

Rules:
- Output NOTHING except the search query. No explanation, no "Search for:", no quotes, no preamble.
- Use keywords and short phrases, like someone would type into Google or DuckDuckGo.
- One query only. Example: for "tallest mountain on earth" you might output: tallest mountain world"#;

pub const COMPILER_SYSTEM: &str = "Your job is to compile research into an answer to a question.";

pub const REVIEWER_SYSTEM: &str = r#"You are a reviewer who's sole purpose is to determine whether an initial question has been answered in sufficient detail. Please only reply either sufficient or elaborate depending on whether the answer is sufficient.

Rules:
- If the question has been answered and is correct you will return 'Sufficient"
- If the question is unanswered or the answer is wrong you will return 'Elaborate"
            "#;

/// Name of the reviewer's structured output.
pub const REVIEW_SCHEMA_NAME: &str = "ResearchReview";

/// Field of the reviewer's structured output holding the verdict.
pub const REVIEW_FIELD: &str = "review_result";

pub fn query_optimiser_human(topic: &str) -> String {
    format!("Research topic: {topic}\n\nOutput only the search query:")
}

/// `research` is the full serialized list of research items.
///
/// The items arrive as a JSON array, so the prompt shows `["...", "..."]`
/// with double-quoted, escaped strings rather than a single-quoted
/// `['...', '...']` list.
pub fn compiler_human(topic: &str, research: &str) -> String {
    format!(
        "The original question was '{topic}'. \n        The research available is {research}.\n        Please generate an answer to the question based on the research."
    )
}

pub fn reviewer_human(topic: &str, answer: &str) -> String {
    format!(
        "My initial question was '{topic}' and the answer I have recieved is '{answer}'. Has my question be answered sufficiently?"
    )
}

/// JSON schema constraining the reviewer to the two verdicts.
pub fn review_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "review_result": {
                "type": "string",
                "enum": ["Sufficient", "Elaborate"],
                "description": "When provided with an answer to a question it must be deemed either sufficient or elaborate.Sufficient - The answer fully answers the question and no further detail is needed.Elabroate - The answer does not fully answer the question and needs further research."
            }
        },
        "required": ["review_result"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_optimiser_human() {
        assert_eq!(
            query_optimiser_human("T"),
            "Research topic: T\n\nOutput only the search query:"
        );
    }

    #[test]
    fn test_compiler_human_embeds_all_research() {
        let prompt = compiler_human("T", "[\"a\",\"b\"]");
        assert!(prompt.starts_with("The original question was 'T'."));
        assert!(prompt.contains("The research available is [\"a\",\"b\"]."));
    }

    #[test]
    fn test_review_schema_lists_both_verdicts() {
        let schema = review_schema();
        let values = schema["properties"][REVIEW_FIELD]["enum"].as_array().unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(schema["required"][0], REVIEW_FIELD);
    }
}
