//! # Chat Module
//!
//! A retrieval-augmented chat over local documents.
//!
//! Every turn retrieves context for the running conversation, asks the model
//! for a structured [`ChatReply`], prints the answer and lets the model decide
//! (from what the user said) whether the chat is over. Files are read whole
//! and handed to a [`Retriever`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::ChatError;
use crate::llm::{generate_typed, LanguageModel, Message, OutputSchema, Role};

/// Extensions `load_documents` accepts.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "txt", "md"];

// =============================================================================
// DOCUMENTS
// =============================================================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub path: String,
    pub content: String,
}

/// Load a comma-separated list of document paths.
///
/// Entries are trimmed and blank entries ignored. PDFs go through
/// `pdf-extract`; `.txt` and `.md` are read as UTF-8. The first unsupported
/// extension aborts the load.
pub fn load_documents(files: &str) -> Result<Vec<Document>, ChatError> {
    let mut documents = Vec::new();

    for path in files.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let extension = Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .filter(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
            .ok_or_else(|| ChatError::UnsupportedDocument(path.to_string()))?;

        let content = if extension == "pdf" {
            read_pdf(path)?
        } else {
            std::fs::read_to_string(path).map_err(|source| ChatError::DocumentRead {
                path: path.to_string(),
                source,
            })?
        };
        debug!(path = %path, chars = content.len(), "Loaded document");

        documents.push(Document {
            path: path.to_string(),
            content,
        });
    }

    if documents.is_empty() {
        return Err(ChatError::NoDocuments);
    }
    Ok(documents)
}

/// Text of every page, in page order.
fn read_pdf(path: &str) -> Result<String, ChatError> {
    let bytes = std::fs::read(path).map_err(|source| ChatError::DocumentRead {
        path: path.to_string(),
        source,
    })?;

    pdf_extract::extract_text_from_mem(&bytes).map_err(|e| ChatError::DocumentParse {
        path: path.to_string(),
        message: e.to_string(),
    })
}

// =============================================================================
// RETRIEVAL
// =============================================================================
/// Supplies context passages for a query.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str) -> Result<Vec<String>, ChatError>;
}

/// Returns every loaded document, regardless of the query.
#[derive(Debug, Clone, Default)]
pub struct StaticRetriever {
    passages: Vec<String>,
}

impl StaticRetriever {
    pub fn new(documents: Vec<Document>) -> Self {
        Self {
            passages: documents.into_iter().map(|d| d.content).collect(),
        }
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    async fn retrieve(&self, _query: &str) -> Result<Vec<String>, ChatError> {
        Ok(self.passages.clone())
    }
}

// =============================================================================
// STRUCTURED REPLY
// =============================================================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinishChat {
    Yes,
    No,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub answer: String,
    pub finish_chat: FinishChat,
}

pub fn chat_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "question": {
                "type": "string",
                "description": "The question asked by the user."
            },
            "answer": {
                "type": "string",
                "description": "The answer to the question."
            },
            "finish_chat": {
                "type": "string",
                "enum": ["Yes", "No"],
                "description": "Whether to finish the chat. ONLY EVER RETURN YES IF THE USER ASKS TO FINISH THE CHAT."
            }
        },
        "required": ["answer", "finish_chat"]
    })
}

/// The retrieval prompt around context and question.
pub fn context_prompt(context: &str, question: &str) -> String {
    format!(
        "\nAnswer the question based only on the following context:\n\n{context}\n\nQuestion: {question}\n\nAnswer:\n"
    )
}

/// Render the conversation so far for the prompt.
pub fn render_history(history: &[Message]) -> String {
    history
        .iter()
        .map(|m| {
            let speaker = match m.role {
                Role::Human => "Human",
                Role::Assistant => "AI",
                Role::System => "System",
            };
            format!("{speaker}: {}", m.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// =============================================================================
// INPUT
// =============================================================================
/// Written before each follow-up question is read.
pub const QUESTION_PROMPT: &str = "Enter a question: ";

/// Where follow-up questions come from.
pub trait InputSource {
    /// `None` once the input is exhausted.
    fn next_question(&mut self) -> Result<Option<String>, ChatError>;
}

/// Reads one question per line from any buffered reader (stdin in the
/// binary).
pub struct LineInput<R> {
    reader: R,
}

impl<R: BufRead> LineInput<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: BufRead> InputSource for LineInput<R> {
    fn next_question(&mut self) -> Result<Option<String>, ChatError> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }
}

// =============================================================================
// SESSION
// =============================================================================
/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The model saw the user ask to finish.
    FinishRequested,
    /// No more questions could be read.
    InputClosed,
}

pub struct ChatSession {
    model: Arc<dyn LanguageModel>,
    retriever: Arc<dyn Retriever>,
    history: Vec<Message>,
}

impl ChatSession {
    pub fn new(model: Arc<dyn LanguageModel>, retriever: Arc<dyn Retriever>) -> Self {
        Self {
            model,
            retriever,
            history: Vec::new(),
        }
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Answer one question against the current history.
    pub async fn turn(&self, question: &str) -> Result<ChatReply, ChatError> {
        let query = format!(
            "Chat history: {}\nQuestion: {question}\nAnswer:",
            render_history(&self.history)
        );
        let context = self.retriever.retrieve(&query).await?.join("\n\n");

        debug!(context_chars = context.len(), "Retrieved context");

        let messages = [Message::human(context_prompt(&context, &query))];
        let schema = OutputSchema::new("ChatBot", chat_schema());
        let reply: ChatReply = generate_typed(self.model.as_ref(), &messages, &schema).await?;

        Ok(reply)
    }

    /// Run the interactive loop until the model ends it or input runs out.
    pub async fn run<W: Write>(
        &mut self,
        first_question: &str,
        input: &mut dyn InputSource,
        out: &mut W,
    ) -> Result<SessionEnd, ChatError> {
        let mut question = first_question.to_string();
        self.history.push(Message::human(question.clone()));

        loop {
            let reply = self.turn(&question).await?;
            writeln!(out, "{}", reply.answer)?;
            self.history.push(Message::assistant(reply.answer));

            if reply.finish_chat == FinishChat::Yes {
                info!(turns = self.history.len() / 2, "Chat finished by request");
                return Ok(SessionEnd::FinishRequested);
            }

            write!(out, "{QUESTION_PROMPT}")?;
            out.flush()?;

            match input.next_question()? {
                Some(next) => {
                    self.history.push(Message::human(next.clone()));
                    question = next;
                }
                None => {
                    writeln!(out)?;
                    info!("Input closed, ending chat");
                    return Ok(SessionEnd::InputClosed);
                }
            }
        }
    }
}

// =============================================================================
// UNIT TESTS
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use std::collections::VecDeque;
    use std::io::Cursor;
    use std::sync::Mutex;

    /// Replies from a queue of structured values, records every prompt.
    struct QueueModel {
        replies: Mutex<VecDeque<Value>>,
        prompts: Mutex<Vec<String>>,
    }

    impl QueueModel {
        fn new(replies: Vec<Value>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LanguageModel for QueueModel {
        async fn generate(&self, _messages: &[Message]) -> Result<String, ModelError> {
            Err(ModelError::Invocation("free text not scripted".into()))
        }

        async fn generate_structured(
            &self,
            messages: &[Message],
            _schema: &OutputSchema,
        ) -> Result<Value, ModelError> {
            self.prompts.lock().unwrap().push(messages[0].content.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ModelError::Invocation("no reply left".into()))
        }

        fn name(&self) -> &str {
            "queue"
        }
    }

    struct Questions(VecDeque<String>);

    impl InputSource for Questions {
        fn next_question(&mut self) -> Result<Option<String>, ChatError> {
            Ok(self.0.pop_front())
        }
    }

    fn retriever() -> Arc<StaticRetriever> {
        Arc::new(StaticRetriever::new(vec![Document {
            path: "notes.txt".into(),
            content: "Rust was first released in 2015.".into(),
        }]))
    }

    #[test]
    fn test_load_documents_reads_supported_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.MD");
        std::fs::write(&a, "alpha").unwrap();
        std::fs::write(&b, "beta").unwrap();

        let files = format!("{}, {}", a.display(), b.display());
        let docs = load_documents(&files).unwrap();

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].content, "alpha");
        assert_eq!(docs[1].content, "beta");
    }

    /// Single-page PDF showing `text` in Helvetica, with a correct xref table.
    fn minimal_pdf(text: &str) -> Vec<u8> {
        let stream = format!("BT /F1 24 Tf 72 720 Td ({text}) Tj ET");
        let objects = [
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 5 0 R >> >> /Contents 4 0 R >>"
                .to_string(),
            format!("<< /Length {} >>\nstream\n{stream}\nendstream", stream.len()),
            "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
        ];

        let mut pdf = String::from("%PDF-1.4\n");
        let mut offsets = Vec::new();
        for (i, body) in objects.iter().enumerate() {
            offsets.push(pdf.len());
            pdf.push_str(&format!("{} 0 obj\n{body}\nendobj\n", i + 1));
        }

        let xref = pdf.len();
        pdf.push_str(&format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1));
        for offset in offsets {
            pdf.push_str(&format!("{offset:010} 00000 n \n"));
        }
        pdf.push_str(&format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref}\n%%EOF\n",
            objects.len() + 1
        ));
        pdf.into_bytes()
    }

    #[test]
    fn test_load_documents_extracts_pdf_text() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("paper.pdf");
        let notes = dir.path().join("notes.txt");
        std::fs::write(&pdf, minimal_pdf("Orbitals")).unwrap();
        std::fs::write(&notes, "plain").unwrap();

        let files = format!("{},{}", pdf.display(), notes.display());
        let docs = load_documents(&files).unwrap();

        assert_eq!(docs.len(), 2);
        assert!(docs[0].content.contains("Orbitals"), "got {:?}", docs[0].content);
        assert_eq!(docs[1].content, "plain");
    }

    #[test]
    fn test_load_documents_reports_unreadable_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.PDF");
        std::fs::write(&path, "this is not a pdf").unwrap();

        let err = load_documents(&path.display().to_string()).unwrap_err();

        assert!(matches!(err, ChatError::DocumentParse { .. }));
    }

    #[test]
    fn test_load_documents_rejects_unsupported_type() {
        let err = load_documents("report.docx").unwrap_err();
        assert!(matches!(err, ChatError::UnsupportedDocument(p) if p == "report.docx"));
    }

    #[test]
    fn test_load_documents_missing_file() {
        let err = load_documents("/definitely/not/here.txt").unwrap_err();
        assert!(matches!(err, ChatError::DocumentRead { .. }));
    }

    #[test]
    fn test_load_documents_empty_list() {
        assert!(matches!(load_documents(" , "), Err(ChatError::NoDocuments)));
    }

    #[test]
    fn test_context_prompt_layout() {
        assert_eq!(
            context_prompt("CTX", "Q"),
            "\nAnswer the question based only on the following context:\n\nCTX\n\nQuestion: Q\n\nAnswer:\n"
        );
    }

    #[test]
    fn test_render_history() {
        let history = vec![Message::human("hi"), Message::assistant("hello")];
        assert_eq!(render_history(&history), "Human: hi\nAI: hello");
    }

    #[test]
    fn test_line_input_reads_until_eof() {
        let mut input = LineInput::new(Cursor::new("first\r\nsecond\n"));
        assert_eq!(input.next_question().unwrap().as_deref(), Some("first"));
        assert_eq!(input.next_question().unwrap().as_deref(), Some("second"));
        assert_eq!(input.next_question().unwrap(), None);
    }

    #[tokio::test]
    async fn test_session_ends_when_model_says_finish() {
        let model = QueueModel::new(vec![
            json!({"answer": "In 2015.", "finish_chat": "No"}),
            json!({"answer": "Goodbye!", "finish_chat": "Yes"}),
        ]);
        let mut session = ChatSession::new(model.clone(), retriever());
        let mut input = Questions(VecDeque::from(vec!["thanks, bye".to_string()]));
        let mut out = Vec::new();

        let end = session
            .run("When was Rust released?", &mut input, &mut out)
            .await
            .unwrap();

        assert_eq!(end, SessionEnd::FinishRequested);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "In 2015.\nEnter a question: Goodbye!\n"
        );
        assert_eq!(session.history().len(), 4);

        let prompts = model.prompts.lock().unwrap();
        assert!(prompts[0].contains("Rust was first released in 2015."));
        assert!(prompts[1].contains("AI: In 2015."));
        assert!(prompts[1].contains("Question: thanks, bye"));
    }

    #[tokio::test]
    async fn test_session_ends_when_input_closes() {
        let model = QueueModel::new(vec![json!({"answer": "In 2015.", "finish_chat": "No"})]);
        let mut session = ChatSession::new(model, retriever());
        let mut input = Questions(VecDeque::new());
        let mut out = Vec::new();

        let end = session.run("When?", &mut input, &mut out).await.unwrap();

        assert_eq!(end, SessionEnd::InputClosed);
        assert_eq!(session.history().len(), 2);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "In 2015.\nEnter a question: \n"
        );
    }

    #[tokio::test]
    async fn test_malformed_reply_is_an_error() {
        let model = QueueModel::new(vec![json!({"answer": "x", "finish_chat": "Perhaps"})]);
        let session = ChatSession::new(model, retriever());

        let err = session.turn("q").await.unwrap_err();

        assert!(matches!(err, ChatError::Model(ModelError::MalformedOutput(_))));
    }
}
