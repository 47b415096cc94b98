//! End-to-end request path.
//!
//! ```text
//! text ──────────────┐
//!                    ├─> IntentResolver ─> Command ─> Executor ─> ExecResult ─> {JSON, speech}
//! audio ─> transcribe┘
//! ```
//!
//! Every request opens its own storage session on a blocking thread and
//! closes it when the command finishes. Nothing mutable is shared between
//! requests except the database file.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::backend::InventoryDb;
use crate::executor::{ExecResult, Executor};
use crate::intent::IntentResolver;
use crate::response::{to_json, to_speech};
use crate::schema::Command;
use crate::speech::{TranscribeError, Transcriber};

/// Both renderings of one request's outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub json: Value,
    pub speech: String,
    /// Set when the request came in as audio.
    pub transcription: Option<String>,
}

impl Reply {
    pub fn from_result(result: &ExecResult, original_command: &str) -> Self {
        Self {
            json: to_json(result, original_command),
            speech: to_speech(result, original_command),
            transcription: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.json["status"] == "success"
    }

    /// The JSON payload with `speech` (and `transcription`, when present)
    /// attached as extra keys.
    pub fn to_value(&self) -> Value {
        let mut value = self.json.clone();
        if let Value::Object(map) = &mut value {
            map.insert("speech".into(), Value::String(self.speech.clone()));
            if let Some(text) = &self.transcription {
                map.insert("transcription".into(), Value::String(text.clone()));
            }
        }
        value
    }
}

/// Execute one command in a fresh session. Never fails.
pub fn execute_with_session(db: &InventoryDb, cmd: &Command) -> ExecResult {
    match db.connect() {
        Ok(store) => Executor::new(&store).execute(cmd),
        Err(e) => {
            warn!(error = %e, "Failed to open storage session");
            ExecResult::error(e.to_string())
        }
    }
}

/// The assistant: resolver, storage and an optional transcriber.
#[derive(Clone)]
pub struct Assistant {
    db: InventoryDb,
    resolver: IntentResolver,
    transcriber: Option<Arc<dyn Transcriber>>,
}

impl Assistant {
    pub fn new(db: InventoryDb, resolver: IntentResolver) -> Self {
        Self {
            db,
            resolver,
            transcriber: None,
        }
    }

    pub fn with_transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    pub fn db(&self) -> &InventoryDb {
        &self.db
    }

    pub fn resolver(&self) -> &IntentResolver {
        &self.resolver
    }

    /// Resolve free text and execute it.
    ///
    /// Resolver failures become an error reply without touching storage.
    pub async fn handle_text(&self, text: &str) -> Reply {
        let text = text.trim();
        let result = match self.resolver.resolve(text).await {
            Ok(cmd) => {
                info!(action = %cmd.action(), "Resolved command");
                self.run(cmd).await
            }
            Err(e) => ExecResult::error(e.to_string()),
        };
        Reply::from_result(&result, text)
    }

    /// Transcribe an audio file, then handle the transcript as text.
    ///
    /// Admission and transcription failures are returned as errors: they
    /// happen before the core is invoked.
    pub async fn handle_audio(&self, path: &Path) -> Result<Reply, TranscribeError> {
        let transcriber = self.transcriber.as_ref().ok_or(TranscribeError::Disabled)?;
        let transcript = transcriber.transcribe(path).await?;
        info!(chars = transcript.len(), "Transcribed audio");

        let mut reply = self.handle_text(&transcript).await;
        reply.transcription = Some(transcript);
        Ok(reply)
    }

    /// Execute an already validated command on a blocking thread.
    pub async fn run(&self, cmd: Command) -> ExecResult {
        let db = self.db.clone();
        match tokio::task::spawn_blocking(move || execute_with_session(&db, &cmd)).await {
            Ok(result) => result,
            Err(e) => ExecResult::error(format!("Task join error: {e}")),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::speech::MockTranscriber;
    use serde_json::json;

    fn setup(responses: &[&str]) -> (Assistant, Arc<MockLlmClient>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = crate::init_db(&dir.path().join("inventory.db")).unwrap();
        let mock = Arc::new(MockLlmClient::new(
            responses.iter().map(|r| r.to_string()).collect(),
        ));
        let assistant = Assistant::new(db, IntentResolver::new(mock.clone()));
        (assistant, mock, dir)
    }

    fn count(assistant: &Assistant) -> i64 {
        assistant.db().connect().unwrap().count().unwrap()
    }

    #[tokio::test]
    async fn test_create_scenario() {
        let (assistant, _mock, _dir) = setup(&[
            r#"{"action": "create", "value": {"name": "iPhone 13", "category": "Electronics", "color": "Blue", "quantity": 5, "price": 999}, "message": "Create iPhone 13"}"#,
        ]);
        let text = "create product iPhone 13, Electronics, Blue, 5, 999";

        let reply = assistant.handle_text(text).await;
        assert_eq!(
            reply.json,
            json!({
                "status": "success",
                "response": "Product created successfully",
                "data": [],
                "original_command": text,
            })
        );
        assert_eq!(reply.speech, "Product created successfully");

        let store = assistant.db().connect().unwrap();
        let rows = store.read_all().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "iPhone 13");
        assert_eq!(rows[0].color, "Blue");
        assert_eq!(rows[0].quantity, 5);
        assert_eq!(rows[0].price, 999.0);
    }

    #[tokio::test]
    async fn test_delete_missing_scenario() {
        let (assistant, _mock, _dir) = setup(&[r#"{"action": "delete", "row": 2}"#]);

        let reply = assistant.handle_text("delete product 2").await;
        assert!(!reply.is_success());
        assert_eq!(
            reply.json,
            json!({
                "status": "error",
                "response": "Product with ID 2 not found",
                "data": [],
                "original_command": "delete product 2",
            })
        );
        assert_eq!(
            reply.speech,
            "Sorry, there was an error: Product with ID 2 not found"
        );
    }

    #[tokio::test]
    async fn test_filter_furniture_scenario() {
        let filter =
            r#"{"action": "filter", "field": "category", "operator": "=", "value": "Furniture"}"#;
        let (assistant, _mock, _dir) = setup(&[
            filter,
            r#"{"action": "create", "value": {"name": "Sofa", "category": "Furniture", "color": "grey", "quantity": 1, "price": 400}}"#,
            r#"{"action": "create", "value": {"name": "Lamp", "category": "Furniture", "color": "black", "quantity": 2, "price": 30}}"#,
            filter,
        ]);
        let text = "show all furniture products";

        let empty = assistant.handle_text(text).await;
        assert_eq!(
            empty.speech,
            "I found no products matching your request for show all furniture products"
        );

        assistant.handle_text("add a sofa").await;
        assistant.handle_text("add a lamp").await;

        let reply = assistant.handle_text(text).await;
        assert_eq!(reply.json["response"], "Found 2 products");
        assert_eq!(
            reply.speech,
            "I found 2 products matching your request for show all furniture products"
        );
    }

    #[tokio::test]
    async fn test_malformed_oracle_output_makes_no_storage_call() {
        let (assistant, mock, _dir) = setup(&[
            r#"{"action": "create", "value": {"name": "Sofa", "category": "Furniture", "color": "grey", "quantity": 1, "price": 400}}"#,
            r#"{"action": "filter", "field": "price", "value": 100}"#,
        ]);
        assistant.handle_text("add a sofa").await;
        let before = assistant.db().connect().unwrap().read_all().unwrap();

        let reply = assistant.handle_text("products over 100").await;
        assert_eq!(reply.json["status"], "error");
        assert_eq!(reply.json["data"], json!([]));
        assert!(
            reply.json["response"]
                .as_str()
                .unwrap()
                .contains("filter requires operator")
        );
        assert_eq!(assistant.db().connect().unwrap().read_all().unwrap(), before);
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn test_oracle_failure_is_error_reply() {
        let (assistant, _mock, _dir) = setup(&[]);
        let reply = assistant.handle_text("show all products").await;
        assert!(!reply.is_success());
        assert!(reply.speech.starts_with("Sorry, there was an error:"));
    }

    #[tokio::test]
    async fn test_concurrent_requests_use_separate_sessions() {
        let create = r#"{"action": "create", "value": {"name": "Kite", "category": "Toys", "color": "red", "quantity": 1, "price": 5}}"#;
        let (assistant, _mock, _dir) = setup(&[create; 8]);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let assistant = assistant.clone();
                tokio::spawn(async move { assistant.handle_text(&format!("add kite {i}")).await })
            })
            .collect();
        for handle in handles {
            assert!(handle.await.unwrap().is_success());
        }
        assert_eq!(count(&assistant), 8);
    }

    #[tokio::test]
    async fn test_audio_path() {
        let (assistant, _mock, dir) = setup(&[r#"{"action": "read"}"#]);
        let transcriber = Arc::new(MockTranscriber::new("show all products"));
        let assistant = assistant.with_transcriber(transcriber.clone());

        let path = dir.path().join("command.wav");
        std::fs::write(&path, b"RIFF").unwrap();

        let reply = assistant.handle_audio(&path).await.unwrap();
        assert_eq!(reply.transcription.as_deref(), Some("show all products"));
        assert_eq!(reply.json["original_command"], "show all products");
        assert_eq!(reply.json["response"], "Found 0 products");
        assert_eq!(reply.to_value()["transcription"], "show all products");
        assert_eq!(transcriber.calls(), 1);
    }

    #[tokio::test]
    async fn test_audio_rejected_before_core() {
        let (assistant, mock, dir) = setup(&[]);
        let assistant = assistant.with_transcriber(Arc::new(MockTranscriber::new("x")));

        let path = dir.path().join("command.txt");
        std::fs::write(&path, b"hello").unwrap();

        assert!(matches!(
            assistant.handle_audio(&path).await,
            Err(TranscribeError::UnsupportedFormat(_))
        ));
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn test_audio_disabled() {
        let (assistant, _mock, dir) = setup(&[]);
        let result = assistant.handle_audio(&dir.path().join("a.wav")).await;
        assert!(matches!(result, Err(TranscribeError::Disabled)));
    }

    #[test]
    fn test_reply_to_value_adds_speech() {
        let reply = Reply::from_result(&ExecResult::error("boom"), "do it");
        let value = reply.to_value();
        assert_eq!(value["speech"], "Sorry, there was an error: boom");
        assert!(value.get("transcription").is_none());
    }
}
