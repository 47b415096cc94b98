//! Natural language → [`Command`] resolution.
//!
//! The resolver gives the language model a fixed instruction set (the closed
//! vocabulary of actions, fields and operators) and a set of worked examples
//! covering every action, then treats whatever comes back as untrusted input:
//! markdown fences are stripped, the first JSON object is extracted, and the
//! result must pass [`schema::validate`] before anything can execute it.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use thiserror::Error;
use tracing::{debug, warn};

use crate::llm::{LlmClient, LlmError};
use crate::schema::{self, Command, RawCommand, SchemaError};

// ============================================================================
// Errors
// ============================================================================

/// The utterance could not be turned into a valid command.
#[derive(Debug, Error)]
pub enum IntentError {
    #[error("no command text provided")]
    EmptyInput,

    #[error("language model request failed: {0}")]
    Oracle(#[from] LlmError),

    #[error("could not read a command from the model output: {0}")]
    Malformed(String),

    #[error("invalid command: {0}")]
    Schema(#[from] SchemaError),
}

// ============================================================================
// Prompt
// ============================================================================

const INSTRUCTIONS: &str = r#"You translate requests about a product inventory into exactly one database command.

The inventory has one table, products, with these columns:
- id: integer, assigned by the database, never changes
- name: text
- category: one of Furniture, Electronics, Clothing, Books, Toys, Kitchen
- color: text
- quantity: non-negative integer (units in stock)
- price: non-negative number (unit price in dollars)

Respond with ONLY a JSON object (no markdown, no explanation) with these keys:
- "action": one of create, read, update, delete, filter, sort, replicate, stats
- "row": an integer id, a non-empty list of integer ids, or null. Never a string.
- "field": one of id, name, category, color, quantity, price, or null
- "value": a string, a number, an object (create only), or null
- "operator": one of =, !=, <, <=, >, >=, LIKE (filter only), or null
- "direction": "asc" or "desc" (sort only), or null
- "message": a short sentence describing what the command does

Rules:
- create: "value" is an object with name, category, color, quantity and price. No row, field or operator.
- read: "row" is null for every product, an id for one product, or a list of ids.
- update: needs "row", "field" and "value". The id column cannot be updated.
- delete and replicate: need a single id in "row". replicate copies a product under a new id.
- filter: needs "field", "operator" and "value". Use LIKE for "contains" or partial names.
- sort: needs "field"; set "direction" to "desc" for descending, otherwise "asc".
- stats: no row, field, operator or value.
- Never invent actions, columns, operators or categories outside these lists."#;

/// Input/output pairs anchoring the model's behavior, one or more per action.
const EXAMPLES: &[(&str, &str)] = &[
    (
        "show all products",
        r#"{"action":"read","row":null,"field":null,"value":null,"operator":null,"message":"Showing all products"}"#,
    ),
    (
        "show me products 3, 19 and 20",
        r#"{"action":"read","row":[3,19,20],"field":null,"value":null,"operator":null,"message":"Showing products 3, 19 and 20"}"#,
    ),
    (
        "create product iPhone 13, Electronics, Blue, 5, 999",
        r#"{"action":"create","row":null,"field":null,"value":{"name":"iPhone 13","category":"Electronics","color":"Blue","quantity":5,"price":999},"operator":null,"message":"Creating product iPhone 13"}"#,
    ),
    (
        "change the price of product 7 to 49.99",
        r#"{"action":"update","row":7,"field":"price","value":49.99,"operator":null,"message":"Updating the price of product 7 to 49.99"}"#,
    ),
    (
        "delete product 2",
        r#"{"action":"delete","row":2,"field":null,"value":null,"operator":null,"message":"Deleting product 2"}"#,
    ),
    (
        "show all furniture products",
        r#"{"action":"filter","row":null,"field":"category","value":"Furniture","operator":"=","message":"Showing products in the Furniture category"}"#,
    ),
    (
        "which products cost more than 100 dollars",
        r#"{"action":"filter","row":null,"field":"price","value":100,"operator":">","message":"Showing products priced above 100"}"#,
    ),
    (
        "find products with lamp in the name",
        r#"{"action":"filter","row":null,"field":"name","value":"lamp","operator":"LIKE","message":"Showing products whose name contains lamp"}"#,
    ),
    (
        "sort by price descending",
        r#"{"action":"sort","row":null,"field":"price","value":null,"operator":null,"direction":"desc","message":"Sorting products by price, highest first"}"#,
    ),
    (
        "copy product 3",
        r#"{"action":"replicate","row":3,"field":null,"value":null,"operator":null,"message":"Copying product 3"}"#,
    ),
    (
        "show database statistics",
        r#"{"action":"stats","row":null,"field":null,"value":null,"operator":null,"message":"Showing inventory statistics"}"#,
    ),
];

static SYSTEM_PROMPT: LazyLock<String> = LazyLock::new(|| {
    let mut prompt = String::from(INSTRUCTIONS);
    prompt.push_str("\n\nExamples:\n");
    for (input, output) in EXAMPLES {
        prompt.push_str(&format!("\nRequest: {input}\nCommand: {output}\n"));
    }
    prompt
});

/// The full system prompt sent with every request.
pub fn system_prompt() -> &'static str {
    &SYSTEM_PROMPT
}

// ============================================================================
// Resolver
// ============================================================================

/// Turns free text into a validated [`Command`] via the language model.
#[derive(Clone)]
pub struct IntentResolver {
    llm: Arc<dyn LlmClient>,
}

impl IntentResolver {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Resolve one utterance.
    ///
    /// Exactly one model call. Any output that does not validate is an
    /// [`IntentError`]; nothing is patched up on the model's behalf.
    pub async fn resolve(&self, text: &str) -> Result<Command, IntentError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(IntentError::EmptyInput);
        }

        let completion = self
            .llm
            .complete(system_prompt(), &format!("Request: {text}"))
            .await?;

        let raw = parse_raw_command(&completion.text).inspect_err(|e| {
            warn!(error = %e, output = %completion.text, "Model output is not a command");
        })?;

        let command = schema::validate(&raw).map_err(|e| {
            warn!(error = %e, output = %completion.text, "Model output failed validation");
            IntentError::Schema(e)
        })?;

        debug!(action = %command.action(), message = %command.message, "Resolved command");
        Ok(command)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Parse model output into a [`RawCommand`].
///
/// Accepts a bare JSON object, one wrapped in markdown fences, or one
/// surrounded by prose. Anything else is [`IntentError::Malformed`].
pub fn parse_raw_command(text: &str) -> Result<RawCommand, IntentError> {
    let cleaned = strip_markdown_fences(text);

    if let Ok(raw) = serde_json::from_str::<RawCommand>(&cleaned) {
        return Ok(raw);
    }

    let object = extract_json_object(&cleaned)
        .ok_or_else(|| IntentError::Malformed(format!("no JSON object in {cleaned:?}")))?;
    serde_json::from_str(object).map_err(|e| IntentError::Malformed(e.to_string()))
}

/// Strip markdown code fences from LLM output.
pub fn strip_markdown_fences(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.starts_with("```") {
        let after_first_fence = trimmed
            .find('\n')
            .map(|i| &trimmed[i + 1..])
            .unwrap_or(trimmed);
        if let Some(end) = after_first_fence.rfind("```") {
            return after_first_fence[..end].trim().to_string();
        }
    }
    trimmed.to_string()
}

static JSON_OBJECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("static regex is valid"));

/// The widest `{...}` span in the text, if any.
fn extract_json_object(text: &str) -> Option<&str> {
    JSON_OBJECT.find(text).map(|m| m.as_str())
}

// ============================================================================
// Tests
// ============================================================================
