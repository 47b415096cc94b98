//! Response formatting: one [`ExecResult`] rendered twice, as a JSON object
//! for programmatic consumers and as a sentence for audio playback.
//!
//! Both functions are pure. Error results keep the same JSON shape as
//! successes apart from `status` and `response`.

use serde_json::{Value, json};

use crate::backend::Product;
use crate::executor::{ExecResult, Payload};

/// Render a result as the JSON payload returned to callers.
///
/// `original_command` is echoed back verbatim.
pub fn to_json(result: &ExecResult, original_command: &str) -> Value {
    let (message, payload) = match result {
        ExecResult::Error { message } => {
            return json!({
                "status": "error",
                "response": message,
                "data": [],
                "original_command": original_command,
            });
        }
        ExecResult::Success { message, payload } => (message, payload),
    };

    match payload {
        Payload::Rows(rows) => json!({
            "status": "success",
            "response": format!("Found {} products", rows.len()),
            "data": rows,
            "original_command": original_command,
        }),
        Payload::Row(Some(product)) => json!({
            "status": "success",
            "response": "Found product",
            "data": [product],
            "original_command": original_command,
        }),
        Payload::Row(None) => json!({
            "status": "success",
            "response": "Product not found",
            "data": [],
            "original_command": original_command,
        }),
        Payload::Stats(stats) => json!({
            "status": "success",
            "overview": stats.overview,
            "by_category": stats.by_category,
            "original_command": original_command,
        }),
        Payload::Written { .. } => json!({
            "status": "success",
            "response": message,
            "data": [],
            "original_command": original_command,
        }),
    }
}

/// Render a result as a sentence suitable for text-to-speech.
pub fn to_speech(result: &ExecResult, original_command: &str) -> String {
    match result {
        ExecResult::Error { message } => format!("Sorry, there was an error: {message}"),
        ExecResult::Success { payload, message } => match payload {
            Payload::Rows(rows) => match rows.as_slice() {
                [] => format!("I found no products matching your request for {original_command}"),
                [product] => format!("I found one product: {}", describe(product)),
                _ => format!(
                    "I found {} products matching your request for {original_command}",
                    rows.len()
                ),
            },
            Payload::Row(Some(product)) => format!("I found the product: {}", describe(product)),
            Payload::Row(None) => "Product not found".to_string(),
            Payload::Stats(_) | Payload::Written { .. } => message.clone(),
        },
    }
}

fn describe(product: &Product) -> String {
    format!(
        "{} in {}, priced at ${:.2}",
        product.name, product.category, product.price
    )
}

// ============================================================================
// Tests
// ============================================================================
