use std::sync::Arc;

use rmcp::ServiceExt;
use rmcp::transport::stdio;
use tracing::info;

use voice_inventory::intent::IntentResolver;
use voice_inventory::llm::AnthropicClient;
use voice_inventory::pipeline::Assistant;
use voice_inventory::speech::WhisperClient;
use voice_inventory::{init_db, resolve_db_path};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // No oracle, no natural language path. Fail before touching storage.
    let llm = AnthropicClient::from_env().map_err(|e| {
        format!("{e}. Set ANTHROPIC_API_KEY to enable natural language commands.")
    })?;
    info!(model = llm.model(), "Language model configured");

    let db_path = resolve_db_path();
    let db = init_db(&db_path)?;
    info!(path = %db_path.display(), "Inventory database ready");

    let mut assistant = Assistant::new(db, IntentResolver::new(Arc::new(llm)));
    match WhisperClient::from_env() {
        Some(whisper) => {
            info!(model = whisper.model(), "Audio transcription enabled");
            assistant = assistant.with_transcriber(Arc::new(whisper));
        }
        None => info!("Audio transcription disabled: WHISPER_BASE_URL not set"),
    }

    let server = voice_inventory::server::InventoryServer::new(assistant);
    let service = server.serve(stdio()).await?;
    service.waiting().await?;

    Ok(())
}
