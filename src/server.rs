use rmcp::handler::server::{router::tool::ToolRouter, wrapper::Parameters};
use rmcp::model::{CallToolResult, Content, ServerCapabilities, ServerInfo};
use rmcp::{ErrorData, ServerHandler, tool, tool_handler, tool_router};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::pipeline::Assistant;
use crate::response::to_json;
use crate::schema::{Action, Category, Field, RawCommand, validate};
use crate::speech::TranscribeError;

// ---------------------------------------------------------------------------
// Parameter structs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, rmcp::schemars::JsonSchema)]
pub struct CommandParams {
    #[schemars(
        description = "Free-form inventory request, e.g. 'show all furniture products', 'sort by price descending', 'copy product 3'"
    )]
    pub text: String,
}

#[derive(Debug, Deserialize, rmcp::schemars::JsonSchema)]
pub struct AudioCommandParams {
    #[schemars(
        description = "Path to a recorded request (wav, mp3, flac, ogg, webm or m4a, at most 16 MiB)"
    )]
    pub path: String,
}

#[derive(Debug, Deserialize, rmcp::schemars::JsonSchema)]
pub struct ProductIdParams {
    #[schemars(description = "Product id")]
    pub id: i64,
}

#[derive(Debug, Deserialize, rmcp::schemars::JsonSchema)]
pub struct ListProductsParams {
    #[schemars(description = "Optional product ids. Results follow this order; unknown ids are skipped. Omit to list everything.")]
    pub ids: Option<Vec<i64>>,
}

#[derive(Debug, Deserialize, rmcp::schemars::JsonSchema)]
pub struct CreateProductParams {
    #[schemars(description = "Product name")]
    pub name: String,
    #[schemars(
        description = "One of Furniture, Electronics, Clothing, Books, Toys, Kitchen (case-insensitive)"
    )]
    pub category: String,
    #[schemars(description = "Color, e.g. 'blue'")]
    pub color: String,
    #[schemars(description = "Units in stock, non-negative")]
    pub quantity: i64,
    #[schemars(description = "Unit price, non-negative")]
    pub price: f64,
}

#[derive(Debug, Deserialize, rmcp::schemars::JsonSchema)]
pub struct UpdateProductParams {
    #[schemars(description = "Product id")]
    pub id: i64,
    #[schemars(description = "Column to change: name, category, color, quantity or price")]
    pub field: String,
    #[schemars(description = "New value. Numbers for quantity and price, text otherwise.")]
    pub value: Value,
}

// ---------------------------------------------------------------------------
// MCP Server
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct InventoryServer {
    assistant: Assistant,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl InventoryServer {
    pub fn new(assistant: Assistant) -> Self {
        Self {
            assistant,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        description = "Run a natural language inventory request (read, create, update, delete, filter, sort, replicate, stats). Returns the JSON response with a spoken-style 'speech' sentence."
    )]
    async fn command(
        &self,
        Parameters(p): Parameters<CommandParams>,
    ) -> Result<CallToolResult, ErrorData> {
        if p.text.trim().is_empty() {
            return Err(ErrorData::invalid_params("'text' must not be empty.", None));
        }

        let reply = self.assistant.handle_text(&p.text).await;
        json_result(&reply.to_value())
    }

    #[tool(
        description = "Transcribe a recorded request and run it like 'command'. The response includes the 'transcription'."
    )]
    async fn audio_command(
        &self,
        Parameters(p): Parameters<AudioCommandParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let reply = self
            .assistant
            .handle_audio(std::path::Path::new(&p.path))
            .await
            .map_err(|e| match e {
                TranscribeError::MissingFile(_)
                | TranscribeError::UnsupportedFormat(_)
                | TranscribeError::TooLarge(_) => ErrorData::invalid_params(e.to_string(), None),
                other => {
                    warn!(error = %other, "Transcription failed");
                    ErrorData::internal_error(other.to_string(), None)
                }
            })?;

        json_result(&reply.to_value())
    }

    #[tool(description = "Fetch one product by id.")]
    async fn get_product(
        &self,
        Parameters(p): Parameters<ProductIdParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let mut raw = RawCommand::new(Action::Read);
        raw.row = Some(Value::from(p.id));
        self.execute_raw(raw).await
    }

    #[tool(description = "List all products, or only the given ids.")]
    async fn list_products(
        &self,
        Parameters(p): Parameters<ListProductsParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let mut raw = RawCommand::new(Action::Read);
        raw.row = p.ids.map(Value::from);
        self.execute_raw(raw).await
    }

    #[tool(description = "Create a product. Returns the new product's id in the message.")]
    async fn create_product(
        &self,
        Parameters(p): Parameters<CreateProductParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let mut raw = RawCommand::new(Action::Create);
        raw.value = Some(serde_json::json!({
            "name": p.name,
            "category": p.category,
            "color": p.color,
            "quantity": p.quantity,
            "price": p.price,
        }));
        self.execute_raw(raw).await
    }

    #[tool(description = "Change a single column of an existing product.")]
    async fn update_product(
        &self,
        Parameters(p): Parameters<UpdateProductParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let mut raw = RawCommand::new(Action::Update);
        raw.row = Some(Value::from(p.id));
        raw.field = Some(p.field);
        raw.value = Some(p.value);
        self.execute_raw(raw).await
    }

    #[tool(description = "Delete a product by id.")]
    async fn delete_product(
        &self,
        Parameters(p): Parameters<ProductIdParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let mut raw = RawCommand::new(Action::Delete);
        raw.row = Some(Value::from(p.id));
        self.execute_raw(raw).await
    }

    #[tool(description = "Copy a product under a new id.")]
    async fn replicate_product(
        &self,
        Parameters(p): Parameters<ProductIdParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let mut raw = RawCommand::new(Action::Replicate);
        raw.row = Some(Value::from(p.id));
        self.execute_raw(raw).await
    }

    #[tool(description = "Inventory totals and a per-category breakdown.")]
    async fn inventory_stats(&self) -> Result<CallToolResult, ErrorData> {
        self.execute_raw(RawCommand::new(Action::Stats)).await
    }
}

impl InventoryServer {
    /// Typed tools go through the same validator as natural language.
    async fn execute_raw(&self, raw: RawCommand) -> Result<CallToolResult, ErrorData> {
        let cmd = validate(&raw).map_err(|e| ErrorData::invalid_params(e.to_string(), None))?;
        debug!(action = %cmd.action(), "Typed tool call");

        let result = self.assistant.run(cmd.clone()).await;
        json_result(&to_json(&result, &cmd.message))
    }
}

fn json_result(value: &Value) -> Result<CallToolResult, ErrorData> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| ErrorData::internal_error(format!("JSON serialization error: {e}"), None))?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

fn instructions() -> String {
    let categories: Vec<&str> = Category::ALL.iter().map(|c| c.as_str()).collect();
    let fields: Vec<&str> = Field::ALL.iter().map(|f| f.as_str()).collect();
    format!(
        "Voice-driven product inventory backed by SQLite. Use 'command' for natural language \
         requests, 'audio_command' for recorded ones, or the typed tools (get_product, \
         list_products, create_product, update_product, delete_product, replicate_product, \
         inventory_stats). Fields: {}. Categories: {}.",
        fields.join(", "),
        categories.join(", ")
    )
}

#[tool_handler]
impl ServerHandler for InventoryServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(instructions()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
