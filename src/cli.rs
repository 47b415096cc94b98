use std::path::PathBuf;
use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use serde_json::Value;

use voice_inventory::backend::InventoryDb;
use voice_inventory::intent::IntentResolver;
use voice_inventory::llm::{AnthropicClient, LlmClient};
use voice_inventory::pipeline::{Assistant, Reply, execute_with_session};
use voice_inventory::schema::{Action, RawCommand, validate};
use voice_inventory::seed::{DEFAULT_SEED_COUNT, seed_products};
use voice_inventory::speech::WhisperClient;
use voice_inventory::{init_db, resolve_db_path};

#[derive(Parser)]
#[command(
    name = "inventory",
    about = "Voice inventory: manage products with plain language"
)]
struct Cli {
    /// Output machine-readable JSON (default: human-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Database path (default: $INVENTORY_DB or the local data dir)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Natural language request, e.g. "show all furniture products"
    #[arg(short, long)]
    prompt: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Transcribe a recorded request and run it
    Audio { path: PathBuf },
    /// Resolve a request without executing it and print the command
    Parse {
        /// Natural language input (positional, collects remaining args)
        input: Vec<String>,
    },
    /// List products
    List {
        #[arg(long, value_delimiter = ',', help = "Only these ids, e.g. --ids 3,1,2")]
        ids: Vec<i64>,
    },
    /// Show one product
    Get { id: i64 },
    /// Inventory totals and per-category breakdown
    Stats,
    /// Fill the inventory with random demo products
    Seed {
        #[arg(long, default_value_t = DEFAULT_SEED_COUNT)]
        count: usize,
        #[arg(long, help = "Delete every product first")]
        reset: bool,
    },
}

// ============================================================================
// Output Formatting
// ============================================================================

/// Format a single product for prose output.
fn format_item(item: &Value) {
    let name = item["name"].as_str().unwrap_or("?");
    let id = item["id"].as_i64().unwrap_or_default();
    println!("{name} (#{id})");

    if let Some(obj) = item.as_object() {
        for (attr_name, attr_value) in obj {
            if attr_name == "name" || attr_name == "id" || attr_value.is_null() {
                continue;
            }
            let display_value = match attr_value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            println!("  {}: {display_value}", capitalize_first(attr_name));
        }
    }
}

/// Capitalize the first letter of a string.
fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        None => String::new(),
        Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
    }
}

fn print_reply(reply: &Reply, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(&reply.to_value())?);
    } else {
        if let Some(ref heard) = reply.transcription {
            eprintln!("Heard: {heard}");
        }
        println!("{}", reply.speech);

        if let Some(items) = reply.json["data"].as_array() {
            for item in items {
                println!();
                format_item(item);
            }
        }
        if let Some(categories) = reply.json["by_category"].as_array() {
            for c in categories {
                println!(
                    "  {}: {} products, ${} total, mostly {}",
                    c["category"].as_str().unwrap_or("?"),
                    c["product_count"],
                    c["total_value"],
                    c["most_common_color"].as_str().unwrap_or("?"),
                );
            }
        }
    }

    if !reply.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = cli.db.clone().unwrap_or_else(resolve_db_path);
    let db = init_db(&db_path)?;

    if let Some(ref prompt) = cli.prompt {
        let assistant = Assistant::new(db, IntentResolver::new(require_llm()?));
        let reply = assistant.handle_text(prompt).await;
        return print_reply(&reply, cli.json);
    }

    match cli.command {
        Some(Command::Audio { path }) => {
            let whisper = WhisperClient::from_env()
                .ok_or("WHISPER_BASE_URL not set. Point it at a Whisper-compatible server.")?;
            let assistant = Assistant::new(db, IntentResolver::new(require_llm()?))
                .with_transcriber(Arc::new(whisper));
            let reply = assistant.handle_audio(&path).await?;
            print_reply(&reply, cli.json)?;
        }
        Some(Command::Parse { input }) => {
            let text = input.join(" ");
            if text.trim().is_empty() {
                eprintln!("Error: No input provided. Provide the request as positional arguments.");
                std::process::exit(1);
            }
            let resolver = IntentResolver::new(require_llm()?);
            let cmd = resolver.resolve(&text).await?;
            println!("{}", serde_json::to_string_pretty(&cmd.to_raw())?);
        }
        Some(Command::List { ids }) => {
            let mut raw = RawCommand::new(Action::Read);
            if !ids.is_empty() {
                raw.row = Some(Value::from(ids));
            }
            run_typed(&db, raw, cli.json)?;
        }
        Some(Command::Get { id }) => {
            let mut raw = RawCommand::new(Action::Read);
            raw.row = Some(Value::from(id));
            run_typed(&db, raw, cli.json)?;
        }
        Some(Command::Stats) => {
            run_typed(&db, RawCommand::new(Action::Stats), cli.json)?;
        }
        Some(Command::Seed { count, reset }) => {
            let store = db.connect()?;
            if reset {
                let removed = store.clear()?;
                eprintln!("Removed {removed} products");
            }
            let ids = seed_products(&store, count, &mut rand::thread_rng())?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&ids)?);
            } else {
                eprintln!("Seeded {} products into {}", ids.len(), db_path.display());
            }
        }
        None => {
            Cli::command().print_help()?;
            std::process::exit(2);
        }
    }

    Ok(())
}

/// Validate and execute a typed command without the language model.
fn run_typed(db: &InventoryDb, raw: RawCommand, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let cmd = validate(&raw)?;
    let result = execute_with_session(db, &cmd);
    print_reply(&Reply::from_result(&result, &cmd.message), json)
}

fn require_llm() -> Result<Arc<dyn LlmClient>, String> {
    let client = AnthropicClient::from_env()
        .map_err(|e| format!("{e}. Set ANTHROPIC_API_KEY for natural language requests."))?;
    Ok(Arc::new(client))
}
