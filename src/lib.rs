//! Voice Inventory: natural language control of a product inventory.
//!
//! Shared library for the MCP server and the `inventory` CLI.

pub mod backend;
pub mod error;
pub mod executor;
pub mod intent;
pub mod llm;
pub mod pipeline;
pub mod response;
pub mod schema;
pub mod seed;
pub mod server;
pub mod speech;

use std::path::{Path, PathBuf};

use backend::{InventoryDb, ProductStore};
use error::StoreError;

/// Resolve the database path from env var or default location.
pub fn resolve_db_path() -> PathBuf {
    if let Ok(path) = std::env::var("INVENTORY_DB")
        && !path.trim().is_empty()
    {
        return PathBuf::from(path);
    }

    let data_dir = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    data_dir.join("voice-inventory").join("inventory.db")
}

/// Open or create the database and ensure the products table exists.
pub fn init_db(path: &Path) -> Result<InventoryDb, StoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| {
            StoreError::Database(format!("cannot create {}: {e}", parent.display()))
        })?;
    }

    ProductStore::open(path)?.ensure_table()?;
    Ok(InventoryDb::new(path))
}
