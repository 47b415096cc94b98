//! The executor: one validated [`Command`] in, one storage call, one
//! [`ExecResult`] out.
//!
//! The executor never fails. Storage errors (missing rows, constraint
//! violations, I/O) are caught here and become [`ExecResult::Error`], so
//! every caller gets a well-formed result to format.

use serde::Serialize;
use tracing::{debug, warn};

use crate::backend::{InventoryStats, Product, ProductStore};
use crate::error::StoreError;
use crate::schema::{Command, Operation, RowSelector};

/// What a successful command produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    /// `read` of all rows or a list, `filter`, `sort`.
    Rows(Vec<Product>),
    /// `read` of one id. `None` when the id does not exist.
    Row(Option<Product>),
    /// `stats`.
    Stats(InventoryStats),
    /// `create`, `update`, `delete`, `replicate`. `id` is the newly assigned
    /// id for `create` and `replicate`.
    Written { id: Option<i64> },
}

/// Uniform outcome of executing one command.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecResult {
    Success { message: String, payload: Payload },
    Error { message: String },
}

impl ExecResult {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Success { message, .. } | Self::Error { message } => message,
        }
    }
}

/// Stateless dispatcher over one storage session.
pub struct Executor<'a> {
    store: &'a ProductStore,
}

impl<'a> Executor<'a> {
    pub fn new(store: &'a ProductStore) -> Self {
        Self { store }
    }

    /// Execute a single command.
    pub fn execute(&self, cmd: &Command) -> ExecResult {
        let action = cmd.action();
        match self.dispatch(cmd) {
            Ok((message, payload)) => {
                debug!(%action, %message, "Command succeeded");
                ExecResult::Success { message, payload }
            }
            Err(e) => {
                warn!(%action, error = %e, "Command failed");
                ExecResult::error(e.to_string())
            }
        }
    }

    fn dispatch(&self, cmd: &Command) -> Result<(String, Payload), StoreError> {
        let store = self.store;

        match &cmd.operation {
            Operation::Read(None) => Ok((cmd.message.clone(), Payload::Rows(store.read_all()?))),
            Operation::Read(Some(RowSelector::One(id))) => {
                Ok((cmd.message.clone(), Payload::Row(store.read_one(*id)?)))
            }
            Operation::Read(Some(RowSelector::Many(ids))) => {
                Ok((cmd.message.clone(), Payload::Rows(store.read_many(ids)?)))
            }
            Operation::Create(draft) => {
                let id = store.create(draft)?;
                Ok((
                    "Product created successfully".to_string(),
                    Payload::Written { id: Some(id) },
                ))
            }
            Operation::Update { id, change } => {
                store.update(*id, change)?;
                Ok((
                    format!("Product {id} updated: {} = {change}", change.field()),
                    Payload::Written { id: None },
                ))
            }
            Operation::Delete { id } => {
                store.delete(*id)?;
                Ok((format!("Product {id} deleted"), Payload::Written { id: None }))
            }
            Operation::Filter(predicate) => {
                Ok((cmd.message.clone(), Payload::Rows(store.filter(predicate)?)))
            }
            Operation::Sort { field, direction } => Ok((
                cmd.message.clone(),
                Payload::Rows(store.sort(*field, *direction)?),
            )),
            Operation::Replicate { id } => {
                let new_id = store.replicate(*id)?;
                Ok((
                    format!("Product {id} replicated as product {new_id}"),
                    Payload::Written { id: Some(new_id) },
                ))
            }
            Operation::Stats => {
                let stats = store.stats()?;
                let message = format!(
                    "Inventory has {} products worth ${:.2} in total",
                    stats.overview.total_products, stats.overview.total_inventory_value
                );
                Ok((message, Payload::Stats(stats)))
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
