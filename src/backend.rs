//! Product storage backed by a single SQLite table.
//!
//! [`InventoryDb`] is a cloneable handle that only knows where the database
//! lives. Each logical request calls [`InventoryDb::connect`] and gets its own
//! [`ProductStore`] wrapping a private connection, so concurrent requests never
//! share a cursor. The session is closed when the store is dropped.
//!
//! Column names and operators reach SQL only through the closed enums in
//! [`crate::schema`]; caller-supplied values are always bound parameters.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use indexmap::IndexMap;
use rusqlite::types::{Type, Value as SqlValue};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use serde::Serialize;

use crate::error::StoreError;
use crate::schema::{
    Category, Direction, Field, FieldUpdate, FilterValue, Operator, Predicate, ProductDraft,
};

/// How long a session waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const COLUMNS: &str = "id, name, category, color, quantity, price";

const CREATE_TABLE_SQL: &str = "
    PRAGMA journal_mode = WAL;

    CREATE TABLE IF NOT EXISTS products (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        category TEXT NOT NULL,
        color TEXT NOT NULL,
        quantity INTEGER NOT NULL CHECK (quantity >= 0),
        price REAL NOT NULL CHECK (price >= 0)
    );
";

// ============================================================================
// Rows
// ============================================================================

/// A stored product.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub category: Category,
    pub color: String,
    pub quantity: i64,
    pub price: f64,
}

fn product_from_row(row: &Row<'_>) -> rusqlite::Result<Product> {
    let category: String = row.get(2)?;
    let category = category
        .parse::<Category>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;

    Ok(Product {
        id: row.get(0)?,
        name: row.get(1)?,
        category,
        color: row.get(3)?,
        quantity: row.get(4)?,
        price: row.get(5)?,
    })
}

/// Aggregate figures across the whole inventory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsOverview {
    pub total_products: i64,
    pub min_price: f64,
    pub max_price: f64,
    pub average_price: f64,
    /// Sum of `price * quantity`.
    pub total_inventory_value: f64,
    pub average_quantity: f64,
}

/// Figures for one category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryStats {
    pub category: Category,
    pub product_count: i64,
    pub total_value: f64,
    pub avg_price: f64,
    pub most_common_color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InventoryStats {
    pub overview: StatsOverview,
    /// Ordered by category name.
    pub by_category: Vec<CategoryStats>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ============================================================================
// Database handle
// ============================================================================

/// Location of the inventory database. Hands out one session per request.
#[derive(Debug, Clone)]
pub struct InventoryDb {
    path: PathBuf,
}

impl InventoryDb {
    /// Wrap an existing database path. Use [`crate::init_db`] to create one.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a fresh session. The connection closes when the store drops.
    pub fn connect(&self) -> Result<ProductStore, StoreError> {
        ProductStore::open(&self.path)
    }
}

// ============================================================================
// Session
// ============================================================================

/// One connection to the inventory. Not shared between requests.
pub struct ProductStore {
    conn: Connection,
}

impl ProductStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Self { conn })
    }

    /// Create the `products` table if it doesn't already exist.
    pub fn ensure_table(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(CREATE_TABLE_SQL)?;
        Ok(())
    }

    /// Insert a product and return its new id.
    pub fn create(&self, draft: &ProductDraft) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO products (name, category, color, quantity, price)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                draft.name,
                draft.category.as_str(),
                draft.color,
                draft.quantity,
                draft.price
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn read_all(&self) -> Result<Vec<Product>, StoreError> {
        self.query_products(&format!("SELECT {COLUMNS} FROM products ORDER BY id"), [])
    }

    /// Fetch one product. A missing id is `Ok(None)`, not an error.
    pub fn read_one(&self, id: i64) -> Result<Option<Product>, StoreError> {
        let product = self
            .conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM products WHERE id = ?1"),
                params![id],
                product_from_row,
            )
            .optional()?;
        Ok(product)
    }

    /// Fetch several products in the order requested. Unknown ids are skipped.
    pub fn read_many(&self, ids: &[i64]) -> Result<Vec<Product>, StoreError> {
        if ids.is_empty() {
            return Err(StoreError::InvalidParams("id list must not be empty".into()));
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let found = self.query_products(
            &format!("SELECT {COLUMNS} FROM products WHERE id IN ({placeholders})"),
            params_from_iter(ids.iter()),
        )?;

        let mut by_id: HashMap<i64, Product> = found.into_iter().map(|p| (p.id, p)).collect();
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    /// Apply a single-column change. One statement per column.
    pub fn update(&self, id: i64, change: &FieldUpdate) -> Result<(), StoreError> {
        let changed = match change {
            FieldUpdate::Name(name) => self.conn.execute(
                "UPDATE products SET name = ?1 WHERE id = ?2",
                params![name, id],
            ),
            FieldUpdate::Category(category) => self.conn.execute(
                "UPDATE products SET category = ?1 WHERE id = ?2",
                params![category.as_str(), id],
            ),
            FieldUpdate::Color(color) => self.conn.execute(
                "UPDATE products SET color = ?1 WHERE id = ?2",
                params![color, id],
            ),
            FieldUpdate::Quantity(quantity) => self.conn.execute(
                "UPDATE products SET quantity = ?1 WHERE id = ?2",
                params![quantity, id],
            ),
            FieldUpdate::Price(price) => self.conn.execute(
                "UPDATE products SET price = ?1 WHERE id = ?2",
                params![price, id],
            ),
        }?;

        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    pub fn delete(&self, id: i64) -> Result<(), StoreError> {
        let removed = self
            .conn
            .execute("DELETE FROM products WHERE id = ?1", params![id])?;
        if removed == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    /// Products matching one predicate, in id order.
    ///
    /// `LIKE` is a case-insensitive substring match: the term is escaped and
    /// wrapped in `%` on both sides. Text equality ignores case as well.
    pub fn filter(&self, predicate: &Predicate) -> Result<Vec<Product>, StoreError> {
        let column = predicate.field.as_str();
        let operator = predicate.operator;

        let (condition, arg) = match (operator, &predicate.value) {
            (Operator::Like, value) => (
                format!("CAST({column} AS TEXT) LIKE ?1 ESCAPE '\\'"),
                SqlValue::Text(like_pattern(&value.to_string())),
            ),
            (op, FilterValue::Number(n)) => (format!("{column} {op} ?1"), SqlValue::Real(*n)),
            (op, FilterValue::Text(s)) => (
                format!("{column} {op} ?1 COLLATE NOCASE"),
                SqlValue::Text(s.clone()),
            ),
        };

        self.query_products(
            &format!("SELECT {COLUMNS} FROM products WHERE {condition} ORDER BY id"),
            params![arg],
        )
    }

    /// All products ordered by `field`. Ties break on id in the same
    /// direction, so descending is always the exact reverse of ascending.
    pub fn sort(&self, field: Field, direction: Direction) -> Result<Vec<Product>, StoreError> {
        let order = match direction {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        };
        let column = match field {
            Field::Name | Field::Color => format!("{} COLLATE NOCASE", field.as_str()),
            _ => field.as_str().to_string(),
        };

        self.query_products(
            &format!("SELECT {COLUMNS} FROM products ORDER BY {column} {order}, id {order}"),
            [],
        )
    }

    /// Copy a product under a new id.
    ///
    /// A single `INSERT ... SELECT`, so either the copy exists or nothing
    /// was written.
    pub fn replicate(&self, id: i64) -> Result<i64, StoreError> {
        let inserted = self.conn.execute(
            "INSERT INTO products (name, category, color, quantity, price)
             SELECT name, category, color, quantity, price FROM products WHERE id = ?1",
            params![id],
        )?;
        if inserted == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(self.conn.last_insert_rowid())
    }

    /// Overview totals plus a per-category breakdown, read in one snapshot.
    pub fn stats(&self) -> Result<InventoryStats, StoreError> {
        let tx = self.conn.unchecked_transaction()?;

        let overview = tx.query_row(
            "SELECT COUNT(*), MIN(price), MAX(price), AVG(price),
                    SUM(price * quantity), AVG(quantity)
             FROM products",
            [],
            |row| {
                let money = |idx: usize| -> rusqlite::Result<f64> {
                    Ok(round2(row.get::<_, Option<f64>>(idx)?.unwrap_or(0.0)))
                };
                Ok(StatsOverview {
                    total_products: row.get(0)?,
                    min_price: money(1)?,
                    max_price: money(2)?,
                    average_price: money(3)?,
                    total_inventory_value: money(4)?,
                    average_quantity: money(5)?,
                })
            },
        )?;

        let mut by_category: IndexMap<Category, CategoryStats> = IndexMap::new();
        {
            let mut stmt = tx.prepare(
                "SELECT category, COUNT(*), SUM(price * quantity), AVG(price)
                 FROM products GROUP BY category ORDER BY category",
            )?;
            let rows = stmt.query_map([], |row| {
                let category: String = row.get(0)?;
                let category = category.parse::<Category>().map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e))
                })?;
                Ok(CategoryStats {
                    category,
                    product_count: row.get(1)?,
                    total_value: round2(row.get(2)?),
                    avg_price: round2(row.get(3)?),
                    most_common_color: String::new(),
                })
            })?;
            for stats in rows {
                let stats = stats?;
                by_category.insert(stats.category, stats);
            }
        }

        {
            // Most frequent color first; ties resolve alphabetically.
            let mut stmt = tx.prepare(
                "SELECT category, color, COUNT(*) AS n
                 FROM products GROUP BY category, color
                 ORDER BY category, n DESC, color",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            for row in rows {
                let (category, color) = row?;
                if let Ok(category) = category.parse::<Category>()
                    && let Some(stats) = by_category.get_mut(&category)
                    && stats.most_common_color.is_empty()
                {
                    stats.most_common_color = color;
                }
            }
        }

        tx.commit()?;

        Ok(InventoryStats {
            overview,
            by_category: by_category.into_values().collect(),
        })
    }

    pub fn count(&self) -> Result<i64, StoreError> {
        let n = self
            .conn
            .query_row("SELECT COUNT(*) FROM products", [], |row| row.get(0))?;
        Ok(n)
    }

    /// Remove every product and restart id assignment. Returns rows removed.
    pub fn clear(&self) -> Result<usize, StoreError> {
        let removed = self.conn.execute("DELETE FROM products", [])?;
        self.conn.execute(
            "DELETE FROM sqlite_sequence WHERE name = 'products'",
            [],
        )?;
        Ok(removed)
    }

    #[cfg(test)]
    pub(crate) fn conn_for_tests(&self) -> &Connection {
        &self.conn
    }

    fn query_products<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> Result<Vec<Product>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let products = stmt
            .query_map(params, product_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(products)
    }
}

/// `%term%` with LIKE metacharacters escaped by `\`.
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

// ============================================================================
// Tests
// ============================================================================
