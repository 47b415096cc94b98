//! Command schema for inventory operations.
//!
//! A [`Command`] is the only thing the executor accepts. Both entry paths
//! produce one through [`validate`]:
//!
//! - **Natural language**: the intent resolver deserializes the language
//!   model's output into a [`RawCommand`] and validates it.
//! - **Typed callers**: tools and the CLI build a [`RawCommand`] directly.
//!
//! The vocabulary is closed. Actions, fields, operators and categories are
//! enums, so nothing a caller types can reach a query string unless it maps
//! onto one of these variants first.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

/// A raw command violated the schema. The message names the broken rule.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("action is required")]
    MissingAction,

    #[error("Unsupported action: {0}")]
    UnsupportedAction(String),

    #[error("{action} requires {argument}")]
    MissingArgument {
        action: Action,
        argument: &'static str,
    },

    #[error("{action} does not accept {argument}")]
    UnexpectedArgument {
        action: Action,
        argument: &'static str,
    },

    #[error("row must be an integer id or a list of integer ids: {0}")]
    InvalidRow(String),

    #[error("row list must not be empty")]
    EmptyRowList,

    #[error("{0} requires a single row id, not a list")]
    RowListNotAllowed(Action),

    #[error("unknown field '{0}' (expected one of id, name, category, color, quantity, price)")]
    UnknownField(String),

    #[error("field '{0}' cannot be updated")]
    ImmutableField(Field),

    #[error("unknown operator '{0}' (expected one of =, !=, <, <=, >, >=, LIKE)")]
    UnknownOperator(String),

    #[error(
        "unknown category '{0}' (expected one of Furniture, Electronics, Clothing, Books, Toys, Kitchen)"
    )]
    UnknownCategory(String),

    #[error("unknown sort direction '{0}' (expected asc or desc)")]
    InvalidDirection(String),

    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: Field, reason: String },

    #[error("create payload {0}")]
    InvalidPayload(String),
}

// ============================================================================
// Vocabulary
// ============================================================================

/// The eight supported operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    Filter,
    Sort,
    Replicate,
    Stats,
}

impl Action {
    pub const ALL: [Action; 8] = [
        Action::Create,
        Action::Read,
        Action::Update,
        Action::Delete,
        Action::Filter,
        Action::Sort,
        Action::Replicate,
        Action::Stats,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Filter => "filter",
            Self::Sort => "sort",
            Self::Replicate => "replicate",
            Self::Stats => "stats",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Self::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| SchemaError::UnsupportedAction(needle.to_string()))
    }
}

/// Columns of the `products` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Id,
    Name,
    Category,
    Color,
    Quantity,
    Price,
}

impl Field {
    pub const ALL: [Field; 6] = [
        Field::Id,
        Field::Name,
        Field::Category,
        Field::Color,
        Field::Quantity,
        Field::Price,
    ];

    /// Column name. Static, so it is safe to splice into SQL.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::Category => "category",
            Self::Color => "color",
            Self::Quantity => "quantity",
            Self::Price => "price",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Id | Self::Quantity | Self::Price)
    }

    /// `id` is assigned by storage and never changes.
    pub fn is_mutable(self) -> bool {
        self != Self::Id
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Field {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Self::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| SchemaError::UnknownField(needle.to_string()))
    }
}

/// Comparison operators accepted by `filter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Like => "LIKE",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "=" | "==" => Ok(Self::Eq),
            "!=" | "<>" => Ok(Self::Ne),
            "<" => Ok(Self::Lt),
            "<=" => Ok(Self::Le),
            ">" => Ok(Self::Gt),
            ">=" => Ok(Self::Ge),
            other if other.eq_ignore_ascii_case("like") => Ok(Self::Like),
            other => Err(SchemaError::UnknownOperator(other.to_string())),
        }
    }
}

/// Product categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    Furniture,
    Electronics,
    Clothing,
    Books,
    Toys,
    Kitchen,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Furniture,
        Category::Electronics,
        Category::Clothing,
        Category::Books,
        Category::Toys,
        Category::Kitchen,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Furniture => "Furniture",
            Self::Electronics => "Electronics",
            Self::Clothing => "Clothing",
            Self::Books => "Books",
            Self::Toys => "Toys",
            Self::Kitchen => "Kitchen",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| SchemaError::UnknownCategory(needle.to_string()))
    }
}

/// Sort order for the `sort` action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }

    /// Read the legacy direction flag carried in a sort command's `value`.
    ///
    /// "desc", "descending" and "reverse" select descending order. Anything
    /// else, including no value at all, sorts ascending.
    pub fn from_value_flag(value: Option<&Value>) -> Self {
        match value.and_then(Value::as_str).map(str::trim) {
            Some(flag)
                if ["desc", "descending", "reverse"]
                    .iter()
                    .any(|d| d.eq_ignore_ascii_case(flag)) =>
            {
                Self::Desc
            }
            _ => Self::Asc,
        }
    }
}

impl FromStr for Direction {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(Self::Asc),
            "desc" | "descending" | "reverse" => Ok(Self::Desc),
            _ => Err(SchemaError::InvalidDirection(s.trim().to_string())),
        }
    }
}

// ============================================================================
// Typed operation arguments
// ============================================================================

/// Which rows a `read` targets.
#[derive(Debug, Clone, PartialEq)]
pub enum RowSelector {
    One(i64),
    Many(Vec<i64>),
}

/// Every column of a product except `id`. Payload of `create`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductDraft {
    pub name: String,
    pub category: Category,
    pub color: String,
    pub quantity: i64,
    pub price: f64,
}

/// A single-column mutation. One variant per mutable column.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    Name(String),
    Category(Category),
    Color(String),
    Quantity(i64),
    Price(f64),
}

impl FieldUpdate {
    pub fn field(&self) -> Field {
        match self {
            Self::Name(_) => Field::Name,
            Self::Category(_) => Field::Category,
            Self::Color(_) => Field::Color,
            Self::Quantity(_) => Field::Quantity,
            Self::Price(_) => Field::Price,
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Self::Name(s) | Self::Color(s) => Value::String(s.clone()),
            Self::Category(c) => Value::String(c.as_str().to_string()),
            Self::Quantity(n) => Value::from(*n),
            Self::Price(p) => number_value(*p),
        }
    }
}

impl fmt::Display for FieldUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(s) | Self::Color(s) => f.write_str(s),
            Self::Category(c) => f.write_str(c.as_str()),
            Self::Quantity(n) => write!(f, "{n}"),
            Self::Price(p) => f.write_str(&format_number(*p)),
        }
    }
}

/// Right-hand side of a filter predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Number(f64),
}

impl FilterValue {
    fn to_value(&self) -> Value {
        match self {
            Self::Text(s) => Value::String(s.clone()),
            Self::Number(n) => number_value(*n),
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Number(n) => f.write_str(&format_number(*n)),
        }
    }
}

/// A single `field operator value` predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub field: Field,
    pub operator: Operator,
    pub value: FilterValue,
}

/// A validated operation. Each variant carries exactly the arguments its
/// action needs, so the executor never re-checks presence.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Create(ProductDraft),
    Read(Option<RowSelector>),
    Update { id: i64, change: FieldUpdate },
    Delete { id: i64 },
    Filter(Predicate),
    /// Sort is the one action whose flat form may carry the direction in
    /// `value` ("desc"/"descending"/"reverse"). It is lifted into
    /// `direction` here.
    Sort { field: Field, direction: Direction },
    Replicate { id: i64 },
    Stats,
}

impl Operation {
    pub fn action(&self) -> Action {
        match self {
            Self::Create(_) => Action::Create,
            Self::Read(_) => Action::Read,
            Self::Update { .. } => Action::Update,
            Self::Delete { .. } => Action::Delete,
            Self::Filter(_) => Action::Filter,
            Self::Sort { .. } => Action::Sort,
            Self::Replicate { .. } => Action::Replicate,
            Self::Stats => Action::Stats,
        }
    }

    /// Default human-readable summary, used when the caller gave none.
    pub fn describe(&self) -> String {
        match self {
            Self::Create(draft) => format!("Create product {}", draft.name),
            Self::Read(None) => "Read all products".to_string(),
            Self::Read(Some(RowSelector::One(id))) => format!("Read product {id}"),
            Self::Read(Some(RowSelector::Many(ids))) => {
                let ids: Vec<String> = ids.iter().map(i64::to_string).collect();
                format!("Read products {}", ids.join(", "))
            }
            Self::Update { id, change } => {
                format!("Update product {id}: set {} to {change}", change.field())
            }
            Self::Delete { id } => format!("Delete product {id}"),
            Self::Filter(p) => {
                format!("Filter products where {} {} {}", p.field, p.operator, p.value)
            }
            Self::Sort { field, direction } => {
                let order = match direction {
                    Direction::Asc => "ascending",
                    Direction::Desc => "descending",
                };
                format!("Sort products by {field} ({order})")
            }
            Self::Replicate { id } => format!("Replicate product {id}"),
            Self::Stats => "Show inventory statistics".to_string(),
        }
    }
}

/// A validated command plus its human-readable summary.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub operation: Operation,
    pub message: String,
}

impl Command {
    /// Wrap an operation, generating the default summary.
    pub fn new(operation: Operation) -> Self {
        let message = operation.describe();
        Self { operation, message }
    }

    pub fn action(&self) -> Action {
        self.operation.action()
    }

    /// Canonical flat form. Sort direction goes in `direction`, never `value`.
    pub fn to_raw(&self) -> RawCommand {
        let mut raw = RawCommand {
            action: Some(self.action().as_str().to_string()),
            message: Some(self.message.clone()),
            ..RawCommand::default()
        };

        match &self.operation {
            Operation::Create(draft) => {
                raw.value = serde_json::to_value(draft).ok();
            }
            Operation::Read(selector) => {
                raw.row = selector.as_ref().map(|s| match s {
                    RowSelector::One(id) => Value::from(*id),
                    RowSelector::Many(ids) => Value::from(ids.clone()),
                });
            }
            Operation::Update { id, change } => {
                raw.row = Some(Value::from(*id));
                raw.field = Some(change.field().as_str().to_string());
                raw.value = Some(change.to_value());
            }
            Operation::Delete { id } | Operation::Replicate { id } => {
                raw.row = Some(Value::from(*id));
            }
            Operation::Filter(p) => {
                raw.field = Some(p.field.as_str().to_string());
                raw.operator = Some(p.operator.as_str().to_string());
                raw.value = Some(p.value.to_value());
            }
            Operation::Sort { field, direction } => {
                raw.field = Some(field.as_str().to_string());
                raw.direction = Some(direction.as_str().to_string());
            }
            Operation::Stats => {}
        }

        raw
    }
}

// ============================================================================
// Flat wire form
// ============================================================================

/// The untrusted flat shape shared by the language model and typed callers.
///
/// Every field is optional here; [`validate`] decides what each action needs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCommand {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl RawCommand {
    pub fn new(action: Action) -> Self {
        Self {
            action: Some(action.as_str().to_string()),
            ..Self::default()
        }
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Validate a flat command into a typed [`Command`].
///
/// Pure. The first violated rule is returned; nothing is coerced silently
/// except the documented cases: case-insensitive names, numeric strings for
/// numeric columns, and the sort direction flag.
pub fn validate(raw: &RawCommand) -> Result<Command, SchemaError> {
    let action: Action = raw
        .action
        .as_deref()
        .filter(|a| !a.trim().is_empty())
        .ok_or(SchemaError::MissingAction)?
        .parse()?;

    let row = parse_row(raw.row.as_ref())?;
    let field = raw.field.as_deref().map(str::parse::<Field>).transpose()?;
    let operator = raw
        .operator
        .as_deref()
        .map(str::parse::<Operator>)
        .transpose()?;
    let value = raw.value.as_ref().filter(|v| !v.is_null());

    let operation = match action {
        Action::Create => {
            reject(action, "row", row.is_some())?;
            reject(action, "field", field.is_some())?;
            reject(action, "operator", operator.is_some())?;
            let payload = require(action, "value", value)?;
            Operation::Create(parse_draft(payload)?)
        }
        Action::Read => Operation::Read(row),
        Action::Update => {
            let id = single_row(action, row)?;
            let field = require(action, "field", field)?;
            let value = require(action, "value", value)?;
            Operation::Update {
                id,
                change: parse_update(field, value)?,
            }
        }
        Action::Delete => Operation::Delete {
            id: single_row(action, row)?,
        },
        Action::Filter => {
            let field = require(action, "field", field)?;
            let operator = require(action, "operator", operator)?;
            let value = require(action, "value", value)?;
            Operation::Filter(parse_predicate(field, operator, value)?)
        }
        Action::Sort => {
            let field = require(action, "field", field)?;
            let direction = match raw.direction.as_deref() {
                Some(d) if !d.trim().is_empty() => d.parse()?,
                _ => Direction::from_value_flag(value),
            };
            Operation::Sort { field, direction }
        }
        Action::Replicate => Operation::Replicate {
            id: single_row(action, row)?,
        },
        Action::Stats => {
            reject(action, "row", row.is_some())?;
            reject(action, "field", field.is_some())?;
            reject(action, "operator", operator.is_some())?;
            reject(action, "value", value.is_some())?;
            Operation::Stats
        }
    };

    let message = raw
        .message
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| operation.describe());

    Ok(Command { operation, message })
}

fn require<T>(action: Action, argument: &'static str, value: Option<T>) -> Result<T, SchemaError> {
    value.ok_or(SchemaError::MissingArgument { action, argument })
}

fn reject(action: Action, argument: &'static str, present: bool) -> Result<(), SchemaError> {
    if present {
        Err(SchemaError::UnexpectedArgument { action, argument })
    } else {
        Ok(())
    }
}

fn single_row(action: Action, row: Option<RowSelector>) -> Result<i64, SchemaError> {
    match require(action, "row", row)? {
        RowSelector::One(id) => Ok(id),
        RowSelector::Many(_) => Err(SchemaError::RowListNotAllowed(action)),
    }
}

fn parse_row(value: Option<&Value>) -> Result<Option<RowSelector>, SchemaError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => {
            if items.is_empty() {
                return Err(SchemaError::EmptyRowList);
            }
            let ids = items
                .iter()
                .map(parse_row_id)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Some(RowSelector::Many(ids)))
        }
        Some(other) => parse_row_id(other).map(|id| Some(RowSelector::One(id))),
    }
}

fn parse_row_id(value: &Value) -> Result<i64, SchemaError> {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(id) if id > 0 => Ok(id),
            _ => Err(SchemaError::InvalidRow(format!(
                "{n} is not a positive integer"
            ))),
        },
        Value::String(s) => Err(SchemaError::InvalidRow(format!("got string \"{s}\""))),
        other => Err(SchemaError::InvalidRow(format!("got {other}"))),
    }
}

fn parse_draft(value: &Value) -> Result<ProductDraft, SchemaError> {
    let obj = value.as_object().ok_or_else(|| {
        SchemaError::InvalidPayload(
            "must be an object with name, category, color, quantity and price".into(),
        )
    })?;
    let get = |key: &str| {
        obj.get(key)
            .filter(|v| !v.is_null())
            .ok_or_else(|| SchemaError::InvalidPayload(format!("is missing {key}")))
    };

    let name = text_from(get("name")?)
        .ok_or_else(|| SchemaError::InvalidPayload("name must be a non-empty string".into()))?;
    let category = get("category")?
        .as_str()
        .ok_or_else(|| SchemaError::InvalidPayload("category must be a string".into()))?
        .parse::<Category>()?;
    let color = text_from(get("color")?)
        .ok_or_else(|| SchemaError::InvalidPayload("color must be a non-empty string".into()))?;
    let quantity = integer_from(get("quantity")?)
        .filter(|q| *q >= 0)
        .ok_or_else(|| {
            SchemaError::InvalidPayload("quantity must be a non-negative integer".into())
        })?;
    let price = real_from(get("price")?)
        .filter(|p| *p >= 0.0)
        .ok_or_else(|| SchemaError::InvalidPayload("price must be a non-negative number".into()))?;

    Ok(ProductDraft {
        name,
        category,
        color,
        quantity,
        price,
    })
}

fn parse_update(field: Field, value: &Value) -> Result<FieldUpdate, SchemaError> {
    let invalid = |reason: &str| SchemaError::InvalidValue {
        field,
        reason: format!("{reason}, got {value}"),
    };

    match field {
        Field::Id => Err(SchemaError::ImmutableField(field)),
        Field::Name => text_from(value)
            .map(FieldUpdate::Name)
            .ok_or_else(|| invalid("expected a non-empty string")),
        Field::Color => text_from(value)
            .map(FieldUpdate::Color)
            .ok_or_else(|| invalid("expected a non-empty string")),
        Field::Category => {
            let name = value
                .as_str()
                .ok_or_else(|| invalid("expected a category name"))?;
            Ok(FieldUpdate::Category(name.parse()?))
        }
        Field::Quantity => integer_from(value)
            .filter(|q| *q >= 0)
            .map(FieldUpdate::Quantity)
            .ok_or_else(|| invalid("expected a non-negative integer")),
        Field::Price => real_from(value)
            .filter(|p| *p >= 0.0)
            .map(FieldUpdate::Price)
            .ok_or_else(|| invalid("expected a non-negative number")),
    }
}

fn parse_predicate(
    field: Field,
    operator: Operator,
    value: &Value,
) -> Result<Predicate, SchemaError> {
    let invalid = |reason: &str| SchemaError::InvalidValue {
        field,
        reason: format!("{reason}, got {value}"),
    };

    let value = if operator == Operator::Like {
        FilterValue::Text(text_from(value).ok_or_else(|| invalid("expected a search term"))?)
    } else if field.is_numeric() {
        FilterValue::Number(real_from(value).ok_or_else(|| invalid("expected a number"))?)
    } else if field == Field::Category {
        let name = value
            .as_str()
            .ok_or_else(|| invalid("expected a category name"))?;
        FilterValue::Text(name.parse::<Category>()?.as_str().to_string())
    } else {
        FilterValue::Text(text_from(value).ok_or_else(|| invalid("expected a string"))?)
    };

    Ok(Predicate {
        field,
        operator,
        value,
    })
}

// ============================================================================
// Value helpers
// ============================================================================

fn text_from(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn integer_from(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn real_from(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_start_matches('$').parse().ok(),
        _ => None,
    };
    parsed.filter(|f| f.is_finite())
}

/// JSON number, integral when the float has no fractional part.
fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawCommand {
        serde_json::from_value(value).unwrap()
    }

    fn check(value: Value) -> Result<Command, SchemaError> {
        validate(&raw(value))
    }

    // --- vocabulary ---

    #[test]
    fn test_action_parse_case_insensitive() {
        assert_eq!("READ".parse::<Action>().unwrap(), Action::Read);
        assert_eq!(" replicate ".parse::<Action>().unwrap(), Action::Replicate);
    }

    #[test]
    fn test_unknown_action_is_unsupported() {
        let err = check(json!({"action": "drop_table"})).unwrap_err();
        assert_eq!(err, SchemaError::UnsupportedAction("drop_table".into()));
        assert_eq!(err.to_string(), "Unsupported action: drop_table");
    }

    #[test]
    fn test_missing_action() {
        assert_eq!(check(json!({"row": 1})).unwrap_err(), SchemaError::MissingAction);
        assert_eq!(
            check(json!({"action": "  "})).unwrap_err(),
            SchemaError::MissingAction
        );
    }

    #[test]
    fn test_operator_aliases() {
        assert_eq!("==".parse::<Operator>().unwrap(), Operator::Eq);
        assert_eq!("<>".parse::<Operator>().unwrap(), Operator::Ne);
        assert_eq!("like".parse::<Operator>().unwrap(), Operator::Like);
        assert!("~".parse::<Operator>().is_err());
    }

    #[test]
    fn test_category_canonicalized() {
        assert_eq!("furniture".parse::<Category>().unwrap(), Category::Furniture);
        assert_eq!(Category::Kitchen.to_string(), "Kitchen");
        assert!("Garden".parse::<Category>().is_err());
    }

    // --- create ---

    #[test]
    fn test_create_valid() {
        let cmd = check(json!({
            "action": "create",
            "value": {"name": "iPhone 13", "category": "Electronics", "color": "Blue", "quantity": 5, "price": 999}
        }))
        .unwrap();
        assert_eq!(
            cmd.operation,
            Operation::Create(ProductDraft {
                name: "iPhone 13".into(),
                category: Category::Electronics,
                color: "Blue".into(),
                quantity: 5,
                price: 999.0,
            })
        );
        assert_eq!(cmd.message, "Create product iPhone 13");
    }

    #[test]
    fn test_create_accepts_numeric_strings() {
        let cmd = check(json!({
            "action": "create",
            "value": {"name": "Desk", "category": "furniture", "color": "oak", "quantity": "3", "price": "$120.50"}
        }))
        .unwrap();
        match cmd.operation {
            Operation::Create(d) => {
                assert_eq!(d.category, Category::Furniture);
                assert_eq!(d.quantity, 3);
                assert_eq!(d.price, 120.5);
            }
            other => panic!("expected create, got {other:?}"),
        }
    }

    #[test]
    fn test_create_rejects_row_field_operator() {
        let payload = json!({"name": "A", "category": "Toys", "color": "red", "quantity": 1, "price": 2});
        let err = check(json!({"action": "create", "row": 1, "value": payload})).unwrap_err();
        assert_eq!(err.to_string(), "create does not accept row");
        let err = check(json!({"action": "create", "field": "name", "value": payload})).unwrap_err();
        assert_eq!(err.to_string(), "create does not accept field");
        let err =
            check(json!({"action": "create", "operator": "=", "value": payload})).unwrap_err();
        assert_eq!(err.to_string(), "create does not accept operator");
    }

    #[test]
    fn test_create_payload_missing_field() {
        let err = check(json!({
            "action": "create",
            "value": {"name": "A", "category": "Toys", "color": "red", "quantity": 1}
        }))
        .unwrap_err();
        assert_eq!(err.to_string(), "create payload is missing price");
    }

    #[test]
    fn test_create_payload_bad_category() {
        let err = check(json!({
            "action": "create",
            "value": {"name": "A", "category": "Garden", "color": "red", "quantity": 1, "price": 1}
        }))
        .unwrap_err();
        assert_eq!(err, SchemaError::UnknownCategory("Garden".into()));
    }

    #[test]
    fn test_create_payload_negative_quantity() {
        let err = check(json!({
            "action": "create",
            "value": {"name": "A", "category": "Toys", "color": "red", "quantity": -1, "price": 1}
        }))
        .unwrap_err();
        assert!(err.to_string().contains("quantity must be a non-negative integer"));
    }

    #[test]
    fn test_create_requires_object_value() {
        let err = check(json!({"action": "create", "value": "iPhone"})).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidPayload(_)));
        let err = check(json!({"action": "create"})).unwrap_err();
        assert_eq!(err.to_string(), "create requires value");
    }

    // --- row ---

    #[test]
    fn test_read_all_one_many() {
        assert_eq!(
            check(json!({"action": "read"})).unwrap().operation,
            Operation::Read(None)
        );
        assert_eq!(
            check(json!({"action": "read", "row": 4})).unwrap().operation,
            Operation::Read(Some(RowSelector::One(4)))
        );
        assert_eq!(
            check(json!({"action": "read", "row": [3, 19, 20]}))
                .unwrap()
                .operation,
            Operation::Read(Some(RowSelector::Many(vec![3, 19, 20])))
        );
    }

    #[test]
    fn test_row_never_string() {
        let err = check(json!({"action": "read", "row": "3"})).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidRow(_)));
        let err = check(json!({"action": "read", "row": [1, "2"]})).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidRow(_)));
    }

    #[test]
    fn test_row_rejects_fraction_and_negative() {
        assert!(check(json!({"action": "delete", "row": 2.5})).is_err());
        assert!(check(json!({"action": "delete", "row": -1})).is_err());
        assert!(check(json!({"action": "delete", "row": 0})).is_err());
    }

    #[test]
    fn test_empty_row_list() {
        assert_eq!(
            check(json!({"action": "read", "row": []})).unwrap_err(),
            SchemaError::EmptyRowList
        );
    }

    #[test]
    fn test_delete_and_replicate_need_single_row() {
        assert_eq!(
            check(json!({"action": "delete"})).unwrap_err().to_string(),
            "delete requires row"
        );
        assert_eq!(
            check(json!({"action": "replicate", "row": [1, 2]})).unwrap_err(),
            SchemaError::RowListNotAllowed(Action::Replicate)
        );
        assert_eq!(
            check(json!({"action": "replicate", "row": 3}))
                .unwrap()
                .operation,
            Operation::Replicate { id: 3 }
        );
    }

    // --- update ---

    #[test]
    fn test_update_valid() {
        let cmd = check(json!({"action": "update", "row": 7, "field": "price", "value": 49.99}))
            .unwrap();
        assert_eq!(
            cmd.operation,
            Operation::Update {
                id: 7,
                change: FieldUpdate::Price(49.99)
            }
        );
        assert_eq!(cmd.message, "Update product 7: set price to 49.99");
    }

    #[test]
    fn test_update_requires_all_arguments() {
        assert_eq!(
            check(json!({"action": "update", "field": "name", "value": "x"}))
                .unwrap_err()
                .to_string(),
            "update requires row"
        );
        assert_eq!(
            check(json!({"action": "update", "row": 1, "value": "x"}))
                .unwrap_err()
                .to_string(),
            "update requires field"
        );
        assert_eq!(
            check(json!({"action": "update", "row": 1, "field": "name"}))
                .unwrap_err()
                .to_string(),
            "update requires value"
        );
    }

    #[test]
    fn test_update_id_is_immutable() {
        assert_eq!(
            check(json!({"action": "update", "row": 1, "field": "id", "value": 9})).unwrap_err(),
            SchemaError::ImmutableField(Field::Id)
        );
    }

    #[test]
    fn test_update_unknown_field() {
        let err = check(json!({"action": "update", "row": 1, "field": "price; DROP TABLE products", "value": 1}))
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownField(_)));
    }

    #[test]
    fn test_update_typed_values() {
        let cmd = check(json!({"action": "update", "row": 1, "field": "Category", "value": "toys"}))
            .unwrap();
        assert_eq!(
            cmd.operation,
            Operation::Update {
                id: 1,
                change: FieldUpdate::Category(Category::Toys)
            }
        );
        assert!(check(json!({"action": "update", "row": 1, "field": "quantity", "value": "lots"})).is_err());
        assert!(check(json!({"action": "update", "row": 1, "field": "quantity", "value": 1.5})).is_err());
        assert!(check(json!({"action": "update", "row": 1, "field": "name", "value": "  "})).is_err());
    }

    // --- filter ---

    #[test]
    fn test_filter_requires_operator() {
        let err = check(json!({"action": "filter", "field": "price", "value": 100})).unwrap_err();
        assert_eq!(err.to_string(), "filter requires operator");
    }

    #[test]
    fn test_filter_numeric_value() {
        let cmd = check(json!({"action": "filter", "field": "price", "operator": ">", "value": "100"}))
            .unwrap();
        assert_eq!(
            cmd.operation,
            Operation::Filter(Predicate {
                field: Field::Price,
                operator: Operator::Gt,
                value: FilterValue::Number(100.0),
            })
        );
        assert!(
            check(json!({"action": "filter", "field": "price", "operator": ">", "value": "cheap"}))
                .is_err()
        );
    }

    #[test]
    fn test_filter_category_canonicalized() {
        let cmd = check(json!({"action": "filter", "field": "category", "operator": "=", "value": "furniture"}))
            .unwrap();
        assert_eq!(
            cmd.operation,
            Operation::Filter(Predicate {
                field: Field::Category,
                operator: Operator::Eq,
                value: FilterValue::Text("Furniture".into()),
            })
        );
    }

    #[test]
    fn test_filter_like_takes_text() {
        let cmd = check(json!({"action": "filter", "field": "name", "operator": "LIKE", "value": "lamp"}))
            .unwrap();
        assert_eq!(
            cmd.operation,
            Operation::Filter(Predicate {
                field: Field::Name,
                operator: Operator::Like,
                value: FilterValue::Text("lamp".into()),
            })
        );
    }

    // --- sort ---

    #[test]
    fn test_sort_default_ascending() {
        let cmd = check(json!({"action": "sort", "field": "price"})).unwrap();
        assert_eq!(
            cmd.operation,
            Operation::Sort {
                field: Field::Price,
                direction: Direction::Asc
            }
        );
    }

    #[test]
    fn test_sort_value_flag_overload() {
        for flag in ["desc", "Descending", "REVERSE"] {
            let cmd = check(json!({"action": "sort", "field": "name", "value": flag})).unwrap();
            assert_eq!(
                cmd.operation,
                Operation::Sort {
                    field: Field::Name,
                    direction: Direction::Desc
                },
                "flag {flag}"
            );
        }
        let cmd = check(json!({"action": "sort", "field": "name", "value": "upwards"})).unwrap();
        assert!(matches!(
            cmd.operation,
            Operation::Sort {
                direction: Direction::Asc,
                ..
            }
        ));
    }

    #[test]
    fn test_sort_direction_field_wins() {
        let cmd =
            check(json!({"action": "sort", "field": "price", "direction": "desc", "value": "asc"}))
                .unwrap();
        assert!(matches!(
            cmd.operation,
            Operation::Sort {
                direction: Direction::Desc,
                ..
            }
        ));
        assert_eq!(
            check(json!({"action": "sort", "field": "price", "direction": "sideways"})).unwrap_err(),
            SchemaError::InvalidDirection("sideways".into())
        );
    }

    #[test]
    fn test_sort_requires_field() {
        assert_eq!(
            check(json!({"action": "sort", "value": "desc"}))
                .unwrap_err()
                .to_string(),
            "sort requires field"
        );
    }

    // --- stats ---

    #[test]
    fn test_stats_takes_no_arguments() {
        assert_eq!(
            check(json!({"action": "stats"})).unwrap().operation,
            Operation::Stats
        );
        assert_eq!(
            check(json!({"action": "stats", "value": "all"}))
                .unwrap_err()
                .to_string(),
            "stats does not accept value"
        );
        assert!(check(json!({"action": "stats", "row": 1})).is_err());
        assert!(check(json!({"action": "stats", "field": "price"})).is_err());
    }

    // --- message ---

    #[test]
    fn test_message_kept_or_generated() {
        let cmd = check(json!({"action": "delete", "row": 2, "message": "Deleting product 2"}))
            .unwrap();
        assert_eq!(cmd.message, "Deleting product 2");
        let cmd = check(json!({"action": "delete", "row": 2, "message": ""})).unwrap();
        assert_eq!(cmd.message, "Delete product 2");
    }

    // --- to_raw ---

    #[test]
    fn test_to_raw_sort_uses_direction_field() {
        let cmd = check(json!({"action": "sort", "field": "price", "value": "desc"})).unwrap();
        let raw = cmd.to_raw();
        assert_eq!(raw.direction.as_deref(), Some("desc"));
        assert!(raw.value.is_none());
        assert_eq!(validate(&raw).unwrap().operation, cmd.operation);
    }

    #[test]
    fn test_to_raw_serializes_flat() {
        let cmd = check(json!({"action": "update", "row": 3, "field": "quantity", "value": 12}))
            .unwrap();
        let value = serde_json::to_value(cmd.to_raw()).unwrap();
        assert_eq!(
            value,
            json!({
                "action": "update",
                "row": 3,
                "field": "quantity",
                "value": 12,
                "message": "Update product 3: set quantity to 12"
            })
        );
    }
}
