use chrono::{DateTime, NaiveDate};
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

/// A single row as it travels between the API and the store
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("Unknown column '{column}' on {table}")]
    UnknownColumn { table: &'static str, column: String },

    #[error("Column '{column}' on {table} expects {expected}")]
    TypeMismatch {
        table: &'static str,
        column: String,
        expected: &'static str,
    },

    #[error("Column '{column}' on {table} cannot be null")]
    NullNotAllowed { table: &'static str, column: String },

    #[error("Column '{column}' on {table} is required")]
    MissingColumn { table: &'static str, column: String },
}

/// Semantic type of a column, used for validation and for SQL casts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Uuid,
    Text,
    Integer,
    Float,
    Boolean,
    Date,
    Timestamp,
    Json,
}

impl ColumnType {
    pub fn pg_type(self) -> &'static str {
        match self {
            ColumnType::Uuid => "uuid",
            ColumnType::Text => "text",
            ColumnType::Integer => "bigint",
            ColumnType::Float => "double precision",
            ColumnType::Boolean => "boolean",
            ColumnType::Date => "date",
            ColumnType::Timestamp => "timestamptz",
            ColumnType::Json => "jsonb",
        }
    }

    fn describe(self) -> &'static str {
        match self {
            ColumnType::Uuid => "a UUID string",
            ColumnType::Text => "a string",
            ColumnType::Integer => "an integer",
            ColumnType::Float => "a number",
            ColumnType::Boolean => "a boolean",
            ColumnType::Date => "a YYYY-MM-DD date",
            ColumnType::Timestamp => "an RFC 3339 timestamp",
            ColumnType::Json => "JSON",
        }
    }

    /// Check a non-null value and return its canonical form
    fn canonicalize(self, value: &Value) -> Option<Value> {
        match (self, value) {
            (ColumnType::Uuid, Value::String(s)) => {
                Uuid::parse_str(s).ok().map(|u| Value::String(u.to_string()))
            }
            (ColumnType::Text, Value::String(_)) => Some(value.clone()),
            (ColumnType::Integer, Value::Number(n)) if n.is_i64() || n.is_u64() => Some(value.clone()),
            (ColumnType::Float, Value::Number(_)) => Some(value.clone()),
            (ColumnType::Boolean, Value::Bool(_)) => Some(value.clone()),
            (ColumnType::Date, Value::String(s)) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .map(|_| value.clone()),
            (ColumnType::Timestamp, Value::String(s)) => {
                DateTime::parse_from_rfc3339(s).ok().map(|_| value.clone())
            }
            (ColumnType::Json, _) => Some(value.clone()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
    /// Filled in by the store when an insert omits it
    pub has_default: bool,
}

const fn col(name: &'static str, ty: ColumnType) -> Column {
    Column { name, ty, nullable: false, has_default: false }
}

const fn opt(name: &'static str, ty: ColumnType) -> Column {
    Column { name, ty, nullable: true, has_default: false }
}

const fn created_at() -> Column {
    Column { name: "created_at", ty: ColumnType::Timestamp, nullable: false, has_default: true }
}

const USERS: &[Column] = &[
    col("id", ColumnType::Uuid),
    opt("display_name", ColumnType::Text),
    opt("handle", ColumnType::Text),
    opt("email", ColumnType::Text),
    opt("avatar_url", ColumnType::Text),
    opt("birthday", ColumnType::Date),
    created_at(),
];

const WORKSPACE_MEMBERS: &[Column] = &[
    col("ws_id", ColumnType::Uuid),
    col("user_id", ColumnType::Uuid),
    Column { name: "role", ty: ColumnType::Text, nullable: false, has_default: true },
    created_at(),
];

const WORKSPACE_API_KEYS: &[Column] = &[
    col("id", ColumnType::Uuid),
    col("ws_id", ColumnType::Uuid),
    col("name", ColumnType::Text),
    col("value_hash", ColumnType::Text),
    created_at(),
];

const WORKSPACE_SECRETS: &[Column] = &[
    col("ws_id", ColumnType::Uuid),
    col("name", ColumnType::Text),
    col("value", ColumnType::Text),
];

const WORKSPACE_USERS: &[Column] = &[
    col("id", ColumnType::Uuid),
    col("ws_id", ColumnType::Uuid),
    opt("full_name", ColumnType::Text),
    opt("display_name", ColumnType::Text),
    opt("email", ColumnType::Text),
    opt("phone", ColumnType::Text),
    opt("gender", ColumnType::Text),
    opt("birthday", ColumnType::Date),
    opt("address", ColumnType::Text),
    opt("note", ColumnType::Text),
    opt("avatar_url", ColumnType::Text),
    created_at(),
];

const WORKSPACE_USER_GROUPS: &[Column] = &[
    col("id", ColumnType::Uuid),
    col("ws_id", ColumnType::Uuid),
    col("name", ColumnType::Text),
    created_at(),
];

const WORKSPACE_USER_GROUP_MEMBERS: &[Column] = &[
    col("ws_id", ColumnType::Uuid),
    col("group_id", ColumnType::Uuid),
    col("user_id", ColumnType::Uuid),
    created_at(),
];

const USER_GROUP_INDICATORS: &[Column] = &[
    col("ws_id", ColumnType::Uuid),
    col("group_id", ColumnType::Uuid),
    col("user_id", ColumnType::Uuid),
    col("indicator_id", ColumnType::Uuid),
    opt("value", ColumnType::Float),
    created_at(),
];

const INVENTORY_UNITS: &[Column] = &[
    col("id", ColumnType::Uuid),
    col("ws_id", ColumnType::Uuid),
    col("name", ColumnType::Text),
    created_at(),
];

/// Every table the store is allowed to touch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    Users,
    WorkspaceMembers,
    WorkspaceApiKeys,
    WorkspaceSecrets,
    WorkspaceUsers,
    WorkspaceUserGroups,
    WorkspaceUserGroupMembers,
    UserGroupIndicators,
    InventoryUnits,
}

impl Table {
    pub const WORKSPACE_COLUMN: &'static str = "ws_id";

    pub fn name(self) -> &'static str {
        match self {
            Table::Users => "users",
            Table::WorkspaceMembers => "workspace_members",
            Table::WorkspaceApiKeys => "workspace_api_keys",
            Table::WorkspaceSecrets => "workspace_secrets",
            Table::WorkspaceUsers => "workspace_users",
            Table::WorkspaceUserGroups => "workspace_user_groups",
            Table::WorkspaceUserGroupMembers => "workspace_user_groups_users",
            Table::UserGroupIndicators => "user_group_indicators",
            Table::InventoryUnits => "inventory_units",
        }
    }

    pub fn columns(self) -> &'static [Column] {
        match self {
            Table::Users => USERS,
            Table::WorkspaceMembers => WORKSPACE_MEMBERS,
            Table::WorkspaceApiKeys => WORKSPACE_API_KEYS,
            Table::WorkspaceSecrets => WORKSPACE_SECRETS,
            Table::WorkspaceUsers => WORKSPACE_USERS,
            Table::WorkspaceUserGroups => WORKSPACE_USER_GROUPS,
            Table::WorkspaceUserGroupMembers => WORKSPACE_USER_GROUP_MEMBERS,
            Table::UserGroupIndicators => USER_GROUP_INDICATORS,
            Table::InventoryUnits => INVENTORY_UNITS,
        }
    }

    pub fn primary_key(self) -> &'static [&'static str] {
        match self {
            Table::WorkspaceMembers => &["ws_id", "user_id"],
            Table::WorkspaceSecrets => &["ws_id", "name"],
            Table::WorkspaceUserGroupMembers => &["group_id", "user_id"],
            Table::UserGroupIndicators => &["group_id", "user_id", "indicator_id"],
            _ => &["id"],
        }
    }

    /// Scoped tables carry a ws_id and every query against them must filter on it
    pub fn is_workspace_scoped(self) -> bool {
        self.column(Self::WORKSPACE_COLUMN).is_some()
    }

    pub fn column(self, name: &str) -> Option<&'static Column> {
        self.columns().iter().find(|c| c.name == name)
    }

    pub fn require_column(self, name: &str) -> Result<&'static Column, SchemaError> {
        self.column(name).ok_or_else(|| SchemaError::UnknownColumn {
            table: self.name(),
            column: name.to_string(),
        })
    }

    /// Validate a single value for a column and return its canonical form
    pub fn normalize_value(self, column: &str, value: &Value) -> Result<Value, SchemaError> {
        let col = self.require_column(column)?;
        if value.is_null() {
            return if col.nullable {
                Ok(Value::Null)
            } else {
                Err(SchemaError::NullNotAllowed { table: self.name(), column: column.to_string() })
            };
        }
        col.ty.canonicalize(value).ok_or_else(|| SchemaError::TypeMismatch {
            table: self.name(),
            column: column.to_string(),
            expected: col.ty.describe(),
        })
    }

    /// Validate a row for writing. Unknown columns, type mismatches and
    /// missing primary key columns are rejected; UUIDs come back lowercased.
    pub fn normalize_row(self, row: &Row) -> Result<Row, SchemaError> {
        let mut out = Row::new();
        for (key, value) in row {
            out.insert(key.clone(), self.normalize_value(key, value)?);
        }
        for key in self.primary_key() {
            if !out.contains_key(*key) {
                return Err(SchemaError::MissingColumn { table: self.name(), column: key.to_string() });
            }
        }
        Ok(out)
    }

    /// Columns that must be present on insert
    pub fn required_columns(self) -> impl Iterator<Item = &'static Column> {
        self.columns().iter().filter(|c| !c.nullable && !c.has_default)
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
