use std::cmp::Ordering;

use serde_json::Value;
use uuid::Uuid;

use super::schema::{Row, SchemaError, Table};

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(String, Value),
    In(String, Vec<Value>),
    NotIn(String, Vec<Value>),
    /// Case-insensitive substring match against any of the columns
    Search(Vec<String>, String),
}

/// Conjunction of conditions plus ordering and a row limit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub conditions: Vec<Condition>,
    pub order_by: Option<String>,
    pub limit: Option<i64>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a filter pinned to one workspace
    pub fn workspace(workspace_id: Uuid) -> Self {
        Self::new().eq(Table::WORKSPACE_COLUMN, workspace_id.to_string())
    }

    pub fn eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push(Condition::Eq(column.into(), value.into()));
        self
    }

    pub fn is_in<V: Into<Value>>(mut self, column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.conditions.push(Condition::In(column.into(), values));
        self
    }

    pub fn not_in<V: Into<Value>>(mut self, column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.conditions.push(Condition::NotIn(column.into(), values));
        self
    }

    pub fn search<C: Into<String>>(mut self, columns: impl IntoIterator<Item = C>, needle: impl Into<String>) -> Self {
        let columns = columns.into_iter().map(Into::into).collect();
        self.conditions.push(Condition::Search(columns, needle.into()));
        self
    }

    pub fn order_by(mut self, column: impl Into<String>) -> Self {
        self.order_by = Some(column.into());
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The workspace this filter is pinned to, if it has a ws_id equality
    pub fn workspace_id(&self) -> Option<Uuid> {
        self.conditions.iter().find_map(|c| match c {
            Condition::Eq(col, Value::String(s)) if col == Table::WORKSPACE_COLUMN => Uuid::parse_str(s).ok(),
            _ => None,
        })
    }

    /// Check column names against the table and canonicalize condition values
    pub fn normalize(self, table: Table) -> Result<Self, SchemaError> {
        let conditions = self
            .conditions
            .into_iter()
            .map(|condition| {
                Ok(match condition {
                    Condition::Eq(col, v) => {
                        let v = table.normalize_value(&col, &v)?;
                        Condition::Eq(col, v)
                    }
                    Condition::In(col, vs) => {
                        let vs = vs.iter().map(|v| table.normalize_value(&col, v)).collect::<Result<_, _>>()?;
                        Condition::In(col, vs)
                    }
                    Condition::NotIn(col, vs) => {
                        let vs = vs.iter().map(|v| table.normalize_value(&col, v)).collect::<Result<_, _>>()?;
                        Condition::NotIn(col, vs)
                    }
                    Condition::Search(cols, needle) => {
                        for col in &cols {
                            table.require_column(col)?;
                        }
                        Condition::Search(cols, needle)
                    }
                })
            })
            .collect::<Result<Vec<_>, SchemaError>>()?;

        if let Some(col) = &self.order_by {
            table.require_column(col)?;
        }

        Ok(Self { conditions, order_by: self.order_by, limit: self.limit })
    }

    /// Evaluate the conditions against an in-memory row
    pub fn matches(&self, row: &Row) -> bool {
        self.conditions.iter().all(|condition| match condition {
            Condition::Eq(col, Value::Null) => row.get(col).map_or(true, Value::is_null),
            Condition::Eq(col, v) => row.get(col) == Some(v),
            Condition::In(col, vs) => row.get(col).is_some_and(|cell| vs.contains(cell)),
            Condition::NotIn(col, vs) => row.get(col).map_or(true, |cell| !vs.contains(cell)),
            Condition::Search(cols, needle) => {
                let needle = needle.to_lowercase();
                cols.iter().any(|col| {
                    row.get(col)
                        .and_then(Value::as_str)
                        .is_some_and(|s| s.to_lowercase().contains(&needle))
                })
            }
        })
    }

    /// Sort and truncate rows the way the SQL store would
    pub fn apply_window(&self, rows: &mut Vec<Row>) {
        if let Some(col) = &self.order_by {
            rows.sort_by(|a, b| compare_cells(a.get(col), b.get(col)));
        }
        if let Some(limit) = self.limit {
            rows.truncate(limit.max(0) as usize);
        }
    }
}

fn compare_cells(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        // NULLS LAST
        (Some(Value::Null) | None, Some(Value::Null) | None) => Ordering::Equal,
        (Some(Value::Null) | None, _) => Ordering::Greater,
        (_, Some(Value::Null) | None) => Ordering::Less,
        _ => Ordering::Equal,
    }
}
