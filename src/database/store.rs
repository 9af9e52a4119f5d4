use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use super::filter::Filter;
use super::manager::DatabaseError;
use super::schema::{Row, SchemaError, Table};

/// Credential scope a query runs under. Produced once per request by the
/// access gate and handed to every store call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Executor {
    /// API-key caller: full access, but only inside one workspace
    Service { workspace_id: Uuid },
    /// Signed-in user: subject to the membership policy
    Session { user_id: Uuid },
}

impl Executor {
    pub fn service(workspace_id: Uuid) -> Self {
        Executor::Service { workspace_id }
    }

    pub fn session(user_id: Uuid) -> Self {
        Executor::Session { user_id }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Query on {0} is missing a ws_id condition")]
    Unscoped(&'static str),

    #[error("Service credential for workspace {bound} cannot access {target}")]
    Forbidden { bound: Uuid, target: String },

    #[error("Row-level policy rejected {operation} on {table}")]
    PolicyViolation { table: &'static str, operation: &'static str },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(DatabaseError::Sqlx(err))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of an upsert-then-prune pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub upserted: u64,
    pub deleted: u64,
}

/// How a store must restrict an operation for the current executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Policy {
    Unrestricted,
    /// Only rows in workspaces the user belongs to
    MemberOf(Uuid),
}

/// Resolve the policy for a read or filtered delete
pub fn filter_policy(executor: &Executor, table: Table, filter: &Filter) -> StoreResult<Policy> {
    if !table.is_workspace_scoped() {
        return match executor {
            Executor::Service { workspace_id } => Err(StoreError::Forbidden {
                bound: *workspace_id,
                target: table.name().to_string(),
            }),
            Executor::Session { .. } => Ok(Policy::Unrestricted),
        };
    }

    let target = filter.workspace_id().ok_or(StoreError::Unscoped(table.name()))?;
    scoped_policy(executor, &[target])
}

/// Resolve the policy for a batch of rows about to be written
pub fn write_policy(executor: &Executor, table: Table, rows: &[Row]) -> StoreResult<(Policy, BTreeSet<Uuid>)> {
    if !table.is_workspace_scoped() {
        return match executor {
            Executor::Service { workspace_id } => Err(StoreError::Forbidden {
                bound: *workspace_id,
                target: table.name().to_string(),
            }),
            Executor::Session { .. } => Err(StoreError::PolicyViolation { table: table.name(), operation: "write" }),
        };
    }

    let workspaces = rows
        .iter()
        .map(|row| {
            row.get(Table::WORKSPACE_COLUMN)
                .and_then(Value::as_str)
                .and_then(|s| Uuid::parse_str(s).ok())
                .ok_or(StoreError::Unscoped(table.name()))
        })
        .collect::<StoreResult<BTreeSet<Uuid>>>()?;

    let targets: Vec<Uuid> = workspaces.iter().copied().collect();
    Ok((scoped_policy(executor, &targets)?, workspaces))
}

fn scoped_policy(executor: &Executor, targets: &[Uuid]) -> StoreResult<Policy> {
    match executor {
        Executor::Service { workspace_id } => {
            if let Some(other) = targets.iter().find(|t| *t != workspace_id) {
                return Err(StoreError::Forbidden { bound: *workspace_id, target: other.to_string() });
            }
            Ok(Policy::Unrestricted)
        }
        Executor::Session { user_id } => Ok(Policy::MemberOf(*user_id)),
    }
}

/// The persisted store. Every scoped call must carry a ws_id filter; the
/// store enforces the executor's policy, callers do not.
#[async_trait]
pub trait Store: Send + Sync {
    async fn select(&self, executor: &Executor, table: Table, filter: Filter) -> StoreResult<Vec<Row>>;

    async fn count(&self, executor: &Executor, table: Table, filter: Filter) -> StoreResult<i64>;

    /// Insert or update by primary key. Only columns present in the rows are written.
    async fn upsert(&self, executor: &Executor, table: Table, rows: Vec<Row>) -> StoreResult<u64>;

    async fn delete(&self, executor: &Executor, table: Table, filter: Filter) -> StoreResult<u64>;

    /// Make the rows matched by `scope` equal to `rows`: upsert all of them,
    /// then delete everything in scope whose id was not supplied.
    ///
    /// The default runs the two steps back to back with no isolation;
    /// stores that can should override it with a single transaction.
    async fn reconcile(&self, executor: &Executor, table: Table, scope: Filter, rows: Vec<Row>) -> StoreResult<ReconcileReport> {
        let keep = row_ids(&rows);
        let upserted = self.upsert(executor, table, rows).await?;
        let deleted = self.delete(executor, table, scope.not_in("id", keep)).await?;
        Ok(ReconcileReport { upserted, deleted })
    }

    async fn ping(&self) -> StoreResult<()>;
}

pub(crate) fn row_ids(rows: &[Row]) -> Vec<Value> {
    rows.iter().filter_map(|row| row.get("id").cloned()).collect()
}
