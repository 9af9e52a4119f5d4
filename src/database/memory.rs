use std::collections::{BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::filter::Filter;
use super::schema::{ColumnType, Row, SchemaError, Table};
use super::store::{filter_policy, row_ids, write_policy, Executor, Policy, ReconcileReport, Store, StoreError, StoreResult};

/// A store call as observed by the in-memory store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreCall {
    pub operation: &'static str,
    pub table: Table,
}

#[derive(Default)]
struct Tables {
    rows: HashMap<Table, Vec<Row>>,
    calls: Vec<StoreCall>,
    failing: HashSet<Table>,
}

impl Tables {
    fn enter(&mut self, operation: &'static str, table: Table) -> StoreResult<()> {
        self.calls.push(StoreCall { operation, table });
        if self.failing.contains(&table) {
            return Err(StoreError::Unavailable(format!("{} is failing", table)));
        }
        Ok(())
    }

    fn is_member(&self, user_id: Uuid, workspace_id: Uuid) -> bool {
        let (user, ws) = (Value::String(user_id.to_string()), Value::String(workspace_id.to_string()));
        self.rows
            .get(&Table::WorkspaceMembers)
            .is_some_and(|rows| rows.iter().any(|r| r.get("user_id") == Some(&user) && r.get("ws_id") == Some(&ws)))
    }

    fn ensure_member(&self, table: Table, operation: &'static str, user_id: Uuid, workspaces: &BTreeSet<Uuid>) -> StoreResult<()> {
        if workspaces.iter().all(|ws| self.is_member(user_id, *ws)) {
            Ok(())
        } else {
            Err(StoreError::PolicyViolation { table: table.name(), operation })
        }
    }

    fn visible(&self, table: Table, filter: &Filter, policy: &Policy) -> Vec<Row> {
        if let Policy::MemberOf(user_id) = policy {
            if let Some(ws) = filter.workspace_id() {
                if !self.is_member(*user_id, ws) {
                    return Vec::new();
                }
            }
        }
        self.rows
            .get(&table)
            .map(|rows| rows.iter().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default()
    }

    fn upsert(&mut self, executor: &Executor, table: Table, rows: Vec<Row>) -> StoreResult<u64> {
        let rows = rows.iter().map(|r| table.normalize_row(r)).collect::<Result<Vec<_>, _>>()?;
        if rows.is_empty() {
            return Ok(0);
        }
        let (policy, workspaces) = write_policy(executor, table, &rows)?;
        if let Policy::MemberOf(user_id) = policy {
            self.ensure_member(table, "upsert", user_id, &workspaces)?;
        }

        // Applied to a copy so a failing row leaves the table untouched
        let pk = table.primary_key();
        let mut next = self.rows.get(&table).cloned().unwrap_or_default();
        let mut affected = 0;
        for row in rows {
            let existing = next.iter_mut().find(|s| pk.iter().all(|k| s.get(*k) == row.get(*k)));
            match existing {
                Some(current) => {
                    if table.is_workspace_scoped()
                        && current.get(Table::WORKSPACE_COLUMN) != row.get(Table::WORKSPACE_COLUMN)
                    {
                        tracing::warn!("Upsert on {} collides with a row in another workspace", table);
                        return Err(StoreError::PolicyViolation { table: table.name(), operation: "upsert" });
                    }
                    current.extend(row)
                }
                None => next.push(with_defaults(table, row)?),
            }
            affected += 1;
        }
        self.rows.insert(table, next);
        Ok(affected)
    }

    fn delete(&mut self, executor: &Executor, table: Table, filter: Filter) -> StoreResult<u64> {
        let filter = filter.normalize(table)?;
        let policy = filter_policy(executor, table, &filter)?;
        if let Policy::MemberOf(user_id) = policy {
            let workspaces = filter.workspace_id().into_iter().collect();
            self.ensure_member(table, "delete", user_id, &workspaces)?;
        }

        let Some(stored) = self.rows.get_mut(&table) else {
            return Ok(0);
        };
        let before = stored.len();
        stored.retain(|r| !filter.matches(r));
        Ok((before - stored.len()) as u64)
    }
}

fn with_defaults(table: Table, mut row: Row) -> StoreResult<Row> {
    for column in table.columns() {
        if row.contains_key(column.name) {
            continue;
        }
        if column.has_default && column.ty == ColumnType::Timestamp {
            row.insert(column.name.to_string(), Value::String(Utc::now().to_rfc3339()));
        } else if !column.nullable && !column.has_default {
            return Err(SchemaError::MissingColumn { table: table.name(), column: column.name.to_string() }.into());
        }
    }
    Ok(row)
}

/// Store kept entirely in process memory. Applies the same workspace and
/// membership policy as the Postgres store. Batches are all-or-nothing and
/// `reconcile` runs under a single write lock, restoring the table if the
/// prune fails. Records every call so tests can assert on traffic.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert fixture rows directly, bypassing policy and the call log
    pub async fn seed(&self, table: Table, rows: Vec<Row>) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        for row in rows {
            let row = with_defaults(table, table.normalize_row(&row)?)?;
            inner.rows.entry(table).or_default().push(row);
        }
        Ok(())
    }

    pub async fn rows(&self, table: Table) -> Vec<Row> {
        self.inner.read().await.rows.get(&table).cloned().unwrap_or_default()
    }

    pub async fn calls(&self) -> Vec<StoreCall> {
        self.inner.read().await.calls.clone()
    }

    /// Make every later call touching `table` fail as if the store were down
    pub async fn fail_table(&self, table: Table) {
        self.inner.write().await.failing.insert(table);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn select(&self, executor: &Executor, table: Table, filter: Filter) -> StoreResult<Vec<Row>> {
        let mut inner = self.inner.write().await;
        inner.enter("select", table)?;
        let filter = filter.normalize(table)?;
        let policy = filter_policy(executor, table, &filter)?;

        let mut rows = inner.visible(table, &filter, &policy);
        filter.apply_window(&mut rows);
        Ok(rows)
    }

    async fn count(&self, executor: &Executor, table: Table, filter: Filter) -> StoreResult<i64> {
        let mut inner = self.inner.write().await;
        inner.enter("count", table)?;
        let filter = filter.normalize(table)?;
        let policy = filter_policy(executor, table, &filter)?;
        Ok(inner.visible(table, &filter, &policy).len() as i64)
    }

    async fn upsert(&self, executor: &Executor, table: Table, rows: Vec<Row>) -> StoreResult<u64> {
        let mut inner = self.inner.write().await;
        inner.enter("upsert", table)?;
        inner.upsert(executor, table, rows)
    }

    async fn delete(&self, executor: &Executor, table: Table, filter: Filter) -> StoreResult<u64> {
        let mut inner = self.inner.write().await;
        inner.enter("delete", table)?;
        inner.delete(executor, table, filter)
    }

    async fn reconcile(&self, executor: &Executor, table: Table, scope: Filter, rows: Vec<Row>) -> StoreResult<ReconcileReport> {
        let mut inner = self.inner.write().await;
        inner.enter("reconcile", table)?;
        let keep = row_ids(&rows);
        let snapshot = inner.rows.get(&table).cloned();
        let upserted = inner.upsert(executor, table, rows)?;
        let deleted = match inner.delete(executor, table, scope.not_in("id", keep)) {
            Ok(deleted) => deleted,
            Err(e) => {
                match snapshot {
                    Some(rows) => inner.rows.insert(table, rows),
                    None => inner.rows.remove(&table),
                };
                return Err(e);
            }
        };
        Ok(ReconcileReport { upserted, deleted })
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(v: Value) -> Row {
        v.as_object().cloned().unwrap()
    }

    async fn store_with_member(ws: Uuid, user: Uuid) -> MemoryStore {
        let store = MemoryStore::new();
        store
            .seed(Table::WorkspaceMembers, vec![row(json!({ "ws_id": ws.to_string(), "user_id": user.to_string() }))])
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn session_reads_outside_membership_are_empty() {
        let ws = Uuid::new_v4();
        let other = Uuid::new_v4();
        let user = Uuid::new_v4();
        let store = store_with_member(ws, user).await;
        store
            .seed(
                Table::InventoryUnits,
                vec![
                    row(json!({ "id": Uuid::new_v4().to_string(), "ws_id": ws.to_string(), "name": "a" })),
                    row(json!({ "id": Uuid::new_v4().to_string(), "ws_id": other.to_string(), "name": "b" })),
                ],
            )
            .await
            .unwrap();

        let exec = Executor::session(user);
        assert_eq!(store.count(&exec, Table::InventoryUnits, Filter::workspace(ws)).await.unwrap(), 1);
        assert_eq!(store.count(&exec, Table::InventoryUnits, Filter::workspace(other)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn session_writes_outside_membership_are_rejected() {
        let user = Uuid::new_v4();
        let store = store_with_member(Uuid::new_v4(), user).await;
        let other = Uuid::new_v4();

        let err = store
            .upsert(
                &Executor::session(user),
                Table::InventoryUnits,
                vec![row(json!({ "id": Uuid::new_v4().to_string(), "ws_id": other.to_string(), "name": "x" }))],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::PolicyViolation { .. }));
        assert!(store.rows(Table::InventoryUnits).await.is_empty());
    }

    #[tokio::test]
    async fn upsert_merges_existing_rows() {
        let ws = Uuid::new_v4();
        let id = Uuid::new_v4().to_string();
        let store = MemoryStore::new();
        let exec = Executor::service(ws);

        store
            .upsert(&exec, Table::WorkspaceUsers, vec![row(json!({ "id": id, "ws_id": ws.to_string(), "full_name": "A", "email": "a@x" }))])
            .await
            .unwrap();
        store
            .upsert(&exec, Table::WorkspaceUsers, vec![row(json!({ "id": id, "ws_id": ws.to_string(), "full_name": "B" }))])
            .await
            .unwrap();

        let rows = store.rows(Table::WorkspaceUsers).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["full_name"], json!("B"));
        assert_eq!(rows[0]["email"], json!("a@x"));
        assert!(rows[0].contains_key("created_at"));
    }

    #[tokio::test]
    async fn upsert_cannot_move_rows_between_workspaces() {
        let (ws, other) = (Uuid::new_v4(), Uuid::new_v4());
        let id = Uuid::new_v4().to_string();
        let store = MemoryStore::new();
        store
            .seed(Table::WorkspaceUsers, vec![row(json!({ "id": id, "ws_id": other.to_string(), "full_name": "theirs" }))])
            .await
            .unwrap();

        let err = store
            .upsert(
                &Executor::service(ws),
                Table::WorkspaceUsers,
                vec![row(json!({ "id": id, "ws_id": ws.to_string(), "full_name": "mine" }))],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::PolicyViolation { .. }));

        let rows = store.rows(Table::WorkspaceUsers).await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["ws_id"], json!(other.to_string()));
        assert_eq!(rows[0]["full_name"], json!("theirs"));
    }

    #[tokio::test]
    async fn reconcile_with_a_foreign_id_changes_nothing() {
        let (ws, other) = (Uuid::new_v4(), Uuid::new_v4());
        let (mine, theirs) = (Uuid::new_v4().to_string(), Uuid::new_v4().to_string());
        let store = MemoryStore::new();
        store
            .seed(
                Table::WorkspaceUsers,
                vec![
                    row(json!({ "id": mine, "ws_id": ws.to_string(), "full_name": "mine" })),
                    row(json!({ "id": theirs, "ws_id": other.to_string(), "full_name": "theirs" })),
                ],
            )
            .await
            .unwrap();

        let err = store
            .reconcile(
                &Executor::service(ws),
                Table::WorkspaceUsers,
                Filter::workspace(ws),
                vec![row(json!({ "id": theirs, "ws_id": ws.to_string() }))],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::PolicyViolation { .. }));
        assert_eq!(store.rows(Table::WorkspaceUsers).await.len(), 2);
    }

    #[tokio::test]
    async fn failing_row_leaves_earlier_rows_unwritten() {
        let ws = Uuid::new_v4();
        let store = MemoryStore::new();
        let err = store
            .upsert(
                &Executor::service(ws),
                Table::InventoryUnits,
                vec![
                    row(json!({ "id": Uuid::new_v4().to_string(), "ws_id": ws.to_string(), "name": "ok" })),
                    row(json!({ "id": Uuid::new_v4().to_string(), "ws_id": ws.to_string() })),
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Schema(SchemaError::MissingColumn { .. })));
        assert!(store.rows(Table::InventoryUnits).await.is_empty());
    }

    #[tokio::test]
    async fn insert_without_required_columns_fails() {
        let ws = Uuid::new_v4();
        let err = MemoryStore::new()
            .upsert(
                &Executor::service(ws),
                Table::InventoryUnits,
                vec![row(json!({ "id": Uuid::new_v4().to_string(), "ws_id": ws.to_string() }))],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Schema(SchemaError::MissingColumn { .. })));
    }

    #[tokio::test]
    async fn failing_tables_report_unavailable_and_are_logged() {
        let store = MemoryStore::new();
        store.fail_table(Table::WorkspaceUsers).await;
        let ws = Uuid::new_v4();
        let err = store
            .select(&Executor::service(ws), Table::WorkspaceUsers, Filter::workspace(ws))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert_eq!(store.calls().await, vec![StoreCall { operation: "select", table: Table::WorkspaceUsers }]);
    }
}
