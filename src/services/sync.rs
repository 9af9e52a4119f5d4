//! Reconciling collection sync: after a successful call the workspace's
//! rows in the table are exactly the supplied records.

use std::collections::HashSet;

use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::database::{Executor, Filter, ReconcileReport, Row, SchemaError, Store, StoreError, Table};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Record {index}: {source}")]
    InvalidRecord {
        index: usize,
        #[source]
        source: SchemaError,
    },

    #[error("Record {index} belongs to workspace {found}, not {expected}")]
    ForeignWorkspace { index: usize, found: String, expected: Uuid },

    #[error("Duplicate id {0} in sync input")]
    DuplicateId(Uuid),

    #[error("{0} is not keyed by id and cannot be synced")]
    Unsupported(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Assign ids to new records, pin every record to the workspace and
/// validate it against the table schema.
pub fn prepare_records(table: Table, workspace_id: Uuid, records: Vec<Row>) -> Result<Vec<Row>, SyncError> {
    if table.primary_key() != ["id"].as_slice() || !table.is_workspace_scoped() {
        return Err(SyncError::Unsupported(table.name()));
    }

    let ws = Value::String(workspace_id.to_string());
    let mut seen = HashSet::with_capacity(records.len());
    let mut prepared = Vec::with_capacity(records.len());

    for (index, mut record) in records.into_iter().enumerate() {
        let invalid = |source| SyncError::InvalidRecord { index, source };

        let id = match record.get("id") {
            None | Some(Value::Null) => Uuid::new_v4(),
            Some(raw) => {
                let canonical = table.normalize_value("id", raw).map_err(invalid)?;
                canonical.as_str().and_then(|s| Uuid::parse_str(s).ok()).unwrap_or_else(Uuid::new_v4)
            }
        };
        if !seen.insert(id) {
            return Err(SyncError::DuplicateId(id));
        }
        record.insert("id".to_string(), Value::String(id.to_string()));

        if let Some(found) = record.get(Table::WORKSPACE_COLUMN) {
            let found = table.normalize_value(Table::WORKSPACE_COLUMN, found).map_err(invalid)?;
            if found != ws {
                return Err(SyncError::ForeignWorkspace { index, found: found.to_string(), expected: workspace_id });
            }
        }
        record.insert(Table::WORKSPACE_COLUMN.to_string(), ws.clone());

        prepared.push(table.normalize_row(&record).map_err(invalid)?);
    }

    Ok(prepared)
}

/// Upsert the records and prune everything else in the workspace
pub async fn sync_collection(
    store: &dyn Store,
    executor: &Executor,
    table: Table,
    workspace_id: Uuid,
    records: Vec<Row>,
) -> Result<ReconcileReport, SyncError> {
    let rows = prepare_records(table, workspace_id, records)?;
    let report = store.reconcile(executor, table, Filter::workspace(workspace_id), rows).await?;

    tracing::info!(
        "Synced {} for workspace {}: {} upserted, {} deleted",
        table,
        workspace_id,
        report.upserted,
        report.deleted
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;
    use serde_json::json;
    use std::collections::BTreeSet;

    fn row(v: Value) -> Row {
        v.as_object().cloned().unwrap()
    }

    async fn ids(store: &MemoryStore, ws: Uuid) -> BTreeSet<String> {
        store
            .rows(Table::WorkspaceUsers)
            .await
            .into_iter()
            .filter(|r| r["ws_id"] == json!(ws.to_string()))
            .map(|r| r["id"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn new_records_get_ids_and_workspace() {
        let ws = Uuid::new_v4();
        let out = prepare_records(Table::WorkspaceUsers, ws, vec![row(json!({ "full_name": "B" }))]).unwrap();
        assert!(Uuid::parse_str(out[0]["id"].as_str().unwrap()).is_ok());
        assert_eq!(out[0]["ws_id"], json!(ws.to_string()));
    }

    #[test]
    fn rejects_records_for_other_workspaces() {
        let err = prepare_records(
            Table::WorkspaceUsers,
            Uuid::new_v4(),
            vec![row(json!({ "ws_id": Uuid::new_v4().to_string() }))],
        )
        .unwrap_err();
        assert!(matches!(err, SyncError::ForeignWorkspace { index: 0, .. }));
    }

    #[test]
    fn rejects_duplicate_ids_and_bad_fields() {
        let id = Uuid::new_v4().to_string();
        let err = prepare_records(
            Table::WorkspaceUsers,
            Uuid::new_v4(),
            vec![row(json!({ "id": id })), row(json!({ "id": id.to_uppercase() }))],
        )
        .unwrap_err();
        assert!(matches!(err, SyncError::DuplicateId(_)));

        let err = prepare_records(Table::WorkspaceUsers, Uuid::new_v4(), vec![row(json!({ "id": "u1" }))]).unwrap_err();
        assert!(matches!(err, SyncError::InvalidRecord { index: 0, .. }));
    }

    #[test]
    fn composite_key_tables_are_unsupported() {
        let err = prepare_records(Table::UserGroupIndicators, Uuid::new_v4(), vec![]).unwrap_err();
        assert!(matches!(err, SyncError::Unsupported(_)));
    }

    #[tokio::test]
    async fn upserts_then_prunes() {
        let store = MemoryStore::new();
        let ws = Uuid::new_v4();
        let (u1, u2) = (Uuid::new_v4().to_string(), Uuid::new_v4().to_string());
        store
            .seed(
                Table::WorkspaceUsers,
                vec![
                    row(json!({ "id": u1, "ws_id": ws.to_string(), "full_name": "old" })),
                    row(json!({ "id": u2, "ws_id": ws.to_string() })),
                ],
            )
            .await
            .unwrap();

        let report = sync_collection(
            &store,
            &Executor::service(ws),
            Table::WorkspaceUsers,
            ws,
            vec![row(json!({ "id": u1, "full_name": "A" })), row(json!({ "full_name": "B" }))],
        )
        .await
        .unwrap();

        assert_eq!(report, ReconcileReport { upserted: 2, deleted: 1 });
        let current = ids(&store, ws).await;
        assert_eq!(current.len(), 2);
        assert!(current.contains(&u1));
        assert!(!current.contains(&u2));
    }

    #[tokio::test]
    async fn second_call_with_same_input_changes_nothing() {
        let store = MemoryStore::new();
        let ws = Uuid::new_v4();
        let exec = Executor::service(ws);
        let input = vec![
            row(json!({ "id": Uuid::new_v4().to_string(), "full_name": "A" })),
            row(json!({ "id": Uuid::new_v4().to_string(), "full_name": "B" })),
        ];

        sync_collection(&store, &exec, Table::WorkspaceUsers, ws, input.clone()).await.unwrap();
        let after_first = store.rows(Table::WorkspaceUsers).await;
        let report = sync_collection(&store, &exec, Table::WorkspaceUsers, ws, input).await.unwrap();

        assert_eq!(report.deleted, 0);
        assert_eq!(store.rows(Table::WorkspaceUsers).await, after_first);
    }

    #[tokio::test]
    async fn converges_to_the_latest_input_and_leaves_other_workspaces_alone() {
        let store = MemoryStore::new();
        let ws = Uuid::new_v4();
        let neighbour = Uuid::new_v4();
        let exec = Executor::service(ws);
        store
            .seed(Table::WorkspaceUsers, vec![row(json!({ "id": Uuid::new_v4().to_string(), "ws_id": neighbour.to_string() }))])
            .await
            .unwrap();

        let d1: Vec<Row> = (0..3).map(|_| row(json!({ "id": Uuid::new_v4().to_string() }))).collect();
        let d2: Vec<Row> = vec![row(json!({ "id": Uuid::new_v4().to_string() })), d1[0].clone()];
        let expected: BTreeSet<String> = d2.iter().map(|r| r["id"].as_str().unwrap().to_string()).collect();

        sync_collection(&store, &exec, Table::WorkspaceUsers, ws, d1).await.unwrap();
        sync_collection(&store, &exec, Table::WorkspaceUsers, ws, d2).await.unwrap();

        assert_eq!(ids(&store, ws).await, expected);
        assert_eq!(ids(&store, neighbour).await.len(), 1);
    }

    #[tokio::test]
    async fn empty_input_clears_the_workspace() {
        let store = MemoryStore::new();
        let ws = Uuid::new_v4();
        store
            .seed(Table::WorkspaceUsers, vec![row(json!({ "id": Uuid::new_v4().to_string(), "ws_id": ws.to_string() }))])
            .await
            .unwrap();
        let report = sync_collection(&store, &Executor::service(ws), Table::WorkspaceUsers, ws, vec![]).await.unwrap();
        assert_eq!(report, ReconcileReport { upserted: 0, deleted: 1 });
        assert!(ids(&store, ws).await.is_empty());
    }

    #[tokio::test]
    async fn non_member_session_cannot_sync() {
        let store = MemoryStore::new();
        let ws = Uuid::new_v4();
        let err = sync_collection(
            &store,
            &Executor::session(Uuid::new_v4()),
            Table::WorkspaceUsers,
            ws,
            vec![row(json!({ "full_name": "A" }))],
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SyncError::Store(StoreError::PolicyViolation { .. })));
    }
}
