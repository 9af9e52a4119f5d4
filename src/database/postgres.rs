use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{postgres::PgArguments, PgConnection, PgPool, Postgres, Row as _};
use uuid::Uuid;

use crate::config::DatabaseConfig;

use super::filter::{Condition, Filter};
use super::schema::{Row, Table};
use super::store::{filter_policy, row_ids, write_policy, Executor, Policy, ReconcileReport, Store, StoreError, StoreResult};

#[derive(Debug, Clone, PartialEq)]
enum Param {
    Text(Option<String>),
    TextArray(Vec<String>),
}

/// Parameterized SQL ready to bind
#[derive(Debug, Clone, PartialEq)]
struct SqlQuery {
    sql: String,
    params: Vec<Param>,
}

impl SqlQuery {
    fn new() -> Self {
        Self { sql: String::new(), params: Vec::new() }
    }

    fn push(&mut self, param: Param) -> usize {
        self.params.push(param);
        self.params.len()
    }

    fn bind(&self) -> sqlx::query::Query<'_, Postgres, PgArguments> {
        let mut q = sqlx::query(&self.sql);
        for p in &self.params {
            q = match p {
                Param::Text(v) => q.bind(v.clone()),
                Param::TextArray(vs) => q.bind(vs.clone()),
            };
        }
        q
    }
}

fn ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn escape_like(needle: &str) -> String {
    needle.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

fn pg_type(table: Table, column: &str) -> &'static str {
    table.column(column).map(|c| c.ty.pg_type()).unwrap_or("text")
}

fn where_clause(query: &mut SqlQuery, table: Table, filter: &Filter, policy: &Policy) -> String {
    let mut clauses = Vec::new();

    for condition in &filter.conditions {
        let clause = match condition {
            Condition::Eq(col, Value::Null) => format!("{} IS NULL", ident(col)),
            Condition::Eq(col, v) => {
                let n = query.push(Param::Text(text_of(v)));
                format!("{} = ${}::{}", ident(col), n, pg_type(table, col))
            }
            Condition::In(col, vs) => {
                let n = query.push(Param::TextArray(vs.iter().filter_map(text_of).collect()));
                format!("{} = ANY(${}::{}[])", ident(col), n, pg_type(table, col))
            }
            Condition::NotIn(col, vs) => {
                let n = query.push(Param::TextArray(vs.iter().filter_map(text_of).collect()));
                format!("COALESCE({} <> ALL(${}::{}[]), true)", ident(col), n, pg_type(table, col))
            }
            Condition::Search(cols, needle) => {
                let n = query.push(Param::Text(Some(format!("%{}%", escape_like(needle)))));
                let any = cols
                    .iter()
                    .map(|c| format!("{}::text ILIKE ${}", ident(c), n))
                    .collect::<Vec<_>>()
                    .join(" OR ");
                format!("({})", any)
            }
        };
        clauses.push(clause);
    }

    if let Policy::MemberOf(user_id) = policy {
        if table.is_workspace_scoped() {
            let n = query.push(Param::Text(Some(user_id.to_string())));
            clauses.push(format!(
                "{} IN (SELECT ws_id FROM workspace_members WHERE user_id = ${}::uuid)",
                ident(Table::WORKSPACE_COLUMN),
                n
            ));
        }
    }

    if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    }
}

fn select_sql(table: Table, filter: &Filter, policy: &Policy) -> SqlQuery {
    let mut q = SqlQuery::new();
    let mut inner = format!("SELECT * FROM {}", ident(table.name()));
    inner.push_str(&where_clause(&mut q, table, filter, policy));
    if let Some(col) = &filter.order_by {
        inner.push_str(&format!(" ORDER BY {} ASC NULLS LAST", ident(col)));
    }
    if let Some(limit) = filter.limit {
        inner.push_str(&format!(" LIMIT {}", limit.max(0)));
    }
    q.sql = format!("SELECT row_to_json(t) AS row FROM ({}) t", inner);
    q
}

fn count_sql(table: Table, filter: &Filter, policy: &Policy) -> SqlQuery {
    let mut q = SqlQuery::new();
    let clause = where_clause(&mut q, table, filter, policy);
    q.sql = format!("SELECT COUNT(*) AS count FROM {}{}", ident(table.name()), clause);
    q
}

fn delete_sql(table: Table, filter: &Filter) -> SqlQuery {
    let mut q = SqlQuery::new();
    let clause = where_clause(&mut q, table, filter, &Policy::Unrestricted);
    q.sql = format!("DELETE FROM {}{}", ident(table.name()), clause);
    q
}

/// One INSERT .. ON CONFLICT per distinct column set, so a column missing
/// from some rows is never overwritten with NULL.
///
/// For scoped tables `ws_id` is never updated and the conflict action only
/// fires when the stored row is in the same workspace. A key collision with
/// another workspace's row therefore affects nothing, which `upsert_on`
/// reports as a policy violation.
fn upsert_sql(table: Table, rows: &[Row]) -> StoreResult<Vec<SqlQuery>> {
    let mut groups: BTreeMap<Vec<&'static str>, Vec<&Row>> = BTreeMap::new();
    for row in rows {
        let columns: Vec<&'static str> = table
            .columns()
            .iter()
            .map(|c| c.name)
            .filter(|name| row.contains_key(*name))
            .collect();
        groups.entry(columns).or_default().push(row);
    }

    let pk = table.primary_key();
    let scoped = table.is_workspace_scoped();
    let ws = ident(Table::WORKSPACE_COLUMN);
    groups
        .into_iter()
        .map(|(columns, rows)| {
            let payload = serde_json::to_string(&rows).map_err(|e| StoreError::Unavailable(e.to_string()))?;
            let list = columns.iter().map(|c| ident(c)).collect::<Vec<_>>().join(", ");
            let mut updates = columns
                .iter()
                .filter(|c| !pk.contains(*c) && **c != Table::WORKSPACE_COLUMN)
                .map(|c| format!("{0} = EXCLUDED.{0}", ident(c)))
                .collect::<Vec<_>>();
            let conflict = pk.iter().map(|c| ident(c)).collect::<Vec<_>>().join(", ");
            let action = if scoped {
                // No-op assignment so same-workspace conflicts still count as affected
                if updates.is_empty() {
                    updates.push(format!("{0} = EXCLUDED.{0}", ws));
                }
                format!(
                    "DO UPDATE SET {} WHERE {}.{} = EXCLUDED.{}",
                    updates.join(", "),
                    ident(table.name()),
                    ws,
                    ws
                )
            } else if updates.is_empty() {
                "DO NOTHING".to_string()
            } else {
                format!("DO UPDATE SET {}", updates.join(", "))
            };

            let mut q = SqlQuery::new();
            let n = q.push(Param::Text(Some(payload)));
            q.sql = format!(
                "INSERT INTO {table} ({list}) SELECT {list} FROM jsonb_populate_recordset(NULL::{table}, ${n}::jsonb) ON CONFLICT ({conflict}) {action}",
                table = ident(table.name()),
            );
            Ok(q)
        })
        .collect()
}

/// Postgres-backed store. Session policy is enforced with a membership
/// subquery on reads and an explicit membership check before writes.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    transactional: bool,
    log_queries: bool,
    slow_query_ms: Option<u64>,
}

impl PgStore {
    pub fn new(pool: PgPool, config: &DatabaseConfig, transactional: bool) -> Self {
        Self {
            pool,
            transactional,
            log_queries: config.enable_query_logging,
            slow_query_ms: config.enable_slow_query_warning.then_some(config.slow_query_threshold_ms),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn observe(&self, query: &SqlQuery, started: Instant) {
        let elapsed = started.elapsed();
        if self.log_queries {
            tracing::debug!(sql = %query.sql, params = query.params.len(), ?elapsed, "query");
        }
        if let Some(threshold) = self.slow_query_ms {
            if elapsed.as_millis() as u64 >= threshold {
                tracing::warn!(sql = %query.sql, ?elapsed, "slow query");
            }
        }
    }

    async fn execute(&self, conn: &mut PgConnection, query: &SqlQuery) -> StoreResult<u64> {
        let started = Instant::now();
        let result = query.bind().execute(&mut *conn).await?;
        self.observe(query, started);
        Ok(result.rows_affected())
    }

    async fn ensure_member(&self, conn: &mut PgConnection, table: Table, operation: &'static str, user_id: Uuid, workspaces: &BTreeSet<Uuid>) -> StoreResult<()> {
        if workspaces.is_empty() {
            return Ok(());
        }
        let ids: Vec<Uuid> = workspaces.iter().copied().collect();
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM workspace_members WHERE user_id = $1 AND ws_id = ANY($2)",
        )
        .bind(user_id)
        .bind(ids.clone())
        .fetch_one(&mut *conn)
        .await?;

        if count as usize != ids.len() {
            tracing::warn!("User {} is not a member of every target workspace for {} on {}", user_id, operation, table);
            return Err(StoreError::PolicyViolation { table: table.name(), operation });
        }
        Ok(())
    }

    async fn upsert_on(&self, conn: &mut PgConnection, executor: &Executor, table: Table, rows: Vec<Row>) -> StoreResult<u64> {
        let rows = rows.iter().map(|r| table.normalize_row(r)).collect::<Result<Vec<_>, _>>()?;
        let (policy, workspaces) = write_policy(executor, table, &rows)?;
        if let Policy::MemberOf(user_id) = policy {
            self.ensure_member(conn, table, "upsert", user_id, &workspaces).await?;
        }

        let mut affected = 0;
        for query in upsert_sql(table, &rows)? {
            affected += self.execute(conn, &query).await?;
        }
        if table.is_workspace_scoped() && affected != rows.len() as u64 {
            tracing::warn!("Upsert on {} collides with rows in another workspace", table);
            return Err(StoreError::PolicyViolation { table: table.name(), operation: "upsert" });
        }
        Ok(affected)
    }

    async fn delete_on(&self, conn: &mut PgConnection, executor: &Executor, table: Table, filter: Filter) -> StoreResult<u64> {
        let filter = filter.normalize(table)?;
        let policy = filter_policy(executor, table, &filter)?;
        if let Policy::MemberOf(user_id) = policy {
            let workspaces = filter.workspace_id().into_iter().collect();
            self.ensure_member(conn, table, "delete", user_id, &workspaces).await?;
        }
        self.execute(conn, &delete_sql(table, &filter)).await
    }
}

#[async_trait]
impl Store for PgStore {
    async fn select(&self, executor: &Executor, table: Table, filter: Filter) -> StoreResult<Vec<Row>> {
        let filter = filter.normalize(table)?;
        let policy = filter_policy(executor, table, &filter)?;
        let query = select_sql(table, &filter, &policy);

        let started = Instant::now();
        let rows = query.bind().fetch_all(&self.pool).await?;
        self.observe(&query, started);

        rows.into_iter()
            .map(|row| -> StoreResult<Row> {
                let value: Value = row.try_get("row")?;
                match value {
                    Value::Object(map) => Ok(map),
                    other => Err(StoreError::Unavailable(format!("unexpected row shape: {}", other))),
                }
            })
            .collect()
    }

    async fn count(&self, executor: &Executor, table: Table, filter: Filter) -> StoreResult<i64> {
        let filter = filter.normalize(table)?;
        let policy = filter_policy(executor, table, &filter)?;
        let query = count_sql(table, &filter, &policy);

        let started = Instant::now();
        let row = query.bind().fetch_one(&self.pool).await?;
        self.observe(&query, started);
        Ok(row.try_get::<i64, _>("count")?)
    }

    async fn upsert(&self, executor: &Executor, table: Table, rows: Vec<Row>) -> StoreResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        // A rejected batch may span several statements; roll them all back
        let mut tx = self.pool.begin().await?;
        let affected = self.upsert_on(&mut *tx, executor, table, rows).await?;
        tx.commit().await?;
        Ok(affected)
    }

    async fn delete(&self, executor: &Executor, table: Table, filter: Filter) -> StoreResult<u64> {
        let mut conn = self.pool.acquire().await?;
        self.delete_on(&mut *conn, executor, table, filter).await
    }

    async fn reconcile(&self, executor: &Executor, table: Table, scope: Filter, rows: Vec<Row>) -> StoreResult<ReconcileReport> {
        let keep = row_ids(&rows);
        let prune = scope.not_in("id", keep);

        if !self.transactional {
            let mut conn = self.pool.acquire().await?;
            let upserted = self.upsert_on(&mut *conn, executor, table, rows).await?;
            let deleted = self.delete_on(&mut *conn, executor, table, prune).await?;
            return Ok(ReconcileReport { upserted, deleted });
        }

        let mut tx = self.pool.begin().await?;
        let upserted = self.upsert_on(&mut *tx, executor, table, rows).await?;
        let deleted = self.delete_on(&mut *tx, executor, table, prune).await?;
        tx.commit().await?;
        Ok(ReconcileReport { upserted, deleted })
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
