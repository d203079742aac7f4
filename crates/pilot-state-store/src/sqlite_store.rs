//! SQLite-based persistent agent store
//!
//! Holds agent definitions and their run ledger. Uses SQLx for async
//! database operations; timestamps are RFC3339 text, configs JSON text.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info};

use pilot_core::{AgentId, RunId};

use crate::agent_store::AgentStore;
use crate::error::{Result, StateStoreError};
use crate::records::{
    AgentDefinition, AgentUpdate, NewAgent, NewRun, RunCounts, RunRecord, RunStatus, RunUpdate,
};

const AGENT_COLUMNS: &str =
    "id, name, kind, config, schedule_seconds, enabled, created_at, updated_at";
const RUN_COLUMNS: &str = "id, agent_id, status, started_at, finished_at, logs";

/// Rank of the stored status, kept in line with `RunStatus::rank`
const STATUS_RANK_SQL: &str =
    "CASE status WHEN 'pending' THEN 0 WHEN 'queued' THEN 0 WHEN 'running' THEN 1 ELSE 2 END";

/// SQLite-backed agent store
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `url`
    ///
    /// URL format: `sqlite:///path/to/db.sqlite` or `sqlite://relative.db`
    pub async fn new(url: &str) -> Result<Self> {
        info!("Initializing SQLite agent store: {}", url);

        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.initialize_schema().await?;

        info!("SQLite agent store initialized successfully");
        Ok(store)
    }

    /// Create an in-memory store for testing
    ///
    /// Every memory connection is its own database, so the pool holds
    /// exactly one connection that is never recycled.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.initialize_schema().await?;
        Ok(store)
    }

    async fn initialize_schema(&self) -> Result<()> {
        debug!("Initializing database schema");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS agents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                kind TEXT NOT NULL,
                config TEXT NOT NULL,
                schedule_seconds INTEGER NOT NULL CHECK (schedule_seconds > 0),
                enabled INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                agent_id INTEGER NOT NULL REFERENCES agents(id) ON DELETE CASCADE,
                status TEXT NOT NULL,
                started_at TEXT,
                finished_at TEXT,
                logs TEXT NOT NULL DEFAULT ''
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_runs_agent ON runs(agent_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_runs_status ON runs(status)")
            .execute(&self.pool)
            .await?;

        debug!("Database schema initialized");
        Ok(())
    }

    async fn fetch_run(&self, id: RunId) -> Result<Option<RunRecord>> {
        let row = sqlx::query(&format!("SELECT {} FROM runs WHERE id = ?", RUN_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_run).transpose()
    }
}

#[async_trait]
impl AgentStore for SqliteStore {
    async fn create_agent(&self, agent: NewAgent) -> Result<AgentDefinition> {
        let schedule_seconds = checked_schedule(agent.schedule_seconds)?;
        let config = serde_json::to_string(&agent.config)?;
        let now = format_ts(Utc::now());

        let result = sqlx::query(
            r#"
            INSERT INTO agents (name, kind, config, schedule_seconds, enabled, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&agent.name)
        .bind(&agent.kind)
        .bind(&config)
        .bind(schedule_seconds)
        .bind(agent.enabled)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| map_agent_write_error(e, &agent.name))?;

        let id = result.last_insert_rowid();
        debug!(agent_id = id, name = %agent.name, "Created agent");
        self.get_agent_definition(id)
            .await?
            .ok_or_else(|| StateStoreError::NotFound(format!("agent {}", id)))
    }

    async fn get_agent_definition(&self, id: AgentId) -> Result<Option<AgentDefinition>> {
        let row = sqlx::query(&format!("SELECT {} FROM agents WHERE id = ?", AGENT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_agent).transpose()
    }

    async fn list_agent_definitions(&self) -> Result<Vec<AgentDefinition>> {
        let rows = sqlx::query(&format!("SELECT {} FROM agents ORDER BY id", AGENT_COLUMNS))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_agent).collect()
    }

    async fn list_enabled_agent_definitions(&self) -> Result<Vec<AgentDefinition>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM agents WHERE enabled = 1 ORDER BY id",
            AGENT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_agent).collect()
    }

    async fn update_agent(&self, id: AgentId, update: AgentUpdate) -> Result<AgentDefinition> {
        let schedule_seconds = update.schedule_seconds.map(checked_schedule).transpose()?;
        let config = update
            .config
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let label = update.name.clone().unwrap_or_else(|| format!("agent {}", id));

        let result = sqlx::query(
            r#"
            UPDATE agents SET
                name = COALESCE(?, name),
                kind = COALESCE(?, kind),
                config = COALESCE(?, config),
                schedule_seconds = COALESCE(?, schedule_seconds),
                enabled = COALESCE(?, enabled),
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(update.name)
        .bind(update.kind)
        .bind(config)
        .bind(schedule_seconds)
        .bind(update.enabled)
        .bind(format_ts(Utc::now()))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| map_agent_write_error(e, &label))?;

        if result.rows_affected() == 0 {
            return Err(StateStoreError::NotFound(format!("agent {}", id)));
        }

        self.get_agent_definition(id)
            .await?
            .ok_or_else(|| StateStoreError::NotFound(format!("agent {}", id)))
    }

    async fn delete_agent(&self, id: AgentId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM agents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(agent_id = id, "Deleted agent and its runs");
        }
        Ok(deleted)
    }

    async fn create_run_record(&self, run: NewRun) -> Result<RunRecord> {
        let result = sqlx::query(
            "INSERT INTO runs (agent_id, status, started_at, logs) VALUES (?, ?, ?, '')",
        )
        .bind(run.agent_id)
        .bind(run.status.as_str())
        .bind(run.started_at.map(format_ts))
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                StateStoreError::NotFound(format!("agent {}", run.agent_id))
            }
            other => other.into(),
        })?;

        let id = result.last_insert_rowid();
        debug!(run_id = id, agent_id = run.agent_id, status = %run.status, "Created run");
        self.fetch_run(id)
            .await?
            .ok_or_else(|| StateStoreError::NotFound(format!("run {}", id)))
    }

    async fn get_run_record(&self, id: RunId) -> Result<Option<RunRecord>> {
        self.fetch_run(id).await
    }

    async fn update_run_record(&self, id: RunId, update: RunUpdate) -> Result<RunRecord> {
        // Mirrors RunStatus::can_transition_to; a status-less update only needs a live record
        let next_rank = update.status.map(|s| i64::from(s.rank()));

        let result = sqlx::query(&format!(
            r#"
            UPDATE runs SET
                status = COALESCE(?, status),
                started_at = COALESCE(?, started_at),
                finished_at = COALESCE(?, finished_at),
                logs = COALESCE(?, logs)
            WHERE id = ? AND {rank} < 2
                AND (? IS NULL OR {rank} < ? OR {rank} + ? = 0)
            "#,
            rank = STATUS_RANK_SQL
        ))
        .bind(update.status.map(|s| s.as_str()))
        .bind(update.started_at.map(format_ts))
        .bind(update.finished_at.map(format_ts))
        .bind(update.logs)
        .bind(id)
        .bind(next_rank)
        .bind(next_rank)
        .bind(next_rank)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.fetch_run(id).await? {
                None => Err(StateStoreError::NotFound(format!("run {}", id))),
                Some(current) => Err(StateStoreError::InvalidTransition {
                    run_id: id,
                    from: current.status,
                    to: update.status.unwrap_or(current.status),
                }),
            };
        }

        self.fetch_run(id)
            .await?
            .ok_or_else(|| StateStoreError::NotFound(format!("run {}", id)))
    }

    async fn list_runs_for_agent(&self, agent_id: AgentId, limit: u32) -> Result<Vec<RunRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM runs WHERE agent_id = ? ORDER BY id DESC LIMIT ?",
            RUN_COLUMNS
        ))
        .bind(agent_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_run).collect()
    }

    async fn count_runs_by_status(&self) -> Result<RunCounts> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) as total,
                COALESCE(SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END), 0) as pending,
                COALESCE(SUM(CASE WHEN status = 'queued' THEN 1 ELSE 0 END), 0) as queued,
                COALESCE(SUM(CASE WHEN status = 'running' THEN 1 ELSE 0 END), 0) as running,
                COALESCE(SUM(CASE WHEN status = 'success' THEN 1 ELSE 0 END), 0) as success,
                COALESCE(SUM(CASE WHEN status = 'error' THEN 1 ELSE 0 END), 0) as error
            FROM runs
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let count = |column: &str| -> Result<u64> {
            let value: i64 = row.try_get(column)?;
            Ok(value.max(0) as u64)
        };

        Ok(RunCounts {
            total: count("total")?,
            pending: count("pending")?,
            queued: count("queued")?,
            running: count("running")?,
            success: count("success")?,
            error: count("error")?,
        })
    }

    async fn delete_finished_runs_before(&self, before: DateTime<Utc>) -> Result<u64> {
        let before_str = format_ts(before);

        let result = sqlx::query(
            "DELETE FROM runs WHERE finished_at < ? AND status IN ('success', 'error')",
        )
        .bind(&before_str)
        .execute(&self.pool)
        .await?;

        let deleted = result.rows_affected();
        info!("Deleted {} finished runs from before {}", deleted, before_str);
        Ok(deleted)
    }
}

fn checked_schedule(seconds: u64) -> Result<i64> {
    if seconds == 0 {
        return Err(StateStoreError::InvalidArgument(
            "schedule_seconds must be positive".to_string(),
        ));
    }
    i64::try_from(seconds).map_err(|_| {
        StateStoreError::InvalidArgument(format!("schedule_seconds {} is too large", seconds))
    })
}

fn map_agent_write_error(err: sqlx::Error, name: &str) -> StateStoreError {
    match err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StateStoreError::Conflict(format!("agent name '{}' already exists", name))
        }
        other => other.into(),
    }
}

/// Fixed-width UTC form so stored timestamps compare correctly as text
fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StateStoreError::Corrupt(format!("timestamp '{}': {}", value, e)))
}

fn parse_optional_ts(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_ts).transpose()
}

fn row_to_agent(row: &SqliteRow) -> Result<AgentDefinition> {
    let id: i64 = row.try_get("id")?;
    let config: String = row.try_get("config")?;
    let schedule_seconds: i64 = row.try_get("schedule_seconds")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(AgentDefinition {
        id,
        name: row.try_get("name")?,
        kind: row.try_get("kind")?,
        config: serde_json::from_str(&config)?,
        schedule_seconds: u64::try_from(schedule_seconds).map_err(|_| {
            StateStoreError::Corrupt(format!("agent {} schedule {}", id, schedule_seconds))
        })?,
        enabled: row.try_get("enabled")?,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
    })
}

fn row_to_run(row: &SqliteRow) -> Result<RunRecord> {
    let id: i64 = row.try_get("id")?;
    let status: String = row.try_get("status")?;
    let status = RunStatus::from_str(&status)
        .map_err(|e| StateStoreError::Corrupt(format!("run {}: {}", id, e)))?;

    Ok(RunRecord {
        id,
        agent_id: row.try_get("agent_id")?,
        status,
        started_at: parse_optional_ts(row.try_get("started_at")?)?,
        finished_at: parse_optional_ts(row.try_get("finished_at")?)?,
        logs: row.try_get("logs")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    async fn store_with_agent() -> (SqliteStore, AgentDefinition) {
        let store = SqliteStore::in_memory().await.unwrap();
        let agent = store
            .create_agent(NewAgent::new(
                "invoices",
                "invoice_email",
                json!({"accounting_email": "ap@example.com"}),
            ))
            .await
            .unwrap();
        (store, agent)
    }

    #[tokio::test]
    async fn test_agent_crud() {
        let (store, agent) = store_with_agent().await;
        assert_eq!(agent.schedule_seconds, 300);
        assert!(agent.enabled);
        assert_eq!(agent.config["accounting_email"], "ap@example.com");

        let fetched = store.get_agent_definition(agent.id).await.unwrap().unwrap();
        assert_eq!(fetched, agent);

        let updated = store
            .update_agent(
                agent.id,
                AgentUpdate {
                    schedule_seconds: Some(30),
                    enabled: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.schedule_seconds, 30);
        assert!(!updated.enabled);
        assert_eq!(updated.name, "invoices");
        assert_eq!(updated.config, agent.config);

        assert!(store.delete_agent(agent.id).await.unwrap());
        assert!(!store.delete_agent(agent.id).await.unwrap());
        assert!(store.get_agent_definition(agent.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_agent_validation() {
        let (store, _) = store_with_agent().await;

        let err = store
            .create_agent(NewAgent::new("invoices", "invoice_email", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, StateStoreError::Conflict(_)));

        let err = store
            .create_agent(NewAgent::new("fast", "invoice_email", json!({})).with_schedule(0))
            .await
            .unwrap_err();
        assert!(matches!(err, StateStoreError::InvalidArgument(_)));

        let err = store
            .update_agent(999, AgentUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StateStoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_enabled_is_ordered_by_id() {
        let store = SqliteStore::in_memory().await.unwrap();
        let a = store
            .create_agent(NewAgent::new("a", "invoice_email", json!({})))
            .await
            .unwrap();
        store
            .create_agent(NewAgent::new("b", "invoice_email", json!({})).disabled())
            .await
            .unwrap();
        let c = store
            .create_agent(NewAgent::new("c", "invoice_email", json!({})).with_schedule(60))
            .await
            .unwrap();

        let enabled: Vec<_> = store
            .list_enabled_agent_definitions()
            .await
            .unwrap()
            .into_iter()
            .map(|agent| agent.id)
            .collect();
        assert_eq!(enabled, vec![a.id, c.id]);
        assert_eq!(store.list_agent_definitions().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_run_lifecycle_is_monotonic() {
        let (store, agent) = store_with_agent().await;
        let started = Utc::now();

        let run = store
            .create_run_record(NewRun::running(agent.id, started))
            .await
            .unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.finished_at.is_none());
        assert_eq!(run.logs, "");

        let finished = store
            .update_run_record(
                run.id,
                RunUpdate::finish(RunStatus::Success, started + Duration::seconds(1), "{}".into()),
            )
            .await
            .unwrap();
        assert_eq!(finished.status, RunStatus::Success);
        assert_eq!(finished.started_at, run.started_at);
        assert!(finished.finished_at.unwrap() >= finished.started_at.unwrap());

        let err = store
            .update_run_record(
                run.id,
                RunUpdate::finish(RunStatus::Error, Utc::now(), "late".into()),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StateStoreError::InvalidTransition {
                from: RunStatus::Success,
                to: RunStatus::Error,
                ..
            }
        ));

        let unchanged = store.get_run_record(run.id).await.unwrap().unwrap();
        assert_eq!(unchanged, finished);
    }

    #[tokio::test]
    async fn test_queued_run_moves_forward_only() {
        let (store, agent) = store_with_agent().await;
        let run = store.create_run_record(NewRun::queued(agent.id)).await.unwrap();
        assert_eq!(run.status, RunStatus::Queued);
        assert!(run.started_at.is_none());

        let running = store
            .update_run_record(run.id, RunUpdate::start(Utc::now()))
            .await
            .unwrap();
        assert_eq!(running.status, RunStatus::Running);
        assert!(running.started_at.is_some());

        let err = store
            .update_run_record(
                run.id,
                RunUpdate {
                    status: Some(RunStatus::Queued),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StateStoreError::InvalidTransition { .. }));

        let err = store
            .update_run_record(run.id, RunUpdate::start(Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StateStoreError::InvalidTransition {
                from: RunStatus::Running,
                to: RunStatus::Running,
                ..
            }
        ));

        let err = store
            .update_run_record(404, RunUpdate::start(Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, StateStoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_run_requires_existing_agent() {
        let store = SqliteStore::in_memory().await.unwrap();
        let err = store.create_run_record(NewRun::queued(42)).await.unwrap_err();
        assert!(matches!(err, StateStoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_agent_cascades_runs() {
        let (store, agent) = store_with_agent().await;
        let run = store.create_run_record(NewRun::queued(agent.id)).await.unwrap();

        store.delete_agent(agent.id).await.unwrap();
        assert!(store.get_run_record(run.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_run_queries() {
        let (store, agent) = store_with_agent().await;
        let now = Utc::now();

        let mut ids = Vec::new();
        for status in [RunStatus::Success, RunStatus::Error, RunStatus::Success] {
            let run = store
                .create_run_record(NewRun::running(agent.id, now - Duration::hours(2)))
                .await
                .unwrap();
            store
                .update_run_record(
                    run.id,
                    RunUpdate::finish(status, now - Duration::hours(1), String::new()),
                )
                .await
                .unwrap();
            ids.push(run.id);
        }
        let pending = store.create_run_record(NewRun::queued(agent.id)).await.unwrap();

        let recent = store.list_runs_for_agent(agent.id, 2).await.unwrap();
        assert_eq!(
            recent.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![pending.id, ids[2]]
        );

        let counts = store.count_runs_by_status().await.unwrap();
        assert_eq!(
            counts,
            RunCounts {
                total: 4,
                queued: 1,
                success: 2,
                error: 1,
                ..Default::default()
            }
        );

        let deleted = store.delete_finished_runs_before(now).await.unwrap();
        assert_eq!(deleted, 3);
        assert_eq!(store.count_runs_by_status().await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_counts_on_empty_store() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert_eq!(store.count_runs_by_status().await.unwrap(), RunCounts::default());
    }

    #[tokio::test]
    async fn test_file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("agents.db").display());

        let id = {
            let store = SqliteStore::new(&url).await.unwrap();
            store
                .create_agent(NewAgent::new("persisted", "invoice_email", json!({})))
                .await
                .unwrap()
                .id
        };

        let store = SqliteStore::new(&url).await.unwrap();
        let agent = store.get_agent_definition(id).await.unwrap().unwrap();
        assert_eq!(agent.name, "persisted");
    }
}
