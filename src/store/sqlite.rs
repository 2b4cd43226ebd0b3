//! SQLite storage backend
//!
//! Two tables, `workflows` and `executions`, with an index on
//! `executions(workflow_id)`. Structured fields are stored as JSON text and
//! timestamps as RFC 3339 with nanosecond precision, so records read back
//! exactly as written.
//!
//! rusqlite is blocking; every call runs on the blocking pool with the
//! connection behind a mutex.

use super::{Result, StateStore, StoreError};
use crate::model::{next_update_timestamp, AgentStatus, Execution, Workflow, WorkflowStatus};
use crate::step::Payload;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS workflows (
    workflow_id TEXT PRIMARY KEY,
    status TEXT NOT NULL,
    platform TEXT NOT NULL,
    environment TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    config TEXT NOT NULL,
    outputs TEXT NOT NULL,
    errors TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS executions (
    execution_id TEXT PRIMARY KEY,
    workflow_id TEXT NOT NULL,
    agent_name TEXT NOT NULL,
    status TEXT NOT NULL,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    input_data TEXT NOT NULL,
    output_data TEXT NOT NULL,
    error_message TEXT,
    logs TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_executions_workflow_id ON executions(workflow_id);
"#;

const WORKFLOW_COLUMNS: &str = "workflow_id, status, platform, environment, created_at, \
                                updated_at, config, outputs, errors";

const EXECUTION_COLUMNS: &str = "execution_id, workflow_id, agent_name, status, started_at, \
                                 completed_at, input_data, output_data, error_message, logs";

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and make sure the schema exists.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let db_path = path.clone();

        let conn = tokio::task::spawn_blocking(move || -> Result<Connection> {
            if let Some(parent) = db_path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }

            let conn = Connection::open(&db_path)?;
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                row.get::<_, String>(0)
            })?;
            conn.execute_batch(SCHEMA)?;
            Ok(conn)
        })
        .await
        .map_err(|e| StoreError::Database(format!("failed to open database: {}", e)))??;

        debug!("Opened SQLite state store at {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Lock(format!("connection lock poisoned: {}", e)))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Database(format!("blocking task failed: {}", e)))?
    }
}

fn timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// Maps a primary key clash to [`StoreError::DuplicateIdentity`].
fn insert_error(e: rusqlite::Error, id: &str) -> StoreError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation => {
            StoreError::DuplicateIdentity(id.to_string())
        }
        _ => e.into(),
    }
}

fn invalid_text(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_json<T: serde::de::DeserializeOwned>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn map_workflow_row(row: &Row) -> rusqlite::Result<Workflow> {
    let status: String = row.get(1)?;
    let created_at: String = row.get(4)?;
    let updated_at: String = row.get(5)?;
    let config: String = row.get(6)?;
    let outputs: String = row.get(7)?;
    let errors: String = row.get(8)?;

    Ok(Workflow {
        workflow_id: row.get(0)?,
        status: status
            .parse::<WorkflowStatus>()
            .map_err(|e| invalid_text(1, e))?,
        platform: row.get(2)?,
        environment: row.get(3)?,
        created_at: parse_timestamp(4, &created_at)?,
        updated_at: parse_timestamp(5, &updated_at)?,
        config: parse_json::<Payload>(6, &config)?,
        outputs: parse_json::<Payload>(7, &outputs)?,
        errors: parse_json::<Vec<String>>(8, &errors)?,
    })
}

fn map_execution_row(row: &Row) -> rusqlite::Result<Execution> {
    let status: String = row.get(3)?;
    let started_at: String = row.get(4)?;
    let completed_at: Option<String> = row.get(5)?;
    let input_data: String = row.get(6)?;
    let output_data: String = row.get(7)?;
    let logs: String = row.get(9)?;

    Ok(Execution {
        execution_id: row.get(0)?,
        workflow_id: row.get(1)?,
        agent_name: row.get(2)?,
        status: status.parse::<AgentStatus>().map_err(|e| invalid_text(3, e))?,
        started_at: parse_timestamp(4, &started_at)?,
        completed_at: completed_at
            .map(|raw| parse_timestamp(5, &raw))
            .transpose()?,
        input_data: parse_json::<Payload>(6, &input_data)?,
        output_data: parse_json::<Payload>(7, &output_data)?,
        error_message: row.get(8)?,
        logs: parse_json::<Vec<String>>(9, &logs)?,
    })
}

#[async_trait]
impl StateStore for SqliteStore {
    async fn create_workflow(&self, workflow: &Workflow) -> Result<()> {
        let workflow = workflow.clone();
        let config = to_json(&workflow.config)?;
        let outputs = to_json(&workflow.outputs)?;
        let errors = to_json(&workflow.errors)?;

        self.with_conn(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO workflows ({WORKFLOW_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
                ),
                params![
                    workflow.workflow_id,
                    workflow.status.as_str(),
                    workflow.platform,
                    workflow.environment,
                    timestamp(&workflow.created_at),
                    timestamp(&workflow.updated_at),
                    config,
                    outputs,
                    errors,
                ],
            )
            .map_err(|e| insert_error(e, &workflow.workflow_id))?;
            Ok(())
        })
        .await
    }

    async fn update_workflow(&self, workflow: &mut Workflow) -> Result<()> {
        let snapshot = workflow.clone();
        let config = to_json(&snapshot.config)?;
        let outputs = to_json(&snapshot.outputs)?;
        let errors = to_json(&snapshot.errors)?;

        let updated_at = self
            .with_conn(move |conn| {
                let tx = conn.transaction()?;

                let stored: Option<String> = tx
                    .query_row(
                        "SELECT updated_at FROM workflows WHERE workflow_id = ?1",
                        params![snapshot.workflow_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                let stored = stored
                    .ok_or_else(|| StoreError::NotFound(snapshot.workflow_id.clone()))?;
                let stored = parse_timestamp(0, &stored)?;
                let updated_at = next_update_timestamp(stored);

                tx.execute(
                    "UPDATE workflows SET status = ?2, platform = ?3, environment = ?4, \
                     created_at = ?5, updated_at = ?6, config = ?7, outputs = ?8, errors = ?9 \
                     WHERE workflow_id = ?1",
                    params![
                        snapshot.workflow_id,
                        snapshot.status.as_str(),
                        snapshot.platform,
                        snapshot.environment,
                        timestamp(&snapshot.created_at),
                        timestamp(&updated_at),
                        config,
                        outputs,
                        errors,
                    ],
                )?;
                tx.commit()?;
                Ok(updated_at)
            })
            .await?;

        workflow.updated_at = updated_at;
        Ok(())
    }

    async fn get_workflow(&self, workflow_id: &str) -> Result<Option<Workflow>> {
        let workflow_id = workflow_id.to_string();
        self.with_conn(move |conn| {
            let workflow = conn
                .query_row(
                    &format!("SELECT {WORKFLOW_COLUMNS} FROM workflows WHERE workflow_id = ?1"),
                    params![workflow_id],
                    map_workflow_row,
                )
                .optional()?;
            Ok(workflow)
        })
        .await
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {WORKFLOW_COLUMNS} FROM workflows ORDER BY created_at ASC"
            ))?;
            let workflows = stmt
                .query_map([], map_workflow_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(workflows)
        })
        .await
    }

    async fn create_execution(&self, execution: &Execution) -> Result<()> {
        let execution = execution.clone();
        let input_data = to_json(&execution.input_data)?;
        let output_data = to_json(&execution.output_data)?;
        let logs = to_json(&execution.logs)?;

        self.with_conn(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO executions ({EXECUTION_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"
                ),
                params![
                    execution.execution_id,
                    execution.workflow_id,
                    execution.agent_name,
                    execution.status.as_str(),
                    timestamp(&execution.started_at),
                    execution.completed_at.as_ref().map(timestamp),
                    input_data,
                    output_data,
                    execution.error_message,
                    logs,
                ],
            )
            .map_err(|e| insert_error(e, &execution.execution_id))?;
            Ok(())
        })
        .await
    }

    async fn update_execution(&self, execution: &Execution) -> Result<()> {
        let execution = execution.clone();
        let input_data = to_json(&execution.input_data)?;
        let output_data = to_json(&execution.output_data)?;
        let logs = to_json(&execution.logs)?;

        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE executions SET workflow_id = ?2, agent_name = ?3, status = ?4, \
                 started_at = ?5, completed_at = ?6, input_data = ?7, output_data = ?8, \
                 error_message = ?9, logs = ?10 \
                 WHERE execution_id = ?1",
                params![
                    execution.execution_id,
                    execution.workflow_id,
                    execution.agent_name,
                    execution.status.as_str(),
                    timestamp(&execution.started_at),
                    execution.completed_at.as_ref().map(timestamp),
                    input_data,
                    output_data,
                    execution.error_message,
                    logs,
                ],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(execution.execution_id));
            }
            Ok(())
        })
        .await
    }

    async fn list_executions(&self, workflow_id: &str) -> Result<Vec<Execution>> {
        let workflow_id = workflow_id.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {EXECUTION_COLUMNS} FROM executions WHERE workflow_id = ?1"
            ))?;
            let executions = stmt
                .query_map(params![workflow_id], map_execution_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(executions)
        })
        .await
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}
