use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

use dagflow_core::error::{FlowError, Result};
use dagflow_core::traits::GraphStore;
use dagflow_core::types::{GraphDefinition, GraphId, RunId, RunResult, StoredGraph};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS graphs (
        id TEXT PRIMARY KEY,
        definition TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS runs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        run_id TEXT NOT NULL UNIQUE,
        graph_id TEXT NOT NULL REFERENCES graphs(id) ON DELETE CASCADE,
        status TEXT NOT NULL,
        result TEXT NOT NULL,
        finished_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_runs_graph ON runs(graph_id, id);
";

fn db_err(e: impl std::fmt::Display) -> FlowError {
    FlowError::Database(e.to_string())
}

/// SQLite-backed store for graph definitions and run results.
///
/// Both are kept as JSON documents; only the ids and timestamps needed for
/// lookups and ordering live in their own columns.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Create parent directories
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| db_err(format!("Failed to create db directory: {e}")))?;
        }

        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(db_err)?;
        let store = Self::init(conn)?;

        debug!(path = %path.display(), "SQLite store opened");
        Ok(store)
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory().map_err(db_err)?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;").map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn load_graph(conn: &Connection, id: &str) -> Result<StoredGraph> {
        let row = conn
            .query_row(
                "SELECT definition, created_at, updated_at FROM graphs WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()
            .map_err(db_err)?;

        let (definition, created_at, updated_at) =
            row.ok_or_else(|| FlowError::GraphNotFound(id.to_string()))?;
        Ok(StoredGraph {
            id: GraphId::from_string(id),
            definition: serde_json::from_str(&definition)?,
            created_at: parse_time(&created_at)?,
            updated_at: parse_time(&updated_at)?,
        })
    }
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(db_err)
}

impl GraphStore for SqliteStore {
    fn create_graph(&self, definition: &GraphDefinition) -> BoxFuture<'_, Result<StoredGraph>> {
        let encoded = serde_json::to_string(definition);
        let definition = definition.clone();

        Box::pin(async move {
            let encoded = encoded?;
            let id = GraphId::new();
            let now = Utc::now();
            let conn = self.conn.lock().map_err(db_err)?;
            conn.execute(
                "INSERT INTO graphs (id, definition, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
                params![id.0, encoded, now.to_rfc3339()],
            )
            .map_err(db_err)?;

            debug!(graph_id = %id, nodes = definition.nodes.len(), "Graph created");
            Ok(StoredGraph {
                id,
                definition,
                created_at: now,
                updated_at: now,
            })
        })
    }

    fn get_graph(&self, id: &GraphId) -> BoxFuture<'_, Result<StoredGraph>> {
        let id = id.0.clone();

        Box::pin(async move {
            let conn = self.conn.lock().map_err(db_err)?;
            Self::load_graph(&conn, &id)
        })
    }

    fn list_graphs(&self) -> BoxFuture<'_, Result<Vec<StoredGraph>>> {
        Box::pin(async move {
            let conn = self.conn.lock().map_err(db_err)?;
            let mut stmt = conn
                .prepare("SELECT id FROM graphs ORDER BY created_at ASC, rowid ASC")
                .map_err(db_err)?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(db_err)?
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(db_err)?;

            ids.iter().map(|id| Self::load_graph(&conn, id)).collect()
        })
    }

    fn update_graph(
        &self,
        id: &GraphId,
        definition: &GraphDefinition,
    ) -> BoxFuture<'_, Result<StoredGraph>> {
        let id = id.0.clone();
        let encoded = serde_json::to_string(definition);

        Box::pin(async move {
            let encoded = encoded?;
            let conn = self.conn.lock().map_err(db_err)?;
            let changed = conn
                .execute(
                    "UPDATE graphs SET definition = ?2, updated_at = ?3 WHERE id = ?1",
                    params![id, encoded, Utc::now().to_rfc3339()],
                )
                .map_err(db_err)?;
            if changed == 0 {
                return Err(FlowError::GraphNotFound(id));
            }
            debug!(graph_id = %id, "Graph updated");
            Self::load_graph(&conn, &id)
        })
    }

    fn delete_graph(&self, id: &GraphId) -> BoxFuture<'_, Result<()>> {
        let id = id.0.clone();

        Box::pin(async move {
            let conn = self.conn.lock().map_err(db_err)?;
            let runs = conn
                .execute("DELETE FROM runs WHERE graph_id = ?1", params![id])
                .map_err(db_err)?;
            let changed = conn
                .execute("DELETE FROM graphs WHERE id = ?1", params![id])
                .map_err(db_err)?;
            if changed == 0 {
                return Err(FlowError::GraphNotFound(id));
            }
            debug!(graph_id = %id, runs, "Graph deleted");
            Ok(())
        })
    }

    fn save_run(&self, result: &RunResult) -> BoxFuture<'_, Result<()>> {
        let graph_id = result.graph_id.as_ref().map(|g| g.0.clone());
        let run_id = result.run_id.0.clone();
        let status = result.status.to_string();
        let finished_at = result.finished_at.to_rfc3339();
        let encoded = serde_json::to_string(result);

        Box::pin(async move {
            let graph_id =
                graph_id.ok_or_else(|| db_err(format!("run {run_id} has no graph id")))?;
            let encoded = encoded?;
            let conn = self.conn.lock().map_err(db_err)?;

            let exists: Option<i64> = conn
                .query_row("SELECT 1 FROM graphs WHERE id = ?1", params![graph_id], |row| {
                    row.get(0)
                })
                .optional()
                .map_err(db_err)?;
            if exists.is_none() {
                return Err(FlowError::GraphNotFound(graph_id));
            }

            conn.execute(
                "INSERT INTO runs (run_id, graph_id, status, result, finished_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(run_id) DO UPDATE SET
                    status = excluded.status,
                    result = excluded.result,
                    finished_at = excluded.finished_at",
                params![run_id, graph_id, status, encoded, finished_at],
            )
            .map_err(db_err)?;

            debug!(run_id = %run_id, graph_id = %graph_id, status = %status, "Run saved");
            Ok(())
        })
    }

    fn get_run(&self, graph_id: &GraphId, run_id: &RunId) -> BoxFuture<'_, Result<RunResult>> {
        let graph_id = graph_id.0.clone();
        let run_id = run_id.0.clone();

        Box::pin(async move {
            let conn = self.conn.lock().map_err(db_err)?;
            let encoded: Option<String> = conn
                .query_row(
                    "SELECT result FROM runs WHERE graph_id = ?1 AND run_id = ?2",
                    params![graph_id, run_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(db_err)?;

            let encoded = encoded.ok_or(FlowError::RunNotFound(run_id))?;
            Ok(serde_json::from_str(&encoded)?)
        })
    }

    fn list_runs(&self, graph_id: &GraphId) -> BoxFuture<'_, Result<Vec<RunResult>>> {
        let graph_id = graph_id.0.clone();

        Box::pin(async move {
            let conn = self.conn.lock().map_err(db_err)?;
            let mut stmt = conn
                .prepare("SELECT result FROM runs WHERE graph_id = ?1 ORDER BY id DESC")
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params![graph_id], |row| row.get::<_, String>(0))
                .map_err(db_err)?;

            let mut results = Vec::new();
            for row in rows {
                let encoded = row.map_err(db_err)?;
                results.push(serde_json::from_str(&encoded)?);
            }
            Ok(results)
        })
    }
}
