use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use rusqlite::{Connection, params};
use uuid::Uuid;

use super::models::*;
use super::prompt::name_from_prompt;

/// Async-safe handle to the agent database.
///
/// Wraps `AgentDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, preventing synchronous SQLite
/// I/O from tying up async worker threads.
#[derive(Clone)]
pub struct StoreHandle {
    inner: Arc<std::sync::Mutex<AgentDb>>,
}

impl StoreHandle {
    pub fn new(db: AgentDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&AgentDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|e| anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }
}

pub struct AgentDb {
    conn: Connection,
}

impl AgentDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS projects (
                    id TEXT PRIMARY KEY,
                    prompt TEXT NOT NULL,
                    name TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    status TEXT NOT NULL DEFAULT 'generating',
                    output_path TEXT,
                    error TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS files (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                    path TEXT NOT NULL,
                    content TEXT NOT NULL,
                    language TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS run_steps (
                    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                    step TEXT NOT NULL,
                    result TEXT NOT NULL,
                    completed_at TEXT NOT NULL DEFAULT (datetime('now')),
                    UNIQUE(project_id, step)
                );

                CREATE INDEX IF NOT EXISTS idx_files_project ON files(project_id);
                CREATE INDEX IF NOT EXISTS idx_run_steps_project ON run_steps(project_id);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Project CRUD ──────────────────────────────────────────────────

    /// Insert a new project for a run. The row is the run's first durable
    /// effect: status starts at `generating`, name is derived from the prompt.
    pub fn create_project(&self, prompt: &str) -> Result<Project> {
        let id = Uuid::new_v4().to_string();
        let name = name_from_prompt(prompt);
        let created_at = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO projects (id, prompt, name, status, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, prompt, name, ProjectStatus::Generating.as_str(), created_at],
            )
            .context("Failed to insert project")?;
        self.get_project(&id)?
            .context("Project not found after insert")
    }

    pub fn get_project(&self, id: &str) -> Result<Option<Project>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, prompt, name, description, status, output_path, error, created_at
                 FROM projects WHERE id = ?1",
            )
            .context("Failed to prepare get_project")?;
        let mut rows = stmt
            .query_map(params![id], row_to_project)
            .context("Failed to query project")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read project row")?)),
            None => Ok(None),
        }
    }

    /// Apply a status transition plus the fields that accompany it. Rejects
    /// transitions the state machine does not allow.
    pub fn update_project(
        &self,
        id: &str,
        status: ProjectStatus,
        name: Option<&str>,
        description: Option<&str>,
        output_path: Option<&str>,
        error: Option<&str>,
    ) -> Result<Project> {
        let current = self
            .get_project(id)?
            .with_context(|| format!("Project {} not found", id))?;
        if !is_valid_transition(&current.status, &status) {
            return Err(anyhow!(
                "Invalid status transition: {} -> {}",
                current.status,
                status
            ));
        }
        self.conn
            .execute(
                "UPDATE projects SET
                     status = ?1,
                     name = COALESCE(?2, name),
                     description = COALESCE(?3, description),
                     output_path = COALESCE(?4, output_path),
                     error = COALESCE(?5, error)
                 WHERE id = ?6",
                params![status.as_str(), name, description, output_path, error, id],
            )
            .context("Failed to update project")?;
        self.get_project(id)?
            .context("Project not found after update")
    }

    /// Most recent projects, each with its file count.
    pub fn list_projects(&self, limit: i64) -> Result<Vec<ProjectSummary>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT p.id, p.prompt, p.name, p.description, p.status, p.output_path, p.error, p.created_at,
                        (SELECT COUNT(*) FROM files f WHERE f.project_id = p.id) AS file_count
                 FROM projects p
                 ORDER BY p.created_at DESC, p.rowid DESC
                 LIMIT ?1",
            )
            .context("Failed to prepare list_projects")?;
        let rows = stmt
            .query_map(params![limit], |row| {
                Ok(ProjectSummary {
                    project: row_to_project(row)?,
                    file_count: row.get(8)?,
                })
            })
            .context("Failed to query projects")?;
        let mut summaries = Vec::new();
        for row in rows {
            summaries.push(row.context("Failed to read project row")?);
        }
        Ok(summaries)
    }

    // ── File records ──────────────────────────────────────────────────

    /// Replace a project's file records with the given set. Clearing first
    /// keeps the bulk insert safe to re-run after an interrupted run.
    pub fn create_files(&self, project_id: &str, files: &[GeneratedFile]) -> Result<usize> {
        self.conn
            .execute("DELETE FROM files WHERE project_id = ?1", params![project_id])
            .context("Failed to clear file records")?;
        let created_at = Utc::now().to_rfc3339();
        let mut stmt = self
            .conn
            .prepare(
                "INSERT INTO files (project_id, path, content, language, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .context("Failed to prepare file insert")?;
        for file in files {
            stmt.execute(params![
                project_id,
                file.path,
                file.content,
                file.language,
                created_at
            ])
            .context("Failed to insert file record")?;
        }
        Ok(files.len())
    }

    pub fn list_files(&self, project_id: &str) -> Result<Vec<FileRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, project_id, path, content, language, created_at
                 FROM files WHERE project_id = ?1 ORDER BY path",
            )
            .context("Failed to prepare list_files")?;
        let rows = stmt
            .query_map(params![project_id], |row| {
                Ok(FileRecord {
                    id: row.get(0)?,
                    project_id: row.get(1)?,
                    path: row.get(2)?,
                    content: row.get(3)?,
                    language: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })
            .context("Failed to query files")?;
        let mut files = Vec::new();
        for row in rows {
            files.push(row.context("Failed to read file row")?);
        }
        Ok(files)
    }

    // ── Run step ledger ───────────────────────────────────────────────

    /// Return the recorded result of a step, if it already completed for
    /// this project.
    pub fn completed_step(&self, project_id: &str, step: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT result FROM run_steps WHERE project_id = ?1 AND step = ?2")
            .context("Failed to prepare completed_step")?;
        let mut rows = stmt
            .query_map(params![project_id, step], |row| row.get::<_, String>(0))
            .context("Failed to query run step")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read run step row")?)),
            None => Ok(None),
        }
    }

    /// Record a step's result. The ledger is append-only; recording the same
    /// step twice is a bug upstream and surfaces as a constraint violation.
    pub fn record_step(&self, project_id: &str, step: &str, result: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO run_steps (project_id, step, result, completed_at) VALUES (?1, ?2, ?3, ?4)",
                params![project_id, step, result, Utc::now().to_rfc3339()],
            )
            .context("Failed to record run step")?;
        Ok(())
    }
}

fn row_to_project(row: &rusqlite::Row<'_>) -> rusqlite::Result<Project> {
    let status_str: String = row.get(4)?;
    let status = ProjectStatus::from_str(&status_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            e.into(),
        )
    })?;
    Ok(Project {
        id: row.get(0)?,
        prompt: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        status,
        output_path: row.get(5)?,
        error: row.get(6)?,
        created_at: row.get(7)?,
    })
}
