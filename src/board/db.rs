use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};

use super::models::*;

/// Async-safe handle to the board database.
///
/// Wraps `BoardDb` behind `Arc<Mutex>` and runs all access on tokio's
/// blocking thread pool via `spawn_blocking`, so synchronous SQLite I/O never
/// ties up async worker threads. Cloning the handle shares the connection.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<BoardDb>>,
}

impl DbHandle {
    pub fn new(db: BoardDb) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(db)),
        }
    }

    /// Open an in-memory database and wrap it.
    pub fn in_memory() -> Result<Self> {
        Ok(Self::new(BoardDb::new_in_memory()?))
    }

    /// Run a closure with access to the database on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&BoardDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = db
                .lock()
                .map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("DB task panicked")?
    }
}

pub struct BoardDb {
    pub(super) conn: Connection,
}

const TASK_COLUMNS: &str = "id, project_id, title, description, status, kanban_status, priority, \
     suggested_actions, created_at, updated_at, completed_at, approved_by";

impl BoardDb {
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
            .execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
            .context("Failed to configure connection")?;
        self.run_migrations().context("Failed to run migrations")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS projects (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    path TEXT NOT NULL,
                    github_repo TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS tasks (
                    id TEXT PRIMARY KEY,
                    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                    title TEXT NOT NULL,
                    description TEXT NOT NULL DEFAULT '',
                    status TEXT NOT NULL DEFAULT 'pending',
                    kanban_status TEXT NOT NULL DEFAULT 'backlog',
                    priority TEXT NOT NULL DEFAULT 'medium',
                    suggested_actions TEXT NOT NULL DEFAULT '[]',
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                    completed_at TEXT,
                    approved_by TEXT
                );

                CREATE TABLE IF NOT EXISTS task_dependencies (
                    task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                    depends_on_task_id TEXT NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                    type TEXT NOT NULL DEFAULT 'depends_on',
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    PRIMARY KEY (task_id, depends_on_task_id)
                );

                CREATE TABLE IF NOT EXISTS pending_actions (
                    id TEXT PRIMARY KEY,
                    task_id TEXT NOT NULL,
                    action_type TEXT NOT NULL,
                    action TEXT NOT NULL,
                    created_at INTEGER NOT NULL,
                    expires_at INTEGER NOT NULL,
                    status TEXT NOT NULL DEFAULT 'pending',
                    telegram_message_id INTEGER
                );

                CREATE INDEX IF NOT EXISTS idx_tasks_project ON tasks(project_id);
                CREATE INDEX IF NOT EXISTS idx_task_deps_depends_on ON task_dependencies(depends_on_task_id);
                CREATE INDEX IF NOT EXISTS idx_pending_actions_status ON pending_actions(status);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    // ── Project CRUD ──────────────────────────────────────────────────

    pub fn create_project(&self, name: &str, path: &str) -> Result<Project> {
        self.conn
            .execute(
                "INSERT INTO projects (name, path) VALUES (?1, ?2)",
                params![name, path],
            )
            .context("Failed to insert project")?;
        let id = self.conn.last_insert_rowid();
        self.get_project(id)?
            .context("Project not found after insert")
    }

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, path, github_repo, created_at FROM projects ORDER BY id")
            .context("Failed to prepare list_projects")?;
        let rows = stmt
            .query_map([], map_project)
            .context("Failed to query projects")?;
        let mut projects = Vec::new();
        for row in rows {
            projects.push(row.context("Failed to read project row")?);
        }
        Ok(projects)
    }

    pub fn get_project(&self, id: i64) -> Result<Option<Project>> {
        self.conn
            .query_row(
                "SELECT id, name, path, github_repo, created_at FROM projects WHERE id = ?1",
                params![id],
                map_project,
            )
            .optional()
            .context("Failed to query project")
    }

    // ── Task CRUD ─────────────────────────────────────────────────────

    pub fn create_task(&self, project_id: i64, new_task: &NewTask) -> Result<Task> {
        let id = uuid::Uuid::new_v4().to_string();
        let suggested = serde_json::to_string(&new_task.suggested_actions)
            .context("Failed to encode suggested actions")?;
        let priority = new_task.priority.unwrap_or(Priority::Medium);
        let kanban = new_task.kanban_status.unwrap_or(KanbanStatus::Backlog);
        self.conn
            .execute(
                "INSERT INTO tasks (id, project_id, title, description, priority, kanban_status, suggested_actions)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id,
                    project_id,
                    new_task.title,
                    new_task.description,
                    priority.as_str(),
                    kanban.as_str(),
                    suggested
                ],
            )
            .context("Failed to insert task")?;
        self.get_task(&id)?.context("Task not found after insert")
    }

    pub fn get_task(&self, id: &str) -> Result<Option<Task>> {
        let sql = format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS);
        let row = self
            .conn
            .query_row(&sql, params![id], TaskRow::from_row)
            .optional()
            .context("Failed to query task")?;
        row.map(TaskRow::into_task).transpose()
    }

    pub fn task_exists(&self, id: &str) -> Result<bool> {
        self.conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM tasks WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .context("Failed to check task existence")
    }

    pub fn list_tasks(&self, project_id: i64) -> Result<Vec<Task>> {
        let sql = format!(
            "SELECT {} FROM tasks WHERE project_id = ?1 ORDER BY created_at, rowid",
            TASK_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql).context("Failed to prepare list_tasks")?;
        let rows = stmt
            .query_map(params![project_id], TaskRow::from_row)
            .context("Failed to query tasks")?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row.context("Failed to read task row")?.into_task()?);
        }
        Ok(tasks)
    }

    pub fn update_task(&self, id: &str, update: &TaskUpdate) -> Result<Option<Task>> {
        // Use unchecked_transaction so all updates are atomic.
        // DbHandle's Mutex already guarantees single-threaded access.
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;

        let mut sets: Vec<(&str, String)> = Vec::new();
        if let Some(t) = &update.title {
            sets.push(("title", t.clone()));
        }
        if let Some(d) = &update.description {
            sets.push(("description", d.clone()));
        }
        if let Some(s) = update.status {
            sets.push(("status", s.as_str().to_string()));
        }
        if let Some(k) = update.kanban_status {
            sets.push(("kanban_status", k.as_str().to_string()));
        }
        if let Some(p) = update.priority {
            sets.push(("priority", p.as_str().to_string()));
        }
        if let Some(a) = &update.suggested_actions {
            sets.push((
                "suggested_actions",
                serde_json::to_string(a).context("Failed to encode suggested actions")?,
            ));
        }

        for (column, value) in &sets {
            let sql = format!(
                "UPDATE tasks SET {} = ?1, updated_at = datetime('now') WHERE id = ?2",
                column
            );
            tx.execute(&sql, params![value, id])
                .with_context(|| format!("Failed to update task {}", column))?;
        }

        tx.commit().context("Failed to commit task update")?;
        self.get_task(id)
    }

    pub fn set_task_status(&self, id: &str, status: TaskStatus) -> Result<bool> {
        let count = self
            .conn
            .execute(
                "UPDATE tasks SET status = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![status.as_str(), id],
            )
            .context("Failed to update task status")?;
        Ok(count > 0)
    }

    /// Mark a task completed on behalf of an approver.
    pub fn complete_task(&self, id: &str, completed_at: &str, approved_by: &str) -> Result<bool> {
        let count = self
            .conn
            .execute(
                "UPDATE tasks SET status = 'completed', completed_at = ?1, approved_by = ?2,
                        updated_at = datetime('now')
                 WHERE id = ?3",
                params![completed_at, approved_by, id],
            )
            .context("Failed to complete task")?;
        Ok(count > 0)
    }

    pub fn delete_task(&self, id: &str) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM tasks WHERE id = ?1", params![id])
            .context("Failed to delete task")?;
        Ok(count > 0)
    }
}

fn map_project(row: &rusqlite::Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        path: row.get(2)?,
        github_repo: row.get(3)?,
        created_at: row.get(4)?,
    })
}

/// Intermediate row struct for tasks; enum columns are parsed in `into_task`.
pub(super) struct TaskRow {
    id: String,
    project_id: i64,
    title: String,
    description: String,
    status: String,
    kanban_status: String,
    priority: String,
    suggested_actions: String,
    created_at: String,
    updated_at: String,
    completed_at: Option<String>,
    approved_by: Option<String>,
}

impl TaskRow {
    /// Reads the columns in `TASK_COLUMNS` order, starting at `offset`.
    pub(super) fn from_row_at(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(offset)?,
            project_id: row.get(offset + 1)?,
            title: row.get(offset + 2)?,
            description: row.get(offset + 3)?,
            status: row.get(offset + 4)?,
            kanban_status: row.get(offset + 5)?,
            priority: row.get(offset + 6)?,
            suggested_actions: row.get(offset + 7)?,
            created_at: row.get(offset + 8)?,
            updated_at: row.get(offset + 9)?,
            completed_at: row.get(offset + 10)?,
            approved_by: row.get(offset + 11)?,
        })
    }

    pub(super) fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Self::from_row_at(row, 0)
    }

    pub(super) fn into_task(self) -> Result<Task> {
        let status = TaskStatus::from_str(&self.status)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse task status")?;
        let kanban_status = KanbanStatus::from_str(&self.kanban_status)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse kanban status")?;
        let priority = Priority::from_str(&self.priority)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse task priority")?;
        let suggested_actions: Vec<String> = serde_json::from_str(&self.suggested_actions)
            .context("Failed to parse suggested actions JSON")?;

        Ok(Task {
            id: self.id,
            project_id: self.project_id,
            title: self.title,
            description: self.description,
            status,
            kanban_status,
            priority,
            suggested_actions,
            created_at: self.created_at,
            updated_at: self.updated_at,
            completed_at: self.completed_at,
            approved_by: self.approved_by,
        })
    }
}

/// Column list for `tasks` qualified with a table alias, for joins.
pub(super) fn task_columns_aliased(alias: &str) -> String {
    TASK_COLUMNS
        .split(", ")
        .map(|c| format!("{}.{}", alias, c))
        .collect::<Vec<_>>()
        .join(", ")
}

// ── Tests ─────────────────────────────────────────────────────────────
