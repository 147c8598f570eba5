//! Task dependency graph.
//!
//! Edges live in the `task_dependencies` join table. A row
//! `(task_id, depends_on_task_id)` means `task_id` cannot proceed until
//! `depends_on_task_id` is completed. The graph is kept acyclic by checking
//! reachability before every insert; there is no continuous validation.

use std::collections::{HashMap, HashSet, VecDeque};
use std::str::FromStr;

use anyhow::{Context, Result};
use rusqlite::params;

use super::db::{BoardDb, TaskRow, task_columns_aliased};
use super::models::{DependencyOutcome, DependencyType, Task, TaskDependency, TaskWithDependencies};
use crate::errors::DependencyError;

impl BoardDb {
    /// Add the edge `task_id → depends_on_task_id`.
    ///
    /// Business failures (missing tasks, cycles, duplicates) are reported in
    /// the returned outcome; only unexpected storage errors surface as `Err`.
    pub fn add_dependency(
        &self,
        task_id: &str,
        depends_on_task_id: &str,
        dependency_type: DependencyType,
    ) -> Result<DependencyOutcome> {
        if !self.task_exists(task_id)? {
            return Ok(DependencyOutcome::failed(DependencyError::TaskNotFound));
        }
        if !self.task_exists(depends_on_task_id)? {
            return Ok(DependencyOutcome::failed(DependencyError::DependencyNotFound));
        }
        if self.would_create_circular_dependency(task_id, depends_on_task_id)? {
            return Ok(DependencyOutcome::failed(DependencyError::Circular));
        }

        let inserted = self.conn.execute(
            "INSERT INTO task_dependencies (task_id, depends_on_task_id, type) VALUES (?1, ?2, ?3)",
            params![task_id, depends_on_task_id, dependency_type.as_str()],
        );
        match inserted {
            Ok(_) => Ok(DependencyOutcome::ok()),
            Err(e) if is_duplicate_key(&e) => {
                Ok(DependencyOutcome::failed(DependencyError::AlreadyExists))
            }
            Err(e) => Err(e).context("Failed to insert task dependency"),
        }
    }

    /// Returns true iff an edge was deleted.
    pub fn remove_dependency(&self, task_id: &str, depends_on_task_id: &str) -> Result<bool> {
        let count = self
            .conn
            .execute(
                "DELETE FROM task_dependencies WHERE task_id = ?1 AND depends_on_task_id = ?2",
                params![task_id, depends_on_task_id],
            )
            .context("Failed to delete task dependency")?;
        Ok(count > 0)
    }

    /// Would adding `task_id → depends_on_task_id` close a cycle?
    ///
    /// Walks the "depends on" chain forward from `depends_on_task_id`
    /// breadth-first; reaching `task_id` means the new edge would complete a
    /// loop. A self-edge is caught on the first step because the start node
    /// is the target.
    pub fn would_create_circular_dependency(
        &self,
        task_id: &str,
        depends_on_task_id: &str,
    ) -> Result<bool> {
        let mut stmt = self
            .conn
            .prepare_cached(
                "SELECT depends_on_task_id FROM task_dependencies WHERE task_id = ?1",
            )
            .context("Failed to prepare dependency walk")?;

        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::new();
        queue.push_back(depends_on_task_id.to_string());

        while let Some(current) = queue.pop_front() {
            if current == task_id {
                return Ok(true);
            }
            if !visited.insert(current.clone()) {
                continue;
            }
            let next = stmt
                .query_map(params![current], |row| row.get::<_, String>(0))
                .context("Failed to query dependency edges")?;
            for id in next {
                let id = id.context("Failed to read dependency edge")?;
                if !visited.contains(&id) {
                    queue.push_back(id);
                }
            }
        }
        Ok(false)
    }

    /// True iff every task `task_id` depends on is completed (vacuously true
    /// with no dependencies).
    pub fn are_dependencies_met(&self, task_id: &str) -> Result<bool> {
        let unmet: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*)
                 FROM task_dependencies d
                 JOIN tasks t ON t.id = d.depends_on_task_id
                 WHERE d.task_id = ?1 AND t.status != 'completed'",
                params![task_id],
                |row| row.get(0),
            )
            .context("Failed to count unmet dependencies")?;
        Ok(unmet == 0)
    }

    /// Tasks that `task_id` depends on.
    pub fn get_dependencies(&self, task_id: &str) -> Result<Vec<Task>> {
        let sql = format!(
            "SELECT {} FROM task_dependencies d JOIN tasks t ON t.id = d.depends_on_task_id
             WHERE d.task_id = ?1 ORDER BY d.created_at, d.rowid",
            task_columns_aliased("t")
        );
        self.query_tasks(&sql, task_id)
    }

    /// Tasks that depend on `task_id`.
    pub fn get_dependents(&self, task_id: &str) -> Result<Vec<Task>> {
        let sql = format!(
            "SELECT {} FROM task_dependencies d JOIN tasks t ON t.id = d.task_id
             WHERE d.depends_on_task_id = ?1 ORDER BY d.created_at, d.rowid",
            task_columns_aliased("t")
        );
        self.query_tasks(&sql, task_id)
    }

    fn query_tasks(&self, sql: &str, task_id: &str) -> Result<Vec<Task>> {
        let mut stmt = self.conn.prepare(sql).context("Failed to prepare task join")?;
        let rows = stmt
            .query_map(params![task_id], TaskRow::from_row)
            .context("Failed to query joined tasks")?;
        let mut tasks = Vec::new();
        for row in rows {
            tasks.push(row.context("Failed to read joined task row")?.into_task()?);
        }
        Ok(tasks)
    }

    /// Hydrate a batch of tasks with their edges using two queries total,
    /// grouped in memory, instead of two queries per task.
    pub fn get_tasks_with_dependencies(&self, tasks: Vec<Task>) -> Result<Vec<TaskWithDependencies>> {
        if tasks.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        let placeholders = vec!["?"; ids.len()].join(", ");

        let outgoing = self.query_edges(
            &format!(
                "SELECT task_id, depends_on_task_id, type, created_at FROM task_dependencies
                 WHERE task_id IN ({}) ORDER BY created_at, rowid",
                placeholders
            ),
            &ids,
        )?;
        let incoming = self.query_edges(
            &format!(
                "SELECT task_id, depends_on_task_id, type, created_at FROM task_dependencies
                 WHERE depends_on_task_id IN ({}) ORDER BY created_at, rowid",
                placeholders
            ),
            &ids,
        )?;

        let mut depends_on: HashMap<String, Vec<TaskDependency>> = HashMap::new();
        for edge in outgoing {
            depends_on.entry(edge.task_id.clone()).or_default().push(edge);
        }
        let mut blocks: HashMap<String, Vec<TaskDependency>> = HashMap::new();
        for edge in incoming {
            blocks
                .entry(edge.depends_on_task_id.clone())
                .or_default()
                .push(edge);
        }

        Ok(tasks
            .into_iter()
            .map(|task| TaskWithDependencies {
                depends_on: depends_on.remove(&task.id).unwrap_or_default(),
                blocks: blocks.remove(&task.id).unwrap_or_default(),
                task,
            })
            .collect())
    }

    fn query_edges(&self, sql: &str, ids: &[&str]) -> Result<Vec<TaskDependency>> {
        let mut stmt = self.conn.prepare(sql).context("Failed to prepare edge query")?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(ids.iter()), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .context("Failed to query dependency edges")?;
        let mut edges = Vec::new();
        for row in rows {
            let (task_id, depends_on_task_id, kind, created_at) =
                row.context("Failed to read dependency edge")?;
            let dependency_type = DependencyType::from_str(&kind)
                .map_err(|e| anyhow::anyhow!(e))
                .context("Failed to parse dependency type")?;
            edges.push(TaskDependency {
                task_id,
                depends_on_task_id,
                dependency_type,
                created_at,
            });
        }
        Ok(edges)
    }
}

fn is_duplicate_key(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        }
        _ => false,
    }
}
