//! Task repository: the only write path for tasks and dependency edges.
//!
//! Every mutation runs in three phases: write to the store, await cache
//! invalidation, then broadcast the change. Readers go through the cache and
//! fill it with the generation they saw before reading the store.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast;

use super::cache::TaskCache;
use super::db::DbHandle;
use super::models::*;
use super::ws::{WsMessage, broadcast_message};

#[derive(Clone)]
pub struct TaskRepository {
    db: DbHandle,
    cache: Arc<dyn TaskCache>,
    ws_tx: broadcast::Sender<String>,
}

impl TaskRepository {
    pub fn new(
        db: DbHandle,
        cache: Arc<dyn TaskCache>,
        ws_tx: broadcast::Sender<String>,
    ) -> Self {
        Self { db, cache, ws_tx }
    }

    pub fn db(&self) -> &DbHandle {
        &self.db
    }

    // ── Projects ──────────────────────────────────────────────────────

    pub async fn create_project(&self, name: &str, path: &str) -> Result<Project> {
        let (name, path) = (name.to_string(), path.to_string());
        let project = self
            .db
            .call(move |db| db.create_project(&name, &path))
            .await?;
        tracing::info!(project_id = project.id, name = %project.name, "project created");
        broadcast_message(
            &self.ws_tx,
            &WsMessage::ProjectCreated {
                project: project.clone(),
            },
        );
        Ok(project)
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        self.db.call(|db| db.list_projects()).await
    }

    pub async fn get_project(&self, id: i64) -> Result<Option<Project>> {
        self.db.call(move |db| db.get_project(id)).await
    }

    // ── Tasks ─────────────────────────────────────────────────────────

    /// Returns `None` when the project does not exist.
    pub async fn create_task(&self, project_id: i64, new_task: NewTask) -> Result<Option<Task>> {
        let task = self
            .db
            .call(move |db| {
                if db.get_project(project_id)?.is_none() {
                    return Ok(None);
                }
                db.create_task(project_id, &new_task).map(Some)
            })
            .await?;
        let Some(task) = task else {
            return Ok(None);
        };
        self.cache.invalidate_task(&task.id, project_id).await;
        tracing::debug!(task_id = %task.id, project_id, "task created");
        broadcast_message(&self.ws_tx, &WsMessage::TaskCreated { task: task.clone() });
        Ok(Some(task))
    }

    pub async fn get_task(&self, id: &str) -> Result<Option<Task>> {
        if let Some(task) = self.cache.get_task(id).await {
            return Ok(Some(task));
        }
        let generation = self.cache.task_generation(id).await;
        let owned = id.to_string();
        let task = self.db.call(move |db| db.get_task(&owned)).await?;
        if let Some(task) = &task {
            self.cache.put_task(task.clone(), generation).await;
        }
        Ok(task)
    }

    pub async fn list_tasks(&self, project_id: i64) -> Result<Vec<Task>> {
        if let Some(tasks) = self.cache.get_project_tasks(project_id).await {
            return Ok(tasks);
        }
        let generation = self.cache.project_generation(project_id).await;
        let tasks = self.db.call(move |db| db.list_tasks(project_id)).await?;
        self.cache
            .put_project_tasks(project_id, tasks.clone(), generation)
            .await;
        Ok(tasks)
    }

    pub async fn update_task(&self, id: &str, update: TaskUpdate) -> Result<Option<Task>> {
        let owned = id.to_string();
        let task = self
            .db
            .call(move |db| {
                if !db.task_exists(&owned)? {
                    return Ok(None);
                }
                db.update_task(&owned, &update)
            })
            .await?;
        self.after_task_write(task).await
    }

    pub async fn set_task_status(&self, id: &str, status: TaskStatus) -> Result<Option<Task>> {
        let owned = id.to_string();
        let task = self
            .db
            .call(move |db| {
                if db.set_task_status(&owned, status)? {
                    db.get_task(&owned)
                } else {
                    Ok(None)
                }
            })
            .await?;
        self.after_task_write(task).await
    }

    /// Mark the task completed on behalf of `approved_by`.
    pub async fn complete_task(
        &self,
        id: &str,
        completed_at: &str,
        approved_by: &str,
    ) -> Result<Option<Task>> {
        let (owned, completed_at, approved_by) =
            (id.to_string(), completed_at.to_string(), approved_by.to_string());
        let task = self
            .db
            .call(move |db| {
                if db.complete_task(&owned, &completed_at, &approved_by)? {
                    db.get_task(&owned)
                } else {
                    Ok(None)
                }
            })
            .await?;
        self.after_task_write(task).await
    }

    /// Returns true iff a task was deleted.
    pub async fn delete_task(&self, id: &str) -> Result<bool> {
        let owned = id.to_string();
        let deleted = self
            .db
            .call(move |db| {
                let Some(task) = db.get_task(&owned)? else {
                    return Ok(None);
                };
                db.delete_task(&owned)?;
                Ok(Some(task))
            })
            .await?;
        let Some(task) = deleted else {
            return Ok(false);
        };
        self.cache.invalidate_task(&task.id, task.project_id).await;
        broadcast_message(&self.ws_tx, &WsMessage::TaskDeleted { task_id: task.id });
        Ok(true)
    }

    async fn after_task_write(&self, task: Option<Task>) -> Result<Option<Task>> {
        if let Some(task) = &task {
            self.cache.invalidate_task(&task.id, task.project_id).await;
            broadcast_message(&self.ws_tx, &WsMessage::TaskUpdated { task: task.clone() });
        }
        Ok(task)
    }

    // ── Dependencies ──────────────────────────────────────────────────

    pub async fn add_dependency(
        &self,
        task_id: &str,
        depends_on_task_id: &str,
        dependency_type: DependencyType,
    ) -> Result<DependencyOutcome> {
        let (a, b) = (task_id.to_string(), depends_on_task_id.to_string());
        let outcome = self
            .db
            .call(move |db| db.add_dependency(&a, &b, dependency_type))
            .await?;
        if outcome.success {
            tracing::debug!(task_id, depends_on_task_id, "dependency added");
            broadcast_message(
                &self.ws_tx,
                &WsMessage::DependencyAdded {
                    task_id: task_id.to_string(),
                    depends_on_task_id: depends_on_task_id.to_string(),
                    dependency_type,
                },
            );
        }
        Ok(outcome)
    }

    pub async fn remove_dependency(&self, task_id: &str, depends_on_task_id: &str) -> Result<bool> {
        let (a, b) = (task_id.to_string(), depends_on_task_id.to_string());
        let removed = self
            .db
            .call(move |db| db.remove_dependency(&a, &b))
            .await?;
        if removed {
            broadcast_message(
                &self.ws_tx,
                &WsMessage::DependencyRemoved {
                    task_id: task_id.to_string(),
                    depends_on_task_id: depends_on_task_id.to_string(),
                },
            );
        }
        Ok(removed)
    }

    pub async fn are_dependencies_met(&self, task_id: &str) -> Result<bool> {
        let owned = task_id.to_string();
        self.db
            .call(move |db| db.are_dependencies_met(&owned))
            .await
    }

    pub async fn get_dependencies(&self, task_id: &str) -> Result<Vec<Task>> {
        let owned = task_id.to_string();
        self.db.call(move |db| db.get_dependencies(&owned)).await
    }

    pub async fn get_dependents(&self, task_id: &str) -> Result<Vec<Task>> {
        let owned = task_id.to_string();
        self.db.call(move |db| db.get_dependents(&owned)).await
    }

    /// All tasks of a project, each with its incoming and outgoing edges.
    pub async fn list_tasks_with_dependencies(
        &self,
        project_id: i64,
    ) -> Result<Vec<TaskWithDependencies>> {
        let tasks = self.list_tasks(project_id).await?;
        self.db
            .call(move |db| db.get_tasks_with_dependencies(tasks))
            .await
    }
}
