//! Read-through task cache.
//!
//! Writers invalidate entries and await the invalidation before returning,
//! so a read issued after a mutating call completes never sees the
//! pre-write value.
//!
//! Every task id and project list carries a generation that invalidation
//! bumps. A reader takes the generation before it reads the store and hands
//! it back with the fill; the fill is dropped if a write invalidated the
//! entry in between, so a slow reader cannot re-insert a pre-write row.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::models::Task;

/// Invalidation counter of one cache entry.
pub type Generation = u64;

#[async_trait]
pub trait TaskCache: Send + Sync {
    async fn get_task(&self, id: &str) -> Option<Task>;
    async fn task_generation(&self, id: &str) -> Generation;
    /// Store `task` unless it was invalidated since `generation` was read.
    async fn put_task(&self, task: Task, generation: Generation);
    async fn get_project_tasks(&self, project_id: i64) -> Option<Vec<Task>>;
    async fn project_generation(&self, project_id: i64) -> Generation;
    /// Store `tasks` unless the project list was invalidated since `generation` was read.
    async fn put_project_tasks(&self, project_id: i64, tasks: Vec<Task>, generation: Generation);
    /// Drop the task entry and the list of the project it belongs to.
    async fn invalidate_task(&self, id: &str, project_id: i64);
}

#[derive(Debug)]
struct Slot<T> {
    generation: Generation,
    value: Option<T>,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            generation: 0,
            value: None,
        }
    }
}

/// Process-local cache backed by `DashMap`.
///
/// Slots outlive their values so generations keep counting after an
/// invalidation.
#[derive(Debug, Default)]
pub struct InMemoryTaskCache {
    tasks: DashMap<String, Slot<Task>>,
    project_tasks: DashMap<i64, Slot<Vec<Task>>>,
}

impl InMemoryTaskCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached tasks.
    pub fn len(&self) -> usize {
        self.tasks.iter().filter(|slot| slot.value.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Insert under the entry's shard lock so the check and the write are atomic.
fn fill<K, T>(map: &DashMap<K, Slot<T>>, key: K, value: T, generation: Generation)
where
    K: std::hash::Hash + Eq,
{
    match map.entry(key) {
        Entry::Occupied(mut entry) => {
            if entry.get().generation == generation {
                entry.get_mut().value = Some(value);
            }
        }
        Entry::Vacant(entry) => {
            if generation == 0 {
                entry.insert(Slot {
                    generation,
                    value: Some(value),
                });
            }
        }
    }
}

fn bump<K, T>(map: &DashMap<K, Slot<T>>, key: K)
where
    K: std::hash::Hash + Eq,
{
    let mut slot = map.entry(key).or_default();
    slot.generation += 1;
    slot.value = None;
}

#[async_trait]
impl TaskCache for InMemoryTaskCache {
    async fn get_task(&self, id: &str) -> Option<Task> {
        self.tasks.get(id).and_then(|slot| slot.value.clone())
    }

    async fn task_generation(&self, id: &str) -> Generation {
        self.tasks.get(id).map_or(0, |slot| slot.generation)
    }

    async fn put_task(&self, task: Task, generation: Generation) {
        fill(&self.tasks, task.id.clone(), task, generation);
    }

    async fn get_project_tasks(&self, project_id: i64) -> Option<Vec<Task>> {
        self.project_tasks
            .get(&project_id)
            .and_then(|slot| slot.value.clone())
    }

    async fn project_generation(&self, project_id: i64) -> Generation {
        self.project_tasks
            .get(&project_id)
            .map_or(0, |slot| slot.generation)
    }

    async fn put_project_tasks(&self, project_id: i64, tasks: Vec<Task>, generation: Generation) {
        fill(&self.project_tasks, project_id, tasks, generation);
    }

    async fn invalidate_task(&self, id: &str, project_id: i64) {
        bump(&self.tasks, id.to_string());
        bump(&self.project_tasks, project_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::models::{KanbanStatus, Priority, TaskStatus};

    fn task(id: &str, project_id: i64) -> Task {
        Task {
            id: id.to_string(),
            project_id,
            title: "Write docs".to_string(),
            description: String::new(),
            status: TaskStatus::Pending,
            kanban_status: KanbanStatus::Backlog,
            priority: Priority::Medium,
            suggested_actions: vec![],
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
            completed_at: None,
            approved_by: None,
        }
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let cache = InMemoryTaskCache::new();
        assert!(cache.get_task("t1").await.is_none());
        let generation = cache.task_generation("t1").await;
        cache.put_task(task("t1", 1), generation).await;
        assert_eq!(cache.get_task("t1").await.unwrap().id, "t1");
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_drops_task_and_project_list() {
        let cache = InMemoryTaskCache::new();
        cache.put_task(task("t1", 1), 0).await;
        cache.put_task(task("t2", 2), 0).await;
        cache.put_project_tasks(1, vec![task("t1", 1)], 0).await;
        cache.put_project_tasks(2, vec![task("t2", 2)], 0).await;

        cache.invalidate_task("t1", 1).await;

        assert!(cache.get_task("t1").await.is_none());
        assert!(cache.get_project_tasks(1).await.is_none());
        assert!(cache.get_task("t2").await.is_some());
        assert!(cache.get_project_tasks(2).await.is_some());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_fill_from_before_invalidation_is_dropped() {
        let cache = InMemoryTaskCache::new();
        let task_generation = cache.task_generation("t1").await;
        let project_generation = cache.project_generation(1).await;

        cache.invalidate_task("t1", 1).await;
        cache.put_task(task("t1", 1), task_generation).await;
        cache
            .put_project_tasks(1, vec![task("t1", 1)], project_generation)
            .await;
        assert!(cache.get_task("t1").await.is_none());
        assert!(cache.get_project_tasks(1).await.is_none());

        let fresh = cache.task_generation("t1").await;
        assert_eq!(fresh, task_generation + 1);
        cache.put_task(task("t1", 1), fresh).await;
        assert!(cache.get_task("t1").await.is_some());
    }
}
