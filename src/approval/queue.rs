//! Approval queue.
//!
//! Coordinates the lifecycle of pending actions:
//!
//! ```text
//! add_action ──▶ pending ──approve──▶ approved   (executor succeeded)
//!                   │  ├──reject───▶ rejected
//!                   │  └──(deadline passed, on read or approve)──▶ expired
//!                   └──approve, executor failed──▶ stays pending
//! ```
//!
//! Expiry is lazy: nothing runs in the background, overdue records are
//! swept whenever the queue is read or an approval is attempted.

use std::sync::Arc;

use anyhow::{Result, bail};
use dashmap::DashSet;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::executor::{ActionExecutor, ExecutionResult};
use crate::board::db::DbHandle;
use crate::board::models::{ActionStatus, MANUAL_TASK_ID, PendingAction, ProposedAction, TaskStatus};
use crate::board::repository::TaskRepository;
use crate::board::ws::{WsMessage, broadcast_message};
use crate::clock::SharedClock;
use crate::errors::ApprovalError;

pub const DEFAULT_TIMEOUT_MINUTES: i64 = 60;

/// Upper bound on an action's approval window: one year.
pub const MAX_TIMEOUT_MINUTES: i64 = 365 * 24 * 60;

/// Recorded as `approved_by` on tasks completed through an approval.
pub const APPROVER_WEB: &str = "web";

/// Result of `approve` / `reject`, serialized as-is by the API.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ApprovalOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ExecutionResult>,
}

impl ApprovalOutcome {
    fn ok(result: Option<ExecutionResult>) -> Self {
        Self {
            success: true,
            error: None,
            result,
        }
    }

    fn failed(error: ApprovalError) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            result: None,
        }
    }
}

pub struct ApprovalQueue {
    db: DbHandle,
    tasks: TaskRepository,
    executor: Arc<dyn ActionExecutor>,
    ws_tx: broadcast::Sender<String>,
    clock: SharedClock,
    /// Ids whose executor is currently running.
    in_flight: DashSet<String>,
}

/// Releases an in-flight claim when dropped, including when the approving
/// future is cancelled mid-execution.
struct InFlightClaim<'a> {
    set: &'a DashSet<String>,
    id: String,
}

impl<'a> InFlightClaim<'a> {
    fn acquire(set: &'a DashSet<String>, id: &str) -> Option<Self> {
        set.insert(id.to_string()).then(|| Self {
            set,
            id: id.to_string(),
        })
    }
}

impl Drop for InFlightClaim<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.id);
    }
}

impl ApprovalQueue {
    pub fn new(
        tasks: TaskRepository,
        executor: Arc<dyn ActionExecutor>,
        ws_tx: broadcast::Sender<String>,
        clock: SharedClock,
    ) -> Self {
        Self {
            db: tasks.db().clone(),
            tasks,
            executor,
            ws_tx,
            clock,
            in_flight: DashSet::new(),
        }
    }

    /// Queue `action` for approval. `task_id` defaults to the manual sentinel.
    ///
    /// `timeout_minutes` must lie in `0..=MAX_TIMEOUT_MINUTES`.
    pub async fn add_action(
        &self,
        action: ProposedAction,
        task_id: Option<&str>,
        timeout_minutes: Option<i64>,
    ) -> Result<String> {
        let now = self.clock.now_millis();
        let timeout = timeout_minutes.unwrap_or(DEFAULT_TIMEOUT_MINUTES);
        if !(0..=MAX_TIMEOUT_MINUTES).contains(&timeout) {
            bail!(
                "timeout_minutes must be between 0 and {}",
                MAX_TIMEOUT_MINUTES
            );
        }
        let Some(expires_at) = timeout
            .checked_mul(60_000)
            .and_then(|window| now.checked_add(window))
        else {
            bail!("Approval deadline out of range");
        };
        let pending = PendingAction {
            id: uuid::Uuid::new_v4().to_string(),
            task_id: task_id.unwrap_or(MANUAL_TASK_ID).to_string(),
            action,
            created_at: now,
            expires_at,
            status: ActionStatus::Pending,
            telegram_message_id: None,
        };

        let record = pending.clone();
        self.db
            .call(move |db| db.insert_pending_action(&record))
            .await?;

        tracing::info!(
            action_id = %pending.id,
            task_id = %pending.task_id,
            action_type = pending.action.type_name(),
            "action queued for approval"
        );
        let id = pending.id.clone();
        broadcast_message(&self.ws_tx, &WsMessage::ApprovalPending { action: pending });
        Ok(id)
    }

    /// Expire overdue records, then return every stored action, newest first.
    pub async fn get_pending(&self) -> Result<Vec<PendingAction>> {
        self.list(None).await
    }

    /// Like [`get_pending`](Self::get_pending) with an optional status filter.
    pub async fn list(&self, status: Option<ActionStatus>) -> Result<Vec<PendingAction>> {
        let now = self.clock.now_millis();
        self.db
            .call(move |db| {
                let expired = db.expire_overdue_actions(now)?;
                if expired > 0 {
                    tracing::info!(expired, "expired overdue actions");
                }
                db.list_pending_actions(status)
            })
            .await
    }

    pub async fn get_action(&self, id: &str) -> Result<Option<PendingAction>> {
        let owned = id.to_string();
        self.db.call(move |db| db.get_pending_action(&owned)).await
    }

    /// Run the action's executor and, on success, mark it approved.
    ///
    /// A failed executor leaves the action pending so it can be approved
    /// again before its deadline. The deadline is never extended.
    pub async fn approve(&self, id: &str) -> Result<ApprovalOutcome> {
        let Some(_claim) = InFlightClaim::acquire(&self.in_flight, id) else {
            return Ok(ApprovalOutcome::failed(ApprovalError::InFlight));
        };
        self.approve_claimed(id).await
    }

    async fn approve_claimed(&self, id: &str) -> Result<ApprovalOutcome> {
        let Some(pending) = self.get_action(id).await? else {
            return Ok(ApprovalOutcome::failed(ApprovalError::NotFound));
        };
        if pending.status != ActionStatus::Pending {
            return Ok(ApprovalOutcome::failed(ApprovalError::AlreadyProcessed {
                status: pending.status,
            }));
        }

        if pending.is_overdue(self.clock.now_millis()) {
            let owned = id.to_string();
            let won = self
                .db
                .call(move |db| db.transition_action(&owned, ActionStatus::Expired))
                .await?;
            if !won {
                let status = self.current_status(id, ActionStatus::Expired).await?;
                return Ok(ApprovalOutcome::failed(ApprovalError::AlreadyProcessed { status }));
            }
            tracing::info!(action_id = %id, "approval attempted after deadline");
            return Ok(ApprovalOutcome::failed(ApprovalError::Expired));
        }

        let result = self.executor.execute(&pending.action).await;

        let outcome = if result.success {
            let owned = id.to_string();
            let won = self
                .db
                .call(move |db| db.transition_action(&owned, ActionStatus::Approved))
                .await?;
            if won {
                if !pending.is_manual() {
                    let completed_at = self.clock.now_rfc3339();
                    self.tasks
                        .complete_task(&pending.task_id, &completed_at, APPROVER_WEB)
                        .await?;
                }
                tracing::info!(action_id = %id, "action approved");
                ApprovalOutcome::ok(Some(result.clone()))
            } else {
                // Rejected or expired by another caller while the executor ran.
                let status = self.current_status(id, ActionStatus::Expired).await?;
                tracing::warn!(action_id = %id, %status, "action changed state during execution");
                ApprovalOutcome {
                    result: Some(result.clone()),
                    ..ApprovalOutcome::failed(ApprovalError::AlreadyProcessed { status })
                }
            }
        } else {
            let message = result
                .error
                .clone()
                .unwrap_or_else(|| "Action execution failed".to_string());
            tracing::warn!(action_id = %id, error = %message, "executor failed, action stays pending");
            ApprovalOutcome {
                result: Some(result.clone()),
                ..ApprovalOutcome::failed(ApprovalError::ExecutorFailed(message))
            }
        };

        broadcast_message(
            &self.ws_tx,
            &WsMessage::ApprovalApproved {
                action_id: id.to_string(),
                success: result.success,
                result: result.data.clone(),
                error: result.error.clone(),
            },
        );
        Ok(outcome)
    }

    pub async fn reject(&self, id: &str, reason: Option<String>) -> Result<ApprovalOutcome> {
        let Some(pending) = self.get_action(id).await? else {
            return Ok(ApprovalOutcome::failed(ApprovalError::NotFound));
        };
        if pending.status != ActionStatus::Pending {
            return Ok(ApprovalOutcome::failed(ApprovalError::AlreadyProcessed {
                status: pending.status,
            }));
        }

        let owned = id.to_string();
        let won = self
            .db
            .call(move |db| db.transition_action(&owned, ActionStatus::Rejected))
            .await?;
        if !won {
            let status = self.current_status(id, ActionStatus::Rejected).await?;
            return Ok(ApprovalOutcome::failed(ApprovalError::AlreadyProcessed { status }));
        }

        if !pending.is_manual() {
            self.tasks
                .set_task_status(&pending.task_id, TaskStatus::Rejected)
                .await?;
        }

        tracing::info!(action_id = %id, reason = reason.as_deref().unwrap_or(""), "action rejected");
        broadcast_message(
            &self.ws_tx,
            &WsMessage::ApprovalRejected {
                action_id: id.to_string(),
                reason,
            },
        );
        Ok(ApprovalOutcome::ok(None))
    }

    /// Stored status after losing a transition race.
    async fn current_status(&self, id: &str, fallback: ActionStatus) -> Result<ActionStatus> {
        Ok(self
            .get_action(id)
            .await?
            .map(|a| a.status)
            .unwrap_or(fallback))
    }

    /// Returns false when the action does not exist.
    pub async fn set_telegram_message_id(&self, id: &str, message_id: i64) -> Result<bool> {
        let owned = id.to_string();
        self.db
            .call(move |db| db.set_action_telegram_message_id(&owned, message_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::board::cache::InMemoryTaskCache;
    use crate::board::db::BoardDb;
    use crate::board::models::{ActionKind, CommentIssuePayload, NewTask};
    use crate::clock::{Clock, ManualClock};

    /// Counts calls; succeeds unless `fail` is set. Optionally pauses so
    /// concurrent approvals overlap.
    #[derive(Default)]
    struct FakeExecutor {
        calls: AtomicUsize,
        fail: AtomicBool,
        delay_ms: u64,
    }

    #[async_trait]
    impl ActionExecutor for FakeExecutor {
        async fn execute(&self, _action: &ProposedAction) -> ExecutionResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.delay_ms > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                ExecutionResult::failed("gh: HTTP 502")
            } else {
                ExecutionResult::ok(serde_json::json!({"url": "https://github.com/acme/widgets/issues/7#c1"}))
            }
        }
    }

    struct Fixture {
        queue: Arc<ApprovalQueue>,
        tasks: TaskRepository,
        executor: Arc<FakeExecutor>,
        clock: Arc<ManualClock>,
        rx: broadcast::Receiver<String>,
    }

    fn fixture_with(executor: FakeExecutor) -> Fixture {
        let (ws_tx, rx) = broadcast::channel(64);
        let tasks = TaskRepository::new(
            DbHandle::in_memory().unwrap(),
            Arc::new(InMemoryTaskCache::new()),
            ws_tx.clone(),
        );
        let executor = Arc::new(executor);
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let queue = Arc::new(ApprovalQueue::new(
            tasks.clone(),
            executor.clone(),
            ws_tx,
            clock.clone(),
        ));
        Fixture {
            queue,
            tasks,
            executor,
            clock,
            rx,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(FakeExecutor::default())
    }

    fn comment_action() -> ProposedAction {
        ProposedAction::new(
            "Comment on issue #7",
            ActionKind::CommentIssue(CommentIssuePayload {
                repo: "acme/widgets".into(),
                number: 7,
                body: "Fixed".into(),
            }),
        )
    }

    async fn make_task(tasks: &TaskRepository) -> String {
        let project = tasks.create_project("p", "/tmp/p").await.unwrap();
        tasks
            .create_task(
                project.id,
                NewTask {
                    title: "ship".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap()
            .id
    }

    fn drain_types(rx: &mut broadcast::Receiver<String>) -> Vec<String> {
        let mut types = Vec::new();
        while let Ok(raw) = rx.try_recv() {
            let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
            types.push(json["type"].as_str().unwrap().to_string());
        }
        types
    }

    #[tokio::test]
    async fn test_add_action_persists_and_broadcasts() {
        let mut f = fixture();
        let id = f.queue.add_action(comment_action(), None, None).await.unwrap();

        let stored = f.queue.get_action(&id).await.unwrap().unwrap();
        assert_eq!(stored.status, ActionStatus::Pending);
        assert_eq!(stored.task_id, MANUAL_TASK_ID);
        assert_eq!(stored.expires_at - stored.created_at, 60 * 60_000);
        assert_eq!(drain_types(&mut f.rx), vec!["ApprovalPending"]);
    }

    #[tokio::test]
    async fn test_zero_timeout_expires_on_read() {
        let f = fixture();
        let id = f.queue.add_action(comment_action(), None, Some(0)).await.unwrap();
        f.clock.advance_millis(1);

        let listed = f.queue.get_pending().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, id);
        assert_eq!(listed[0].status, ActionStatus::Expired);

        let outcome = f.queue.approve(&id).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("Action already expired"));
        assert_eq!(f.executor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_approve_after_deadline_expires_without_executing() {
        let f = fixture();
        let id = f.queue.add_action(comment_action(), None, Some(5)).await.unwrap();
        f.clock.advance_minutes(6);

        let outcome = f.queue.approve(&id).await.unwrap();
        assert_eq!(outcome.error.as_deref(), Some("Action expired"));
        assert_eq!(f.executor.calls.load(Ordering::SeqCst), 0);
        let stored = f.queue.get_action(&id).await.unwrap().unwrap();
        assert_eq!(stored.status, ActionStatus::Expired);
    }

    #[tokio::test]
    async fn test_approve_completes_linked_task() {
        let mut f = fixture();
        let task_id = make_task(&f.tasks).await;
        let id = f
            .queue
            .add_action(comment_action(), Some(&task_id), None)
            .await
            .unwrap();
        drain_types(&mut f.rx);

        let outcome = f.queue.approve(&id).await.unwrap();
        assert!(outcome.success, "{:?}", outcome.error);
        assert!(outcome.result.unwrap().success);

        let stored = f.queue.get_action(&id).await.unwrap().unwrap();
        assert_eq!(stored.status, ActionStatus::Approved);

        let task = f.tasks.get_task(&task_id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.approved_by.as_deref(), Some(APPROVER_WEB));
        assert!(task.completed_at.is_some());

        assert_eq!(drain_types(&mut f.rx), vec!["TaskUpdated", "ApprovalApproved"]);
    }

    #[tokio::test]
    async fn test_second_approve_reports_already_approved() {
        let f = fixture();
        let id = f.queue.add_action(comment_action(), None, None).await.unwrap();
        assert!(f.queue.approve(&id).await.unwrap().success);

        let again = f.queue.approve(&id).await.unwrap();
        assert!(!again.success);
        assert_eq!(again.error.as_deref(), Some("Action already approved"));
        assert_eq!(f.executor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_executor_leaves_action_pending() {
        let mut f = fixture();
        f.executor.fail.store(true, Ordering::SeqCst);
        let task_id = make_task(&f.tasks).await;
        let id = f
            .queue
            .add_action(comment_action(), Some(&task_id), None)
            .await
            .unwrap();
        drain_types(&mut f.rx);

        let outcome = f.queue.approve(&id).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("gh: HTTP 502"));
        assert_eq!(
            f.queue.get_action(&id).await.unwrap().unwrap().status,
            ActionStatus::Pending
        );
        let task = f.tasks.get_task(&task_id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(drain_types(&mut f.rx), vec!["ApprovalApproved"]);

        // Retry once the executor recovers.
        f.executor.fail.store(false, Ordering::SeqCst);
        assert!(f.queue.approve(&id).await.unwrap().success);
        assert_eq!(f.executor.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_after_failure_respects_original_deadline() {
        let f = fixture();
        f.executor.fail.store(true, Ordering::SeqCst);
        let id = f.queue.add_action(comment_action(), None, Some(10)).await.unwrap();
        assert!(!f.queue.approve(&id).await.unwrap().success);

        f.executor.fail.store(false, Ordering::SeqCst);
        f.clock.advance_minutes(11);
        let outcome = f.queue.approve(&id).await.unwrap();
        assert_eq!(outcome.error.as_deref(), Some("Action expired"));
    }

    #[tokio::test]
    async fn test_reject_marks_task_rejected() {
        let mut f = fixture();
        let task_id = make_task(&f.tasks).await;
        let id = f
            .queue
            .add_action(comment_action(), Some(&task_id), None)
            .await
            .unwrap();
        drain_types(&mut f.rx);

        let outcome = f.queue.reject(&id, Some("not now".into())).await.unwrap();
        assert!(outcome.success);
        assert_eq!(
            f.queue.get_action(&id).await.unwrap().unwrap().status,
            ActionStatus::Rejected
        );
        let task = f.tasks.get_task(&task_id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Rejected);
        assert_eq!(drain_types(&mut f.rx), vec!["TaskUpdated", "ApprovalRejected"]);

        let approve = f.queue.approve(&id).await.unwrap();
        assert_eq!(approve.error.as_deref(), Some("Action already rejected"));
        assert_eq!(f.executor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reject_ignores_deadline() {
        let f = fixture();
        let id = f.queue.add_action(comment_action(), None, Some(1)).await.unwrap();
        f.clock.advance_minutes(5);
        assert!(f.queue.reject(&id, None).await.unwrap().success);
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let f = fixture();
        let approve = f.queue.approve("missing").await.unwrap();
        assert_eq!(approve.error.as_deref(), Some("Action not found"));
        let reject = f.queue.reject("missing", None).await.unwrap();
        assert_eq!(reject.error.as_deref(), Some("Action not found"));
    }

    #[tokio::test]
    async fn test_concurrent_approve_runs_executor_once() {
        let f = fixture_with(FakeExecutor {
            delay_ms: 50,
            ..Default::default()
        });
        let id = f.queue.add_action(comment_action(), None, None).await.unwrap();

        let (q1, q2) = (f.queue.clone(), f.queue.clone());
        let (id1, id2) = (id.clone(), id.clone());
        let (a, b) = tokio::join!(
            tokio::spawn(async move { q1.approve(&id1).await.unwrap() }),
            tokio::spawn(async move { q2.approve(&id2).await.unwrap() }),
        );
        let outcomes = [a.unwrap(), b.unwrap()];

        assert_eq!(outcomes.iter().filter(|o| o.success).count(), 1);
        let loser = outcomes.iter().find(|o| !o.success).unwrap();
        let err = loser.error.as_deref().unwrap();
        assert!(
            err == "Action already being processed" || err == "Action already approved",
            "unexpected error: {}",
            err
        );
        assert_eq!(f.executor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_approve_releases_claim() {
        let f = fixture_with(FakeExecutor {
            delay_ms: 500,
            ..Default::default()
        });
        let id = f.queue.add_action(comment_action(), None, None).await.unwrap();

        let queue = f.queue.clone();
        let claimed = id.clone();
        let handle = tokio::spawn(async move { queue.approve(&claimed).await });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());

        assert_eq!(
            f.queue.get_action(&id).await.unwrap().unwrap().status,
            ActionStatus::Pending
        );
        let outcome = f.queue.approve(&id).await.unwrap();
        assert!(outcome.success, "{:?}", outcome.error);
        assert_eq!(f.executor.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_add_action_rejects_out_of_range_timeout() {
        let f = fixture();
        for timeout in [-1, MAX_TIMEOUT_MINUTES + 1, i64::MAX / 1000, i64::MAX] {
            let result = f.queue.add_action(comment_action(), None, Some(timeout)).await;
            assert!(result.is_err(), "timeout {} accepted", timeout);
        }
        assert!(f.queue.get_pending().await.unwrap().is_empty());

        let id = f
            .queue
            .add_action(comment_action(), None, Some(MAX_TIMEOUT_MINUTES))
            .await
            .unwrap();
        let stored = f.queue.get_action(&id).await.unwrap().unwrap();
        assert_eq!(stored.expires_at - stored.created_at, MAX_TIMEOUT_MINUTES * 60_000);
    }

    /// Rejects the armed action through a second connection the first time
    /// the queue reads the time, then reports a time past every deadline.
    struct RejectOnReadClock {
        start: i64,
        armed: std::sync::Mutex<Option<(BoardDb, String)>>,
    }

    impl Clock for RejectOnReadClock {
        fn now_millis(&self) -> i64 {
            if let Some((db, id)) = self.armed.lock().unwrap().take() {
                assert!(db.transition_action(&id, ActionStatus::Rejected).unwrap());
                return self.start + 24 * 60 * 60_000;
            }
            self.start
        }
    }

    #[tokio::test]
    async fn test_expiry_losing_to_reject_reports_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("board.db");
        let (ws_tx, _rx) = broadcast::channel(64);
        let tasks = TaskRepository::new(
            DbHandle::new(BoardDb::new(&path).unwrap()),
            Arc::new(InMemoryTaskCache::new()),
            ws_tx.clone(),
        );
        let clock = Arc::new(RejectOnReadClock {
            start: 1_700_000_000_000,
            armed: std::sync::Mutex::new(None),
        });
        let executor = Arc::new(FakeExecutor::default());
        let queue = ApprovalQueue::new(tasks, executor.clone(), ws_tx, clock.clone());

        let id = queue.add_action(comment_action(), None, Some(5)).await.unwrap();
        *clock.armed.lock().unwrap() = Some((BoardDb::new(&path).unwrap(), id.clone()));

        let outcome = queue.approve(&id).await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("Action already rejected"));
        assert_eq!(
            queue.get_action(&id).await.unwrap().unwrap().status,
            ActionStatus::Rejected
        );
        assert_eq!(executor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_set_telegram_message_id() {
        let f = fixture();
        let id = f.queue.add_action(comment_action(), None, None).await.unwrap();
        assert!(f.queue.set_telegram_message_id(&id, 99).await.unwrap());
        assert!(!f.queue.set_telegram_message_id("missing", 99).await.unwrap());
        assert_eq!(
            f.queue.get_action(&id).await.unwrap().unwrap().telegram_message_id,
            Some(99)
        );
    }
}
