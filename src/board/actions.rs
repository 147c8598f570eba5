//! Pending action store.
//!
//! Records are never deleted; they form the audit trail of every proposed
//! side effect. Status only ever moves out of `pending`, and every such move
//! is a single conditional `UPDATE ... WHERE status = 'pending'` whose
//! affected-row count tells the caller whether it won.

use std::str::FromStr;

use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, params};

use super::db::BoardDb;
use super::models::{ActionStatus, PendingAction, ProposedAction};

const ACTION_COLUMNS: &str =
    "id, task_id, action, created_at, expires_at, status, telegram_message_id";

impl BoardDb {
    pub fn insert_pending_action(&self, action: &PendingAction) -> Result<()> {
        let encoded =
            serde_json::to_string(&action.action).context("Failed to encode proposed action")?;
        self.conn
            .execute(
                "INSERT INTO pending_actions
                    (id, task_id, action_type, action, created_at, expires_at, status, telegram_message_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    action.id,
                    action.task_id,
                    action.action.type_name(),
                    encoded,
                    action.created_at,
                    action.expires_at,
                    action.status.as_str(),
                    action.telegram_message_id,
                ],
            )
            .context("Failed to insert pending action")?;
        Ok(())
    }

    pub fn get_pending_action(&self, id: &str) -> Result<Option<PendingAction>> {
        let sql = format!("SELECT {} FROM pending_actions WHERE id = ?1", ACTION_COLUMNS);
        let row = self
            .conn
            .query_row(&sql, params![id], ActionRow::from_row)
            .optional()
            .context("Failed to query pending action")?;
        row.map(ActionRow::into_pending_action).transpose()
    }

    /// All actions, newest first, optionally filtered by status.
    pub fn list_pending_actions(&self, status: Option<ActionStatus>) -> Result<Vec<PendingAction>> {
        let (sql, filter) = match status {
            Some(s) => (
                format!(
                    "SELECT {} FROM pending_actions WHERE status = ?1 ORDER BY created_at DESC, rowid DESC",
                    ACTION_COLUMNS
                ),
                Some(s.as_str()),
            ),
            None => (
                format!(
                    "SELECT {} FROM pending_actions ORDER BY created_at DESC, rowid DESC",
                    ACTION_COLUMNS
                ),
                None,
            ),
        };
        let mut stmt = self
            .conn
            .prepare(&sql)
            .context("Failed to prepare list_pending_actions")?;
        let rows = match filter {
            Some(f) => stmt.query_map(params![f], ActionRow::from_row),
            None => stmt.query_map([], ActionRow::from_row),
        }
        .context("Failed to query pending actions")?;

        let mut actions = Vec::new();
        for row in rows {
            actions.push(row.context("Failed to read pending action row")?.into_pending_action()?);
        }
        Ok(actions)
    }

    /// Move `id` from `pending` to `to`. Returns false when the record is
    /// missing or already left `pending`, in which case nothing is written.
    pub fn transition_action(&self, id: &str, to: ActionStatus) -> Result<bool> {
        if !to.is_terminal() {
            anyhow::bail!("Refusing to move action {} back to pending", id);
        }
        let count = self
            .conn
            .execute(
                "UPDATE pending_actions SET status = ?1 WHERE id = ?2 AND status = 'pending'",
                params![to.as_str(), id],
            )
            .context("Failed to update pending action status")?;
        Ok(count > 0)
    }

    /// Expire every pending action whose deadline is strictly before `now_ms`.
    /// Returns the number of records expired.
    pub fn expire_overdue_actions(&self, now_ms: i64) -> Result<usize> {
        self.conn
            .execute(
                "UPDATE pending_actions SET status = 'expired'
                 WHERE status = 'pending' AND expires_at < ?1",
                params![now_ms],
            )
            .context("Failed to expire overdue actions")
    }

    pub fn set_action_telegram_message_id(&self, id: &str, message_id: i64) -> Result<bool> {
        let count = self
            .conn
            .execute(
                "UPDATE pending_actions SET telegram_message_id = ?1 WHERE id = ?2",
                params![message_id, id],
            )
            .context("Failed to set telegram message id")?;
        Ok(count > 0)
    }
}

struct ActionRow {
    id: String,
    task_id: String,
    action: String,
    created_at: i64,
    expires_at: i64,
    status: String,
    telegram_message_id: Option<i64>,
}

impl ActionRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            task_id: row.get(1)?,
            action: row.get(2)?,
            created_at: row.get(3)?,
            expires_at: row.get(4)?,
            status: row.get(5)?,
            telegram_message_id: row.get(6)?,
        })
    }

    fn into_pending_action(self) -> Result<PendingAction> {
        let status = ActionStatus::from_str(&self.status)
            .map_err(|e| anyhow::anyhow!(e))
            .context("Failed to parse action status")?;
        let action: ProposedAction = serde_json::from_str(&self.action)
            .with_context(|| format!("Failed to decode action {}", self.id))?;
        Ok(PendingAction {
            id: self.id,
            task_id: self.task_id,
            action,
            created_at: self.created_at,
            expires_at: self.expires_at,
            status,
            telegram_message_id: self.telegram_message_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::models::{ActionKind, CommentIssuePayload, MANUAL_TASK_ID};

    fn sample(id: &str, created_at: i64, expires_at: i64) -> PendingAction {
        PendingAction {
            id: id.to_string(),
            task_id: MANUAL_TASK_ID.to_string(),
            action: ProposedAction::new(
                "Comment on issue",
                ActionKind::CommentIssue(CommentIssuePayload {
                    repo: "acme/widgets".to_string(),
                    number: 7,
                    body: "LGTM".to_string(),
                }),
            ),
            created_at,
            expires_at,
            status: ActionStatus::Pending,
            telegram_message_id: None,
        }
    }

    #[test]
    fn test_insert_and_get_roundtrips_payload() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        let action = sample("a1", 1_000, 2_000);
        db.insert_pending_action(&action)?;
        assert_eq!(db.get_pending_action("a1")?, Some(action));
        assert!(db.get_pending_action("missing")?.is_none());
        Ok(())
    }

    #[test]
    fn test_transition_is_one_way() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        db.insert_pending_action(&sample("a1", 0, 10))?;

        assert!(db.transition_action("a1", ActionStatus::Approved)?);
        assert!(!db.transition_action("a1", ActionStatus::Rejected)?);
        assert!(!db.transition_action("a1", ActionStatus::Expired)?);
        assert!(db.transition_action("a1", ActionStatus::Pending).is_err());

        let stored = db.get_pending_action("a1")?.expect("action should exist");
        assert_eq!(stored.status, ActionStatus::Approved);
        assert!(!db.transition_action("missing", ActionStatus::Approved)?);
        Ok(())
    }

    #[test]
    fn test_expire_overdue_uses_strict_deadline() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        db.insert_pending_action(&sample("due", 0, 100))?;
        db.insert_pending_action(&sample("later", 0, 500))?;

        assert_eq!(db.expire_overdue_actions(100)?, 0, "deadline equal to now is not overdue");
        assert_eq!(db.expire_overdue_actions(101)?, 1);

        assert_eq!(db.get_pending_action("due")?.unwrap().status, ActionStatus::Expired);
        assert_eq!(db.get_pending_action("later")?.unwrap().status, ActionStatus::Pending);
        Ok(())
    }

    #[test]
    fn test_expire_skips_processed_actions() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        db.insert_pending_action(&sample("a1", 0, 10))?;
        db.transition_action("a1", ActionStatus::Rejected)?;
        assert_eq!(db.expire_overdue_actions(1_000)?, 0);
        assert_eq!(db.get_pending_action("a1")?.unwrap().status, ActionStatus::Rejected);
        Ok(())
    }

    #[test]
    fn test_list_filters_and_orders_newest_first() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        db.insert_pending_action(&sample("old", 1, 1_000))?;
        db.insert_pending_action(&sample("new", 2, 1_000))?;
        db.transition_action("old", ActionStatus::Approved)?;

        let all: Vec<String> = db.list_pending_actions(None)?.into_iter().map(|a| a.id).collect();
        assert_eq!(all, vec!["new".to_string(), "old".to_string()]);

        let pending = db.list_pending_actions(Some(ActionStatus::Pending))?;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "new");
        Ok(())
    }

    #[test]
    fn test_set_telegram_message_id() -> Result<()> {
        let db = BoardDb::new_in_memory()?;
        db.insert_pending_action(&sample("a1", 0, 10))?;
        assert!(db.set_action_telegram_message_id("a1", 4242)?);
        assert_eq!(db.get_pending_action("a1")?.unwrap().telegram_message_id, Some(4242));
        assert!(!db.set_action_telegram_message_id("missing", 1)?);
        Ok(())
    }
}
