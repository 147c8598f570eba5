use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Task id used for pending actions that were proposed outside of any task.
pub const MANUAL_TASK_ID: &str = "manual";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub path: String,
    pub github_repo: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Rejected,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "rejected" => Ok(Self::Rejected),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid task status: {}", s)),
        }
    }
}

/// Workflow lane on the board. Independent of [`TaskStatus`], which tracks
/// approval/execution state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KanbanStatus {
    Backlog,
    Todo,
    InProgress,
    Review,
    Done,
}

impl KanbanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Backlog => "backlog",
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Review => "review",
            Self::Done => "done",
        }
    }
}

impl FromStr for KanbanStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "backlog" => Ok(Self::Backlog),
            "todo" => Ok(Self::Todo),
            "in_progress" => Ok(Self::InProgress),
            "review" => Ok(Self::Review),
            "done" => Ok(Self::Done),
            _ => Err(format!("Invalid kanban status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(format!("Invalid priority: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub project_id: i64,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub kanban_status: KanbanStatus,
    pub priority: Priority,
    pub suggested_actions: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
    pub approved_by: Option<String>,
}

/// Fields accepted when creating a task. Everything except the title is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub kanban_status: Option<KanbanStatus>,
    #[serde(default)]
    pub suggested_actions: Vec<String>,
}

/// Partial update for a task; `None` leaves the column untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub kanban_status: Option<KanbanStatus>,
    pub priority: Option<Priority>,
    pub suggested_actions: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DependencyType {
    #[default]
    DependsOn,
    Blocks,
}

impl DependencyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DependsOn => "depends_on",
            Self::Blocks => "blocks",
        }
    }
}

impl FromStr for DependencyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "depends_on" => Ok(Self::DependsOn),
            "blocks" => Ok(Self::Blocks),
            _ => Err(format!("Invalid dependency type: {}", s)),
        }
    }
}

/// Directed edge: `task_id` depends on `depends_on_task_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskDependency {
    pub task_id: String,
    pub depends_on_task_id: String,
    #[serde(rename = "type")]
    pub dependency_type: DependencyType,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskWithDependencies {
    #[serde(flatten)]
    pub task: Task,
    /// Edges where this task is the dependent side.
    pub depends_on: Vec<TaskDependency>,
    /// Edges where other tasks depend on this one.
    pub blocks: Vec<TaskDependency>,
}

/// Result of a dependency mutation, serialized as-is by the API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DependencyOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DependencyOutcome {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
        }
    }
}

// ── Pending actions ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "expired" => Ok(Self::Expired),
            _ => Err(format!("Invalid action status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreateIssuePayload {
    pub repo: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommentIssuePayload {
    pub repo: String,
    pub number: u64,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CloseIssuePayload {
    pub repo: String,
    pub number: u64,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreatePullRequestPayload {
    pub repo: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub head: String,
    #[serde(default = "default_base_branch")]
    pub base: String,
}

fn default_base_branch() -> String {
    "main".to_string()
}

/// The side-effecting operation a pending action will perform once approved.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    CreateIssue(CreateIssuePayload),
    CommentIssue(CommentIssuePayload),
    CloseIssue(CloseIssuePayload),
    CreatePullRequest(CreatePullRequestPayload),
}

impl ActionKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::CreateIssue(_) => "create_issue",
            Self::CommentIssue(_) => "comment_issue",
            Self::CloseIssue(_) => "close_issue",
            Self::CreatePullRequest(_) => "create_pull_request",
        }
    }

    pub fn repo(&self) -> &str {
        match self {
            Self::CreateIssue(p) => &p.repo,
            Self::CommentIssue(p) => &p.repo,
            Self::CloseIssue(p) => &p.repo,
            Self::CreatePullRequest(p) => &p.repo,
        }
    }

    fn validate(&self) -> Result<(), String> {
        let repo = self.repo();
        let mut parts = repo.split('/');
        let well_formed = matches!(
            (parts.next(), parts.next(), parts.next()),
            (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty()
        );
        if !well_formed {
            return Err(format!("Invalid repo '{}': expected owner/name", repo));
        }
        match self {
            Self::CreateIssue(p) if p.title.trim().is_empty() => {
                Err("Issue title must not be empty".to_string())
            }
            Self::CreatePullRequest(p) if p.title.trim().is_empty() => {
                Err("Pull request title must not be empty".to_string())
            }
            Self::CreatePullRequest(p) if p.head.trim().is_empty() => {
                Err("Pull request head branch must not be empty".to_string())
            }
            Self::CommentIssue(p) if p.body.trim().is_empty() => {
                Err("Comment body must not be empty".to_string())
            }
            _ => Ok(()),
        }
    }
}

/// A proposed action: a human-readable description plus a typed payload.
///
/// Serialized as `{"type": "...", "description": "...", "payload": {...}}`.
/// Deserialization rejects unknown types and payloads that do not match the
/// variant's schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAction", into = "RawAction")]
pub struct ProposedAction {
    pub description: String,
    pub kind: ActionKind,
}

impl ProposedAction {
    pub fn new(description: impl Into<String>, kind: ActionKind) -> Self {
        Self {
            description: description.into(),
            kind,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }
}

#[derive(Serialize, Deserialize)]
struct RawAction {
    #[serde(rename = "type")]
    action_type: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    payload: serde_json::Value,
}

impl TryFrom<RawAction> for ProposedAction {
    type Error = String;

    fn try_from(raw: RawAction) -> Result<Self, Self::Error> {
        fn payload<T: serde::de::DeserializeOwned>(
            action_type: &str,
            value: serde_json::Value,
        ) -> Result<T, String> {
            serde_json::from_value(value)
                .map_err(|e| format!("Invalid payload for {}: {}", action_type, e))
        }

        let kind = match raw.action_type.as_str() {
            "create_issue" => ActionKind::CreateIssue(payload(&raw.action_type, raw.payload)?),
            "comment_issue" => ActionKind::CommentIssue(payload(&raw.action_type, raw.payload)?),
            "close_issue" => ActionKind::CloseIssue(payload(&raw.action_type, raw.payload)?),
            "create_pull_request" => {
                ActionKind::CreatePullRequest(payload(&raw.action_type, raw.payload)?)
            }
            other => return Err(format!("Unknown action type: {}", other)),
        };
        kind.validate()?;
        Ok(Self {
            description: raw.description,
            kind,
        })
    }
}

impl From<ProposedAction> for RawAction {
    fn from(action: ProposedAction) -> Self {
        let action_type = action.type_name().to_string();
        let payload = match action.kind {
            ActionKind::CreateIssue(p) => serde_json::to_value(p),
            ActionKind::CommentIssue(p) => serde_json::to_value(p),
            ActionKind::CloseIssue(p) => serde_json::to_value(p),
            ActionKind::CreatePullRequest(p) => serde_json::to_value(p),
        }
        .unwrap_or_default();
        Self {
            action_type,
            description: action.description,
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingAction {
    pub id: String,
    pub task_id: String,
    pub action: ProposedAction,
    /// Epoch milliseconds.
    pub created_at: i64,
    /// Epoch milliseconds. Fixed at creation; never extended.
    pub expires_at: i64,
    pub status: ActionStatus,
    pub telegram_message_id: Option<i64>,
}

impl PendingAction {
    pub fn is_manual(&self) -> bool {
        self.task_id == MANUAL_TASK_ID
    }

    pub fn is_overdue(&self, now_ms: i64) -> bool {
        self.expires_at < now_ms
    }
}
