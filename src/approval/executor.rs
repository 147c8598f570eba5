use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::board::models::{ActionKind, ProposedAction};

/// What running an approved action produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Performs the side effect behind an approved action.
///
/// Failures are reported through [`ExecutionResult`]; implementations
/// should not panic or return early on business errors.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, action: &ProposedAction) -> ExecutionResult;
}

/// How long a single `gh` invocation may run before it is killed.
pub const DEFAULT_GH_TIMEOUT: Duration = Duration::from_secs(120);

/// Executes actions through the GitHub CLI.
#[derive(Debug, Clone)]
pub struct GhCliExecutor {
    gh_cmd: String,
    timeout: Duration,
}

impl Default for GhCliExecutor {
    fn default() -> Self {
        Self::new("gh")
    }
}

impl GhCliExecutor {
    pub fn new(gh_cmd: impl Into<String>) -> Self {
        Self {
            gh_cmd: gh_cmd.into(),
            timeout: DEFAULT_GH_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Argument vector for `gh` that performs `action`.
pub fn gh_args(action: &ProposedAction) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();
    match &action.kind {
        ActionKind::CreateIssue(p) => {
            push_all(
                &mut args,
                &["issue", "create", "--repo", &p.repo, "--title", &p.title, "--body", &p.body],
            );
            for label in &p.labels {
                args.push("--label".to_string());
                args.push(label.clone());
            }
        }
        ActionKind::CommentIssue(p) => {
            let number = p.number.to_string();
            push_all(
                &mut args,
                &["issue", "comment", &number, "--repo", &p.repo, "--body", &p.body],
            );
        }
        ActionKind::CloseIssue(p) => {
            let number = p.number.to_string();
            push_all(&mut args, &["issue", "close", &number, "--repo", &p.repo]);
            if let Some(comment) = &p.comment {
                args.push("--comment".to_string());
                args.push(comment.clone());
            }
        }
        ActionKind::CreatePullRequest(p) => {
            push_all(
                &mut args,
                &[
                    "pr", "create", "--repo", &p.repo, "--title", &p.title, "--body", &p.body,
                    "--head", &p.head, "--base", &p.base,
                ],
            );
        }
    }
    args
}

fn push_all(args: &mut Vec<String>, items: &[&str]) {
    args.extend(items.iter().map(|s| s.to_string()));
}

#[async_trait]
impl ActionExecutor for GhCliExecutor {
    async fn execute(&self, action: &ProposedAction) -> ExecutionResult {
        let args = gh_args(action);
        tracing::info!(action_type = action.type_name(), repo = action.kind.repo(), "running gh");

        let command = tokio::process::Command::new(&self.gh_cmd)
            .args(&args)
            .kill_on_drop(true)
            .output();
        let output = match tokio::time::timeout(self.timeout, command).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return ExecutionResult::failed(format!("Failed to run {}: {}", self.gh_cmd, e));
            }
            Err(_) => {
                tracing::warn!(
                    action_type = action.type_name(),
                    timeout_secs = self.timeout.as_secs(),
                    "gh timed out"
                );
                return ExecutionResult::failed(format!(
                    "{} timed out after {}s",
                    self.gh_cmd,
                    self.timeout.as_secs()
                ));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = if stderr.trim().is_empty() {
                format!("{} exited with {}", self.gh_cmd, output.status)
            } else {
                stderr.trim().to_string()
            };
            tracing::warn!(action_type = action.type_name(), error = %message, "gh failed");
            return ExecutionResult::failed(message);
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let mut data = serde_json::json!({ "type": action.type_name(), "output": stdout });
        // `gh issue create` and `gh pr create` print the new URL last.
        if let Some(url) = stdout.lines().rev().find(|l| l.starts_with("https://")) {
            data["url"] = serde_json::Value::String(url.to_string());
        }
        ExecutionResult::ok(data)
    }
}
