//! Claude CLI integration: subprocess runner, stream demultiplexer, retry.
//!
//! A run spawns the CLI with the prompt on stdin. In streaming mode its
//! NDJSON stdout is decoded into [`AgentStep`]s which are handed to a
//! [`StepSink`] as they arrive.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub mod retry;
pub mod runner;
pub mod stream;

pub use retry::{RetryConfig, with_retry};
pub use runner::ClaudeRunner;
pub use stream::{LineBuffer, StreamDemux};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Thinking,
    ToolUse,
    ToolResult,
    Text,
    Error,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Running,
    Completed,
    Failed,
}

/// One observable unit of agent progress. Broadcast, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentStep {
    /// Monotonic within a run, starting at 1.
    pub id: u64,
    #[serde(rename = "type")]
    pub step_type: StepType,
    pub timestamp: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_input: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<StepStatus>,
}

/// Receives steps as they are produced.
pub type StepSink = Arc<dyn Fn(AgentStep) + Send + Sync>;

/// Final outcome of an agent run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentRunResult {
    pub success: bool,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
