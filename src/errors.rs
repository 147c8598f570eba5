//! Typed error hierarchy for overseer.
//!
//! The `Display` strings of the business errors are the exact sentences
//! returned to API and CLI callers, so they double as the user-visible text.
//!
//! - `ApprovalError`: approve/reject failures
//! - `DependencyError`: dependency graph mutations
//! - `AgentError`: Claude CLI subprocess failures, split retryable / terminal
//! - `ConfigError`: configuration loading

use std::path::PathBuf;

use thiserror::Error;

use crate::board::models::ActionStatus;

#[derive(Debug, Error, PartialEq)]
pub enum ApprovalError {
    #[error("Action not found")]
    NotFound,

    #[error("Action already {status}")]
    AlreadyProcessed { status: ActionStatus },

    #[error("Action expired")]
    Expired,

    #[error("Action already being processed")]
    InFlight,

    #[error("{0}")]
    ExecutorFailed(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum DependencyError {
    #[error("Task not found")]
    TaskNotFound,

    #[error("Dependency task not found")]
    DependencyNotFound,

    #[error("Cannot add dependency: would create circular dependency")]
    Circular,

    #[error("Dependency already exists")]
    AlreadyExists,
}

/// Substrings that mark a CLI failure as transient.
const TRANSIENT_PATTERNS: &[&str] = &[
    "econnreset",
    "econnrefused",
    "etimedout",
    "enotfound",
    "eai_again",
    "socket hang up",
    "network error",
    "connection reset",
    "connection refused",
    "rate limit",
    "rate_limit",
    "too many requests",
    "429",
    "502",
    "503",
    "504",
    "overloaded",
    "temporarily unavailable",
];

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Claude CLI timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("Failed to spawn Claude CLI '{cmd}': {source}")]
    Spawn {
        cmd: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Claude CLI exited with code {code}: {message}")]
    NonZeroExit { code: i32, message: String },

    #[error("Claude CLI I/O error: {0}")]
    Io(#[source] std::io::Error),
}

impl AgentError {
    /// Timeouts and spawn failures always retry; everything else only when
    /// its text looks like a transient network or rate-limit problem.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Spawn { .. } => true,
            Self::NonZeroExit { message, .. } => is_transient_message(message),
            Self::Io(e) => is_transient_message(&e.to_string()),
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::NonZeroExit { code, .. } => Some(*code),
            _ => None,
        }
    }
}

pub fn is_transient_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    TRANSIENT_PATTERNS.iter().any(|p| lower.contains(p))
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
