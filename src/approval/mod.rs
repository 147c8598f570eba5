//! Human-in-the-loop approval of side-effecting actions.

pub mod executor;
pub mod queue;

pub use executor::{ActionExecutor, ExecutionResult, GhCliExecutor};
pub use queue::{ApprovalOutcome, ApprovalQueue, DEFAULT_TIMEOUT_MINUTES, MAX_TIMEOUT_MINUTES};
