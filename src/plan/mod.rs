pub mod parser;

pub use parser::{PlanAnalysis, SuggestedTask, TaskType, analyze_plan};
