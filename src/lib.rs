pub mod agent;
pub mod approval;
pub mod board;
pub mod clock;
pub mod config;
pub mod errors;
pub mod plan;
