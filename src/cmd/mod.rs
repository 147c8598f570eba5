//! CLI command implementations.
//!
//! Each submodule owns one `Commands` variant:
//!
//! | Module      | Commands handled |
//! |-------------|------------------|
//! | `serve`     | `Serve`          |
//! | `init`      | `Init`           |
//! | `approvals` | `Approvals`      |
//! | `deps`      | `Deps`           |
//! | `run`       | `Run`            |
//! | `plan`      | `Plan`           |

pub mod approvals;
pub mod deps;
pub mod init;
pub mod plan;
pub mod run;
pub mod serve;

pub use approvals::cmd_approvals;
pub use deps::cmd_deps;
pub use init::cmd_init;
pub use plan::cmd_plan;
pub use run::cmd_run;
pub use serve::cmd_serve;
