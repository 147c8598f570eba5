//! Task dependency commands: `overseer deps`.

use anyhow::{Result, bail};
use console::style;
use std::path::Path;

use overseer::board::models::{DependencyType, TaskStatus};
use overseer::board::server::build_state;
use overseer::config::OverseerConfig;

use super::super::DepsCommands;

pub async fn cmd_deps(config: &OverseerConfig, data_dir: &Path, command: DepsCommands) -> Result<()> {
    let state = build_state(config, data_dir)?;
    let repo = &state.repo;

    match command {
        DepsCommands::Add {
            task,
            depends_on,
            dependency_type,
        } => {
            let dependency_type: DependencyType =
                dependency_type.parse().map_err(anyhow::Error::msg)?;
            let outcome = repo.add_dependency(&task, &depends_on, dependency_type).await?;
            if !outcome.success {
                bail!(outcome.error.unwrap_or_else(|| "Failed to add dependency".into()));
            }
            println!("{} {} -> {}", style("Added").green(), task, depends_on);
        }
        DepsCommands::Remove { task, depends_on } => {
            if !repo.remove_dependency(&task, &depends_on).await? {
                bail!("Dependency not found");
            }
            println!("{} {} -> {}", style("Removed").yellow(), task, depends_on);
        }
        DepsCommands::Check { task } => {
            if repo.get_task(&task).await?.is_none() {
                bail!("Task not found");
            }
            let dependencies = repo.get_dependencies(&task).await?;
            if dependencies.is_empty() {
                println!("{} has no dependencies.", task);
            } else {
                for dep in &dependencies {
                    let marker = if dep.status == TaskStatus::Completed {
                        style("done").green()
                    } else {
                        style(dep.status.as_str()).red()
                    };
                    println!("  [{}] {} {}", marker, dep.id, dep.title);
                }
            }

            if repo.are_dependencies_met(&task).await? {
                println!("{}", style("All dependencies met").green().bold());
            } else {
                println!("{}", style("Blocked by unfinished dependencies").red().bold());
                std::process::exit(1);
            }
        }
    }
    Ok(())
}
