//! Plan document commands: `overseer plan`.

use anyhow::{Context, Result, bail};
use std::path::Path;

use overseer::board::server::build_state;
use overseer::config::OverseerConfig;
use overseer::plan::analyze_plan;

use super::super::PlanCommands;

pub async fn cmd_plan(config: &OverseerConfig, data_dir: &Path, command: PlanCommands) -> Result<()> {
    match command {
        PlanCommands::Analyze { file, project_id } => {
            let markdown = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let analysis = analyze_plan(&markdown);

            if let Some(project_id) = project_id {
                let state = build_state(config, data_dir)?;
                if state.repo.get_project(project_id).await?.is_none() {
                    bail!("Project {} not found", project_id);
                }
                let mut created = 0;
                for suggested in &analysis.suggested_tasks {
                    if state
                        .repo
                        .create_task(project_id, suggested.to_new_task())
                        .await?
                        .is_some()
                    {
                        created += 1;
                    }
                }
                eprintln!("Created {} tasks in project {}", created, project_id);
            }

            println!("{}", serde_json::to_string_pretty(&analysis)?);
        }
    }
    Ok(())
}
