//! Pending action commands: `overseer approvals`.

use anyhow::{Result, bail};
use console::style;
use std::path::Path;

use overseer::board::models::{ActionStatus, PendingAction};
use overseer::board::server::build_state;
use overseer::config::OverseerConfig;

use super::super::ApprovalCommands;

pub async fn cmd_approvals(
    config: &OverseerConfig,
    data_dir: &Path,
    command: ApprovalCommands,
) -> Result<()> {
    let state = build_state(config, data_dir)?;
    let queue = &state.approvals;

    match command {
        ApprovalCommands::List { status } => {
            let status = status
                .as_deref()
                .map(str::parse::<ActionStatus>)
                .transpose()
                .map_err(anyhow::Error::msg)?;
            let actions = queue.list(status).await?;
            print_actions(&actions);
        }
        ApprovalCommands::Approve { id, yes } => {
            let Some(action) = queue.get_action(&id).await? else {
                bail!("Action not found");
            };
            if !yes {
                use dialoguer::Confirm;

                println!("{}", action.action.description);
                let confirm = Confirm::new()
                    .with_prompt(format!(
                        "Run {} on {}?",
                        action.action.type_name(),
                        action.action.kind.repo()
                    ))
                    .default(false)
                    .interact()
                    .unwrap_or(false);
                if !confirm {
                    println!("Approval cancelled");
                    return Ok(());
                }
            }

            let outcome = queue.approve(&id).await?;
            if !outcome.success {
                bail!(outcome.error.unwrap_or_else(|| "Approval failed".into()));
            }
            println!("{} {}", style("Approved").green().bold(), id);
            if let Some(data) = outcome.result.and_then(|r| r.data) {
                println!("{}", serde_json::to_string_pretty(&data)?);
            }
        }
        ApprovalCommands::Reject { id, reason } => {
            let outcome = queue.reject(&id, reason).await?;
            if !outcome.success {
                bail!(outcome.error.unwrap_or_else(|| "Rejection failed".into()));
            }
            println!("{} {}", style("Rejected").yellow().bold(), id);
        }
    }
    Ok(())
}

fn print_actions(actions: &[PendingAction]) {
    if actions.is_empty() {
        println!("No actions.");
        return;
    }

    println!();
    println!(
        "{:<38} {:<10} {:<20} {:<20} Description",
        "ID", "Status", "Type", "Expires"
    );
    println!(
        "{:<38} {:<10} {:<20} {:<20} -----------",
        "-".repeat(36),
        "------",
        "----",
        "-------"
    );
    for action in actions {
        let expires = chrono::DateTime::from_timestamp_millis(action.expires_at)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        let status = match action.status {
            ActionStatus::Pending => style(action.status.as_str()).cyan(),
            ActionStatus::Approved => style(action.status.as_str()).green(),
            ActionStatus::Rejected => style(action.status.as_str()).yellow(),
            ActionStatus::Expired => style(action.status.as_str()).dim(),
        };
        println!(
            "{:<38} {:<10} {:<20} {:<20} {}",
            action.id,
            status,
            action.action.type_name(),
            expires,
            action.action.description
        );
    }
    println!();
}
