//! One-shot agent run: `overseer run`.

use anyhow::{Context, Result, bail};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;

use overseer::agent::{AgentStep, ClaudeRunner, StepSink, StepStatus, StepType};
use overseer::config::OverseerConfig;

pub async fn cmd_run(config: &OverseerConfig, prompt: &str, stream: bool) -> Result<()> {
    let prompt = if prompt == "-" {
        let mut buf = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buf)
            .await
            .context("Failed to read prompt from stdin")?;
        buf
    } else {
        prompt.to_string()
    };
    if prompt.trim().is_empty() {
        bail!("Prompt must not be empty");
    }

    let runner = ClaudeRunner::new(config.agent.clone());
    let result = if stream {
        let sink: StepSink = Arc::new(|step: AgentStep| print_step(&step));
        runner.run_prompt_streaming(&prompt, sink).await
    } else {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner} {msg} {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message(format!("Running {}", config.agent.claude_cmd));
        spinner.enable_steady_tick(Duration::from_millis(100));
        let result = runner.run_prompt(&prompt).await;
        spinner.finish_and_clear();
        result
    };

    if !result.output.is_empty() {
        println!("{}", result.output);
    }
    if !result.success {
        bail!(result.error.unwrap_or_else(|| "Claude CLI failed".into()));
    }
    Ok(())
}

fn print_step(step: &AgentStep) {
    match step.step_type {
        StepType::Thinking => println!("{} {}", style("thinking").dim(), style(&step.content).dim()),
        StepType::ToolUse => println!("{} {}", style("tool").cyan(), step.content),
        StepType::ToolResult => {
            let marker = if step.status == Some(StepStatus::Failed) {
                style("result").red()
            } else {
                style("result").green()
            };
            println!("{} {}", marker, first_line(&step.content));
        }
        StepType::Text => println!("{}", step.content),
        StepType::Error => eprintln!("{} {}", style("error").red().bold(), step.content),
        StepType::Complete => println!("{} {}", style("done").bold(), step.content),
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}
