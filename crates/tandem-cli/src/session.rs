//! Terminal rendering of agent turns and interactive confirmation

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use tandem_core::agent::subagent::{combined_summary, SubagentPool, SubagentStatus, SubagentTask};
use tandem_core::agent::{AgentEvent, AgenticOrchestrator, EventSink, OrchestratorConfig};
use tandem_core::ai::{build_http_client, ModelSelection};
use tandem_core::config::Config;
use tandem_core::mcp::register_mcp_tools;
use tandem_core::tools::{
    AllowAll, AutoApprove, ChannelConfirmer, Confirmer, PendingConfirmation, ToolContext,
    ToolRegistry,
};

/// Build the orchestrator, pulling tools from any configured MCP servers
async fn orchestrator(
    config: &Config,
    workspace: Option<PathBuf>,
) -> Result<AgenticOrchestrator> {
    let mut registry = ToolRegistry::new();
    if !config.mcp.servers.is_empty() {
        let http = build_http_client()?;
        let count = register_mcp_tools(&config.mcp, &http, &mut registry).await;
        tracing::info!(count, "MCP tools available");
    }

    Ok(AgenticOrchestrator::with_subagents(
        registry,
        Arc::new(AllowAll),
        config.agent.tool_timeout(),
        config.subagents.to_subagent_config(),
        OrchestratorConfig {
            max_iterations: config.agent.max_iterations,
            workspace,
            ..Default::default()
        },
    ))
}

/// Answer confirmations from stdin, one line per request
fn spawn_stdin_confirmer(mut requests: mpsc::UnboundedReceiver<PendingConfirmation>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(pending) = requests.recv().await {
            eprintln!(
                "\n[confirm] {} ({} risk): {}",
                pending.request.tool_name, pending.request.risk, pending.request.reason
            );
            if !pending.request.details.is_empty() {
                eprintln!("{}", pending.request.details);
            }
            eprint!("Allow? [y/N] ");
            let answer = matches!(
                lines.next_line().await,
                Ok(Some(line)) if matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
            );
            pending.respond(answer);
        }
    });
}

/// Cancel `cancel` on Ctrl-C
fn cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });
}

fn print_subagent_status(index: usize, name: &str, status: SubagentStatus) {
    let label = match status {
        SubagentStatus::Pending => "pending",
        SubagentStatus::Running => "running",
        SubagentStatus::Succeeded => "done",
        SubagentStatus::Failed => "failed",
    };
    eprintln!("  [subagent {}] {} - {}", index + 1, name, label);
}

pub async fn run_chat(
    config: &Config,
    selection: ModelSelection,
    message: String,
    workspace: Option<PathBuf>,
    auto_approve: bool,
) -> Result<()> {
    let confirmer: Arc<dyn Confirmer> = if auto_approve {
        Arc::new(AutoApprove)
    } else {
        let (confirmer, requests) = ChannelConfirmer::new();
        spawn_stdin_confirmer(requests);
        Arc::new(confirmer)
    };

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let mut events = orchestrator(config, workspace).await?.run(
        selection,
        Vec::new(),
        message,
        confirmer,
        cancel,
    );

    let mut failed = None;
    let mut stdout = std::io::stdout();
    while let Some(event) = events.recv().await {
        match event {
            AgentEvent::TextDelta { delta } => {
                print!("{}", delta);
                stdout.flush()?;
            }
            AgentEvent::ToolCallStart { name, .. } => eprintln!("\n[tool] {}", name),
            AgentEvent::ToolResult { name, is_error, .. } if is_error => {
                eprintln!("[tool] {} failed", name)
            }
            AgentEvent::SubagentUpdate(update) => {
                print_subagent_status(update.index, &update.task_name, update.status)
            }
            AgentEvent::Usage {
                input_tokens,
                output_tokens,
            } => tracing::info!(input_tokens, output_tokens, "Usage"),
            AgentEvent::Error { message, .. } => failed = Some(message),
            AgentEvent::Done { history } => {
                tracing::info!(messages = history.len(), "Turn finished");
                println!();
            }
            _ => {}
        }
    }

    match failed {
        Some(message) => anyhow::bail!(message),
        None => Ok(()),
    }
}

/// Parse `name=prompt`; a bare prompt gets the default name
fn parse_task(index: usize, raw: &str) -> SubagentTask {
    match raw.split_once('=') {
        Some((name, prompt)) if !name.trim().is_empty() && !name.contains(' ') => {
            SubagentTask::new(name.trim(), prompt.trim())
        }
        _ => SubagentTask::new(format!("Subagent {}", index + 1), raw.trim()),
    }
}

pub async fn run_subagents(
    config: &Config,
    selection: ModelSelection,
    raw_tasks: &[String],
    workspace: Option<PathBuf>,
) -> Result<()> {
    let tasks: Vec<SubagentTask> = raw_tasks
        .iter()
        .enumerate()
        .map(|(i, raw)| parse_task(i, raw))
        .collect();

    let orchestrator = orchestrator(config, workspace.clone()).await?;
    let (events, mut rx) = EventSink::channel();
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let mut ctx = ToolContext::default()
        .with_events(events)
        .with_cancel(cancel)
        .with_model(selection.clone());
    ctx.workspace = workspace;

    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let AgentEvent::SubagentUpdate(update) = event {
                print_subagent_status(update.index, &update.task_name, update.status);
            }
        }
    });

    let pool = SubagentPool::new(
        orchestrator.executor().clone(),
        config.subagents.to_subagent_config(),
    );
    let results = pool.run(selection, tasks, &ctx).await;
    drop(ctx);
    let _ = printer.await;

    print!("{}", combined_summary(&results));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_task() {
        assert_eq!(
            parse_task(0, "docs=Summarize the README"),
            SubagentTask::new("docs", "Summarize the README")
        );
        assert_eq!(
            parse_task(1, "Explain why a = b here"),
            SubagentTask::new("Subagent 2", "Explain why a = b here")
        );
    }
}
