//! Tandem - multi-provider chat orchestration from the command line
//!
//! - `tandem chat` runs one agent turn with streaming output
//! - `tandem subagents` runs delegated tasks in parallel
//! - `tandem providers` shows which providers are configured

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::prelude::*;

use tandem_core::ai::{build_http_client, create_provider, CredentialSource, ModelSelection, ProviderType};
use tandem_core::config::Config;
use tandem_core::paths;

mod session;

/// Tandem - streaming chat orchestration across Anthropic, OpenAI and Gemini
#[derive(Parser)]
#[command(name = "tandem")]
#[command(about = "Multi-provider streaming chat with tools and parallel subagents", long_about = None)]
struct Cli {
    /// Also write logs to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one message and run the agent loop until it answers
    Chat {
        /// Message to send
        message: String,

        /// Provider to use (anthropic, openai, google)
        #[arg(short, long)]
        provider: Option<String>,

        /// Model id; defaults to the configured or provider default
        #[arg(short, long)]
        model: Option<String>,

        /// Workspace directory handed to tools
        #[arg(short, long)]
        workspace: Option<PathBuf>,

        /// Approve every confirmation without asking
        #[arg(short, long)]
        yes: bool,
    },

    /// Run tasks as parallel subagents and print the combined summary
    ///
    /// Each task is `name=prompt`, or just `prompt` for a default name.
    Subagents {
        #[arg(short, long = "task", required = true)]
        tasks: Vec<String>,

        #[arg(short, long)]
        provider: Option<String>,

        #[arg(short, long)]
        model: Option<String>,

        #[arg(short, long)]
        workspace: Option<PathBuf>,
    },

    /// Show provider configuration status
    Providers,
}

fn init_logging(verbose: bool) -> Result<()> {
    let log_dir = paths::logs_dir();
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create {}", log_dir.display()))?;
    let log_file = std::fs::File::create(log_dir.join("tandem.log"))
        .context("failed to create log file")?;

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::sync::Mutex::new(log_file))
        .with_ansi(false);
    let stderr_layer = verbose.then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with(file_layer)
        .with(stderr_layer)
        .init();
    Ok(())
}

/// Resolve provider and model from flags, falling back to the config
fn select_model(
    config: &Arc<Config>,
    provider: Option<&str>,
    model: Option<String>,
) -> Result<ModelSelection> {
    let provider_type = match provider {
        Some(name) => name.parse::<ProviderType>()?,
        None => config.model.provider,
    };
    let model = model.unwrap_or_else(|| {
        if provider_type == config.model.provider {
            config.model_name()
        } else {
            provider_type.default_model().to_string()
        }
    });

    let credentials: Arc<dyn CredentialSource> = config.clone();
    let adapter = create_provider(provider_type, build_http_client()?, credentials);
    if !adapter.is_configured() {
        bail!(
            "{} is not configured. Set {} or add [providers.{}] to {}",
            provider_type,
            provider_type.api_key_env(),
            provider_type.storage_key(),
            paths::config_path().display()
        );
    }

    tracing::info!(provider = %provider_type, model = %model, "Model selected");
    Ok(ModelSelection::new(adapter, model)
        .with_max_tokens(config.model.max_tokens)
        .with_temperature(config.model.temperature))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let config = Arc::new(Config::load().context("failed to load config")?);

    match cli.command {
        Commands::Chat {
            message,
            provider,
            model,
            workspace,
            yes,
        } => {
            let selection = select_model(&config, provider.as_deref(), model)?;
            session::run_chat(&config, selection, message, workspace, yes).await
        }
        Commands::Subagents {
            tasks,
            provider,
            model,
            workspace,
        } => {
            let selection = select_model(&config, provider.as_deref(), model)?;
            session::run_subagents(&config, selection, &tasks, workspace).await
        }
        Commands::Providers => {
            let credentials: Arc<dyn CredentialSource> = config.clone();
            let http = build_http_client()?;
            for provider in ProviderType::all() {
                let adapter = create_provider(*provider, http.clone(), credentials.clone());
                let creds = credentials.credentials(*provider);
                println!(
                    "{:<14} {:<14} {:<20} {}",
                    provider.to_string(),
                    if adapter.is_configured() {
                        "configured"
                    } else {
                        "not configured"
                    },
                    provider.default_model(),
                    creds.base_url_for(*provider)
                );
            }
            Ok(())
        }
    }
}
