#![allow(clippy::multiple_crate_versions)]

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use hal_downloader::api::client::{DownloaderClient, PanelContext};
use hal_downloader::api::server::{ApiServer, AppState};
use hal_downloader::config::Config;
use hal_downloader::models::{HfHub, JobState};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "hal-downloader")]
#[command(about = "Model registry and download service for the hal.fun panel", long_about = None)]
struct Cli {
    /// Config file (default: ~/.config/hal-downloader/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Service URL for client commands (default: derived from [server])
    #[arg(long, global = true)]
    url: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service (default)
    Serve,
    /// List catalog models with their enabled/downloaded state
    List,
    /// Mark a model as enabled
    Enable { name: String },
    /// Mark a model as disabled
    Disable { name: String },
    /// Download one or more models
    Download {
        #[arg(required = true)]
        names: Vec<String>,
        /// Start a background job and return its id
        #[arg(long)]
        detach: bool,
    },
    /// Show a background download job
    Job { id: u64 },
    /// Cancel a background download job
    Cancel { id: u64 },
    /// Check which models matching a name are on disk
    Check { name: String },
    /// Log in to the model hub
    Login {
        /// Token to use; read from --token-env when omitted
        token: Option<String>,
        #[arg(long, default_value = "HF_TOKEN")]
        token_env: String,
    },
    /// Log out of the model hub
    Logout,
    /// Show login status
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hal_downloader=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_server(config).await,
        command => {
            let url = cli
                .url
                .unwrap_or_else(|| config.server.client_base_url());
            let client = DownloaderClient::new(&url)?;
            run_client(client, command).await
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        return Ok(Config::load()?);
    };

    let mut config = Config::load_from(path)
        .with_context(|| format!("Loading config from {}", path.display()))?;
    config.apply_env_overrides();
    Ok(config)
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    tracing::info!("Starting hal-downloader service");

    let hub = Arc::new(HfHub::new(&config.hub, config.storage.hub_cache_dir())?);
    let state = AppState::from_config(&config, hub)?;

    ApiServer::new(state, &config.server)
        .start(shutdown_signal())
        .await?;

    Ok(())
}

async fn run_client(client: DownloaderClient, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Serve => bail!("serve is not a client command"),
        Commands::List => {
            let context = PanelContext::load(client).await?;
            println!(
                "Hub session: {}",
                if context.is_logged_in() {
                    "logged in"
                } else {
                    "logged out"
                }
            );
            for row in context.rows() {
                println!(
                    "[{}] {:<40} {:<12}{}",
                    if row.enabled { "x" } else { " " },
                    row.name,
                    if row.downloaded {
                        "downloaded"
                    } else {
                        "missing"
                    },
                    if row.gated { " (license required)" } else { "" }
                );
            }
        }
        Commands::Enable { name } => toggle(client, &name, true).await?,
        Commands::Disable { name } => toggle(client, &name, false).await?,
        Commands::Download { names, detach } => {
            if detach {
                let accepted = client.download_detached(&names).await?;
                println!("Job {}: {}", accepted.job_id, accepted.status);
                return Ok(());
            }

            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} [{elapsed_precise}] {msg}")
                    .context("Invalid progress template")?,
            );
            pb.set_message(format!("Downloading {}", names.join(", ")));
            pb.enable_steady_tick(Duration::from_millis(120));

            let mut context = PanelContext::new(client);
            let result = context.download(&names).await;
            pb.finish_and_clear();

            let response = result?;
            for item in &response.results {
                println!("{} {}", if item.ok { "✓" } else { "✗" }, item.message);
            }
            if let Some(error) = response.error {
                bail!(error);
            }
        }
        Commands::Job { id } => print_job(&client.job(id).await?)?,
        Commands::Cancel { id } => print_job(&client.cancel_job(id).await?)?,
        Commands::Check { name } => println!("{}", client.check(&name).await?),
        Commands::Login { token, token_env } => {
            let token = match token {
                Some(token) => token,
                None => std::env::var(&token_env)
                    .with_context(|| format!("No token given and ${token_env} is not set"))?,
            };
            let mut context = PanelContext::new(client);
            let response = context.login(&token).await?;
            println!("{} as {}", response.status, response.account);
        }
        Commands::Logout => {
            let mut context = PanelContext::new(client);
            context.logout().await?;
            println!("{}", context.status_message().unwrap_or_default());
        }
        Commands::Status => {
            let logged_in = client.login_status().await?;
            println!("{}", if logged_in { "Logged in" } else { "Logged out" });
        }
    }

    Ok(())
}

async fn toggle(client: DownloaderClient, name: &str, enabled: bool) -> anyhow::Result<()> {
    let mut context = PanelContext::load(client).await?;
    if !context.catalog().iter().any(|e| e.identifier() == name) {
        tracing::warn!("{} is not in the model catalog", name);
    }
    context.set_enabled(name, enabled).await?;
    println!("{} {name}", if enabled { "Enabled" } else { "Disabled" });
    Ok(())
}

fn print_job(job: &hal_downloader::models::DownloadJob) -> anyhow::Result<()> {
    let state = match job.state {
        JobState::Running => "running",
        JobState::Completed => "completed",
        JobState::Failed => "failed",
        JobState::Cancelled => "cancelled",
    };
    println!("Job {} ({}): {}", job.id, job.model_names.join(", "), state);
    if let Some(report) = &job.report {
        for item in &report.results {
            println!("  {} {}", if item.ok { "✓" } else { "✗" }, item.message);
        }
    }
    if job.state == JobState::Failed {
        bail!(job.error.clone().unwrap_or_else(|| "Download failed".to_string()));
    }
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down...");
        },
        () = terminate => {
            tracing::info!("Received SIGTERM, shutting down...");
        },
    }
}
