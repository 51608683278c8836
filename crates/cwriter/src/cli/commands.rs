//! # CLI Layer
//!
//! The only place in the workspace that:
//! - parses arguments
//! - installs a tracing subscriber
//! - owns a tokio runtime
//! - writes to stdout
//!
//! `run` parses, builds the [`AppState`], dispatches to one handler and then
//! disposes the store so background log writes land before exit.

use super::handlers::{self, AppState};
use super::render::OutputMode;
use super::setup::{BackupCommands, Cli, Commands, WorksCommands};
use anyhow::Context;
use clap::Parser;
use cwriterapp::config::CwriterConfig;
use cwriterapp::platform::{FixedPlatform, Platform};
use cwriterapp::store::work_store::DocumentStore;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(dispatch(cli))
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let state = create_app_state(&cli)?;

    let result = match cli.command {
        Commands::Init => handlers::init(&state).await,
        Commands::Works { action } => match action {
            WorksCommands::List => handlers::works_list(&state).await,
            WorksCommands::Show { id } => handlers::works_show(&state, &id).await,
            WorksCommands::Create {
                title,
                description,
                content,
            } => handlers::works_create(&state, title, description, content).await,
            WorksCommands::Delete { id } => handlers::works_delete(&state, &id).await,
        },
        Commands::Stats => handlers::stats(&state).await,
        Commands::Backup { action } => match action {
            BackupCommands::Create => handlers::backup_create(&state).await,
            BackupCommands::List => handlers::backup_list(&state).await,
            BackupCommands::Restore { id } => handlers::backup_restore(&state, &id).await,
        },
        Commands::Cleanup(args) => {
            handlers::cleanup(&state, args.max_logs, args.max_backups).await
        }
        Commands::Doctor => handlers::doctor(&state).await,
        Commands::Log { limit } => handlers::log(&state, limit).await,
    };

    state.store.dispose().await;
    result
}

/// Resolve configuration and open the store.
fn create_app_state(cli: &Cli) -> anyhow::Result<AppState> {
    let config = load_config(cli)?;

    // A shell always has a filesystem.
    let probe = FixedPlatform(Platform::NativeFs);
    let store = DocumentStore::open(&config, &probe).context("failed to open document store")?;

    Ok(AppState {
        store,
        config,
        user: cli.user.clone(),
        output_mode: OutputMode::from_flag(cli.json),
    })
}

/// `cwriter.toml` lives in the data directory, so the directory is resolved
/// from flags and environment before the file is read.
fn load_config(cli: &Cli) -> anyhow::Result<CwriterConfig> {
    let data_dir = match &cli.data_dir {
        Some(dir) => dir.clone(),
        None => CwriterConfig::load(None)?.data_dir()?,
    };

    let mut config = CwriterConfig::load(Some(&data_dir))
        .with_context(|| format!("failed to load config from {}", data_dir.display()))?;
    config.data_dir = Some(data_dir);
    if let Some(platform) = &cli.platform {
        config.platform = Some(platform.clone());
    }
    config.platform()?;

    tracing::debug!(?config, "loaded configuration");
    Ok(config)
}
