//! # omo-cli
//!
//! `omo-switch` binary. Spawns the configuration backend, builds a
//! [`SyncStore`] over it, and runs one command.

#![deny(unsafe_code)]

mod render;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use omo_core::{AssignmentUpdate, Variant};
use omo_rpc::{Backend, RpcBackend, StdioTransport};
use omo_settings::EngineSettings;
use omo_sync::{CheckOutcome, SyncEvent, SyncStore};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Manage model assignments and presets of a backend-owned configuration.
#[derive(Parser, Debug)]
#[command(name = "omo-switch", version, about)]
struct Cli {
    /// Engine settings file (defaults to the XDG config location).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Backend command, overriding the settings file.
    #[arg(long, global = true)]
    backend: Option<String>,

    /// Log level, overriding the settings file.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Preload everything and report divergence from the snapshot.
    Status,
    /// Show changes made to the configuration outside omo-switch.
    Diff,
    /// Adopt the on-disk configuration as the new snapshot.
    Accept,
    /// Revert the on-disk configuration to the snapshot.
    Restore,
    /// Print the current configuration.
    Show,
    /// Assign a model to an agent or category.
    Assign {
        /// Agent or category name.
        name: String,
        /// `provider/model` identifier.
        model: String,
        /// Reasoning variant (`max`, `high`, `medium`, `low`, `none`).
        #[arg(long)]
        variant: Option<Variant>,
    },
    /// Manage named presets.
    #[command(subcommand)]
    Preset(PresetCommand),
    /// Inspect the provider/model catalog.
    #[command(subcommand)]
    Models(ModelsCommand),
    /// Show installed and latest tool versions.
    Versions,
    /// Check for outside changes periodically until interrupted.
    Watch {
        /// Seconds between checks.
        #[arg(long, default_value_t = 5)]
        interval: u64,
    },
}

#[derive(Subcommand, Debug)]
enum PresetCommand {
    /// List presets, marking the active one.
    List,
    /// Save the current configuration as a new preset.
    Save { name: String },
    /// Load a preset and make it active.
    Load { name: String },
    /// Delete one or more presets.
    Delete {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Rename a preset.
    Rename { from: String, to: String },
    /// Print a preset's configuration and metadata.
    Show { name: String },
    /// List builtin presets.
    Builtin,
    /// Apply a builtin preset.
    Apply { id: String },
}

#[derive(Subcommand, Debug)]
enum ModelsCommand {
    /// List models, optionally for one provider.
    List {
        #[arg(long)]
        provider: Option<String>,
    },
    /// Add a custom model id to a provider.
    Add { provider: String, model: String },
    /// Remove a custom model id.
    Remove { provider: String, model: String },
}

fn load_settings(cli: &Cli) -> Result<EngineSettings> {
    let mut settings = match &cli.settings {
        Some(path) => omo_settings::load_settings_from_path(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => omo_settings::load_settings().context("failed to load settings")?,
    };
    if let Some(command) = &cli.backend {
        settings.backend.command.clone_from(command);
    }
    if let Some(level) = &cli.log_level {
        settings.logging.level.clone_from(level);
    }
    Ok(settings)
}

fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce() -> String) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print!("{}", text());
    }
    Ok(())
}

async fn run(cli: &Cli, store: &SyncStore, shutdown: &CancellationToken) -> Result<()> {
    let json = cli.json;
    match &cli.command {
        Command::Status => {
            let report = store.preload().await;
            store.presets().refresh_list().await?;
            let outcome = store.detector().check_changes().await;
            let status = render::Status::new(&report, store.presets().active(), &outcome);
            emit(json, &status, || {
                format!("{}{}", render::preload(&report), render::status(&status))
            })?;
        }
        Command::Diff => {
            if let CheckOutcome::Failed(err) = store.detector().check_changes().await {
                bail!("could not check for changes: {err}");
            }
            let changes = store.detector().changes();
            emit(json, &changes, || render::changes(&changes))?;
        }
        Command::Accept => {
            store.presets().refresh_list().await?;
            let outcome = store.reconciler().accept_external().await?;
            println!("accepted outside changes");
            if let Some(warning) = outcome.warning {
                eprintln!("warning: active preset not updated: {warning}");
            }
        }
        Command::Restore => {
            store.reconciler().restore_from_cache().await?;
            println!("restored configuration from snapshot");
        }
        Command::Show => {
            let config = fetch_config(store).await?;
            emit(json, &config, || render::configuration(&config))?;
        }
        Command::Assign {
            name,
            model,
            variant,
        } => {
            if fetch_config(store).await?.assignment(name).is_none() {
                bail!("no agent or category named '{name}'");
            }
            store.presets().refresh_list().await?;
            let update = AssignmentUpdate::new(name.as_str(), model.as_str(), *variant);
            let _ = store.mutations().assign(update).await?;
            println!("assigned {model} to {name}");
        }
        Command::Preset(command) => preset(store, command, json).await?,
        Command::Models(command) => models(store, command, json).await?,
        Command::Versions => {
            store.versions().refresh(true).await;
            let versions = store
                .versions()
                .data()
                .with_context(|| store.versions().error().unwrap_or_default())?;
            emit(json, &versions, || render::versions(&versions))?;
        }
        Command::Watch { interval } => watch(store, *interval, shutdown).await,
    }
    Ok(())
}

async fn fetch_config(store: &SyncStore) -> Result<omo_core::Configuration> {
    store.configuration().refresh(false).await;
    match store.configuration().data() {
        Some(config) => Ok(config),
        None => bail!(
            "failed to read configuration: {}",
            store.configuration().error().unwrap_or_default()
        ),
    }
}

async fn preset(store: &SyncStore, command: &PresetCommand, json: bool) -> Result<()> {
    let presets = store.presets();
    presets.refresh_list().await?;
    match command {
        PresetCommand::List => {
            let state = presets.state();
            emit(json, &state.presets, || render::presets(&state))?;
        }
        PresetCommand::Save { name } => {
            let name = presets.save_current_as(name).await?;
            println!("saved preset '{name}'");
        }
        PresetCommand::Load { name } => {
            presets.load(name).await?;
            println!("loaded preset '{name}'");
        }
        PresetCommand::Delete { names } => {
            let count = if let [name] = names.as_slice() {
                presets.delete(name).await?;
                1
            } else {
                presets.delete_many(names).await?
            };
            println!("deleted {count} preset(s)");
        }
        PresetCommand::Rename { from, to } => {
            let to = presets.rename(from, to).await?;
            println!("renamed '{from}' to '{to}'");
        }
        PresetCommand::Show { name } => {
            let config = presets.preset_config(name).await?;
            let meta = presets.preset_meta(name).await?;
            emit(json, &config, || {
                format!("{}{}", render::meta(&meta), render::configuration(&config))
            })?;
        }
        PresetCommand::Builtin => {
            let builtin = presets.builtin_presets().await?;
            emit(json, &builtin, || render::builtin(&builtin))?;
        }
        PresetCommand::Apply { id } => {
            presets.apply_builtin(id).await?;
            println!("applied builtin preset '{id}'");
        }
    }
    Ok(())
}

async fn models(store: &SyncStore, command: &ModelsCommand, json: bool) -> Result<()> {
    match command {
        ModelsCommand::List { provider } => {
            store.catalog().refresh(false).await;
            let catalog = store
                .catalog()
                .data()
                .with_context(|| store.catalog().error().unwrap_or_default())?;
            emit(json, &catalog, || render::catalog(&catalog, provider.as_deref()))?;
        }
        ModelsCommand::Add { provider, model } => {
            store.mutations().add_custom_model(provider, model).await?;
            println!("added {provider}/{model}");
        }
        ModelsCommand::Remove { provider, model } => {
            store.mutations().remove_custom_model(provider, model).await?;
            println!("removed {provider}/{model}");
        }
    }
    Ok(())
}

async fn watch(store: &SyncStore, interval: u64, shutdown: &CancellationToken) {
    let mut events = store.subscribe();
    let mut ticker = tokio::time::interval(Duration::from_secs(interval.max(1)));
    info!(interval, "watching for outside changes");
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => store.detector().trigger(),
            event = events.recv() => match event {
                Ok(SyncEvent::ChangesDetected { .. }) => {
                    if store.detector().state().should_alert() {
                        print!("{}", render::changes(&store.detector().changes()));
                    }
                }
                Ok(SyncEvent::CheckFailed { error }) => eprintln!("check failed: {error}"),
                Ok(other) => debug!(?other, "event"),
                Err(err) => debug!(error = %err, "event stream lagged"),
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(&cli)?;
    if settings.logging.json {
        omo_core::logging::init_json_subscriber(&settings.logging.level);
    } else {
        omo_core::logging::init_subscriber(&settings.logging.level);
    }

    let transport = StdioTransport::spawn(
        &settings.backend.command,
        &settings.backend.args,
        settings.backend.request_timeout(),
    )
    .with_context(|| format!("failed to start backend '{}'", settings.backend.command))?;
    let client = Arc::new(RpcBackend::new(transport));
    let store = SyncStore::from_settings(Arc::clone(&client) as Arc<dyn Backend>, &settings);

    let shutdown = CancellationToken::new();
    drop(tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                shutdown.cancel();
            }
        }
    }));

    let result = tokio::select! {
        result = run(&cli, &store, &shutdown) => result,
        () = shutdown.cancelled() => Ok(()),
    };
    client.transport().shutdown();
    result
}
