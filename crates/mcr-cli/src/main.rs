//! mcr CLI entry point.

mod args;
mod manager;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use mcr_core::config::{ConfigStore, EXAMPLE_CONFIG};
use mcr_core::error::{McrError, EXIT_SUCCESS};
use mcr_core::status::ServerStatus;
use serde::Serialize;
use tracing::{error, info};

use crate::args::{Cli, Commands};
use crate::manager::paths;
use crate::manager::{RestartOptions, ServerRegistry, StopOptions, TmuxChannel};

fn main() {
    // Logs go to stderr so JSON on stdout stays parseable
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            e.downcast_ref::<McrError>()
                .map(McrError::exit_code)
                .unwrap_or(1)
        }
    };
    std::process::exit(code);
}

/// One row of `mcr list`.
#[derive(Debug, Serialize)]
struct ServerSummary {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    session: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<ServerStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<McrError>,
}

/// Run a command and return the process exit status.
fn run(cli: Cli) -> anyhow::Result<i32> {
    let user = cli.user.as_deref();
    let store_path = match cli.config.clone() {
        Some(path) => path,
        None => paths::config_dir(user)
            .ok_or_else(|| McrError::config("Could not determine the config directory"))?,
    };

    let home = paths::user_home(user).ok_or_else(|| {
        McrError::config(format!(
            "Could not determine the home directory of {}",
            user.unwrap_or("the current user")
        ))
    })?;
    let registry = ServerRegistry::new(
        ConfigStore::new(store_path),
        Arc::new(TmuxChannel::new(paths::tmux_program())),
        home,
    );

    // Every operation is sequential, so one thread is enough
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    runtime.block_on(run_command(cli.command, &registry))
}

async fn run_command(command: Commands, registry: &ServerRegistry) -> anyhow::Result<i32> {
    match command {
        Commands::List => {
            let listing = registry.list_servers()?;
            let mut rows = Vec::new();
            for (name, server) in &listing.servers {
                rows.push(ServerSummary {
                    name: name.clone(),
                    session: Some(server.config().session_name.clone()),
                    status: Some(server.status().await),
                    error: None,
                });
            }
            for (name, err) in listing.failures {
                rows.push(ServerSummary {
                    name,
                    session: None,
                    status: None,
                    error: Some(err),
                });
            }
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        Commands::Status(args) => {
            let server = registry.get(&args.server)?;
            let status = server.status().await;
            println!(
                "{}",
                serde_json::to_string_pretty(&ServerSummary {
                    name: server.name().to_string(),
                    session: Some(server.config().session_name.clone()),
                    status: Some(status),
                    error: None,
                })?
            );
            if !status.is_running() {
                return Ok(McrError::not_running(server.name()).exit_code());
            }
        }
        Commands::Start(args) => {
            let server = registry.get(&args.server)?;
            let status = server.start().await?;
            info!("Server '{}' is {}", server.name(), status);
        }
        Commands::Stop(args) => {
            let server = registry.get(&args.server)?;
            let options = StopOptions {
                wait: args.wait,
                message: args
                    .message
                    .unwrap_or_else(|| format!("Server stopping in {} seconds...", args.delay)),
                delay: args.delay,
            };
            server.stop(&options).await?;
        }
        Commands::Restart(args) => {
            let server = registry.get(&args.server)?;
            let options = RestartOptions {
                wait: args.wait,
                message: args.message,
                delay: args.delay,
            };
            let status = server.restart(&options).await?;
            info!("Server '{}' is {}", server.name(), status);
        }
        Commands::Send(args) => {
            let server = registry.get(&args.server)?;
            server.send_words(&args.command).await?;
        }
        Commands::Attach(args) => {
            let server = registry.get(&args.server)?;
            // Ok is uninhabited: a successful attach never comes back
            match server.attach().await {
                Ok(never) => match never {},
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Kill(args) => {
            let server = registry.get(&args.server)?;
            server.kill().await?;
        }
        Commands::Backup(args) => {
            let server = registry.get(&args.server)?;
            let destination = server.backup(args.remote).await?;
            println!("{}", destination.display());
        }
        Commands::Update(args) => {
            registry.get(&args.server)?;
            error!("Plugin update ({}) not implemented", args.plugin);
            return Err(McrError::not_implemented("Plugin update").into());
        }
        Commands::Mkconfig(args) => {
            let path = write_example_config(registry.store().path(), args.force)?;
            println!("{}", path.display());
        }
    }

    Ok(EXIT_SUCCESS)
}

/// Write [`EXAMPLE_CONFIG`] into the config store.
///
/// A store path that is not a `.toml` file is treated as a directory and gets
/// `servers.toml`.
fn write_example_config(store_path: &Path, force: bool) -> Result<PathBuf, McrError> {
    let path = if store_path.extension().is_some_and(|ext| ext == "toml") {
        store_path.to_path_buf()
    } else {
        store_path.join("servers.toml")
    };

    if path.exists() && !force {
        return Err(McrError {
            suggestion: Some("Pass --force to overwrite it".into()),
            ..McrError::config(format!("{:?} already exists", path))
        });
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            McrError::general(format!("Failed to create {:?}: {}", parent, e))
        })?;
    }
    std::fs::write(&path, EXAMPLE_CONFIG)
        .map_err(|e| McrError::general(format!("Failed to write {:?}: {}", path, e)))?;

    info!("Wrote example config to {:?}", path);
    Ok(path)
}
