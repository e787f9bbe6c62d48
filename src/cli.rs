//! CLI command handling.
//!
//! Provides subcommands for:
//! - Running the API server (`serve`, the default)
//! - Inspecting the device store offline (`status`)
//! - Clearing stored credentials (`reset`)
//! - Deleting the device store entirely (`wipe --force`)

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::store::{FileBackend, StoreBackend};

#[derive(Parser, Debug)]
#[command(name = "pairgate")]
#[command(about = "Messaging session gateway: pair a device, then send over HTTP")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Address to bind the API server to
    #[arg(long, global = true, env = "PAIRGATE_BIND")]
    pub bind: Option<SocketAddr>,

    /// Device store file
    #[arg(long, global = true, env = "PAIRGATE_STORE_PATH")]
    pub store: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the API server (default if no subcommand given)
    Serve,

    /// Show the paired identity recorded in the device store
    Status,

    /// Clear stored credentials, keeping an empty device store
    Reset,

    /// Delete the device store file
    Wipe {
        /// Required; the paired session cannot be recovered afterwards
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    /// The command to run, `serve` when none was given.
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }

    /// Apply command-line overrides on top of the environment configuration.
    pub fn apply(&self, config: &mut Config) {
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(store) = &self.store {
            config.store_path = store.clone();
        }
    }
}

/// Print what the device store holds without touching the network.
pub async fn run_status_command(config: &Config) -> anyhow::Result<()> {
    let backend = FileBackend::new(&config.store_path);
    if !backend.path().exists() {
        println!("Device store: {} (not created)", backend.path().display());
        println!("Paired:       no");
        return Ok(());
    }

    let store = backend
        .open()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open device store: {}", e))?;
    let stored = store.first_identity().await;
    store.close().await;

    println!("Device store: {}", backend.path().display());
    match stored? {
        Some(credentials) => {
            println!("Paired:       yes");
            println!("Identity:     {}", credentials.identity);
            if let Some(name) = credentials.push_name {
                println!("Push name:    {}", name);
            }
            println!("Paired at:    {}", credentials.paired_at.to_rfc3339());
        }
        None => println!("Paired:       no"),
    }
    Ok(())
}

/// Clear stored credentials. Also recovers an unreadable store.
pub async fn run_reset_command(config: &Config) -> anyhow::Result<()> {
    let state = crate::build_state(config)?;
    state.controller.reset().await?;
    println!(
        "Device store reset at {}. Pair again with a control client.",
        config.store_path.display()
    );
    Ok(())
}

/// Delete the device store. Refuses without `--force`.
pub async fn run_wipe_command(config: &Config, force: bool) -> anyhow::Result<()> {
    if !force {
        anyhow::bail!(
            "Refusing to wipe {} without --force",
            config.store_path.display()
        );
    }

    let state = crate::build_state(config)?;
    state.controller.force_wipe().await?;
    println!("Device store wiped: {}", config.store_path.display());
    Ok(())
}
