//! Pairgate binary.

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use pairgate::{
    Config,
    api::{self, ApiServer, ApiServerConfig, AuthState},
    cli::{self, Cli, Command},
    config::LogFormat,
};

const DEFAULT_LOG_FILTER: &str = "pairgate=info,tower_http=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let mut config = Config::from_env()?;
    cli.apply(&mut config);

    init_tracing(config.log_format);

    match cli.command() {
        Command::Serve => serve(config).await,
        Command::Status => cli::run_status_command(&config).await,
        Command::Reset => cli::run_reset_command(&config).await,
        Command::Wipe { force } => cli::run_wipe_command(&config, force).await,
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let state = pairgate::build_state(&config)?;

    match state.controller.init().await {
        Ok(session) => tracing::info!(
            %session,
            store = %config.store_path.display(),
            "Session initialized"
        ),
        Err(e) => tracing::warn!(
            code = e.code(),
            "Session init failed: {}. Send `reset` on the control socket or run `pairgate reset`",
            e
        ),
    }

    let auth = match config.api_token {
        Some(token) => Some(AuthState::new(token)),
        None => {
            tracing::warn!("PAIRGATE_API_TOKEN not set, API is unauthenticated");
            None
        }
    };

    let router = api::router(state, auth);
    let mut server = ApiServer::new(ApiServerConfig { addr: config.bind }, router);
    server.start().await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");

    // The pairing survives a restart; only the listener goes away.
    server.shutdown().await;
    Ok(())
}
