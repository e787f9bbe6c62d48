//! Pairgate: keeps one paired messaging session alive and exposes it over
//! HTTP and WebSocket.
//!
//! - [`store`] persists the paired device's credentials
//! - [`session`] owns the live client and drives the connection lifecycle
//! - [`gateway`] normalizes addresses, checks registration and sends with retry
//! - [`api`] is the control plane: REST endpoints plus a WebSocket for pairing

pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod remote;
pub mod session;
pub mod store;

use std::sync::Arc;

pub use config::Config;
pub use error::{Error, Result};

use api::AppState;
use gateway::MessagingGateway;
use remote::BridgeFactory;
use session::{LifecycleController, SessionHolder};
use store::FileBackend;

/// Wire the session holder, lifecycle controller and gateway for `config`.
///
/// Nothing is opened or connected yet; call
/// [`LifecycleController::init`] on the returned controller.
pub fn build_state(config: &Config) -> Result<AppState> {
    let holder = Arc::new(SessionHolder::new());
    let factory = BridgeFactory::new(config.bridge.clone())?;
    let backend = FileBackend::new(&config.store_path);

    let controller = LifecycleController::new(
        Arc::clone(&holder),
        Arc::new(backend),
        Arc::new(factory),
        config.lifecycle,
    );
    let gateway = MessagingGateway::new(holder, config.address.clone(), config.retry);

    Ok(AppState {
        controller,
        gateway: Arc::new(gateway),
    })
}
