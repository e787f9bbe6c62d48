//! Session holder: the one slot that owns the live client handle.
//!
//! Readers (the messaging gateway, status queries) take a read lock and clone
//! the `Arc` out. Lifecycle operations take the write lock only around swaps;
//! no remote I/O happens while the lock is held.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{RwLock, oneshot};

use super::state::ConnectionState;
use crate::error::SessionError;
use crate::remote::RemoteClient;
use crate::store::DeviceStore;

/// An in-flight pairing attempt.
pub(crate) struct PairingTicket {
    /// Monotonic attempt number; a finished driver only applies its outcome
    /// if its attempt is still the current ticket.
    pub attempt: u64,
    /// Client that is consuming the pairing handshake.
    pub client: Arc<dyn RemoteClient>,
    /// Dropping or firing this stops the pairing driver.
    pub cancel: oneshot::Sender<()>,
}

/// Everything the holder guards.
pub(crate) struct SessionSlot {
    pub state: ConnectionState,
    pub store: Option<Arc<dyn DeviceStore>>,
    /// Live handle. Set only while `Connected`.
    pub handle: Option<Arc<dyn RemoteClient>>,
    pub identity: Option<String>,
    pub pairing: Option<PairingTicket>,
    next_attempt: u64,
}

impl SessionSlot {
    fn new() -> Self {
        Self {
            state: ConnectionState::Uninitialized,
            store: None,
            handle: None,
            identity: None,
            pairing: None,
            next_attempt: 0,
        }
    }

    /// Move to `to`, or fail if the state machine forbids it.
    pub fn transition(&mut self, to: ConnectionState) -> Result<(), SessionError> {
        if self.state == to {
            return Ok(());
        }
        if !self.state.can_transition_to(to) {
            return Err(SessionError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        tracing::debug!(from = %self.state, to = %to, "Session state transition");
        self.state = to;
        Ok(())
    }

    pub fn next_attempt(&mut self) -> u64 {
        self.next_attempt += 1;
        self.next_attempt
    }

    /// Whether `attempt` is still the pairing in flight.
    pub fn is_current_attempt(&self, attempt: u64) -> bool {
        self.state == ConnectionState::Pairing
            && self.pairing.as_ref().is_some_and(|t| t.attempt == attempt)
    }

    /// Detach the handle and any pairing client, cancelling the pairing
    /// driver. Returns the clients that still need tearing down.
    pub fn take_clients(&mut self) -> Vec<Arc<dyn RemoteClient>> {
        let mut clients = Vec::new();
        if let Some(handle) = self.handle.take() {
            clients.push(handle);
        }
        if let Some(ticket) = self.pairing.take() {
            let _ = ticket.cancel.send(());
            clients.push(ticket.client);
        }
        clients
    }
}

/// Point-in-time view of the session, for status queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub state: ConnectionState,
    pub connected: bool,
    pub identity: String,
}

/// Owner of the session slot.
pub struct SessionHolder {
    slot: RwLock<SessionSlot>,
}

impl SessionHolder {
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(SessionSlot::new()),
        }
    }

    /// The live handle, if any. The returned `Arc` stays valid after a
    /// concurrent swap; calls on it then fail at the remote.
    pub async fn current_handle(&self) -> Option<Arc<dyn RemoteClient>> {
        self.slot.read().await.handle.clone()
    }

    /// The paired identity, or an empty string when nothing is paired.
    pub async fn identity(&self) -> String {
        self.slot.read().await.identity.clone().unwrap_or_default()
    }

    pub async fn state(&self) -> ConnectionState {
        self.slot.read().await.state
    }

    /// Whether a handle is installed and reports itself connected.
    pub async fn is_connected(&self) -> bool {
        self.slot
            .read()
            .await
            .handle
            .as_ref()
            .is_some_and(|h| h.is_connected())
    }

    pub async fn snapshot(&self) -> SessionStatus {
        let slot = self.slot.read().await;
        SessionStatus {
            state: slot.state,
            connected: slot.handle.as_ref().is_some_and(|h| h.is_connected()),
            identity: slot.identity.clone().unwrap_or_default(),
        }
    }

    /// Run `f` with exclusive access to the slot. `f` must not block.
    pub(crate) async fn mutate<R>(&self, f: impl FnOnce(&mut SessionSlot) -> R) -> R {
        let mut slot = self.slot.write().await;
        f(&mut slot)
    }
}

impl Default for SessionHolder {
    fn default() -> Self {
        Self::new()
    }
}
