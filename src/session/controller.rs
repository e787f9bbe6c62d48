//! Connection lifecycle controller.
//!
//! Drives Init, Connect, Disconnect, Reset and ForceWipe against the
//! [`SessionHolder`]. Lifecycle operations are serialized by a gate mutex so
//! two of them never interleave; the holder's own lock is only taken around
//! in-memory swaps, so readers never wait on network I/O.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, oneshot};

use super::holder::{PairingTicket, SessionHolder, SessionStatus};
use super::pairing::{self, PairingEvent, PairingExit, PairingStream};
use super::state::ConnectionState;
use crate::error::SessionError;
use crate::remote::{ClientFactory, RemoteClient};
use crate::store::{Credentials, DeviceStore, StoreBackend};

/// Timing knobs for the lifecycle.
#[derive(Debug, Clone, Copy)]
pub struct LifecycleConfig {
    /// Idle deadline for a pairing attempt, renewed by every new code.
    pub pairing_timeout: Duration,
    /// Pause between teardown and credential deletion on Disconnect.
    pub disconnect_settle: Duration,
    /// Pause after teardown on Reset when a handle was live.
    pub reset_settle: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            pairing_timeout: Duration::from_secs(90),
            disconnect_settle: Duration::from_secs(2),
            reset_settle: Duration::from_secs(1),
        }
    }
}

/// Result of a Connect request.
#[derive(Debug)]
pub enum ConnectOutcome {
    /// A live session already exists.
    AlreadyConnected { identity: String },
    /// Stored credentials were used to reconnect without pairing.
    Restored { identity: String },
    /// Another caller's pairing attempt is in flight.
    AlreadyPairing,
    /// A new pairing attempt started; its events arrive on the stream.
    Pairing(PairingStream),
}

/// Owns the session lifecycle.
#[derive(Clone)]
pub struct LifecycleController {
    holder: Arc<SessionHolder>,
    backend: Arc<dyn StoreBackend>,
    factory: Arc<dyn ClientFactory>,
    config: LifecycleConfig,
    gate: Arc<Mutex<()>>,
}

impl LifecycleController {
    pub fn new(
        holder: Arc<SessionHolder>,
        backend: Arc<dyn StoreBackend>,
        factory: Arc<dyn ClientFactory>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            holder,
            backend,
            factory,
            config,
            gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn holder(&self) -> &Arc<SessionHolder> {
        &self.holder
    }

    pub async fn status(&self) -> SessionStatus {
        self.holder.snapshot().await
    }

    /// Open the device store and restore a stored session if there is one.
    ///
    /// Idempotent: once initialized, returns the current state untouched.
    /// A failed restore is logged and leaves the session `Unpaired`.
    pub async fn init(&self) -> Result<ConnectionState, SessionError> {
        let _gate = self.gate.lock().await;

        let state = self.holder.state().await;
        if state != ConnectionState::Uninitialized {
            tracing::debug!(state = %state, "Session already initialized");
            return Ok(state);
        }

        let store = self.backend.open().await?;
        let stored = match store.first_identity().await {
            Ok(stored) => stored,
            Err(e) => {
                store.close().await;
                return Err(e.into());
            }
        };

        let location = store.location();
        self.holder
            .mutate(|slot| {
                slot.store = Some(store);
                slot.transition(ConnectionState::Unpaired)
            })
            .await?;
        tracing::info!(location = %location, paired = stored.is_some(), "Device store opened");

        if let Some(credentials) = stored
            && let Err(e) = self.restore(credentials).await
        {
            tracing::warn!(error = %e, "Could not restore stored session, staying unpaired");
        }

        Ok(self.holder.state().await)
    }

    /// Connect the session.
    ///
    /// From `Unpaired`, stored credentials are tried first; otherwise a
    /// pairing attempt starts and its stream is returned immediately while a
    /// background driver consumes the remote handshake. A `Connected` session
    /// whose handle has dropped is detached first and treated as `Unpaired`.
    pub async fn connect(&self) -> Result<ConnectOutcome, SessionError> {
        let _gate = self.gate.lock().await;

        let (state, identity, store, dropped) = self
            .holder
            .mutate(|slot| {
                let mut dropped = None;
                if slot.state == ConnectionState::Connected
                    && !slot.handle.as_ref().is_some_and(|h| h.is_connected())
                    && slot.transition(ConnectionState::Unpaired).is_ok()
                {
                    dropped = slot.handle.take();
                    slot.identity = None;
                }
                (
                    slot.state,
                    slot.identity.clone().unwrap_or_default(),
                    slot.store.clone(),
                    dropped,
                )
            })
            .await;
        if let Some(client) = dropped {
            tracing::warn!("Connected handle lost its connection, reconnecting");
            client.disconnect().await;
        }

        match state {
            ConnectionState::Uninitialized => return Err(SessionError::NotInitialized),
            ConnectionState::Connected => {
                return Ok(ConnectOutcome::AlreadyConnected { identity });
            }
            ConnectionState::Pairing => return Ok(ConnectOutcome::AlreadyPairing),
            ConnectionState::Disconnecting | ConnectionState::Resetting => {
                return Err(SessionError::InvalidTransition {
                    from: state,
                    to: ConnectionState::Pairing,
                });
            }
            ConnectionState::Unpaired => {}
        }

        if let Some(store) = store
            && let Some(credentials) = store.first_identity().await?
        {
            match self.restore(credentials).await {
                Ok(identity) => return Ok(ConnectOutcome::Restored { identity }),
                Err(e) => {
                    tracing::warn!(error = %e, "Stored session unusable, starting a new pairing");
                }
            }
        }

        let client = self
            .factory
            .new_client(None)
            .map_err(SessionError::ConnectFailed)?;
        let raw = match client.pairing_stream().await {
            Ok(raw) => raw,
            Err(e) => {
                client.disconnect().await;
                return Err(SessionError::ConnectFailed(e));
            }
        };

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let installed = self
            .holder
            .mutate(|slot| -> Result<u64, SessionError> {
                slot.transition(ConnectionState::Pairing)?;
                let attempt = slot.next_attempt();
                slot.pairing = Some(PairingTicket {
                    attempt,
                    client: Arc::clone(&client),
                    cancel: cancel_tx,
                });
                Ok(attempt)
            })
            .await;
        let attempt = match installed {
            Ok(attempt) => attempt,
            Err(e) => {
                client.disconnect().await;
                return Err(e);
            }
        };

        let (events, stream) = PairingStream::channel();
        let controller = self.clone();
        let timeout = self.config.pairing_timeout;
        tokio::spawn(async move {
            let exit = pairing::drive(raw, &events, cancel_rx, timeout).await;
            if let Some(event) = controller.finish_pairing(attempt, exit).await {
                let _ = events.send(event);
            }
        });

        tracing::info!(attempt, "Pairing started");
        Ok(ConnectOutcome::Pairing(stream))
    }

    /// Log out and forget the paired identity.
    ///
    /// A no-op unless the session is `Connected` or `Pairing`. Logout
    /// failures are logged and local cleanup proceeds.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        let _gate = self.gate.lock().await;

        let taken = self
            .holder
            .mutate(|slot| {
                if !slot.state.is_live() {
                    return None;
                }
                slot.transition(ConnectionState::Disconnecting).ok()?;
                Some((slot.take_clients(), slot.store.clone()))
            })
            .await;
        let Some((clients, store)) = taken else {
            tracing::debug!("Disconnect requested without a live session");
            return Ok(());
        };

        for client in clients {
            logout_or_drop(client.as_ref()).await;
        }
        tokio::time::sleep(self.config.disconnect_settle).await;

        if let Some(store) = store
            && let Err(e) = store.delete().await
        {
            tracing::warn!(error = %e, "Failed to delete stored credentials");
        }

        self.holder
            .mutate(|slot| {
                slot.identity = None;
                slot.transition(ConnectionState::Unpaired)
            })
            .await?;
        tracing::info!("Session disconnected");
        Ok(())
    }

    /// Tear everything down and start over with an empty device store.
    ///
    /// Valid from any state. Teardown errors are ignored. An unreadable
    /// store is replaced, so Reset also recovers from corruption.
    pub async fn reset(&self) -> Result<(), SessionError> {
        let _gate = self.gate.lock().await;
        self.reset_locked().await
    }

    async fn reset_locked(&self) -> Result<(), SessionError> {
        let (clients, store) = self.begin_reset().await;
        let had_clients = !clients.is_empty();
        for client in clients {
            client.disconnect().await;
        }
        if had_clients {
            tokio::time::sleep(self.config.reset_settle).await;
        }

        if let Some(store) = store {
            store.close().await;
        }

        let reopened = match self.backend.clear().await {
            Ok(()) => self.backend.open().await,
            Err(e) => Err(e),
        };
        match reopened {
            Ok(store) => {
                self.holder
                    .mutate(|slot| {
                        slot.store = Some(store);
                        slot.transition(ConnectionState::Unpaired)
                    })
                    .await?;
                tracing::info!("Session reset");
                Ok(())
            }
            Err(e) => {
                let _ = self
                    .holder
                    .mutate(|slot| slot.transition(ConnectionState::Uninitialized))
                    .await;
                tracing::error!(error = %e, "Failed to recreate device store after reset");
                Err(e.into())
            }
        }
    }

    /// Tear everything down and delete the storage medium.
    ///
    /// Ends `Uninitialized`; a later Init creates a fresh store.
    pub async fn force_wipe(&self) -> Result<(), SessionError> {
        let _gate = self.gate.lock().await;

        let (clients, store) = self.begin_reset().await;
        for client in clients {
            logout_or_drop(client.as_ref()).await;
        }
        if let Some(store) = store {
            if let Err(e) = store.delete().await {
                tracing::debug!(error = %e, "Ignoring credential delete failure before wipe");
            }
            store.close().await;
        }

        let destroyed = self.backend.destroy().await;
        let _ = self
            .holder
            .mutate(|slot| slot.transition(ConnectionState::Uninitialized))
            .await;
        destroyed?;
        tracing::warn!("Device store wiped");
        Ok(())
    }

    async fn begin_reset(&self) -> (Vec<Arc<dyn RemoteClient>>, Option<Arc<dyn DeviceStore>>) {
        self.holder
            .mutate(|slot| {
                // Every state may enter Resetting.
                let _ = slot.transition(ConnectionState::Resetting);
                slot.identity = None;
                (slot.take_clients(), slot.store.take())
            })
            .await
    }

    /// Reconnect with stored credentials and install the handle.
    async fn restore(&self, credentials: Credentials) -> Result<String, SessionError> {
        let identity = credentials.identity.clone();
        let client = self
            .factory
            .new_client(Some(credentials))
            .map_err(SessionError::ConnectFailed)?;
        if let Err(e) = client.connect().await {
            client.disconnect().await;
            return Err(SessionError::ConnectFailed(e));
        }

        let installed = self
            .holder
            .mutate(|slot| -> Result<(), SessionError> {
                slot.transition(ConnectionState::Connected)?;
                slot.handle = Some(Arc::clone(&client));
                slot.identity = Some(identity.clone());
                Ok(())
            })
            .await;
        if let Err(e) = installed {
            client.disconnect().await;
            return Err(e);
        }

        tracing::info!(identity = %identity, "Session restored from stored credentials");
        Ok(identity)
    }

    /// Apply a pairing driver's outcome if its attempt is still current.
    /// Returns the terminal event to deliver, if any.
    async fn finish_pairing(&self, attempt: u64, exit: PairingExit) -> Option<PairingEvent> {
        if matches!(exit, PairingExit::Cancelled) {
            tracing::debug!(attempt, "Pairing cancelled");
            return None;
        }

        let _gate = self.gate.lock().await;
        let (current, store) = self
            .holder
            .mutate(|slot| (slot.is_current_attempt(attempt), slot.store.clone()))
            .await;
        if !current {
            tracing::debug!(attempt, "Discarding outcome of superseded pairing");
            return None;
        }

        match exit {
            PairingExit::Paired(credentials) => {
                let identity = credentials.identity.clone();
                if let Some(store) = store
                    && let Err(e) = store.save(&credentials).await
                {
                    tracing::warn!(error = %e, "Failed to persist paired credentials");
                }

                let promoted = self
                    .holder
                    .mutate(|slot| -> Result<(), SessionError> {
                        slot.transition(ConnectionState::Connected)?;
                        slot.handle = slot.pairing.take().map(|ticket| ticket.client);
                        slot.identity = Some(identity.clone());
                        Ok(())
                    })
                    .await;
                if let Err(e) = promoted {
                    tracing::error!(error = %e, "Could not install paired session");
                    return None;
                }

                tracing::info!(identity = %identity, "Pairing succeeded");
                Some(PairingEvent::Success(identity))
            }
            PairingExit::TimedOut => {
                self.abandon_pairing().await;
                tracing::info!(attempt, "Pairing timed out");
                Some(PairingEvent::Timeout)
            }
            PairingExit::Closed => {
                self.abandon_pairing().await;
                tracing::info!(attempt, "Pairing stream closed by remote");
                Some(PairingEvent::Closed)
            }
            PairingExit::Cancelled => None,
        }
    }

    /// Drop the current pairing ticket and fall back to `Unpaired`.
    async fn abandon_pairing(&self) {
        let client = self
            .holder
            .mutate(|slot| {
                let ticket = slot.pairing.take();
                let _ = slot.transition(ConnectionState::Unpaired);
                ticket.map(|ticket| ticket.client)
            })
            .await;
        if let Some(client) = client {
            client.disconnect().await;
        }
    }
}

/// Graceful logout if the client is connected, local drop otherwise.
async fn logout_or_drop(client: &dyn RemoteClient) {
    if client.is_connected() {
        match client.logout().await {
            Ok(()) => return,
            Err(e) => {
                let err = SessionError::TeardownFailed(e);
                tracing::warn!(error = %err, "Logout failed, tearing down locally");
            }
        }
    }
    client.disconnect().await;
}
