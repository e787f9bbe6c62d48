//! Remote protocol client seam.
//!
//! The messaging network's wire protocol lives behind [`RemoteClient`]. The
//! session holder owns at most one live client; the gateway borrows it for
//! lookups and sends.

mod bridge;
#[cfg(test)]
pub(crate) mod scripted;

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::RemoteError;
use crate::store::Credentials;

pub use bridge::{BridgeClient, BridgeConfig, BridgeFactory};

/// Raw pairing events produced by the protocol client.
#[derive(Debug, Clone)]
pub enum RemotePairingEvent {
    /// A new pairing code to display; supersedes the previous one.
    Code(String),
    /// Pairing completed; the credentials must be persisted.
    Success(Credentials),
    /// The network gave up on this pairing attempt.
    Timeout,
}

/// Stream of raw pairing events. Ends when the remote closes it.
pub type RemotePairingStream = BoxStream<'static, RemotePairingEvent>;

/// Registration status of one address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupEntry {
    pub address: String,
    pub registered: bool,
}

/// A live connection to the messaging network.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Connect using the credentials the client was created with.
    async fn connect(&self) -> Result<(), RemoteError>;

    /// Whether the network connection is currently up. Must not block.
    fn is_connected(&self) -> bool;

    /// Invalidate the remote session.
    async fn logout(&self) -> Result<(), RemoteError>;

    /// Drop the network connection without invalidating the remote session.
    async fn disconnect(&self);

    /// Start the pairing handshake and return its event stream.
    ///
    /// Only valid for a client created without credentials. The handshake
    /// runs in the background; events arrive on the returned stream.
    async fn pairing_stream(&self) -> Result<RemotePairingStream, RemoteError>;

    /// Query whether each address is registered on the network.
    async fn lookup(&self, addresses: &[String]) -> Result<Vec<LookupEntry>, RemoteError>;

    /// Send a text message.
    async fn send(&self, address: &str, body: &str) -> Result<(), RemoteError>;
}

/// Creates protocol clients.
pub trait ClientFactory: Send + Sync {
    /// Create a client for the given credentials, or an unpaired client for
    /// `None`.
    fn new_client(&self, credentials: Option<Credentials>)
    -> Result<Arc<dyn RemoteClient>, RemoteError>;
}
