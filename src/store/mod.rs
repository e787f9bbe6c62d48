//! Device store: persisted credentials of the paired identity.
//!
//! The store is opaque to everything except the session holder. A backend
//! knows how to open, clear and destroy the storage medium; an open store
//! hands out and replaces the single credential record.
//!
//! ```text
//! Init      --> backend.open()        --> store.first_identity()
//! Paired    --> store.save(credentials)
//! Disconnect--> store.delete()
//! Reset     --> store.close(), backend.clear(), backend.open()
//! ForceWipe --> store.close(), backend.destroy()
//! ```

mod file;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{CloneableSecret, ExposeSecret, SecretBox, SerializableSecret};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::StoreError;

pub use file::{FileBackend, FileDeviceStore};

/// Opaque session key material issued by the network at pairing time.
///
/// Held in a [`SecretBox`]: zeroized on drop and redacted in `Debug`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(SecretBox<KeyMaterial>);

#[derive(Clone, Serialize, Deserialize, Zeroize)]
#[serde(transparent)]
struct KeyMaterial(String);

impl CloneableSecret for KeyMaterial {}

// Credentials are persisted to the device store and handed to the bridge.
impl SerializableSecret for KeyMaterial {}

impl SessionKey {
    pub fn new(material: impl Into<String>) -> Self {
        Self(SecretBox::new(Box::new(KeyMaterial(material.into()))))
    }

    /// Raw key material, for handing to the protocol client only.
    pub fn expose(&self) -> &str {
        &self.0.expose_secret().0
    }
}

impl PartialEq for SessionKey {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

impl Eq for SessionKey {}

/// Credentials of a paired identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Network identifier of the paired account (the user part of its address).
    pub identity: String,
    /// Display name announced by the account, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_name: Option<String>,
    /// Session key material.
    pub session: SessionKey,
    /// When pairing completed.
    pub paired_at: DateTime<Utc>,
}

impl Credentials {
    pub fn new(identity: impl Into<String>, session: SessionKey) -> Self {
        Self {
            identity: identity.into(),
            push_name: None,
            session,
            paired_at: Utc::now(),
        }
    }
}

/// An open device store.
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// The stored credentials, or `None` when nothing is paired.
    async fn first_identity(&self) -> Result<Option<Credentials>, StoreError>;

    /// Persist credentials, replacing any previous record.
    async fn save(&self, credentials: &Credentials) -> Result<(), StoreError>;

    /// Remove the stored credentials, leaving an empty store.
    async fn delete(&self) -> Result<(), StoreError>;

    /// Close the store. Later calls fail with [`StoreError::Closed`].
    async fn close(&self);

    /// Human-readable location, for logs.
    fn location(&self) -> String;
}

/// Opens and manages the storage medium behind a [`DeviceStore`].
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Open the store, creating an empty one if the medium does not exist.
    async fn open(&self) -> Result<Arc<dyn DeviceStore>, StoreError>;

    /// Overwrite the medium with an empty store, discarding unreadable content.
    async fn clear(&self) -> Result<(), StoreError>;

    /// Remove the medium entirely.
    async fn destroy(&self) -> Result<(), StoreError>;
}
