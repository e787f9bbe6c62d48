//! Scripted in-process remote client for tests.
//!
//! Every client created by a [`ScriptedFactory`] shares one [`ScriptState`],
//! so a test can flip failure switches, push pairing events and read call
//! counters without reaching into the session.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::{ClientFactory, LookupEntry, RemoteClient, RemotePairingEvent, RemotePairingStream};
use crate::error::RemoteError;
use crate::store::Credentials;

#[derive(Default)]
pub(crate) struct ScriptState {
    pub fail_connect: AtomicBool,
    pub fail_pairing: AtomicBool,
    pub fail_logout: AtomicBool,
    pub lookup_error: Mutex<Option<RemoteError>>,
    pub unregistered: Mutex<Vec<String>>,
    pub send_errors: Mutex<VecDeque<RemoteError>>,
    pub sticky_send_error: Mutex<Option<RemoteError>>,

    pub clients_created: AtomicU32,
    pub connects: AtomicU32,
    pub pairing_streams: AtomicU32,
    pub logouts: AtomicU32,
    pub disconnects: AtomicU32,
    pub send_calls: AtomicU32,
    pub lookups: Mutex<Vec<Vec<String>>>,
    pub sent: Mutex<Vec<(String, String)>>,

    pairing_tx: Mutex<Option<mpsc::UnboundedSender<RemotePairingEvent>>>,
}

impl ScriptState {
    /// Push a raw pairing event into the most recently opened pairing stream.
    /// Returns `false` if no stream is listening.
    pub fn push_pairing(&self, event: RemotePairingEvent) -> bool {
        self.pairing_tx
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|tx| tx.send(event).is_ok())
    }

    /// Close the most recently opened pairing stream from the remote side.
    pub fn close_pairing(&self) {
        self.pairing_tx.lock().unwrap().take();
    }

    pub fn count(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub(crate) struct ScriptedFactory {
    state: Arc<ScriptState>,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> Arc<ScriptState> {
        Arc::clone(&self.state)
    }
}

impl ClientFactory for ScriptedFactory {
    fn new_client(
        &self,
        credentials: Option<Credentials>,
    ) -> Result<Arc<dyn RemoteClient>, RemoteError> {
        self.state.clients_created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(ScriptedClient {
            state: Arc::clone(&self.state),
            connected: Arc::new(AtomicBool::new(false)),
            paired: credentials.is_some(),
        }))
    }
}

pub(crate) struct ScriptedClient {
    state: Arc<ScriptState>,
    connected: Arc<AtomicBool>,
    paired: bool,
}

#[async_trait]
impl RemoteClient for ScriptedClient {
    async fn connect(&self) -> Result<(), RemoteError> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_connect.load(Ordering::SeqCst) {
            return Err(RemoteError::ConnectionLost("scripted connect failure".to_string()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn logout(&self) -> Result<(), RemoteError> {
        self.state.logouts.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_logout.load(Ordering::SeqCst) {
            return Err(RemoteError::Transient("scripted logout failure".to_string()));
        }
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) {
        self.state.disconnects.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
    }

    async fn pairing_stream(&self) -> Result<RemotePairingStream, RemoteError> {
        self.state.pairing_streams.fetch_add(1, Ordering::SeqCst);
        if self.paired {
            return Err(RemoteError::Rejected("already paired".to_string()));
        }
        if self.state.fail_pairing.load(Ordering::SeqCst) {
            return Err(RemoteError::ConnectionLost("scripted pairing failure".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *self.state.pairing_tx.lock().unwrap() = Some(tx);

        let connected = Arc::clone(&self.connected);
        let stream = UnboundedReceiverStream::new(rx)
            .inspect(move |event| {
                if matches!(event, RemotePairingEvent::Success(_)) {
                    connected.store(true, Ordering::SeqCst);
                }
            })
            .boxed();
        Ok(stream)
    }

    async fn lookup(&self, addresses: &[String]) -> Result<Vec<LookupEntry>, RemoteError> {
        self.state.lookups.lock().unwrap().push(addresses.to_vec());
        if let Some(err) = self.state.lookup_error.lock().unwrap().clone() {
            return Err(err);
        }
        let unregistered = self.state.unregistered.lock().unwrap();
        Ok(addresses
            .iter()
            .map(|address| LookupEntry {
                address: address.clone(),
                registered: !unregistered.contains(address),
            })
            .collect())
    }

    async fn send(&self, address: &str, body: &str) -> Result<(), RemoteError> {
        self.state.send_calls.fetch_add(1, Ordering::SeqCst);
        if !self.is_connected() {
            return Err(RemoteError::NotConnected);
        }
        if let Some(err) = self.state.sticky_send_error.lock().unwrap().clone() {
            return Err(err);
        }
        if let Some(err) = self.state.send_errors.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.state
            .sent
            .lock()
            .unwrap()
            .push((address.to_string(), body.to_string()));
        Ok(())
    }
}
