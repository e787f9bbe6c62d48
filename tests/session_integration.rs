//! Integration tests from an operator's perspective.
//!
//! These exercise the public API end to end without a bridge sidecar: a
//! loopback network stands in for the messaging protocol, while the device
//! store is a real file in a temp directory.
//!
//! Run: `cargo test --test session_integration`

mod support {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use futures::StreamExt;
    use pairgate::error::RemoteError;
    use pairgate::gateway::{AddressFormat, MessagingGateway, RetryPolicy};
    use pairgate::remote::{
        ClientFactory, LookupEntry, RemoteClient, RemotePairingEvent, RemotePairingStream,
    };
    use pairgate::session::{LifecycleConfig, LifecycleController, SessionHolder};
    use pairgate::store::{Credentials, FileBackend, SessionKey};

    pub const PAIRED_IDENTITY: &str = "6281111111111";

    /// Shared view of the fake network.
    #[derive(Default)]
    pub struct Network {
        pub registered: Mutex<HashSet<String>>,
        pub sent: Mutex<Vec<(String, String)>>,
        pub logouts: AtomicU32,
    }

    pub struct LoopbackFactory {
        pub network: Arc<Network>,
    }

    impl ClientFactory for LoopbackFactory {
        fn new_client(
            &self,
            credentials: Option<Credentials>,
        ) -> Result<Arc<dyn RemoteClient>, RemoteError> {
            Ok(Arc::new(LoopbackClient {
                network: Arc::clone(&self.network),
                connected: Arc::new(AtomicBool::new(false)),
                paired: credentials.is_some(),
            }))
        }
    }

    struct LoopbackClient {
        network: Arc<Network>,
        connected: Arc<AtomicBool>,
        paired: bool,
    }

    #[async_trait]
    impl RemoteClient for LoopbackClient {
        async fn connect(&self) -> Result<(), RemoteError> {
            if !self.paired {
                return Err(RemoteError::Rejected("not paired".into()));
            }
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        async fn logout(&self) -> Result<(), RemoteError> {
            self.network.logouts.fetch_add(1, Ordering::SeqCst);
            self.connected.store(false, Ordering::SeqCst);
            Ok(())
        }

        async fn disconnect(&self) {
            self.connected.store(false, Ordering::SeqCst);
        }

        async fn pairing_stream(&self) -> Result<RemotePairingStream, RemoteError> {
            let connected = Arc::clone(&self.connected);
            let events = vec![
                RemotePairingEvent::Code("CODE-1".into()),
                RemotePairingEvent::Success(Credentials::new(
                    PAIRED_IDENTITY,
                    SessionKey::new("noise-key"),
                )),
            ];
            Ok(futures::stream::iter(events)
                .inspect(move |event| {
                    if matches!(event, RemotePairingEvent::Success(_)) {
                        connected.store(true, Ordering::SeqCst);
                    }
                })
                .boxed())
        }

        async fn lookup(&self, addresses: &[String]) -> Result<Vec<LookupEntry>, RemoteError> {
            let registered = self.network.registered.lock().unwrap();
            Ok(addresses
                .iter()
                .map(|address| LookupEntry {
                    address: address.clone(),
                    registered: registered.contains(address),
                })
                .collect())
        }

        async fn send(&self, address: &str, body: &str) -> Result<(), RemoteError> {
            if !self.is_connected() {
                return Err(RemoteError::NotConnected);
            }
            self.network
                .sent
                .lock()
                .unwrap()
                .push((address.to_string(), body.to_string()));
            Ok(())
        }
    }

    pub struct Service {
        pub controller: LifecycleController,
        pub gateway: MessagingGateway,
    }

    /// A fresh service over the store at `path`, as after a process start.
    pub fn service(path: &std::path::Path, network: &Arc<Network>) -> Service {
        let holder = Arc::new(SessionHolder::new());
        let config = LifecycleConfig {
            pairing_timeout: Duration::from_secs(5),
            disconnect_settle: Duration::ZERO,
            reset_settle: Duration::ZERO,
        };
        let controller = LifecycleController::new(
            Arc::clone(&holder),
            Arc::new(FileBackend::new(path)),
            Arc::new(LoopbackFactory {
                network: Arc::clone(network),
            }),
            config,
        );
        let gateway =
            MessagingGateway::new(holder, AddressFormat::default(), RetryPolicy::default());
        Service {
            controller,
            gateway,
        }
    }
}

// ============================================================================
// 1. Pairing, sending and restart
// ============================================================================
mod pairing_journey {
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    use pairgate::session::{ConnectOutcome, ConnectionState, PairingEvent};
    use pairgate::store::{DeviceStore, FileDeviceStore};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::support::{Network, PAIRED_IDENTITY, service};

    #[tokio::test]
    async fn test_pair_send_restart_disconnect() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("device.json");
        let network = Arc::new(Network::default());
        network
            .registered
            .lock()
            .unwrap()
            .insert("6281234567890@s.whatsapp.net".to_string());

        // First start: nothing stored, so Connect pairs.
        let first = service(&path, &network);
        assert_eq!(
            first.controller.init().await.unwrap(),
            ConnectionState::Unpaired
        );
        let ConnectOutcome::Pairing(mut stream) = first.controller.connect().await.unwrap() else {
            panic!("expected a pairing stream");
        };
        assert_eq!(
            stream.next_event().await,
            Some(PairingEvent::Code("CODE-1".into()))
        );
        assert_eq!(
            stream.next_event().await,
            Some(PairingEvent::Success(PAIRED_IDENTITY.into()))
        );
        assert_eq!(stream.next_event().await, None);

        let status = first.controller.status().await;
        assert_eq!(status.state, ConnectionState::Connected);
        assert!(status.connected);
        assert_eq!(status.identity, PAIRED_IDENTITY);

        // Sending normalizes the local number.
        let registration = first.gateway.check_registered("0812-3456-7890").await.unwrap();
        assert!(registration.registered);
        let receipt = first.gateway.send("081234567890", "hello").await.unwrap();
        assert_eq!(receipt.address, "6281234567890@s.whatsapp.net");
        assert_eq!(receipt.attempts, 1);
        drop(first);

        // Second start: the stored credentials restore the session.
        let second = service(&path, &network);
        assert_eq!(
            second.controller.init().await.unwrap(),
            ConnectionState::Connected
        );
        assert_eq!(second.controller.status().await.identity, PAIRED_IDENTITY);
        second.gateway.send("6281234567890", "again").await.unwrap();
        assert_eq!(network.sent.lock().unwrap().len(), 2);

        // Disconnect logs out and forgets the identity.
        second.controller.disconnect().await.unwrap();
        assert_eq!(network.logouts.load(Ordering::SeqCst), 1);
        let status = second.controller.status().await;
        assert_eq!(status.state, ConnectionState::Unpaired);
        assert!(status.identity.is_empty());
        assert!(second.gateway.send("081234567890", "gone").await.is_err());

        let store = FileDeviceStore::open(&path).await.unwrap();
        assert!(store.first_identity().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reset_recovers_unreadable_store() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("device.json");
        std::fs::write(&path, b"{ not json").unwrap();
        let network = Arc::new(Network::default());

        let svc = service(&path, &network);
        let err = svc.controller.init().await.unwrap_err();
        assert_eq!(err.code(), "store_corrupted");

        svc.controller.reset().await.unwrap();
        assert_eq!(svc.controller.status().await.state, ConnectionState::Unpaired);
        assert!(matches!(
            svc.controller.connect().await.unwrap(),
            ConnectOutcome::Pairing(_)
        ));
    }
}

// ============================================================================
// 2. Address normalization
// ============================================================================
mod addressing {
    use pairgate::gateway::AddressFormat;

    #[test]
    fn test_local_and_international_forms_agree() {
        let format = AddressFormat::default();
        let local = format.normalize("0812 3456 7890").unwrap();
        let international = format.normalize("+62 812-3456-7890").unwrap();
        assert_eq!(local, international);
        assert_eq!(local, "6281234567890@s.whatsapp.net");
    }

    #[test]
    fn test_custom_country_code() {
        let format = AddressFormat::new("44", "s.whatsapp.net");
        assert_eq!(
            format.normalize("07700900123").unwrap(),
            "447700900123@s.whatsapp.net"
        );
    }

    #[test]
    fn test_no_digits_is_rejected() {
        let err = AddressFormat::default().normalize("call me").unwrap_err();
        assert_eq!(err.code(), "invalid_recipient");
    }
}

// ============================================================================
// 3. Configuration
// ============================================================================
mod configuration {
    use std::collections::HashMap;

    use pairgate::Config;

    #[test]
    fn test_environment_drives_the_service() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("PAIRGATE_BIND", "127.0.0.1:7100"),
            ("PAIRGATE_BRIDGE_URL", "http://bridge.internal:9000"),
            ("PAIRGATE_PAIRING_TIMEOUT_SECS", "30"),
        ]);
        let config = Config::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();

        assert_eq!(config.bind.port(), 7100);
        assert_eq!(config.bridge.base_url.host_str(), Some("bridge.internal"));
        assert_eq!(config.lifecycle.pairing_timeout.as_secs(), 30);
        assert!(pairgate::build_state(&config).is_ok());
    }
}
