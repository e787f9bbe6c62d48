//! Bridge client: the protocol engine runs in a sidecar process.
//!
//! Requests go over HTTP, the pairing code stream over a WebSocket:
//!
//! ```text
//! POST {base}/v1/sessions/{id}/connect     {device_name, credentials}
//! POST {base}/v1/sessions/{id}/logout
//! POST {base}/v1/sessions/{id}/disconnect
//! GET  {base}/v1/sessions/{id}/pair        (WebSocket, JSON frames)
//! POST {base}/v1/sessions/{id}/lookup      {addresses}
//! POST {base}/v1/sessions/{id}/messages    {to, body}
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::Message;
use url::Url;
use uuid::Uuid;

use super::{ClientFactory, LookupEntry, RemoteClient, RemotePairingEvent, RemotePairingStream};
use crate::error::RemoteError;
use crate::store::Credentials;

/// Settings for reaching the bridge sidecar.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Base URL of the sidecar HTTP API.
    pub base_url: Url,
    /// Device name announced to the network when pairing.
    pub device_name: String,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

/// Builds [`BridgeClient`]s sharing one HTTP connection pool.
pub struct BridgeFactory {
    config: BridgeConfig,
    http: reqwest::Client,
}

impl BridgeFactory {
    pub fn new(config: BridgeConfig) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| RemoteError::Protocol(format!("HTTP client setup failed: {}", e)))?;
        Ok(Self { config, http })
    }
}

impl ClientFactory for BridgeFactory {
    fn new_client(
        &self,
        credentials: Option<Credentials>,
    ) -> Result<Arc<dyn RemoteClient>, RemoteError> {
        Ok(Arc::new(BridgeClient::new(
            self.http.clone(),
            self.config.clone(),
            credentials,
        )))
    }
}

#[derive(Serialize)]
struct ConnectBody<'a> {
    device_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    credentials: Option<&'a Credentials>,
}

#[derive(Serialize)]
struct LookupBody<'a> {
    addresses: &'a [String],
}

#[derive(Deserialize)]
struct LookupReply {
    #[serde(default)]
    results: Vec<LookupEntry>,
}

#[derive(Serialize)]
struct SendBody<'a> {
    to: &'a str,
    body: &'a str,
}

#[derive(Deserialize, Default)]
struct ErrorReply {
    #[serde(default)]
    error: String,
}

/// Frames pushed by the sidecar on the pairing WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum PairingFrame {
    Code { code: String },
    Success { credentials: Credentials },
    Timeout,
}

impl From<PairingFrame> for RemotePairingEvent {
    fn from(frame: PairingFrame) -> Self {
        match frame {
            PairingFrame::Code { code } => Self::Code(code),
            PairingFrame::Success { credentials } => Self::Success(credentials),
            PairingFrame::Timeout => Self::Timeout,
        }
    }
}

/// One protocol session held by the sidecar.
pub struct BridgeClient {
    http: reqwest::Client,
    config: BridgeConfig,
    credentials: Option<Credentials>,
    session_id: Uuid,
    connected: Arc<AtomicBool>,
}

impl BridgeClient {
    fn new(http: reqwest::Client, config: BridgeConfig, credentials: Option<Credentials>) -> Self {
        Self {
            http,
            config,
            credentials,
            session_id: Uuid::new_v4(),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    fn endpoint(&self, action: &str) -> Result<Url, RemoteError> {
        session_url(&self.config.base_url, self.session_id, action)
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        action: &str,
        body: &B,
    ) -> Result<reqwest::Response, RemoteError> {
        let url = self.endpoint(action)?;
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(map_transport)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let err = classify(status, &text);
        if err.is_connection_down() {
            self.connected.store(false, Ordering::SeqCst);
        }
        Err(err)
    }
}

#[async_trait]
impl RemoteClient for BridgeClient {
    async fn connect(&self) -> Result<(), RemoteError> {
        let body = ConnectBody {
            device_name: &self.config.device_name,
            credentials: self.credentials.as_ref(),
        };
        self.post("connect", &body).await?;
        self.connected.store(true, Ordering::SeqCst);
        tracing::debug!(session = %self.session_id, "Bridge session connected");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn logout(&self) -> Result<(), RemoteError> {
        self.post("logout", &serde_json::json!({})).await?;
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        if let Err(e) = self.post("disconnect", &serde_json::json!({})).await {
            tracing::debug!(session = %self.session_id, error = %e, "Bridge disconnect failed");
        }
    }

    async fn pairing_stream(&self) -> Result<RemotePairingStream, RemoteError> {
        if self.credentials.is_some() {
            return Err(RemoteError::Rejected(
                "client already holds credentials".to_string(),
            ));
        }

        let url = pairing_url(
            &self.config.base_url,
            self.session_id,
            &self.config.device_name,
        )?;
        // The lifecycle gate is held while this runs; never wait past the request timeout.
        let (socket, _) = tokio::time::timeout(
            self.config.request_timeout,
            tokio_tungstenite::connect_async(url.as_str()),
        )
        .await
        .map_err(|_| {
            RemoteError::ConnectionLost(format!(
                "pairing socket: no handshake within {:?}",
                self.config.request_timeout
            ))
        })?
        .map_err(|e| RemoteError::ConnectionLost(format!("pairing socket: {}", e)))?;

        let connected = Arc::clone(&self.connected);
        let events = socket
            .take_while(|msg| futures::future::ready(matches!(msg, Ok(m) if !m.is_close())))
            .filter_map(move |msg| {
                let connected = Arc::clone(&connected);
                async move {
                    let Ok(Message::Text(text)) = msg else {
                        return None;
                    };
                    match serde_json::from_str::<PairingFrame>(text.as_str()) {
                        Ok(frame) => {
                            if matches!(frame, PairingFrame::Success { .. }) {
                                connected.store(true, Ordering::SeqCst);
                            }
                            Some(RemotePairingEvent::from(frame))
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Ignoring malformed pairing frame");
                            None
                        }
                    }
                }
            })
            .boxed();

        Ok(events)
    }

    async fn lookup(&self, addresses: &[String]) -> Result<Vec<LookupEntry>, RemoteError> {
        let response = self.post("lookup", &LookupBody { addresses }).await?;
        let reply: LookupReply = response
            .json()
            .await
            .map_err(|e| RemoteError::Protocol(format!("lookup reply: {}", e)))?;
        Ok(reply.results)
    }

    async fn send(&self, address: &str, body: &str) -> Result<(), RemoteError> {
        self.post("messages", &SendBody { to: address, body })
            .await
            .map(|_| ())
    }
}

fn session_url(base: &Url, session_id: Uuid, action: &str) -> Result<Url, RemoteError> {
    base.join(&format!("v1/sessions/{}/{}", session_id, action))
        .map_err(|e| RemoteError::Protocol(format!("bad bridge URL: {}", e)))
}

fn pairing_url(base: &Url, session_id: Uuid, device_name: &str) -> Result<Url, RemoteError> {
    let mut url = session_url(base, session_id, "pair")?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme)
        .map_err(|()| RemoteError::Protocol(format!("cannot use {} for pairing", base)))?;
    url.query_pairs_mut().append_pair("device_name", device_name);
    Ok(url)
}

fn map_transport(err: reqwest::Error) -> RemoteError {
    if err.is_connect() {
        RemoteError::ConnectionLost(err.to_string())
    } else {
        RemoteError::Transient(err.to_string())
    }
}

/// Map a non-success bridge reply to a remote error.
fn classify(status: StatusCode, body: &str) -> RemoteError {
    let reason = serde_json::from_str::<ErrorReply>(body)
        .map(|r| r.error)
        .unwrap_or_else(|_| body.trim().to_string());

    if reason == "not_connected" {
        return RemoteError::NotConnected;
    }
    match status {
        StatusCode::SERVICE_UNAVAILABLE => RemoteError::ConnectionLost(reason),
        StatusCode::CONFLICT => RemoteError::NotConnected,
        s if s.is_client_error() => RemoteError::Rejected(reason),
        _ => RemoteError::Transient(reason),
    }
}
