//! Control-plane WebSocket adapter.
//!
//! One adapter per socket. The read loop handles one command at a time;
//! pairing events are forwarded by a separate task so a long pairing never
//! blocks `status` or `disconnect`. Both push into the same outbound queue,
//! drained by a single writer task. Closing the socket leaves the session
//! untouched.

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use super::AppState;
use super::types::{WsEvent, WsRequest};
use crate::error::SessionError;
use crate::session::{ConnectOutcome, PairingEvent, PairingStream};

/// GET /api/wa/ws
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut source) = socket.split();
    let (events, mut outbound) = mpsc::unbounded_channel::<WsEvent>();

    tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to encode control event");
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let adapter = ControlAdapter { state, events };

    // A failed init keeps the socket open: `reset` recovers an unreadable store.
    match adapter.state.controller.init().await {
        Ok(_) => adapter.push_status().await,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize session for control client");
            adapter.push(
                WsEvent::error(format!("Failed to initialize session: {e}")).with_data(e.code()),
            );
        }
    }

    while let Some(frame) = source.next().await {
        match frame {
            Ok(Message::Text(text)) => adapter.handle(text.as_str()).await,
            Ok(Message::Binary(_)) => adapter.push(WsEvent::error("Invalid request")),
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(error = %e, "Control socket read failed");
                break;
            }
        }
    }

    tracing::debug!("Control client disconnected");
}

struct ControlAdapter {
    state: AppState,
    events: mpsc::UnboundedSender<WsEvent>,
}

impl ControlAdapter {
    fn push(&self, event: WsEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("Control client gone, dropping event");
        }
    }

    async fn handle(&self, text: &str) {
        let request: WsRequest = match serde_json::from_str(text) {
            Ok(request) => request,
            Err(_) => {
                self.push(WsEvent::error("Invalid request"));
                return;
            }
        };

        match request.action.as_str() {
            "connect" => self.connect().await,
            "disconnect" => self.disconnect().await,
            "status" => self.push_status().await,
            "reset" => self.reset().await,
            other => {
                tracing::debug!(action = %other, "Unknown control action");
                self.push(WsEvent::error("Unknown action"));
            }
        }
    }

    async fn connect(&self) {
        let controller = &self.state.controller;
        match controller.connect().await {
            Ok(ConnectOutcome::AlreadyConnected { identity }) => {
                self.push(WsEvent::new("connected", true, "Already connected").with_data(identity));
            }
            Ok(ConnectOutcome::Restored { identity }) => {
                self.push(WsEvent::new("connected", true, "Connected").with_data(identity));
            }
            Ok(ConnectOutcome::AlreadyPairing) => {
                self.push(WsEvent::error("Pairing already in progress"));
            }
            Ok(ConnectOutcome::Pairing(stream)) => {
                tokio::spawn(forward_pairing(stream, self.events.clone()));
            }
            Err(e) => {
                tracing::warn!(error = %e, "Connect failed, resetting session");
                if let Err(reset_err) = controller.reset().await {
                    tracing::warn!(error = %reset_err, "Reset after failed connect also failed");
                }
                self.push(WsEvent::error("Failed to connect, please try again"));
            }
        }
    }

    async fn disconnect(&self) {
        self.push(WsEvent::new("disconnected", true, "Disconnecting..."));
        match self.state.controller.disconnect().await {
            Ok(()) => self.push(WsEvent::new("disconnected", true, "Disconnected successfully")),
            Err(e) => {
                tracing::warn!(error = %e, "Disconnect failed");
                self.push(WsEvent::error("Disconnect failed"));
            }
        }
    }

    async fn reset(&self) {
        match self.state.controller.reset().await {
            Ok(()) => self.push(WsEvent::new("reset", true, "Client reset successfully")),
            Err(e) => {
                tracing::warn!(error = %e, "Reset failed");
                self.push(WsEvent::error("Reset failed"));
            }
        }
    }

    async fn push_status(&self) {
        let status = self.state.controller.status().await;
        let event = if status.connected {
            WsEvent::new("connected", true, "Connected").with_data(status.identity)
        } else {
            WsEvent::new("disconnected", false, "Not connected")
        };
        self.push(event);
    }
}

/// Relay one pairing attempt to the control client.
async fn forward_pairing(mut stream: PairingStream, events: mpsc::UnboundedSender<WsEvent>) {
    while let Some(event) = stream.next_event().await {
        let terminal = event.is_terminal();
        let out = match event {
            PairingEvent::Code(code) => WsEvent::new("qr", true, "Scan QR code").with_data(code),
            PairingEvent::Success(identity) => {
                WsEvent::new("connected", true, "Connected successfully").with_data(identity)
            }
            PairingEvent::Timeout => WsEvent::new("timeout", false, "QR timeout")
                .with_data(SessionError::PairingTimeout.code()),
            PairingEvent::Closed => WsEvent::error("QR channel closed"),
        };
        if events.send(out).is_err() || terminal {
            break;
        }
    }
}
