//! Request and response bodies for the HTTP and WebSocket surface.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::session::ConnectionState;

/// JSON envelope returned by every REST endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    /// Stable failure code, absent on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            code: None,
            data: Some(data),
        }
    }

    pub fn err(code: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            code: Some(code.to_string()),
            data: None,
        }
    }

    pub fn with_data(mut self, data: T) -> Self {
        self.data = Some(data);
        self
    }
}

/// POST /api/wa/send body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageData {
    pub to: String,
    pub message: String,
    /// Registration pre-check result; absent when the check itself failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_valid_number: Option<bool>,
}

/// POST /api/wa/check body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckNumberRequest {
    #[serde(default)]
    pub phone_number: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckNumberData {
    pub phone_number: String,
    pub is_registered: bool,
    pub formatted_number: String,
}

/// GET /api/wa/status body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub success: bool,
    pub message: String,
    pub connected: bool,
    pub identity: String,
    pub state: ConnectionState,
}

/// Command sent by a control-plane client.
#[derive(Debug, Clone, Deserialize)]
pub struct WsRequest {
    pub action: String,
}

/// Event pushed to a control-plane client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WsEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl WsEvent {
    pub fn new(kind: &str, success: bool, message: impl Into<String>) -> Self {
        Self {
            kind: kind.to_string(),
            success,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: impl Into<serde_json::Value>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new("error", false, message)
    }
}

/// HTTP status for a gateway failure.
pub fn gateway_status(err: &GatewayError) -> StatusCode {
    match err {
        GatewayError::NotConnected
        | GatewayError::InvalidInput { .. }
        | GatewayError::InvalidRecipient { .. } => StatusCode::BAD_REQUEST,
        GatewayError::LookupFailed(_) | GatewayError::SendFailed { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
