//! REST handlers for the messaging API.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};

use super::AppState;
use super::types::{
    ApiResponse, CheckNumberData, CheckNumberRequest, SendMessageData, SendMessageRequest,
    StatusResponse, gateway_status,
};
use crate::error::GatewayError;

/// GET /api/wa/status
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let snapshot = state.controller.status().await;
    Json(StatusResponse {
        success: true,
        message: "Messaging API is running".to_string(),
        connected: snapshot.connected,
        identity: snapshot.identity,
        state: snapshot.state,
    })
}

/// POST /api/wa/send
///
/// The recipient's registration is checked first. An unregistered number is
/// rejected; a failed check is logged and the send goes ahead.
pub async fn send_message(
    State(state): State<AppState>,
    body: Result<Json<SendMessageRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Ok(Json(req)) = body else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::<SendMessageData>::err(
                "invalid_input",
                "Invalid request body",
            )),
        );
    };

    let is_valid_number = match state.gateway.check_registered(&req.to).await {
        Ok(registration) if !registration.registered => {
            return (
                StatusCode::BAD_REQUEST,
                Json(
                    ApiResponse::err("invalid_recipient", "Phone number is not registered")
                        .with_data(SendMessageData {
                            to: req.to,
                            message: req.message,
                            is_valid_number: Some(false),
                        }),
                ),
            );
        }
        Ok(_) => Some(true),
        Err(e) => {
            tracing::warn!(to = %req.to, error = %e, "Recipient check failed, sending anyway");
            None
        }
    };

    match state.gateway.send(&req.to, &req.message).await {
        Ok(receipt) => {
            tracing::debug!(address = %receipt.address, attempts = receipt.attempts, "Send request completed");
            (
                StatusCode::OK,
                Json(ApiResponse::ok(
                    "Message sent successfully",
                    SendMessageData {
                        to: req.to,
                        message: req.message,
                        is_valid_number,
                    },
                )),
            )
        }
        Err(e) => {
            let status = gateway_status(&e);
            let mut response = ApiResponse::err(e.code(), send_error_message(&e));
            if matches!(e, GatewayError::SendFailed { .. }) {
                tracing::error!(to = %req.to, error = %e, "Failed to send message");
                response = response.with_data(SendMessageData {
                    to: req.to,
                    message: req.message,
                    is_valid_number,
                });
            }
            (status, Json(response))
        }
    }
}

/// POST /api/wa/check
pub async fn check_number(
    State(state): State<AppState>,
    body: Result<Json<CheckNumberRequest>, JsonRejection>,
) -> impl IntoResponse {
    if !state.controller.holder().is_connected().await {
        let e = GatewayError::NotConnected;
        return (
            gateway_status(&e),
            Json(ApiResponse::<CheckNumberData>::err(e.code(), e.to_string())),
        );
    }

    let Ok(Json(req)) = body else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::err("invalid_input", "Invalid request body")),
        );
    };

    if req.phone_number.trim().is_empty() {
        let e = GatewayError::InvalidInput {
            field: "phone_number",
        };
        return (
            gateway_status(&e),
            Json(ApiResponse::err(e.code(), e.to_string())),
        );
    }

    match state.gateway.check_registered(&req.phone_number).await {
        Ok(registration) => (
            StatusCode::OK,
            Json(ApiResponse::ok(
                "Number checked successfully",
                CheckNumberData {
                    phone_number: req.phone_number,
                    is_registered: registration.registered,
                    formatted_number: registration.address,
                },
            )),
        ),
        Err(e) => {
            tracing::warn!(phone_number = %req.phone_number, error = %e, "Failed to check number");
            let message = match &e {
                GatewayError::LookupFailed(inner) => format!("Failed to check number: {inner}"),
                other => other.to_string(),
            };
            (gateway_status(&e), Json(ApiResponse::err(e.code(), message)))
        }
    }
}

fn send_error_message(err: &GatewayError) -> String {
    match err {
        GatewayError::SendFailed { .. } => format!("Failed to send message: {err}"),
        other => other.to_string(),
    }
}
