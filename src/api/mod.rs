//! HTTP and WebSocket surface.
//!
//! ```text
//! GET  /api/wa/status  -> session status
//! POST /api/wa/send    -> send a text message
//! POST /api/wa/check   -> registration lookup
//! GET  /api/wa/ws      -> control-plane WebSocket
//! ```

pub mod auth;
pub mod handlers;
pub mod server;
pub mod types;
pub mod ws;

use std::sync::Arc;

use axum::{
    Router,
    http::{HeaderName, Method, header},
    middleware,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::gateway::MessagingGateway;
use crate::session::LifecycleController;

pub use auth::AuthState;
pub use server::{ApiServer, ApiServerConfig};

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub controller: LifecycleController,
    pub gateway: Arc<MessagingGateway>,
}

/// Build the API router. With `auth`, every route requires the bearer token.
pub fn router(state: AppState, auth: Option<AuthState>) -> Router {
    let routes = Router::new()
        .route("/api/wa/ws", get(ws::ws_handler))
        .route("/api/wa/send", post(handlers::send_message))
        .route("/api/wa/check", post(handlers::check_number))
        .route("/api/wa/status", get(handlers::status))
        .with_state(state);

    let routes = match auth {
        Some(auth) => routes.layer(middleware::from_fn_with_state(auth, auth::auth_middleware)),
        None => routes,
    };

    routes
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}

fn cors_layer() -> CorsLayer {
    let headers: [HeaderName; 3] = [header::ORIGIN, header::CONTENT_TYPE, header::AUTHORIZATION];
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(headers)
}
