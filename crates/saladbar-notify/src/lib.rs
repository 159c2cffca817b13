//! Salad bar notification bridge.
//!
//! Streams resource change notifications from a publish/subscribe broker to
//! websocket clients. Each client connection:
//! - Subscribes to the channel named by its opening path, if any
//! - Lists, subscribes to and unsubscribes from channels on request
//! - Receives every change published on its channels as it happens
//!
//! Channels are checked against the resource API before a subscription is
//! accepted.

pub mod broker;
pub mod config;
pub mod connection;
pub mod error;
pub mod registry;
pub mod routes;
pub mod state;
pub mod validator;

use axum::Router;
use tower_http::trace::TraceLayer;

pub use error::{Error, Result, SubscriptionError};

use crate::state::AppState;

/// Create the Axum router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .merge(routes::health::routes())
        // Every other path opens a websocket on that channel
        .fallback(connection::ws_handler)
        // Middleware
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
