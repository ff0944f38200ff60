//! HTTP and WebSocket API, mounted under `/api/v1`.

use axum::{Router, routing::get};

use crate::state::AppState;

pub mod error;
pub mod extractors;
mod owner;
mod public;
mod ws;

pub use error::ApiError;

/// Build the `/api/v1` router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(public::router())
        .merge(owner::router())
        .route("/ws/public/w/{slug}", get(ws::public_events_ws))
}
