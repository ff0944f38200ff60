//! Public API handlers.
//!
//! Reachable through a share slug by anyone. Mutations require the
//! `X-Guest-Token` header of a guest session issued for the same list.
//!
//! # Endpoints
//!
//! - `GET    /public/w/{slug}`                           – viewer-dependent list view
//! - `GET    /public/w/{slug}/events`                    – event log page after a cursor
//! - `POST   /public/w/{slug}/guest-session`             – register a display name
//! - `POST   /public/w/{slug}/items/{item_id}/reserve`   – reserve a single item
//! - `DELETE /public/w/{slug}/items/{item_id}/reserve`   – release own reservation
//! - `POST   /public/w/{slug}/items/{item_id}/contributions` – chip in on a group item

use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;
use uuid::Uuid;
use wishlist_sdk::objects::{
    ContributionRequest, ContributionResponse, EventsPage, GuestSessionRequest,
    GuestSessionResponse, PublicWishlistView, ReservationResponse,
};

use crate::api::error::ApiError;
use crate::api::extractors::{GuestToken, ViewerTokens};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/public/w/{slug}", get(get_wishlist))
        .route("/public/w/{slug}/events", get(list_events))
        .route("/public/w/{slug}/guest-session", post(create_guest_session))
        .route(
            "/public/w/{slug}/items/{item_id}/reserve",
            post(reserve_item).delete(unreserve_item),
        )
        .route(
            "/public/w/{slug}/items/{item_id}/contributions",
            post(contribute),
        )
}

type ItemPath = Result<Path<(String, Uuid)>, PathRejection>;

async fn get_wishlist(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    tokens: ViewerTokens,
) -> Result<Json<PublicWishlistView>, ApiError> {
    let view = state.core.public_view(&slug, tokens.credentials()).await?;
    Ok(Json(view))
}

#[derive(Debug, Deserialize)]
struct EventsQuery {
    cursor: Option<i64>,
    limit: Option<u32>,
}

async fn list_events(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    query: Result<Query<EventsQuery>, QueryRejection>,
) -> Result<Json<EventsPage>, ApiError> {
    let Query(query) = query?;
    let page = state
        .core
        .events_page(&slug, query.cursor, query.limit)
        .await?;
    Ok(Json(page))
}

async fn create_guest_session(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    body: Result<Json<GuestSessionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<GuestSessionResponse>), ApiError> {
    let Json(body) = body?;
    let session = state.core.create_guest_session(&slug, &body.name).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn reserve_item(
    State(state): State<AppState>,
    path: ItemPath,
    token: GuestToken,
) -> Result<Json<ReservationResponse>, ApiError> {
    let Path((slug, item_id)) = path?;
    let response = state
        .core
        .reserve(&slug, item_id, token.as_deref())
        .await?;
    Ok(Json(response))
}

async fn unreserve_item(
    State(state): State<AppState>,
    path: ItemPath,
    token: GuestToken,
) -> Result<Json<ReservationResponse>, ApiError> {
    let Path((slug, item_id)) = path?;
    let response = state
        .core
        .unreserve(&slug, item_id, token.as_deref())
        .await?;
    Ok(Json(response))
}

async fn contribute(
    State(state): State<AppState>,
    path: ItemPath,
    token: GuestToken,
    body: Result<Json<ContributionRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ContributionResponse>), ApiError> {
    let Path((slug, item_id)) = path?;
    let Json(body) = body?;
    let response = state
        .core
        .contribute(&slug, item_id, token.as_deref(), body.amount)
        .await?;
    Ok((StatusCode::CREATED, Json(response)))
}
