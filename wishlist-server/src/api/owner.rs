//! Owner lifecycle handlers.
//!
//! These endpoints require `Authorization: Bearer <owner token>`. Lists of
//! other owners answer 404 like missing ones.
//!
//! # Endpoints
//!
//! - `POST /wishlists/{wishlist_id}/publish`                  – draft/closed → published
//! - `POST /wishlists/{wishlist_id}/close`                    – published → closed
//! - `POST /wishlists/{wishlist_id}/items/{item_id}/archive`  – hide an item

use axum::{
    Json, Router,
    extract::{Path, State, rejection::PathRejection},
    routing::post,
};
use uuid::Uuid;
use wishlist_sdk::objects::WishlistSummary;

use crate::api::error::ApiError;
use crate::api::extractors::OwnerAuth;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/wishlists/{wishlist_id}/publish", post(publish))
        .route("/wishlists/{wishlist_id}/close", post(close))
        .route(
            "/wishlists/{wishlist_id}/items/{item_id}/archive",
            post(archive_item),
        )
}

async fn publish(
    State(state): State<AppState>,
    OwnerAuth(owner_id): OwnerAuth,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<WishlistSummary>, ApiError> {
    let Path(wishlist_id) = path?;
    Ok(Json(state.core.publish(owner_id, wishlist_id).await?))
}

async fn close(
    State(state): State<AppState>,
    OwnerAuth(owner_id): OwnerAuth,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<WishlistSummary>, ApiError> {
    let Path(wishlist_id) = path?;
    Ok(Json(state.core.close(owner_id, wishlist_id).await?))
}

async fn archive_item(
    State(state): State<AppState>,
    OwnerAuth(owner_id): OwnerAuth,
    path: Result<Path<(Uuid, Uuid)>, PathRejection>,
) -> Result<Json<WishlistSummary>, ApiError> {
    let Path((wishlist_id, item_id)) = path?;
    Ok(Json(
        state
            .core
            .archive_item(owner_id, wishlist_id, item_id)
            .await?,
    ))
}
