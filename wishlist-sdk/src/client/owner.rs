//! Owner lifecycle client.
//!
//! Every request carries the owner's bearer token, minted by the account
//! service that shares the server's token secret.

use reqwest::Client;
use url::Url;
use uuid::Uuid;

use super::{ClientError, parse_response};
use crate::objects::WishlistSummary;

#[derive(Debug, Clone)]
pub struct OwnerClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl OwnerClient {
    pub fn new(base_url: Url, token: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url,
            token: token.into(),
        }
    }

    /// Replace the default `reqwest::Client` with a custom one.
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    async fn post(&self, path: &str) -> Result<WishlistSummary, ClientError> {
        let url = self.base_url.join(path)?;
        let resp = self.http.post(url).bearer_auth(&self.token).send().await?;
        parse_response(resp).await
    }

    /// `POST /api/v1/wishlists/{id}/publish` – assigns the share slug on the
    /// first call.
    pub async fn publish(&self, wishlist_id: Uuid) -> Result<WishlistSummary, ClientError> {
        self.post(&format!("/api/v1/wishlists/{wishlist_id}/publish"))
            .await
    }

    /// `POST /api/v1/wishlists/{id}/close`
    pub async fn close(&self, wishlist_id: Uuid) -> Result<WishlistSummary, ClientError> {
        self.post(&format!("/api/v1/wishlists/{wishlist_id}/close"))
            .await
    }

    /// `POST /api/v1/wishlists/{id}/items/{item_id}/archive`
    pub async fn archive_item(
        &self,
        wishlist_id: Uuid,
        item_id: Uuid,
    ) -> Result<WishlistSummary, ClientError> {
        self.post(&format!(
            "/api/v1/wishlists/{wishlist_id}/items/{item_id}/archive"
        ))
        .await
    }
}
