//! Public API client (guest or anonymous browser → wishlist server).
//!
//! Read paths (snapshot and event log) are retried on transport and 5xx
//! errors. Mutations are sent once: a conflict or a rejected guest token is
//! returned to the caller as is.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use url::Url;
use uuid::Uuid;

use super::{ClientError, GuestSessionCache, parse_response};
use crate::objects::{
    ContributionRequest, ContributionResponse, EventsPage, GUEST_TOKEN_HEADER,
    GuestSessionRequest, GuestSessionResponse, PublicWishlistView, ReservationResponse,
};
use crate::realtime::EventLogReader;

/// Typed HTTP client for the wishlist **public API**.
///
/// Guest sessions are cached per share slug and attached to every request
/// for that list as the `X-Guest-Token` header.
#[derive(Debug)]
pub struct PublicClient {
    http: Client,
    base_url: Url,
    owner_token: Option<String>,
    guests: GuestSessionCache,
    read_retries: u32,
    retry_delay: Duration,
}

impl PublicClient {
    pub fn new(base_url: Url) -> Self {
        Self {
            http: Client::new(),
            base_url,
            owner_token: None,
            guests: GuestSessionCache::new(),
            read_retries: 3,
            retry_delay: Duration::from_millis(200),
        }
    }

    /// Replace the default `reqwest::Client` with a custom one.
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// Identify as the list owner when reading snapshots.
    pub fn with_owner_token(mut self, token: impl Into<String>) -> Self {
        self.owner_token = Some(token.into());
        self
    }

    /// How many times a failed read is repeated, and the base delay between
    /// attempts (multiplied by the attempt number).
    pub fn with_read_retries(mut self, retries: u32, delay: Duration) -> Self {
        self.read_retries = retries;
        self.retry_delay = delay;
        self
    }

    pub fn guest_session(&self, slug: &str) -> Option<GuestSessionResponse> {
        self.guests.get(slug)
    }

    /// Drop the cached session for `slug`, e.g. after switching identity.
    pub fn forget_guest_session(&self, slug: &str) {
        self.guests.remove(slug);
    }

    fn endpoint(&self, slug: &str, rest: &str) -> Result<Url, ClientError> {
        Ok(self.base_url.join(&format!(
            "/api/v1/public/w/{}{rest}",
            urlencoding::encode(slug)
        ))?)
    }

    fn guest_token(&self, slug: &str) -> Result<String, ClientError> {
        self.guests
            .get(slug)
            .map(|session| session.token)
            .ok_or_else(|| ClientError::Auth(format!("no guest session for {slug}")))
    }

    async fn read_with_retry<T, Fut>(&self, op: impl Fn() -> Fut) -> Result<T, ClientError>
    where
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Err(e) if e.is_retryable() && attempt < self.read_retries => {
                    attempt += 1;
                    tracing::debug!(error = %e, attempt, "retrying read");
                    tokio::time::sleep(self.retry_delay * attempt).await;
                }
                result => return result,
            }
        }
    }

    /// `GET /api/v1/public/w/{slug}` – the list as seen by this viewer.
    pub async fn get_wishlist(&self, slug: &str) -> Result<PublicWishlistView, ClientError> {
        let url = &self.endpoint(slug, "")?;
        self.read_with_retry(move || async move {
            let mut req = self.http.get(url.clone());
            if let Some(token) = &self.owner_token {
                req = req.header(AUTHORIZATION, format!("Bearer {token}"));
            }
            if let Some(session) = self.guests.get(slug) {
                req = req.header(GUEST_TOKEN_HEADER, session.token);
            }
            parse_response(req.send().await?).await
        })
        .await
    }

    /// `POST /api/v1/public/w/{slug}/guest-session` – register a display
    /// name. Always issues a new session, which replaces the cached one.
    pub async fn create_guest_session(
        &self,
        slug: &str,
        name: &str,
    ) -> Result<GuestSessionResponse, ClientError> {
        let url = self.endpoint(slug, "/guest-session")?;
        let resp = self
            .http
            .post(url)
            .json(&GuestSessionRequest {
                name: name.to_string(),
            })
            .send()
            .await?;
        let session: GuestSessionResponse = parse_response(resp).await?;
        self.guests.insert(slug, session.clone());
        Ok(session)
    }

    /// The cached session for `slug`, registering `name` only when there is
    /// none. Concurrent callers for one slug share a single registration.
    pub async fn ensure_guest_session(
        &self,
        slug: &str,
        name: &str,
    ) -> Result<GuestSessionResponse, ClientError> {
        if let Some(session) = self.guests.get(slug) {
            return Ok(session);
        }
        let registration = self.guests.registration(slug);
        let _registering = registration.lock().await;
        match self.guests.get(slug) {
            Some(session) => Ok(session),
            None => self.create_guest_session(slug, name).await,
        }
    }

    /// `POST /api/v1/public/w/{slug}/items/{item_id}/reserve`
    pub async fn reserve(
        &self,
        slug: &str,
        item_id: Uuid,
    ) -> Result<ReservationResponse, ClientError> {
        let url = self.endpoint(slug, &format!("/items/{item_id}/reserve"))?;
        let token = self.guest_token(slug)?;
        let resp = self
            .http
            .post(url)
            .header(GUEST_TOKEN_HEADER, token)
            .send()
            .await?;
        self.guarded(slug, parse_response(resp).await)
    }

    /// `DELETE /api/v1/public/w/{slug}/items/{item_id}/reserve`
    pub async fn unreserve(
        &self,
        slug: &str,
        item_id: Uuid,
    ) -> Result<ReservationResponse, ClientError> {
        let url = self.endpoint(slug, &format!("/items/{item_id}/reserve"))?;
        let token = self.guest_token(slug)?;
        let resp = self
            .http
            .delete(url)
            .header(GUEST_TOKEN_HEADER, token)
            .send()
            .await?;
        self.guarded(slug, parse_response(resp).await)
    }

    /// `POST /api/v1/public/w/{slug}/items/{item_id}/contributions`
    ///
    /// The response carries the authoritative totals; callers overwrite
    /// their local state with it.
    pub async fn contribute(
        &self,
        slug: &str,
        item_id: Uuid,
        amount: rust_decimal::Decimal,
    ) -> Result<ContributionResponse, ClientError> {
        let url = self.endpoint(slug, &format!("/items/{item_id}/contributions"))?;
        let token = self.guest_token(slug)?;
        let resp = self
            .http
            .post(url)
            .header(GUEST_TOKEN_HEADER, token)
            .json(&ContributionRequest { amount })
            .send()
            .await?;
        self.guarded(slug, parse_response(resp).await)
    }

    /// `GET /api/v1/public/w/{slug}/events` – one page of the event log
    /// after `cursor`.
    pub async fn events(
        &self,
        slug: &str,
        cursor: Option<i64>,
        limit: Option<u32>,
    ) -> Result<EventsPage, ClientError> {
        let mut url = self.endpoint(slug, "/events")?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(cursor) = cursor {
                query.append_pair("cursor", &cursor.to_string());
            }
            if let Some(limit) = limit {
                query.append_pair("limit", &limit.to_string());
            }
        }
        let url = &url;
        self.read_with_retry(move || async move {
            parse_response(self.http.get(url.clone()).send().await?).await
        })
        .await
    }

    /// A rejected guest token will not become valid again.
    fn guarded<T>(&self, slug: &str, result: Result<T, ClientError>) -> Result<T, ClientError> {
        if let Err(ClientError::Auth(detail)) = &result {
            tracing::debug!(slug, detail = %detail, "guest session rejected, forgetting it");
            self.guests.remove(slug);
        }
        result
    }
}

#[async_trait]
impl EventLogReader for PublicClient {
    type Error = ClientError;

    async fn fetch_since(
        &self,
        slug: &str,
        cursor: Option<i64>,
    ) -> Result<EventsPage, ClientError> {
        self.events(slug, cursor, None).await
    }
}
