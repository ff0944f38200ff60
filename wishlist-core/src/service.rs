//! The consistency core: every rule about who may change what, in front of
//! a [`WishlistStore`].
//!
//! Mutations of one list run under a per-list sequencer that spans the store
//! write and the fan-out of its events, so connected sockets see events in
//! id order.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use rust_decimal::Decimal;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;
use wishlist_sdk::objects::{
    ContributionResponse, EventsPage, GuestSessionResponse, PublicWishlistView,
    ReservationResponse, WishlistEvent, WishlistSummary,
};

use crate::config::{RealtimeConfig, TokenConfig};
use crate::entities::contribution::totals_by_item;
use crate::entities::guest_session::normalize_guest_name;
use crate::entities::wishlist::{SLUG_ATTEMPTS, slug_candidates};
use crate::entities::{GuestSession, Item, ItemPatch, NewItem, NewWishlist, Wishlist};
use crate::error::CoreError;
use crate::events::RealtimeHub;
use crate::projection::{Viewer, public_view};
use crate::store::{Mutation, WishlistStore};
use crate::tokens::{TokenKind, TokenSigner};

pub const DEFAULT_EVENTS_LIMIT: u32 = 50;
pub const MAX_EVENTS_LIMIT: u32 = 200;

/// Credentials a public request may carry.
#[derive(Debug, Clone, Copy, Default)]
pub struct Credentials<'a> {
    /// Bearer token from `Authorization`.
    pub owner_token: Option<&'a str>,
    /// Value of `X-Guest-Token`.
    pub guest_token: Option<&'a str>,
}

pub struct ConsistencyCore {
    store: Arc<dyn WishlistStore>,
    hub: Arc<RealtimeHub>,
    signer: TokenSigner,
    guest_ttl: time::Duration,
    realtime: RealtimeConfig,
    sequencers: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl ConsistencyCore {
    pub fn new(
        store: Arc<dyn WishlistStore>,
        tokens: &TokenConfig,
        realtime: RealtimeConfig,
    ) -> Self {
        Self {
            store,
            hub: Arc::new(RealtimeHub::new(realtime.channel_capacity)),
            signer: TokenSigner::new(tokens),
            guest_ttl: tokens.guest_ttl,
            realtime,
            sequencers: Mutex::new(HashMap::new()),
        }
    }

    pub fn hub(&self) -> &Arc<RealtimeHub> {
        &self.hub
    }

    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    pub fn realtime_config(&self) -> &RealtimeConfig {
        &self.realtime
    }

    /// Run a write under the list's sequencer and fan its events out before
    /// the next write on the same list may start.
    async fn sequenced<T, F, Fut>(&self, wishlist_id: Uuid, op: F) -> Result<T, CoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Mutation<T>, CoreError>>,
    {
        let lock = self
            .sequencers
            .lock()
            .await
            .entry(wishlist_id)
            .or_default()
            .clone();
        let result = {
            let _guard = lock.lock().await;
            match op().await {
                Ok(mutation) => {
                    if let Some(slug) = &mutation.share_slug {
                        self.hub.publish(slug, &mutation.events).await;
                    }
                    Ok(mutation.value)
                }
                Err(e) => Err(e),
            }
        };

        let mut sequencers = self.sequencers.lock().await;
        // Only the map and this call hold it: nobody is waiting.
        if Arc::strong_count(&lock) == 2 {
            sequencers.remove(&wishlist_id);
        }
        result
    }

    /// Owner id carried by a bearer token.
    pub fn authenticate_owner(&self, token: &str) -> Result<Uuid, CoreError> {
        Ok(self.signer.verify(token, TokenKind::Owner)?.subject)
    }

    async fn owned_wishlist(&self, owner_id: Uuid, wishlist_id: Uuid) -> Result<Wishlist, CoreError> {
        match self.store.wishlist(wishlist_id).await? {
            Some(wishlist) if wishlist.owner_id == owner_id => Ok(wishlist),
            // Foreign lists are indistinguishable from missing ones.
            _ => Err(CoreError::NotFound("wishlist")),
        }
    }

    /// A list reachable through its share link: published or closed.
    pub async fn public_wishlist(&self, slug: &str) -> Result<Wishlist, CoreError> {
        let wishlist = self
            .store
            .wishlist_by_slug(slug)
            .await?
            .ok_or(CoreError::NotFound("wishlist"))?;
        if !wishlist.is_public() {
            return Err(CoreError::NotPublished);
        }
        Ok(wishlist)
    }

    /// Active, unexpired session of this list named by a guest token.
    async fn guest_session(
        &self,
        wishlist: &Wishlist,
        token: Option<&str>,
    ) -> Result<GuestSession, CoreError> {
        let token = token.ok_or_else(|| CoreError::Auth("guest token required".to_string()))?;
        let claims = self.signer.verify(token, TokenKind::Guest)?;
        if claims.scope != Some(wishlist.id) {
            return Err(CoreError::Auth(
                "guest token belongs to another wishlist".to_string(),
            ));
        }
        match self.store.guest_session(claims.subject).await? {
            Some(session) if session.is_valid_for(wishlist.id, OffsetDateTime::now_utc()) => {
                Ok(session)
            }
            _ => Err(CoreError::Auth("guest session expired or revoked".to_string())),
        }
    }

    async fn resolve_viewer(
        &self,
        wishlist: &Wishlist,
        credentials: Credentials<'_>,
    ) -> Result<Viewer, CoreError> {
        if let Some(token) = credentials.owner_token {
            match self.signer.verify(token, TokenKind::Owner) {
                Ok(claims) if claims.subject == wishlist.owner_id => return Ok(Viewer::Owner),
                Ok(_) => {}
                Err(e) => debug!(error = %e, "ignoring invalid owner token on public view"),
            }
        }
        if credentials.guest_token.is_some() {
            match self.guest_session(wishlist, credentials.guest_token).await {
                Ok(session) => {
                    let contributions = self
                        .store
                        .guest_contributions(wishlist.id, session.id)
                        .await?;
                    return Ok(Viewer::Guest {
                        session_id: session.id,
                        contributions: totals_by_item(&contributions),
                    });
                }
                Err(CoreError::Auth(reason)) => {
                    debug!(reason = %reason, "ignoring guest token on public view");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(Viewer::Anonymous)
    }

    /// `GET /public/w/{slug}`.
    pub async fn public_view(
        &self,
        slug: &str,
        credentials: Credentials<'_>,
    ) -> Result<PublicWishlistView, CoreError> {
        let wishlist = self.public_wishlist(slug).await?;
        let viewer = self.resolve_viewer(&wishlist, credentials).await?;
        let items = self.store.items(wishlist.id).await?;
        let reservations = self.store.active_reservations(wishlist.id).await?;
        Ok(public_view(&wishlist, &items, &reservations, &viewer))
    }

    /// One page of the event log after `cursor`.
    pub async fn events_page(
        &self,
        slug: &str,
        cursor: Option<i64>,
        limit: Option<u32>,
    ) -> Result<EventsPage, CoreError> {
        let limit = limit.unwrap_or(DEFAULT_EVENTS_LIMIT);
        if !(1..=MAX_EVENTS_LIMIT).contains(&limit) {
            return Err(CoreError::Validation(format!(
                "limit must be between 1 and {MAX_EVENTS_LIMIT}"
            )));
        }
        let wishlist = self.public_wishlist(slug).await?;
        let events = self
            .store
            .events_since(wishlist.id, cursor.unwrap_or(0), limit as usize)
            .await?;
        let next_cursor = if events.len() == limit as usize {
            events.last().map(|event| event.id)
        } else {
            None
        };
        Ok(EventsPage {
            events,
            next_cursor,
        })
    }

    /// Next page of events replayed to a socket, `id > cursor`. A page of
    /// `replay_limit` events means more may follow.
    pub async fn replay(
        &self,
        wishlist_id: Uuid,
        cursor: i64,
    ) -> Result<Vec<WishlistEvent>, CoreError> {
        self.store
            .events_since(wishlist_id, cursor, self.realtime.replay_limit)
            .await
    }

    /// Register a display name. Every call issues a new session.
    pub async fn create_guest_session(
        &self,
        slug: &str,
        name: &str,
    ) -> Result<GuestSessionResponse, CoreError> {
        let name = normalize_guest_name(name)?;
        let wishlist = self.public_wishlist(slug).await?;
        let session = GuestSession::new(wishlist.id, name, self.guest_ttl, OffsetDateTime::now_utc());
        let session = self.store.insert_guest_session(session).await?;
        let token = self
            .signer
            .issue_guest(session.id, wishlist.id, session.expires_at);
        info!(slug, guest_session_id = %session.id, "guest session issued");
        Ok(GuestSessionResponse {
            token,
            guest_session_id: session.id,
            guest_name: session.display_name,
            expires_at: session.expires_at,
        })
    }

    pub async fn reserve(
        &self,
        slug: &str,
        item_id: Uuid,
        guest_token: Option<&str>,
    ) -> Result<ReservationResponse, CoreError> {
        let wishlist = self.public_wishlist(slug).await?;
        let session = self.guest_session(&wishlist, guest_token).await?;
        self.sequenced(wishlist.id, || {
            self.store.reserve(wishlist.id, item_id, session.id)
        })
        .await?;
        info!(slug, item_id = %item_id, guest_session_id = %session.id, "item reserved");
        Ok(ReservationResponse {
            message: "Item reserved".to_string(),
            item_id,
            is_reserved: true,
        })
    }

    pub async fn unreserve(
        &self,
        slug: &str,
        item_id: Uuid,
        guest_token: Option<&str>,
    ) -> Result<ReservationResponse, CoreError> {
        let wishlist = self.public_wishlist(slug).await?;
        let session = self.guest_session(&wishlist, guest_token).await?;
        self.sequenced(wishlist.id, || {
            self.store.unreserve(wishlist.id, item_id, session.id)
        })
        .await?;
        info!(slug, item_id = %item_id, guest_session_id = %session.id, "reservation released");
        Ok(ReservationResponse {
            message: "Reservation released".to_string(),
            item_id,
            is_reserved: false,
        })
    }

    pub async fn contribute(
        &self,
        slug: &str,
        item_id: Uuid,
        guest_token: Option<&str>,
        amount: Decimal,
    ) -> Result<ContributionResponse, CoreError> {
        let wishlist = self.public_wishlist(slug).await?;
        let session = self.guest_session(&wishlist, guest_token).await?;
        let outcome = self
            .sequenced(wishlist.id, || {
                self.store.contribute(wishlist.id, item_id, session.id, amount)
            })
            .await?;
        info!(
            slug,
            item_id = %item_id,
            amount = %outcome.accepted_amount,
            collected = %outcome.collected_amount,
            "contribution accepted"
        );
        Ok(ContributionResponse {
            message: "Contribution accepted".to_string(),
            item_id,
            accepted_amount: outcome.accepted_amount,
            collected_amount: outcome.collected_amount,
            progress_percent: outcome.progress_percent,
        })
    }

    pub async fn create_wishlist(&self, new: NewWishlist) -> Result<Wishlist, CoreError> {
        self.store.create_wishlist(new).await
    }

    pub async fn create_item(
        &self,
        owner_id: Uuid,
        wishlist_id: Uuid,
        new: NewItem,
    ) -> Result<Item, CoreError> {
        self.owned_wishlist(owner_id, wishlist_id).await?;
        self.sequenced(wishlist_id, || self.store.create_item(wishlist_id, new))
            .await
    }

    pub async fn update_item(
        &self,
        owner_id: Uuid,
        wishlist_id: Uuid,
        item_id: Uuid,
        patch: ItemPatch,
    ) -> Result<Item, CoreError> {
        self.owned_wishlist(owner_id, wishlist_id).await?;
        self.sequenced(wishlist_id, || {
            self.store.update_item(wishlist_id, item_id, patch)
        })
        .await
    }

    pub async fn reorder_items(
        &self,
        owner_id: Uuid,
        wishlist_id: Uuid,
        ordered: Vec<Uuid>,
    ) -> Result<(), CoreError> {
        self.owned_wishlist(owner_id, wishlist_id).await?;
        self.sequenced(wishlist_id, || self.store.reorder_items(wishlist_id, ordered))
            .await
    }

    pub async fn archive_item(
        &self,
        owner_id: Uuid,
        wishlist_id: Uuid,
        item_id: Uuid,
    ) -> Result<WishlistSummary, CoreError> {
        self.owned_wishlist(owner_id, wishlist_id).await?;
        let wishlist = self
            .sequenced(wishlist_id, || self.store.archive_item(wishlist_id, item_id))
            .await?;
        info!(wishlist_id = %wishlist_id, item_id = %item_id, "item archived");
        Ok(wishlist.summary())
    }

    pub async fn publish(
        &self,
        owner_id: Uuid,
        wishlist_id: Uuid,
    ) -> Result<WishlistSummary, CoreError> {
        let wishlist = self.owned_wishlist(owner_id, wishlist_id).await?;
        let candidates = slug_candidates(&wishlist.title, &mut rand::rng(), SLUG_ATTEMPTS);
        let wishlist = self
            .sequenced(wishlist_id, || self.store.publish(wishlist_id, candidates))
            .await?;
        info!(
            wishlist_id = %wishlist_id,
            slug = wishlist.share_slug.as_deref().unwrap_or_default(),
            "wishlist published"
        );
        Ok(wishlist.summary())
    }

    pub async fn close(
        &self,
        owner_id: Uuid,
        wishlist_id: Uuid,
    ) -> Result<WishlistSummary, CoreError> {
        self.owned_wishlist(owner_id, wishlist_id).await?;
        let wishlist = self
            .sequenced(wishlist_id, || self.store.close(wishlist_id))
            .await?;
        info!(wishlist_id = %wishlist_id, "wishlist closed");
        Ok(wishlist.summary())
    }
}
