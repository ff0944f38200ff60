//! Persistence of wishlists and their event logs.
//!
//! Every write is one atomic step: it checks its preconditions, changes the
//! state and appends the resulting events while holding the list's lock, and
//! returns the committed events so the caller can fan them out.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;
use wishlist_sdk::objects::WishlistEvent;

use crate::entities::{
    Contribution, GuestSession, Item, ItemPatch, NewItem, NewWishlist, Reservation, Wishlist,
};
use crate::error::CoreError;

/// Result of a committed write.
#[derive(Debug, Clone)]
pub struct Mutation<T> {
    pub value: T,
    /// Events appended by the write, ascending. Empty for no-ops.
    pub events: Vec<WishlistEvent>,
    /// Share slug of the list after the write; `None` while it is a draft.
    pub share_slug: Option<String>,
}

/// Aggregates after an accepted contribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContributionOutcome {
    pub accepted_amount: Decimal,
    pub collected_amount: Decimal,
    pub progress_percent: f64,
}

#[async_trait]
pub trait WishlistStore: Send + Sync {
    async fn wishlist(&self, id: Uuid) -> Result<Option<Wishlist>, CoreError>;

    async fn wishlist_by_slug(&self, slug: &str) -> Result<Option<Wishlist>, CoreError>;

    /// All items, archived ones included, ordered by position.
    async fn items(&self, wishlist_id: Uuid) -> Result<Vec<Item>, CoreError>;

    async fn active_reservations(&self, wishlist_id: Uuid)
    -> Result<Vec<Reservation>, CoreError>;

    async fn guest_contributions(
        &self,
        wishlist_id: Uuid,
        guest_session_id: Uuid,
    ) -> Result<Vec<Contribution>, CoreError>;

    async fn guest_session(&self, id: Uuid) -> Result<Option<GuestSession>, CoreError>;

    async fn insert_guest_session(&self, session: GuestSession)
    -> Result<GuestSession, CoreError>;

    /// Up to `limit` events with `id > cursor`, ascending.
    async fn events_since(
        &self,
        wishlist_id: Uuid,
        cursor: i64,
        limit: usize,
    ) -> Result<Vec<WishlistEvent>, CoreError>;

    async fn create_wishlist(&self, new: NewWishlist) -> Result<Wishlist, CoreError>;

    async fn create_item(
        &self,
        wishlist_id: Uuid,
        new: NewItem,
    ) -> Result<Mutation<Item>, CoreError>;

    async fn update_item(
        &self,
        wishlist_id: Uuid,
        item_id: Uuid,
        patch: ItemPatch,
    ) -> Result<Mutation<Item>, CoreError>;

    async fn reorder_items(
        &self,
        wishlist_id: Uuid,
        ordered: Vec<Uuid>,
    ) -> Result<Mutation<()>, CoreError>;

    async fn archive_item(
        &self,
        wishlist_id: Uuid,
        item_id: Uuid,
    ) -> Result<Mutation<Wishlist>, CoreError>;

    /// Publish, taking the first free slug from `slug_candidates` when the
    /// list has none yet.
    async fn publish(
        &self,
        wishlist_id: Uuid,
        slug_candidates: Vec<String>,
    ) -> Result<Mutation<Wishlist>, CoreError>;

    async fn close(&self, wishlist_id: Uuid) -> Result<Mutation<Wishlist>, CoreError>;

    async fn reserve(
        &self,
        wishlist_id: Uuid,
        item_id: Uuid,
        guest_session_id: Uuid,
    ) -> Result<Mutation<()>, CoreError>;

    async fn unreserve(
        &self,
        wishlist_id: Uuid,
        item_id: Uuid,
        guest_session_id: Uuid,
    ) -> Result<Mutation<()>, CoreError>;

    async fn contribute(
        &self,
        wishlist_id: Uuid,
        item_id: Uuid,
        guest_session_id: Uuid,
        amount: Decimal,
    ) -> Result<Mutation<ContributionOutcome>, CoreError>;
}
