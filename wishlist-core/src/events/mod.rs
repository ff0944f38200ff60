//! Event log entries and their live fan-out.
//!
//! Every mutation produces one or more [`NewEvent`]s that the store appends
//! to the list's log inside the same transaction. After commit the resulting
//! [`WishlistEvent`](wishlist_sdk::objects::WishlistEvent)s are pushed to
//! connected sockets through the [`RealtimeHub`].

pub mod hub;

pub use hub::RealtimeHub;

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;
use wishlist_sdk::objects::EventType;
use wishlist_sdk::objects::event::{
    ContributionPayload, ItemArchivedPayload, ItemSnapshot, ItemUpdatedPayload, LifecyclePayload,
    ReservationPayload,
};

use crate::entities::Wishlist;
use crate::error::CoreError;

/// An event that has not been assigned a cursor id yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub event_type: EventType,
    pub item_id: Option<Uuid>,
    pub payload: serde_json::Value,
}

impl NewEvent {
    fn new<T: Serialize>(
        event_type: EventType,
        item_id: Option<Uuid>,
        payload: &T,
    ) -> Result<Self, CoreError> {
        let payload = serde_json::to_value(payload)
            .map_err(|e| CoreError::Internal(format!("encode {event_type} payload: {e}")))?;
        Ok(Self {
            event_type,
            item_id,
            payload,
        })
    }

    pub fn item_reserved(item_id: Uuid) -> Result<Self, CoreError> {
        Self::new(
            EventType::ItemReserved,
            Some(item_id),
            &ReservationPayload {
                item_id,
                is_reserved: true,
            },
        )
    }

    pub fn item_unreserved(item_id: Uuid) -> Result<Self, CoreError> {
        Self::new(
            EventType::ItemUnreserved,
            Some(item_id),
            &ReservationPayload {
                item_id,
                is_reserved: false,
            },
        )
    }

    pub fn contribution_added(
        item_id: Uuid,
        accepted_amount: Decimal,
        collected_amount: Decimal,
        progress_percent: f64,
    ) -> Result<Self, CoreError> {
        Self::new(
            EventType::ContributionAdded,
            Some(item_id),
            &ContributionPayload {
                item_id,
                accepted_amount,
                collected_amount,
                progress_percent,
            },
        )
    }

    pub fn item_created(item: ItemSnapshot) -> Result<Self, CoreError> {
        let item_id = item.id;
        Self::new(
            EventType::ItemUpdated,
            Some(item_id),
            &ItemUpdatedPayload::Created { item },
        )
    }

    pub fn item_updated(item: ItemSnapshot) -> Result<Self, CoreError> {
        let item_id = item.id;
        Self::new(
            EventType::ItemUpdated,
            Some(item_id),
            &ItemUpdatedPayload::Updated { item },
        )
    }

    pub fn items_reordered(item_ids: Vec<Uuid>) -> Result<Self, CoreError> {
        Self::new(
            EventType::ItemUpdated,
            None,
            &ItemUpdatedPayload::Reordered { item_ids },
        )
    }

    pub fn item_archived(item_id: Uuid) -> Result<Self, CoreError> {
        Self::new(
            EventType::ItemArchived,
            Some(item_id),
            &ItemArchivedPayload { item_id },
        )
    }

    pub fn wishlist_published(wishlist: &Wishlist) -> Result<Self, CoreError> {
        Self::new(
            EventType::WishlistPublished,
            None,
            &LifecyclePayload {
                wishlist_id: wishlist.id,
                status: wishlist.status.into(),
                share_slug: wishlist.share_slug.clone(),
            },
        )
    }

    pub fn wishlist_closed(wishlist: &Wishlist) -> Result<Self, CoreError> {
        Self::new(
            EventType::WishlistClosed,
            None,
            &LifecyclePayload {
                wishlist_id: wishlist.id,
                status: wishlist.status.into(),
                share_slug: None,
            },
        )
    }
}
