use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use rust_decimal::Decimal;
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;
use wishlist_sdk::objects::WishlistEvent;

use super::{ContributionOutcome, Mutation, WishlistStore};
use crate::entities::contribution::{ensure_contributable, validate_amount};
use crate::entities::item::{next_position, reorder_positions, validate_reorder};
use crate::entities::reservation::{
    ReserveDecision, decide_reserve, decide_unreserve, ensure_reservable,
};
use crate::entities::{
    Contribution, GuestSession, Item, ItemPatch, ItemStatus, NewItem, NewWishlist, Reservation,
    Wishlist,
};
use crate::error::CoreError;
use crate::events::NewEvent;

#[derive(Debug)]
struct ListRecord {
    wishlist: Wishlist,
    items: Vec<Item>,
    reservations: Vec<Reservation>,
    contributions: Vec<Contribution>,
    events: Vec<WishlistEvent>,
}

impl ListRecord {
    fn item_mut(&mut self, item_id: Uuid) -> Result<&mut Item, CoreError> {
        self.items
            .iter_mut()
            .find(|item| item.id == item_id)
            .ok_or(CoreError::NotFound("item"))
    }

    fn active_reservation(&self, item_id: Uuid) -> Option<&Reservation> {
        self.reservations
            .iter()
            .find(|r| r.item_id == item_id && r.active)
    }

    fn done<T>(&self, value: T, events: Vec<WishlistEvent>) -> Mutation<T> {
        Mutation {
            value,
            events,
            share_slug: self.wishlist.share_slug.clone(),
        }
    }
}

/// In-process store. Each list sits behind its own mutex, which serializes
/// its writes and the ids of its events.
#[derive(Debug, Default)]
pub struct MemoryStore {
    lists: RwLock<HashMap<Uuid, Arc<Mutex<ListRecord>>>>,
    slugs: RwLock<HashMap<String, Uuid>>,
    guests: RwLock<HashMap<Uuid, GuestSession>>,
    last_event_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn list(&self, id: Uuid) -> Result<Arc<Mutex<ListRecord>>, CoreError> {
        self.lists
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(CoreError::NotFound("wishlist"))
    }

    /// Must be called with the list's mutex held.
    fn append(
        &self,
        record: &mut ListRecord,
        events: impl IntoIterator<Item = NewEvent>,
        now: OffsetDateTime,
    ) -> Vec<WishlistEvent> {
        let appended: Vec<WishlistEvent> = events
            .into_iter()
            .map(|event| WishlistEvent {
                id: self.last_event_id.fetch_add(1, Ordering::SeqCst) + 1,
                event_type: event.event_type,
                item_id: event.item_id,
                payload: event.payload,
                created_at: now,
            })
            .collect();
        record.events.extend(appended.iter().cloned());
        appended
    }
}

#[async_trait]
impl WishlistStore for MemoryStore {
    async fn wishlist(&self, id: Uuid) -> Result<Option<Wishlist>, CoreError> {
        match self.list(id).await {
            Ok(list) => Ok(Some(list.lock().await.wishlist.clone())),
            Err(CoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn wishlist_by_slug(&self, slug: &str) -> Result<Option<Wishlist>, CoreError> {
        let id = self.slugs.read().await.get(slug).copied();
        match id {
            Some(id) => self.wishlist(id).await,
            None => Ok(None),
        }
    }

    async fn items(&self, wishlist_id: Uuid) -> Result<Vec<Item>, CoreError> {
        let list = self.list(wishlist_id).await?;
        let mut items = list.lock().await.items.clone();
        items.sort_by_key(|item| (item.position, item.id));
        Ok(items)
    }

    async fn active_reservations(
        &self,
        wishlist_id: Uuid,
    ) -> Result<Vec<Reservation>, CoreError> {
        let list = self.list(wishlist_id).await?;
        let record = list.lock().await;
        Ok(record
            .reservations
            .iter()
            .filter(|r| r.active)
            .cloned()
            .collect())
    }

    async fn guest_contributions(
        &self,
        wishlist_id: Uuid,
        guest_session_id: Uuid,
    ) -> Result<Vec<Contribution>, CoreError> {
        let list = self.list(wishlist_id).await?;
        let record = list.lock().await;
        Ok(record
            .contributions
            .iter()
            .filter(|c| c.guest_session_id == guest_session_id)
            .cloned()
            .collect())
    }

    async fn guest_session(&self, id: Uuid) -> Result<Option<GuestSession>, CoreError> {
        Ok(self.guests.read().await.get(&id).cloned())
    }

    async fn insert_guest_session(
        &self,
        session: GuestSession,
    ) -> Result<GuestSession, CoreError> {
        self.guests.write().await.insert(session.id, session.clone());
        Ok(session)
    }

    async fn events_since(
        &self,
        wishlist_id: Uuid,
        cursor: i64,
        limit: usize,
    ) -> Result<Vec<WishlistEvent>, CoreError> {
        let list = self.list(wishlist_id).await?;
        let record = list.lock().await;
        Ok(record
            .events
            .iter()
            .filter(|event| event.id > cursor)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn create_wishlist(&self, new: NewWishlist) -> Result<Wishlist, CoreError> {
        new.validate()?;
        let wishlist = Wishlist::create(new, OffsetDateTime::now_utc());
        let record = ListRecord {
            wishlist: wishlist.clone(),
            items: Vec::new(),
            reservations: Vec::new(),
            contributions: Vec::new(),
            events: Vec::new(),
        };
        self.lists
            .write()
            .await
            .insert(wishlist.id, Arc::new(Mutex::new(record)));
        Ok(wishlist)
    }

    async fn create_item(
        &self,
        wishlist_id: Uuid,
        new: NewItem,
    ) -> Result<Mutation<Item>, CoreError> {
        let list = self.list(wishlist_id).await?;
        let mut record = list.lock().await;
        record.wishlist.ensure_open()?;

        let now = OffsetDateTime::now_utc();
        let position = match new.position {
            Some(position) => position,
            None => next_position(&record.items)?,
        };
        let item = Item::create(wishlist_id, new, position, now)?;
        let event = NewEvent::item_created(item.snapshot(false))?;
        record.items.push(item.clone());
        record.wishlist.updated_at = now;
        let events = self.append(&mut record, [event], now);
        Ok(record.done(item, events))
    }

    async fn update_item(
        &self,
        wishlist_id: Uuid,
        item_id: Uuid,
        patch: ItemPatch,
    ) -> Result<Mutation<Item>, CoreError> {
        let list = self.list(wishlist_id).await?;
        let mut record = list.lock().await;

        let now = OffsetDateTime::now_utc();
        let is_reserved = record.active_reservation(item_id).is_some();
        let item = record.item_mut(item_id)?;
        item.apply_patch(patch, now)?;
        let item = item.clone();
        let event = NewEvent::item_updated(item.snapshot(is_reserved))?;
        let events = self.append(&mut record, [event], now);
        Ok(record.done(item, events))
    }

    async fn reorder_items(
        &self,
        wishlist_id: Uuid,
        ordered: Vec<Uuid>,
    ) -> Result<Mutation<()>, CoreError> {
        let list = self.list(wishlist_id).await?;
        let mut record = list.lock().await;
        validate_reorder(&record.items, &ordered)?;

        let now = OffsetDateTime::now_utc();
        let positions: HashMap<Uuid, i32> = reorder_positions(&ordered).collect();
        for item in &mut record.items {
            if let Some(position) = positions.get(&item.id) {
                item.position = *position;
                item.updated_at = now;
            }
        }
        let event = NewEvent::items_reordered(ordered)?;
        let events = self.append(&mut record, [event], now);
        Ok(record.done((), events))
    }

    async fn archive_item(
        &self,
        wishlist_id: Uuid,
        item_id: Uuid,
    ) -> Result<Mutation<Wishlist>, CoreError> {
        let list = self.list(wishlist_id).await?;
        let mut record = list.lock().await;

        let now = OffsetDateTime::now_utc();
        let item = record.item_mut(item_id)?;
        if item.status == ItemStatus::Archived {
            return Ok(record.done(record.wishlist.clone(), Vec::new()));
        }
        item.status = ItemStatus::Archived;
        item.updated_at = now;
        record.wishlist.updated_at = now;
        let events = self.append(&mut record, [NewEvent::item_archived(item_id)?], now);
        Ok(record.done(record.wishlist.clone(), events))
    }

    async fn publish(
        &self,
        wishlist_id: Uuid,
        slug_candidates: Vec<String>,
    ) -> Result<Mutation<Wishlist>, CoreError> {
        let list = self.list(wishlist_id).await?;
        let mut record = list.lock().await;
        if !record.wishlist.needs_publish() {
            return Ok(record.done(record.wishlist.clone(), Vec::new()));
        }

        let slug = if record.wishlist.share_slug.is_none() {
            let mut slugs = self.slugs.write().await;
            let slug = slug_candidates
                .into_iter()
                .find(|candidate| !slugs.contains_key(candidate))
                .ok_or_else(|| {
                    CoreError::Internal("could not allocate a unique share slug".to_string())
                })?;
            slugs.insert(slug.clone(), wishlist_id);
            Some(slug)
        } else {
            None
        };

        let now = OffsetDateTime::now_utc();
        record.wishlist.mark_published(slug, now);
        let event = NewEvent::wishlist_published(&record.wishlist)?;
        let events = self.append(&mut record, [event], now);
        Ok(record.done(record.wishlist.clone(), events))
    }

    async fn close(&self, wishlist_id: Uuid) -> Result<Mutation<Wishlist>, CoreError> {
        let list = self.list(wishlist_id).await?;
        let mut record = list.lock().await;
        if !record.wishlist.needs_close()? {
            return Ok(record.done(record.wishlist.clone(), Vec::new()));
        }

        let now = OffsetDateTime::now_utc();
        record.wishlist.mark_closed(now);
        let event = NewEvent::wishlist_closed(&record.wishlist)?;
        let events = self.append(&mut record, [event], now);
        Ok(record.done(record.wishlist.clone(), events))
    }

    async fn reserve(
        &self,
        wishlist_id: Uuid,
        item_id: Uuid,
        guest_session_id: Uuid,
    ) -> Result<Mutation<()>, CoreError> {
        let list = self.list(wishlist_id).await?;
        let mut record = list.lock().await;
        record.wishlist.ensure_open()?;
        ensure_reservable(record.item_mut(item_id)?)?;

        match decide_reserve(record.active_reservation(item_id), guest_session_id)? {
            ReserveDecision::AlreadyHeld => Ok(record.done((), Vec::new())),
            ReserveDecision::Create => {
                let now = OffsetDateTime::now_utc();
                record
                    .reservations
                    .push(Reservation::new(item_id, guest_session_id, now));
                let events = self.append(&mut record, [NewEvent::item_reserved(item_id)?], now);
                Ok(record.done((), events))
            }
        }
    }

    async fn unreserve(
        &self,
        wishlist_id: Uuid,
        item_id: Uuid,
        guest_session_id: Uuid,
    ) -> Result<Mutation<()>, CoreError> {
        let list = self.list(wishlist_id).await?;
        let mut record = list.lock().await;
        record.wishlist.ensure_open()?;
        record.item_mut(item_id)?;
        decide_unreserve(record.active_reservation(item_id), guest_session_id)?;

        let now = OffsetDateTime::now_utc();
        if let Some(reservation) = record
            .reservations
            .iter_mut()
            .find(|r| r.item_id == item_id && r.active)
        {
            reservation.release(now);
        }
        let events = self.append(&mut record, [NewEvent::item_unreserved(item_id)?], now);
        Ok(record.done((), events))
    }

    async fn contribute(
        &self,
        wishlist_id: Uuid,
        item_id: Uuid,
        guest_session_id: Uuid,
        amount: Decimal,
    ) -> Result<Mutation<ContributionOutcome>, CoreError> {
        validate_amount(amount)?;
        let list = self.list(wishlist_id).await?;
        let mut record = list.lock().await;
        record.wishlist.ensure_open()?;

        let now = OffsetDateTime::now_utc();
        let item = record.item_mut(item_id)?;
        ensure_contributable(item)?;
        item.collect(amount, now)?;
        let outcome = ContributionOutcome {
            accepted_amount: amount,
            collected_amount: item.collected_amount,
            progress_percent: item.progress_percent(),
        };

        let contribution = Contribution::new(
            item_id,
            guest_session_id,
            amount,
            &record.wishlist.currency,
            now,
        );
        record.contributions.push(contribution);
        let event = NewEvent::contribution_added(
            item_id,
            outcome.accepted_amount,
            outcome.collected_amount,
            outcome.progress_percent,
        )?;
        let events = self.append(&mut record, [event], now);
        Ok(record.done(outcome, events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::ItemMode;
    use wishlist_sdk::objects::EventType;

    async fn published_list(store: &MemoryStore) -> Wishlist {
        let list = store
            .create_wishlist(NewWishlist {
                owner_id: Uuid::new_v4(),
                title: "Housewarming".to_string(),
                description: None,
                currency: "RUB".to_string(),
            })
            .await
            .unwrap();
        store
            .publish(list.id, vec!["housewarming-aaaaaa".to_string()])
            .await
            .unwrap()
            .value
    }

    fn new_item(mode: ItemMode) -> NewItem {
        NewItem {
            title: "Toaster".to_string(),
            product_url: None,
            image_url: None,
            notes: None,
            price: Some(Decimal::new(10000, 0)),
            mode,
            target_amount: None,
            position: None,
        }
    }

    #[tokio::test]
    async fn test_publish_takes_first_free_slug() {
        let store = MemoryStore::new();
        let first = published_list(&store).await;
        assert_eq!(first.share_slug.as_deref(), Some("housewarming-aaaaaa"));

        let second = store
            .create_wishlist(NewWishlist {
                owner_id: Uuid::new_v4(),
                title: "Housewarming".to_string(),
                description: None,
                currency: "RUB".to_string(),
            })
            .await
            .unwrap();
        let published = store
            .publish(
                second.id,
                vec![
                    "housewarming-aaaaaa".to_string(),
                    "housewarming-bbbbbb".to_string(),
                ],
            )
            .await
            .unwrap();
        assert_eq!(
            published.value.share_slug.as_deref(),
            Some("housewarming-bbbbbb")
        );
        assert_eq!(published.events.len(), 1);
        assert_eq!(published.events[0].event_type, EventType::WishlistPublished);

        let again = store.publish(second.id, Vec::new()).await.unwrap();
        assert!(again.events.is_empty());
    }

    #[tokio::test]
    async fn test_slug_exhaustion_is_internal_error() {
        let store = MemoryStore::new();
        published_list(&store).await;
        let other = store
            .create_wishlist(NewWishlist {
                owner_id: Uuid::new_v4(),
                title: "Housewarming".to_string(),
                description: None,
                currency: "RUB".to_string(),
            })
            .await
            .unwrap();
        let result = store
            .publish(other.id, vec!["housewarming-aaaaaa".to_string()])
            .await;
        assert!(matches!(result, Err(CoreError::Internal(_))));
    }

    #[tokio::test]
    async fn test_event_ids_increase_per_list() {
        let store = MemoryStore::new();
        let list = published_list(&store).await;
        let item = store
            .create_item(list.id, new_item(ItemMode::Single))
            .await
            .unwrap()
            .value;
        let guest = Uuid::new_v4();
        store.reserve(list.id, item.id, guest).await.unwrap();
        store.unreserve(list.id, item.id, guest).await.unwrap();

        let events = store.events_since(list.id, 0, 100).await.unwrap();
        let ids: Vec<i64> = events.iter().map(|e| e.id).collect();
        assert_eq!(ids.len(), 4);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));

        let tail = store.events_since(list.id, ids[1], 100).await.unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].event_type, EventType::ItemReserved);
        assert_eq!(store.events_since(list.id, 0, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_closed_list_rejects_guest_actions() {
        let store = MemoryStore::new();
        let list = published_list(&store).await;
        let item = store
            .create_item(list.id, new_item(ItemMode::Group))
            .await
            .unwrap()
            .value;
        store.close(list.id).await.unwrap();

        let guest = Uuid::new_v4();
        assert!(matches!(
            store
                .contribute(list.id, item.id, guest, Decimal::new(100, 0))
                .await,
            Err(CoreError::Conflict(_))
        ));
        assert!(matches!(
            store.create_item(list.id, new_item(ItemMode::Single)).await,
            Err(CoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_reorder_counts_archived_items() {
        let store = MemoryStore::new();
        let list = published_list(&store).await;
        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(
                store
                    .create_item(list.id, new_item(ItemMode::Single))
                    .await
                    .unwrap()
                    .value
                    .id,
            );
        }
        store.archive_item(list.id, ids[1]).await.unwrap();

        // The archived item still has to be named.
        assert!(
            store
                .reorder_items(list.id, vec![ids[2], ids[0]])
                .await
                .is_err()
        );
        store
            .reorder_items(list.id, vec![ids[2], ids[1], ids[0]])
            .await
            .unwrap();
        let items = store.items(list.id).await.unwrap();
        let order: Vec<Uuid> = items.iter().map(|item| item.id).collect();
        assert_eq!(order, vec![ids[2], ids[1], ids[0]]);
    }
}
