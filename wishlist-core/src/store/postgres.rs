use async_trait::async_trait;
use kanau::processor::Processor;
use rust_decimal::Decimal;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use time::OffsetDateTime;
use uuid::Uuid;
use wishlist_sdk::objects::WishlistEvent;

use super::{ContributionOutcome, Mutation, WishlistStore};
use crate::entities::contribution::{ListGuestContributions, ensure_contributable, validate_amount};
use crate::entities::event::GetEventsSince;
use crate::entities::guest_session::{GetGuestSession, InsertGuestSession};
use crate::entities::item::{ListItems, next_position, validate_reorder};
use crate::entities::reservation::{
    ListActiveReservations, ReserveDecision, decide_reserve, decide_unreserve, ensure_reservable,
};
use crate::entities::wishlist::{GetWishlist, GetWishlistBySlug};
use crate::entities::{
    Contribution, EventRecord, GuestSession, Item, ItemPatch, ItemStatus, NewItem, NewWishlist,
    Reservation, Wishlist,
};
use crate::error::{CoreError, StoreError};
use crate::events::NewEvent;
use crate::framework::DatabaseProcessor;

type PgTransaction = sqlx::Transaction<'static, sqlx::Postgres>;

/// PostgreSQL store.
///
/// Writes lock the wishlist row with `SELECT ... FOR UPDATE` first, so all
/// mutations of one list (and the ids of its events) are serialized by the
/// database. The partial unique index on active reservations is a second
/// line behind the compare-and-set.
#[derive(Debug, Clone)]
pub struct PgStore {
    db: DatabaseProcessor,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            db: DatabaseProcessor { pool },
        }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.db.pool
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("../migrations").run(&self.db.pool).await?;
        Ok(())
    }

    async fn begin_locked(
        &self,
        wishlist_id: Uuid,
    ) -> Result<(PgTransaction, Wishlist), CoreError> {
        let mut tx = self.db.pool.begin().await?;
        let wishlist = Wishlist::lock_tx(&mut tx, wishlist_id)
            .await?
            .ok_or(CoreError::NotFound("wishlist"))?;
        Ok((tx, wishlist))
    }

    async fn commit<T>(
        tx: PgTransaction,
        wishlist: &Wishlist,
        value: T,
        events: Vec<WishlistEvent>,
    ) -> Result<Mutation<T>, CoreError> {
        tx.commit().await?;
        Ok(Mutation {
            value,
            events,
            share_slug: wishlist.share_slug.clone(),
        })
    }
}

async fn append_tx(
    tx: &mut PgTransaction,
    wishlist_id: Uuid,
    event: NewEvent,
) -> Result<WishlistEvent, CoreError> {
    let record = EventRecord::append_tx(tx, wishlist_id, event).await?;
    Ok(WishlistEvent::try_from(record)?)
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

#[async_trait]
impl WishlistStore for PgStore {
    async fn wishlist(&self, id: Uuid) -> Result<Option<Wishlist>, CoreError> {
        Ok(self.db.process(GetWishlist { id }).await?)
    }

    async fn wishlist_by_slug(&self, slug: &str) -> Result<Option<Wishlist>, CoreError> {
        Ok(self
            .db
            .process(GetWishlistBySlug {
                slug: slug.to_string(),
            })
            .await?)
    }

    async fn items(&self, wishlist_id: Uuid) -> Result<Vec<Item>, CoreError> {
        Ok(self.db.process(ListItems { wishlist_id }).await?)
    }

    async fn active_reservations(
        &self,
        wishlist_id: Uuid,
    ) -> Result<Vec<Reservation>, CoreError> {
        Ok(self.db.process(ListActiveReservations { wishlist_id }).await?)
    }

    async fn guest_contributions(
        &self,
        wishlist_id: Uuid,
        guest_session_id: Uuid,
    ) -> Result<Vec<Contribution>, CoreError> {
        Ok(self
            .db
            .process(ListGuestContributions {
                wishlist_id,
                guest_session_id,
            })
            .await?)
    }

    async fn guest_session(&self, id: Uuid) -> Result<Option<GuestSession>, CoreError> {
        Ok(self.db.process(GetGuestSession { id }).await?)
    }

    async fn insert_guest_session(
        &self,
        session: GuestSession,
    ) -> Result<GuestSession, CoreError> {
        Ok(self.db.process(InsertGuestSession { session }).await?)
    }

    async fn events_since(
        &self,
        wishlist_id: Uuid,
        cursor: i64,
        limit: usize,
    ) -> Result<Vec<WishlistEvent>, CoreError> {
        let records = self
            .db
            .process(GetEventsSince {
                wishlist_id,
                cursor,
                limit: i64::try_from(limit).unwrap_or(i64::MAX),
            })
            .await?;
        records
            .into_iter()
            .map(|record| WishlistEvent::try_from(record).map_err(CoreError::from))
            .collect()
    }

    async fn create_wishlist(&self, new: NewWishlist) -> Result<Wishlist, CoreError> {
        new.validate()?;
        let wishlist = Wishlist::create(new, OffsetDateTime::now_utc());
        let mut tx = self.db.pool.begin().await?;
        Wishlist::insert_tx(&mut tx, &wishlist).await?;
        tx.commit().await?;
        Ok(wishlist)
    }

    async fn create_item(
        &self,
        wishlist_id: Uuid,
        new: NewItem,
    ) -> Result<Mutation<Item>, CoreError> {
        let (mut tx, wishlist) = self.begin_locked(wishlist_id).await?;
        wishlist.ensure_open()?;

        let now = OffsetDateTime::now_utc();
        let position = match new.position {
            Some(position) => position,
            None => next_position(&Item::list_tx(&mut tx, wishlist_id).await?)?,
        };
        let item = Item::create(wishlist_id, new, position, now)?;
        Item::insert_tx(&mut tx, &item).await?;
        Wishlist::touch_tx(&mut tx, wishlist_id, now).await?;
        let event = append_tx(
            &mut tx,
            wishlist_id,
            NewEvent::item_created(item.snapshot(false))?,
        )
        .await?;
        Self::commit(tx, &wishlist, item, vec![event]).await
    }

    async fn update_item(
        &self,
        wishlist_id: Uuid,
        item_id: Uuid,
        patch: ItemPatch,
    ) -> Result<Mutation<Item>, CoreError> {
        let (mut tx, wishlist) = self.begin_locked(wishlist_id).await?;
        let mut item = Item::lock_tx(&mut tx, wishlist_id, item_id)
            .await?
            .ok_or(CoreError::NotFound("item"))?;

        let now = OffsetDateTime::now_utc();
        item.apply_patch(patch, now)?;
        Item::save_tx(&mut tx, &item).await?;
        let is_reserved = Reservation::active_for_item_tx(&mut tx, item_id)
            .await?
            .is_some();
        let event = append_tx(
            &mut tx,
            wishlist_id,
            NewEvent::item_updated(item.snapshot(is_reserved))?,
        )
        .await?;
        Self::commit(tx, &wishlist, item, vec![event]).await
    }

    async fn reorder_items(
        &self,
        wishlist_id: Uuid,
        ordered: Vec<Uuid>,
    ) -> Result<Mutation<()>, CoreError> {
        let (mut tx, wishlist) = self.begin_locked(wishlist_id).await?;
        let items = Item::list_tx(&mut tx, wishlist_id).await?;
        validate_reorder(&items, &ordered)?;

        let now = OffsetDateTime::now_utc();
        Item::set_positions_tx(&mut tx, wishlist_id, &ordered, now).await?;
        let event = append_tx(&mut tx, wishlist_id, NewEvent::items_reordered(ordered)?).await?;
        Self::commit(tx, &wishlist, (), vec![event]).await
    }

    async fn archive_item(
        &self,
        wishlist_id: Uuid,
        item_id: Uuid,
    ) -> Result<Mutation<Wishlist>, CoreError> {
        let (mut tx, mut wishlist) = self.begin_locked(wishlist_id).await?;
        let mut item = Item::lock_tx(&mut tx, wishlist_id, item_id)
            .await?
            .ok_or(CoreError::NotFound("item"))?;
        if item.status == ItemStatus::Archived {
            return Self::commit(tx, &wishlist, wishlist.clone(), Vec::new()).await;
        }

        let now = OffsetDateTime::now_utc();
        item.status = ItemStatus::Archived;
        item.updated_at = now;
        Item::save_tx(&mut tx, &item).await?;
        Wishlist::touch_tx(&mut tx, wishlist_id, now).await?;
        wishlist.updated_at = now;
        let event = append_tx(&mut tx, wishlist_id, NewEvent::item_archived(item_id)?).await?;
        Self::commit(tx, &wishlist, wishlist.clone(), vec![event]).await
    }

    async fn publish(
        &self,
        wishlist_id: Uuid,
        slug_candidates: Vec<String>,
    ) -> Result<Mutation<Wishlist>, CoreError> {
        let (mut tx, mut wishlist) = self.begin_locked(wishlist_id).await?;
        if !wishlist.needs_publish() {
            return Self::commit(tx, &wishlist, wishlist.clone(), Vec::new()).await;
        }

        let mut slug = None;
        if wishlist.share_slug.is_none() {
            for candidate in slug_candidates {
                if !Wishlist::slug_taken_tx(&mut tx, &candidate).await? {
                    slug = Some(candidate);
                    break;
                }
            }
            if slug.is_none() {
                return Err(CoreError::Internal(
                    "could not allocate a unique share slug".to_string(),
                ));
            }
        }

        let now = OffsetDateTime::now_utc();
        wishlist.mark_published(slug, now);
        Wishlist::save_lifecycle_tx(&mut tx, &wishlist)
            .await
            .map_err(|e| {
                // Another list took the slug between the check and the write.
                if is_unique_violation(&e) {
                    CoreError::Conflict("share slug collision, retry publishing")
                } else {
                    e.into()
                }
            })?;
        let event = append_tx(
            &mut tx,
            wishlist_id,
            NewEvent::wishlist_published(&wishlist)?,
        )
        .await?;
        Self::commit(tx, &wishlist, wishlist.clone(), vec![event]).await
    }

    async fn close(&self, wishlist_id: Uuid) -> Result<Mutation<Wishlist>, CoreError> {
        let (mut tx, mut wishlist) = self.begin_locked(wishlist_id).await?;
        if !wishlist.needs_close()? {
            return Self::commit(tx, &wishlist, wishlist.clone(), Vec::new()).await;
        }

        wishlist.mark_closed(OffsetDateTime::now_utc());
        Wishlist::save_lifecycle_tx(&mut tx, &wishlist).await?;
        let event = append_tx(&mut tx, wishlist_id, NewEvent::wishlist_closed(&wishlist)?).await?;
        Self::commit(tx, &wishlist, wishlist.clone(), vec![event]).await
    }

    async fn reserve(
        &self,
        wishlist_id: Uuid,
        item_id: Uuid,
        guest_session_id: Uuid,
    ) -> Result<Mutation<()>, CoreError> {
        let (mut tx, wishlist) = self.begin_locked(wishlist_id).await?;
        wishlist.ensure_open()?;
        let item = Item::lock_tx(&mut tx, wishlist_id, item_id)
            .await?
            .ok_or(CoreError::NotFound("item"))?;
        ensure_reservable(&item)?;

        let active = Reservation::active_for_item_tx(&mut tx, item_id).await?;
        match decide_reserve(active.as_ref(), guest_session_id)? {
            ReserveDecision::AlreadyHeld => Self::commit(tx, &wishlist, (), Vec::new()).await,
            ReserveDecision::Create => {
                let reservation =
                    Reservation::new(item_id, guest_session_id, OffsetDateTime::now_utc());
                Reservation::insert_tx(&mut tx, &reservation)
                    .await
                    .map_err(|e| {
                        if is_unique_violation(&e) {
                            CoreError::Conflict("item is already reserved")
                        } else {
                            e.into()
                        }
                    })?;
                let event =
                    append_tx(&mut tx, wishlist_id, NewEvent::item_reserved(item_id)?).await?;
                Self::commit(tx, &wishlist, (), vec![event]).await
            }
        }
    }

    async fn unreserve(
        &self,
        wishlist_id: Uuid,
        item_id: Uuid,
        guest_session_id: Uuid,
    ) -> Result<Mutation<()>, CoreError> {
        let (mut tx, wishlist) = self.begin_locked(wishlist_id).await?;
        wishlist.ensure_open()?;
        Item::lock_tx(&mut tx, wishlist_id, item_id)
            .await?
            .ok_or(CoreError::NotFound("item"))?;

        let active = Reservation::active_for_item_tx(&mut tx, item_id).await?;
        decide_unreserve(active.as_ref(), guest_session_id)?;
        if let Some(mut reservation) = active {
            reservation.release(OffsetDateTime::now_utc());
            Reservation::release_tx(&mut tx, &reservation).await?;
        }
        let event = append_tx(&mut tx, wishlist_id, NewEvent::item_unreserved(item_id)?).await?;
        Self::commit(tx, &wishlist, (), vec![event]).await
    }

    async fn contribute(
        &self,
        wishlist_id: Uuid,
        item_id: Uuid,
        guest_session_id: Uuid,
        amount: Decimal,
    ) -> Result<Mutation<ContributionOutcome>, CoreError> {
        validate_amount(amount)?;
        let (mut tx, wishlist) = self.begin_locked(wishlist_id).await?;
        wishlist.ensure_open()?;
        let mut item = Item::lock_tx(&mut tx, wishlist_id, item_id)
            .await?
            .ok_or(CoreError::NotFound("item"))?;
        ensure_contributable(&item)?;

        let now = OffsetDateTime::now_utc();
        item.collect(amount, now)?;
        Item::save_tx(&mut tx, &item).await?;
        let contribution =
            Contribution::new(item_id, guest_session_id, amount, &wishlist.currency, now);
        Contribution::insert_tx(&mut tx, &contribution).await?;

        let outcome = ContributionOutcome {
            accepted_amount: amount,
            collected_amount: item.collected_amount,
            progress_percent: item.progress_percent(),
        };
        let event = append_tx(
            &mut tx,
            wishlist_id,
            NewEvent::contribution_added(
                item_id,
                outcome.accepted_amount,
                outcome.collected_amount,
                outcome.progress_percent,
            )?,
        )
        .await?;
        Self::commit(tx, &wishlist, outcome, vec![event]).await
    }
}
