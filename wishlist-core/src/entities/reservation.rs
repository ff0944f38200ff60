//! Single-mode reservations.
//!
//! At most one reservation per item is active. Released reservations stay in
//! the table with `active = false`; a partial unique index on `item_id WHERE
//! active` backs the rule in the database.

use kanau::processor::Processor;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{Item, ItemMode};
use crate::error::CoreError;
use crate::framework::DatabaseProcessor;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Reservation {
    pub id: Uuid,
    pub item_id: Uuid,
    pub guest_session_id: Uuid,
    pub active: bool,
    pub reserved_at: OffsetDateTime,
    pub released_at: Option<OffsetDateTime>,
}

impl Reservation {
    pub fn new(item_id: Uuid, guest_session_id: Uuid, now: OffsetDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            item_id,
            guest_session_id,
            active: true,
            reserved_at: now,
            released_at: None,
        }
    }

    pub fn release(&mut self, now: OffsetDateTime) {
        self.active = false;
        self.released_at = Some(now);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveDecision {
    Create,
    /// The guest already holds this item; nothing changes.
    AlreadyHeld,
}

pub fn ensure_reservable(item: &Item) -> Result<(), CoreError> {
    if item.mode != ItemMode::Single {
        return Err(CoreError::Conflict(
            "group items take contributions, not reservations",
        ));
    }
    if !item.is_active() {
        return Err(CoreError::Conflict("item is not available"));
    }
    Ok(())
}

/// Compare-and-set on the item's active reservation.
pub fn decide_reserve(
    active: Option<&Reservation>,
    guest_session_id: Uuid,
) -> Result<ReserveDecision, CoreError> {
    match active {
        None => Ok(ReserveDecision::Create),
        Some(r) if r.guest_session_id == guest_session_id => Ok(ReserveDecision::AlreadyHeld),
        Some(_) => Err(CoreError::Conflict("item is already reserved")),
    }
}

/// Only the holder may release a reservation.
pub fn decide_unreserve(
    active: Option<&Reservation>,
    guest_session_id: Uuid,
) -> Result<(), CoreError> {
    match active {
        None => Err(CoreError::NotFound("reservation")),
        Some(r) if r.guest_session_id == guest_session_id => Ok(()),
        Some(_) => Err(CoreError::Conflict("item is reserved by another guest")),
    }
}

const RESERVATION_COLUMNS: &str =
    "r.id, r.item_id, r.guest_session_id, r.active, r.reserved_at, r.released_at";

/// Active reservations of every item of a list.
pub struct ListActiveReservations {
    pub wishlist_id: Uuid,
}

impl Processor<ListActiveReservations> for DatabaseProcessor {
    type Output = Vec<Reservation>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListActiveReservations")]
    async fn process(&self, query: ListActiveReservations) -> Result<Vec<Reservation>, sqlx::Error> {
        sqlx::query_as::<_, Reservation>(&format!(
            r#"
            SELECT {RESERVATION_COLUMNS}
            FROM reservations r
            JOIN wishlist_items i ON i.id = r.item_id
            WHERE i.wishlist_id = $1 AND r.active
            "#
        ))
        .bind(query.wishlist_id)
        .fetch_all(&self.pool)
        .await
    }
}

impl Reservation {
    pub async fn active_for_item_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        item_id: Uuid,
    ) -> Result<Option<Reservation>, sqlx::Error> {
        sqlx::query_as::<_, Reservation>(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations r WHERE r.item_id = $1 AND r.active"
        ))
        .bind(item_id)
        .fetch_optional(&mut **tx)
        .await
    }

    pub async fn insert_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        reservation: &Reservation,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO reservations (id, item_id, guest_session_id, active, reserved_at, released_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(reservation.id)
        .bind(reservation.item_id)
        .bind(reservation.guest_session_id)
        .bind(reservation.active)
        .bind(reservation.reserved_at)
        .bind(reservation.released_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn release_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        reservation: &Reservation,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE reservations SET active = FALSE, released_at = $2 WHERE id = $1")
            .bind(reservation.id)
            .bind(reservation.released_at)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}
