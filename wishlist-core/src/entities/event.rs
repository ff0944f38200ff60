use kanau::processor::Processor;
use sqlx::types::Json;
use time::OffsetDateTime;
use uuid::Uuid;
use wishlist_sdk::objects::{EventType, WishlistEvent};

use crate::error::StoreError;
use crate::events::NewEvent;
use crate::framework::DatabaseProcessor;

/// Row of `wishlist_events`.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct EventRecord {
    pub id: i64,
    pub wishlist_id: Uuid,
    pub event_type: String,
    pub item_id: Option<Uuid>,
    pub payload: Json<serde_json::Value>,
    pub created_at: OffsetDateTime,
}

impl TryFrom<EventRecord> for WishlistEvent {
    type Error = StoreError;

    fn try_from(record: EventRecord) -> Result<Self, StoreError> {
        let event_type: EventType = record
            .event_type
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("event {}: {e}", record.id)))?;
        Ok(WishlistEvent {
            id: record.id,
            event_type,
            item_id: record.item_id,
            payload: record.payload.0,
            created_at: record.created_at,
        })
    }
}

/// Events of one list after `cursor`, ascending.
pub struct GetEventsSince {
    pub wishlist_id: Uuid,
    pub cursor: i64,
    pub limit: i64,
}

impl Processor<GetEventsSince> for DatabaseProcessor {
    type Output = Vec<EventRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetEventsSince")]
    async fn process(&self, query: GetEventsSince) -> Result<Vec<EventRecord>, sqlx::Error> {
        sqlx::query_as::<_, EventRecord>(
            r#"
            SELECT id, wishlist_id, event_type, item_id, payload, created_at
            FROM wishlist_events
            WHERE wishlist_id = $1 AND id > $2
            ORDER BY id
            LIMIT $3
            "#,
        )
        .bind(query.wishlist_id)
        .bind(query.cursor)
        .bind(query.limit)
        .fetch_all(&self.pool)
        .await
    }
}

impl EventRecord {
    /// Append to the log inside the transaction that made the change. The
    /// caller holds the list row lock, so ids of one list grow in commit order.
    pub async fn append_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        wishlist_id: Uuid,
        event: NewEvent,
    ) -> Result<EventRecord, sqlx::Error> {
        sqlx::query_as::<_, EventRecord>(
            r#"
            INSERT INTO wishlist_events (wishlist_id, event_type, item_id, payload)
            VALUES ($1, $2, $3, $4)
            RETURNING id, wishlist_id, event_type, item_id, payload, created_at
            "#,
        )
        .bind(wishlist_id)
        .bind(event.event_type.as_str())
        .bind(event.item_id)
        .bind(Json(event.payload))
        .fetch_one(&mut **tx)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_converts_to_event() {
        let record = EventRecord {
            id: 7,
            wishlist_id: Uuid::new_v4(),
            event_type: "item_archived".to_string(),
            item_id: Some(Uuid::nil()),
            payload: Json(json!({"item_id": Uuid::nil()})),
            created_at: OffsetDateTime::UNIX_EPOCH,
        };
        let event = WishlistEvent::try_from(record).unwrap();
        assert_eq!(event.id, 7);
        assert_eq!(event.event_type, EventType::ItemArchived);
    }

    #[test]
    fn test_unknown_event_type_is_corrupt() {
        let record = EventRecord {
            id: 8,
            wishlist_id: Uuid::new_v4(),
            event_type: "teleported".to_string(),
            item_id: None,
            payload: Json(json!({})),
            created_at: OffsetDateTime::UNIX_EPOCH,
        };
        assert!(matches!(
            WishlistEvent::try_from(record),
            Err(StoreError::Corrupt(_))
        ));
    }
}
