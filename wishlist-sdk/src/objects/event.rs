//! Event log records shared by the push channel and the cursor reader.
//!
//! Every state change on a wishlist appends one [`WishlistEvent`] to that
//! wishlist's log. Ids grow monotonically in commit order, so a client that
//! remembers the highest id it has applied (its cursor) can always resume
//! with `GET /public/w/{slug}/events?cursor={id}`.
//!
//! The `payload` travels as an opaque JSON object; [`WishlistEvent::decode`]
//! interprets it according to `event_type`.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{ItemMode, ItemStatus, WishlistStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ItemReserved,
    ItemUnreserved,
    ContributionAdded,
    ItemUpdated,
    ItemArchived,
    WishlistPublished,
    WishlistClosed,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::ItemReserved => "item_reserved",
            EventType::ItemUnreserved => "item_unreserved",
            EventType::ContributionAdded => "contribution_added",
            EventType::ItemUpdated => "item_updated",
            EventType::ItemArchived => "item_archived",
            EventType::WishlistPublished => "wishlist_published",
            EventType::WishlistClosed => "wishlist_closed",
        }
    }
}

impl std::str::FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let event_type = match s {
            "item_reserved" => EventType::ItemReserved,
            "item_unreserved" => EventType::ItemUnreserved,
            "contribution_added" => EventType::ContributionAdded,
            "item_updated" => EventType::ItemUpdated,
            "item_archived" => EventType::ItemArchived,
            "wishlist_published" => EventType::WishlistPublished,
            "wishlist_closed" => EventType::WishlistClosed,
            other => return Err(UnknownEventType(other.to_string())),
        };
        Ok(event_type)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown event type: {0}")]
pub struct UnknownEventType(pub String);

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a wishlist's event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WishlistEvent {
    /// Cursor position of this event.
    pub id: i64,
    pub event_type: EventType,
    pub item_id: Option<Uuid>,
    pub payload: serde_json::Value,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A frame that could not be interpreted as a [`WishlistEvent`].
#[derive(Debug, thiserror::Error)]
#[error("malformed event: {0}")]
pub struct MalformedEvent(#[from] serde_json::Error);

impl WishlistEvent {
    /// Parse a text frame received on the event channel.
    pub fn parse(text: &str) -> Result<Self, MalformedEvent> {
        Ok(serde_json::from_str(text)?)
    }

    /// Interpret the opaque payload according to the event type.
    pub fn decode(&self) -> Result<EventPayload, MalformedEvent> {
        let payload = self.payload.clone();
        let decoded = match self.event_type {
            EventType::ItemReserved | EventType::ItemUnreserved => {
                EventPayload::Reservation(serde_json::from_value(payload)?)
            }
            EventType::ContributionAdded => {
                EventPayload::Contribution(serde_json::from_value(payload)?)
            }
            EventType::ItemUpdated => EventPayload::ItemUpdated(serde_json::from_value(payload)?),
            EventType::ItemArchived => EventPayload::ItemArchived(serde_json::from_value(payload)?),
            EventType::WishlistPublished | EventType::WishlistClosed => {
                EventPayload::Lifecycle(serde_json::from_value(payload)?)
            }
        };
        Ok(decoded)
    }
}

/// Response of `GET /public/w/{slug}/events`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventsPage {
    /// Events with `id > cursor`, ascending.
    pub events: Vec<WishlistEvent>,
    /// `Some(id)` when the page was full and more events may follow;
    /// `None` when the log has been read to its current end.
    pub next_cursor: Option<i64>,
}

/// Aggregate state of one item, as carried by `item_updated` events.
///
/// Contains no guest identities, so it is safe to broadcast to every viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    pub id: Uuid,
    pub title: String,
    pub product_url: Option<String>,
    pub image_url: Option<String>,
    pub notes: Option<String>,
    pub price: Option<Decimal>,
    pub mode: ItemMode,
    pub target_amount: Option<Decimal>,
    pub collected_amount: Decimal,
    pub status: ItemStatus,
    pub position: i32,
    pub is_reserved: bool,
}

/// Decoded event payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Reservation(ReservationPayload),
    Contribution(ContributionPayload),
    ItemUpdated(ItemUpdatedPayload),
    ItemArchived(ItemArchivedPayload),
    Lifecycle(LifecyclePayload),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationPayload {
    pub item_id: Uuid,
    pub is_reserved: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributionPayload {
    pub item_id: Uuid,
    pub accepted_amount: Decimal,
    pub collected_amount: Decimal,
    pub progress_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ItemUpdatedPayload {
    Created { item: ItemSnapshot },
    Updated { item: ItemSnapshot },
    Reordered { item_ids: Vec<Uuid> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemArchivedPayload {
    pub item_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecyclePayload {
    pub wishlist_id: Uuid,
    pub status: WishlistStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_slug: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_reserved_event() {
        let item_id = Uuid::new_v4();
        let text = json!({
            "id": 42,
            "event_type": "item_reserved",
            "item_id": item_id,
            "payload": {"item_id": item_id, "is_reserved": true},
            "created_at": "2026-02-21T10:00:00Z",
        })
        .to_string();

        let event = WishlistEvent::parse(&text).unwrap();
        assert_eq!(event.id, 42);
        assert_eq!(event.event_type, EventType::ItemReserved);
        assert_eq!(
            event.decode().unwrap(),
            EventPayload::Reservation(ReservationPayload {
                item_id,
                is_reserved: true
            })
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(WishlistEvent::parse("not json").is_err());
        assert!(WishlistEvent::parse(r#"{"id": 1}"#).is_err());
        assert!(
            WishlistEvent::parse(
                r#"{"id":1,"event_type":"teleported","item_id":null,"payload":{},"created_at":"2026-02-21T10:00:00Z"}"#
            )
            .is_err()
        );
    }

    #[test]
    fn test_decode_payload_mismatch_is_malformed() {
        let event = WishlistEvent {
            id: 1,
            event_type: EventType::ContributionAdded,
            item_id: None,
            payload: json!({"item_id": Uuid::nil()}),
            created_at: OffsetDateTime::UNIX_EPOCH,
        };
        assert!(event.decode().is_err());
    }

    #[test]
    fn test_event_type_str_matches_serde() {
        for event_type in [
            EventType::ItemReserved,
            EventType::ContributionAdded,
            EventType::WishlistClosed,
        ] {
            let json = serde_json::to_value(event_type).unwrap();
            assert_eq!(json, event_type.as_str());
            assert_eq!(event_type.as_str().parse::<EventType>().unwrap(), event_type);
        }
        assert!("teleported".parse::<EventType>().is_err());
    }

    #[test]
    fn test_item_updated_payload_is_tagged_by_action() {
        let ids = vec![Uuid::new_v4(), Uuid::new_v4()];
        let value = serde_json::to_value(ItemUpdatedPayload::Reordered {
            item_ids: ids.clone(),
        })
        .unwrap();
        assert_eq!(value["action"], "reordered");
        assert_eq!(value["item_ids"].as_array().map(Vec::len), Some(2));
    }
}
