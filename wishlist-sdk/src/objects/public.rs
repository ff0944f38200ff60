//! Public API request and response types.
//!
//! These types are used by guests and anonymous visitors of a published
//! wishlist, and by the owner when looking at their own list through its
//! share link.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::event::ItemSnapshot;
use super::{ItemMode, ItemStatus, ViewerKind, WishlistStatus};

/// Item as seen by the owner: aggregate numbers only, never guest identities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerItemView {
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
    pub progress_percent: f64,
}

/// Item as seen by a guest or an anonymous visitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuestItemView {
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
    /// Whether the requesting guest holds the reservation.
    pub reserved_by_you: bool,
    /// Sum of the requesting guest's own contributions.
    pub my_contribution: Decimal,
    pub progress_percent: f64,
}

/// The item list of a [`PublicWishlistView`], shaped by the viewer kind.
///
/// Untagged on the wire; guest views are tried first because they carry
/// strictly more fields than owner views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PublicItems {
    Guest(Vec<GuestItemView>),
    Owner(Vec<OwnerItemView>),
}

impl PublicItems {
    pub fn len(&self) -> usize {
        match self {
            PublicItems::Guest(items) => items.len(),
            PublicItems::Owner(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Aggregate snapshots of every item, dropping viewer-specific fields.
    pub fn snapshots(&self) -> Vec<ItemSnapshot> {
        match self {
            PublicItems::Guest(items) => items.iter().map(ItemSnapshot::from).collect(),
            PublicItems::Owner(items) => items.iter().map(ItemSnapshot::from).collect(),
        }
    }
}

/// Response of `GET /public/w/{slug}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicWishlistView {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub currency: String,
    pub status: WishlistStatus,
    pub share_slug: String,
    pub viewer_kind: ViewerKind,
    pub items: PublicItems,
}

/// Owner-facing summary returned by lifecycle actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WishlistSummary {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub currency: String,
    pub status: WishlistStatus,
    pub share_slug: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestSessionRequest {
    pub name: String,
}

/// Response of `POST /public/w/{slug}/guest-session`.
///
/// Every call issues a fresh session; clients are expected to cache the
/// token per slug and reuse it until `expires_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestSessionResponse {
    pub token: String,
    pub guest_session_id: Uuid,
    pub guest_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationResponse {
    pub message: String,
    pub item_id: Uuid,
    pub is_reserved: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionRequest {
    #[serde(with = "rust_decimal::serde::str")]
    pub amount: Decimal,
}

/// Authoritative result of an accepted contribution.
///
/// Clients overwrite their local `collected_amount` and `progress_percent`
/// with these values rather than adding to optimistic ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributionResponse {
    pub message: String,
    pub item_id: Uuid,
    pub accepted_amount: Decimal,
    pub collected_amount: Decimal,
    pub progress_percent: f64,
}

impl From<&OwnerItemView> for ItemSnapshot {
    fn from(view: &OwnerItemView) -> Self {
        Self {
            id: view.id,
            title: view.title.clone(),
            product_url: view.product_url.clone(),
            image_url: view.image_url.clone(),
            notes: view.notes.clone(),
            price: view.price,
            mode: view.mode,
            target_amount: view.target_amount,
            collected_amount: view.collected_amount,
            status: view.status,
            position: view.position,
            is_reserved: view.is_reserved,
        }
    }
}

impl From<&GuestItemView> for ItemSnapshot {
    fn from(view: &GuestItemView) -> Self {
        Self {
            id: view.id,
            title: view.title.clone(),
            product_url: view.product_url.clone(),
            image_url: view.image_url.clone(),
            notes: view.notes.clone(),
            price: view.price,
            mode: view.mode,
            target_amount: view.target_amount,
            collected_amount: view.collected_amount,
            status: view.status,
            position: view.position,
            is_reserved: view.is_reserved,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn owner_item_json(id: Uuid) -> serde_json::Value {
        json!({
            "id": id,
            "title": "Headphones",
            "product_url": null,
            "image_url": null,
            "notes": null,
            "price": null,
            "mode": "group",
            "target_amount": "10000.00",
            "collected_amount": "2500.00",
            "status": "active",
            "position": 1,
            "is_reserved": false,
            "progress_percent": 25.0,
        })
    }

    #[test]
    fn test_owner_items_do_not_parse_as_guest_items() {
        let id = Uuid::new_v4();
        let items: PublicItems = serde_json::from_value(json!([owner_item_json(id)])).unwrap();
        let PublicItems::Owner(items) = items else {
            panic!("expected owner items");
        };
        assert_eq!(items[0].collected_amount, Decimal::new(250000, 2));
    }

    #[test]
    fn test_guest_items_keep_personal_fields() {
        let id = Uuid::new_v4();
        let mut value = owner_item_json(id);
        value["reserved_by_you"] = json!(false);
        value["my_contribution"] = json!("2500.00");
        let items: PublicItems = serde_json::from_value(json!([value])).unwrap();
        let PublicItems::Guest(items) = items else {
            panic!("expected guest items");
        };
        assert_eq!(items[0].my_contribution, Decimal::new(250000, 2));
    }

    #[test]
    fn test_contribution_amount_is_a_decimal_string() {
        let request = ContributionRequest {
            amount: Decimal::new(300000, 2),
        };
        assert_eq!(serde_json::to_value(&request).unwrap(), json!({"amount": "3000.00"}));
        let parsed: ContributionRequest = serde_json::from_value(json!({"amount": "12.5"})).unwrap();
        assert_eq!(parsed.amount, Decimal::new(125, 1));
    }
}
