pub mod event;
pub mod public;
pub mod ws;

pub use event::{
    EventPayload, EventType, EventsPage, ItemSnapshot, MalformedEvent, UnknownEventType,
    WishlistEvent,
};
pub use public::{
    ContributionRequest, ContributionResponse, GuestItemView, GuestSessionRequest,
    GuestSessionResponse, OwnerItemView, PublicItems, PublicWishlistView, ReservationResponse,
    WishlistSummary,
};

use serde::{Deserialize, Serialize};

/// Header carrying the opaque guest session token on public mutations.
pub const GUEST_TOKEN_HEADER: &str = "X-Guest-Token";

/// Lifecycle status of a wishlist.
///
/// This is the API/DTO version without sqlx::Type.
/// For database operations, use the version in `wishlist-core::entities`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WishlistStatus {
    Draft,
    Published,
    Closed,
}

impl WishlistStatus {
    /// Whether guests may see the list through its share slug.
    pub fn is_public(self) -> bool {
        matches!(self, WishlistStatus::Published | WishlistStatus::Closed)
    }
}

impl std::fmt::Display for WishlistStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WishlistStatus::Draft => write!(f, "draft"),
            WishlistStatus::Published => write!(f, "published"),
            WishlistStatus::Closed => write!(f, "closed"),
        }
    }
}

/// How guests can gift an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemMode {
    /// One guest reserves the whole item.
    Single,
    /// Guests chip in towards a target amount.
    Group,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Active,
    Archived,
    Unavailable,
}

/// Server-determined classification of whoever is looking at a public list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewerKind {
    Anonymous,
    Guest,
    Owner,
}

/// Error body returned by every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}
