pub mod contribution;
pub mod event;
pub mod guest_session;
pub mod item;
pub mod reservation;
pub mod wishlist;

use wishlist_sdk::objects::{
    ItemMode as SdkItemMode, ItemStatus as SdkItemStatus, WishlistStatus as SdkWishlistStatus,
};

pub use contribution::Contribution;
pub use event::EventRecord;
pub use guest_session::GuestSession;
pub use item::{Item, ItemPatch, NewItem};
pub use reservation::Reservation;
pub use wishlist::{NewWishlist, Wishlist};

/// Wishlist status for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `wishlist_sdk::objects::WishlistStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "wishlist_status")]
pub enum WishlistStatus {
    Draft,
    Published,
    Closed,
}

impl From<WishlistStatus> for SdkWishlistStatus {
    fn from(value: WishlistStatus) -> Self {
        match value {
            WishlistStatus::Draft => SdkWishlistStatus::Draft,
            WishlistStatus::Published => SdkWishlistStatus::Published,
            WishlistStatus::Closed => SdkWishlistStatus::Closed,
        }
    }
}

impl From<SdkWishlistStatus> for WishlistStatus {
    fn from(value: SdkWishlistStatus) -> Self {
        match value {
            SdkWishlistStatus::Draft => WishlistStatus::Draft,
            SdkWishlistStatus::Published => WishlistStatus::Published,
            SdkWishlistStatus::Closed => WishlistStatus::Closed,
        }
    }
}

/// Item mode for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `wishlist_sdk::objects::ItemMode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "item_mode")]
pub enum ItemMode {
    Single,
    Group,
}

impl From<ItemMode> for SdkItemMode {
    fn from(value: ItemMode) -> Self {
        match value {
            ItemMode::Single => SdkItemMode::Single,
            ItemMode::Group => SdkItemMode::Group,
        }
    }
}

impl From<SdkItemMode> for ItemMode {
    fn from(value: SdkItemMode) -> Self {
        match value {
            SdkItemMode::Single => ItemMode::Single,
            SdkItemMode::Group => ItemMode::Group,
        }
    }
}

/// Item status for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `wishlist_sdk::objects::ItemStatus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "lowercase", type_name = "item_status")]
pub enum ItemStatus {
    Active,
    Archived,
    Unavailable,
}

impl From<ItemStatus> for SdkItemStatus {
    fn from(value: ItemStatus) -> Self {
        match value {
            ItemStatus::Active => SdkItemStatus::Active,
            ItemStatus::Archived => SdkItemStatus::Archived,
            ItemStatus::Unavailable => SdkItemStatus::Unavailable,
        }
    }
}

impl From<SdkItemStatus> for ItemStatus {
    fn from(value: SdkItemStatus) -> Self {
        match value {
            SdkItemStatus::Active => ItemStatus::Active,
            SdkItemStatus::Archived => ItemStatus::Archived,
            SdkItemStatus::Unavailable => ItemStatus::Unavailable,
        }
    }
}
