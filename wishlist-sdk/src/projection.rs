//! Client-side view projection.
//!
//! Maps the server's restricted item views plus the local guest-session
//! state to what a UI may render and which actions it may offer. Pure and
//! deterministic: the same inputs always produce the same output.

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::objects::{
    GuestItemView, ItemMode, ItemStatus, OwnerItemView, PublicItems, PublicWishlistView,
    ViewerKind, WishlistStatus,
};

/// What the local client knows about its guest identity for a list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GuestState {
    pub has_session: bool,
}

/// Actions the UI may offer for one item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Affordances {
    pub can_archive: bool,
    pub can_reserve: bool,
    pub can_unreserve: bool,
    pub can_contribute: bool,
    /// The item would be actionable once the viewer registers a guest name.
    pub needs_guest_session: bool,
}

impl Affordances {
    fn is_mutating(&self) -> bool {
        self.can_archive || self.can_reserve || self.can_unreserve || self.can_contribute
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderableItem {
    pub id: Uuid,
    pub title: String,
    pub mode: ItemMode,
    pub status: ItemStatus,
    pub position: i32,
    pub is_reserved: bool,
    pub reserved_by_you: bool,
    pub collected_amount: Decimal,
    pub target_amount: Option<Decimal>,
    pub my_contribution: Decimal,
    pub progress_percent: f64,
    pub affordances: Affordances,
}

/// Project a list of item views for the given viewer.
pub fn project(
    items: &PublicItems,
    viewer_kind: ViewerKind,
    guest_state: GuestState,
) -> Vec<RenderableItem> {
    match items {
        PublicItems::Owner(items) => items.iter().map(project_owner_item).collect(),
        PublicItems::Guest(items) => items
            .iter()
            .map(|item| project_guest_item(item, viewer_kind, guest_state))
            .collect(),
    }
}

/// Project a whole public view. A closed list keeps its items visible but
/// offers no mutating action.
pub fn project_view(view: &PublicWishlistView, guest_state: GuestState) -> Vec<RenderableItem> {
    let mut items = project(&view.items, view.viewer_kind, guest_state);
    if view.status == WishlistStatus::Closed {
        for item in &mut items {
            item.affordances = Affordances::default();
        }
    }
    items
}

fn project_owner_item(item: &OwnerItemView) -> RenderableItem {
    RenderableItem {
        id: item.id,
        title: item.title.clone(),
        mode: item.mode,
        status: item.status,
        position: item.position,
        is_reserved: item.is_reserved,
        reserved_by_you: false,
        collected_amount: item.collected_amount,
        target_amount: item.target_amount,
        my_contribution: Decimal::ZERO,
        progress_percent: item.progress_percent,
        affordances: Affordances {
            can_archive: item.status != ItemStatus::Archived,
            ..Affordances::default()
        },
    }
}

fn project_guest_item(
    item: &GuestItemView,
    viewer_kind: ViewerKind,
    guest_state: GuestState,
) -> RenderableItem {
    // An owner looking at a guest-shaped payload still gets no guest actions.
    let as_guest = viewer_kind == ViewerKind::Guest || guest_state.has_session;
    let active = item.status == ItemStatus::Active;

    let candidate = match item.mode {
        ItemMode::Single => Affordances {
            can_reserve: active && !item.is_reserved,
            can_unreserve: item.reserved_by_you,
            ..Affordances::default()
        },
        ItemMode::Group => Affordances {
            can_contribute: active,
            ..Affordances::default()
        },
    };

    let affordances = if viewer_kind == ViewerKind::Owner {
        Affordances::default()
    } else if as_guest {
        candidate
    } else {
        Affordances {
            needs_guest_session: candidate.is_mutating(),
            ..Affordances::default()
        }
    };

    RenderableItem {
        id: item.id,
        title: item.title.clone(),
        mode: item.mode,
        status: item.status,
        position: item.position,
        is_reserved: item.is_reserved,
        reserved_by_you: item.reserved_by_you,
        collected_amount: item.collected_amount,
        target_amount: item.target_amount,
        my_contribution: item.my_contribution,
        progress_percent: item.progress_percent,
        affordances,
    }
}
