//! Local cache of one public wishlist.
//!
//! [`WishlistState`] starts from a snapshot (or empty, for a full replay),
//! applies events in cursor order and overwrites itself with authoritative
//! mutation responses. Aggregate fields always come from the server; the
//! viewer's own reservation and contribution totals are tracked alongside.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::objects::event::{
    ContributionPayload, ItemUpdatedPayload, LifecyclePayload, ReservationPayload,
};
use crate::objects::{
    ContributionResponse, EventPayload, GuestItemView, ItemSnapshot, ItemStatus, OwnerItemView,
    PublicItems, PublicWishlistView, ReservationResponse, ViewerKind, WishlistEvent,
    WishlistStatus,
};
use crate::progress::item_progress;

/// Outcome of [`WishlistState::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Changed,
    /// Already applied (`id <= cursor`).
    Stale,
    /// The event could not be reconciled locally; refetch the snapshot.
    NeedsSnapshot,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Personal {
    reserved_by_you: bool,
    my_contribution: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WishlistState {
    pub status: Option<WishlistStatus>,
    pub share_slug: Option<String>,
    pub viewer_kind: ViewerKind,
    items: BTreeMap<Uuid, ItemSnapshot>,
    personal: BTreeMap<Uuid, Personal>,
    cursor: i64,
}

impl Default for WishlistState {
    fn default() -> Self {
        Self::empty()
    }
}

impl WishlistState {
    /// Empty state at cursor 0, for replaying the full log.
    pub fn empty() -> Self {
        Self {
            status: None,
            share_slug: None,
            viewer_kind: ViewerKind::Anonymous,
            items: BTreeMap::new(),
            personal: BTreeMap::new(),
            cursor: 0,
        }
    }

    /// Seed from a snapshot fetched at `cursor`.
    pub fn from_view(view: &PublicWishlistView, cursor: i64) -> Self {
        let mut personal = BTreeMap::new();
        if let PublicItems::Guest(items) = &view.items {
            for item in items {
                personal.insert(
                    item.id,
                    Personal {
                        reserved_by_you: item.reserved_by_you,
                        my_contribution: item.my_contribution,
                    },
                );
            }
        }
        Self {
            status: Some(view.status),
            share_slug: Some(view.share_slug.clone()),
            viewer_kind: view.viewer_kind,
            items: view
                .items
                .snapshots()
                .into_iter()
                .map(|item| (item.id, item))
                .collect(),
            personal,
            cursor,
        }
    }

    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    pub fn item(&self, id: Uuid) -> Option<&ItemSnapshot> {
        self.items.get(&id)
    }

    /// Items a public view would show: not archived, ordered by position.
    pub fn visible_items(&self) -> Vec<ItemSnapshot> {
        let mut items: Vec<ItemSnapshot> = self
            .items
            .values()
            .filter(|item| item.status != ItemStatus::Archived)
            .cloned()
            .collect();
        items.sort_by_key(|item| (item.position, item.id));
        items
    }

    /// Visible items shaped for the current viewer, ready for
    /// [`project`](crate::projection::project).
    pub fn items_view(&self) -> PublicItems {
        let visible = self.visible_items();
        match self.viewer_kind {
            ViewerKind::Owner => PublicItems::Owner(
                visible
                    .into_iter()
                    .map(|item| OwnerItemView {
                        progress_percent: item_progress(&item),
                        id: item.id,
                        title: item.title,
                        product_url: item.product_url,
                        image_url: item.image_url,
                        notes: item.notes,
                        price: item.price,
                        mode: item.mode,
                        target_amount: item.target_amount,
                        collected_amount: item.collected_amount,
                        status: item.status,
                        position: item.position,
                        is_reserved: item.is_reserved,
                    })
                    .collect(),
            ),
            ViewerKind::Guest | ViewerKind::Anonymous => PublicItems::Guest(
                visible
                    .into_iter()
                    .map(|item| {
                        let personal = self.personal.get(&item.id).copied().unwrap_or_default();
                        GuestItemView {
                            progress_percent: item_progress(&item),
                            id: item.id,
                            title: item.title,
                            product_url: item.product_url,
                            image_url: item.image_url,
                            notes: item.notes,
                            price: item.price,
                            mode: item.mode,
                            target_amount: item.target_amount,
                            collected_amount: item.collected_amount,
                            status: item.status,
                            position: item.position,
                            is_reserved: item.is_reserved,
                            reserved_by_you: personal.reserved_by_you,
                            my_contribution: personal.my_contribution,
                        }
                    })
                    .collect(),
            ),
        }
    }

    /// Apply one event. Events at or below the cursor are ignored.
    pub fn apply(&mut self, event: &WishlistEvent) -> Applied {
        if event.id <= self.cursor {
            return Applied::Stale;
        }
        self.cursor = event.id;

        let Ok(payload) = event.decode() else {
            tracing::debug!(event_id = event.id, "undecodable payload, snapshot required");
            return Applied::NeedsSnapshot;
        };
        match payload {
            EventPayload::Reservation(p) => self.on_reservation(p),
            EventPayload::Contribution(p) => self.on_contribution(p),
            EventPayload::ItemUpdated(p) => self.on_item_updated(p),
            EventPayload::ItemArchived(p) => match self.items.get_mut(&p.item_id) {
                Some(item) => {
                    item.status = ItemStatus::Archived;
                    Applied::Changed
                }
                None => Applied::NeedsSnapshot,
            },
            EventPayload::Lifecycle(p) => self.on_lifecycle(p),
        }
    }

    /// Overwrite local aggregates with an accepted contribution.
    pub fn apply_contribution(&mut self, response: &ContributionResponse) {
        if let Some(item) = self.items.get_mut(&response.item_id) {
            item.collected_amount = response.collected_amount;
        }
        self.personal
            .entry(response.item_id)
            .or_default()
            .my_contribution += response.accepted_amount;
    }

    /// Overwrite local reservation state with a successful reserve/unreserve.
    pub fn apply_reservation(&mut self, response: &ReservationResponse) {
        if let Some(item) = self.items.get_mut(&response.item_id) {
            item.is_reserved = response.is_reserved;
        }
        self.personal
            .entry(response.item_id)
            .or_default()
            .reserved_by_you = response.is_reserved;
    }

    fn on_reservation(&mut self, p: ReservationPayload) -> Applied {
        let Some(item) = self.items.get_mut(&p.item_id) else {
            return Applied::NeedsSnapshot;
        };
        item.is_reserved = p.is_reserved;
        if !p.is_reserved {
            if let Some(personal) = self.personal.get_mut(&p.item_id) {
                personal.reserved_by_you = false;
            }
        }
        Applied::Changed
    }

    fn on_contribution(&mut self, p: ContributionPayload) -> Applied {
        match self.items.get_mut(&p.item_id) {
            Some(item) => {
                item.collected_amount = p.collected_amount;
                Applied::Changed
            }
            None => Applied::NeedsSnapshot,
        }
    }

    fn on_item_updated(&mut self, p: ItemUpdatedPayload) -> Applied {
        match p {
            ItemUpdatedPayload::Created { item } | ItemUpdatedPayload::Updated { item } => {
                self.items.insert(item.id, item);
                Applied::Changed
            }
            ItemUpdatedPayload::Reordered { item_ids } => {
                // Archived items are part of the order but absent from
                // snapshots; positions are list indices either way.
                for (position, id) in item_ids.iter().enumerate() {
                    if let Some(item) = self.items.get_mut(id) {
                        item.position = position as i32;
                    }
                }
                Applied::Changed
            }
        }
    }

    fn on_lifecycle(&mut self, p: LifecyclePayload) -> Applied {
        self.status = Some(p.status);
        if p.share_slug.is_some() {
            self.share_slug = p.share_slug;
        }
        Applied::Changed
    }
}
