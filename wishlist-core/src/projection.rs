//! Server-side shaping of a public wishlist for one viewer.
//!
//! Owners get aggregate numbers only and never learn who reserved or paid.
//! Guests additionally see their own reservation and contribution total.
//! Archived items are hidden from every public view.

use std::collections::HashMap;

use rust_decimal::Decimal;
use uuid::Uuid;
use wishlist_sdk::objects::{
    GuestItemView, OwnerItemView, PublicItems, PublicWishlistView, ViewerKind,
};

use crate::entities::{Item, ItemStatus, Reservation, Wishlist};

/// Who is looking, as resolved from the request credentials.
#[derive(Debug, Clone, PartialEq)]
pub enum Viewer {
    Anonymous,
    Guest {
        session_id: Uuid,
        /// Own contribution total per item.
        contributions: HashMap<Uuid, Decimal>,
    },
    Owner,
}

impl Viewer {
    pub fn kind(&self) -> ViewerKind {
        match self {
            Viewer::Anonymous => ViewerKind::Anonymous,
            Viewer::Guest { .. } => ViewerKind::Guest,
            Viewer::Owner => ViewerKind::Owner,
        }
    }
}

pub fn public_view(
    wishlist: &Wishlist,
    items: &[Item],
    active_reservations: &[Reservation],
    viewer: &Viewer,
) -> PublicWishlistView {
    let holders: HashMap<Uuid, Uuid> = active_reservations
        .iter()
        .filter(|r| r.active)
        .map(|r| (r.item_id, r.guest_session_id))
        .collect();

    let mut visible: Vec<&Item> = items
        .iter()
        .filter(|item| item.status != ItemStatus::Archived)
        .collect();
    visible.sort_by_key(|item| (item.position, item.id));

    let items = match viewer {
        Viewer::Owner => PublicItems::Owner(
            visible
                .into_iter()
                .map(|item| owner_item(item, holders.contains_key(&item.id)))
                .collect(),
        ),
        Viewer::Anonymous => PublicItems::Guest(
            visible
                .into_iter()
                .map(|item| guest_item(item, holders.contains_key(&item.id), false, Decimal::ZERO))
                .collect(),
        ),
        Viewer::Guest {
            session_id,
            contributions,
        } => PublicItems::Guest(
            visible
                .into_iter()
                .map(|item| {
                    let holder = holders.get(&item.id);
                    guest_item(
                        item,
                        holder.is_some(),
                        holder == Some(session_id),
                        contributions.get(&item.id).copied().unwrap_or_default(),
                    )
                })
                .collect(),
        ),
    };

    PublicWishlistView {
        id: wishlist.id,
        title: wishlist.title.clone(),
        description: wishlist.description.clone(),
        currency: wishlist.currency.clone(),
        status: wishlist.status.into(),
        share_slug: wishlist.share_slug.clone().unwrap_or_default(),
        viewer_kind: viewer.kind(),
        items,
    }
}

fn owner_item(item: &Item, is_reserved: bool) -> OwnerItemView {
    OwnerItemView {
        id: item.id,
        title: item.title.clone(),
        product_url: item.product_url.clone(),
        image_url: item.image_url.clone(),
        notes: item.notes.clone(),
        price: item.price,
        mode: item.mode.into(),
        target_amount: item.target_amount,
        collected_amount: item.collected_amount,
        status: item.status.into(),
        position: item.position,
        is_reserved,
        progress_percent: item.progress_percent(),
    }
}

fn guest_item(
    item: &Item,
    is_reserved: bool,
    reserved_by_you: bool,
    my_contribution: Decimal,
) -> GuestItemView {
    GuestItemView {
        id: item.id,
        title: item.title.clone(),
        product_url: item.product_url.clone(),
        image_url: item.image_url.clone(),
        notes: item.notes.clone(),
        price: item.price,
        mode: item.mode.into(),
        target_amount: item.target_amount,
        collected_amount: item.collected_amount,
        status: item.status.into(),
        position: item.position,
        is_reserved,
        reserved_by_you,
        my_contribution,
        progress_percent: item.progress_percent(),
    }
}
