use kanau::processor::Processor;
use rust_decimal::Decimal;
use time::OffsetDateTime;
use uuid::Uuid;
use wishlist_sdk::objects::ItemSnapshot;
use wishlist_sdk::progress::{effective_target, progress_percent};

use super::contribution::MAX_AMOUNT;
use super::{ItemMode, ItemStatus};
use crate::error::CoreError;
use crate::framework::DatabaseProcessor;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Item {
    pub id: Uuid,
    pub wishlist_id: Uuid,
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
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    pub title: String,
    pub product_url: Option<String>,
    pub image_url: Option<String>,
    pub notes: Option<String>,
    pub price: Option<Decimal>,
    pub mode: ItemMode,
    pub target_amount: Option<Decimal>,
    /// Appended after the last item when absent.
    pub position: Option<i32>,
}

/// Partial update of an item. `None` leaves a field untouched; for nullable
/// fields `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemPatch {
    pub title: Option<String>,
    pub product_url: Option<Option<String>>,
    pub image_url: Option<Option<String>>,
    pub notes: Option<Option<String>>,
    pub price: Option<Option<Decimal>>,
    pub target_amount: Option<Option<Decimal>>,
    pub status: Option<ItemStatus>,
    /// Accepted only when equal to the current mode.
    pub mode: Option<ItemMode>,
}

fn validate_title(title: &str) -> Result<(), CoreError> {
    let title = title.trim();
    if title.is_empty() || title.chars().count() > 200 {
        return Err(CoreError::Validation(
            "title must be between 1 and 200 characters".to_string(),
        ));
    }
    Ok(())
}

fn validate_money(
    price: Option<Decimal>,
    target_amount: Option<Decimal>,
    mode: ItemMode,
) -> Result<(), CoreError> {
    if price.is_some_and(|p| p < Decimal::ZERO) {
        return Err(CoreError::Validation("price must not be negative".to_string()));
    }
    if target_amount.is_some_and(|t| t <= Decimal::ZERO) {
        return Err(CoreError::Validation(
            "target amount must be positive".to_string(),
        ));
    }
    if price.is_some_and(|p| p > MAX_AMOUNT) || target_amount.is_some_and(|t| t > MAX_AMOUNT) {
        return Err(CoreError::Validation(format!(
            "price and target amount must not exceed {MAX_AMOUNT}"
        )));
    }
    if mode == ItemMode::Group && effective_target(target_amount, price).is_none() {
        return Err(CoreError::Validation(
            "group items need a target amount or a price".to_string(),
        ));
    }
    Ok(())
}

impl NewItem {
    pub fn validate(&self) -> Result<(), CoreError> {
        validate_title(&self.title)?;
        validate_money(self.price, self.target_amount, self.mode)
    }
}

impl Item {
    /// Build a validated item. Group items without an explicit target
    /// collect towards their price.
    pub fn create(
        wishlist_id: Uuid,
        new: NewItem,
        position: i32,
        now: OffsetDateTime,
    ) -> Result<Self, CoreError> {
        new.validate()?;
        let target_amount = match new.mode {
            ItemMode::Group => effective_target(new.target_amount, new.price),
            ItemMode::Single => new.target_amount,
        };
        Ok(Self {
            id: Uuid::new_v4(),
            wishlist_id,
            title: new.title.trim().to_string(),
            product_url: new.product_url,
            image_url: new.image_url,
            notes: new.notes,
            price: new.price,
            mode: new.mode,
            target_amount,
            collected_amount: Decimal::ZERO,
            status: ItemStatus::Active,
            position,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn apply_patch(&mut self, patch: ItemPatch, now: OffsetDateTime) -> Result<(), CoreError> {
        if patch.mode.is_some_and(|mode| mode != self.mode) {
            return Err(CoreError::Conflict("item mode cannot be changed"));
        }
        let mut next = self.clone();
        if let Some(title) = patch.title {
            validate_title(&title)?;
            next.title = title.trim().to_string();
        }
        if let Some(product_url) = patch.product_url {
            next.product_url = product_url;
        }
        if let Some(image_url) = patch.image_url {
            next.image_url = image_url;
        }
        if let Some(notes) = patch.notes {
            next.notes = notes;
        }
        if let Some(price) = patch.price {
            next.price = price;
        }
        if let Some(target_amount) = patch.target_amount {
            next.target_amount = target_amount;
        }
        if let Some(status) = patch.status {
            next.status = status;
        }
        validate_money(next.price, next.target_amount, next.mode)?;
        next.updated_at = now;
        *self = next;
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.status == ItemStatus::Active
    }

    /// Target a group item collects towards.
    pub fn target(&self) -> Option<Decimal> {
        effective_target(self.target_amount, self.price)
    }

    pub fn progress_percent(&self) -> f64 {
        progress_percent(self.collected_amount, self.target())
    }

    /// Add an accepted contribution to `collected_amount`.
    ///
    /// The total stays within [`MAX_AMOUNT`]; the item is untouched on error.
    pub fn collect(&mut self, amount: Decimal, now: OffsetDateTime) -> Result<(), CoreError> {
        let collected = self
            .collected_amount
            .checked_add(amount)
            .filter(|total| *total <= MAX_AMOUNT)
            .ok_or_else(|| {
                CoreError::Validation(format!(
                    "collected amount of an item must not exceed {MAX_AMOUNT}"
                ))
            })?;
        self.collected_amount = collected;
        self.updated_at = now;
        Ok(())
    }

    pub fn snapshot(&self, is_reserved: bool) -> ItemSnapshot {
        ItemSnapshot {
            id: self.id,
            title: self.title.clone(),
            product_url: self.product_url.clone(),
            image_url: self.image_url.clone(),
            notes: self.notes.clone(),
            price: self.price,
            mode: self.mode.into(),
            target_amount: self.target_amount,
            collected_amount: self.collected_amount,
            status: self.status.into(),
            position: self.position,
            is_reserved,
        }
    }
}

/// Position for an item appended to `items`.
pub fn next_position(items: &[Item]) -> Result<i32, CoreError> {
    match items.iter().map(|item| item.position).max() {
        None => Ok(0),
        Some(max) => max.checked_add(1).ok_or_else(|| {
            CoreError::Validation("no position left after the last item".to_string())
        }),
    }
}

/// `ordered` must name every item of the list exactly once, archived ones
/// included.
pub fn validate_reorder(items: &[Item], ordered: &[Uuid]) -> Result<(), CoreError> {
    let mut expected: Vec<Uuid> = items.iter().map(|item| item.id).collect();
    let mut given = ordered.to_vec();
    expected.sort_unstable();
    given.sort_unstable();
    if expected != given {
        return Err(CoreError::Validation(
            "item_ids must list every item of the wishlist exactly once".to_string(),
        ));
    }
    if i32::try_from(ordered.len()).is_err() {
        return Err(CoreError::Validation("too many items to reorder".to_string()));
    }
    Ok(())
}

/// `(id, position)` pairs for a validated order, positions counting from 0.
pub fn reorder_positions(ordered: &[Uuid]) -> impl Iterator<Item = (Uuid, i32)> + '_ {
    ordered.iter().copied().zip(0..)
}

const ITEM_COLUMNS: &str = r#"
    id, wishlist_id, title, product_url, image_url, notes, price, mode,
    target_amount, collected_amount, status, "position", created_at, updated_at
"#;

/// All items of a list, archived ones included, in display order.
pub struct ListItems {
    pub wishlist_id: Uuid,
}

impl Processor<ListItems> for DatabaseProcessor {
    type Output = Vec<Item>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListItems")]
    async fn process(&self, query: ListItems) -> Result<Vec<Item>, sqlx::Error> {
        sqlx::query_as::<_, Item>(&format!(
            r#"SELECT {ITEM_COLUMNS} FROM wishlist_items WHERE wishlist_id = $1 ORDER BY "position", id"#
        ))
        .bind(query.wishlist_id)
        .fetch_all(&self.pool)
        .await
    }
}

impl Item {
    pub async fn list_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        wishlist_id: Uuid,
    ) -> Result<Vec<Item>, sqlx::Error> {
        sqlx::query_as::<_, Item>(&format!(
            r#"SELECT {ITEM_COLUMNS} FROM wishlist_items WHERE wishlist_id = $1 ORDER BY "position", id"#
        ))
        .bind(wishlist_id)
        .fetch_all(&mut **tx)
        .await
    }

    /// Lock one item row of the (already locked) list.
    pub async fn lock_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        wishlist_id: Uuid,
        item_id: Uuid,
    ) -> Result<Option<Item>, sqlx::Error> {
        sqlx::query_as::<_, Item>(&format!(
            "SELECT {ITEM_COLUMNS} FROM wishlist_items WHERE wishlist_id = $1 AND id = $2 FOR UPDATE"
        ))
        .bind(wishlist_id)
        .bind(item_id)
        .fetch_optional(&mut **tx)
        .await
    }

    pub async fn insert_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        item: &Item,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO wishlist_items (id, wishlist_id, title, product_url, image_url, notes,
                price, mode, target_amount, collected_amount, status, "position",
                created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(item.id)
        .bind(item.wishlist_id)
        .bind(&item.title)
        .bind(&item.product_url)
        .bind(&item.image_url)
        .bind(&item.notes)
        .bind(item.price)
        .bind(item.mode)
        .bind(item.target_amount)
        .bind(item.collected_amount)
        .bind(item.status)
        .bind(item.position)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Persist every mutable field.
    pub async fn save_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        item: &Item,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE wishlist_items
            SET title = $2, product_url = $3, image_url = $4, notes = $5, price = $6,
                target_amount = $7, collected_amount = $8, status = $9, "position" = $10,
                updated_at = $11
            WHERE id = $1
            "#,
        )
        .bind(item.id)
        .bind(&item.title)
        .bind(&item.product_url)
        .bind(&item.image_url)
        .bind(&item.notes)
        .bind(item.price)
        .bind(item.target_amount)
        .bind(item.collected_amount)
        .bind(item.status)
        .bind(item.position)
        .bind(item.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Set `position` to the index of each id in `ordered`.
    pub async fn set_positions_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        wishlist_id: Uuid,
        ordered: &[Uuid],
        now: OffsetDateTime,
    ) -> Result<u64, sqlx::Error> {
        let positions: Vec<i32> = reorder_positions(ordered).map(|(_, p)| p).collect();
        let result = sqlx::query(
            r#"
            UPDATE wishlist_items AS i
            SET "position" = o.position, updated_at = $4
            FROM UNNEST($2::uuid[], $3::int4[]) AS o(id, position)
            WHERE i.wishlist_id = $1 AND i.id = o.id
            "#,
        )
        .bind(wishlist_id)
        .bind(ordered)
        .bind(&positions)
        .bind(now)
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected())
    }
}
