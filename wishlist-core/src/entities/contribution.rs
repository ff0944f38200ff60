use kanau::processor::Processor;
use rust_decimal::Decimal;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{Item, ItemMode};
use crate::error::CoreError;
use crate::framework::DatabaseProcessor;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Contribution {
    pub id: Uuid,
    pub item_id: Uuid,
    pub guest_session_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub created_at: OffsetDateTime,
}

impl Contribution {
    pub fn new(
        item_id: Uuid,
        guest_session_id: Uuid,
        amount: Decimal,
        currency: &str,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            item_id,
            guest_session_id,
            amount,
            currency: currency.to_string(),
            created_at: now,
        }
    }
}

/// Largest amount a `NUMERIC(12, 2)` column holds.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0xD4A5_0FFF, 0xE8, 0, false, 2);

/// Positive, at most [`MAX_AMOUNT`], at most two decimal places.
pub fn validate_amount(amount: Decimal) -> Result<(), CoreError> {
    if amount <= Decimal::ZERO {
        return Err(CoreError::Validation("amount must be positive".to_string()));
    }
    if amount > MAX_AMOUNT {
        return Err(CoreError::Validation(format!(
            "amount must not exceed {MAX_AMOUNT}"
        )));
    }
    if amount.normalize().scale() > 2 {
        return Err(CoreError::Validation(
            "amount must have at most two decimal places".to_string(),
        ));
    }
    Ok(())
}

pub fn ensure_contributable(item: &Item) -> Result<(), CoreError> {
    if item.mode != ItemMode::Group {
        return Err(CoreError::Conflict(
            "single items are reserved, not funded",
        ));
    }
    if !item.is_active() {
        return Err(CoreError::Conflict("item is not available"));
    }
    if item.target().is_none() {
        return Err(CoreError::Conflict("item has no target amount"));
    }
    Ok(())
}

/// Sum of one guest's contributions per item.
pub fn totals_by_item(contributions: &[Contribution]) -> std::collections::HashMap<Uuid, Decimal> {
    let mut totals = std::collections::HashMap::new();
    for c in contributions {
        *totals.entry(c.item_id).or_insert(Decimal::ZERO) += c.amount;
    }
    totals
}

/// Contributions a guest made to the items of one list.
pub struct ListGuestContributions {
    pub wishlist_id: Uuid,
    pub guest_session_id: Uuid,
}

impl Processor<ListGuestContributions> for DatabaseProcessor {
    type Output = Vec<Contribution>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListGuestContributions")]
    async fn process(&self, query: ListGuestContributions) -> Result<Vec<Contribution>, sqlx::Error> {
        sqlx::query_as::<_, Contribution>(
            r#"
            SELECT c.id, c.item_id, c.guest_session_id, c.amount, c.currency, c.created_at
            FROM contributions c
            JOIN wishlist_items i ON i.id = c.item_id
            WHERE i.wishlist_id = $1 AND c.guest_session_id = $2
            ORDER BY c.created_at
            "#,
        )
        .bind(query.wishlist_id)
        .bind(query.guest_session_id)
        .fetch_all(&self.pool)
        .await
    }
}

impl Contribution {
    pub async fn insert_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        contribution: &Contribution,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO contributions (id, item_id, guest_session_id, amount, currency, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(contribution.id)
        .bind(contribution.item_id)
        .bind(contribution.guest_session_id)
        .bind(contribution.amount)
        .bind(&contribution.currency)
        .bind(contribution.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}
