use kanau::processor::Processor;
use rand::Rng;
use time::OffsetDateTime;
use uuid::Uuid;
use wishlist_sdk::objects::WishlistSummary;

use super::WishlistStatus;
use crate::error::CoreError;
use crate::framework::DatabaseProcessor;

/// Number of slug candidates tried when a list is published.
pub const SLUG_ATTEMPTS: usize = 15;

const SLUG_SUFFIX_LEN: usize = 6;
const SLUG_BASE_MAX: usize = 60;
const SLUG_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Wishlist {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub currency: String,
    pub status: WishlistStatus,
    pub share_slug: Option<String>,
    pub closed_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWishlist {
    pub owner_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub currency: String,
}

impl NewWishlist {
    pub fn validate(&self) -> Result<(), CoreError> {
        let title = self.title.trim();
        if title.is_empty() || title.chars().count() > 200 {
            return Err(CoreError::Validation(
                "title must be between 1 and 200 characters".to_string(),
            ));
        }
        if self.currency.len() != 3 || !self.currency.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(CoreError::Validation(
                "currency must be a three-letter ISO code".to_string(),
            ));
        }
        Ok(())
    }
}

impl Wishlist {
    pub fn create(new: NewWishlist, now: OffsetDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: new.owner_id,
            title: new.title.trim().to_string(),
            description: new.description,
            currency: new.currency,
            status: WishlistStatus::Draft,
            share_slug: None,
            closed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_public(&self) -> bool {
        matches!(
            self.status,
            WishlistStatus::Published | WishlistStatus::Closed
        )
    }

    /// Guests and the owner may no longer change a closed list.
    pub fn ensure_open(&self) -> Result<(), CoreError> {
        if self.status == WishlistStatus::Closed {
            return Err(CoreError::Conflict("wishlist is closed"));
        }
        Ok(())
    }

    /// `false` when the list is already published and nothing changes.
    pub fn needs_publish(&self) -> bool {
        self.status != WishlistStatus::Published
    }

    /// `Ok(false)` when the list is already closed.
    pub fn needs_close(&self) -> Result<bool, CoreError> {
        match self.status {
            WishlistStatus::Draft => Err(CoreError::Conflict("a draft wishlist cannot be closed")),
            WishlistStatus::Published => Ok(true),
            WishlistStatus::Closed => Ok(false),
        }
    }

    /// Switch to published. The slug is only assigned on the first publish
    /// and kept across close/re-publish.
    pub fn mark_published(&mut self, slug: Option<String>, now: OffsetDateTime) {
        self.status = WishlistStatus::Published;
        self.closed_at = None;
        if self.share_slug.is_none() {
            self.share_slug = slug;
        }
        self.updated_at = now;
    }

    pub fn mark_closed(&mut self, now: OffsetDateTime) {
        self.status = WishlistStatus::Closed;
        self.closed_at = Some(now);
        self.updated_at = now;
    }

    pub fn summary(&self) -> WishlistSummary {
        WishlistSummary {
            id: self.id,
            title: self.title.clone(),
            description: self.description.clone(),
            currency: self.currency.clone(),
            status: self.status.into(),
            share_slug: self.share_slug.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// URL-safe base of a share slug derived from the title.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug: String = slug.trim_matches('-').chars().take(SLUG_BASE_MAX).collect();
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "wishlist".to_string()
    } else {
        slug.to_string()
    }
}

/// Random `{base}-{suffix}` candidates; the store takes the first free one.
pub fn slug_candidates(title: &str, rng: &mut impl Rng, count: usize) -> Vec<String> {
    let base = slugify(title);
    (0..count)
        .map(|_| {
            let suffix: String = (0..SLUG_SUFFIX_LEN)
                .map(|_| SLUG_ALPHABET[rng.random_range(0..SLUG_ALPHABET.len())] as char)
                .collect();
            format!("{base}-{suffix}")
        })
        .collect()
}

const WISHLIST_COLUMNS: &str = r#"
    id, owner_id, title, description, currency, status, share_slug,
    closed_at, created_at, updated_at
"#;

pub struct GetWishlist {
    pub id: Uuid,
}

impl Processor<GetWishlist> for DatabaseProcessor {
    type Output = Option<Wishlist>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetWishlist")]
    async fn process(&self, query: GetWishlist) -> Result<Option<Wishlist>, sqlx::Error> {
        sqlx::query_as::<_, Wishlist>(&format!(
            "SELECT {WISHLIST_COLUMNS} FROM wishlists WHERE id = $1"
        ))
        .bind(query.id)
        .fetch_optional(&self.pool)
        .await
    }
}

pub struct GetWishlistBySlug {
    pub slug: String,
}

impl Processor<GetWishlistBySlug> for DatabaseProcessor {
    type Output = Option<Wishlist>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetWishlistBySlug")]
    async fn process(&self, query: GetWishlistBySlug) -> Result<Option<Wishlist>, sqlx::Error> {
        sqlx::query_as::<_, Wishlist>(&format!(
            "SELECT {WISHLIST_COLUMNS} FROM wishlists WHERE share_slug = $1"
        ))
        .bind(&query.slug)
        .fetch_optional(&self.pool)
        .await
    }
}

impl Wishlist {
    pub async fn insert_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        wishlist: &Wishlist,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO wishlists (id, owner_id, title, description, currency, status,
                share_slug, closed_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(wishlist.id)
        .bind(wishlist.owner_id)
        .bind(&wishlist.title)
        .bind(&wishlist.description)
        .bind(&wishlist.currency)
        .bind(wishlist.status)
        .bind(&wishlist.share_slug)
        .bind(wishlist.closed_at)
        .bind(wishlist.created_at)
        .bind(wishlist.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Lock the list row for the rest of the transaction. Every mutation of
    /// a list and its event log goes through this lock.
    pub async fn lock_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: Uuid,
    ) -> Result<Option<Wishlist>, sqlx::Error> {
        sqlx::query_as::<_, Wishlist>(&format!(
            "SELECT {WISHLIST_COLUMNS} FROM wishlists WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
    }

    pub async fn slug_taken_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        slug: &str,
    ) -> Result<bool, sqlx::Error> {
        let taken: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM wishlists WHERE share_slug = $1)")
                .bind(slug)
                .fetch_one(&mut **tx)
                .await?;
        Ok(taken)
    }

    pub async fn save_lifecycle_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        wishlist: &Wishlist,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE wishlists
            SET status = $2, share_slug = $3, closed_at = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(wishlist.id)
        .bind(wishlist.status)
        .bind(&wishlist.share_slug)
        .bind(wishlist.closed_at)
        .bind(wishlist.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn touch_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        id: Uuid,
        now: OffsetDateTime,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE wishlists SET updated_at = $2 WHERE id = $1")
            .bind(id)
            .bind(now)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn wishlist(status: WishlistStatus) -> Wishlist {
        let mut list = Wishlist::create(
            NewWishlist {
                owner_id: Uuid::new_v4(),
                title: "Birthday".to_string(),
                description: None,
                currency: "RUB".to_string(),
            },
            OffsetDateTime::UNIX_EPOCH,
        );
        list.status = status;
        list
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("My  Birthday 2026!"), "my-birthday-2026");
        assert_eq!(slugify("---"), "wishlist");
        assert_eq!(slugify("День рождения"), "wishlist");
        assert_eq!(slugify(&"a".repeat(100)).len(), SLUG_BASE_MAX);
    }

    #[test]
    fn test_slug_candidates_share_base() {
        let mut rng = StdRng::seed_from_u64(7);
        let candidates = slug_candidates("New Year", &mut rng, SLUG_ATTEMPTS);
        assert_eq!(candidates.len(), SLUG_ATTEMPTS);
        for slug in &candidates {
            let suffix = slug.strip_prefix("new-year-").unwrap();
            assert_eq!(suffix.len(), SLUG_SUFFIX_LEN);
            assert!(suffix.bytes().all(|b| SLUG_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn test_publish_keeps_first_slug() {
        let mut list = wishlist(WishlistStatus::Draft);
        list.mark_published(Some("birthday-aaaaaa".to_string()), OffsetDateTime::UNIX_EPOCH);
        list.mark_closed(OffsetDateTime::UNIX_EPOCH);
        assert!(list.closed_at.is_some());
        list.mark_published(Some("birthday-bbbbbb".to_string()), OffsetDateTime::UNIX_EPOCH);
        assert_eq!(list.share_slug.as_deref(), Some("birthday-aaaaaa"));
        assert_eq!(list.closed_at, None);
    }

    #[test]
    fn test_lifecycle_guards() {
        assert!(matches!(
            wishlist(WishlistStatus::Draft).needs_close(),
            Err(CoreError::Conflict(_))
        ));
        assert!(wishlist(WishlistStatus::Published).needs_close().unwrap());
        assert!(!wishlist(WishlistStatus::Closed).needs_close().unwrap());
        assert!(!wishlist(WishlistStatus::Published).needs_publish());
        assert!(wishlist(WishlistStatus::Closed).ensure_open().is_err());
        assert!(!wishlist(WishlistStatus::Draft).is_public());
    }

    #[test]
    fn test_new_wishlist_validation() {
        let mut new = NewWishlist {
            owner_id: Uuid::new_v4(),
            title: "  ".to_string(),
            description: None,
            currency: "RUB".to_string(),
        };
        assert!(new.validate().is_err());
        new.title = "Ok".to_string();
        assert!(new.validate().is_ok());
        new.currency = "rub".to_string();
        assert!(new.validate().is_err());
    }
}
