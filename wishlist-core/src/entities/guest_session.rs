use kanau::processor::Processor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::CoreError;
use crate::framework::DatabaseProcessor;

/// A display name registered by a visitor of one public list.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct GuestSession {
    pub id: Uuid,
    pub wishlist_id: Uuid,
    pub display_name: String,
    pub active: bool,
    pub expires_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
    pub last_seen_at: OffsetDateTime,
}

/// Trimmed display name, 2 to 120 characters.
pub fn normalize_guest_name(name: &str) -> Result<String, CoreError> {
    let name = name.trim();
    let len = name.chars().count();
    if !(2..=120).contains(&len) {
        return Err(CoreError::Validation(
            "name must be between 2 and 120 characters".to_string(),
        ));
    }
    Ok(name.to_string())
}

impl GuestSession {
    pub fn new(
        wishlist_id: Uuid,
        display_name: String,
        ttl: time::Duration,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            wishlist_id,
            display_name,
            active: true,
            expires_at: now + ttl,
            created_at: now,
            last_seen_at: now,
        }
    }

    /// Whether the session may act on `wishlist_id` at `now`.
    pub fn is_valid_for(&self, wishlist_id: Uuid, now: OffsetDateTime) -> bool {
        self.active && self.wishlist_id == wishlist_id && self.expires_at > now
    }
}

const GUEST_SESSION_COLUMNS: &str =
    "id, wishlist_id, display_name, active, expires_at, created_at, last_seen_at";

pub struct GetGuestSession {
    pub id: Uuid,
}

impl Processor<GetGuestSession> for DatabaseProcessor {
    type Output = Option<GuestSession>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetGuestSession")]
    async fn process(&self, query: GetGuestSession) -> Result<Option<GuestSession>, sqlx::Error> {
        sqlx::query_as::<_, GuestSession>(&format!(
            "SELECT {GUEST_SESSION_COLUMNS} FROM guest_sessions WHERE id = $1"
        ))
        .bind(query.id)
        .fetch_optional(&self.pool)
        .await
    }
}

pub struct InsertGuestSession {
    pub session: GuestSession,
}

impl Processor<InsertGuestSession> for DatabaseProcessor {
    type Output = GuestSession;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertGuestSession")]
    async fn process(&self, insert: InsertGuestSession) -> Result<GuestSession, sqlx::Error> {
        let s = insert.session;
        sqlx::query(
            r#"
            INSERT INTO guest_sessions (id, wishlist_id, display_name, active, expires_at,
                created_at, last_seen_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(s.id)
        .bind(s.wishlist_id)
        .bind(&s.display_name)
        .bind(s.active)
        .bind(s.expires_at)
        .bind(s.created_at)
        .bind(s.last_seen_at)
        .execute(&self.pool)
        .await?;
        Ok(s)
    }
}
