//! Signed bearer tokens for guests and owners.
//!
//! Wire format:
//!
//! ```text
//! {kind}.{subject}.{scope}.{expires}.{signature}
//! ```
//!
//! * `kind` – `guest` or `owner`
//! * `subject` – guest session id or owner user id
//! * `scope` – wishlist id for guest tokens, `-` for owner tokens
//! * `expires` – unix timestamp (seconds)
//! * `signature` – base64 `HMAC-SHA256("{kind}.{subject}.{scope}.{expires}", secret)`
//!
//! Guest tokens are only a pointer to a server-side session; the session row
//! stays authoritative for expiry and deactivation.

use ring::hmac;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::config::TokenConfig;

const OWNER_SCOPE: &str = "-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Guest,
    Owner,
}

impl TokenKind {
    fn as_str(self) -> &'static str {
        match self {
            TokenKind::Guest => "guest",
            TokenKind::Owner => "owner",
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,
    #[error("invalid token signature")]
    BadSignature,
    #[error("token expired")]
    Expired,
    #[error("wrong token kind")]
    WrongKind,
}

impl From<ring::error::Unspecified> for TokenError {
    fn from(_: ring::error::Unspecified) -> Self {
        Self::BadSignature
    }
}

/// Verified token contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Claims {
    pub kind: TokenKind,
    pub subject: Uuid,
    /// Wishlist a guest token is bound to.
    pub scope: Option<Uuid>,
    pub expires_at: i64,
}

pub struct TokenSigner {
    key: hmac::Key,
    owner_ttl: time::Duration,
}

impl TokenSigner {
    pub fn new(config: &TokenConfig) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, &config.secret),
            owner_ttl: config.owner_ttl,
        }
    }

    /// Token for a guest session, valid until the session expires.
    pub fn issue_guest(
        &self,
        guest_session_id: Uuid,
        wishlist_id: Uuid,
        expires_at: OffsetDateTime,
    ) -> String {
        self.sign(
            TokenKind::Guest,
            guest_session_id,
            &wishlist_id.to_string(),
            expires_at.unix_timestamp(),
        )
    }

    /// Token identifying a list owner. Minted by the account service that
    /// shares this secret; exposed here for it and for tests.
    pub fn issue_owner(&self, owner_id: Uuid) -> String {
        let expires = OffsetDateTime::now_utc() + self.owner_ttl;
        self.sign(
            TokenKind::Owner,
            owner_id,
            OWNER_SCOPE,
            expires.unix_timestamp(),
        )
    }

    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<Claims, TokenError> {
        let (data, signature) = token.rsplit_once('.').ok_or(TokenError::Malformed)?;
        let signature = fast32::base64::RFC4648_NOPAD
            .decode_str(signature)
            .map_err(|_| TokenError::Malformed)?;
        hmac::verify(&self.key, data.as_bytes(), &signature)?;

        let mut parts = data.split('.');
        let (Some(kind), Some(subject), Some(scope), Some(expires), None) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return Err(TokenError::Malformed);
        };

        let kind = match kind {
            "guest" => TokenKind::Guest,
            "owner" => TokenKind::Owner,
            _ => return Err(TokenError::Malformed),
        };
        if kind != expected {
            return Err(TokenError::WrongKind);
        }
        let subject = Uuid::parse_str(subject).map_err(|_| TokenError::Malformed)?;
        let scope = match (kind, scope) {
            (TokenKind::Owner, OWNER_SCOPE) => None,
            (TokenKind::Guest, scope) => {
                Some(Uuid::parse_str(scope).map_err(|_| TokenError::Malformed)?)
            }
            _ => return Err(TokenError::Malformed),
        };
        let expires_at: i64 = expires.parse().map_err(|_| TokenError::Malformed)?;
        if expires_at <= OffsetDateTime::now_utc().unix_timestamp() {
            return Err(TokenError::Expired);
        }

        Ok(Claims {
            kind,
            subject,
            scope,
            expires_at,
        })
    }

    fn sign(&self, kind: TokenKind, subject: Uuid, scope: &str, expires: i64) -> String {
        let data = format!("{}.{subject}.{scope}.{expires}", kind.as_str());
        let signature = hmac::sign(&self.key, data.as_bytes());
        format!(
            "{data}.{}",
            fast32::base64::RFC4648_NOPAD.encode(signature.as_ref())
        )
    }
}
