use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use time::OffsetDateTime;

use crate::objects::GuestSessionResponse;

/// Guest sessions keyed by share slug.
///
/// The server issues a new session on every registration, so the client
/// keeps the first one per list and reuses it until it expires or the
/// server rejects it.
#[derive(Debug, Default)]
pub struct GuestSessionCache {
    sessions: Mutex<HashMap<String, GuestSessionResponse>>,
    registrations: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl GuestSessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached, unexpired session for `slug`.
    pub fn get(&self, slug: &str) -> Option<GuestSessionResponse> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        match sessions.get(slug) {
            Some(session) if session.expires_at > OffsetDateTime::now_utc() => {
                Some(session.clone())
            }
            Some(_) => {
                sessions.remove(slug);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, slug: &str, session: GuestSessionResponse) {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(slug.to_string(), session);
    }

    /// Lock serializing registrations for `slug`.
    pub fn registration(&self, slug: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(slug.to_string())
            .or_default()
            .clone()
    }

    pub fn remove(&self, slug: &str) -> Option<GuestSessionResponse> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(slug)
    }
}
