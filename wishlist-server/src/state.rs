//! Application state shared across all request handlers.

use std::sync::Arc;
use wishlist_core::ConsistencyCore;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    pub core: Arc<ConsistencyCore>,
}

impl AppState {
    pub fn new(core: Arc<ConsistencyCore>) -> Self {
        Self { core }
    }
}
