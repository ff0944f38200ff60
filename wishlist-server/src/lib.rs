//! Wishlist realtime server
//!
//! Serves the public wishlist API, the WebSocket event channel and the
//! owner lifecycle actions on top of the consistency core.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod api;
pub mod config;
pub mod server;
pub mod shutdown;
pub mod state;
