//! Shared types and client-side synchronization for public wishlists.
//!
//! - [`objects`]: wire types exchanged with the wishlist server.
//! - [`projection`]: pure mapping from item views to renderable affordances.
//! - [`sync`]: local cache that reconciles snapshots, events and mutation
//!   responses.
//! - [`realtime`]: the event transport state machine (and, with the `client`
//!   feature, its tokio driver).
//! - `client` (feature `client`): typed HTTP client for the public API.

pub mod objects;
pub mod progress;
pub mod projection;
pub mod realtime;
pub mod sync;

#[cfg(feature = "client")]
pub mod client;
