#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod config;
pub mod entities;
pub mod error;
pub mod events;
pub mod framework;
pub mod projection;
pub mod service;
pub mod store;
pub mod tokens;

pub use error::{CoreError, StoreError};
pub use service::{ConsistencyCore, Credentials};
pub use store::{MemoryStore, PgStore, WishlistStore};
