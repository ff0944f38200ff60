//! Realtime event transport.
//!
//! [`Subscription`] is a sans-IO state machine: it consumes named inputs and
//! returns [`Effect`]s for a runtime to execute. With the `client` feature,
//! [`RealtimeClient`] runs it over a tokio-tungstenite WebSocket.

mod config;
mod machine;

#[cfg(feature = "client")]
mod driver;

pub use config::{ReconnectPolicy, TransportConfig};
pub use machine::{Effect, Effects, Input, Subscription, TimerId, TimerKind, TransportState};

#[cfg(feature = "client")]
pub use driver::{EventLogReader, RealtimeClient, SubscriptionHandle, TransportError};
