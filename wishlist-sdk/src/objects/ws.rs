//! WebSocket protocol constants for the public event channel.
//!
//! The `GET /api/v1/ws/public/w/{slug}` endpoint upgrades to a WebSocket
//! connection and pushes [`WishlistEvent`](super::WishlistEvent) JSON frames.
//!
//! # Protocol
//!
//! 1. If the optional `cursor` query parameter is present, the server first
//!    replays logged events with `id > cursor`.
//! 2. Every event committed afterwards is pushed as one text frame.
//! 3. The client sends the literal [`PING`] text frame periodically; the
//!    server answers each one with [`PONG`].
//! 4. Unknown or unpublished lists are rejected with
//!    [`WsCloseCode::POLICY_VIOLATION`].

/// Liveness token sent by the client.
pub const PING: &str = "ping";

/// Reply to [`PING`].
pub const PONG: &str = "pong";

/// Well-known WebSocket close codes used by the event channel.
pub struct WsCloseCode;

impl WsCloseCode {
    pub const NORMAL: u16 = 1000;

    /// Server is shutting down.
    pub const GOING_AWAY: u16 = 1001;

    /// The list does not exist or is not published.
    pub const POLICY_VIOLATION: u16 = 1008;

    pub const INTERNAL_ERROR: u16 = 1011;

    /// The socket fell behind the live stream; reconnect and catch up.
    pub const TRY_AGAIN_LATER: u16 = 1013;
}
