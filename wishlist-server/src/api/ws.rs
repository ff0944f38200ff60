use axum::{
    extract::{
        Path, Query, State,
        rejection::QueryRejection,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tokio::sync::broadcast::{self, error::RecvError};
use uuid::Uuid;
use wishlist_core::CoreError;
use wishlist_sdk::objects::WishlistEvent;
use wishlist_sdk::objects::ws::{PING, PONG, WsCloseCode};

use crate::api::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub(super) struct WsQuery {
    cursor: Option<i64>,
}

/// `GET /ws/public/w/{slug}`: WebSocket event stream of a public list.
///
/// With `?cursor=N` the logged events after `N` are replayed first, then
/// every committed event is pushed as it happens. Text frames `ping` are
/// answered with `pong`.
///
/// The live subscription is taken before the `101` goes out, so an event
/// committed once the client sees the handshake always reaches this socket.
pub(super) async fn public_events_ws(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    query: Result<Query<WsQuery>, QueryRejection>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let Query(query) = query?;
    let stream = open_stream(&state, &slug).await;
    Ok(ws
        .on_upgrade(move |socket| handle_socket(socket, state, slug, query.cursor, stream))
        .into_response())
}

/// A resolved public list and its live receiver.
struct LiveStream {
    wishlist_id: Uuid,
    live: broadcast::Receiver<WishlistEvent>,
}

async fn open_stream(state: &AppState, slug: &str) -> Result<LiveStream, Exit> {
    let wishlist = match state.core.public_wishlist(slug).await {
        Ok(wishlist) => wishlist,
        Err(CoreError::NotFound(_) | CoreError::NotPublished) => {
            return Err(Exit::Close(
                WsCloseCode::POLICY_VIOLATION,
                "wishlist not found or not published",
            ));
        }
        Err(e) => {
            tracing::error!(error = %e, %slug, "WS: failed to resolve wishlist");
            return Err(Exit::Close(WsCloseCode::INTERNAL_ERROR, "internal error"));
        }
    };
    Ok(LiveStream {
        wishlist_id: wishlist.id,
        live: state.core.hub().subscribe(slug).await,
    })
}

/// How a relay ended.
enum Exit {
    /// The client closed or the socket broke; nothing left to send.
    ClientGone,
    Close(u16, &'static str),
}

async fn handle_socket(
    mut socket: WebSocket,
    state: AppState,
    slug: String,
    cursor: Option<i64>,
    stream: Result<LiveStream, Exit>,
) {
    tracing::debug!(%slug, ?cursor, "WS: connected");
    let exit = match stream {
        Ok(stream) => relay(&mut socket, &state, &slug, cursor, stream).await,
        Err(exit) => exit,
    };
    state.core.hub().release(&slug).await;

    if let Exit::Close(code, reason) = exit {
        tracing::debug!(%slug, code, reason, "WS: closing");
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code,
                reason: reason.into(),
            })))
            .await;
    } else {
        tracing::debug!(%slug, "WS: client gone");
    }
}

async fn relay(
    socket: &mut WebSocket,
    state: &AppState,
    slug: &str,
    cursor: Option<i64>,
    stream: LiveStream,
) -> Exit {
    let LiveStream {
        wishlist_id,
        mut live,
    } = stream;

    // The receiver predates the log read below; duplicates are filtered by id.
    let mut last_sent = cursor;
    if let Some(mut cursor) = cursor {
        if let Err(exit) = catch_up(socket, state, wishlist_id, &mut cursor).await {
            return exit;
        }
        last_sent = Some(cursor);
    }

    loop {
        tokio::select! {
            received = live.recv() => match received {
                Ok(event) => {
                    if last_sent.is_some_and(|id| event.id <= id) {
                        continue;
                    }
                    if send_event(socket, &event).await.is_err() {
                        return Exit::ClientGone;
                    }
                    last_sent = Some(event.id);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(%slug, skipped, "WS: broadcast receiver lagged, re-reading log");
                    let Some(mut cursor) = last_sent else {
                        return Exit::Close(WsCloseCode::TRY_AGAIN_LATER, "event stream lagged");
                    };
                    if let Err(exit) = catch_up(socket, state, wishlist_id, &mut cursor).await {
                        return exit;
                    }
                    last_sent = Some(cursor);
                }
                Err(RecvError::Closed) => {
                    return Exit::Close(WsCloseCode::GOING_AWAY, "server shutting down");
                }
            },

            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) if text.as_str() == PING => {
                    if socket.send(Message::Text(PONG.into())).await.is_err() {
                        return Exit::ClientGone;
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    return Exit::ClientGone;
                }
                Some(Ok(_)) => {}
            }
        }
    }
}

/// Send every logged event after `cursor`, advancing it as frames go out.
async fn catch_up(
    socket: &mut WebSocket,
    state: &AppState,
    wishlist_id: Uuid,
    cursor: &mut i64,
) -> Result<(), Exit> {
    let page_size = state.core.realtime_config().replay_limit;
    loop {
        let page = state
            .core
            .replay(wishlist_id, *cursor)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, %wishlist_id, "WS: failed to read event log");
                Exit::Close(WsCloseCode::INTERNAL_ERROR, "internal error")
            })?;
        let more = page.len() >= page_size;
        for event in &page {
            send_event(socket, event)
                .await
                .map_err(|_| Exit::ClientGone)?;
            *cursor = event.id;
        }
        if !more {
            return Ok(());
        }
    }
}

/// Serialize `event` and send it as one text frame.
async fn send_event(socket: &mut WebSocket, event: &WishlistEvent) -> Result<(), axum::Error> {
    let json = serde_json::to_string(event).map_err(axum::Error::new)?;
    socket.send(Message::Text(json.into())).await
}
