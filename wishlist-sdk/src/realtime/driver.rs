//! Tokio runtime for [`Subscription`].
//!
//! One task per subscription owns the WebSocket, the two timers and the
//! in-flight catch-up read, and executes the machine's effects. Errors are
//! logged and turned into machine inputs; they never reach the caller.

use std::collections::VecDeque;
use std::future::{Future, pending};
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{Instrument, debug, info_span, warn};
use url::Url;

use super::config::TransportConfig;
use super::machine::{Effect, Input, Subscription, TimerId, TimerKind, TransportState};
use crate::objects::ws::PING;
use crate::objects::{EventsPage, WishlistEvent};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("unsupported url scheme: {0}")]
    Scheme(String),
}

/// Source of catch-up pages, usually the public HTTP API.
#[async_trait]
pub trait EventLogReader: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn fetch_since(&self, slug: &str, cursor: Option<i64>)
    -> Result<EventsPage, Self::Error>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
type Timer = Option<(TimerId, Pin<Box<Sleep>>)>;

/// Opens realtime subscriptions against one wishlist server.
pub struct RealtimeClient<R> {
    ws_base: Url,
    reader: Arc<R>,
    config: TransportConfig,
}

impl<R: EventLogReader> RealtimeClient<R> {
    /// `base_url` is the HTTP root of the server; the WebSocket scheme is
    /// derived from it (`http` → `ws`, `https` → `wss`).
    pub fn new(base_url: Url, reader: Arc<R>) -> Result<Self, TransportError> {
        Ok(Self {
            ws_base: ws_base(&base_url)?,
            reader,
            config: TransportConfig::default(),
        })
    }

    pub fn with_config(mut self, config: TransportConfig) -> Self {
        self.config = config;
        self
    }

    /// Subscribe to `slug` from the start of its log.
    pub fn subscribe<F>(&self, slug: &str, on_event: F) -> SubscriptionHandle
    where
        F: FnMut(WishlistEvent) + Send + 'static,
    {
        self.subscribe_from(slug, 0, on_event)
    }

    /// Subscribe to `slug`, delivering only events with `id > cursor`.
    pub fn subscribe_from<F>(&self, slug: &str, cursor: i64, on_event: F) -> SubscriptionHandle
    where
        F: FnMut(WishlistEvent) + Send + 'static,
    {
        let mut url = self.ws_base.clone();
        url.set_path(&format!(
            "/api/v1/ws/public/w/{}",
            urlencoding::encode(slug)
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(TransportState::Disconnected);

        let driver = Driver {
            slug: slug.to_string(),
            url,
            reader: self.reader.clone(),
            machine: Subscription::with_cursor(self.config.clone(), cursor),
            on_event,
            socket: None,
            connecting: None,
            liveness: None,
            reconnect: None,
            catch_up: None,
            state_tx,
        };
        let span = info_span!("subscription", slug = %slug);
        let task = tokio::spawn(driver.run(shutdown_rx).instrument(span));

        SubscriptionHandle {
            shutdown_tx,
            state_rx,
            task: Some(task),
        }
    }
}

fn ws_base(base_url: &Url) -> Result<Url, TransportError> {
    let scheme = match base_url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(TransportError::Scheme(other.to_string())),
    };
    let mut url = base_url.clone();
    url.set_scheme(scheme)
        .map_err(|()| TransportError::Scheme(scheme.to_string()))?;
    Ok(url)
}

/// Handle to a running subscription. Dropping it unsubscribes.
pub struct SubscriptionHandle {
    shutdown_tx: watch::Sender<bool>,
    state_rx: watch::Receiver<TransportState>,
    task: Option<JoinHandle<()>>,
}

impl SubscriptionHandle {
    /// Stop reconnecting, clear both timers and close the channel.
    /// Idempotent.
    pub fn unsubscribe(&self) {
        self.shutdown_tx.send_replace(true);
    }

    pub fn is_connected(&self) -> bool {
        *self.state_rx.borrow() == TransportState::Connected
    }

    pub fn state(&self) -> TransportState {
        *self.state_rx.borrow()
    }

    /// Receiver notified on every state change.
    pub fn watch_state(&self) -> watch::Receiver<TransportState> {
        self.state_rx.clone()
    }

    /// Unsubscribe and wait until the channel is closed.
    pub async fn shutdown(mut self) {
        self.unsubscribe();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

struct Driver<R: EventLogReader, F> {
    slug: String,
    url: Url,
    reader: Arc<R>,
    machine: Subscription,
    on_event: F,
    socket: Option<WsStream>,
    connecting: Option<BoxFuture<Result<WsStream, TransportError>>>,
    liveness: Timer,
    reconnect: Timer,
    catch_up: Option<BoxFuture<Result<EventsPage, R::Error>>>,
    state_tx: watch::Sender<TransportState>,
}

impl<R, F> Driver<R, F>
where
    R: EventLogReader,
    F: FnMut(WishlistEvent) + Send + 'static,
{
    async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        self.feed(Input::Subscribe).await;

        while !self.machine.is_torn_down() {
            let input = tokio::select! {
                biased;

                // A dropped handle also ends the subscription.
                _ = shutdown_rx.changed() => Input::Unsubscribe,

                result = poll_slot(&mut self.connecting) => {
                    self.connecting = None;
                    match result {
                        Ok(socket) => {
                            self.socket = Some(socket);
                            Input::ChannelOpened
                        }
                        Err(e) => {
                            warn!(error = %e, "failed to open event channel");
                            Input::ChannelClosed
                        }
                    }
                }

                frame = next_frame(&mut self.socket) => match frame {
                    Some(Ok(Message::Text(text))) => Input::FrameReceived(text),
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                        self.machine.activity();
                        continue;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("event channel closed by server");
                        self.channel_lost();
                        Input::ChannelClosed
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!(error = %e, "event channel failed");
                        self.channel_lost();
                        Input::ChannelClosed
                    }
                },

                timer = fire(&mut self.liveness) => {
                    self.liveness = None;
                    Input::LivenessElapsed(timer)
                }

                timer = fire(&mut self.reconnect) => {
                    self.reconnect = None;
                    Input::ReconnectElapsed(timer)
                }

                page = poll_slot(&mut self.catch_up) => {
                    self.catch_up = None;
                    match page {
                        Ok(page) => Input::CatchUpCompleted(page),
                        Err(e) => {
                            debug!(error = %e, "catch-up read failed");
                            Input::CatchUpFailed
                        }
                    }
                }
            };
            self.feed(input).await;
        }
        debug!(cursor = self.machine.cursor(), "subscription finished");
    }

    /// Run one input through the machine and execute every resulting effect.
    async fn feed(&mut self, input: Input) {
        let mut queue: VecDeque<Effect> = self.machine.handle(input).into_iter().collect();

        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::OpenChannel => {
                    let url = self.url.to_string();
                    self.connecting = Some(Box::pin(async move {
                        let (socket, _) = connect_async(url).await?;
                        Ok::<_, TransportError>(socket)
                    }));
                }
                Effect::CloseChannel => {
                    self.connecting = None;
                    self.catch_up = None;
                    if let Some(mut socket) = self.socket.take() {
                        if let Err(e) = socket.close(None).await {
                            debug!(error = %e, "error while closing event channel");
                        }
                    }
                }
                Effect::SendPing => {
                    let Some(socket) = self.socket.as_mut() else {
                        continue;
                    };
                    if let Err(e) = socket.send(Message::Text(PING.to_string())).await {
                        warn!(error = %e, "failed to send ping");
                        self.channel_lost();
                        queue.extend(self.machine.handle(Input::ChannelClosed));
                    }
                }
                Effect::ArmTimer { timer, after } => {
                    let slot = Some((timer, Box::pin(tokio::time::sleep(after))));
                    match timer.kind {
                        TimerKind::Liveness => self.liveness = slot,
                        TimerKind::Reconnect => self.reconnect = slot,
                    }
                }
                Effect::CancelTimer(timer) => {
                    let slot = match timer.kind {
                        TimerKind::Liveness => &mut self.liveness,
                        TimerKind::Reconnect => &mut self.reconnect,
                    };
                    if slot.as_ref().is_some_and(|(armed, _)| *armed == timer) {
                        *slot = None;
                    }
                }
                Effect::FetchSince { cursor } => {
                    let reader = self.reader.clone();
                    let slug = self.slug.clone();
                    self.catch_up = Some(Box::pin(async move {
                        reader.fetch_since(&slug, Some(cursor)).await
                    }));
                }
                Effect::Deliver(event) => (self.on_event)(event),
            }
        }

        self.state_tx.send_replace(self.machine.state());
    }

    fn channel_lost(&mut self) {
        self.socket = None;
        self.catch_up = None;
    }
}

async fn poll_slot<T>(slot: &mut Option<BoxFuture<T>>) -> T {
    match slot {
        Some(future) => future.as_mut().await,
        None => pending().await,
    }
}

async fn next_frame(socket: &mut Option<WsStream>) -> Option<Result<Message, tungstenite::Error>> {
    match socket {
        Some(socket) => socket.next().await,
        None => pending().await,
    }
}

async fn fire(slot: &mut Timer) -> TimerId {
    match slot {
        Some((timer, sleep)) => {
            sleep.as_mut().await;
            *timer
        }
        None => pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::EventType;
    use serde_json::json;
    use std::convert::Infallible;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use time::OffsetDateTime;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    #[derive(Default)]
    struct FakeReader {
        log: Mutex<Vec<WishlistEvent>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EventLogReader for FakeReader {
        type Error = Infallible;

        async fn fetch_since(
            &self,
            _slug: &str,
            cursor: Option<i64>,
        ) -> Result<EventsPage, Infallible> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let cursor = cursor.unwrap_or(0);
            let events = self
                .log
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.id > cursor)
                .cloned()
                .collect();
            Ok(EventsPage {
                events,
                next_cursor: None,
            })
        }
    }

    fn event(id: i64) -> WishlistEvent {
        let item_id = Uuid::from_u128(1);
        WishlistEvent {
            id,
            event_type: EventType::ItemUnreserved,
            item_id: Some(item_id),
            payload: json!({"item_id": item_id, "is_reserved": false}),
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    async fn local_listener() -> (TcpListener, Url) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = Url::parse(&format!("http://{}", listener.local_addr().unwrap())).unwrap();
        (listener, url)
    }

    #[test]
    fn test_ws_base_follows_http_scheme() {
        let url = ws_base(&Url::parse("https://gifts.example/").unwrap()).unwrap();
        assert_eq!(url.as_str(), "wss://gifts.example/");
        let url = ws_base(&Url::parse("http://127.0.0.1:8080").unwrap()).unwrap();
        assert_eq!(url.scheme(), "ws");
        assert!(ws_base(&Url::parse("ftp://example.com").unwrap()).is_err());
    }

    #[tokio::test]
    async fn test_catch_up_then_live_events_in_order() {
        let (listener, base) = local_listener().await;
        let reader = Arc::new(FakeReader::default());
        reader.log.lock().unwrap().extend([event(1), event(2)]);

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let live = serde_json::to_string(&event(3)).unwrap();
            ws.send(Message::Text(live)).await.unwrap();
            ws.send(Message::Text("not json".to_string())).await.unwrap();
            // Keep the connection open until the client leaves.
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_close() {
                    break;
                }
            }
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let client = RealtimeClient::new(base, reader.clone()).unwrap();
        let handle = client.subscribe("party-abc123", move |event| {
            let _ = tx.send(event.id);
        });

        let mut ids = Vec::new();
        while ids.len() < 3 {
            let id = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            ids.push(id);
        }
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(handle.is_connected());
        assert!(reader.calls.load(Ordering::SeqCst) >= 1);

        handle.shutdown().await;
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_sends_ping_while_connected() {
        let (listener, base) = local_listener().await;
        let (ping_tx, mut ping_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                if msg.to_text().ok() == Some(PING) {
                    let _ = ping_tx.send(());
                    let _ = ws.send(Message::Text("pong".to_string())).await;
                }
            }
        });

        let config = TransportConfig {
            ping_interval: Duration::from_millis(50),
            ..TransportConfig::default()
        };
        let client = RealtimeClient::new(base, Arc::new(FakeReader::default()))
            .unwrap()
            .with_config(config);
        let handle = client.subscribe("party-abc123", |_| {});

        for _ in 0..3 {
            tokio::time::timeout(Duration::from_secs(5), ping_rx.recv())
                .await
                .unwrap()
                .unwrap();
        }
        assert!(handle.is_connected());
        handle.unsubscribe();
        handle.unsubscribe();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_fixed_backoff() {
        let (listener, base) = local_listener().await;
        let reader = Arc::new(FakeReader::default());
        let client = RealtimeClient::new(base, reader.clone()).unwrap();
        let handle = client.subscribe("party-abc123", |_| {});

        let mut accepted = Vec::new();
        for _ in 0..3 {
            // Dropping the socket before the handshake fails the attempt.
            let (stream, _) = listener.accept().await.unwrap();
            accepted.push(tokio::time::Instant::now());
            drop(stream);
        }
        for pair in accepted.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(2));
        }
        assert!(!handle.is_connected());
        assert_eq!(reader.calls.load(Ordering::SeqCst), 0);

        let mut state = handle.watch_state();
        handle.unsubscribe();
        state
            .wait_for(|s| *s == TransportState::Disconnected)
            .await
            .unwrap();
    }
}
