//! Sans-IO subscription state machine.
//!
//! ```text
//!                 subscribe            channel_opened
//!  Disconnected ────────────▶ Connecting ─────────────▶ Connected
//!       ▲                       ▲   │                     │   ▲
//!       │ unsubscribe           │   │ channel_closed      │   │ liveness_elapsed
//!       │ (from any state)      │   ▼                     │   │ (pong seen)
//!       │               reconnect_elapsed                 └───┘
//!       │                       │
//!       └──────────────────  BackingOff ◀── channel_closed / liveness_elapsed
//!                                               (no pong)
//! ```
//!
//! The machine owns at most one liveness timer (armed only while connected)
//! and at most one reconnect timer (armed only while backing off). Every
//! timer carries a generation; a fire that does not match the armed timer is
//! stale and ignored.

use std::time::Duration;

use smallvec::SmallVec;

use super::config::TransportConfig;
use crate::objects::ws::PONG;
use crate::objects::{EventsPage, WishlistEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportState {
    Disconnected,
    Connecting,
    Connected,
    BackingOff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Liveness,
    Reconnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId {
    pub kind: TimerKind,
    pub generation: u64,
}

/// Instruction for the runtime driver.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    OpenChannel,
    CloseChannel,
    SendPing,
    ArmTimer { timer: TimerId, after: Duration },
    CancelTimer(TimerId),
    /// Read the event log from `cursor`; answer with
    /// [`Input::CatchUpCompleted`] or [`Input::CatchUpFailed`].
    FetchSince { cursor: i64 },
    Deliver(WishlistEvent),
}

pub type Effects = SmallVec<[Effect; 4]>;

/// Named transitions of the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Subscribe,
    ChannelOpened,
    ChannelClosed,
    LivenessElapsed(TimerId),
    ReconnectElapsed(TimerId),
    FrameReceived(String),
    CatchUpCompleted(EventsPage),
    CatchUpFailed,
    Unsubscribe,
}

/// One subscription to a shared list's event stream.
#[derive(Debug)]
pub struct Subscription {
    config: TransportConfig,
    state: TransportState,
    /// Highest event id delivered so far.
    cursor: i64,
    liveness: Option<TimerId>,
    reconnect: Option<TimerId>,
    next_generation: u64,
    awaiting_pong: bool,
    /// A catch-up read is in flight.
    catching_up: bool,
    /// Another catch-up round is owed (failure or buffer overflow).
    catch_up_pending: bool,
    /// Live frames held back until the catch-up finishes.
    pending: Vec<WishlistEvent>,
    attempts: u32,
    torn_down: bool,
}

impl Subscription {
    pub fn new(config: TransportConfig) -> Self {
        Self::with_cursor(config, 0)
    }

    /// Resume from a known cursor, e.g. the one a local snapshot was taken at.
    pub fn with_cursor(config: TransportConfig, cursor: i64) -> Self {
        Self {
            config,
            state: TransportState::Disconnected,
            cursor,
            liveness: None,
            reconnect: None,
            next_generation: 0,
            awaiting_pong: false,
            catching_up: false,
            catch_up_pending: false,
            pending: Vec::new(),
            attempts: 0,
            torn_down: false,
        }
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == TransportState::Connected
    }

    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    pub fn armed_timers(&self) -> impl Iterator<Item = TimerId> + '_ {
        self.liveness.iter().chain(self.reconnect.iter()).copied()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn handle(&mut self, input: Input) -> Effects {
        match input {
            Input::Subscribe => self.subscribe(),
            Input::ChannelOpened => self.channel_opened(),
            Input::ChannelClosed => self.channel_closed(),
            Input::LivenessElapsed(timer) => self.liveness_elapsed(timer),
            Input::ReconnectElapsed(timer) => self.reconnect_elapsed(timer),
            Input::FrameReceived(text) => self.frame_received(&text),
            Input::CatchUpCompleted(page) => self.catch_up_completed(page),
            Input::CatchUpFailed => self.catch_up_failed(),
            Input::Unsubscribe => self.unsubscribe(),
        }
    }

    /// Protocol-level activity (WebSocket ping/pong frames) that counts as a
    /// server response for liveness purposes.
    pub fn activity(&mut self) {
        self.awaiting_pong = false;
    }

    fn subscribe(&mut self) -> Effects {
        let mut effects = Effects::new();
        if self.torn_down || self.state != TransportState::Disconnected {
            return effects;
        }
        self.state = TransportState::Connecting;
        effects.push(Effect::OpenChannel);
        effects
    }

    fn channel_opened(&mut self) -> Effects {
        let mut effects = Effects::new();
        if self.state != TransportState::Connecting {
            // Late open after teardown or a superseded attempt.
            effects.push(Effect::CloseChannel);
            return effects;
        }
        self.state = TransportState::Connected;
        self.attempts = 0;
        self.awaiting_pong = false;
        self.arm_liveness(&mut effects);
        self.start_catch_up(&mut effects);
        effects
    }

    fn channel_closed(&mut self) -> Effects {
        let mut effects = Effects::new();
        match self.state {
            TransportState::Connecting | TransportState::Connected => {
                self.back_off(&mut effects);
            }
            TransportState::Disconnected | TransportState::BackingOff => {}
        }
        effects
    }

    fn liveness_elapsed(&mut self, timer: TimerId) -> Effects {
        let mut effects = Effects::new();
        if self.liveness != Some(timer) {
            return effects;
        }
        self.liveness = None;

        if self.awaiting_pong {
            tracing::debug!(cursor = self.cursor, "no response to ping, reconnecting");
            effects.push(Effect::CloseChannel);
            self.back_off(&mut effects);
            return effects;
        }

        self.awaiting_pong = true;
        effects.push(Effect::SendPing);
        self.arm_liveness(&mut effects);
        if self.catch_up_pending && !self.catching_up {
            self.start_catch_up(&mut effects);
        }
        effects
    }

    fn reconnect_elapsed(&mut self, timer: TimerId) -> Effects {
        let mut effects = Effects::new();
        if self.reconnect != Some(timer) || self.state != TransportState::BackingOff {
            return effects;
        }
        self.reconnect = None;
        self.state = TransportState::Connecting;
        effects.push(Effect::OpenChannel);
        effects
    }

    fn frame_received(&mut self, text: &str) -> Effects {
        let mut effects = Effects::new();
        if self.state != TransportState::Connected {
            return effects;
        }
        self.awaiting_pong = false;

        if text == PONG {
            return effects;
        }
        let event = match WishlistEvent::parse(text) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(error = %e, "dropping malformed frame");
                return effects;
            }
        };

        if self.catching_up || self.catch_up_pending {
            if self.pending.len() >= self.config.buffer_limit {
                tracing::warn!(
                    limit = self.config.buffer_limit,
                    "live buffer overflow during catch-up, scheduling another round"
                );
                self.pending.clear();
                self.catch_up_pending = true;
            } else {
                self.pending.push(event);
            }
            return effects;
        }

        self.deliver(event, &mut effects);
        effects
    }

    fn catch_up_completed(&mut self, page: EventsPage) -> Effects {
        let mut effects = Effects::new();
        if !self.catching_up || self.state != TransportState::Connected {
            return effects;
        }
        for event in page.events {
            self.deliver(event, &mut effects);
        }

        if page.next_cursor.is_some() {
            effects.push(Effect::FetchSince {
                cursor: self.cursor,
            });
            return effects;
        }

        self.catching_up = false;
        if self.catch_up_pending {
            self.start_catch_up(&mut effects);
            return effects;
        }

        let mut buffered = std::mem::take(&mut self.pending);
        buffered.sort_by_key(|event| event.id);
        for event in buffered {
            self.deliver(event, &mut effects);
        }
        effects
    }

    fn catch_up_failed(&mut self) -> Effects {
        if self.catching_up {
            tracing::debug!(cursor = self.cursor, "catch-up failed, retrying on next tick");
            self.catching_up = false;
            self.catch_up_pending = true;
        }
        Effects::new()
    }

    fn unsubscribe(&mut self) -> Effects {
        let mut effects = Effects::new();
        self.torn_down = true;
        if let Some(timer) = self.liveness.take() {
            effects.push(Effect::CancelTimer(timer));
        }
        if let Some(timer) = self.reconnect.take() {
            effects.push(Effect::CancelTimer(timer));
        }
        if matches!(
            self.state,
            TransportState::Connecting | TransportState::Connected
        ) {
            effects.push(Effect::CloseChannel);
        }
        self.state = TransportState::Disconnected;
        self.reset_catch_up();
        effects
    }

    fn deliver(&mut self, event: WishlistEvent, effects: &mut Effects) {
        if event.id <= self.cursor {
            return;
        }
        self.cursor = event.id;
        effects.push(Effect::Deliver(event));
    }

    fn start_catch_up(&mut self, effects: &mut Effects) {
        self.catching_up = true;
        self.catch_up_pending = false;
        effects.push(Effect::FetchSince {
            cursor: self.cursor,
        });
    }

    fn reset_catch_up(&mut self) {
        self.catching_up = false;
        self.catch_up_pending = false;
        self.pending.clear();
        self.awaiting_pong = false;
    }

    fn back_off(&mut self, effects: &mut Effects) {
        if let Some(timer) = self.liveness.take() {
            effects.push(Effect::CancelTimer(timer));
        }
        self.reset_catch_up();
        self.state = TransportState::BackingOff;

        let after = self.config.reconnect.delay(self.attempts);
        self.attempts = self.attempts.saturating_add(1);
        let timer = self.next_timer(TimerKind::Reconnect);
        self.reconnect = Some(timer);
        effects.push(Effect::ArmTimer { timer, after });
    }

    fn arm_liveness(&mut self, effects: &mut Effects) {
        let timer = self.next_timer(TimerKind::Liveness);
        self.liveness = Some(timer);
        effects.push(Effect::ArmTimer {
            timer,
            after: self.config.ping_interval,
        });
    }

    fn next_timer(&mut self, kind: TimerKind) -> TimerId {
        self.next_generation += 1;
        TimerId {
            kind,
            generation: self.next_generation,
        }
    }
}
