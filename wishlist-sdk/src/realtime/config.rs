use std::time::Duration;

/// How long to wait before reconnecting after the `attempt`-th consecutive
/// failure (0-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    Fixed(Duration),
    /// `base * 2^attempt`, capped at `max`.
    Exponential { base: Duration, max: Duration },
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy::Fixed(Duration::from_secs(2))
    }
}

impl ReconnectPolicy {
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            ReconnectPolicy::Fixed(delay) => delay,
            ReconnectPolicy::Exponential { base, max } => {
                let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
                base.checked_mul(factor).map_or(max, |d| d.min(max))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Interval of the liveness timer while connected.
    pub ping_interval: Duration,
    pub reconnect: ReconnectPolicy,
    /// Maximum number of live frames held back while a catch-up is running.
    /// On overflow the buffer is discarded and another catch-up round runs.
    pub buffer_limit: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(10),
            reconnect: ReconnectPolicy::default(),
            buffer_limit: 1024,
        }
    }
}
