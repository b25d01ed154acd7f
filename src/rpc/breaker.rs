use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::core::Network;

/// Exponential backoff with ±30% jitter between fetch attempts.
#[derive(Debug, Clone)]
pub struct BackoffStrategy {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub attempt: u32,
}

impl BackoffStrategy {
    /// `2^63` is the last power of two that fits a u64.
    const MAX_ATTEMPT: u32 = 63;

    pub fn new(base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
            attempt: 0,
        }
    }

    /// Delay before the next attempt; advances the attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.capped_delay_ms();
        self.attempt = (self.attempt + 1).min(Self::MAX_ATTEMPT);
        let jitter = rand::thread_rng().gen_range(0.7..=1.3);
        Duration::from_millis((delay as f64 * jitter) as u64)
    }

    fn capped_delay_ms(&self) -> u64 {
        self.base_delay_ms
            .saturating_mul(2u64.saturating_pow(self.attempt))
            .min(self.max_delay_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open { until: Instant },
    /// Cooldown elapsed; one more failure re-opens immediately.
    HalfOpen,
}

#[derive(Debug)]
struct NetworkHealth {
    consecutive_failures: u32,
    state: BreakerState,
}

impl Default for NetworkHealth {
    fn default() -> Self {
        Self {
            consecutive_failures: 0,
            state: BreakerState::Closed,
        }
    }
}

/// Per-network circuit breaker. A network that fails `threshold`
/// consecutive scan cycles is skipped for `cooldown`.
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    networks: Mutex<HashMap<Network, NetworkHealth>>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
            networks: Mutex::new(HashMap::new()),
        }
    }

    /// Whether `network` may be queried at `now`. Moves an expired open
    /// breaker to half-open.
    pub fn allow(&self, network: Network, now: Instant) -> bool {
        let mut networks = self.lock();
        let health = networks.entry(network).or_default();
        match health.state {
            BreakerState::Open { until } if now < until => false,
            BreakerState::Open { .. } => {
                info!(network = %network, "circuit half-open, probing");
                health.state = BreakerState::HalfOpen;
                true
            }
            _ => true,
        }
    }

    pub fn record_success(&self, network: Network) {
        let mut networks = self.lock();
        let health = networks.entry(network).or_default();
        if health.state != BreakerState::Closed {
            info!(network = %network, "circuit closed");
        }
        *health = NetworkHealth::default();
    }

    /// Returns true if this failure opened the breaker.
    pub fn record_failure(&self, network: Network, now: Instant) -> bool {
        let mut networks = self.lock();
        let health = networks.entry(network).or_default();
        health.consecutive_failures = health.consecutive_failures.saturating_add(1);
        let trip = health.state == BreakerState::HalfOpen
            || health.consecutive_failures >= self.threshold;
        if trip {
            health.state = BreakerState::Open {
                until: now + self.cooldown,
            };
            warn!(
                network = %network,
                failures = health.consecutive_failures,
                cooldown_secs = self.cooldown.as_secs(),
                "circuit opened"
            );
        }
        trip
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Network, NetworkHealth>> {
        self.networks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
