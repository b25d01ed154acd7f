use std::collections::{BTreeSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Notify;
use tokio::time::{Instant, sleep_until};

/// Wake-up order among callers waiting on a full window. Earlier variants
/// go first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    High,
    Normal,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimiterStatus {
    pub remaining_calls: usize,
    pub max_calls_per_window: usize,
}

type Ticket = (Priority, u64);

#[derive(Debug)]
struct Window {
    calls: VecDeque<Instant>,
    waiting: BTreeSet<Ticket>,
    next_seq: u64,
}

impl Window {
    fn prune(&mut self, now: Instant, span: Duration) {
        while let Some(oldest) = self.calls.front() {
            if now.duration_since(*oldest) >= span {
                self.calls.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Sliding-window limiter: at most `max_calls` completions of
/// [`acquire`](Self::acquire) within any span of `window`.
#[derive(Debug)]
pub struct RateLimiter {
    max_calls: usize,
    window: Duration,
    state: Mutex<Window>,
    wakeup: Notify,
}

/// Removes a waiter's ticket however `acquire` exits, so a cancelled
/// caller never blocks the queue.
struct TicketGuard<'a> {
    limiter: &'a RateLimiter,
    ticket: Ticket,
}

impl Drop for TicketGuard<'_> {
    fn drop(&mut self) {
        self.limiter.lock().waiting.remove(&self.ticket);
        self.limiter.wakeup.notify_waiters();
    }
}

impl RateLimiter {
    pub fn new(max_calls: usize, window: Duration) -> Self {
        Self {
            max_calls: max_calls.max(1),
            window,
            state: Mutex::new(Window {
                calls: VecDeque::with_capacity(max_calls),
                waiting: BTreeSet::new(),
                next_seq: 0,
            }),
            wakeup: Notify::new(),
        }
    }

    /// Wait for a free slot and reserve it. Only the head of the waiting
    /// queue may take a slot; everyone else sleeps until the head changes.
    pub async fn acquire(&self, priority: Priority) {
        let ticket = {
            let mut state = self.lock();
            let ticket = (priority, state.next_seq);
            state.next_seq += 1;
            state.waiting.insert(ticket);
            ticket
        };
        let _guard = TicketGuard {
            limiter: self,
            ticket,
        };

        loop {
            let notified = self.wakeup.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let deadline = {
                let mut state = self.lock();
                let now = Instant::now();
                state.prune(now, self.window);
                if state.waiting.first() != Some(&ticket) {
                    None
                } else if state.calls.len() < self.max_calls {
                    state.calls.push_back(now);
                    state.waiting.remove(&ticket);
                    return;
                } else {
                    state.calls.front().map(|oldest| *oldest + self.window)
                }
            };

            match deadline {
                Some(deadline) => {
                    tokio::select! {
                        _ = sleep_until(deadline) => {}
                        _ = &mut notified => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    pub fn remaining_calls(&self) -> usize {
        let mut state = self.lock();
        state.prune(Instant::now(), self.window);
        self.max_calls.saturating_sub(state.calls.len())
    }

    pub fn status(&self) -> RateLimiterStatus {
        RateLimiterStatus {
            remaining_calls: self.remaining_calls(),
            max_calls_per_window: self.max_calls,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Window> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn never_exceeds_capacity_in_any_window() {
        let limiter = RateLimiter::new(3, Duration::from_secs(10));
        let mut completed = Vec::new();
        for _ in 0..10 {
            limiter.acquire(Priority::Normal).await;
            completed.push(Instant::now());
        }
        for pair in completed.windows(4) {
            assert!(pair[3].duration_since(pair[0]) >= Duration::from_secs(10));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_respect_capacity() {
        let limiter = Arc::new(RateLimiter::new(2, Duration::from_secs(5)));
        let mut handles = Vec::new();
        for _ in 0..6 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire(Priority::Normal).await;
                Instant::now()
            }));
        }
        let mut times = Vec::new();
        for h in handles {
            times.push(h.await.unwrap());
        }
        times.sort();
        for pair in times.windows(3) {
            assert!(pair[2].duration_since(pair[0]) >= Duration::from_secs(5));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn high_priority_wakes_first() {
        let limiter = Arc::new(RateLimiter::new(1, Duration::from_secs(10)));
        limiter.acquire(Priority::Normal).await;

        let order = Arc::new(Mutex::new(Vec::new()));
        let low = {
            let (limiter, order) = (limiter.clone(), order.clone());
            tokio::spawn(async move {
                limiter.acquire(Priority::Low).await;
                order.lock().unwrap().push("low");
            })
        };
        tokio::task::yield_now().await;
        let high = {
            let (limiter, order) = (limiter.clone(), order.clone());
            tokio::spawn(async move {
                limiter.acquire(Priority::High).await;
                order.lock().unwrap().push("high");
            })
        };
        low.await.unwrap();
        high.await.unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["high", "low"]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_waiter_does_not_block_queue() {
        let limiter = RateLimiter::new(1, Duration::from_secs(10));
        limiter.acquire(Priority::Normal).await;
        let start = Instant::now();

        let abandoned =
            tokio::time::timeout(Duration::from_secs(1), limiter.acquire(Priority::High)).await;
        assert!(abandoned.is_err());

        limiter.acquire(Priority::Low).await;
        assert!(Instant::now().duration_since(start) >= Duration::from_secs(10));
        assert_eq!(limiter.remaining_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn status_reports_headroom() {
        let limiter = RateLimiter::new(5, Duration::from_secs(60));
        limiter.acquire(Priority::Normal).await;
        limiter.acquire(Priority::Normal).await;
        assert_eq!(
            limiter.status(),
            RateLimiterStatus {
                remaining_calls: 3,
                max_calls_per_window: 5
            }
        );
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(limiter.remaining_calls(), 5);
    }
}
