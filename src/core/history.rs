use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};

use super::{Metric, PoolSnapshot, percent_change};

#[derive(Debug)]
struct PoolHistory {
    /// Oldest first, ordered by timestamp.
    snapshots: VecDeque<PoolSnapshot>,
    last_append: DateTime<Utc>,
}

/// Bounded per-pool snapshot history, shared by both scan classes.
///
/// Every operation takes the single map lock for its whole duration, so an
/// eviction sweep can never interleave with an append to the same pool.
#[derive(Debug)]
pub struct SnapshotStore {
    pools: Mutex<HashMap<String, PoolHistory>>,
    capacity: usize,
    stale_after: Duration,
}

impl SnapshotStore {
    pub fn new(capacity: usize, stale_after: Duration) -> Self {
        Self {
            pools: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            stale_after,
        }
    }

    /// Record the latest observation for a pool, dropping the oldest
    /// snapshots beyond the retention bound.
    pub fn append(&self, pool_id: &str, snapshot: PoolSnapshot) {
        let mut pools = self.lock();
        let history = pools
            .entry(pool_id.to_string())
            .or_insert_with(|| PoolHistory {
                snapshots: VecDeque::with_capacity(self.capacity + 1),
                last_append: snapshot.timestamp,
            });

        // Two scan tasks may capture `now` in one order and append in the
        // other; insert by timestamp so lookups stay ordered.
        let pos = history
            .snapshots
            .iter()
            .rposition(|s| s.timestamp <= snapshot.timestamp)
            .map_or(0, |i| i + 1);
        history.last_append = history.last_append.max(snapshot.timestamp);
        history.snapshots.insert(pos, snapshot);

        while history.snapshots.len() > self.capacity {
            history.snapshots.pop_front();
        }
    }

    /// Most recent snapshot with `timestamp <= target`, unless it is more
    /// than `max_age` older than `target`.
    pub fn nearest_before(
        &self,
        pool_id: &str,
        target: DateTime<Utc>,
        max_age: Duration,
    ) -> Option<PoolSnapshot> {
        let pools = self.lock();
        let history = pools.get(pool_id)?;
        let candidate = history
            .snapshots
            .iter()
            .rev()
            .find(|s| s.timestamp <= target)?;
        if target - candidate.timestamp > max_age {
            return None;
        }
        Some(candidate.clone())
    }

    /// Signed percent change of `metric` between the snapshot nearest
    /// before `now - lookback` and `current`. `None` means unavailable,
    /// which is distinct from an unchanged `Some(0.0)`.
    pub fn delta_percent(
        &self,
        pool_id: &str,
        current: &PoolSnapshot,
        lookback: Duration,
        max_age: Duration,
        metric: Metric,
    ) -> Option<f64> {
        let then = self.nearest_before(pool_id, current.timestamp - lookback, max_age)?;
        percent_change(then.metric(metric)?, current.metric(metric)?)
    }

    /// Drop histories that have not been appended to within the staleness
    /// threshold. Returns the number of pools evicted.
    pub fn evict_stale(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.stale_after;
        let mut pools = self.lock();
        let before = pools.len();
        pools.retain(|_, h| h.last_append >= cutoff);
        before - pools.len()
    }

    pub fn pool_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PoolHistory>> {
        // Mutations are single insert/pop steps; a poisoned map is still consistent.
        self.pools.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Network;

    fn snap(t0: DateTime<Utc>, secs: i64, price: f64, liquidity: f64) -> PoolSnapshot {
        PoolSnapshot {
            timestamp: t0 + Duration::seconds(secs),
            contract: "0xabc".into(),
            network: Network::Eth,
            symbol: "ABC".into(),
            price: Some(price),
            liquidity: Some(liquidity),
            volume_1h: Some(1_000.0),
            volume_24h: Some(10_000.0),
        }
    }

    fn store() -> SnapshotStore {
        SnapshotStore::new(10, Duration::minutes(10))
    }

    fn history_len(store: &SnapshotStore, pool_id: &str) -> usize {
        store.lock().get(pool_id).map_or(0, |h| h.snapshots.len())
    }

    #[test]
    fn nearest_before_never_returns_newer() {
        let store = store();
        let t0 = Utc::now();
        // Deliberately out of order.
        for secs in [0, 130, 60, 20, 190, 100] {
            store.append("p", snap(t0, secs, 1.0, 1.0));
        }
        for target in [-5, 0, 10, 59, 60, 61, 125, 200, 400] {
            let target_time = t0 + Duration::seconds(target);
            if let Some(found) = store.nearest_before("p", target_time, Duration::days(1)) {
                assert!(found.timestamp <= target_time, "target {target}");
            }
        }
        let found = store
            .nearest_before("p", t0 + Duration::seconds(125), Duration::days(1))
            .unwrap();
        assert_eq!(found.timestamp, t0 + Duration::seconds(100));
    }

    #[test]
    fn nearest_before_respects_max_age() {
        let store = store();
        let t0 = Utc::now();
        store.append("p", snap(t0, 0, 1.0, 1.0));
        let target = t0 + Duration::seconds(200);
        assert!(store.nearest_before("p", target, Duration::seconds(60)).is_none());
        assert!(store.nearest_before("p", target, Duration::seconds(300)).is_some());
    }

    #[test]
    fn nearest_before_unknown_pool() {
        assert!(store().nearest_before("nope", Utc::now(), Duration::days(1)).is_none());
    }

    #[test]
    fn retention_bound_keeps_newest() {
        let store = SnapshotStore::new(3, Duration::minutes(10));
        let t0 = Utc::now();
        for secs in 0..5 {
            store.append("p", snap(t0, secs * 60, secs as f64 + 1.0, 1.0));
        }
        assert_eq!(history_len(&store, "p"), 3);
        // Oldest two (0s, 60s) are gone.
        assert!(store
            .nearest_before("p", t0 + Duration::seconds(90), Duration::days(1))
            .is_none());
    }

    #[test]
    fn delta_percent_signed_and_zero() {
        let store = store();
        let t0 = Utc::now();
        store.append("p", snap(t0, 0, 2.0, 100.0));
        let up = snap(t0, 65, 3.0, 100.0);
        let flat = snap(t0, 65, 2.0, 100.0);
        let max_age = Duration::seconds(60);
        let lookback = Duration::seconds(60);
        assert_eq!(
            store.delta_percent("p", &up, lookback, max_age, Metric::Price),
            Some(50.0)
        );
        assert_eq!(
            store.delta_percent("p", &flat, lookback, max_age, Metric::Price),
            Some(0.0)
        );
    }

    #[test]
    fn delta_percent_unavailable_without_history() {
        let store = store();
        let t0 = Utc::now();
        let current = snap(t0, 0, 1.0, 1.0);
        store.append("p", current.clone());
        assert_eq!(
            store.delta_percent(
                "p",
                &current,
                Duration::minutes(5),
                Duration::minutes(2),
                Metric::Price
            ),
            None
        );
    }

    #[test]
    fn delta_percent_unavailable_when_field_absent() {
        let store = store();
        let t0 = Utc::now();
        let mut old = snap(t0, 0, 1.0, 1.0);
        old.price = None;
        store.append("p", old);
        let current = snap(t0, 60, 2.0, 1.0);
        assert_eq!(
            store.delta_percent(
                "p",
                &current,
                Duration::seconds(60),
                Duration::seconds(60),
                Metric::Price
            ),
            None
        );
    }

    #[test]
    fn evict_stale_drops_idle_pools() {
        let store = SnapshotStore::new(10, Duration::minutes(10));
        let t0 = Utc::now();
        store.append("old", snap(t0, 0, 1.0, 1.0));
        store.append("fresh", snap(t0, 900, 1.0, 1.0));
        let evicted = store.evict_stale(t0 + Duration::seconds(1000));
        assert_eq!(evicted, 1);
        assert_eq!(store.pool_count(), 1);
        assert_eq!(history_len(&store, "fresh"), 1);
    }
}
