use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};

use super::AlertRecord;

/// Per-contract re-alert gate for one scan class.
#[derive(Debug)]
pub struct CooldownRegistry {
    window: Duration,
    last_fired: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl CooldownRegistry {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_fired: Mutex::new(HashMap::new()),
        }
    }

    /// True unless `contract` fired less than one window before `now`.
    pub fn should_fire(&self, contract: &str, now: DateTime<Utc>) -> bool {
        match self.lock().get(contract) {
            Some(prev) => now - *prev >= self.window,
            None => true,
        }
    }

    pub fn record_fired(&self, contract: &str, at: DateTime<Utc>) {
        self.lock().insert(contract.to_string(), at);
    }

    /// Drop entries whose window has passed. Returns how many were removed.
    pub fn prune_expired(&self, now: DateTime<Utc>) -> usize {
        let mut map = self.lock();
        let before = map.len();
        map.retain(|_, fired| now - *fired < self.window);
        before - map.len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, DateTime<Utc>>> {
        self.last_fired.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Latest alert per contract for one scan class, kept for replay and the
/// periodic status report. Independent of the cooldown gate.
#[derive(Debug, Default)]
pub struct AlertLog {
    records: Mutex<HashMap<String, AlertRecord>>,
}

impl AlertLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a fresh detection, replacing any earlier one for the contract.
    pub fn insert(&self, record: AlertRecord) {
        self.lock().insert(record.contract.clone(), record);
    }

    pub fn get(&self, contract: &str) -> Option<AlertRecord> {
        self.lock().get(contract).cloned()
    }

    /// Alerts at or after `since`, newest first.
    pub fn since(&self, since: DateTime<Utc>) -> Vec<AlertRecord> {
        let mut out: Vec<AlertRecord> = self
            .lock()
            .values()
            .filter(|r| r.timestamp >= since)
            .cloned()
            .collect();
        out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        out
    }

    /// Count of alerts at or after `since`, grouped by kind label.
    pub fn count_by_label(&self, since: DateTime<Utc>) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for record in self.lock().values().filter(|r| r.timestamp >= since) {
            *counts.entry(record.kind_label().to_string()).or_insert(0) += 1;
        }
        counts
    }

    /// Drop records older than `cutoff`. Returns how many were removed.
    pub fn prune_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut records = self.lock();
        let before = records.len();
        records.retain(|_, r| r.timestamp >= cutoff);
        before - records.len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, AlertRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AlertDetail, Network, RugDetail, RugType};

    fn rug(contract: &str, at: DateTime<Utc>, rug_type: RugType) -> AlertRecord {
        AlertRecord {
            contract: contract.into(),
            pool_id: format!("pool-{contract}"),
            network: Network::Solana,
            symbol: "RUG".into(),
            timestamp: at,
            detail: AlertDetail::Rug(RugDetail {
                rug_type,
                liquidity_drop_percent: Some(90.0),
                price_drop_percent: Some(10.0),
                volume_spike_percent: None,
                final_liquidity: Some(100.0),
                final_volume_1h: None,
            }),
        }
    }

    #[test]
    fn suppresses_within_window() {
        let registry = CooldownRegistry::new(Duration::hours(1));
        let t = Utc::now();
        assert!(registry.should_fire("c", t));
        registry.record_fired("c", t);
        assert!(!registry.should_fire("c", t + Duration::seconds(1)));
        assert!(!registry.should_fire("c", t + Duration::minutes(59)));
        assert!(registry.should_fire("c", t + Duration::hours(1) + Duration::seconds(1)));
    }

    #[test]
    fn contracts_are_independent() {
        let registry = CooldownRegistry::new(Duration::hours(1));
        let t = Utc::now();
        registry.record_fired("a", t);
        assert!(registry.should_fire("b", t));
    }

    #[test]
    fn zero_window_never_suppresses() {
        let registry = CooldownRegistry::new(Duration::zero());
        let t = Utc::now();
        registry.record_fired("c", t);
        assert!(registry.should_fire("c", t));
    }

    #[test]
    fn prune_expired_removes_old_entries() {
        let registry = CooldownRegistry::new(Duration::hours(1));
        let t = Utc::now();
        registry.record_fired("old", t - Duration::hours(2));
        registry.record_fired("new", t - Duration::minutes(5));
        assert_eq!(registry.prune_expired(t), 1);
        assert_eq!(registry.prune_expired(t), 0);
        assert!(!registry.should_fire("new", t));
    }

    #[test]
    fn alert_log_replaces_per_contract() {
        let log = AlertLog::new();
        let t = Utc::now();
        log.insert(rug("c", t, RugType::PriceCrash));
        log.insert(rug("c", t + Duration::hours(2), RugType::LiquidityDrain));
        assert_eq!(log.since(t - Duration::hours(1)).len(), 1);
        assert_eq!(log.get("c").unwrap().kind_label(), "LIQUIDITY_DRAIN");
    }

    #[test]
    fn alert_log_prunes_past_retention() {
        let log = AlertLog::new();
        let t = Utc::now();
        log.insert(rug("old", t - Duration::days(2), RugType::PriceCrash));
        log.insert(rug("new", t - Duration::minutes(5), RugType::VolumeDump));

        assert_eq!(log.prune_before(t - Duration::days(1)), 1);
        assert!(log.get("old").is_none());
        assert!(log.get("new").is_some());
        assert_eq!(log.prune_before(t - Duration::days(1)), 0);
    }

    #[test]
    fn alert_log_window_queries() {
        let log = AlertLog::new();
        let t = Utc::now();
        log.insert(rug("a", t - Duration::hours(2), RugType::PriceCrash));
        log.insert(rug("b", t - Duration::minutes(10), RugType::PriceCrash));
        log.insert(rug("c", t - Duration::minutes(5), RugType::VolumeDump));

        let since = t - Duration::minutes(45);
        let recent = log.since(since);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].contract, "c");

        let counts = log.count_by_label(since);
        assert_eq!(counts.get("PRICE_CRASH"), Some(&1));
        assert_eq!(counts.get("VOLUME_DUMP"), Some(&1));
    }
}
