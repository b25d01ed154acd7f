use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::core::cooldown::{AlertLog, CooldownRegistry};
use crate::core::history::SnapshotStore;
use crate::core::{
    AlertDetail, AlertRecord, MoonshotDetail, Network, PoolRecord, RugDetail, ScanKind, Timeframe,
};
use crate::error::FetchError;
use crate::notifications::{AlertSink, Broadcast, format};
use crate::rpc::MarketData;
use crate::rpc::breaker::{BackoffStrategy, CircuitBreaker};
use crate::rpc::rate_limit::{Priority, RateLimiter, RateLimiterStatus};
use crate::signals::{MoonshotClassifier, RugClassifier};

/// Messages from the scan tasks to the dispatcher.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// Already recorded in the alert log and cooldown registry.
    Alert(AlertRecord),
    Broadcast(Broadcast),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    Idle,
    Fetching,
    Processing,
    Sleeping,
}

/// Outcome of one pass over all configured networks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub networks_ok: usize,
    pub networks_failed: usize,
    /// Skipped because their circuit breaker was open.
    pub networks_skipped: usize,
    pub pools_checked: usize,
    pub alerts: usize,
}

impl CycleReport {
    /// No network produced data this cycle.
    pub fn all_failed(&self) -> bool {
        self.networks_ok == 0 && self.networks_failed + self.networks_skipped > 0
    }
}

#[derive(Debug, Clone, Copy)]
enum Query {
    Trending(Timeframe),
    NewPools,
}

/// Owns all scanner state and drives both scan classes.
pub struct Monitor {
    config: Config,
    market: Arc<dyn MarketData>,
    limiter: RateLimiter,
    store: SnapshotStore,
    moonshot: MoonshotClassifier,
    rug: RugClassifier,
    moonshot_cooldown: CooldownRegistry,
    rug_cooldown: CooldownRegistry,
    moonshot_log: AlertLog,
    rug_log: AlertLog,
    alert_retention: chrono::Duration,
    breaker: CircuitBreaker,
    phases: Mutex<HashMap<ScanKind, ScanPhase>>,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl Monitor {
    pub fn new(
        config: Config,
        market: Arc<dyn MarketData>,
        outbound: mpsc::UnboundedSender<Outbound>,
    ) -> Self {
        let p = &config.provider;
        let limiter = RateLimiter::new(
            p.rate_limit_calls,
            Duration::from_secs(p.rate_limit_window_secs),
        );
        let breaker = CircuitBreaker::new(
            p.breaker_failure_threshold,
            Duration::from_secs(p.breaker_cooldown_secs),
        );
        let store = SnapshotStore::new(
            config.history.capacity,
            chrono::Duration::seconds(config.history.stale_after_secs),
        );
        let moonshot = MoonshotClassifier::new(
            config.moonshot.tiers.clone(),
            config.moonshot.windows.clone(),
        );
        let rug = RugClassifier::new(
            config.rug.rules,
            chrono::Duration::seconds(config.rug.horizon_secs),
            chrono::Duration::seconds(config.rug.max_staleness_secs),
        );
        let moonshot_cooldown =
            CooldownRegistry::new(chrono::Duration::seconds(config.moonshot.cooldown_secs));
        let rug_cooldown =
            CooldownRegistry::new(chrono::Duration::seconds(config.rug.cooldown_secs));
        let alert_retention = chrono::Duration::seconds(config.history.alert_retention_secs);

        Self {
            config,
            market,
            limiter,
            store,
            moonshot,
            rug,
            moonshot_cooldown,
            rug_cooldown,
            moonshot_log: AlertLog::new(),
            rug_log: AlertLog::new(),
            alert_retention,
            breaker,
            phases: Mutex::new(HashMap::new()),
            outbound,
        }
    }

    fn cooldown(&self, kind: ScanKind) -> &CooldownRegistry {
        match kind {
            ScanKind::Moonshot => &self.moonshot_cooldown,
            ScanKind::Rug => &self.rug_cooldown,
        }
    }

    fn log(&self, kind: ScanKind) -> &AlertLog {
        match kind {
            ScanKind::Moonshot => &self.moonshot_log,
            ScanKind::Rug => &self.rug_log,
        }
    }

    fn set_phase(&self, kind: ScanKind, phase: ScanPhase) {
        self.phases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind, phase);
    }

    pub fn scan_phase(&self, kind: ScanKind) -> ScanPhase {
        self.phases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .copied()
            .unwrap_or(ScanPhase::Idle)
    }

    /// Most recent alert of `kind` for `contract`.
    #[allow(dead_code)]
    pub fn latest_alert(&self, kind: ScanKind, contract: &str) -> Option<AlertRecord> {
        self.log(kind).get(contract)
    }

    /// Alerts of `kind` at or after `since`, newest first.
    #[allow(dead_code)]
    pub fn recent_alerts(&self, kind: ScanKind, since: DateTime<Utc>) -> Vec<AlertRecord> {
        self.log(kind).since(since)
    }

    pub fn rate_limiter_status(&self) -> RateLimiterStatus {
        self.limiter.status()
    }

    fn queries(&self, kind: ScanKind) -> Vec<Query> {
        let mut queries: Vec<Query> = self
            .config
            .monitor
            .trending_durations
            .iter()
            .map(|d| Query::Trending(*d))
            .collect();
        if kind == ScanKind::Moonshot {
            queries.push(Query::NewPools);
        }
        queries
    }

    fn priority(kind: ScanKind, query: Query) -> Priority {
        match (kind, query) {
            (ScanKind::Rug, _) => Priority::High,
            (ScanKind::Moonshot, Query::Trending(_)) => Priority::Normal,
            (ScanKind::Moonshot, Query::NewPools) => Priority::Low,
        }
    }

    async fn run_query(
        &self,
        network: Network,
        query: Query,
    ) -> Result<Vec<PoolRecord>, FetchError> {
        let monitor = &self.config.monitor;
        match query {
            Query::Trending(duration) => {
                self.market
                    .list_trending_pools(network, duration, monitor.trending_limit)
                    .await
            }
            Query::NewPools => {
                self.market
                    .list_new_pools(network, monitor.new_pools_limit)
                    .await
            }
        }
    }

    /// One provider call through the rate limiter, retried with jittered
    /// backoff while the error is transient.
    async fn fetch(
        &self,
        kind: ScanKind,
        network: Network,
        query: Query,
    ) -> Result<Vec<PoolRecord>, FetchError> {
        let p = &self.config.provider;
        let mut backoff = BackoffStrategy::new(p.retry_base_delay_ms, p.retry_max_delay_ms);
        let mut attempt = 1;
        loop {
            self.limiter.acquire(Self::priority(kind, query)).await;
            match self.run_query(network, query).await {
                Ok(pools) => return Ok(pools),
                Err(e) if attempt < p.max_fetch_attempts && e.is_retryable() => {
                    let delay = backoff.next_delay();
                    debug!(network = %network, ?query, attempt, ?delay, "retrying fetch: {e}");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Candidate pools for one network, deduplicated by pool id. Fails only
    /// when every query failed.
    async fn fetch_candidates(
        &self,
        kind: ScanKind,
        network: Network,
    ) -> Result<Vec<PoolRecord>, FetchError> {
        let mut seen = HashSet::new();
        let mut pools = Vec::new();
        let mut last_err = None;
        let mut any_ok = false;

        for query in self.queries(kind) {
            match self.fetch(kind, network, query).await {
                Ok(batch) => {
                    any_ok = true;
                    for pool in batch {
                        if seen.insert(pool.pool_id.clone()) {
                            pools.push(pool);
                        }
                    }
                }
                Err(e) => {
                    debug!(network = %network, ?query, "query failed: {e}");
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(e) if !any_ok => Err(e),
            _ => Ok(pools),
        }
    }

    /// Append, classify, gate, record, then hand off for dispatch.
    fn process_pool(
        &self,
        kind: ScanKind,
        pool: &PoolRecord,
        now: DateTime<Utc>,
    ) -> Option<AlertRecord> {
        let snapshot = pool.snapshot(now);
        self.store.append(&pool.pool_id, snapshot.clone());

        let cooldown = self.cooldown(kind);
        if !cooldown.should_fire(&pool.contract, now) {
            return None;
        }

        let detail = match kind {
            ScanKind::Moonshot => {
                let m = self.moonshot.classify(&self.store, pool, &snapshot)?;
                AlertDetail::Moonshot(MoonshotDetail {
                    tier: m.tier.label,
                    emoji: m.tier.emoji,
                    timeframe: m.best.timeframe,
                    price_change_percent: m.best.percent,
                    price_usd: pool.price_usd,
                    liquidity_usd: m.metrics.liquidity,
                    volume_24h: m.metrics.volume_24h,
                    tx_count_24h: m.metrics.tx_count_24h,
                    market_cap_usd: m.metrics.market_cap,
                })
            }
            ScanKind::Rug => {
                let m = self.rug.classify(&self.store, &pool.pool_id, &snapshot)?;
                AlertDetail::Rug(RugDetail {
                    rug_type: m.rug_type,
                    liquidity_drop_percent: m.changes.liquidity_drop_percent,
                    price_drop_percent: m.changes.price_drop_percent,
                    volume_spike_percent: m.changes.volume_spike_percent,
                    final_liquidity: m.changes.current.liquidity,
                    final_volume_1h: m.changes.current.volume_1h,
                })
            }
        };

        let alert = AlertRecord {
            contract: pool.contract.clone(),
            pool_id: pool.pool_id.clone(),
            network: pool.network,
            symbol: pool.symbol.clone(),
            timestamp: now,
            detail,
        };
        cooldown.record_fired(&alert.contract, now);
        self.log(kind).insert(alert.clone());
        info!(
            kind = %kind,
            network = %alert.network,
            contract = %alert.contract,
            symbol = %alert.symbol,
            label = alert.kind_label(),
            "alert raised"
        );

        if self.outbound.send(Outbound::Alert(alert.clone())).is_err() {
            warn!("dispatch channel closed, alert recorded but not sent");
        }
        Some(alert)
    }

    /// One pass over every configured network. A failing network is logged
    /// and skipped; the rest of the cycle continues.
    ///
    /// `started` is the wall-clock time the cycle began. Each network's pools
    /// are stamped with the time their fetch completed, measured from there.
    pub async fn scan_cycle(&self, kind: ScanKind, started: DateTime<Utc>) -> CycleReport {
        let clock = Instant::now();
        let mut report = CycleReport::default();

        for &network in &self.config.monitor.networks {
            if !self.breaker.allow(network, Instant::now()) {
                debug!(kind = %kind, network = %network, "circuit open, skipping");
                report.networks_skipped += 1;
                continue;
            }

            self.set_phase(kind, ScanPhase::Fetching);
            let pools = match self.fetch_candidates(kind, network).await {
                Ok(pools) => {
                    self.breaker.record_success(network);
                    pools
                }
                Err(e) => {
                    warn!(kind = %kind, network = %network, "network fetch failed: {e}");
                    self.breaker.record_failure(network, Instant::now());
                    report.networks_failed += 1;
                    continue;
                }
            };

            self.set_phase(kind, ScanPhase::Processing);
            let now = wall_clock(started, clock);
            report.networks_ok += 1;
            report.pools_checked += pools.len();
            for pool in &pools {
                if self.process_pool(kind, pool, now).is_some() {
                    report.alerts += 1;
                }
            }
        }

        if kind == ScanKind::Rug {
            let now = wall_clock(started, clock);
            let evicted = self.store.evict_stale(now);
            let expired = self.moonshot_cooldown.prune_expired(now)
                + self.rug_cooldown.prune_expired(now);
            let cutoff = now - self.alert_retention;
            let dropped =
                self.moonshot_log.prune_before(cutoff) + self.rug_log.prune_before(cutoff);
            if evicted > 0 || expired > 0 || dropped > 0 {
                debug!(
                    evicted,
                    expired,
                    dropped,
                    pools = self.store.pool_count(),
                    "state swept"
                );
            }
        }

        report
    }

    /// Runs `kind` scans until shutdown. A cycle in flight at shutdown is
    /// abandoned; the limiter drops its waiting ticket.
    pub async fn run_scan_loop(
        self: Arc<Self>,
        kind: ScanKind,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let monitor = &self.config.monitor;
        let interval = Duration::from_secs(match kind {
            ScanKind::Moonshot => monitor.moonshot_scan_interval_secs,
            ScanKind::Rug => monitor.rug_scan_interval_secs,
        });
        let backoff = Duration::from_secs(monitor.failed_cycle_backoff_secs).max(interval);
        info!(kind = %kind, interval_secs = interval.as_secs(), "scan loop started");

        while !*shutdown.borrow() {
            let report = tokio::select! {
                r = self.scan_cycle(kind, Utc::now()) => r,
                _ = shutdown.changed() => break,
            };
            info!(
                kind = %kind,
                ok = report.networks_ok,
                failed = report.networks_failed,
                skipped = report.networks_skipped,
                pools = report.pools_checked,
                alerts = report.alerts,
                remaining_calls = self.limiter.remaining_calls(),
                "scan cycle complete"
            );

            let pause = if report.all_failed() {
                warn!(
                    kind = %kind,
                    backoff_secs = backoff.as_secs(),
                    "every network failed, backing off"
                );
                backoff
            } else {
                interval
            };
            self.set_phase(kind, ScanPhase::Sleeping);
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = shutdown.changed() => break,
            }
        }

        self.set_phase(kind, ScanPhase::Idle);
        info!(kind = %kind, "scan loop stopped");
    }

    /// Detection counts over the configured report window ending at `now`.
    pub fn status_report(&self, now: DateTime<Utc>) -> Broadcast {
        let minutes = self.config.monitor.status_report_window_minutes;
        let since = now - chrono::Duration::minutes(minutes);
        let moonshots = self.moonshot_log.count_by_label(since);
        let rugs = self.rug_log.since(since).len();
        format::status_report(
            &self.config.moonshot.tiers,
            &moonshots,
            rugs,
            minutes,
            &self.config.monitor.networks,
        )
    }

    pub async fn run_status_reporter(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let period = Duration::from_secs(self.config.monitor.status_report_interval_secs.max(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        info!(interval_secs = period.as_secs(), "status reporter started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            debug!(
                moonshot = ?self.scan_phase(ScanKind::Moonshot),
                rug = ?self.scan_phase(ScanKind::Rug),
                "queueing status report"
            );
            let report = self.status_report(Utc::now());
            if self.outbound.send(Outbound::Broadcast(report)).is_err() {
                break;
            }
        }
    }

    /// Occasional unrelated broadcast, when enabled.
    pub async fn run_idle_broadcaster(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let idle = &self.config.idle_broadcast;
        if !idle.enabled || idle.messages.is_empty() {
            return;
        }
        let period = Duration::from_secs(idle.interval_secs.max(1));
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            let picked = {
                let mut rng = rand::thread_rng();
                idle.messages.choose(&mut rng).cloned()
            };
            let Some(text) = picked else {
                break;
            };
            if self.outbound.send(Outbound::Broadcast(Broadcast::text(text))).is_err() {
                break;
            }
        }
    }
}

/// `started` advanced by the monotonic time elapsed since `since`.
fn wall_clock(started: DateTime<Utc>, since: Instant) -> DateTime<Utc> {
    chrono::Duration::from_std(since.elapsed()).map_or(started, |elapsed| started + elapsed)
}

/// Formats and delivers outbound messages until every sender is gone.
/// Delivery failures are logged; the alert stays recorded.
pub async fn run_dispatcher(mut rx: mpsc::UnboundedReceiver<Outbound>, sink: Arc<dyn AlertSink>) {
    let mut sent: u64 = 0;
    while let Some(out) = rx.recv().await {
        let message = match out {
            Outbound::Alert(record) => format::alert_broadcast(&record),
            Outbound::Broadcast(b) => b,
        };
        match sink.broadcast(&message).await {
            Ok(()) => sent += 1,
            Err(e) => warn!("dispatch failed: {e}"),
        }
    }
    info!(sent, "dispatcher stopped");
}
