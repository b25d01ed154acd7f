use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::core::history::SnapshotStore;
use crate::core::{Metric, PoolRecord, PoolSnapshot, Timeframe};

/// Thresholds for one moonshot tier. A pool qualifies only when every
/// threshold holds at once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierRule {
    pub label: String,
    #[serde(default)]
    pub emoji: String,
    pub min_liquidity: f64,
    pub min_price_change_percent: f64,
    pub min_volume_24h: f64,
    pub min_tx_count_24h: u64,
    pub min_market_cap: f64,
}

/// Current figures a tier rule is checked against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolMetrics {
    pub liquidity: Option<f64>,
    pub best_price_change: f64,
    pub volume_24h: Option<f64>,
    pub tx_count_24h: Option<u64>,
    pub market_cap: Option<f64>,
}

/// An unknown figure satisfies a threshold only when the threshold is not
/// positive.
fn at_least(value: Option<f64>, min: f64) -> bool {
    match value {
        Some(v) => v >= min,
        None => min <= 0.0,
    }
}

impl TierRule {
    pub fn matches(&self, m: &PoolMetrics) -> bool {
        at_least(m.liquidity, self.min_liquidity)
            && m.best_price_change >= self.min_price_change_percent
            && at_least(m.volume_24h, self.min_volume_24h)
            && at_least(m.tx_count_24h.map(|n| n as f64), self.min_tx_count_24h as f64)
            && at_least(m.market_cap, self.min_market_cap)
    }
}

/// Ordered most valuable first.
pub fn default_tiers() -> Vec<TierRule> {
    vec![
        TierRule {
            label: "POTENTIAL 100X".into(),
            emoji: "🚀".into(),
            min_liquidity: 10_000.0,
            min_price_change_percent: 75.0,
            min_volume_24h: 15_000.0,
            min_tx_count_24h: 75,
            min_market_cap: 50_000.0,
        },
        TierRule {
            label: "POTENTIAL 10X".into(),
            emoji: "⚡".into(),
            min_liquidity: 20_000.0,
            min_price_change_percent: 30.0,
            min_volume_24h: 30_000.0,
            min_tx_count_24h: 100,
            min_market_cap: 100_000.0,
        },
        TierRule {
            label: "POTENTIAL 2X".into(),
            emoji: "💰".into(),
            min_liquidity: 75_000.0,
            min_price_change_percent: 20.0,
            min_volume_24h: 75_000.0,
            min_tx_count_24h: 150,
            min_market_cap: 500_000.0,
        },
    ]
}

/// A look-back window and how far the matched snapshot may lag its target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LookbackWindow {
    pub timeframe: Timeframe,
    pub max_staleness_secs: u64,
}

pub fn default_windows() -> Vec<LookbackWindow> {
    vec![
        LookbackWindow {
            timeframe: Timeframe::M1,
            max_staleness_secs: 60,
        },
        LookbackWindow {
            timeframe: Timeframe::M5,
            max_staleness_secs: 120,
        },
        LookbackWindow {
            timeframe: Timeframe::H1,
            max_staleness_secs: 900,
        },
        LookbackWindow {
            timeframe: Timeframe::H24,
            max_staleness_secs: 7200,
        },
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveSource {
    History,
    Provider,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceMove {
    pub timeframe: Timeframe,
    pub percent: f64,
    pub source: MoveSource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MoonshotMatch {
    pub tier: TierRule,
    pub best: PriceMove,
    pub metrics: PoolMetrics,
}

pub struct MoonshotClassifier {
    tiers: Vec<TierRule>,
    windows: Vec<LookbackWindow>,
}

impl MoonshotClassifier {
    pub fn new(tiers: Vec<TierRule>, windows: Vec<LookbackWindow>) -> Self {
        Self { tiers, windows }
    }

    /// Price move per window: from history when a usable snapshot exists,
    /// otherwise the provider's figure for the same window. Windows with
    /// neither are left out.
    pub fn price_moves(
        &self,
        store: &SnapshotStore,
        record: &PoolRecord,
        current: &PoolSnapshot,
    ) -> Vec<PriceMove> {
        self.windows
            .iter()
            .filter_map(|w| {
                let observed = store.delta_percent(
                    &record.pool_id,
                    current,
                    w.timeframe.duration(),
                    Duration::seconds(w.max_staleness_secs as i64),
                    Metric::Price,
                );
                match observed {
                    Some(percent) => Some(PriceMove {
                        timeframe: w.timeframe,
                        percent,
                        source: MoveSource::History,
                    }),
                    None => record
                        .price_change_percent
                        .get(w.timeframe)
                        .filter(|p| p.is_finite())
                        .map(|percent| PriceMove {
                            timeframe: w.timeframe,
                            percent,
                            source: MoveSource::Provider,
                        }),
                }
            })
            .collect()
    }

    /// Largest move across all windows; ties keep the shorter window.
    pub fn best_move(
        &self,
        store: &SnapshotStore,
        record: &PoolRecord,
        current: &PoolSnapshot,
    ) -> Option<PriceMove> {
        self.price_moves(store, record, current)
            .into_iter()
            .fold(None, |best: Option<PriceMove>, m| match best {
                Some(b) if b.percent >= m.percent => Some(b),
                _ => Some(m),
            })
    }

    /// First tier, in configured order, whose thresholds all hold.
    pub fn match_tier(&self, metrics: &PoolMetrics) -> Option<&TierRule> {
        self.tiers.iter().find(|t| t.matches(metrics))
    }

    pub fn classify(
        &self,
        store: &SnapshotStore,
        record: &PoolRecord,
        current: &PoolSnapshot,
    ) -> Option<MoonshotMatch> {
        let best = self.best_move(store, record, current)?;
        let metrics = PoolMetrics {
            liquidity: record.liquidity_usd,
            best_price_change: best.percent,
            volume_24h: record.volume_usd.h24,
            tx_count_24h: record.tx_count_24h,
            market_cap: record.market_cap_usd,
        };
        let tier = self.match_tier(&metrics)?;
        Some(MoonshotMatch {
            tier: tier.clone(),
            best,
            metrics,
        })
    }
}
