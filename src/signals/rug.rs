use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::core::history::SnapshotStore;
use crate::core::{Metric, PoolSnapshot, RugType, percent_change};

/// Changes of a pool relative to its snapshot one horizon ago.
/// Positive drop figures mean the value fell.
#[derive(Debug, Clone, PartialEq)]
pub struct RugChanges {
    pub liquidity_drop_percent: Option<f64>,
    pub price_drop_percent: Option<f64>,
    pub volume_spike_percent: Option<f64>,
    pub previous: PoolSnapshot,
    pub current: PoolSnapshot,
}

impl RugChanges {
    pub fn between(previous: PoolSnapshot, current: PoolSnapshot) -> Self {
        let change =
            |metric: Metric| percent_change(previous.metric(metric)?, current.metric(metric)?);
        Self {
            liquidity_drop_percent: change(Metric::Liquidity).map(|p| -p),
            price_drop_percent: change(Metric::Price).map(|p| -p),
            volume_spike_percent: change(Metric::Volume1h),
            previous,
            current,
        }
    }
}

/// One collapse pattern.
pub trait RugRule {
    fn rug_type(&self) -> RugType;
    fn matches(&self, changes: &RugChanges) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiquidityDrainRule {
    pub min_drop_percent: f64,
    pub min_initial_liquidity: f64,
    pub max_final_liquidity: f64,
}

impl Default for LiquidityDrainRule {
    fn default() -> Self {
        Self {
            min_drop_percent: 40.0,
            min_initial_liquidity: 10_000.0,
            max_final_liquidity: 1_000.0,
        }
    }
}

impl RugRule for LiquidityDrainRule {
    fn rug_type(&self) -> RugType {
        RugType::LiquidityDrain
    }

    fn matches(&self, c: &RugChanges) -> bool {
        let (Some(drop), Some(initial), Some(last)) =
            (c.liquidity_drop_percent, c.previous.liquidity, c.current.liquidity)
        else {
            return false;
        };
        drop >= self.min_drop_percent
            && initial >= self.min_initial_liquidity
            && last <= self.max_final_liquidity
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceCrashRule {
    pub min_drop_percent: f64,
}

impl Default for PriceCrashRule {
    fn default() -> Self {
        Self {
            min_drop_percent: 60.0,
        }
    }
}

impl RugRule for PriceCrashRule {
    fn rug_type(&self) -> RugType {
        RugType::PriceCrash
    }

    fn matches(&self, c: &RugChanges) -> bool {
        c.price_drop_percent
            .is_some_and(|drop| drop >= self.min_drop_percent)
    }
}

/// Volume spike with a concurrent price drop, on a pool that already
/// traded enough for the spike to mean something.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeDumpRule {
    pub min_volume_spike_percent: f64,
    pub min_price_drop_percent: f64,
    pub min_previous_volume: f64,
}

impl Default for VolumeDumpRule {
    fn default() -> Self {
        Self {
            min_volume_spike_percent: 500.0,
            min_price_drop_percent: 50.0,
            min_previous_volume: 1_000.0,
        }
    }
}

impl RugRule for VolumeDumpRule {
    fn rug_type(&self) -> RugType {
        RugType::VolumeDump
    }

    fn matches(&self, c: &RugChanges) -> bool {
        let (Some(spike), Some(drop), Some(prior)) =
            (c.volume_spike_percent, c.price_drop_percent, c.previous.volume_1h)
        else {
            return false;
        };
        spike >= self.min_volume_spike_percent
            && drop >= self.min_price_drop_percent
            && prior >= self.min_previous_volume
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RugRules {
    pub liquidity_drain: LiquidityDrainRule,
    pub price_crash: PriceCrashRule,
    pub volume_dump: VolumeDumpRule,
}

impl RugRules {
    /// Liquidity drain, then price crash, then volume dump.
    fn ordered(&self) -> [&dyn RugRule; 3] {
        [&self.liquidity_drain, &self.price_crash, &self.volume_dump]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RugMatch {
    pub rug_type: RugType,
    pub changes: RugChanges,
}

pub struct RugClassifier {
    rules: RugRules,
    horizon: Duration,
    max_staleness: Duration,
}

impl RugClassifier {
    pub fn new(rules: RugRules, horizon: Duration, max_staleness: Duration) -> Self {
        Self {
            rules,
            horizon,
            max_staleness,
        }
    }

    /// Compare `current` against the snapshot nearest before one horizon
    /// ago. Without such a snapshot there is no verdict.
    pub fn classify(
        &self,
        store: &SnapshotStore,
        pool_id: &str,
        current: &PoolSnapshot,
    ) -> Option<RugMatch> {
        let previous =
            store.nearest_before(pool_id, current.timestamp - self.horizon, self.max_staleness)?;
        self.evaluate(RugChanges::between(previous, current.clone()))
    }

    pub fn evaluate(&self, changes: RugChanges) -> Option<RugMatch> {
        let rug_type = self
            .rules
            .ordered()
            .into_iter()
            .find(|rule| rule.matches(&changes))?
            .rug_type();
        Some(RugMatch { rug_type, changes })
    }
}
