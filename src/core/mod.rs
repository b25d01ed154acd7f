pub mod cooldown;
pub mod history;
pub mod pipeline;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Chains the scanner knows how to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Eth,
    Solana,
    Bsc,
    Base,
}

impl Network {
    pub const ALL: [Network; 4] = [Network::Eth, Network::Solana, Network::Bsc, Network::Base];

    /// Provider path segment.
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Eth => "eth",
            Network::Solana => "solana",
            Network::Bsc => "bsc",
            Network::Base => "base",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Network::Eth => "Ethereum",
            Network::Solana => "Solana",
            Network::Bsc => "BNB Smart Chain",
            Network::Base => "Base",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "eth" | "ethereum" => Ok(Network::Eth),
            "solana" | "sol" => Ok(Network::Solana),
            "bsc" => Ok(Network::Bsc),
            "base" => Ok(Network::Base),
            other => Err(format!("unsupported network: {other}")),
        }
    }
}

/// Standard provider windows. Used both as trending buckets and as
/// look-back windows for price deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "6h")]
    H6,
    #[serde(rename = "24h")]
    H24,
}

impl Timeframe {
    pub fn label(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::H1 => "1h",
            Timeframe::H6 => "6h",
            Timeframe::H24 => "24h",
        }
    }

    pub fn duration(&self) -> chrono::Duration {
        match self {
            Timeframe::M1 => chrono::Duration::minutes(1),
            Timeframe::M5 => chrono::Duration::minutes(5),
            Timeframe::H1 => chrono::Duration::hours(1),
            Timeframe::H6 => chrono::Duration::hours(6),
            Timeframe::H24 => chrono::Duration::hours(24),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-window values reported by the provider. Absent stays absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowedValues {
    pub m1: Option<f64>,
    pub m5: Option<f64>,
    pub h1: Option<f64>,
    pub h6: Option<f64>,
    pub h24: Option<f64>,
}

impl WindowedValues {
    pub fn get(&self, timeframe: Timeframe) -> Option<f64> {
        match timeframe {
            Timeframe::M1 => self.m1,
            Timeframe::M5 => self.m5,
            Timeframe::H1 => self.h1,
            Timeframe::H6 => self.h6,
            Timeframe::H24 => self.h24,
        }
    }
}

/// One pool as returned by the market-data provider, parsed at the fetch
/// boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolRecord {
    pub pool_id: String,
    pub network: Network,
    /// Base-token contract address.
    pub contract: String,
    pub symbol: String,
    pub price_usd: Option<f64>,
    /// Pool reserve in USD.
    pub liquidity_usd: Option<f64>,
    pub volume_usd: WindowedValues,
    pub price_change_percent: WindowedValues,
    pub tx_count_24h: Option<u64>,
    pub market_cap_usd: Option<f64>,
}

impl PoolRecord {
    pub fn snapshot(&self, timestamp: DateTime<Utc>) -> PoolSnapshot {
        PoolSnapshot {
            timestamp,
            contract: self.contract.clone(),
            network: self.network,
            symbol: self.symbol.clone(),
            price: self.price_usd,
            liquidity: self.liquidity_usd,
            volume_1h: self.volume_usd.h1,
            volume_24h: self.volume_usd.h24,
        }
    }
}

/// Immutable observation of a pool at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub timestamp: DateTime<Utc>,
    pub contract: String,
    pub network: Network,
    pub symbol: String,
    pub price: Option<f64>,
    pub liquidity: Option<f64>,
    pub volume_1h: Option<f64>,
    pub volume_24h: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Price,
    Liquidity,
    Volume1h,
}

impl PoolSnapshot {
    pub fn metric(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Price => self.price,
            Metric::Liquidity => self.liquidity,
            Metric::Volume1h => self.volume_1h,
        }
    }
}

/// Signed percent change from `from` to `to`. `None` when the base is not
/// positive, since no meaningful ratio exists.
pub fn percent_change(from: f64, to: f64) -> Option<f64> {
    if from > 0.0 && from.is_finite() && to.is_finite() {
        Some((to - from) / from * 100.0)
    } else {
        None
    }
}

/// The two independent scan classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScanKind {
    Moonshot,
    Rug,
}

impl ScanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanKind::Moonshot => "moonshot",
            ScanKind::Rug => "rug",
        }
    }
}

impl fmt::Display for ScanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inferred mechanism of a collapse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RugType {
    LiquidityDrain,
    PriceCrash,
    VolumeDump,
}

impl RugType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RugType::LiquidityDrain => "LIQUIDITY_DRAIN",
            RugType::PriceCrash => "PRICE_CRASH",
            RugType::VolumeDump => "VOLUME_DUMP",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoonshotDetail {
    pub tier: String,
    pub emoji: String,
    /// Window the best price move was observed on.
    pub timeframe: Timeframe,
    pub price_change_percent: f64,
    pub price_usd: Option<f64>,
    pub liquidity_usd: Option<f64>,
    pub volume_24h: Option<f64>,
    pub tx_count_24h: Option<u64>,
    pub market_cap_usd: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RugDetail {
    pub rug_type: RugType,
    pub liquidity_drop_percent: Option<f64>,
    pub price_drop_percent: Option<f64>,
    pub volume_spike_percent: Option<f64>,
    pub final_liquidity: Option<f64>,
    pub final_volume_1h: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AlertDetail {
    Moonshot(MoonshotDetail),
    Rug(RugDetail),
}

/// A single detection. Never mutated; a later detection replaces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub contract: String,
    pub pool_id: String,
    pub network: Network,
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub detail: AlertDetail,
}

impl AlertRecord {
    pub fn scan_kind(&self) -> ScanKind {
        match self.detail {
            AlertDetail::Moonshot(_) => ScanKind::Moonshot,
            AlertDetail::Rug(_) => ScanKind::Rug,
        }
    }

    /// Tier label for moonshots, rug type for rugs.
    pub fn kind_label(&self) -> &str {
        match &self.detail {
            AlertDetail::Moonshot(m) => &m.tier,
            AlertDetail::Rug(r) => r.rug_type.as_str(),
        }
    }
}
