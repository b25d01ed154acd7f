use serde::Deserialize;
use std::path::Path;

use crate::core::{Network, Timeframe};
use crate::error::ConfigError;
use crate::signals::moonshot::{LookbackWindow, TierRule, default_tiers, default_windows};
use crate::signals::rug::RugRules;

/// Upper bound for every configured duration: one year.
const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderConfig,
    pub monitor: MonitorConfig,
    pub history: HistoryConfig,
    pub moonshot: MoonshotConfig,
    pub rug: RugConfig,
    pub notifications: NotificationConfig,
    pub idle_broadcast: IdleBroadcastConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub rate_limit_calls: usize,
    pub rate_limit_window_secs: u64,
    pub max_fetch_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub breaker_failure_threshold: u32,
    pub breaker_cooldown_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MonitorConfig {
    pub networks: Vec<Network>,
    pub moonshot_scan_interval_secs: u64,
    pub rug_scan_interval_secs: u64,
    /// Sleep after a cycle in which every network failed.
    pub failed_cycle_backoff_secs: u64,
    pub trending_durations: Vec<Timeframe>,
    pub trending_limit: usize,
    pub new_pools_limit: usize,
    pub status_report_interval_secs: u64,
    pub status_report_window_minutes: i64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HistoryConfig {
    pub capacity: usize,
    pub stale_after_secs: i64,
    /// How long alert records stay available for lookups and reports.
    pub alert_retention_secs: i64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MoonshotConfig {
    pub cooldown_secs: i64,
    /// Most valuable first.
    pub tiers: Vec<TierRule>,
    pub windows: Vec<LookbackWindow>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RugConfig {
    pub cooldown_secs: i64,
    pub horizon_secs: i64,
    pub max_staleness_secs: i64,
    #[serde(flatten)]
    pub rules: RugRules,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub desktop: bool,
    pub log_only: bool,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_ids: Vec<String>,
    pub telegram_api_url: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IdleBroadcastConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub messages: Vec<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.geckoterminal.com/api/v2".into(),
            api_key: None,
            timeout_secs: 30,
            rate_limit_calls: 500,
            rate_limit_window_secs: 60,
            max_fetch_attempts: 2,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 5_000,
            breaker_failure_threshold: 3,
            breaker_cooldown_secs: 300,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            networks: Network::ALL.to_vec(),
            moonshot_scan_interval_secs: 60,
            rug_scan_interval_secs: 60,
            failed_cycle_backoff_secs: 120,
            trending_durations: vec![Timeframe::M5, Timeframe::H1, Timeframe::H6, Timeframe::H24],
            trending_limit: 20,
            new_pools_limit: 30,
            status_report_interval_secs: 2_700,
            status_report_window_minutes: 45,
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            stale_after_secs: 600,
            alert_retention_secs: 86_400,
        }
    }
}

impl Default for MoonshotConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 3_600,
            tiers: default_tiers(),
            windows: default_windows(),
        }
    }
}

impl Default for RugConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: 3_600,
            horizon_secs: 60,
            max_staleness_secs: 60,
            rules: RugRules::default(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            desktop: false,
            log_only: false,
            telegram_bot_token: None,
            telegram_chat_ids: Vec::new(),
            telegram_api_url: "https://api.telegram.org".into(),
        }
    }
}

impl Default for IdleBroadcastConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 5_400,
            messages: vec![
                "still scanning, still early\n\nwe're all gonna make it".into(),
                "every dip is just a discount\n\nfor the patient".into(),
                "quiet charts, loud plans\n\nscanner's still running".into(),
            ],
        }
    }
}

impl Config {
    /// Load config from a TOML file. Falls back to defaults if file doesn't exist.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("Config file {} not found, using defaults", path.display());
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse {}: {e}, using defaults", path.display());
                Self::default()
            }),
            Err(e) => {
                tracing::warn!("Failed to read {}: {e}, using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Secrets and the network list may come from the environment.
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| {
            var(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(key) = non_empty("GECKOTERMINAL_API_KEY") {
            self.provider.api_key = Some(key);
        }
        if let Some(token) = non_empty("TELEGRAM_BOT_TOKEN") {
            self.notifications.telegram_bot_token = Some(token);
        }
        if let Some(ids) = non_empty("TELEGRAM_CHAT_IDS") {
            self.notifications.telegram_chat_ids = split_list(&ids);
        }
        if let Some(list) = non_empty("POOLRADAR_NETWORKS") {
            let mut networks = Vec::new();
            for name in split_list(&list) {
                match name.parse::<Network>() {
                    Ok(n) if !networks.contains(&n) => networks.push(n),
                    Ok(_) => {}
                    Err(e) => tracing::warn!("POOLRADAR_NETWORKS: {e}, ignored"),
                }
            }
            self.monitor.networks = networks;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));
        if self.provider.rate_limit_calls == 0 || self.provider.rate_limit_window_secs == 0 {
            return invalid("provider rate limit must allow at least one call per window");
        }
        if self.monitor.networks.is_empty() {
            return invalid("at least one network must be configured");
        }
        if self.moonshot.tiers.is_empty() {
            return invalid("moonshot tier list is empty");
        }
        if self.history.capacity == 0 {
            return invalid("history capacity must be at least 1");
        }
        if self.moonshot.cooldown_secs < 0 || self.rug.cooldown_secs < 0 {
            return invalid("cooldown windows cannot be negative");
        }
        if self.rug.horizon_secs <= 0 {
            return invalid("rug horizon must be positive");
        }
        if self.rug.max_staleness_secs < 0 || self.history.stale_after_secs < 0 {
            return invalid("staleness windows cannot be negative");
        }
        if self.monitor.status_report_window_minutes <= 0 {
            return invalid("status report window must be positive");
        }
        let report_window_secs = self.monitor.status_report_window_minutes.saturating_mul(60);
        if self.history.alert_retention_secs < report_window_secs {
            return invalid("alert retention must cover the status report window");
        }
        self.validate_durations()
    }

    /// Durations become `chrono` and `tokio` time values, which overflow
    /// well before the numeric types holding them do.
    fn validate_durations(&self) -> Result<(), ConfigError> {
        let signed = [
            ("history.stale_after_secs", self.history.stale_after_secs),
            ("history.alert_retention_secs", self.history.alert_retention_secs),
            ("moonshot.cooldown_secs", self.moonshot.cooldown_secs),
            ("rug.cooldown_secs", self.rug.cooldown_secs),
            ("rug.horizon_secs", self.rug.horizon_secs),
            ("rug.max_staleness_secs", self.rug.max_staleness_secs),
            (
                "monitor.status_report_window_minutes",
                self.monitor.status_report_window_minutes.saturating_mul(60),
            ),
        ];
        let p = &self.provider;
        let m = &self.monitor;
        let unsigned = [
            ("provider.timeout_secs", p.timeout_secs),
            ("provider.rate_limit_window_secs", p.rate_limit_window_secs),
            ("provider.breaker_cooldown_secs", p.breaker_cooldown_secs),
            ("provider.retry_max_delay_ms", p.retry_max_delay_ms / 1_000),
            ("monitor.moonshot_scan_interval_secs", m.moonshot_scan_interval_secs),
            ("monitor.rug_scan_interval_secs", m.rug_scan_interval_secs),
            ("monitor.failed_cycle_backoff_secs", m.failed_cycle_backoff_secs),
            ("monitor.status_report_interval_secs", m.status_report_interval_secs),
            ("idle_broadcast.interval_secs", self.idle_broadcast.interval_secs),
        ];
        let windows = self
            .moonshot
            .windows
            .iter()
            .map(|w| ("moonshot.windows.max_staleness_secs", w.max_staleness_secs));

        let too_long = signed
            .into_iter()
            .map(|(name, secs)| (name, u64::try_from(secs).unwrap_or(0)))
            .chain(unsigned)
            .chain(windows)
            .find(|(_, secs)| *secs > MAX_DURATION_SECS);
        match too_long {
            Some((name, secs)) => Err(ConfigError::Invalid(format!(
                "{name} = {secs} exceeds the {MAX_DURATION_SECS}s limit"
            ))),
            None => Ok(()),
        }
    }
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.monitor.networks.len(), 4);
        assert_eq!(config.moonshot.tiers[0].label, "POTENTIAL 100X");
        assert_eq!(config.rug.rules.liquidity_drain.max_final_liquidity, 1_000.0);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config = Config::parse(
            r#"
            [monitor]
            networks = ["solana", "base"]
            rug_scan_interval_secs = 30

            [rug.liquidity_drain]
            max_final_liquidity = 5000.0

            [[moonshot.tiers]]
            label = "ONLY"
            min_liquidity = 1.0
            min_price_change_percent = 10.0
            min_volume_24h = 1.0
            min_tx_count_24h = 1
            min_market_cap = 0.0
            "#,
        )
        .unwrap();
        assert_eq!(config.monitor.networks, vec![Network::Solana, Network::Base]);
        assert_eq!(config.monitor.rug_scan_interval_secs, 30);
        assert_eq!(config.monitor.moonshot_scan_interval_secs, 60);
        assert_eq!(config.rug.rules.liquidity_drain.max_final_liquidity, 5_000.0);
        assert_eq!(config.rug.rules.liquidity_drain.min_drop_percent, 40.0);
        assert_eq!(config.rug.horizon_secs, 60);
        assert_eq!(config.moonshot.tiers.len(), 1);
        assert_eq!(config.moonshot.windows.len(), 4);
        assert_eq!(config.provider.rate_limit_calls, 500);
    }

    #[test]
    fn env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("TELEGRAM_CHAT_IDS", " 1, -100200 ,,"),
            ("POOLRADAR_NETWORKS", "eth,tron,eth,bsc"),
            ("GECKOTERMINAL_API_KEY", "  "),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        config.apply_vars(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.notifications.telegram_bot_token.as_deref(), Some("123:abc"));
        assert_eq!(config.notifications.telegram_chat_ids, vec!["1", "-100200"]);
        assert_eq!(config.monitor.networks, vec![Network::Eth, Network::Bsc]);
        assert_eq!(config.provider.api_key, None);
    }

    #[test]
    fn validate_rejects_unusable_settings() {
        let mut config = Config::default();
        config.provider.rate_limit_calls = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.monitor.networks.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.moonshot.tiers.clear();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.history.capacity = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.history.alert_retention_secs = 60;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_durations_out_of_range() {
        let mut config = Config::default();
        config.history.stale_after_secs = i64::MAX;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("history.stale_after_secs"));

        let mut config = Config::default();
        config.moonshot.cooldown_secs = i64::MAX / 2;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.rug.max_staleness_secs = 10_000_000_000;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.provider.breaker_cooldown_secs = u64::MAX;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.moonshot.windows[0].max_staleness_secs = u64::MAX;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.rug.cooldown_secs = MAX_DURATION_SECS as i64;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = Config::load("/nonexistent/poolradar.toml");
        assert_eq!(config.history.capacity, 10);
    }
}
