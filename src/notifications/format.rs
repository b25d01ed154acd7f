use std::collections::HashMap;

use rand::seq::SliceRandom;

use super::{AlertContext, Broadcast, Control};
use crate::core::{AlertDetail, AlertRecord, MoonshotDetail, Network, RugDetail, RugType};
use crate::signals::moonshot::TierRule;

const MOONSHOT_SIGNOFFS: &[&str] = &[
    "DYOR or get REKT! 💀",
    "Ape responsibly! 🦍",
    "This is not financial advice! 🚫",
    "Welcome to the trenches! ⚰️",
];

const RUG_SIGNOFFS: &[&str] = &[
    "Another day, another rug 🧹",
    "F in the chat for the holders 💀",
    "Exit liquidity: Secured ✅",
    "Lesson learned: Trust nobody 📚",
];

const DIVIDER: &str = "━━━━━━━━━━━━━━━";

fn signoff(lines: &[&str]) -> String {
    lines
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or_default()
        .to_string()
}

/// Escape characters that legacy Telegram Markdown treats as markup.
pub fn escape_markdown(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// `1234567` -> `"1,234,567"`.
pub fn thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Whole dollars below $10K, then K and M suffixes.
pub fn usd_compact(value: Option<f64>) -> String {
    match value {
        None => "n/a".to_string(),
        Some(v) if v >= 1_000_000.0 => format!("${:.2}M", v / 1_000_000.0),
        Some(v) if v >= 10_000.0 => format!("${:.1}K", v / 1_000.0),
        Some(v) => format!("${}", thousands(v.max(0.0).round() as u64)),
    }
}

fn percent_or_na(value: Option<f64>, decimals: usize) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.decimals$}%"))
}

pub fn moonshot_text(record: &AlertRecord, m: &MoonshotDetail) -> String {
    let symbol = escape_markdown(&record.symbol);
    let price = m
        .price_usd
        .map_or_else(|| "n/a".to_string(), |p| format!("${p:.8}"));
    let txs = m
        .tx_count_24h
        .map_or_else(|| "n/a".to_string(), thousands);
    format!(
        "🚨 We found some moonshots while diggin the trenches!\n\n\
         {symbol}\n\n\
         {emoji} {tier} Moonshot: {symbol}\n\n\
         💰 **Price:** {price}\n\n\
         📈 **{tf} Change:** {change:+.1}%\n\n\
         💧 **Liquidity:** {liquidity}\n\n\
         📊 **Volume 24h:** {volume}\n\n\
         🔥 **Transactions:** {txs}\n\n\
         📱 **Contract:** `{contract}`\n\n\
         🌐 **Network:** {network}\n\n\
         {DIVIDER}\n\n\
         {signoff}",
        emoji = m.emoji,
        tier = m.tier,
        tf = m.timeframe,
        change = m.price_change_percent,
        liquidity = usd_compact(m.liquidity_usd),
        volume = usd_compact(m.volume_24h),
        contract = record.contract,
        network = record.network.display_name(),
        signoff = signoff(MOONSHOT_SIGNOFFS),
    )
}

pub fn rug_text(record: &AlertRecord, r: &RugDetail) -> String {
    let header = format!(
        "🚨 RUG PULL DETECTED 🚨\n\n{}\n\n☠️ `{}` on {}",
        escape_markdown(&record.symbol),
        record.contract,
        record.network.display_name()
    );
    let body = match r.rug_type {
        RugType::LiquidityDrain => format!(
            "📉 LP Drain: -{}\n\n💀 Final Liquidity: {}\n\n{DIVIDER}\n\n\
             ⚠️ LP DRAIN: {} of the pool's liquidity was removed. \
             With the backing gone, holders cannot sell.",
            percent_or_na(r.liquidity_drop_percent, 1),
            usd_compact(r.final_liquidity),
            percent_or_na(r.liquidity_drop_percent, 0),
        ),
        RugType::PriceCrash => format!(
            "📉 Price Crash: -{}\n\n💀 Final Liquidity: {}\n\n{DIVIDER}\n\n\
             ⚠️ PRICE CRASH: price fell {} within a minute as insiders dumped on holders.",
            percent_or_na(r.price_drop_percent, 1),
            usd_compact(r.final_liquidity),
            percent_or_na(r.price_drop_percent, 0),
        ),
        RugType::VolumeDump => format!(
            "📉 Volume Spike: +{}\n\n💀 Price Impact: -{}\n\n{DIVIDER}\n\n\
             ⚠️ MASSIVE DUMP: volume exploded {} while price fell {}, \
             the pattern of coordinated selling.",
            percent_or_na(r.volume_spike_percent, 0),
            percent_or_na(r.price_drop_percent, 1),
            percent_or_na(r.volume_spike_percent, 0),
            percent_or_na(r.price_drop_percent, 0),
        ),
    };
    format!("{header}\n\n{body}\n\n{}", signoff(RUG_SIGNOFFS))
}

/// Follow-up actions attached to every alert, encoded as
/// `alert_<action>_<network>_<contract>`.
pub fn alert_controls(network: Network, contract: &str) -> Vec<Vec<Control>> {
    let action = |verb: &str| format!("alert_{verb}_{network}_{contract}");
    vec![
        vec![
            Control::new("📊 Token Details", action("analyze")),
            Control::new("📱 Socials", action("socials")),
        ],
        vec![
            Control::new("🐋 Whale Tracker", action("whale")),
            Control::new("⚖️ Rank", action("rank")),
        ],
    ]
}

pub fn alert_broadcast(record: &AlertRecord) -> Broadcast {
    let text = match &record.detail {
        AlertDetail::Moonshot(m) => moonshot_text(record, m),
        AlertDetail::Rug(r) => rug_text(record, r),
    };
    Broadcast {
        text,
        controls: alert_controls(record.network, &record.contract),
        context: Some(AlertContext {
            kind: record.scan_kind(),
            contract: record.contract.clone(),
            network: record.network,
            symbol: record.symbol.clone(),
        }),
    }
}

/// Periodic summary of detections. `moonshot_counts` is keyed by tier label.
pub fn status_report(
    tiers: &[TierRule],
    moonshot_counts: &HashMap<String, usize>,
    rug_count: usize,
    window_minutes: i64,
    networks: &[Network],
) -> Broadcast {
    let names: Vec<&str> = networks.iter().map(|n| n.display_name()).collect();
    let mut text = format!(
        "🔍 **Scanning Report (Last {window_minutes} min)**\n\n\
         Monitoring {}\n\nMoonshots Found:\n",
        names.join(", ")
    );
    for tier in tiers {
        let count = moonshot_counts.get(&tier.label).copied().unwrap_or(0);
        text.push_str(&format!("\n{} {count} × {}\n", tier.emoji, tier.label));
    }
    text.push_str(&format!("\nRugs Detected:\n\n☠️ {rug_count} × Rug Pulls"));

    let total_moonshots: usize = moonshot_counts.values().sum();
    let mut row = Vec::new();
    if total_moonshots > 0 {
        row.push(Control::new("📈 View Moonshots", "view_moonshots"));
    }
    if rug_count > 0 {
        row.push(Control::new("💀 View Rugs", "view_rugs"));
    }
    Broadcast {
        text,
        controls: if row.is_empty() { Vec::new() } else { vec![row] },
        context: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ScanKind, Timeframe};
    use crate::signals::moonshot::default_tiers;
    use chrono::Utc;

    fn moonshot_record() -> AlertRecord {
        AlertRecord {
            contract: "0xfeed".into(),
            pool_id: "base_0xpool".into(),
            network: Network::Base,
            symbol: "MOON_CAT / WETH".into(),
            timestamp: Utc::now(),
            detail: AlertDetail::Moonshot(MoonshotDetail {
                tier: "POTENTIAL 10X".into(),
                emoji: "⚡".into(),
                timeframe: Timeframe::H1,
                price_change_percent: 42.25,
                price_usd: Some(0.00012345),
                liquidity_usd: Some(25_500.0),
                volume_24h: Some(8_765.4),
                tx_count_24h: Some(1_234),
                market_cap_usd: Some(150_000.0),
            }),
        }
    }

    #[test]
    fn number_formatting() {
        assert_eq!(thousands(0), "0");
        assert_eq!(thousands(999), "999");
        assert_eq!(thousands(1_000), "1,000");
        assert_eq!(thousands(1_234_567), "1,234,567");
        assert_eq!(usd_compact(Some(8_765.4)), "$8,765");
        assert_eq!(usd_compact(Some(25_500.0)), "$25.5K");
        assert_eq!(usd_compact(Some(2_500_000.0)), "$2.50M");
        assert_eq!(usd_compact(None), "n/a");
    }

    #[test]
    fn moonshot_message_fields() {
        let b = alert_broadcast(&moonshot_record());
        assert!(b.text.contains("⚡ POTENTIAL 10X Moonshot: MOON\\_CAT / WETH"));
        assert!(b.text.contains("$0.00012345"));
        assert!(
            b.text.contains("**1h Change:** +42.2%") || b.text.contains("**1h Change:** +42.3%")
        );
        assert!(b.text.contains("$25.5K"));
        assert!(b.text.contains("$8,765"));
        assert!(b.text.contains("1,234"));
        assert!(b.text.contains("`0xfeed`"));
        assert!(b.text.contains("Base"));
        let ctx = b.context.unwrap();
        assert_eq!(ctx.kind, ScanKind::Moonshot);
        assert_eq!(ctx.contract, "0xfeed");
    }

    #[test]
    fn controls_encode_network_and_contract() {
        let controls = alert_controls(Network::Solana, "Mint111");
        let actions: Vec<&str> = controls.iter().flatten().map(|c| c.action.as_str()).collect();
        assert_eq!(
            actions,
            vec![
                "alert_analyze_solana_Mint111",
                "alert_socials_solana_Mint111",
                "alert_whale_solana_Mint111",
                "alert_rank_solana_Mint111",
            ]
        );
    }

    #[test]
    fn rug_message_per_type() {
        let mut record = moonshot_record();
        record.detail = AlertDetail::Rug(RugDetail {
            rug_type: RugType::LiquidityDrain,
            liquidity_drop_percent: Some(92.0),
            price_drop_percent: Some(5.0),
            volume_spike_percent: None,
            final_liquidity: Some(4_000.0),
            final_volume_1h: None,
        });
        let text = alert_broadcast(&record).text;
        assert!(text.contains("RUG PULL DETECTED"));
        assert!(text.contains("LP Drain: -92.0%"));
        assert!(text.contains("Final Liquidity: $4,000"));
        assert!(text.contains("Base"));

        record.detail = AlertDetail::Rug(RugDetail {
            rug_type: RugType::VolumeDump,
            liquidity_drop_percent: Some(1.0),
            price_drop_percent: Some(55.0),
            volume_spike_percent: Some(900.0),
            final_liquidity: Some(40_000.0),
            final_volume_1h: Some(20_000.0),
        });
        let text = alert_broadcast(&record).text;
        assert!(text.contains("Volume Spike: +900%"));
        assert!(text.contains("Price Impact: -55.0%"));
    }

    #[test]
    fn status_report_counts_and_controls() {
        let tiers = default_tiers();
        let mut counts = HashMap::new();
        counts.insert("POTENTIAL 2X".to_string(), 3);
        let b = status_report(&tiers, &counts, 0, 45, &[Network::Solana, Network::Eth]);
        assert!(b.text.contains("Scanning Report (Last 45 min)"));
        assert!(b.text.contains("🚀 0 × POTENTIAL 100X"));
        assert!(b.text.contains("💰 3 × POTENTIAL 2X"));
        assert!(b.text.contains("☠️ 0 × Rug Pulls"));
        assert!(b.text.contains("Solana, Ethereum"));
        assert_eq!(b.controls.len(), 1);
        assert_eq!(b.controls[0].len(), 1);
        assert_eq!(b.controls[0][0].action, "view_moonshots");

        let quiet = status_report(&tiers, &HashMap::new(), 0, 45, &[Network::Eth]);
        assert!(quiet.controls.is_empty());
    }
}
