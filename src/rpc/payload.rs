//! GeckoTerminal JSON:API pool listings.
//!
//! The provider reports most numbers as decimal strings, sometimes as JSON
//! numbers, and uses `null` or omits the key when it has no figure. All of
//! those shapes are accepted here; anything that does not parse is treated
//! as absent so that downstream change detection never sees a fake zero.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::warn;

use crate::core::{Network, PoolRecord, WindowedValues};

#[derive(Debug, Deserialize)]
pub struct PoolListResponse {
    #[serde(default)]
    pub data: Vec<PoolResource>,
}

#[derive(Debug, Deserialize)]
pub struct PoolResource {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub attributes: PoolAttributes,
    #[serde(default)]
    pub relationships: Relationships,
}

#[derive(Debug, Default, Deserialize)]
pub struct PoolAttributes {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub base_token_price_usd: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub reserve_in_usd: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub total_reserve_in_usd: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub market_cap_usd: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub fdv_usd: Option<f64>,
    #[serde(default)]
    pub volume_usd: WindowedField,
    #[serde(default)]
    pub price_change_percentage: WindowedField,
    #[serde(default)]
    pub transactions: Transactions,
}

#[derive(Debug, Default, Deserialize)]
pub struct WindowedField {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub m1: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub m5: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub h1: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub h6: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub h24: Option<f64>,
}

impl From<WindowedField> for WindowedValues {
    fn from(w: WindowedField) -> Self {
        WindowedValues {
            m1: w.m1,
            m5: w.m5,
            h1: w.h1,
            h6: w.h6,
            h24: w.h24,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct Transactions {
    #[serde(default)]
    pub h24: Option<TxCounts>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TxCounts {
    #[serde(default, deserialize_with = "lenient_u64")]
    pub buys: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub sells: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Relationships {
    #[serde(default)]
    pub base_token: Option<RelationshipRef>,
}

#[derive(Debug, Deserialize)]
pub struct RelationshipRef {
    #[serde(default)]
    pub data: Option<ResourceId>,
}

#[derive(Debug, Deserialize)]
pub struct ResourceId {
    #[serde(default)]
    pub id: Option<String>,
}

fn number_from(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(number_from))
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(number_from)
        .filter(|n| *n >= 0.0 && n.fract() == 0.0)
        .map(|n| n as u64))
}

impl PoolResource {
    /// Base-token address: the part of `"<network>_<address>"` after the
    /// first underscore.
    pub fn contract(&self) -> Option<&str> {
        let id = self
            .relationships
            .base_token
            .as_ref()?
            .data
            .as_ref()?
            .id
            .as_deref()?;
        let (_, address) = id.split_once('_')?;
        (!address.is_empty()).then_some(address)
    }

    /// `None` when the pool id or base-token contract is missing.
    pub fn into_record(self, network: Network) -> Option<PoolRecord> {
        let contract = self.contract()?.to_string();
        let pool_id = self.id.filter(|id| !id.is_empty())?;
        let attrs = self.attributes;

        let tx_count_24h = attrs
            .transactions
            .h24
            .and_then(|t| t.buys?.checked_add(t.sells?));

        Some(PoolRecord {
            pool_id,
            network,
            contract,
            symbol: attrs.name.unwrap_or_else(|| "Unknown".to_string()),
            price_usd: attrs.base_token_price_usd,
            liquidity_usd: attrs.reserve_in_usd.or(attrs.total_reserve_in_usd),
            volume_usd: attrs.volume_usd.into(),
            price_change_percent: attrs.price_change_percentage.into(),
            tx_count_24h,
            market_cap_usd: attrs.market_cap_usd.or(attrs.fdv_usd),
        })
    }
}

/// Decode a pool listing, dropping entries that cannot be identified.
pub fn parse_pool_list(body: &str, network: Network) -> Result<Vec<PoolRecord>, serde_json::Error> {
    let response: PoolListResponse = serde_json::from_str(body)?;
    let total = response.data.len();
    let records: Vec<PoolRecord> = response
        .data
        .into_iter()
        .filter_map(|pool| pool.into_record(network))
        .collect();
    if records.len() < total {
        warn!(
            network = %network,
            skipped = total - records.len(),
            "pools without id or base token skipped"
        );
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRENDING: &str = r#"{
        "data": [
            {
                "id": "solana_7xKXpool",
                "type": "pool",
                "attributes": {
                    "name": "BONK / SOL",
                    "base_token_price_usd": "0.0000231",
                    "reserve_in_usd": "125000.55",
                    "fdv_usd": "1500000",
                    "market_cap_usd": null,
                    "volume_usd": { "m5": "1200", "h1": "9000.5", "h6": "40000", "h24": 210000 },
                    "price_change_percentage": { "m5": "12.5", "h1": "-3.2", "h6": "", "h24": "80" },
                    "transactions": { "h24": { "buys": 420, "sells": "380" } }
                },
                "relationships": {
                    "base_token": { "data": { "id": "solana_DezXAZ8z7Pnrn_mint", "type": "token" } }
                }
            },
            {
                "id": "solana_orphan",
                "attributes": { "name": "NOPE / SOL" },
                "relationships": {}
            }
        ]
    }"#;

    #[test]
    fn parses_strings_numbers_and_nulls() {
        let records = parse_pool_list(TRENDING, Network::Solana).unwrap();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.pool_id, "solana_7xKXpool");
        assert_eq!(r.contract, "DezXAZ8z7Pnrn_mint");
        assert_eq!(r.symbol, "BONK / SOL");
        assert_eq!(r.price_usd, Some(0.0000231));
        assert_eq!(r.liquidity_usd, Some(125000.55));
        assert_eq!(r.market_cap_usd, Some(1_500_000.0));
        assert_eq!(r.volume_usd.h24, Some(210_000.0));
        assert_eq!(r.volume_usd.h1, Some(9000.5));
        assert_eq!(r.price_change_percent.h1, Some(-3.2));
        assert_eq!(r.tx_count_24h, Some(800));
    }

    #[test]
    fn unparseable_and_missing_stay_absent() {
        let records = parse_pool_list(TRENDING, Network::Solana).unwrap();
        let r = &records[0];
        assert_eq!(r.price_change_percent.h6, None);
        assert_eq!(r.price_change_percent.m1, None);
        assert_eq!(r.volume_usd.m1, None);
    }

    #[test]
    fn liquidity_falls_back_to_total_reserve() {
        let body = r#"{"data":[{
            "id": "eth_0xpool",
            "attributes": { "total_reserve_in_usd": "5000", "transactions": { "h24": { "buys": 3 } } },
            "relationships": { "base_token": { "data": { "id": "eth_0xabc" } } }
        }]}"#;
        let records = parse_pool_list(body, Network::Eth).unwrap();
        assert_eq!(records[0].liquidity_usd, Some(5000.0));
        assert_eq!(records[0].tx_count_24h, None);
        assert_eq!(records[0].market_cap_usd, None);
        assert_eq!(records[0].symbol, "Unknown");
    }

    #[test]
    fn empty_listing() {
        assert!(parse_pool_list(r#"{"data":[]}"#, Network::Base).unwrap().is_empty());
        assert!(parse_pool_list("{}", Network::Base).unwrap().is_empty());
    }

    #[test]
    fn malformed_body_is_an_error() {
        assert!(parse_pool_list("<html>502</html>", Network::Bsc).is_err());
    }
}
