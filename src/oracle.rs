//! Reference-price and withdrawal-fee oracles.
//!
//! Both are explicitly out-of-scope *implementations* per the specification
//! (§1): the HTML withdrawal-fee table fetch and the CoinMarketCap-style
//! price API are external collaborators. This module defines only the
//! interfaces the snapshot builder (`snapshot::MarketSnapshot`) depends on,
//! plus a minimal JSON-based reference implementation of the price oracle
//! (which needs no HTML scraping, only `reqwest` + `serde_json`, both already
//! ambient dependencies) to show the retry-on-unknown-symbol contract
//! concretely. The withdrawal-fee oracle is trait-only; `testing` supplies a
//! fixed-table test double.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::OracleError;
use crate::exchange::WithdrawalFee;

/// Fetches reference USD prices for a set of coin symbols.
#[async_trait]
pub trait RefPriceOracle: Send + Sync {
    /// On a partial rejection (some symbols unknown to the oracle), the
    /// implementation retries with the unknown symbols removed rather than
    /// failing the whole batch; only a structural/protocol failure is `Err`.
    async fn get_usd_prices(&self, symbols: &HashSet<String>) -> Result<HashMap<String, f64>, OracleError>;
}

/// Fetches the withdrawal-fee table for one exchange.
#[async_trait]
pub trait WithdrawalFeeOracle: Send + Sync {
    /// `trading_size_usd` is used to normalize the absolute `usd_fee` into a
    /// `usd_rate = usd_fee / trading_size_usd` per node.
    async fn get_withdrawal_fees(
        &self,
        exchange: &str,
        trading_size_usd: f64,
    ) -> Result<HashMap<String, WithdrawalFee>, OracleError>;
}

/// Minimal CoinMarketCap-quotes-style price oracle: JSON over HTTP, API key
/// in a header, retry-on-400-with-unknown-symbols.
pub struct CmcPriceOracle {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl CmcPriceOracle {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: "https://pro-api.coinmarketcap.com/v1/cryptocurrency/quotes/latest".to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl RefPriceOracle for CmcPriceOracle {
    async fn get_usd_prices(&self, symbols: &HashSet<String>) -> Result<HashMap<String, f64>, OracleError> {
        let mut remaining: HashSet<String> = symbols.iter().cloned().collect();
        let mut out = HashMap::new();

        loop {
            if remaining.is_empty() {
                return Ok(out);
            }

            let symbol_param = remaining.iter().cloned().collect::<Vec<_>>().join(",");
            let response = self
                .client
                .get(&self.base_url)
                .header("Accepts", "application/json")
                .header("X-CMC_PRO_API_KEY", &self.api_key)
                .query(&[("symbol", symbol_param.as_str()), ("convert", "USD")])
                .send()
                .await
                .map_err(|e| OracleError::Request(e.to_string()))?;

            let status = response.status();
            let body: Value = response
                .json()
                .await
                .map_err(|e| OracleError::Protocol(e.to_string()))?;

            if status.is_success() {
                if let Some(data) = body.get("data").and_then(Value::as_object) {
                    for (symbol, entry) in data {
                        if let Some(price) = entry.pointer("/quote/USD/price").and_then(Value::as_f64) {
                            out.insert(symbol.clone(), price);
                        }
                    }
                }
                return Ok(out);
            }

            if status.as_u16() == 400 {
                let message = body
                    .pointer("/status/error_message")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let unknown = parse_unknown_symbols(message);
                let reduced: HashSet<String> = remaining.difference(&unknown).cloned().collect();
                if reduced.len() == remaining.len() || reduced.is_empty() {
                    return Err(OracleError::Protocol(format!(
                        "oracle rejected symbol set and no progress could be made: {message}"
                    )));
                }
                remaining = reduced;
                continue;
            }

            return Err(OracleError::Request(format!("unexpected status {status}")));
        }
    }
}

/// Extracts the unknown-symbol list from a CMC-style 400 error message, e.g.
/// `"Invalid values for \"symbol\": \"FOO,BAR\""`.
fn parse_unknown_symbols(message: &str) -> HashSet<String> {
    let tail = message.rsplit(':').next().unwrap_or("");
    tail.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_ascii_uppercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_unknown_symbols_from_error_message() {
        let msg = r#"Invalid values for "symbol": "FOOBAR,BAZCOIN""#;
        let unknown = parse_unknown_symbols(msg);
        assert!(unknown.contains("FOOBAR"));
        assert!(unknown.contains("BAZCOIN"));
    }
}
