//! Typed, immutable configuration for the arbitrage core.
//!
//! The original source accepted an arbitrary `**params` dict and used
//! `setattr`/`hasattr` to apply it to class attributes, raising on an unknown
//! key. That is re-expressed here as a single `Config` struct: unknown keys in
//! a TOML file are rejected at deserialization time via `deny_unknown_fields`,
//! and `validate()` checks the cross-field invariants the original enforced
//! implicitly by how its attributes were consumed.

use std::collections::{HashMap, HashSet};
use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Per-invocation simulated balance, `exchange -> currency -> free units`.
pub type SimulatedBalance = HashMap<String, HashMap<String, f64>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// Upper bound on arbitrage cycle length (number of edges).
    pub path_length: usize,
    /// Number of order-book layers considered per leg by the amount optimizer.
    pub orderbook_n: usize,
    /// Whether fiat currency nodes are kept in the graph.
    pub include_fiat: bool,
    /// Whether inter-exchange transfer edges are considered at all.
    pub inter_exchange_trading: bool,
    /// USD notional assumed per inter-exchange transfer, used to normalize
    /// withdrawal fees into a rate.
    pub interex_trading_size: f64,
    /// Minimum USD notional for an edge to be tradable / a node to be "funded".
    pub min_trading_limit: f64,
    /// Number of `find_arbitrage` calls between withdrawal-fee/price refreshes.
    pub refresh_time: u64,
    /// Whether the "must touch a funded node" constraint is added.
    pub consider_init_bal: bool,
    /// Whether inter-exchange edges are capped by receiver balance.
    pub consider_inter_exc_bal: bool,
    /// Fraction of a chosen order-book layer's depth usable by the amount optimizer.
    pub trade_amt_ptc: f64,
    /// Fiat currency symbols excluded from the graph when `include_fiat` is false.
    pub fiat_set: HashSet<String>,
    /// Per-exchange intra-exchange trading fee rate.
    pub trading_fee: HashMap<String, f64>,
    /// Big-M constant used to linearize layer-selection constraints.
    pub big_m: f64,
    /// Objective rescaling constant for the amount optimizer.
    pub amplifier: f64,
    /// Fallback amount precision (decimal digits) when an exchange does not report one.
    pub default_precision: u32,
    /// Amount precision (decimal digits) assumed for inter-exchange transfer legs.
    pub inter_exchange_precision: u32,
    /// Pre-fetched balances to use instead of live exchange queries, if set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulated_balance: Option<SimulatedBalance>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path_length: 4,
            orderbook_n: 20,
            include_fiat: false,
            inter_exchange_trading: true,
            interex_trading_size: 100.0,
            min_trading_limit: 10.0,
            refresh_time: 1000,
            consider_init_bal: true,
            consider_inter_exc_bal: true,
            trade_amt_ptc: 1.0,
            fiat_set: default_fiat_set(),
            trading_fee: HashMap::new(),
            big_m: 1e10,
            amplifier: 1e-10,
            default_precision: 3,
            inter_exchange_precision: 5,
            simulated_balance: None,
        }
    }
}

fn default_fiat_set() -> HashSet<String> {
    ["USD", "EUR", "GBP", "SGD", "JPY", "AUD", "CAD", "CHF"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Config {
    /// Overlay recognized `ARB_*` environment variables onto the defaults.
    /// Unlike `from_file`, an unrecognized variable name is simply ignored —
    /// env-var driven overrides are best-effort by convention.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = env::var("ARB_PATH_LENGTH") {
            if let Ok(v) = v.parse() {
                config.path_length = v;
            }
        }
        if let Ok(v) = env::var("ARB_ORDERBOOK_N") {
            if let Ok(v) = v.parse() {
                config.orderbook_n = v;
            }
        }
        if let Ok(v) = env::var("ARB_INCLUDE_FIAT") {
            if let Ok(v) = v.parse() {
                config.include_fiat = v;
            }
        }
        if let Ok(v) = env::var("ARB_INTER_EXCHANGE_TRADING") {
            if let Ok(v) = v.parse() {
                config.inter_exchange_trading = v;
            }
        }
        if let Ok(v) = env::var("ARB_INTEREX_TRADING_SIZE") {
            if let Ok(v) = v.parse() {
                config.interex_trading_size = v;
            }
        }
        if let Ok(v) = env::var("ARB_MIN_TRADING_LIMIT") {
            if let Ok(v) = v.parse() {
                config.min_trading_limit = v;
            }
        }
        if let Ok(v) = env::var("ARB_REFRESH_TIME") {
            if let Ok(v) = v.parse() {
                config.refresh_time = v;
            }
        }
        if let Ok(v) = env::var("ARB_CONSIDER_INIT_BAL") {
            if let Ok(v) = v.parse() {
                config.consider_init_bal = v;
            }
        }
        if let Ok(v) = env::var("ARB_CONSIDER_INTER_EXC_BAL") {
            if let Ok(v) = v.parse() {
                config.consider_inter_exc_bal = v;
            }
        }
        if let Ok(v) = env::var("ARB_TRADE_AMT_PTC") {
            if let Ok(v) = v.parse() {
                config.trade_amt_ptc = v;
            }
        }

        config
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Cross-field invariants the original enforced only implicitly (by how
    /// its attributes were consumed downstream). Centralized here so a bad
    /// config fails fast at construction rather than producing a
    /// silently-degenerate model.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.path_length < 2 {
            return Err(ConfigError::InvalidValue {
                field: "path_length",
                reason: "must be at least 2 (a cycle needs at least two edges)".into(),
            });
        }
        if self.path_length > 32 {
            return Err(ConfigError::InvalidValue {
                field: "path_length",
                reason: "values above 32 are not supported by the changeable-constraint epsilon".into(),
            });
        }
        if self.orderbook_n == 0 {
            return Err(ConfigError::InvalidValue {
                field: "orderbook_n",
                reason: "must be at least 1".into(),
            });
        }
        if self.interex_trading_size <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "interex_trading_size",
                reason: "must be positive".into(),
            });
        }
        if self.min_trading_limit < 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "min_trading_limit",
                reason: "must not be negative".into(),
            });
        }
        if self.refresh_time == 0 {
            return Err(ConfigError::InvalidValue {
                field: "refresh_time",
                reason: "must be at least 1".into(),
            });
        }
        if !(0.0..=1.0).contains(&self.trade_amt_ptc) || self.trade_amt_ptc <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "trade_amt_ptc",
                reason: "must be in (0, 1]".into(),
            });
        }
        for (exchange, fee) in &self.trading_fee {
            if !(0.0..1.0).contains(fee) {
                return Err(ConfigError::InvalidValue {
                    field: "trading_fee",
                    reason: format!("rate for '{exchange}' must be in [0, 1)"),
                });
            }
        }
        Ok(())
    }

    pub fn trading_fee_for(&self, exchange: &str) -> f64 {
        self.trading_fee.get(exchange).copied().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn rejects_too_short_path_length() {
        let mut config = Config::default();
        config.path_length = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_orderbook_depth() {
        let mut config = Config::default();
        config.orderbook_n = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_trade_amt_ptc() {
        let mut config = Config::default();
        config.trade_amt_ptc = 0.0;
        assert!(config.validate().is_err());
        config.trade_amt_ptc = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn file_roundtrip_preserves_values() {
        let dir = std::env::temp_dir().join(format!("arb-config-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");

        let mut config = Config::default();
        config.min_trading_limit = 42.0;
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.min_trading_limit, 42.0);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn unknown_field_in_file_is_rejected() {
        let dir = std::env::temp_dir().join(format!("arb-config-test-bad-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "path_length = 4\nnot_a_real_field = true\n").unwrap();

        assert!(Config::from_file(&path).is_err());
        std::fs::remove_file(&path).ok();
    }
}
