//! In-memory `RefPriceOracle`/`WithdrawalFeeOracle` test doubles, fixture
//! tables rather than live HTTP — mirrors `mock_exchange`'s shape.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use crate::error::OracleError;
use crate::exchange::WithdrawalFee;
use crate::oracle::{RefPriceOracle, WithdrawalFeeOracle};

#[derive(Debug, Clone, Default)]
pub struct FixedPriceOracle {
    prices: HashMap<String, f64>,
}

impl FixedPriceOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(mut self, symbol: impl Into<String>, usd: f64) -> Self {
        self.prices.insert(symbol.into(), usd);
        self
    }
}

#[async_trait]
impl RefPriceOracle for FixedPriceOracle {
    async fn get_usd_prices(&self, symbols: &HashSet<String>) -> Result<HashMap<String, f64>, OracleError> {
        Ok(symbols
            .iter()
            .filter_map(|s| self.prices.get(s).map(|&p| (s.clone(), p)))
            .collect())
    }
}

/// Per-exchange fixed withdrawal-fee table, keyed by currency.
#[derive(Debug, Clone, Default)]
pub struct FixedWithdrawalFeeOracle {
    fees: HashMap<String, HashMap<String, WithdrawalFee>>,
}

impl FixedWithdrawalFeeOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fee(mut self, exchange: impl Into<String>, currency: impl Into<String>, fee: WithdrawalFee) -> Self {
        self.fees.entry(exchange.into()).or_default().insert(currency.into(), fee);
        self
    }
}

#[async_trait]
impl WithdrawalFeeOracle for FixedWithdrawalFeeOracle {
    async fn get_withdrawal_fees(
        &self,
        exchange: &str,
        _trading_size_usd: f64,
    ) -> Result<HashMap<String, WithdrawalFee>, OracleError> {
        Ok(self.fees.get(exchange).cloned().unwrap_or_default())
    }
}

/// A `WithdrawalFeeOracle` that always fails, exercising
/// `snapshot::update_withdrawal_fee`'s degradation path.
#[derive(Debug, Clone, Default)]
pub struct FailingWithdrawalFeeOracle;

#[async_trait]
impl WithdrawalFeeOracle for FailingWithdrawalFeeOracle {
    async fn get_withdrawal_fees(
        &self,
        _exchange: &str,
        _trading_size_usd: f64,
    ) -> Result<HashMap<String, WithdrawalFee>, OracleError> {
        Err(OracleError::Request("withdrawal fee table unavailable".to_string()))
    }
}
