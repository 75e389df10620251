//! Test doubles shared across this crate's own test suite.

mod mock_exchange;
mod mock_oracle;

pub use mock_exchange::{FailingExchangeClient, MockExchangeClient};
pub use mock_oracle::{FailingWithdrawalFeeOracle, FixedPriceOracle, FixedWithdrawalFeeOracle};
