//! In-memory `ExchangeClient` test double, driven from fixed fixture
//! tables rather than live HTTP.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::exchange::{
    CreateOrderRequest, DepositAddress, ExchangeClient, Market, OrderBook, OrderHandle, OrderStatus, Ticker,
    WithdrawRequest,
};

#[derive(Debug, Clone, Default)]
pub struct MockExchangeClient {
    name: String,
    currencies: Vec<String>,
    markets: HashMap<String, Market>,
    tickers: HashMap<String, Ticker>,
    order_books: HashMap<String, OrderBook>,
    balances: HashMap<String, f64>,
    deposit_addresses: HashMap<String, DepositAddress>,
    orders_submitted: std::sync::Arc<Mutex<Vec<CreateOrderRequest>>>,
}

impl MockExchangeClient {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currencies.push(currency.into());
        self
    }

    pub fn with_market(mut self, pair: impl Into<String>, precision: Option<u32>) -> Self {
        self.markets
            .insert(pair.into(), Market { amount_precision: precision });
        self
    }

    pub fn with_ticker(mut self, pair: impl Into<String>, bid: f64, ask: f64, base_volume: Option<f64>) -> Self {
        self.tickers.insert(pair.into(), Ticker { bid, ask, base_volume });
        self
    }

    pub fn with_order_book(mut self, pair: impl Into<String>, bids: Vec<(f64, f64)>, asks: Vec<(f64, f64)>) -> Self {
        self.order_books.insert(pair.into(), OrderBook { bids, asks });
        self
    }

    pub fn with_balance(mut self, currency: impl Into<String>, amount: f64) -> Self {
        self.balances.insert(currency.into(), amount);
        self
    }

    pub fn with_deposit_address(mut self, currency: impl Into<String>, address: impl Into<String>) -> Self {
        self.deposit_addresses.insert(
            currency.into(),
            DepositAddress {
                address: address.into(),
                tag: None,
            },
        );
        self
    }

    pub fn submitted_orders(&self) -> Vec<CreateOrderRequest> {
        self.orders_submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExchangeClient for MockExchangeClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load_markets(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn currencies(&self) -> Vec<String> {
        self.currencies.clone()
    }

    fn markets(&self) -> HashMap<String, Market> {
        self.markets.clone()
    }

    async fn fetch_tickers(&self) -> anyhow::Result<HashMap<String, Ticker>> {
        Ok(self.tickers.clone())
    }

    async fn fetch_order_book(&self, pair: &str) -> anyhow::Result<OrderBook> {
        Ok(self.order_books.get(pair).cloned().unwrap_or_default())
    }

    async fn fetch_free_balance(&self) -> anyhow::Result<HashMap<String, f64>> {
        Ok(self.balances.clone())
    }

    async fn create_order(&self, request: CreateOrderRequest) -> anyhow::Result<OrderHandle> {
        let symbol = request.symbol.clone();
        self.orders_submitted.lock().unwrap().push(request);
        Ok(OrderHandle {
            order_id: format!("mock-order-{}", self.orders_submitted.lock().unwrap().len()),
            symbol,
        })
    }

    async fn fetch_order_status(&self, _order_id: &str, _symbol: &str) -> anyhow::Result<OrderStatus> {
        Ok(OrderStatus::Closed)
    }

    async fn cancel_order(&self, _order_id: &str, _symbol: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn fetch_deposit_address(&self, coin: &str) -> anyhow::Result<DepositAddress> {
        self.deposit_addresses
            .get(coin)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no deposit address configured for {coin}"))
    }

    async fn withdraw(&self, _request: WithdrawRequest) -> anyhow::Result<()> {
        Ok(())
    }
}

/// An `ExchangeClient` whose every method fails, used to exercise the
/// graceful-degradation paths in `snapshot`.
#[derive(Debug, Clone, Default)]
pub struct FailingExchangeClient {
    pub name: String,
}

#[async_trait]
impl ExchangeClient for FailingExchangeClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load_markets(&self) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("load_markets unavailable"))
    }

    fn currencies(&self) -> Vec<String> {
        Vec::new()
    }

    fn markets(&self) -> HashMap<String, Market> {
        HashMap::new()
    }

    async fn fetch_tickers(&self) -> anyhow::Result<HashMap<String, Ticker>> {
        Err(anyhow::anyhow!("tickers unavailable"))
    }

    async fn fetch_order_book(&self, _pair: &str) -> anyhow::Result<OrderBook> {
        Err(anyhow::anyhow!("order book unavailable"))
    }

    async fn fetch_free_balance(&self) -> anyhow::Result<HashMap<String, f64>> {
        Err(anyhow::anyhow!("balance unavailable"))
    }

    async fn create_order(&self, _request: CreateOrderRequest) -> anyhow::Result<OrderHandle> {
        Err(anyhow::anyhow!("order submission unavailable"))
    }

    async fn fetch_order_status(&self, _order_id: &str, _symbol: &str) -> anyhow::Result<OrderStatus> {
        Err(anyhow::anyhow!("order status unavailable"))
    }

    async fn cancel_order(&self, _order_id: &str, _symbol: &str) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("cancel unavailable"))
    }

    async fn fetch_deposit_address(&self, _coin: &str) -> anyhow::Result<DepositAddress> {
        Err(anyhow::anyhow!("deposit address unavailable"))
    }

    async fn withdraw(&self, _request: WithdrawRequest) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("withdraw unavailable"))
    }
}
