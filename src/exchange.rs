//! The exchange adapter contract (§6). This crate treats concrete exchange
//! connectivity as an external collaborator: everything here is a trait plus
//! plain data, with the real HTTP/WebSocket plumbing left to the embedder.
//! `testing::MockExchangeClient` is the in-memory implementation used by this
//! crate's own tests.

use std::collections::HashMap;

use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Market {
    /// Number of decimal digits of amount precision, if the exchange reports one.
    pub amount_precision: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Ticker {
    pub bid: f64,
    pub ask: f64,
    pub base_volume: Option<f64>,
}

impl Ticker {
    pub fn is_usable(&self) -> bool {
        self.bid != 0.0 && self.ask != 0.0
    }
}

/// One side of an order book, best price first, with raw (non-cumulative) size.
#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    pub bids: Vec<(f64, f64)>,
    pub asks: Vec<(f64, f64)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone)]
pub struct CreateOrderRequest {
    /// `"BASE/QUOTE"` symbol in the exchange's own orientation.
    pub symbol: String,
    pub side: OrderSide,
    pub amount: f64,
    pub price: f64,
}

#[derive(Debug, Clone)]
pub struct OrderHandle {
    pub order_id: String,
    pub symbol: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Open,
    Closed,
    Canceled,
}

#[derive(Debug, Clone)]
pub struct DepositAddress {
    pub address: String,
    pub tag: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WithdrawRequest {
    pub code: String,
    pub amount: f64,
    pub address: String,
    pub tag: Option<String>,
}

/// Per-node withdrawal fee record, as produced by the withdrawal-fee oracle.
#[derive(Debug, Clone, Copy, Default)]
pub struct WithdrawalFee {
    pub usd_fee: f64,
    pub usd_rate: f64,
    pub coin_fee: f64,
}

/// One exchange's API surface, per §6.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    fn name(&self) -> &str;

    /// Populate/refresh `markets()` and `currencies()`. Must be called before
    /// either is relied upon.
    async fn load_markets(&self) -> anyhow::Result<()>;

    fn currencies(&self) -> Vec<String>;

    /// `"BASE/QUOTE" -> Market`.
    fn markets(&self) -> HashMap<String, Market>;

    /// `"BASE/QUOTE" -> Ticker`; bid/ask of zero means the pair is unusable.
    async fn fetch_tickers(&self) -> anyhow::Result<HashMap<String, Ticker>>;

    async fn fetch_order_book(&self, pair: &str) -> anyhow::Result<OrderBook>;

    /// `currency -> free units`.
    async fn fetch_free_balance(&self) -> anyhow::Result<HashMap<String, f64>>;

    async fn create_order(&self, request: CreateOrderRequest) -> anyhow::Result<OrderHandle>;

    async fn fetch_order_status(&self, order_id: &str, symbol: &str) -> anyhow::Result<OrderStatus>;

    async fn cancel_order(&self, order_id: &str, symbol: &str) -> anyhow::Result<()>;

    async fn fetch_deposit_address(&self, coin: &str) -> anyhow::Result<DepositAddress>;

    async fn withdraw(&self, request: WithdrawRequest) -> anyhow::Result<()>;
}
