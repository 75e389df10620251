//! Market Snapshot (C2): per-invocation matrices derived from live exchange
//! and oracle state, keyed by the node indices of a fixed `MarketGraph`.

use std::collections::HashMap;

use futures::future::join_all;
use ndarray::Array2;
use tracing::warn;

use crate::config::Config;
use crate::exchange::{ExchangeClient, WithdrawalFee};
use crate::graph::MarketGraph;
use crate::model::NodeId;
use crate::oracle::{RefPriceOracle, WithdrawalFeeOracle};

/// `{balance, usd_balance}` per node.
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeBalance {
    pub balance: f64,
    pub usd_balance: f64,
}

/// The live matrices that feed C3/C4, rebuilt (in whole or in part) every
/// `find_arbitrage` call.
#[derive(Debug, Clone)]
pub struct MarketSnapshot {
    pub transit_price: Array2<f64>,
    pub commission: Array2<f64>,
    pub vol_matrix: Array2<f64>,
    pub balance: HashMap<NodeId, NodeBalance>,
    pub withdrawal_fee: HashMap<NodeId, WithdrawalFee>,
    pub ref_price: HashMap<String, f64>,
}

impl MarketSnapshot {
    pub fn empty(n: usize) -> Self {
        Self {
            transit_price: Array2::zeros((n, n)),
            commission: Array2::zeros((n, n)),
            vol_matrix: Array2::zeros((n, n)),
            balance: HashMap::new(),
            withdrawal_fee: HashMap::new(),
            ref_price: HashMap::new(),
        }
    }

    /// Nodes whose USD balance meets `min_trading_limit`, sorted by USD
    /// balance descending (the "required currencies" changeable-constraint
    /// set consumed by C3).
    pub fn required_currencies(&self, min_trading_limit: f64) -> Vec<NodeId> {
        let mut funded: Vec<(NodeId, f64)> = self
            .balance
            .iter()
            .filter(|(_, b)| b.usd_balance >= min_trading_limit)
            .map(|(&id, b)| (id, b.usd_balance))
            .collect();
        funded.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        funded.into_iter().map(|(id, _)| id).collect()
    }
}

/// `update_transit_price()`: tickers fetched in parallel across exchanges;
/// an individual exchange's failure degrades that exchange's edges to zero
/// rather than aborting the whole refresh.
pub async fn update_transit_price(
    graph: &MarketGraph,
    clients: &HashMap<String, Box<dyn ExchangeClient>>,
    snapshot: &mut MarketSnapshot,
) {
    let fetches = clients.iter().map(|(exchange, client)| async move {
        match client.fetch_tickers().await {
            Ok(tickers) => Some((exchange.clone(), tickers)),
            Err(err) => {
                warn!(exchange = %exchange, error = %err, "ticker fetch failed, edges degraded to zero");
                None
            }
        }
    });

    for (exchange, tickers) in join_all(fetches).await.into_iter().flatten() {
        for (pair, ticker) in tickers {
            if !ticker.is_usable() {
                continue;
            }
            let Some((base, quote)) = pair.split_once('/') else {
                continue;
            };
            let (Some(i), Some(j)) = (
                graph.index_of(&crate::model::Node::new(exchange.clone(), base.to_string())),
                graph.index_of(&crate::model::Node::new(exchange.clone(), quote.to_string())),
            ) else {
                continue;
            };
            snapshot.transit_price[[i, j]] = ticker.bid;
            if ticker.ask != 0.0 {
                snapshot.transit_price[[j, i]] = 1.0 / ticker.ask;
            }
        }
    }

    for i in 0..graph.len() {
        for j in 0..graph.len() {
            if i == j || !graph.is_inter_exchange(i, j) || !graph.is_feasible(i, j) {
                continue;
            }
            let transferable = snapshot.withdrawal_fee.contains_key(&i);
            snapshot.transit_price[[i, j]] = if transferable { 1.0 } else { 0.0 };
        }
    }
}

/// `update_balance()`: free balances fetched in parallel, or taken verbatim
/// from `Config::simulated_balance` when provided.
pub async fn update_balance(
    graph: &MarketGraph,
    clients: &HashMap<String, Box<dyn ExchangeClient>>,
    config: &Config,
    snapshot: &mut MarketSnapshot,
) {
    snapshot.balance.clear();

    if let Some(simulated) = &config.simulated_balance {
        for (exchange, per_currency) in simulated {
            for (currency, amount) in per_currency {
                if let Some(id) = graph.index_of(&crate::model::Node::new(exchange.clone(), currency.clone())) {
                    let price = snapshot.ref_price.get(currency).copied().unwrap_or(0.0);
                    snapshot.balance.insert(
                        id,
                        NodeBalance {
                            balance: *amount,
                            usd_balance: amount * price,
                        },
                    );
                }
            }
        }
        return;
    }

    let fetches = clients.iter().map(|(exchange, client)| async move {
        match client.fetch_free_balance().await {
            Ok(balances) => Some((exchange.clone(), balances)),
            Err(err) => {
                warn!(exchange = %exchange, error = %err, "balance fetch failed, treated as zero");
                None
            }
        }
    });

    for (exchange, balances) in join_all(fetches).await.into_iter().flatten() {
        for (currency, amount) in balances {
            if let Some(id) = graph.index_of(&crate::model::Node::new(exchange.clone(), currency.clone())) {
                let price = snapshot.ref_price.get(&currency).copied().unwrap_or(0.0);
                snapshot.balance.insert(
                    id,
                    NodeBalance {
                        balance: amount,
                        usd_balance: amount * price,
                    },
                );
            }
        }
    }
}

/// `update_commission_fee()`.
pub fn update_commission_fee(graph: &MarketGraph, config: &Config, snapshot: &mut MarketSnapshot) {
    for i in 0..graph.len() {
        for j in 0..graph.len() {
            if !graph.is_feasible(i, j) {
                continue;
            }
            snapshot.commission[[i, j]] = if graph.is_inter_exchange(i, j) {
                snapshot
                    .withdrawal_fee
                    .get(&i)
                    .map(|fee| fee.usd_rate)
                    .unwrap_or(0.0)
            } else {
                config.trading_fee_for(&graph.node(i).exchange)
            };
        }
    }
}

/// `update_vol_matrix(percentile)`: USD notional proxy used as the MIP-1
/// liquidity gate.
pub async fn update_vol_matrix(
    graph: &MarketGraph,
    clients: &HashMap<String, Box<dyn ExchangeClient>>,
    config: &Config,
    snapshot: &mut MarketSnapshot,
    percentile: f64,
) {
    let fetches = clients.iter().map(|(exchange, client)| async move {
        match client.fetch_tickers().await {
            Ok(tickers) => Some((exchange.clone(), tickers)),
            Err(_) => None,
        }
    });

    for (exchange, tickers) in join_all(fetches).await.into_iter().flatten() {
        for (pair, ticker) in tickers {
            let Some(base_volume) = ticker.base_volume else {
                continue;
            };
            let Some((base, quote)) = pair.split_once('/') else {
                continue;
            };
            // USD notional is base volume times the base coin's USD
            // reference price, not the pair's own quote-denominated rate.
            let Some(&base_price) = snapshot.ref_price.get(base) else {
                continue;
            };
            let (Some(i), Some(j)) = (
                graph.index_of(&crate::model::Node::new(exchange.clone(), base.to_string())),
                graph.index_of(&crate::model::Node::new(exchange.clone(), quote.to_string())),
            ) else {
                continue;
            };
            let notional = base_volume * base_price * percentile;
            snapshot.vol_matrix[[i, j]] = notional;
            snapshot.vol_matrix[[j, i]] = notional;
        }
    }

    for i in 0..graph.len() {
        for j in 0..graph.len() {
            if i == j || !graph.is_inter_exchange(i, j) || !graph.is_feasible(i, j) {
                continue;
            }
            let to_balance_usd = snapshot.balance.get(&j).map(|b| b.usd_balance).unwrap_or(0.0);
            let from_withdraw_usd = snapshot
                .withdrawal_fee
                .get(&i)
                .map(|fee| fee.usd_fee)
                .unwrap_or(0.0);
            snapshot.vol_matrix[[i, j]] = if config.consider_inter_exc_bal {
                to_balance_usd + from_withdraw_usd
            } else {
                f64::INFINITY
            };
        }
    }
}

/// `update_ref_coin_price()`.
pub async fn update_ref_coin_price(
    graph: &MarketGraph,
    oracle: &dyn RefPriceOracle,
    snapshot: &mut MarketSnapshot,
) -> Result<(), crate::error::OracleError> {
    let symbols = graph.nodes().iter().map(|n| n.currency.clone()).collect();
    let prices = oracle.get_usd_prices(&symbols).await?;
    snapshot.ref_price = prices;
    Ok(())
}

/// `update_withdrawal_fee()`.
pub async fn update_withdrawal_fee(
    graph: &MarketGraph,
    clients: &HashMap<String, Box<dyn ExchangeClient>>,
    oracle: &dyn WithdrawalFeeOracle,
    config: &Config,
    snapshot: &mut MarketSnapshot,
) {
    snapshot.withdrawal_fee.clear();

    for exchange in clients.keys() {
        match oracle
            .get_withdrawal_fees(exchange, config.interex_trading_size)
            .await
        {
            Ok(fees) => {
                for (currency, fee) in fees {
                    if let Some(id) = graph.index_of(&crate::model::Node::new(exchange.clone(), currency)) {
                        snapshot.withdrawal_fee.insert(id, fee);
                    }
                }
            }
            Err(err) => {
                warn!(exchange = %exchange, error = %err, "withdrawal fee fetch failed, nodes treated as non-transferable");
            }
        }
    }
}

/// Whether the `refresh_time`-gated updates (`withdrawal_fee`, `commission`,
/// reference price) should run on this invocation counter.
pub fn is_refresh_due(run_count: u64, refresh_time: u64) -> bool {
    run_count % refresh_time.max(1) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_due_on_first_and_every_rth_call() {
        assert!(is_refresh_due(0, 1000));
        assert!(!is_refresh_due(1, 1000));
        assert!(is_refresh_due(1000, 1000));
    }

    #[test]
    fn required_currencies_sorted_descending_by_usd_balance() {
        let mut snapshot = MarketSnapshot::empty(3);
        snapshot.balance.insert(0, NodeBalance { balance: 1.0, usd_balance: 50.0 });
        snapshot.balance.insert(1, NodeBalance { balance: 1.0, usd_balance: 200.0 });
        snapshot.balance.insert(2, NodeBalance { balance: 1.0, usd_balance: 5.0 });

        let required = snapshot.required_currencies(10.0);
        assert_eq!(required, vec![1, 0]);
    }

    #[tokio::test]
    async fn vol_matrix_uses_base_ref_price_not_pair_quote_rate() {
        use crate::testing::MockExchangeClient;

        let listings = vec![crate::graph::ExchangeListing {
            exchange: "x".to_string(),
            currencies: vec!["BTC".to_string(), "ETH".to_string()],
            pairs: vec!["BTC/ETH".to_string()],
            precision: HashMap::new(),
        }];
        let graph = crate::graph::build_graph(&listings, &std::collections::HashSet::new(), false, false, |_| true);
        let mut snapshot = MarketSnapshot::empty(graph.len());
        // BTC's USD reference price is far from the pair's own bid/ask (a
        // BTC/ETH rate around 15), so a correct implementation must ignore
        // ticker.bid/ask entirely when computing USD notional.
        snapshot.ref_price.insert("BTC".to_string(), 20_000.0);

        let client = MockExchangeClient::new("x").with_ticker("BTC/ETH", 15.0, 15.2, Some(2.0));
        let mut clients: HashMap<String, Box<dyn ExchangeClient>> = HashMap::new();
        clients.insert("x".to_string(), Box::new(client));

        let config = Config::default();
        update_vol_matrix(&graph, &clients, &config, &mut snapshot, 0.01).await;

        let btc = graph.index_of(&crate::model::Node::new("x", "BTC")).unwrap();
        let eth = graph.index_of(&crate::model::Node::new("x", "ETH")).unwrap();

        let expected = 2.0 * 20_000.0 * 0.01;
        assert_eq!(snapshot.vol_matrix[[btc, eth]], expected);
        assert_eq!(snapshot.vol_matrix[[eth, btc]], expected);
    }

    #[tokio::test]
    async fn vol_matrix_skips_pair_with_no_base_ref_price() {
        use crate::testing::MockExchangeClient;

        let listings = vec![crate::graph::ExchangeListing {
            exchange: "x".to_string(),
            currencies: vec!["BTC".to_string(), "ETH".to_string()],
            pairs: vec!["BTC/ETH".to_string()],
            precision: HashMap::new(),
        }];
        let graph = crate::graph::build_graph(&listings, &std::collections::HashSet::new(), false, false, |_| true);
        let mut snapshot = MarketSnapshot::empty(graph.len());
        // No ref_price entry for BTC at all.

        let client = MockExchangeClient::new("x").with_ticker("BTC/ETH", 15.0, 15.2, Some(2.0));
        let mut clients: HashMap<String, Box<dyn ExchangeClient>> = HashMap::new();
        clients.insert("x".to_string(), Box::new(client));

        let config = Config::default();
        update_vol_matrix(&graph, &clients, &config, &mut snapshot, 0.01).await;

        let btc = graph.index_of(&crate::model::Node::new("x", "BTC")).unwrap();
        let eth = graph.index_of(&crate::model::Node::new("x", "ETH")).unwrap();
        assert_eq!(snapshot.vol_matrix[[btc, eth]], 0.0);
        assert_eq!(snapshot.vol_matrix[[eth, btc]], 0.0);
    }

    #[tokio::test]
    async fn withdrawal_fee_populates_commission_for_inter_exchange_edges() {
        use crate::exchange::WithdrawalFee;
        use crate::testing::{FixedWithdrawalFeeOracle, MockExchangeClient};

        let listings = vec![
            crate::graph::ExchangeListing {
                exchange: "x".to_string(),
                currencies: vec!["BTC".to_string()],
                pairs: vec![],
                precision: HashMap::new(),
            },
            crate::graph::ExchangeListing {
                exchange: "y".to_string(),
                currencies: vec!["BTC".to_string()],
                pairs: vec![],
                precision: HashMap::new(),
            },
        ];
        let graph = crate::graph::build_graph(&listings, &std::collections::HashSet::new(), false, true, |_| true);
        let mut snapshot = MarketSnapshot::empty(graph.len());

        let oracle = FixedWithdrawalFeeOracle::new().with_fee(
            "x",
            "BTC",
            WithdrawalFee { usd_fee: 10.0, usd_rate: 0.001, coin_fee: 0.0005 },
        );
        let config = Config::default();
        let mut clients: HashMap<String, Box<dyn ExchangeClient>> = HashMap::new();
        clients.insert("x".to_string(), Box::new(MockExchangeClient::new("x")));
        clients.insert("y".to_string(), Box::new(MockExchangeClient::new("y")));

        update_withdrawal_fee(&graph, &clients, &oracle, &config, &mut snapshot).await;

        let x_btc = graph.index_of(&crate::model::Node::new("x", "BTC")).unwrap();
        assert_eq!(snapshot.withdrawal_fee.get(&x_btc).unwrap().usd_rate, 0.001);

        update_commission_fee(&graph, &config, &mut snapshot);
        let y_btc = graph.index_of(&crate::model::Node::new("y", "BTC")).unwrap();
        assert_eq!(snapshot.commission[[x_btc, y_btc]], 0.001);
    }

    #[tokio::test]
    async fn withdrawal_fee_fetch_failure_leaves_node_non_transferable() {
        use crate::testing::FailingWithdrawalFeeOracle;

        let listings = vec![crate::graph::ExchangeListing {
            exchange: "x".to_string(),
            currencies: vec!["BTC".to_string()],
            pairs: vec![],
            precision: HashMap::new(),
        }];
        let graph = crate::graph::build_graph(&listings, &std::collections::HashSet::new(), false, true, |_| true);
        let mut snapshot = MarketSnapshot::empty(graph.len());

        let oracle = FailingWithdrawalFeeOracle;
        let config = Config::default();
        let mut clients: HashMap<String, Box<dyn ExchangeClient>> = HashMap::new();
        clients.insert("x".to_string(), Box::new(crate::testing::MockExchangeClient::new("x")));

        update_withdrawal_fee(&graph, &clients, &oracle, &config, &mut snapshot).await;
        assert!(snapshot.withdrawal_fee.is_empty());
    }
}
