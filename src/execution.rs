//! Execution Interface (C5): translates a solved cycle + leg sizing into
//! typed trade orders, plus a reference orchestration (`TradeExecutor`) that
//! dispatches them against `ExchangeClient`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rust_decimal::prelude::ToPrimitive;
use tracing::{error, info, warn};

use crate::exchange::{CreateOrderRequest, ExchangeClient, OrderSide, WithdrawRequest};
use crate::graph::MarketGraph;
use crate::model::{AmountResult, Direction};

/// One trade instruction, derived from a `LegSolution` and its graph edge.
#[derive(Debug, Clone)]
pub struct TradeOrder {
    pub exchange: String,
    pub symbol: String,
    pub side: OrderSide,
    pub amount: f64,
    pub price: f64,
}

/// An inter-exchange leg, expressed as a withdrawal from the sending node's
/// exchange to the receiving node's exchange.
#[derive(Debug, Clone)]
pub struct TransferOrder {
    pub from_exchange: String,
    pub to_exchange: String,
    pub currency: String,
    pub amount: f64,
}

/// Ordered dispatch plan for one solved cycle: intra-exchange orders grouped
/// by exchange (dispatched concurrently) and inter-exchange transfers in
/// path order (dispatched sequentially, after all intra orders succeed).
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    pub intra_orders: HashMap<String, Vec<TradeOrder>>,
    pub transfers: Vec<TransferOrder>,
}

/// Builds the leg mapping described in §4.5 from an amount-optimizer result.
pub fn build_execution_plan(graph: &MarketGraph, amounts: &AmountResult) -> ExecutionPlan {
    let mut plan = ExecutionPlan::default();

    for &((from, to), ref leg) in &amounts.legs {
        if graph.is_inter_exchange(from, to) {
            plan.transfers.push(TransferOrder {
                from_exchange: graph.node(from).exchange.clone(),
                to_exchange: graph.node(to).exchange.clone(),
                currency: graph.node(from).currency.clone(),
                amount: leg.volume.to_f64().unwrap_or(0.0),
            });
            continue;
        }

        let Some(info) = graph.pair_info(from, to) else {
            continue;
        };
        let side = match leg.direction {
            Direction::BidSell => OrderSide::Sell,
            Direction::AskBuy => OrderSide::Buy,
        };
        plan.intra_orders
            .entry(graph.node(from).exchange.clone())
            .or_default()
            .push(TradeOrder {
                exchange: graph.node(from).exchange.clone(),
                symbol: info.symbol.clone(),
                side,
                amount: leg.volume.to_f64().unwrap_or(0.0),
                price: leg.price.to_f64().unwrap_or(0.0),
            });
    }

    plan
}

/// Reference orchestration over `ExecutionPlan`: runs every exchange's
/// intra-exchange order group concurrently, stops issuing further orders in
/// a group as soon as any group reports failure (via a shared flag rather
/// than hard task cancellation, since `ExchangeClient` does not expose a
/// native interrupt), then performs inter-exchange withdrawals in path order
/// only if every intra-exchange group fully succeeded.
pub struct TradeExecutor {
    clients: HashMap<String, Box<dyn ExchangeClient>>,
}

impl TradeExecutor {
    pub fn new(clients: HashMap<String, Box<dyn ExchangeClient>>) -> Self {
        Self { clients }
    }

    pub async fn execute(&self, plan: &ExecutionPlan) -> bool {
        let stop = Arc::new(AtomicBool::new(false));

        let intra_results = futures::future::join_all(plan.intra_orders.iter().map(|(exchange, orders)| {
            let stop = stop.clone();
            async move { self.run_intra_group(exchange, orders, stop).await }
        }))
        .await;

        if intra_results.iter().any(|ok| !ok) {
            error!("one or more intra-exchange legs failed, aborting before transfers");
            return false;
        }

        for transfer in &plan.transfers {
            if !self.run_transfer(transfer).await {
                error!(currency = %transfer.currency, "inter-exchange transfer failed");
                return false;
            }
        }

        info!("execution plan completed");
        true
    }

    async fn run_intra_group(&self, exchange: &str, orders: &[TradeOrder], stop: Arc<AtomicBool>) -> bool {
        let Some(client) = self.clients.get(exchange) else {
            warn!(exchange, "no client configured for intra-exchange group");
            return false;
        };

        for order in orders {
            if stop.load(Ordering::SeqCst) {
                warn!(exchange, "skipping remaining orders after sibling failure");
                return false;
            }
            let request = CreateOrderRequest {
                symbol: order.symbol.clone(),
                side: order.side,
                amount: order.amount,
                price: order.price,
            };
            if let Err(err) = client.create_order(request).await {
                error!(exchange, symbol = %order.symbol, error = %err, "order submission failed");
                stop.store(true, Ordering::SeqCst);
                return false;
            }
        }
        true
    }

    async fn run_transfer(&self, transfer: &TransferOrder) -> bool {
        let Some(sender) = self.clients.get(&transfer.from_exchange) else {
            return false;
        };
        let Some(receiver) = self.clients.get(&transfer.to_exchange) else {
            return false;
        };

        let deposit = match receiver.fetch_deposit_address(&transfer.currency).await {
            Ok(address) => address,
            Err(err) => {
                error!(error = %err, "deposit address lookup failed");
                return false;
            }
        };

        let request = WithdrawRequest {
            code: transfer.currency.clone(),
            amount: transfer.amount,
            address: deposit.address,
            tag: deposit.tag,
        };
        if let Err(err) = sender.withdraw(request).await {
            error!(error = %err, "withdrawal failed");
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{build_graph, ExchangeListing};
    use crate::model::{AmountResult, LegSolution};
    use rust_decimal::Decimal;
    use std::collections::HashSet;

    fn sample_graph() -> MarketGraph {
        let listings = vec![ExchangeListing {
            exchange: "x".to_string(),
            currencies: vec!["BTC".to_string(), "USDT".to_string()],
            pairs: vec!["BTC/USDT".to_string()],
            precision: HashMap::new(),
        }];
        build_graph(&listings, &HashSet::new(), false, false, |_| true)
    }

    #[test]
    fn build_plan_groups_intra_legs_by_exchange() {
        let graph = sample_graph();
        let usdt = graph.index_of(&crate::model::Node::new("x", "USDT")).unwrap();
        let btc = graph.index_of(&crate::model::Node::new("x", "BTC")).unwrap();

        let amounts = AmountResult {
            legs: vec![(
                (usdt, btc),
                LegSolution {
                    volume: Decimal::new(1, 1),
                    price: Decimal::new(20000, 0),
                    direction: Direction::AskBuy,
                },
            )],
            objective: 1.0,
        };

        let plan = build_execution_plan(&graph, &amounts);
        assert_eq!(plan.intra_orders.get("x").map(|v| v.len()), Some(1));
        assert!(plan.transfers.is_empty());
        assert_eq!(plan.intra_orders["x"][0].side, OrderSide::Buy);
    }
}
