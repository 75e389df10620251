//! Multi-exchange arbitrage core: graph construction, the path optimizer
//! (MIP-1), the amount optimizer (MIP-2), and the execution-plan interface
//! that consumes their output.
//!
//! Exchange connectivity, the withdrawal-fee/price oracles' transport, and
//! any wall-clock driver loop are treated as external collaborators (see
//! `exchange::ExchangeClient`, `oracle`); this crate owns only the
//! optimization core and the matrices that feed it.

pub mod amount_optimizer;
pub mod config;
pub mod error;
pub mod exchange;
pub mod execution;
pub mod graph;
pub mod model;
pub mod oracle;
pub mod path_optimizer;
pub mod persistence;
pub mod snapshot;

/// In-memory `ExchangeClient` test doubles, kept public so both this
/// crate's unit tests and the `tests/` integration suite can drive the
/// optimizers without live exchange connectivity.
pub mod testing;

use std::collections::HashMap;

use tracing::info;

use config::Config;
use error::ArbError;
use exchange::ExchangeClient;
use graph::{ExchangeListing, MarketGraph};
use model::{AmountResult, PathResult};
use oracle::{RefPriceOracle, WithdrawalFeeOracle};
use snapshot::MarketSnapshot;

/// Initializes a `tracing-subscriber` `fmt` layer with an env-filter default
/// of `info`, plus `debug` for this crate's own events. Embedders that want a
/// different subscriber (e.g. a JSON layer, or one already wired up
/// elsewhere) are free to skip this and set up `tracing` themselves; this is
/// offered as the same one-line default the teacher's own binary entry point
/// uses.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("info,xchange_arb_core=debug")
        .try_init()
        .ok();
}

/// Top-level orchestrator: owns the graph skeleton, the live snapshot, and
/// the invocation counter that drives the `refresh_time` cadence (§4.2,
/// §4.3 "State machine"). One instance corresponds to one running
/// `PathOptimizer`/`AmtOptimizer` pair in the original design.
pub struct ArbitrageEngine {
    graph: MarketGraph,
    config: Config,
    clients: HashMap<String, Box<dyn ExchangeClient>>,
    price_oracle: Box<dyn RefPriceOracle>,
    fee_oracle: Box<dyn WithdrawalFeeOracle>,
    snapshot: MarketSnapshot,
    run_count: u64,
}

impl ArbitrageEngine {
    /// One-time graph/variable setup. `listings` must reflect the result of
    /// calling `load_markets()` on every client beforehand.
    pub fn new(
        listings: &[ExchangeListing],
        clients: HashMap<String, Box<dyn ExchangeClient>>,
        price_oracle: Box<dyn RefPriceOracle>,
        fee_oracle: Box<dyn WithdrawalFeeOracle>,
        config: Config,
        has_usd_price: impl Fn(&str) -> bool,
    ) -> Result<Self, ArbError> {
        config.validate()?;

        let graph = graph::build_graph(
            listings,
            &config.fiat_set,
            config.include_fiat,
            config.inter_exchange_trading,
            has_usd_price,
        );
        let snapshot = MarketSnapshot::empty(graph.len());

        Ok(Self {
            graph,
            config,
            clients,
            price_oracle,
            fee_oracle,
            snapshot,
            run_count: 0,
        })
    }

    pub fn graph(&self) -> &MarketGraph {
        &self.graph
    }

    pub fn snapshot(&self) -> &MarketSnapshot {
        &self.snapshot
    }

    /// Refreshes the snapshot per the §4.2 cadence and runs C3. Mirrors
    /// `PathOptimizer.find_arbitrage()`.
    pub async fn find_arbitrage(&mut self) -> Result<PathResult, ArbError> {
        self.refresh_snapshot().await?;
        let result = path_optimizer::find_arbitrage(&self.graph, &self.snapshot, &self.config)?;
        info!(
            run = self.run_count,
            opportunity = result.has_opportunity(),
            profit_rate = result.profit_rate,
            "find_arbitrage complete"
        );
        self.run_count += 1;
        Ok(result)
    }

    /// Sizes a cycle already produced by `find_arbitrage`. Mirrors
    /// `AmtOptimizer.get_solution()`.
    pub async fn get_solution(&self, path: &PathResult) -> Result<AmountResult, ArbError> {
        if !path.has_opportunity() {
            return Ok(AmountResult::default());
        }
        let result = amount_optimizer::size_cycle(&self.graph, &self.snapshot, &self.config, &self.clients, &path.cycle)
            .await?;
        info!(
            workable = result.has_workable_solution(),
            objective = result.objective,
            "get_solution complete"
        );
        Ok(result)
    }

    async fn refresh_snapshot(&mut self) -> Result<(), ArbError> {
        let refresh_due = snapshot::is_refresh_due(self.run_count, self.config.refresh_time);

        if refresh_due {
            snapshot::update_ref_coin_price(&self.graph, self.price_oracle.as_ref(), &mut self.snapshot).await?;
            snapshot::update_withdrawal_fee(
                &self.graph,
                &self.clients,
                self.fee_oracle.as_ref(),
                &self.config,
                &mut self.snapshot,
            )
            .await;
        }

        snapshot::update_balance(&self.graph, &self.clients, &self.config, &mut self.snapshot).await;
        snapshot::update_transit_price(&self.graph, &self.clients, &mut self.snapshot).await;
        snapshot::update_vol_matrix(&self.graph, &self.clients, &self.config, &mut self.snapshot, 0.01).await;
        // Pure function of the (possibly just-refreshed) withdrawal fees and
        // the static trading-fee table; cheap enough to recompute every call.
        snapshot::update_commission_fee(&self.graph, &self.config, &mut self.snapshot);

        Ok(())
    }
}
