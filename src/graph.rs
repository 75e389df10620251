//! Market Graph Builder (C1): the node set and the feasible-edge skeleton.
//!
//! Built once per process and reused across invocations; only the matrices
//! in `snapshot::MarketSnapshot` change between calls to `find_arbitrage`.

use std::collections::{HashMap, HashSet};

use ndarray::Array2;
use tracing::{debug, info};

use crate::model::{Node, NodeId};

/// Intra-exchange tradable-pair metadata for a directed `(from, to)` edge,
/// needed by the amount optimizer (C4) to orient and discretize a leg.
#[derive(Debug, Clone)]
pub struct PairInfo {
    /// The exchange's own `"BASE/QUOTE"` symbol for this market.
    pub symbol: String,
    /// True when travelling `from -> to` means buying the pair's base
    /// currency with its quote currency (an ask-side, reversed leg).
    pub reversed: bool,
    /// Amount precision reported by the exchange for this market, if any.
    pub precision: Option<u32>,
}

/// The node set, the node<->index bijection, and the boolean feasibility
/// matrix that bounds every later MIP-1 variable.
#[derive(Debug, Clone)]
pub struct MarketGraph {
    nodes: Vec<Node>,
    index_of: HashMap<Node, NodeId>,
    /// `var_location[i][j]` true iff an edge from `i` to `j` is feasible
    /// (listed intra-exchange pair in either direction, or an inter-exchange
    /// transfer candidate).
    var_location: Array2<bool>,
    pair_info: HashMap<(NodeId, NodeId), PairInfo>,
}

impl MarketGraph {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn index_of(&self, node: &Node) -> Option<NodeId> {
        self.index_of.get(node).copied()
    }

    pub fn is_feasible(&self, from: NodeId, to: NodeId) -> bool {
        self.var_location[[from, to]]
    }

    pub fn var_location(&self) -> &Array2<bool> {
        &self.var_location
    }

    /// True iff `from` and `to` are on different exchanges (and thus an edge
    /// between them, if any, is an inter-exchange transfer).
    pub fn is_inter_exchange(&self, from: NodeId, to: NodeId) -> bool {
        self.nodes[from].exchange != self.nodes[to].exchange
    }

    /// Tradable-pair metadata for an intra-exchange directed edge. `None`
    /// for inter-exchange edges and for edges with no listed pair.
    pub fn pair_info(&self, from: NodeId, to: NodeId) -> Option<&PairInfo> {
        self.pair_info.get(&(from, to))
    }
}

/// Per-exchange listed currencies and tradable pairs, as reported by
/// `ExchangeClient::currencies`/`markets` after `load_markets`. Kept
/// deliberately decoupled from the live trait so the builder can be driven
/// by tests without an async client.
pub struct ExchangeListing {
    pub exchange: String,
    pub currencies: Vec<String>,
    /// `"BASE/QUOTE"` tradable pairs.
    pub pairs: Vec<String>,
    /// Amount precision per pair, keyed the same as `pairs`. Missing entries
    /// fall back to `Config::default_precision` downstream.
    pub precision: HashMap<String, u32>,
}

/// `init_currency_info()` + `get_inter_convert_list()` + `get_var_location()`.
///
/// `has_usd_price` gates whether a currency symbol has a usable reference USD
/// price; currencies without one are dropped from the node set, mirroring
/// the original's "no ref price, can't value it" exclusion.
pub fn build_graph(
    listings: &[ExchangeListing],
    fiat_set: &HashSet<String>,
    include_fiat: bool,
    inter_exchange_trading: bool,
    has_usd_price: impl Fn(&str) -> bool,
) -> MarketGraph {
    let mut nodes = Vec::new();
    let mut index_of = HashMap::new();

    for listing in listings {
        for currency in &listing.currencies {
            if !include_fiat && fiat_set.contains(currency.as_str()) {
                continue;
            }
            if !has_usd_price(currency) {
                continue;
            }
            let node = Node::new(listing.exchange.clone(), currency.clone());
            if index_of.contains_key(&node) {
                continue;
            }
            let id = nodes.len();
            index_of.insert(node.clone(), id);
            nodes.push(node);
        }
    }

    let n = nodes.len();
    let mut var_location = Array2::from_elem((n, n), false);
    let mut pair_info = HashMap::new();

    for listing in listings {
        for pair in &listing.pairs {
            let Some((base, quote)) = pair.split_once('/') else {
                continue;
            };
            let base_node = Node::new(listing.exchange.clone(), base.to_string());
            let quote_node = Node::new(listing.exchange.clone(), quote.to_string());
            let (Some(&i), Some(&j)) = (index_of.get(&base_node), index_of.get(&quote_node)) else {
                continue;
            };
            var_location[[i, j]] = true;
            var_location[[j, i]] = true;

            let precision = listing.precision.get(pair).copied();
            pair_info.insert(
                (i, j),
                PairInfo {
                    symbol: pair.clone(),
                    reversed: false,
                    precision,
                },
            );
            pair_info.insert(
                (j, i),
                PairInfo {
                    symbol: pair.clone(),
                    reversed: true,
                    precision,
                },
            );
        }
    }

    if inter_exchange_trading {
        for candidates in inter_convert_groups(&nodes) {
            for a in 0..candidates.len() {
                for b in (a + 1)..candidates.len() {
                    let i = candidates[a];
                    let j = candidates[b];
                    var_location[[i, j]] = true;
                    var_location[[j, i]] = true;
                }
            }
        }
    }

    debug!(nodes = n, "market graph built");
    info!(nodes = n, "market graph ready");

    MarketGraph {
        nodes,
        index_of,
        var_location,
        pair_info,
    }
}

/// `get_inter_convert_list()`: group node indices by currency symbol,
/// keeping only groups with at least two nodes (i.e. listed on at least two
/// exchanges), which are the inter-exchange transfer candidates.
fn inter_convert_groups(nodes: &[Node]) -> Vec<Vec<NodeId>> {
    let mut by_currency: HashMap<&str, Vec<NodeId>> = HashMap::new();
    for (id, node) in nodes.iter().enumerate() {
        by_currency.entry(node.currency.as_str()).or_default().push(id);
    }
    by_currency.into_values().filter(|group| group.len() >= 2).collect()
}
