//! Path Optimizer (C3), MIP-1: select the best closed cycle of length ≤ `L`
//! maximizing the sum of log-edge-weights under flow and presence
//! constraints.

use std::collections::{HashMap, HashSet};

use good_lp::solvers::microlp::microlp;
use good_lp::{constraint, variable, Expression, ProblemVariables, ResolutionError, Solution, SolverModel, Variable};
use tracing::{debug, warn};

use crate::config::Config;
use crate::graph::MarketGraph;
use crate::model::{Cycle, NodeId, PathResult};
use crate::snapshot::MarketSnapshot;

/// `ε` in the required-currency changeable constraint (§4.3).
const CHANGEABLE_EPSILON: f64 = 1e-7;

/// `log(transit_price × (1 − commission))` for every feasible, liquid edge;
/// `None` for edges excluded by zero price, insufficient volume, or an
/// infeasible `var_location` entry.
fn edge_weight(graph: &MarketGraph, snapshot: &MarketSnapshot, config: &Config, i: NodeId, j: NodeId) -> Option<f64> {
    if i == j || !graph.is_feasible(i, j) {
        return None;
    }
    let price = snapshot.transit_price[[i, j]];
    if price <= 0.0 {
        return None;
    }
    if snapshot.vol_matrix[[i, j]] < config.min_trading_limit {
        return None;
    }
    let commission = snapshot.commission[[i, j]];
    let net = price * (1.0 - commission);
    if net <= 0.0 {
        return None;
    }
    Some(net.ln())
}

/// Finds the best closed arbitrage cycle, if any, under the current
/// snapshot. An infeasible or unbounded model is normalized to
/// `Ok(PathResult::default())`, matching "no opportunity"; any other solver
/// failure propagates as `SolveError::Backend`.
pub fn find_arbitrage(
    graph: &MarketGraph,
    snapshot: &MarketSnapshot,
    config: &Config,
) -> Result<PathResult, crate::error::SolveError> {
    let n = graph.len();
    if n == 0 {
        return Ok(PathResult::default());
    }

    let mut weights: HashMap<(NodeId, NodeId), f64> = HashMap::new();
    for i in 0..n {
        for j in 0..n {
            if let Some(w) = edge_weight(graph, snapshot, config, i, j) {
                weights.insert((i, j), w);
            }
        }
    }

    if weights.is_empty() {
        debug!("no liquid edges, skipping solve");
        return Ok(PathResult::default());
    }

    let mut vars = ProblemVariables::new();
    let mut x: HashMap<(NodeId, NodeId), Variable> = HashMap::new();
    for &(i, j) in weights.keys() {
        x.insert((i, j), vars.add(variable().binary()));
    }

    let objective: Expression = weights
        .iter()
        .map(|(&(i, j), &w)| w * x[&(i, j)])
        .sum();

    let mut model = vars.maximise(objective.clone()).using(microlp);

    // 1. Flow conservation per node.
    let mut out_edges: HashMap<NodeId, Vec<Variable>> = HashMap::new();
    let mut in_edges: HashMap<NodeId, Vec<Variable>> = HashMap::new();
    for (&(i, j), &var) in &x {
        out_edges.entry(i).or_default().push(var);
        in_edges.entry(j).or_default().push(var);
    }

    for node in 0..n {
        let out_sum: Expression = out_edges.get(&node).cloned().unwrap_or_default().into_iter().sum();
        let in_sum: Expression = in_edges.get(&node).cloned().unwrap_or_default().into_iter().sum();
        model = model.with(constraint!(out_sum.clone() == in_sum));
        // 2 & 3. At most one out-edge / in-edge per node.
        model = model.with(constraint!(out_sum <= 1));
        let in_sum: Expression = in_edges.get(&node).cloned().unwrap_or_default().into_iter().sum();
        model = model.with(constraint!(in_sum <= 1));
    }

    // 4. Path length bound.
    let total: Expression = x.values().cloned().sum();
    model = model.with(constraint!(total.clone() <= config.path_length as f64));

    // 5. Required-currency gate (changeable constraint).
    let required = snapshot.required_currencies(config.min_trading_limit);
    if !required.is_empty() {
        let required_set: HashSet<NodeId> = required.into_iter().collect();
        let required_sum: Expression = x
            .iter()
            .filter(|((i, _), _)| required_set.contains(i))
            .map(|(_, &var)| var)
            .sum();
        model = model.with(constraint!(required_sum >= CHANGEABLE_EPSILON * total));
    }

    let solution = match model.solve() {
        Ok(solution) => solution,
        Err(ResolutionError::Infeasible) | Err(ResolutionError::Unbounded) => {
            debug!("path optimizer model infeasible or unbounded, treated as no opportunity");
            return Ok(PathResult::default());
        }
        Err(err) => {
            warn!(error = %err, "path optimizer solve failed with a backend error");
            return Err(crate::error::SolveError::Backend(err.to_string()));
        }
    };

    let mut successor: HashMap<NodeId, NodeId> = HashMap::new();
    let mut chosen_objective = 0.0;
    for (&(i, j), &var) in &x {
        if solution.value(var) > 0.5 {
            successor.insert(i, j);
            chosen_objective += weights[&(i, j)];
        }
    }

    if successor.is_empty() {
        return Ok(PathResult::default());
    }

    let required = snapshot.required_currencies(config.min_trading_limit);
    let cycle = reconstruct_cycle(&successor, &required);

    if cycle.is_empty() {
        warn!("solver selected edges but no closed cycle could be reconstructed");
        return Ok(PathResult::default());
    }

    let Some(cycle) = rotate_to_intra_exchange_start(graph, cycle) else {
        warn!("solved cycle has no intra-exchange edge to start from, treated as no opportunity");
        return Ok(PathResult::default());
    };

    Ok(PathResult {
        cycle,
        profit_rate: chosen_objective.exp() - 1.0,
    })
}

/// Linked-walk reconstruction: prefer a seed edge whose `from` is in
/// `required`, then walk successors until the seed node is revisited. Guards
/// against a disjoint-cycle degeneracy that the stated constraints should
/// prevent but that a relaxed solver could in principle produce.
fn reconstruct_cycle(successor: &HashMap<NodeId, NodeId>, required: &[NodeId]) -> Cycle {
    let seed = required
        .iter()
        .find(|node| successor.contains_key(node))
        .copied()
        .or_else(|| successor.keys().next().copied());

    let Some(start) = seed else {
        return Cycle::empty();
    };

    let mut edges = Vec::new();
    let mut visited = HashSet::new();
    let mut current = start;

    loop {
        if !visited.insert(current) {
            if current == start {
                return Cycle { edges };
            }
            // Revisited a node that is not the seed: not a single simple
            // cycle containing the seed. Treat as a degenerate, unusable
            // solution rather than reporting a malformed cycle.
            return Cycle::empty();
        }
        let Some(&next) = successor.get(&current) else {
            return Cycle::empty();
        };
        edges.push((current, next));
        if next == start {
            return Cycle { edges };
        }
        current = next;
    }
}

/// A cycle must begin with an intra-exchange trade, never a withdrawal
/// (§9 open question). Rotates the edge list so the first edge is
/// intra-exchange; `None` if every edge is inter-exchange.
fn rotate_to_intra_exchange_start(graph: &MarketGraph, cycle: Cycle) -> Option<Cycle> {
    let start = cycle
        .edges
        .iter()
        .position(|&(from, to)| !graph.is_inter_exchange(from, to))?;
    let mut edges = cycle.edges;
    edges.rotate_left(start);
    Some(Cycle { edges })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{build_graph, ExchangeListing};
    use std::collections::HashSet as Set;

    fn two_node_graph() -> MarketGraph {
        let listings = vec![ExchangeListing {
            exchange: "x".to_string(),
            currencies: vec!["BTC".to_string(), "USDT".to_string()],
            pairs: vec!["BTC/USDT".to_string()],
            precision: HashMap::new(),
        }];
        build_graph(&listings, &Set::new(), false, false, |_| true)
    }

    fn three_exchange_graph() -> MarketGraph {
        let listings = vec![
            ExchangeListing {
                exchange: "x".to_string(),
                currencies: vec!["BTC".to_string()],
                pairs: vec![],
                precision: HashMap::new(),
            },
            ExchangeListing {
                exchange: "y".to_string(),
                currencies: vec!["BTC".to_string()],
                pairs: vec![],
                precision: HashMap::new(),
            },
        ];
        build_graph(&listings, &Set::new(), false, true, |_| true)
    }

    #[test]
    fn empty_graph_yields_no_opportunity() {
        let graph = two_node_graph();
        let snapshot = MarketSnapshot::empty(graph.len());
        let config = Config::default();
        let result = find_arbitrage(&graph, &snapshot, &config).unwrap();
        assert!(!result.has_opportunity());
    }

    #[test]
    fn min_trading_limit_above_every_edge_yields_no_opportunity() {
        let graph = two_node_graph();
        let mut snapshot = MarketSnapshot::empty(graph.len());
        snapshot.transit_price[[0, 1]] = 2.0;
        snapshot.transit_price[[1, 0]] = 0.5;
        snapshot.vol_matrix[[0, 1]] = 5.0;
        snapshot.vol_matrix[[1, 0]] = 5.0;

        let mut config = Config::default();
        config.min_trading_limit = 1_000_000.0;

        let result = find_arbitrage(&graph, &snapshot, &config).unwrap();
        assert!(!result.has_opportunity());
    }

    #[test]
    fn reconstructs_simple_two_edge_cycle() {
        let mut successor = HashMap::new();
        successor.insert(0, 1);
        successor.insert(1, 0);
        let cycle = reconstruct_cycle(&successor, &[]);
        assert_eq!(cycle.len(), 2);
        assert_eq!(cycle.edges[0], (0, 1));
        assert_eq!(cycle.edges[1], (1, 0));
    }

    #[test]
    fn reconstruction_prefers_required_seed() {
        let mut successor = HashMap::new();
        successor.insert(0, 1);
        successor.insert(1, 2);
        successor.insert(2, 0);
        let cycle = reconstruct_cycle(&successor, &[2]);
        assert_eq!(cycle.edges[0].0, 2);
    }

    #[test]
    fn rotation_moves_inter_exchange_start_to_an_intra_edge() {
        let graph = three_exchange_graph();
        let a = graph.index_of(&crate::model::Node::new("x", "BTC")).unwrap();
        let b = graph.index_of(&crate::model::Node::new("y", "BTC")).unwrap();
        // A cycle with no intra-exchange edge at all is rejected outright.
        let cycle = Cycle { edges: vec![(a, b), (b, a)] };
        assert!(rotate_to_intra_exchange_start(&graph, cycle).is_none());
    }
}
