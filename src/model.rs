//! Shared domain types: graph nodes, cycles, and leg solutions.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A node is a (exchange, currency) pair. `NodeId` is its position in the
/// dense `[0, N)` index space used by every matrix in the core.
pub type NodeId = usize;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    pub exchange: String,
    pub currency: String,
}

impl Node {
    pub fn new(exchange: impl Into<String>, currency: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            currency: currency.into(),
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.exchange, self.currency)
    }
}

/// Whether a leg's tradable pair lists the *to* currency as base relative to
/// the cycle's direction of travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    /// Non-reversed: selling the base currency into the quote currency at the bid.
    BidSell,
    /// Reversed: buying the base currency with the quote currency at the ask.
    AskBuy,
}

impl Direction {
    pub fn is_reversed(self) -> bool {
        matches!(self, Direction::AskBuy)
    }

    pub fn from_reversed(reversed: bool) -> Self {
        if reversed {
            Direction::AskBuy
        } else {
            Direction::BidSell
        }
    }
}

/// A closed walk of directed edges through the node graph, as produced by the
/// path optimizer. Edges are `(from, to)` node-id pairs, ordered head-to-tail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cycle {
    pub edges: Vec<(NodeId, NodeId)>,
}

impl Cycle {
    pub fn empty() -> Self {
        Self { edges: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn nodes_in_order(&self) -> Vec<NodeId> {
        self.edges.iter().map(|(from, _)| *from).collect()
    }
}

/// The solved trade for a single leg of a cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegSolution {
    pub volume: Decimal,
    pub price: Decimal,
    pub direction: Direction,
}

/// Per-invocation output of the path optimizer (C3).
#[derive(Debug, Clone, Default)]
pub struct PathResult {
    pub cycle: Cycle,
    /// `exp(objective) - 1`; zero when no opportunity was found.
    pub profit_rate: f64,
}

impl PathResult {
    pub fn has_opportunity(&self) -> bool {
        !self.cycle.is_empty()
    }
}

/// Per-invocation output of the amount optimizer (C4), keyed by the
/// cycle-directed `(from, to)` node pair of each leg, in leg order.
#[derive(Debug, Clone, Default)]
pub struct AmountResult {
    pub legs: Vec<((NodeId, NodeId), LegSolution)>,
    /// Raw objective value before the `amplifier` rescale is undone.
    pub objective: f64,
}

impl AmountResult {
    pub fn has_workable_solution(&self) -> bool {
        !self.legs.is_empty() && self.objective > 0.0
    }
}
