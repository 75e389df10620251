//! Error types for the arbitrage core.
//!
//! Per the error-handling design: transient I/O during snapshot building is
//! degraded locally (never surfaced as `ArbError`), an infeasible solve is
//! normalized into an empty result type, and construction-time,
//! oracle-protocol, and genuine solver-backend failures propagate upward.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArbError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("price/fee oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("solver error: {0}")]
    Solve(#[from] SolveError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("exchange '{0}' is not supported by the withdrawal-fee oracle")]
    UnsupportedExchange(String),

    #[error("price oracle request failed: {0}")]
    Request(String),

    #[error("price oracle returned an unexpected response: {0}")]
    Protocol(String),
}

/// Per §7/§4.3: an infeasible model (no cycle/sizing exists) is not an
/// error — it is normalized to an empty `PathResult`/`AmountResult` by the
/// caller. This variant is for every other way the underlying solver can
/// fail to produce a solution (unbounded model, backend panic, malformed
/// problem), which the spec's "only construction and oracle-protocol errors
/// are raised upward" propagation rule does not cover but a genuinely
/// broken solve still needs to surface as.
#[derive(Debug, Error)]
pub enum SolveError {
    #[error("underlying solver failure: {0}")]
    Backend(String),
}
