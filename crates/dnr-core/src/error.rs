//! Unified error type for the resilience pipeline.
//!
//! [`DnrError`] separates the failures that abort a whole run (malformed input,
//! unreachable optimization backend) from the ones that are recorded against a
//! single scenario and stage (infeasible sub-problem, solve timeout). The batch
//! runner relies on [`DnrError::is_fatal`] to decide which is which.
//!
//! ```ignore
//! use dnr_core::{DnrError, DnrResult};
//!
//! fn assess(path: &str) -> DnrResult<()> {
//!     let network = load_network(path)?;
//!     network.validate()?;
//!     Ok(())
//! }
//! ```

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DnrError {
    /// Missing or inconsistent network/scenario data; raised before any solve.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// A reconfiguration or scheduling sub-problem has no feasible solution.
    #[error("infeasible sub-problem in {stage}: {reason}")]
    InfeasibleSubproblem { stage: String, reason: String },

    /// The solver exceeded its time budget; feasibility is unknown.
    #[error("solve timed out in {stage} after {limit_ms} ms")]
    SolveTimeout { stage: String, limit_ms: u128 },

    /// The optimization capability cannot be reached at all.
    #[error("optimization backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type DnrResult<T> = Result<T, DnrError>;

impl DnrError {
    /// Errors that mean nothing downstream can succeed.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            DnrError::InfeasibleSubproblem { .. } | DnrError::SolveTimeout { .. }
        )
    }

    /// Short machine-readable label used in status columns and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            DnrError::MalformedInput(_) => "MALFORMED_INPUT",
            DnrError::InfeasibleSubproblem { .. } => "INFEASIBLE_SUBPROBLEM",
            DnrError::SolveTimeout { .. } => "SOLVE_TIMEOUT",
            DnrError::BackendUnavailable(_) => "BACKEND_UNAVAILABLE",
            DnrError::Io(_) => "IO",
            DnrError::Parse(_) => "PARSE",
            DnrError::Config(_) => "CONFIG",
            DnrError::Other(_) => "OTHER",
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        DnrError::MalformedInput(message.into())
    }
}

impl From<anyhow::Error> for DnrError {
    fn from(err: anyhow::Error) -> Self {
        DnrError::Other(format!("{err:#}"))
    }
}

impl From<String> for DnrError {
    fn from(s: String) -> Self {
        DnrError::Other(s)
    }
}

impl From<&str> for DnrError {
    fn from(s: &str) -> Self {
        DnrError::Other(s.to_string())
    }
}

impl From<serde_json::Error> for DnrError {
    fn from(err: serde_json::Error) -> Self {
        DnrError::Parse(err.to_string())
    }
}
