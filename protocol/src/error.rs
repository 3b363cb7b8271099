//! # Error Taxonomy
//!
//! Each module owns a precise error enum. Callers that only need to decide
//! what to do next (fix the input, ask for a role, wait for an unpause)
//! collapse those into an [`ErrorKind`].

use serde::{Deserialize, Serialize};

/// Coarse classification shared by every error in the core.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Zero or malformed input. Retry with different arguments.
    Validation,
    /// The caller lacks the role or capability for the operation.
    Authorization,
    /// Reserve, share, balance, collateral, or allowance shortfall.
    InsufficientFunds,
    /// Rejected by lifecycle state: paused, inactive, locked, no debt.
    State,
    /// Division by zero or an out-of-range result.
    Arithmetic,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Authorization => write!(f, "authorization"),
            ErrorKind::InsufficientFunds => write!(f, "insufficient funds"),
            ErrorKind::State => write!(f, "state"),
            ErrorKind::Arithmetic => write!(f, "arithmetic"),
        }
    }
}
