//! Account identifiers and pool status. An address is a map key, nothing more.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// Identity of a holder, borrower, operator, or custody account.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Wraps a raw identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for the empty identifier, which is never a valid
    /// receiver or role member.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

// ---------------------------------------------------------------------------
// PoolStatus
// ---------------------------------------------------------------------------

/// Activation state of a lending pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoolStatus {
    /// New stakes and borrows are rejected. Repayment and unstaking still work.
    #[default]
    Inactive,
    /// Pool accepts stakes and borrows.
    Active,
}

impl PoolStatus {
    /// Returns `true` if the pool accepts new collateral and loans.
    pub fn is_active(&self) -> bool {
        matches!(self, PoolStatus::Active)
    }
}

impl std::fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PoolStatus::Inactive => write!(f, "Inactive"),
            PoolStatus::Active => write!(f, "Active"),
        }
    }
}
