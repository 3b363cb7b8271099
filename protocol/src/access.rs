//! # Access & Lifecycle Controller
//!
//! Roles are data, not types. A single [`AccessControl`] table is shared by
//! the vault and the leverage engine and is consulted at the top of every
//! privileged operation, before any state is touched.
//!
//! The default-admin role administers every role, including itself. The
//! table refuses to lose its last admin: revoking the final holder fails,
//! and [`AccessControl::transfer_admin`] grants the new holder before it
//! revokes the old one.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::ErrorKind;
use crate::types::Address;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by role administration and role checks.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AccessError {
    /// The caller does not hold the role the operation requires.
    #[error("account {account} is missing role {role}")]
    MissingRole {
        /// The rejected caller.
        account: Address,
        /// The role that was required.
        role: Role,
    },

    /// Revoking this holder would leave the table without an admin.
    #[error("cannot remove the last default admin {0}")]
    LastAdmin(Address),

    /// Admin transfer to the caller itself.
    #[error("admin transfer target must differ from the caller")]
    SelfTransfer,

    /// Empty identifier supplied as a role member.
    #[error("empty account cannot hold a role")]
    EmptyAccount,
}

impl AccessError {
    /// Maps to the shared taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AccessError::MissingRole { .. } => ErrorKind::Authorization,
            AccessError::LastAdmin(_) => ErrorKind::State,
            AccessError::SelfTransfer | AccessError::EmptyAccount => ErrorKind::Validation,
        }
    }
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// Capabilities recognised by the core.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    /// Administers all roles; pauses and unpauses the vault.
    DefaultAdmin,
    /// May pull reserve out of the vault (`grant`) and return it.
    GrantManager,
    /// May apply liquidation resolutions.
    LiquidityManager,
    /// May activate and deactivate lending pools.
    PoolOperator,
    /// May mark off-ledger assets (`update_asset_under_management`).
    AssetManager,
}

impl Role {
    /// Every role, in declaration order.
    pub const ALL: [Role; 5] = [
        Role::DefaultAdmin,
        Role::GrantManager,
        Role::LiquidityManager,
        Role::PoolOperator,
        Role::AssetManager,
    ];
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::DefaultAdmin => write!(f, "DEFAULT_ADMIN"),
            Role::GrantManager => write!(f, "GRANT_MANAGER"),
            Role::LiquidityManager => write!(f, "LIQUIDITY_MANAGER"),
            Role::PoolOperator => write!(f, "POOL_OPERATOR"),
            Role::AssetManager => write!(f, "ASSET_MANAGER"),
        }
    }
}

// ---------------------------------------------------------------------------
// AccessControl
// ---------------------------------------------------------------------------

/// Role membership table.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControl {
    members: HashMap<Role, BTreeSet<Address>>,
}

impl AccessControl {
    /// Creates an empty table. Nobody can administer it until
    /// [`bootstrap`](Self::bootstrap) is called.
    pub fn new() -> Self {
        Self {
            members: HashMap::new(),
        }
    }

    /// Seeds the first admin. Used once, by initialization, when no admin
    /// exists yet; afterwards roles only move through admin-gated calls.
    pub fn bootstrap(&mut self, admin: &Address, roles: &[Role]) -> Result<(), AccessError> {
        if admin.is_empty() {
            return Err(AccessError::EmptyAccount);
        }
        self.insert(Role::DefaultAdmin, admin.clone());
        for role in roles {
            self.insert(*role, admin.clone());
        }
        Ok(())
    }

    /// Returns `true` if `account` holds `role`.
    pub fn has_role(&self, role: Role, account: &Address) -> bool {
        self.members
            .get(&role)
            .map(|set| set.contains(account))
            .unwrap_or(false)
    }

    /// Fails with [`AccessError::MissingRole`] unless `account` holds `role`.
    pub fn require_role(&self, role: Role, account: &Address) -> Result<(), AccessError> {
        if self.has_role(role, account) {
            return Ok(());
        }
        warn!(%account, %role, "rejected call without required role");
        Err(AccessError::MissingRole {
            account: account.clone(),
            role,
        })
    }

    /// Holders of `role`, sorted.
    pub fn members(&self, role: Role) -> Vec<Address> {
        self.members
            .get(&role)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of holders of `role`.
    pub fn member_count(&self, role: Role) -> usize {
        self.members.get(&role).map(BTreeSet::len).unwrap_or(0)
    }

    /// Grants `role` to `account`. Admin only.
    ///
    /// Returns `true` if the membership changed.
    pub fn grant_role(
        &mut self,
        caller: &Address,
        role: Role,
        account: &Address,
    ) -> Result<bool, AccessError> {
        self.require_role(Role::DefaultAdmin, caller)?;
        if account.is_empty() {
            return Err(AccessError::EmptyAccount);
        }
        let changed = self.insert(role, account.clone());
        debug!(%caller, %role, %account, changed, "role granted");
        Ok(changed)
    }

    /// Revokes `role` from `account`. Admin only.
    ///
    /// Returns `true` if the membership changed.
    ///
    /// # Errors
    ///
    /// [`AccessError::LastAdmin`] when this would empty the admin set.
    pub fn revoke_role(
        &mut self,
        caller: &Address,
        role: Role,
        account: &Address,
    ) -> Result<bool, AccessError> {
        self.require_role(Role::DefaultAdmin, caller)?;
        if role == Role::DefaultAdmin
            && self.has_role(Role::DefaultAdmin, account)
            && self.member_count(Role::DefaultAdmin) == 1
        {
            return Err(AccessError::LastAdmin(account.clone()));
        }
        let changed = self.remove(role, account);
        debug!(%caller, %role, %account, changed, "role revoked");
        Ok(changed)
    }

    /// Moves the caller's default-admin membership to `to` in one step.
    pub fn transfer_admin(&mut self, caller: &Address, to: &Address) -> Result<(), AccessError> {
        self.require_role(Role::DefaultAdmin, caller)?;
        if to.is_empty() {
            return Err(AccessError::EmptyAccount);
        }
        if to == caller {
            return Err(AccessError::SelfTransfer);
        }
        self.insert(Role::DefaultAdmin, to.clone());
        self.remove(Role::DefaultAdmin, caller);
        debug!(from = %caller, %to, "default admin transferred");
        Ok(())
    }

    fn insert(&mut self, role: Role, account: Address) -> bool {
        self.members.entry(role).or_default().insert(account)
    }

    fn remove(&mut self, role: Role, account: &Address) -> bool {
        let Some(set) = self.members.get_mut(&role) else {
            return false;
        };
        let removed = set.remove(account);
        if set.is_empty() {
            self.members.remove(&role);
        }
        removed
    }
}
