//! # Audit Events
//!
//! Every state transition in the lending core emits an [`Event`] for
//! off-core indexers. Events are appended to an [`EventLog`] owned by the
//! caller of the engines; the transactional facade drops the events of a
//! failed operation along with its state.

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::access::Role;
use crate::types::{Address, PoolStatus};

/// Something that happened, with the addresses and amounts an auditor needs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Vault bootstrapped.
    Initialized {
        admin: Address,
        underlying: Address,
        treasury: Address,
        grant_manager: Address,
        deposit_cap: u64,
    },
    /// Underlying deposited, shares minted.
    Deposit {
        sender: Address,
        receiver: Address,
        assets: u64,
        shares: u64,
    },
    /// Portion of a deposit forwarded to the treasury.
    Deployed { treasury: Address, assets: u64 },
    /// Shares burned, underlying paid out.
    Withdraw {
        sender: Address,
        receiver: Address,
        owner: Address,
        assets: u64,
        shares: u64,
    },
    /// Share token transfer.
    SharesTransferred {
        from: Address,
        to: Address,
        shares: u64,
    },
    /// Share allowance set.
    SharesApproved {
        owner: Address,
        spender: Address,
        shares: u64,
    },
    /// Underlying added to the reserve without minting shares.
    ReserveToppedUp { from: Address, assets: u64 },
    /// Off-ledger valuation mark.
    AumUpdated {
        operator: Address,
        delta: i64,
        assets_under_management: i64,
    },
    /// Reserve disbursed by a grant manager.
    Granted {
        manager: Address,
        to: Address,
        assets: u64,
    },
    /// Borrowed funds returned to the reserve.
    RepaymentReceived {
        manager: Address,
        from: Address,
        assets: u64,
    },
    /// Collateral shares burned at liquidation.
    SharesSeized { manager: Address, shares: u64 },
    /// Vault deposits switched on or off.
    VaultPoolStatusChanged { operator: Address, active: bool },
    /// Vault paused.
    Paused { admin: Address },
    /// Vault unpaused.
    Unpaused { admin: Address },
    /// Shares locked as collateral.
    Staked {
        borrower: Address,
        shares: u64,
        lock_expires_at: u64,
    },
    /// Collateral released.
    Unstaked { borrower: Address, shares: u64 },
    /// Loan issued.
    Borrowed {
        borrower: Address,
        assets: u64,
        duration: u64,
        apy_bps: u32,
    },
    /// Loan (partially) repaid. `remaining` is the due amount afterwards.
    Repaid {
        borrower: Address,
        assets: u64,
        remaining: u64,
    },
    /// Position overwritten by a liquidity manager.
    Liquidated {
        manager: Address,
        borrower: Address,
        seized_shares: u64,
        forgiven_debt: u64,
    },
    /// Lending pool switched on or off.
    PoolStatusUpdated {
        operator: Address,
        pool_id: u32,
        status: PoolStatus,
    },
    /// Role membership added.
    RoleGranted {
        role: Role,
        account: Address,
        sender: Address,
    },
    /// Role membership removed.
    RoleRevoked {
        role: Role,
        account: Address,
        sender: Address,
    },
    /// Default admin moved.
    AdminTransferred { from: Address, to: Address },
}

impl Event {
    /// Stable snake_case name, matching the serialized `type` tag.
    pub fn name(&self) -> &'static str {
        match self {
            Event::Initialized { .. } => "initialized",
            Event::Deposit { .. } => "deposit",
            Event::Deployed { .. } => "deployed",
            Event::Withdraw { .. } => "withdraw",
            Event::SharesTransferred { .. } => "shares_transferred",
            Event::SharesApproved { .. } => "shares_approved",
            Event::ReserveToppedUp { .. } => "reserve_topped_up",
            Event::AumUpdated { .. } => "aum_updated",
            Event::Granted { .. } => "granted",
            Event::RepaymentReceived { .. } => "repayment_received",
            Event::SharesSeized { .. } => "shares_seized",
            Event::VaultPoolStatusChanged { .. } => "vault_pool_status_changed",
            Event::Paused { .. } => "paused",
            Event::Unpaused { .. } => "unpaused",
            Event::Staked { .. } => "staked",
            Event::Unstaked { .. } => "unstaked",
            Event::Borrowed { .. } => "borrowed",
            Event::Repaid { .. } => "repaid",
            Event::Liquidated { .. } => "liquidated",
            Event::PoolStatusUpdated { .. } => "pool_status_updated",
            Event::RoleGranted { .. } => "role_granted",
            Event::RoleRevoked { .. } => "role_revoked",
            Event::AdminTransferred { .. } => "admin_transferred",
        }
    }
}

/// An event stamped with an id and the operation's timestamp.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: Uuid,
    pub timestamp: u64,
    pub event: Event,
}

/// Append-only list of emitted events.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLog {
    records: Vec<EventRecord>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamps and appends `event`, and logs it.
    pub fn record(&mut self, timestamp: u64, event: Event) -> &EventRecord {
        let record = EventRecord {
            id: Uuid::new_v4(),
            timestamp,
            event,
        };
        info!(
            event = record.event.name(),
            id = %record.id,
            timestamp,
            "event"
        );
        self.records.push(record);
        &self.records[self.records.len() - 1]
    }

    /// Moves all records of `other` to the end of this log.
    pub fn append(&mut self, other: &mut EventLog) {
        self.records.append(&mut other.records);
    }

    /// Removes and returns every record.
    pub fn drain(&mut self) -> Vec<EventRecord> {
        std::mem::take(&mut self.records)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EventRecord> {
        self.records.iter()
    }

    /// Most recent record.
    pub fn last(&self) -> Option<&EventRecord> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
