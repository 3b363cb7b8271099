//! # Execution Environment
//!
//! What an engine sees during one operation: who is calling, the timestamp,
//! and mutable handles to the shared role table, the underlying asset, and
//! the pending event buffer. The engines own their own state; everything
//! they share with each other comes in through here.

use rwa_protocol::access::{AccessControl, AccessError, Role};
use rwa_protocol::asset::FungibleAsset;
use rwa_protocol::events::{Event, EventLog};
use rwa_protocol::types::Address;

/// Per-call context handed to every engine operation.
pub struct Env<'a, A: FungibleAsset> {
    caller: Address,
    now: u64,
    /// Role table shared by both engines.
    pub acl: &'a mut AccessControl,
    /// Ledger of the underlying deposit asset.
    pub asset: &'a mut A,
    events: &'a mut EventLog,
}

impl<'a, A: FungibleAsset> Env<'a, A> {
    pub fn new(
        caller: Address,
        now: u64,
        acl: &'a mut AccessControl,
        asset: &'a mut A,
        events: &'a mut EventLog,
    ) -> Self {
        Self {
            caller,
            now,
            acl,
            asset,
            events,
        }
    }

    /// Authenticated caller of the current operation.
    pub fn caller(&self) -> &Address {
        &self.caller
    }

    /// Timestamp of the current operation, unix seconds.
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Reborrows this environment with a different caller.
    ///
    /// Used when one engine calls into the other under its own identity,
    /// e.g. the leverage engine pulling shares from the vault.
    pub fn as_caller(&mut self, caller: Address) -> Env<'_, A> {
        Env {
            caller,
            now: self.now,
            acl: &mut *self.acl,
            asset: &mut *self.asset,
            events: &mut *self.events,
        }
    }

    /// Fails unless the caller holds `role`.
    pub fn require_role(&self, role: Role) -> Result<(), AccessError> {
        self.acl.require_role(role, &self.caller)
    }

    /// Records `event` at the current timestamp.
    pub fn emit(&mut self, event: Event) {
        self.events.record(self.now, event);
    }
}
