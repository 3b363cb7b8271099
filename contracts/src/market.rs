//! # Market
//!
//! Transactional facade over the whole lending core. A [`Market`] owns the
//! role table, the underlying asset ledger, the vault, the leverage engine,
//! and the event log, and is the only way to reach them mutably.
//!
//! Every public operation goes through `execute`:
//!
//! 1. snapshot all state,
//! 2. read the clock once and build an [`Env`] for the caller,
//! 3. run the operation,
//! 4. on success publish its events, on failure restore the snapshot and
//!    drop them.
//!
//! So an operation either commits everything or nothing, including funds
//! already moved on the asset ledger by an earlier step of the same call.
//!
//! The snapshot is a deep clone, linear in holders, allowances, and
//! positions. Operations that validate fully and then mutate once (role
//! changes, pause, share and underlying transfers, withdrawals, grants) use
//! `execute_step`, which skips it. Deposits and everything in the leverage
//! engine touch several ledgers and keep the snapshot.
//! Concurrent callers go through [`SharedMarket`], which serializes them.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use rwa_protocol::access::{AccessControl, Role};
use rwa_protocol::asset::{FungibleAsset, TokenLedger};
use rwa_protocol::clock::{Clock, SystemClock};
use rwa_protocol::config::ProtocolConfig;
use rwa_protocol::events::{EventLog, EventRecord};
use rwa_protocol::math::{MathError, Rounding};
use rwa_protocol::types::{Address, PoolStatus};

use crate::env::Env;
use crate::error::ContractError;
use crate::leverage::{LeverageEngine, LeveragePosition, LiquidationResolution};
use crate::vault::Vault;

/// A market behind a mutex, for callers on several threads.
pub type SharedMarket<A = TokenLedger> = Arc<Mutex<Market<A>>>;

/// Everything an operation may change, cloned as its rollback point.
#[derive(Clone, Debug)]
struct MarketState<A> {
    acl: AccessControl,
    asset: A,
    vault: Vault,
    leverage: LeverageEngine,
}

/// The lending core.
pub struct Market<A: FungibleAsset + Clone = TokenLedger> {
    state: MarketState<A>,
    events: EventLog,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl Market<TokenLedger> {
    /// Market over a fresh in-memory stablecoin, on the system clock.
    pub fn with_defaults(config: ProtocolConfig) -> Result<Self, ContractError> {
        Self::new(config, TokenLedger::new("USDC", 6), Arc::new(SystemClock))
    }
}

impl<A: FungibleAsset + Clone> Market<A> {
    /// Builds an uninitialized market. Nothing works until
    /// [`initialize`](Self::initialize) has run.
    pub fn new(
        config: ProtocolConfig,
        asset: A,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Result<Self, ContractError> {
        config.validate()?;
        Ok(Self {
            state: MarketState {
                acl: AccessControl::new(),
                asset,
                vault: Vault::new(config.vault),
                leverage: LeverageEngine::new(config.leverage),
            },
            events: EventLog::new(),
            clock,
        })
    }

    /// Wraps the market for shared use across threads.
    pub fn into_shared(self) -> SharedMarket<A> {
        Arc::new(Mutex::new(self))
    }

    /// Runs `op` as one atomic operation on behalf of `caller`, restoring a
    /// full snapshot if it fails.
    fn execute<T>(
        &mut self,
        caller: &Address,
        op: impl FnOnce(&mut Env<'_, A>, &mut Vault, &mut LeverageEngine) -> Result<T, ContractError>,
    ) -> Result<T, ContractError> {
        self.run(caller, true, op)
    }

    /// Runs a single-step `op` that validates everything before its one
    /// mutation, so a failure has nothing to undo. Skips the snapshot,
    /// whose cost grows with the number of holders and positions.
    fn execute_step<T>(
        &mut self,
        caller: &Address,
        op: impl FnOnce(&mut Env<'_, A>, &mut Vault, &mut LeverageEngine) -> Result<T, ContractError>,
    ) -> Result<T, ContractError> {
        self.run(caller, false, op)
    }

    fn run<T>(
        &mut self,
        caller: &Address,
        snapshot: bool,
        op: impl FnOnce(&mut Env<'_, A>, &mut Vault, &mut LeverageEngine) -> Result<T, ContractError>,
    ) -> Result<T, ContractError> {
        let checkpoint = snapshot.then(|| self.state.clone());
        let now = self.clock.now();
        let mut pending = EventLog::new();

        let result = {
            let MarketState {
                acl,
                asset,
                vault,
                leverage,
            } = &mut self.state;
            let mut env = Env::new(caller.clone(), now, acl, asset, &mut pending);
            op(&mut env, vault, leverage)
        };

        match result {
            Ok(value) => {
                debug!(%caller, events = pending.len(), "operation committed");
                self.events.append(&mut pending);
                Ok(value)
            }
            Err(e) => {
                warn!(%caller, error = %e, kind = %e.kind(), "operation reverted");
                if let Some(checkpoint) = checkpoint {
                    self.state = checkpoint;
                }
                Err(e)
            }
        }
    }

    // -- lifecycle ----------------------------------------------------------

    /// One-time setup of the vault and the role table.
    pub fn initialize(
        &mut self,
        caller: &Address,
        admin: &Address,
        underlying: &Address,
        treasury: &Address,
        initial_grant_manager: &Address,
        deposit_cap: u64,
    ) -> Result<(), ContractError> {
        self.execute(caller, |env, vault, _| {
            vault.initialize(env, admin, underlying, treasury, initial_grant_manager, deposit_cap)?;
            Ok(())
        })
    }

    pub fn activate_pool(&mut self, caller: &Address) -> Result<(), ContractError> {
        self.execute_step(caller, |env, vault, _| Ok(vault.activate_pool(env)?))
    }

    pub fn deactivate_pool(&mut self, caller: &Address) -> Result<(), ContractError> {
        self.execute_step(caller, |env, vault, _| Ok(vault.deactivate_pool(env)?))
    }

    pub fn pause(&mut self, caller: &Address) -> Result<(), ContractError> {
        self.execute_step(caller, |env, vault, _| Ok(vault.pause(env)?))
    }

    pub fn unpause(&mut self, caller: &Address) -> Result<(), ContractError> {
        self.execute_step(caller, |env, vault, _| Ok(vault.unpause(env)?))
    }

    // -- roles --------------------------------------------------------------

    pub fn grant_role(&mut self, caller: &Address, role: Role, account: &Address) -> Result<(), ContractError> {
        self.execute_step(caller, |env, vault, _| Ok(vault.grant_role(env, role, account)?))
    }

    pub fn revoke_role(&mut self, caller: &Address, role: Role, account: &Address) -> Result<(), ContractError> {
        self.execute_step(caller, |env, vault, _| Ok(vault.revoke_role(env, role, account)?))
    }

    pub fn transfer_admin(&mut self, caller: &Address, to: &Address) -> Result<(), ContractError> {
        self.execute_step(caller, |env, vault, _| Ok(vault.transfer_admin(env, to)?))
    }

    pub fn add_grant_manager(&mut self, caller: &Address, account: &Address) -> Result<(), ContractError> {
        self.execute_step(caller, |env, vault, _| Ok(vault.add_grant_manager(env, account)?))
    }

    pub fn remove_grant_manager(&mut self, caller: &Address, account: &Address) -> Result<(), ContractError> {
        self.execute_step(caller, |env, vault, _| Ok(vault.remove_grant_manager(env, account)?))
    }

    // -- vault --------------------------------------------------------------

    /// Returns the shares minted.
    pub fn deposit(&mut self, caller: &Address, amount: u64, receiver: &Address) -> Result<u64, ContractError> {
        self.execute(caller, |env, vault, _| Ok(vault.deposit(env, amount, receiver)?))
    }

    /// Returns the shares burned.
    pub fn withdraw(
        &mut self,
        caller: &Address,
        amount: u64,
        receiver: &Address,
        owner: &Address,
    ) -> Result<u64, ContractError> {
        self.execute_step(caller, |env, vault, _| Ok(vault.withdraw(env, amount, receiver, owner)?))
    }

    /// Returns the assets paid.
    pub fn redeem(
        &mut self,
        caller: &Address,
        shares: u64,
        receiver: &Address,
        owner: &Address,
    ) -> Result<u64, ContractError> {
        self.execute_step(caller, |env, vault, _| Ok(vault.redeem(env, shares, receiver, owner)?))
    }

    pub fn top_up(&mut self, caller: &Address, amount: u64) -> Result<(), ContractError> {
        self.execute_step(caller, |env, vault, _| Ok(vault.top_up(env, amount)?))
    }

    pub fn update_asset_under_management(&mut self, caller: &Address, delta: i64) -> Result<(), ContractError> {
        self.execute_step(caller, |env, vault, _| Ok(vault.update_asset_under_management(env, delta)?))
    }

    pub fn grant(&mut self, caller: &Address, to: &Address, amount: u64) -> Result<(), ContractError> {
        self.execute_step(caller, |env, vault, _| Ok(vault.grant(env, to, amount)?))
    }

    pub fn receive_repayment(&mut self, caller: &Address, from: &Address, amount: u64) -> Result<(), ContractError> {
        self.execute_step(caller, |env, vault, _| Ok(vault.receive_repayment(env, from, amount)?))
    }

    pub fn burn_seized(&mut self, caller: &Address, shares: u64) -> Result<(), ContractError> {
        self.execute_step(caller, |env, vault, _| Ok(vault.burn_seized(env, shares)?))
    }

    // -- share token --------------------------------------------------------

    pub fn transfer_shares(&mut self, caller: &Address, to: &Address, shares: u64) -> Result<(), ContractError> {
        self.execute_step(caller, |env, vault, _| Ok(vault.transfer(env, to, shares)?))
    }

    pub fn approve_shares(&mut self, caller: &Address, spender: &Address, shares: u64) -> Result<(), ContractError> {
        self.execute_step(caller, |env, vault, _| Ok(vault.approve(env, spender, shares)?))
    }

    pub fn transfer_shares_from(
        &mut self,
        caller: &Address,
        owner: &Address,
        to: &Address,
        shares: u64,
    ) -> Result<(), ContractError> {
        self.execute_step(caller, |env, vault, _| Ok(vault.transfer_from(env, owner, to, shares)?))
    }

    // -- underlying asset ---------------------------------------------------

    /// Approves `spender` on the underlying asset, e.g. the vault before a
    /// deposit or the leverage engine before a repayment.
    pub fn approve_underlying(&mut self, caller: &Address, spender: &Address, amount: u64) -> Result<(), ContractError> {
        self.execute_step(caller, |env, _, _| Ok(env.asset.approve(caller, spender, amount)?))
    }

    /// Plain transfer of the underlying asset. Sending to the vault's
    /// custody this way does not count toward the reserve; use
    /// [`top_up`](Self::top_up) for that.
    pub fn transfer_underlying(&mut self, caller: &Address, to: &Address, amount: u64) -> Result<(), ContractError> {
        self.execute_step(caller, |env, _, _| Ok(env.asset.transfer(caller, to, amount)?))
    }

    // -- leverage -----------------------------------------------------------

    pub fn update_pool_status(
        &mut self,
        caller: &Address,
        pool_id: u32,
        status: PoolStatus,
    ) -> Result<(), ContractError> {
        self.execute_step(caller, |env, _, leverage| {
            Ok(leverage.update_pool_status(env, pool_id, status)?)
        })
    }

    /// Returns the binding lock expiry.
    pub fn stake(&mut self, caller: &Address, shares: u64, lock_duration: u64) -> Result<u64, ContractError> {
        self.execute(caller, |env, vault, leverage| {
            Ok(leverage.stake(env, vault, shares, lock_duration)?)
        })
    }

    pub fn unstake(&mut self, caller: &Address, shares: u64) -> Result<(), ContractError> {
        self.execute(caller, |env, vault, leverage| Ok(leverage.unstake(env, vault, shares)?))
    }

    /// Returns the position's rate after the loan.
    pub fn borrow(&mut self, caller: &Address, amount: u64, duration: u64) -> Result<u32, ContractError> {
        self.execute(caller, |env, vault, leverage| {
            Ok(leverage.borrow(env, vault, amount, duration)?)
        })
    }

    /// Returns the amount paid.
    pub fn pay(&mut self, caller: &Address) -> Result<u64, ContractError> {
        self.execute(caller, |env, vault, leverage| Ok(leverage.pay(env, vault)?))
    }

    /// Returns the amount still owed.
    pub fn repay(&mut self, caller: &Address, amount: u64) -> Result<u64, ContractError> {
        self.execute(caller, |env, vault, leverage| Ok(leverage.repay(env, vault, amount)?))
    }

    pub fn liquidate(&mut self, caller: &Address, resolutions: &[LiquidationResolution]) -> Result<(), ContractError> {
        self.execute(caller, |env, vault, leverage| {
            Ok(leverage.liquidate(env, vault, resolutions)?)
        })
    }

    // -- views --------------------------------------------------------------

    pub fn vault(&self) -> &Vault {
        &self.state.vault
    }

    pub fn leverage(&self) -> &LeverageEngine {
        &self.state.leverage
    }

    pub fn acl(&self) -> &AccessControl {
        &self.state.acl
    }

    pub fn has_role(&self, role: Role, account: &Address) -> bool {
        self.state.acl.has_role(role, account)
    }

    pub fn asset(&self) -> &A {
        &self.state.asset
    }

    /// Direct access to the underlying ledger, bypassing the lending core.
    /// For issuing test funds.
    pub fn asset_mut(&mut self) -> &mut A {
        &mut self.state.asset
    }

    pub fn convert_to_assets(&self, shares: u64) -> Result<u64, MathError> {
        self.state.vault.convert_to_assets(shares)
    }

    pub fn convert_to_shares(&self, assets: u64) -> Result<u64, MathError> {
        self.state.vault.convert_to_shares(assets, Rounding::Floor)
    }

    pub fn total_assets(&self) -> Result<u64, MathError> {
        self.state.vault.total_assets()
    }

    /// `borrower`'s position, all zeros if none.
    pub fn leverages(&self, borrower: &Address) -> LeveragePosition {
        self.state.leverage.leverages(borrower)
    }

    /// What `borrower` owes now.
    pub fn payment_due(&self, borrower: &Address) -> Result<u64, MathError> {
        self.state.leverage.payment_due(borrower, self.clock.now())
    }

    pub fn collateral_value(&self, borrower: &Address) -> Result<u64, MathError> {
        self.state.leverage.collateral_value(&self.state.vault, borrower)
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Hands committed events to an indexer and forgets them.
    pub fn drain_events(&mut self) -> Vec<EventRecord> {
        self.events.drain()
    }
}

impl<A: FungibleAsset + Clone + std::fmt::Debug> std::fmt::Debug for Market<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Market")
            .field("state", &self.state)
            .field("events", &self.events.len())
            .finish_non_exhaustive()
    }
}
