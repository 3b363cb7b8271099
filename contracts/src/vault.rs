//! # RWA Vault
//!
//! Pools a stable deposit asset and issues proportional shares against it.
//!
//! ## Accounting
//!
//! ```text
//! total_assets = reserve + assets_under_management
//! to_assets(s) = floor(s * (total_assets + 1) / (total_shares + 1))
//! to_shares(a) = floor(a * (total_shares + 1) / (total_assets + 1))
//! ```
//!
//! `reserve` is underlying the vault physically holds. `assets_under_management`
//! is a signed mark on value deployed off-ledger, moved only by an asset
//! manager. The `+1` on both sides of every conversion keeps the first
//! depositor from setting a degenerate share price.
//!
//! Three things reprice shares without minting or burning them: an AUM mark,
//! a `grant` (reserve leaves, shares stay), and a `top_up` or repayment
//! (reserve arrives, shares stay). Burning seized collateral reprices the
//! remaining shares upward.
//!
//! Shares are themselves a fungible token: holders can transfer them and
//! approve spenders, which is how the leverage engine takes custody of
//! collateral.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use rwa_protocol::access::{AccessError, Role};
use rwa_protocol::asset::{AssetError, FungibleAsset};
use rwa_protocol::config::{VaultConfig, RATE_DENOMINATOR};
use rwa_protocol::error::ErrorKind;
use rwa_protocol::events::Event;
use rwa_protocol::math::{self, MathError, Rounding};
use rwa_protocol::types::Address;

use crate::env::Env;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by vault operations.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum VaultError {
    /// Amount or share count was zero.
    #[error("amount must be positive")]
    ZeroAmount,

    /// Receiver, owner, or spender was the empty address.
    #[error("invalid account: empty identifier")]
    InvalidAccount,

    /// Operation called before `initialize`.
    #[error("vault is not initialized")]
    NotInitialized,

    /// `initialize` called twice.
    #[error("vault is already initialized")]
    AlreadyInitialized,

    /// Deposits are switched off.
    #[error("vault pool is not active")]
    PoolInactive,

    /// Vault is paused (also returned by `pause` on a paused vault).
    #[error("vault is paused")]
    VaultPaused,

    /// `unpause` on a running vault.
    #[error("vault is not paused")]
    NotPaused,

    /// Deposit would push the reserve above the cap.
    #[error("deposit of {requested} exceeds cap headroom of {available}")]
    ExceedsDepositCap {
        /// Deposit amount.
        requested: u64,
        /// `deposit_cap - reserve`.
        available: u64,
    },

    /// Deposit too small to mint a single share at the current price.
    #[error("deposit of {assets} mints zero shares")]
    ZeroShares {
        /// Deposit amount.
        assets: u64,
    },

    /// Redemption too small to pay out a single unit.
    #[error("redeeming {shares} shares yields zero assets")]
    ZeroAssets {
        /// Shares offered.
        shares: u64,
    },

    /// Owner holds fewer shares than required.
    #[error("insufficient shares for {owner}: have {available}, need {required}")]
    InsufficientShares {
        /// Debited holder.
        owner: Address,
        /// Current balance.
        available: u64,
        /// Shares required.
        required: u64,
    },

    /// Spender's share allowance does not cover the operation.
    #[error("insufficient share allowance from {owner} to {spender}: have {available}, need {required}")]
    InsufficientShareAllowance {
        /// Holder.
        owner: Address,
        /// Spender.
        spender: Address,
        /// Current allowance.
        available: u64,
        /// Shares required.
        required: u64,
    },

    /// Reserve cannot cover a payout. Value under management does not count.
    #[error("insufficient reserve: requested {requested}, available {available}")]
    InsufficientReserve {
        /// Requested payout.
        requested: u64,
        /// Current reserve.
        available: u64,
    },

    /// A valuation loss larger than total assets.
    #[error("loss of {delta} exceeds total assets {total_assets}")]
    LossExceedsAssets {
        /// Rejected delta.
        delta: i64,
        /// Total assets before the mark.
        total_assets: u64,
    },

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error(transparent)]
    Math(#[from] MathError),
}

impl VaultError {
    /// Maps to the shared taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            VaultError::ZeroAmount
            | VaultError::InvalidAccount
            | VaultError::ZeroShares { .. }
            | VaultError::ZeroAssets { .. } => ErrorKind::Validation,
            VaultError::NotInitialized
            | VaultError::AlreadyInitialized
            | VaultError::PoolInactive
            | VaultError::VaultPaused
            | VaultError::NotPaused => ErrorKind::State,
            VaultError::ExceedsDepositCap { .. }
            | VaultError::InsufficientShares { .. }
            | VaultError::InsufficientShareAllowance { .. }
            | VaultError::InsufficientReserve { .. }
            | VaultError::LossExceedsAssets { .. } => ErrorKind::InsufficientFunds,
            VaultError::Access(e) => e.kind(),
            VaultError::Asset(e) => e.kind(),
            VaultError::Math(e) => e.kind(),
        }
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Vault totals.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultState {
    /// Sum of all holder balances.
    pub total_shares: u64,
    /// Underlying physically held by the vault.
    pub reserve: u64,
    /// Signed mark on value deployed off-ledger.
    pub assets_under_management: i64,
    /// Upper bound on `reserve` after a deposit.
    pub deposit_cap: u64,
    /// Deposits, withdrawals, and share transfers are rejected while set.
    pub paused: bool,
    /// Deposits are rejected until a pool operator activates the vault.
    pub pool_active: bool,
}

/// The vault accounting engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    config: VaultConfig,
    initialized: bool,
    underlying: Address,
    treasury: Address,
    state: VaultState,
    balances: HashMap<Address, u64>,
    /// owner -> spender -> remaining share allowance
    allowances: HashMap<Address, HashMap<Address, u64>>,
}

impl Vault {
    /// Creates an uninitialized vault.
    pub fn new(config: VaultConfig) -> Self {
        Self {
            config,
            initialized: false,
            underlying: Address::new(""),
            treasury: Address::new(""),
            state: VaultState::default(),
            balances: HashMap::new(),
            allowances: HashMap::new(),
        }
    }

    // -- lifecycle ----------------------------------------------------------

    /// One-time setup. The admin receives every operator role except
    /// grant-manager, which goes to `initial_grant_manager`.
    pub fn initialize<A: FungibleAsset>(
        &mut self,
        env: &mut Env<'_, A>,
        admin: &Address,
        underlying: &Address,
        treasury: &Address,
        initial_grant_manager: &Address,
        deposit_cap: u64,
    ) -> Result<(), VaultError> {
        if self.initialized {
            return Err(VaultError::AlreadyInitialized);
        }
        if admin.is_empty() || treasury.is_empty() || initial_grant_manager.is_empty() {
            return Err(VaultError::InvalidAccount);
        }

        env.acl.bootstrap(
            admin,
            &[Role::AssetManager, Role::LiquidityManager, Role::PoolOperator],
        )?;
        env.acl
            .grant_role(admin, Role::GrantManager, initial_grant_manager)?;

        self.initialized = true;
        self.underlying = underlying.clone();
        self.treasury = treasury.clone();
        self.state.deposit_cap = deposit_cap;

        info!(%admin, %treasury, deposit_cap, "vault initialized");
        env.emit(Event::Initialized {
            admin: admin.clone(),
            underlying: underlying.clone(),
            treasury: treasury.clone(),
            grant_manager: initial_grant_manager.clone(),
            deposit_cap,
        });
        Ok(())
    }

    /// Switches deposits on.
    pub fn activate_pool<A: FungibleAsset>(&mut self, env: &mut Env<'_, A>) -> Result<(), VaultError> {
        self.set_pool_active(env, true)
    }

    /// Switches deposits off. Withdrawals keep working.
    pub fn deactivate_pool<A: FungibleAsset>(&mut self, env: &mut Env<'_, A>) -> Result<(), VaultError> {
        self.set_pool_active(env, false)
    }

    fn set_pool_active<A: FungibleAsset>(
        &mut self,
        env: &mut Env<'_, A>,
        active: bool,
    ) -> Result<(), VaultError> {
        self.ensure_initialized()?;
        env.require_role(Role::PoolOperator)?;
        self.state.pool_active = active;
        env.emit(Event::VaultPoolStatusChanged {
            operator: env.caller().clone(),
            active,
        });
        Ok(())
    }

    /// Stops deposits, withdrawals, and share transfers.
    pub fn pause<A: FungibleAsset>(&mut self, env: &mut Env<'_, A>) -> Result<(), VaultError> {
        self.ensure_initialized()?;
        env.require_role(Role::DefaultAdmin)?;
        if self.state.paused {
            return Err(VaultError::VaultPaused);
        }
        self.state.paused = true;
        warn!(admin = %env.caller(), "vault paused");
        env.emit(Event::Paused {
            admin: env.caller().clone(),
        });
        Ok(())
    }

    pub fn unpause<A: FungibleAsset>(&mut self, env: &mut Env<'_, A>) -> Result<(), VaultError> {
        self.ensure_initialized()?;
        env.require_role(Role::DefaultAdmin)?;
        if !self.state.paused {
            return Err(VaultError::NotPaused);
        }
        self.state.paused = false;
        info!(admin = %env.caller(), "vault unpaused");
        env.emit(Event::Unpaused {
            admin: env.caller().clone(),
        });
        Ok(())
    }

    // -- roles --------------------------------------------------------------

    /// Grants `role` to `account`. Default admin only.
    pub fn grant_role<A: FungibleAsset>(
        &mut self,
        env: &mut Env<'_, A>,
        role: Role,
        account: &Address,
    ) -> Result<(), VaultError> {
        self.ensure_initialized()?;
        let caller = env.caller().clone();
        if env.acl.grant_role(&caller, role, account)? {
            env.emit(Event::RoleGranted {
                role,
                account: account.clone(),
                sender: caller,
            });
        }
        Ok(())
    }

    /// Revokes `role` from `account`. Default admin only.
    pub fn revoke_role<A: FungibleAsset>(
        &mut self,
        env: &mut Env<'_, A>,
        role: Role,
        account: &Address,
    ) -> Result<(), VaultError> {
        self.ensure_initialized()?;
        let caller = env.caller().clone();
        if env.acl.revoke_role(&caller, role, account)? {
            env.emit(Event::RoleRevoked {
                role,
                account: account.clone(),
                sender: caller,
            });
        }
        Ok(())
    }

    /// Moves the caller's default-admin role to `to`.
    pub fn transfer_admin<A: FungibleAsset>(
        &mut self,
        env: &mut Env<'_, A>,
        to: &Address,
    ) -> Result<(), VaultError> {
        self.ensure_initialized()?;
        let caller = env.caller().clone();
        env.acl.transfer_admin(&caller, to)?;
        env.emit(Event::AdminTransferred {
            from: caller,
            to: to.clone(),
        });
        Ok(())
    }

    /// Lets `account` call [`grant`](Self::grant).
    pub fn add_grant_manager<A: FungibleAsset>(
        &mut self,
        env: &mut Env<'_, A>,
        account: &Address,
    ) -> Result<(), VaultError> {
        self.grant_role(env, Role::GrantManager, account)
    }

    pub fn remove_grant_manager<A: FungibleAsset>(
        &mut self,
        env: &mut Env<'_, A>,
        account: &Address,
    ) -> Result<(), VaultError> {
        self.revoke_role(env, Role::GrantManager, account)
    }

    // -- deposit / withdraw -------------------------------------------------

    /// Pulls `amount` of underlying from the caller and mints shares to
    /// `receiver`. The caller must have approved the vault's custody
    /// address on the underlying asset.
    ///
    /// If a deployment ratio is configured, that share of the deposit goes
    /// straight on to the treasury and is booked as assets under
    /// management. Total assets rise by the full amount either way.
    ///
    /// Returns the shares minted.
    pub fn deposit<A: FungibleAsset>(
        &mut self,
        env: &mut Env<'_, A>,
        amount: u64,
        receiver: &Address,
    ) -> Result<u64, VaultError> {
        if amount == 0 {
            return Err(VaultError::ZeroAmount);
        }
        if receiver.is_empty() {
            return Err(VaultError::InvalidAccount);
        }
        self.ensure_initialized()?;
        if !self.state.pool_active {
            return Err(VaultError::PoolInactive);
        }
        self.ensure_not_paused()?;

        let available = self.max_deposit();
        if amount > available {
            return Err(VaultError::ExceedsDepositCap {
                requested: amount,
                available,
            });
        }

        let shares = self.convert_to_shares(amount, Rounding::Floor)?;
        if shares == 0 {
            return Err(VaultError::ZeroShares { assets: amount });
        }

        let deployed = math::mul_div_floor(amount, self.config.deployment_ratio_bps, RATE_DENOMINATOR)?;
        let retained = math::checked_sub(amount, deployed)?;
        let deployed_signed = i64::try_from(deployed).map_err(|_| MathError::Overflow)?;

        let new_reserve = math::checked_add(self.state.reserve, retained)?;
        let new_aum = self
            .state
            .assets_under_management
            .checked_add(deployed_signed)
            .ok_or(MathError::Overflow)?;
        let new_total_shares = math::checked_add(self.state.total_shares, shares)?;
        let new_balance = math::checked_add(self.balance_of(receiver), shares)?;

        let sender = env.caller().clone();
        let custody = self.config.address.clone();
        env.asset.transfer_from(&custody, &sender, &custody, amount)?;
        if deployed > 0 {
            env.asset.transfer(&custody, &self.treasury, deployed)?;
        }

        self.state.reserve = new_reserve;
        self.state.assets_under_management = new_aum;
        self.state.total_shares = new_total_shares;
        self.balances.insert(receiver.clone(), new_balance);

        debug!(%sender, %receiver, amount, shares, deployed, "deposit accepted");
        env.emit(Event::Deposit {
            sender,
            receiver: receiver.clone(),
            assets: amount,
            shares,
        });
        if deployed > 0 {
            env.emit(Event::Deployed {
                treasury: self.treasury.clone(),
                assets: deployed,
            });
        }
        Ok(shares)
    }

    /// Pays `amount` of underlying to `receiver`, burning the shares worth
    /// it (rounded up) from `owner`. A caller other than `owner` spends the
    /// owner's share allowance.
    ///
    /// Returns the shares burned.
    pub fn withdraw<A: FungibleAsset>(
        &mut self,
        env: &mut Env<'_, A>,
        amount: u64,
        receiver: &Address,
        owner: &Address,
    ) -> Result<u64, VaultError> {
        if amount == 0 {
            return Err(VaultError::ZeroAmount);
        }
        self.ensure_initialized()?;
        self.ensure_not_paused()?;

        let shares = self.convert_to_shares(amount, Rounding::Ceil)?;
        self.settle_exit(env, amount, shares, receiver, owner)?;
        Ok(shares)
    }

    /// Burns `shares` from `owner` and pays their value (rounded down) to
    /// `receiver`. Returns the assets paid.
    pub fn redeem<A: FungibleAsset>(
        &mut self,
        env: &mut Env<'_, A>,
        shares: u64,
        receiver: &Address,
        owner: &Address,
    ) -> Result<u64, VaultError> {
        if shares == 0 {
            return Err(VaultError::ZeroAmount);
        }
        self.ensure_initialized()?;
        self.ensure_not_paused()?;

        let assets = self.convert_to_assets(shares)?;
        if assets == 0 {
            return Err(VaultError::ZeroAssets { shares });
        }
        self.settle_exit(env, assets, shares, receiver, owner)?;
        Ok(assets)
    }

    fn settle_exit<A: FungibleAsset>(
        &mut self,
        env: &mut Env<'_, A>,
        assets: u64,
        shares: u64,
        receiver: &Address,
        owner: &Address,
    ) -> Result<(), VaultError> {
        if receiver.is_empty() {
            return Err(VaultError::InvalidAccount);
        }
        let available = self.balance_of(owner);
        if available < shares {
            return Err(VaultError::InsufficientShares {
                owner: owner.clone(),
                available,
                required: shares,
            });
        }
        let spendable = self.spendable_reserve()?;
        if spendable < assets {
            return Err(VaultError::InsufficientReserve {
                requested: assets,
                available: spendable,
            });
        }
        let sender = env.caller().clone();
        let remaining_allowance = if &sender != owner {
            Some(self.checked_allowance(owner, &sender, shares)?)
        } else {
            None
        };

        let custody = self.config.address.clone();
        env.asset.transfer(&custody, receiver, assets)?;

        if let Some(remaining) = remaining_allowance {
            self.set_allowance(owner, &sender, remaining);
        }
        self.set_balance(owner, available - shares);
        self.state.total_shares -= shares;
        self.state.reserve -= assets;

        debug!(%sender, %owner, %receiver, assets, shares, "withdrawal settled");
        env.emit(Event::Withdraw {
            sender,
            receiver: receiver.clone(),
            owner: owner.clone(),
            assets,
            shares,
        });
        Ok(())
    }

    // -- reserve management -------------------------------------------------

    /// Moves `amount` of the caller's underlying into the reserve without
    /// minting shares. Existing holders gain pro rata.
    pub fn top_up<A: FungibleAsset>(&mut self, env: &mut Env<'_, A>, amount: u64) -> Result<(), VaultError> {
        if amount == 0 {
            return Err(VaultError::ZeroAmount);
        }
        self.ensure_initialized()?;
        let new_reserve = math::checked_add(self.state.reserve, amount)?;

        let from = env.caller().clone();
        let custody = self.config.address.clone();
        env.asset.transfer(&from, &custody, amount)?;
        self.state.reserve = new_reserve;

        env.emit(Event::ReserveToppedUp { from, assets: amount });
        Ok(())
    }

    /// Marks off-ledger value up (`delta > 0`) or down (`delta < 0`).
    /// Asset manager only. A loss larger than total assets is rejected.
    pub fn update_asset_under_management<A: FungibleAsset>(
        &mut self,
        env: &mut Env<'_, A>,
        delta: i64,
    ) -> Result<(), VaultError> {
        self.ensure_initialized()?;
        env.require_role(Role::AssetManager)?;

        let total_assets = self.total_assets()?;
        let new_aum = self
            .state
            .assets_under_management
            .checked_add(delta)
            .ok_or(MathError::Overflow)?;
        match math::apply_delta(self.state.reserve, new_aum) {
            Ok(_) => {}
            Err(MathError::Underflow) => {
                return Err(VaultError::LossExceedsAssets { delta, total_assets });
            }
            Err(e) => return Err(e.into()),
        }
        self.state.assets_under_management = new_aum;

        info!(operator = %env.caller(), delta, aum = new_aum, "assets under management marked");
        env.emit(Event::AumUpdated {
            operator: env.caller().clone(),
            delta,
            assets_under_management: new_aum,
        });
        Ok(())
    }

    /// Sends `amount` of reserve to `to` without touching shares. Grant
    /// manager only. Remaining shares reprice downward until the funds come
    /// back through [`receive_repayment`](Self::receive_repayment).
    pub fn grant<A: FungibleAsset>(
        &mut self,
        env: &mut Env<'_, A>,
        to: &Address,
        amount: u64,
    ) -> Result<(), VaultError> {
        if amount == 0 {
            return Err(VaultError::ZeroAmount);
        }
        if to.is_empty() {
            return Err(VaultError::InvalidAccount);
        }
        self.ensure_initialized()?;
        env.require_role(Role::GrantManager)?;
        let available = self.spendable_reserve()?;
        if amount > available {
            return Err(VaultError::InsufficientReserve {
                requested: amount,
                available,
            });
        }

        let custody = self.config.address.clone();
        env.asset.transfer(&custody, to, amount)?;
        self.state.reserve -= amount;

        info!(manager = %env.caller(), %to, amount, reserve = self.state.reserve, "reserve granted");
        env.emit(Event::Granted {
            manager: env.caller().clone(),
            to: to.clone(),
            assets: amount,
        });
        Ok(())
    }

    /// Pulls `amount` of underlying from `from` into the reserve. The caller
    /// must be a grant manager holding an underlying allowance from `from`.
    pub fn receive_repayment<A: FungibleAsset>(
        &mut self,
        env: &mut Env<'_, A>,
        from: &Address,
        amount: u64,
    ) -> Result<(), VaultError> {
        if amount == 0 {
            return Err(VaultError::ZeroAmount);
        }
        self.ensure_initialized()?;
        env.require_role(Role::GrantManager)?;
        let new_reserve = math::checked_add(self.state.reserve, amount)?;

        let manager = env.caller().clone();
        let custody = self.config.address.clone();
        env.asset.transfer_from(&manager, from, &custody, amount)?;
        self.state.reserve = new_reserve;

        env.emit(Event::RepaymentReceived {
            manager,
            from: from.clone(),
            assets: amount,
        });
        Ok(())
    }

    /// Burns `shares` out of the caller's own balance. Grant manager only;
    /// used for collateral seized at liquidation.
    pub fn burn_seized<A: FungibleAsset>(&mut self, env: &mut Env<'_, A>, shares: u64) -> Result<(), VaultError> {
        if shares == 0 {
            return Err(VaultError::ZeroAmount);
        }
        self.ensure_initialized()?;
        env.require_role(Role::GrantManager)?;

        let manager = env.caller().clone();
        let available = self.balance_of(&manager);
        if available < shares {
            return Err(VaultError::InsufficientShares {
                owner: manager,
                available,
                required: shares,
            });
        }
        self.set_balance(&manager, available - shares);
        self.state.total_shares -= shares;

        env.emit(Event::SharesSeized { manager, shares });
        Ok(())
    }

    // -- share token --------------------------------------------------------

    /// Moves `shares` from the caller to `to`.
    pub fn transfer<A: FungibleAsset>(
        &mut self,
        env: &mut Env<'_, A>,
        to: &Address,
        shares: u64,
    ) -> Result<(), VaultError> {
        self.ensure_initialized()?;
        self.ensure_not_paused()?;
        let from = env.caller().clone();
        self.move_shares(&from, to, shares)?;
        env.emit(Event::SharesTransferred {
            from,
            to: to.clone(),
            shares,
        });
        Ok(())
    }

    /// Sets the caller's share allowance for `spender`.
    pub fn approve<A: FungibleAsset>(
        &mut self,
        env: &mut Env<'_, A>,
        spender: &Address,
        shares: u64,
    ) -> Result<(), VaultError> {
        self.ensure_initialized()?;
        self.ensure_not_paused()?;
        if spender.is_empty() {
            return Err(VaultError::InvalidAccount);
        }
        let owner = env.caller().clone();
        self.set_allowance(&owner, spender, shares);
        env.emit(Event::SharesApproved {
            owner,
            spender: spender.clone(),
            shares,
        });
        Ok(())
    }

    /// Moves `shares` from `owner` to `to`, spending the caller's allowance.
    pub fn transfer_from<A: FungibleAsset>(
        &mut self,
        env: &mut Env<'_, A>,
        owner: &Address,
        to: &Address,
        shares: u64,
    ) -> Result<(), VaultError> {
        self.ensure_initialized()?;
        self.ensure_not_paused()?;
        let spender = env.caller().clone();
        let remaining = self.checked_allowance(owner, &spender, shares)?;
        self.move_shares(owner, to, shares)?;
        self.set_allowance(owner, &spender, remaining);
        env.emit(Event::SharesTransferred {
            from: owner.clone(),
            to: to.clone(),
            shares,
        });
        Ok(())
    }

    fn move_shares(&mut self, from: &Address, to: &Address, shares: u64) -> Result<(), VaultError> {
        if to.is_empty() {
            return Err(VaultError::InvalidAccount);
        }
        let available = self.balance_of(from);
        if available < shares {
            return Err(VaultError::InsufficientShares {
                owner: from.clone(),
                available,
                required: shares,
            });
        }
        if from == to || shares == 0 {
            return Ok(());
        }
        let credited = math::checked_add(self.balance_of(to), shares)?;
        self.set_balance(from, available - shares);
        self.set_balance(to, credited);
        Ok(())
    }

    fn checked_allowance(&self, owner: &Address, spender: &Address, shares: u64) -> Result<u64, VaultError> {
        let available = self.allowance(owner, spender);
        if available < shares {
            return Err(VaultError::InsufficientShareAllowance {
                owner: owner.clone(),
                spender: spender.clone(),
                available,
                required: shares,
            });
        }
        Ok(available - shares)
    }

    fn set_balance(&mut self, holder: &Address, shares: u64) {
        if shares == 0 {
            self.balances.remove(holder);
        } else {
            self.balances.insert(holder.clone(), shares);
        }
    }

    fn set_allowance(&mut self, owner: &Address, spender: &Address, shares: u64) {
        let entry = self.allowances.entry(owner.clone()).or_default();
        if shares == 0 {
            entry.remove(spender);
            if entry.is_empty() {
                self.allowances.remove(owner);
            }
        } else {
            entry.insert(spender.clone(), shares);
        }
    }

    // -- views --------------------------------------------------------------

    /// `reserve + assets_under_management`.
    pub fn total_assets(&self) -> Result<u64, MathError> {
        math::apply_delta(self.state.reserve, self.state.assets_under_management)
    }

    /// Value of `shares` in underlying, rounded down.
    pub fn convert_to_assets(&self, shares: u64) -> Result<u64, MathError> {
        let total_assets = math::checked_add(self.total_assets()?, 1)?;
        let total_shares = math::checked_add(self.state.total_shares, 1)?;
        math::mul_div(shares, total_assets, total_shares, Rounding::Floor)
    }

    /// Shares worth `assets`, with the given rounding.
    pub fn convert_to_shares(&self, assets: u64, rounding: Rounding) -> Result<u64, MathError> {
        let total_assets = math::checked_add(self.total_assets()?, 1)?;
        let total_shares = math::checked_add(self.state.total_shares, 1)?;
        math::mul_div(assets, total_shares, total_assets, rounding)
    }

    /// Shares a deposit of `assets` would mint.
    pub fn preview_deposit(&self, assets: u64) -> Result<u64, MathError> {
        self.convert_to_shares(assets, Rounding::Floor)
    }

    /// Shares a withdrawal of `assets` would burn.
    pub fn preview_withdraw(&self, assets: u64) -> Result<u64, MathError> {
        self.convert_to_shares(assets, Rounding::Ceil)
    }

    /// Assets a redemption of `shares` would pay.
    pub fn preview_redeem(&self, shares: u64) -> Result<u64, MathError> {
        self.convert_to_assets(shares)
    }

    /// Largest deposit accepted right now.
    pub fn max_deposit(&self) -> u64 {
        if !self.initialized || self.state.paused || !self.state.pool_active {
            return 0;
        }
        math::saturating_sub(self.state.deposit_cap, self.state.reserve)
    }

    /// Largest withdrawal `owner` could make right now.
    pub fn max_withdraw(&self, owner: &Address) -> Result<u64, MathError> {
        if !self.initialized || self.state.paused {
            return Ok(0);
        }
        let value = self.convert_to_assets(self.balance_of(owner))?;
        Ok(value.min(self.spendable_reserve()?))
    }

    /// Reserve that can leave custody without driving total assets below
    /// zero. Smaller than `reserve` only while a loss is marked.
    fn spendable_reserve(&self) -> Result<u64, MathError> {
        Ok(self.state.reserve.min(self.total_assets()?))
    }

    pub fn balance_of(&self, holder: &Address) -> u64 {
        self.balances.get(holder).copied().unwrap_or(0)
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> u64 {
        self.allowances
            .get(owner)
            .and_then(|m| m.get(spender))
            .copied()
            .unwrap_or(0)
    }

    /// Total shares outstanding.
    pub fn total_supply(&self) -> u64 {
        self.state.total_shares
    }

    /// Number of holders with a non-zero balance.
    pub fn holder_count(&self) -> usize {
        self.balances.len()
    }

    pub fn state(&self) -> &VaultState {
        &self.state
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Custody account of the reserve.
    pub fn address(&self) -> &Address {
        &self.config.address
    }

    pub fn treasury(&self) -> &Address {
        &self.treasury
    }

    /// Handle of the underlying asset recorded at initialization.
    pub fn underlying(&self) -> &Address {
        &self.underlying
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_paused(&self) -> bool {
        self.state.paused
    }

    pub fn name(&self) -> &str {
        &self.config.share_name
    }

    pub fn symbol(&self) -> &str {
        &self.config.share_symbol
    }

    pub fn decimals(&self) -> u8 {
        self.config.share_decimals
    }

    fn ensure_initialized(&self) -> Result<(), VaultError> {
        if self.initialized {
            Ok(())
        } else {
            Err(VaultError::NotInitialized)
        }
    }

    fn ensure_not_paused(&self) -> Result<(), VaultError> {
        if self.state.paused {
            Err(VaultError::VaultPaused)
        } else {
            Ok(())
        }
    }
}
