//! # Leverage Engine
//!
//! Lets vault share-holders lock shares as collateral and borrow underlying
//! against them. Funds come out of the vault reserve through `grant`, and
//! repayments go back through `receive_repayment`, so the engine must hold
//! the grant-manager role on the vault before anyone can borrow.
//!
//! ## Positions
//!
//! One [`LeveragePosition`] per borrower. Interest is simple and accrues
//! lazily, with no background task:
//!
//! ```text
//! due(now) = payment_due + total_borrowed * borrow_apy * (now - borrow_time)
//!                          / (10_000 * SECONDS_PER_YEAR)
//! ```
//!
//! Every write checkpoints `due(now)` into `payment_due` and resets
//! `borrow_time`, so gaps of any length between calls are accounted for.
//!
//! ## Pricing
//!
//! A new loan is priced from the [`RateSchedule`]: utilization (debt after
//! the loan over collateral value) picks a tier, the requested duration
//! adds a premium. A second loan blends into the existing rate weighted by
//! principal.
//!
//! ## Liquidation
//!
//! Risk is scored off-core. A liquidity manager submits the state each
//! borrower should end up in, and the engine checks that the resolution
//! only ever takes: less stake, less debt, no higher rate. Anything fancier
//! is the `RequireShortfall` policy's job.
//!
//! [`RateSchedule`]: rwa_protocol::config::RateSchedule

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use rwa_protocol::access::{AccessError, Role};
use rwa_protocol::asset::FungibleAsset;
use rwa_protocol::config::{LeverageConfig, LiquidationPolicy, RATE_DENOMINATOR};
use rwa_protocol::error::ErrorKind;
use rwa_protocol::events::Event;
use rwa_protocol::math::{self, MathError};
use rwa_protocol::types::{Address, PoolStatus};

use crate::env::Env;
use crate::vault::{Vault, VaultError};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by leverage operations.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LeverageError {
    #[error("amount must be positive")]
    ZeroAmount,

    #[error("pool {pool_id} is not active")]
    PoolInactive { pool_id: u32 },

    /// Lock or loan duration outside the configured range.
    #[error("duration {duration}s is outside 0..={max}s")]
    InvalidDuration { duration: u64, max: u64 },

    #[error("insufficient stake: have {available}, requested {requested}")]
    InsufficientStake { available: u64, requested: u64 },

    #[error("position locked until {expires_at} (now {now})")]
    PositionLocked { expires_at: u64, now: u64 },

    /// Collateral cannot leave while a loan is open.
    #[error("outstanding debt of {payment_due}")]
    OutstandingDebt { payment_due: u64 },

    /// Debt after the loan would exceed the loan-to-value ceiling.
    #[error("collateral worth {collateral_value} supports at most {max_borrow}, requested {requested}")]
    InsufficientCollateral {
        collateral_value: u64,
        requested: u64,
        max_borrow: u64,
    },

    /// No schedule entry covers this loan.
    #[error("no rate for utilization {utilization_bps} bps over {duration}s")]
    RateUnavailable { utilization_bps: u64, duration: u64 },

    #[error("no outstanding debt")]
    NoOutstandingDebt,

    /// The borrower has not approved the engine for the repayment amount.
    #[error("insufficient allowance: have {available}, need {required}")]
    InsufficientAllowance { available: u64, required: u64 },

    #[error("no position for borrower {0}")]
    UnknownBorrower(Address),

    #[error("borrower {0} appears more than once in the batch")]
    DuplicateResolution(Address),

    #[error("resolution for {borrower} rejected: {reason}")]
    InvalidResolution {
        borrower: Address,
        reason: &'static str,
    },

    /// Collateral still covers the debt.
    #[error("position of {borrower} is healthy: collateral {collateral_value}, due {payment_due}")]
    PositionHealthy {
        borrower: Address,
        collateral_value: u64,
        payment_due: u64,
    },

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error(transparent)]
    Math(#[from] MathError),
}

impl LeverageError {
    /// Maps to the shared taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LeverageError::ZeroAmount
            | LeverageError::InvalidDuration { .. }
            | LeverageError::RateUnavailable { .. }
            | LeverageError::UnknownBorrower(_)
            | LeverageError::DuplicateResolution(_)
            | LeverageError::InvalidResolution { .. } => ErrorKind::Validation,
            LeverageError::PoolInactive { .. }
            | LeverageError::PositionLocked { .. }
            | LeverageError::OutstandingDebt { .. }
            | LeverageError::NoOutstandingDebt
            | LeverageError::PositionHealthy { .. } => ErrorKind::State,
            LeverageError::InsufficientStake { .. }
            | LeverageError::InsufficientCollateral { .. }
            | LeverageError::InsufficientAllowance { .. } => ErrorKind::InsufficientFunds,
            LeverageError::Vault(e) => e.kind(),
            LeverageError::Access(e) => e.kind(),
            LeverageError::Math(e) => e.kind(),
        }
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A borrower's collateral and debt.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeveragePosition {
    /// Vault shares held in the engine's custody.
    pub total_staked: u64,
    /// Outstanding principal, in underlying.
    pub total_borrowed: u64,
    /// Annual rate on `total_borrowed`, in bps.
    pub borrow_apy: u32,
    /// Timestamp of the last checkpoint.
    pub borrow_time: u64,
    /// Principal plus interest as of `borrow_time`.
    pub payment_due: u64,
}

impl LeveragePosition {
    /// Amount owed at `now`.
    pub fn current_due(&self, now: u64) -> Result<u64, MathError> {
        let elapsed = now.saturating_sub(self.borrow_time);
        let interest = math::simple_interest(self.total_borrowed, self.borrow_apy, elapsed)?;
        math::checked_add(self.payment_due, interest)
    }

    /// Any principal or accrued amount outstanding.
    pub fn has_debt(&self) -> bool {
        self.total_borrowed > 0 || self.payment_due > 0
    }

    /// No stake and no debt.
    pub fn is_empty(&self) -> bool {
        self.total_staked == 0 && !self.has_debt()
    }

    fn clear_debt(&mut self) {
        self.total_borrowed = 0;
        self.borrow_apy = 0;
        self.borrow_time = 0;
        self.payment_due = 0;
    }
}

/// Latest lock expiry across all of a borrower's stakes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeLock {
    pub expires_at: u64,
}

/// Target state for one borrower in a liquidation batch.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationResolution {
    pub borrower: Address,
    #[serde(flatten)]
    pub position: LeveragePosition,
}

impl LiquidationResolution {
    /// Full seizure: every field zeroed.
    pub fn seize_all(borrower: Address) -> Self {
        Self {
            borrower,
            position: LeveragePosition::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The collateral and leverage engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeverageEngine {
    config: LeverageConfig,
    positions: HashMap<Address, LeveragePosition>,
    locks: HashMap<Address, StakeLock>,
    pools: HashMap<u32, PoolStatus>,
}

impl LeverageEngine {
    pub fn new(config: LeverageConfig) -> Self {
        Self {
            config,
            positions: HashMap::new(),
            locks: HashMap::new(),
            pools: HashMap::new(),
        }
    }

    /// Activates or deactivates `pool_id`. Pool operator only.
    pub fn update_pool_status<A: FungibleAsset>(
        &mut self,
        env: &mut Env<'_, A>,
        pool_id: u32,
        status: PoolStatus,
    ) -> Result<(), LeverageError> {
        env.require_role(Role::PoolOperator)?;
        self.pools.insert(pool_id, status);
        info!(operator = %env.caller(), pool_id, %status, "pool status updated");
        env.emit(Event::PoolStatusUpdated {
            operator: env.caller().clone(),
            pool_id,
            status,
        });
        Ok(())
    }

    /// Locks `shares` of the caller's vault shares for `lock_duration`
    /// seconds. The caller must have approved the engine as a share spender.
    /// Returns the binding lock expiry.
    pub fn stake<A: FungibleAsset>(
        &mut self,
        env: &mut Env<'_, A>,
        vault: &mut Vault,
        shares: u64,
        lock_duration: u64,
    ) -> Result<u64, LeverageError> {
        if shares == 0 {
            return Err(LeverageError::ZeroAmount);
        }
        self.ensure_pool_active()?;
        if lock_duration > self.config.max_lock_duration {
            return Err(LeverageError::InvalidDuration {
                duration: lock_duration,
                max: self.config.max_lock_duration,
            });
        }

        let borrower = env.caller().clone();
        let position = self.positions.get(&borrower).cloned().unwrap_or_default();
        let total_staked = math::checked_add(position.total_staked, shares)?;
        let requested_expiry = math::checked_add(env.now(), lock_duration)?;
        let expires_at = self
            .locks
            .get(&borrower)
            .map_or(requested_expiry, |lock| lock.expires_at.max(requested_expiry));

        let custody = self.config.address.clone();
        vault.transfer_from(&mut env.as_caller(custody.clone()), &borrower, &custody, shares)?;

        self.positions.insert(
            borrower.clone(),
            LeveragePosition {
                total_staked,
                ..position
            },
        );
        self.locks.insert(borrower.clone(), StakeLock { expires_at });

        debug!(%borrower, shares, total_staked, expires_at, "stake accepted");
        env.emit(Event::Staked {
            borrower,
            shares,
            lock_expires_at: expires_at,
        });
        Ok(expires_at)
    }

    /// Returns `shares` of collateral to the caller. Fails while the lock
    /// is running or any debt is open.
    pub fn unstake<A: FungibleAsset>(
        &mut self,
        env: &mut Env<'_, A>,
        vault: &mut Vault,
        shares: u64,
    ) -> Result<(), LeverageError> {
        if shares == 0 {
            return Err(LeverageError::ZeroAmount);
        }
        let borrower = env.caller().clone();
        let mut position = self.positions.get(&borrower).cloned().unwrap_or_default();
        if position.total_staked < shares {
            return Err(LeverageError::InsufficientStake {
                available: position.total_staked,
                requested: shares,
            });
        }
        if let Some(lock) = self.locks.get(&borrower) {
            if env.now() < lock.expires_at {
                return Err(LeverageError::PositionLocked {
                    expires_at: lock.expires_at,
                    now: env.now(),
                });
            }
        }
        if position.has_debt() {
            return Err(LeverageError::OutstandingDebt {
                payment_due: position.current_due(env.now())?,
            });
        }

        let custody = self.config.address.clone();
        vault.transfer(&mut env.as_caller(custody), &borrower, shares)?;

        position.total_staked -= shares;
        self.store(&borrower, position);

        debug!(%borrower, shares, "unstaked");
        env.emit(Event::Unstaked { borrower, shares });
        Ok(())
    }

    /// Borrows `amount` of underlying for `duration` seconds against the
    /// caller's staked shares. Returns the position's rate after blending.
    pub fn borrow<A: FungibleAsset>(
        &mut self,
        env: &mut Env<'_, A>,
        vault: &mut Vault,
        amount: u64,
        duration: u64,
    ) -> Result<u32, LeverageError> {
        if amount == 0 {
            return Err(LeverageError::ZeroAmount);
        }
        self.ensure_pool_active()?;
        if duration == 0 || duration > self.config.max_borrow_duration {
            return Err(LeverageError::InvalidDuration {
                duration,
                max: self.config.max_borrow_duration,
            });
        }

        let borrower = env.caller().clone();
        let now = env.now();
        let position = self.positions.get(&borrower).cloned().unwrap_or_default();

        let collateral_value = vault.convert_to_assets(position.total_staked)?;
        let due = position.current_due(now)?;
        let outstanding = math::checked_add(due, amount)?;
        let max_borrow = math::mul_div_floor(collateral_value, self.config.max_ltv_bps, RATE_DENOMINATOR)?;
        if collateral_value == 0 || outstanding > max_borrow {
            return Err(LeverageError::InsufficientCollateral {
                collateral_value,
                requested: outstanding,
                max_borrow,
            });
        }

        let utilization_bps = math::ratio_bps(outstanding, collateral_value)?;
        let loan_apy = self
            .config
            .rate_schedule
            .rate_for(utilization_bps, duration)
            .ok_or(LeverageError::RateUnavailable {
                utilization_bps,
                duration,
            })?;
        let total_borrowed = math::checked_add(position.total_borrowed, amount)?;
        let borrow_apy = blend_rate(position.total_borrowed, position.borrow_apy, amount, loan_apy)?;

        let custody = self.config.address.clone();
        vault.grant(&mut env.as_caller(custody), &borrower, amount)?;

        self.positions.insert(
            borrower.clone(),
            LeveragePosition {
                total_staked: position.total_staked,
                total_borrowed,
                borrow_apy,
                borrow_time: now,
                payment_due: outstanding,
            },
        );

        info!(%borrower, amount, duration, utilization_bps, borrow_apy, "loan issued");
        env.emit(Event::Borrowed {
            borrower,
            assets: amount,
            duration,
            apy_bps: borrow_apy,
        });
        Ok(borrow_apy)
    }

    /// Repays the caller's whole debt as of now. The caller must have
    /// approved the engine on the underlying for at least that amount.
    /// Staked collateral stays where it is. Returns the amount paid.
    pub fn pay<A: FungibleAsset>(&mut self, env: &mut Env<'_, A>, vault: &mut Vault) -> Result<u64, LeverageError> {
        let borrower = env.caller().clone();
        let position = self.positions.get(&borrower).cloned().unwrap_or_default();
        if !position.has_debt() {
            return Err(LeverageError::NoOutstandingDebt);
        }
        let due = position.current_due(env.now())?;
        self.settle_full(env, vault, borrower, position, due)?;
        Ok(due)
    }

    /// Repays up to `amount`. Anything at or above the current due settles
    /// the loan like [`pay`](Self::pay) and only the due is taken; less
    /// shrinks principal proportionally and keeps the rate. Returns the
    /// amount still owed.
    pub fn repay<A: FungibleAsset>(
        &mut self,
        env: &mut Env<'_, A>,
        vault: &mut Vault,
        amount: u64,
    ) -> Result<u64, LeverageError> {
        if amount == 0 {
            return Err(LeverageError::ZeroAmount);
        }
        let borrower = env.caller().clone();
        let position = self.positions.get(&borrower).cloned().unwrap_or_default();
        if !position.has_debt() {
            return Err(LeverageError::NoOutstandingDebt);
        }
        let now = env.now();
        let due = position.current_due(now)?;
        if amount >= due {
            self.settle_full(env, vault, borrower, position, due)?;
            return Ok(0);
        }

        let remaining = due - amount;
        let total_borrowed = math::mul_div_ceil(position.total_borrowed, remaining, due)?;
        self.collect(env, vault, &borrower, amount)?;

        self.positions.insert(
            borrower.clone(),
            LeveragePosition {
                total_borrowed,
                borrow_time: now,
                payment_due: remaining,
                ..position
            },
        );

        debug!(%borrower, amount, remaining, total_borrowed, "partial repayment");
        env.emit(Event::Repaid {
            borrower,
            assets: amount,
            remaining,
        });
        Ok(remaining)
    }

    fn settle_full<A: FungibleAsset>(
        &mut self,
        env: &mut Env<'_, A>,
        vault: &mut Vault,
        borrower: Address,
        mut position: LeveragePosition,
        due: u64,
    ) -> Result<(), LeverageError> {
        if due > 0 {
            self.collect(env, vault, &borrower, due)?;
        }
        position.clear_debt();
        self.store(&borrower, position);

        info!(%borrower, paid = due, "loan repaid in full");
        env.emit(Event::Repaid {
            borrower,
            assets: due,
            remaining: 0,
        });
        Ok(())
    }

    fn collect<A: FungibleAsset>(
        &self,
        env: &mut Env<'_, A>,
        vault: &mut Vault,
        borrower: &Address,
        amount: u64,
    ) -> Result<(), LeverageError> {
        let custody = self.config.address.clone();
        let available = env.asset.allowance(borrower, &custody);
        if available < amount {
            return Err(LeverageError::InsufficientAllowance {
                available,
                required: amount,
            });
        }
        vault.receive_repayment(&mut env.as_caller(custody), borrower, amount)?;
        Ok(())
    }

    /// Overwrites each named borrower's position with the supplied target
    /// state. Liquidity manager only.
    ///
    /// A target may lower stake, principal, due, and rate but never raise
    /// them. Its `borrow_time` is ignored: remaining debt accrues from the
    /// liquidation timestamp.
    ///
    /// The whole batch is validated before anything is applied. Shares
    /// released by a lower `total_staked` are burned in the vault, which
    /// returns their value to the remaining share-holders.
    pub fn liquidate<A: FungibleAsset>(
        &mut self,
        env: &mut Env<'_, A>,
        vault: &mut Vault,
        resolutions: &[LiquidationResolution],
    ) -> Result<(), LeverageError> {
        env.require_role(Role::LiquidityManager)?;
        let now = env.now();

        let mut seen = HashSet::new();
        let mut plan = Vec::with_capacity(resolutions.len());
        for resolution in resolutions {
            let borrower = &resolution.borrower;
            if !seen.insert(borrower) {
                return Err(LeverageError::DuplicateResolution(borrower.clone()));
            }
            let current = self
                .positions
                .get(borrower)
                .ok_or_else(|| LeverageError::UnknownBorrower(borrower.clone()))?;
            let due = current.current_due(now)?;
            let target = &resolution.position;

            if target.total_staked > current.total_staked {
                return Err(LeverageError::InvalidResolution {
                    borrower: borrower.clone(),
                    reason: "total_staked cannot increase",
                });
            }
            if target.total_borrowed > current.total_borrowed || target.payment_due > due {
                return Err(LeverageError::InvalidResolution {
                    borrower: borrower.clone(),
                    reason: "debt cannot increase",
                });
            }
            if target.borrow_apy > current.borrow_apy {
                return Err(LeverageError::InvalidResolution {
                    borrower: borrower.clone(),
                    reason: "borrow rate cannot increase",
                });
            }
            if self.config.liquidation_policy == LiquidationPolicy::RequireShortfall {
                let collateral_value = vault.convert_to_assets(current.total_staked)?;
                if collateral_value >= due {
                    return Err(LeverageError::PositionHealthy {
                        borrower: borrower.clone(),
                        collateral_value,
                        payment_due: due,
                    });
                }
            }

            let seized = current.total_staked - target.total_staked;
            let forgiven = due - target.payment_due;
            plan.push((resolution, seized, forgiven));
        }

        let manager = env.caller().clone();
        let custody = self.config.address.clone();
        for (resolution, seized, forgiven) in plan {
            if seized > 0 {
                vault.burn_seized(&mut env.as_caller(custody.clone()), seized)?;
            }
            let borrower = resolution.borrower.clone();
            // The target is a state as of now; interest restarts from here.
            let mut position = resolution.position.clone();
            if position.has_debt() {
                position.borrow_time = now;
            } else {
                position.clear_debt();
            }
            self.store(&borrower, position);

            warn!(%manager, %borrower, seized, forgiven, "position liquidated");
            env.emit(Event::Liquidated {
                manager: manager.clone(),
                borrower,
                seized_shares: seized,
                forgiven_debt: forgiven,
            });
        }
        Ok(())
    }

    // -- views --------------------------------------------------------------

    /// Stored position of `borrower`, if any.
    pub fn position(&self, borrower: &Address) -> Option<&LeveragePosition> {
        self.positions.get(borrower)
    }

    /// Stored position of `borrower`, or an all-zero one.
    pub fn leverages(&self, borrower: &Address) -> LeveragePosition {
        self.positions.get(borrower).cloned().unwrap_or_default()
    }

    /// What `borrower` owes at `now`.
    pub fn payment_due(&self, borrower: &Address, now: u64) -> Result<u64, MathError> {
        match self.positions.get(borrower) {
            Some(position) => position.current_due(now),
            None => Ok(0),
        }
    }

    /// Underlying value of `borrower`'s staked shares.
    pub fn collateral_value(&self, vault: &Vault, borrower: &Address) -> Result<u64, MathError> {
        let staked = self.positions.get(borrower).map_or(0, |p| p.total_staked);
        vault.convert_to_assets(staked)
    }

    /// Binding lock expiry of `borrower`.
    pub fn lock_expiry(&self, borrower: &Address) -> Option<u64> {
        self.locks.get(borrower).map(|lock| lock.expires_at)
    }

    pub fn pool_status(&self, pool_id: u32) -> PoolStatus {
        self.pools.get(&pool_id).copied().unwrap_or_default()
    }

    /// Number of borrowers with a non-empty position.
    pub fn borrower_count(&self) -> usize {
        self.positions.len()
    }

    pub fn config(&self) -> &LeverageConfig {
        &self.config
    }

    /// Custody account of staked shares.
    pub fn address(&self) -> &Address {
        &self.config.address
    }

    fn ensure_pool_active(&self) -> Result<(), LeverageError> {
        let pool_id = self.config.pool_id;
        if self.pool_status(pool_id).is_active() {
            Ok(())
        } else {
            Err(LeverageError::PoolInactive { pool_id })
        }
    }

    /// Writes `position`, dropping the entry and its lock once empty.
    fn store(&mut self, borrower: &Address, position: LeveragePosition) {
        if position.total_staked == 0 {
            self.locks.remove(borrower);
        }
        if position.is_empty() {
            self.positions.remove(borrower);
        } else {
            self.positions.insert(borrower.clone(), position);
        }
    }
}

/// Principal-weighted average of two rates.
fn blend_rate(principal: u64, rate: u32, added: u64, added_rate: u32) -> Result<u32, MathError> {
    if principal == 0 {
        return Ok(added_rate);
    }
    let weighted = (principal as u128) * (rate as u128) + (added as u128) * (added_rate as u128);
    let total = (principal as u128) + (added as u128);
    u32::try_from(weighted / total).map_err(|_| MathError::Overflow)
}
