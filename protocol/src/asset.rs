//! # Fungible Asset Interface
//!
//! The vault does not define its deposit asset. It talks to whatever ledger
//! the execution environment provides through [`FungibleAsset`], the usual
//! balance / transfer / allowance surface of a fungible token.
//!
//! [`TokenLedger`] is an in-memory implementation used as the underlying
//! stablecoin in tests, benches, and single-process embeddings.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::error::ErrorKind;
use crate::math::{self, MathError};
use crate::types::Address;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures reported by a fungible asset ledger.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AssetError {
    /// Sender holds less than the transfer amount.
    #[error("insufficient balance for {account}: have {available}, need {required}")]
    InsufficientBalance {
        /// Debited account.
        account: Address,
        /// Current balance.
        available: u64,
        /// Requested amount.
        required: u64,
    },

    /// Spender's allowance does not cover the transfer.
    #[error("insufficient allowance from {owner} to {spender}: have {available}, need {required}")]
    InsufficientAllowance {
        /// Account whose funds are being moved.
        owner: Address,
        /// Account moving them.
        spender: Address,
        /// Current allowance.
        available: u64,
        /// Requested amount.
        required: u64,
    },

    /// Empty receiver or spender.
    #[error("invalid account: empty identifier")]
    InvalidAccount,

    /// Supply or balance overflow.
    #[error(transparent)]
    Math(#[from] MathError),
}

impl AssetError {
    /// Maps to the shared taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AssetError::InsufficientBalance { .. } | AssetError::InsufficientAllowance { .. } => {
                ErrorKind::InsufficientFunds
            }
            AssetError::InvalidAccount => ErrorKind::Validation,
            AssetError::Math(e) => e.kind(),
        }
    }
}

// ---------------------------------------------------------------------------
// Interface
// ---------------------------------------------------------------------------

/// Standard fungible-token surface consumed by the vault and the leverage
/// engine.
///
/// Implementations must be all-or-nothing per call: a failed transfer leaves
/// both balances and the allowance untouched.
pub trait FungibleAsset {
    /// Balance held by `account`.
    fn balance_of(&self, account: &Address) -> u64;

    /// Total units in existence.
    fn total_supply(&self) -> u64;

    /// Moves `amount` from `from` to `to`. The caller has already been
    /// authenticated as `from`.
    fn transfer(&mut self, from: &Address, to: &Address, amount: u64) -> Result<(), AssetError>;

    /// Sets the amount `spender` may move out of `owner`'s balance.
    fn approve(&mut self, owner: &Address, spender: &Address, amount: u64) -> Result<(), AssetError>;

    /// Remaining amount `spender` may move out of `owner`'s balance.
    fn allowance(&self, owner: &Address, spender: &Address) -> u64;

    /// Moves `amount` from `owner` to `to` on behalf of `spender`, consuming
    /// allowance.
    fn transfer_from(
        &mut self,
        spender: &Address,
        owner: &Address,
        to: &Address,
        amount: u64,
    ) -> Result<(), AssetError>;
}

// ---------------------------------------------------------------------------
// TokenLedger
// ---------------------------------------------------------------------------

/// In-memory fungible token.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenLedger {
    symbol: String,
    decimals: u8,
    total_supply: u64,
    balances: HashMap<Address, u64>,
    /// owner -> spender -> remaining allowance
    allowances: HashMap<Address, HashMap<Address, u64>>,
}

impl TokenLedger {
    /// Creates an empty ledger.
    pub fn new(symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            symbol: symbol.into(),
            decimals,
            ..Self::default()
        }
    }

    /// Ticker symbol.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Display decimals.
    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    /// Creates `amount` new units in `to`'s balance. Issuance is the token
    /// operator's business; the lending core never calls this.
    pub fn mint(&mut self, to: &Address, amount: u64) -> Result<(), AssetError> {
        if to.is_empty() {
            return Err(AssetError::InvalidAccount);
        }
        let supply = math::checked_add(self.total_supply, amount)?;
        let balance = math::checked_add(self.balance_of(to), amount)?;
        self.total_supply = supply;
        self.balances.insert(to.clone(), balance);
        debug!(symbol = %self.symbol, %to, amount, "minted");
        Ok(())
    }

    /// Number of accounts with a non-zero balance.
    pub fn holder_count(&self) -> usize {
        self.balances.len()
    }

    fn debit(&mut self, account: &Address, amount: u64) -> Result<(), AssetError> {
        let available = self.balance_of(account);
        if available < amount {
            return Err(AssetError::InsufficientBalance {
                account: account.clone(),
                available,
                required: amount,
            });
        }
        let remaining = available - amount;
        if remaining == 0 {
            self.balances.remove(account);
        } else {
            self.balances.insert(account.clone(), remaining);
        }
        Ok(())
    }

    fn check_transfer(&self, from: &Address, to: &Address, amount: u64) -> Result<(), AssetError> {
        if to.is_empty() {
            return Err(AssetError::InvalidAccount);
        }
        let available = self.balance_of(from);
        if available < amount {
            return Err(AssetError::InsufficientBalance {
                account: from.clone(),
                available,
                required: amount,
            });
        }
        if from != to {
            math::checked_add(self.balance_of(to), amount)?;
        }
        Ok(())
    }
}

impl FungibleAsset for TokenLedger {
    fn balance_of(&self, account: &Address) -> u64 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    fn total_supply(&self) -> u64 {
        self.total_supply
    }

    fn transfer(&mut self, from: &Address, to: &Address, amount: u64) -> Result<(), AssetError> {
        self.check_transfer(from, to, amount)?;
        if amount == 0 || from == to {
            return Ok(());
        }
        self.debit(from, amount)?;
        let credited = self.balance_of(to) + amount;
        self.balances.insert(to.clone(), credited);
        debug!(symbol = %self.symbol, %from, %to, amount, "transfer");
        Ok(())
    }

    fn approve(&mut self, owner: &Address, spender: &Address, amount: u64) -> Result<(), AssetError> {
        if spender.is_empty() {
            return Err(AssetError::InvalidAccount);
        }
        let entry = self.allowances.entry(owner.clone()).or_default();
        if amount == 0 {
            entry.remove(spender);
            if entry.is_empty() {
                self.allowances.remove(owner);
            }
        } else {
            entry.insert(spender.clone(), amount);
        }
        Ok(())
    }

    fn allowance(&self, owner: &Address, spender: &Address) -> u64 {
        self.allowances
            .get(owner)
            .and_then(|m| m.get(spender))
            .copied()
            .unwrap_or(0)
    }

    fn transfer_from(
        &mut self,
        spender: &Address,
        owner: &Address,
        to: &Address,
        amount: u64,
    ) -> Result<(), AssetError> {
        let available = self.allowance(owner, spender);
        if available < amount {
            return Err(AssetError::InsufficientAllowance {
                owner: owner.clone(),
                spender: spender.clone(),
                available,
                required: amount,
            });
        }
        self.check_transfer(owner, to, amount)?;
        self.approve(owner, spender, available - amount)?;
        self.transfer(owner, to, amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn funded() -> (TokenLedger, Address, Address) {
        let mut ledger = TokenLedger::new("USDC", 6);
        let alice = Address::new("alice");
        let bob = Address::new("bob");
        ledger.mint(&alice, 1_000).unwrap();
        (ledger, alice, bob)
    }

    #[test]
    fn mint_and_transfer() {
        let (mut ledger, alice, bob) = funded();
        ledger.transfer(&alice, &bob, 400).unwrap();

        assert_eq!(ledger.balance_of(&alice), 600);
        assert_eq!(ledger.balance_of(&bob), 400);
        assert_eq!(ledger.total_supply(), 1_000);
    }

    #[test]
    fn transfer_rejects_overdraft_without_side_effects() {
        let (mut ledger, alice, bob) = funded();
        let result = ledger.transfer(&alice, &bob, 1_001);

        assert!(matches!(
            result,
            Err(AssetError::InsufficientBalance { available: 1_000, required: 1_001, .. })
        ));
        assert_eq!(ledger.balance_of(&alice), 1_000);
        assert_eq!(ledger.balance_of(&bob), 0);
    }

    #[test]
    fn zero_balances_are_pruned() {
        let (mut ledger, alice, bob) = funded();
        ledger.transfer(&alice, &bob, 1_000).unwrap();
        assert_eq!(ledger.holder_count(), 1);
    }

    #[test]
    fn transfer_from_consumes_allowance() {
        let (mut ledger, alice, bob) = funded();
        let vault = Address::new("vault");
        ledger.approve(&alice, &vault, 300).unwrap();

        ledger.transfer_from(&vault, &alice, &vault, 200).unwrap();
        assert_eq!(ledger.allowance(&alice, &vault), 100);
        assert_eq!(ledger.balance_of(&vault), 200);

        let err = ledger.transfer_from(&vault, &alice, &bob, 101).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
        assert_eq!(ledger.allowance(&alice, &vault), 100);
    }

    #[test]
    fn transfer_from_keeps_allowance_when_balance_short() {
        let (mut ledger, alice, bob) = funded();
        ledger.approve(&alice, &bob, 5_000).unwrap();

        let result = ledger.transfer_from(&bob, &alice, &bob, 2_000);
        assert!(matches!(result, Err(AssetError::InsufficientBalance { .. })));
        assert_eq!(ledger.allowance(&alice, &bob), 5_000);
    }

    #[test]
    fn mint_overflow_is_reported() {
        let (mut ledger, alice, _) = funded();
        let result = ledger.mint(&alice, u64::MAX);
        assert_eq!(result, Err(AssetError::Math(MathError::Overflow)));
        assert_eq!(ledger.total_supply(), 1_000);
    }

    #[test]
    fn ledger_serialization_roundtrip() {
        let (mut ledger, alice, bob) = funded();
        ledger.approve(&alice, &bob, 10).unwrap();
        let json = serde_json::to_string(&ledger).expect("serialize");
        let recovered: TokenLedger = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(recovered, ledger);
    }
}
