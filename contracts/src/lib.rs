// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # RWA Lending Core
//!
//! The two engines of a real-world-asset lending protocol and the facade
//! that runs them. Lenders bring stablecoin, the vault hands back shares,
//! and share-holders who want more exposure lock those shares up and
//! borrow against them. The off-ledger part (the actual real-world assets)
//! shows up here only as a number an asset manager is trusted to mark.
//!
//! - **Vault** — pools a stable deposit asset, issues shares, and tracks
//!   the mark of assets deployed off-ledger.
//! - **Leverage** — lets share-holders stake shares as collateral and
//!   borrow from the vault reserve at a schedule-priced rate.
//! - **Market** — owns all state and applies each public operation
//!   atomically.
//!
//! ## Design Principles
//!
//! 1. Integer-only math with explicit rounding. Every share/asset
//!    conversion goes through `rwa_protocol::math::mul_div`.
//! 2. Roles are checked before any state is touched.
//! 3. An operation commits entirely or not at all.
//! 4. Interest accrues lazily; nothing runs in the background.

pub mod env;
pub mod error;
pub mod leverage;
pub mod market;
pub mod vault;

pub use env::Env;
pub use error::ContractError;
pub use leverage::{LeverageEngine, LeverageError, LeveragePosition, LiquidationResolution};
pub use market::{Market, SharedMarket};
pub use vault::{Vault, VaultError, VaultState};
