// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # RWA Lending Protocol — Core Primitives
//!
//! The pieces both lending engines stand on. None of it is glamorous, and
//! that is the point: when a vault mis-rounds by one unit, someone finds a
//! way to do it a million times. So the math is integer-only, the rounding
//! direction is always spelled out, and every role check happens before a
//! single balance moves.
//!
//! ## Modules
//!
//! - **math** — mul-div with explicit rounding, checked add/sub, interest.
//! - **access** — role table consulted by every privileged operation.
//! - **asset** — `FungibleAsset` trait and an in-memory `TokenLedger`.
//! - **events** — audit trail for off-core indexers.
//! - **clock** — wall clock and a manual clock for tests.
//! - **config** — constants, rate schedule, runtime configuration.
//! - **logging** — `tracing` subscriber bootstrap.
//! - **types** — addresses and pool status.
//! - **error** — the error kinds shared by every module.
//!
//! The engines themselves live in the `rwa-contracts` crate.

pub mod access;
pub mod asset;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod math;
pub mod types;

pub use access::{AccessControl, AccessError, Role};
pub use asset::{AssetError, FungibleAsset, TokenLedger};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{LeverageConfig, LiquidationPolicy, ProtocolConfig, RateSchedule, VaultConfig};
pub use error::ErrorKind;
pub use events::{Event, EventLog, EventRecord};
pub use math::{MathError, Rounding};
pub use types::{Address, PoolStatus};
