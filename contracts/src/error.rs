//! # Contract Errors
//!
//! [`ContractError`] is what the [`Market`](crate::market::Market) facade
//! returns. It wraps the precise engine errors so callers can still match
//! on them, and collapses them into an [`ErrorKind`] for everyone else.
//! Role failures arrive inside the engine that checked the role.

use thiserror::Error;

use rwa_protocol::asset::AssetError;
use rwa_protocol::config::ConfigError;
use rwa_protocol::error::ErrorKind;

use crate::leverage::LeverageError;
use crate::vault::VaultError;

/// Any failure of a public lending-core operation.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ContractError {
    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error(transparent)]
    Leverage(#[from] LeverageError),

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl ContractError {
    /// Coarse classification of the failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ContractError::Vault(e) => e.kind(),
            ContractError::Leverage(e) => e.kind(),
            ContractError::Asset(e) => e.kind(),
            ContractError::Config(_) => ErrorKind::Validation,
        }
    }
}
