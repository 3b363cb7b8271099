//! # Protocol Configuration & Constants
//!
//! Every magic number in the lending core lives here, next to the runtime
//! configuration an operator loads at deployment. If you find a bare
//! `10_000` anywhere else in the tree, move it here and feel good about it.
//!
//! Changing these after launch re-prices every open loan. Borrowers tend to
//! notice that.
//!
//! Runtime knobs ([`ProtocolConfig`]) are plain serde structs. Each field has
//! a default, so a config file only needs to mention what it overrides.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Address;

// ---------------------------------------------------------------------------
// Rate & Time Constants
// ---------------------------------------------------------------------------

/// One hundred percent, in basis points. 1 bp = 0.01%.
pub const RATE_DENOMINATOR: u64 = 10_000;

/// Seconds per year used for interest accrual. 365 days, no leap years.
pub const SECONDS_PER_YEAR: u64 = 365 * SECONDS_PER_DAY;

/// Seconds per day.
pub const SECONDS_PER_DAY: u64 = 86_400;

// ---------------------------------------------------------------------------
// Vault Defaults
// ---------------------------------------------------------------------------

/// Deposit cap used by the reference deployment (10e12 smallest units, i.e.
/// ten million of a six-decimal stablecoin).
pub const DEFAULT_DEPOSIT_CAP: u64 = 10_000_000_000_000;

/// Custody account that holds the vault's underlying reserve.
pub const DEFAULT_VAULT_ADDRESS: &str = "rwa-vault";

/// Share token metadata.
pub const DEFAULT_SHARE_NAME: &str = "RWA Vault Share";
pub const DEFAULT_SHARE_SYMBOL: &str = "rwaUSD";
pub const DEFAULT_SHARE_DECIMALS: u8 = 6;

// ---------------------------------------------------------------------------
// Leverage Defaults
// ---------------------------------------------------------------------------

/// Custody account that holds staked shares.
pub const DEFAULT_LEVERAGE_ADDRESS: &str = "rwa-leverage";

/// Pool served by the leverage engine out of the box.
pub const DEFAULT_POOL_ID: u32 = 1;

/// Maximum loan-to-value: 80% of the collateral's asset value.
pub const DEFAULT_MAX_LTV_BPS: u64 = 8_000;

/// Longest lock a single stake may request.
pub const DEFAULT_MAX_LOCK_DURATION: u64 = 365 * SECONDS_PER_DAY;

/// Longest loan term a single borrow may request.
pub const DEFAULT_MAX_BORROW_DURATION: u64 = 365 * SECONDS_PER_DAY;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Reasons a [`ProtocolConfig`] is rejected by [`ProtocolConfig::validate`].
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A basis-point value above 100%.
    #[error("{field} is {value} bps, must not exceed {max}")]
    BasisPointsOutOfRange {
        /// Offending field.
        field: &'static str,
        /// The configured value.
        value: u64,
        /// Largest accepted value.
        max: u64,
    },

    /// The loan-to-value ceiling must allow some borrowing.
    #[error("max_ltv_bps must be positive")]
    ZeroLtv,

    /// A schedule table is empty or not strictly increasing.
    #[error("{0} must be non-empty and strictly increasing")]
    MalformedSchedule(&'static str),

    /// No utilization tier covers the maximum loan-to-value.
    #[error("utilization tiers stop at {covered} bps, below max_ltv_bps {max_ltv}")]
    ScheduleBelowLtv {
        /// Ceiling of the last tier.
        covered: u64,
        /// Configured LTV ceiling.
        max_ltv: u64,
    },

    /// No duration bracket covers the maximum borrow duration.
    #[error("duration premiums stop at {covered}s, below max_borrow_duration {max}s")]
    ScheduleBelowDuration {
        /// Ceiling of the last bracket.
        covered: u64,
        /// Configured maximum duration.
        max: u64,
    },

    /// Vault and leverage custody must be distinct accounts.
    #[error("vault and leverage custody addresses must differ (both {0})")]
    SharedCustody(Address),
}

// ---------------------------------------------------------------------------
// Rate Schedule
// ---------------------------------------------------------------------------

/// One step of the utilization curve.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtilizationTier {
    /// Inclusive upper bound of loan / collateral value, in bps.
    pub max_utilization_bps: u64,
    /// Annual rate charged within this tier, in bps.
    pub apy_bps: u32,
}

/// Extra rate charged for longer loan terms.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationPremium {
    /// Inclusive upper bound of the requested duration, in seconds.
    pub max_duration: u64,
    /// Added on top of the utilization tier, in bps.
    pub premium_bps: u32,
}

/// Borrow rate as a step function of utilization and term.
///
/// `apy = tier(utilization).apy_bps + premium(duration).premium_bps`
///
/// A step schedule instead of a continuous slope keeps the quoted rate
/// stable under rounding noise in the collateral valuation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateSchedule {
    /// Sorted by `max_utilization_bps`, ascending.
    pub utilization_tiers: Vec<UtilizationTier>,
    /// Sorted by `max_duration`, ascending.
    pub duration_premiums: Vec<DurationPremium>,
}

impl RateSchedule {
    /// Rate for a loan at `utilization_bps` over `duration` seconds.
    ///
    /// Returns `None` when either input lies beyond the last step.
    pub fn rate_for(&self, utilization_bps: u64, duration: u64) -> Option<u32> {
        let tier = self
            .utilization_tiers
            .iter()
            .find(|t| utilization_bps <= t.max_utilization_bps)?;
        let premium = self
            .duration_premiums
            .iter()
            .find(|p| duration <= p.max_duration)?;
        tier.apy_bps.checked_add(premium.premium_bps)
    }
}

impl Default for RateSchedule {
    fn default() -> Self {
        Self {
            utilization_tiers: vec![
                UtilizationTier { max_utilization_bps: 3_000, apy_bps: 800 },
                UtilizationTier { max_utilization_bps: 6_000, apy_bps: 1_200 },
                UtilizationTier { max_utilization_bps: 8_000, apy_bps: 1_600 },
            ],
            duration_premiums: vec![
                DurationPremium { max_duration: 30 * SECONDS_PER_DAY, premium_bps: 0 },
                DurationPremium { max_duration: 90 * SECONDS_PER_DAY, premium_bps: 200 },
                DurationPremium { max_duration: 180 * SECONDS_PER_DAY, premium_bps: 400 },
                DurationPremium { max_duration: 365 * SECONDS_PER_DAY, premium_bps: 600 },
            ],
        }
    }
}

// ---------------------------------------------------------------------------
// Liquidation Policy
// ---------------------------------------------------------------------------

/// How much the leverage engine trusts a liquidity manager's resolution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiquidationPolicy {
    /// Apply the supplied target state after structural checks only. Risk
    /// is computed off-core by the liquidity manager.
    #[default]
    Trusted,
    /// Additionally require `collateral_value < payment_due` on-core.
    RequireShortfall,
}

// ---------------------------------------------------------------------------
// Configs
// ---------------------------------------------------------------------------

/// Vault knobs that are fixed for the life of a deployment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Custody account for the underlying reserve.
    pub address: Address,
    /// Share token name.
    pub share_name: String,
    /// Share token symbol.
    pub share_symbol: String,
    /// Share token decimals (display only).
    pub share_decimals: u8,
    /// Portion of every deposit forwarded to the treasury for off-ledger
    /// deployment and booked as assets under management, in bps.
    pub deployment_ratio_bps: u64,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            address: Address::new(DEFAULT_VAULT_ADDRESS),
            share_name: DEFAULT_SHARE_NAME.to_string(),
            share_symbol: DEFAULT_SHARE_SYMBOL.to_string(),
            share_decimals: DEFAULT_SHARE_DECIMALS,
            deployment_ratio_bps: 0,
        }
    }
}

/// Leverage engine knobs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeverageConfig {
    /// Custody account for staked shares. Must hold the grant-manager role
    /// on the vault before anyone can borrow.
    pub address: Address,
    /// Lending pool served by this engine.
    pub pool_id: u32,
    /// Loan-to-value ceiling, in bps.
    pub max_ltv_bps: u64,
    /// Longest accepted stake lock, in seconds.
    pub max_lock_duration: u64,
    /// Longest accepted loan term, in seconds.
    pub max_borrow_duration: u64,
    /// Borrow pricing.
    pub rate_schedule: RateSchedule,
    /// Checks applied to liquidation resolutions.
    pub liquidation_policy: LiquidationPolicy,
}

impl Default for LeverageConfig {
    fn default() -> Self {
        Self {
            address: Address::new(DEFAULT_LEVERAGE_ADDRESS),
            pool_id: DEFAULT_POOL_ID,
            max_ltv_bps: DEFAULT_MAX_LTV_BPS,
            max_lock_duration: DEFAULT_MAX_LOCK_DURATION,
            max_borrow_duration: DEFAULT_MAX_BORROW_DURATION,
            rate_schedule: RateSchedule::default(),
            liquidation_policy: LiquidationPolicy::default(),
        }
    }
}

/// Everything an operator configures before initialization.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Vault engine settings.
    pub vault: VaultConfig,
    /// Leverage engine settings.
    pub leverage: LeverageConfig,
}

impl ProtocolConfig {
    /// Parses a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(json).context("malformed protocol config")?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_json_str(&raw)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Checks cross-field consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vault.deployment_ratio_bps > RATE_DENOMINATOR {
            return Err(ConfigError::BasisPointsOutOfRange {
                field: "deployment_ratio_bps",
                value: self.vault.deployment_ratio_bps,
                max: RATE_DENOMINATOR,
            });
        }

        let lev = &self.leverage;
        if lev.max_ltv_bps == 0 {
            return Err(ConfigError::ZeroLtv);
        }
        if lev.max_ltv_bps > RATE_DENOMINATOR {
            return Err(ConfigError::BasisPointsOutOfRange {
                field: "max_ltv_bps",
                value: lev.max_ltv_bps,
                max: RATE_DENOMINATOR,
            });
        }

        let tiers = &lev.rate_schedule.utilization_tiers;
        if tiers.is_empty()
            || tiers
                .windows(2)
                .any(|w| w[0].max_utilization_bps >= w[1].max_utilization_bps)
        {
            return Err(ConfigError::MalformedSchedule("utilization_tiers"));
        }
        let premiums = &lev.rate_schedule.duration_premiums;
        if premiums.is_empty()
            || premiums
                .windows(2)
                .any(|w| w[0].max_duration >= w[1].max_duration)
        {
            return Err(ConfigError::MalformedSchedule("duration_premiums"));
        }

        let covered = tiers.last().map(|t| t.max_utilization_bps).unwrap_or(0);
        if covered < lev.max_ltv_bps {
            return Err(ConfigError::ScheduleBelowLtv {
                covered,
                max_ltv: lev.max_ltv_bps,
            });
        }
        let covered = premiums.last().map(|p| p.max_duration).unwrap_or(0);
        if covered < lev.max_borrow_duration {
            return Err(ConfigError::ScheduleBelowDuration {
                covered,
                max: lev.max_borrow_duration,
            });
        }

        if self.vault.address == lev.address {
            return Err(ConfigError::SharedCustody(lev.address.clone()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        ProtocolConfig::default().validate().unwrap();
    }

    #[test]
    fn time_constants_sanity() {
        assert_eq!(SECONDS_PER_YEAR, 31_536_000);
        assert_eq!(30 * SECONDS_PER_DAY, 2_592_000);
    }

    #[test]
    fn default_schedule_matches_reference_loan() {
        // 1100 against 1999 of collateral for 30 days.
        let schedule = RateSchedule::default();
        assert_eq!(schedule.rate_for(5_502, 2_592_000), Some(1_200));
    }

    #[test]
    fn schedule_adds_duration_premium() {
        let schedule = RateSchedule::default();
        assert_eq!(schedule.rate_for(1_000, 30 * SECONDS_PER_DAY), Some(800));
        assert_eq!(schedule.rate_for(1_000, 30 * SECONDS_PER_DAY + 1), Some(1_000));
        assert_eq!(schedule.rate_for(7_999, 365 * SECONDS_PER_DAY), Some(2_200));
    }

    #[test]
    fn schedule_rejects_out_of_range_inputs() {
        let schedule = RateSchedule::default();
        assert_eq!(schedule.rate_for(8_001, SECONDS_PER_DAY), None);
        assert_eq!(schedule.rate_for(1_000, 366 * SECONDS_PER_DAY), None);
    }

    #[test]
    fn partial_json_takes_defaults() {
        let config = ProtocolConfig::from_json_str(
            r#"{ "vault": { "deployment_ratio_bps": 7500 }, "leverage": { "max_ltv_bps": 7000 } }"#,
        )
        .unwrap();
        assert_eq!(config.vault.deployment_ratio_bps, 7_500);
        assert_eq!(config.vault.share_symbol, DEFAULT_SHARE_SYMBOL);
        assert_eq!(config.leverage.max_ltv_bps, 7_000);
        assert_eq!(config.leverage.pool_id, DEFAULT_POOL_ID);
    }

    #[test]
    fn validate_rejects_bad_ratios() {
        let mut config = ProtocolConfig::default();
        config.vault.deployment_ratio_bps = 10_001;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::BasisPointsOutOfRange { field: "deployment_ratio_bps", .. })
        ));

        let mut config = ProtocolConfig::default();
        config.leverage.max_ltv_bps = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroLtv));

        let mut config = ProtocolConfig::default();
        config.leverage.max_ltv_bps = 9_000;
        assert!(matches!(config.validate(), Err(ConfigError::ScheduleBelowLtv { .. })));
    }

    #[test]
    fn validate_rejects_unsorted_schedule() {
        let mut config = ProtocolConfig::default();
        config.leverage.rate_schedule.utilization_tiers.reverse();
        assert_eq!(
            config.validate(),
            Err(ConfigError::MalformedSchedule("utilization_tiers"))
        );
    }

    #[test]
    fn validate_rejects_shared_custody() {
        let mut config = ProtocolConfig::default();
        config.leverage.address = config.vault.address.clone();
        assert!(matches!(config.validate(), Err(ConfigError::SharedCustody(_))));
    }

    #[test]
    fn config_file_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("protocol.json");
        let mut config = ProtocolConfig::default();
        config.leverage.liquidation_policy = LiquidationPolicy::RequireShortfall;
        std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = ProtocolConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn missing_config_file_names_the_path() {
        let err = ProtocolConfig::from_file("/definitely/not/here.json").unwrap_err();
        assert!(format!("{err:#}").contains("/definitely/not/here.json"));
    }
}
