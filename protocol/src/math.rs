//! # Ledger Primitive
//!
//! Unsigned fixed-point helpers used by every conversion in the vault and the
//! leverage engine. All amounts are `u64` in the smallest unit of their
//! denomination. Products are formed in `u128`, so `a * b` never overflows
//! before the division; only a final result that does not fit back into
//! `u64` is an error.
//!
//! Nothing in here wraps or clamps silently. A failure is a [`MathError`],
//! and the caller aborts the whole operation. Floating point is not
//! welcome in this file, or anywhere near money.

use thiserror::Error;

use crate::config::{RATE_DENOMINATOR, SECONDS_PER_YEAR};
use crate::error::ErrorKind;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Arithmetic failures. Unreachable for in-range inputs, loud otherwise.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum MathError {
    /// Denominator was zero.
    #[error("division by zero")]
    DivisionByZero,

    /// Result does not fit in the target integer.
    #[error("arithmetic overflow")]
    Overflow,

    /// Result would be negative.
    #[error("arithmetic underflow")]
    Underflow,
}

impl MathError {
    /// Always [`ErrorKind::Arithmetic`].
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Arithmetic
    }
}

// ---------------------------------------------------------------------------
// Rounding
// ---------------------------------------------------------------------------

/// Direction in which a quotient is rounded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rounding {
    /// Toward zero.
    Floor,
    /// Away from zero when there is a remainder.
    Ceil,
}

// ---------------------------------------------------------------------------
// mul-div
// ---------------------------------------------------------------------------

/// Computes `a * b / c` with the requested rounding.
///
/// # Errors
///
/// [`MathError::DivisionByZero`] if `c == 0`, [`MathError::Overflow`] if the
/// quotient exceeds `u64::MAX`.
pub fn mul_div(a: u64, b: u64, c: u64, rounding: Rounding) -> Result<u64, MathError> {
    if c == 0 {
        return Err(MathError::DivisionByZero);
    }

    // u64 * u64 always fits in u128.
    let product = (a as u128) * (b as u128);
    let denom = c as u128;

    let mut quotient = product / denom;
    if rounding == Rounding::Ceil && product % denom != 0 {
        quotient += 1;
    }

    u64::try_from(quotient).map_err(|_| MathError::Overflow)
}

/// `floor(a * b / c)`.
pub fn mul_div_floor(a: u64, b: u64, c: u64) -> Result<u64, MathError> {
    mul_div(a, b, c, Rounding::Floor)
}

/// `ceil(a * b / c)`.
pub fn mul_div_ceil(a: u64, b: u64, c: u64) -> Result<u64, MathError> {
    mul_div(a, b, c, Rounding::Ceil)
}

// ---------------------------------------------------------------------------
// add / sub
// ---------------------------------------------------------------------------

/// `a + b`, failing on overflow.
pub fn checked_add(a: u64, b: u64) -> Result<u64, MathError> {
    a.checked_add(b).ok_or(MathError::Overflow)
}

/// `a - b`, failing on underflow.
pub fn checked_sub(a: u64, b: u64) -> Result<u64, MathError> {
    a.checked_sub(b).ok_or(MathError::Underflow)
}

/// `a + b`, pinned at `u64::MAX`. Only for display-style limits such as
/// "how much more can be deposited", never for balances.
pub fn saturating_add(a: u64, b: u64) -> u64 {
    a.saturating_add(b)
}

/// `a - b`, pinned at zero. Same restriction as [`saturating_add`].
pub fn saturating_sub(a: u64, b: u64) -> u64 {
    a.saturating_sub(b)
}

/// Applies a signed delta to an unsigned base: `base + delta`.
///
/// Used for `total_assets = reserve + assets_under_management`. A negative
/// result is rejected, not clamped to zero.
pub fn apply_delta(base: u64, delta: i64) -> Result<u64, MathError> {
    let sum = base as i128 + delta as i128;
    if sum < 0 {
        return Err(MathError::Underflow);
    }
    u64::try_from(sum).map_err(|_| MathError::Overflow)
}

// ---------------------------------------------------------------------------
// Rates
// ---------------------------------------------------------------------------

/// `floor(part * 10_000 / whole)`: how much of `whole` `part` represents,
/// in basis points. Values above 10_000 are returned as-is.
pub fn ratio_bps(part: u64, whole: u64) -> Result<u64, MathError> {
    mul_div_floor(part, RATE_DENOMINATOR, whole)
}

/// Simple (non-compounding) interest on `principal` at `rate_bps` per year
/// over `elapsed_secs`:
///
/// ```text
/// floor(principal * rate_bps * elapsed / (RATE_DENOMINATOR * SECONDS_PER_YEAR))
/// ```
pub fn simple_interest(principal: u64, rate_bps: u32, elapsed_secs: u64) -> Result<u64, MathError> {
    if principal == 0 || rate_bps == 0 || elapsed_secs == 0 {
        return Ok(0);
    }

    let numerator = (principal as u128)
        .checked_mul(rate_bps as u128)
        .and_then(|n| n.checked_mul(elapsed_secs as u128))
        .ok_or(MathError::Overflow)?;
    let denominator = (RATE_DENOMINATOR as u128) * (SECONDS_PER_YEAR as u128);

    u64::try_from(numerator / denominator).map_err(|_| MathError::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mul_div_floor_and_ceil() {
        assert_eq!(mul_div_floor(100, 3, 2).unwrap(), 150);
        assert_eq!(mul_div_floor(100, 1, 3).unwrap(), 33);
        assert_eq!(mul_div_ceil(100, 3, 2).unwrap(), 150);
        assert_eq!(mul_div_ceil(100, 1, 3).unwrap(), 34);
    }

    #[test]
    fn mul_div_rejects_zero_denominator() {
        assert_eq!(mul_div_floor(1, 1, 0), Err(MathError::DivisionByZero));
        assert_eq!(mul_div_ceil(0, 0, 0), Err(MathError::DivisionByZero));
    }

    #[test]
    fn mul_div_survives_wide_intermediate() {
        // u64::MAX * u64::MAX overflows u64 by a mile, but the quotient fits.
        assert_eq!(mul_div_floor(u64::MAX, u64::MAX, u64::MAX).unwrap(), u64::MAX);
    }

    #[test]
    fn mul_div_reports_oversized_quotient() {
        assert_eq!(mul_div_floor(u64::MAX, 2, 1), Err(MathError::Overflow));
    }

    #[test]
    fn virtual_offset_examples() {
        // 1000 shares over 1500 assets with the +1 offset on both sides.
        assert_eq!(mul_div_floor(1000, 1501, 1001).unwrap(), 1499);
        // After a 100 grant out of a 1000/1000 vault.
        assert_eq!(mul_div_floor(1000, 901, 1001).unwrap(), 900);
    }

    #[test]
    fn checked_add_sub() {
        assert_eq!(checked_add(2, 3).unwrap(), 5);
        assert_eq!(checked_add(u64::MAX, 1), Err(MathError::Overflow));
        assert_eq!(checked_sub(3, 2).unwrap(), 1);
        assert_eq!(checked_sub(2, 3), Err(MathError::Underflow));
        assert_eq!(saturating_sub(2, 3), 0);
        assert_eq!(saturating_add(u64::MAX, 3), u64::MAX);
    }

    #[test]
    fn apply_delta_rejects_negative_totals() {
        assert_eq!(apply_delta(1000, 500).unwrap(), 1500);
        assert_eq!(apply_delta(1000, -1000).unwrap(), 0);
        assert_eq!(apply_delta(1000, -1001), Err(MathError::Underflow));
        assert_eq!(apply_delta(u64::MAX, 1), Err(MathError::Overflow));
    }

    #[test]
    fn ratio_in_basis_points() {
        assert_eq!(ratio_bps(1100, 1999).unwrap(), 5502);
        assert_eq!(ratio_bps(0, 1999).unwrap(), 0);
        assert_eq!(ratio_bps(1, 0), Err(MathError::DivisionByZero));
    }

    #[test]
    fn simple_interest_full_year() {
        // 10% on 1_000_000 for exactly one year.
        assert_eq!(simple_interest(1_000_000, 1000, SECONDS_PER_YEAR).unwrap(), 100_000);
    }

    #[test]
    fn simple_interest_rounds_down_and_short_circuits() {
        // 12% on 100 for 30 days = 0.986..., floors to 0.
        assert_eq!(simple_interest(100, 1200, 30 * 86_400).unwrap(), 0);
        assert_eq!(simple_interest(0, 1200, SECONDS_PER_YEAR).unwrap(), 0);
        assert_eq!(simple_interest(100, 0, SECONDS_PER_YEAR).unwrap(), 0);
        assert_eq!(simple_interest(100, 1200, 0).unwrap(), 0);
    }
}
