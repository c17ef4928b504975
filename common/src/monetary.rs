//! Monetary amounts for the wallet ledger.
//!
//! Balances and transaction amounts are `Decimal` values with two
//! fractional digits. Amount validation lives here so every entry point
//! rejects the same inputs with the same messages.

use rust_decimal::Decimal;

use crate::{LedgerError, Result};

/// Number of fractional digits carried by balances and amounts.
pub const AMOUNT_SCALE: u32 = 2;

/// Total significant digits a balance or amount may carry.
pub const AMOUNT_DIGITS: u32 = 12;

/// Largest amount or balance the ledger can hold: `9_999_999_999.99`.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(3_567_587_327, 232, 0, false, AMOUNT_SCALE);

/// Validate a movement amount.
///
/// `subject` names the movement in the error message, e.g. `"Deposit"`
/// yields `"Deposit amount must be greater than 0"`.
pub fn validate_amount(amount: Decimal, subject: &'static str) -> Result<Decimal> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount { subject });
    }

    if amount.normalize().scale() > AMOUNT_SCALE {
        return Err(LedgerError::TooManyDecimalPlaces { max: AMOUNT_SCALE });
    }

    if amount > MAX_AMOUNT {
        return Err(LedgerError::TooManyDigits { max: AMOUNT_DIGITS });
    }

    Ok(to_scale(amount))
}

/// Rescale a value to exactly [`AMOUNT_SCALE`] fractional digits.
pub fn to_scale(value: Decimal) -> Decimal {
    let mut scaled = value.round_dp(AMOUNT_SCALE);
    scaled.rescale(AMOUNT_SCALE);
    scaled
}
