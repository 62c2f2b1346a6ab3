//! # Fixed-Point Amounts
//!
//! Every quantity of money in Satchel is an [`Amount`]: an integer count of
//! grains, the smallest indivisible unit (10^-8 of a coin). `value` is
//! always an integer — no floating point anywhere near money.
//!
//! The only place decimals exist is the boundary: users type `"1.5"` in a
//! chat command, and the wallet daemon's `sendmany` wants coin-denominated
//! decimal strings on the wire. Both conversions are exact fixed-point
//! string arithmetic.
//!
//! Inputs with more fractional digits than a grain can represent are
//! rejected outright rather than silently truncated — nobody should lose
//! even 10^-9 of a coin to a parsing rule they never read.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{AMOUNT_DECIMALS, COIN_TICKER, GRAINS_PER_COIN, MAX_SUPPLY};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur while parsing or combining amounts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    /// The input is not a plain decimal number.
    #[error("malformed amount: {0:?}")]
    Malformed(String),

    /// The input carries more fractional digits than a grain resolves.
    #[error("amount {input:?} has more than {max_decimals} decimal places")]
    ExcessPrecision {
        /// The offending input, verbatim.
        input: String,
        /// Maximum supported fractional digits.
        max_decimals: u32,
    },

    /// The value does not fit in the grain representation.
    #[error("amount overflows the representable range: {0:?}")]
    Overflow(String),
}

// ---------------------------------------------------------------------------
// Amount
// ---------------------------------------------------------------------------

/// A quantity of coin expressed in grains.
///
/// Wraps a bare `u64` so that grain counts, timestamps, and ids can never
/// be mixed up at a call site. Arithmetic is exposed only in checked form.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    /// The zero amount.
    pub const ZERO: Amount = Amount(0);

    /// Wraps a raw grain count.
    pub const fn from_grains(grains: u64) -> Self {
        Amount(grains)
    }

    /// Converts a whole-coin count. Panics in debug builds on overflow;
    /// use only with compile-time constants.
    pub const fn from_coins(coins: u64) -> Self {
        Amount(coins * GRAINS_PER_COIN)
    }

    /// Returns the raw grain count.
    pub const fn grains(self) -> u64 {
        self.0
    }

    /// Returns `true` if the amount is zero.
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if the amount exceeds the supply ceiling.
    pub const fn exceeds_supply(self) -> bool {
        self.0 > MAX_SUPPLY
    }

    /// Checked addition. `None` on overflow.
    pub fn checked_add(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_add(rhs.0).map(Amount)
    }

    /// Checked subtraction. `None` if `rhs` exceeds `self`.
    pub fn checked_sub(self, rhs: Amount) -> Option<Amount> {
        self.0.checked_sub(rhs.0).map(Amount)
    }

    /// Parses a coin-denominated decimal string into grains, exactly.
    ///
    /// Accepted forms: `"5"`, `"5.25"`, `"0.00000001"`. Rejected: anything
    /// signed, empty, non-numeric, a bare `"."` or trailing dot, more than
    /// [`AMOUNT_DECIMALS`] fractional digits, or a value too large for the
    /// grain representation.
    pub fn parse_decimal(input: &str) -> Result<Amount, AmountError> {
        let malformed = || AmountError::Malformed(input.to_string());

        let (whole_str, frac_str) = match input.split_once('.') {
            Some((w, f)) => (w, f),
            None => (input, ""),
        };

        // "." and "5." are malformed; ".5" is allowed.
        if whole_str.is_empty() && frac_str.is_empty() {
            return Err(malformed());
        }
        if input.contains('.') && frac_str.is_empty() {
            return Err(malformed());
        }
        if !whole_str.chars().all(|c| c.is_ascii_digit()) {
            return Err(malformed());
        }
        if !frac_str.chars().all(|c| c.is_ascii_digit()) {
            return Err(malformed());
        }
        if frac_str.len() as u32 > AMOUNT_DECIMALS {
            return Err(AmountError::ExcessPrecision {
                input: input.to_string(),
                max_decimals: AMOUNT_DECIMALS,
            });
        }

        let whole: u64 = if whole_str.is_empty() {
            0
        } else {
            whole_str
                .parse()
                .map_err(|_| AmountError::Overflow(input.to_string()))?
        };

        // Right-pad the fraction to the full grain width: "5" -> 50000000.
        let frac: u64 = if frac_str.is_empty() {
            0
        } else {
            let padding = AMOUNT_DECIMALS as usize - frac_str.len();
            let parsed: u64 = frac_str.parse().expect("digits checked above");
            parsed * 10u64.pow(padding as u32)
        };

        whole
            .checked_mul(GRAINS_PER_COIN)
            .and_then(|w| w.checked_add(frac))
            .map(Amount)
            .ok_or_else(|| AmountError::Overflow(input.to_string()))
    }

    /// Renders the amount as a coin-denominated decimal string with the
    /// full grain precision, e.g. `150_000_000` grains -> `"1.50000000"`.
    ///
    /// This is the exact wire format `sendmany` expects for its amounts.
    pub fn to_decimal_string(self) -> String {
        let whole = self.0 / GRAINS_PER_COIN;
        let frac = self.0 % GRAINS_PER_COIN;
        format!("{whole}.{frac:0>width$}", width = AMOUNT_DECIMALS as usize)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.to_decimal_string(), COIN_TICKER)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Amount::parse_decimal(s)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
