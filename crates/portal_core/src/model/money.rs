//! Fixed-point money with two fractional digits.

use serde::{Serialize, Serializer};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Monetary amount stored as integer cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money(i64);

/// Failure to read a decimal amount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoneyParseError(pub String);

impl Display for MoneyParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "`{}` is not a decimal amount", self.0)
    }
}

impl Error for MoneyParseError {}

impl Money {
    pub const ZERO: Money = Money(0);

    pub fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub fn cents(self) -> i64 {
        self.0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Parses a plain decimal literal (`12`, `-3.5`, `1e3`, `0.125`).
    ///
    /// Digits past the second fractional place are rounded half away from
    /// zero, the same coercion a `NUMERIC(p, 2)` column applies.
    pub fn parse_decimal(text: &str) -> Result<Self, MoneyParseError> {
        let err = || MoneyParseError(text.to_string());
        let trimmed = text.trim();
        let (negative, unsigned) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };

        let (mantissa, exponent) = match unsigned.find(['e', 'E']) {
            Some(idx) => {
                let exp = unsigned[idx + 1..].parse::<i32>().map_err(|_| err())?;
                (&unsigned[..idx], exp)
            }
            None => (unsigned, 0),
        };

        let (int_part, frac_part) = match mantissa.split_once('.') {
            Some((int_part, frac_part)) => (int_part, frac_part),
            None => (mantissa, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(err());
        }
        if !int_part.chars().chain(frac_part.chars()).all(|c| c.is_ascii_digit()) {
            return Err(err());
        }

        // All digits as one integer, with the decimal point `scale` places from the right.
        let digits = format!("{int_part}{frac_part}");
        let scale = i32::try_from(frac_part.len())
            .ok()
            .and_then(|len| len.checked_sub(exponent))
            .ok_or_else(err)?;
        let digits = digits.trim_start_matches('0');
        let value = if digits.is_empty() {
            0
        } else {
            scale_to_cents(digits, scale).ok_or_else(err)?
        };

        Ok(Self(if negative { -value } else { value }))
    }
}

fn scale_to_cents(digits: &str, scale: i32) -> Option<i64> {
    let shift = 2_i32.checked_sub(scale)?;
    if shift >= 0 {
        let base: i64 = digits.parse().ok()?;
        base.checked_mul(10_i64.checked_pow(u32::try_from(shift).ok()?)?)
    } else {
        let drop = usize::try_from(shift.unsigned_abs()).ok()?;
        if drop > digits.len() {
            // First dropped digit is an implicit leading zero.
            return Some(0);
        }
        let (kept, dropped) = digits.split_at(digits.len() - drop);
        let base: i64 = if kept.is_empty() { 0 } else { kept.parse().ok()? };
        let round_up = dropped.as_bytes().first().is_some_and(|b| *b >= b'5');
        if round_up {
            base.checked_add(1)
        } else {
            Some(base)
        }
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
