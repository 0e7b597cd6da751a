use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Neg, Sub};
use std::str::FromStr;
use thiserror::Error as ThisError;

/// Fractional digits carried by [`Amount`] (lamport granularity).
pub const AMOUNT_DECIMALS: u32 = 9;

/// Units in one whole coin.
pub const UNITS_PER_WHOLE: i64 = 1_000_000_000;

#[derive(Debug, ThisError, PartialEq, Eq)]
pub enum AmountError {
    #[error("empty amount")]
    Empty,
    #[error("invalid amount: {0}")]
    Invalid(String),
    #[error("too many decimal places (max {max}): {value}")]
    TooPrecise { value: String, max: u32 },
    #[error("amount out of range: {0}")]
    OutOfRange(String),
}

/// Signed fixed-point monetary amount with nine decimal places.
///
/// Signed because a bonus balance can be driven below zero by wagering before it converts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Self = Self(0);

    pub const fn from_units(units: i64) -> Self {
        Self(units)
    }

    pub const fn from_whole(whole: i64) -> Self {
        Self(whole * UNITS_PER_WHOLE)
    }

    pub const fn units(self) -> i64 {
        self.0
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// `self * numerator / denominator`, truncated toward zero.
    ///
    /// # Panics
    ///
    /// Panics if `denominator` is zero. Results outside the `i64` range saturate.
    pub fn mul_ratio(self, numerator: i64, denominator: i64) -> Self {
        let scaled = i128::from(self.0) * i128::from(numerator) / i128::from(denominator);
        Self(i64::try_from(scaled).unwrap_or(if scaled < 0 { i64::MIN } else { i64::MAX }))
    }

    /// `self * factor`.
    ///
    /// # Panics
    ///
    /// Panics on overflow.
    pub fn times(self, factor: i64) -> Self {
        Self(self.0 * factor)
    }

    /// Number of complete `step`s contained in `self` (floored).
    pub fn whole_multiples_of(self, step: Amount) -> i64 {
        if step.0 <= 0 {
            return 0;
        }
        self.0.div_euclid(step.0)
    }

    pub fn from_f64(value: f64) -> Result<Self, AmountError> {
        if !value.is_finite() {
            return Err(AmountError::Invalid(value.to_string()));
        }
        let scaled = (value * UNITS_PER_WHOLE as f64).round();
        if scaled < i64::MIN as f64 || scaled > i64::MAX as f64 {
            return Err(AmountError::OutOfRange(value.to_string()));
        }
        Ok(Self(scaled as i64))
    }

    /// `None` when the sum leaves the `i64` range.
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Self)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let magnitude = self.0.unsigned_abs();
        let whole = magnitude / UNITS_PER_WHOLE as u64;
        let frac = magnitude % UNITS_PER_WHOLE as u64;
        if frac == 0 {
            return write!(f, "{sign}{whole}");
        }
        let digits = format!("{frac:0width$}", width = AMOUNT_DECIMALS as usize);
        write!(f, "{sign}{whole}.{}", digits.trim_end_matches('0'))
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(AmountError::Empty);
        }
        let (negative, body) = match trimmed.as_bytes()[0] {
            b'-' => (true, &trimmed[1..]),
            b'+' => (false, &trimmed[1..]),
            _ => (false, trimmed),
        };
        let (whole, frac) = body.split_once('.').unwrap_or((body, ""));
        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if (whole.is_empty() && frac.is_empty()) || !all_digits(whole) || !all_digits(frac) {
            return Err(AmountError::Invalid(value.to_string()));
        }
        if frac.len() > AMOUNT_DECIMALS as usize {
            return Err(AmountError::TooPrecise {
                value: value.to_string(),
                max: AMOUNT_DECIMALS,
            });
        }

        let out_of_range = || AmountError::OutOfRange(value.to_string());
        let whole_units = if whole.is_empty() {
            0i128
        } else {
            whole.parse::<i128>().map_err(|_| out_of_range())?
        };
        let frac_units = if frac.is_empty() {
            0i128
        } else {
            let padded = format!("{frac:0<width$}", width = AMOUNT_DECIMALS as usize);
            padded.parse::<i128>().map_err(|_| out_of_range())?
        };
        let magnitude = whole_units
            .checked_mul(i128::from(UNITS_PER_WHOLE))
            .and_then(|units| units.checked_add(frac_units))
            .ok_or_else(out_of_range)?;
        let signed = if negative { -magnitude } else { magnitude };
        i64::try_from(signed).map(Self).map_err(|_| out_of_range())
    }
}

impl Add for Amount {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Amount {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl Neg for Amount {
    type Output = Self;

    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AmountVisitor;

        impl de::Visitor<'_> for AmountVisitor {
            type Value = Amount;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a decimal amount as a string or number")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Amount, E> {
                value.parse().map_err(E::custom)
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<Amount, E> {
                value
                    .checked_mul(UNITS_PER_WHOLE)
                    .map(Amount)
                    .ok_or_else(|| E::custom(AmountError::OutOfRange(value.to_string())))
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<Amount, E> {
                i64::try_from(value)
                    .ok()
                    .and_then(|value| value.checked_mul(UNITS_PER_WHOLE))
                    .map(Amount)
                    .ok_or_else(|| E::custom(AmountError::OutOfRange(value.to_string())))
            }

            fn visit_f64<E: de::Error>(self, value: f64) -> Result<Amount, E> {
                Amount::from_f64(value).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(AmountVisitor)
    }
}
