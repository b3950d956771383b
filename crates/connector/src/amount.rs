use std::{fmt, str::FromStr};

use crate::ConnectorError;

/// Signed currency amount represented as **integer minor units** (cents).
///
/// The backend stores every amount this way; decimal values coming from the
/// host are converted with [`Amount::from_decimal`] or parsed from strings.
///
/// # Examples
///
/// ```rust
/// use connector::Amount;
///
/// let amount = Amount::new(123_45);
/// assert_eq!(amount.minor_units(), 12345);
/// assert_eq!(amount.to_string(), "123.45");
/// ```
///
/// Parsing accepts `.` or `,` as decimal separator and rounds anything past
/// the second decimal half away from zero:
///
/// ```rust
/// use connector::Amount;
///
/// assert_eq!("10,5".parse::<Amount>().unwrap().minor_units(), 1050);
/// assert_eq!("1.005".parse::<Amount>().unwrap().minor_units(), 101);
/// assert_eq!("-0.125".parse::<Amount>().unwrap().minor_units(), -13);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    /// Creates a new amount from integer minor units.
    #[must_use]
    pub const fn new(minor_units: i64) -> Self {
        Self(minor_units)
    }

    /// Returns the raw value in minor units.
    #[must_use]
    pub const fn minor_units(self) -> i64 {
        self.0
    }

    /// Converts a display decimal into minor units.
    ///
    /// The conversion works on the shortest decimal representation of
    /// `value`, so `123.45` becomes exactly `12345` even though the binary
    /// product `123.45 * 100.0` is not an integer.
    pub fn from_decimal(value: f64) -> Result<Self, ConnectorError> {
        if !value.is_finite() {
            return Err(ConnectorError::InvalidAmount(format!(
                "{value} is not a finite number"
            )));
        }
        value.to_string().parse()
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let units = abs / 100;
        let cents = abs % 100;
        write!(f, "{sign}{units}.{cents:02}")
    }
}

impl From<i64> for Amount {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Amount> for i64 {
    fn from(value: Amount) -> Self {
        value.0
    }
}

impl FromStr for Amount {
    type Err = ConnectorError;

    /// Parses a decimal string into minor units.
    ///
    /// Accepts `.` or `,` as decimal separator and an optional leading `+`/`-`.
    /// Digits past the second decimal are rounded half away from zero.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let empty = || ConnectorError::InvalidAmount("empty amount".to_string());
        let invalid = || ConnectorError::InvalidAmount(format!("\"{}\" is not a number", s.trim()));
        let overflow = || ConnectorError::InvalidAmount("amount too large".to_string());

        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(empty());
        }

        let (negative, rest) = if let Some(stripped) = trimmed.strip_prefix('-') {
            (true, stripped)
        } else if let Some(stripped) = trimmed.strip_prefix('+') {
            (false, stripped)
        } else {
            (false, trimmed)
        };

        let rest = rest.trim();
        if rest.is_empty() {
            return Err(empty());
        }

        let rest = rest.replace(',', ".");
        let mut parts = rest.split('.');
        let units_str = parts.next().ok_or_else(invalid)?;
        let frac_str = parts.next().unwrap_or("");

        if parts.next().is_some() {
            return Err(invalid());
        }

        if units_str.is_empty() && frac_str.is_empty() {
            return Err(invalid());
        }
        if !units_str.chars().all(|c| c.is_ascii_digit())
            || !frac_str.chars().all(|c| c.is_ascii_digit())
        {
            return Err(invalid());
        }

        let units: i64 = if units_str.is_empty() {
            0
        } else {
            units_str.parse().map_err(|_| overflow())?
        };

        let digit = |idx: usize| -> i64 {
            frac_str
                .as_bytes()
                .get(idx)
                .map_or(0, |b| i64::from(b - b'0'))
        };
        let mut cents = digit(0) * 10 + digit(1);
        // Half away from zero: the magnitude is rounded, the sign applied after.
        if digit(2) >= 5 {
            cents += 1;
        }

        let total = units
            .checked_mul(100)
            .and_then(|v| v.checked_add(cents))
            .ok_or_else(overflow)?;

        let signed = if negative {
            total.checked_neg().ok_or_else(overflow)?
        } else {
            total
        };

        Ok(Amount(signed))
    }
}

/// Converts a display decimal (`123.45`) into integer minor units (`12345`).
pub fn amount_to_integer(amount: f64) -> Result<i64, ConnectorError> {
    Amount::from_decimal(amount).map(Amount::minor_units)
}

/// Formats integer minor units (`12345`) as a 2-decimal string (`"123.45"`).
pub fn integer_to_amount(minor_units: i64) -> String {
    Amount::new(minor_units).to_string()
}
