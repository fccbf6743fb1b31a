//! Exact fixed-point scalars used in pricing.
//!
//! Both types are constructed from integers or from decimal literals and
//! never from floats. Parsing is exact: a literal with more fractional digits
//! than the scale supports is rejected unless the extra digits are zeros.

use serde::{Deserialize, Serialize};

use crate::PricingError;

/// Basis points per percent (1 bp = 0.01 %).
pub const BPS_PER_PERCENT: i64 = 100;

/// 100 %.
pub const MAX_MARGIN_BPS: i64 = 100 * BPS_PER_PERCENT;

/// Micro-units per currency unit.
pub const RATE_SCALE: i64 = 1_000_000;

// ---------------------------------------------------------------------------
// Margin
// ---------------------------------------------------------------------------

/// Margin percentage in basis points, guaranteed in `[0, 10_000]`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Margin(i64);

impl Margin {
    pub const ZERO: Margin = Margin(0);

    pub fn from_bps(bps: i64) -> Result<Self, PricingError> {
        if !(0..=MAX_MARGIN_BPS).contains(&bps) {
            return Err(PricingError::MarginOutOfRange { bps });
        }
        Ok(Margin(bps))
    }

    /// Clamp into range instead of failing. Used for legacy rows.
    pub fn clamped(bps: i64) -> Self {
        Margin(bps.clamp(0, MAX_MARGIN_BPS))
    }

    /// Parse a percentage literal such as `"4.75"` (NUMERIC(5,2)).
    pub fn parse_percent(s: &str) -> Result<Self, PricingError> {
        let bps = parse_scaled(s, 2)?;
        Self::from_bps(bps)
    }

    #[inline]
    pub const fn bps(self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for Margin {
    type Error = PricingError;

    fn try_from(bps: i64) -> Result<Self, Self::Error> {
        Margin::from_bps(bps)
    }
}

impl From<Margin> for i64 {
    fn from(m: Margin) -> i64 {
        m.0
    }
}

impl std::fmt::Display for Margin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}", self.0 / BPS_PER_PERCENT, self.0 % BPS_PER_PERCENT)
    }
}

// ---------------------------------------------------------------------------
// ConversionRate
// ---------------------------------------------------------------------------

/// Currency units per point, in micro-units. Always > 0.
///
/// `0.25` means one point is worth 0.25 of the currency unit.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct ConversionRate(i64);

impl ConversionRate {
    pub fn from_micros(micros: i64) -> Result<Self, PricingError> {
        if micros <= 0 {
            return Err(PricingError::NonPositiveRate { micros });
        }
        Ok(ConversionRate(micros))
    }

    /// Parse a decimal literal such as `"0.25"` or `"1.2345"`.
    pub fn parse(s: &str) -> Result<Self, PricingError> {
        Self::from_micros(parse_scaled(s, 6)?)
    }

    #[inline]
    pub const fn micros(self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for ConversionRate {
    type Error = PricingError;

    fn try_from(micros: i64) -> Result<Self, Self::Error> {
        ConversionRate::from_micros(micros)
    }
}

impl From<ConversionRate> for i64 {
    fn from(r: ConversionRate) -> i64 {
        r.0
    }
}

impl std::fmt::Display for ConversionRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let frac = format!("{:06}", self.0 % RATE_SCALE);
        let frac = frac.trim_end_matches('0');
        if frac.is_empty() {
            write!(f, "{}.0", self.0 / RATE_SCALE)
        } else {
            write!(f, "{}.{}", self.0 / RATE_SCALE, frac)
        }
    }
}

// ---------------------------------------------------------------------------
// Decimal parsing
// ---------------------------------------------------------------------------

/// Parse an unsigned or `-`-signed decimal literal into an integer scaled by
/// `10^scale`.
fn parse_scaled(input: &str, scale: u32) -> Result<i64, PricingError> {
    let invalid = || PricingError::InvalidDecimal {
        input: input.to_string(),
    };

    let s = input.trim();
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));

    if int_part.is_empty() && frac_part.is_empty() {
        return Err(invalid());
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit())
        || !frac_part.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(invalid());
    }

    let scale = scale as usize;
    let (kept, dropped) = frac_part.split_at(frac_part.len().min(scale));
    if dropped.bytes().any(|b| b != b'0') {
        return Err(invalid());
    }

    let mut value: i64 = 0;
    for b in int_part.bytes().chain(kept.bytes()) {
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add(i64::from(b - b'0')))
            .ok_or(PricingError::Overflow)?;
    }
    for _ in kept.len()..scale {
        value = value.checked_mul(10).ok_or(PricingError::Overflow)?;
    }

    Ok(if negative { -value } else { value })
}
