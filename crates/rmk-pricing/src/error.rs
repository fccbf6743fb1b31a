/// Errors produced by pricing arithmetic and rule validation.
///
/// "No applicable rule" is not an error; resolvers return `None` instead.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PricingError {
    /// Margin outside [0, 100] %. Carries basis points.
    MarginOutOfRange { bps: i64 },
    /// Conversion rate must be > 0. Carries micro-units.
    NonPositiveRate { micros: i64 },
    /// Amounts are never negative.
    NegativeAmount { amount: i64 },
    /// Result does not fit in `i64`.
    Overflow,
    /// A decimal literal could not be represented exactly.
    InvalidDecimal { input: String },
    UnsupportedCurrency { code: String },
    /// An active margin rule already covers this exact scope.
    ScopeConflict { existing_rule_id: i64 },
    /// `valid_to` precedes `valid_from`.
    InvalidWindow,
}

impl std::fmt::Display for PricingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MarginOutOfRange { bps } => {
                write!(f, "margin must be between 0 and 100 percent (got {bps} bps)")
            }
            Self::NonPositiveRate { micros } => {
                write!(f, "conversion rate must be > 0 (got {micros} micros)")
            }
            Self::NegativeAmount { amount } => write!(f, "amount must be >= 0 (got {amount})"),
            Self::Overflow => write!(f, "pricing arithmetic overflowed"),
            Self::InvalidDecimal { input } => write!(f, "invalid decimal '{input}'"),
            Self::UnsupportedCurrency { code } => write!(f, "unsupported currency '{code}'"),
            Self::ScopeConflict { existing_rule_id } => write!(
                f,
                "an active margin rule ({existing_rule_id}) already exists for this scope"
            ),
            Self::InvalidWindow => write!(f, "valid_to must not precede valid_from"),
        }
    }
}

impl std::error::Error for PricingError {}
