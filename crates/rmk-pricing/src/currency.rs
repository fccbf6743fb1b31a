use serde::{Deserialize, Serialize};

use crate::PricingError;

/// Currencies partners may post conversion rates in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Inr,
    Usd,
    Eur,
    Gbp,
}

pub const DEFAULT_CURRENCY: Currency = Currency::Inr;

pub const SUPPORTED_CURRENCIES: [Currency; 4] =
    [Currency::Inr, Currency::Usd, Currency::Eur, Currency::Gbp];

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Inr => "INR",
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
        }
    }

    /// Case-insensitive; surrounding whitespace ignored.
    pub fn parse(code: &str) -> Result<Self, PricingError> {
        match code.trim().to_ascii_uppercase().as_str() {
            "INR" => Ok(Currency::Inr),
            "USD" => Ok(Currency::Usd),
            "EUR" => Ok(Currency::Eur),
            "GBP" => Ok(Currency::Gbp),
            _ => Err(PricingError::UnsupportedCurrency {
                code: code.to_string(),
            }),
        }
    }

    /// Decimal places of the minor unit.
    pub fn minor_units(&self) -> u32 {
        2
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
