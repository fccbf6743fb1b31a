//! rmk-pricing
//!
//! Margin resolution, points conversion and offer quoting.
//!
//! - Money: `i64` minor units (paise, cents).
//! - Margin: [`Margin`], integer basis points.
//! - Conversion rate: [`ConversionRate`], integer micro-units of currency per point.
//!
//! Pure functions over rule slices. No IO; stores load the rules and pass
//! them in. The only side effect is a `tracing` warning when several rate
//! rules overlap.

mod book;
mod currency;
mod error;
mod fixedpoint;
mod margin;
mod points;
mod quote;
mod window;

pub use book::RuleBook;
pub use currency::{Currency, DEFAULT_CURRENCY, SUPPORTED_CURRENCIES};
pub use error::PricingError;
pub use fixedpoint::{ConversionRate, Margin, BPS_PER_PERCENT, MAX_MARGIN_BPS, RATE_SCALE};
pub use margin::{
    check_scope_conflict, rank, resolve_margin, MarginQuery, MarginResolution, MarginRule,
};
pub use points::{
    points_to_minor, resolve_conversion_rate, settlement_price, supersede_active, to_points,
    to_points_in, PointConversionRule, RateResolution,
};
pub use quote::{quote_offer, reprice_offer, OfferQuote, PriceLogEntry, QuoteRequest, Reprice};
pub use window::ValidityWindow;
