use chrono::{TimeZone, Utc};
use rmk_pricing::*;

const BRAND_X: i64 = 1;
const BRAND_W: i64 = 2;
const CAT_Y: i64 = 10;
const CAT_Z: i64 = 11;

#[test]
fn most_specific_active_rule_wins() {
    let from = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let now = Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap();
    let w = ValidityWindow::open_from(from);

    let mut book = RuleBook::new();
    book.add_margin_rule(MarginRule::new(1, 42, Some(BRAND_X), Some(CAT_Y), "10", w).unwrap())
        .unwrap();
    book.add_margin_rule(MarginRule::new(2, 42, Some(BRAND_X), None, "5", w).unwrap())
        .unwrap();
    book.add_margin_rule(MarginRule::new(3, 42, None, None, "2", w).unwrap())
        .unwrap();

    let pct = |brand, cat| {
        book.resolve_margin(&MarginQuery::new(42, Some(brand), Some(cat), now))
            .margin
            .to_string()
    };
    assert_eq!(pct(BRAND_X, CAT_Y), "10.00");
    assert_eq!(pct(BRAND_X, CAT_Z), "5.00");
    assert_eq!(pct(BRAND_W, CAT_Z), "2.00");

    let other_merchant = book.resolve_margin(&MarginQuery::new(7, Some(BRAND_X), None, now));
    assert_eq!(other_merchant, MarginResolution::NONE);
}

#[test]
fn duplicate_active_scope_is_refused() {
    let w = ValidityWindow::open_from(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    let mut book = RuleBook::new();
    book.add_margin_rule(MarginRule::new(1, 42, None, None, "2", w).unwrap())
        .unwrap();
    let err = book
        .add_margin_rule(MarginRule::new(2, 42, None, None, "3", w).unwrap())
        .unwrap_err();
    assert_eq!(err, PricingError::ScopeConflict { existing_rule_id: 1 });
    assert_eq!(book.margin_rules.len(), 1);
}
