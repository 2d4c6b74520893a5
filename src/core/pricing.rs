//! Amount and discount calculation
//!
//! Pure pricing logic: a base unit price, a quantity, and an optional
//! discount code become a final payable amount. No I/O, no clock reads —
//! the evaluation instant is a parameter, so results are deterministic and
//! unit-testable without a store or network.
//!
//! Invalid, unknown, and expired codes are silently ignored rather than
//! rejected. That is deliberate policy, not a bug: checkout completion is
//! favored over strict code validation, and the submission receipt tells
//! the form layer the code was ignored so it can say so.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::{Decimal, RoundingStrategy};

/// How a discount reduces the total — exactly one of the two
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DiscountKind {
    /// Percentage off the quantity-scaled total (0–100)
    PercentOff(Decimal),
    /// Absolute amount off the total, applied once
    AmountOff(Decimal),
}

/// A redeemable discount code
#[derive(Debug, Clone, PartialEq)]
pub struct Discount {
    pub code: String,
    pub kind: DiscountKind,
    /// Eligibility ends at this instant; `None` never expires
    pub expires_at: Option<DateTime<Utc>>,
}

impl Discount {
    /// A percent-off discount with no expiry
    pub fn percent_off(code: impl Into<String>, percent: Decimal) -> Self {
        Discount {
            code: code.into(),
            kind: DiscountKind::PercentOff(percent),
            expires_at: None,
        }
    }

    /// An amount-off discount with no expiry
    pub fn amount_off(code: impl Into<String>, amount: Decimal) -> Self {
        Discount {
            code: code.into(),
            kind: DiscountKind::AmountOff(amount),
            expires_at: None,
        }
    }

    /// Set the expiry instant
    pub fn expiring_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    /// Codes match case-insensitively
    pub fn matches(&self, code: &str) -> bool {
        self.code.eq_ignore_ascii_case(code)
    }

    /// Eligible at the evaluation instant
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(true, |expires| now < expires)
    }
}

/// Result of a pricing computation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quote {
    pub discount_amount: Decimal,
    /// `max(0, base_unit_price * quantity - discount_amount)`
    pub payable_amount: Decimal,
}

/// Compute the payable amount for a submission
///
/// The discount code, if given, is looked up case-insensitively among
/// `active_discounts`; only a present, unexpired discount applies. A
/// percent-off discount applies to `base_unit_price * quantity` and is
/// rounded to 2 decimal places (half-up). The discount never exceeds the
/// gross total and the payable amount is clamped to `>= 0`.
pub fn compute_payable(
    base_unit_price: Decimal,
    quantity: u32,
    discount_code: Option<&str>,
    active_discounts: &[Discount],
    now: DateTime<Utc>,
) -> Quote {
    let gross = base_unit_price * Decimal::from(quantity);

    let discount = discount_code
        .and_then(|code| {
            active_discounts
                .iter()
                .find(|discount| discount.matches(code) && discount.is_active(now))
        })
        .map(|discount| match discount.kind {
            DiscountKind::PercentOff(percent) => (gross * percent / Decimal::ONE_HUNDRED)
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
            DiscountKind::AmountOff(amount) => amount,
        })
        .unwrap_or(Decimal::ZERO)
        .clamp(Decimal::ZERO, gross.max(Decimal::ZERO));

    Quote {
        discount_amount: discount,
        payable_amount: (gross - discount).max(Decimal::ZERO),
    }
}

/// Concurrent catalog of currently registered discounts
///
/// Codes are keyed case-insensitively. The catalog only stores and lists;
/// eligibility is evaluated by [`compute_payable`] at quote time.
#[derive(Debug, Default)]
pub struct DiscountCatalog {
    discounts: DashMap<String, Discount>,
}

impl DiscountCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a discount, replacing any existing one with the same code
    pub fn add(&self, discount: Discount) {
        self.discounts
            .insert(discount.code.to_ascii_uppercase(), discount);
    }

    /// Remove a discount by code
    pub fn remove(&self, code: &str) {
        self.discounts.remove(&code.to_ascii_uppercase());
    }

    /// All discounts eligible at the given instant
    pub fn active(&self, now: DateTime<Utc>) -> Vec<Discount> {
        self.discounts
            .iter()
            .filter(|entry| entry.value().is_active(now))
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Quote a submission against the currently active discounts
    pub fn quote(
        &self,
        base_unit_price: Decimal,
        quantity: u32,
        discount_code: Option<&str>,
        now: DateTime<Utc>,
    ) -> Quote {
        compute_payable(
            base_unit_price,
            quantity,
            discount_code,
            &self.active(now),
            now,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rstest::rstest;

    fn discounts() -> Vec<Discount> {
        vec![
            Discount::percent_off("SAVE50PERCENT", Decimal::new(50, 0)),
            Discount::amount_off("TENOFF", Decimal::new(1000, 2)),
            Discount::percent_off("EXPIRED", Decimal::new(25, 0))
                .expiring_at(Utc::now() - Duration::days(1)),
        ]
    }

    #[rstest]
    #[case::half_off(Decimal::new(10000, 2), 2, Some("SAVE50PERCENT"), Decimal::new(10000, 2), Decimal::new(10000, 2))]
    #[case::case_insensitive(Decimal::new(10000, 2), 2, Some("save50percent"), Decimal::new(10000, 2), Decimal::new(10000, 2))]
    #[case::amount_off_applied_once(Decimal::new(2500, 2), 4, Some("TENOFF"), Decimal::new(1000, 2), Decimal::new(9000, 2))]
    #[case::expired_code_ignored(Decimal::new(10000, 2), 2, Some("EXPIRED"), Decimal::ZERO, Decimal::new(20000, 2))]
    #[case::unknown_code_ignored(Decimal::new(10000, 2), 2, Some("NOPE"), Decimal::ZERO, Decimal::new(20000, 2))]
    #[case::no_code(Decimal::new(10000, 2), 2, None, Decimal::ZERO, Decimal::new(20000, 2))]
    fn test_compute_payable(
        #[case] unit: Decimal,
        #[case] quantity: u32,
        #[case] code: Option<&str>,
        #[case] expected_discount: Decimal,
        #[case] expected_payable: Decimal,
    ) {
        let quote = compute_payable(unit, quantity, code, &discounts(), Utc::now());
        assert_eq!(quote.discount_amount, expected_discount);
        assert_eq!(quote.payable_amount, expected_payable);
    }

    #[test]
    fn test_amount_off_clamps_to_zero() {
        let generous = vec![Discount::amount_off("BIG", Decimal::new(100000, 2))];
        let quote = compute_payable(
            Decimal::new(500, 2),
            1,
            Some("BIG"),
            &generous,
            Utc::now(),
        );
        assert_eq!(quote.discount_amount, Decimal::new(500, 2));
        assert_eq!(quote.payable_amount, Decimal::ZERO);
    }

    #[test]
    fn test_full_percent_discount_is_free() {
        let free = vec![Discount::percent_off("COMP", Decimal::new(100, 0))];
        let quote = compute_payable(Decimal::new(7500, 2), 3, Some("COMP"), &free, Utc::now());
        assert_eq!(quote.payable_amount, Decimal::ZERO);
    }

    #[test]
    fn test_percent_discount_rounds_half_up() {
        // 10% of 33.33 * 1 = 3.333 -> 3.33; 15% of 33.35 = 5.0025 -> 5.00
        let ten = vec![Discount::percent_off("TEN", Decimal::new(10, 0))];
        let quote = compute_payable(Decimal::new(3333, 2), 1, Some("TEN"), &ten, Utc::now());
        assert_eq!(quote.discount_amount, Decimal::new(333, 2));
        assert_eq!(quote.payable_amount, Decimal::new(3000, 2));
    }

    #[test]
    fn test_determinism() {
        let now = Utc::now();
        let first = compute_payable(
            Decimal::new(10000, 2),
            2,
            Some("SAVE50PERCENT"),
            &discounts(),
            now,
        );
        let second = compute_payable(
            Decimal::new(10000, 2),
            2,
            Some("SAVE50PERCENT"),
            &discounts(),
            now,
        );
        assert_eq!(first, second);
    }

    #[test]
    fn test_catalog_quote_and_expiry() {
        let catalog = DiscountCatalog::new();
        catalog.add(Discount::percent_off("WELCOME", Decimal::new(20, 0)));
        catalog.add(
            Discount::amount_off("GONE", Decimal::new(500, 2))
                .expiring_at(Utc::now() - Duration::hours(1)),
        );

        let now = Utc::now();
        let with_code = catalog.quote(Decimal::new(5000, 2), 1, Some("welcome"), now);
        assert_eq!(with_code.discount_amount, Decimal::new(1000, 2));

        let expired = catalog.quote(Decimal::new(5000, 2), 1, Some("GONE"), now);
        assert_eq!(expired.discount_amount, Decimal::ZERO);

        catalog.remove("WELCOME");
        let removed = catalog.quote(Decimal::new(5000, 2), 1, Some("WELCOME"), now);
        assert_eq!(removed.discount_amount, Decimal::ZERO);
    }
}
