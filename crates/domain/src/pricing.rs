//! Read-time price computation.
//!
//! A product's unit price depends on the variant's size (a surcharge from a
//! threshold size upward) and on an optional time-boxed promotion. Both rules
//! are evaluated here and nowhere else, so the catalog display and the order
//! builder always agree.

use chrono::{DateTime, Utc};
use common::{Money, Product};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Ordinal size scale, smallest first.
pub const SIZE_SCALE: [&str; 9] = ["XXS", "XS", "S", "M", "L", "XL", "XXL", "3XL", "4XL"];

/// Decimal places of every computed price.
pub const PRICE_DECIMALS: u32 = 2;

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Breakdown of a unit price as shown to customers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub base_price: Money,
    /// Price after the size surcharge, before any promotion.
    pub size_adjusted: Money,
    pub final_price: Money,
    pub on_sale: bool,
    /// Set only while the promotion is active.
    pub promo_name: Option<String>,
}

/// Position of a size label on [`SIZE_SCALE`], ignoring case.
pub fn size_rank(label: &str) -> Option<usize> {
    let label = label.trim().to_ascii_uppercase();
    SIZE_SCALE.iter().position(|size| *size == label)
}

/// Returns true if `size` is at or past `threshold`.
///
/// Numeric labels compare as numbers when both sides parse; otherwise both
/// must be on the ordinal scale. Anything else never triggers.
pub fn size_reaches(size: &str, threshold: &str) -> bool {
    if let (Ok(size), Ok(threshold)) = (
        size.trim().parse::<Decimal>(),
        threshold.trim().parse::<Decimal>(),
    ) {
        return size >= threshold;
    }

    match (size_rank(size), size_rank(threshold)) {
        (Some(size), Some(threshold)) => size >= threshold,
        _ => false,
    }
}

fn surcharge_applies(product: &Product, size_label: &str) -> Option<Decimal> {
    let threshold = product.size_threshold.as_deref()?;
    let pct = product.size_surcharge_pct.filter(|pct| *pct > Decimal::ZERO)?;
    size_reaches(size_label, threshold).then_some(pct)
}

/// Returns the discount percentage if the promotion is running at `now`.
fn active_discount(product: &Product, now: DateTime<Utc>) -> Option<Decimal> {
    let discount = product.discount_pct.filter(|pct| *pct > Decimal::ZERO)?;
    let (start, end) = (product.promo_start?, product.promo_end?);
    (start <= now && now <= end).then(|| discount.min(HUNDRED))
}

/// Computes the full price breakdown for one variant size at `now`.
pub fn quote(product: &Product, size_label: &str, now: DateTime<Utc>) -> PriceQuote {
    let base = product.base_price;

    let size_adjusted = match surcharge_applies(product, size_label) {
        Some(pct) => base.scale(Decimal::ONE + pct / HUNDRED),
        None => base,
    };

    let discount = active_discount(product, now);
    let final_price = match discount {
        Some(pct) => size_adjusted.scale(Decimal::ONE - pct / HUNDRED),
        None => size_adjusted,
    };

    PriceQuote {
        base_price: base,
        size_adjusted: size_adjusted.round_dp(PRICE_DECIMALS),
        final_price: final_price.round_dp(PRICE_DECIMALS),
        on_sale: discount.is_some(),
        promo_name: discount.and(product.promo_name.clone()),
    }
}

/// Final unit price of one variant size at `now`.
pub fn price(product: &Product, size_label: &str, now: DateTime<Utc>) -> Money {
    quote(product, size_label, now).final_price
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use common::ProductId;

    fn product(base: i64) -> Product {
        Product {
            id: ProductId::new(1),
            name: "Oxford shirt".to_string(),
            base_price: Money::from_major(base),
            size_threshold: None,
            size_surcharge_pct: None,
            discount_pct: None,
            promo_start: None,
            promo_end: None,
            promo_name: None,
        }
    }

    fn with_size_rule(mut p: Product, threshold: &str, pct: i64) -> Product {
        p.size_threshold = Some(threshold.to_string());
        p.size_surcharge_pct = Some(Decimal::from(pct));
        p
    }

    fn with_promo(mut p: Product, pct: i64, start: DateTime<Utc>, end: DateTime<Utc>) -> Product {
        p.discount_pct = Some(Decimal::from(pct));
        p.promo_start = Some(start);
        p.promo_end = Some(end);
        p.promo_name = Some("Summer sale".to_string());
        p
    }

    #[test]
    fn surcharge_at_or_past_threshold() {
        let p = with_size_rule(product(100), "M", 10);
        let now = Utc::now();
        assert_eq!(price(&p, "XL", now), Money::from_major(110));
        assert_eq!(price(&p, "M", now), Money::from_major(110));
        assert_eq!(price(&p, "S", now), Money::from_major(100));
    }

    #[test]
    fn size_labels_are_case_insensitive() {
        let p = with_size_rule(product(100), "m", 10);
        assert_eq!(price(&p, "xl", Utc::now()), Money::from_major(110));
    }

    #[test]
    fn numeric_sizes_compare_as_numbers() {
        let p = with_size_rule(product(200), "40", 5);
        let now = Utc::now();
        assert_eq!(price(&p, "42", now), Money::from_major(210));
        assert_eq!(price(&p, "38", now), Money::from_major(200));
        assert_eq!(price(&p, "40.5", now), Money::from_major(210));
    }

    #[test]
    fn unknown_labels_disable_surcharge() {
        let now = Utc::now();
        let p = with_size_rule(product(100), "M", 10);
        assert_eq!(price(&p, "ONE-SIZE", now), Money::from_major(100));

        let p = with_size_rule(product(100), "REGULAR", 10);
        assert_eq!(price(&p, "XL", now), Money::from_major(100));

        // Mixed numeric and ordinal never triggers.
        let p = with_size_rule(product(100), "M", 10);
        assert_eq!(price(&p, "42", now), Money::from_major(100));
    }

    #[test]
    fn missing_rule_parts_disable_surcharge() {
        let now = Utc::now();
        let mut p = product(100);
        p.size_threshold = Some("M".to_string());
        assert_eq!(price(&p, "XL", now), Money::from_major(100));

        let mut p = product(100);
        p.size_surcharge_pct = Some(Decimal::from(10));
        assert_eq!(price(&p, "XL", now), Money::from_major(100));
    }

    #[test]
    fn promotion_inside_window() {
        let now = Utc::now();
        let p = with_promo(
            product(100),
            20,
            now - Duration::days(1),
            now + Duration::days(1),
        );
        let q = quote(&p, "M", now);
        assert_eq!(q.final_price, Money::from_major(80));
        assert!(q.on_sale);
        assert_eq!(q.promo_name.as_deref(), Some("Summer sale"));
    }

    #[test]
    fn promotion_bounds_are_inclusive() {
        let now = Utc::now();
        let p = with_promo(product(100), 20, now, now);
        assert_eq!(price(&p, "M", now), Money::from_major(80));
    }

    #[test]
    fn promotion_outside_window() {
        let now = Utc::now();
        let p = with_promo(
            product(100),
            20,
            now + Duration::days(1),
            now + Duration::days(2),
        );
        let q = quote(&p, "M", now);
        assert_eq!(q.final_price, Money::from_major(100));
        assert!(!q.on_sale);
        assert_eq!(q.promo_name, None);
    }

    #[test]
    fn promotion_needs_both_bounds() {
        let now = Utc::now();
        let mut p = with_promo(
            product(100),
            20,
            now - Duration::days(1),
            now + Duration::days(1),
        );
        p.promo_end = None;
        assert_eq!(price(&p, "M", now), Money::from_major(100));
    }

    #[test]
    fn surcharge_and_promotion_compose() {
        let now = Utc::now();
        let p = with_promo(
            with_size_rule(product(100), "M", 10),
            20,
            now - Duration::hours(1),
            now + Duration::hours(1),
        );
        let q = quote(&p, "XL", now);
        assert_eq!(q.size_adjusted, Money::from_major(110));
        assert_eq!(q.final_price, Money::from_major(88));
    }

    #[test]
    fn rounds_to_two_decimals_half_away_from_zero() {
        let now = Utc::now();
        let mut p = product(0);
        p.base_price = "33.335".parse().unwrap();
        assert_eq!(price(&p, "M", now), "33.34".parse().unwrap());

        let p = with_promo(
            product(99_999),
            15,
            now - Duration::hours(1),
            now + Duration::hours(1),
        );
        assert_eq!(price(&p, "M", now), "84999.15".parse().unwrap());
    }

    #[test]
    fn pricing_is_deterministic() {
        let now = Utc::now();
        let p = with_promo(
            with_size_rule(product(123), "L", 7),
            13,
            now - Duration::hours(1),
            now + Duration::hours(1),
        );
        assert_eq!(quote(&p, "XXL", now), quote(&p, "XXL", now));
    }

    #[test]
    fn size_rank_follows_scale() {
        assert_eq!(size_rank("xxs"), Some(0));
        assert_eq!(size_rank(" 4xl "), Some(8));
        assert_eq!(size_rank("5XL"), None);
    }
}
