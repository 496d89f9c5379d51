//! Price and discount composition.
//!
//! Amounts are stored as `f64` and computed with `Decimal`, rounded to
//! 2 decimal places half-away-from-zero. Discounts compound sequentially:
//!
//! ```text
//! subtotal     = Σ unit × quantity        (unit = promotional price for promoted services)
//! after_coupon = subtotal - coupon_discount
//! total        = after_coupon - after_coupon * global% / 100   (PIX only)
//! ```
//!
//! Amounts that do not fit in a `Decimal`, or arithmetic that would
//! overflow, are rejected as validation errors.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use serde::Serialize;

use crate::error::AppError;
use crate::models::{Coupon, DiscountType, ItemKind, LineItem, PaymentMethod, Promotion, Settings};

const DECIMAL_PLACES: u32 = 2;

fn to_decimal(value: f64) -> Result<Decimal, AppError> {
    Decimal::from_f64(value).ok_or_else(|| AppError::validation("Valor fora do intervalo permitido"))
}

fn overflow() -> AppError {
    AppError::validation("Valor total fora do intervalo permitido")
}

#[inline]
fn to_f64(value: Decimal) -> f64 {
    round(value).to_f64().unwrap_or_default()
}

#[inline]
fn round(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
}

/// `price × (1 − pct/100)`.
pub fn promotional_price(price: f64, discount_percent: f64) -> Result<f64, AppError> {
    let pct = to_decimal(discount_percent)?.clamp(Decimal::ZERO, Decimal::ONE_HUNDRED);
    let discounted = to_decimal(price)?
        .checked_mul(Decimal::ONE - pct / Decimal::ONE_HUNDRED)
        .ok_or_else(overflow)?;
    Ok(to_f64(discounted))
}

/// Map of service id → best discount percentage among promotions running at `now`.
///
/// Overlapping promotions on the same service do not stack; the highest
/// percentage wins.
pub fn best_promotions(promotions: &[Promotion], now: DateTime<Utc>) -> HashMap<i64, f64> {
    let mut best: HashMap<i64, f64> = HashMap::new();
    for promo in promotions
        .iter()
        .filter(|p| p.is_active && p.starts_at <= now && now <= p.ends_at)
    {
        for service_id in promo.service_ids.iter() {
            let entry = best.entry(*service_id).or_insert(promo.discount_percent);
            if promo.discount_percent > *entry {
                *entry = promo.discount_percent;
            }
        }
    }
    best
}

/// Unit price actually charged for a line. Promotions only apply to services.
pub fn unit_price(item: &LineItem, promotions: &HashMap<i64, f64>) -> Result<f64, AppError> {
    match (item.kind, promotions.get(&item.id)) {
        (ItemKind::Service, Some(&pct)) => promotional_price(item.price, pct),
        _ => Ok(item.price),
    }
}

/// Sum of `unit × quantity`.
pub fn subtotal(items: &[LineItem], promotions: &HashMap<i64, f64>) -> Result<f64, AppError> {
    let mut sum = Decimal::ZERO;
    for item in items {
        let line = to_decimal(unit_price(item, promotions)?)?
            .checked_mul(Decimal::from(item.quantity))
            .ok_or_else(overflow)?;
        sum = sum.checked_add(line).ok_or_else(overflow)?;
    }
    Ok(to_f64(sum))
}

/// Discount granted by a coupon on `subtotal`. Never exceeds the subtotal.
pub fn coupon_discount(kind: DiscountType, value: f64, subtotal: f64) -> Result<f64, AppError> {
    let subtotal = to_decimal(subtotal)?.max(Decimal::ZERO);
    let value = to_decimal(value)?.max(Decimal::ZERO);
    let discount = match kind {
        DiscountType::Percentage => subtotal.checked_mul(value).ok_or_else(overflow)? / Decimal::ONE_HUNDRED,
        DiscountType::Fixed => value,
    };
    Ok(to_f64(discount.min(subtotal)))
}

/// Why a coupon cannot be applied right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CouponRejection {
    NotFound,
    Inactive,
    Expired,
    Exhausted,
}

impl CouponRejection {
    pub fn message(self) -> &'static str {
        match self {
            Self::NotFound => "Cupom não encontrado",
            Self::Inactive => "Cupom inativo",
            Self::Expired => "Cupom expirado",
            Self::Exhausted => "Cupom esgotado",
        }
    }
}

pub fn check_coupon(coupon: &Coupon, now: DateTime<Utc>) -> Result<(), CouponRejection> {
    if !coupon.is_active {
        return Err(CouponRejection::Inactive);
    }
    if coupon.expires_at.is_some_and(|exp| exp <= now) {
        return Err(CouponRejection::Expired);
    }
    if coupon.used_count >= coupon.usage_limit {
        return Err(CouponRejection::Exhausted);
    }
    Ok(())
}

/// Coupon codes are case-insensitive and stored upper-cased.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceBreakdown {
    pub subtotal: f64,
    pub coupon_discount: f64,
    pub payment_discount: f64,
    pub total: f64,
}

/// Compose the payable amount for a cart priced from the catalog.
pub fn compose(
    items: &[LineItem],
    promotions: &HashMap<i64, f64>,
    coupon: Option<(DiscountType, f64)>,
    method: PaymentMethod,
    settings: &Settings,
) -> Result<PriceBreakdown, AppError> {
    let subtotal = subtotal(items, promotions)?;
    let coupon_discount = match coupon {
        Some((kind, value)) => coupon_discount(kind, value, subtotal)?,
        None => 0.0,
    };

    let after_coupon = to_decimal(subtotal)? - to_decimal(coupon_discount)?;
    let payment_discount = if settings.global_discount_active && method == PaymentMethod::Pix {
        let pct = to_decimal(settings.global_discount_percent)?
            .clamp(Decimal::ZERO, Decimal::ONE_HUNDRED);
        round(after_coupon.checked_mul(pct).ok_or_else(overflow)? / Decimal::ONE_HUNDRED)
    } else {
        Decimal::ZERO
    };

    let total = (after_coupon - payment_discount).max(Decimal::ZERO);

    Ok(PriceBreakdown {
        subtotal,
        coupon_discount,
        payment_discount: to_f64(payment_discount),
        total: to_f64(total),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sqlx::types::Json;

    fn item(price: f64, quantity: i64) -> LineItem {
        LineItem {
            kind: ItemKind::Service,
            id: 1,
            name: "Serviço".into(),
            price,
            quantity,
        }
    }

    fn no_promotions() -> HashMap<i64, f64> {
        HashMap::new()
    }

    fn settings(active: bool, pct: f64) -> Settings {
        Settings {
            global_discount_percent: pct,
            global_discount_active: active,
            ..Settings::default()
        }
    }

    fn coupon(kind: DiscountType, used: i64, limit: i64) -> Coupon {
        Coupon {
            id: 1,
            code: "BEMVINDA".into(),
            discount_type: kind,
            discount_value: 10.0,
            usage_limit: limit,
            used_count: used,
            expires_at: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    fn promo(service_ids: Vec<i64>, pct: f64, now: DateTime<Utc>) -> Promotion {
        Promotion {
            id: 1,
            name: "Semana da beleza".into(),
            service_ids: Json(service_ids),
            discount_percent: pct,
            starts_at: now - Duration::days(1),
            ends_at: now + Duration::days(1),
            is_active: true,
        }
    }

    // ── coupon_discount ──

    #[test]
    fn test_fixed_coupon_capped_at_subtotal() {
        assert_eq!(coupon_discount(DiscountType::Fixed, 10.0, 7.5).unwrap(), 7.5);
        assert_eq!(coupon_discount(DiscountType::Fixed, 10.0, 25.0).unwrap(), 10.0);
        assert_eq!(coupon_discount(DiscountType::Fixed, 10.0, 0.0).unwrap(), 0.0);
    }

    #[test]
    fn test_percentage_coupon_rounds_to_cents() {
        assert_eq!(coupon_discount(DiscountType::Percentage, 15.0, 33.33).unwrap(), 5.0);
        assert_eq!(coupon_discount(DiscountType::Percentage, 10.0, 99.99).unwrap(), 10.0);
        assert_eq!(coupon_discount(DiscountType::Percentage, 12.5, 80.0).unwrap(), 10.0);
    }

    #[test]
    fn test_fixed10_on_small_cart_totals_zero() {
        let breakdown = compose(
            &[item(7.5, 1)],
            &no_promotions(),
            Some((DiscountType::Fixed, 10.0)),
            PaymentMethod::Card,
            &settings(false, 5.0),
        )
        .unwrap();
        assert_eq!(breakdown.coupon_discount, 7.5);
        assert_eq!(breakdown.total, 0.0);
    }

    // ── compose ──

    #[test]
    fn test_compose_without_discounts() {
        let breakdown = compose(
            &[item(50.0, 2), item(30.0, 1)],
            &no_promotions(),
            None,
            PaymentMethod::Pix,
            &settings(false, 10.0),
        )
        .unwrap();
        assert_eq!(breakdown.subtotal, 130.0);
        assert_eq!(breakdown.payment_discount, 0.0);
        assert_eq!(breakdown.total, 130.0);
    }

    #[test]
    fn test_pix_discount_applies_after_coupon() {
        let breakdown = compose(
            &[item(100.0, 1)],
            &no_promotions(),
            Some((DiscountType::Percentage, 10.0)),
            PaymentMethod::Pix,
            &settings(true, 5.0),
        )
        .unwrap();
        assert_eq!(breakdown.coupon_discount, 10.0);
        // 5% of 90, not of 100
        assert_eq!(breakdown.payment_discount, 4.5);
        assert_eq!(breakdown.total, 85.5);
    }

    #[test]
    fn test_global_discount_only_for_pix() {
        let breakdown = compose(&[item(100.0, 1)], &no_promotions(), None, PaymentMethod::Card, &settings(true, 5.0))
            .unwrap();
        assert_eq!(breakdown.payment_discount, 0.0);
        assert_eq!(breakdown.total, 100.0);
    }

    #[test]
    fn test_inactive_global_discount_ignored() {
        let breakdown = compose(&[item(100.0, 1)], &no_promotions(), None, PaymentMethod::Pix, &settings(false, 5.0))
            .unwrap();
        assert_eq!(breakdown.total, 100.0);
    }

    // ── promotions ──

    #[test]
    fn test_promotional_price() {
        assert_eq!(promotional_price(100.0, 20.0).unwrap(), 80.0);
        assert_eq!(promotional_price(59.9, 10.0).unwrap(), 53.91);
        assert_eq!(promotional_price(40.0, 150.0).unwrap(), 0.0);
    }

    #[test]
    fn test_promoted_service_priced_at_promotion_in_cart() {
        let promotions = HashMap::from([(1, 25.0)]);
        let breakdown = compose(
            &[item(120.0, 1)],
            &promotions,
            None,
            PaymentMethod::Card,
            &settings(false, 0.0),
        )
        .unwrap();
        assert_eq!(breakdown.subtotal, 90.0);
        assert_eq!(breakdown.total, 90.0);
    }

    #[test]
    fn test_promotion_ignores_combo_with_same_id() {
        let promotions = HashMap::from([(1, 25.0)]);
        let mut combo = item(200.0, 1);
        combo.kind = ItemKind::Combo;
        assert_eq!(unit_price(&combo, &promotions).unwrap(), 200.0);
        assert_eq!(subtotal(&[combo, item(120.0, 2)], &promotions).unwrap(), 380.0);
    }

    #[test]
    fn test_unrepresentable_price_is_rejected() {
        let err = subtotal(&[item(1e30, 1)], &no_promotions()).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(subtotal(&[item(f64::INFINITY, 1)], &no_promotions()).is_err());
    }

    #[test]
    fn test_overflowing_cart_is_rejected() {
        let err = subtotal(&[item(1e28, 100)], &no_promotions()).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = subtotal(&[item(5e28, 1), item(5e28, 1)], &no_promotions()).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_best_promotion_takes_highest_percent() {
        let now = Utc::now();
        let promos = vec![promo(vec![1, 2], 10.0, now), promo(vec![2, 3], 25.0, now), promo(vec![2], 15.0, now)];
        let best = best_promotions(&promos, now);
        assert_eq!(best.get(&1), Some(&10.0));
        assert_eq!(best.get(&2), Some(&25.0));
        assert_eq!(best.get(&3), Some(&25.0));
        assert_eq!(best.get(&4), None);
    }

    #[test]
    fn test_best_promotion_skips_inactive_and_out_of_window() {
        let now = Utc::now();
        let mut inactive = promo(vec![1], 50.0, now);
        inactive.is_active = false;
        let mut future = promo(vec![1], 40.0, now);
        future.starts_at = now + Duration::hours(1);
        let mut past = promo(vec![1], 30.0, now);
        past.ends_at = now - Duration::hours(1);

        let best = best_promotions(&[inactive, future, past, promo(vec![1], 5.0, now)], now);
        assert_eq!(best.get(&1), Some(&5.0));
    }

    // ── check_coupon ──

    #[test]
    fn test_check_coupon_rules() {
        let now = Utc::now();
        assert_eq!(check_coupon(&coupon(DiscountType::Fixed, 0, 1), now), Ok(()));
        assert_eq!(
            check_coupon(&coupon(DiscountType::Fixed, 1, 1), now),
            Err(CouponRejection::Exhausted)
        );

        let mut inactive = coupon(DiscountType::Fixed, 0, 5);
        inactive.is_active = false;
        assert_eq!(check_coupon(&inactive, now), Err(CouponRejection::Inactive));

        let mut expired = coupon(DiscountType::Fixed, 0, 5);
        expired.expires_at = Some(now - Duration::minutes(1));
        assert_eq!(check_coupon(&expired, now), Err(CouponRejection::Expired));
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code("  bemVinda10 "), "BEMVINDA10");
    }
}
