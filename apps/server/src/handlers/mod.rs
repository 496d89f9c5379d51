pub mod admin;
pub mod chat;
pub mod checkout;
pub mod health;
pub mod marketing;
pub mod storefront;

use crate::error::AppError;

// ── Shared SELECT column lists ──

pub(crate) const SERVICE_COLUMNS: &str =
    "id, name, description, price, duration_min, category_id, image_url, is_active, sort_order";

pub(crate) const CATEGORY_COLUMNS: &str = "id, name, sort_order, is_active";

pub(crate) const COMBO_COLUMNS: &str = "id, name, description, service_ids, price, is_active";

pub(crate) const COUPON_COLUMNS: &str =
    "id, code, discount_type, discount_value, usage_limit, used_count, expires_at, is_active, created_at";

pub(crate) const PROMOTION_COLUMNS: &str =
    "id, name, service_ids, discount_percent, starts_at, ends_at, is_active";

pub(crate) const APPOINTMENT_COLUMNS: &str =
    "id, items, customer_name, customer_phone, payment_method, scheduled_at, status, subtotal,
     coupon_code, coupon_discount, payment_discount, total, estimated_time, created_at, confirmed_at";

// ── Input checks ──

/// Upper bound for any price or monetary input.
pub(crate) const MAX_AMOUNT: f64 = 1_000_000.0;

/// Trimmed, non-empty text field.
pub(crate) fn required_text(value: Option<&str>, field: &str) -> Result<String, AppError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(AppError::validation(format!("Campo obrigatório: {field}"))),
    }
}

pub(crate) fn non_negative(value: f64, field: &str) -> Result<f64, AppError> {
    if value.is_finite() && (0.0..=MAX_AMOUNT).contains(&value) {
        Ok(value)
    } else {
        Err(AppError::validation(format!("Valor inválido: {field}")))
    }
}

pub(crate) fn percentage(value: f64, field: &str) -> Result<f64, AppError> {
    if value.is_finite() && (0.0..=100.0).contains(&value) {
        Ok(value)
    } else {
        Err(AppError::validation(format!("{field} deve estar entre 0 e 100")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_text() {
        assert_eq!(required_text(Some("  Ana "), "nome").unwrap(), "Ana");
        assert!(required_text(Some("   "), "nome").is_err());
        assert!(required_text(None, "nome").is_err());
    }

    #[test]
    fn test_numeric_guards() {
        assert!(non_negative(0.0, "preço").is_ok());
        assert!(non_negative(-1.0, "preço").is_err());
        assert!(non_negative(f64::NAN, "preço").is_err());
        assert!(non_negative(MAX_AMOUNT, "preço").is_ok());
        assert!(non_negative(1e30, "preço").is_err());
        assert!(percentage(100.0, "desconto").is_ok());
        assert!(percentage(100.5, "desconto").is_err());
    }
}
