//! Admin endpoints for coupons, promotions and the loyalty ledger.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, SubsecRound, Utc};
use sqlx::types::Json as SqlJson;
use std::sync::Arc;

use super::{percentage, required_text, COUPON_COLUMNS, PROMOTION_COLUMNS};
use crate::{
    clock::utc_now,
    error::{is_unique_violation, ApiResult, AppError},
    loyalty,
    models::*,
    pricing, AppState,
};

fn coupon_value(kind: DiscountType, value: f64) -> Result<f64, AppError> {
    match kind {
        DiscountType::Percentage => percentage(value, "Desconto"),
        DiscountType::Fixed => match super::non_negative(value, "Valor do cupom")? {
            v if v > 0.0 => Ok(v),
            _ => Err(AppError::validation("Valor do cupom deve ser positivo")),
        },
    }
}

fn duplicate_code(e: sqlx::Error) -> AppError {
    if is_unique_violation(&e) {
        AppError::conflict("Já existe um cupom com esse código")
    } else {
        AppError::from(e)
    }
}

/// Stored timestamps are compared as text, so keep them at whole seconds.
fn seconds(at: Option<DateTime<Utc>>) -> Option<DateTime<Utc>> {
    at.map(|t| t.trunc_subsecs(0))
}

// ── Coupons ──

/// GET /api/admin/coupons
pub async fn list_coupons(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Coupon>> {
    let coupons = sqlx::query_as::<_, Coupon>(&format!(
        "SELECT {COUPON_COLUMNS} FROM coupons ORDER BY created_at DESC, id DESC"
    ))
    .fetch_all(&state.db)
    .await?;
    Ok(Json(ApiResponse::success(coupons)))
}

/// POST /api/admin/coupons
pub async fn create_coupon(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CouponRequest>,
) -> ApiResult<Coupon> {
    let code = pricing::normalize_code(&required_text(body.code.as_deref(), "código")?);
    let kind = body
        .discount_type
        .ok_or_else(|| AppError::validation("Campo obrigatório: tipo de desconto"))?;
    let value = coupon_value(
        kind,
        body.discount_value
            .ok_or_else(|| AppError::validation("Campo obrigatório: valor"))?,
    )?;
    let usage_limit = body.usage_limit.unwrap_or(1);
    if usage_limit < 1 {
        return Err(AppError::validation("Limite de uso deve ser ao menos 1"));
    }

    let coupon = sqlx::query_as::<_, Coupon>(&format!(
        "INSERT INTO coupons (code, discount_type, discount_value, usage_limit, expires_at, is_active, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         RETURNING {COUPON_COLUMNS}"
    ))
    .bind(&code)
    .bind(kind)
    .bind(value)
    .bind(usage_limit)
    .bind(seconds(body.expires_at.flatten()))
    .bind(body.is_active.unwrap_or(true))
    .bind(utc_now())
    .fetch_one(&state.db)
    .await
    .map_err(duplicate_code)?;

    tracing::info!(code = %coupon.code, "Coupon created");
    Ok(Json(ApiResponse::success(coupon)))
}

/// PUT /api/admin/coupons/{id}
pub async fn update_coupon(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<CouponRequest>,
) -> ApiResult<Coupon> {
    let mut coupon = sqlx::query_as::<_, Coupon>(&format!(
        "SELECT {COUPON_COLUMNS} FROM coupons WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::not_found("Cupom não encontrado"))?;

    if body.code.is_some() {
        coupon.code = pricing::normalize_code(&required_text(body.code.as_deref(), "código")?);
    }
    if let Some(kind) = body.discount_type {
        coupon.discount_type = kind;
    }
    if let Some(value) = body.discount_value {
        coupon.discount_value = value;
    }
    coupon.discount_value = coupon_value(coupon.discount_type, coupon.discount_value)?;
    if let Some(limit) = body.usage_limit {
        if limit < 1 {
            return Err(AppError::validation("Limite de uso deve ser ao menos 1"));
        }
        coupon.usage_limit = limit;
    }
    if let Some(expires_at) = body.expires_at {
        coupon.expires_at = seconds(expires_at);
    }
    if let Some(active) = body.is_active {
        coupon.is_active = active;
    }

    // used_count is owned by checkout
    let coupon = sqlx::query_as::<_, Coupon>(&format!(
        "UPDATE coupons SET code = ?, discount_type = ?, discount_value = ?, usage_limit = ?,
            expires_at = ?, is_active = ?
         WHERE id = ?
         RETURNING {COUPON_COLUMNS}"
    ))
    .bind(&coupon.code)
    .bind(coupon.discount_type)
    .bind(coupon.discount_value)
    .bind(coupon.usage_limit)
    .bind(coupon.expires_at)
    .bind(coupon.is_active)
    .bind(id)
    .fetch_one(&state.db)
    .await
    .map_err(duplicate_code)?;

    Ok(Json(ApiResponse::success(coupon)))
}

/// DELETE /api/admin/coupons/{id}
pub async fn delete_coupon(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<&'static str> {
    let result = sqlx::query("DELETE FROM coupons WHERE id = ?")
        .bind(id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Cupom não encontrado"));
    }
    Ok(Json(ApiResponse::success("Cupom removido")))
}

// ── Promotions ──

fn validate_promotion(promo: &Promotion) -> Result<(), AppError> {
    if promo.service_ids.is_empty() {
        return Err(AppError::validation("Selecione ao menos um serviço"));
    }
    percentage(promo.discount_percent, "Desconto")?;
    if promo.starts_at >= promo.ends_at {
        return Err(AppError::validation("Início deve ser antes do fim"));
    }
    Ok(())
}

/// GET /api/admin/promotions
pub async fn list_promotions(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Promotion>> {
    let promotions = sqlx::query_as::<_, Promotion>(&format!(
        "SELECT {PROMOTION_COLUMNS} FROM promotions ORDER BY starts_at DESC, id DESC"
    ))
    .fetch_all(&state.db)
    .await?;
    Ok(Json(ApiResponse::success(promotions)))
}

/// POST /api/admin/promotions
pub async fn create_promotion(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PromotionRequest>,
) -> ApiResult<Promotion> {
    let missing = |field: &str| AppError::validation(format!("Campo obrigatório: {field}"));
    let draft = Promotion {
        id: 0,
        name: required_text(body.name.as_deref(), "nome")?,
        service_ids: SqlJson(body.service_ids.unwrap_or_default()),
        discount_percent: body.discount_percent.ok_or_else(|| missing("desconto"))?,
        starts_at: seconds(body.starts_at).ok_or_else(|| missing("início"))?,
        ends_at: seconds(body.ends_at).ok_or_else(|| missing("fim"))?,
        is_active: body.is_active.unwrap_or(true),
    };
    validate_promotion(&draft)?;

    let promotion = sqlx::query_as::<_, Promotion>(&format!(
        "INSERT INTO promotions (name, service_ids, discount_percent, starts_at, ends_at, is_active)
         VALUES (?, ?, ?, ?, ?, ?)
         RETURNING {PROMOTION_COLUMNS}"
    ))
    .bind(&draft.name)
    .bind(&draft.service_ids)
    .bind(draft.discount_percent)
    .bind(draft.starts_at)
    .bind(draft.ends_at)
    .bind(draft.is_active)
    .fetch_one(&state.db)
    .await?;

    tracing::info!(promotion_id = promotion.id, "Promotion created");
    Ok(Json(ApiResponse::success(promotion)))
}

/// PUT /api/admin/promotions/{id}
pub async fn update_promotion(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<PromotionRequest>,
) -> ApiResult<Promotion> {
    let mut promo = sqlx::query_as::<_, Promotion>(&format!(
        "SELECT {PROMOTION_COLUMNS} FROM promotions WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::not_found("Promoção não encontrada"))?;

    if body.name.is_some() {
        promo.name = required_text(body.name.as_deref(), "nome")?;
    }
    if let Some(ids) = body.service_ids {
        promo.service_ids = SqlJson(ids);
    }
    if let Some(pct) = body.discount_percent {
        promo.discount_percent = pct;
    }
    if let Some(start) = seconds(body.starts_at) {
        promo.starts_at = start;
    }
    if let Some(end) = seconds(body.ends_at) {
        promo.ends_at = end;
    }
    if let Some(active) = body.is_active {
        promo.is_active = active;
    }
    validate_promotion(&promo)?;

    let promo = sqlx::query_as::<_, Promotion>(&format!(
        "UPDATE promotions SET name = ?, service_ids = ?, discount_percent = ?,
            starts_at = ?, ends_at = ?, is_active = ?
         WHERE id = ?
         RETURNING {PROMOTION_COLUMNS}"
    ))
    .bind(&promo.name)
    .bind(&promo.service_ids)
    .bind(promo.discount_percent)
    .bind(promo.starts_at)
    .bind(promo.ends_at)
    .bind(promo.is_active)
    .bind(id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(ApiResponse::success(promo)))
}

/// DELETE /api/admin/promotions/{id}
pub async fn delete_promotion(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<&'static str> {
    let result = sqlx::query("DELETE FROM promotions WHERE id = ?")
        .bind(id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Promoção não encontrada"));
    }
    Ok(Json(ApiResponse::success("Promoção removida")))
}

// ── Loyalty ──

/// GET /api/admin/loyalty
pub async fn list_loyalty(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Loyalty>> {
    let records = loyalty::list(&state.db).await?;
    Ok(Json(ApiResponse::success(records)))
}

/// POST /api/admin/loyalty/{phone}/redeem: free service handed out, counter back to zero
pub async fn redeem_loyalty(
    State(state): State<Arc<AppState>>,
    Path(phone): Path<String>,
) -> ApiResult<Loyalty> {
    let phone = loyalty::normalize_phone(&phone);
    let record = loyalty::redeem(&state.db, &phone)
        .await?
        .ok_or_else(|| AppError::not_found("Cliente sem registro de fidelidade"))?;
    Ok(Json(ApiResponse::success(record)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn promo(pct: f64, hours: i64) -> Promotion {
        let start = utc_now();
        Promotion {
            id: 0,
            name: "Semana da beleza".into(),
            service_ids: SqlJson(vec![1]),
            discount_percent: pct,
            starts_at: start,
            ends_at: start + Duration::hours(hours),
            is_active: true,
        }
    }

    #[test]
    fn test_coupon_value_rules() {
        assert_eq!(coupon_value(DiscountType::Percentage, 15.0).unwrap(), 15.0);
        assert!(coupon_value(DiscountType::Percentage, 120.0).is_err());
        assert_eq!(coupon_value(DiscountType::Fixed, 120.0).unwrap(), 120.0);
        assert!(coupon_value(DiscountType::Fixed, 0.0).is_err());
        assert!(coupon_value(DiscountType::Fixed, 1e30).is_err());
    }

    #[test]
    fn test_validate_promotion() {
        assert!(validate_promotion(&promo(20.0, 24)).is_ok());
        assert!(validate_promotion(&promo(20.0, 0)).is_err());
        assert!(validate_promotion(&promo(101.0, 24)).is_err());

        let mut empty = promo(20.0, 24);
        empty.service_ids = SqlJson(vec![]);
        assert!(validate_promotion(&empty).is_err());
    }

    #[test]
    fn test_seconds_truncates() {
        let at = DateTime::parse_from_rfc3339("2024-06-10T14:00:00.750Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(seconds(Some(at)).unwrap().to_rfc3339(), "2024-06-10T14:00:00+00:00");
    }
}
