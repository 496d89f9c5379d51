use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;

use super::{CATEGORY_COLUMNS, COMBO_COLUMNS, PROMOTION_COLUMNS, SERVICE_COLUMNS};
use crate::{
    clock::{shop_now, utc_now},
    demo,
    error::{ApiResult, AppError},
    models::*,
    pricing, slots, AppState,
};

pub(crate) async fn active_services(db: &SqlitePool) -> Result<Vec<Service>, sqlx::Error> {
    sqlx::query_as::<_, Service>(&format!(
        "SELECT {SERVICE_COLUMNS} FROM services WHERE is_active = 1 ORDER BY sort_order ASC, id ASC"
    ))
    .fetch_all(db)
    .await
}

pub(crate) async fn running_promotions(
    db: &SqlitePool,
    now: DateTime<Utc>,
) -> Result<Vec<Promotion>, sqlx::Error> {
    sqlx::query_as::<_, Promotion>(&format!(
        "SELECT {PROMOTION_COLUMNS} FROM promotions
         WHERE is_active = 1 AND starts_at <= ? AND ends_at >= ?"
    ))
    .bind(now)
    .bind(now)
    .fetch_all(db)
    .await
}

/// Attach the best promotion running at `now` to each service.
pub(crate) fn with_promotions(
    services: Vec<Service>,
    promotions: &[Promotion],
    now: DateTime<Utc>,
) -> Result<Vec<StorefrontService>, AppError> {
    let best = pricing::best_promotions(promotions, now);
    services
        .into_iter()
        .map(|service| {
            let pct = best.get(&service.id).copied();
            Ok(StorefrontService {
                promo_price: pct
                    .map(|p| pricing::promotional_price(service.price, p))
                    .transpose()?,
                promotion_percent: pct,
                service,
            })
        })
        .collect()
}

/// GET /api/services: active services with promotional prices.
pub async fn list_services(State(state): State<Arc<AppState>>) -> ApiResult<Vec<StorefrontService>> {
    if state.config.demo_mode {
        return Ok(Json(ApiResponse::success(with_promotions(demo::services(), &[], utc_now())?)));
    }

    let now = utc_now();
    let services = active_services(&state.db).await?;
    let promotions = running_promotions(&state.db, now).await?;
    Ok(Json(ApiResponse::success(with_promotions(services, &promotions, now)?)))
}

/// GET /api/categories
pub async fn list_categories(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Category>> {
    if state.config.demo_mode {
        return Ok(Json(ApiResponse::success(demo::categories())));
    }

    let categories = sqlx::query_as::<_, Category>(&format!(
        "SELECT {CATEGORY_COLUMNS} FROM categories WHERE is_active = 1 ORDER BY sort_order ASC, id ASC"
    ))
    .fetch_all(&state.db)
    .await?;
    Ok(Json(ApiResponse::success(categories)))
}

/// GET /api/combos
pub async fn list_combos(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Combo>> {
    if state.config.demo_mode {
        return Ok(Json(ApiResponse::success(demo::combos())));
    }

    let combos = sqlx::query_as::<_, Combo>(&format!(
        "SELECT {COMBO_COLUMNS} FROM combos WHERE is_active = 1 ORDER BY id ASC"
    ))
    .fetch_all(&state.db)
    .await?;
    Ok(Json(ApiResponse::success(combos)))
}

/// GET /api/settings/public: PIX discount and key shown at checkout.
pub async fn public_settings(State(state): State<Arc<AppState>>) -> ApiResult<PublicSettings> {
    let settings = state.settings.read().await;
    Ok(Json(ApiResponse::success(PublicSettings::from(&*settings))))
}

/// GET /api/availability?date=YYYY-MM-DD
///
/// Always reads the database, demo mode included.
pub async fn availability(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AvailabilityQuery>,
) -> ApiResult<AvailabilityResponse> {
    let raw = query
        .date
        .as_deref()
        .ok_or_else(|| AppError::validation("Parâmetro date é obrigatório"))?;
    let date = slots::parse_date(raw)?;

    let available_slots = slots::available_slots(&state.db, date, shop_now()).await?;

    Ok(Json(ApiResponse::success(AvailabilityResponse {
        date: date.format("%Y-%m-%d").to_string(),
        available_slots,
    })))
}
