use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, SubsecRound, Utc};
use sqlx::{types::Json as SqlJson, SqliteConnection};
use std::sync::Arc;

use super::{APPOINTMENT_COLUMNS, COUPON_COLUMNS};
use crate::{
    clock::{shop_now, utc_now},
    error::{is_unique_violation, ApiResult, AppError},
    loyalty, notify,
    models::*,
    pricing::{self, CouponRejection, PriceBreakdown},
    slots, AppState,
};

const MIN_PHONE_DIGITS: usize = 8;
const MAX_QUANTITY: i64 = 20;
/// Client/server totals may differ by display rounding only.
const TOTAL_TOLERANCE: f64 = 0.01;

fn validate_items(items: &[LineItem]) -> Result<(), AppError> {
    if items.is_empty() {
        return Err(AppError::validation("Carrinho vazio"));
    }
    for item in items {
        if !(1..=MAX_QUANTITY).contains(&item.quantity) {
            return Err(AppError::validation(format!("Quantidade inválida para o item {}", item.id)));
        }
    }
    Ok(())
}

/// Replace client-supplied names and prices with the active catalog entry.
async fn price_from_catalog(
    conn: &mut SqliteConnection,
    items: &[LineItem],
) -> Result<Vec<LineItem>, AppError> {
    let mut priced = Vec::with_capacity(items.len());
    for item in items {
        let sql = match item.kind {
            ItemKind::Service => "SELECT name, price FROM services WHERE id = ? AND is_active = 1",
            ItemKind::Combo => "SELECT name, price FROM combos WHERE id = ? AND is_active = 1",
        };
        let (name, price) = sqlx::query_as::<_, (String, f64)>(sql)
            .bind(item.id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::validation(format!("Item indisponível: {}", item.id)))?;
        priced.push(LineItem {
            kind: item.kind,
            id: item.id,
            name,
            price,
            quantity: item.quantity,
        });
    }
    Ok(priced)
}

pub(crate) fn validate_phone(raw: &str) -> Result<String, AppError> {
    let phone = loyalty::normalize_phone(raw);
    if phone.len() < MIN_PHONE_DIGITS {
        return Err(AppError::validation("Telefone inválido"));
    }
    Ok(phone)
}

fn parse_scheduled_time(raw: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|at| at.with_timezone(&Utc).trunc_subsecs(0))
        .map_err(|_| AppError::validation("Horário inválido"))
}

async fn find_coupon(conn: &mut SqliteConnection, code: &str) -> Result<Option<Coupon>, sqlx::Error> {
    sqlx::query_as::<_, Coupon>(&format!("SELECT {COUPON_COLUMNS} FROM coupons WHERE code = ?"))
        .bind(code)
        .fetch_optional(conn)
        .await
}

/// Consume one use of `code`, or explain why it cannot be used.
///
/// The conditional UPDATE is the only place `used_count` grows, so
/// concurrent checkouts can never push it past `usage_limit`.
async fn redeem_coupon(
    conn: &mut SqliteConnection,
    code: &str,
    now: DateTime<Utc>,
) -> Result<Result<(DiscountType, f64), CouponRejection>, sqlx::Error> {
    let redeemed = sqlx::query_as::<_, (DiscountType, f64)>(
        "UPDATE coupons SET used_count = used_count + 1
         WHERE code = ? AND is_active = 1 AND used_count < usage_limit
           AND (expires_at IS NULL OR expires_at > ?)
         RETURNING discount_type, discount_value",
    )
    .bind(code)
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(coupon) = redeemed {
        return Ok(Ok(coupon));
    }

    let rejection = match find_coupon(conn, code).await? {
        None => CouponRejection::NotFound,
        // the UPDATE lost a race if the coupon looks valid here
        Some(c) => pricing::check_coupon(&c, now).err().unwrap_or(CouponRejection::Exhausted),
    };
    Ok(Err(rejection))
}

/// Everything stored for a new PENDING appointment.
struct NewAppointment<'a> {
    items: &'a [LineItem],
    customer_name: &'a str,
    phone: &'a str,
    payment_method: PaymentMethod,
    scheduled_at: DateTime<Utc>,
    coupon_code: Option<&'a str>,
    breakdown: &'a PriceBreakdown,
    created_at: DateTime<Utc>,
}

/// Insert a PENDING appointment. A second live booking of the same slot
/// violates the partial unique index on `slot_key` and maps to 409.
async fn insert_appointment(
    conn: &mut SqliteConnection,
    new: &NewAppointment<'_>,
) -> Result<Appointment, AppError> {
    sqlx::query_as::<_, Appointment>(&format!(
        "INSERT INTO appointments (items, customer_name, customer_phone, payment_method,
            scheduled_at, slot_key, status, subtotal, coupon_code, coupon_discount,
            payment_discount, total, created_at)
         VALUES (?, ?, ?, ?, ?, ?, 'PENDING', ?, ?, ?, ?, ?, ?)
         RETURNING {APPOINTMENT_COLUMNS}"
    ))
    .bind(SqlJson(new.items))
    .bind(new.customer_name)
    .bind(new.phone)
    .bind(new.payment_method)
    .bind(new.scheduled_at)
    .bind(slots::slot_key(new.scheduled_at))
    .bind(new.breakdown.subtotal)
    .bind(new.coupon_code)
    .bind(new.breakdown.coupon_discount)
    .bind(new.breakdown.payment_discount)
    .bind(new.breakdown.total)
    .bind(new.created_at)
    .fetch_one(conn)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::conflict("Horário já reservado")
        } else {
            AppError::from(e)
        }
    })
}

/// POST /api/appointment: book a slot and price the cart.
pub async fn create_appointment(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateAppointmentRequest>,
) -> ApiResult<CreateAppointmentResponse> {
    validate_items(&body.items)?;
    let customer_name = super::required_text(Some(&body.customer_name), "nome")?;
    let phone = validate_phone(&body.customer_phone)?;
    let scheduled_at = parse_scheduled_time(&body.scheduled_time)?;

    let now = shop_now();
    if scheduled_at <= now.with_timezone(&Utc) {
        return Err(AppError::validation("Horário já passou"));
    }
    if !slots::is_bookable(&state.db, scheduled_at, now).await? {
        return Err(AppError::conflict("Horário indisponível"));
    }

    let settings = state.settings.read().await.clone();
    let utc = utc_now();
    let coupon_code = body
        .coupon_code
        .as_deref()
        .map(pricing::normalize_code)
        .filter(|c| !c.is_empty());
    let promotions = pricing::best_promotions(
        &super::storefront::running_promotions(&state.db, utc).await?,
        utc,
    );

    let mut tx = state.db.begin().await?;

    let items = price_from_catalog(&mut tx, &body.items).await?;

    let coupon = match &coupon_code {
        Some(code) => match redeem_coupon(&mut tx, code, utc).await? {
            Ok(coupon) => Some(coupon),
            Err(rejection) => {
                tracing::info!(code = %code, ?rejection, "coupon rejected at checkout");
                return Err(AppError::validation(rejection.message()));
            }
        },
        None => None,
    };

    let breakdown = pricing::compose(&items, &promotions, coupon, body.payment_method, &settings)?;
    if let Some(client_total) = body.total {
        if (client_total - breakdown.total).abs() > TOTAL_TOLERANCE {
            tracing::warn!(
                client_total,
                server_total = breakdown.total,
                "checkout total mismatch, using server total"
            );
        }
    }

    let appointment = insert_appointment(
        &mut tx,
        &NewAppointment {
            items: &items,
            customer_name: &customer_name,
            phone: &phone,
            payment_method: body.payment_method,
            scheduled_at,
            coupon_code: coupon.and(coupon_code.as_deref()),
            breakdown: &breakdown,
            created_at: utc,
        },
    )
    .await?;

    loyalty::upsert_customer(&mut tx, &phone, &customer_name).await?;
    tx.commit().await?;

    tracing::info!(
        appointment_id = appointment.id,
        phone = %phone,
        total = appointment.total,
        "Appointment created"
    );

    notify::spawn_push(
        state.http.clone(),
        state.config.push.clone(),
        "Novo agendamento".into(),
        notify::appointment_message(&appointment),
    );

    let record = loyalty::find(&state.db, &phone).await?;

    Ok(Json(ApiResponse::success(CreateAppointmentResponse {
        success: true,
        appointment_id: appointment.id,
        subtotal: breakdown.subtotal,
        coupon_discount: breakdown.coupon_discount,
        payment_discount: breakdown.payment_discount,
        total: breakdown.total,
        loyalty: loyalty::status(record.as_ref(), settings.loyalty_threshold),
    })))
}

/// POST /api/coupon/validate: preview a coupon without consuming it.
pub async fn validate_coupon(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ValidateCouponRequest>,
) -> ApiResult<CouponValidation> {
    let code = pricing::normalize_code(&body.code);
    let subtotal = super::non_negative(body.subtotal, "subtotal")?;

    let mut conn = state.db.acquire().await?;
    let coupon = find_coupon(&mut conn, &code).await?;

    let checked = coupon
        .ok_or(CouponRejection::NotFound)
        .and_then(|c| pricing::check_coupon(&c, utc_now()).map(|()| c));

    let validation = match checked {
        Ok(c) => CouponValidation {
            valid: true,
            discount: Some(pricing::coupon_discount(c.discount_type, c.discount_value, subtotal)?),
            error: None,
        },
        Err(rejection) => CouponValidation {
            valid: false,
            discount: None,
            error: Some(rejection.message().into()),
        },
    };
    Ok(Json(ApiResponse::success(validation)))
}

/// GET /api/loyalty/{phone}
pub async fn loyalty_status(
    State(state): State<Arc<AppState>>,
    Path(phone): Path<String>,
) -> ApiResult<LoyaltyStatus> {
    let phone = validate_phone(&phone)?;
    let threshold = state.settings.read().await.loyalty_threshold;
    let record = loyalty::find(&state.db, &phone).await?;
    Ok(Json(ApiResponse::success(loyalty::status(record.as_ref(), threshold))))
}

/// GET /api/customers/{phone}: checkout auto-fill.
pub async fn customer_profile(
    State(state): State<Arc<AppState>>,
    Path(phone): Path<String>,
) -> ApiResult<Customer> {
    let phone = validate_phone(&phone)?;
    let customer = loyalty::find_customer(&state.db, &phone)
        .await?
        .ok_or_else(|| AppError::not_found("Cliente não encontrado"))?;
    Ok(Json(ApiResponse::success(customer)))
}
