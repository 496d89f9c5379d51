use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use sqlx::{types::Json as SqlJson, SqlitePool};
use std::sync::Arc;

use super::{
    non_negative, percentage, required_text, APPOINTMENT_COLUMNS, CATEGORY_COLUMNS, COMBO_COLUMNS,
    SERVICE_COLUMNS,
};
use crate::{
    auth::{self, AdminSession},
    clock::utc_now,
    db,
    error::{ApiResult, AppError},
    loyalty,
    models::*,
    slots, AppState,
};

// ── Session ──

/// POST /api/admin/login: exchange credentials for a bearer token
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginRequest>,
) -> ApiResult<LoginResponse> {
    if !auth::check_credentials(&state, &body.username, &body.password) {
        tracing::warn!(username = %body.username, "admin login failed");
        return Err(AppError::Unauthorized);
    }

    let (token, expires_at) = auth::issue_token(
        &body.username,
        &state.config.session_secret,
        state.config.session_ttl_secs,
        chrono::Utc::now().timestamp(),
    );
    tracing::info!(username = %body.username, expires_at, "admin logged in");

    Ok(Json(ApiResponse::success(LoginResponse { token, expires_at })))
}

// ── Services ──

async fn fetch_service(db: &SqlitePool, id: i64) -> Result<Service, AppError> {
    sqlx::query_as::<_, Service>(&format!("SELECT {SERVICE_COLUMNS} FROM services WHERE id = ?"))
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::not_found("Serviço não encontrado"))
}

/// GET /api/admin/services: list ALL services (including inactive)
pub async fn list_all_services(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Service>> {
    let services = sqlx::query_as::<_, Service>(&format!(
        "SELECT {SERVICE_COLUMNS} FROM services ORDER BY sort_order ASC, id ASC"
    ))
    .fetch_all(&state.db)
    .await?;

    Ok(Json(ApiResponse::success(services)))
}

/// POST /api/admin/services: create a new service
pub async fn create_service(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateServiceRequest>,
) -> ApiResult<Service> {
    let name = required_text(Some(&body.name), "nome")?;
    let price = non_negative(body.price, "preço")?;
    let duration_min = body.duration_min.unwrap_or(30);
    if duration_min <= 0 {
        return Err(AppError::validation("Duração inválida"));
    }

    let service = sqlx::query_as::<_, Service>(&format!(
        "INSERT INTO services (name, description, price, duration_min, category_id, image_url, sort_order)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         RETURNING {SERVICE_COLUMNS}"
    ))
    .bind(&name)
    .bind(body.description.as_deref().unwrap_or(""))
    .bind(price)
    .bind(duration_min)
    .bind(body.category_id)
    .bind(&body.image_url)
    .bind(body.sort_order.unwrap_or(0))
    .fetch_one(&state.db)
    .await?;

    tracing::info!(service_id = service.id, "Service created");
    Ok(Json(ApiResponse::success(service)))
}

/// PUT /api/admin/services/{id}: update a service
pub async fn update_service(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateServiceRequest>,
) -> ApiResult<Service> {
    let mut service = fetch_service(&state.db, id).await?;

    if body.name.is_some() {
        service.name = required_text(body.name.as_deref(), "nome")?;
    }
    if let Some(desc) = body.description {
        service.description = desc;
    }
    if let Some(price) = body.price {
        service.price = non_negative(price, "preço")?;
    }
    if let Some(dur) = body.duration_min {
        if dur <= 0 {
            return Err(AppError::validation("Duração inválida"));
        }
        service.duration_min = dur;
    }
    if body.category_id.is_some() {
        service.category_id = body.category_id;
    }
    if body.image_url.is_some() {
        service.image_url = body.image_url;
    }
    if let Some(active) = body.is_active {
        service.is_active = active;
    }
    if let Some(order) = body.sort_order {
        service.sort_order = order;
    }

    let service = sqlx::query_as::<_, Service>(&format!(
        "UPDATE services SET name = ?, description = ?, price = ?, duration_min = ?,
            category_id = ?, image_url = ?, is_active = ?, sort_order = ?
         WHERE id = ?
         RETURNING {SERVICE_COLUMNS}"
    ))
    .bind(&service.name)
    .bind(&service.description)
    .bind(service.price)
    .bind(service.duration_min)
    .bind(service.category_id)
    .bind(&service.image_url)
    .bind(service.is_active)
    .bind(service.sort_order)
    .bind(id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(ApiResponse::success(service)))
}

/// DELETE /api/admin/services/{id}: deactivate; past appointments keep their line items
pub async fn delete_service(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<&'static str> {
    let result = sqlx::query("UPDATE services SET is_active = 0 WHERE id = ?")
        .bind(id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Serviço não encontrado"));
    }

    tracing::info!(service_id = id, "Service deactivated");
    Ok(Json(ApiResponse::success("Serviço desativado")))
}

// ── Categories ──

/// GET /api/admin/categories
pub async fn list_all_categories(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Category>> {
    let categories = sqlx::query_as::<_, Category>(&format!(
        "SELECT {CATEGORY_COLUMNS} FROM categories ORDER BY sort_order ASC, id ASC"
    ))
    .fetch_all(&state.db)
    .await?;
    Ok(Json(ApiResponse::success(categories)))
}

/// POST /api/admin/categories
pub async fn create_category(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CategoryRequest>,
) -> ApiResult<Category> {
    let name = required_text(body.name.as_deref(), "nome")?;

    let category = sqlx::query_as::<_, Category>(&format!(
        "INSERT INTO categories (name, sort_order, is_active) VALUES (?, ?, ?)
         RETURNING {CATEGORY_COLUMNS}"
    ))
    .bind(&name)
    .bind(body.sort_order.unwrap_or(0))
    .bind(body.is_active.unwrap_or(true))
    .fetch_one(&state.db)
    .await?;

    Ok(Json(ApiResponse::success(category)))
}

/// PUT /api/admin/categories/{id}
pub async fn update_category(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<CategoryRequest>,
) -> ApiResult<Category> {
    let name = body
        .name
        .as_deref()
        .map(|n| required_text(Some(n), "nome"))
        .transpose()?;

    let category = sqlx::query_as::<_, Category>(&format!(
        "UPDATE categories SET
            name = COALESCE(?, name),
            sort_order = COALESCE(?, sort_order),
            is_active = COALESCE(?, is_active)
         WHERE id = ?
         RETURNING {CATEGORY_COLUMNS}"
    ))
    .bind(name)
    .bind(body.sort_order)
    .bind(body.is_active)
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::not_found("Categoria não encontrada"))?;

    Ok(Json(ApiResponse::success(category)))
}

/// DELETE /api/admin/categories/{id}: services in it become uncategorized
pub async fn delete_category(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<&'static str> {
    let mut tx = state.db.begin().await?;
    sqlx::query("UPDATE services SET category_id = NULL WHERE category_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    let result = sqlx::query("DELETE FROM categories WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Categoria não encontrada"));
    }
    tx.commit().await?;

    Ok(Json(ApiResponse::success("Categoria removida")))
}

// ── Combos ──

fn validate_service_ids(ids: &[i64]) -> Result<(), AppError> {
    if ids.is_empty() {
        return Err(AppError::validation("Selecione ao menos um serviço"));
    }
    Ok(())
}

/// GET /api/admin/combos
pub async fn list_all_combos(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Combo>> {
    let combos = sqlx::query_as::<_, Combo>(&format!("SELECT {COMBO_COLUMNS} FROM combos ORDER BY id ASC"))
        .fetch_all(&state.db)
        .await?;
    Ok(Json(ApiResponse::success(combos)))
}

/// POST /api/admin/combos
pub async fn create_combo(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ComboRequest>,
) -> ApiResult<Combo> {
    let name = required_text(body.name.as_deref(), "nome")?;
    let price = non_negative(
        body.price.ok_or_else(|| AppError::validation("Campo obrigatório: preço"))?,
        "preço",
    )?;
    let service_ids = body.service_ids.unwrap_or_default();
    validate_service_ids(&service_ids)?;

    let combo = sqlx::query_as::<_, Combo>(&format!(
        "INSERT INTO combos (name, description, service_ids, price, is_active)
         VALUES (?, ?, ?, ?, ?)
         RETURNING {COMBO_COLUMNS}"
    ))
    .bind(&name)
    .bind(body.description.as_deref().unwrap_or(""))
    .bind(SqlJson(&service_ids))
    .bind(price)
    .bind(body.is_active.unwrap_or(true))
    .fetch_one(&state.db)
    .await?;

    Ok(Json(ApiResponse::success(combo)))
}

/// PUT /api/admin/combos/{id}
pub async fn update_combo(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<ComboRequest>,
) -> ApiResult<Combo> {
    let mut combo = sqlx::query_as::<_, Combo>(&format!("SELECT {COMBO_COLUMNS} FROM combos WHERE id = ?"))
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::not_found("Combo não encontrado"))?;

    if body.name.is_some() {
        combo.name = required_text(body.name.as_deref(), "nome")?;
    }
    if let Some(desc) = body.description {
        combo.description = desc;
    }
    if let Some(ids) = body.service_ids {
        validate_service_ids(&ids)?;
        combo.service_ids = SqlJson(ids);
    }
    if let Some(price) = body.price {
        combo.price = non_negative(price, "preço")?;
    }
    if let Some(active) = body.is_active {
        combo.is_active = active;
    }

    let combo = sqlx::query_as::<_, Combo>(&format!(
        "UPDATE combos SET name = ?, description = ?, service_ids = ?, price = ?, is_active = ?
         WHERE id = ?
         RETURNING {COMBO_COLUMNS}"
    ))
    .bind(&combo.name)
    .bind(&combo.description)
    .bind(&combo.service_ids)
    .bind(combo.price)
    .bind(combo.is_active)
    .bind(id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(ApiResponse::success(combo)))
}

/// DELETE /api/admin/combos/{id}
pub async fn delete_combo(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<&'static str> {
    let result = sqlx::query("DELETE FROM combos WHERE id = ?")
        .bind(id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Combo não encontrado"));
    }
    Ok(Json(ApiResponse::success("Combo removido")))
}

// ── Appointments ──

/// GET /api/admin/appointments?status=&date=: newest first
pub async fn list_appointments(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AppointmentsQuery>,
) -> ApiResult<Vec<Appointment>> {
    let bounds = query
        .date
        .as_deref()
        .map(slots::parse_date)
        .transpose()?
        .map(slots::day_bounds_utc);

    let appointments = sqlx::query_as::<_, Appointment>(&format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments
         WHERE (?1 IS NULL OR status = ?1)
           AND (?2 IS NULL OR (scheduled_at >= ?2 AND scheduled_at < ?3))
         ORDER BY scheduled_at DESC"
    ))
    .bind(query.status)
    .bind(bounds.map(|(start, _)| start))
    .bind(bounds.map(|(_, end)| end))
    .fetch_all(&state.db)
    .await?;

    Ok(Json(ApiResponse::success(appointments)))
}

fn check_transition(from: AppointmentStatus, to: AppointmentStatus) -> Result<(), AppError> {
    use AppointmentStatus::*;
    match (from, to) {
        (a, b) if a == b => Ok(()),
        (_, Pending) => Err(AppError::validation("Agendamento não pode voltar para PENDING")),
        (Canceled, _) => Err(AppError::validation("Agendamento cancelado não pode ser reaberto")),
        _ => Ok(()),
    }
}

/// Apply a status change. PENDING → CONFIRMED credits one loyalty purchase in
/// the same transaction.
pub(crate) async fn change_status(
    db: &SqlitePool,
    id: i64,
    body: &UpdateAppointmentRequest,
    loyalty_threshold: i64,
) -> Result<Appointment, AppError> {
    let mut tx = db.begin().await?;

    let current = sqlx::query_as::<_, Appointment>(&format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::not_found("Agendamento não encontrado"))?;

    check_transition(current.status, body.status)?;
    let confirming =
        current.status == AppointmentStatus::Pending && body.status == AppointmentStatus::Confirmed;
    let confirmed_at = if confirming { Some(utc_now()) } else { current.confirmed_at };

    let updated = sqlx::query_as::<_, Appointment>(&format!(
        "UPDATE appointments SET status = ?, estimated_time = COALESCE(?, estimated_time), confirmed_at = ?
         WHERE id = ? AND status = ?
         RETURNING {APPOINTMENT_COLUMNS}"
    ))
    .bind(body.status)
    .bind(&body.estimated_time)
    .bind(confirmed_at)
    .bind(id)
    .bind(current.status)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| AppError::conflict("Agendamento alterado por outra requisição"))?;

    if confirming {
        loyalty::record_confirmation(
            &mut tx,
            &updated.customer_phone,
            &updated.customer_name,
            loyalty_threshold,
        )
        .await?;
    }

    tx.commit().await?;

    tracing::info!(
        appointment_id = id,
        from = ?current.status,
        to = ?updated.status,
        "Appointment status updated"
    );
    Ok(updated)
}

/// PUT /api/admin/appointments/{id}: `{ status, estimatedTime? }`
pub async fn update_appointment(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<AdminSession>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateAppointmentRequest>,
) -> ApiResult<Appointment> {
    let threshold = state.settings.read().await.loyalty_threshold;
    let appointment = change_status(&state.db, id, &body, threshold).await?;
    tracing::debug!(admin = %session.user, appointment_id = id, "appointment updated by admin");
    Ok(Json(ApiResponse::success(appointment)))
}

// ── Settings ──

fn merge_settings(current: &Settings, body: UpdateSettingsRequest) -> Result<Settings, AppError> {
    let mut next = current.clone();
    if let Some(pct) = body.global_discount_percent {
        next.global_discount_percent = percentage(pct, "Desconto global")?;
    }
    if let Some(active) = body.global_discount_active {
        next.global_discount_active = active;
    }
    if let Some(threshold) = body.loyalty_threshold {
        if threshold < 1 {
            return Err(AppError::validation("Meta de fidelidade deve ser ao menos 1"));
        }
        next.loyalty_threshold = threshold;
    }
    if let Some(key) = body.payment_key {
        next.payment_key = key.trim().to_string();
    }
    Ok(next)
}

/// GET /api/admin/settings
pub async fn get_settings(State(state): State<Arc<AppState>>) -> ApiResult<Settings> {
    let settings = state.settings.read().await.clone();
    Ok(Json(ApiResponse::success(settings)))
}

/// PUT /api/admin/settings: persisted first, then swapped in memory
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<AdminSession>,
    Json(body): Json<UpdateSettingsRequest>,
) -> ApiResult<Settings> {
    let mut settings = state.settings.write().await;
    let next = merge_settings(&settings, body)?;
    db::save_settings(&state.db, &next).await?;
    *settings = next.clone();

    tracing::info!(
        admin = %session.user,
        global_discount_active = next.global_discount_active,
        global_discount_percent = next.global_discount_percent,
        loyalty_threshold = next.loyalty_threshold,
        "Settings updated"
    );
    Ok(Json(ApiResponse::success(next)))
}

// ── Customers ──

/// GET /api/admin/customers
pub async fn list_customers(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Customer>> {
    let customers = loyalty::list_customers(&state.db).await?;
    Ok(Json(ApiResponse::success(customers)))
}
