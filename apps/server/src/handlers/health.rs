use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::AppState;

/// Liveness plus the storefront features that are switched on.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub db_ok: bool,
    pub demo_mode: bool,
    pub pix_discount_active: bool,
    pub loyalty_threshold: i64,
    pub chat_enabled: bool,
    pub push_enabled: bool,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let db_ok = sqlx::query("SELECT 1").execute(&state.db).await.is_ok();
    let settings = state.settings.read().await;

    Json(HealthResponse {
        status: if db_ok { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        db_ok,
        demo_mode: state.config.demo_mode,
        pix_discount_active: settings.global_discount_active,
        loyalty_threshold: settings.loyalty_threshold,
        chat_enabled: state.config.chat.api_key.is_some() && !state.config.demo_mode,
        push_enabled: state.config.push.enabled(),
    })
}
