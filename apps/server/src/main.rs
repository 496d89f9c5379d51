mod auth;
mod chat;
mod clock;
mod config;
mod db;
mod demo;
mod error;
mod handlers;
mod loyalty;
mod models;
mod notify;
mod pricing;
mod rate_limit;
mod slots;

use axum::{
    http::HeaderValue,
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use config::Config;
use models::Settings;
use rate_limit::{rate_limit, RateLimiter, Tier};

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: Config,
    /// Loaded once at startup; admin updates write through to the database.
    pub settings: RwLock<Settings>,
    pub http: reqwest::Client,
    pub started_at: Instant,
}

/// Rate limit cleanup interval (seconds).
const RATE_LIMIT_CLEANUP_SECS: u64 = 300;
/// Timeout for chat-completion and push calls.
const OUTBOUND_TIMEOUT_SECS: u64 = 30;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    config.warn_on_defaults();

    // ── Database ──
    let pool = db::connect(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    let settings = db::load_settings(&pool).await?;
    tracing::info!(
        global_discount_active = settings.global_discount_active,
        loyalty_threshold = settings.loyalty_threshold,
        "Settings loaded"
    );

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(OUTBOUND_TIMEOUT_SECS))
        .build()?;
    let cors = cors_layer(config.webapp_url.as_deref())?;
    let addr = format!("{}:{}", config.host, config.port);

    let state = Arc::new(AppState {
        db: pool,
        config,
        settings: RwLock::new(settings),
        http,
        started_at: Instant::now(),
    });

    // ── Rate limiter + background cleanup of stale entries ──
    let limiter = RateLimiter::storefront();
    let cleanup_limiter = limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(RATE_LIMIT_CLEANUP_SECS));
        loop {
            interval.tick().await;
            cleanup_limiter.cleanup();
        }
    });

    let app = app(state, limiter).layer(cors);

    tracing::info!("Sparkles server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Whitelist WEBAPP_URL (plus the Vite dev server) when configured, otherwise allow any origin.
fn cors_layer(webapp_url: Option<&str>) -> anyhow::Result<CorsLayer> {
    let cors = match webapp_url {
        Some(url) => {
            let origin: HeaderValue = url
                .trim_end_matches('/')
                .parse()
                .map_err(|_| anyhow::anyhow!("WEBAPP_URL is not a valid origin: {url}"))?;
            CorsLayer::new()
                .allow_origin(AllowOrigin::list([
                    origin,
                    HeaderValue::from_static("http://localhost:5173"),
                ]))
                .allow_methods(Any)
                .allow_headers(Any)
        }
        None => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    };
    Ok(cors)
}

/// All routes, grouped by rate-limit tier.
fn app(state: Arc<AppState>, limiter: RateLimiter) -> Router {
    // 1. No-limit: health checks
    let no_limit_routes = Router::new().route("/api/health", get(handlers::health::health));

    // 2. Public storefront reads
    let public_routes = Router::new()
        .route("/api/services", get(handlers::storefront::list_services))
        .route("/api/categories", get(handlers::storefront::list_categories))
        .route("/api/combos", get(handlers::storefront::list_combos))
        .route("/api/settings/public", get(handlers::storefront::public_settings))
        .route("/api/availability", get(handlers::storefront::availability))
        .route("/api/loyalty/{phone}", get(handlers::checkout::loyalty_status))
        .route("/api/customers/{phone}", get(handlers::checkout::customer_profile))
        .layer(from_fn_with_state(
            (limiter.clone(), Tier::Public),
            rate_limit,
        ));

    // 3. Checkout: strictest limit
    let checkout_routes = Router::new()
        .route("/api/appointment", post(handlers::checkout::create_appointment))
        .route("/api/coupon/validate", post(handlers::checkout::validate_coupon))
        .layer(from_fn_with_state(
            (limiter.clone(), Tier::Checkout),
            rate_limit,
        ));

    // 4. Chat widget
    let chat_routes = Router::new()
        .route("/api/chat", post(handlers::chat::chat))
        .layer(from_fn_with_state(
            (limiter.clone(), Tier::Chat),
            rate_limit,
        ));

    // 5. Admin login
    let login_routes = Router::new()
        .route("/api/admin/login", post(handlers::admin::login))
        .layer(from_fn_with_state(
            (limiter.clone(), Tier::Login),
            rate_limit,
        ));

    // 6. Admin API: bearer token required
    let admin_routes = Router::new()
        .route(
            "/api/admin/services",
            get(handlers::admin::list_all_services).post(handlers::admin::create_service),
        )
        .route(
            "/api/admin/services/{id}",
            put(handlers::admin::update_service).delete(handlers::admin::delete_service),
        )
        .route(
            "/api/admin/categories",
            get(handlers::admin::list_all_categories).post(handlers::admin::create_category),
        )
        .route(
            "/api/admin/categories/{id}",
            put(handlers::admin::update_category).delete(handlers::admin::delete_category),
        )
        .route(
            "/api/admin/combos",
            get(handlers::admin::list_all_combos).post(handlers::admin::create_combo),
        )
        .route(
            "/api/admin/combos/{id}",
            put(handlers::admin::update_combo).delete(handlers::admin::delete_combo),
        )
        .route(
            "/api/admin/appointments",
            get(handlers::admin::list_appointments),
        )
        .route(
            "/api/admin/appointments/{id}",
            put(handlers::admin::update_appointment),
        )
        .route(
            "/api/admin/settings",
            get(handlers::admin::get_settings).put(handlers::admin::update_settings),
        )
        .route("/api/admin/customers", get(handlers::admin::list_customers))
        .route(
            "/api/admin/coupons",
            get(handlers::marketing::list_coupons).post(handlers::marketing::create_coupon),
        )
        .route(
            "/api/admin/coupons/{id}",
            put(handlers::marketing::update_coupon).delete(handlers::marketing::delete_coupon),
        )
        .route(
            "/api/admin/promotions",
            get(handlers::marketing::list_promotions).post(handlers::marketing::create_promotion),
        )
        .route(
            "/api/admin/promotions/{id}",
            put(handlers::marketing::update_promotion)
                .delete(handlers::marketing::delete_promotion),
        )
        .route("/api/admin/loyalty", get(handlers::marketing::list_loyalty))
        .route(
            "/api/admin/loyalty/{phone}/redeem",
            post(handlers::marketing::redeem_loyalty),
        )
        .route_layer(from_fn_with_state(state.clone(), auth::require_admin))
        .layer(from_fn_with_state(
            (limiter.clone(), Tier::Admin),
            rate_limit,
        ));

    Router::new()
        .merge(no_limit_routes)
        .merge(public_routes)
        .merge(checkout_routes)
        .merge(chat_routes)
        .merge(login_routes)
        .merge(admin_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
