use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::models::ApiResponse;

/// Route groups with independent budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Storefront reads.
    Public,
    /// Appointment creation and coupon validation.
    Checkout,
    /// Chat widget (each call costs an upstream completion).
    Chat,
    /// Admin login attempts.
    Login,
    /// Authenticated admin API.
    Admin,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Maximum requests allowed within the sliding window.
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitConfig {
    pub const fn per(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(window_secs),
        }
    }
}

/// In-memory per-IP sliding-window limiter.
///
/// Tiers without a config are unlimited.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    configs: Arc<HashMap<Tier, RateLimitConfig>>,
    hits: Arc<DashMap<(Tier, IpAddr), Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new(configs: impl IntoIterator<Item = (Tier, RateLimitConfig)>) -> Self {
        Self {
            configs: Arc::new(configs.into_iter().collect()),
            hits: Arc::new(DashMap::new()),
        }
    }

    /// Production budgets for the storefront.
    pub fn storefront() -> Self {
        Self::new([
            (Tier::Public, RateLimitConfig::per(120, 60)),
            (Tier::Checkout, RateLimitConfig::per(10, 300)),
            (Tier::Chat, RateLimitConfig::per(20, 60)),
            (Tier::Login, RateLimitConfig::per(10, 300)),
            (Tier::Admin, RateLimitConfig::per(240, 60)),
        ])
    }

    /// `Ok(())` if allowed, `Err(retry_after_secs)` if limited.
    pub fn check(&self, tier: Tier, ip: IpAddr) -> Result<(), u64> {
        let Some(config) = self.configs.get(&tier) else {
            return Ok(());
        };
        let now = Instant::now();

        let mut entry = self.hits.entry((tier, ip)).or_default();
        entry.retain(|t| now.duration_since(*t) < config.window);

        if entry.len() >= config.max_requests as usize {
            let oldest = entry[0];
            let retry_after = (oldest + config.window)
                .saturating_duration_since(now)
                .as_secs()
                .max(1);
            return Err(retry_after);
        }

        entry.push(now);
        Ok(())
    }

    /// Drop entries idle for longer than twice their window.
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.hits.retain(|(tier, _ip), timestamps| {
            let cutoff = self
                .configs
                .get(tier)
                .map_or(Duration::ZERO, |c| c.window * 2);
            timestamps.retain(|t| now.duration_since(*t) < cutoff);
            !timestamps.is_empty()
        });
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.hits.len()
    }
}

/// Client IP from `X-Forwarded-For` (reverse proxy) or the socket address.
pub fn extract_client_ip(req: &Request) -> IpAddr {
    if let Some(ip) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|first| first.trim().parse::<IpAddr>().ok())
    {
        return ip;
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

fn too_many_requests(retry_after: u64) -> Response {
    let body = ApiResponse::<()>::error(format!(
        "Muitas requisições. Tente novamente em {} segundos",
        retry_after
    ));
    (
        StatusCode::TOO_MANY_REQUESTS,
        [("Retry-After", retry_after.to_string())],
        Json(body),
    )
        .into_response()
}

/// Middleware: `from_fn_with_state((limiter, Tier::Public), rate_limit)`.
pub async fn rate_limit(
    State((limiter, tier)): State<(RateLimiter, Tier)>,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    let ip = extract_client_ip(&req);
    limiter.check(tier, ip).map_err(|retry_after| {
        tracing::warn!(?tier, %ip, retry_after, "rate limited");
        too_many_requests(retry_after)
    })?;
    Ok(next.run(req).await)
}
