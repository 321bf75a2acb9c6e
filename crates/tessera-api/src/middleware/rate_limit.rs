//! Rate limiting for the public auth endpoints
//!
//! Login, register and refresh are limited per client IP, which blunts
//! online password guessing. The IP is read from `X-Forwarded-For`,
//! `X-Real-IP` or `Forwarded`, falling back to the peer address, so the
//! server must be started with connect info.
//!
//! Author: hephaex@gmail.com

use axum::{
    extract::Request,
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tessera_core::RateLimitConfig;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};

use crate::audit::{audit_log, extract_ip_address, AuditEvent};
use crate::error::AppError;

/// How often idle per-IP buckets are dropped
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Wrap `router` in the per-IP auth limiter described by `config`
///
/// Returns the router unchanged when rate limiting is disabled.
pub fn limit_auth_routes<S>(router: Router<S>, config: &RateLimitConfig) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    if !config.enabled {
        return router;
    }

    let Some(governor) = GovernorConfigBuilder::default()
        .per_second(config.replenish_secs)
        .burst_size(config.burst_size)
        .key_extractor(SmartIpKeyExtractor)
        .use_headers()
        .finish()
    else {
        tracing::warn!(?config, "Invalid rate limit settings; auth endpoints are not limited");
        return router;
    };
    let governor = Arc::new(governor);

    // Forget clients that are back under quota; stops with the router.
    let limiter = Arc::downgrade(governor.limiter());
    if let Ok(runtime) = tokio::runtime::Handle::try_current() {
        runtime.spawn(async move {
            let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                let Some(limiter) = limiter.upgrade() else {
                    break;
                };
                limiter.retain_recent();
            }
        });
    }
    tracing::info!(
        burst = config.burst_size,
        replenish_secs = config.replenish_secs,
        "Auth rate limiting enabled"
    );

    router
        .route_layer(GovernorLayer { config: governor })
        .route_layer(middleware::from_fn(rate_limit_envelope))
}

/// Replace the limiter's plain-text 429 with the API error envelope
async fn rate_limit_envelope(request: Request, next: Next) -> Response {
    let client_ip = extract_ip_address(request.headers()).unwrap_or_else(|| "unknown".to_string());
    let resource = request.uri().path().to_string();

    let response = next.run(request).await;
    if response.status() != StatusCode::TOO_MANY_REQUESTS {
        return response;
    }

    audit_log(&AuditEvent::RateLimited {
        client_ip,
        resource,
    });

    let retry_after = response.headers().get(header::RETRY_AFTER).cloned();
    let mut limited = AppError::TooManyRequests.into_response();
    if let Some(value) = retry_after {
        limited.headers_mut().insert(header::RETRY_AFTER, value);
    }
    limited
}
