//! Rate limiting middleware using token bucket algorithm

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::QuantaClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;
use thesistrack_common::{config::RateLimitConfig, errors::AppError};

/// Rate limiter using governor crate
pub type GlobalRateLimiter = RateLimiter<NotKeyed, InMemoryState, QuantaClock>;

/// Shared limiter plus the configured rate, for error reporting.
/// Without a limiter every request passes.
#[derive(Clone)]
pub struct UploadLimiter {
    limiter: Option<Arc<GlobalRateLimiter>>,
    per_second: u32,
}

impl UploadLimiter {
    /// Zero values are raised to one request
    pub fn new(requests_per_second: u32, burst: u32) -> Self {
        let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(burst).unwrap_or(rate);
        let quota = Quota::per_second(rate).allow_burst(burst);

        Self {
            limiter: Some(Arc::new(RateLimiter::direct(quota))),
            per_second: rate.get(),
        }
    }

    pub fn disabled() -> Self {
        Self {
            limiter: None,
            per_second: 0,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        if config.enabled {
            Self::new(config.requests_per_second, config.burst)
        } else {
            Self::disabled()
        }
    }

    fn admit(&self) -> bool {
        self.limiter
            .as_ref()
            .map_or(true, |limiter| limiter.check().is_ok())
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(limiter): State<UploadLimiter>,
    request: Request,
    next: Next,
) -> Response {
    if limiter.admit() {
        return next.run(request).await;
    }

    tracing::warn!(path = %request.uri().path(), "Rate limit exceeded");
    AppError::RateLimited {
        limit: limiter.per_second,
    }
    .into_response()
}
