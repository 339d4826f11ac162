//! Rate limiting middleware.
//!
//! Installed per route with [`axum::Router::route_layer`], so each route
//! carries its own [`RoutePolicy`] and the bucket key uses the registered
//! pattern rather than the concrete path.
//!
//! # Response Headers
//!
//! On admission, for the most constrained tier:
//! - `X-RateLimit-Limit`
//! - `X-RateLimit-Remaining`
//!
//! On rejection (429) the error normalizer renders the envelope; the response
//! carries `Retry-After` in seconds.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use tracing::warn;

use super::context::RequestContext;
use crate::error::AppError;
use crate::metrics;
use crate::throttle::{Decision, RateLimiter, RoutePolicy};

pub const RATE_LIMIT_LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// State of [`enforce_rate_limit`] for one route.
#[derive(Clone)]
pub struct RouteGuard {
    pub limiter: Arc<RateLimiter>,
    pub route: RoutePolicy,
}

impl RouteGuard {
    pub fn new(limiter: Arc<RateLimiter>, route: RoutePolicy) -> Self {
        Self { limiter, route }
    }
}

/// Admit or reject the request before it reaches validation and the handler.
pub async fn enforce_rate_limit(
    State(guard): State<RouteGuard>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let context = RequestContext::of(&req);

    match guard.limiter.check(&context, &guard.route).await? {
        Decision::Admit { quota } => {
            let mut response = next.run(req).await;
            if let Some(quota) = quota {
                let headers = response.headers_mut();
                headers.insert(RATE_LIMIT_LIMIT_HEADER, HeaderValue::from(quota.limit));
                headers.insert(RATE_LIMIT_REMAINING_HEADER, HeaderValue::from(quota.remaining));
            }
            Ok(response)
        }
        Decision::Reject {
            tier,
            limit,
            retry_after,
        } => {
            warn!(
                request_id = %context.request_id,
                client_ip = %context.client_address,
                route = guard.route.pattern,
                tier = %tier,
                limit,
                retry_after_ms = retry_after.as_millis() as u64,
                "Rate limit exceeded"
            );
            metrics::record_rate_limit_rejection(&tier);

            Err(AppError::RateLimitExceeded {
                tier,
                limit,
                retry_after,
            })
        }
    }
}
