//! Application routing configuration with middleware stack.
//!
//! # Middleware Stack (outermost first)
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │ Error Normalizer │ ← renders every failure as the JSON envelope
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │ Request Context  │ ← request id, client address; X-Request-Id header
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  Request Logger  │ ← one start and one end record
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │ CORS, Catch Panic│
//! │   Body Limit     │
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  Rate Limiter    │ ← per route, keyed by the registered pattern; 429
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │   Validators     │ ← extractors; 400
//! └────────┬─────────┘
//!          ▼
//!      Handler
//! ```
//!
//! # Route Groups
//!
//! - `/health`, `/ready` - Probes (never rate limited)
//! - `/examples/dates/validate` - Date parsing, 10 requests per minute
//! - `/examples/users` - Body, query and path validation
//! - `/examples/errors/{kind}` - One failure of each category

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{MethodRouter, get, post};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::handlers;
use crate::middleware::{
    NormalizerSettings, RouteGuard, capture_context, enforce_rate_limit, log_requests,
    normalize_errors, panic_response,
};
use crate::state::AppState;
use crate::throttle::{RateLimiter, RoutePolicy, Throttle};

/// Route-specific limit of the date endpoints.
pub const DATE_ROUTE_LIMIT: u32 = 10;
pub const DATE_ROUTE_WINDOW: Duration = Duration::from_secs(60);

/// Registers routes together with their rate limit policy.
struct Routes {
    router: Router<AppState>,
    limiter: Arc<RateLimiter>,
}

impl Routes {
    fn new(limiter: Arc<RateLimiter>) -> Self {
        Self {
            router: Router::new(),
            limiter,
        }
    }

    /// Add `methods` at `pattern`, throttled per `throttle`.
    fn route(
        mut self,
        pattern: &'static str,
        throttle: Throttle,
        methods: MethodRouter<AppState>,
    ) -> Self {
        let guard = RouteGuard::new(self.limiter.clone(), RoutePolicy::new(pattern, throttle));
        self.router = self.router.route(
            pattern,
            methods.route_layer(from_fn_with_state(guard, enforce_rate_limit)),
        );
        self
    }

    fn into_router(self) -> Router<AppState> {
        self.router
    }
}

/// Build the application router with all routes and middleware configured.
pub fn build_router(state: AppState) -> Router {
    let config = &state.config;

    let cors = build_cors_layer(&config.cors_allowed_origins);

    let mut router = Routes::new(state.limiter.clone())
        .route("/health", Throttle::Skip, get(handlers::health_check))
        .route("/ready", Throttle::Skip, get(handlers::readiness_check))
        .route(
            "/examples/dates/validate",
            Throttle::limit(DATE_ROUTE_LIMIT, DATE_ROUTE_WINDOW),
            get(handlers::parse_optional_date).post(handlers::parse_required_date),
        )
        .route(
            "/examples/users",
            Throttle::Tiers,
            get(handlers::list_users).post(handlers::create_user),
        )
        .route("/examples/users/{id}", Throttle::Tiers, get(handlers::get_user))
        .route(
            "/examples/errors/{kind}",
            Throttle::Tiers,
            get(handlers::trigger_error),
        )
        .into_router()
        .fallback(handlers::route_not_found)
        .method_not_allowed_fallback(handlers::method_not_allowed);

    // =========================================================================
    // Apply Middleware Stack (order matters - last added runs first)
    // =========================================================================

    info!(
        max_size_bytes = config.max_request_body_size,
        "Request body size limit configured"
    );
    router = router.layer(DefaultBodyLimit::max(config.max_request_body_size));

    router = router.layer(CatchPanicLayer::custom(panic_response));

    router = router.layer(cors);

    router = router.layer(from_fn(log_requests));

    router = router.layer(from_fn_with_state(state.resolver.clone(), capture_context));

    if config.rate_limiting_enabled() {
        info!(
            limit = config.throttle_limit,
            window_ms = config.throttle_ttl.as_millis() as u64,
            trust_proxy = config.trust_proxy,
            trusted_proxies = config.trusted_proxies.len(),
            "Global rate limit tiers enabled"
        );
    } else {
        info!("Global rate limit tiers disabled (THROTTLE_LIMIT=0)");
    }

    let settings = NormalizerSettings {
        expose_stack: config.is_development(),
    };
    router = router.layer(from_fn_with_state(settings, normalize_errors));

    router.with_state(state)
}

/// Build CORS layer from configuration.
///
/// # Security Note
///
/// Using `*` (any origin) is convenient for development but should be
/// avoided in production. Specify explicit origins instead.
fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allow_any = allowed_origins.iter().any(|o| o == "*");

    if allow_any {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
