//! Request context extraction.
//!
//! Every request is assigned a [`RequestContext`] before any other pipeline
//! stage runs. It is stored in the request extensions so the logger and the
//! rate limiter observe the same identity.
//!
//! The request ID is taken from an incoming `X-Request-Id` header or generated
//! as a UUIDv4, and echoed on the response.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::{HeaderValue, USER_AGENT};
use axum::http::Method;
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

use super::ip::ClientAddressResolver;

/// Header name for request ID.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Longest client-supplied request ID accepted before a new one is generated.
const MAX_REQUEST_ID_LEN: usize = 128;

/// Per-request metadata shared by all pipeline stages.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub client_address: String,
    pub method: Method,
    pub path: String,
    pub user_agent: Option<String>,
}

impl RequestContext {
    /// Derive the context of `req`. Pure function of the request metadata.
    pub fn capture<B>(req: &Request<B>, resolver: &ClientAddressResolver) -> Self {
        let user_agent = req
            .headers()
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        Self {
            request_id: request_id_of(req),
            client_address: resolver.resolve(req).into_owned(),
            method: req.method().clone(),
            path: req.uri().path().to_owned(),
            user_agent,
        }
    }

    /// Context stored by [`capture_context`], or a fresh one when the
    /// middleware is not installed.
    pub fn of<B>(req: &Request<B>) -> Self {
        req.extensions()
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_else(|| Self::capture(req, &ClientAddressResolver::default()))
    }
}

/// Middleware storing a [`RequestContext`] in the request extensions.
pub async fn capture_context(
    State(resolver): State<Arc<ClientAddressResolver>>,
    mut req: Request,
    next: Next,
) -> Response {
    let context = RequestContext::capture(&req, &resolver);
    let request_id = HeaderValue::from_str(&context.request_id).ok();
    req.extensions_mut().insert(context);

    let mut response = next.run(req).await;
    if let Some(id) = request_id {
        response.headers_mut().insert(REQUEST_ID_HEADER, id);
    }
    response
}

fn request_id_of<B>(req: &Request<B>) -> String {
    req.headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty() && id.len() <= MAX_REQUEST_ID_LEN)
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_capture_fields() {
        let req = Request::builder()
            .method(Method::POST)
            .uri("/examples/users?verbose=1")
            .header("user-agent", "curl/8.0")
            .header("x-request-id", "abc-123")
            .body(Body::empty())
            .unwrap();

        let ctx = RequestContext::capture(&req, &ClientAddressResolver::default());

        assert_eq!(ctx.request_id, "abc-123");
        assert_eq!(ctx.method, Method::POST);
        assert_eq!(ctx.path, "/examples/users");
        assert_eq!(ctx.user_agent.as_deref(), Some("curl/8.0"));
        assert_eq!(ctx.client_address, "unknown");
    }

    #[test]
    fn test_generates_request_id() {
        let req = Request::builder().body(Body::empty()).unwrap();
        let ctx = RequestContext::capture(&req, &ClientAddressResolver::default());

        assert!(Uuid::parse_str(&ctx.request_id).is_ok());
    }

    #[test]
    fn test_oversized_request_id_replaced() {
        let req = Request::builder()
            .header("x-request-id", "x".repeat(MAX_REQUEST_ID_LEN + 1))
            .body(Body::empty())
            .unwrap();
        let ctx = RequestContext::capture(&req, &ClientAddressResolver::default());

        assert!(Uuid::parse_str(&ctx.request_id).is_ok());
    }

    #[test]
    fn test_of_prefers_stored_context() {
        let mut req = Request::builder().body(Body::empty()).unwrap();
        let stored = RequestContext {
            request_id: "stored".to_string(),
            client_address: "10.0.0.1".to_string(),
            method: Method::GET,
            path: "/".to_string(),
            user_agent: None,
        };
        req.extensions_mut().insert(stored);

        assert_eq!(RequestContext::of(&req).request_id, "stored");
    }
}
