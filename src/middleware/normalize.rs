//! Error normalization.
//!
//! The outermost middleware. Any response carrying a [`Failure`] (put there by
//! [`AppError`]'s `IntoResponse`) has its body replaced by an
//! [`ErrorEnvelope`] built from the failure and the request's method and path.
//! Successful responses pass through untouched.

use std::any::Any;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderValue, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::{error, warn};

use crate::error::{AppError, ErrorEnvelope, Failure};
use crate::metrics;

/// Settings of [`normalize_errors`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizerSettings {
    /// Include the failure's stack in envelopes (development only).
    pub expose_stack: bool,
}

/// Render every failed response as an [`ErrorEnvelope`].
pub async fn normalize_errors(
    State(settings): State<NormalizerSettings>,
    req: Request,
    next: Next,
) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();

    let mut response = next.run(req).await;
    let Some(failure) = response.extensions_mut().remove::<Failure>() else {
        return response;
    };

    let envelope = ErrorEnvelope::new(&failure, &method, &path, settings.expose_stack);
    let body = serde_json::to_string(&envelope).unwrap_or_default();
    log_failure(&failure, &method, &path, &body);
    metrics::record_error(&failure.error, failure.status.as_u16());

    let (mut parts, _) = response.into_parts();
    parts.status = failure.status;
    parts.headers.remove(header::CONTENT_LENGTH);
    parts.headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    Response::from_parts(parts, Body::from(body))
}

fn log_failure(failure: &Failure, method: &axum::http::Method, path: &str, envelope: &str) {
    let status = failure.status.as_u16();
    let cause = failure.cause.as_deref();
    if failure.status.is_server_error() {
        error!(envelope, cause, "{method} {path} - {status}");
    } else {
        warn!(envelope, cause, "{method} {path} - {status}");
    }
}

/// Response for a panicking handler, used with
/// [`tower_http::catch_panic::CatchPanicLayer::custom`].
///
/// A string payload becomes a runtime fault carrying the panic message; any
/// other payload is an unknown failure.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = panic
        .downcast_ref::<String>()
        .cloned()
        .or_else(|| panic.downcast_ref::<&str>().map(|s| (*s).to_owned()));

    let failure = match message {
        Some(message) => {
            error!(panic = %message, "Handler panicked");
            AppError::Fault {
                name: None,
                stack: Some(format!("panicked: {message}")),
                message: Some(message),
            }
        }
        None => {
            error!("Handler panicked with a non-string payload");
            AppError::Unknown
        }
    };
    failure.into_response()
}
