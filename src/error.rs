use std::borrow::Cow;
use std::fmt;
use std::time::Duration;

use axum::extract::rejection::{JsonRejection, QueryRejection, RawPathParamsRejection};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::validation::{FieldViolation, ValidationErrors};

/// Error name reported for rate limit rejections.
pub const THROTTLER_EXCEPTION: &str = "ThrottlerException";
/// Error name used when a declared failure carries a plain string body.
pub const HTTP_EXCEPTION: &str = "HttpException";

const INTERNAL_SERVER_ERROR: &str = "InternalServerError";
const QUERY_FAILED_ERROR: &str = "QueryFailedError";
const UNKNOWN_ERROR: &str = "UnknownError";

/// A single message or an ordered list of messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorMessage {
    One(String),
    Many(Vec<String>),
}

impl fmt::Display for ErrorMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorMessage::One(message) => f.write_str(message),
            ErrorMessage::Many(messages) => f.write_str(&messages.join("; ")),
        }
    }
}

impl From<&str> for ErrorMessage {
    fn from(message: &str) -> Self {
        ErrorMessage::One(message.to_owned())
    }
}

impl From<String> for ErrorMessage {
    fn from(message: String) -> Self {
        ErrorMessage::One(message)
    }
}

/// Body of a declared failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureBody {
    /// Just a message; the error name comes from the failure itself.
    Text(String),
    /// Explicit error name and message.
    Structured { error: String, message: ErrorMessage },
}

impl fmt::Display for FailureBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureBody::Text(message) => f.write_str(message),
            FailureBody::Structured { error, message } => write!(f, "{error}: {message}"),
        }
    }
}

/// Every way a request can fail.
///
/// The set is closed: the error normalizer matches it exhaustively to build
/// the response envelope.
#[derive(Error, Debug)]
pub enum AppError {
    /// A rate limit tier rejected the request.
    #[error("Too Many Requests")]
    RateLimitExceeded {
        tier: String,
        limit: u32,
        retry_after: Duration,
    },

    #[error("{0}")]
    ValidationFailed(ValidationErrors),

    /// A failure raised on purpose, carrying its own status and body.
    #[error("{status}: {body}")]
    Http {
        status: StatusCode,
        name: Cow<'static, str>,
        body: FailureBody,
    },

    /// A data-layer failure. The detail is logged but never sent to clients.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// An unexpected runtime fault.
    #[error("{}", .message.as_deref().unwrap_or("Internal server error"))]
    Fault {
        name: Option<String>,
        message: Option<String>,
        stack: Option<String>,
    },

    /// A failure that carries no usable information.
    #[error("Unknown error")]
    Unknown,
}

impl AppError {
    /// Declared failure with the generic `HttpException` name.
    pub fn http(status: StatusCode, body: FailureBody) -> Self {
        AppError::Http {
            status,
            name: Cow::Borrowed(HTTP_EXCEPTION),
            body,
        }
    }

    /// Declared failure whose error name is the status reason phrase.
    pub fn status(status: StatusCode, message: impl Into<ErrorMessage>) -> Self {
        Self::http(
            status,
            FailureBody::Structured {
                error: reason(status).to_owned(),
                message: message.into(),
            },
        )
    }

    pub fn bad_request(message: impl Into<ErrorMessage>) -> Self {
        Self::status(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<ErrorMessage>) -> Self {
        Self::status(StatusCode::NOT_FOUND, message)
    }

    /// Runtime fault named after the concrete error type, with its source
    /// chain as the stack.
    pub fn fault<E: std::error::Error>(error: &E) -> Self {
        let name = std::any::type_name::<E>();
        let name = name.split('<').next().unwrap_or(name);
        let name = name.rsplit("::").next().unwrap_or(name);

        let mut stack = format!("{name}: {error}");
        let mut source = error.source();
        while let Some(cause) = source {
            stack.push_str(&format!("\n    caused by: {cause}"));
            source = cause.source();
        }

        AppError::Fault {
            name: Some(name.to_owned()),
            message: Some(error.to_string()),
            stack: Some(stack),
        }
    }

    /// Classify this error into the fields of the response envelope.
    pub fn into_failure(self) -> Failure {
        match self {
            AppError::RateLimitExceeded { retry_after, .. } => Failure {
                retry_after: Some(retry_after),
                ..Failure::new(
                    StatusCode::TOO_MANY_REQUESTS,
                    THROTTLER_EXCEPTION,
                    "Too Many Requests".into(),
                )
            },
            AppError::ValidationFailed(errors) => Failure {
                details: Some(errors.flatten()),
                ..Failure::new(
                    StatusCode::BAD_REQUEST,
                    errors
                        .kind()
                        .unwrap_or_else(|| reason(StatusCode::BAD_REQUEST)),
                    ErrorMessage::Many(errors.messages()),
                )
            },
            AppError::Http { status, name, body } => match body {
                FailureBody::Text(message) => Failure::new(status, &name, message.into()),
                FailureBody::Structured { error, message } => Failure::new(status, &error, message),
            },
            AppError::QueryFailed(detail) => Failure {
                cause: Some(detail),
                ..Failure::new(
                    StatusCode::BAD_REQUEST,
                    QUERY_FAILED_ERROR,
                    "Database query failed".into(),
                )
            },
            AppError::Fault {
                name,
                message,
                stack,
            } => Failure {
                stack,
                ..Failure::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    name.as_deref().unwrap_or(INTERNAL_SERVER_ERROR),
                    message
                        .unwrap_or_else(|| "Internal server error".to_owned())
                        .into(),
                )
            },
            AppError::Unknown => Failure::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                UNKNOWN_ERROR,
                "An unexpected error occurred".into(),
            ),
        }
    }
}

fn reason(status: StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or("Error")
}

/// A classified failure, carried in the response extensions until the error
/// normalizer renders it.
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub status: StatusCode,
    pub error: String,
    pub message: ErrorMessage,
    pub details: Option<Vec<FieldViolation>>,
    pub stack: Option<String>,
    /// Server-side only detail.
    pub cause: Option<String>,
    pub retry_after: Option<Duration>,
}

impl Failure {
    fn new(status: StatusCode, error: &str, message: ErrorMessage) -> Self {
        Self {
            status,
            error: error.to_owned(),
            message,
            details: None,
            stack: None,
            cause: None,
            retry_after: None,
        }
    }
}

/// The JSON body of every failed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub status_code: u16,
    pub timestamp: String,
    pub path: String,
    pub method: String,
    pub error: String,
    pub message: ErrorMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldViolation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrorEnvelope {
    pub fn new(failure: &Failure, method: &Method, path: &str, expose_stack: bool) -> Self {
        Self {
            status_code: failure.status.as_u16(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            path: path.to_owned(),
            method: method.as_str().to_owned(),
            error: failure.error.clone(),
            message: failure.message.clone(),
            details: failure.details.clone(),
            stack: failure.stack.clone().filter(|_| expose_stack),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let failure = self.into_failure();

        // Rendered without request data; the error normalizer replaces it.
        let body = serde_json::json!({
            "statusCode": failure.status.as_u16(),
            "error": failure.error,
            "message": failure.message,
        });
        let mut response = (failure.status, axum::Json(body)).into_response();

        if let Some(retry_after) = failure.retry_after {
            let seconds = retry_after.as_secs_f64().ceil().max(1.0) as u64;
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(seconds));
        }

        response.extensions_mut().insert(failure);
        response
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Fault {
            name: None,
            message: Some(error.to_string()),
            stack: Some(format!("{error:?}")),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        AppError::bad_request(sanitize_serde_error(&error))
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::status(rejection.status(), rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::status(rejection.status(), rejection.body_text())
    }
}

impl From<RawPathParamsRejection> for AppError {
    fn from(rejection: RawPathParamsRejection) -> Self {
        AppError::status(rejection.status(), rejection.body_text())
    }
}

/// Sanitize serde error messages to avoid leaking internal type information.
///
/// Serde errors can contain internal struct/field names which shouldn't be
/// exposed to external clients. This function extracts the useful parts.
fn sanitize_serde_error(e: &serde_json::Error) -> String {
    let msg = e.to_string();

    if msg.contains("missing field")
        && let Some(field) = backticked(&msg)
    {
        return format!("Missing required field: {field}");
    }

    if msg.contains("unknown field")
        && let Some(field) = backticked(&msg)
    {
        return format!("Unknown field: {field}");
    }

    if msg.contains("invalid type") || msg.contains("invalid value") {
        return "Invalid data type in request".to_string();
    }

    "Invalid request format".to_string()
}

fn backticked(msg: &str) -> Option<&str> {
    let (_, rest) = msg.split_once('`')?;
    let (field, _) = rest.split_once('`')?;
    Some(field)
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rate_limit_failure() {
        let failure = AppError::RateLimitExceeded {
            tier: "short".to_string(),
            limit: 10,
            retry_after: Duration::from_millis(1500),
        }
        .into_failure();

        assert_eq!(failure.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(failure.error, "ThrottlerException");
        assert_eq!(failure.message, ErrorMessage::from("Too Many Requests"));
    }

    #[test]
    fn test_retry_after_header_rounds_up() {
        let response = AppError::RateLimitExceeded {
            tier: "short".to_string(),
            limit: 10,
            retry_after: Duration::from_millis(1500),
        }
        .into_response();

        assert_eq!(response.headers()[header::RETRY_AFTER], "2");
        assert!(response.extensions().get::<Failure>().is_some());
    }

    #[test]
    fn test_retry_after_header_is_at_least_one() {
        let response = AppError::RateLimitExceeded {
            tier: "short".to_string(),
            limit: 10,
            retry_after: Duration::ZERO,
        }
        .into_response();

        assert_eq!(response.headers()[header::RETRY_AFTER], "1");
    }

    #[test]
    fn test_validation_failure_lists_messages_and_details() {
        let errors = ValidationErrors::single("email", Some(json!("x")), "isEmail", "email must be an email");
        let failure = AppError::ValidationFailed(errors).into_failure();

        assert_eq!(failure.status, StatusCode::BAD_REQUEST);
        assert_eq!(failure.error, "Bad Request");
        assert_eq!(failure.message, ErrorMessage::Many(vec!["email must be an email".to_string()]));
        assert_eq!(failure.details.unwrap()[0].field, "email");
    }

    #[test]
    fn test_declared_text_body_uses_failure_name() {
        let failure = AppError::http(StatusCode::CONFLICT, FailureBody::Text("taken".to_string())).into_failure();

        assert_eq!(failure.status, StatusCode::CONFLICT);
        assert_eq!(failure.error, "HttpException");
        assert_eq!(failure.message, ErrorMessage::from("taken"));
    }

    #[test]
    fn test_declared_structured_body_is_taken_verbatim() {
        let failure = AppError::not_found("User 7 not found").into_failure();

        assert_eq!(failure.status, StatusCode::NOT_FOUND);
        assert_eq!(failure.error, "Not Found");
        assert_eq!(failure.message, ErrorMessage::from("User 7 not found"));
    }

    #[test]
    fn test_query_failure_hides_detail() {
        let failure = AppError::QueryFailed("relation \"users\" does not exist".to_string()).into_failure();

        assert_eq!(failure.status, StatusCode::BAD_REQUEST);
        assert_eq!(failure.error, "QueryFailedError");
        assert_eq!(failure.message, ErrorMessage::from("Database query failed"));
        assert!(failure.cause.unwrap().contains("users"));
    }

    #[test]
    fn test_fault_defaults() {
        let failure = AppError::Fault {
            name: None,
            message: None,
            stack: None,
        }
        .into_failure();

        assert_eq!(failure.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(failure.error, "InternalServerError");
        assert_eq!(failure.message, ErrorMessage::from("Internal server error"));
    }

    #[test]
    fn test_fault_from_error_uses_type_name_and_chain() {
        let io = std::io::Error::other("disk full");
        let failure = AppError::fault(&io).into_failure();

        assert_eq!(failure.error, "Error");
        assert_eq!(failure.message, ErrorMessage::from("disk full"));
        assert!(failure.stack.unwrap().starts_with("Error: disk full"));
    }

    #[test]
    fn test_unknown_failure() {
        let failure = AppError::Unknown.into_failure();

        assert_eq!(failure.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(failure.error, "UnknownError");
    }

    #[test]
    fn test_envelope_hides_stack_outside_development() {
        let failure = AppError::from(anyhow::anyhow!("boom")).into_failure();

        let hidden = ErrorEnvelope::new(&failure, &Method::GET, "/x", false);
        let shown = ErrorEnvelope::new(&failure, &Method::GET, "/x", true);

        assert!(hidden.stack.is_none());
        assert!(shown.stack.is_some());
        let json = serde_json::to_value(&hidden).unwrap();
        assert!(json.get("stack").is_none());
        assert!(json.get("details").is_none());
        assert_eq!(json["statusCode"], 500);
        assert_eq!(json["method"], "GET");
    }

    #[test]
    fn test_sanitize_serde_error() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Target {
            name: String,
        }

        let missing = serde_json::from_str::<Target>("{}").unwrap_err();
        assert_eq!(sanitize_serde_error(&missing), "Missing required field: name");

        let wrong = serde_json::from_str::<Target>(r#"{"name": 1}"#).unwrap_err();
        assert_eq!(sanitize_serde_error(&wrong), "Invalid data type in request");
    }
}
