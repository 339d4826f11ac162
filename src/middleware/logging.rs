//! Request/response logging.
//!
//! Every request produces exactly one `"request started"` and one
//! `"request finished"` event. Both are owned by a drop guard created before
//! anything is awaited, so they also fire when the request future is
//! cancelled (client disconnect) or unwinds; such requests are logged as
//! aborted with status 500.
//!
//! The logger only observes. A body that cannot be read is logged as
//! unavailable and forwarded empty; the response is returned unchanged.

use axum::body::{Body, HttpBody};
use axum::extract::{FromRequestParts, MatchedPath, Query, RawPathParams, Request};
use axum::http::{HeaderMap, Method, StatusCode, header};
use axum::middleware::Next;
use axum::response::Response;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{Instrument, Level, error, info, info_span, warn};

use super::context::RequestContext;
use crate::error::Failure;
use crate::metrics;
use crate::validation::collect_pairs;

/// Largest request body included in the start event.
pub const MAX_LOGGED_BODY_BYTES: usize = 16 * 1024;

/// Middleware emitting the start and end records of every request.
pub async fn log_requests(req: Request, next: Next) -> Response {
    let context = RequestContext::of(&req);
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned());

    let span = info_span!(
        "request",
        request_id = %context.request_id,
        method = %context.method,
        path = %context.path,
    );

    async move {
        let (mut parts, body) = req.into_parts();

        let query = Query::<Vec<(String, String)>>::try_from_uri(&parts.uri)
            .ok()
            .map(|Query(pairs)| collect_pairs(pairs))
            .filter(|map| !map.is_empty())
            .map(|map| Value::Object(map).to_string());
        let params = RawPathParams::from_request_parts(&mut parts, &())
            .await
            .ok()
            .map(|params| {
                collect_pairs(
                    params
                        .iter()
                        .map(|(key, value)| (key.to_owned(), value.to_owned())),
                )
            })
            .filter(|map| !map.is_empty())
            .map(|map| Value::Object(map).to_string());

        let mut guard = RequestSpan::new(&context, route, query, params);

        let body = match capture_body(&parts.method, &parts.headers, body).await {
            Ok((body, logged_body)) => {
                guard.start(logged_body.as_deref(), None);
                body
            }
            Err(e) => {
                let reason = format!("Failed to read request body: {e}");
                guard.start(None, Some(&reason));
                parts.headers.remove(header::CONTENT_LENGTH);
                Body::empty()
            }
        };

        let response = next.run(Request::from_parts(parts, body)).await;
        guard.finish(&response);
        response
    }
    .instrument(span)
    .await
}

/// Buffer small bodies of non-read requests so they can be logged.
///
/// Returns the body to forward and its loggable text.
async fn capture_body(
    method: &Method,
    headers: &HeaderMap,
    body: Body,
) -> Result<(Body, Option<String>), axum::Error> {
    if matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS) {
        return Ok((body, None));
    }

    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    match declared {
        Some(0) | None => return Ok((body, None)),
        Some(len) if len > MAX_LOGGED_BODY_BYTES => return Ok((body, None)),
        Some(_) => {}
    }

    let bytes = axum::body::to_bytes(body, MAX_LOGGED_BODY_BYTES).await?;
    let text = String::from_utf8_lossy(&bytes).into_owned();
    Ok((Body::from(bytes), Some(text)))
}

/// Fields of the start record.
struct StartRecord {
    client_address: String,
    user_agent: Option<String>,
    query: Option<String>,
    params: Option<String>,
}

/// Emits the start record and the end record exactly once each.
///
/// The start record is written by [`start`](Self::start), or on drop when the
/// request never got that far. The end record is written by
/// [`finish`](Self::finish) or on drop.
struct RequestSpan {
    request_id: String,
    method: Method,
    path: String,
    route: Option<String>,
    started: Instant,
    pending_start: Option<StartRecord>,
    finished: bool,
}

impl RequestSpan {
    fn new(
        context: &RequestContext,
        route: Option<String>,
        query: Option<String>,
        params: Option<String>,
    ) -> Self {
        Self {
            request_id: context.request_id.clone(),
            method: context.method.clone(),
            path: context.path.clone(),
            route,
            started: Instant::now(),
            pending_start: Some(StartRecord {
                client_address: context.client_address.clone(),
                user_agent: context.user_agent.clone(),
                query,
                params,
            }),
            finished: false,
        }
    }

    fn start(&mut self, body: Option<&str>, body_error: Option<&str>) {
        let Some(record) = self.pending_start.take() else {
            return;
        };

        info!(
            request_id = %self.request_id,
            method = %self.method,
            path = %self.path,
            client_ip = %record.client_address,
            user_agent = record.user_agent.as_deref().unwrap_or("-"),
            body,
            body_error,
            query = record.query.as_deref(),
            params = record.params.as_deref(),
            "request started"
        );
    }

    fn finish(mut self, response: &Response) {
        self.finished = true;
        let status = response.status();
        let failure = response.extensions().get::<Failure>();
        let response_size = response.body().size_hint().exact();
        let error = failure.map(|f| f.message.to_string());

        self.record(status, response_size, error.as_deref(), "completed");
    }

    fn record(&self, status: StatusCode, response_size: Option<u64>, error: Option<&str>, outcome: &str) {
        let elapsed = self.started.elapsed();
        let elapsed_ms = elapsed.as_millis() as u64;
        let code = status.as_u16();
        let (request_id, method, path) = (&self.request_id, &self.method, &self.path);

        macro_rules! finished {
            ($level:ident) => {
                $level!(
                    request_id = %request_id,
                    method = %method,
                    path = %path,
                    elapsed_ms,
                    status = code,
                    response_size,
                    error,
                    outcome,
                    "request finished"
                )
            };
        }

        let level = level_for(status);
        if level == Level::ERROR {
            finished!(error);
        } else if level == Level::WARN {
            finished!(warn);
        } else {
            finished!(info);
        }

        metrics::record_request(
            self.route.as_deref().unwrap_or("unmatched"),
            self.method.as_str(),
            code,
            elapsed.as_secs_f64(),
        );
    }
}

impl Drop for RequestSpan {
    fn drop(&mut self) {
        if !self.finished {
            self.finished = true;
            self.start(None, Some("request ended before its body was read"));
            self.record(
                StatusCode::INTERNAL_SERVER_ERROR,
                None,
                Some("request aborted before a response was produced"),
                "aborted",
            );
        }
    }
}

fn level_for(status: StatusCode) -> Level {
    if status.is_server_error() {
        Level::ERROR
    } else if status.is_client_error() {
        Level::WARN
    } else {
        Level::INFO
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::Duration;

    use axum::Router;
    use axum::middleware::from_fn;
    use axum::routing::{get, post};
    use tower::ServiceExt;

    use super::*;
    use crate::error::AppError;
    use crate::middleware::log_capture::capture_logs;

    async fn fails() -> Result<&'static str, AppError> {
        Err(AppError::not_found("nothing here"))
    }

    fn app() -> Router {
        Router::new()
            .route("/ok/{id}", get(|| async { "fine" }))
            .route("/echo", post(|body: String| async move { body }))
            .route("/fails", get(fails))
            .route("/hang", get(|| std::future::pending::<&'static str>()))
            .layer(from_fn(log_requests))
    }

    fn request(method: Method, uri: &str, body: &'static str) -> Request {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_LENGTH, body.len())
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_one_start_and_one_end_record() {
        let (logs, _guard) = capture_logs();

        let response = app()
            .oneshot(request(Method::GET, "/ok/7?verbose=1", ""))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(logs.count("request started"), 1);
        assert_eq!(logs.count("request finished"), 1);
        let text = logs.text();
        assert!(text.contains("status=200"));
        assert!(text.contains(r#"query="{\"verbose\":\"1\"}""#));
        assert!(text.contains(r#"params="{\"id\":\"7\"}""#));
    }

    #[tokio::test]
    async fn test_failing_handler_still_logs_end() {
        let (logs, _guard) = capture_logs();

        let response = app()
            .oneshot(request(Method::GET, "/fails", ""))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(logs.count("request started"), 1);
        assert_eq!(logs.count("request finished"), 1);
        let text = logs.text();
        assert!(text.contains("WARN"));
        assert!(text.contains("nothing here"));
    }

    #[tokio::test]
    async fn test_body_logged_and_forwarded_for_writes() {
        let (logs, _guard) = capture_logs();

        let response = app()
            .oneshot(request(Method::POST, "/echo", "hello"))
            .await
            .unwrap();
        let echoed = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        assert_eq!(&echoed[..], b"hello");
        assert!(logs.text().contains("body=\"hello\""));
    }

    #[tokio::test]
    async fn test_empty_query_and_params_omitted() {
        let (logs, _guard) = capture_logs();

        app()
            .oneshot(request(Method::GET, "/fails", ""))
            .await
            .unwrap();

        let text = logs.text();
        assert!(!text.contains("query="));
        assert!(!text.contains("params="));
        assert!(!text.contains("body="));
    }

    #[tokio::test]
    async fn test_cancelled_request_logs_aborted_end() {
        let (logs, _guard) = capture_logs();

        let call = app().oneshot(request(Method::GET, "/hang", ""));
        let result = tokio::time::timeout(Duration::from_millis(20), call).await;

        assert!(result.is_err());
        assert_eq!(logs.count("request started"), 1);
        assert_eq!(logs.count("request finished"), 1);
        let text = logs.text();
        assert!(text.contains("outcome=\"aborted\""));
        assert!(text.contains("status=500"));
    }

    #[tokio::test]
    async fn test_unreadable_body_still_logged_and_forwarded() {
        let (logs, _guard) = capture_logs();

        let oversized = "x".repeat(MAX_LOGGED_BODY_BYTES + 3_616);
        let req = Request::builder()
            .method(Method::POST)
            .uri("/echo")
            .header(header::CONTENT_LENGTH, 5)
            .body(Body::from(oversized))
            .unwrap();
        let response = app().oneshot(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(logs.count("request started"), 1);
        assert_eq!(logs.count("request finished"), 1);
        let text = logs.text();
        assert!(text.contains("Failed to read request body"));
        assert!(!text.contains("body=\""));
        assert!(text.contains("outcome=\"completed\""));
    }

    #[tokio::test]
    async fn test_dropped_before_start_emits_both_records() {
        let (logs, _guard) = capture_logs();

        let context = RequestContext {
            request_id: "req-1".to_string(),
            client_address: "10.0.0.1".to_string(),
            method: Method::POST,
            path: "/upload".to_string(),
            user_agent: None,
        };
        drop(RequestSpan::new(&context, None, None, None));

        assert_eq!(logs.count("request started"), 1);
        assert_eq!(logs.count("request finished"), 1);
        let text = logs.text();
        assert!(text.find("request started") < text.find("request finished"));
        assert!(text.contains("request ended before its body was read"));
        assert!(text.contains("outcome=\"aborted\""));
    }

    #[test]
    fn test_level_for_status() {
        assert_eq!(level_for(StatusCode::OK), Level::INFO);
        assert_eq!(level_for(StatusCode::TOO_MANY_REQUESTS), Level::WARN);
        assert_eq!(level_for(StatusCode::INTERNAL_SERVER_ERROR), Level::ERROR);
    }
}
