//! Example endpoints exercising every stage of the pipeline.
//!
//! # Endpoints
//!
//! - `GET /examples/dates/validate?date=` - Optional date; absent or empty gives `null`
//! - `POST /examples/dates/validate?date=` - Required date
//! - `POST /examples/users` - Body validation with nested objects and arrays
//! - `GET /examples/users?page=&limit=` - Query validation
//! - `GET /examples/users/{id}` - Path validation; there is no user store, so
//!   every lookup fails with 404
//! - `GET /examples/errors/{kind}` - Raises one failure of each category

use axum::Json;
use axum::http::{Method, StatusCode, Uri};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::error::{AppError, AppResult, FailureBody};
use crate::models::{
    CreateUserRequest, DateQuery, DateResponse, ErrorKindPath, ListUsersQuery, UserListResponse,
    UserPath, UserResponse,
};
use crate::validation::{ParseDate, ValidJson, ValidPath, ValidQuery};

const OPTIONAL_DATE: ParseDate = ParseDate::optional("date");
const REQUIRED_DATE: ParseDate = ParseDate::required("date");

/// Parse `?date=`, treating absence as `null`.
#[instrument(skip_all)]
pub async fn parse_optional_date(
    ValidQuery(query): ValidQuery<DateQuery>,
) -> AppResult<Json<DateResponse>> {
    let date = OPTIONAL_DATE.parse(query.date.as_deref())?;
    Ok(Json(DateResponse { date }))
}

/// Parse `?date=`, which must be present.
#[instrument(skip_all)]
pub async fn parse_required_date(
    ValidQuery(query): ValidQuery<DateQuery>,
) -> AppResult<Json<DateResponse>> {
    let date = REQUIRED_DATE.parse(query.date.as_deref())?;
    Ok(Json(DateResponse { date }))
}

#[instrument(skip_all)]
pub async fn create_user(
    ValidJson(req): ValidJson<CreateUserRequest>,
) -> (StatusCode, Json<UserResponse>) {
    let user = UserResponse::from(req);
    debug!(user_id = %user.id, "User accepted");
    (StatusCode::CREATED, Json(user))
}

#[instrument(skip_all)]
pub async fn list_users(ValidQuery(query): ValidQuery<ListUsersQuery>) -> Json<UserListResponse> {
    Json(UserListResponse {
        page: query.page,
        limit: query.limit,
        total: 0,
        items: Vec::new(),
    })
}

#[instrument(skip_all)]
pub async fn get_user(ValidPath(path): ValidPath<UserPath>) -> AppResult<Json<UserResponse>> {
    Err(AppError::not_found(format!("User {} not found", path.id)))
}

/// Runtime fault raised by `GET /examples/errors/fault`.
#[derive(Debug, Error)]
#[error("example runtime fault")]
pub struct ExampleFault;

#[instrument(skip_all)]
pub async fn trigger_error(
    ValidPath(path): ValidPath<ErrorKindPath>,
) -> AppResult<Json<serde_json::Value>> {
    let error = match path.kind.as_str() {
        "http" => AppError::http(
            StatusCode::CONFLICT,
            FailureBody::Text("Example declared failure".to_string()),
        ),
        "query" => AppError::QueryFailed("relation \"examples\" does not exist".to_string()),
        "fault" => AppError::fault(&ExampleFault),
        "panic" => panic!("example handler panic"),
        _ => AppError::Unknown,
    };
    Err(error)
}

/// Fallback for unmatched routes.
pub async fn route_not_found(method: Method, uri: Uri) -> AppError {
    AppError::not_found(format!("Cannot {method} {}", uri.path()))
}

/// Fallback for a matched path with an unsupported method.
pub async fn method_not_allowed(method: Method, uri: Uri) -> AppError {
    AppError::status(
        StatusCode::METHOD_NOT_ALLOWED,
        format!("Cannot {method} {}", uri.path()),
    )
}
