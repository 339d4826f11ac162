use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::validation::{Field, Kind, Rule, Schema, Validate};

/// Roles accepted by [`CreateUserRequest::role`].
pub const USER_ROLES: &[&str] = &["admin", "editor", "viewer"];

/// Kinds of failure `GET /examples/errors/{kind}` can trigger.
pub const ERROR_KINDS: &[&str] = &["http", "query", "fault", "unknown", "panic"];

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

// =============================================================================
// Dates
// =============================================================================

/// Query of `/examples/dates/validate`.
#[derive(Debug, Deserialize)]
pub struct DateQuery {
    #[serde(default)]
    pub date: Option<String>,
}

static DATE_QUERY: LazyLock<Schema> =
    LazyLock::new(|| Schema::new().field(Field::string("date").optional()));

impl Validate for DateQuery {
    fn schema() -> &'static Schema {
        &DATE_QUERY
    }
}

/// Result of a date parse; `date` is `null` when the optional value was absent.
#[derive(Debug, Serialize, Deserialize)]
pub struct DateResponse {
    pub date: Option<DateTime<Utc>>,
}

// =============================================================================
// Users
// =============================================================================

/// Postal address nested in [`CreateUserRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub city: String,
    #[serde(default)]
    pub zip: Option<String>,
}

/// Request to create a user.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    /// Display name, 2 to 50 characters
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub age: Option<u32>,
    /// One of [`USER_ROLES`]
    pub role: String,
    #[serde(default)]
    pub address: Option<Address>,
    /// Up to 10 tags of at most 20 characters
    #[serde(default)]
    pub tags: Vec<String>,
}

static CREATE_USER: LazyLock<Schema> = LazyLock::new(|| {
    let address = Schema::new()
        .field(Field::string("street").rule(Rule::NotBlank))
        .field(Field::string("city").rule(Rule::NotBlank))
        .field(Field::string("zip").optional().rule(Rule::MaxLength(10)));

    Schema::new()
        .field(
            Field::string("name")
                .rule(Rule::NotBlank)
                .rule(Rule::MinLength(2))
                .rule(Rule::MaxLength(50)),
        )
        .field(Field::string("email").rule(Rule::Email))
        .field(
            Field::integer("age")
                .optional()
                .rule(Rule::Min(0.0))
                .rule(Rule::Max(150.0)),
        )
        .field(Field::string("role").rule(Rule::OneOf(USER_ROLES)))
        .field(Field::object("address", address).optional())
        .field(
            Field::array("tags", Kind::String)
                .optional()
                .rule(Rule::MaxItems(10))
                .each(Rule::MaxLength(20)),
        )
});

impl Validate for CreateUserRequest {
    fn schema() -> &'static Schema {
        &CREATE_USER
    }
}

/// A user as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub age: Option<u32>,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub address: Option<Address>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl From<CreateUserRequest> for UserResponse {
    fn from(req: CreateUserRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: req.name,
            email: req.email,
            age: req.age,
            role: req.role,
            address: req.address,
            tags: req.tags,
            created_at: Utc::now(),
        }
    }
}

/// Paging query of `GET /examples/users`.
#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub limit: u32,
}

fn default_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

static LIST_USERS: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new()
        .field(Field::integer("page").optional().rule(Rule::Min(1.0)))
        .field(
            Field::integer("limit")
                .optional()
                .rule(Rule::Min(1.0))
                .rule(Rule::Max(f64::from(MAX_PAGE_SIZE))),
        )
});

impl Validate for ListUsersQuery {
    fn schema() -> &'static Schema {
        &LIST_USERS
    }
}

/// One page of users.
#[derive(Debug, Serialize, Deserialize)]
pub struct UserListResponse {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub items: Vec<UserResponse>,
}

/// Path of `GET /examples/users/{id}`.
#[derive(Debug, Deserialize)]
pub struct UserPath {
    pub id: u64,
}

static USER_PATH: LazyLock<Schema> =
    LazyLock::new(|| Schema::new().field(Field::integer("id").rule(Rule::Min(1.0))));

impl Validate for UserPath {
    fn schema() -> &'static Schema {
        &USER_PATH
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Path of `GET /examples/errors/{kind}`.
#[derive(Debug, Deserialize)]
pub struct ErrorKindPath {
    pub kind: String,
}

static ERROR_KIND_PATH: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new().field(Field::string("kind").rule(Rule::OneOf(ERROR_KINDS)))
});

impl Validate for ErrorKindPath {
    fn schema() -> &'static Schema {
        &ERROR_KIND_PATH
    }
}

// =============================================================================
// Health
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service health status
    pub status: String,
    /// Service version
    pub version: String,
    /// Deployment environment
    pub environment: String,
    /// Seconds since startup
    pub uptime_seconds: u64,
    /// Current timestamp
    pub timestamp: DateTime<Utc>,
}
