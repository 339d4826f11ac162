pub mod examples;
mod health;

pub use examples::{
    create_user, get_user, list_users, method_not_allowed, parse_optional_date,
    parse_required_date, route_not_found, trigger_error,
};
pub use health::{health_check, readiness_check};
