//! Request validation and coercion.
//!
//! Handlers receive input through the extractors in [`extract`]. Each target
//! type declares a [`Schema`] via [`Validate`]; the raw JSON, query or path
//! values are checked against it before being deserialized, so a handler only
//! ever sees input that passed every constraint.
//!
//! # Policy
//!
//! - Undeclared properties are rejected, never silently dropped.
//! - Values are coerced to the declared kind before constraints run.
//! - All violations across the input are reported together.

mod date;
mod extract;
mod report;
mod schema;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{AppError, AppResult};

pub use date::{INVALID_DATE_FORMAT, ParseDate, parse_datetime};
pub use extract::{ValidJson, ValidPath, ValidQuery};
pub(crate) use extract::collect_pairs;
pub use report::{FieldViolation, ValidationErrors, ValidationReport, Violation};
pub use schema::{Field, Kind, Rule, Schema};

/// A type that can be built from validated input.
///
/// The schema must describe exactly the fields the type deserializes, using
/// the same names.
pub trait Validate: DeserializeOwned {
    fn schema() -> &'static Schema;
}

/// Check `input` against `T`'s schema and deserialize the coerced result.
///
/// # Errors
///
/// [`AppError::ValidationFailed`] with every violation found. A schema that
/// passes but does not match `T` surfaces as a sanitized 400.
pub fn validate<T: Validate>(input: &Map<String, Value>) -> AppResult<T> {
    let checked = T::schema().check(input).map_err(AppError::ValidationFailed)?;
    Ok(serde_json::from_value(Value::Object(checked))?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::LazyLock;

    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Page {
        page: u32,
        #[serde(default)]
        tag: Option<String>,
    }

    static PAGE: LazyLock<Schema> = LazyLock::new(|| {
        Schema::new()
            .field(Field::integer("page").rule(Rule::Min(1.0)))
            .field(Field::string("tag").optional())
    });

    impl Validate for Page {
        fn schema() -> &'static Schema {
            &PAGE
        }
    }

    #[test]
    fn test_validate_coerces_then_deserializes() {
        let input = json!({"page": "3"});
        let page: Page = validate(input.as_object().unwrap()).unwrap();

        assert_eq!(page, Page { page: 3, tag: None });
    }

    #[test]
    fn test_validate_reports_violations() {
        let input = json!({"page": 0, "extra": 1});
        let err = validate::<Page>(input.as_object().unwrap()).unwrap_err();

        let AppError::ValidationFailed(errors) = err else {
            panic!("expected validation failure");
        };
        assert_eq!(errors.flatten().len(), 2);
    }
}
