//! Single-value date parsing.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use super::report::ValidationErrors;
use crate::error::{AppError, AppResult};

/// Error name of a value that is present but not a date.
pub const INVALID_DATE_FORMAT: &str = "Invalid date format";

/// Parse an ISO 8601 date or date-time.
///
/// Accepts RFC 3339 (`2024-01-01T10:00:00Z`, `2024-01-01T10:00:00.5+02:00`),
/// a date-time without offset (taken as UTC) and a bare date (midnight UTC).
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Parser for one date-valued input such as a query parameter.
///
/// In optional mode an absent or empty value yields `Ok(None)`; a non-empty
/// value that is not a date always fails, in either mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseDate {
    field: &'static str,
    optional: bool,
}

impl ParseDate {
    pub const fn required(field: &'static str) -> Self {
        Self {
            field,
            optional: false,
        }
    }

    pub const fn optional(field: &'static str) -> Self {
        Self {
            field,
            optional: true,
        }
    }

    pub fn parse(&self, raw: Option<&str>) -> AppResult<Option<DateTime<Utc>>> {
        let raw = raw.map(str::trim).filter(|s| !s.is_empty());

        match raw {
            None if self.optional => Ok(None),
            None => Err(self.rejection(
                None,
                "isDefined",
                format!("{} should not be null or undefined", self.field),
            )),
            Some(value) => parse_datetime(value).map(Some).ok_or_else(|| {
                AppError::ValidationFailed(
                    ValidationErrors::single(
                        self.field,
                        Some(Value::String(value.to_owned())),
                        "isDateString",
                        format!("{} must be a valid ISO 8601 date string", self.field),
                    )
                    .with_kind(INVALID_DATE_FORMAT),
                )
            }),
        }
    }

    fn rejection(&self, value: Option<Value>, constraint: &'static str, message: String) -> AppError {
        AppError::ValidationFailed(ValidationErrors::single(
            self.field, value, constraint, message,
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_accepted_shapes() {
        let midnight = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        assert_eq!(parse_datetime("2024-01-01T00:00:00Z"), Some(midnight));
        assert_eq!(parse_datetime("2024-01-01T02:00:00+02:00"), Some(midnight));
        assert_eq!(parse_datetime("2024-01-01T00:00:00"), Some(midnight));
        assert_eq!(parse_datetime("2024-01-01"), Some(midnight));
        assert_eq!(parse_datetime(" 2024-01-01 "), Some(midnight));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for raw in ["not-a-date", "2024-13-01", "2024-02-30", "01/02/2024", ""] {
            assert_eq!(parse_datetime(raw), None, "{raw}");
        }
    }

    #[test]
    fn test_optional_empty_is_absent_every_time() {
        let parser = ParseDate::optional("date");

        assert_eq!(parser.parse(Some("")).unwrap(), None);
        assert_eq!(parser.parse(Some("")).unwrap(), None);
        assert_eq!(parser.parse(Some("   ")).unwrap(), None);
        assert_eq!(parser.parse(None).unwrap(), None);
    }

    #[test]
    fn test_optional_malformed_always_rejects() {
        let parser = ParseDate::optional("date");

        for _ in 0..2 {
            let err = parser.parse(Some("not-a-date")).unwrap_err();
            let AppError::ValidationFailed(errors) = err else {
                panic!("expected validation failure");
            };
            assert_eq!(errors.messages(), vec!["date must be a valid ISO 8601 date string"]);
            assert_eq!(errors.kind(), Some(INVALID_DATE_FORMAT));
        }
    }

    #[test]
    fn test_required_rejects_absent() {
        let parser = ParseDate::required("date");

        let Err(AppError::ValidationFailed(errors)) = parser.parse(None) else {
            panic!("expected validation failure");
        };
        assert_eq!(errors.kind(), None);
        assert!(parser.parse(Some("")).is_err());
        assert!(parser.parse(Some("2024-01-01")).unwrap().is_some());
    }
}
