//! Validating extractors.

use axum::Json;
use axum::extract::{FromRequest, FromRequestParts, Query, RawPathParams, Request};
use axum::http::request::Parts;
use serde_json::{Map, Value};

use super::{Validate, validate};
use crate::error::AppError;

/// JSON body validated against `T`'s schema.
#[derive(Debug, Clone)]
pub struct ValidJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidJson<T>
where
    T: Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(body) = Json::<Value>::from_request(req, state).await?;
        let Value::Object(map) = body else {
            return Err(AppError::bad_request("Request body must be a JSON object"));
        };
        validate(&map).map(ValidJson)
    }
}

/// Query string validated against `T`'s schema.
///
/// Every value arrives as a string and is coerced by the schema. A key that
/// appears more than once becomes an array.
#[derive(Debug, Clone)]
pub struct ValidQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ValidQuery<T>
where
    T: Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Query(pairs) = Query::<Vec<(String, String)>>::try_from_uri(&parts.uri)?;
        validate(&collect_pairs(pairs)).map(ValidQuery)
    }
}

/// Path parameters validated against `T`'s schema.
#[derive(Debug, Clone)]
pub struct ValidPath<T>(pub T);

impl<T, S> FromRequestParts<S> for ValidPath<T>
where
    T: Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let params = RawPathParams::from_request_parts(parts, state).await?;
        let pairs = params
            .iter()
            .map(|(key, value)| (key.to_owned(), value.to_owned()));
        validate(&collect_pairs(pairs)).map(ValidPath)
    }
}

pub(crate) fn collect_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, value) in pairs {
        let value = Value::String(value);
        match map.get_mut(&key) {
            Some(Value::Array(values)) => values.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                map.insert(key, value);
            }
        }
    }
    map
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_repeated_keys_become_array() {
        let map = collect_pairs([
            ("tag".to_string(), "a".to_string()),
            ("page".to_string(), "2".to_string()),
            ("tag".to_string(), "b".to_string()),
            ("tag".to_string(), "c".to_string()),
        ]);

        assert_eq!(Value::Object(map), json!({"tag": ["a", "b", "c"], "page": "2"}));
    }
}
