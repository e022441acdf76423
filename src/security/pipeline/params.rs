use axum::{
    body::Body,
    extract::Request,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value};

use super::API_PREFIX;

pub const MAX_PARAMS_BODY: usize = 1024 * 1024;

pub type Params = Map<String, Value>;

/// JSON object body of an API POST. The body stays readable downstream.
///
/// # Errors
/// Answers 413 when the body exceeds [`MAX_PARAMS_BODY`].
pub async fn decode(request: Request) -> Result<(Request, Params), Response> {
    if request.method() != Method::POST || !request.uri().path().starts_with(API_PREFIX) {
        return Ok((request, Params::new()));
    }
    let declared = request
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());
    if declared.is_some_and(|length| length > MAX_PARAMS_BODY) {
        return Err(StatusCode::PAYLOAD_TOO_LARGE.into_response());
    }

    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_PARAMS_BODY)
        .await
        .map_err(|_| StatusCode::PAYLOAD_TOO_LARGE.into_response())?;
    let params = match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => map,
        _ => Params::new(),
    };
    Ok((Request::from_parts(parts, Body::from(bytes)), params))
}

/// Truthiness of a loosely typed parameter.
#[must_use]
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
