use axum::{
    body::Bytes,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::ApiError;

/// Wrapper for API responses that automatically adds success envelope
#[derive(Debug)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub status_code: Option<StatusCode>,
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a successful API response with default 200 status
    pub fn success(data: T) -> Self {
        Self {
            data,
            status_code: None, // Default to 200 OK
        }
    }

    /// Create an API response with custom status code
    pub fn with_status(data: T, status_code: StatusCode) -> Self {
        Self {
            data,
            status_code: Some(status_code),
        }
    }

    /// Create a 201 Created response
    pub fn created(data: T) -> Self {
        Self::with_status(data, StatusCode::CREATED)
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = self.status_code.unwrap_or(StatusCode::OK);

        // Convert data to JSON Value for consistent envelope format
        let data_value = match serde_json::to_value(&self.data) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("Failed to serialize response data: {}", e);
                return ApiError::internal_server_error("Failed to serialize response data").into_response();
            }
        };

        (status, Json(envelope_value(data_value))).into_response()
    }
}

fn envelope_value(data: Value) -> Value {
    json!({
        "success": true,
        "data": data
    })
}

/// Serialize `data` inside the success envelope, ready to be cached
pub fn envelope_bytes<T: Serialize>(data: &T) -> Result<Bytes, ApiError> {
    serde_json::to_value(data)
        .and_then(|value| serde_json::to_vec(&envelope_value(value)))
        .map(Bytes::from)
        .map_err(|e| {
            tracing::error!("Failed to serialize response data: {}", e);
            ApiError::internal_server_error("Failed to serialize response data")
        })
}

/// A pre-serialized envelope, tagged with `x-cache: HIT|MISS`
#[derive(Debug, Clone)]
pub struct CachedJson {
    body: Bytes,
    hit: bool,
}

impl CachedJson {
    pub fn hit(body: Bytes) -> Self {
        Self { body, hit: true }
    }

    pub fn miss(body: Bytes) -> Self {
        Self { body, hit: false }
    }

    pub fn is_hit(&self) -> bool {
        self.hit
    }
}

impl IntoResponse for CachedJson {
    fn into_response(self) -> Response {
        let marker = if self.hit { "HIT" } else { "MISS" };
        (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, HeaderValue::from_static("application/json")),
                (header::HeaderName::from_static("x-cache"), HeaderValue::from_static(marker)),
            ],
            self.body,
        )
            .into_response()
    }
}

// Convenience type aliases
pub type ApiResult<T> = Result<ApiResponse<T>, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_bytes_wraps_data() {
        let bytes = envelope_bytes(&vec![1, 2, 3]).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value, json!({"success": true, "data": [1, 2, 3]}));
    }

    #[test]
    fn test_cached_json_marks_hits() {
        let response = CachedJson::hit(Bytes::from_static(b"{}")).into_response();
        assert_eq!(response.headers()["x-cache"], "HIT");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    }
}
