// handlers/mod.rs - HTTP handlers grouped by resource
//
// Each handler parses and validates its payload, calls the store or the ledger,
// invalidates the cached collections it touched, then renders the success
// envelope. Guards and rate limits are attached as route layers in `lib.rs`.

pub mod customers;
pub mod inventory;
pub mod mechanics;
pub mod service_tickets;

use std::future::Future;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::Query;
use axum::Json;
use serde::Serialize;

use crate::error::ApiError;
use crate::middleware::{envelope_bytes, CachedJson};
use crate::state::AppState;

// Cached collection prefixes
pub const CUSTOMERS: &str = "/customers";
pub const MECHANICS: &str = "/mechanics";
pub const MOST_ACTIVE: &str = "/mechanics/most-active";
pub const INVENTORY: &str = "/inventory";
pub const SERVICE_TICKETS: &str = "/service-tickets";

/// Unwrap a JSON payload, turning axum's rejection into our 400 body
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::invalid_json(rejection.body_text()))
}

/// Unwrap query parameters, same treatment as [`json_body`]
pub(crate) fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    query
        .map(|Query(value)| value)
        .map_err(|rejection| ApiError::bad_request(rejection.body_text()))
}

/// Serve `key` from the response cache, or run `load` and cache its envelope
pub(crate) async fn cached<T, F, Fut>(state: &AppState, key: String, load: F) -> Result<CachedJson, ApiError>
where
    T: Serialize,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    if let Some(body) = state.cache.get(&key) {
        tracing::debug!("cache hit {}", key);
        return Ok(CachedJson::hit(body));
    }

    tracing::debug!("cache miss {}", key);
    let seen = state.cache.generation();
    let data = load().await?;
    let body = envelope_bytes(&data)?;
    state.cache.set_if_fresh(key, body.clone(), state.list_ttl(), seen);
    Ok(CachedJson::miss(body))
}

/// Drop every cached read under each prefix
pub(crate) fn invalidate(state: &AppState, prefixes: &[&str]) {
    for prefix in prefixes {
        state.cache.invalidate_prefix(prefix);
    }
}
