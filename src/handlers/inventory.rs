// handlers/inventory.rs - /inventory endpoints

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use serde_json::{json, Value};

use super::{cached, invalidate, json_body, INVENTORY, SERVICE_TICKETS};
use crate::cache::cache_key;
use crate::database::models::{NewPart, Part, PartPatch};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, CachedJson};
use crate::state::AppState;

pub async fn create(
    State(state): State<AppState>,
    payload: Result<Json<NewPart>, JsonRejection>,
) -> ApiResult<Part> {
    let new = json_body(payload)?;
    new.validate()?;

    let part = state.store.create_part(new).await?;
    invalidate(&state, &[INVENTORY]);
    Ok(ApiResponse::created(part))
}

pub async fn list(State(state): State<AppState>) -> Result<CachedJson, ApiError> {
    cached(&state, cache_key(INVENTORY, []), || async {
        Ok::<_, ApiError>(state.store.list_parts().await?)
    })
    .await
}

pub async fn show(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Part> {
    let part = state
        .store
        .get_part(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Inventory item not found."))?;
    Ok(ApiResponse::success(part))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    payload: Result<Json<PartPatch>, JsonRejection>,
) -> ApiResult<Part> {
    let patch = json_body(payload)?;
    patch.validate()?;

    let part = state
        .store
        .update_part(id, patch)
        .await?
        .ok_or_else(|| ApiError::not_found("Inventory item not found."))?;
    invalidate(&state, &[INVENTORY]);
    Ok(ApiResponse::success(part))
}

pub async fn delete(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Value> {
    if !state.store.delete_part(id).await? {
        return Err(ApiError::not_found("Inventory item not found."));
    }
    invalidate(&state, &[INVENTORY, SERVICE_TICKETS]);

    Ok(ApiResponse::success(json!({
        "message": format!("Inventory item id: {} successfully deleted.", id)
    })))
}
