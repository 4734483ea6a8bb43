// handlers/mechanics.rs - /mechanics endpoints

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{cached, invalidate, json_body, query_params, MECHANICS, MOST_ACTIVE, SERVICE_TICKETS};
use crate::cache::cache_key;
use crate::database::models::{Mechanic, MechanicPatch, NewMechanic};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, CachedJson};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MostActiveQuery {
    #[serde(default = "MostActiveQuery::default_limit")]
    pub limit: u32,
}

impl MostActiveQuery {
    const MAX_LIMIT: u32 = 50;

    fn default_limit() -> u32 {
        5
    }
}

/// POST /mechanics
pub async fn create(
    State(state): State<AppState>,
    payload: Result<Json<NewMechanic>, JsonRejection>,
) -> ApiResult<Mechanic> {
    let new = json_body(payload)?;
    new.validate()?;

    if state.store.find_mechanic_by_email(&new.email).await?.is_some() {
        return Err(ApiError::bad_request("Email already associated with an account."));
    }

    let mechanic = state.store.create_mechanic(new).await?;
    invalidate(&state, &[MECHANICS]);

    tracing::info!("created mechanic {}", mechanic.id);
    Ok(ApiResponse::created(mechanic))
}

/// GET /mechanics
pub async fn list(State(state): State<AppState>) -> Result<CachedJson, ApiError> {
    cached(&state, cache_key(MECHANICS, []), || async {
        Ok::<_, ApiError>(state.store.list_mechanics().await?)
    })
    .await
}

/// GET /mechanics/most-active?limit=
pub async fn most_active(
    State(state): State<AppState>,
    query: Result<Query<MostActiveQuery>, QueryRejection>,
) -> Result<CachedJson, ApiError> {
    let query = query_params(query)?;
    let limit = query.limit.clamp(1, MostActiveQuery::MAX_LIMIT);
    let limit_param = limit.to_string();
    let key = cache_key(MOST_ACTIVE, [("limit", limit_param.as_str())]);

    cached(&state, key, || async {
        Ok::<_, ApiError>(state.store.most_active_mechanics(limit).await?)
    })
    .await
}

/// GET /mechanics/:id
pub async fn show(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Mechanic> {
    let mechanic = state
        .store
        .get_mechanic(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Mechanic not found."))?;
    Ok(ApiResponse::success(mechanic))
}

/// PUT /mechanics/:id
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    payload: Result<Json<MechanicPatch>, JsonRejection>,
) -> ApiResult<Mechanic> {
    let patch = json_body(payload)?;
    patch.validate()?;

    if let Some(email) = &patch.email {
        if let Some(other) = state.store.find_mechanic_by_email(email).await? {
            if other.id != id {
                return Err(ApiError::bad_request("Email already associated with an account."));
            }
        }
    }

    let mechanic = state
        .store
        .update_mechanic(id, patch)
        .await?
        .ok_or_else(|| ApiError::not_found("Mechanic not found."))?;
    invalidate(&state, &[MECHANICS]);

    Ok(ApiResponse::success(mechanic))
}

/// DELETE /mechanics/:id
pub async fn delete(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Value> {
    if !state.store.delete_mechanic(id).await? {
        return Err(ApiError::not_found("Mechanic not found."));
    }
    invalidate(&state, &[MECHANICS, SERVICE_TICKETS]);

    tracing::info!("deleted mechanic {}", id);
    Ok(ApiResponse::success(json!({
        "message": format!("Mechanic id: {} successfully deleted.", id)
    })))
}
