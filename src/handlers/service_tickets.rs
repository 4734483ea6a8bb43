// handlers/service_tickets.rs - /service-tickets endpoints
//
// Single assign/remove routes go through the ledger's strict link/unlink and
// fail on anything inconsistent. The two `edit` routes use the lenient bulk
// path and report what they skipped instead.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{cached, invalidate, json_body, MOST_ACTIVE, SERVICE_TICKETS};
use crate::cache::cache_key;
use crate::database::models::{NewServiceTicket, ServiceTicket};
use crate::error::ApiError;
use crate::ledger::{LedgerReport, PeerKind};
use crate::middleware::{ApiResponse, ApiResult, CachedJson};
use crate::state::AppState;

/// Body of the bulk edit routes
#[derive(Debug, Default, Deserialize)]
pub struct EditPeers {
    #[serde(default)]
    pub add_ids: Vec<i64>,
    #[serde(default)]
    pub remove_ids: Vec<i64>,
}

/// POST /service-tickets
pub async fn create(
    State(state): State<AppState>,
    payload: Result<Json<NewServiceTicket>, JsonRejection>,
) -> ApiResult<ServiceTicket> {
    let new = json_body(payload)?;
    new.validate()?;

    if state.store.get_customer(new.customer_id).await?.is_none() {
        return Err(ApiError::not_found("Customer not found."));
    }

    let ticket = state.store.create_ticket(new).await?;
    invalidate(&state, &[SERVICE_TICKETS, MOST_ACTIVE]);

    tracing::info!("opened service ticket {} for customer {}", ticket.id, ticket.customer_id);
    Ok(ApiResponse::created(ticket))
}

/// GET /service-tickets
pub async fn list(State(state): State<AppState>) -> Result<CachedJson, ApiError> {
    cached(&state, cache_key(SERVICE_TICKETS, []), || async {
        Ok::<_, ApiError>(state.store.list_tickets().await?)
    })
    .await
}

/// GET /service-tickets/:ticket_id
pub async fn show(State(state): State<AppState>, Path(ticket_id): Path<i64>) -> ApiResult<ServiceTicket> {
    let ticket = state
        .store
        .get_ticket(ticket_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Service ticket not found."))?;
    Ok(ApiResponse::success(ticket))
}

async fn link(state: &AppState, ticket_id: i64, peer_id: i64, kind: PeerKind) -> ApiResult<Value> {
    state.ledger.link(ticket_id, peer_id, kind).await?;
    invalidate(state, &[SERVICE_TICKETS, MOST_ACTIVE]);

    let peers = state.ledger.peers_of(ticket_id, kind).await?;
    Ok(ApiResponse::success(json!({
        "message": format!("{} {} assigned to ticket {}.", kind.label(), peer_id, ticket_id),
        "peers": peers,
    })))
}

async fn unlink(state: &AppState, ticket_id: i64, peer_id: i64, kind: PeerKind) -> ApiResult<Value> {
    state.ledger.unlink(ticket_id, peer_id, kind).await?;
    invalidate(state, &[SERVICE_TICKETS, MOST_ACTIVE]);

    let peers = state.ledger.peers_of(ticket_id, kind).await?;
    Ok(ApiResponse::success(json!({
        "message": format!("{} {} removed from ticket {}.", kind.label(), peer_id, ticket_id),
        "peers": peers,
    })))
}

async fn bulk_edit(
    state: &AppState,
    ticket_id: i64,
    payload: Result<Json<EditPeers>, JsonRejection>,
    kind: PeerKind,
) -> ApiResult<LedgerReport> {
    let edit = json_body(payload)?;
    let report = state
        .ledger
        .bulk_edit(ticket_id, &edit.add_ids, &edit.remove_ids, kind)
        .await?;
    invalidate(state, &[SERVICE_TICKETS, MOST_ACTIVE]);
    Ok(ApiResponse::success(report))
}

/// PUT /service-tickets/:ticket_id/assign-mechanic/:mechanic_id
pub async fn assign_mechanic(
    State(state): State<AppState>,
    Path((ticket_id, mechanic_id)): Path<(i64, i64)>,
) -> ApiResult<Value> {
    link(&state, ticket_id, mechanic_id, PeerKind::Mechanic).await
}

/// PUT /service-tickets/:ticket_id/remove-mechanic/:mechanic_id
pub async fn remove_mechanic(
    State(state): State<AppState>,
    Path((ticket_id, mechanic_id)): Path<(i64, i64)>,
) -> ApiResult<Value> {
    unlink(&state, ticket_id, mechanic_id, PeerKind::Mechanic).await
}

/// POST /service-tickets/:ticket_id/add-part/:part_id
pub async fn add_part(
    State(state): State<AppState>,
    Path((ticket_id, part_id)): Path<(i64, i64)>,
) -> ApiResult<Value> {
    link(&state, ticket_id, part_id, PeerKind::Part).await
}

/// PUT /service-tickets/:ticket_id/remove-part/:part_id
pub async fn remove_part(
    State(state): State<AppState>,
    Path((ticket_id, part_id)): Path<(i64, i64)>,
) -> ApiResult<Value> {
    unlink(&state, ticket_id, part_id, PeerKind::Part).await
}

/// PUT /service-tickets/:ticket_id/edit
pub async fn edit_mechanics(
    State(state): State<AppState>,
    Path(ticket_id): Path<i64>,
    payload: Result<Json<EditPeers>, JsonRejection>,
) -> ApiResult<LedgerReport> {
    bulk_edit(&state, ticket_id, payload, PeerKind::Mechanic).await
}

/// PUT /service-tickets/:ticket_id/edit-parts
pub async fn edit_parts(
    State(state): State<AppState>,
    Path(ticket_id): Path<i64>,
    payload: Result<Json<EditPeers>, JsonRejection>,
) -> ApiResult<LedgerReport> {
    bulk_edit(&state, ticket_id, payload, PeerKind::Part).await
}
