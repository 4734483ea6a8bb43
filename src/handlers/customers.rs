// handlers/customers.rs - /customers endpoints

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{cached, invalidate, json_body, query_params, CUSTOMERS, MOST_ACTIVE, SERVICE_TICKETS};
use crate::auth::{password::verify_password, Identity};
use crate::cache::cache_key;
use crate::database::models::{Customer, CustomerPatch, NewCustomer, Page, ServiceTicket};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, CachedJson};
use crate::state::AppState;

const EMAIL_TAKEN: &str = "Email already associated with an account.";

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub auth_token: String,
    pub expires_at: DateTime<Utc>,
    pub customer_id: i64,
}

/// POST /customers
pub async fn create(
    State(state): State<AppState>,
    payload: Result<Json<NewCustomer>, JsonRejection>,
) -> ApiResult<Customer> {
    let new = json_body(payload)?;
    new.validate()?;

    if state.store.find_customer_by_email(&new.email).await?.is_some() {
        return Err(ApiError::bad_request(EMAIL_TAKEN));
    }

    let new = new.with_hashed_password(state.config.security.password_hash_cost)?;
    let customer = state.store.create_customer(new).await?;
    invalidate(&state, &[CUSTOMERS]);

    tracing::info!("created customer {}", customer.id);
    Ok(ApiResponse::created(customer))
}

/// GET /customers?page=&per_page=
pub async fn list(
    State(state): State<AppState>,
    page: Result<Query<Page>, QueryRejection>,
) -> Result<CachedJson, ApiError> {
    let page = query_params(page)?.normalized();
    let (page_no, per_page) = (page.page.to_string(), page.per_page.to_string());
    let key = cache_key(CUSTOMERS, [("page", page_no.as_str()), ("per_page", per_page.as_str())]);

    cached(&state, key, || async {
        Ok::<_, ApiError>(state.store.list_customers(page).await?)
    })
    .await
}

/// GET /customers/:id
pub async fn show(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Customer> {
    let customer = state
        .store
        .get_customer(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Customer not found."))?;
    Ok(ApiResponse::success(customer))
}

/// PUT /customers/:id (self only)
pub async fn update(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
    payload: Result<Json<CustomerPatch>, JsonRejection>,
) -> ApiResult<Customer> {
    let patch = json_body(payload)?;
    patch.validate()?;

    if let Some(email) = &patch.email {
        if let Some(other) = state.store.find_customer_by_email(email).await? {
            if other.id != id {
                return Err(ApiError::bad_request(EMAIL_TAKEN));
            }
        }
    }

    let patch = patch.with_hashed_password(state.config.security.password_hash_cost)?;
    let customer = state
        .store
        .update_customer(id, patch)
        .await?
        .ok_or_else(|| ApiError::not_found("Customer not found."))?;
    invalidate(&state, &[CUSTOMERS]);

    tracing::info!("customer {} updated their profile", identity);
    Ok(ApiResponse::success(customer))
}

/// DELETE /customers/:id (self only). Takes the customer's tickets with it.
pub async fn delete(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<i64>,
) -> ApiResult<Value> {
    if !state.store.delete_customer(id).await? {
        return Err(ApiError::not_found("Customer not found."));
    }
    invalidate(&state, &[CUSTOMERS, SERVICE_TICKETS, MOST_ACTIVE]);

    tracing::info!("customer {} deleted their account", identity);
    Ok(ApiResponse::success(json!({
        "message": format!("Customer id: {} successfully deleted.", id)
    })))
}

/// POST /customers/login
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<LoginResponse> {
    let credentials = json_body(payload)?;

    let customer = state.store.find_customer_by_email(&credentials.email).await?;
    let customer = match customer {
        Some(c) if verify_password(&credentials.password, &c.password_hash) => c,
        _ => {
            tracing::warn!("failed login for {}", credentials.email);
            return Err(ApiError::unauthorized("Invalid email or password!", "INVALID_CREDENTIALS"));
        }
    };

    let issued = state.tokens.issue(Identity::new(customer.id))?;
    Ok(ApiResponse::success(LoginResponse {
        auth_token: issued.token,
        expires_at: issued.expires_at,
        customer_id: customer.id,
    }))
}

/// GET /customers/my-tickets (identity required, never cached)
pub async fn my_tickets(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> ApiResult<Vec<ServiceTicket>> {
    // A token can outlive its customer
    if state.store.get_customer(identity.id()).await?.is_none() {
        return Err(ApiError::not_found("Customer not found."));
    }

    let tickets = state.store.tickets_for_customer(identity.id()).await?;
    Ok(ApiResponse::success(tickets))
}
