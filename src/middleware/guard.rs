use axum::{
    extract::{Path, Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};

use crate::auth::{AuthError, Identity, TokenCodec};
use crate::error::ApiError;
use crate::state::AppState;

/// Pull the raw token out of `Authorization: Bearer <token>`
pub fn extract_bearer(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers.get(AUTHORIZATION).ok_or(AuthError::MissingToken)?;

    let value = value
        .to_str()
        .map_err(|_| AuthError::MalformedToken("authorization header is not valid text".to_string()))?;

    let token = value
        .strip_prefix("Bearer ")
        .ok_or_else(|| AuthError::MalformedToken("authorization header must use the Bearer scheme".to_string()))?
        .trim();

    if token.is_empty() {
        return Err(AuthError::MalformedToken("empty bearer token".to_string()));
    }
    Ok(token)
}

/// Extract and verify, yielding the caller's identity
pub fn identify(codec: &TokenCodec, headers: &HeaderMap) -> Result<Identity, AuthError> {
    let token = extract_bearer(headers)?;
    codec.verify(token)
}

/// Self-scoped check: the caller may only act on its own resource
pub fn authorize(identity: Identity, owner_id: i64) -> Result<Identity, AuthError> {
    if identity.id() == owner_id {
        Ok(identity)
    } else {
        Err(AuthError::Forbidden { requested: owner_id })
    }
}

/// Identity-protected routes: rejects with 401 unless a valid token is
/// presented, then hands the `Identity` to the handler as an extension.
pub async fn require_identity(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = identify(&state.tokens, request.headers()).map_err(|e| {
        tracing::warn!("rejected {} {}: {}", request.method(), request.uri().path(), e);
        ApiError::from(e)
    })?;

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

/// Self-scoped routes (`/customers/:id`): like [`require_identity`], plus the
/// identity must match the `:id` path segment. A mismatch is 403 and the
/// handler never runs.
pub async fn require_self(
    State(state): State<AppState>,
    Path(owner_id): Path<i64>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let identity = identify(&state.tokens, request.headers())
        .and_then(|identity| authorize(identity, owner_id))
        .map_err(|e| {
            tracing::warn!("rejected {} {}: {}", request.method(), request.uri().path(), e);
            ApiError::from(e)
        })?;

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}
