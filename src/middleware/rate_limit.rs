use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};

use crate::config::RateLimitConfig;
use crate::error::ApiError;
use crate::limiter::{rate_key, RateRule};
use crate::state::AppState;

/// Routes with their own admission budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitedRoute {
    CustomerCreate,
    CustomerLogin,
}

impl LimitedRoute {
    pub fn id(&self) -> &'static str {
        match self {
            LimitedRoute::CustomerCreate => "POST /customers",
            LimitedRoute::CustomerLogin => "POST /customers/login",
        }
    }

    pub fn rule(&self, limits: &RateLimitConfig) -> RateRule {
        match self {
            LimitedRoute::CustomerCreate => limits.customer_create,
            LimitedRoute::CustomerLogin => limits.customer_login,
        }
    }
}

/// Peer address when served with connect info, else the first
/// `X-Forwarded-For` hop, else a shared `unknown` bucket.
pub fn client_address(request: &Request) -> String {
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }

    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit(
    State((state, route)): State<(AppState, LimitedRoute)>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let limits = &state.config.rate_limits;
    if !limits.enabled {
        return Ok(next.run(request).await);
    }

    let rule = route.rule(limits);
    let client = client_address(&request);
    let key = rate_key(&client, route.id());

    if !state.limiter.admit_rule(&key, rule) {
        tracing::warn!("rate limit exceeded for {} on {}", client, route.id());
        return Err(ApiError::too_many_requests(format!(
            "Rate limit exceeded: {} per {} second(s)",
            rule.requests, rule.window_secs
        )));
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http;

    #[test]
    fn test_client_address_prefers_connect_info() {
        let mut request = http::Request::builder()
            .header("x-forwarded-for", "10.0.0.9")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_address(&request), "10.0.0.9");

        let addr: SocketAddr = "192.168.1.4:5123".parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        assert_eq!(client_address(&request), "192.168.1.4");
    }

    #[test]
    fn test_forwarded_chain_uses_first_hop() {
        let request = http::Request::builder()
            .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_address(&request), "203.0.113.7");
    }

    #[test]
    fn test_no_address_shares_bucket() {
        let request = http::Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_address(&request), "unknown");
    }
}
