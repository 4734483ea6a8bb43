#![allow(dead_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use mechanic_shop::config::AppConfig;
use mechanic_shop::database::MemoryShopStore;
use mechanic_shop::{app, AppState};

pub const PASSWORD: &str = "hunter22";

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn data(&self) -> &Value {
        &self.body["data"]
    }

    pub fn code(&self) -> &str {
        self.body["code"].as_str().unwrap_or_default()
    }

    pub fn cache_marker(&self) -> Option<&str> {
        self.headers.get("x-cache").and_then(|v| v.to_str().ok())
    }
}

/// The full router over a fresh in-memory store
pub struct TestApp {
    pub state: AppState,
    router: Router,
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::development();
    config.database.use_memory_store = true;
    config
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let state = AppState::new(config, Arc::new(MemoryShopStore::new())).expect("test state");
        let router = app(state.clone());
        Self { state, router }
    }

    pub async fn request(&self, request: Request<Body>) -> Result<TestResponse> {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .context("router call failed")?;

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .with_context(|| format!("non-JSON body: {}", String::from_utf8_lossy(&bytes)))?
        };

        Ok(TestResponse { status, headers, body })
    }

    /// Send `body` as JSON, with an optional bearer token
    pub async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Result<TestResponse> {
        self.send_as("127.0.0.1", method, uri, token, body).await
    }

    /// Same as [`send`](Self::send), from a given client address
    pub async fn send_as(
        &self,
        client: &str,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<TestResponse> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-forwarded-for", client);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body)?))?,
            None => builder.body(Body::empty())?,
        };
        self.request(request).await
    }

    pub async fn get(&self, uri: &str) -> Result<TestResponse> {
        self.send(Method::GET, uri, None, None).await
    }

    /// Seeds come from their own client address so they never use up the
    /// signup budget of the address a test is exercising.
    pub async fn create_customer(&self, email: &str) -> Result<i64> {
        let res = self
            .send_as(
                &format!("seed-{}", email),
                Method::POST,
                "/customers",
                None,
                Some(json!({
                    "name": "Test Customer",
                    "email": email,
                    "phone": "555-0100",
                    "password": PASSWORD,
                })),
            )
            .await?;
        anyhow::ensure!(res.status == StatusCode::CREATED, "create customer: {} {}", res.status, res.body);
        res.data()["id"].as_i64().context("customer id")
    }

    pub async fn login(&self, email: &str) -> Result<String> {
        let res = self
            .send(
                Method::POST,
                "/customers/login",
                None,
                Some(json!({ "email": email, "password": PASSWORD })),
            )
            .await?;
        anyhow::ensure!(res.status == StatusCode::OK, "login: {} {}", res.status, res.body);
        Ok(res.data()["auth_token"].as_str().context("auth_token")?.to_string())
    }

    pub async fn create_mechanic(&self, email: &str) -> Result<i64> {
        let res = self
            .send(
                Method::POST,
                "/mechanics",
                None,
                Some(json!({
                    "name": "Test Mechanic",
                    "email": email,
                    "phone": "555-0200",
                    "salary": 52000.0,
                })),
            )
            .await?;
        anyhow::ensure!(res.status == StatusCode::CREATED, "create mechanic: {} {}", res.status, res.body);
        res.data()["id"].as_i64().context("mechanic id")
    }

    pub async fn create_part(&self, name: &str, price: f64) -> Result<i64> {
        let res = self
            .send(Method::POST, "/inventory", None, Some(json!({ "name": name, "price": price })))
            .await?;
        anyhow::ensure!(res.status == StatusCode::CREATED, "create part: {} {}", res.status, res.body);
        res.data()["id"].as_i64().context("part id")
    }

    pub async fn create_ticket(&self, customer_id: i64) -> Result<i64> {
        let res = self
            .send(
                Method::POST,
                "/service-tickets",
                None,
                Some(json!({
                    "VIN": "1HGCM82633A004352",
                    "service_date": "2024-05-01",
                    "service_desc": "Brake pads",
                    "customer_id": customer_id,
                })),
            )
            .await?;
        anyhow::ensure!(res.status == StatusCode::CREATED, "create ticket: {} {}", res.status, res.body);
        res.data()["id"].as_i64().context("ticket id")
    }
}
