mod common;

use anyhow::Result;
use axum::http::{header, Method, Request, StatusCode};
use axum::body::Body;
use chrono::{Duration, Utc};
use serde_json::json;

use common::TestApp;
use mechanic_shop::auth::Identity;

#[tokio::test]
async fn health_endpoint_responds() -> Result<()> {
    let app = TestApp::new();

    let res = app.get("/health").await?;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.data()["database"], "ok");

    let res = app.get("/").await?;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.body["success"], true);
    Ok(())
}

#[tokio::test]
async fn login_issues_token_for_valid_credentials() -> Result<()> {
    let app = TestApp::new();
    let id = app.create_customer("ana@example.com").await?;

    let res = app
        .send(
            Method::POST,
            "/customers/login",
            None,
            Some(json!({"email": "ana@example.com", "password": common::PASSWORD})),
        )
        .await?;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.data()["customer_id"], id);

    let token = res.data()["auth_token"].as_str().unwrap_or_default();
    assert_eq!(app.state.tokens.verify(token)?, Identity::new(id));
    Ok(())
}

#[tokio::test]
async fn login_rejects_bad_credentials() -> Result<()> {
    let app = TestApp::new();
    app.create_customer("ana@example.com").await?;

    for body in [
        json!({"email": "ana@example.com", "password": "wrong"}),
        json!({"email": "nobody@example.com", "password": common::PASSWORD}),
    ] {
        let res = app.send(Method::POST, "/customers/login", None, Some(body)).await?;
        assert_eq!(res.status, StatusCode::UNAUTHORIZED);
        assert_eq!(res.code(), "INVALID_CREDENTIALS");
    }
    Ok(())
}

#[tokio::test]
async fn protected_route_reports_token_state() -> Result<()> {
    let app = TestApp::new();
    let id = app.create_customer("ana@example.com").await?;

    let res = app.get("/customers/my-tickets").await?;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.code(), "TOKEN_MISSING");

    let res = app
        .request(
            Request::builder()
                .uri("/customers/my-tickets")
                .header(header::AUTHORIZATION, "Token abc.def.ghi")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.code(), "TOKEN_MALFORMED");

    let res = app.send(Method::GET, "/customers/my-tickets", Some("not-a-jwt"), None).await?;
    assert_eq!(res.code(), "TOKEN_MALFORMED");

    let stale = app
        .state
        .tokens
        .issue_at(Identity::new(id), Utc::now() - Duration::hours(2))?;
    let res = app.send(Method::GET, "/customers/my-tickets", Some(&stale.token), None).await?;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.code(), "TOKEN_EXPIRED");
    Ok(())
}

#[tokio::test]
async fn customer_may_only_modify_itself() -> Result<()> {
    let app = TestApp::new();
    let ana = app.create_customer("ana@example.com").await?;
    let bob = app.create_customer("bob@example.com").await?;
    let token = app.login("ana@example.com").await?;

    let res = app
        .send(
            Method::PUT,
            &format!("/customers/{}", bob),
            Some(&token),
            Some(json!({"name": "Hijacked"})),
        )
        .await?;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    let res = app.send(Method::DELETE, &format!("/customers/{}", bob), Some(&token), None).await?;
    assert_eq!(res.status, StatusCode::FORBIDDEN);

    let res = app.get(&format!("/customers/{}", bob)).await?;
    assert_eq!(res.data()["name"], "Test Customer");

    let res = app
        .send(
            Method::PUT,
            &format!("/customers/{}", ana),
            Some(&token),
            Some(json!({"name": "Ana Lima"})),
        )
        .await?;
    assert_eq!(res.status, StatusCode::OK);
    assert_eq!(res.data()["name"], "Ana Lima");
    assert_eq!(res.data()["email"], "ana@example.com");
    Ok(())
}

#[tokio::test]
async fn update_without_token_is_unauthorized() -> Result<()> {
    let app = TestApp::new();
    let ana = app.create_customer("ana@example.com").await?;

    let res = app
        .send(Method::PUT, &format!("/customers/{}", ana), None, Some(json!({"name": "x"})))
        .await?;
    assert_eq!(res.status, StatusCode::UNAUTHORIZED);
    assert_eq!(res.code(), "TOKEN_MISSING");
    Ok(())
}

#[tokio::test]
async fn token_of_deleted_customer_finds_nothing() -> Result<()> {
    let app = TestApp::new();
    let ana = app.create_customer("ana@example.com").await?;
    let token = app.login("ana@example.com").await?;

    let res = app.send(Method::DELETE, &format!("/customers/{}", ana), Some(&token), None).await?;
    assert_eq!(res.status, StatusCode::OK);

    let res = app.send(Method::GET, "/customers/my-tickets", Some(&token), None).await?;
    assert_eq!(res.status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn password_change_takes_effect() -> Result<()> {
    let app = TestApp::new();
    let ana = app.create_customer("ana@example.com").await?;
    let token = app.login("ana@example.com").await?;

    let res = app
        .send(
            Method::PUT,
            &format!("/customers/{}", ana),
            Some(&token),
            Some(json!({"password": "correct horse"})),
        )
        .await?;
    assert_eq!(res.status, StatusCode::OK);
    assert!(res.data().get("password_hash").is_none());

    let res = app
        .send(
            Method::POST,
            "/customers/login",
            None,
            Some(json!({"email": "ana@example.com", "password": "correct horse"})),
        )
        .await?;
    assert_eq!(res.status, StatusCode::OK);
    Ok(())
}
