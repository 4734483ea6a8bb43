pub mod auth;
pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod limiter;
pub mod middleware;
pub mod state;

use axum::{
    extract::State,
    http::StatusCode,
    middleware::from_fn_with_state,
    response::{IntoResponse, Json},
    routing::{get, post, put},
    Router,
};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::handlers::{customers, inventory, mechanics, service_tickets};
use crate::middleware::{rate_limit, require_identity, require_self, LimitedRoute};

pub use crate::state::AppState;

/// Full application router over `state`
pub fn app(state: AppState) -> Router {
    let mut router = Router::new()
        // Public
        .route("/", get(root))
        .route("/health", get(health))
        .merge(customer_routes(&state))
        .merge(mechanic_routes())
        .merge(inventory_routes())
        .merge(service_ticket_routes())
        .layer(TraceLayer::new_for_http());

    if state.config.security.enable_cors {
        router = router.layer(CorsLayer::permissive());
    }

    router.with_state(state)
}

fn customer_routes(state: &AppState) -> Router<AppState> {
    let limited = |route: LimitedRoute| from_fn_with_state((state.clone(), route), rate_limit);

    Router::new()
        .route(
            "/customers",
            get(customers::list)
                .merge(post(customers::create).route_layer(limited(LimitedRoute::CustomerCreate))),
        )
        .route(
            "/customers/login",
            post(customers::login).route_layer(limited(LimitedRoute::CustomerLogin)),
        )
        .route(
            "/customers/my-tickets",
            get(customers::my_tickets).route_layer(from_fn_with_state(state.clone(), require_identity)),
        )
        .route(
            "/customers/:id",
            get(customers::show).merge(
                put(customers::update)
                    .delete(customers::delete)
                    .route_layer(from_fn_with_state(state.clone(), require_self)),
            ),
        )
}

fn mechanic_routes() -> Router<AppState> {
    Router::new()
        .route("/mechanics", get(mechanics::list).post(mechanics::create))
        .route("/mechanics/most-active", get(mechanics::most_active))
        .route(
            "/mechanics/:id",
            get(mechanics::show).put(mechanics::update).delete(mechanics::delete),
        )
}

fn inventory_routes() -> Router<AppState> {
    Router::new()
        .route("/inventory", get(inventory::list).post(inventory::create))
        .route(
            "/inventory/:id",
            get(inventory::show).put(inventory::update).delete(inventory::delete),
        )
}

fn service_ticket_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/service-tickets",
            get(service_tickets::list).post(service_tickets::create),
        )
        .route("/service-tickets/:ticket_id", get(service_tickets::show))
        .route(
            "/service-tickets/:ticket_id/assign-mechanic/:mechanic_id",
            put(service_tickets::assign_mechanic),
        )
        .route(
            "/service-tickets/:ticket_id/remove-mechanic/:mechanic_id",
            put(service_tickets::remove_mechanic),
        )
        .route(
            "/service-tickets/:ticket_id/add-part/:part_id",
            post(service_tickets::add_part),
        )
        .route(
            "/service-tickets/:ticket_id/remove-part/:part_id",
            put(service_tickets::remove_part),
        )
        .route("/service-tickets/:ticket_id/edit", put(service_tickets::edit_mechanics))
        .route("/service-tickets/:ticket_id/edit-parts", put(service_tickets::edit_parts))
}

async fn root() -> Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    Json(json!({
        "success": true,
        "data": {
            "name": "Mechanic Shop API",
            "version": version,
            "endpoints": {
                "health": "/health (public)",
                "customers": "/customers[/:id], /customers/login, /customers/my-tickets (token)",
                "mechanics": "/mechanics[/:id], /mechanics/most-active",
                "inventory": "/inventory[/:id]",
                "service_tickets": "/service-tickets[/:ticket_id], assign/remove/edit sub-routes",
            }
        }
    }))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();

    match state.store.ping().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => {
            tracing::error!("health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "success": false,
                    "error": "database unavailable",
                    "data": {
                        "status": "degraded",
                        "timestamp": now
                    }
                })),
            )
        }
    }
}
