use axum::{
    http::Method,
    middleware::from_fn_with_state,
    routing::{get, post, put},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod buses;
pub mod employees;
pub mod error;
pub mod middleware;
pub mod search;
pub mod state;
pub mod trips;

pub use error::AppError;
pub use state::{AppState, AuthConfig};

use middleware::{admin_auth_middleware, rate_limit_middleware, user_auth_middleware};

/// Fleet and crew management.
fn admin_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/buses", post(buses::create_bus))
        .route("/buses/{id}", put(buses::update_bus).delete(buses::delete_bus))
        .route("/buses/{id}/trips", post(buses::create_trip_schedule))
        .route(
            "/employees",
            post(employees::create_employee).get(employees::list_employees),
        )
        .route("/employees/{id}", get(employees::get_employee))
        .route_layer(from_fn_with_state(state, admin_auth_middleware))
}

/// Browsing, search and bookings for any signed-in user.
fn user_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/buses", get(buses::list_buses))
        .route("/buses/search", get(search::search_available_buses))
        .route("/buses/seats", get(search::get_seats_for_trip))
        .route("/buses/{id}", get(buses::get_bus))
        .route(
            "/trips/{trip_id}/seats/{seat_number}/reservation",
            post(trips::reserve_seat).delete(trips::release_seat),
        )
        .route("/trips/{trip_id}/stream", get(trips::stream_seat_events))
        .route_layer(from_fn_with_state(state, user_auth_middleware))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    let api = admin_routes(state.clone()).merge(user_routes(state.clone()));

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(from_fn_with_state(state.clone(), rate_limit_middleware))
        .with_state(state)
}
