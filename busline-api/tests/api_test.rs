use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use busline_api::{app, middleware::Claims, AppState, AuthConfig};
use busline_core::BookingRules;
use busline_store::{app_config::RateLimitConfig, Repositories};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use futures_util::StreamExt;
use std::time::Duration;
use tower::ServiceExt;

const SECRET: &str = "test-secret";

fn test_app() -> Router {
    let state = AppState::new(
        Repositories::in_memory(),
        BookingRules::default(),
        AuthConfig {
            secret: SECRET.to_string(),
        },
        None,
        RateLimitConfig::default(),
    );
    app(state)
}

fn token(sub: &str, role: &str) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        role: role.to_string(),
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

fn admin() -> String {
    token("admin-1", "ADMIN")
}

fn user(name: &str) -> String {
    token(name, "USER")
}

async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn create_crew(app: &Router) -> (String, String) {
    let token = admin();
    let (status, driver) = send(
        app,
        Method::POST,
        "/api/v1/employees",
        Some(&token),
        Some(json!({ "name": "Ravi", "role": "DRIVER", "contact_number": "0771234567" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, conductor) = send(
        app,
        Method::POST,
        "/api/v1/employees",
        Some(&token),
        Some(json!({ "name": "Nimal", "role": "CONDUCTOR" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    (
        driver["id"].as_str().unwrap().to_string(),
        conductor["id"].as_str().unwrap().to_string(),
    )
}

async fn create_bus(app: &Router, registration: &str, capacity: u32) -> String {
    let (driver_id, conductor_id) = create_crew(app).await;
    let (status, bus) = send(
        app,
        Method::POST,
        "/api/v1/buses",
        Some(&admin()),
        Some(json!({
            "bus_code": format!("BUS-{}", registration),
            "registration_number": registration,
            "model": "Lanka Ashok Leyland",
            "seat_capacity": capacity,
            "driver_id": driver_id,
            "conductor_id": conductor_id,
            "owner": "Southern Express",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", bus);
    bus["id"].as_str().unwrap().to_string()
}

const ROUTE_ID: &str = "6f1c2f8e-0f7a-4c43-9d4a-2f0d8f5f7a11";

async fn create_trip(app: &Router, bus_id: &str) -> String {
    let (status, trip) = send(
        app,
        Method::POST,
        &format!("/api/v1/buses/{}/trips", bus_id),
        Some(&admin()),
        Some(json!({
            "route_id": ROUTE_ID,
            "trip_date": "2025-06-01",
            "departure_time": "2025-06-01T08:00:00Z",
            "arrival_time": "2025-06-01T12:30:00Z",
            "price": 1500,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", trip);
    trip["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health_needs_no_token() {
    let app = test_app();
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_missing_or_bad_token_is_unauthorized() {
    let app = test_app();

    let (status, body) = send(&app, Method::GET, "/api/v1/buses", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["kind"], "AUTHENTICATION");

    let (status, _) = send(&app, Method::GET, "/api/v1/buses", Some("not-a-jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_users_cannot_manage_fleet() {
    let app = test_app();
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/buses",
        Some(&user("u1")),
        Some(json!({ "bus_code": "X" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "AUTHORIZATION");

    let (status, _) = send(&app, Method::GET, "/api/v1/employees", Some(&user("u1")), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_bus_registry_errors() {
    let app = test_app();
    let bus_id = create_bus(&app, "NB-1234", 40).await;

    let (driver_id, conductor_id) = create_crew(&app).await;
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/buses",
        Some(&admin()),
        Some(json!({
            "bus_code": "BUS-OTHER",
            "registration_number": "NB-1234",
            "model": "Tata",
            "seat_capacity": 30,
            "driver_id": driver_id,
            "conductor_id": conductor_id,
            "owner": "Other",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "UNIQUENESS");

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/buses",
        Some(&admin()),
        Some(json!({ "bus_code": "BUS-2", "registration_number": "NB-9" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "VALIDATION");

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/buses",
        Some(&admin()),
        Some(json!({ "bus_code": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/v1/buses/00000000-0000-0000-0000-000000000000",
        Some(&user("u1")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "NOT_FOUND");

    let (status, bus) = send(&app, Method::GET, &format!("/api/v1/buses/{}", bus_id), Some(&user("u1")), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bus["registration_number"], "NB-1234");
    assert_eq!(bus["driver"]["role"], "DRIVER");
}

#[tokio::test]
async fn test_update_and_list_buses() {
    let app = test_app();
    let bus_id = create_bus(&app, "NB-1", 40).await;

    let (status, bus) = send(
        &app,
        Method::PUT,
        &format!("/api/v1/buses/{}", bus_id),
        Some(&admin()),
        Some(json!({ "model": "Yutong" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bus["model"], "Yutong");
    assert_eq!(bus["seat_capacity"], 40);

    let (status, buses) = send(&app, Method::GET, "/api/v1/buses", Some(&user("u1")), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(buses.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_reservation_flow() {
    let app = test_app();
    let bus_id = create_bus(&app, "NB-4040", 40).await;
    let trip_id = create_trip(&app, &bus_id).await;

    let (status, seats) = send(
        &app,
        Method::GET,
        &format!("/api/v1/buses/seats?trip_schedule_id={}", trip_id),
        Some(&user("alice")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let seats = seats.as_array().unwrap();
    assert_eq!(seats.len(), 40);
    assert_eq!(seats[0]["seat_number"], 1);
    assert!(seats.iter().all(|s| s["is_reserved"] == false));

    let reserve_uri = format!("/api/v1/trips/{}/seats/12/reservation", trip_id);
    let (status, booking) = send(&app, Method::POST, &reserve_uri, Some(&user("alice")), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(booking["seat"]["reserved_by"], "alice");

    let (status, body) = send(&app, Method::POST, &reserve_uri, Some(&user("bob")), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "CONFLICT");

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/api/v1/trips/{}/seats/41/reservation", trip_id),
        Some(&user("bob")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let search_uri = format!("/api/v1/buses/search?route_id={}&date=2025-06-01", ROUTE_ID);
    let (status, results) = send(&app, Method::GET, &search_uri, Some(&user("bob")), None).await;
    assert_eq!(status, StatusCode::OK);
    let results = results.as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["total_seats"], 40);
    assert_eq!(results[0]["available_seats"], 39);

    // Someone else's seat cannot be released by a regular user.
    let (status, _) = send(&app, Method::DELETE, &reserve_uri, Some(&user("bob")), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, booking) = send(&app, Method::DELETE, &reserve_uri, Some(&user("alice")), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(booking["seat"]["is_reserved"], false);

    let (status, _) = send(&app, Method::DELETE, &format!("/api/v1/buses/{}", bus_id), Some(&admin()), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, results) = send(&app, Method::GET, &search_uri, Some(&user("bob")), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(results.as_array().unwrap().is_empty());

    let (status, _) = send(
        &app,
        Method::GET,
        &format!("/api/v1/buses/seats?trip_schedule_id={}", trip_id),
        Some(&user("bob")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_search_rejects_malformed_query() {
    let app = test_app();
    let (status, body) = send(
        &app,
        Method::GET,
        "/api/v1/buses/search?route_id=nope&date=2025-06-01",
        Some(&user("u1")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "VALIDATION");
}

#[tokio::test]
async fn test_stream_for_unknown_trip_is_not_found() {
    let app = test_app();
    let (status, _) = send(
        &app,
        Method::GET,
        "/api/v1/trips/00000000-0000-0000-0000-000000000000/stream",
        Some(&user("u1")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_stream_delivers_reservation_events() {
    let app = test_app();
    let bus_id = create_bus(&app, "NB-7000", 10).await;
    let trip_id = create_trip(&app, &bus_id).await;

    let request = Request::builder()
        .uri(format!("/api/v1/trips/{}/stream", trip_id))
        .header(header::AUTHORIZATION, format!("Bearer {}", user("watcher")))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let mut frames = response.into_body().into_data_stream();

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/api/v1/trips/{}/seats/2/reservation", trip_id),
        Some(&user("alice")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let frame = tokio::time::timeout(Duration::from_secs(2), frames.next())
        .await
        .expect("no event within timeout")
        .expect("stream ended")
        .unwrap();
    let text = String::from_utf8(frame.to_vec()).unwrap();

    assert!(text.contains("event: seat_reserved"), "{}", text);
    assert!(text.contains(&trip_id), "{}", text);
    assert!(text.contains("\"seat_number\":2"), "{}", text);
}

#[tokio::test]
async fn test_search_filters_by_return_flag() {
    let app = test_app();
    let bus_id = create_bus(&app, "NB-8000", 20).await;
    let outbound = create_trip(&app, &bus_id).await;

    let (status, inbound) = send(
        &app,
        Method::POST,
        &format!("/api/v1/buses/{}/trips", bus_id),
        Some(&admin()),
        Some(json!({
            "route_id": ROUTE_ID,
            "trip_date": "2025-06-01",
            "is_return_trip": true,
            "departure_time": "2025-06-01T15:00:00Z",
            "arrival_time": "2025-06-01T19:30:00Z",
            "price": 1500,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let inbound = inbound["id"].as_str().unwrap().to_string();

    let base = format!("/api/v1/buses/search?route_id={}&date=2025-06-01", ROUTE_ID);

    let (_, both) = send(&app, Method::GET, &base, Some(&user("u1")), None).await;
    assert_eq!(both.as_array().unwrap().len(), 2);

    let (status, returns) = send(&app, Method::GET, &format!("{}&is_return_trip=true", base), Some(&user("u1")), None).await;
    assert_eq!(status, StatusCode::OK);
    let returns = returns.as_array().unwrap();
    assert_eq!(returns.len(), 1);
    assert_eq!(returns[0]["trip_schedule_id"], inbound.as_str());
    assert_eq!(returns[0]["is_return_trip"], true);

    let (_, outbounds) = send(&app, Method::GET, &format!("{}&is_return_trip=false", base), Some(&user("u1")), None).await;
    let outbounds = outbounds.as_array().unwrap();
    assert_eq!(outbounds.len(), 1);
    assert_eq!(outbounds[0]["trip_schedule_id"], outbound.as_str());
}
