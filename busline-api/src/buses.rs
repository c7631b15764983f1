use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use busline_core::{Bus, BusUpdate, BusView, NewBus, NewTripSchedule, TripSchedule};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

/// POST /api/v1/buses
pub async fn create_bus(
    State(state): State<AppState>,
    payload: Result<Json<NewBus>, JsonRejection>,
) -> Result<(StatusCode, Json<Bus>), AppError> {
    let Json(req) = payload?;
    let bus = state.service.create_bus(req).await?;
    Ok((StatusCode::CREATED, Json(bus)))
}

/// PUT /api/v1/buses/{id}
pub async fn update_bus(
    State(state): State<AppState>,
    Path(bus_id): Path<Uuid>,
    payload: Result<Json<BusUpdate>, JsonRejection>,
) -> Result<Json<Bus>, AppError> {
    let Json(req) = payload?;
    let bus = state.service.update_bus(bus_id, req).await?;
    Ok(Json(bus))
}

/// DELETE /api/v1/buses/{id}
pub async fn delete_bus(
    State(state): State<AppState>,
    Path(bus_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.service.delete_bus(bus_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/buses
pub async fn list_buses(State(state): State<AppState>) -> Result<Json<Vec<BusView>>, AppError> {
    Ok(Json(state.service.list_buses().await?))
}

/// GET /api/v1/buses/{id}
pub async fn get_bus(
    State(state): State<AppState>,
    Path(bus_id): Path<Uuid>,
) -> Result<Json<BusView>, AppError> {
    Ok(Json(state.service.get_bus(bus_id).await?))
}

/// POST /api/v1/buses/{id}/trips
/// Schedule a trip; its seat map is sized to the bus capacity.
pub async fn create_trip_schedule(
    State(state): State<AppState>,
    Path(bus_id): Path<Uuid>,
    payload: Result<Json<NewTripSchedule>, JsonRejection>,
) -> Result<(StatusCode, Json<TripSchedule>), AppError> {
    let Json(req) = payload?;
    let trip = state.service.create_trip_schedule(bus_id, req).await?;
    Ok((StatusCode::CREATED, Json(trip)))
}
