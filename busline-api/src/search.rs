use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use busline_core::{SearchQuery, Seat, TripSummary};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SeatsQuery {
    pub trip_schedule_id: Uuid,
}

/// GET /api/v1/buses/search?route_id=..&date=YYYY-MM-DD[&is_return_trip=bool]
pub async fn search_available_buses(
    State(state): State<AppState>,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> Result<Json<Vec<TripSummary>>, AppError> {
    let Query(query) = query?;
    let results = state.service.search_available_buses(&query).await?;

    tracing::debug!(
        "Search route={} date={} -> {} trips",
        query.route_id,
        query.date,
        results.len()
    );
    Ok(Json(results))
}

/// GET /api/v1/buses/seats?trip_schedule_id=..
pub async fn get_seats_for_trip(
    State(state): State<AppState>,
    query: Result<Query<SeatsQuery>, QueryRejection>,
) -> Result<Json<Vec<Seat>>, AppError> {
    let Query(query) = query?;
    Ok(Json(state.service.get_seats_for_trip(query.trip_schedule_id).await?))
}
