use std::convert::Infallible;

use axum::{
    extract::{rejection::PathRejection, Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Extension, Json,
};
use busline_core::SeatBooking;
use busline_shared::SeatEvent;
use futures_util::stream::{Stream, StreamExt};
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::Claims;
use crate::state::AppState;

fn publish(state: &AppState, event: SeatEvent) {
    // No subscribers is not an error.
    let _ = state.seat_events.send(event);
}

/// POST /api/v1/trips/{trip_id}/seats/{seat_number}/reservation
pub async fn reserve_seat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    path: Result<Path<(Uuid, u32)>, PathRejection>,
) -> Result<(StatusCode, Json<SeatBooking>), AppError> {
    let Path((trip_id, seat_number)) = path?;
    let booking = state.service.reserve_seat(trip_id, seat_number, &claims.sub).await?;

    publish(
        &state,
        SeatEvent::reserved(booking.trip_schedule_id, booking.bus_id, seat_number, &claims.sub),
    );

    Ok((StatusCode::CREATED, Json(booking)))
}

/// DELETE /api/v1/trips/{trip_id}/seats/{seat_number}/reservation
/// Owners may release their own seat; admins may release any.
pub async fn release_seat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    path: Result<Path<(Uuid, u32)>, PathRejection>,
) -> Result<Json<SeatBooking>, AppError> {
    let Path((trip_id, seat_number)) = path?;
    let booking = state
        .service
        .release_seat(trip_id, seat_number, &claims.sub, claims.is_admin())
        .await?;

    publish(
        &state,
        SeatEvent::released(booking.trip_schedule_id, booking.bus_id, seat_number, &claims.sub),
    );

    Ok(Json(booking))
}

/// GET /api/v1/trips/{trip_id}/stream
/// Live seat changes for one trip as server-sent events.
pub async fn stream_seat_events(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let Path(trip_id) = path?;

    // Unknown trips are a 404 rather than a silent stream.
    state.service.get_seats_for_trip(trip_id).await?;

    let rx = state.seat_events.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |result| async move {
        match result {
            Ok(event) if event.trip_schedule_id == trip_id => {
                match Event::default().event(event.event_name()).json_data(&event) {
                    Ok(sse) => Some(Ok(sse)),
                    Err(e) => {
                        tracing::warn!("Failed to encode seat event: {}", e);
                        None
                    }
                }
            }
            Ok(_) => None,
            // Lagged receivers skip ahead.
            Err(_) => None,
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
