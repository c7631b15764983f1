use async_trait::async_trait;
use busline_core::repository::BusRepository;
use busline_core::search::{BusInfo, SearchQuery, TripSummary};
use busline_core::trip::{NewTripSchedule, Seat, SeatBooking, TripSchedule};
use busline_core::{Bus, BusUpdate, CoreError, CoreResult};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgConnection, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

use crate::database::storage_error;

/// Buses, trip schedules and seats in Postgres. Trips and seats live in their
/// own tables with `ON DELETE CASCADE` back to the bus.
pub struct PostgresBusRepository {
    pool: PgPool,
}

impl PostgresBusRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct BusRow {
    id: Uuid,
    bus_code: String,
    registration_number: String,
    chassis_number: Option<String>,
    model: String,
    seat_capacity: i32,
    driver_id: Uuid,
    conductor_id: Uuid,
    owner: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct TripRow {
    id: Uuid,
    bus_id: Uuid,
    route_id: Uuid,
    trip_date: NaiveDate,
    is_return_trip: bool,
    departure_time: DateTime<Utc>,
    arrival_time: DateTime<Utc>,
    price: i64,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct SeatRow {
    trip_schedule_id: Uuid,
    seat_number: i32,
    is_reserved: bool,
    reserved_by: Option<String>,
    booking_date: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow)]
struct SeatChangeRow {
    bus_id: Uuid,
    #[sqlx(flatten)]
    seat: SeatRow,
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    trip_schedule_id: Uuid,
    route_id: Uuid,
    trip_date: NaiveDate,
    is_return_trip: bool,
    departure_time: DateTime<Utc>,
    arrival_time: DateTime<Utc>,
    price: i64,
    bus_id: Uuid,
    bus_code: String,
    registration_number: String,
    model: String,
    owner: String,
    seat_capacity: i32,
    total_seats: i64,
    available_seats: i64,
}

impl BusRow {
    fn into_bus(self, trip_schedules: Vec<TripSchedule>) -> Bus {
        Bus {
            id: self.id,
            bus_code: self.bus_code,
            registration_number: self.registration_number,
            chassis_number: self.chassis_number,
            model: self.model,
            seat_capacity: self.seat_capacity as u32,
            driver_id: self.driver_id,
            conductor_id: self.conductor_id,
            owner: self.owner,
            trip_schedules,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl TripRow {
    fn into_trip(self, seats: Vec<Seat>) -> TripSchedule {
        TripSchedule {
            id: self.id,
            route_id: self.route_id,
            bus_id: self.bus_id,
            trip_date: self.trip_date,
            is_return_trip: self.is_return_trip,
            departure_time: self.departure_time,
            arrival_time: self.arrival_time,
            price: self.price,
            seats,
            created_at: self.created_at,
        }
    }
}

impl From<SeatRow> for Seat {
    fn from(row: SeatRow) -> Self {
        Seat {
            seat_number: row.seat_number as u32,
            is_reserved: row.is_reserved,
            reserved_by: row.reserved_by,
            booking_date: row.booking_date,
        }
    }
}

impl From<SummaryRow> for TripSummary {
    fn from(row: SummaryRow) -> Self {
        TripSummary {
            trip_schedule_id: row.trip_schedule_id,
            route_id: row.route_id,
            trip_date: row.trip_date,
            is_return_trip: row.is_return_trip,
            departure_time: row.departure_time,
            arrival_time: row.arrival_time,
            price: row.price,
            total_seats: row.total_seats as u32,
            available_seats: row.available_seats as u32,
            bus: BusInfo {
                id: row.bus_id,
                bus_code: row.bus_code,
                registration_number: row.registration_number,
                model: row.model,
                owner: row.owner,
                seat_capacity: row.seat_capacity as u32,
            },
        }
    }
}

const BUS_COLUMNS: &str = "id, bus_code, registration_number, chassis_number, model, seat_capacity, driver_id, conductor_id, owner, created_at, updated_at";
const TRIP_COLUMNS: &str = "id, bus_id, route_id, trip_date, is_return_trip, departure_time, arrival_time, price, created_at";

/// Trip schedules (with seats) for the given buses, in creation order.
async fn load_trips(
    conn: &mut PgConnection,
    bus_ids: &[Uuid],
) -> Result<HashMap<Uuid, Vec<TripSchedule>>, sqlx::Error> {
    let trip_rows: Vec<TripRow> = sqlx::query_as(&format!(
        "SELECT {} FROM trip_schedules WHERE bus_id = ANY($1) ORDER BY created_at, id",
        TRIP_COLUMNS
    ))
    .bind(bus_ids)
    .fetch_all(&mut *conn)
    .await?;

    let trip_ids: Vec<Uuid> = trip_rows.iter().map(|t| t.id).collect();
    let seat_rows: Vec<SeatRow> = sqlx::query_as(
        r#"
        SELECT trip_schedule_id, seat_number, is_reserved, reserved_by, booking_date
        FROM seats
        WHERE trip_schedule_id = ANY($1)
        ORDER BY trip_schedule_id, seat_number
        "#,
    )
    .bind(&trip_ids)
    .fetch_all(&mut *conn)
    .await?;

    let mut seats: HashMap<Uuid, Vec<Seat>> = HashMap::new();
    for row in seat_rows {
        seats.entry(row.trip_schedule_id).or_default().push(row.into());
    }

    let mut trips: HashMap<Uuid, Vec<TripSchedule>> = HashMap::new();
    for row in trip_rows {
        let trip_seats = seats.remove(&row.id).unwrap_or_default();
        trips.entry(row.bus_id).or_default().push(row.into_trip(trip_seats));
    }

    Ok(trips)
}

async fn load_bus(
    conn: &mut PgConnection,
    id: Uuid,
    for_update: bool,
) -> Result<Option<Bus>, sqlx::Error> {
    let lock = if for_update { " FOR UPDATE" } else { "" };
    let row: Option<BusRow> = sqlx::query_as(&format!(
        "SELECT {} FROM buses WHERE id = $1{}",
        BUS_COLUMNS, lock
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => {
            let mut trips = load_trips(conn, &[id]).await?;
            Ok(Some(row.into_bus(trips.remove(&id).unwrap_or_default())))
        }
        None => Ok(None),
    }
}

/// Explain why a conditional seat update matched no row.
async fn diagnose_seat(
    pool: &PgPool,
    trip_schedule_id: Uuid,
    seat_number: i32,
    conflict: CoreError,
) -> CoreError {
    let seat: Result<Option<bool>, sqlx::Error> = sqlx::query_scalar(
        "SELECT is_reserved FROM seats WHERE trip_schedule_id = $1 AND seat_number = $2",
    )
    .bind(trip_schedule_id)
    .bind(seat_number)
    .fetch_optional(pool)
    .await;

    match seat {
        Ok(Some(_)) => conflict,
        Ok(None) => {
            let trip_exists: Result<Option<Uuid>, sqlx::Error> =
                sqlx::query_scalar("SELECT id FROM trip_schedules WHERE id = $1")
                    .bind(trip_schedule_id)
                    .fetch_optional(pool)
                    .await;
            match trip_exists {
                Ok(Some(_)) => CoreError::NotFoundError(format!(
                    "seat {} on trip schedule {}",
                    seat_number, trip_schedule_id
                )),
                Ok(None) => CoreError::NotFoundError(format!("trip schedule {}", trip_schedule_id)),
                Err(e) => storage_error(e),
            }
        }
        Err(e) => storage_error(e),
    }
}

fn seat_number_param(trip_schedule_id: Uuid, seat_number: u32) -> CoreResult<i32> {
    i32::try_from(seat_number).map_err(|_| {
        CoreError::NotFoundError(format!("seat {} on trip schedule {}", seat_number, trip_schedule_id))
    })
}

#[async_trait]
impl BusRepository for PostgresBusRepository {
    async fn insert_bus(&self, bus: &Bus) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO buses (id, bus_code, registration_number, chassis_number, model, seat_capacity, driver_id, conductor_id, owner, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(bus.id)
        .bind(&bus.bus_code)
        .bind(&bus.registration_number)
        .bind(&bus.chassis_number)
        .bind(&bus.model)
        .bind(bus.seat_capacity as i32)
        .bind(bus.driver_id)
        .bind(bus.conductor_id)
        .bind(&bus.owner)
        .bind(bus.created_at)
        .bind(bus.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(())
    }

    async fn get_bus(&self, id: Uuid) -> CoreResult<Option<Bus>> {
        let mut conn = self.pool.acquire().await.map_err(storage_error)?;
        load_bus(&mut conn, id, false).await.map_err(storage_error)
    }

    async fn list_buses(&self) -> CoreResult<Vec<Bus>> {
        let mut conn = self.pool.acquire().await.map_err(storage_error)?;

        let rows: Vec<BusRow> = sqlx::query_as(&format!(
            "SELECT {} FROM buses ORDER BY created_at, id",
            BUS_COLUMNS
        ))
        .fetch_all(&mut *conn)
        .await
        .map_err(storage_error)?;

        let ids: Vec<Uuid> = rows.iter().map(|b| b.id).collect();
        let mut trips = load_trips(&mut conn, &ids).await.map_err(storage_error)?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let bus_trips = trips.remove(&row.id).unwrap_or_default();
                row.into_bus(bus_trips)
            })
            .collect())
    }

    async fn update_bus(
        &self,
        id: Uuid,
        update: &BusUpdate,
        max_seat_capacity: u32,
    ) -> CoreResult<Option<Bus>> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let Some(mut bus) = load_bus(&mut tx, id, true).await.map_err(storage_error)? else {
            return Ok(None);
        };
        bus.apply_update(update, max_seat_capacity)?;

        sqlx::query(
            r#"
            UPDATE buses
            SET bus_code = $2, registration_number = $3, chassis_number = $4, model = $5,
                seat_capacity = $6, driver_id = $7, conductor_id = $8, owner = $9, updated_at = $10
            WHERE id = $1
            "#,
        )
        .bind(bus.id)
        .bind(&bus.bus_code)
        .bind(&bus.registration_number)
        .bind(&bus.chassis_number)
        .bind(&bus.model)
        .bind(bus.seat_capacity as i32)
        .bind(bus.driver_id)
        .bind(bus.conductor_id)
        .bind(&bus.owner)
        .bind(bus.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;

        tx.commit().await.map_err(storage_error)?;
        Ok(Some(bus))
    }

    async fn delete_bus(&self, id: Uuid) -> CoreResult<bool> {
        let result = sqlx::query("DELETE FROM buses WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_trip_schedule(
        &self,
        bus_id: Uuid,
        new_trip: &NewTripSchedule,
    ) -> CoreResult<Option<TripSchedule>> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        // Row lock keeps capacity stable until the seats are written.
        let capacity: Option<i32> =
            sqlx::query_scalar("SELECT seat_capacity FROM buses WHERE id = $1 FOR UPDATE")
                .bind(bus_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(storage_error)?;

        let Some(capacity) = capacity else {
            return Ok(None);
        };
        let trip = TripSchedule::create(bus_id, new_trip, capacity as u32)?;

        sqlx::query(
            r#"
            INSERT INTO trip_schedules (id, bus_id, route_id, trip_date, is_return_trip, departure_time, arrival_time, price, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(trip.id)
        .bind(trip.bus_id)
        .bind(trip.route_id)
        .bind(trip.trip_date)
        .bind(trip.is_return_trip)
        .bind(trip.departure_time)
        .bind(trip.arrival_time)
        .bind(trip.price)
        .bind(trip.created_at)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;

        let seat_numbers: Vec<i32> = trip.seats.iter().map(|s| s.seat_number as i32).collect();
        sqlx::query(
            "INSERT INTO seats (trip_schedule_id, seat_number) SELECT $1, UNNEST($2::int4[])",
        )
        .bind(trip.id)
        .bind(&seat_numbers)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;

        tx.commit().await.map_err(storage_error)?;
        Ok(Some(trip))
    }

    async fn get_trip_schedule(&self, id: Uuid) -> CoreResult<Option<TripSchedule>> {
        let row: Option<TripRow> = sqlx::query_as(&format!(
            "SELECT {} FROM trip_schedules WHERE id = $1",
            TRIP_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let seats: Vec<SeatRow> = sqlx::query_as(
            r#"
            SELECT trip_schedule_id, seat_number, is_reserved, reserved_by, booking_date
            FROM seats
            WHERE trip_schedule_id = $1
            ORDER BY seat_number
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(Some(row.into_trip(seats.into_iter().map(Seat::from).collect())))
    }

    async fn search_trip_schedules(&self, query: &SearchQuery) -> CoreResult<Vec<TripSummary>> {
        let rows: Vec<SummaryRow> = sqlx::query_as(
            r#"
            SELECT
                t.id AS trip_schedule_id, t.route_id, t.trip_date, t.is_return_trip,
                t.departure_time, t.arrival_time, t.price,
                b.id AS bus_id, b.bus_code, b.registration_number, b.model, b.owner, b.seat_capacity,
                COUNT(s.seat_number) AS total_seats,
                COUNT(s.seat_number) FILTER (WHERE NOT s.is_reserved) AS available_seats
            FROM trip_schedules t
            JOIN buses b ON b.id = t.bus_id
            LEFT JOIN seats s ON s.trip_schedule_id = t.id
            WHERE t.route_id = $1
              AND t.trip_date = $2
              AND ($3::boolean IS NULL OR t.is_return_trip = $3)
            GROUP BY t.id, b.id
            ORDER BY t.departure_time, b.id, t.id
            "#,
        )
        .bind(query.route_id)
        .bind(query.date)
        .bind(query.is_return_trip)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        Ok(rows.into_iter().map(TripSummary::from).collect())
    }

    async fn reserve_seat(
        &self,
        trip_schedule_id: Uuid,
        seat_number: u32,
        user_id: &str,
        booked_at: DateTime<Utc>,
    ) -> CoreResult<SeatBooking> {
        let seat_number = seat_number_param(trip_schedule_id, seat_number)?;

        // Compare-and-set: only a currently vacant seat matches.
        let row: Option<SeatChangeRow> = sqlx::query_as(
            r#"
            UPDATE seats s
            SET is_reserved = TRUE, reserved_by = $3, booking_date = $4
            FROM trip_schedules t
            WHERE t.id = s.trip_schedule_id
              AND s.trip_schedule_id = $1
              AND s.seat_number = $2
              AND s.is_reserved = FALSE
            RETURNING t.bus_id, s.trip_schedule_id, s.seat_number, s.is_reserved, s.reserved_by, s.booking_date
            "#,
        )
        .bind(trip_schedule_id)
        .bind(seat_number)
        .bind(user_id)
        .bind(booked_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        match row {
            Some(row) => Ok(SeatBooking {
                trip_schedule_id,
                bus_id: row.bus_id,
                seat: row.seat.into(),
            }),
            None => Err(diagnose_seat(
                &self.pool,
                trip_schedule_id,
                seat_number,
                CoreError::ConflictError(format!("seat {} is already reserved", seat_number)),
            )
            .await),
        }
    }

    async fn release_seat(
        &self,
        trip_schedule_id: Uuid,
        seat_number: u32,
        user_id: &str,
        is_admin: bool,
    ) -> CoreResult<SeatBooking> {
        let seat_number = seat_number_param(trip_schedule_id, seat_number)?;

        let row: Option<SeatChangeRow> = sqlx::query_as(
            r#"
            UPDATE seats s
            SET is_reserved = FALSE, reserved_by = NULL, booking_date = NULL
            FROM trip_schedules t
            WHERE t.id = s.trip_schedule_id
              AND s.trip_schedule_id = $1
              AND s.seat_number = $2
              AND s.is_reserved = TRUE
              AND ($4 OR s.reserved_by = $3)
            RETURNING t.bus_id, s.trip_schedule_id, s.seat_number, s.is_reserved, s.reserved_by, s.booking_date
            "#,
        )
        .bind(trip_schedule_id)
        .bind(seat_number)
        .bind(user_id)
        .bind(is_admin)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        match row {
            Some(row) => Ok(SeatBooking {
                trip_schedule_id,
                bus_id: row.bus_id,
                seat: row.seat.into(),
            }),
            None => Err(diagnose_seat(
                &self.pool,
                trip_schedule_id,
                seat_number,
                CoreError::ConflictError(format!(
                    "seat {} is not reserved by {}",
                    seat_number, user_id
                )),
            )
            .await),
        }
    }
}
