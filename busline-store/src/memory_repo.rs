use async_trait::async_trait;
use busline_core::repository::{BusRepository, EmployeeRepository};
use busline_core::search::{SearchQuery, TripSummary};
use busline_core::trip::{NewTripSchedule, SeatBooking, TripSchedule};
use busline_core::{Bus, BusUpdate, CoreError, CoreResult, Employee};
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Document store kept in process memory. Each bus is one document with its
/// trip schedules and seats embedded, so removing the bus removes everything
/// it owns, and a seat update is atomic under the collection write lock.
#[derive(Default)]
pub struct MemoryStore {
    buses: RwLock<Vec<Bus>>,
    employees: RwLock<Vec<Employee>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn check_employees(&self, ids: impl IntoIterator<Item = Uuid>) -> CoreResult<()> {
        let employees = self.employees.read().await;
        for id in ids {
            if !employees.iter().any(|e| e.id == id) {
                return Err(CoreError::ValidationError(format!(
                    "reference does not exist (employee {})",
                    id
                )));
            }
        }
        Ok(())
    }
}

fn check_unique(candidate: &Bus, buses: &[Bus]) -> CoreResult<()> {
    match buses.iter().find_map(|other| candidate.unique_conflict(other)) {
        Some(field) => Err(CoreError::UniquenessError(format!("{} is already in use", field))),
        None => Ok(()),
    }
}

fn find_trip_mut(buses: &mut [Bus], trip_schedule_id: Uuid) -> CoreResult<&mut TripSchedule> {
    buses
        .iter_mut()
        .find_map(|bus| bus.trip_schedule_mut(trip_schedule_id))
        .ok_or_else(|| CoreError::NotFoundError(format!("trip schedule {}", trip_schedule_id)))
}

#[async_trait]
impl BusRepository for MemoryStore {
    async fn insert_bus(&self, bus: &Bus) -> CoreResult<()> {
        self.check_employees([bus.driver_id, bus.conductor_id]).await?;

        let mut buses = self.buses.write().await;
        check_unique(bus, &buses)?;
        buses.push(bus.clone());
        Ok(())
    }

    async fn get_bus(&self, id: Uuid) -> CoreResult<Option<Bus>> {
        let buses = self.buses.read().await;
        Ok(buses.iter().find(|b| b.id == id).cloned())
    }

    async fn list_buses(&self) -> CoreResult<Vec<Bus>> {
        Ok(self.buses.read().await.clone())
    }

    async fn update_bus(
        &self,
        id: Uuid,
        update: &BusUpdate,
        max_seat_capacity: u32,
    ) -> CoreResult<Option<Bus>> {
        let mut buses = self.buses.write().await;
        let Some(index) = buses.iter().position(|b| b.id == id) else {
            return Ok(None);
        };
        // Lock order: buses, then employees.
        self.check_employees(update.employee_refs()).await?;

        let mut bus = buses[index].clone();
        bus.apply_update(update, max_seat_capacity)?;
        check_unique(&bus, &buses)?;

        buses[index] = bus.clone();
        Ok(Some(bus))
    }

    async fn delete_bus(&self, id: Uuid) -> CoreResult<bool> {
        let mut buses = self.buses.write().await;
        let before = buses.len();
        buses.retain(|b| b.id != id);
        Ok(buses.len() < before)
    }

    async fn insert_trip_schedule(
        &self,
        bus_id: Uuid,
        new_trip: &NewTripSchedule,
    ) -> CoreResult<Option<TripSchedule>> {
        let mut buses = self.buses.write().await;
        let Some(bus) = buses.iter_mut().find(|b| b.id == bus_id) else {
            return Ok(None);
        };

        let trip = TripSchedule::create(bus.id, new_trip, bus.seat_capacity)?;
        bus.trip_schedules.push(trip.clone());
        Ok(Some(trip))
    }

    async fn get_trip_schedule(&self, id: Uuid) -> CoreResult<Option<TripSchedule>> {
        let buses = self.buses.read().await;
        Ok(buses.iter().find_map(|b| b.trip_schedule(id)).cloned())
    }

    async fn search_trip_schedules(&self, query: &SearchQuery) -> CoreResult<Vec<TripSummary>> {
        let buses = self.buses.read().await;

        Ok(buses
            .iter()
            .flat_map(move |bus| {
                bus.trip_schedules
                    .iter()
                    .filter(move |trip| query.matches(trip))
                    .map(move |trip| TripSummary::from_trip(bus, trip))
            })
            .collect())
    }

    async fn reserve_seat(
        &self,
        trip_schedule_id: Uuid,
        seat_number: u32,
        user_id: &str,
        booked_at: DateTime<Utc>,
    ) -> CoreResult<SeatBooking> {
        let mut buses = self.buses.write().await;
        find_trip_mut(&mut buses, trip_schedule_id)?.reserve_seat(seat_number, user_id, booked_at)
    }

    async fn release_seat(
        &self,
        trip_schedule_id: Uuid,
        seat_number: u32,
        user_id: &str,
        is_admin: bool,
    ) -> CoreResult<SeatBooking> {
        let mut buses = self.buses.write().await;
        find_trip_mut(&mut buses, trip_schedule_id)?.release_seat(seat_number, user_id, is_admin)
    }
}

#[async_trait]
impl EmployeeRepository for MemoryStore {
    async fn insert_employee(&self, employee: &Employee) -> CoreResult<()> {
        self.employees.write().await.push(employee.clone());
        Ok(())
    }

    async fn get_employee(&self, id: Uuid) -> CoreResult<Option<Employee>> {
        let employees = self.employees.read().await;
        Ok(employees.iter().find(|e| e.id == id).cloned())
    }

    async fn list_employees(&self) -> CoreResult<Vec<Employee>> {
        Ok(self.employees.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use busline_core::{BookingRules, BusService, EmployeeRole, NewBus, NewEmployee};
    use chrono::{Duration, NaiveDate, TimeZone};
    use std::collections::HashSet;
    use std::sync::Arc;

    struct Fixture {
        service: Arc<BusService>,
        driver: Uuid,
        conductor: Uuid,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let service = Arc::new(BusService::new(
            store.clone(),
            store,
            BookingRules::default(),
        ));

        let driver = service
            .create_employee(NewEmployee {
                name: Some("Sunil Silva".to_string()),
                role: Some(EmployeeRole::Driver),
                contact_number: Some("0771234567".to_string()),
            })
            .await
            .unwrap();
        let conductor = service
            .create_employee(NewEmployee {
                name: Some("Ruwan Fernando".to_string()),
                role: Some(EmployeeRole::Conductor),
                contact_number: None,
            })
            .await
            .unwrap();

        Fixture {
            service,
            driver: driver.id,
            conductor: conductor.id,
        }
    }

    impl Fixture {
        fn new_bus(&self, registration: &str, seat_capacity: i64) -> NewBus {
            NewBus {
                bus_code: Some(format!("BUS-{}", registration)),
                registration_number: Some(registration.to_string()),
                chassis_number: None,
                model: Some("Ashok Leyland Viking".to_string()),
                seat_capacity: Some(seat_capacity),
                driver_id: Some(self.driver),
                conductor_id: Some(self.conductor),
                owner: Some("Southern Transit".to_string()),
            }
        }
    }

    fn trip_on(route_id: Uuid, date: NaiveDate, departure_hour: u32) -> NewTripSchedule {
        let departure = Utc
            .from_utc_datetime(&date.and_hms_opt(departure_hour, 0, 0).unwrap());
        NewTripSchedule {
            route_id: Some(route_id),
            trip_date: Some(date),
            is_return_trip: false,
            departure_time: Some(departure),
            arrival_time: Some(departure + Duration::hours(3)),
            price: Some(1_500),
        }
    }

    fn travel_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, 13).unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_registration_is_rejected() {
        let fx = fixture().await;
        fx.service.create_bus(fx.new_bus("NB-1000", 40)).await.unwrap();

        let mut duplicate = fx.new_bus("NB-1000", 30);
        duplicate.bus_code = Some("BUS-OTHER".to_string());
        let err = fx.service.create_bus(duplicate).await.unwrap_err();

        assert_eq!(
            err,
            CoreError::UniquenessError("registration_number is already in use".to_string())
        );
        assert_eq!(fx.service.list_buses().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_crew_reference_is_rejected() {
        let fx = fixture().await;
        let mut payload = fx.new_bus("NB-1001", 40);
        payload.driver_id = Some(Uuid::new_v4());

        let err = fx.service.create_bus(payload).await.unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));
        assert!(fx.service.list_buses().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_resolves_crew() {
        let fx = fixture().await;
        fx.service.create_bus(fx.new_bus("NB-1002", 40)).await.unwrap();

        let listed = fx.service.list_buses().await.unwrap();
        assert_eq!(listed[0].driver.as_ref().unwrap().name, "Sunil Silva");
        assert_eq!(listed[0].conductor.as_ref().unwrap().role, EmployeeRole::Conductor);
    }

    #[tokio::test]
    async fn test_update_and_delete_unknown_bus() {
        let fx = fixture().await;
        let missing = Uuid::new_v4();

        assert!(matches!(
            fx.service.update_bus(missing, BusUpdate::default()).await,
            Err(CoreError::NotFoundError(_))
        ));
        assert!(matches!(
            fx.service.delete_bus(missing).await,
            Err(CoreError::NotFoundError(_))
        ));
    }

    #[tokio::test]
    async fn test_update_unknown_bus_with_unknown_crew_is_not_found() {
        let fx = fixture().await;
        let update = BusUpdate {
            driver_id: Some(Uuid::new_v4()),
            ..Default::default()
        };

        assert!(matches!(
            fx.service.update_bus(Uuid::new_v4(), update.clone()).await,
            Err(CoreError::NotFoundError(_))
        ));

        let bus = fx.service.create_bus(fx.new_bus("NB-1003", 40)).await.unwrap();
        assert!(matches!(
            fx.service.update_bus(bus.id, update).await,
            Err(CoreError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_update_rechecks_uniqueness() {
        let fx = fixture().await;
        fx.service.create_bus(fx.new_bus("NB-2000", 40)).await.unwrap();
        let second = fx.service.create_bus(fx.new_bus("NB-2001", 40)).await.unwrap();

        let update = BusUpdate {
            registration_number: Some("NB-2000".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            fx.service.update_bus(second.id, update).await,
            Err(CoreError::UniquenessError(_))
        ));

        let update = BusUpdate {
            owner: Some("Northern Lines".to_string()),
            ..Default::default()
        };
        let updated = fx.service.update_bus(second.id, update).await.unwrap();
        assert_eq!(updated.owner, "Northern Lines");
        assert_eq!(updated.registration_number, "NB-2001");
    }

    #[tokio::test]
    async fn test_trip_seats_match_capacity_and_reads_are_stable() {
        let fx = fixture().await;
        let bus = fx.service.create_bus(fx.new_bus("NB-3000", 33)).await.unwrap();
        let trip = fx
            .service
            .create_trip_schedule(bus.id, trip_on(Uuid::new_v4(), travel_date(), 8))
            .await
            .unwrap();

        let seats = fx.service.get_seats_for_trip(trip.id).await.unwrap();
        assert_eq!(seats.len(), 33);
        let numbers: HashSet<u32> = seats.iter().map(|s| s.seat_number).collect();
        assert_eq!(numbers, (1..=33).collect());

        let again = fx.service.get_seats_for_trip(trip.id).await.unwrap();
        assert_eq!(seats, again);
    }

    #[tokio::test]
    async fn test_trip_for_unknown_bus_or_trip() {
        let fx = fixture().await;
        assert!(matches!(
            fx.service
                .create_trip_schedule(Uuid::new_v4(), trip_on(Uuid::new_v4(), travel_date(), 8))
                .await,
            Err(CoreError::NotFoundError(_))
        ));
        assert!(matches!(
            fx.service.get_seats_for_trip(Uuid::new_v4()).await,
            Err(CoreError::NotFoundError(_))
        ));
    }

    #[tokio::test]
    async fn test_capacity_change_blocked_after_scheduling() {
        let fx = fixture().await;
        let bus = fx.service.create_bus(fx.new_bus("NB-3100", 20)).await.unwrap();

        let grow = BusUpdate {
            seat_capacity: Some(25),
            ..Default::default()
        };
        assert_eq!(fx.service.update_bus(bus.id, grow.clone()).await.unwrap().seat_capacity, 25);

        fx.service
            .create_trip_schedule(bus.id, trip_on(Uuid::new_v4(), travel_date(), 8))
            .await
            .unwrap();

        assert!(matches!(
            fx.service.update_bus(bus.id, BusUpdate { seat_capacity: Some(30), ..grow }).await,
            Err(CoreError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_reservations_have_one_winner() {
        let fx = fixture().await;
        let bus = fx.service.create_bus(fx.new_bus("NB-4000", 10)).await.unwrap();
        let trip = fx
            .service
            .create_trip_schedule(bus.id, trip_on(Uuid::new_v4(), travel_date(), 9))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let service = fx.service.clone();
            let trip_id = trip.id;
            handles.push(tokio::spawn(async move {
                service.reserve_seat(trip_id, 3, &format!("user-{}", i)).await
            }));
        }

        let mut successes = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(CoreError::ConflictError(_)) => conflicts += 1,
                Err(other) => panic!("unexpected error: {}", other),
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(conflicts, 15);

        let seats = fx.service.get_seats_for_trip(trip.id).await.unwrap();
        assert_eq!(seats.iter().filter(|s| s.is_reserved).count(), 1);
    }

    #[tokio::test]
    async fn test_search_filters_counts_and_orders() {
        let fx = fixture().await;
        let route = Uuid::new_v4();
        let other_route = Uuid::new_v4();

        let bus_a = fx.service.create_bus(fx.new_bus("NB-5000", 40)).await.unwrap();
        let bus_b = fx.service.create_bus(fx.new_bus("NB-5001", 20)).await.unwrap();

        let late = fx
            .service
            .create_trip_schedule(bus_a.id, trip_on(route, travel_date(), 14))
            .await
            .unwrap();
        let early = fx
            .service
            .create_trip_schedule(bus_b.id, trip_on(route, travel_date(), 7))
            .await
            .unwrap();
        fx.service
            .create_trip_schedule(bus_a.id, trip_on(other_route, travel_date(), 10))
            .await
            .unwrap();
        fx.service
            .create_trip_schedule(bus_a.id, trip_on(route, travel_date().succ_opt().unwrap(), 10))
            .await
            .unwrap();

        fx.service.reserve_seat(late.id, 1, "user-1").await.unwrap();
        fx.service.reserve_seat(late.id, 2, "user-2").await.unwrap();

        let query = SearchQuery {
            route_id: route,
            date: travel_date(),
            is_return_trip: None,
        };
        let results = fx.service.search_available_buses(&query).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].trip_schedule_id, early.id);
        assert_eq!(results[0].available_seats, 20);
        assert_eq!(results[1].trip_schedule_id, late.id);
        assert_eq!(results[1].available_seats, 38);
        assert_eq!(results[1].total_seats, 40);

        let returns_only = SearchQuery {
            is_return_trip: Some(true),
            ..query.clone()
        };
        assert!(fx.service.search_available_buses(&returns_only).await.unwrap().is_empty());

        // Deleting a bus drops its trips from search.
        fx.service.delete_bus(bus_a.id).await.unwrap();
        let results = fx.service.search_available_buses(&query).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].bus.id, bus_b.id);
        assert!(matches!(
            fx.service.get_seats_for_trip(late.id).await,
            Err(CoreError::NotFoundError(_))
        ));
    }

    #[tokio::test]
    async fn test_booking_scenario_end_to_end() {
        let fx = fixture().await;
        let route = Uuid::new_v4();
        let bus = fx.service.create_bus(fx.new_bus("NB-6000", 40)).await.unwrap();
        let trip = fx
            .service
            .create_trip_schedule(bus.id, trip_on(route, travel_date(), 6))
            .await
            .unwrap();

        let seats = fx.service.get_seats_for_trip(trip.id).await.unwrap();
        assert_eq!(seats.len(), 40);
        assert!(seats.iter().all(|s| !s.is_reserved));

        let booking = fx.service.reserve_seat(trip.id, 5, "user-42").await.unwrap();
        assert!(booking.seat.is_reserved);
        assert_eq!(booking.bus_id, bus.id);

        assert!(matches!(
            fx.service.reserve_seat(trip.id, 5, "user-43").await,
            Err(CoreError::ConflictError(_))
        ));

        let query = SearchQuery {
            route_id: route,
            date: travel_date(),
            is_return_trip: None,
        };
        let results = fx.service.search_available_buses(&query).await.unwrap();
        assert_eq!(results[0].available_seats, 39);

        // Release and rebook by someone else.
        assert!(matches!(
            fx.service.release_seat(trip.id, 5, "user-43", false).await,
            Err(CoreError::ConflictError(_))
        ));
        fx.service.release_seat(trip.id, 5, "user-42", false).await.unwrap();
        fx.service.reserve_seat(trip.id, 5, "user-43").await.unwrap();
    }
}
