use std::sync::Arc;
use busline_core::{BookingRules, BusService};
use busline_shared::SeatEvent;
use busline_store::app_config::RateLimitConfig;
use busline_store::{RedisClient, Repositories};
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<BusService>,
    /// Rate limiting is skipped when absent.
    pub redis: Option<Arc<RedisClient>>,
    pub seat_events: broadcast::Sender<SeatEvent>,
    pub auth: AuthConfig,
    pub rate_limit: RateLimitConfig,
}

impl AppState {
    pub fn new(
        repositories: Repositories,
        rules: BookingRules,
        auth: AuthConfig,
        redis: Option<Arc<RedisClient>>,
        rate_limit: RateLimitConfig,
    ) -> Self {
        let (seat_events, _) = broadcast::channel(100);

        Self {
            service: Arc::new(BusService::new(repositories.buses, repositories.employees, rules)),
            redis,
            seat_events,
            auth,
            rate_limit,
        }
    }
}
