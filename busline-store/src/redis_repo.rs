use redis::RedisResult;
use tracing::info;

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        info!("Redis client configured for rate limiting");
        Ok(Self { client })
    }

    /// Fixed-window counter: `true` while `key` has seen at most `limit` hits
    /// in the current window.
    pub async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (count,): (i64,) = rate_limit_pipeline(key, window_seconds)
            .query_async(&mut conn)
            .await?;

        Ok(count <= limit)
    }
}

/// `INCR` plus an expiry that is only set when the window opens (`EXPIRE .. NX`),
/// so later hits never push the reset time forward.
fn rate_limit_pipeline(key: &str, window_seconds: i64) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic()
        .incr(key, 1)
        .cmd("EXPIRE")
        .arg(key)
        .arg(window_seconds)
        .arg("NX")
        .ignore();
    pipe
}

/// Rate limit bucket for a client address.
pub fn rate_limit_key(client: &str) -> String {
    format!("busline:ratelimit:{}", client)
}
