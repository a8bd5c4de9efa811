use activa_core::rate_limit::RateLimiter;
use activa_core::repository::RepoResult;
use async_trait::async_trait;
use redis::{RedisResult, Script};
use tracing::info;

/// INCR, and start the expiry only when the window opens. A key found without
/// a TTL is given one so it cannot pin a client forever.
const FIXED_WINDOW_SCRIPT: &str = r#"
local hits = redis.call('INCR', KEYS[1])
if hits == 1 or redis.call('TTL', KEYS[1]) == -1 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return hits
"#;

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
    window: Script,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        info!("Redis client configured for rate limiting");
        Ok(Self { client, window: Script::new(FIXED_WINDOW_SCRIPT) })
    }

    async fn window_hit(&self, key: &str, window_seconds: i64) -> RedisResult<i64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        self.window.key(key).arg(window_seconds).invoke_async(&mut conn).await
    }
}

#[async_trait]
impl RateLimiter for RedisClient {
    async fn hit(&self, key: &str, window_seconds: i64) -> RepoResult<i64> {
        Ok(self.window_hit(key, window_seconds).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use activa_core::rate_limit::within_limit;
    use std::time::Duration;

    /// Needs a server at `REDIS_URL` (default `redis://127.0.0.1:6379`).
    #[tokio::test]
    #[ignore]
    async fn test_window_expiry_is_not_pushed_back() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let redis = RedisClient::new(&url).await.unwrap();
        let key = format!("ratelimit:test:{}", uuid::Uuid::new_v4());

        assert!(within_limit(&redis, &key, 2, 2).await.unwrap());
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(within_limit(&redis, &key, 2, 2).await.unwrap());
        assert!(!within_limit(&redis, &key, 2, 2).await.unwrap());

        // The window opened by the first hit has closed, despite the hits since.
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(redis.hit(&key, 2).await.unwrap(), 1);
    }
}
