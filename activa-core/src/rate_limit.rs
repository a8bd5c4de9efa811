use async_trait::async_trait;

use crate::repository::RepoResult;

/// Per-key hit counter over fixed windows.
///
/// A window opens on the first hit for a key and closes `window_seconds`
/// later. Hits inside an open window never move its end.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Records one hit and returns the number of hits in the key's current window.
    async fn hit(&self, key: &str, window_seconds: i64) -> RepoResult<i64>;
}

/// `true` while `key` has seen at most `limit` hits in its current window.
pub async fn within_limit(
    limiter: &dyn RateLimiter,
    key: &str,
    limit: i64,
    window_seconds: i64,
) -> RepoResult<bool> {
    Ok(limiter.hit(key, window_seconds).await? <= limit)
}
