use chrono::Utc;

use crate::{
    errors::{AppError, Result},
    services::redis::RedisService,
};

// Token bucket kept in a Redis hash. Refills `capacity` tokens per `window`
// seconds, proportionally to elapsed time.
const TOKEN_BUCKET_SCRIPT: &str = r#"
    local key = KEYS[1]
    local capacity = tonumber(ARGV[1])
    local window = tonumber(ARGV[2])
    local now = tonumber(ARGV[3])
    local requested = tonumber(ARGV[4])

    local bucket = redis.call('HMGET', key, 'tokens', 'last_refill')
    local tokens = tonumber(bucket[1]) or capacity
    local last_refill = tonumber(bucket[2]) or now

    local elapsed = now - last_refill
    local refill = math.floor(elapsed * capacity / window)
    if refill > 0 then
        tokens = math.min(capacity, tokens + refill)
        last_refill = now
    end

    local allowed = 0
    if tokens >= requested then
        tokens = tokens - requested
        allowed = 1
    end

    redis.call('HMSET', key, 'tokens', tokens, 'last_refill', last_refill)
    redis.call('EXPIRE', key, window * 2)

    return {allowed, tokens}
"#;

#[derive(Clone)]
pub struct RateLimiter {
    redis: RedisService,
    capacity: u32,
    window_secs: u64,
}

impl RateLimiter {
    pub fn new(redis: RedisService, capacity: u32, window_secs: u64) -> Self {
        Self {
            redis,
            capacity,
            window_secs: window_secs.max(1),
        }
    }

    pub async fn check_rate_limit(&self, user_id: &str, action: &str) -> Result<RateLimitResult> {
        let key = bucket_key(user_id, action);
        let now = Utc::now().timestamp();

        let mut conn = self.redis.connection_manager().clone();
        let result: Vec<i64> = redis::Script::new(TOKEN_BUCKET_SCRIPT)
            .key(&key)
            .arg(self.capacity)
            .arg(self.window_secs)
            .arg(now)
            .arg(1)
            .invoke_async(&mut conn)
            .await?;

        let (allowed, remaining) = match result.as_slice() {
            [allowed, remaining, ..] => (*allowed == 1, *remaining),
            _ => {
                return Err(AppError::Internal(anyhow::anyhow!(
                    "unexpected rate limiter reply: {:?}",
                    result
                )))
            }
        };

        Ok(RateLimitResult {
            allowed,
            remaining_tokens: u32::try_from(remaining).unwrap_or(0),
        })
    }

    /// Fails with [`AppError::RateLimit`] when the bucket is empty.
    pub async fn enforce(&self, user_id: &str, action: &str) -> Result<RateLimitResult> {
        let result = self.check_rate_limit(user_id, action).await?;
        if !result.allowed {
            tracing::warn!(user_id, action, "Rate limit exceeded");
            return Err(AppError::RateLimit);
        }
        tracing::debug!(user_id, action, remaining = result.remaining_tokens, "Rate limit checked");
        Ok(result)
    }
}

fn bucket_key(user_id: &str, action: &str) -> String {
    format!("rate_limit:{}:{}", user_id, action)
}

#[derive(Debug)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub remaining_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_key_is_scoped_per_user_and_action() {
        assert_eq!(bucket_key("user-1", "generate"), "rate_limit:user-1:generate");
        assert_ne!(bucket_key("user-1", "generate"), bucket_key("user-2", "generate"));
    }

    // Needs a running Redis; set TEST_REDIS_URL to run.
    #[tokio::test]
    #[ignore]
    async fn test_bucket_empties_after_capacity() {
        let url = std::env::var("TEST_REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".into());
        let redis = RedisService::new(&url).await.unwrap();
        let limiter = RateLimiter::new(redis, 2, 60);
        let user = format!("rl-test-{}", Utc::now().timestamp_nanos_opt().unwrap_or_default());

        let first = limiter.check_rate_limit(&user, "generate").await.unwrap();
        assert!(first.allowed);
        assert_eq!(first.remaining_tokens, 1);
        assert!(limiter.check_rate_limit(&user, "generate").await.unwrap().allowed);
        assert!(matches!(
            limiter.enforce(&user, "generate").await,
            Err(AppError::RateLimit)
        ));
    }
}
