//! Redis service for short-lived counters (failed logins, failed password confirmations)

use redis::Client;

use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct RedisService {
    client: Client,
}

impl RedisService {
    /// Create the client; no connection is made until first use
    pub fn new(url: &str) -> AppResult<Self> {
        let client = Client::open(url)
            .map_err(|e| AppError::Internal(format!("Failed to create Redis client: {}", e)))?;
        Ok(Self { client })
    }

    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to get Redis connection: {}", e)))
    }

    /// Connection test
    pub async fn ping(&self) -> AppResult<()> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| AppError::Internal(format!("Redis connection test failed: {}", e)))?;
        Ok(())
    }

    /// Increment a failure counter; the window starts at the first failure
    pub async fn record_failure(&self, key: &str, window_seconds: u64) -> AppResult<i64> {
        let mut conn = self.connection().await?;

        let count: i64 = redis::cmd("INCR")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to increment {}: {}", key, e)))?;

        if count == 1 {
            redis::cmd("EXPIRE")
                .arg(key)
                .arg(window_seconds)
                .query_async::<_, ()>(&mut conn)
                .await
                .map_err(|e| AppError::Internal(format!("Failed to set expiry on {}: {}", key, e)))?;
        }
        Ok(count)
    }

    /// Current failure count and seconds until the window closes
    pub async fn failures(&self, key: &str) -> AppResult<(i64, i64)> {
        let mut conn = self.connection().await?;

        let (count, ttl): (Option<i64>, i64) = redis::pipe()
            .cmd("GET")
            .arg(key)
            .cmd("TTL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to read {}: {}", key, e)))?;

        Ok((count.unwrap_or(0), ttl.max(0)))
    }

    pub async fn clear(&self, key: &str) -> AppResult<()> {
        let mut conn = self.connection().await?;
        redis::cmd("DEL")
            .arg(key)
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to delete {}: {}", key, e)))?;
        Ok(())
    }
}

/// Counter key for failed logins of a login name
pub fn login_failures_key(login: &str) -> String {
    format!("auth:login_failures:{}", login.trim().to_lowercase())
}

/// Counter key for failed password confirmations of a user
pub fn confirm_failures_key(user_id: i32) -> String {
    format!("auth:confirm_failures:{}", user_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_key_ignores_case() {
        assert_eq!(login_failures_key(" JDoe "), login_failures_key("jdoe"));
        assert_ne!(login_failures_key("jdoe"), confirm_failures_key(1));
    }

    #[test]
    fn test_client_creation_does_not_connect() {
        assert!(RedisService::new("redis://127.0.0.1:1").is_ok());
        assert!(RedisService::new("not a url").is_err());
    }
}
