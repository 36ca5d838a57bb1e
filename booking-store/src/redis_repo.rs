use async_trait::async_trait;
use booking_core::{CoreError, CoreResult, SweepLease};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

const RELEASE_SCRIPT: &str = r#"
    if redis.call("GET", KEYS[1]) == ARGV[1] then
        return redis.call("DEL", KEYS[1])
    else
        return 0
    end
"#;

/// Sweep lease shared by every instance through Redis.
///
/// Acquire is `SET key token NX PX ttl`; the TTL frees the lease if its holder
/// dies mid-sweep. Release deletes the key only while it still carries this
/// instance's token.
#[derive(Clone)]
pub struct RedisSweepLease {
    client: redis::Client,
    key: String,
    token: String,
    ttl: Duration,
}

fn storage(e: redis::RedisError) -> CoreError {
    CoreError::StorageError(format!("redis: {}", e))
}

impl RedisSweepLease {
    pub fn new(
        connection_string: &str,
        key: impl Into<String>,
        ttl: Duration,
    ) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self {
            client,
            key: key.into(),
            token: Uuid::new_v4().to_string(),
            ttl,
        })
    }

    pub async fn ping(&self) -> Result<(), redis::RedisError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl SweepLease for RedisSweepLease {
    async fn try_acquire(&self) -> CoreResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(storage)?;

        let result: Option<String> = redis::cmd("SET")
            .arg(&self.key)
            .arg(&self.token)
            .arg("NX")
            .arg("PX")
            .arg(self.ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(storage)?;

        debug!(key = %self.key, acquired = result.is_some(), "sweep lease attempt");
        Ok(result.is_some())
    }

    async fn release(&self) -> CoreResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await.map_err(storage)?;

        let deleted: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(&self.key)
            .arg(&self.token)
            .invoke_async(&mut conn)
            .await
            .map_err(storage)?;

        if deleted == 0 {
            warn!(key = %self.key, "sweep lease expired before release");
        }
        Ok(())
    }
}
