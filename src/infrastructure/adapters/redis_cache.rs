use crate::domain::errors::DomainResult;
use crate::ports::CachePort;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tracing::{debug, info};

/// Redis缓存实现（幂等响应等短期数据）
#[derive(Clone)]
pub struct RedisCache {
    connection: ConnectionManager,
}

impl RedisCache {
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }

    /// 按地址建立自动重连的连接
    pub async fn connect(redis_url: &str) -> DomainResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let connection = ConnectionManager::new(client).await?;
        info!("Redis connected");
        Ok(Self::new(connection))
    }
}

#[async_trait]
impl CachePort for RedisCache {
    async fn get(&self, key: &str) -> DomainResult<Option<String>> {
        let value = redis::cmd("GET")
            .arg(key)
            .query_async::<_, Option<String>>(&mut self.connection.clone())
            .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> DomainResult<()> {
        // SETEX 不接受 0 秒
        let seconds = ttl.as_secs().max(1);
        redis::cmd("SETEX")
            .arg(key)
            .arg(seconds)
            .arg(value)
            .query_async::<_, ()>(&mut self.connection.clone())
            .await?;
        debug!("Cached {} for {}s", key, seconds);
        Ok(())
    }

    async fn delete(&self, key: &str) -> DomainResult<()> {
        redis::cmd("DEL")
            .arg(key)
            .query_async::<_, ()>(&mut self.connection.clone())
            .await?;
        Ok(())
    }
}
