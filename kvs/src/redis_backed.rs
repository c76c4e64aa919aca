// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::{KvResult, KvStore};

/// Redis-backed KVS. Holds a `ConnectionManager`, which reconnects with backoff internally and
/// is cheap to clone (an `Arc` handle), matching the long-lived-connection-with-reconnect
/// posture of this codebase's queue worker.
#[derive(Clone)]
pub struct RedisKvs {
    connection: ConnectionManager,
}

impl RedisKvs {
    pub async fn connect(url: &str) -> KvResult<Self> {
        let client = redis::Client::open(url).map_err(|e| format!("invalid KVS_URL: {e}"))?;
        let connection = client
            .get_connection_manager()
            .await
            .map_err(|e| format!("failed to connect to KVS at {url}: {e}"))?;
        Ok(Self { connection })
    }
}

#[async_trait]
impl KvStore for RedisKvs {
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> KvResult<()> {
        let mut conn = self.connection.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl_secs)
            .await
            .map_err(|e| e.to_string())
    }

    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        let mut conn = self.connection.clone();
        conn.get(key).await.map_err(|e| e.to_string())
    }

    async fn del(&self, key: &str) -> KvResult<()> {
        let mut conn = self.connection.clone();
        conn.del::<_, ()>(key).await.map_err(|e| e.to_string())
    }

    async fn exists(&self, key: &str) -> KvResult<bool> {
        let mut conn = self.connection.clone();
        conn.exists(key).await.map_err(|e| e.to_string())
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> KvResult<()> {
        let mut conn = self.connection.clone();
        conn.hset::<_, _, _, ()>(key, field, value)
            .await
            .map_err(|e| e.to_string())
    }

    async fn hget(&self, key: &str, field: &str) -> KvResult<Option<String>> {
        let mut conn = self.connection.clone();
        conn.hget(key, field).await.map_err(|e| e.to_string())
    }

    async fn hgetall(&self, key: &str) -> KvResult<Vec<(String, String)>> {
        let mut conn = self.connection.clone();
        let map: std::collections::HashMap<String, String> =
            conn.hgetall(key).await.map_err(|e| e.to_string())?;
        Ok(map.into_iter().collect())
    }

    async fn hdel(&self, key: &str, field: &str) -> KvResult<()> {
        let mut conn = self.connection.clone();
        conn.hdel::<_, _, ()>(key, field)
            .await
            .map_err(|e| e.to_string())
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> KvResult<()> {
        let mut conn = self.connection.clone();
        conn.zadd::<_, _, _, ()>(key, member, score)
            .await
            .map_err(|e| e.to_string())
    }

    async fn zrem(&self, key: &str, member: &str) -> KvResult<()> {
        let mut conn = self.connection.clone();
        conn.zrem::<_, _, ()>(key, member)
            .await
            .map_err(|e| e.to_string())
    }

    async fn zpop_ready(&self, key: &str, max_score: f64, limit: usize) -> KvResult<Vec<String>> {
        let mut conn = self.connection.clone();
        let ready: Vec<String> = conn
            .zrangebyscore_limit(key, f64::NEG_INFINITY, max_score, 0, limit as isize)
            .await
            .map_err(|e| e.to_string())?;
        for member in &ready {
            // Best-effort removal: a lost race here just means another poll sees the member
            // again, which job_queue's lease check tolerates.
            let _: Result<(), _> = conn.zrem(key, member).await;
        }
        Ok(ready)
    }

    async fn ztrim(&self, key: &str, max_len: usize) -> KvResult<Vec<String>> {
        let mut conn = self.connection.clone();
        let card: usize = conn.zcard(key).await.map_err(|e| e.to_string())?;
        if card <= max_len {
            return Ok(Vec::new());
        }
        let overflow = card - max_len;
        // Redis ZRANGE returns ascending by score, i.e. oldest first.
        let stale: Vec<String> = conn
            .zrange(key, 0, (overflow as isize) - 1)
            .await
            .map_err(|e| e.to_string())?;
        for member in &stale {
            conn.zrem::<_, _, ()>(key, member)
                .await
                .map_err(|e| e.to_string())?;
        }
        Ok(stale)
    }

    async fn sadd(&self, key: &str, member: &str) -> KvResult<()> {
        let mut conn = self.connection.clone();
        conn.sadd::<_, _, ()>(key, member)
            .await
            .map_err(|e| e.to_string())
    }

    async fn srem(&self, key: &str, member: &str) -> KvResult<()> {
        let mut conn = self.connection.clone();
        conn.srem::<_, _, ()>(key, member)
            .await
            .map_err(|e| e.to_string())
    }

    async fn smembers(&self, key: &str) -> KvResult<Vec<String>> {
        let mut conn = self.connection.clone();
        conn.smembers(key).await.map_err(|e| e.to_string())
    }
}
