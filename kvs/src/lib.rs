// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
#![deny(warnings)]
#![deny(clippy::all)]
#![allow(clippy::len_without_is_empty, clippy::too_many_arguments)]

//! A shared key/value store used for ephemeral cross-process handoff and TTL-bound caches
//! (spec.md glossary: KVS). Two implementations share one trait: `RedisKvs` for every real
//! deployment, `InMemoryKvs` for unit tests that would otherwise need a live Redis.
//!
//! This is deliberately a thin primitive layer (strings, hashes, sorted sets) — job-state
//! semantics (attempts, backoff, leases) live in `job_queue`, which is built on top of it.

mod in_memory;
mod redis_backed;

pub use in_memory::InMemoryKvs;
pub use redis_backed::RedisKvs;

use async_trait::async_trait;

pub type KvResult<T> = Result<T, String>;

#[async_trait]
pub trait KvStore: Send + Sync {
    /// Sets `key` to `value` with a TTL. Used for `execution-result:<submissionId>` and
    /// `socket:<userId>` per §6.
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> KvResult<()>;

    async fn get(&self, key: &str) -> KvResult<Option<String>>;

    async fn del(&self, key: &str) -> KvResult<()>;

    async fn exists(&self, key: &str) -> KvResult<bool>;

    async fn hset(&self, key: &str, field: &str, value: &str) -> KvResult<()>;

    async fn hget(&self, key: &str, field: &str) -> KvResult<Option<String>>;

    async fn hgetall(&self, key: &str) -> KvResult<Vec<(String, String)>>;

    async fn hdel(&self, key: &str, field: &str) -> KvResult<()>;

    /// Adds `member` to the sorted set `key` with `score`. Backs the JobQueue's `waiting`
    /// backlog, scored by next-eligible-time (§4.3).
    async fn zadd(&self, key: &str, member: &str, score: f64) -> KvResult<()>;

    async fn zrem(&self, key: &str, member: &str) -> KvResult<()>;

    /// Pops (and removes) up to `limit` members whose score is `<= max_score`, ordered
    /// ascending. Used to pull jobs whose backoff has elapsed.
    async fn zpop_ready(&self, key: &str, max_score: f64, limit: usize) -> KvResult<Vec<String>>;

    /// Trims the sorted set `key` down to its `max_len` highest-scoring members, removing the
    /// rest, and returns the members removed. Backs `job_queue`'s `removeOnComplete`/
    /// `removeOnFail` retention policy (§4.3) without needing a general range-scan primitive.
    async fn ztrim(&self, key: &str, max_len: usize) -> KvResult<Vec<String>>;

    async fn sadd(&self, key: &str, member: &str) -> KvResult<()>;

    async fn srem(&self, key: &str, member: &str) -> KvResult<()>;

    async fn smembers(&self, key: &str) -> KvResult<Vec<String>>;
}
