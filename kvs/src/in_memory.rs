// Copyright 2018 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{KvResult, KvStore};

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

#[derive(Default)]
struct State {
    strings: HashMap<String, Entry>,
    hashes: HashMap<String, HashMap<String, String>>,
    sorted_sets: HashMap<String, BTreeMap<(i64, String), ()>>,
    sets: HashMap<String, HashSet<String>>,
}

/// In-process stand-in for Redis, for unit tests of `job_queue`/`room_fabric` that would
/// otherwise need a live Redis instance. TTLs are checked lazily on read, the same
/// lazy-expiry posture as the teacher's `ImagePullScope` caching.
#[derive(Clone, Default)]
pub struct InMemoryKvs {
    state: Arc<Mutex<State>>,
}

impl InMemoryKvs {
    pub fn new() -> Self {
        Self::default()
    }

    fn sweep_expired(state: &mut State, key: &str) {
        if let Some(entry) = state.strings.get(key) {
            if let Some(expires_at) = entry.expires_at {
                if Instant::now() >= expires_at {
                    state.strings.remove(key);
                }
            }
        }
    }

    fn score_key(score: f64) -> i64 {
        // Millisecond-resolution scores are all job_queue needs; avoids pulling in an
        // ordered-float crate for a workspace that otherwise has no use for one.
        (score * 1000.0).round() as i64
    }
}

#[async_trait]
impl KvStore for InMemoryKvs {
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> KvResult<()> {
        let mut state = self.state.lock();
        state.strings.insert(
            key.to_owned(),
            Entry {
                value: value.to_owned(),
                expires_at: Some(Instant::now() + Duration::from_secs(ttl_secs)),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> KvResult<Option<String>> {
        let mut state = self.state.lock();
        Self::sweep_expired(&mut state, key);
        Ok(state.strings.get(key).map(|e| e.value.clone()))
    }

    async fn del(&self, key: &str) -> KvResult<()> {
        let mut state = self.state.lock();
        state.strings.remove(key);
        state.hashes.remove(key);
        state.sorted_sets.remove(key);
        state.sets.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> KvResult<bool> {
        let mut state = self.state.lock();
        Self::sweep_expired(&mut state, key);
        Ok(state.strings.contains_key(key))
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> KvResult<()> {
        let mut state = self.state.lock();
        state
            .hashes
            .entry(key.to_owned())
            .or_default()
            .insert(field.to_owned(), value.to_owned());
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> KvResult<Option<String>> {
        let state = self.state.lock();
        Ok(state
            .hashes
            .get(key)
            .and_then(|h| h.get(field))
            .cloned())
    }

    async fn hgetall(&self, key: &str) -> KvResult<Vec<(String, String)>> {
        let state = self.state.lock();
        Ok(state
            .hashes
            .get(key)
            .map(|h| h.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn hdel(&self, key: &str, field: &str) -> KvResult<()> {
        let mut state = self.state.lock();
        if let Some(hash) = state.hashes.get_mut(key) {
            hash.remove(field);
        }
        Ok(())
    }

    async fn zadd(&self, key: &str, member: &str, score: f64) -> KvResult<()> {
        let mut state = self.state.lock();
        let set = state.sorted_sets.entry(key.to_owned()).or_default();
        set.retain(|(_, m), _| m != member);
        set.insert((Self::score_key(score), member.to_owned()), ());
        Ok(())
    }

    async fn zrem(&self, key: &str, member: &str) -> KvResult<()> {
        let mut state = self.state.lock();
        if let Some(set) = state.sorted_sets.get_mut(key) {
            set.retain(|(_, m), _| m != member);
        }
        Ok(())
    }

    async fn zpop_ready(&self, key: &str, max_score: f64, limit: usize) -> KvResult<Vec<String>> {
        let mut state = self.state.lock();
        let max = Self::score_key(max_score);
        let Some(set) = state.sorted_sets.get_mut(key) else {
            return Ok(Vec::new());
        };
        let ready: Vec<(i64, String)> = set
            .keys()
            .filter(|(score, _)| *score <= max)
            .take(limit)
            .cloned()
            .collect();
        for key_tuple in &ready {
            set.remove(key_tuple);
        }
        Ok(ready.into_iter().map(|(_, member)| member).collect())
    }

    async fn ztrim(&self, key: &str, max_len: usize) -> KvResult<Vec<String>> {
        let mut state = self.state.lock();
        let Some(set) = state.sorted_sets.get_mut(key) else {
            return Ok(Vec::new());
        };
        if set.len() <= max_len {
            return Ok(Vec::new());
        }
        let overflow = set.len() - max_len;
        let stale: Vec<(i64, String)> = set.keys().take(overflow).cloned().collect();
        for key_tuple in &stale {
            set.remove(key_tuple);
        }
        Ok(stale.into_iter().map(|(_, member)| member).collect())
    }

    async fn sadd(&self, key: &str, member: &str) -> KvResult<()> {
        let mut state = self.state.lock();
        state
            .sets
            .entry(key.to_owned())
            .or_default()
            .insert(member.to_owned());
        Ok(())
    }

    async fn srem(&self, key: &str, member: &str) -> KvResult<()> {
        let mut state = self.state.lock();
        if let Some(set) = state.sets.get_mut(key) {
            set.remove(member);
        }
        Ok(())
    }

    async fn smembers(&self, key: &str) -> KvResult<Vec<String>> {
        let state = self.state.lock();
        Ok(state
            .sets
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_ex_roundtrips_before_ttl_elapses() {
        let kvs = InMemoryKvs::new();
        kvs.set_ex("k", "v", 60).await.unwrap();
        assert_eq!(kvs.get("k").await.unwrap(), Some("v".to_owned()));
    }

    #[tokio::test]
    async fn zpop_ready_only_returns_members_at_or_below_cutoff() {
        let kvs = InMemoryKvs::new();
        kvs.zadd("q", "early", 10.0).await.unwrap();
        kvs.zadd("q", "late", 100.0).await.unwrap();
        let ready = kvs.zpop_ready("q", 50.0, 10).await.unwrap();
        assert_eq!(ready, vec!["early".to_owned()]);
        // `late` should still be present, `early` gone.
        let ready_later = kvs.zpop_ready("q", 1000.0, 10).await.unwrap();
        assert_eq!(ready_later, vec!["late".to_owned()]);
    }

    #[tokio::test]
    async fn ztrim_keeps_only_the_highest_scoring_members() {
        let kvs = InMemoryKvs::new();
        kvs.zadd("completed", "a", 1.0).await.unwrap();
        kvs.zadd("completed", "b", 2.0).await.unwrap();
        kvs.zadd("completed", "c", 3.0).await.unwrap();
        let removed = kvs.ztrim("completed", 2).await.unwrap();
        assert_eq!(removed, vec!["a".to_owned()]);
        assert_eq!(kvs.zpop_ready("completed", 10.0, 10).await.unwrap(), vec!["b".to_owned(), "c".to_owned()]);
    }

    #[tokio::test]
    async fn hash_ops_roundtrip() {
        let kvs = InMemoryKvs::new();
        kvs.hset("job:1", "state", "waiting").await.unwrap();
        assert_eq!(
            kvs.hget("job:1", "state").await.unwrap(),
            Some("waiting".to_owned())
        );
        kvs.hdel("job:1", "state").await.unwrap();
        assert_eq!(kvs.hget("job:1", "state").await.unwrap(), None);
    }
}
