use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

use super::{CoordinationStore, StoreError, StoreResult};

#[derive(Debug, Clone)]
enum Value {
    Int(i64),
    Text(String),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map_or(false, |at| at <= now)
    }
}

/// In-process store with Redis-like expiry semantics.
///
/// Time is read from `tokio::time`, so tests running with a paused clock can
/// advance past lock windows without sleeping.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store mutex poisoned".to_string()))
    }

    /// Looks up a live entry, evicting it first if it has expired.
    fn live<'a>(
        entries: &'a mut HashMap<String, Entry>,
        key: &str,
        now: Instant,
    ) -> Option<&'a mut Entry> {
        if entries.get(key).map_or(false, |e| e.is_expired(now)) {
            entries.remove(key);
        }
        entries.get_mut(key)
    }

    /// Drops every expired entry. Called on each write so keys that are never
    /// read again do not accumulate.
    fn sweep(entries: &mut HashMap<String, Entry>, now: Instant) {
        entries.retain(|_, e| !e.is_expired(now));
    }

    fn incr_locked(entries: &mut HashMap<String, Entry>, key: &str, now: Instant) -> StoreResult<i64> {
        match Self::live(entries, key, now) {
            Some(entry) => {
                let next = match &entry.value {
                    Value::Int(n) => n + 1,
                    Value::Text(s) => s
                        .parse::<i64>()
                        .map_err(|_| StoreError::WrongType { key: key.to_string() })?
                        + 1,
                };
                entry.value = Value::Int(next);
                Ok(next)
            }
            None => {
                Self::sweep(entries, now);
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: Value::Int(1),
                        expires_at: None,
                    },
                );
                Ok(1)
            }
        }
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock()
            .map(|entries| entries.values().filter(|e| !e.is_expired(now)).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of stored keys, expired or not.
    #[cfg(test)]
    fn stored(&self) -> usize {
        self.lock().map(|entries| entries.len()).unwrap_or(0)
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn incr(&self, key: &str) -> StoreResult<i64> {
        let mut entries = self.lock()?;
        Self::incr_locked(&mut entries, key, Instant::now())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        match Self::live(&mut entries, key, now) {
            Some(entry) => {
                entry.expires_at = Some(now + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn incr_with_expiry(&self, key: &str, ttl: Duration) -> StoreResult<i64> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        let count = Self::incr_locked(&mut entries, key, now)?;
        if let Some(entry) = entries.get_mut(key) {
            if entry.expires_at.is_none() {
                entry.expires_at = Some(now + ttl);
            }
        }
        Ok(count)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut entries = self.lock()?;
        Ok(Self::live(&mut entries, key, Instant::now()).map(|entry| match &entry.value {
            Value::Int(n) => n.to_string(),
            Value::Text(s) => s.clone(),
        }))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        Self::sweep(&mut entries, now);
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at: Some(now + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        Ok(entries.remove(key).map_or(false, |e| !e.is_expired(now)))
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        Ok(Self::live(&mut entries, key, now)
            .and_then(|entry| entry.expires_at)
            .map(|at| at.saturating_duration_since(now)))
    }

    async fn ping(&self) -> StoreResult<()> {
        self.lock().map(|_| ())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
