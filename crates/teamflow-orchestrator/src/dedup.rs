use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// One remembered submission.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub request: String,
    pub team: String,
    pub result: serde_json::Value,
    created: Instant,
}

impl CacheEntry {
    fn expired(&self, ttl: Duration) -> bool {
        self.created.elapsed() >= ttl
    }
}

/// Outcome of [`DeduplicationCache::claim`].
#[derive(Debug, Clone, PartialEq)]
pub enum Claim {
    /// No live entry existed; the caller now owns the fingerprint.
    Claimed,
    /// A live entry exists; its cached result is returned.
    Duplicate(serde_json::Value),
}

/// Short-lived memory of `(team, request)` submissions.
///
/// Entries expire after `ttl`. An expired entry is evicted when its key is
/// next touched; [`purge_expired`](Self::purge_expired) clears the rest.
pub struct DeduplicationCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl DeduplicationCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Hex SHA-256 of the lowercased, trimmed `team:request`.
    pub fn fingerprint(request: &str, team: &str) -> String {
        let key = format!("{}:{}", team.trim(), request.trim()).to_lowercase();
        hex::encode(Sha256::digest(key.as_bytes()))
    }

    pub fn is_duplicate(&self, request: &str, team: &str) -> bool {
        self.lookup(request, team).is_some()
    }

    /// Store (or refresh) the result for a submission.
    pub fn remember(&self, request: &str, team: &str, result: serde_json::Value) {
        let key = Self::fingerprint(request, team);
        debug!(fingerprint = %key, team = %team, "Remembering submission");
        self.entries.lock().insert(
            key,
            CacheEntry {
                request: request.to_string(),
                team: team.to_string(),
                result,
                created: Instant::now(),
            },
        );
    }

    pub fn lookup(&self, request: &str, team: &str) -> Option<serde_json::Value> {
        let key = Self::fingerprint(request, team);
        let mut entries = self.entries.lock();
        match entries.get(&key) {
            Some(entry) if entry.expired(self.ttl) => {
                entries.remove(&key);
                None
            }
            Some(entry) => Some(entry.result.clone()),
            None => None,
        }
    }

    /// Atomically check-and-remember. Two concurrent submissions of the same
    /// request cannot both observe [`Claim::Claimed`].
    pub fn claim(&self, request: &str, team: &str, placeholder: serde_json::Value) -> Claim {
        let key = Self::fingerprint(request, team);
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(&key) {
            if !entry.expired(self.ttl) {
                return Claim::Duplicate(entry.result.clone());
            }
        }
        entries.insert(
            key,
            CacheEntry {
                request: request.to_string(),
                team: team.to_string(),
                result: placeholder,
                created: Instant::now(),
            },
        );
        Claim::Claimed
    }

    pub fn forget(&self, request: &str, team: &str) {
        self.entries.lock().remove(&Self::fingerprint(request, team));
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| !e.expired(self.ttl));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for DeduplicationCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}
