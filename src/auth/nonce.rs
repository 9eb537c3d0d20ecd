//! Replay cache shared by every connection handler of a process.

use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::RngCore;
use rand::rngs::OsRng;
use tracing::warn;

/// Default nonce length in bytes.
pub const DEFAULT_NONCE_LEN: usize = 32;
/// Default retention window.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(30);
/// Default bound on remembered nonces.
pub const DEFAULT_CAPACITY: usize = 1 << 16;

#[derive(Debug, Default)]
struct Entries {
    seen: HashSet<Vec<u8>>,
    order: VecDeque<(Vec<u8>, Instant)>,
}

/// Bounded, time-windowed set of recently seen nonces.
///
/// All operations lock one internal mutex, so [`NonceCache::insert`] checks
/// and records in a single step: two handlers racing on the same nonce see
/// exactly one success.
///
/// A live entry is never dropped before its retention window ends. When the
/// bound is reached the cache refuses new nonces until older ones expire.
#[derive(Debug)]
pub struct NonceCache {
    entries: Mutex<Entries>,
    nonce_len: usize,
    retention: Duration,
    capacity: usize,
}

impl NonceCache {
    /// Create a cache issuing `nonce_len`-byte nonces and remembering each
    /// for `retention`.
    #[must_use]
    pub fn new(nonce_len: usize, retention: Duration) -> Self {
        Self::with_capacity(nonce_len, retention, DEFAULT_CAPACITY)
    }

    /// Like [`NonceCache::new`] with an explicit bound on live entries.
    #[must_use]
    pub fn with_capacity(nonce_len: usize, retention: Duration, capacity: usize) -> Self {
        Self {
            entries: Mutex::new(Entries::default()),
            nonce_len,
            retention,
            capacity: capacity.max(1),
        }
    }

    /// Length of nonces produced by [`NonceCache::generate`].
    #[must_use]
    pub const fn nonce_len(&self) -> usize {
        self.nonce_len
    }

    /// Retention window.
    #[must_use]
    pub const fn retention(&self) -> Duration {
        self.retention
    }

    /// Whether `nonce` was recorded within the retention window.
    #[must_use]
    pub fn contains(&self, nonce: &[u8]) -> bool {
        let mut entries = self.entries.lock();
        self.evict_expired(&mut entries);
        entries.seen.contains(nonce)
    }

    /// Record `nonce`; returns `false` if it was already present (replay)
    /// or the cache is full.
    pub fn insert(&self, nonce: &[u8]) -> bool {
        let mut entries = self.entries.lock();
        self.evict_expired(&mut entries);
        if entries.seen.contains(nonce) || self.is_full(&entries) {
            return false;
        }
        Self::record(&mut entries, nonce.to_vec());
        true
    }

    /// Produce a random nonce not currently in the cache and record it.
    ///
    /// Returns `None` while the cache is full.
    #[must_use]
    pub fn generate(&self) -> Option<Vec<u8>> {
        let mut entries = self.entries.lock();
        self.evict_expired(&mut entries);
        if self.is_full(&entries) {
            warn!(capacity = self.capacity, "nonce cache full");
            return None;
        }
        loop {
            let mut nonce = vec![0u8; self.nonce_len];
            OsRng.fill_bytes(&mut nonce);
            if !entries.seen.contains(&nonce) {
                Self::record(&mut entries, nonce.clone());
                return Some(nonce);
            }
        }
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        let mut entries = self.entries.lock();
        self.evict_expired(&mut entries);
        entries.seen.len()
    }

    /// Whether the cache holds no live entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_full(&self, entries: &Entries) -> bool {
        entries.order.len() >= self.capacity
    }

    fn record(entries: &mut Entries, nonce: Vec<u8>) {
        entries.seen.insert(nonce.clone());
        entries.order.push_back((nonce, Instant::now()));
    }

    fn evict_expired(&self, entries: &mut Entries) {
        while let Some((_, recorded)) = entries.order.front() {
            if recorded.elapsed() < self.retention {
                break;
            }
            if let Some((nonce, _)) = entries.order.pop_front() {
                entries.seen.remove(&nonce);
            }
        }
    }
}

impl Default for NonceCache {
    fn default() -> Self {
        Self::new(DEFAULT_NONCE_LEN, DEFAULT_RETENTION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn insert_rejects_duplicates() {
        let cache = NonceCache::new(8, Duration::from_secs(10));
        let nonce = b"handshake nonce";

        assert!(cache.insert(nonce));
        assert!(!cache.insert(nonce), "replay must be rejected");
        assert!(cache.contains(nonce));
    }

    #[test]
    fn generate_records_nonce() {
        let cache = NonceCache::default();
        let nonce = cache.generate().unwrap();

        assert_eq!(nonce.len(), DEFAULT_NONCE_LEN);
        assert!(cache.contains(&nonce));
        assert!(!cache.insert(&nonce));
    }

    #[test]
    fn generated_nonces_are_distinct() {
        let cache = NonceCache::new(16, Duration::from_secs(10));
        let a = cache.generate().unwrap();
        let b = cache.generate().unwrap();
        assert_ne!(a, b);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn entries_expire_after_retention() {
        let cache = NonceCache::new(8, Duration::from_millis(20));
        assert!(cache.insert(b"short lived"));
        thread::sleep(Duration::from_millis(60));

        assert!(!cache.contains(b"short lived"));
        assert!(cache.is_empty());
        assert!(cache.insert(b"short lived"));
    }

    #[test]
    fn full_cache_refuses_instead_of_forgetting() {
        let cache = NonceCache::with_capacity(8, Duration::from_secs(60), 2);
        assert!(cache.insert(b"one"));
        assert!(cache.insert(b"two"));
        assert!(!cache.insert(b"three"));
        assert!(cache.generate().is_none());

        assert!(cache.contains(b"one"));
        assert!(!cache.insert(b"one"), "live nonce must stay rejected");
        assert!(!cache.contains(b"three"));
    }

    #[test]
    fn flooding_does_not_evict_live_nonce() {
        let cache = NonceCache::default();
        assert!(cache.insert(b"hello nonce"));
        for i in 0..DEFAULT_CAPACITY as u64 {
            cache.insert(&i.to_be_bytes());
        }

        assert_eq!(cache.len(), DEFAULT_CAPACITY);
        assert!(!cache.insert(b"hello nonce"));
    }

    #[test]
    fn full_cache_recovers_after_retention() {
        let cache = NonceCache::with_capacity(8, Duration::from_millis(20), 1);
        assert!(cache.insert(b"first"));
        assert!(!cache.insert(b"second"));
        thread::sleep(Duration::from_millis(60));

        assert!(cache.insert(b"second"));
        assert!(cache.generate().is_none());
    }

    #[test]
    fn concurrent_insert_accepts_once() {
        let cache = Arc::new(NonceCache::default());
        let accepted = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let accepted = Arc::clone(&accepted);
                thread::spawn(move || {
                    if cache.insert(b"contested") {
                        accepted.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(accepted.load(Ordering::SeqCst), 1);
    }
}
