//! In-process pending-registration cache.
//!
//! A mutex-guarded map keyed by email, swept periodically by a background
//! task. This is the only explicit concurrency primitive in the system;
//! everything else rides on the database's default isolation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::constants::CACHE_SWEEP_INTERVAL_SECS;
use crate::models::{OtpCheck, PendingRegistration};

/// Result of an OTP check routed through the cache
#[derive(Debug)]
pub enum CacheOtpResult {
    /// No pending registration (never started, expired, or already consumed)
    NotFound,
    /// Code matched; the entry has been removed and is returned for promotion
    Verified(Box<PendingRegistration>),
    /// Code mismatched; the attempt counter was incremented
    Mismatch { remaining: u32 },
    /// Attempt budget spent; the entry has been removed
    Exhausted,
}

/// Mutex-guarded TTL map of pending registrations
#[derive(Debug, Default)]
pub struct PendingCache {
    entries: Mutex<HashMap<String, PendingRegistration>>,
}

impl PendingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a pending registration. Returns false when an unexpired entry
    /// already exists for the email.
    pub fn insert(&self, entry: PendingRegistration) -> bool {
        let mut map = self.entries.lock().expect("pending cache poisoned");
        let now = Instant::now();
        if let Some(existing) = map.get(&entry.email) {
            if !existing.is_expired(now) {
                return false;
            }
        }
        map.insert(entry.email.clone(), entry);
        true
    }

    /// Clone the live entry for an email, dropping it first if expired
    pub fn get(&self, email: &str) -> Option<PendingRegistration> {
        let mut map = self.entries.lock().expect("pending cache poisoned");
        let now = Instant::now();
        match map.get(email) {
            Some(entry) if entry.is_expired(now) => {
                map.remove(email);
                None
            }
            Some(entry) => Some(entry.clone()),
            None => None,
        }
    }

    /// Remove an entry outright (successful verification or abandoned flow)
    pub fn remove(&self, email: &str) {
        let mut map = self.entries.lock().expect("pending cache poisoned");
        map.remove(email);
    }

    /// Check an OTP code under the lock so the attempt counter cannot race
    pub fn check_otp(&self, email: &str, code: &str) -> CacheOtpResult {
        let mut map = self.entries.lock().expect("pending cache poisoned");
        let now = Instant::now();

        let Some(entry) = map.get_mut(email) else {
            return CacheOtpResult::NotFound;
        };
        if entry.is_expired(now) {
            map.remove(email);
            return CacheOtpResult::NotFound;
        }

        match entry.check_otp(code) {
            OtpCheck::Verified => {
                let entry = map.remove(email).map(Box::new);
                match entry {
                    Some(entry) => CacheOtpResult::Verified(entry),
                    None => CacheOtpResult::NotFound,
                }
            }
            OtpCheck::Mismatch { remaining } => CacheOtpResult::Mismatch { remaining },
            OtpCheck::Exhausted => {
                map.remove(email);
                CacheOtpResult::Exhausted
            }
        }
    }

    /// Drop every expired entry; returns how many were removed
    pub fn sweep(&self) -> usize {
        let mut map = self.entries.lock().expect("pending cache poisoned");
        let now = Instant::now();
        let before = map.len();
        map.retain(|_, entry| !entry.is_expired(now));
        before - map.len()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.lock().expect("pending cache poisoned").len()
    }
}

/// Spawn the periodic sweep that enforces pending-registration TTLs
pub fn spawn_sweeper(cache: Arc<PendingCache>) {
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(Duration::from_secs(CACHE_SWEEP_INTERVAL_SECS));
        loop {
            ticker.tick().await;
            let removed = cache.sweep();
            if removed > 0 {
                tracing::debug!("Swept {} expired pending registrations", removed);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(email: &str, ttl: Duration) -> PendingRegistration {
        PendingRegistration {
            request_id: "req".into(),
            name: "Bob".into(),
            email: email.into(),
            password_hash: "hash".into(),
            user_type: "viewer".into(),
            otp_code: "424242".into(),
            attempts: 0,
            created_at: Instant::now(),
            ttl,
        }
    }

    #[test]
    fn test_insert_rejects_duplicate_pending() {
        let cache = PendingCache::new();
        assert!(cache.insert(entry("a@b.com", Duration::from_secs(60))));
        assert!(!cache.insert(entry("a@b.com", Duration::from_secs(60))));
    }

    #[test]
    fn test_expired_entry_is_replaceable_and_unreadable() {
        let cache = PendingCache::new();
        assert!(cache.insert(entry("a@b.com", Duration::from_secs(0))));
        assert!(cache.get("a@b.com").is_none());
        assert!(cache.insert(entry("a@b.com", Duration::from_secs(60))));
        assert!(cache.get("a@b.com").is_some());
    }

    #[test]
    fn test_check_otp_verify_consumes_entry() {
        let cache = PendingCache::new();
        cache.insert(entry("a@b.com", Duration::from_secs(60)));
        match cache.check_otp("a@b.com", "424242") {
            CacheOtpResult::Verified(p) => assert_eq!(p.email, "a@b.com"),
            other => panic!("expected Verified, got {:?}", other),
        }
        assert!(matches!(
            cache.check_otp("a@b.com", "424242"),
            CacheOtpResult::NotFound
        ));
    }

    #[test]
    fn test_check_otp_exhaustion_drops_entry() {
        let cache = PendingCache::new();
        cache.insert(entry("a@b.com", Duration::from_secs(60)));
        assert!(matches!(
            cache.check_otp("a@b.com", "000000"),
            CacheOtpResult::Mismatch { remaining: 2 }
        ));
        assert!(matches!(
            cache.check_otp("a@b.com", "000000"),
            CacheOtpResult::Mismatch { remaining: 1 }
        ));
        assert!(matches!(
            cache.check_otp("a@b.com", "000000"),
            CacheOtpResult::Exhausted
        ));
        // The budget is spent and the entry is gone; no further increments
        assert!(matches!(
            cache.check_otp("a@b.com", "424242"),
            CacheOtpResult::NotFound
        ));
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let cache = PendingCache::new();
        cache.insert(entry("old@b.com", Duration::from_secs(0)));
        cache.insert(entry("new@b.com", Duration::from_secs(60)));
        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.len(), 1);
    }
}
