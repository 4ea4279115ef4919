//! # Session Registry
//!
//! Lock-striped table of session records keyed by the exact code bytes.
//!
//! ## Features
//! - **Sharded**: `shard_count` independent `RwLock<HashMap>` stripes, picked by hashing the code
//! - **TTL-based expiration**: A record expires once it goes `ttl` without being touched
//! - **Lazy eviction**: Lookups treat expired records as absent and drop them
//! - **Collision-free allocation**: New codes are inserted only into vacant slots
//!
//! ## Usage
//! ```rust
//! use captcha_relay::session::SessionRegistry;
//! use bytes::Bytes;
//! use std::time::Duration;
//!
//! let registry = SessionRegistry::new(Duration::from_secs(60));
//! let code = registry.allocate();
//! registry.complete(code.clone(), Bytes::from_static(b"ticket"));
//! assert_eq!(registry.query_status(&code), Some(Some(Bytes::from_static(b"ticket"))));
//! ```

use std::collections::hash_map::{Entry, HashMap, RandomState};
use std::hash::BuildHasher;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::RwLock;
use rand::Rng;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::config::ServerConfig;
use crate::core::packet::{display_code, CaptchaInfo};
use crate::session::code::{generate_code, DEFAULT_CODE_LENGTH};
use crate::utils::metrics::global_metrics;
use crate::utils::timeout::SESSION_TTL;

/// Default number of lock stripes.
pub const DEFAULT_SHARD_COUNT: usize = 16;

type Shard = RwLock<HashMap<Bytes, SessionRecord>>;

/// State kept for one process code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub code: Bytes,
    pub ticket: Option<Bytes>,
    pub captcha_type: u16,
    pub captcha_data: Option<Bytes>,
    last_touched: Instant,
}

impl SessionRecord {
    fn new(code: Bytes, now: Instant) -> Self {
        Self {
            code,
            ticket: None,
            captcha_type: 0,
            captcha_data: None,
            last_touched: now,
        }
    }

    /// Strictly greater than `ttl`: a record is still live at exactly `ttl`.
    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.last_touched) > ttl
    }

    pub fn last_touched(&self) -> Instant {
        self.last_touched
    }

    pub fn captcha_info(&self) -> CaptchaInfo {
        CaptchaInfo {
            code: self.code.clone(),
            captcha_type: self.captcha_type,
            captcha_data: self.captcha_data.clone(),
        }
    }
}

/// Point-in-time view of the registry.
#[derive(Debug, Clone)]
pub struct RegistryStats {
    /// Records currently stored, expired ones included
    pub total_entries: usize,
    /// Stored records already past their TTL
    pub expired_entries: usize,
    pub shard_count: usize,
    pub ttl: Duration,
}

/// Shared table of live sessions, one per server.
pub struct SessionRegistry {
    shards: Box<[Shard]>,
    hasher: RandomState,
    ttl: Duration,
    code_length: usize,
}

impl SessionRegistry {
    /// Registry with default sharding and 8-byte codes.
    pub fn new(ttl: Duration) -> Self {
        Self::with_shards(ttl, DEFAULT_SHARD_COUNT, DEFAULT_CODE_LENGTH)
    }

    /// # Arguments
    /// * `ttl` - Idle time after which a record expires
    /// * `shard_count` - Number of lock stripes (at least 1)
    /// * `code_length` - Length of allocated codes (at least 1)
    pub fn with_shards(ttl: Duration, shard_count: usize, code_length: usize) -> Self {
        let shards = (0..shard_count.max(1))
            .map(|_| RwLock::new(HashMap::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            shards,
            hasher: RandomState::new(),
            ttl,
            code_length: code_length.max(1),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::with_shards(config.session_ttl, config.shard_count, config.code_length)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn code_length(&self) -> usize {
        self.code_length
    }

    #[inline]
    fn shard(&self, code: &[u8]) -> &Shard {
        let idx = self.hasher.hash_one(code) as usize % self.shards.len();
        &self.shards[idx]
    }

    /// Allocate a fresh code using the thread-local RNG.
    pub fn allocate(&self) -> Bytes {
        self.allocate_with(&mut rand::rng())
    }

    /// Allocate a fresh code, redrawing until a vacant slot is found.
    ///
    /// An expired record occupying the drawn code counts as vacant.
    pub fn allocate_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Bytes {
        let mut collisions = 0u64;
        loop {
            let code = generate_code(rng, self.code_length);
            let now = Instant::now();
            let mut shard = self.shard(&code).write();
            match shard.entry(code) {
                Entry::Vacant(slot) => {
                    let code = slot.key().clone();
                    slot.insert(SessionRecord::new(code.clone(), now));
                    global_metrics().code_allocated(collisions);
                    trace!(code = %display_code(&code), collisions, "Code allocated");
                    return code;
                }
                Entry::Occupied(mut slot) if slot.get().is_expired(now, self.ttl) => {
                    let code = slot.key().clone();
                    slot.insert(SessionRecord::new(code.clone(), now));
                    global_metrics().sessions_evicted(1);
                    global_metrics().code_allocated(collisions);
                    trace!(code = %display_code(&code), collisions, "Code allocated over expired record");
                    return code;
                }
                Entry::Occupied(_) => {
                    collisions += 1;
                    debug!(collisions, "Allocated code already live, redrawing");
                }
            }
        }
    }

    /// Create or replace the record at `code` with `ticket`.
    ///
    /// Works for codes this server never allocated. Any captcha info on a
    /// replaced record is dropped.
    pub fn complete(&self, code: Bytes, ticket: Bytes) {
        let now = Instant::now();
        let mut record = SessionRecord::new(code.clone(), now);
        record.ticket = Some(ticket);
        self.shard(&code).write().insert(code, record);
        global_metrics().ticket_completed();
    }

    /// Ticket of a live record, touching it.
    ///
    /// `None` when no live record exists, `Some(None)` while the ticket is
    /// still pending.
    pub fn query_status(&self, code: &[u8]) -> Option<Option<Bytes>> {
        self.touch_with(code, |record| record.ticket.clone())
    }

    /// Overwrite the captcha info of a live record. Returns whether it existed.
    pub fn update_captcha_info(
        &self,
        code: &[u8],
        captcha_type: u16,
        captcha_data: Option<Bytes>,
    ) -> bool {
        self.touch_with(code, |record| {
            record.captcha_type = captcha_type;
            record.captcha_data = captcha_data;
        })
        .is_some()
    }

    /// Keep a live record alive. Returns whether it existed.
    pub fn refresh(&self, code: &[u8]) -> bool {
        self.touch_with(code, |_| ()).is_some()
    }

    /// Captcha info of a live record, touching it.
    pub fn query_captcha_info(&self, code: &[u8]) -> Option<CaptchaInfo> {
        self.touch_with(code, |record| record.captcha_info())
    }

    /// Snapshot of a live record without touching it.
    pub fn get(&self, code: &[u8]) -> Option<SessionRecord> {
        let now = Instant::now();
        self.shard(code)
            .read()
            .get(code)
            .filter(|record| !record.is_expired(now, self.ttl))
            .cloned()
    }

    pub fn contains(&self, code: &[u8]) -> bool {
        self.get(code).is_some()
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.shards
            .iter()
            .map(|shard| {
                shard
                    .read()
                    .values()
                    .filter(|record| !record.is_expired(now, self.ttl))
                    .count()
            })
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every expired record. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        for shard in self.shards.iter() {
            let mut shard = shard.write();
            let before = shard.len();
            shard.retain(|_, record| !record.is_expired(now, self.ttl));
            removed += before - shard.len();
        }
        if removed > 0 {
            global_metrics().sessions_evicted(removed as u64);
        }
        removed
    }

    pub fn stats(&self) -> RegistryStats {
        let now = Instant::now();
        let mut total_entries = 0;
        let mut expired_entries = 0;
        for shard in self.shards.iter() {
            let shard = shard.read();
            total_entries += shard.len();
            expired_entries += shard
                .values()
                .filter(|record| record.is_expired(now, self.ttl))
                .count();
        }
        RegistryStats {
            total_entries,
            expired_entries,
            shard_count: self.shards.len(),
            ttl: self.ttl,
        }
    }

    /// Run `f` on the live record at `code` after refreshing its touch time.
    /// An expired record is removed and reported as absent.
    fn touch_with<T>(&self, code: &[u8], f: impl FnOnce(&mut SessionRecord) -> T) -> Option<T> {
        let now = Instant::now();
        let mut shard = self.shard(code).write();

        let expired = shard.get(code)?.is_expired(now, self.ttl);
        if expired {
            shard.remove(code);
            global_metrics().sessions_evicted(1);
            trace!(code = %display_code(code), "Dropped expired record on lookup");
            return None;
        }

        let record = shard.get_mut(code)?;
        record.last_touched = now;
        Some(f(record))
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(SESSION_TTL)
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("shards", &self.shards.len())
            .field("ttl", &self.ttl)
            .field("code_length", &self.code_length)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const TTL: Duration = Duration::from_secs(60);
    const EPSILON: Duration = Duration::from_millis(1);

    #[test]
    fn test_allocate_inserts_pending_record() {
        let registry = SessionRegistry::new(TTL);
        let code = registry.allocate();

        assert_eq!(code.len(), DEFAULT_CODE_LENGTH);
        let record = registry.get(&code).unwrap();
        assert_eq!(record.ticket, None);
        assert_eq!(record.captcha_type, 0);
        assert_eq!(registry.query_status(&code), Some(None));
    }

    #[test]
    fn test_allocate_redraws_on_collision() {
        let registry = SessionRegistry::with_shards(TTL, 4, 8);

        // Identically seeded RNGs draw the same first code.
        let first = registry.allocate_with(&mut StdRng::seed_from_u64(42));
        let second = registry.allocate_with(&mut StdRng::seed_from_u64(42));

        assert_ne!(first, second);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_complete_unknown_code_creates_record() {
        let registry = SessionRegistry::new(TTL);
        registry.complete(Bytes::from_static(b"ZZZZZZZZ"), Bytes::from_static(b"T"));
        assert_eq!(
            registry.query_status(b"ZZZZZZZZ"),
            Some(Some(Bytes::from_static(b"T")))
        );
    }

    #[test]
    fn test_complete_replaces_captcha_info() {
        let registry = SessionRegistry::new(TTL);
        let code = registry.allocate();
        assert!(registry.update_captcha_info(&code, 4, Some(Bytes::from_static(b"img"))));

        registry.complete(code.clone(), Bytes::from_static(b"T"));
        let info = registry.query_captcha_info(&code).unwrap();
        assert_eq!(info.captcha_type, 0);
        assert_eq!(info.captcha_data, None);
    }

    #[test]
    fn test_missing_code_operations_are_noops() {
        let registry = SessionRegistry::new(TTL);
        assert_eq!(registry.query_status(b"missing"), None);
        assert!(!registry.update_captcha_info(b"missing", 1, None));
        assert!(!registry.refresh(b"missing"));
        assert!(registry.query_captcha_info(b"missing").is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry_boundary() {
        let registry = SessionRegistry::new(TTL);
        let early = registry.allocate();
        let late = registry.allocate();

        tokio::time::advance(TTL - EPSILON).await;
        assert!(registry.contains(&early));

        tokio::time::advance(EPSILON * 2).await;
        assert!(!registry.contains(&late));
        assert_eq!(registry.query_status(&late), None);
        // The lookup above dropped the record outright.
        assert_eq!(registry.stats().total_entries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_touch_extends_lifetime() {
        let registry = SessionRegistry::new(TTL);
        let code = registry.allocate();

        tokio::time::advance(TTL - EPSILON).await;
        assert!(registry.refresh(&code));

        tokio::time::advance(TTL - EPSILON).await;
        assert!(registry.query_captcha_info(&code).is_some());

        tokio::time::advance(TTL - EPSILON).await;
        assert_eq!(registry.query_status(&code), Some(None));
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_does_not_touch() {
        let registry = SessionRegistry::new(TTL);
        let code = registry.allocate();

        tokio::time::advance(TTL - EPSILON).await;
        assert!(registry.get(&code).is_some());
        tokio::time::advance(EPSILON * 2).await;
        assert!(registry.get(&code).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_only_expired() {
        let registry = SessionRegistry::new(TTL);
        let stale = registry.allocate();

        tokio::time::advance(TTL / 2).await;
        let fresh = registry.allocate();

        tokio::time::advance(TTL / 2 + EPSILON).await;
        assert_eq!(registry.stats().expired_entries, 1);
        assert_eq!(registry.sweep(), 1);

        assert!(!registry.contains(&stale));
        assert!(registry.contains(&fresh));
        assert_eq!(registry.stats().total_entries, 1);
    }

    #[test]
    fn test_degenerate_config_is_clamped() {
        let registry = SessionRegistry::with_shards(TTL, 0, 0);
        assert_eq!(registry.stats().shard_count, 1);
        assert_eq!(registry.allocate().len(), 1);
    }
}
