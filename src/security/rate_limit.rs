//! Rate limiting for authentication attempts.
//!
//! Each identifier moves through Fresh -> Active -> Blocked. A success at
//! any point deletes the entry; idleness longer than the reset window or
//! expiry of a block returns it to a zero count.

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::audit::{AuditSink, LogAuditSink, SecurityEvent, SecurityEventType};
use crate::config::RateLimitConfig;
use crate::security::SecurityError;

/// Attempt counter for a single identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitEntry {
    /// Failed attempts since the last reset
    pub attempts: u32,
    /// Time of the most recent attempt
    pub last_attempt: DateTime<Utc>,
    /// Identifier is refused until this time
    pub blocked_until: Option<DateTime<Utc>>,
}

impl RateLimitEntry {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            attempts: 0,
            last_attempt: now,
            blocked_until: None,
        }
    }

    fn reset(&mut self) {
        self.attempts = 0;
        self.blocked_until = None;
    }
}

/// Answer to "may this identifier attempt authentication now?"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub allowed: bool,
    pub attempts_remaining: u32,
    pub blocked_until: Option<DateTime<Utc>>,
}

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start) }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Entry as it was before and after an atomic update
#[derive(Debug, Clone, PartialEq)]
pub struct EntryUpdate {
    pub previous: Option<RateLimitEntry>,
    pub current: Option<RateLimitEntry>,
}

/// Closure applied by [`RateLimitStore::update`]
type EntryUpdateFn<'a> = dyn Fn(Option<RateLimitEntry>) -> Result<Option<RateLimitEntry>, SecurityError> + 'a;

/// Storage for rate-limit entries
#[cfg_attr(test, mockall::automock)]
pub trait RateLimitStore: Send + Sync {
    fn get(&self, identifier: &str) -> Result<Option<RateLimitEntry>, SecurityError>;

    fn put(&self, identifier: &str, entry: &RateLimitEntry) -> Result<(), SecurityError>;

    fn remove(&self, identifier: &str) -> Result<(), SecurityError>;

    /// Replace the entry for `identifier` with `apply(stored)` as one atomic step.
    ///
    /// No other update of the same store, in this process or another, can
    /// interleave between the read and the write. `None` deletes the entry;
    /// an error from `apply` leaves the store untouched.
    fn update<'a>(
        &self,
        identifier: &str,
        apply: &'a EntryUpdateFn<'a>,
    ) -> Result<EntryUpdate, SecurityError>;

    /// Delete entries whose last attempt is before `cutoff`, returning how many went
    fn remove_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, SecurityError>;

    fn len(&self) -> Result<usize, SecurityError>;
}

type EntryMap = HashMap<String, RateLimitEntry>;

/// Bounded in-process store.
///
/// When full, inserting a new identifier evicts the entry with the oldest
/// `last_attempt`.
#[derive(Debug)]
pub struct InMemoryRateLimitStore {
    entries: Mutex<EntryMap>,
    capacity: usize,
}

impl InMemoryRateLimitStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, EntryMap>, SecurityError> {
        self.entries.lock().map_err(|_| SecurityError::LockPoisoned)
    }

    fn insert_bounded(&self, entries: &mut EntryMap, identifier: &str, entry: RateLimitEntry) {
        if !entries.contains_key(identifier) && entries.len() >= self.capacity {
            let stalest = entries
                .iter()
                .min_by_key(|(_, e)| e.last_attempt)
                .map(|(k, _)| k.clone());
            if let Some(key) = stalest {
                debug!("Rate limit store full, evicting stalest entry");
                entries.remove(&key);
            }
        }

        entries.insert(identifier.to_string(), entry);
    }
}

impl Default for InMemoryRateLimitStore {
    fn default() -> Self {
        Self::new(RateLimitConfig::default().max_entries)
    }
}

impl RateLimitStore for InMemoryRateLimitStore {
    fn get(&self, identifier: &str) -> Result<Option<RateLimitEntry>, SecurityError> {
        Ok(self.lock()?.get(identifier).cloned())
    }

    fn put(&self, identifier: &str, entry: &RateLimitEntry) -> Result<(), SecurityError> {
        let mut entries = self.lock()?;
        self.insert_bounded(&mut entries, identifier, entry.clone());
        Ok(())
    }

    fn remove(&self, identifier: &str) -> Result<(), SecurityError> {
        self.lock()?.remove(identifier);
        Ok(())
    }

    fn update(
        &self,
        identifier: &str,
        apply: &dyn Fn(Option<RateLimitEntry>) -> Result<Option<RateLimitEntry>, SecurityError>,
    ) -> Result<EntryUpdate, SecurityError> {
        let mut entries = self.lock()?;
        let previous = entries.get(identifier).cloned();
        let current = apply(previous.clone())?;

        if current != previous {
            match &current {
                Some(entry) => self.insert_bounded(&mut entries, identifier, entry.clone()),
                None => {
                    entries.remove(identifier);
                }
            }
        }

        Ok(EntryUpdate { previous, current })
    }

    fn remove_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, SecurityError> {
        let mut entries = self.lock()?;
        let before = entries.len();
        entries.retain(|_, entry| entry.last_attempt >= cutoff);
        Ok(before - entries.len())
    }

    fn len(&self) -> Result<usize, SecurityError> {
        Ok(self.lock()?.len())
    }
}

/// Rate limiter for authentication attempts
pub struct RateLimiter {
    store: Box<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
    audit: Arc<dyn AuditSink>,
    max_attempts: u32,
    block_duration: Duration,
    reset_window: Duration,
}

impl RateLimiter {
    /// Create a rate limiter over `store` using the wall clock
    pub fn new(config: &RateLimitConfig, store: Box<dyn RateLimitStore>) -> Result<Self, SecurityError> {
        config.validate()?;

        Ok(Self {
            store,
            clock: Arc::new(SystemClock),
            audit: Arc::new(LogAuditSink),
            max_attempts: config.max_attempts,
            block_duration: Duration::minutes(config.block_duration_minutes),
            reset_window: Duration::minutes(config.reset_window_minutes),
        })
    }

    /// Create an in-memory rate limiter sized from `config`
    pub fn in_memory(config: &RateLimitConfig) -> Result<Self, SecurityError> {
        Self::new(config, Box::new(InMemoryRateLimitStore::new(config.max_entries)))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn reset_window(&self) -> Duration {
        self.reset_window
    }

    /// Check whether `identifier` may attempt authentication
    pub fn check_rate_limit(&self, identifier: &str) -> Result<RateLimitStatus, SecurityError> {
        let now = self.clock.now();
        let update = self
            .store
            .update(identifier, &|stored| self.checked_entry(stored, now))?;
        let entry = update.current.unwrap_or_else(|| RateLimitEntry::new(now));

        match entry.blocked_until {
            Some(until) => {
                if update.previous.and_then(|e| e.blocked_until) != Some(until) {
                    self.emit(SecurityEventType::IdentifierBlocked, identifier, &entry, now);
                }
                Ok(RateLimitStatus {
                    allowed: false,
                    attempts_remaining: 0,
                    blocked_until: Some(until),
                })
            }
            None => Ok(RateLimitStatus {
                allowed: true,
                attempts_remaining: self.max_attempts.saturating_sub(entry.attempts),
                blocked_until: None,
            }),
        }
    }

    /// Record the outcome of an authentication attempt
    pub fn record_attempt(&self, identifier: &str, success: bool) -> Result<(), SecurityError> {
        let now = self.clock.now();

        if success {
            self.store.remove(identifier)?;
            self.emit(SecurityEventType::AttemptSucceeded, identifier, &RateLimitEntry::new(now), now);
            return Ok(());
        }

        let update = self
            .store
            .update(identifier, &|stored| self.failed_entry(stored, now))?;

        if let Some(entry) = update.current {
            if entry.blocked_until.is_some() {
                info!("Identifier blocked after {} failed attempts", entry.attempts);
                self.emit(SecurityEventType::IdentifierBlocked, identifier, &entry, now);
            } else {
                debug!("Failed attempt {} of {}", entry.attempts, self.max_attempts);
                self.emit(SecurityEventType::AttemptFailed, identifier, &entry, now);
            }
        }

        Ok(())
    }

    /// Remove every entry idle for longer than the reset window
    pub fn cleanup(&self) -> Result<usize, SecurityError> {
        let now = self.clock.now();
        let cutoff = now
            .checked_sub_signed(self.reset_window)
            .ok_or_else(|| SecurityError::TimeOverflow(format!("{} minus the reset window", now)))?;
        let removed = self.store.remove_older_than(cutoff)?;

        if removed > 0 {
            info!("Rate limit cleanup removed {} stale entries", removed);
            let event = SecurityEvent::new(SecurityEventType::CleanupCompleted, None)
                .with_timestamp(now)
                .with_details(format!("removed {} entries", removed));
            if let Err(e) = self.audit.record(&event) {
                warn!("Failed to record audit event: {}", e);
            }
        }

        Ok(removed)
    }

    /// Number of identifiers currently tracked
    pub fn tracked_identifiers(&self) -> Result<usize, SecurityError> {
        self.store.len()
    }

    /// Stored entry as seen by a check; stamps a block once the limit is reached
    fn checked_entry(
        &self,
        stored: Option<RateLimitEntry>,
        now: DateTime<Utc>,
    ) -> Result<Option<RateLimitEntry>, SecurityError> {
        let mut entry = stored.unwrap_or_else(|| RateLimitEntry::new(now));
        self.expire(&mut entry, now);

        if entry.blocked_until.is_none() && entry.attempts >= self.max_attempts {
            entry.blocked_until = Some(self.block_expiry(now)?);
        }

        Ok(Some(entry))
    }

    /// Stored entry after one more failed attempt
    fn failed_entry(
        &self,
        stored: Option<RateLimitEntry>,
        now: DateTime<Utc>,
    ) -> Result<Option<RateLimitEntry>, SecurityError> {
        let mut entry = stored.unwrap_or_else(|| RateLimitEntry::new(now));
        self.expire(&mut entry, now);

        entry.attempts = entry.attempts.saturating_add(1);
        entry.last_attempt = now;
        if entry.attempts >= self.max_attempts {
            entry.blocked_until = Some(self.block_expiry(now)?);
        }

        Ok(Some(entry))
    }

    fn block_expiry(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, SecurityError> {
        now.checked_add_signed(self.block_duration)
            .ok_or_else(|| SecurityError::TimeOverflow(format!("{} plus the block duration", now)))
    }

    /// Zero the counter when the window has lapsed or a block has ended
    fn expire(&self, entry: &mut RateLimitEntry, now: DateTime<Utc>) {
        if now.signed_duration_since(entry.last_attempt) > self.reset_window {
            entry.reset();
        }
        if matches!(entry.blocked_until, Some(until) if now >= until) {
            entry.reset();
        }
    }

    fn emit(&self, event_type: SecurityEventType, identifier: &str, entry: &RateLimitEntry, now: DateTime<Utc>) {
        let event = SecurityEvent::new(event_type, Some(identifier))
            .with_timestamp(now)
            .with_attempts(entry.attempts)
            .with_blocked_until(entry.blocked_until);
        if let Err(e) = self.audit.record(&event) {
            warn!("Failed to record audit event: {}", e);
        }
    }
}
