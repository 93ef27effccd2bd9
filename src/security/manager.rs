//! Entry point used by sign-up and sign-in form handlers.

use log::debug;
use std::sync::Arc;
use std::time::Duration;

use crate::audit::{AuditSink, FileAuditLogger, LogAuditSink};
use crate::config::{Config, EmailPolicy, PasswordPolicy, PhonePolicy, SanitizerPolicy};
use crate::database::SqliteRateLimitStore;
use crate::security::{
    normalize_identifier, sanitize_input, CleanupTask, RateLimitStatus, RateLimiter, SecurityError,
};
use crate::user::{
    validate_email, validate_password, validate_phone_number, EmailValidation, PasswordValidation,
    PhoneValidation,
};

/// Validators plus a rate limiter, built once and shared by the caller.
///
/// Identifiers passed to the rate-limit methods are normalized (trimmed,
/// lower-cased) first, so `Agent@Example.com` and `agent@example.com`
/// share one counter.
pub struct AuthSecurityManager {
    password_policy: PasswordPolicy,
    email_policy: EmailPolicy,
    sanitizer_policy: SanitizerPolicy,
    phone_policy: PhonePolicy,
    cleanup_interval: Duration,
    rate_limiter: Arc<RateLimiter>,
}

impl AuthSecurityManager {
    /// Create a manager with an in-memory rate limiter
    pub fn new(config: &Config) -> Result<Self, SecurityError> {
        Ok(Self::with_rate_limiter(config, RateLimiter::in_memory(&config.rate_limit)?))
    }

    /// Create a manager whose rate-limit state lives in the SQLite file from
    /// `config.storage`, reporting events to the audit log when enabled
    pub fn persistent(config: &Config) -> Result<Self, SecurityError> {
        let store = SqliteRateLimitStore::open(&config.storage)?;
        let audit: Arc<dyn AuditSink> = if config.audit.enabled {
            Arc::new(FileAuditLogger::new(&config.audit)?)
        } else {
            Arc::new(LogAuditSink)
        };

        let limiter = RateLimiter::new(&config.rate_limit, Box::new(store))?.with_audit(audit);
        Ok(Self::with_rate_limiter(config, limiter))
    }

    /// Create a manager around an already configured rate limiter
    pub fn with_rate_limiter(config: &Config, rate_limiter: RateLimiter) -> Self {
        Self {
            password_policy: config.password.clone(),
            email_policy: config.email.clone(),
            sanitizer_policy: config.sanitizer.clone(),
            phone_policy: config.phone.clone(),
            cleanup_interval: config.rate_limit.cleanup_interval(),
            rate_limiter: Arc::new(rate_limiter),
        }
    }

    pub fn validate_password(&self, password: &str) -> PasswordValidation {
        validate_password(password, &self.password_policy)
    }

    pub fn validate_email(&self, email: &str) -> EmailValidation {
        validate_email(email, &self.email_policy)
    }

    pub fn validate_phone_number(&self, phone: &str) -> PhoneValidation {
        validate_phone_number(phone, &self.phone_policy)
    }

    pub fn sanitize_input(&self, input: &str) -> String {
        sanitize_input(input, self.sanitizer_policy.max_length)
    }

    pub fn check_rate_limit(&self, identifier: &str) -> Result<RateLimitStatus, SecurityError> {
        self.rate_limiter.check_rate_limit(&normalize_identifier(identifier))
    }

    pub fn record_attempt(&self, identifier: &str, success: bool) -> Result<(), SecurityError> {
        self.rate_limiter.record_attempt(&normalize_identifier(identifier), success)
    }

    /// Remove stale rate-limit entries, returning how many were removed
    pub fn cleanup(&self) -> Result<usize, SecurityError> {
        self.rate_limiter.cleanup()
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    /// Interval between scheduled sweeps, from `rate_limit.cleanup_interval_minutes`
    pub fn cleanup_interval(&self) -> Duration {
        self.cleanup_interval
    }

    /// Start the scheduled sweep at the configured interval
    pub fn spawn_scheduled_cleanup(&self) -> Result<CleanupTask, SecurityError> {
        self.spawn_cleanup(self.cleanup_interval)
    }

    /// Start sweeping stale entries every `interval` until the task is stopped or dropped
    pub fn spawn_cleanup(&self, interval: Duration) -> Result<CleanupTask, SecurityError> {
        debug!("Starting rate limit cleanup every {:?}", interval);
        CleanupTask::spawn(Arc::clone(&self.rate_limiter), interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::ManualClock;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};

    fn manager_with_clock() -> (AuthSecurityManager, Arc<ManualClock>) {
        let config = Config::default();
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()));
        let limiter = RateLimiter::in_memory(&config.rate_limit)
            .unwrap()
            .with_clock(clock.clone());
        (AuthSecurityManager::with_rate_limiter(&config, limiter), clock)
    }

    #[test]
    fn test_identifiers_are_normalized() {
        let (manager, _clock) = manager_with_clock();
        for _ in 0..5 {
            manager.record_attempt("Agent@Example.com ", false).unwrap();
        }
        let status = manager.check_rate_limit("agent@example.com").unwrap();
        assert!(!status.allowed);
    }

    #[test]
    fn test_success_after_failures_resets() {
        let (manager, _clock) = manager_with_clock();
        for _ in 0..3 {
            manager.record_attempt("agent@example.com", false).unwrap();
        }
        manager.record_attempt("agent@example.com", true).unwrap();
        let status = manager.check_rate_limit("agent@example.com").unwrap();
        assert_eq!(status.attempts_remaining, 5);
    }

    #[test]
    fn test_cleanup_through_manager() {
        let (manager, clock) = manager_with_clock();
        manager.record_attempt("agent@example.com", false).unwrap();
        clock.advance(ChronoDuration::minutes(90));
        assert_eq!(manager.cleanup().unwrap(), 1);
    }

    #[test]
    fn test_persistent_manager_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.path = dir.path().join("authguard.db").to_str().unwrap().to_string();
        config.audit.log_path = dir.path().join("logs").to_str().unwrap().to_string();

        let manager = AuthSecurityManager::persistent(&config).unwrap();
        for _ in 0..5 {
            manager.record_attempt("agent@example.com", false).unwrap();
        }
        drop(manager);

        let restarted = AuthSecurityManager::persistent(&config).unwrap();
        let status = restarted.check_rate_limit("agent@example.com").unwrap();
        assert!(!status.allowed);
        assert!(status.blocked_until.is_some());

        let logger = FileAuditLogger::new(&config.audit).unwrap();
        let events = logger.read_events(Utc::now().date_naive()).unwrap();
        assert!(events
            .iter()
            .any(|e| e.event_type == crate::audit::SecurityEventType::IdentifierBlocked));
    }

    #[test]
    fn test_validators_use_configured_policies() {
        let mut config = Config::default();
        config.sanitizer.max_length = 5;
        config.email.popular_domains = vec!["dealflow.ai".to_string()];
        let manager = AuthSecurityManager::new(&config).unwrap();

        assert_eq!(manager.sanitize_input("abcdefgh"), "abcde");
        assert!(manager
            .validate_email("user@dealflw.ai")
            .suggestions
            .contains(&"Did you mean dealflow.ai?".to_string()));
        assert!(manager.validate_phone_number("5551234567").is_valid);
        assert!(!manager.validate_password("weak").is_valid);
    }

    #[test]
    fn test_scheduled_cleanup_uses_configured_interval() {
        let mut config = Config::default();
        config.rate_limit.cleanup_interval_minutes = 7;
        let manager = AuthSecurityManager::new(&config).unwrap();

        assert_eq!(manager.cleanup_interval(), Duration::from_secs(7 * 60));
        let task = manager.spawn_scheduled_cleanup().unwrap();
        assert_eq!(task.interval(), Duration::from_secs(7 * 60));
        assert!(task.is_running());
        task.stop();
    }

    #[test]
    fn test_invalid_rate_limit_config_rejected() {
        let mut config = Config::default();
        config.rate_limit.reset_window_minutes = -1;
        assert!(matches!(
            AuthSecurityManager::new(&config),
            Err(SecurityError::InvalidConfig(_))
        ));
    }
}
