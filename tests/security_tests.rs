use chrono::{Duration, TimeZone, Utc};
use rstest::{fixture, rstest};
use std::sync::Arc;
use test_case::test_case;

use dealflow_auth_guard::config::{self, Config};
use dealflow_auth_guard::security::{Clock, ManualClock, RateLimiter};
use dealflow_auth_guard::user::PasswordStrength;
use dealflow_auth_guard::AuthSecurityManager;

struct Harness {
    manager: AuthSecurityManager,
    clock: Arc<ManualClock>,
}

#[fixture]
fn harness() -> Harness {
    let config = Config::default();
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 15, 9, 30, 0).unwrap()));
    let limiter = RateLimiter::in_memory(&config.rate_limit)
        .unwrap()
        .with_clock(clock.clone());
    Harness {
        manager: AuthSecurityManager::with_rate_limiter(&config, limiter),
        clock,
    }
}

#[test_case("alllowercase1!" ; "no uppercase")]
#[test_case("ALLUPPERCASE1!" ; "no lowercase")]
#[test_case("NoDigitsHere!!" ; "no digit")]
#[test_case("NoSpecials1234" ; "no special")]
#[test_case("Sh0rt!" ; "too short")]
fn test_passwords_missing_requirements_are_invalid(password: &str) {
    let manager = AuthSecurityManager::new(&Config::default()).unwrap();
    assert!(!manager.validate_password(password).is_valid);
}

#[test_case("Tr0ub4dor&Zeta")]
#[test_case("Kestrel#Velvet9")]
#[test_case("my-Horse-Battery-7-Staple")]
fn test_long_complete_passwords_are_strong(password: &str) {
    let manager = AuthSecurityManager::new(&Config::default()).unwrap();
    let result = manager.validate_password(password);
    assert!(result.is_valid, "{:?}", result.errors);
    assert!(result.strength >= PasswordStrength::Strong);
}

#[test]
fn test_malformed_email_short_circuits() {
    let manager = AuthSecurityManager::new(&Config::default()).unwrap();
    let result = manager.validate_email("not-an-email");
    assert!(!result.is_valid);
    assert_eq!(result.errors.len(), 1);
    assert!(result.suggestions.is_empty());
}

#[test]
fn test_email_typo_suggestion() {
    let manager = AuthSecurityManager::new(&Config::default()).unwrap();
    let result = manager.validate_email("user@gmial.com");
    assert!(result.is_valid);
    assert!(result.suggestions.contains(&"Did you mean gmail.com?".to_string()));
}

#[rstest]
fn test_fresh_identifier_is_allowed(harness: Harness) {
    let status = harness.manager.check_rate_limit("new@dealflow.ai").unwrap();
    assert!(status.allowed);
    assert_eq!(status.attempts_remaining, 5);
    assert!(status.blocked_until.is_none());
}

#[rstest]
fn test_five_failures_block_for_fifteen_minutes(harness: Harness) {
    let start = harness.clock.now();
    for _ in 0..5 {
        harness.manager.record_attempt("agent@dealflow.ai", false).unwrap();
    }

    let status = harness.manager.check_rate_limit("agent@dealflow.ai").unwrap();
    assert!(!status.allowed);
    assert_eq!(status.attempts_remaining, 0);
    assert_eq!(status.blocked_until, Some(start + Duration::minutes(15)));
}

#[rstest]
fn test_block_lifts_after_duration(harness: Harness) {
    for _ in 0..5 {
        harness.manager.record_attempt("agent@dealflow.ai", false).unwrap();
    }
    harness.clock.advance(Duration::minutes(15));

    let status = harness.manager.check_rate_limit("agent@dealflow.ai").unwrap();
    assert!(status.allowed);
    assert_eq!(status.attempts_remaining, 5);
}

#[rstest]
#[case(1)]
#[case(4)]
#[case(5)]
#[case(9)]
fn test_success_clears_failures(harness: Harness, #[case] failures: usize) {
    for _ in 0..failures {
        harness.manager.record_attempt("agent@dealflow.ai", false).unwrap();
    }
    harness.manager.record_attempt("agent@dealflow.ai", true).unwrap();

    let status = harness.manager.check_rate_limit("agent@dealflow.ai").unwrap();
    assert!(status.allowed);
    assert_eq!(status.attempts_remaining, 5);
}

#[rstest]
fn test_cleanup_removes_only_stale_entries(harness: Harness) {
    harness.manager.record_attempt("stale@dealflow.ai", false).unwrap();
    harness.clock.advance(Duration::minutes(45));
    harness.manager.record_attempt("fresh@dealflow.ai", false).unwrap();
    harness.clock.advance(Duration::minutes(30));

    assert_eq!(harness.manager.cleanup().unwrap(), 1);
    assert_eq!(harness.manager.cleanup().unwrap(), 0);
    assert_eq!(harness.manager.rate_limiter().tracked_identifiers().unwrap(), 1);

    let status = harness.manager.check_rate_limit("fresh@dealflow.ai").unwrap();
    assert_eq!(status.attempts_remaining, 4);
}

#[test]
fn test_sanitize_script_tag() {
    let manager = AuthSecurityManager::new(&Config::default()).unwrap();
    let sanitized = manager.sanitize_input("<script>alert(1)</script>");
    assert!(!sanitized.contains('<') && !sanitized.contains('>'));
    assert!(!sanitized.to_lowercase().contains("javascript:"));
    assert!(sanitized.chars().count() <= 1000);
}

#[test]
fn test_phone_formatting() {
    let manager = AuthSecurityManager::new(&Config::default()).unwrap();
    let result = manager.validate_phone_number("5551234567");
    assert!(result.is_valid);
    assert_eq!(result.formatted, "(555) 123-4567");
}

#[test]
fn test_policies_loaded_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("authguard.toml");
    std::fs::write(
        &path,
        "[rate_limit]\nmax_attempts = 2\n\n[email]\npopular_domains = [\"dealflow.ai\"]\n",
    )
    .unwrap();

    let config = config::load_config(path.to_str().unwrap()).unwrap();
    let manager = AuthSecurityManager::new(&config).unwrap();

    manager.record_attempt("agent@dealflow.ai", false).unwrap();
    manager.record_attempt("agent@dealflow.ai", false).unwrap();
    assert!(!manager.check_rate_limit("agent@dealflow.ai").unwrap().allowed);

    let email = manager.validate_email("agent@dealflw.ai");
    assert!(email.suggestions.contains(&"Did you mean dealflow.ai?".to_string()));
}

#[test]
fn test_persistent_state_shared_across_managers() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.storage.path = dir.path().join("authguard.db").to_str().unwrap().to_string();
    config.audit.enabled = false;

    let first = AuthSecurityManager::persistent(&config).unwrap();
    let second = AuthSecurityManager::persistent(&config).unwrap();

    for _ in 0..3 {
        first.record_attempt("agent@dealflow.ai", false).unwrap();
    }
    assert_eq!(second.check_rate_limit("agent@dealflow.ai").unwrap().attempts_remaining, 2);

    second.record_attempt("agent@dealflow.ai", true).unwrap();
    assert_eq!(first.check_rate_limit("agent@dealflow.ai").unwrap().attempts_remaining, 5);
}

#[test]
fn test_invalid_reset_window_in_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("authguard.toml");
    std::fs::write(&path, "[rate_limit]\nreset_window_minutes = -1\n").unwrap();

    assert!(config::load_config(path.to_str().unwrap()).is_err());
}
