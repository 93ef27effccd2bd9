use anyhow::Result;
use chrono::Local;

use crate::cli::utils::{print_error, print_info, print_json, print_success, print_warning};
use crate::security::{AuthSecurityManager, RateLimitStatus};

fn print_status(identifier: &str, status: &RateLimitStatus) {
    if status.allowed {
        print_success(&format!(
            "{} may attempt authentication ({} attempts remaining)",
            identifier, status.attempts_remaining
        ));
    } else {
        match status.blocked_until {
            Some(until) => print_error(&format!(
                "{} is blocked until {}",
                identifier,
                until.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
            )),
            None => print_error(&format!("{} is blocked", identifier)),
        }
    }
}

pub fn check(manager: &AuthSecurityManager, identifier: &str, json: bool) -> Result<bool> {
    let status = manager.check_rate_limit(identifier)?;

    if json {
        print_json(&status)?;
    } else {
        print_status(identifier, &status);
    }

    Ok(status.allowed)
}

/// Record an attempt and report the resulting status
pub fn record(manager: &AuthSecurityManager, identifier: &str, success: bool, json: bool) -> Result<bool> {
    manager.record_attempt(identifier, success)?;
    let status = manager.check_rate_limit(identifier)?;

    if json {
        print_json(&status)?;
    } else {
        if success {
            print_info(&format!("Recorded successful attempt for {}", identifier));
        } else {
            print_warning(&format!("Recorded failed attempt for {}", identifier));
        }
        print_status(identifier, &status);
    }

    Ok(status.allowed)
}

pub fn cleanup(manager: &AuthSecurityManager, json: bool) -> Result<()> {
    let removed = manager.cleanup()?;
    let remaining = manager.rate_limiter().tracked_identifiers()?;

    if json {
        print_json(&serde_json::json!({ "removed": removed, "remaining": remaining }))?;
    } else {
        print_success(&format!("Removed {} stale entries, {} remaining", removed, remaining));
    }

    Ok(())
}

/// Run the scheduled sweep in the foreground until the process is stopped
pub fn sweep(manager: &AuthSecurityManager) -> Result<()> {
    let removed = manager.cleanup()?;
    print_info(&format!(
        "Removed {} stale entries, sweeping every {} minutes",
        removed,
        manager.cleanup_interval().as_secs() / 60
    ));

    manager.spawn_scheduled_cleanup()?.wait();
    Ok(())
}
