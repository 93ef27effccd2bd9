use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};

use crate::audit::FileAuditLogger;
use crate::cli::utils::{print_info, print_json};
use crate::config::Config;

/// Show the security events logged on a day (today when `date` is omitted)
pub fn show(config: &Config, date: Option<&str>, json: bool) -> Result<()> {
    let date = match date {
        Some(d) => NaiveDate::parse_from_str(d, "%Y-%m-%d")
            .context(format!("Invalid date '{}', expected YYYY-MM-DD", d))?,
        None => Utc::now().date_naive(),
    };

    let logger = FileAuditLogger::reader(&config.audit);
    let events = logger.read_events(date).context("Failed to read audit log")?;

    if json {
        return print_json(&events);
    }

    if events.is_empty() {
        print_info(&format!("No security events logged on {}", date));
        return Ok(());
    }

    for event in &events {
        println!(
            "{}  {:<20} {}  attempts={}  {}",
            event.timestamp.format("%H:%M:%S"),
            event.event_type.as_str(),
            event.identifier_hash.as_deref().map(|h| &h[..12.min(h.len())]).unwrap_or("-"),
            event.attempts.map(|a| a.to_string()).unwrap_or_else(|| "-".to_string()),
            event.details.as_deref().unwrap_or("")
        );
    }

    Ok(())
}
