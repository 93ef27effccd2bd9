use chrono::{DateTime, NaiveDate, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

use crate::config::AuditConfig;
use crate::security::{hash_identifier, SecurityError};

/// Security event types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityEventType {
    AttemptFailed,
    AttemptSucceeded,
    IdentifierBlocked,
    CleanupCompleted,
}

impl SecurityEventType {
    pub fn as_str(&self) -> &str {
        match self {
            SecurityEventType::AttemptFailed => "attempt_failed",
            SecurityEventType::AttemptSucceeded => "attempt_succeeded",
            SecurityEventType::IdentifierBlocked => "identifier_blocked",
            SecurityEventType::CleanupCompleted => "cleanup_completed",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, String> {
        match s {
            "attempt_failed" => Ok(SecurityEventType::AttemptFailed),
            "attempt_succeeded" => Ok(SecurityEventType::AttemptSucceeded),
            "identifier_blocked" => Ok(SecurityEventType::IdentifierBlocked),
            "cleanup_completed" => Ok(SecurityEventType::CleanupCompleted),
            _ => Err(format!("Invalid security event type: {}", s)),
        }
    }
}

/// Security event
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SecurityEvent {
    pub id: String,
    #[serde(with = "event_type_ser_de")]
    pub event_type: SecurityEventType,
    /// SHA-256 of the normalized identifier; raw identifiers are never logged
    pub identifier_hash: Option<String>,
    pub attempts: Option<u32>,
    pub blocked_until: Option<DateTime<Utc>>,
    pub details: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl SecurityEvent {
    pub fn new(event_type: SecurityEventType, identifier: Option<&str>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_type,
            identifier_hash: identifier.map(hash_identifier),
            attempts: None,
            blocked_until: None,
            details: None,
            timestamp: Utc::now(),
        }
    }

    /// Stamp the event with the time of the decision it records
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    pub fn with_blocked_until(mut self, blocked_until: Option<DateTime<Utc>>) -> Self {
        self.blocked_until = blocked_until;
        self
    }

    pub fn with_details(mut self, details: String) -> Self {
        self.details = Some(details);
        self
    }
}

/// Destination for security events
#[cfg_attr(test, mockall::automock)]
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &SecurityEvent) -> Result<(), SecurityError>;
}

/// Sink that forwards events to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAuditSink;

impl AuditSink for LogAuditSink {
    fn record(&self, event: &SecurityEvent) -> Result<(), SecurityError> {
        match event.event_type {
            SecurityEventType::IdentifierBlocked => warn!(
                "Security event {}: identifier {} blocked until {:?}",
                event.id,
                event.identifier_hash.as_deref().unwrap_or("-"),
                event.blocked_until
            ),
            _ => debug!("Security event {} - {}", event.id, event.event_type.as_str()),
        }
        Ok(())
    }
}

/// Appends security events as JSON lines to one file per day
pub struct FileAuditLogger {
    log_path: PathBuf,
    // Keeps concurrent appends from interleaving
    write_lock: Mutex<()>,
}

impl FileAuditLogger {
    /// Create a new audit logger
    pub fn new(config: &AuditConfig) -> Result<Self, SecurityError> {
        Self::with_path(&config.log_path)
    }

    pub fn with_path(log_path: impl AsRef<Path>) -> Result<Self, SecurityError> {
        let log_path = log_path.as_ref().to_path_buf();

        // Create log directory if it doesn't exist
        if !log_path.exists() {
            fs::create_dir_all(&log_path)?;
        }

        Ok(Self {
            log_path,
            write_lock: Mutex::new(()),
        })
    }

    /// Open the log directory for reading only; nothing is created on disk
    pub fn reader(config: &AuditConfig) -> Self {
        Self {
            log_path: PathBuf::from(&config.log_path),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the log file holding events from `date`
    pub fn file_for(&self, date: NaiveDate) -> PathBuf {
        self.log_path.join(format!("security_{}.log", date.format("%Y%m%d")))
    }

    /// Read back the events logged on `date`
    pub fn read_events(&self, date: NaiveDate) -> Result<Vec<SecurityEvent>, SecurityError> {
        let file_path = self.file_for(date);
        if !file_path.exists() {
            return Ok(Vec::new());
        }

        let contents = fs::read_to_string(&file_path)?;
        let mut events = Vec::new();
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            events.push(serde_json::from_str(line)?);
        }

        Ok(events)
    }
}

impl AuditSink for FileAuditLogger {
    fn record(&self, event: &SecurityEvent) -> Result<(), SecurityError> {
        let file_path = self.file_for(event.timestamp.date_naive());
        let serialized = serde_json::to_string(event)?;

        let _guard = self.write_lock.lock().map_err(|_| SecurityError::LockPoisoned)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file_path)?;
        file.write_all(format!("{}\n", serialized).as_bytes())?;

        if event.event_type == SecurityEventType::IdentifierBlocked {
            info!("Security event logged: {} - {}", event.id, event.event_type.as_str());
        } else {
            debug!("Security event saved to file: {}", file_path.display());
        }
        Ok(())
    }
}

// Event types are stored by their string names
mod event_type_ser_de {
    use super::*;
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    pub fn serialize<S>(event_type: &SecurityEventType, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(event_type.as_str())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SecurityEventType, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct EventTypeVisitor;

        impl<'de> Visitor<'de> for EventTypeVisitor {
            type Value = SecurityEventType;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a string naming a security event type")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                SecurityEventType::from_str(value).map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_str(EventTypeVisitor)
    }
}
