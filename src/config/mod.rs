use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use anyhow::{Result, Context};
use log::{debug, info};

use crate::security::SecurityError;

/// Environment variable that overrides the default config path
pub const CONFIG_ENV_VAR: &str = "AUTHGUARD_CONFIG";

/// Default config file name
pub const DEFAULT_CONFIG_PATH: &str = "authguard.toml";

/// Longest accepted rate-limit duration (one year)
pub const MAX_DURATION_MINUTES: i64 = 366 * 24 * 60;

/// Password scoring policy
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct PasswordPolicy {
    /// Minimum password length; shorter passwords are rejected
    pub min_length: usize,
    /// Length at which the full length bonus is awarded
    pub recommended_length: usize,
    /// Length at which the passphrase bonus is awarded
    pub passphrase_length: usize,
    /// Distinct characters needed for the variety bonus
    pub min_unique_chars: usize,
    /// Characters counted as special characters
    pub special_chars: String,
    /// Substrings that indicate a predictable password
    pub common_patterns: Vec<String>,
    /// Run length at which a repeated character is penalised
    pub max_repeated_run: usize,
    /// Dictionary words that must not appear in a password
    pub dictionary_words: Vec<String>,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            recommended_length: 12,
            passphrase_length: 16,
            min_unique_chars: 10,
            special_chars: "!@#$%^&*(),.?\":{}|<>_-+=[]\\/;'`~".to_string(),
            common_patterns: ["123", "abc", "password", "qwerty", "admin"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_repeated_run: 3,
            dictionary_words: ["password", "admin", "user", "login", "welcome", "hello", "world", "test"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Email validation policy
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct EmailPolicy {
    /// Maximum length of the whole address (RFC 5321)
    pub max_length: usize,
    /// Maximum length of the local part
    pub max_local_length: usize,
    /// Substrings that mark a domain as disposable
    pub disposable_domains: Vec<String>,
    /// Providers checked for one-character typos
    pub popular_domains: Vec<String>,
}

impl Default for EmailPolicy {
    fn default() -> Self {
        Self {
            max_length: 254,
            max_local_length: 64,
            disposable_domains: ["10minutemail", "tempmail", "guerrillamail", "mailinator", "throwaway", "yopmail"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            popular_domains: ["gmail.com", "yahoo.com", "hotmail.com", "outlook.com"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Free-text sanitizer settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SanitizerPolicy {
    /// Maximum number of characters kept
    pub max_length: usize,
}

impl Default for SanitizerPolicy {
    fn default() -> Self {
        Self { max_length: 1000 }
    }
}

/// Phone number settings.
///
/// The digit range can only narrow the 10 to 15 digits the phone pattern accepts.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct PhonePolicy {
    pub min_digits: usize,
    pub max_digits: usize,
}

impl Default for PhonePolicy {
    fn default() -> Self {
        Self {
            min_digits: 10,
            max_digits: 15,
        }
    }
}

/// Authentication rate limiting settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Failed attempts before an identifier is blocked
    pub max_attempts: u32,
    /// Block duration in minutes
    pub block_duration_minutes: i64,
    /// Minutes of inactivity after which the counter is reset
    pub reset_window_minutes: i64,
    /// Interval between background cleanup sweeps in minutes
    pub cleanup_interval_minutes: u64,
    /// Capacity of the in-memory store
    pub max_entries: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            block_duration_minutes: 15,
            reset_window_minutes: 60,
            cleanup_interval_minutes: 60,
            max_entries: 100_000,
        }
    }
}

impl RateLimitConfig {
    /// Reject settings that would disable blocking or overflow timestamps
    pub fn validate(&self) -> Result<(), SecurityError> {
        let durations = [
            ("block_duration_minutes", self.block_duration_minutes),
            ("reset_window_minutes", self.reset_window_minutes),
        ];
        for (name, minutes) in durations {
            if !(1..=MAX_DURATION_MINUTES).contains(&minutes) {
                return Err(SecurityError::InvalidConfig(format!(
                    "{} must be between 1 and {}, got {}",
                    name, MAX_DURATION_MINUTES, minutes
                )));
            }
        }

        if !(1..=MAX_DURATION_MINUTES as u64).contains(&self.cleanup_interval_minutes) {
            return Err(SecurityError::InvalidConfig(format!(
                "cleanup_interval_minutes must be between 1 and {}, got {}",
                MAX_DURATION_MINUTES, self.cleanup_interval_minutes
            )));
        }
        if self.max_attempts == 0 {
            return Err(SecurityError::InvalidConfig("max_attempts must be at least 1".to_string()));
        }
        if self.max_entries == 0 {
            return Err(SecurityError::InvalidConfig("max_entries must be at least 1".to_string()));
        }

        Ok(())
    }

    /// Interval between scheduled cleanup sweeps
    pub fn cleanup_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cleanup_interval_minutes.saturating_mul(60))
    }
}

/// Persistent rate-limit store settings
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the SQLite database file
    pub path: String,
    /// Maximum number of connections in the connection pool
    pub max_connections: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "data/authguard.db".to_string(),
            max_connections: 4,
        }
    }
}

/// Audit configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct AuditConfig {
    /// Whether security events are written to disk
    pub enabled: bool,
    /// Path to audit log directory
    pub log_path: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_path: "logs".to_string(),
        }
    }
}

/// Global application configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Application name
    pub app_name: String,
    /// Application version
    pub version: String,
    pub password: PasswordPolicy,
    pub email: EmailPolicy,
    pub sanitizer: SanitizerPolicy,
    pub phone: PhonePolicy,
    pub rate_limit: RateLimitConfig,
    pub storage: StorageConfig,
    pub audit: AuditConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "DealFlow Auth Guard".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            password: PasswordPolicy::default(),
            email: EmailPolicy::default(),
            sanitizer: SanitizerPolicy::default(),
            phone: PhonePolicy::default(),
            rate_limit: RateLimitConfig::default(),
            storage: StorageConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

/// Resolve the config path from an explicit value or the environment
pub fn resolve_config_path(explicit: Option<&str>) -> String {
    match explicit {
        Some(path) => path.to_string(),
        None => std::env::var(CONFIG_ENV_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string()),
    }
}

/// Load configuration from file, writing the defaults if it does not exist
pub fn load_config(path: &str) -> Result<Config> {
    // Check if file exists
    if !Path::new(path).exists() {
        info!("Config file {} not found, writing defaults", path);
        let default_config = Config::default();
        save_config(path, &default_config)?;
        return Ok(default_config);
    }

    // Read the config file
    let mut file = File::open(path).context(format!("Failed to open config file: {}", path))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).context("Failed to read config file")?;

    // Parse the config file
    let config: Config = match path.ends_with(".toml") {
        true => toml::from_str(&contents).context("Failed to parse TOML config")?,
        false => serde_json::from_str(&contents).context("Failed to parse JSON config")?,
    };

    config
        .rate_limit
        .validate()
        .context(format!("Invalid rate_limit settings in {}", path))?;

    debug!("Loaded configuration from {}", path);
    Ok(config)
}

/// Save configuration to file
pub fn save_config(path: &str, config: &Config) -> Result<()> {
    // Create parent directory if it doesn't exist
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
    }

    // Serialize the config
    let serialized = match path.ends_with(".toml") {
        true => toml::to_string_pretty(config).context("Failed to serialize config to TOML")?,
        false => serde_json::to_string_pretty(config).context("Failed to serialize config to JSON")?,
    };

    std::fs::write(path, serialized).context(format!("Failed to write config to file: {}", path))?;

    Ok(())
}
