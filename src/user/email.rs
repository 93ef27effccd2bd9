use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::EmailPolicy;
use crate::security::transposition_distance;

lazy_static! {
    static ref BASIC_EMAIL_REGEX: Regex = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap();
    static ref DOMAIN_REGEX: Regex = Regex::new(
        r"^[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*\.[a-zA-Z]{2,}$"
    )
    .unwrap();
}

/// Outcome of validating an email address
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailValidation {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub suggestions: Vec<String>,
}

impl EmailValidation {
    fn invalid_format() -> Self {
        Self {
            is_valid: false,
            errors: vec!["Please enter a valid email address".to_string()],
            suggestions: Vec::new(),
        }
    }
}

/// Validate an email address.
///
/// A malformed address short-circuits with a single error. Disposable
/// domains and near-misses of popular providers only add suggestions.
pub fn validate_email(email: &str, policy: &EmailPolicy) -> EmailValidation {
    debug!("Validating email address");

    if !BASIC_EMAIL_REGEX.is_match(email) {
        return EmailValidation::invalid_format();
    }

    // The format check guarantees exactly one '@'
    let (local, domain) = match email.split_once('@') {
        Some(parts) => parts,
        None => return EmailValidation::invalid_format(),
    };

    let mut errors = Vec::new();
    let mut suggestions = Vec::new();

    if email.chars().count() > policy.max_length {
        errors.push("Email address is too long".to_string());
    }

    if local.chars().count() > policy.max_local_length {
        errors.push("Email username is too long".to_string());
    }

    if !DOMAIN_REGEX.is_match(domain) {
        errors.push("Invalid email domain".to_string());
    }

    let domain = domain.to_lowercase();

    if policy
        .disposable_domains
        .iter()
        .any(|disposable| domain.contains(&disposable.to_lowercase()))
    {
        suggestions.push("Consider using a permanent email address".to_string());
    }

    if let Some(candidate) = suggest_domain(&domain, &policy.popular_domains) {
        suggestions.push(format!("Did you mean {}?", candidate));
    }

    EmailValidation {
        is_valid: errors.is_empty(),
        errors,
        suggestions,
    }
}

/// Find a popular provider exactly one edit away from `domain`.
///
/// Swapped neighbours ("gmial") count as a single edit.
pub fn suggest_domain<'a>(domain: &str, popular_domains: &'a [String]) -> Option<&'a str> {
    popular_domains
        .iter()
        .find(|popular| transposition_distance(domain, &popular.to_lowercase()) == 1)
        .map(|popular| popular.as_str())
}
