use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::PhonePolicy;

lazy_static! {
    // Loose E.164 shape on the digit string, no leading zero
    static ref PHONE_DIGITS_REGEX: Regex = Regex::new(r"^[1-9]\d{9,14}$").unwrap();
}

/// Outcome of validating a phone number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoneValidation {
    pub is_valid: bool,
    /// Digits extracted from the input
    pub digits: String,
    /// Display form; the bare digits unless the number is a US number
    pub formatted: String,
    pub errors: Vec<String>,
}

/// Validate and format a free-text phone number
pub fn validate_phone_number(phone: &str, policy: &PhonePolicy) -> PhoneValidation {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();

    let is_valid = (policy.min_digits..=policy.max_digits).contains(&digits.len())
        && PHONE_DIGITS_REGEX.is_match(&digits);

    let errors = if is_valid {
        Vec::new()
    } else {
        vec!["Please enter a valid phone number".to_string()]
    };

    PhoneValidation {
        is_valid,
        formatted: format_phone_digits(&digits),
        digits,
        errors,
    }
}

/// Format a US number; any other digit string is returned unchanged
pub fn format_phone_digits(digits: &str) -> String {
    match digits.len() {
        10 => format!("({}) {}-{}", &digits[0..3], &digits[3..6], &digits[6..10]),
        11 if digits.starts_with('1') => {
            format!("+1 ({}) {}-{}", &digits[1..4], &digits[4..7], &digits[7..11])
        }
        _ => digits.to_string(),
    }
}
