use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::config::PasswordPolicy;

/// Password requirement types for validation
#[derive(Debug, Clone, PartialEq)]
pub enum PasswordRequirement {
    MinimumLength(usize),
    ContainsUppercase,
    ContainsLowercase,
    ContainsNumbers,
    ContainsSpecialChars,
    NoCommonPattern(String),
    NoRepeatedCharacters(usize),
    NoDictionaryWord(String),
}

impl fmt::Display for PasswordRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PasswordRequirement::MinimumLength(len) => write!(f, "Password must be at least {} characters long", len),
            PasswordRequirement::ContainsUppercase => write!(f, "Password must contain at least one uppercase letter"),
            PasswordRequirement::ContainsLowercase => write!(f, "Password must contain at least one lowercase letter"),
            PasswordRequirement::ContainsNumbers => write!(f, "Password must contain at least one number"),
            PasswordRequirement::ContainsSpecialChars => write!(f, "Password must contain at least one special character"),
            PasswordRequirement::NoCommonPattern(pattern) => write!(f, "Password must not contain the common pattern \"{}\"", pattern),
            PasswordRequirement::NoRepeatedCharacters(run) => write!(f, "Password must not repeat a character {} or more times in a row", run),
            PasswordRequirement::NoDictionaryWord(word) => write!(f, "Password must not contain the dictionary word \"{}\"", word),
        }
    }
}

/// Strength tier derived from the password score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PasswordStrength {
    Weak,
    Medium,
    Strong,
    VeryStrong,
}

impl PasswordStrength {
    pub fn from_score(score: u32) -> Self {
        match score {
            s if s >= 8 => PasswordStrength::VeryStrong,
            s if s >= 6 => PasswordStrength::Strong,
            s if s >= 4 => PasswordStrength::Medium,
            _ => PasswordStrength::Weak,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PasswordStrength::Weak => "weak",
            PasswordStrength::Medium => "medium",
            PasswordStrength::Strong => "strong",
            PasswordStrength::VeryStrong => "very_strong",
        }
    }
}

impl fmt::Display for PasswordStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of scoring a password
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PasswordValidation {
    pub is_valid: bool,
    pub strength: PasswordStrength,
    pub score: u32,
    pub errors: Vec<String>,
    pub suggestions: Vec<String>,
}

/// Score a password against the policy.
///
/// Every missing requirement is reported; validity depends only on the
/// error list, the strength tier is informational.
pub fn validate_password(password: &str, policy: &PasswordPolicy) -> PasswordValidation {
    debug!("Validating password strength");

    let mut failed_requirements = Vec::new();
    let mut suggestions = Vec::new();
    let mut score: i32 = 0;

    let length = password.chars().count();
    if length < policy.min_length {
        failed_requirements.push(PasswordRequirement::MinimumLength(policy.min_length));
    } else if length >= policy.recommended_length {
        score += 2;
    } else {
        score += 1;
        suggestions.push(format!(
            "Consider using {} or more characters for better security",
            policy.recommended_length
        ));
    }

    let classes = [
        (password.chars().any(char::is_lowercase), PasswordRequirement::ContainsLowercase),
        (password.chars().any(char::is_uppercase), PasswordRequirement::ContainsUppercase),
        (password.chars().any(|c| c.is_ascii_digit()), PasswordRequirement::ContainsNumbers),
        (password.chars().any(|c| is_special_char(c, policy)), PasswordRequirement::ContainsSpecialChars),
    ];
    for (present, requirement) in classes {
        if present {
            score += 1;
        } else {
            failed_requirements.push(requirement);
        }
    }

    let lower_password = password.to_lowercase();

    for pattern in &policy.common_patterns {
        if lower_password.contains(&pattern.to_lowercase()) {
            failed_requirements.push(PasswordRequirement::NoCommonPattern(pattern.clone()));
            suggestions.push(format!("Avoid predictable sequences like \"{}\"", pattern));
            score -= 1;
        }
    }

    if policy.max_repeated_run > 1 && longest_repeated_run(password) >= policy.max_repeated_run {
        failed_requirements.push(PasswordRequirement::NoRepeatedCharacters(policy.max_repeated_run));
        suggestions.push("Avoid repeating the same character several times in a row".to_string());
        score -= 1;
    }

    for word in &policy.dictionary_words {
        if lower_password.contains(&word.to_lowercase()) {
            failed_requirements.push(PasswordRequirement::NoDictionaryWord(word.clone()));
            suggestions.push(format!("Avoid common dictionary words like \"{}\"", word));
            score -= 1;
        }
    }

    // Bonuses that make the top tier reachable
    if length >= policy.passphrase_length {
        score += 1;
    }
    let unique: HashSet<char> = password.chars().collect();
    if unique.len() >= policy.min_unique_chars {
        score += 1;
    }

    let score = score.max(0) as u32;
    let errors: Vec<String> = failed_requirements.iter().map(|r| r.to_string()).collect();

    PasswordValidation {
        is_valid: errors.is_empty(),
        strength: PasswordStrength::from_score(score),
        score,
        errors,
        suggestions,
    }
}

fn is_special_char(c: char, policy: &PasswordPolicy) -> bool {
    policy.special_chars.contains(c) || c.is_ascii_punctuation()
}

/// Length of the longest run of one repeated character
fn longest_repeated_run(password: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;
    let mut previous: Option<char> = None;

    for c in password.chars() {
        if Some(c) == previous {
            current += 1;
        } else {
            current = 1;
            previous = Some(c);
        }
        longest = longest.max(current);
    }

    longest
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn policy() -> PasswordPolicy {
        PasswordPolicy::default()
    }

    #[test]
    fn test_password_validation_valid() {
        let result = validate_password("Str0ngP@ssw0rd!", &policy());
        // "passw0rd" is not the dictionary word "password"
        assert!(result.is_valid, "unexpected errors: {:?}", result.errors);
        assert!(result.strength >= PasswordStrength::Strong);
    }

    #[test_case("Sh0rt!x" ; "too short")]
    #[test_case("str0ngp@ssw9rd!" ; "no uppercase")]
    #[test_case("STR0NG@P@SSW9RD!" ; "no lowercase")]
    #[test_case("StrongP@sswyrd!" ; "no number")]
    #[test_case("StrongPassw9rd" ; "no special char")]
    fn test_password_validation_rejects(password: &str) {
        let result = validate_password(password, &policy());
        assert!(!result.is_valid);
        assert!(!result.errors.is_empty());
    }

    #[test]
    fn test_short_password_error_message() {
        let result = validate_password("Ab1!", &policy());
        assert!(result.errors.contains(&"Password must be at least 8 characters long".to_string()));
    }

    #[test]
    fn test_medium_length_suggests_longer() {
        let result = validate_password("Vk7#qmZp", &policy());
        assert!(result.is_valid);
        assert!(result
            .suggestions
            .iter()
            .any(|s| s.contains("12 or more characters")));
    }

    #[test_case("MyPass123word!" ; "digit sequence")]
    #[test_case("Xyabc#9Lmnop" ; "letter sequence")]
    #[test_case("Qwerty#9Lmnop" ; "keyboard row")]
    #[test_case("Zkaaa#9Lmnop" ; "repeated characters")]
    #[test_case("Welcome#9Zkp" ; "dictionary word")]
    fn test_password_validation_penalises_patterns(password: &str) {
        let result = validate_password(password, &policy());
        assert!(!result.is_valid);
        assert!(!result.suggestions.is_empty());
    }

    #[test]
    fn test_password_word_counted_as_pattern_and_dictionary() {
        let result = validate_password("MyPassword#9z", &policy());
        assert_eq!(result.errors.len(), 2);
    }

    #[test]
    fn test_very_strong_password() {
        let result = validate_password("Tr7#vKq!Lz9@Wm4$", &policy());
        assert!(result.is_valid);
        assert_eq!(result.score, 8);
        assert_eq!(result.strength, PasswordStrength::VeryStrong);
    }

    #[test]
    fn test_score_never_negative() {
        let result = validate_password("aaa", &policy());
        assert_eq!(result.strength, PasswordStrength::Weak);
    }

    #[test]
    fn test_custom_policy_words() {
        let mut policy = policy();
        policy.dictionary_words.push("dealflow".to_string());
        let result = validate_password("DealFlow#2024x", &policy);
        assert!(result
            .errors
            .iter()
            .any(|e| e.contains("dealflow")));
    }

    #[test_case(0, PasswordStrength::Weak)]
    #[test_case(3, PasswordStrength::Weak)]
    #[test_case(4, PasswordStrength::Medium)]
    #[test_case(6, PasswordStrength::Strong)]
    #[test_case(8, PasswordStrength::VeryStrong)]
    fn test_strength_tiers(score: u32, expected: PasswordStrength) {
        assert_eq!(PasswordStrength::from_score(score), expected);
    }

    #[test]
    fn test_longest_repeated_run() {
        assert_eq!(longest_repeated_run(""), 0);
        assert_eq!(longest_repeated_run("abc"), 1);
        assert_eq!(longest_repeated_run("abbbcc"), 3);
    }
}
