use lazy_static::lazy_static;
use regex::Regex;
use sha2::{Digest, Sha256};

pub mod cleanup;
pub mod manager;
pub mod rate_limit;

pub use cleanup::CleanupTask;
pub use manager::AuthSecurityManager;
pub use rate_limit::{
    Clock, EntryUpdate, InMemoryRateLimitStore, ManualClock, RateLimitEntry, RateLimitStatus,
    RateLimitStore, RateLimiter, SystemClock,
};

lazy_static! {
    static ref ANGLE_BRACKETS: Regex = Regex::new(r"[<>]").unwrap();
    static ref JAVASCRIPT_URI: Regex = Regex::new(r"(?i)javascript:").unwrap();
    static ref EVENT_HANDLER: Regex = Regex::new(r"(?i)on\w+=").unwrap();
}

/// Errors raised by the rate limiter, its stores and the audit trail
#[derive(Debug, thiserror::Error)]
pub enum SecurityError {
    #[error("Rate limit store error: {0}")]
    Store(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Audit error: {0}")]
    Audit(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Timestamp out of range: {0}")]
    TimeOverflow(String),

    #[error("Internal lock poisoned")]
    LockPoisoned,
}

/// Canonical form of a rate-limit identifier
pub fn normalize_identifier(identifier: &str) -> String {
    identifier.trim().to_lowercase()
}

/// Hex SHA-256 of an identifier, used wherever identifiers are stored or logged
pub fn hash_identifier(identifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(identifier.as_bytes());
    hex::encode(hasher.finalize())
}

/// Strip markup and script fragments from free text.
///
/// Removal repeats until nothing changes so that fragments split around a
/// removed token cannot join back up. Output is cut to `max_length` chars.
pub fn sanitize_input(input: &str, max_length: usize) -> String {
    let mut text = input.trim().to_string();

    loop {
        let stripped = ANGLE_BRACKETS.replace_all(&text, "");
        let stripped = JAVASCRIPT_URI.replace_all(&stripped, "");
        let stripped = EVENT_HANDLER.replace_all(&stripped, "").into_owned();

        if stripped == text {
            break;
        }
        text = stripped;
    }

    text.chars().take(max_length).collect()
}

/// Levenshtein edit distance with unit insert, delete and substitute costs
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    edit_distance(a, b, false)
}

/// Edit distance that also counts swapping two neighbouring characters as one edit
pub fn transposition_distance(a: &str, b: &str) -> usize {
    edit_distance(a, b, true)
}

fn edit_distance(a: &str, b: &str, transpositions: bool) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let mut matrix = vec![vec![0usize; b.len() + 1]; a.len() + 1];
    for (i, row) in matrix.iter_mut().enumerate() {
        row[0] = i;
    }
    for j in 0..=b.len() {
        matrix[0][j] = j;
    }

    for i in 1..=a.len() {
        for j in 1..=b.len() {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            let mut best = (matrix[i - 1][j] + 1)
                .min(matrix[i][j - 1] + 1)
                .min(matrix[i - 1][j - 1] + cost);

            if transpositions && i > 1 && j > 1 && a[i - 1] == b[j - 2] && a[i - 2] == b[j - 1] {
                best = best.min(matrix[i - 2][j - 2] + 1);
            }

            matrix[i][j] = best;
        }
    }

    matrix[a.len()][b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("", "", 0)]
    #[test_case("gmail.com", "gmail.com", 0)]
    #[test_case("gmal.com", "gmail.com", 1 ; "insertion")]
    #[test_case("gmaill.com", "gmail.com", 1 ; "deletion")]
    #[test_case("gnail.com", "gmail.com", 1 ; "substitution")]
    #[test_case("gmial.com", "gmail.com", 2 ; "swap costs two")]
    #[test_case("kitten", "sitting", 3)]
    #[test_case("", "abc", 3)]
    fn test_levenshtein_distance(a: &str, b: &str, expected: usize) {
        assert_eq!(levenshtein_distance(a, b), expected);
        assert_eq!(levenshtein_distance(b, a), expected);
    }

    #[test]
    fn test_transposition_distance() {
        assert_eq!(transposition_distance("gmial.com", "gmail.com"), 1);
        assert_eq!(transposition_distance("yaho.com", "yahoo.com"), 1);
        assert_eq!(transposition_distance("kitten", "sitting"), 3);
    }

    #[test]
    fn test_sanitize_strips_tags() {
        let sanitized = sanitize_input("<script>alert(1)</script>", 1000);
        assert_eq!(sanitized, "scriptalert(1)/script");
    }

    #[test_case("  hello world  ", "hello world" ; "trims")]
    #[test_case("<a href=\"JavaScript:evil()\">x</a>", "a href=\"evil()\"x/a" ; "javascript uri")]
    #[test_case("<img src=x onerror=alert(1)>", "img src=x alert(1)" ; "event handler")]
    #[test_case("OnClick=steal()", "steal()" ; "case insensitive handler")]
    fn test_sanitize_input(input: &str, expected: &str) {
        assert_eq!(sanitize_input(input, 1000), expected);
    }

    #[test]
    fn test_sanitize_resists_spliced_fragments() {
        let sanitized = sanitize_input("javajavascript:script:alert(1) ononclick=click=", 1000);
        assert!(!sanitized.to_lowercase().contains("javascript:"));
        assert!(!EVENT_HANDLER.is_match(&sanitized));
    }

    #[test]
    fn test_sanitize_truncates_by_characters() {
        let long = "é".repeat(1500);
        let sanitized = sanitize_input(&long, 1000);
        assert_eq!(sanitized.chars().count(), 1000);
    }

    #[test]
    fn test_normalize_identifier() {
        assert_eq!(normalize_identifier("  Agent@Example.COM "), "agent@example.com");
    }

    #[test]
    fn test_hash_identifier_is_stable_hex() {
        let hash = hash_identifier("agent@example.com");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_identifier("agent@example.com"));
        assert_ne!(hash, hash_identifier("other@example.com"));
    }
}
