//! Signing-secret strength validation.
//!
//! Runs once at boot, before the token issuer is allowed to start. The
//! issuer refuses to initialize when the report says `is_valid == false`.

use rand::{Rng, seq::SliceRandom};
use serde::Serialize;

const MIN_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.0;

/// Case-insensitive deny-list, matched as exact value or substring.
const KNOWN_WEAK_SECRETS: &[&str] = &[
    "secret",
    "password",
    "changeme",
    "default",
    "jwt-secret",
    "your-jwt-secret",
    "12345678",
    "qwerty",
    "letmein",
    "supersecret",
];

const COMMON_LEADING_SEQUENCES: &[&str] = &["123", "abc", "password", "qwerty", "admin"];

const LOWERCASE: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPERCASE: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";
const SPECIAL: &[u8] = b"!@#$%^&*()-_=+[]{}<>?~";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretStrength {
    Weak,
    Medium,
    Good,
    Excellent,
}

impl SecretStrength {
    fn from_score(score: u8) -> Self {
        match score {
            0..=39 => SecretStrength::Weak,
            40..=59 => SecretStrength::Medium,
            60..=79 => SecretStrength::Good,
            _ => SecretStrength::Excellent,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SecretStrength::Weak => "weak",
            SecretStrength::Medium => "medium",
            SecretStrength::Good => "good",
            SecretStrength::Excellent => "excellent",
        }
    }
}

/// Per-boot validation report. Not persisted.
#[derive(Debug, Clone, Serialize)]
pub struct SecretValidationReport {
    pub is_valid: bool,
    pub score: u8,
    /// Shannon entropy in bits per character.
    pub entropy: f64,
    pub strength: SecretStrength,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub recommendations: Vec<String>,
}

/// Shannon entropy of the character frequency distribution, in bits/char.
pub fn shannon_entropy(secret: &str) -> f64 {
    let len = secret.chars().count();
    if len == 0 {
        return 0.0;
    }

    let mut frequencies = std::collections::HashMap::new();
    for c in secret.chars() {
        *frequencies.entry(c).or_insert(0usize) += 1;
    }

    let len = len as f64;
    frequencies
        .values()
        .map(|&count| {
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

fn has_repeated_run(secret: &str) -> bool {
    let chars: Vec<char> = secret.chars().collect();
    chars.windows(3).any(|w| w[0] == w[1] && w[1] == w[2])
}

fn has_alternating_pairs(secret: &str) -> bool {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() < 6 {
        return false;
    }
    (0..chars.len() - 5).any(|i| {
        chars[i] != chars[i + 1]
            && chars[i] == chars[i + 2]
            && chars[i] == chars[i + 4]
            && chars[i + 1] == chars[i + 3]
            && chars[i + 1] == chars[i + 5]
    })
}

/// Validate a JWT signing secret against length, entropy, deny-list, and
/// complexity requirements.
pub fn validate_jwt_secret(secret: &str) -> SecretValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut recommendations = Vec::new();

    if secret.is_empty() {
        return SecretValidationReport {
            is_valid: false,
            score: 0,
            entropy: 0.0,
            strength: SecretStrength::Weak,
            errors: vec!["secret must not be empty".to_string()],
            warnings,
            recommendations: vec![format!(
                "generate a random secret of at least {MIN_SECRET_LENGTH} characters"
            )],
        };
    }

    let length = secret.chars().count();
    if length < MIN_SECRET_LENGTH {
        errors.push(format!(
            "secret is {length} characters, minimum is {MIN_SECRET_LENGTH}"
        ));
        recommendations.push(format!(
            "use at least {MIN_SECRET_LENGTH} characters of random data"
        ));
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        errors.push(format!(
            "entropy is {entropy:.2} bits/char, minimum is {MIN_ENTROPY_BITS_PER_CHAR:.1}"
        ));
        recommendations.push("avoid repeated or low-variety characters".to_string());
    }

    let lowered = secret.to_lowercase();
    if let Some(weak) = KNOWN_WEAK_SECRETS.iter().find(|w| lowered.contains(*w)) {
        errors.push(format!("secret contains known weak value \"{weak}\""));
        recommendations.push("never derive the secret from dictionary words".to_string());
    }

    let has_lowercase = secret.chars().any(|c| c.is_ascii_lowercase());
    let has_uppercase = secret.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = secret.chars().any(|c| c.is_ascii_digit());
    let has_special = secret.chars().any(|c| !c.is_ascii_alphanumeric());
    let class_count = [has_lowercase, has_uppercase, has_digit, has_special]
        .iter()
        .filter(|&&present| present)
        .count();

    if class_count < 4 {
        warnings.push(format!(
            "only {class_count} of 4 character classes present (lowercase, uppercase, digit, special)"
        ));
        recommendations.push("mix lowercase, uppercase, digits, and special characters".to_string());
    }

    if has_repeated_run(secret) {
        warnings.push("contains runs of 3+ repeated characters".to_string());
    }
    if has_alternating_pairs(secret) {
        warnings.push("contains alternating character pairs".to_string());
    }
    if let Some(seq) = COMMON_LEADING_SEQUENCES
        .iter()
        .find(|s| lowered.starts_with(*s))
    {
        warnings.push(format!("starts with common sequence \"{seq}\""));
    }

    let length_points = (length.min(64) as f64 / 64.0) * 30.0;
    let entropy_points = (entropy / 5.0).min(1.0) * 40.0;
    let complexity_points = class_count as f64 * 7.5;
    let penalties = errors.len() as f64 * 15.0 + warnings.len() as f64 * 5.0;
    let score = (length_points + entropy_points + complexity_points - penalties).clamp(0.0, 100.0)
        as u8;

    SecretValidationReport {
        is_valid: errors.is_empty(),
        score,
        entropy,
        strength: SecretStrength::from_score(score),
        errors,
        warnings,
        recommendations,
    }
}

/// Generate a cryptographically random secret of exactly `length`
/// characters, guaranteeing at least one character from each required
/// class (when `length` allows it). Always validates at tier "excellent"
/// for lengths >= 32.
pub fn generate_secure_secret(length: usize) -> String {
    const CLASSES: [&[u8]; 4] = [LOWERCASE, UPPERCASE, DIGITS, SPECIAL];
    let mut rng = rand::rng();
    let mut chars: Vec<u8> = Vec::with_capacity(length);

    if length >= CLASSES.len() {
        for class in CLASSES {
            chars.push(class[rng.random_range(0..class.len())]);
        }
    }

    let charset: Vec<u8> = CLASSES.concat();
    while chars.len() < length {
        chars.push(charset[rng.random_range(0..charset.len())]);
    }

    chars.shuffle(&mut rng);
    chars.into_iter().map(char::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_secret_is_invalid() {
        let report = validate_jwt_secret("");
        assert!(!report.is_valid);
        assert_eq!(report.score, 0);
        assert_eq!(report.strength, SecretStrength::Weak);
    }

    #[test]
    fn test_short_secret_is_invalid() {
        let report = validate_jwt_secret("Xk9$mQ2pL");
        assert!(!report.is_valid);
        assert!(report.errors.iter().any(|e| e.contains("minimum")));
    }

    #[test]
    fn test_repeated_characters_have_zero_entropy() {
        let report = validate_jwt_secret("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
        assert!(!report.is_valid);
        assert!(report.entropy.abs() < f64::EPSILON);
        assert_eq!(report.strength, SecretStrength::Weak);
    }

    #[test]
    fn test_known_weak_value_rejected_regardless_of_length() {
        let report = validate_jwt_secret("PASSWORD-padded-to-minimum-length-9472");
        assert!(!report.is_valid);
        assert!(report.errors.iter().any(|e| e.contains("known weak")));
    }

    #[test]
    fn test_entropy_increases_with_character_variety() {
        assert!(shannon_entropy("abcdefgh") > shannon_entropy("aabbccdd"));
        assert!(shannon_entropy("aabbccdd") > shannon_entropy("aaaaaaaa"));
    }

    #[test]
    fn test_pattern_warnings() {
        let report = validate_jwt_secret("123qqqW$xYxYxYlmnopqrstuvw45678Z!abc");
        assert!(report.warnings.iter().any(|w| w.contains("repeated")));
        assert!(report.warnings.iter().any(|w| w.contains("alternating")));
        assert!(report.warnings.iter().any(|w| w.contains("common sequence")));
    }

    #[test]
    fn test_generated_secret_has_requested_length() {
        for length in [4, 32, 64, 128] {
            assert_eq!(generate_secure_secret(length).chars().count(), length);
        }
    }

    #[test]
    fn test_generated_secret_is_excellent() {
        let secret = generate_secure_secret(64);
        let report = validate_jwt_secret(&secret);
        assert!(report.is_valid, "errors: {:?}", report.errors);
        assert_eq!(report.strength, SecretStrength::Excellent);
    }

    #[test]
    fn test_generated_secret_covers_all_classes() {
        let secret = generate_secure_secret(32);
        assert!(secret.chars().any(|c| c.is_ascii_lowercase()));
        assert!(secret.chars().any(|c| c.is_ascii_uppercase()));
        assert!(secret.chars().any(|c| c.is_ascii_digit()));
        assert!(secret.chars().any(|c| !c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_tiny_length_still_exact() {
        assert_eq!(generate_secure_secret(2).chars().count(), 2);
    }
}
