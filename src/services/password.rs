//! Password hashing and policy
//!
//! Passwords are stored as Argon2id PHC strings with a random salt per hash.
//! The signup policy requires at least eight characters including a letter,
//! a digit and a special character.

use anyhow::{Context, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use once_cell::sync::Lazy;
use regex::Regex;

/// Minimum password length accepted at signup and on change
pub const MIN_PASSWORD_LENGTH: usize = 8;

static LETTER: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-zA-Z]").unwrap());
static DIGIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]").unwrap());
static SPECIAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9]").unwrap());

/// Hash a password using Argon2id with secure defaults.
///
/// Returns the PHC string (algorithm, parameters, salt and hash).
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))
        .context("Password hashing failed")?;

    Ok(password_hash.to_string())
}

/// Verify a password against a stored hash.
///
/// `Ok(false)` for a wrong password, `Err` only when the stored hash is not a
/// valid PHC string.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))
        .context("Failed to parse password hash")?;

    let argon2 = Argon2::default();

    match argon2.verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(anyhow::anyhow!("Password verification failed: {}", e))
            .context("Password verification error"),
    }
}

/// Check a candidate password against the policy.
///
/// Returns every violated rule as a user-facing message; an empty list means
/// the password is acceptable. Surrounding whitespace is ignored.
pub fn password_policy_violations(password: &str) -> Vec<&'static str> {
    let password = password.trim();
    let mut violations = Vec::new();

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        violations.push("Password must be at least 8 characters long");
    }
    if !LETTER.is_match(password) {
        violations.push("Password must contain at least one letter.");
    }
    if !DIGIT.is_match(password) {
        violations.push("Password must contain at least one number.");
    }
    if !SPECIAL.is_match(password) {
        violations.push("Password must contain at least one special character.");
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_password_produces_argon2id_hash() {
        let hash = hash_password("s3cret!pass").expect("Failed to hash password");
        assert!(hash.starts_with("$argon2id$"), "Hash should use Argon2id");
    }

    #[test]
    fn test_hash_password_produces_different_hashes() {
        let hash1 = hash_password("same_password1!").expect("Failed to hash password");
        let hash2 = hash_password("same_password1!").expect("Failed to hash password");

        assert_ne!(hash1, hash2, "Random salt should produce different hashes");
    }

    #[test]
    fn test_verify_password() {
        let hash = hash_password("correct_password1!").expect("Failed to hash password");

        assert!(verify_password("correct_password1!", &hash).unwrap());
        assert!(!verify_password("wrong_password1!", &hash).unwrap());
    }

    #[test]
    fn test_verify_password_invalid_hash() {
        assert!(verify_password("password", "invalid_hash_format").is_err());
    }

    #[test]
    fn test_policy_accepts_strong_password() {
        assert!(password_policy_violations("abc123!@").is_empty());
        assert!(password_policy_violations("  Pa55word#  ").is_empty());
    }

    #[test]
    fn test_policy_reports_each_violation() {
        assert_eq!(
            password_policy_violations("short1!"),
            vec!["Password must be at least 8 characters long"]
        );
        assert_eq!(
            password_policy_violations("12345678!"),
            vec!["Password must contain at least one letter."]
        );
        assert_eq!(
            password_policy_violations("password!"),
            vec!["Password must contain at least one number."]
        );
        assert_eq!(
            password_policy_violations("password1"),
            vec!["Password must contain at least one special character."]
        );
        assert_eq!(password_policy_violations("").len(), 4);
    }

    #[test]
    fn test_policy_ignores_surrounding_whitespace() {
        // Six meaningful characters padded with spaces
        assert_eq!(
            password_policy_violations("   ab1!xy   "),
            vec!["Password must be at least 8 characters long"]
        );
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn hash_verifies_only_its_password(
            password in "[a-zA-Z0-9!@#$%^&*]{1,30}",
            other in "[a-zA-Z0-9!@#$%^&*]{1,30}",
        ) {
            let hash = hash_password(&password).unwrap();
            prop_assert_ne!(&hash, &password);
            prop_assert!(verify_password(&password, &hash).unwrap());
            if other != password {
                prop_assert!(!verify_password(&other, &hash).unwrap());
            }
        }

        #[test]
        fn policy_accepts_any_conforming_password(
            letters in "[a-zA-Z]{4,10}",
            digits in "[0-9]{2,4}",
            special in "[!@#$%^&*]{2,4}",
        ) {
            let password = format!("{}{}{}", letters, digits, special);
            prop_assert!(password_policy_violations(&password).is_empty());
        }
    }
}
