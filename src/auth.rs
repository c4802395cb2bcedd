use bcrypt::{hash, verify};
use chrono::{Datelike, Local, NaiveDate};
use uuid::Uuid;

use crate::config::PasswordSettings;
use crate::error::ApiError;

pub const RECOVERY_CODE_LEN: usize = 8;

pub fn hash_secret(secret: &str, cost: u32) -> Result<String, ApiError> {
    Ok(hash(secret, cost)?)
}

/// A malformed stored hash counts as a mismatch.
pub fn verify_secret(secret: &str, hashed: &str) -> bool {
    verify(secret, hashed).unwrap_or(false)
}

/// Eight uppercase hex characters.
pub fn generate_recovery_code() -> String {
    let mut code = Uuid::new_v4().simple().to_string();
    code.truncate(RECOVERY_CODE_LEN);
    code.to_uppercase()
}

/// Expands `{YYYY}`, `{YY}`, `{MM}` and `{DD}` in `pattern`.
pub fn render_date_pattern(pattern: &str, date: NaiveDate) -> String {
    pattern
        .replace("{YYYY}", &format!("{:04}", date.year()))
        .replace("{YY}", &format!("{:02}", date.year().rem_euclid(100)))
        .replace("{MM}", &format!("{:02}", date.month()))
        .replace("{DD}", &format!("{:02}", date.day()))
}

/// The code `pattern` yields for today's local date.
pub fn current_code(pattern: &str) -> String {
    render_date_pattern(pattern, Local::now().date_naive())
}

/// Returns the complaint to show the user, or `None` when the password is
/// acceptable.
pub fn validate_password(password: &str, policy: &PasswordSettings) -> Option<String> {
    let mut missing = Vec::new();

    if password.chars().count() < policy.min_length {
        missing.push(format!("at least {} characters", policy.min_length));
    }
    if policy.require_uppercase && !password.chars().any(|c| c.is_ascii_uppercase()) {
        missing.push("one uppercase letter".to_string());
    }
    if policy.require_lowercase && !password.chars().any(|c| c.is_ascii_lowercase()) {
        missing.push("one lowercase letter".to_string());
    }
    if policy.require_number && !password.chars().any(|c| c.is_ascii_digit()) {
        missing.push("one number".to_string());
    }

    if missing.is_empty() {
        None
    } else {
        Some(format!("Password must contain: {}.", missing.join(", ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hashed = hash_secret("hunter22", 4).unwrap();
        assert!(verify_secret("hunter22", &hashed));
        assert!(!verify_secret("hunter23", &hashed));
        assert!(!verify_secret("hunter22", "not-a-hash"));
    }

    #[test]
    fn test_recovery_code_shape() {
        let code = generate_recovery_code();
        assert_eq!(code.len(), RECOVERY_CODE_LEN);
        assert!(code
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
        assert_ne!(code, generate_recovery_code());
    }

    #[test]
    fn test_render_date_pattern() {
        let date = NaiveDate::from_ymd_opt(2025, 12, 7).unwrap();
        assert_eq!(render_date_pattern("#snipic_{YYYY}{MM}", date), "#snipic_202512");
        assert_eq!(render_date_pattern("{YY}-{MM}-{DD}", date), "25-12-07");
        assert_eq!(render_date_pattern("static", date), "static");
    }

    #[test]
    fn test_validate_password() {
        let mut policy = PasswordSettings::default();
        assert_eq!(validate_password("abcdef", &policy), None);
        assert_eq!(
            validate_password("abc", &policy).unwrap(),
            "Password must contain: at least 6 characters."
        );

        policy.require_uppercase = true;
        policy.require_number = true;
        assert_eq!(
            validate_password("abcdefg", &policy).unwrap(),
            "Password must contain: one uppercase letter, one number."
        );
        assert_eq!(validate_password("Abcdefg1", &policy), None);
    }
}
