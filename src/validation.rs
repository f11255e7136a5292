//! Client-side form validation.
//!
//! Everything here runs before any request leaves the process.

use crate::error::ValidationError;
use crate::models::{Credentials, ProfileDraft};

/// Canonical minimum password length for sign-up, password setup and reset.
pub const MIN_PASSWORD_LENGTH: usize = 8;

pub const MIN_USERNAME_LENGTH: usize = 3;
pub const MAX_USERNAME_LENGTH: usize = 30;

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(ValidationError::new("email", "Email is required."));
    }
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ValidationError::new(
            "email",
            "Enter a valid email address.",
        ))
    }
}

/// Sign-in only requires a non-empty password; the policy applies when one is chosen.
pub fn validate_sign_in(credentials: &Credentials) -> Result<(), ValidationError> {
    validate_email(&credentials.email)?;
    if credentials.password.is_empty() {
        return Err(ValidationError::new("password", "Password is required."));
    }
    Ok(())
}

pub fn validate_sign_up(credentials: &Credentials) -> Result<(), ValidationError> {
    validate_email(&credentials.email)?;
    validate_password(&credentials.password)
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::new(
            "password",
            format!("Password must be at least {MIN_PASSWORD_LENGTH} characters."),
        ));
    }
    Ok(())
}

pub fn validate_new_password(password: &str, confirmation: &str) -> Result<(), ValidationError> {
    validate_password(password)?;
    if password != confirmation {
        return Err(ValidationError::new(
            "confirm_password",
            "Passwords do not match.",
        ));
    }
    Ok(())
}

/// Usernames are lowercase ASCII letters, digits and underscores.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let len = username.chars().count();
    if !(MIN_USERNAME_LENGTH..=MAX_USERNAME_LENGTH).contains(&len) {
        return Err(ValidationError::new(
            "username",
            format!(
                "Username must be between {MIN_USERNAME_LENGTH} and {MAX_USERNAME_LENGTH} characters."
            ),
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(ValidationError::new(
            "username",
            "Username may only contain lowercase letters, numbers and underscores.",
        ));
    }
    Ok(())
}

pub fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    let digits = phone.chars().filter(char::is_ascii_digit).count();
    let allowed = phone
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | ' ' | '-' | '(' | ')'));
    if !allowed || !(7..=15).contains(&digits) {
        return Err(ValidationError::new(
            "phone",
            "Enter a valid phone number.",
        ));
    }
    Ok(())
}

/// Validates and normalizes an onboarding draft (trimmed names, lowercased username).
pub fn normalize_profile_draft(draft: &ProfileDraft) -> Result<ProfileDraft, ValidationError> {
    let username = draft.username.trim().to_lowercase();
    validate_username(&username)?;

    let first_name = draft.first_name.trim().to_string();
    if first_name.is_empty() {
        return Err(ValidationError::new("first_name", "First name is required."));
    }
    let last_name = draft.last_name.trim().to_string();
    if last_name.is_empty() {
        return Err(ValidationError::new("last_name", "Last name is required."));
    }

    let phone = match draft.phone.as_deref().map(str::trim) {
        Some("") | None => None,
        Some(p) => {
            validate_phone(p)?;
            Some(p.to_string())
        }
    };

    Ok(ProfileDraft {
        username,
        first_name,
        last_name,
        phone,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_emails() {
        for email in ["", "ana", "ana@", "@example.com", "ana@example", "a b@example.com"] {
            assert!(validate_email(email).is_err(), "accepted {email:?}");
        }
        assert!(validate_email("ana@example.com").is_ok());
    }

    #[test]
    fn password_policy_uses_the_canonical_minimum() {
        assert!(validate_password("1234567").is_err());
        assert!(validate_password("12345678").is_ok());
    }

    #[test]
    fn sign_in_does_not_apply_the_length_policy() {
        let creds = Credentials::new("ana@example.com", "short");
        assert!(validate_sign_in(&creds).is_ok());
        assert!(validate_sign_up(&creds).is_err());
    }

    #[test]
    fn new_password_must_match_confirmation() {
        let err = validate_new_password("correct horse", "correct h0rse").unwrap_err();
        assert_eq!(err.field, "confirm_password");
    }

    #[test]
    fn draft_is_trimmed_and_lowercased() {
        let draft = ProfileDraft {
            username: "  Ana_Eats ".to_string(),
            first_name: " Ana ".to_string(),
            last_name: "Lima".to_string(),
            phone: Some("   ".to_string()),
        };
        let normalized = normalize_profile_draft(&draft).unwrap();
        assert_eq!(normalized.username, "ana_eats");
        assert_eq!(normalized.first_name, "Ana");
        assert_eq!(normalized.phone, None);
    }

    #[test]
    fn draft_with_bad_phone_is_rejected() {
        let draft = ProfileDraft {
            username: "ana".to_string(),
            first_name: "Ana".to_string(),
            last_name: "Lima".to_string(),
            phone: Some("call me".to_string()),
        };
        assert_eq!(normalize_profile_draft(&draft).unwrap_err().field, "phone");
    }
}
