//! Input validation for registration and profile changes.

use regex::Regex;

const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$";

const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_NAME_LENGTH: usize = 150;
const MAX_PHONE_LENGTH: usize = 15;

const COMMON_PASSWORDS: &[&str] = &[
    "password",
    "password1",
    "password123",
    "12345678",
    "123456789",
    "1234567890",
    "qwerty123",
    "qwertyuiop",
    "iloveyou",
    "letmein1",
    "welcome1",
    "admin123",
    "abc12345",
    "football",
    "baseball",
    "sunshine",
    "princess",
    "trustno1",
];

/// Trim and lowercase an email address for storage and lookup.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn validate_email(email: &str) -> Result<(), String> {
    if email.len() > 254 {
        return Err("Enter a valid email address.".to_string());
    }
    let email_regex = Regex::new(EMAIL_PATTERN).map_err(|e| format!("invalid email regex: {e}"))?;
    if !email_regex.is_match(email) {
        return Err("Enter a valid email address.".to_string());
    }
    Ok(())
}

/// Password rules: minimum length, not entirely numeric, not a common
/// password, and not derived from the email address. All violations are
/// reported.
pub fn validate_password(password: &str, email: Option<&str>) -> Result<(), Vec<String>> {
    let mut problems = Vec::new();

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        problems.push(format!(
            "This password is too short. It must contain at least {MIN_PASSWORD_LENGTH} characters."
        ));
    }

    if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
        problems.push("This password is entirely numeric.".to_string());
    }

    let lowered = password.to_lowercase();
    if COMMON_PASSWORDS.contains(&lowered.as_str()) {
        problems.push("This password is too common.".to_string());
    }

    if let Some(email) = email {
        let local = email.split('@').next().unwrap_or_default().to_lowercase();
        if local.len() >= 3 && (lowered.contains(&local) || local.contains(&lowered)) {
            problems.push("The password is too similar to the email address.".to_string());
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems)
    }
}

pub fn validate_name(field: &str, value: &str) -> Result<(), String> {
    if value.chars().count() > MAX_NAME_LENGTH {
        return Err(format!(
            "{field}: ensure this field has no more than {MAX_NAME_LENGTH} characters."
        ));
    }
    Ok(())
}

pub fn validate_phone_number(phone: &str) -> Result<(), String> {
    if phone.chars().count() > MAX_PHONE_LENGTH {
        return Err(format!(
            "phone_number: ensure this field has no more than {MAX_PHONE_LENGTH} characters."
        ));
    }
    let digits = phone.strip_prefix('+').unwrap_or(phone);
    if !digits
        .chars()
        .all(|c| c.is_ascii_digit() || c == ' ' || c == '-')
    {
        return Err("phone_number: enter a valid phone number.".to_string());
    }
    Ok(())
}
