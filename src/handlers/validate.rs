use std::collections::HashMap;

use crate::error::ApiError;

const MIN_PASSWORD_LENGTH: usize = 8;

/// Cheap shape check; real verification happens when mail is delivered
pub fn validate_email(email: &str) -> Result<(), ApiError> {
    let parts: Vec<&str> = email.split('@').collect();
    let ok = parts.len() == 2
        && !parts[0].is_empty()
        && parts[1].contains('.')
        && !parts[1].starts_with('.')
        && !parts[1].ends_with('.');

    if ok {
        Ok(())
    } else {
        let mut field_errors = HashMap::new();
        field_errors.insert("email".to_string(), "Invalid email format".to_string());
        Err(ApiError::validation_error("Invalid email format", Some(field_errors)))
    }
}

pub fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.len() >= MIN_PASSWORD_LENGTH {
        Ok(())
    } else {
        let mut field_errors = HashMap::new();
        field_errors.insert(
            "password".to_string(),
            format!("Password must be at least {} characters", MIN_PASSWORD_LENGTH),
        );
        Err(ApiError::validation_error("Password too short", Some(field_errors)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shapes() {
        assert!(validate_email("doc@clinic.example").is_ok());
        assert!(validate_email("a@b.co").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("two@@ats.example").is_err());
        assert!(validate_email("x@nodot").is_err());
        assert!(validate_email("x@.leading").is_err());
    }

    #[test]
    fn password_length() {
        assert!(validate_password("12345678").is_ok());
        assert!(validate_password("1234567").is_err());
    }
}
