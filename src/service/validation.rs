//! Request field validation

/// A rejected request field
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("Invalid length for {field}: expected {min}-{max}, got {actual}")]
    InvalidLength {
        field: &'static str,
        min: usize,
        max: usize,
        actual: usize,
    },

    #[error("Invalid format for {field}: '{value}' (expected: {expected})")]
    InvalidFormat {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("{field} must be a positive integer")]
    NotPositive { field: &'static str },
}

fn check_length(field: &'static str, value: &str, min: usize, max: usize) -> Result<(), ValidationError> {
    let actual = value.chars().count();
    if actual < min || actual > max {
        return Err(ValidationError::InvalidLength {
            field,
            min,
            max,
            actual,
        });
    }
    Ok(())
}

pub fn validate_username(value: &str) -> Result<(), ValidationError> {
    check_length("username", value, 3, 100)?;
    if !value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "username",
            value: value.to_string(),
            expected: "lowercase letters, digits, underscore only",
        });
    }
    Ok(())
}

pub fn validate_full_name(value: &str) -> Result<(), ValidationError> {
    check_length("full_name", value, 3, 100)?;
    if !value.chars().all(|c| c.is_alphabetic() || c == ' ') {
        return Err(ValidationError::InvalidFormat {
            field: "full_name",
            value: value.to_string(),
            expected: "letters or spaces only",
        });
    }
    Ok(())
}

pub fn validate_password(value: &str) -> Result<(), ValidationError> {
    check_length("password", value, 6, 100)
}

pub fn validate_email(value: &str) -> Result<(), ValidationError> {
    check_length("email", value, 3, 200)?;
    let valid = match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    };
    if !valid {
        return Err(ValidationError::InvalidFormat {
            field: "email",
            value: value.to_string(),
            expected: "a valid email address",
        });
    }
    Ok(())
}

pub fn validate_positive(field: &'static str, value: i64) -> Result<(), ValidationError> {
    if value <= 0 {
        return Err(ValidationError::NotPositive { field });
    }
    Ok(())
}

pub fn validate_secret_code(value: &str) -> Result<(), ValidationError> {
    check_length("secret_code", value, 32, 128)
}

/// Keep only the failures
pub fn violations<const N: usize>(
    checks: [Result<(), ValidationError>; N],
) -> Vec<ValidationError> {
    checks.into_iter().filter_map(Result::err).collect()
}
