use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("value is too short (min {min}, got {got})")]
    TooShort { min: usize, got: usize },
    #[error("value is too long (max {max}, got {got})")]
    TooLong { max: usize, got: usize },
    #[error("invalid format")]
    InvalidFormat,
}

pub fn validate_question_content(content: &str) -> Result<(), ValidationError> {
    let len = content.trim().len();
    if len < 1 {
        return Err(ValidationError::TooShort { min: 1, got: len });
    }
    if len > 2000 {
        return Err(ValidationError::TooLong { max: 2000, got: len });
    }
    Ok(())
}

pub fn validate_room_title(title: &str) -> Result<(), ValidationError> {
    let len = title.len();
    if len < 1 {
        return Err(ValidationError::TooShort { min: 1, got: len });
    }
    if len > 200 {
        return Err(ValidationError::TooLong { max: 200, got: len });
    }
    Ok(())
}

pub fn validate_room_code(code: &str) -> Result<(), ValidationError> {
    if !crate::room_code::is_valid_format(code) {
        return Err(ValidationError::InvalidFormat);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_content_bounds() {
        assert!(validate_question_content("Hello?").is_ok());
        assert!(validate_question_content("   ").is_err());
        assert!(validate_question_content(&"x".repeat(2001)).is_err());
    }

    #[test]
    fn room_code_format_is_enforced() {
        assert!(validate_room_code("ABC123").is_ok());
        assert!(validate_room_code("abc123").is_err());
        assert!(validate_room_code("").is_err());
    }
}
