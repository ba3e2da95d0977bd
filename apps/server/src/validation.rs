use validator::{Validate, ValidationError, ValidationErrors};

use crate::error::GatewayError;

const MAX_IDENTIFIER_LEN: usize = 256;

pub fn validate_identifier(value: &str) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new("identifier_empty"));
    }
    if trimmed.len() > MAX_IDENTIFIER_LEN {
        return Err(ValidationError::new("identifier_length"));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(ValidationError::new("identifier_chars"));
    }
    Ok(())
}

/// Room and user a join request targets.
#[derive(Debug, Validate)]
pub struct VoiceRoomTarget {
    #[validate(custom(function = "validate_identifier"))]
    pub room_id: String,
    #[validate(custom(function = "validate_identifier"))]
    pub user_id: String,
}

impl VoiceRoomTarget {
    pub fn check(room_id: &str, user_id: &str) -> Result<(), GatewayError> {
        Self {
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
        }
        .validate()
        .map_err(invalid_request)
    }
}

pub fn check_user_id(user_id: &str) -> Result<(), GatewayError> {
    validate_identifier(user_id)
        .map_err(|_| GatewayError::InvalidRequest("userId must be a non-empty identifier".into()))
}

fn invalid_request(errors: ValidationErrors) -> GatewayError {
    let mut fields: Vec<&str> = errors.field_errors().keys().copied().collect();
    fields.sort_unstable();
    let fields: Vec<String> = fields.into_iter().map(camel_case).collect();
    GatewayError::InvalidRequest(format!("invalid {}", fields.join(", ")))
}

fn camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.push(c.to_ascii_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}
