use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("unknown level `{value}`")]
    UnknownLevel { value: String },
    #[error("domain validation failed: {message}")]
    Validation { message: String },
}

impl DomainError {
    pub fn unknown_level(value: impl Into<String>) -> Self {
        Self::UnknownLevel {
            value: value.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}
