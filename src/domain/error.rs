use thiserror::Error;

use super::ContentId;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("content `{id}` not found")]
    NotFound { id: ContentId },
    #[error("domain validation failed: {message}")]
    Validation { message: String },
}

impl DomainError {
    pub fn not_found(id: ContentId) -> Self {
        Self::NotFound { id }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}
