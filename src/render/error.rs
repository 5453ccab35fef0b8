use thiserror::Error;

use crate::domain::ContentId;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("invalid content id {id}")]
    InvalidArgument { id: ContentId },
    #[error("cannot render a macro: {what}")]
    NotFound { what: String },
    #[error("render engine failed: {0}")]
    Engine(String),
}

impl RenderError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn engine(err: impl std::fmt::Display) -> Self {
        Self::Engine(err.to_string())
    }
}
