use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unknown chord symbol: {0:?}")]
    UnknownChord(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DomainError {
    pub fn configuration<T: Into<String>>(message: T) -> Self {
        Self::Configuration(message.into())
    }

    pub fn validation<T: Into<String>>(message: T) -> Self {
        Self::Validation(message.into())
    }
}
