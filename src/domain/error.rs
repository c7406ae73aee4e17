use thiserror::Error;

/// Core domain errors
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Invalid ID format: {message}")]
    InvalidId { message: String },

    #[error("User '{user_name}' has not been persisted yet")]
    NotPersisted { user_name: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Hashing error: {message}")]
    Hashing { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Operation cancelled: {operation}")]
    Cancelled { operation: String },
}

impl DomainError {
    pub fn invalid_id(message: impl Into<String>) -> Self {
        Self::InvalidId {
            message: message.into(),
        }
    }

    pub fn not_persisted(user_name: impl Into<String>) -> Self {
        Self::NotPersisted {
            user_name: user_name.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn hashing(message: impl Into<String>) -> Self {
        Self::Hashing {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// True for errors raised by the backing store
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage { .. })
    }
}
