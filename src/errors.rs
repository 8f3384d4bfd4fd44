//! Error types for synthesizing and deploying the site stack

use thiserror::Error;

/// Errors that can occur while declaring, synthesizing or deploying the stack
#[derive(Debug, Error)]
pub enum StackError {
    /// A context parameter is missing or malformed
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A resource failed structural validation
    #[error("Validation failed on resource '{resource}'\n{message}")]
    Validation { resource: String, message: String },

    /// Two resources were declared with the same logical id
    #[error("Duplicate logical id '{0}'. Every resource in a stack must have a unique logical id")]
    DuplicateResource(String),

    /// A resource references a logical id that was not declared before it
    #[error("Resource '{from}' references '{to}' which has not been declared earlier in the stack")]
    UnresolvedReference { from: String, to: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// CloudFormation rejected or failed the stack operation
    #[error("Deploy error: {0}")]
    Deploy(String),

    /// Uploading site contents or invalidating the cache failed
    #[error("Content deployment error: {0}")]
    Upload(String),
}

impl StackError {
    pub fn validation<R: AsRef<str>, M: AsRef<str>>(resource: R, message: M) -> Self {
        StackError::Validation {
            resource: resource.as_ref().to_string(),
            message: message.as_ref().to_string(),
        }
    }
}

/// Result type for stack operations
pub type Result<T> = std::result::Result<T, StackError>;
