//! Error types for the constant pool collaborator

use thiserror::Error;

/// Errors that can occur during constant pool operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConstPoolError {
    #[error("Constant pool is out of space")]
    OutOfSpace,
    #[error("Invalid constant pool index: {0}")]
    InvalidIndex(u16),
    #[error("String constant of {len} bytes exceeds the 65535 byte limit")]
    Utf8TooLong { len: usize },
    #[error("Invalid member descriptor: {descriptor}")]
    InvalidDescriptor { descriptor: String },
}

/// Result type for constant pool operations
pub type ConstPoolResult<T> = std::result::Result<T, ConstPoolError>;
