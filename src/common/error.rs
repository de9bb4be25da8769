use thiserror::Error;

use crate::codegen::error::ConstPoolError;

/// Result type for code writer operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types raised while emitting a method body
#[derive(Error, Debug)]
pub enum Error {
    #[error("Label {label} is already placed at offset {position}")]
    LabelAlreadyPlaced { label: u32, position: usize },

    #[error("Label {label} is referenced but never placed")]
    UnresolvedLabel { label: u32 },

    #[error("Label {label} belongs to a different method body")]
    ForeignLabel { label: u32 },

    #[error("Local variable index {index} is out of range")]
    LocalIndexOutOfRange { index: u32 },

    #[error("Method needs {count} local slots, more than 65535")]
    TooManyLocals { count: u32 },

    #[error("Method needs an operand stack of {depth}, more than 65535")]
    MaxStackOverflow { depth: i64 },

    #[error("Operand {value} does not fit {what}")]
    OperandOutOfRange { value: i64, what: &'static str },

    #[error("Opcode 0x{opcode:02x} cannot be emitted as {family}")]
    InvalidOpcode { opcode: u8, family: &'static str },

    #[error("Branch offset {offset} does not fit 32 bits")]
    OffsetOverflow { offset: i64 },

    #[error("Code length {length} exceeds the 65535 byte limit")]
    CodeTooLarge { length: usize },

    #[error("Invalid descriptor: {descriptor}")]
    InvalidDescriptor { descriptor: String },

    #[error("Malformed code at pc {pc}: {reason}")]
    MalformedCode { pc: usize, reason: String },

    #[error("Branch resizing did not converge after {passes} passes")]
    ResizeDidNotConverge { passes: usize },

    #[error("Constant pool error: {0}")]
    ConstPool(#[from] ConstPoolError),
}

impl Error {
    /// Create a malformed-code error
    pub fn malformed(pc: usize, reason: impl Into<String>) -> Self {
        Self::MalformedCode { pc, reason: reason.into() }
    }

    /// Create an invalid-descriptor error
    pub fn invalid_descriptor(descriptor: impl Into<String>) -> Self {
        Self::InvalidDescriptor { descriptor: descriptor.into() }
    }

    pub fn operand_out_of_range(value: impl Into<i64>, what: &'static str) -> Self {
        Self::OperandOutOfRange { value: value.into(), what }
    }
}
