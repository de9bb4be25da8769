//! Method body code generation
//!
//! The emitter writes the bytecode of one method at a time. Leaves first:
//!
//! - **byte_vector**: growable big-endian buffer with in-place patching
//! - **label**: branch targets, forward references and block metadata
//! - **method_writer**: one emission call per opcode family
//! - **max_stack**: worklist over the block graph for the max stack depth
//! - **resize**: fixed-point widening of branches that outgrew 16 bits
//! - **attribute**: side tables and the `Code` attribute

pub mod attribute;
pub mod byte_vector;
pub mod constpool;
pub mod decode;
pub mod descriptor;
pub mod error;
pub mod flag;
pub mod label;
pub mod max_stack;
pub mod method_writer;
pub mod opcodes;
pub mod resize;

// Re-export commonly used types
pub use attribute::{ExceptionTableEntry, LineNumberEntry, LocalVarEntry, MethodCode};
pub use constpool::{ConstantPool, LdcConstant, MemberRef, SymbolResolver};
pub use error::{ConstPoolError, ConstPoolResult};
pub use label::Label;
pub use method_writer::MethodWriter;
pub use resize::ResizeEntry;
