//! Terminos codewriter (tolc-codewriter)
//!
//! The method-body back end of the tolc compiler: it emits JVM bytecode for
//! one method at a time and works out what the class file needs alongside it.
//!
//! ## Architecture
//!
//! - **codegen**: instruction encoding, labels, max-stack computation and
//!   branch resizing
//! - **common**: configuration and error types
//!
//! ## Emission Flow
//!
//! ```text
//! emit_* calls → MethodWriter → finish() → max stack → resize → MethodCode
//!                    ↓                          ↑
//!              Labels / Edges ──────────────────┘
//! ```
//!
//! ```
//! use tolc_codewriter::codegen::{flag, opcodes, ConstantPool, MethodWriter};
//! use tolc_codewriter::Config;
//!
//! let mut pool = ConstantPool::new();
//! let mut mw = MethodWriter::new(&mut pool, flag::ACC_STATIC, "()V", Config::default())?;
//! mw.push_int(5)?;
//! mw.push_int(3)?;
//! mw.emit_insn(opcodes::IADD)?;
//! mw.emit_insn(opcodes::POP)?;
//! mw.emit_insn(opcodes::RETURN)?;
//! let code = mw.finish()?;
//! assert_eq!(code.max_stack, 2);
//! # Ok::<(), tolc_codewriter::Error>(())
//! ```

pub mod codegen;
pub mod common;

pub use common::config::Config;
pub use common::error::{Error, Result};
