//! A toolchain for the SN/X 16-bit instruction set: lexer, parser,
//! lowerer/encoder, CFG builder, dataflow analyzer, diagnostics collector,
//! and simulator, reachable through [`facade::compile_program`] and
//! [`simulator::Simulator`].
//!
//! A CLI front-end, file I/O, packaging, and documentation generation are
//! out of scope -- this crate is a library only.

pub mod ast;
pub mod cfg;
pub mod constants;
pub mod dataflow;
pub mod diagnostics;
pub mod error;
pub mod facade;
pub mod ir;
pub mod lexer;
pub mod lower;
pub mod memory;
pub mod parser;
pub mod simulator;
pub mod token;

pub use error::Error;
pub use facade::{compile, compile_program, CompileResult};
pub use simulator::{AccessKind, ExitReason, OobAccess, RunError, Simulator, TraceRecord};
