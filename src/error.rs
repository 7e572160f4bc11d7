//! Top-level error type for facade misuse -- a programmer/caller contract
//! violation, distinct from [`crate::diagnostics::Diagnostic`], which
//! reports defects in the *source program* being compiled.

use crate::constants::MAX_MEM_SIZE;
use crate::ir::DecodeError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("mem_size {requested} exceeds the maximum addressable memory of {MAX_MEM_SIZE}")]
    MemoryTooLarge { requested: u32 },

    #[error("cannot construct a Simulator from a CompileResult that has {error_count} error(s)")]
    CompileResultHasErrors { error_count: usize },

    #[error("word at index {index} does not decode to a valid instruction")]
    InvalidEncodedWord {
        index: usize,
        #[source]
        source: DecodeError,
    },
}

pub fn check_mem_size(mem_size: u32) -> Result<(), Error> {
    if mem_size > MAX_MEM_SIZE {
        Err(Error::MemoryTooLarge { requested: mem_size })
    } else {
        Ok(())
    }
}
