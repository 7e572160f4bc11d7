//! Bit-field layout constants for the SN/X 16-bit encoding formats, and the
//! toolchain's default construction parameters.

/// Width in bits of the opcode field, always the top 4 bits of a word.
pub const OPCODE_BITS: u32 = 4;
pub const OPCODE_SHIFT: u32 = 12;

/// Width in bits of a register field (`Src1`/`Src2`/`Dest`/`Base`). Only 4
/// registers (`$0`..`$3`) are directly addressable by the encoding.
pub const REG_FIELD_BITS: u32 = 2;
pub const MAX_ENCODABLE_REG: u8 = (1 << REG_FIELD_BITS) - 1;

/// Width in bits of the immediate field in the I format.
pub const IMM_BITS: u32 = 8;

/// A label-resolved branch target at or above this value cannot be held in
/// the combined 10-bit `Dest|Base+Imm` low field without corrupting the
/// register/opcode bits above it. Exceeding it is diagnosed as `B001`.
pub const BRANCH_OVERFLOW_THRESHOLD: u16 = 1 << 10;

/// Default register file size used by `compile_program`/`Simulator::from_source`
/// when the caller does not override it.
pub const DEFAULT_REG_COUNT: u8 = 4;

/// Default step budget for `Simulator::run`, guarding against runaway
/// simulation of a program that never halts.
pub const DEFAULT_STEP_LIMIT: u64 = 1_000_000;

/// Largest addressable data memory, matching the 16-bit address space.
pub const MAX_MEM_SIZE: u32 = 0x1_0000;
