//! C3 data model: the lowered intermediate representation, plus the pure
//! bit-layout encode/decode functions used by the lowerer (C3) and exercised
//! directly by the round-trip property in the test suite.

use crate::constants::{BRANCH_OVERFLOW_THRESHOLD, OPCODE_SHIFT};
use crate::token::Span;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Add,
    And,
    Sub,
    Slt,
    Not,
    Sr,
    Hlt,
    Ld,
    St,
    Lda,
    In,
    Out,
    Bz,
    Bal,
}

impl Opcode {
    pub fn from_mnemonic(mnemonic: &str) -> Option<Opcode> {
        match mnemonic.to_ascii_lowercase().as_str() {
            "add" => Some(Opcode::Add),
            "and" => Some(Opcode::And),
            "sub" => Some(Opcode::Sub),
            "slt" => Some(Opcode::Slt),
            "not" => Some(Opcode::Not),
            "sr" => Some(Opcode::Sr),
            "hlt" => Some(Opcode::Hlt),
            "ld" => Some(Opcode::Ld),
            "st" => Some(Opcode::St),
            "lda" => Some(Opcode::Lda),
            "in" => Some(Opcode::In),
            "out" => Some(Opcode::Out),
            "bz" => Some(Opcode::Bz),
            "bal" => Some(Opcode::Bal),
            _ => None,
        }
    }

    /// The 4-bit value occupying the top nibble of an encoded word.
    pub fn bits(&self) -> u8 {
        match self {
            Opcode::Add => 0x0,
            Opcode::And => 0x1,
            Opcode::Sub => 0x2,
            Opcode::Slt => 0x3,
            Opcode::Not => 0x4,
            Opcode::Sr => 0x6,
            Opcode::Hlt => 0x7,
            Opcode::Ld => 0x8,
            Opcode::St => 0x9,
            Opcode::Lda => 0xA,
            Opcode::In => 0xC,
            Opcode::Out => 0xD,
            Opcode::Bz => 0xE,
            Opcode::Bal => 0xF,
        }
    }

    pub fn from_bits(bits: u8) -> Option<Opcode> {
        match bits {
            0x0 => Some(Opcode::Add),
            0x1 => Some(Opcode::And),
            0x2 => Some(Opcode::Sub),
            0x3 => Some(Opcode::Slt),
            0x4 => Some(Opcode::Not),
            0x6 => Some(Opcode::Sr),
            0x7 => Some(Opcode::Hlt),
            0x8 => Some(Opcode::Ld),
            0x9 => Some(Opcode::St),
            0xA => Some(Opcode::Lda),
            0xC => Some(Opcode::In),
            0xD => Some(Opcode::Out),
            0xE => Some(Opcode::Bz),
            0xF => Some(Opcode::Bal),
            _ => None,
        }
    }

    pub fn format(&self) -> Format {
        match self {
            Opcode::Add | Opcode::And | Opcode::Sub | Opcode::Slt => Format::R,
            Opcode::Not | Opcode::Sr => Format::R1,
            Opcode::Hlt => Format::R0,
            Opcode::Ld | Opcode::St | Opcode::Lda | Opcode::In | Opcode::Out => Format::I,
            Opcode::Bz | Opcode::Bal => Format::I,
        }
    }

    /// The canonical uppercase mnemonic, the inverse of [`Opcode::from_mnemonic`].
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Opcode::Add => "ADD",
            Opcode::And => "AND",
            Opcode::Sub => "SUB",
            Opcode::Slt => "SLT",
            Opcode::Not => "NOT",
            Opcode::Sr => "SR",
            Opcode::Hlt => "HLT",
            Opcode::Ld => "LD",
            Opcode::St => "ST",
            Opcode::Lda => "LDA",
            Opcode::In => "IN",
            Opcode::Out => "OUT",
            Opcode::Bz => "BZ",
            Opcode::Bal => "BAL",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    R,
    R1,
    R0,
    I,
}

/// Fully resolved operands for an IR instruction. Unlike the raw bit layout
/// (which is identical for every I-format instruction), this keeps the
/// branch-label case distinct from the address case, since the two are
/// interpreted completely differently by the simulator even though they
/// share an encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operands {
    R { dest: u8, src1: u8, src2: u8 },
    R1 { dest: u8, src: u8 },
    R0,
    /// `LD`/`ST`/`LDA`/`BAL`-as-return: `reg` is dest (`LD`/`LDA`/`BAL`) or
    /// source (`ST`), `ea = (base == 0 ? 0 : reg[base]) + imm`.
    Addr { reg: u8, base: u8, imm: i8 },
    /// `IN`/`OUT`: only a register operand, base/imm fields are zero.
    RegOnly { reg: u8 },
    /// `BZ`/`BAL`-as-call: `reg` is the condition register (`BZ`) or the
    /// link destination (`BAL`); `target` is the resolved PC.
    Branch { reg: u8, target: u16 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrInstruction {
    pub pc: u16,
    pub opcode: Opcode,
    pub operands: Operands,
    pub span: Span,
    /// Canonical re-rendering of the instruction (mnemonic + operands),
    /// independent of the exact source spelling -- used by the simulator's
    /// trace records and by diagnostics that quote an instruction back to
    /// the user (spec "original textual form (for diagnostics and trace)").
    pub text: String,
}

/// Renders an opcode/operand pair back to source-like text, e.g.
/// `ADD $1, $2, $3` or `LD $2, -4($1)`. This is the canonical spelling used
/// to populate [`IrInstruction::text`]; it need not match the operator's
/// original source byte-for-byte (whitespace, comments, and case are not
/// preserved), only its meaning.
pub fn render_text(opcode: Opcode, operands: &Operands) -> String {
    let mnemonic = opcode.mnemonic();
    match *operands {
        Operands::R { dest, src1, src2 } => format!("{} ${}, ${}, ${}", mnemonic, dest, src1, src2),
        Operands::R1 { dest, src } => format!("{} ${}, ${}", mnemonic, dest, src),
        Operands::R0 => mnemonic.to_string(),
        Operands::Addr { reg, base, imm } => format!("{} ${}, {}(${})", mnemonic, reg, imm, base),
        Operands::RegOnly { reg } => format!("{} ${}", mnemonic, reg),
        Operands::Branch { reg, target } => format!("{} ${}, {}", mnemonic, reg, target),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IrProgram {
    pub instructions: Vec<IrInstruction>,
    pub words: Vec<u16>,
}

impl IrProgram {
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

pub fn sign_extend8(byte: u8) -> i16 {
    byte as i8 as i16
}

/// Encodes a single IR instruction to its 16-bit word.
///
/// Branch targets use add-then-mask, not shift-then-or: this is the legacy
/// encoder quirk the instruction set intentionally preserves. Every other
/// format has no overlapping bit ranges, so addition and bitwise-or agree.
pub fn encode_word(instr: &IrInstruction) -> u16 {
    let op = instr.opcode.bits();
    match instr.operands {
        Operands::R { dest, src1, src2 } => {
            ((op as u16) << OPCODE_SHIFT) | ((src1 as u16) << 10) | ((src2 as u16) << 8) | ((dest as u16) << 6)
        }
        Operands::R1 { dest, src } => ((op as u16) << OPCODE_SHIFT) | ((src as u16) << 10) | ((dest as u16) << 6),
        Operands::R0 => (op as u16) << OPCODE_SHIFT,
        Operands::Addr { reg, base, imm } => {
            let low10 = ((base as u16) << 8) | (imm as u8 as u16);
            encode_i_raw(op, reg, low10)
        }
        Operands::RegOnly { reg } => encode_i_raw(op, reg, 0),
        Operands::Branch { reg, target } => encode_i_raw(op, reg, target),
    }
}

fn encode_i_raw(opcode: u8, dest: u8, low10: u16) -> u16 {
    let raw = ((opcode as u32) << OPCODE_SHIFT)
        .wrapping_add((dest as u32) << 10)
        .wrapping_add(low10 as u32);
    (raw & 0xFFFF) as u16
}

pub fn branch_overflows(target: u16) -> bool {
    target >= BRANCH_OVERFLOW_THRESHOLD
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("opcode bits {0:#x} do not name a valid SN/X instruction")]
    InvalidOpcode(u8),
}

/// Raw field decomposition of an I-format word; interpretation as an
/// address (`base`/`imm`) or a branch target (`target = low10`) is up to
/// the caller, since the bit layout cannot tell the two apart on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedI {
    pub dest: u8,
    pub base: u8,
    pub imm: u8,
    pub low10: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodedOperands {
    R { src1: u8, src2: u8, dest: u8 },
    R1 { src: u8, dest: u8 },
    R0,
    I(DecodedI),
}

/// Inverse of [`encode_word`] for the non-overflowing case. Decoding a word
/// produced by a branch whose target was `>= 1024` does not recover the
/// original target (the add-then-mask carried bits into the register/opcode
/// field); this is the documented non-invertible case.
pub fn decode_word(word: u16) -> Result<(Opcode, DecodedOperands), DecodeError> {
    let op_bits = (word >> OPCODE_SHIFT) as u8 & 0xF;
    let opcode = Opcode::from_bits(op_bits).ok_or(DecodeError::InvalidOpcode(op_bits))?;
    let operands = match opcode.format() {
        Format::R => DecodedOperands::R {
            src1: ((word >> 10) & 0x3) as u8,
            src2: ((word >> 8) & 0x3) as u8,
            dest: ((word >> 6) & 0x3) as u8,
        },
        Format::R1 => DecodedOperands::R1 {
            src: ((word >> 10) & 0x3) as u8,
            dest: ((word >> 6) & 0x3) as u8,
        },
        Format::R0 => DecodedOperands::R0,
        Format::I => {
            let dest = ((word >> 10) & 0x3) as u8;
            let low10 = word & 0x3FF;
            let base = ((low10 >> 8) & 0x3) as u8;
            let imm = (low10 & 0xFF) as u8;
            DecodedOperands::I(DecodedI {
                dest,
                base,
                imm,
                low10,
            })
        }
    };
    Ok((opcode, operands))
}

/// Maps a decoded word's raw fields onto the semantic [`Operands`] a
/// compiled program would have produced. `BZ`/`BAL` are always read back as
/// the label/call form (`Branch`): a raw word cannot distinguish that from
/// `BAL`'s register-relative return form, since both share the identical
/// I-format layout (see `DESIGN.md`).
pub fn decoded_to_operands(opcode: Opcode, decoded: DecodedOperands) -> Operands {
    match decoded {
        DecodedOperands::R { src1, src2, dest } => Operands::R { dest, src1, src2 },
        DecodedOperands::R1 { src, dest } => Operands::R1 { dest, src },
        DecodedOperands::R0 => Operands::R0,
        DecodedOperands::I(fields) => match opcode {
            Opcode::Bz | Opcode::Bal => Operands::Branch {
                reg: fields.dest,
                target: fields.low10,
            },
            Opcode::In | Opcode::Out => Operands::RegOnly { reg: fields.dest },
            _ => Operands::Addr {
                reg: fields.dest,
                base: fields.base,
                imm: fields.imm as i8,
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::Span;

    fn instr(pc: u16, opcode: Opcode, operands: Operands) -> IrInstruction {
        IrInstruction {
            pc,
            opcode,
            operands,
            span: Span::new(1, 1),
            text: render_text(opcode, &operands),
        }
    }

    #[test]
    fn round_trips_r_type() {
        let i = instr(0, Opcode::Add, Operands::R { dest: 2, src1: 0, src2: 1 });
        let word = encode_word(&i);
        let (opcode, operands) = decode_word(word).unwrap();
        assert_eq!(opcode, Opcode::Add);
        assert_eq!(operands, DecodedOperands::R { src1: 0, src2: 1, dest: 2 });
    }

    #[test]
    fn round_trips_small_branch_target() {
        let i = instr(0, Opcode::Bz, Operands::Branch { reg: 1, target: 100 });
        let word = encode_word(&i);
        let (opcode, operands) = decode_word(word).unwrap();
        assert_eq!(opcode, Opcode::Bz);
        match operands {
            DecodedOperands::I(fields) => assert_eq!(fields.low10, 100),
            _ => panic!("expected I format"),
        }
    }

    #[test]
    fn large_branch_target_corrupts_the_register_field() {
        // target = 1500 sets bit 10, which lands in the register field's
        // low bit once added to `reg << 10` -- the documented overflow bug.
        let i = instr(0, Opcode::Bal, Operands::Branch { reg: 0, target: 1500 });
        assert!(branch_overflows(1500));
        let word = encode_word(&i);
        let (_, operands) = decode_word(word).unwrap();
        match operands {
            DecodedOperands::I(fields) => {
                assert_eq!(fields.low10, 1500 & 0x3FF);
                assert_ne!(fields.dest, 0, "carry should have corrupted the register field");
            }
            _ => panic!("expected I format"),
        }
    }

    #[test]
    fn invalid_opcode_bits_are_rejected() {
        let word = 0x5000u16;
        assert_eq!(decode_word(word), Err(DecodeError::InvalidOpcode(0x5)));
    }
}
