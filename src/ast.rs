//! C2 data model: the parsed (but not yet lowered) form of a source program.

use crate::token::Span;

/// A register operand, holding the raw parsed index. Bounds against
/// `reg_count` are checked during lowering (C3), not here, since the parser
/// has no notion of the configured register count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawReg(pub u32);

/// An address or branch-target operand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Reg(RawReg),
    /// `imm(base)`, or a bare `imm` meaning `imm($0)`.
    Address { imm: i64, base: RawReg },
    /// A label name used as a branch target.
    Label(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub mnemonic: String,
    pub operands: Vec<Operand>,
    pub span: Span,
}

/// One source line: an optional label definition, an optional instruction,
/// blank lines and comment-only lines produce neither.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Line {
    pub label: Option<(String, Span)>,
    pub instruction: Option<Instruction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Program {
    pub lines: Vec<Line>,
}

impl Program {
    /// Instructions in source order, each paired with the PC it would
    /// occupy if every line lowered successfully (0-based, skipping
    /// label-only lines).
    pub fn instructions(&self) -> impl Iterator<Item = (u16, &Instruction)> {
        self.lines
            .iter()
            .filter_map(|line| line.instruction.as_ref())
            .enumerate()
            .map(|(pc, instr)| (pc as u16, instr))
    }
}
