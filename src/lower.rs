//! C3: two-pass lowering from [`crate::ast::Program`] to [`IrProgram`].
//!
//! Pass 1 walks the AST once to assign each instruction-bearing line a PC
//! and collect the label -> PC symbol table (duplicate labels are an error;
//! the first definition wins and later ones are rejected, not merged).
//! Pass 2 walks the AST again, validating operand shapes and register
//! indices, resolving labels, and encoding. If any pass produces an
//! `Error`-severity diagnostic the resulting IR is withheld entirely (see
//! `DESIGN.md`, "IR completeness under lowering errors").

use crate::ast::{Operand, Program, RawReg};
use crate::ir::{branch_overflows, encode_word, render_text, IrInstruction, IrProgram, Opcode, Operands};
use crate::token::Span;
use crate::diagnostics::{Diagnostic, Severity};
use std::collections::HashMap;

pub struct LowerResult {
    pub ir: Option<IrProgram>,
    pub diagnostics: Vec<Diagnostic>,
}

struct Symbols {
    pc_of: HashMap<String, u16>,
    defined_at: HashMap<String, Span>,
}

pub fn lower(program: &Program, reg_count: u8, mem_size: u32) -> LowerResult {
    let mut diagnostics = Vec::new();
    let symbols = collect_symbols(program, &mut diagnostics);

    let mut instructions = Vec::new();
    for (pc, instr) in program.instructions() {
        if let Some(ir_instr) = lower_instruction(instr, pc, reg_count, mem_size, &symbols, &mut diagnostics) {
            instructions.push(ir_instr);
        }
    }

    let has_errors = diagnostics.iter().any(|d| d.severity() == Severity::Error);
    if has_errors {
        return LowerResult { ir: None, diagnostics };
    }

    let words = instructions.iter().map(encode_word).collect();
    LowerResult {
        ir: Some(IrProgram { instructions, words }),
        diagnostics,
    }
}

fn collect_symbols(program: &Program, diagnostics: &mut Vec<Diagnostic>) -> Symbols {
    let mut pc_of = HashMap::new();
    let mut defined_at: HashMap<String, Span> = HashMap::new();
    let mut pc: u16 = 0;
    for line in &program.lines {
        if let Some((name, span)) = &line.label {
            if let Some(first) = defined_at.get(name) {
                diagnostics.push(Diagnostic::DuplicateLabel {
                    span: *span,
                    first: *first,
                    label: name.clone(),
                });
            } else {
                pc_of.insert(name.clone(), pc);
                defined_at.insert(name.clone(), *span);
            }
        }
        if line.instruction.is_some() {
            pc = pc.wrapping_add(1);
        }
    }
    Symbols { pc_of, defined_at }
}

fn check_reg(raw: RawReg, span: Span, reg_count: u8, diagnostics: &mut Vec<Diagnostic>) -> Option<u8> {
    if raw.0 < reg_count as u32 {
        Some(raw.0 as u8)
    } else {
        diagnostics.push(Diagnostic::RegisterOutOfRange {
            span,
            index: raw.0,
            reg_count,
        });
        None
    }
}

fn check_immediate(imm: i64, span: Span, diagnostics: &mut Vec<Diagnostic>) -> i8 {
    let truncated = (imm & 0xFF) as u8 as i8;
    if !(-128..=127).contains(&imm) {
        diagnostics.push(Diagnostic::ImmediateTruncated {
            span,
            literal: imm,
            truncated,
        });
    }
    truncated
}

fn check_absolute_bounds(imm8: i8, span: Span, mem_size: u32, diagnostics: &mut Vec<Diagnostic>) {
    let address = imm8 as i32;
    if address < 0 || address as u32 >= mem_size {
        diagnostics.push(Diagnostic::AbsoluteAddressOutOfBounds {
            span,
            address,
            mem_size,
        });
    }
}

fn resolve_label(name: &str, span: Span, symbols: &Symbols, diagnostics: &mut Vec<Diagnostic>) -> Option<u16> {
    match symbols.pc_of.get(name) {
        Some(pc) => Some(*pc),
        None => {
            diagnostics.push(Diagnostic::UndefinedLabel {
                span,
                label: name.to_string(),
            });
            None
        }
    }
}

fn check_branch_target(target: u16, span: Span, diagnostics: &mut Vec<Diagnostic>) {
    if branch_overflows(target) {
        diagnostics.push(Diagnostic::BranchTargetOverflow { span, target });
    }
}

fn lower_instruction(
    instr: &crate::ast::Instruction,
    pc: u16,
    reg_count: u8,
    mem_size: u32,
    symbols: &Symbols,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<IrInstruction> {
    let opcode = match Opcode::from_mnemonic(&instr.mnemonic) {
        Some(op) => op,
        None => {
            diagnostics.push(Diagnostic::UnknownMnemonic {
                span: instr.span,
                mnemonic: instr.mnemonic.clone(),
            });
            return None;
        }
    };

    let operands = match opcode {
        Opcode::Add | Opcode::And | Opcode::Sub | Opcode::Slt => match instr.operands.as_slice() {
            [Operand::Reg(d), Operand::Reg(s1), Operand::Reg(s2)] => {
                let dest = check_reg(*d, instr.span, reg_count, diagnostics)?;
                let src1 = check_reg(*s1, instr.span, reg_count, diagnostics)?;
                let src2 = check_reg(*s2, instr.span, reg_count, diagnostics)?;
                Operands::R { dest, src1, src2 }
            }
            _ => return bad_shape(instr, diagnostics),
        },
        Opcode::Not | Opcode::Sr => match instr.operands.as_slice() {
            [Operand::Reg(d), Operand::Reg(s)] => {
                let dest = check_reg(*d, instr.span, reg_count, diagnostics)?;
                let src = check_reg(*s, instr.span, reg_count, diagnostics)?;
                Operands::R1 { dest, src }
            }
            _ => return bad_shape(instr, diagnostics),
        },
        Opcode::Hlt => {
            if instr.operands.is_empty() {
                Operands::R0
            } else {
                return bad_shape(instr, diagnostics);
            }
        }
        Opcode::Ld | Opcode::St | Opcode::Lda => match instr.operands.as_slice() {
            [Operand::Reg(r), Operand::Address { imm, base }] => {
                let reg = check_reg(*r, instr.span, reg_count, diagnostics)?;
                let base_reg = check_reg(*base, instr.span, reg_count, diagnostics)?;
                let imm8 = check_immediate(*imm, instr.span, diagnostics);
                if opcode != Opcode::Lda && base_reg == 0 {
                    check_absolute_bounds(imm8, instr.span, mem_size, diagnostics);
                }
                Operands::Addr {
                    reg,
                    base: base_reg,
                    imm: imm8,
                }
            }
            _ => return bad_shape(instr, diagnostics),
        },
        Opcode::In | Opcode::Out => match instr.operands.as_slice() {
            [Operand::Reg(r)] => {
                let reg = check_reg(*r, instr.span, reg_count, diagnostics)?;
                Operands::RegOnly { reg }
            }
            _ => return bad_shape(instr, diagnostics),
        },
        Opcode::Bz => match instr.operands.as_slice() {
            [Operand::Reg(r), Operand::Label(name)] => {
                let reg = check_reg(*r, instr.span, reg_count, diagnostics)?;
                let target = resolve_label(name, instr.span, symbols, diagnostics)?;
                check_branch_target(target, instr.span, diagnostics);
                Operands::Branch { reg, target }
            }
            _ => return bad_shape(instr, diagnostics),
        },
        Opcode::Bal => match instr.operands.as_slice() {
            [Operand::Reg(r), Operand::Label(name)] => {
                let reg = check_reg(*r, instr.span, reg_count, diagnostics)?;
                let target = resolve_label(name, instr.span, symbols, diagnostics)?;
                check_branch_target(target, instr.span, diagnostics);
                Operands::Branch { reg, target }
            }
            [Operand::Reg(r), Operand::Address { imm, base }] => {
                let reg = check_reg(*r, instr.span, reg_count, diagnostics)?;
                let base_reg = check_reg(*base, instr.span, reg_count, diagnostics)?;
                let imm8 = check_immediate(*imm, instr.span, diagnostics);
                Operands::Addr {
                    reg,
                    base: base_reg,
                    imm: imm8,
                }
            }
            _ => return bad_shape(instr, diagnostics),
        },
    };

    Some(IrInstruction {
        pc,
        opcode,
        text: render_text(opcode, &operands),
        operands,
        span: instr.span,
    })
}

fn bad_shape(instr: &crate::ast::Instruction, diagnostics: &mut Vec<Diagnostic>) -> Option<IrInstruction> {
    diagnostics.push(Diagnostic::BadOperandShape {
        span: instr.span,
        mnemonic: instr.mnemonic.clone(),
    });
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::parser::parse;

    fn lower_source(src: &str, reg_count: u8, mem_size: u32) -> LowerResult {
        let lexed = lex(src);
        let parsed = parse(&lexed.tokens);
        lower(&parsed.program, reg_count, mem_size)
    }

    #[test]
    fn lowers_straight_line_program() {
        let result = lower_source("add $1, $2, $3\nhlt\n", 4, 16);
        assert!(result.diagnostics.is_empty());
        let ir = result.ir.unwrap();
        assert_eq!(ir.len(), 2);
        assert_eq!(ir.words.len(), 2);
    }

    #[test]
    fn duplicate_label_is_an_error() {
        let result = lower_source("a: hlt\na: hlt\n", 4, 16);
        assert!(result.ir.is_none());
        assert!(result
            .diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::DuplicateLabel { .. })));
    }

    #[test]
    fn label_definition_and_reference_are_case_insensitive() {
        let result = lower_source("bz $0, Loop\nLOOP: hlt\n", 4, 16);
        assert!(result.ir.is_some(), "{:?}", result.diagnostics);
        assert!(!result
            .diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::UndefinedLabel { .. })));
    }

    #[test]
    fn differently_cased_label_definitions_still_collide() {
        let result = lower_source("a: hlt\nA: hlt\n", 4, 16);
        assert!(result.ir.is_none());
        assert!(result
            .diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::DuplicateLabel { .. })));
    }

    #[test]
    fn undefined_label_is_an_error() {
        let result = lower_source("bz $0, nowhere\n", 4, 16);
        assert!(result.ir.is_none());
        assert!(result
            .diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::UndefinedLabel { .. })));
    }

    #[test]
    fn absolute_load_out_of_bounds_is_m001() {
        let result = lower_source("ld $0, 20\n", 4, 16);
        assert!(result.ir.is_none());
        assert!(result
            .diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::AbsoluteAddressOutOfBounds { .. })));
    }

    #[test]
    fn lda_is_excluded_from_absolute_bounds_check() {
        let result = lower_source("lda $0, 20\n", 4, 16);
        assert!(result.ir.is_some());
        assert!(!result
            .diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::AbsoluteAddressOutOfBounds { .. })));
    }

    #[test]
    fn oversized_immediate_is_truncated_with_a_warning() {
        let result = lower_source("ld $0, 200($1)\n", 4, 16);
        assert!(result.ir.is_some());
        assert!(result
            .diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::ImmediateTruncated { .. })));
    }

    #[test]
    fn bal_accepts_a_register_relative_return_address() {
        let result = lower_source("bal $0, 0($2)\n", 4, 16);
        assert!(result.ir.is_some());
        let ir = result.ir.unwrap();
        assert!(matches!(ir.instructions[0].operands, Operands::Addr { .. }));
    }
}
