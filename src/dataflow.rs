//! C5: a forward dataflow analysis over the CFG tracking, per register,
//! whether a value is definitely initialized (with provenance) and whether
//! it is known to hold a return address written by `BAL`. Facts are
//! computed to a fixpoint first; diagnostics are derived from the
//! fixpoint's final per-PC facts in a second pass, so a warning is never
//! emitted against a fact that hasn't stabilized yet.

use crate::cfg::Cfg;
use crate::diagnostics::Diagnostic;
use crate::ir::{IrInstruction, IrProgram, Opcode, Operands};
use std::collections::{BTreeSet, VecDeque};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitState {
    Uninit,
    MaybeInit,
    /// Definitely initialized; the set names every PC whose write could be
    /// the one observed here (merges at a join keep the union, not
    /// `MaybeInit` -- both paths still define the register, just with
    /// different values).
    Init(BTreeSet<u16>),
}

impl InitState {
    fn join(&self, other: &InitState) -> InitState {
        use InitState::*;
        match (self, other) {
            (Uninit, Uninit) => Uninit,
            (Init(a), Init(b)) => Init(a.union(b).cloned().collect()),
            _ => MaybeInit,
        }
    }

    pub fn is_definitely_init(&self) -> bool {
        matches!(self, InitState::Init(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Taint {
    Clean,
    Maybe,
    Tainted,
}

impl Taint {
    fn join(self, other: Taint) -> Taint {
        match (self, other) {
            (Taint::Clean, Taint::Clean) => Taint::Clean,
            (Taint::Tainted, Taint::Tainted) => Taint::Tainted,
            _ => Taint::Maybe,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fact {
    pub init: Vec<InitState>,
    pub taint: Vec<Taint>,
}

impl Fact {
    /// `$0` starts definitely initialized (it is a real, zero-valued
    /// register from the first instruction on); every other register
    /// starts uninitialized.
    fn entry(reg_count: u8) -> Fact {
        let mut init = vec![InitState::Uninit; reg_count as usize];
        if !init.is_empty() {
            init[0] = InitState::Init(BTreeSet::new());
        }
        Fact {
            init,
            taint: vec![Taint::Clean; reg_count as usize],
        }
    }

    fn join(&self, other: &Fact) -> Fact {
        Fact {
            init: self
                .init
                .iter()
                .zip(&other.init)
                .map(|(a, b)| a.join(b))
                .collect(),
            taint: self
                .taint
                .iter()
                .zip(&other.taint)
                .map(|(a, b)| a.join(*b))
                .collect(),
        }
    }

    fn write(&mut self, reg: u8, pc: u16, taint: Taint) {
        let mut origins = BTreeSet::new();
        origins.insert(pc);
        self.init[reg as usize] = InitState::Init(origins);
        self.taint[reg as usize] = taint;
    }
}

fn transfer(fact: &Fact, instr: &IrInstruction) -> Fact {
    let mut next = fact.clone();
    match instr.operands {
        Operands::R { dest, .. } => next.write(dest, instr.pc, Taint::Clean),
        Operands::R1 { dest, .. } => next.write(dest, instr.pc, Taint::Clean),
        Operands::R0 => {}
        Operands::Addr { reg, .. } => match instr.opcode {
            Opcode::St => {}
            Opcode::Bal => next.write(reg, instr.pc, Taint::Tainted),
            _ => next.write(reg, instr.pc, Taint::Clean), // Ld, Lda
        },
        Operands::RegOnly { reg } => {
            if instr.opcode == Opcode::In {
                next.write(reg, instr.pc, Taint::Clean);
            }
        }
        Operands::Branch { reg, .. } => {
            if instr.opcode == Opcode::Bal {
                next.write(reg, instr.pc, Taint::Tainted);
            }
        }
    }
    next
}

fn check_instruction(fact: &Fact, instr: &IrInstruction) -> Vec<Diagnostic> {
    let mut out = Vec::new();
    let mut check_read = |reg: u8| {
        if !fact.init[reg as usize].is_definitely_init() {
            out.push(Diagnostic::UninitializedRead {
                span: instr.span,
                index: reg as u32,
            });
        }
    };
    match instr.operands {
        Operands::R { src1, src2, .. } => {
            check_read(src1);
            check_read(src2);
        }
        Operands::R1 { src, .. } => check_read(src),
        Operands::R0 => {}
        Operands::Addr { reg, base, .. } => match instr.opcode {
            Opcode::St => {
                check_read(reg);
                check_read(base);
            }
            Opcode::Bal => {
                check_read(base);
                if fact.taint[base as usize] != Taint::Tainted {
                    out.push(Diagnostic::UntaintedReturn {
                        span: instr.span,
                        index: base as u32,
                    });
                }
            }
            _ => check_read(base), // Ld, Lda
        },
        Operands::RegOnly { reg } => {
            if instr.opcode == Opcode::Out {
                check_read(reg);
            }
        }
        Operands::Branch { reg, .. } => {
            if instr.opcode == Opcode::Bz {
                check_read(reg);
            }
        }
    }
    out
}

#[derive(Debug, Clone)]
pub struct DataflowResult {
    /// The fact holding on entry to each PC, once the fixpoint converged.
    /// Unreached PCs hold the entry fact as a harmless placeholder -- see
    /// `cfg::unreachable_diagnostics` for the authoritative reachability
    /// signal.
    pub in_facts: Vec<Fact>,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn analyze(ir: &IrProgram, cfg: &Cfg, reg_count: u8) -> DataflowResult {
    let n = ir.len();
    if n == 0 {
        return DataflowResult {
            in_facts: Vec::new(),
            diagnostics: Vec::new(),
        };
    }

    let mut in_states: Vec<Option<Fact>> = vec![None; n];
    in_states[0] = Some(Fact::entry(reg_count));
    let mut queued = vec![false; n];
    let mut worklist: VecDeque<u16> = VecDeque::new();
    worklist.push_back(0);
    queued[0] = true;

    while let Some(pc) = worklist.pop_front() {
        queued[pc as usize] = false;
        let in_fact = in_states[pc as usize]
            .clone()
            .expect("worklist pc visited before its in-fact was set");
        let instr = &ir.instructions[pc as usize];
        let out_fact = transfer(&in_fact, instr);

        for &succ in &cfg.successors[pc as usize] {
            let merged = match &in_states[succ as usize] {
                Some(existing) => existing.join(&out_fact),
                None => out_fact.clone(),
            };
            if in_states[succ as usize].as_ref() != Some(&merged) {
                in_states[succ as usize] = Some(merged);
                if !queued[succ as usize] {
                    queued[succ as usize] = true;
                    worklist.push_back(succ);
                }
            }
        }
    }

    let mut diagnostics = Vec::new();
    for (pc, instr) in ir.instructions.iter().enumerate() {
        if let Some(fact) = &in_states[pc] {
            diagnostics.extend(check_instruction(fact, instr));
        }
    }

    let in_facts = in_states
        .into_iter()
        .map(|f| f.unwrap_or_else(|| Fact::entry(reg_count)))
        .collect();

    DataflowResult {
        in_facts,
        diagnostics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::build as build_cfg;
    use crate::lexer::lex;
    use crate::lower::lower;
    use crate::parser::parse;

    fn run(src: &str) -> DataflowResult {
        let lexed = lex(src);
        let parsed = parse(&lexed.tokens);
        let lowered = lower(&parsed.program, 4, 16);
        let ir = lowered.ir.expect("expected lowering to succeed");
        let cfg = build_cfg(&ir);
        analyze(&ir, &cfg, 4)
    }

    #[test]
    fn reading_an_uninitialized_register_warns() {
        let result = run("add $1, $2, $3\nhlt\n");
        assert!(result
            .diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::UninitializedRead { index: 2, .. })));
    }

    #[test]
    fn writing_then_reading_is_clean() {
        let result = run("in $1\nadd $2, $1, $0\nhlt\n");
        assert!(!result
            .diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::UninitializedRead { .. })));
    }

    #[test]
    fn bal_return_through_a_tainted_register_is_clean() {
        let result = run("bal $1, callee\nhlt\ncallee: bal $0, 0($1)\n");
        assert!(!result
            .diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::UntaintedReturn { .. })));
    }

    #[test]
    fn bal_return_through_an_untainted_register_warns() {
        let result = run("bal $0, 0($1)\n");
        assert!(result
            .diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::UntaintedReturn { .. })));
    }
}
