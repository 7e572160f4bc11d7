//! C4: builds the successor graph over IR instructions, and derives
//! reachability and an "obvious infinite loop" diagnosis from it.

use crate::diagnostics::Diagnostic;
use crate::ir::{IrProgram, Opcode, Operands};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cfg {
    /// `successors[pc]` lists the PCs control can transfer to directly from `pc`.
    pub successors: Vec<Vec<u16>>,
    pub reachable: Vec<bool>,
}

pub fn build(ir: &IrProgram) -> Cfg {
    let len = ir.len() as u16;
    let mut successors = vec![Vec::new(); ir.len()];

    for instr in &ir.instructions {
        let pc = instr.pc;
        let fallthrough = |out: &mut Vec<u16>| {
            let next = pc.wrapping_add(1);
            if next < len {
                out.push(next);
            }
        };
        match (instr.opcode, &instr.operands) {
            (Opcode::Hlt, _) => {}
            (Opcode::Bal, Operands::Branch { target, .. }) => {
                successors[pc as usize].push(*target);
            }
            (Opcode::Bal, Operands::Addr { .. }) => {}
            (Opcode::Bz, Operands::Branch { target, .. }) => {
                fallthrough(&mut successors[pc as usize]);
                successors[pc as usize].push(*target);
            }
            _ => fallthrough(&mut successors[pc as usize]),
        }
    }

    let reachable = compute_reachability(&successors);

    Cfg {
        successors,
        reachable,
    }
}

fn compute_reachability(successors: &[Vec<u16>]) -> Vec<bool> {
    let mut reachable = vec![false; successors.len()];
    if successors.is_empty() {
        return reachable;
    }
    let mut stack = vec![0u16];
    reachable[0] = true;
    while let Some(pc) = stack.pop() {
        for &next in &successors[pc as usize] {
            if !reachable[next as usize] {
                reachable[next as usize] = true;
                stack.push(next);
            }
        }
    }
    reachable
}

/// Reports every instruction that reachability analysis could not reach
/// from PC 0.
pub fn unreachable_diagnostics(cfg: &Cfg) -> Vec<Diagnostic> {
    cfg.reachable
        .iter()
        .enumerate()
        .filter(|(_, reachable)| !**reachable)
        .map(|(pc, _)| Diagnostic::UnreachableCode { pc: pc as u16 })
        .collect()
}

/// Tarjan's algorithm, used only to find strongly-connected components that
/// never escape to a halt or return and never touch I/O -- the "obvious
/// infinite loop" diagnosis. Anything cleverer (loops that terminate via
/// data the analyzer can't reason about) is explicitly out of scope.
struct Tarjan<'a> {
    successors: &'a [Vec<u16>],
    index_of: Vec<Option<u32>>,
    lowlink: Vec<u32>,
    on_stack: Vec<bool>,
    stack: Vec<u16>,
    next_index: u32,
    sccs: Vec<Vec<u16>>,
}

impl<'a> Tarjan<'a> {
    fn new(successors: &'a [Vec<u16>]) -> Self {
        Tarjan {
            successors,
            index_of: vec![None; successors.len()],
            lowlink: vec![0; successors.len()],
            on_stack: vec![false; successors.len()],
            stack: Vec::new(),
            next_index: 0,
            sccs: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<Vec<u16>> {
        for pc in 0..self.successors.len() as u16 {
            if self.index_of[pc as usize].is_none() {
                self.strong_connect(pc);
            }
        }
        self.sccs
    }

    fn strong_connect(&mut self, v: u16) {
        self.index_of[v as usize] = Some(self.next_index);
        self.lowlink[v as usize] = self.next_index;
        self.next_index += 1;
        self.stack.push(v);
        self.on_stack[v as usize] = true;

        for &w in &self.successors[v as usize].clone() {
            if self.index_of[w as usize].is_none() {
                self.strong_connect(w);
                self.lowlink[v as usize] = self.lowlink[v as usize].min(self.lowlink[w as usize]);
            } else if self.on_stack[w as usize] {
                self.lowlink[v as usize] = self.lowlink[v as usize].min(self.index_of[w as usize].unwrap());
            }
        }

        if self.lowlink[v as usize] == self.index_of[v as usize].unwrap() {
            let mut component = Vec::new();
            loop {
                let w = self.stack.pop().unwrap();
                self.on_stack[w as usize] = false;
                component.push(w);
                if w == v {
                    break;
                }
            }
            self.sccs.push(component);
        }
    }
}

/// Flags SCCs that have no edge leaving to a node outside themselves and
/// contain neither a halt/return instruction nor an `IN`/`OUT`.
pub fn infinite_loop_diagnostics(cfg: &Cfg, ir: &IrProgram) -> Vec<Diagnostic> {
    let sccs = Tarjan::new(&cfg.successors).run();
    let mut diagnostics = Vec::new();

    for component in sccs {
        if component.len() == 1 {
            let pc = component[0];
            if !cfg.successors[pc as usize].contains(&pc) {
                continue; // not actually a loop, just a singleton SCC
            }
        }
        let members: std::collections::HashSet<u16> = component.iter().copied().collect();
        let escapes = component.iter().any(|pc| {
            cfg.successors[*pc as usize]
                .iter()
                .any(|next| !members.contains(next))
        });
        if escapes {
            continue;
        }
        let has_io = ir
            .instructions
            .iter()
            .filter(|i| members.contains(&i.pc))
            .any(|i| matches!(i.opcode, Opcode::In | Opcode::Out));
        if has_io {
            continue;
        }
        if component.iter().any(|pc| !cfg.reachable[*pc as usize]) {
            continue;
        }
        let mut pcs: Vec<u16> = component;
        pcs.sort_unstable();
        diagnostics.push(Diagnostic::InfiniteLoop { pcs });
    }

    diagnostics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::lower::lower;
    use crate::parser::parse;

    fn build_cfg(src: &str) -> (Cfg, IrProgram) {
        let lexed = lex(src);
        let parsed = parse(&lexed.tokens);
        let lowered = lower(&parsed.program, 4, 16);
        let ir = lowered.ir.expect("expected lowering to succeed");
        let cfg = build(&ir);
        (cfg, ir)
    }

    #[test]
    fn bz_has_two_successors() {
        let (cfg, _) = build_cfg("loop: bz $0, loop\nhlt\n");
        assert_eq!(cfg.successors[0].len(), 2);
        assert!(cfg.successors[0].contains(&0));
        assert!(cfg.successors[0].contains(&1));
    }

    #[test]
    fn hlt_has_no_successors() {
        let (cfg, _) = build_cfg("hlt\n");
        assert!(cfg.successors[0].is_empty());
    }

    #[test]
    fn unreachable_code_is_flagged() {
        let (cfg, _) = build_cfg("bal $1, skip\nhlt\nskip: hlt\n");
        let diags = unreachable_diagnostics(&cfg);
        assert_eq!(diags, vec![Diagnostic::UnreachableCode { pc: 1 }]);
    }

    #[test]
    fn tight_loop_with_no_io_is_an_infinite_loop() {
        let (cfg, ir) = build_cfg("loop: bal $0, loop\n");
        let diags = infinite_loop_diagnostics(&cfg, &ir);
        assert!(!diags.is_empty());
    }

    #[test]
    fn loop_with_io_is_not_flagged() {
        let (cfg, ir) = build_cfg("loop: in $0\nbal $1, loop\n");
        let diags = infinite_loop_diagnostics(&cfg, &ir);
        assert!(diags.is_empty());
    }
}
