//! C8: the single public entry surface a host application needs. Everything
//! else in this crate is `pub` for composability (a host may want the raw
//! CFG or dataflow facts) but this module is the one most callers use.

use crate::ast::Program;
use crate::cfg::{self, Cfg};
use crate::constants::DEFAULT_REG_COUNT;
use crate::dataflow::{self, DataflowResult};
use crate::diagnostics::{format_diagnostics, Diagnostic, Severity};
use crate::error::{check_mem_size, Error};
use crate::ir::{decode_word, decoded_to_operands, render_text, IrInstruction, IrProgram};
use crate::lexer::lex;
use crate::lower::lower;
use crate::memory::Memory;
use crate::parser::parse;
use crate::simulator::Simulator;
use crate::token::Span;
use tracing::info;

/// Everything produced by compiling one source program: the AST, the IR (if
/// lowering produced no errors), the CFG and dataflow facts (if requested
/// and lowering succeeded), and every diagnostic collected along the way.
pub struct CompileResult {
    pub program: Program,
    pub ir: Option<IrProgram>,
    pub cfg: Option<Cfg>,
    pub dataflow: Option<DataflowResult>,
    pub diagnostics: Vec<Diagnostic>,
    pub reg_count: u8,
    pub mem_size: u32,
}

impl CompileResult {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity() == Severity::Error)
    }

    pub fn has_warnings(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity() == Severity::Warning)
    }

    pub fn format_diagnostics(&self) -> String {
        format_diagnostics(&self.diagnostics)
    }
}

/// Compiles `source` through the lexer, parser, lowerer/encoder, and --
/// when `run_static_checks` is set and lowering produced no errors -- the
/// CFG builder and dataflow analyzer.
pub fn compile_program(source: &str, reg_count: u8, mem_size: u32, run_static_checks: bool) -> CompileResult {
    let span = tracing::info_span!("compile_program", reg_count, mem_size, run_static_checks);
    let _enter = span.enter();
    info!(len = source.len(), "compiling");

    let mut diagnostics = Vec::new();

    let lexed = lex(source);
    diagnostics.extend(lexed.diagnostics);

    let parsed = parse(&lexed.tokens);
    diagnostics.extend(parsed.diagnostics);

    let lowered = lower(&parsed.program, reg_count, mem_size);
    diagnostics.extend(lowered.diagnostics);

    let mut cfg_result = None;
    let mut dataflow_result = None;

    if run_static_checks {
        if let Some(ir) = &lowered.ir {
            let cfg = cfg::build(ir);
            diagnostics.extend(cfg::unreachable_diagnostics(&cfg));
            diagnostics.extend(cfg::infinite_loop_diagnostics(&cfg, ir));

            let flow = dataflow::analyze(ir, &cfg, reg_count);
            diagnostics.extend(flow.diagnostics.clone());

            cfg_result = Some(cfg);
            dataflow_result = Some(flow);
        }
    }

    for diag in &diagnostics {
        if diag.severity() == Severity::Error {
            tracing::warn!(code = diag.code(), "{}", diag);
        }
    }

    CompileResult {
        program: parsed.program,
        ir: lowered.ir,
        cfg: cfg_result,
        dataflow: dataflow_result,
        diagnostics,
        reg_count,
        mem_size,
    }
}

/// Compiles with the default register count ([`DEFAULT_REG_COUNT`]) and
/// static checks enabled.
pub fn compile(source: &str, mem_size: u32) -> CompileResult {
    compile_program(source, DEFAULT_REG_COUNT, mem_size, true)
}

impl Simulator<Memory> {
    /// Builds a simulator from an already-compiled program. Fails if the
    /// compile produced any error-severity diagnostic.
    pub fn from_compile_result(result: &CompileResult) -> Result<Simulator<Memory>, Error> {
        if result.has_errors() {
            let error_count = result
                .diagnostics
                .iter()
                .filter(|d| d.severity() == Severity::Error)
                .count();
            return Err(Error::CompileResultHasErrors { error_count });
        }
        check_mem_size(result.mem_size)?;
        let ir = result
            .ir
            .clone()
            .expect("has_errors() == false implies lowering produced an IR");
        Ok(Simulator::new(
            ir.instructions,
            result.reg_count,
            Memory::new(result.mem_size),
        ))
    }

    /// Compiles `source` and builds a simulator from it in one call.
    pub fn from_source(
        source: &str,
        reg_count: u8,
        mem_size: u32,
        run_static_checks: bool,
    ) -> Result<Simulator<Memory>, Error> {
        let result = compile_program(source, reg_count, mem_size, run_static_checks);
        Simulator::from_compile_result(&result)
    }

    /// Loads a raw 16-bit word image directly, bypassing the compiler. Every
    /// `BZ`/`BAL` is read back as the label/call form (`target = low10`);
    /// see `DESIGN.md` for why the two share a bit layout and cannot be told
    /// apart from the word alone.
    pub fn from_words(words: &[u16], reg_count: u8, mem_size: u32) -> Result<Simulator<Memory>, Error> {
        check_mem_size(mem_size)?;
        let mut instructions = Vec::with_capacity(words.len());
        for (index, &word) in words.iter().enumerate() {
            let (opcode, decoded) =
                decode_word(word).map_err(|source| Error::InvalidEncodedWord { index, source })?;
            let operands = decoded_to_operands(opcode, decoded);
            instructions.push(IrInstruction {
                pc: index as u16,
                opcode,
                text: render_text(opcode, &operands),
                operands,
                span: Span::new(0, 0),
            });
        }
        Ok(Simulator::new(instructions, reg_count, Memory::new(mem_size)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_a_clean_program() {
        let result = compile_program("add $1, $2, $3\nhlt\n", 4, 16, true);
        assert!(!result.has_errors());
        assert!(result.ir.is_some());
        assert!(result.cfg.is_some());
        assert!(result.dataflow.is_some());
    }

    #[test]
    fn static_checks_can_be_skipped() {
        let result = compile_program("add $1, $2, $3\nhlt\n", 4, 16, false);
        assert!(result.cfg.is_none());
        assert!(result.dataflow.is_none());
    }

    #[test]
    fn simulator_construction_refuses_a_program_with_errors() {
        let result = compile_program("bogus $1, $2\n", 4, 16, true);
        assert!(result.has_errors());
        assert!(Simulator::from_compile_result(&result).is_err());
    }

    #[test]
    fn mem_size_over_the_address_space_is_rejected() {
        let err = Simulator::from_source("hlt\n", 4, 0x2_0000, true).unwrap_err();
        assert!(matches!(err, Error::MemoryTooLarge { .. }));
    }

    #[test]
    fn from_words_round_trips_an_encoded_program() {
        let result = compile_program("lda $1, 5\nhlt\n", 4, 16, true);
        let ir = result.ir.unwrap();
        let sim = Simulator::from_words(&ir.words, 4, 16).unwrap();
        assert_eq!(sim.pc(), 0);
    }
}
