//! End-to-end scenario tests driving the facade exactly as a host
//! application would: compile, then run the resulting program.

use snx::facade::compile_program;
use snx::memory::Memory;
use snx::simulator::{ExitReason, Simulator};

fn run_clean(source: &str, mem_size: u32) -> Simulator<Memory> {
    let result = compile_program(source, 4, mem_size, true);
    assert!(!result.has_errors(), "{}", result.format_diagnostics());
    Simulator::from_compile_result(&result).unwrap()
}

#[test]
fn add_two_immediates() {
    let mut sim = run_clean("lda $1, 20\nlda $2, 22\nadd $3, $1, $2\nhlt\n", 16);
    let exit = sim.run().unwrap();
    assert_eq!(exit, ExitReason::Halted);
    assert_eq!(sim.registers()[3], 42);
}

#[test]
fn signed_compare_slt() {
    let mut sim = run_clean("lda $1, -5\nlda $2, 3\nslt $3, $1, $2\nhlt\n", 16);
    sim.run().unwrap();
    assert_eq!(sim.registers()[3], 1);

    let mut sim2 = run_clean("lda $1, 3\nlda $2, -5\nslt $3, $1, $2\nhlt\n", 16);
    sim2.run().unwrap();
    assert_eq!(sim2.registers()[3], 0);
}

#[test]
fn branch_and_link_returns_to_caller() {
    let mut sim = run_clean(
        "bal $3, callee\nlda $2, 1\nhlt\ncallee: lda $1, 9\nbal $0, 0($3)\n",
        16,
    );
    let exit = sim.run().unwrap();
    assert_eq!(exit, ExitReason::Halted);
    assert_eq!(sim.registers()[1], 9);
    assert_eq!(sim.registers()[2], 1);
}

#[test]
fn immediate_truncation_warns_but_still_compiles() {
    let result = compile_program("ld $0, 500($1)\nhlt\n", 4, 16, true);
    assert!(!result.has_errors());
    assert!(result.has_warnings());
    assert!(result
        .diagnostics
        .iter()
        .any(|d| matches!(d, snx::diagnostics::Diagnostic::ImmediateTruncated { .. })));
}

#[test]
fn absolute_address_out_of_bounds_is_a_compile_error() {
    let result = compile_program("ld $0, 100\nhlt\n", 4, 16, true);
    assert!(result.has_errors());
    assert!(Simulator::from_compile_result(&result).is_err());
}

#[test]
fn runtime_out_of_bounds_access_is_reported_via_callback() {
    let mut sim = run_clean("lda $1, 10\nld $2, 0($1)\nhlt\n", 4);
    let mut seen = Vec::new();
    sim.set_oob_callback(move |access| {
        seen.push((access.kind, access.address, access.pc));
        Ok(())
    });
    let exit = sim.run().unwrap();
    assert_eq!(exit, ExitReason::Halted);
    // default behavior still applies even though the callback observed it.
    assert_eq!(sim.registers()[2], 0);
}

#[test]
fn empty_program_runs_off_the_end_immediately() {
    let mut sim = run_clean("; nothing here\n", 16);
    let exit = sim.run().unwrap();
    assert_eq!(exit, ExitReason::RanOffEnd);
}

#[test]
fn hlt_only_program_halts_on_first_step() {
    let mut sim = run_clean("hlt\n", 16);
    let exit = sim.run().unwrap();
    assert_eq!(exit, ExitReason::Halted);
    assert_eq!(sim.pc(), 0);
}

#[test]
fn boundary_immediate_127_does_not_warn_but_128_does() {
    let ok = compile_program("lda $1, 127\nhlt\n", 4, 16, true);
    assert!(!ok.has_warnings());

    let warns = compile_program("lda $1, 128\nhlt\n", 4, 16, true);
    assert!(warns
        .diagnostics
        .iter()
        .any(|d| matches!(d, snx::diagnostics::Diagnostic::ImmediateTruncated { .. })));
}

#[test]
fn branch_target_boundary_1023_is_clean_1024_warns() {
    let mut body = String::from("bz $0, target\n");
    for _ in 0..1022 {
        body.push_str("hlt\n");
    }
    body.push_str("target: hlt\n");
    let clean = compile_program(&body, 4, 16, true);
    assert!(!clean
        .diagnostics
        .iter()
        .any(|d| matches!(d, snx::diagnostics::Diagnostic::BranchTargetOverflow { .. })));

    let mut body2 = String::from("bz $0, target\n");
    for _ in 0..1023 {
        body2.push_str("hlt\n");
    }
    body2.push_str("target: hlt\n");
    let overflowing = compile_program(&body2, 4, 16, true);
    assert!(overflowing
        .diagnostics
        .iter()
        .any(|d| matches!(d, snx::diagnostics::Diagnostic::BranchTargetOverflow { .. })));
}

#[test]
fn load_at_the_last_valid_word_is_in_bounds() {
    let result = compile_program("ld $0, 15\nhlt\n", 4, 16, true);
    assert!(!result
        .diagnostics
        .iter()
        .any(|d| matches!(d, snx::diagnostics::Diagnostic::AbsoluteAddressOutOfBounds { .. })));

    let result = compile_program("ld $0, 16\nhlt\n", 4, 16, true);
    assert!(result
        .diagnostics
        .iter()
        .any(|d| matches!(d, snx::diagnostics::Diagnostic::AbsoluteAddressOutOfBounds { .. })));
}
