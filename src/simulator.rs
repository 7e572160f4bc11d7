//! C7: a non-pipelined, one-instruction-at-a-time interpreter over an
//! [`IrInstruction`] stream, grounded in the teacher's `Processor`/`Core`
//! tick loop and `ExitCode` enum, generalized to SN/X's word-addressed,
//! 16-bit wraparound machine.

use crate::constants::DEFAULT_STEP_LIMIT;
use crate::ir::{IrInstruction, Opcode, Operands};
use crate::memory::{Memory, Storage};
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// `HLT` executed.
    Halted,
    /// PC advanced past the end of the program without executing `HLT`.
    RanOffEnd,
    /// The step budget (`DEFAULT_STEP_LIMIT` unless overridden) was spent.
    StepLimitExceeded,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    /// Raised only when an [`Simulator::set_oob_callback`] callback raises;
    /// with no callback installed an out-of-range access is silent (see
    /// [`AccessKind`]'s default behavior documented on [`OobAccess`]).
    #[error("PC {pc}: out-of-bounds {kind:?} at address {address} aborted: {message}")]
    CallbackAborted {
        pc: u16,
        kind: AccessKind,
        address: u16,
        message: String,
    },
}

/// Whether an out-of-range data memory access was a load or a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Load,
    Store,
}

/// The salient scalars of an out-of-range data memory access, passed by
/// value to the caller's OOB callback -- no reference into simulator state
/// escapes the callback invocation.
#[derive(Debug, Clone)]
pub struct OobAccess {
    pub kind: AccessKind,
    pub address: u16,
    pub pc: u16,
    pub inst_text: String,
    pub mem_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceRecord {
    pub pc: u16,
    pub inst_text: String,
    pub registers_before: Vec<u16>,
}

/// Invoked synchronously at the point of an out-of-range data memory
/// access. `Ok(())` lets the simulator proceed with the default behavior
/// (`LD` yields 0, `ST` is a no-op); `Err(message)` raises and is surfaced
/// to the caller as [`RunError::CallbackAborted`].
type OobCallback = dyn FnMut(OobAccess) -> Result<(), String>;

pub struct Simulator<S: Storage = Memory> {
    instructions: Vec<IrInstruction>,
    registers: Vec<u16>,
    memory: S,
    pc: u16,
    halted: bool,
    step_limit: u64,
    output: Vec<u16>,
    input_fn: Option<Box<dyn FnMut() -> u16>>,
    output_fn: Option<Box<dyn FnMut(u16)>>,
    oob_callback: Option<Box<OobCallback>>,
    trace_callback: Option<Box<dyn FnMut(&TraceRecord)>>,
    trace: Vec<TraceRecord>,
}

impl<S: Storage> Simulator<S> {
    pub fn new(instructions: Vec<IrInstruction>, reg_count: u8, memory: S) -> Self {
        Simulator {
            instructions,
            registers: vec![0; reg_count as usize],
            memory,
            pc: 0,
            halted: false,
            step_limit: DEFAULT_STEP_LIMIT,
            output: Vec::new(),
            input_fn: None,
            output_fn: None,
            oob_callback: None,
            trace_callback: None,
            trace: Vec::new(),
        }
    }

    pub fn with_step_limit(mut self, limit: u64) -> Self {
        self.step_limit = limit;
        self
    }

    pub fn set_input_fn(&mut self, f: impl FnMut() -> u16 + 'static) {
        self.input_fn = Some(Box::new(f));
    }

    pub fn set_output_fn(&mut self, f: impl FnMut(u16) + 'static) {
        self.output_fn = Some(Box::new(f));
    }

    /// Invoked whenever a `LD`/`ST` address is out of range for the
    /// configured memory. `Ok(())` lets the access proceed with its default
    /// behavior (`LD` yields 0, `ST` is a no-op); `Err(message)` aborts the
    /// step currently in progress and surfaces `message` to the caller as
    /// [`RunError::CallbackAborted`]. With no callback installed, the
    /// default behavior applies silently.
    pub fn set_oob_callback(&mut self, f: impl FnMut(OobAccess) -> Result<(), String> + 'static) {
        self.oob_callback = Some(Box::new(f));
    }

    pub fn set_trace_callback(&mut self, f: impl FnMut(&TraceRecord) + 'static) {
        self.trace_callback = Some(Box::new(f));
    }

    pub fn registers(&self) -> &[u16] {
        &self.registers
    }

    pub fn memory(&self) -> &S {
        &self.memory
    }

    pub fn output(&self) -> &[u16] {
        &self.output
    }

    pub fn trace(&self) -> &[TraceRecord] {
        &self.trace
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn halted(&self) -> bool {
        self.halted
    }

    /// Runs until `HLT`, the program counter runs off the end, or the step
    /// budget is spent.
    pub fn run(&mut self) -> Result<ExitReason, RunError> {
        let mut steps = 0u64;
        loop {
            if self.halted {
                return Ok(ExitReason::Halted);
            }
            if self.pc as usize >= self.instructions.len() {
                return Ok(ExitReason::RanOffEnd);
            }
            if steps >= self.step_limit {
                debug!(steps, "simulator step budget exhausted");
                return Ok(ExitReason::StepLimitExceeded);
            }
            self.step()?;
            steps += 1;
        }
    }

    /// Executes exactly one instruction at the current PC.
    pub fn step(&mut self) -> Result<(), RunError> {
        let pc = self.pc;
        let instr = self.instructions[pc as usize].clone();

        let record = TraceRecord {
            pc,
            inst_text: instr.text.clone(),
            registers_before: self.registers.clone(),
        };
        trace!(pc, opcode = ?instr.opcode, "executing");
        if let Some(cb) = self.trace_callback.as_mut() {
            cb(&record);
        }
        self.trace.push(record);

        self.execute(&instr)
    }

    /// `$0` as a base is the ISA's constant-zero convention for effective
    /// addresses, independent of whatever value has actually been written
    /// to register 0 (which remains readable as ordinary storage
    /// everywhere else -- see spec §3's `$0` invariant).
    fn ea(&self, base: u8, imm: i8) -> u16 {
        let base_value = if base == 0 { 0 } else { self.registers[base as usize] };
        base_value.wrapping_add(imm as i16 as u16)
    }

    /// `LD` at an in-range address; out of range yields 0 by default, or
    /// aborts if the OOB callback raises.
    fn mem_read(&mut self, pc: u16, address: u16, inst_text: &str) -> Result<u16, RunError> {
        match self.memory.read(address) {
            Ok(value) => Ok(value),
            Err(()) => {
                self.notify_oob(AccessKind::Load, address, pc, inst_text)?;
                Ok(0)
            }
        }
    }

    /// `ST` at an in-range address; out of range is a no-op by default, or
    /// aborts if the OOB callback raises.
    fn mem_write(&mut self, pc: u16, address: u16, value: u16, inst_text: &str) -> Result<(), RunError> {
        match self.memory.write(address, value) {
            Ok(()) => Ok(()),
            Err(()) => {
                self.notify_oob(AccessKind::Store, address, pc, inst_text)?;
                Ok(())
            }
        }
    }

    fn notify_oob(&mut self, kind: AccessKind, address: u16, pc: u16, inst_text: &str) -> Result<(), RunError> {
        if let Some(cb) = self.oob_callback.as_mut() {
            let access = OobAccess {
                kind,
                address,
                pc,
                inst_text: inst_text.to_string(),
                mem_size: self.memory.len(),
            };
            if let Err(message) = cb(access) {
                return Err(RunError::CallbackAborted {
                    pc,
                    kind,
                    address,
                    message,
                });
            }
        }
        Ok(())
    }

    fn execute(&mut self, instr: &IrInstruction) -> Result<(), RunError> {
        let pc = instr.pc;
        let mut next_pc = pc.wrapping_add(1);

        match (instr.opcode, instr.operands) {
            (Opcode::Add, Operands::R { dest, src1, src2 }) => {
                self.registers[dest as usize] =
                    self.registers[src1 as usize].wrapping_add(self.registers[src2 as usize]);
            }
            (Opcode::And, Operands::R { dest, src1, src2 }) => {
                self.registers[dest as usize] = self.registers[src1 as usize] & self.registers[src2 as usize];
            }
            (Opcode::Sub, Operands::R { dest, src1, src2 }) => {
                self.registers[dest as usize] =
                    self.registers[src1 as usize].wrapping_sub(self.registers[src2 as usize]);
            }
            (Opcode::Slt, Operands::R { dest, src1, src2 }) => {
                let a = self.registers[src1 as usize] as i16;
                let b = self.registers[src2 as usize] as i16;
                self.registers[dest as usize] = if a < b { 1 } else { 0 };
            }
            (Opcode::Not, Operands::R1 { dest, src }) => {
                self.registers[dest as usize] = !self.registers[src as usize];
            }
            (Opcode::Sr, Operands::R1 { dest, src }) => {
                self.registers[dest as usize] = self.registers[src as usize] >> 1;
            }
            (Opcode::Hlt, Operands::R0) => {
                self.halted = true;
                return Ok(());
            }
            (Opcode::Ld, Operands::Addr { reg, base, imm }) => {
                let addr = self.ea(base, imm);
                let value = self.mem_read(pc, addr, &instr.text)?;
                self.registers[reg as usize] = value;
            }
            (Opcode::St, Operands::Addr { reg, base, imm }) => {
                let addr = self.ea(base, imm);
                let value = self.registers[reg as usize];
                self.mem_write(pc, addr, value, &instr.text)?;
            }
            (Opcode::Lda, Operands::Addr { reg, base, imm }) => {
                self.registers[reg as usize] = self.ea(base, imm);
            }
            (Opcode::In, Operands::RegOnly { reg }) => {
                let value = self.input_fn.as_mut().map(|f| f()).unwrap_or(0);
                self.registers[reg as usize] = value;
            }
            (Opcode::Out, Operands::RegOnly { reg }) => {
                let value = self.registers[reg as usize];
                self.output.push(value);
                if let Some(f) = self.output_fn.as_mut() {
                    f(value);
                }
            }
            (Opcode::Bz, Operands::Branch { reg, target }) => {
                if self.registers[reg as usize] == 0 {
                    next_pc = target;
                }
            }
            (Opcode::Bal, Operands::Branch { reg, target }) => {
                self.registers[reg as usize] = pc.wrapping_add(1);
                next_pc = target;
            }
            (Opcode::Bal, Operands::Addr { reg, base, imm }) => {
                let target = self.ea(base, imm);
                self.registers[reg as usize] = pc.wrapping_add(1);
                next_pc = target;
            }
            _ => unreachable!("lowering/decoding never produces a format mismatch for an opcode"),
        }

        self.pc = next_pc;
        Ok(())
    }
}
