//! Host-facing machine instance and stepping façade.

use std::fmt;
use std::fmt::Write as _;

use crate::diag::DiagCounters;
use crate::memory::{load_words, new_address_space};
use crate::operand::OpRef;
use crate::scheduler::Stage;
use crate::state::{ArchitecturalState, Register};

/// A complete DCPU-16 machine: architectural state, 64 Ki words of memory,
/// and the cycle scheduler's working set.
///
/// The machine is strictly single-threaded; each step method runs to
/// completion, and every accessor is safe to call between any two cycles,
/// including mid-instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Dcpu {
    pub(crate) arch: ArchitecturalState,
    pub(crate) memory: Box<[u16]>,
    /// Word of the in-flight instruction; zero means "fetch next".
    pub(crate) inst: u16,
    pub(crate) a_ref: Option<OpRef>,
    pub(crate) b_ref: Option<OpRef>,
    pub(crate) stage: Stage,
    /// When set, the next fetched instruction is skipped.
    pub(crate) skip: bool,
    pub(crate) cycle_counter: u64,
    pub(crate) diag: DiagCounters,
}

impl Default for Dcpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Dcpu {
    /// Creates a machine in its reset state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            arch: ArchitecturalState::default(),
            memory: new_address_space(),
            inst: 0,
            a_ref: None,
            b_ref: None,
            stage: Stage::Fetch,
            skip: false,
            cycle_counter: 0,
            diag: DiagCounters::default(),
        }
    }

    /// Resets the machine.
    ///
    /// Memory and all registers are cleared, `SP` returns to the top of the
    /// address space, and any mid-instruction progress is discarded: the
    /// next cycle fetches a fresh instruction. The cycle counter and
    /// diagnostics are cleared as well.
    pub fn reset(&mut self) {
        self.arch = ArchitecturalState::default();
        self.memory.fill(0);
        self.inst = 0;
        self.a_ref = None;
        self.b_ref = None;
        self.stage = Stage::Fetch;
        self.skip = false;
        self.cycle_counter = 0;
        self.diag = DiagCounters::default();
    }

    /// Copies a block of words into memory starting at `address`, wrapping
    /// at the top of the address space.
    pub fn load(&mut self, address: u16, image: &[u16]) {
        load_words(&mut self.memory, address, image);
    }

    /// Reads a general-purpose register.
    #[must_use]
    pub const fn register(&self, reg: Register) -> u16 {
        self.arch.gpr(reg)
    }

    /// Reads the program counter.
    #[must_use]
    pub const fn pc(&self) -> u16 {
        self.arch.pc()
    }

    /// Reads the stack pointer.
    #[must_use]
    pub const fn sp(&self) -> u16 {
        self.arch.sp()
    }

    /// Reads the overflow register.
    #[must_use]
    pub const fn o(&self) -> u16 {
        self.arch.o()
    }

    /// Reads the memory word at `address`.
    #[must_use]
    pub fn memory_word(&self, address: u16) -> u16 {
        self.memory[usize::from(address)]
    }

    /// Total clock cycles elapsed since the last reset.
    #[must_use]
    pub const fn cycle_count(&self) -> u64 {
        self.cycle_counter
    }

    /// True while an instruction is partially executed, i.e. some of its
    /// cycles have run but not all.
    #[must_use]
    pub const fn instruction_in_flight(&self) -> bool {
        self.inst != 0
    }

    /// Diagnostic counters accumulated since the last reset.
    #[must_use]
    pub const fn diagnostics(&self) -> &DiagCounters {
        &self.diag
    }

    /// Runs the machine for exactly `cycles` clock cycles. May leave the
    /// machine mid-instruction.
    pub fn step_cycles(&mut self, cycles: u64) {
        for _ in 0..cycles {
            self.step_cycle();
        }
    }

    /// Runs cycles until the current instruction completes and any skip it
    /// armed has been consumed. Returns the cycles elapsed.
    ///
    /// Called mid-instruction, this finishes the in-flight instruction
    /// only.
    pub fn step_instruction(&mut self) -> u64 {
        let mut cycles = 0;
        loop {
            self.step_cycle();
            cycles += 1;
            if self.inst == 0 && !self.skip {
                return cycles;
            }
        }
    }

    /// Runs whole instructions until one leaves `PC` unchanged (the
    /// `SUB PC, 1` halt convention). Returns total cycles elapsed.
    ///
    /// Only one-instruction loops are detected; a program that never
    /// settles into one keeps this running forever, so callers needing a
    /// bound should drive [`Dcpu::step_cycles`] instead.
    pub fn step_until_stuck(&mut self) -> u64 {
        let mut cycles = 0;
        loop {
            let pc_before = self.arch.pc();
            cycles += self.step_instruction();
            if self.arch.pc() == pc_before {
                return cycles;
            }
        }
    }

    /// Renders `length` memory words starting at `start`, one
    /// `address: value` pair per line. Addresses wrap.
    #[must_use]
    pub fn dump_words(&self, start: u16, length: u16) -> String {
        let mut out = String::new();
        let mut address = start;
        for _ in 0..length {
            let _ = writeln!(
                out,
                "{address:04x}: 0x{:04x}",
                self.memory[usize::from(address)]
            );
            address = address.wrapping_add(1);
        }
        out
    }
}

impl fmt::Display for Dcpu {
    /// Two-line register table: a header naming `PC SP O A..J`, then the
    /// current values.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PC     SP     O      ")?;
        for reg in Register::ALL {
            write!(f, "{:<6} ", reg.name())?;
        }
        writeln!(f)?;
        write!(
            f,
            "0x{:04x} 0x{:04x} 0x{:04x} ",
            self.arch.pc(),
            self.arch.sp(),
            self.arch.o()
        )?;
        for reg in Register::ALL {
            write!(f, "0x{:04x} ", self.arch.gpr(reg))?;
        }
        Ok(())
    }
}
