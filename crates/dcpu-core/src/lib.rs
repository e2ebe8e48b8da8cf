//! Cycle-accurate emulator core for the DCPU-16.
//!
//! The DCPU-16 is a 16-bit word-addressed processor: eight general
//! registers, `PC`/`SP`/`O` specials, and 64 Ki words of flat memory. This
//! crate reproduces both the functional result of a program and the exact
//! number of clock cycles it consumes. Every instruction is decomposed into
//! single-cycle steps driven by [`Dcpu::step_cycle`], so a host may observe
//! or stop the machine between any two cycles.

/// Architectural CPU state model primitives.
pub mod state;
pub use state::{ArchitecturalState, Register, GENERAL_REGISTER_COUNT, RESET_SP};

/// Word-addressed flat memory model.
pub mod memory;
pub use memory::{load_words, new_address_space, ADDRESS_SPACE_WORDS};

/// Instruction-word layout and opcode classification tables.
pub mod encoding;
pub use encoding::{
    instruction_length, operand_reads_next_word, BasicOpcode, ExtendedOpcode, HALT_WORD,
    SMALL_LITERAL_BASE,
};

/// Operand resolution and write-capable operand references.
pub mod operand;
pub use operand::{resolve, OpRef, Resolved};

/// Deterministic instruction cycle-cost table and lookup helpers.
pub mod timing;
pub use timing::{
    extended_extra_cycles, extra_cycles, EXTRA_CYCLE_TABLE, FAILED_TEST_CYCLES, SKIP_CYCLES,
};

/// Cycle scheduler state machine.
pub mod scheduler;
pub use scheduler::Stage;

/// Out-of-band diagnostics for conditions the architecture cannot trap.
pub mod diag;
pub use diag::{DiagCounters, Diagnostic};

/// Host-facing machine instance and stepping façade.
pub mod machine;
pub use machine::Dcpu;

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
