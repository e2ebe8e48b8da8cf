//! Deterministic instruction cycle-cost table and lookup helpers.
//!
//! Every instruction is charged one base cycle (the fetch), plus one cycle
//! per next-word operand, plus the extra cycles listed here. Conditional
//! opcodes charge [`FAILED_TEST_CYCLES`] more when their test fails, and the
//! skipped instruction itself costs [`SKIP_CYCLES`].

use crate::encoding::{BasicOpcode, ExtendedOpcode};

/// Single source-of-truth table of extra cycles charged by each basic
/// opcode on top of fetch and operand-resolution costs.
pub const EXTRA_CYCLE_TABLE: &[(BasicOpcode, u16)] = &[
    (BasicOpcode::Set, 0),
    (BasicOpcode::Add, 1),
    (BasicOpcode::Sub, 1),
    (BasicOpcode::Mul, 1),
    (BasicOpcode::Div, 2),
    (BasicOpcode::Mod, 2),
    (BasicOpcode::Shl, 1),
    (BasicOpcode::Shr, 1),
    (BasicOpcode::And, 0),
    (BasicOpcode::Bor, 0),
    (BasicOpcode::Xor, 0),
    (BasicOpcode::Ife, 1),
    (BasicOpcode::Ifn, 1),
    (BasicOpcode::Ifg, 1),
    (BasicOpcode::Ifb, 1),
];

/// Additional cycle charged to a conditional instruction whose test fails.
pub const FAILED_TEST_CYCLES: u16 = 1;

/// Cycles consumed by skipping over one instruction.
pub const SKIP_CYCLES: u16 = 1;

/// Looks up the extra cycles for a basic opcode.
#[must_use]
pub fn extra_cycles(op: BasicOpcode) -> Option<u16> {
    EXTRA_CYCLE_TABLE
        .iter()
        .find_map(|(entry, cycles)| (*entry == op).then_some(*cycles))
}

/// Extra cycles charged by an extended opcode.
#[must_use]
pub const fn extended_extra_cycles(op: ExtendedOpcode) -> u16 {
    match op {
        ExtendedOpcode::Jsr => 1,
    }
}
