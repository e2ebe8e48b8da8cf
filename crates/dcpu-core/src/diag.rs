//! Out-of-band diagnostics for conditions the architecture cannot trap.
//!
//! The DCPU-16 has no exceptions: malformed instructions execute as no-ops
//! and nothing is ever reported through the step functions. Hosts that want
//! visibility subscribe to the `log` facade or read the counters kept here.

use thiserror::Error;

/// Diagnostic events emitted on the logging channel by the cycle engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Diagnostic {
    /// An extended-form word with an unassigned opcode field was fetched.
    /// The word executes as a no-op costing only its fetch cycle.
    #[error("unknown extended opcode {xop:#04x} in word {word:#06x} at {pc:#06x}")]
    UnknownExtendedOpcode {
        /// The full instruction word.
        word: u16,
        /// The unassigned 6-bit extended opcode field.
        xop: u8,
        /// Address the word was fetched from.
        pc: u16,
    },
}

/// Counters accumulated by the cycle engine. Purely informational; not
/// architectural state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct DiagCounters {
    /// Instructions fully executed, including malformed words run as no-ops.
    pub instructions_retired: u64,
    /// Instructions skipped after a failed conditional test.
    pub skips_taken: u64,
    /// Malformed instruction words executed as no-ops.
    pub unknown_opcodes: u64,
    /// Most recent diagnostic event, if any.
    pub last_diagnostic: Option<Diagnostic>,
}

impl DiagCounters {
    /// Records a diagnostic event.
    pub fn record(&mut self, diagnostic: Diagnostic) {
        match diagnostic {
            Diagnostic::UnknownExtendedOpcode { .. } => self.unknown_opcodes += 1,
        }
        self.last_diagnostic = Some(diagnostic);
    }
}
