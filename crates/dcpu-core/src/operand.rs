//! Operand resolution and write-capable operand references.
//!
//! Resolution is side-effecting: POP/PUSH adjust `SP`, and the indexed,
//! absolute, and literal next-word forms advance `PC` past the extra word
//! they read. Those effects happen at resolve time, before the instruction
//! executes.

use crate::encoding::SMALL_LITERAL_BASE;
use crate::state::{ArchitecturalState, Register};

/// A resolved operand: a typed handle for the word an instruction reads
/// and writes.
///
/// Mutable locations name a register, special register, or memory cell.
/// `Immediate` is a read-only value; writing through it is silently
/// discarded, which is how literal destinations behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum OpRef {
    /// A general-purpose register.
    Register(Register),
    /// The stack pointer.
    Sp,
    /// The program counter.
    Pc,
    /// The overflow register.
    Overflow,
    /// The memory cell at a word address, fixed at resolve time.
    Memory(u16),
    /// A read-only immediate value.
    Immediate(u16),
}

impl OpRef {
    /// Reads the current value behind this reference.
    #[must_use]
    pub fn read(self, arch: &ArchitecturalState, memory: &[u16]) -> u16 {
        match self {
            Self::Register(reg) => arch.gpr(reg),
            Self::Sp => arch.sp(),
            Self::Pc => arch.pc(),
            Self::Overflow => arch.o(),
            Self::Memory(address) => memory[usize::from(address)],
            Self::Immediate(value) => value,
        }
    }

    /// Writes through this reference. Writes to `Immediate` are discarded.
    pub fn write(self, arch: &mut ArchitecturalState, memory: &mut [u16], value: u16) {
        match self {
            Self::Register(reg) => arch.set_gpr(reg, value),
            Self::Sp => arch.set_sp(value),
            Self::Pc => arch.set_pc(value),
            Self::Overflow => arch.set_o(value),
            Self::Memory(address) => memory[usize::from(address)] = value,
            Self::Immediate(_) => {}
        }
    }
}

/// Outcome of resolving one 6-bit operand code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    /// The reference the instruction will read and write through.
    pub op_ref: OpRef,
    /// Whether resolution read an extra program word, consuming one clock
    /// cycle.
    pub spent_cycle: bool,
}

const fn instant(op_ref: OpRef) -> Resolved {
    Resolved {
        op_ref,
        spent_cycle: false,
    }
}

/// Resolves a 6-bit operand code against the current machine state.
///
/// POP and PUSH adjust `SP` here; the next-word forms read the word at `PC`
/// and advance it. The returned reference stays valid for the rest of the
/// instruction even if `SP` or `PC` move again.
#[must_use]
pub fn resolve(arch: &mut ArchitecturalState, memory: &[u16], code: u8) -> Resolved {
    match code {
        0x00..=0x07 => instant(OpRef::Register(Register::ALL[usize::from(code)])),
        0x08..=0x0F => {
            let reg = Register::ALL[usize::from(code & 0x07)];
            instant(OpRef::Memory(arch.gpr(reg)))
        }
        0x10..=0x17 => {
            let next = read_next_word(arch, memory);
            let reg = Register::ALL[usize::from(code & 0x07)];
            Resolved {
                op_ref: OpRef::Memory(next.wrapping_add(arch.gpr(reg))),
                spent_cycle: true,
            }
        }
        0x18 => {
            // POP: read from [SP], then increment.
            let sp = arch.sp();
            arch.set_sp(sp.wrapping_add(1));
            instant(OpRef::Memory(sp))
        }
        0x19 => instant(OpRef::Memory(arch.sp())),
        0x1A => {
            // PUSH: decrement, then write to [SP].
            let sp = arch.sp().wrapping_sub(1);
            arch.set_sp(sp);
            instant(OpRef::Memory(sp))
        }
        0x1B => instant(OpRef::Sp),
        0x1C => instant(OpRef::Pc),
        0x1D => instant(OpRef::Overflow),
        0x1E => {
            let next = read_next_word(arch, memory);
            Resolved {
                op_ref: OpRef::Memory(next),
                spent_cycle: true,
            }
        }
        0x1F => {
            let next = read_next_word(arch, memory);
            Resolved {
                op_ref: OpRef::Immediate(next),
                spent_cycle: true,
            }
        }
        _ => instant(OpRef::Immediate(u16::from(code - SMALL_LITERAL_BASE))),
    }
}

fn read_next_word(arch: &mut ArchitecturalState, memory: &[u16]) -> u16 {
    let pc = arch.pc();
    arch.set_pc(pc.wrapping_add(1));
    memory[usize::from(pc)]
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::{resolve, OpRef};
    use crate::memory::new_address_space;
    use crate::state::{ArchitecturalState, Register};

    fn setup() -> (ArchitecturalState, Box<[u16]>) {
        (ArchitecturalState::default(), new_address_space())
    }

    #[rstest]
    #[case(0x00, Register::A)]
    #[case(0x05, Register::Z)]
    #[case(0x07, Register::J)]
    fn register_codes_resolve_instantly(#[case] code: u8, #[case] expected: Register) {
        let (mut arch, memory) = setup();
        let resolved = resolve(&mut arch, &memory, code);
        assert_eq!(resolved.op_ref, OpRef::Register(expected));
        assert!(!resolved.spent_cycle);
    }

    #[test]
    fn register_indirect_uses_the_register_as_address() {
        let (mut arch, memory) = setup();
        arch.set_gpr(Register::C, 0x1234);

        let resolved = resolve(&mut arch, &memory, 0x0A);
        assert_eq!(resolved.op_ref, OpRef::Memory(0x1234));
        assert!(!resolved.spent_cycle);
    }

    #[test]
    fn indexed_form_reads_a_word_and_spends_a_cycle() {
        let (mut arch, mut memory) = setup();
        arch.set_pc(0x0001);
        arch.set_gpr(Register::I, 0x0004);
        memory[0x0001] = 0x2000;

        let resolved = resolve(&mut arch, &memory, 0x16);
        assert_eq!(resolved.op_ref, OpRef::Memory(0x2004));
        assert!(resolved.spent_cycle);
        assert_eq!(arch.pc(), 0x0002);
    }

    #[test]
    fn pop_reads_then_increments_sp() {
        let (mut arch, memory) = setup();
        arch.set_sp(0xFFFE);

        let resolved = resolve(&mut arch, &memory, 0x18);
        assert_eq!(resolved.op_ref, OpRef::Memory(0xFFFE));
        assert_eq!(arch.sp(), 0xFFFF);
    }

    #[test]
    fn peek_leaves_sp_alone() {
        let (mut arch, memory) = setup();
        arch.set_sp(0xFFFE);

        let resolved = resolve(&mut arch, &memory, 0x19);
        assert_eq!(resolved.op_ref, OpRef::Memory(0xFFFE));
        assert_eq!(arch.sp(), 0xFFFE);
    }

    #[test]
    fn push_decrements_sp_then_targets_the_new_top() {
        let (mut arch, memory) = setup();

        let resolved = resolve(&mut arch, &memory, 0x1A);
        assert_eq!(resolved.op_ref, OpRef::Memory(0xFFFE));
        assert_eq!(arch.sp(), 0xFFFE);
    }

    #[rstest]
    #[case(0x1B, OpRef::Sp)]
    #[case(0x1C, OpRef::Pc)]
    #[case(0x1D, OpRef::Overflow)]
    fn special_register_codes_resolve_to_their_registers(
        #[case] code: u8,
        #[case] expected: OpRef,
    ) {
        let (mut arch, memory) = setup();
        let resolved = resolve(&mut arch, &memory, code);
        assert_eq!(resolved.op_ref, expected);
        assert!(!resolved.spent_cycle);
    }

    #[test]
    fn next_word_literal_is_read_only() {
        let (mut arch, mut memory) = setup();
        memory[0x0000] = 0xBEEF;

        let resolved = resolve(&mut arch, &memory, 0x1F);
        assert_eq!(resolved.op_ref, OpRef::Immediate(0xBEEF));
        assert!(resolved.spent_cycle);
        assert_eq!(arch.pc(), 0x0001);

        resolved.op_ref.write(&mut arch, &mut memory, 0x1234);
        assert_eq!(memory[0x0000], 0xBEEF);
        assert_eq!(resolved.op_ref.read(&arch, &memory), 0xBEEF);
    }

    #[test]
    fn small_literal_codes_carry_their_value() {
        let (mut arch, memory) = setup();
        for value in 0_u8..=31 {
            let resolved = resolve(&mut arch, &memory, 0x20 + value);
            assert_eq!(resolved.op_ref, OpRef::Immediate(u16::from(value)));
            assert!(!resolved.spent_cycle);
        }
    }

    #[test]
    fn writes_through_mutable_references_land_in_the_right_store() {
        let (mut arch, mut memory) = setup();

        OpRef::Register(Register::X).write(&mut arch, &mut memory, 0x0011);
        OpRef::Sp.write(&mut arch, &mut memory, 0x0022);
        OpRef::Pc.write(&mut arch, &mut memory, 0x0033);
        OpRef::Overflow.write(&mut arch, &mut memory, 0x0044);
        OpRef::Memory(0x8000).write(&mut arch, &mut memory, 0x0055);

        assert_eq!(arch.gpr(Register::X), 0x0011);
        assert_eq!(arch.sp(), 0x0022);
        assert_eq!(arch.pc(), 0x0033);
        assert_eq!(arch.o(), 0x0044);
        assert_eq!(memory[0x8000], 0x0055);
    }

    #[test]
    fn memory_references_stay_pinned_if_sp_moves_later() {
        let (mut arch, mut memory) = setup();
        arch.set_sp(0x0100);

        let resolved = resolve(&mut arch, &memory, 0x19);
        arch.set_sp(0x0042);

        resolved.op_ref.write(&mut arch, &mut memory, 0xABCD);
        assert_eq!(memory[0x0100], 0xABCD);
        assert_eq!(memory[0x0042], 0);
    }
}
