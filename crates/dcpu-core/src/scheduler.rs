//! Cycle scheduler: the per-cycle execution state machine.
//!
//! Each call to [`Dcpu::step_cycle`] advances the machine by exactly one
//! clock cycle. An instruction is decomposed into its fetch cycle, a cycle
//! per next-word operand, and the extra cycles its opcode charges, so the
//! architectural state can be observed between any two cycles. Operand
//! resolutions that finish instantly do not consume a cycle of their own;
//! the scheduler keeps going within the same cycle, and zero-extra-cost
//! opcodes complete inside the cycle that resolved their last operand.

use log::warn;

use crate::diag::Diagnostic;
use crate::encoding::{
    basic_opcode_bits, extended_opcode_bits, extended_operand_bits, instruction_length,
    operand_a_bits, operand_b_bits, BasicOpcode, ExtendedOpcode,
};
use crate::machine::Dcpu;
use crate::operand::{resolve, OpRef};
use crate::timing;

/// The action the scheduler will perform on the next clock cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Stage {
    /// Fetch the next instruction word, or consume a pending skip.
    #[default]
    Fetch,
    /// Resolve the remaining operands of the in-flight instruction.
    Operands,
    /// Apply the in-flight instruction's effect.
    Execute,
    /// Idle cycles a multi-cycle instruction consumes after its write.
    Burn(u16),
}

impl Dcpu {
    /// Advances the machine by exactly one clock cycle.
    pub fn step_cycle(&mut self) {
        self.cycle_counter += 1;
        match self.stage {
            Stage::Fetch => self.cycle_fetch(),
            Stage::Operands => self.advance_operands(),
            Stage::Execute => self.cycle_execute(),
            Stage::Burn(left) => self.cycle_burn(left),
        }
    }

    fn cycle_fetch(&mut self) {
        if self.skip {
            // The whole cycle goes to stepping PC over the next instruction.
            let word = self.memory[usize::from(self.arch.pc())];
            let length = instruction_length(word);
            self.arch.set_pc(self.arch.pc().wrapping_add(length));
            self.skip = false;
            self.diag.skips_taken += 1;
            return;
        }
        let pc = self.arch.pc();
        self.inst = self.memory[usize::from(pc)];
        self.arch.set_pc(pc.wrapping_add(1));
        self.advance_operands();
    }

    /// Resolves operands until one consumes the rest of the current cycle,
    /// then dispatches the instruction within whatever cycle remains.
    fn advance_operands(&mut self) {
        let word = self.inst;
        if basic_opcode_bits(word) != 0 {
            if self.a_ref.is_none() {
                let resolved = resolve(&mut self.arch, &self.memory, operand_a_bits(word));
                self.a_ref = Some(resolved.op_ref);
                if resolved.spent_cycle {
                    self.stage = Stage::Operands;
                    return;
                }
            }
            if self.b_ref.is_none() {
                let resolved = resolve(&mut self.arch, &self.memory, operand_b_bits(word));
                self.b_ref = Some(resolved.op_ref);
                if resolved.spent_cycle {
                    self.stage = Stage::Operands;
                    return;
                }
            }
        } else {
            let xop = extended_opcode_bits(word);
            if ExtendedOpcode::from_u6(xop).is_none() {
                // Malformed word: runs as a no-op costing only the fetch
                // cycle, with no operand side effects.
                let diagnostic = Diagnostic::UnknownExtendedOpcode {
                    word,
                    xop,
                    pc: self.arch.pc().wrapping_sub(1),
                };
                warn!("{diagnostic}");
                self.diag.record(diagnostic);
                self.finish_instruction();
                return;
            }
            if self.a_ref.is_none() {
                let resolved = resolve(&mut self.arch, &self.memory, extended_operand_bits(word));
                self.a_ref = Some(resolved.op_ref);
                if resolved.spent_cycle {
                    self.stage = Stage::Operands;
                    return;
                }
            }
        }
        self.dispatch();
    }

    /// Routes the fully resolved instruction: zero-extra-cost opcodes
    /// complete within the current cycle, everything else claims the next
    /// cycle as its execute cycle.
    fn dispatch(&mut self) {
        match BasicOpcode::from_u4(basic_opcode_bits(self.inst)) {
            Some(op) if timing::extra_cycles(op).unwrap_or(0) == 0 => {
                self.apply_basic(op);
                self.finish_instruction();
            }
            _ => self.stage = Stage::Execute,
        }
    }

    /// First execute cycle of a multi-cycle instruction: the write happens
    /// here, and remaining cycles are burned idle.
    fn cycle_execute(&mut self) {
        let burn = match BasicOpcode::from_u4(basic_opcode_bits(self.inst)) {
            Some(op) => {
                self.apply_basic(op);
                let extra = timing::extra_cycles(op).unwrap_or(0);
                // A failed conditional test charges one extra cycle to the
                // conditional instruction itself.
                let failed = op.is_conditional() && self.skip;
                extra.saturating_sub(1) + u16::from(failed)
            }
            None => match ExtendedOpcode::from_u6(extended_opcode_bits(self.inst)) {
                Some(xop) => {
                    self.apply_extended(xop);
                    timing::extended_extra_cycles(xop).saturating_sub(1)
                }
                // Unknown opcodes never reach the execute stage.
                None => 0,
            },
        };
        if burn == 0 {
            self.finish_instruction();
        } else {
            self.stage = Stage::Burn(burn);
        }
    }

    fn cycle_burn(&mut self, left: u16) {
        if left <= 1 {
            self.finish_instruction();
        } else {
            self.stage = Stage::Burn(left - 1);
        }
    }

    fn finish_instruction(&mut self) {
        self.inst = 0;
        self.a_ref = None;
        self.b_ref = None;
        self.stage = Stage::Fetch;
        self.diag.instructions_retired += 1;
    }

    fn write_operand(&mut self, op_ref: OpRef, value: u16) {
        op_ref.write(&mut self.arch, &mut self.memory, value);
    }

    #[allow(clippy::cast_possible_truncation)]
    fn apply_basic(&mut self, op: BasicOpcode) {
        let (Some(a_ref), Some(b_ref)) = (self.a_ref, self.b_ref) else {
            return;
        };
        let a = a_ref.read(&self.arch, &self.memory);
        let b = b_ref.read(&self.arch, &self.memory);
        match op {
            BasicOpcode::Set => self.write_operand(a_ref, b),
            BasicOpcode::Add => {
                let sum = u32::from(a) + u32::from(b);
                self.write_operand(a_ref, sum as u16);
                self.arch.set_o(u16::from(sum > 0xFFFF));
            }
            BasicOpcode::Sub => {
                self.write_operand(a_ref, a.wrapping_sub(b));
                self.arch.set_o(if a < b { 0xFFFF } else { 0 });
            }
            BasicOpcode::Mul => {
                let product = u32::from(a) * u32::from(b);
                self.write_operand(a_ref, product as u16);
                self.arch.set_o((product >> 16) as u16);
            }
            BasicOpcode::Div => {
                if b == 0 {
                    self.write_operand(a_ref, 0);
                    self.arch.set_o(0);
                } else {
                    // O is derived from the dividend before the quotient is
                    // written back.
                    let overflow = ((u32::from(a) << 16) / u32::from(b)) as u16;
                    self.write_operand(a_ref, a / b);
                    self.arch.set_o(overflow);
                }
            }
            BasicOpcode::Mod => {
                self.write_operand(a_ref, if b == 0 { 0 } else { a % b });
            }
            BasicOpcode::Shl => {
                let widened = u64::from(a).checked_shl(u32::from(b)).unwrap_or(0);
                self.write_operand(a_ref, widened as u16);
                self.arch.set_o((widened >> 16) as u16);
            }
            BasicOpcode::Shr => {
                let widened = (u64::from(a) << 16).checked_shr(u32::from(b)).unwrap_or(0);
                self.arch.set_o(widened as u16);
                self.write_operand(a_ref, a.checked_shr(u32::from(b)).unwrap_or(0));
            }
            BasicOpcode::And => self.write_operand(a_ref, a & b),
            BasicOpcode::Bor => self.write_operand(a_ref, a | b),
            BasicOpcode::Xor => self.write_operand(a_ref, a ^ b),
            BasicOpcode::Ife => self.skip = a != b,
            BasicOpcode::Ifn => self.skip = a == b,
            BasicOpcode::Ifg => self.skip = a <= b,
            BasicOpcode::Ifb => self.skip = (a & b) == 0,
        }
    }

    fn apply_extended(&mut self, xop: ExtendedOpcode) {
        let Some(a_ref) = self.a_ref else {
            return;
        };
        match xop {
            ExtendedOpcode::Jsr => {
                // The pushed return address is PC after all operand words
                // were consumed.
                let target = a_ref.read(&self.arch, &self.memory);
                let sp = self.arch.sp().wrapping_sub(1);
                self.arch.set_sp(sp);
                self.memory[usize::from(sp)] = self.arch.pc();
                self.arch.set_pc(target);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Stage;
    use crate::machine::Dcpu;
    use crate::state::Register;

    const fn basic(op: u16, a: u16, b: u16) -> u16 {
        (b << 10) | (a << 4) | op
    }

    #[test]
    fn register_set_completes_in_its_fetch_cycle() {
        let mut machine = Dcpu::new();
        // SET A, 0x1F (small literal 31).
        machine.load(0, &[basic(0x1, 0x00, 0x3F)]);

        machine.step_cycle();

        assert_eq!(machine.register(Register::A), 31);
        assert_eq!(machine.pc(), 1);
        assert!(!machine.instruction_in_flight());
    }

    #[test]
    fn next_word_operand_holds_the_instruction_over_a_cycle_boundary() {
        let mut machine = Dcpu::new();
        // SET A, 0x0030 via next-word literal.
        machine.load(0, &[0x7C01, 0x0030]);

        machine.step_cycle();
        assert!(machine.instruction_in_flight());
        assert_eq!(machine.stage, Stage::Operands);
        assert_eq!(machine.pc(), 2);
        assert_eq!(machine.register(Register::A), 0);

        machine.step_cycle();
        assert_eq!(machine.register(Register::A), 0x0030);
        assert!(!machine.instruction_in_flight());
    }

    #[test]
    fn add_writes_on_its_execute_cycle() {
        let mut machine = Dcpu::new();
        // SET A, 2; ADD A, 3.
        machine.load(0, &[basic(0x1, 0x00, 0x22), basic(0x2, 0x00, 0x23)]);
        machine.step_cycle();

        machine.step_cycle();
        assert_eq!(machine.register(Register::A), 2);
        assert!(machine.instruction_in_flight());

        machine.step_cycle();
        assert_eq!(machine.register(Register::A), 5);
        assert!(!machine.instruction_in_flight());
    }

    #[test]
    fn div_burns_an_idle_cycle_after_its_write() {
        let mut machine = Dcpu::new();
        // SET A, 7; DIV A, 2.
        machine.load(0, &[basic(0x1, 0x00, 0x27), basic(0x5, 0x00, 0x22)]);
        machine.step_cycle();
        machine.step_cycle();

        machine.step_cycle();
        assert_eq!(machine.register(Register::A), 3);
        assert!(machine.instruction_in_flight());
        assert_eq!(machine.stage, Stage::Burn(1));

        machine.step_cycle();
        assert!(!machine.instruction_in_flight());
    }

    #[test]
    fn skip_consumes_one_cycle_and_steps_over_multiword_instructions() {
        let mut machine = Dcpu::new();
        // IFE A, 1 (fails: A is 0); SET A, next-word 0x0063; SET B, 7.
        machine.load(
            0,
            &[basic(0xC, 0x00, 0x21), 0x7C01, 0x0063, basic(0x1, 0x01, 0x27)],
        );

        // IFE: fetch + execute + failed-test burn.
        machine.step_cycles(3);
        assert!(!machine.instruction_in_flight());

        let before = machine.cycle_count();
        machine.step_cycle();
        assert_eq!(machine.cycle_count(), before + 1);
        assert_eq!(machine.pc(), 3);
        assert_eq!(machine.register(Register::A), 0);

        machine.step_cycle();
        assert_eq!(machine.register(Register::B), 7);
    }

    #[test]
    fn unknown_extended_opcode_is_a_one_cycle_noop() {
        let mut machine = Dcpu::new();
        // Extended form, xop 0x02, operand field PUSH: must not touch SP.
        machine.load(0, &[(0x1A << 10) | (0x02 << 4)]);

        let cycles = machine.step_instruction();

        assert_eq!(cycles, 1);
        assert_eq!(machine.pc(), 1);
        assert_eq!(machine.sp(), 0xFFFF);
        assert_eq!(machine.diagnostics().unknown_opcodes, 1);
    }

    #[test]
    fn word_zero_runs_as_a_noop_and_clears_in_flight_state() {
        let mut machine = Dcpu::new();

        machine.step_cycle();

        assert_eq!(machine.pc(), 1);
        assert!(!machine.instruction_in_flight());
        assert_eq!(machine.stage, Stage::Fetch);
        assert_eq!(machine.diagnostics().unknown_opcodes, 1);
    }

    #[test]
    fn jsr_pushes_the_post_operand_pc() {
        let mut machine = Dcpu::new();
        // JSR 0x0018 via next-word operand.
        machine.load(0, &[0x7C10, 0x0018]);

        let cycles = machine.step_instruction();

        assert_eq!(cycles, 3);
        assert_eq!(machine.pc(), 0x0018);
        assert_eq!(machine.sp(), 0xFFFE);
        assert_eq!(machine.memory_word(0xFFFE), 0x0002);
    }
}
