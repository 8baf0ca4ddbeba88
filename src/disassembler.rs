// A single-instruction disassembler, grounded in the reference
// `vm16_disassemble` (decode one opcode + two addressing-mode fields,
// print a mnemonic line) and in the mnemonic-table style of
// `romatthe-mudkip`'s `cpu/disassembler.rs`.

use crate::addressing::AddrMode;
use crate::opcode::{split_instruction_word, Opcode};
use crate::vm::Vm;

fn mnemonic(op: Opcode) -> &'static str {
    use Opcode::*;
    match op {
        Nop => "NOP",
        Brk => "BRK",
        Sys => "SYS",
        Jump => "JUMP",
        Call => "CALL",
        Retn => "RETN",
        Halt => "HALT",
        Move => "MOVE",
        Xchg => "XCHG",
        Inc => "INC",
        Dec => "DEC",
        Add => "ADD",
        Sub => "SUB",
        Mul => "MUL",
        Div => "DIV",
        And => "AND",
        Or => "OR",
        Xor => "XOR",
        Not => "NOT",
        Bnze => "BNZE",
        Bze => "BZE",
        Bpos => "BPOS",
        Bneg => "BNEG",
        In => "IN",
        Out => "OUT",
        Push => "PUSH",
        Pop => "POP",
        Swap => "SWAP",
        Dbnz => "DBNZ",
        Mod => "MOD",
        Shl => "SHL",
        Shr => "SHR",
        Addc => "ADDC",
        Mulc => "MULC",
        Skne => "SKNE",
        Skeq => "SKEQ",
        Sklt => "SKLT",
        Skgt => "SKGT",
    }
}

/// Renders one addressing-mode operand, consuming its trailing immediate
/// word from `vm` at `*cursor` if the mode carries one and `is_destination`
/// doesn't mark it as a non-consuming destination mode. Mirrors exactly
/// which modes `Vm::destination()`/`Vm::source()` advance past, since that's
/// what a disassembly listing needs to stay in sync with the dispatcher.
fn render_operand(vm: &Vm, mode: AddrMode, is_destination: bool, cursor: &mut u16) -> String {
    use AddrMode::*;
    match mode {
        A => "A".to_string(),
        B => "B".to_string(),
        C => "C".to_string(),
        D => "D".to_string(),
        X => "X".to_string(),
        Y => "Y".to_string(),
        Pc => "PC".to_string(),
        Sp => "SP".to_string(),
        XInd => "[X]".to_string(),
        YInd => "[Y]".to_string(),
        XInc => "[X++]".to_string(),
        YInc => "[Y++]".to_string(),
        Reg0 => "#0".to_string(),
        Reg1 => "#1".to_string(),
        Cnst if is_destination => "#?".to_string(),
        Cnst => {
            let v = vm.peek(*cursor);
            *cursor = cursor.wrapping_add(1);
            format!("#{:04X}", v)
        }
        Abs => {
            let v = vm.peek(*cursor);
            *cursor = cursor.wrapping_add(1);
            format!("{:04X}", v)
        }
        Rel if is_destination => "PC+?".to_string(),
        Rel => {
            let offs = vm.peek(*cursor);
            *cursor = cursor.wrapping_add(1);
            format!("PC+{:04X}", offs)
        }
        SRel => {
            let offs = vm.peek(*cursor);
            *cursor = cursor.wrapping_add(1);
            format!("[SP+{:04X}]", offs)
        }
        Rel2 if is_destination => "PC+?-2".to_string(),
        Rel2 => {
            let offs = vm.peek(*cursor);
            *cursor = cursor.wrapping_add(1);
            format!("PC+{:04X}-2", offs)
        }
        XRel => {
            let offs = vm.peek(*cursor);
            *cursor = cursor.wrapping_add(1);
            format!("[X+{:04X}]", offs)
        }
        YRel => {
            let offs = vm.peek(*cursor);
            *cursor = cursor.wrapping_add(1);
            format!("[Y+{:04X}]", offs)
        }
        Invalid => "?".to_string(),
    }
}

impl Vm {
    /// Disassembles the single instruction at `addr` without mutating the
    /// VM, returning its mnemonic line and the address of the next
    /// instruction.
    pub fn disassemble_one(&self, addr: u16) -> (String, u16) {
        let code = self.peek(addr);
        let mut cursor = addr.wrapping_add(1);
        let (raw_op, raw_m1, raw_m2) = split_instruction_word(code);

        let opcode = match Opcode::decode(raw_op) {
            Some(op) => op,
            None => return (format!("{:04X}: .WORD {:04X}  ; invalid opcode", addr, code), cursor),
        };
        let mode1 = AddrMode::decode(raw_m1);
        let mode2 = AddrMode::decode(raw_m2);

        let name = mnemonic(opcode);
        let text = match opcode {
            Opcode::Nop | Opcode::Brk | Opcode::Sys | Opcode::Retn | Opcode::Halt => {
                format!("{:04X}: {}", addr, name)
            }
            Opcode::Jump | Opcode::Call | Opcode::Push => {
                // mode1 here is read through Vm::source() (Jump/Call/Push
                // target an address or push a value, never write through
                // mode1), so it always consumes its trailing word normally.
                let opd1 = render_operand(self, mode1, false, &mut cursor);
                format!("{:04X}: {} {}", addr, name, opd1)
            }
            Opcode::Inc | Opcode::Dec | Opcode::Not | Opcode::Pop | Opcode::Swap => {
                let opd1 = render_operand(self, mode1, true, &mut cursor);
                format!("{:04X}: {} {}", addr, name, opd1)
            }
            Opcode::Bnze | Opcode::Bze | Opcode::Bpos | Opcode::Bneg | Opcode::Skne
            | Opcode::Skeq | Opcode::Sklt | Opcode::Skgt | Opcode::Out => {
                // Both operands are read through Vm::source() for these.
                let opd1 = render_operand(self, mode1, false, &mut cursor);
                let opd2 = render_operand(self, mode2, false, &mut cursor);
                format!("{:04X}: {} {}, {}", addr, name, opd1, opd2)
            }
            Opcode::Xchg => {
                // Both operands are write targets (Vm::destination()).
                let opd1 = render_operand(self, mode1, true, &mut cursor);
                let opd2 = render_operand(self, mode2, true, &mut cursor);
                format!("{:04X}: {} {}, {}", addr, name, opd1, opd2)
            }
            _ => {
                // mode1 is the write target (Vm::destination()), mode2 the
                // value read (Vm::source()) — matches every remaining
                // two-operand opcode's dispatch in `Vm::execute`.
                let opd1 = render_operand(self, mode1, true, &mut cursor);
                let opd2 = render_operand(self, mode2, false, &mut cursor);
                format!("{:04X}: {} {}, {}", addr, name, opd1, opd2)
            }
        };
        (text, cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(opcode: u8, mode1: u8, mode2: u8) -> u16 {
        ((opcode as u16) << 10) | ((mode1 as u16) << 5) | mode2 as u16
    }

    #[test]
    fn disassembles_immediate_move() {
        let mut vm = Vm::new(0);
        vm.poke(0, 0x2010); // MOVE A, CNST
        vm.poke(1, 0x1234);
        let (text, next) = vm.disassemble_one(0);
        assert_eq!(text, "0000: MOVE A, #1234");
        assert_eq!(next, 2);
    }

    #[test]
    fn disassembles_halt() {
        let mut vm = Vm::new(0);
        vm.poke(0, 0x1C00);
        let (text, next) = vm.disassemble_one(0);
        assert_eq!(text, "0000: HALT");
        assert_eq!(next, 1);
    }

    #[test]
    fn destination_cnst_does_not_consume_an_operand_word() {
        // MOVE CNST, A: CNST is an invalid destination (writes mem[0]) and,
        // per Vm::destination(), does not consume a trailing operand word —
        // unlike CNST used as a source. The next instruction starts right
        // after the opcode word, not two words later.
        let mut vm = Vm::new(0);
        vm.poke(0, word(0x08, 0x10, 0x00));
        vm.poke(1, 0xBEEF); // the next instruction, not an operand
        let (text, next) = vm.disassemble_one(0);
        assert_eq!(text, "0000: MOVE #?, A");
        assert_eq!(next, 1);
    }

    #[test]
    fn flags_invalid_opcode() {
        let mut vm = Vm::new(0);
        vm.poke(0, 0x27 << 10);
        let (text, _) = vm.disassemble_one(0);
        assert!(text.contains("invalid opcode"));
    }
}
