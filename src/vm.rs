// This is the place for the basic VM state and the fetch-decode-execute
// loop, which dispatches through the addressing-mode evaluator implemented
// right here as methods on `Vm` (the details of *what* a mode means are
// defined in `addressing.rs`, the same split the teacher uses between its
// `fields.rs` types and its `processor.rs` evaluator).

use crate::addressing::{AddrMode, Destination, Register};
use crate::memory::Memory;
use crate::opcode::{split_instruction_word, Opcode};

/// VM identifier persisted in the snapshot header (`spec.md` §3).
pub const IDENT: u32 = 0x3631_4D56;
/// Compatibility version implemented by this crate. v1 is historical and not
/// built (`spec.md` §9, "Versioning").
pub const VERSION: u16 = 2;

/// Outcome of a `run` call, mirroring the stable status codes of `spec.md`
/// §6. The numeric values are part of the public contract, not an
/// implementation detail, so they're pinned with explicit discriminants.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum RunStatus {
    Ok = 0,
    Nop = 1,
    In = 2,
    Out = 3,
    Sys = 4,
    Halt = 5,
    Break = 6,
    Error = 7,
}

/// The VM: register file, latches, and memory window.
///
/// Unlike the reference C implementation, there is no "invalid VM" runtime
/// state to guard against on every call — a `Vm` value is always the product
/// of [`Vm::new`] or a successful deserialization, so it's always valid by
/// construction. The C API's ident/version guard against operating on a
/// null, foreign, or corrupted pointer; that entire failure class doesn't
/// exist for an owned Rust value. The equivalent check is enforced once, at
/// the one place untrusted bytes cross the boundary: snapshot restore
/// (`codec.rs`), which returns a `Result` instead of silently no-opping.
#[derive(Clone)]
pub struct Vm {
    pub(crate) a: u16,
    pub(crate) b: u16,
    pub(crate) c: u16,
    pub(crate) d: u16,
    pub(crate) x: u16,
    pub(crate) y: u16,
    pub(crate) pc: u16,
    pub(crate) sp: u16,
    pub(crate) bp: u16,
    pub(crate) tos: u16,
    pub(crate) l_addr: u16,
    pub(crate) l_data: u16,
    pub(crate) p_in_dest: Destination,
    pub(crate) memory: Memory,
}

impl Vm {
    /// Constructs a VM with `64 << size_index` words of memory. All
    /// registers and memory are zero except `tos = 0xFFFF` and
    /// `p_in_dest -> A` (I3).
    pub fn new(size_index: u8) -> Self {
        log::debug!("constructing VM16 with size_index={}", size_index);
        Vm {
            a: 0,
            b: 0,
            c: 0,
            d: 0,
            x: 0,
            y: 0,
            pc: 0,
            sp: 0,
            bp: 0,
            tos: 0xFFFF,
            l_addr: 0,
            l_data: 0,
            p_in_dest: Destination::Register(Register::A),
            memory: Memory::new(size_index),
        }
    }

    pub fn mem_size(&self) -> usize {
        self.memory.len()
    }

    pub fn mem_mask(&self) -> u16 {
        self.memory.mask()
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    pub fn set_pc(&mut self, addr: u16) {
        self.pc = addr;
    }

    pub fn get_pc(&self) -> u16 {
        self.pc
    }

    pub fn a(&self) -> u16 {
        self.a
    }

    pub fn b(&self) -> u16 {
        self.b
    }

    pub fn c(&self) -> u16 {
        self.c
    }

    pub fn d(&self) -> u16 {
        self.d
    }

    pub fn x(&self) -> u16 {
        self.x
    }

    pub fn y(&self) -> u16 {
        self.y
    }

    pub fn sp(&self) -> u16 {
        self.sp
    }

    pub fn bp(&self) -> u16 {
        self.bp
    }

    pub fn tos(&self) -> u16 {
        self.tos
    }

    pub fn l_addr(&self) -> u16 {
        self.l_addr
    }

    pub fn l_data(&self) -> u16 {
        self.l_data
    }

    /// Writes `value` at the current PC and advances it, latching
    /// `l_addr`/`l_data` the way the reference `vm16_deposit` does.
    pub fn deposit(&mut self, value: u16) {
        self.memory.write(self.pc, value);
        self.l_addr = self.pc;
        self.l_data = value;
        self.pc = self.pc.wrapping_add(1);
    }

    pub fn peek(&self, addr: u16) -> u16 {
        self.memory.read(addr)
    }

    pub fn poke(&mut self, addr: u16, value: u16) -> bool {
        self.memory.write(addr, value);
        true
    }

    /// Copies `num` words starting at `addr` into `buf`. Bounded by the
    /// memory size, as `spec.md` §4.8 requires; returns the number of words
    /// actually copied (0 if `num` is out of range or `buf` is too small).
    pub fn read_mem(&self, addr: u16, num: u16, buf: &mut [u16]) -> u16 {
        if num == 0 || num as usize > self.memory.len() || (buf.len()) < num as usize {
            return 0;
        }
        let mut a = addr;
        for slot in buf.iter_mut().take(num as usize) {
            *slot = self.memory.read(a);
            a = a.wrapping_add(1);
        }
        num
    }

    pub fn write_mem(&mut self, addr: u16, num: u16, buf: &[u16]) -> u16 {
        if num == 0 || num as usize > self.memory.len() || buf.len() < num as usize {
            return 0;
        }
        let mut a = addr;
        for &word in buf.iter().take(num as usize) {
            self.memory.write(a, word);
            a = a.wrapping_add(1);
        }
        num
    }

    fn register(&self, r: Register) -> u16 {
        match r {
            Register::A => self.a,
            Register::B => self.b,
            Register::C => self.c,
            Register::D => self.d,
            Register::X => self.x,
            Register::Y => self.y,
            Register::Pc => self.pc,
            Register::Sp => self.sp,
        }
    }

    fn set_register(&mut self, r: Register, value: u16) {
        match r {
            Register::A => self.a = value,
            Register::B => self.b = value,
            Register::C => self.c = value,
            Register::D => self.d = value,
            Register::X => self.x = value,
            Register::Y => self.y = value,
            Register::Pc => self.pc = value,
            Register::Sp => self.sp = value,
        }
    }

    fn read_destination(&self, dest: Destination) -> u16 {
        match dest {
            Destination::Register(r) => self.register(r),
            Destination::Memory(addr) => self.memory.read(addr),
        }
    }

    fn write_destination(&mut self, dest: Destination, value: u16) {
        match dest {
            Destination::Register(r) => self.set_register(r, value),
            Destination::Memory(addr) => self.memory.write(addr, value),
        }
    }

    /// Destination (write-target) evaluator: `spec.md` §4.2, the `getaddr`
    /// side. Modes with no sensible writable place (`REG0`, `REG1`, `CNST`,
    /// `REL`, `REL2`, and anything unrecognized) resolve to `mem[0]` exactly
    /// like the reference default case — a silent, observable mutation of
    /// address 0 rather than a Rust-level error, because that's the
    /// documented v2 behavior programs can (and in the wild, do) rely on.
    /// Note the asymmetry with the source evaluator: `CNST`/`REL`/`REL2` as
    /// a *destination* do **not** consume the trailing immediate word, since
    /// the reference `getaddr` returns before ever reading it.
    fn destination(&mut self, mode: AddrMode) -> Destination {
        use AddrMode::*;
        match mode {
            A => Destination::Register(Register::A),
            B => Destination::Register(Register::B),
            C => Destination::Register(Register::C),
            D => Destination::Register(Register::D),
            X => Destination::Register(Register::X),
            Y => Destination::Register(Register::Y),
            Pc => Destination::Register(Register::Pc),
            Sp => Destination::Register(Register::Sp),
            XInd => Destination::Memory(self.x),
            YInd => Destination::Memory(self.y),
            XInc => {
                let addr = self.x;
                self.x = self.x.wrapping_add(1);
                Destination::Memory(addr)
            }
            YInc => {
                let addr = self.y;
                self.y = self.y.wrapping_add(1);
                Destination::Memory(addr)
            }
            Abs => {
                let addr = self.memory.read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                Destination::Memory(addr)
            }
            SRel => {
                let offs = self.memory.read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                Destination::Memory(self.sp.wrapping_add(offs))
            }
            XRel => {
                let offs = self.memory.read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                Destination::Memory(self.x.wrapping_add(offs))
            }
            YRel => {
                let offs = self.memory.read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                Destination::Memory(self.y.wrapping_add(offs))
            }
            Reg0 | Reg1 | Cnst | Rel | Rel2 | Invalid => Destination::Memory(0),
        }
    }

    /// Source (read-value) evaluator: `spec.md` §4.2, the `getoprnd` side.
    fn source(&mut self, mode: AddrMode) -> u16 {
        use AddrMode::*;
        match mode {
            A => self.a,
            B => self.b,
            C => self.c,
            D => self.d,
            X => self.x,
            Y => self.y,
            Pc => self.pc,
            Sp => self.sp,
            XInd => self.memory.read(self.x),
            YInd => self.memory.read(self.y),
            XInc => {
                let val = self.memory.read(self.x);
                self.x = self.x.wrapping_add(1);
                val
            }
            YInc => {
                let val = self.memory.read(self.y);
                self.y = self.y.wrapping_add(1);
                val
            }
            Reg0 => 0,
            Reg1 => 1,
            Cnst => {
                let val = self.memory.read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                val
            }
            Abs => {
                let addr = self.memory.read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.memory.read(addr)
            }
            Rel => {
                let offs = self.memory.read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.pc.wrapping_add(offs)
            }
            SRel => {
                let offs = self.memory.read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.memory.read(self.sp.wrapping_add(offs))
            }
            Rel2 => {
                let offs = self.memory.read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.pc.wrapping_add(offs).wrapping_sub(2)
            }
            XRel => {
                let offs = self.memory.read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.memory.read(self.x.wrapping_add(offs))
            }
            YRel => {
                let offs = self.memory.read(self.pc);
                self.pc = self.pc.wrapping_add(1);
                self.memory.read(self.y.wrapping_add(offs))
            }
            Invalid => 0,
        }
    }

    /// Runs up to `num_cycles` instructions, returning the status that made
    /// the dispatcher yield (or `Ok` once the budget is exhausted) together
    /// with the number of instructions actually executed (`spec.md` §4.4,
    /// §6). Unlike the reference C `vm16_run`, the executed count is always
    /// accurate, including on the `Error` path (see `DESIGN.md`: (P8) is
    /// honored literally rather than reproducing the C default-case bug).
    pub fn run(&mut self, num_cycles: u32) -> (RunStatus, u32) {
        let mut executed = 0u32;
        while executed < num_cycles {
            let code = self.memory.read(self.pc);
            self.pc = self.pc.wrapping_add(1);
            let (raw_op, raw_m1, raw_m2) = split_instruction_word(code);
            executed += 1;

            let opcode = match Opcode::decode(raw_op) {
                Some(op) => op,
                None => {
                    log::warn!(
                        "invalid opcode {:#04x} at pc={:#06x}",
                        raw_op,
                        self.pc.wrapping_sub(1)
                    );
                    return (RunStatus::Error, executed);
                }
            };
            let mode1 = AddrMode::decode(raw_m1);
            let mode2 = AddrMode::decode(raw_m2);

            if let Some(status) = self.execute(opcode, code, mode1, mode2) {
                log::trace!("yielded {:?} after {} cycle(s)", status, executed);
                return (status, executed);
            }
        }
        (RunStatus::Ok, executed)
    }

    /// Executes one already-decoded instruction. Returns `Some(status)` if
    /// this instruction yields control to the host, `None` to keep running.
    ///
    /// Operand evaluation order follows the reference switch exactly:
    /// destination before source wherever both are read, since that order
    /// is observable through immediate-word consumption and X/Y
    /// post-increment (`spec.md` §4.4, §5).
    fn execute(&mut self, opcode: Opcode, code: u16, m1: AddrMode, m2: AddrMode) -> Option<RunStatus> {
        use Opcode::*;
        match opcode {
            Nop => {
                self.p_in_dest = Destination::Register(Register::A);
                Some(RunStatus::Nop)
            }
            Brk => {
                self.p_in_dest = Destination::Register(Register::A);
                self.l_addr = code & 0x03FF;
                self.pc = self.pc.wrapping_sub(1);
                Some(RunStatus::Break)
            }
            Sys => {
                self.p_in_dest = Destination::Register(Register::A);
                self.l_addr = code & 0x03FF;
                Some(RunStatus::Sys)
            }
            Jump => {
                self.pc = self.source(m1);
                None
            }
            Call => {
                let addr = self.source(m1);
                self.sp = self.sp.wrapping_sub(1);
                self.memory.write(self.sp, self.pc);
                self.pc = addr;
                self.bp = self.sp;
                self.tos = self.tos.min(self.sp);
                None
            }
            Retn => {
                let addr = self.memory.read(self.sp);
                self.sp = self.sp.wrapping_add(1);
                self.pc = addr;
                self.bp = self.sp;
                None
            }
            Halt => {
                self.pc = self.pc.wrapping_sub(1);
                Some(RunStatus::Halt)
            }
            Move => {
                let dest = self.destination(m1);
                let src = self.source(m2);
                self.write_destination(dest, src);
                None
            }
            Xchg => {
                let dest1 = self.destination(m1);
                let dest2 = self.destination(m2);
                let tmp = self.read_destination(dest1);
                self.write_destination(dest1, self.read_destination(dest2));
                self.write_destination(dest2, tmp);
                None
            }
            Inc => {
                let dest = self.destination(m1);
                let v = self.read_destination(dest).wrapping_add(1);
                self.write_destination(dest, v);
                None
            }
            Dec => {
                let dest = self.destination(m1);
                let v = self.read_destination(dest).wrapping_sub(1);
                self.write_destination(dest, v);
                None
            }
            Add => {
                let dest = self.destination(m1);
                let src = self.source(m2);
                let v = self.read_destination(dest).wrapping_add(src);
                self.write_destination(dest, v);
                None
            }
            Sub => {
                let dest = self.destination(m1);
                let src = self.source(m2);
                let v = self.read_destination(dest).wrapping_sub(src);
                self.write_destination(dest, v);
                None
            }
            Mul => {
                let dest = self.destination(m1);
                let src = self.source(m2);
                let v = self.read_destination(dest).wrapping_mul(src);
                self.write_destination(dest, v);
                None
            }
            Div => {
                let dest = self.destination(m1);
                let src = self.source(m2);
                if src > 0 {
                    let v = self.read_destination(dest) / src;
                    self.write_destination(dest, v);
                }
                None
            }
            And => {
                let dest = self.destination(m1);
                let src = self.source(m2);
                let v = self.read_destination(dest) & src;
                self.write_destination(dest, v);
                None
            }
            Or => {
                let dest = self.destination(m1);
                let src = self.source(m2);
                let v = self.read_destination(dest) | src;
                self.write_destination(dest, v);
                None
            }
            Xor => {
                let dest = self.destination(m1);
                let src = self.source(m2);
                let v = self.read_destination(dest) ^ src;
                self.write_destination(dest, v);
                None
            }
            Not => {
                let dest = self.destination(m1);
                let v = !self.read_destination(dest);
                self.write_destination(dest, v);
                None
            }
            Bnze => {
                let opd1 = self.source(m1);
                let opd2 = self.source(m2);
                if opd1 != 0 {
                    self.pc = opd2;
                }
                None
            }
            Bze => {
                let opd1 = self.source(m1);
                let opd2 = self.source(m2);
                if opd1 == 0 {
                    self.pc = opd2;
                }
                None
            }
            Bpos => {
                let opd1 = self.source(m1);
                let opd2 = self.source(m2);
                if opd1 <= 0x7FFF {
                    self.pc = opd2;
                }
                None
            }
            Bneg => {
                let opd1 = self.source(m1);
                let opd2 = self.source(m2);
                if opd1 > 0x7FFF {
                    self.pc = opd2;
                }
                None
            }
            In => {
                self.p_in_dest = self.destination(m1);
                self.l_addr = self.source(m2);
                Some(RunStatus::In)
            }
            Out => {
                self.l_addr = self.source(m1);
                self.l_data = self.source(m2);
                Some(RunStatus::Out)
            }
            Push => {
                let opd1 = self.source(m1);
                self.sp = self.sp.wrapping_sub(1);
                self.tos = self.tos.min(self.sp);
                self.memory.write(self.sp, opd1);
                None
            }
            Pop => {
                let dest = self.destination(m1);
                let v = self.memory.read(self.sp);
                self.write_destination(dest, v);
                self.sp = self.sp.wrapping_add(1);
                None
            }
            Swap => {
                let dest = self.destination(m1);
                let v = self.read_destination(dest);
                self.write_destination(dest, (v >> 8) | (v << 8));
                None
            }
            Dbnz => {
                let dest = self.destination(m1);
                let v = self.read_destination(dest).wrapping_sub(1);
                self.write_destination(dest, v);
                let opd2 = self.source(m2);
                if v != 0 {
                    self.pc = opd2;
                }
                None
            }
            Mod => {
                let dest = self.destination(m1);
                let src = self.source(m2);
                if src > 0 {
                    let v = self.read_destination(dest) % src;
                    self.write_destination(dest, v);
                }
                None
            }
            Shl => {
                let dest = self.destination(m1);
                let src = self.source(m2);
                let v = self.read_destination(dest).wrapping_shl(src as u32);
                self.write_destination(dest, v);
                None
            }
            Shr => {
                let dest = self.destination(m1);
                let src = self.source(m2);
                let v = self.read_destination(dest).wrapping_shr(src as u32);
                self.write_destination(dest, v);
                None
            }
            Addc => {
                let dest = self.destination(m1);
                let src = self.source(m2);
                let res = self.read_destination(dest) as u32 + src as u32;
                self.write_destination(dest, res as u16);
                self.b = (res >> 16) as u16;
                None
            }
            Mulc => {
                let dest = self.destination(m1);
                let src = self.source(m2);
                let res = self.read_destination(dest) as u32 * src as u32;
                self.write_destination(dest, res as u16);
                self.b = (res >> 16) as u16;
                None
            }
            Skne => {
                let opd1 = self.source(m1);
                let opd2 = self.source(m2);
                if opd1 != opd2 {
                    self.pc = self.pc.wrapping_add(2);
                }
                None
            }
            Skeq => {
                let opd1 = self.source(m1);
                let opd2 = self.source(m2);
                if opd1 == opd2 {
                    self.pc = self.pc.wrapping_add(2);
                }
                None
            }
            Sklt => {
                let opd1 = self.source(m1);
                let opd2 = self.source(m2);
                if opd1 < opd2 {
                    self.pc = self.pc.wrapping_add(2);
                }
                None
            }
            Skgt => {
                let opd1 = self.source(m1);
                let opd2 = self.source(m2);
                if opd1 > opd2 {
                    self.pc = self.pc.wrapping_add(2);
                }
                None
            }
        }
    }

    /// Delivers a value into the destination latched by the last `IN`/`SYS`
    /// trap (`spec.md` §6, IN event payload). Valid until the next `run`
    /// call overwrites `p_in_dest`.
    pub fn write_input(&mut self, value: u16) {
        let dest = self.p_in_dest;
        self.write_destination(dest, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vm_with_program(words: &[u16]) -> Vm {
        let mut vm = Vm::new(0);
        for (i, &w) in words.iter().enumerate() {
            vm.poke(i as u16, w);
        }
        vm
    }

    #[test]
    fn init_invariants_hold() {
        let vm = Vm::new(2);
        assert_eq!(vm.a, 0);
        assert_eq!(vm.tos, 0xFFFF);
        assert_eq!(vm.p_in_dest, Destination::Register(Register::A));
        assert_eq!(vm.mem_size(), 256);
    }

    #[test]
    fn immediate_move_and_halt() {
        // MOVE A,CNST ; 0x1111 ; HALT
        let mut vm = vm_with_program(&[0x2010, 0x1111, 0x1C00]);
        let (status, executed) = vm.run(10);
        assert_eq!(status, RunStatus::Halt);
        assert_eq!(vm.get_pc(), 2);
        assert_eq!(vm.a, 0x1111);
        assert_eq!(executed, 2);
    }

    #[test]
    fn stack_discipline_push_pop() {
        // PUSH CNST,0x1111 ; PUSH CNST,0x2222 ; POP A ; POP B ; HALT
        let program = [
            (0x1Au16 << 10) | (0x10 << 5), // PUSH CNST
            0x1111,
            (0x1Au16 << 10) | (0x10 << 5), // PUSH CNST
            0x2222,
            (0x1Bu16 << 10) | (0x00 << 5), // POP A
            (0x1Bu16 << 10) | (0x01 << 5), // POP B
            0x1C00,                        // HALT
        ];
        let mut vm = vm_with_program(&program);
        let start_sp = vm.sp;
        let (status, _) = vm.run(20);
        assert_eq!(status, RunStatus::Halt);
        assert_eq!(vm.a, 0x2222);
        assert_eq!(vm.b, 0x1111);
        assert_eq!(vm.sp, start_sp);
    }

    #[test]
    fn call_then_retn_restores_pc_and_sp() {
        // at 0: CALL 0x0003 ; at 2: HALT ; at 3: RETN
        let mut vm = vm_with_program(&[
            (0x05u16 << 10) | (0x10 << 5), // CALL CNST
            0x0003,
            0x1C00, // HALT
            0x0600, // RETN
        ]);
        let start_sp = vm.sp;
        let (status, _) = vm.run(1); // CALL
        assert_eq!(status, RunStatus::Ok);
        assert_eq!(vm.get_pc(), 3);
        let (status, _) = vm.run(1); // RETN
        assert_eq!(status, RunStatus::Ok);
        assert_eq!(vm.get_pc(), 2);
        assert_eq!(vm.sp, start_sp);
    }

    #[test]
    fn div_by_zero_leaves_destination_unchanged() {
        // MOVE A,CNST 7 ; DIV A, REG0 (always 0) ; HALT
        let mut vm = vm_with_program(&[0x2010, 7, (0x0Fu16 << 10) | 0x0C, 0x1C00]);
        let (_, _) = vm.run(10);
        assert_eq!(vm.a, 7);
    }

    #[test]
    fn invalid_opcode_errors_with_accurate_executed_count() {
        // 0x27 is the first unassigned opcode
        let mut vm = vm_with_program(&[0x27u16 << 10]);
        let (status, executed) = vm.run(5);
        assert_eq!(status, RunStatus::Error);
        assert!(executed <= 5);
        assert_eq!(executed, 1);
    }

    #[test]
    fn in_event_then_resume_delivers_input() {
        // IN A, CNST 0x42
        let mut vm = vm_with_program(&[(0x18u16 << 10) | 0x10, 0x0042]);
        let (status, executed) = vm.run(1);
        assert_eq!(status, RunStatus::In);
        assert_eq!(vm.l_addr(), 0x42);
        assert_eq!(executed, 1);
        vm.write_input(0x55);
        assert_eq!(vm.a, 0x55);
    }

    #[test]
    fn every_non_yielding_opcode_runs_one_cycle_and_advances_pc() {
        // ADD A, REG1 (a = a + 1)
        let mut vm = vm_with_program(&[(0x0Cu16 << 10) | 0x0D]);
        let (status, executed) = vm.run(1);
        assert_eq!(status, RunStatus::Ok);
        assert_eq!(executed, 1);
        assert!(vm.get_pc() >= 1);
    }
}
