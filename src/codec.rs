// Whole-VM snapshotting: a binary layout and a hex-text wrapper around it,
// grounded in the reference `vm16_get_vm_as_str`/`vm16_set_vm_as_str`, which
// dump the live struct (including its raw memory array) byte for byte and
// hex-encode each byte. A Rust `Vm` has no stable in-memory layout to dump
// byte for byte, so the binary form here defines its own explicit,
// documented field order instead and the hex form is a thin wrapper over it
// (`spec.md` §4.5, §6 "Snapshot binary layout").

use crate::error::Vm16Error;
use crate::vm::{Vm, IDENT, VERSION};
use std::convert::TryInto;

const HEADER_BYTES: usize = 4 // ident
    + 2 // version
    + 2 * 13 // a,b,c,d,x,y,pc,sp,bp,tos,l_addr,l_data + one pad word for mem_size
    + 2; // mem_mask

impl Vm {
    /// Byte length of [`Vm::to_snapshot_bytes`]'s output for a VM of this
    /// size, without having to build the snapshot first.
    pub fn snapshot_byte_len(&self) -> usize {
        HEADER_BYTES + self.mem_size() * 2
    }

    /// Hex-character length of [`Vm::to_snapshot_hex`]'s output, matching
    /// the role of the reference `vm16_get_string_size`.
    pub fn snapshot_hex_len(&self) -> usize {
        self.snapshot_byte_len() * 2
    }

    /// Serializes the header and memory into a flat byte buffer. Field
    /// order: `ident`, `version`, `a b c d x y pc sp bp tos l_addr l_data`,
    /// `mem_size`, `mem_mask`, then `mem_size` little-endian words of
    /// memory. `p_in_dest` is intentionally not persisted — like the
    /// reference restore path, it's always reset to the `A` register.
    pub fn to_snapshot_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.snapshot_byte_len());
        buf.extend_from_slice(&IDENT.to_le_bytes());
        buf.extend_from_slice(&VERSION.to_le_bytes());
        for reg in [
            self.a, self.b, self.c, self.d, self.x, self.y, self.pc, self.sp, self.bp, self.tos,
            self.l_addr, self.l_data,
        ] {
            buf.extend_from_slice(&reg.to_le_bytes());
        }
        buf.extend_from_slice(&(self.mem_size() as u16).to_le_bytes());
        buf.extend_from_slice(&self.mem_mask().to_le_bytes());
        for i in 0..self.mem_size() {
            buf.extend_from_slice(&self.memory().read(i as u16).to_le_bytes());
        }
        buf
    }

    /// Restores this VM's registers and memory from a previously-produced
    /// snapshot. The target VM must already have the right memory size
    /// (snapshots don't carry enough information to resize it); a mismatch
    /// is reported rather than silently truncated or padded (I4).
    pub fn from_snapshot_bytes(&mut self, bytes: &[u8]) -> Result<(), Vm16Error> {
        let expected = self.snapshot_byte_len();
        if bytes.len() != expected {
            return Err(Vm16Error::SnapshotSizeMismatch {
                expected,
                actual: bytes.len(),
            });
        }
        let got_ident = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        if got_ident != IDENT {
            return Err(Vm16Error::NotAVm16Image);
        }
        let got_version = u16::from_le_bytes(bytes[4..6].try_into().unwrap());
        if got_version != VERSION {
            return Err(Vm16Error::IncompatibleVersion {
                got: got_version,
                expected: VERSION,
            });
        }

        let mut words = [0u16; 12];
        for (i, word) in words.iter_mut().enumerate() {
            let off = 6 + i * 2;
            *word = u16::from_le_bytes(bytes[off..off + 2].try_into().unwrap());
        }
        self.a = words[0];
        self.b = words[1];
        self.c = words[2];
        self.d = words[3];
        self.x = words[4];
        self.y = words[5];
        self.pc = words[6];
        self.sp = words[7];
        self.bp = words[8];
        self.tos = words[9];
        self.l_addr = words[10];
        self.l_data = words[11];

        let mem_off = HEADER_BYTES;
        for i in 0..self.mem_size() {
            let off = mem_off + i * 2;
            let word = u16::from_le_bytes(bytes[off..off + 2].try_into().unwrap());
            self.memory_mut().write(i as u16, word);
        }

        self.p_in_dest = crate::addressing::Destination::Register(crate::addressing::Register::A);
        log::debug!("restored VM16 snapshot ({} bytes)", bytes.len());
        Ok(())
    }

    /// Hex-text form of [`Vm::to_snapshot_bytes`], two uppercase hex digits
    /// per byte, matching `vm16_get_vm_as_str`'s `NTOA` encoding.
    pub fn to_snapshot_hex(&self) -> String {
        let bytes = self.to_snapshot_bytes();
        let mut out = String::with_capacity(bytes.len() * 2);
        for b in bytes {
            out.push(crate::conversions::nibble_to_hex(b >> 4) as char);
            out.push(crate::conversions::nibble_to_hex(b & 0x0F) as char);
        }
        out
    }

    /// Inverse of [`Vm::to_snapshot_hex`].
    pub fn from_snapshot_hex(&mut self, s: &str) -> Result<(), Vm16Error> {
        let s = s.as_bytes();
        if s.len() % 2 != 0 {
            return Err(Vm16Error::InvalidSnapshotHex { offset: s.len() });
        }
        let mut bytes = Vec::with_capacity(s.len() / 2);
        for (i, pair) in s.chunks(2).enumerate() {
            if !crate::conversions::is_hex_digit(pair[0]) || !crate::conversions::is_hex_digit(pair[1]) {
                return Err(Vm16Error::InvalidSnapshotHex { offset: i * 2 });
            }
            let hi = crate::conversions::hex_to_nibble(pair[0]);
            let lo = crate::conversions::hex_to_nibble(pair[1]);
            bytes.push((hi << 4) | lo);
        }
        self.from_snapshot_bytes(&bytes)
    }

    /// Reads `num` words starting at `addr`, hex-encoded four characters
    /// per word (`spec.md` §4.5). Returns the number of words encoded, 0 if
    /// `num` is out of range.
    pub fn read_mem_as_str(&self, addr: u16, num: u16) -> String {
        if num == 0 || num as usize > self.mem_size() {
            return String::new();
        }
        let mut out = String::with_capacity(num as usize * 4);
        let mut a = addr;
        for _ in 0..num {
            let val = self.memory().read(a);
            out.push(crate::conversions::nibble_to_hex((val >> 12) as u8 & 0xF) as char);
            out.push(crate::conversions::nibble_to_hex((val >> 8) as u8 & 0xF) as char);
            out.push(crate::conversions::nibble_to_hex((val >> 4) as u8 & 0xF) as char);
            out.push(crate::conversions::nibble_to_hex(val as u8 & 0xF) as char);
            a = a.wrapping_add(1);
        }
        out
    }

    /// Inverse of [`Vm::read_mem_as_str`]. Returns the number of words
    /// written, 0 if `num` is out of range or `text` is too short.
    pub fn write_mem_as_str(&mut self, addr: u16, num: u16, text: &str) -> u16 {
        let bytes = text.as_bytes();
        if num == 0 || num as usize > self.mem_size() || bytes.len() < num as usize * 4 {
            return 0;
        }
        let mut a = addr;
        for chunk in bytes.chunks(4).take(num as usize) {
            let val = match crate::conversions::parse_hex_digits(chunk, 4) {
                Some(v) => v,
                None => return 0,
            };
            self.memory_mut().write(a, val);
            a = a.wrapping_add(1);
        }
        num
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_round_trips_registers_and_memory() {
        let mut vm = Vm::new(0);
        vm.poke(0, 0xBEEF);
        vm.poke(10, 0x1234);
        vm.set_pc(7);
        let snap = vm.to_snapshot_bytes();

        let mut restored = Vm::new(0);
        restored.from_snapshot_bytes(&snap).unwrap();
        assert_eq!(restored.get_pc(), 7);
        assert_eq!(restored.peek(0), 0xBEEF);
        assert_eq!(restored.peek(10), 0x1234);
    }

    #[test]
    fn hex_snapshot_round_trips() {
        let mut vm = Vm::new(0);
        vm.poke(3, 0xCAFE);
        let hex = vm.to_snapshot_hex();
        assert_eq!(hex.len(), vm.snapshot_hex_len());

        let mut restored = Vm::new(0);
        restored.from_snapshot_hex(&hex).unwrap();
        assert_eq!(restored.peek(3), 0xCAFE);
    }

    #[test]
    fn size_mismatch_is_reported() {
        let mut vm = Vm::new(0);
        let err = vm.from_snapshot_bytes(&[0u8; 4]).unwrap_err();
        assert!(matches!(err, Vm16Error::SnapshotSizeMismatch { .. }));
    }

    #[test]
    fn foreign_ident_is_rejected() {
        let mut vm = Vm::new(0);
        let mut bytes = vm.to_snapshot_bytes();
        bytes[0] = 0;
        let err = vm.from_snapshot_bytes(&bytes).unwrap_err();
        assert_eq!(err, Vm16Error::NotAVm16Image);
    }

    #[test]
    fn mem_as_str_round_trips() {
        let mut vm = Vm::new(0);
        vm.poke(0, 0x1234);
        vm.poke(1, 0xABCD);
        let text = vm.read_mem_as_str(0, 2);
        assert_eq!(text, "1234ABCD");

        let mut other = Vm::new(0);
        let written = other.write_mem_as_str(0, 2, &text);
        assert_eq!(written, 2);
        assert_eq!(other.peek(0), 0x1234);
        assert_eq!(other.peek(1), 0xABCD);
    }
}
