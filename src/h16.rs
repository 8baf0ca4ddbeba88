// The H16 line-oriented ASCII memory-image format (`spec.md` §4.6), grounded
// line-for-line in the reference `vm16h16.c`. Note its two entry points are
// named the opposite of what you'd expect from their prefix: `vm16_write_h16`
// *parses* H16 text into VM memory, and `vm16_read_h16` *produces* H16 text
// from VM memory. The names below are spelled from the text's point of
// view instead.

use crate::error::Vm16Error;
use crate::vm::Vm;

const LINE_LEN_1: usize = 2 + 4 + 2 + 8 * 4 + 2;
const TERMINATOR: &str = ":00000FF";

enum Line {
    Data { addr: u16, words: Vec<u16> },
    Eof,
}

fn parse_line(line: &str, line_no: usize) -> Result<Line, Vm16Error> {
    let bytes = line.as_bytes();
    if bytes.first() != Some(&b':') {
        return Err(Vm16Error::MalformedH16Line {
            line: line_no,
            reason: "missing leading ':'",
        });
    }
    let rest = &bytes[1..];
    if rest.len() < 7 {
        return Err(Vm16Error::MalformedH16Line {
            line: line_no,
            reason: "line too short",
        });
    }
    let num = crate::conversions::parse_hex_digits(&rest[0..1], 1).unwrap_or(0xFFFF);
    let addr = crate::conversions::parse_hex_digits(&rest[1..5], 4).unwrap_or(0xFFFF);
    let ty = crate::conversions::parse_hex_digits(&rest[5..7], 2).unwrap_or(0xFFFF);

    if line.len() != 8 + num as usize * 4 {
        return Err(Vm16Error::MalformedH16Line {
            line: line_no,
            reason: "declared word count doesn't match line length",
        });
    }

    if ty == 0 && num > 0 && num < 9 {
        let data = &rest[7..];
        let mut words = Vec::with_capacity(num as usize);
        for chunk in data.chunks(4) {
            match crate::conversions::parse_hex_digits(chunk, 4) {
                Some(w) => words.push(w),
                None => {
                    return Err(Vm16Error::MalformedH16Line {
                        line: line_no,
                        reason: "malformed data word",
                    })
                }
            }
        }
        return Ok(Line::Data { addr, words });
    }
    if ty == 0xFF && num == 0 && addr == 0 {
        return Ok(Line::Eof);
    }
    Err(Vm16Error::MalformedH16Line {
        line: line_no,
        reason: "unrecognized record type",
    })
}

impl Vm {
    /// Upper bound, in characters, on [`Vm::to_h16`]'s output for a VM of
    /// this size (`vm16_get_h16_buffer_size`'s role).
    pub fn h16_buffer_len(&self) -> usize {
        (self.mem_size() / 8) * LINE_LEN_1 + TERMINATOR.len() + 1
    }

    /// Parses H16 text, writing each data record into memory. Processing
    /// stops at the first malformed line or at the `:00000FF` terminator;
    /// a stream that runs out without ever reaching the terminator is an
    /// error, matching the reference loop condition.
    pub fn load_h16(&mut self, text: &str) -> Result<(), Vm16Error> {
        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                continue;
            }
            match parse_line(line, line_no)? {
                Line::Data { addr, words } => {
                    let mut a = addr;
                    for w in words {
                        self.memory_mut().write(a, w);
                        a = a.wrapping_add(1);
                    }
                }
                Line::Eof => return Ok(()),
            }
        }
        Err(Vm16Error::MissingH16Terminator)
    }

    /// Renders the full memory image as H16 text: one `:8AAAA00...` record
    /// per non-all-zero 8-word block, terminated by `:00000FF`. All-zero
    /// blocks are omitted, matching the reference writer.
    pub fn to_h16(&self) -> String {
        let mut out = String::with_capacity(self.h16_buffer_len());
        let mem_size = self.mem_size() as u16;
        let mut addr: u16 = 0;
        while (addr as usize) < mem_size as usize {
            let words: Vec<u16> = (0..8).map(|o| self.memory().read(addr.wrapping_add(o))).collect();
            if words.iter().any(|&w| w != 0) {
                out.push(':');
                out.push('8');
                for i in (0..4).rev() {
                    out.push(crate::conversions::nibble_to_hex(((addr >> (i * 4)) & 0xF) as u8) as char);
                }
                out.push('0');
                out.push('0');
                for w in words {
                    for i in (0..4).rev() {
                        out.push(crate::conversions::nibble_to_hex(((w >> (i * 4)) & 0xF) as u8) as char);
                    }
                }
                out.push('\n');
            }
            addr = addr.wrapping_add(8);
        }
        out.push_str(TERMINATOR);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_vm_produces_only_the_terminator() {
        let vm = Vm::new(0);
        assert_eq!(vm.to_h16(), TERMINATOR);
    }

    #[test]
    fn round_trips_a_sparse_image() {
        let mut vm = Vm::new(0);
        vm.poke(2, 0x1111);
        vm.poke(3, 0x2222);
        vm.poke(40, 0xBEEF);
        let text = vm.to_h16();

        let mut restored = Vm::new(0);
        restored.load_h16(&text).unwrap();
        assert_eq!(restored.peek(2), 0x1111);
        assert_eq!(restored.peek(3), 0x2222);
        assert_eq!(restored.peek(40), 0xBEEF);
        assert_eq!(restored.peek(0), 0);
    }

    #[test]
    fn missing_terminator_is_an_error() {
        let mut vm = Vm::new(0);
        let err = vm.load_h16(":4000011112222333344445\n").unwrap_err();
        assert!(matches!(err, Vm16Error::MissingH16Terminator));
    }

    #[test]
    fn malformed_line_is_reported() {
        let mut vm = Vm::new(0);
        let err = vm.load_h16(":zzzz\n:00000FF").unwrap_err();
        assert!(matches!(err, Vm16Error::MalformedH16Line { .. }));
    }
}
