//! Flat, byte addressed memory of the virtual machine.
//!
//! ```text
//! 0          data_end       heap_end                    size
//! | data     | heap -->     | <-- stack                  |
//! ```
//!
//! Every access is bounds checked; a `None` result is a segmentation fault
//! for the caller to report.

use std::ops::Range;

use crate::bytecode::WORD;

#[derive(Debug)]
pub struct Memory {
    bytes: Vec<u8>,
}

impl Memory {
    /// Memory of `size` bytes with `data` copied to address 0.
    pub fn new(data: &[u8], size: usize) -> Self {
        let mut bytes = vec![0; size.max(data.len())];
        bytes[..data.len()].copy_from_slice(data);
        Memory { bytes }
    }

    pub fn size(&self) -> i64 {
        self.bytes.len() as i64
    }

    fn range(&self, addr: i64, len: i64) -> Option<Range<usize>> {
        let start = usize::try_from(addr).ok()?;
        let len = usize::try_from(len).ok()?;
        let end = start.checked_add(len)?;
        if end > self.bytes.len() {
            return None;
        }
        Some(start..end)
    }

    pub fn load_word(&self, addr: i64) -> Option<i64> {
        let bytes = self.slice(addr, WORD)?;
        let mut word = [0; WORD as usize];
        word.copy_from_slice(bytes);
        Some(i64::from_le_bytes(word))
    }

    pub fn store_word(&mut self, addr: i64, value: i64) -> Option<()> {
        self.slice_mut(addr, WORD)?
            .copy_from_slice(&value.to_le_bytes());
        Some(())
    }

    pub fn load_byte(&self, addr: i64) -> Option<u8> {
        let range = self.range(addr, 1)?;
        Some(self.bytes[range.start])
    }

    pub fn store_byte(&mut self, addr: i64, value: u8) -> Option<()> {
        let range = self.range(addr, 1)?;
        self.bytes[range.start] = value;
        Some(())
    }

    pub fn slice(&self, addr: i64, len: i64) -> Option<&[u8]> {
        let range = self.range(addr, len)?;
        Some(&self.bytes[range])
    }

    pub fn slice_mut(&mut self, addr: i64, len: i64) -> Option<&mut [u8]> {
        let range = self.range(addr, len)?;
        Some(&mut self.bytes[range])
    }

    /// NUL terminated string starting at `addr`, without the terminator.
    pub fn c_str(&self, addr: i64) -> Option<&[u8]> {
        let range = self.range(addr, 0)?;
        let rest = &self.bytes[range.start..];
        let len = rest.iter().position(|&b| b == 0)?;
        Some(&rest[..len])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn words_and_bytes() {
        let mut memory = Memory::new(&[1, 2, 3], 32);
        assert_eq!(memory.size(), 32);
        assert_eq!(memory.load_byte(2), Some(3));

        memory.store_word(8, -2).unwrap();
        assert_eq!(memory.load_word(8), Some(-2));
        assert_eq!(memory.load_byte(8), Some(0xfe));

        memory.store_byte(9, 0).unwrap();
        assert_eq!(memory.load_word(8), Some(-2 & !0xff00));
    }

    #[test]
    fn out_of_range() {
        let mut memory = Memory::new(&[], 16);
        assert_eq!(memory.load_word(9), None);
        assert_eq!(memory.load_word(-1), None);
        assert_eq!(memory.store_byte(16, 1), None);
        assert_eq!(memory.slice(0, -1), None);
        assert!(memory.slice(16, 0).is_some());
    }

    #[test]
    fn c_strings() {
        let memory = Memory::new(b"\0\0hello\0world", 16);
        assert_eq!(memory.c_str(2), Some(&b"hello"[..]));
        assert_eq!(memory.c_str(7), Some(&b""[..]));
        assert_eq!(memory.c_str(8), Some(&b"world"[..]));
        assert_eq!(memory.c_str(13), Some(&b""[..]));
        assert_eq!(memory.c_str(17), None);
    }
}
