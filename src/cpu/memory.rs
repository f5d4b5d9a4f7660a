//! Byte-addressed main memory.
//!
//! Every access is wrapped into range, so there is no such thing as an
//! out-of-bounds address: `-1` is the last cell and `size` is cell 0 again.

use serde::{Serialize, Deserialize};

/// Default number of memory cells.
pub const DEFAULT_MEMORY_SIZE: usize = 256;

/// Main memory: a fixed number of byte cells.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memory {
    cells: Vec<u8>,
}

impl Memory {
    /// Create a memory of `size` zeroed cells.
    ///
    /// A zero size is bumped to one cell so wrapping stays well defined;
    /// configuration validation rejects it before it gets here.
    pub fn new(size: usize) -> Self {
        Self {
            cells: vec![0; size.max(1)],
        }
    }

    /// Number of cells.
    #[inline]
    pub fn size(&self) -> usize {
        self.cells.len()
    }

    /// Map any integer address into `[0, size)`.
    #[inline]
    pub fn wrap(&self, addr: i64) -> usize {
        // size fits in i64 for any memory we can allocate
        addr.rem_euclid(self.cells.len() as i64) as usize
    }

    /// Read the cell at `addr` (wrapped).
    #[inline]
    pub fn read(&self, addr: i64) -> u8 {
        self.cells[self.wrap(addr)]
    }

    /// Write `value mod 256` to the cell at `addr` (wrapped).
    #[inline]
    pub fn write(&mut self, addr: i64, value: i64) {
        let index = self.wrap(addr);
        self.cells[index] = to_byte(value);
    }

    /// Set every cell to `value mod 256`.
    pub fn fill(&mut self, value: i64) {
        let byte = to_byte(value);
        self.cells.fill(byte);
    }

    /// Write `bytes` sequentially starting at `start`, wrapping past the end.
    pub fn load(&mut self, start: i64, bytes: &[u8]) {
        for (offset, &byte) in (0i64..).zip(bytes) {
            self.write(start + offset, i64::from(byte));
        }
    }

    /// `count` cells starting at `start`, as `(address, value)` pairs.
    pub fn dump(&self, start: i64, count: usize) -> Vec<(usize, u8)> {
        (0i64..)
            .take(count)
            .map(|offset| {
                let addr = self.wrap(start + offset);
                (addr, self.cells[addr])
            })
            .collect()
    }

    /// The raw cell array.
    pub fn cells(&self) -> &[u8] {
        &self.cells
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_SIZE)
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let non_zero = self.cells.iter().filter(|&&cell| cell != 0).count();

        f.debug_struct("Memory")
            .field("non_zero_cells", &non_zero)
            .field("total_cells", &self.cells.len())
            .finish()
    }
}

/// Reduce an arbitrary integer to a byte, modulo 256.
#[inline]
pub fn to_byte(value: i64) -> u8 {
    value.rem_euclid(256) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_read_write() {
        let mut mem = Memory::new(16);
        mem.write(10, 42);
        assert_eq!(mem.read(10), 42);
    }

    #[test]
    fn test_memory_starts_zeroed() {
        let mem = Memory::default();
        assert_eq!(mem.size(), DEFAULT_MEMORY_SIZE);
        assert!(mem.cells().iter().all(|&c| c == 0));
    }

    #[test]
    fn test_values_reduced_mod_256() {
        let mut mem = Memory::new(8);
        mem.write(0, 300);
        mem.write(1, -1);
        mem.write(2, 256);
        assert_eq!(mem.read(0), 44);
        assert_eq!(mem.read(1), 255);
        assert_eq!(mem.read(2), 0);
    }

    #[test]
    fn test_address_wraparound() {
        let mut mem = Memory::new(16);
        mem.write(-1, 7);
        assert_eq!(mem.read(15), 7);
        mem.write(17, 9);
        assert_eq!(mem.read(1), 9);
        assert_eq!(mem.read(1 - 16), 9);
        assert_eq!(mem.wrap(-17), 15);
    }

    #[test]
    fn test_fill() {
        let mut mem = Memory::new(4);
        mem.fill(0x1AB);
        assert_eq!(mem.cells(), &[0xAB; 4]);
        mem.fill(0);
        assert_eq!(mem.cells(), &[0; 4]);
    }

    #[test]
    fn test_load_wraps_past_end() {
        let mut mem = Memory::new(4);
        mem.load(3, &[1, 2, 3]);
        assert_eq!(mem.cells(), &[2, 3, 0, 1]);
    }

    #[test]
    fn test_dump() {
        let mut mem = Memory::new(4);
        mem.load(0, &[5, 6, 7, 8]);
        assert_eq!(mem.dump(-1, 3), vec![(3, 8), (0, 5), (1, 6)]);
    }

    #[test]
    fn test_zero_size_is_clamped() {
        let mut mem = Memory::new(0);
        assert_eq!(mem.size(), 1);
        mem.write(123, 5);
        assert_eq!(mem.read(-8), 5);
    }
}
