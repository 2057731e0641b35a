use std::fmt::{Debug, Formatter};

use crate::ExecutionError;

/// The number of cells on the tape. Brainfuck traditionally uses 30000, this superset uses 2^16.
pub const MEMORY_SIZE: usize = 1 << 16;

/// The working memory of a program: a fixed-size tape of byte cells and a pointer into it.
#[derive(Clone, PartialEq, Eq)]
pub struct Memory {
    /// The tape. Always exactly [`MEMORY_SIZE`] cells long.
    cells: Box<[u8]>,
    /// The index of the current cell, in `[0, MEMORY_SIZE)`.
    pointer: usize,
}

impl Memory {
    /// Create a blank memory.
    #[must_use]
    pub fn new() -> Self {
        Self { cells: vec![0; MEMORY_SIZE].into_boxed_slice(), pointer: 0 }
    }

    /// Blank out every cell and move the pointer back to the first one.
    pub fn reset(&mut self) {
        self.cells.fill(0);
        self.pointer = 0;
    }

    /// The index of the current cell.
    #[must_use]
    pub fn pointer(&self) -> usize {
        self.pointer
    }

    /// Increment the current cell, wrapping around on overflow.
    #[inline]
    pub fn incr(&mut self) {
        self.add(1);
    }

    /// Decrement the current cell, wrapping around on underflow.
    #[inline]
    pub fn decr(&mut self) {
        self.sub(1);
    }

    /// Add `value` to the current cell, wrapping around on overflow.
    #[inline]
    pub fn add(&mut self, value: u8) {
        let cell = &mut self.cells[self.pointer];
        *cell = cell.wrapping_add(value);
    }

    /// Subtract `value` from the current cell, wrapping around on underflow.
    #[inline]
    pub fn sub(&mut self, value: u8) {
        let cell = &mut self.cells[self.pointer];
        *cell = cell.wrapping_sub(value);
    }

    /// The value of the current cell.
    #[inline]
    #[must_use]
    pub fn get(&self) -> u8 {
        self.cells[self.pointer]
    }

    /// Overwrite the current cell.
    #[inline]
    pub fn set(&mut self, value: u8) {
        self.cells[self.pointer] = value;
    }

    /// Move the pointer to the next cell.
    pub fn next(&mut self) -> Result<(), ExecutionError> {
        self.advance(1)
    }

    /// Move the pointer to the previous cell.
    pub fn prev(&mut self) -> Result<(), ExecutionError> {
        self.retreat(1)
    }

    /// Move the pointer `count` cells to the right.
    ///
    /// If the destination is past the last cell, the pointer stops on the last cell, as if the
    /// cells were stepped through one at a time.
    pub fn advance(&mut self, count: usize) -> Result<(), ExecutionError> {
        let room = MEMORY_SIZE - 1 - self.pointer;
        if count > room {
            self.pointer = MEMORY_SIZE - 1;
            return Err(ExecutionError::OutOfBoundary);
        }
        self.pointer += count;
        Ok(())
    }

    /// Move the pointer `count` cells to the left.
    ///
    /// If the destination is before the first cell, the pointer stops on the first cell.
    pub fn retreat(&mut self, count: usize) -> Result<(), ExecutionError> {
        if count > self.pointer {
            self.pointer = 0;
            return Err(ExecutionError::OutOfBoundary);
        }
        self.pointer -= count;
        Ok(())
    }

    /// A copy of the tape from the first cell to the last non-zero one.
    ///
    /// Returns an empty vector if every cell is zero.
    #[must_use]
    pub fn snapshot(&self) -> Vec<u8> {
        match self.cells.iter().rposition(|&cell| cell != 0) {
            Some(last) => self.cells[..=last].to_vec(),
            None => Vec::new(),
        }
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for Memory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memory")
            .field("pointer", &self.pointer)
            .field("cells", &self.snapshot())
            .finish()
    }
}
