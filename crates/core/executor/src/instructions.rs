use std::io::Read;

use crate::{opcode::is_valid_instruction, ExecutionError, Extensions, PROGRAM_TERMINATOR};

/// The instructions of a program and its program counter.
///
/// The instructions are the source bytes that are opcodes under the enabled extensions, in source
/// order. They never change after parsing; only the program counter moves, within `[0, len]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Instructions {
    /// The filtered opcode bytes.
    code: Vec<u8>,
    /// The extensions enabled by the source header.
    extensions: Extensions,
    /// The index of the next instruction to pop.
    pc: usize,
}

impl Instructions {
    /// Parse the instructions from the given source reader.
    ///
    /// The extension header is detected first without consuming it, then every byte of the source
    /// (header included) is kept only if it is an opcode for the detected extensions. Everything
    /// else is a comment.
    pub fn new<R: Read>(mut reader: R) -> Result<Self, ExecutionError> {
        let mut source = Vec::new();
        reader.read_to_end(&mut source)?;
        Ok(Self::parse(source))
    }

    /// Parse the instructions from an in-memory source.
    #[must_use]
    pub fn parse(mut source: Vec<u8>) -> Self {
        let extensions = Extensions::detect(&source);
        source.retain(|&byte| is_valid_instruction(byte, extensions));
        source.shrink_to_fit();
        tracing::debug!(len = source.len(), %extensions, "parsed instructions");
        Self { code: source, extensions, pc: 0 }
    }

    /// Rewind the program counter.
    pub fn reset(&mut self) {
        self.pc = 0;
    }

    /// The program counter.
    #[must_use]
    pub fn pc(&self) -> usize {
        self.pc
    }

    /// The number of instructions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// Returns `true` if the program has no instructions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// The filtered instructions.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.code
    }

    /// The enabled extensions.
    #[must_use]
    pub fn extensions(&self) -> Extensions {
        self.extensions
    }

    /// Returns `true` if all the given extensions are enabled.
    #[must_use]
    pub fn has_extensions(&self, extensions: Extensions) -> bool {
        self.extensions.contains(extensions)
    }

    /// Return the current instruction and advance the program counter.
    ///
    /// Once the instructions are exhausted, returns [`PROGRAM_TERMINATOR`] without moving.
    pub fn pop(&mut self) -> u8 {
        match self.code.get(self.pc) {
            Some(&byte) => {
                self.pc += 1;
                byte
            }
            None => PROGRAM_TERMINATOR,
        }
    }

    /// Move the program counter just past the instruction `close` that matches the instruction
    /// popped last.
    ///
    /// Any instruction equal to the one popped last opens a nested block that must be closed
    /// first. Returns `false` if nothing was popped yet, if the program is already exhausted, or if
    /// no match exists, in which case the program counter is left at the end.
    pub fn jump_forward(&mut self, close: u8) -> bool {
        if self.pc == 0 || self.pc == self.code.len() {
            return false;
        }
        let open = self.code[self.pc - 1];
        let mut depth = 0usize;
        while let Some(&byte) = self.code.get(self.pc) {
            self.pc += 1;
            if byte == close {
                if depth == 0 {
                    return true;
                }
                depth -= 1;
            } else if byte == open {
                depth += 1;
            }
        }
        false
    }

    /// Move the program counter just past the instruction `open` that matches the instruction
    /// popped last.
    ///
    /// Any instruction equal to the one popped last closes a nested block that must be opened
    /// first. Returns `false` if fewer than two instructions precede the program counter, or if
    /// no match exists, in which case the program counter is left at 0.
    pub fn jump_backward(&mut self, open: u8) -> bool {
        if self.pc <= 1 {
            return false;
        }
        let close = self.code[self.pc - 1];
        let mut depth = 0usize;
        for index in (0..self.pc - 1).rev() {
            let byte = self.code[index];
            if byte == open {
                if depth == 0 {
                    self.pc = index + 1;
                    return true;
                }
                depth -= 1;
            } else if byte == close {
                depth += 1;
            }
        }
        self.pc = 0;
        false
    }

    /// Count how many times the instruction popped last repeats consecutively, starting with
    /// that instruction itself, and advance the program counter past the repetitions.
    ///
    /// Returns 0 if nothing was popped yet.
    pub fn count_repeating(&mut self) -> usize {
        if self.pc == 0 {
            return 0;
        }
        let previous = self.code[self.pc - 1];
        let repeats = self.code[self.pc..].iter().take_while(|&&byte| byte == previous).count();
        self.pc += repeats;
        repeats + 1
    }

    /// Move the program counter back by `count` instructions, stopping at the first one.
    pub fn rewind(&mut self, count: usize) {
        self.pc = self.pc.saturating_sub(count);
    }
}
