//! Opcodes for the ToyLanguage interpreter.

use std::fmt::Display;

use enum_map::Enum;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::EnumIter;

use crate::Extensions;

/// The value returned by [`crate::Instructions::pop`] once the program has run out of
/// instructions.
pub const PROGRAM_TERMINATOR: u8 = 0;

/// An opcode specifies the operation to be performed by the interpreter.
///
/// Every opcode is a single printable ASCII byte in the program source, and the discriminant of
/// each variant is that byte. All the other bytes of a source are comments. The base opcodes are
/// the eight brainfuck instructions; the network opcodes are only recognized when the program
/// enables [`Extensions::NET`].
///
/// In the descriptions below `p` is the memory pointer and `m[p]` the cell it points to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord, Enum, EnumIter,
)]
#[repr(u8)]
pub enum Opcode {
    /// p ← p + 1
    MoveRight = b'>',
    /// p ← p - 1
    MoveLeft = b'<',
    /// m[p] ← m[p] + 1 (wrapping)
    Increment = b'+',
    /// m[p] ← m[p] - 1 (wrapping)
    Decrement = b'-',
    /// output ← m[p]
    Output = b'.',
    /// m[p] ← input
    Input = b',',
    /// if m[p] = 0, jump past the matching `]`
    LoopStart = b'[',
    /// if m[p] ≠ 0, jump back past the matching `[`
    LoopEnd = b']',
    /// timeout ← m[p] × 0.1s (0 blocks until success)
    SetTimeout = b'*',
    /// port ← 42000 + m[p]
    SetPort = b'@',
    /// m[p] ← receive (0 on failure)
    Receive = b'?',
    /// queue ← queue ++ m[p]
    QueueSend = b'^',
    /// send queue; m[p] ← 0 on success
    Flush = b';',
}

impl Opcode {
    /// Decode `byte` into an opcode, given the enabled `extensions`.
    ///
    /// Returns `None` for comment bytes, including extension opcodes whose extension is disabled.
    #[must_use]
    pub fn from_byte(byte: u8, extensions: Extensions) -> Option<Self> {
        let opcode = match byte {
            b'>' => Opcode::MoveRight,
            b'<' => Opcode::MoveLeft,
            b'+' => Opcode::Increment,
            b'-' => Opcode::Decrement,
            b'.' => Opcode::Output,
            b',' => Opcode::Input,
            b'[' => Opcode::LoopStart,
            b']' => Opcode::LoopEnd,
            b'*' => Opcode::SetTimeout,
            b'@' => Opcode::SetPort,
            b'?' => Opcode::Receive,
            b'^' => Opcode::QueueSend,
            b';' => Opcode::Flush,
            _ => return None,
        };
        extensions.contains(opcode.extension()).then_some(opcode)
    }

    /// The source byte of the opcode.
    #[must_use]
    pub const fn byte(self) -> u8 {
        self as u8
    }

    /// The extension that must be enabled for this opcode to be recognized.
    #[must_use]
    pub const fn extension(self) -> Extensions {
        match self {
            Opcode::SetTimeout
            | Opcode::SetPort
            | Opcode::Receive
            | Opcode::QueueSend
            | Opcode::Flush => Extensions::NET,
            _ => Extensions::NONE,
        }
    }

    /// Returns `true` if consecutive repetitions of this opcode can be executed as one step.
    #[must_use]
    pub const fn is_foldable(self) -> bool {
        matches!(self, Opcode::MoveRight | Opcode::MoveLeft | Opcode::Increment | Opcode::Decrement)
    }

    /// Get the mnemonic for the opcode.
    #[must_use]
    pub const fn mnemonic(&self) -> &str {
        match self {
            Opcode::MoveRight => "right",
            Opcode::MoveLeft => "left",
            Opcode::Increment => "incr",
            Opcode::Decrement => "decr",
            Opcode::Output => "output",
            Opcode::Input => "input",
            Opcode::LoopStart => "loop",
            Opcode::LoopEnd => "endloop",
            Opcode::SetTimeout => "timeout",
            Opcode::SetPort => "port",
            Opcode::Receive => "recv",
            Opcode::QueueSend => "queue",
            Opcode::Flush => "flush",
        }
    }

    /// All the opcodes that are valid with the given `extensions`.
    pub fn alphabet(extensions: Extensions) -> impl Iterator<Item = Opcode> {
        Opcode::iter().filter(move |opcode| extensions.contains(opcode.extension()))
    }
}

impl Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// Returns `true` if `byte` is an instruction under the given `extensions`, `false` if it is a
/// comment.
#[must_use]
pub fn is_valid_instruction(byte: u8, extensions: Extensions) -> bool {
    Opcode::from_byte(byte, extensions).is_some()
}
