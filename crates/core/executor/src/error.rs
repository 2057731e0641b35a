use thiserror::Error;

use crate::MEMORY_SIZE;

/// Errors that can be returned while loading or executing a program.
///
/// [`ExecutionError::ProgramDone`] and [`ExecutionError::ExecutionLimit`] are control signals
/// rather than failures: the former reports a natural termination, the latter that the step
/// budget ran out and execution may be resumed by calling [`crate::Program::run`] again.
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// The program has no instructions left to execute.
    #[error("the program has terminated")]
    ProgramDone,

    /// The step budget given to [`crate::Program::run`] was exhausted.
    #[error("reached the execution limit")]
    ExecutionLimit,

    /// The memory pointer would leave the tape.
    #[error("tried moving the pointer out of the memory boundary [0, {}]", MEMORY_SIZE - 1)]
    OutOfBoundary,

    /// The input source failed to produce exactly one byte.
    #[error("failed to read input")]
    IoNoInput,

    /// The output sink failed to accept exactly one byte.
    #[error("failed to write output")]
    IoNoOutput,

    /// An instruction outside of the enabled opcode alphabet reached the dispatcher.
    #[error("received unknown instruction {0:#04x}")]
    ProgramUnknown(u8),

    /// The program source could not be read.
    #[error("failed to load the program: {0}")]
    Load(#[from] std::io::Error),
}
