use std::io::{Read, Write};

use crate::{
    ExecutionError, ExecutionReport, ExecutorOpts, Extensions, Instructions, Memory, Network,
    Opcode, PROGRAM_TERMINATOR,
};

/// A loaded program and the machine it runs on.
///
/// The program owns its instructions, its memory, its network extension and the byte source and
/// sink its `,` and `.` instructions use. It is driven one instruction at a time by
/// [`Program::run_next`], or in bounded batches by [`Program::run`].
pub struct Program {
    /// The instructions and program counter.
    instructions: Instructions,
    /// The working memory.
    memory: Memory,
    /// The network extension. Only reachable when the program enables [`Extensions::NET`].
    network: Network,
    /// The source of `,`.
    input: Box<dyn Read + Send>,
    /// The sink of `.`.
    output: Box<dyn Write + Send>,
    /// The options the program was loaded with.
    opts: ExecutorOpts,
    /// What has been executed so far.
    report: ExecutionReport,
}

impl Program {
    /// Load a program from `reader`, with the default options, reading from stdin and writing to
    /// stdout.
    pub fn new<R: Read>(reader: R) -> Result<Self, ExecutionError> {
        Self::with_opts(reader, ExecutorOpts::default())
    }

    /// Load a program from `reader` with the given options, reading from stdin and writing to
    /// stdout.
    pub fn with_opts<R: Read>(reader: R, opts: ExecutorOpts) -> Result<Self, ExecutionError> {
        let instructions = Instructions::new(reader)?;
        Ok(Self {
            instructions,
            memory: Memory::new(),
            network: Network::new(opts.network),
            input: Box::new(std::io::stdin()),
            output: Box::new(std::io::stdout()),
            opts,
            report: ExecutionReport::default(),
        })
    }

    /// Replace the source of `,` and the sink of `.`.
    #[must_use]
    pub fn with_io(
        mut self,
        input: impl Read + Send + 'static,
        output: impl Write + Send + 'static,
    ) -> Self {
        self.set_input(input);
        self.set_output(output);
        self
    }

    /// Replace the source of `,`.
    pub fn set_input(&mut self, input: impl Read + Send + 'static) {
        self.input = Box::new(input);
    }

    /// Replace the sink of `.`.
    pub fn set_output(&mut self, output: impl Write + Send + 'static) {
        self.output = Box::new(output);
    }

    /// Run until the program terminates, fails, or `limit` steps have been executed.
    ///
    /// Returns `Ok(())` on termination and [`ExecutionError::ExecutionLimit`] when the budget is
    /// exhausted, in which case calling `run` again resumes where execution stopped.
    pub fn run(&mut self, limit: usize) -> Result<(), ExecutionError> {
        tracing::debug!(limit, pc = self.instructions.pc(), "running");
        for _ in 0..limit {
            match self.run_next() {
                Ok(()) => {}
                Err(ExecutionError::ProgramDone) => return Ok(()),
                Err(err) => return Err(err),
            }
        }
        Err(ExecutionError::ExecutionLimit)
    }

    /// Execute the next instruction.
    ///
    /// Returns [`ExecutionError::ProgramDone`] when there is nothing left to execute.
    pub fn run_next(&mut self) -> Result<(), ExecutionError> {
        let byte = self.instructions.pop();
        if byte == PROGRAM_TERMINATOR {
            return Err(ExecutionError::ProgramDone);
        }
        let Some(opcode) = Opcode::from_byte(byte, self.instructions.extensions()) else {
            return Err(ExecutionError::ProgramUnknown(byte));
        };

        let count = if self.opts.fold_repeats && opcode.is_foldable() {
            self.instructions.count_repeating()
        } else {
            1
        };
        tracing::trace!(pc = self.instructions.pc(), %opcode, count, "executing");

        let pointer = self.memory.pointer();
        let result = self.dispatch(opcode, count);
        let executed = match result {
            // A folded move stops at the repetition that leaves the tape, like unfolded ones do.
            Err(ExecutionError::OutOfBoundary) => {
                let executed = self.memory.pointer().abs_diff(pointer) + 1;
                self.instructions.rewind(count - executed);
                executed
            }
            _ => count,
        };
        self.report.record(opcode, executed as u64);
        result
    }

    /// Execute `count` repetitions of `opcode`.
    fn dispatch(&mut self, opcode: Opcode, count: usize) -> Result<(), ExecutionError> {
        match opcode {
            Opcode::MoveRight => self.memory.advance(count),
            Opcode::MoveLeft => self.memory.retreat(count),
            Opcode::Increment => {
                self.memory.add(wrap_count(count));
                Ok(())
            }
            Opcode::Decrement => {
                self.memory.sub(wrap_count(count));
                Ok(())
            }
            Opcode::Output => {
                let written = self.output.write(&[self.memory.get()]);
                match written.and_then(|written| self.output.flush().map(|()| written)) {
                    Ok(1) => Ok(()),
                    _ => Err(ExecutionError::IoNoOutput),
                }
            }
            Opcode::Input => {
                let mut buf = [0u8; 1];
                match self.input.read(&mut buf) {
                    Ok(1) => {
                        self.memory.set(buf[0]);
                        Ok(())
                    }
                    _ => Err(ExecutionError::IoNoInput),
                }
            }
            // An unmatched bracket leaves the program counter where the scan gave up.
            Opcode::LoopStart => {
                if self.memory.get() == 0 {
                    self.instructions.jump_forward(Opcode::LoopEnd.byte());
                }
                Ok(())
            }
            Opcode::LoopEnd => {
                if self.memory.get() != 0 {
                    self.instructions.jump_backward(Opcode::LoopStart.byte());
                }
                Ok(())
            }
            Opcode::SetTimeout => {
                self.network.set_timeout(self.memory.get());
                Ok(())
            }
            Opcode::SetPort => {
                self.network.set_port(self.memory.get());
                Ok(())
            }
            Opcode::Receive => {
                self.memory.set(self.network.receive());
                Ok(())
            }
            Opcode::QueueSend => {
                self.network.queue_send(self.memory.get());
                Ok(())
            }
            Opcode::Flush => {
                if self.network.push() {
                    self.memory.set(0);
                }
                Ok(())
            }
        }
    }

    /// Rewind the program counter and blank the memory. The network is left untouched.
    pub fn reset(&mut self) {
        self.instructions.reset();
        self.memory.reset();
    }

    /// Load new instructions from `reader`, keeping the memory and the network.
    pub fn load_program<R: Read>(&mut self, reader: R) -> Result<(), ExecutionError> {
        self.instructions = Instructions::new(reader)?;
        Ok(())
    }

    /// Returns `true` if all the given extensions are enabled.
    #[must_use]
    pub fn has_extensions(&self, extensions: Extensions) -> bool {
        self.instructions.has_extensions(extensions)
    }

    /// The parsed instructions.
    #[must_use]
    pub fn instructions(&self) -> &Instructions {
        &self.instructions
    }

    /// The parsed instructions, for moving the program counter by hand.
    pub fn instructions_mut(&mut self) -> &mut Instructions {
        &mut self.instructions
    }

    /// The working memory.
    #[must_use]
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// The working memory, for seeding or inspecting it by hand.
    pub fn memory_mut(&mut self) -> &mut Memory {
        &mut self.memory
    }

    /// The network extension.
    #[must_use]
    pub fn network(&self) -> &Network {
        &self.network
    }

    /// The options the program was loaded with.
    #[must_use]
    pub fn opts(&self) -> ExecutorOpts {
        self.opts
    }

    /// What has been executed so far.
    #[must_use]
    pub fn report(&self) -> &ExecutionReport {
        &self.report
    }
}

impl std::fmt::Debug for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Program")
            .field("instructions", &self.instructions)
            .field("memory", &self.memory)
            .field("network", &self.network)
            .field("opts", &self.opts)
            .finish_non_exhaustive()
    }
}

/// The change to a cell made by `count` increments or decrements.
fn wrap_count(count: usize) -> u8 {
    (count % 256) as u8
}
