use std::{
    fs::File,
    io::{self, BufReader, Read, Write},
    path::PathBuf,
    process::ExitCode,
};

use anyhow::{Context, Result};
use clap::{Args, Parser};
use tl_core_executor::{ExecutionError, ExecutionReport, ExecutorOpts, Extensions, Program};

use crate::DEFAULT_EXECUTION_LIMIT;

/// Arguments shared by the run commands.
#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Path to the program source.
    file: PathBuf,

    /// Print the opcode counts to stderr after the run.
    #[arg(long)]
    report: bool,

    /// Print the opcode counts to stdout as JSON after the run.
    #[arg(long)]
    report_json: bool,

    /// Execute runs of `+`, `-`, `>` and `<` as a single step.
    #[arg(long)]
    fold: bool,
}

#[derive(Parser, Debug)]
#[command(name = "run", about = "Run a program with a step budget.")]
pub struct RunCmd {
    #[clap(flatten)]
    args: RunArgs,

    /// The maximum number of steps to execute.
    #[arg(long, env = "TL_EXECUTION_LIMIT", default_value_t = DEFAULT_EXECUTION_LIMIT)]
    limit: usize,
}

#[derive(Parser, Debug)]
#[command(name = "run-unlimited", about = "Run a program until it ends.")]
pub struct RunUnlimitedCmd {
    #[clap(flatten)]
    args: RunArgs,
}

/// How a run ended.
#[derive(Debug)]
pub struct Outcome {
    /// The error the program terminated with, if any.
    pub error: Option<ExecutionError>,
    /// What was executed.
    pub report: ExecutionReport,
}

impl RunCmd {
    pub fn run(&self) -> Result<ExitCode> {
        let outcome = self.args.execute(Some(self.limit), io::stdin(), io::stdout())?;
        self.args.finish(&outcome)
    }
}

impl RunUnlimitedCmd {
    pub fn run(&self) -> Result<ExitCode> {
        let outcome = self.args.execute(None, io::stdin(), io::stdout())?;
        self.args.finish(&outcome)
    }
}

impl RunArgs {
    /// Load the program with the options from the environment and the flags.
    pub fn load(&self) -> Result<Program> {
        let mut opts = ExecutorOpts::from_env();
        opts.fold_repeats |= self.fold;
        let file = File::open(&self.file)
            .with_context(|| format!("Failed to load program: {}", self.file.display()))?;
        Program::with_opts(BufReader::new(file), opts)
            .with_context(|| format!("Failed to load program: {}", self.file.display()))
    }

    /// Load and run the program, reading `,` from `input` and writing `.` to `output`.
    ///
    /// Without a `limit`, the program runs until it terminates or fails.
    pub fn execute<R, W>(&self, limit: Option<usize>, input: R, mut output: W) -> Result<Outcome>
    where
        R: Read + Send + 'static,
        W: Write + Send + 'static,
    {
        let program = self.load()?;
        if program.has_extensions(Extensions::NET) {
            writeln!(output, "Network Extension Enabled\n")?;
            output.flush()?;
        }
        let mut program = program.with_io(input, output);

        tracing::info!(file = %self.file.display(), ?limit, "running program");
        let result = match limit {
            Some(limit) => program.run(limit),
            None => loop {
                match program.run(usize::MAX) {
                    Err(ExecutionError::ExecutionLimit) => continue,
                    result => break result,
                }
            },
        };
        tracing::info!(steps = program.report().steps, "program finished");

        Ok(Outcome { error: result.err(), report: program.report().clone() })
    }

    /// Report the outcome of a run on stdout and stderr.
    fn finish(&self, outcome: &Outcome) -> Result<ExitCode> {
        let mut stdout = io::stdout().lock();
        let status = match &outcome.error {
            Some(err) => {
                writeln!(stdout, "\n\nProgram terminated with error: {err}")?;
                ExitCode::FAILURE
            }
            None => {
                writeln!(stdout)?;
                ExitCode::SUCCESS
            }
        };
        if self.report_json {
            writeln!(stdout, "{}", serde_json::to_string_pretty(&outcome.report)?)?;
        }
        stdout.flush()?;
        if self.report {
            write!(io::stderr(), "{}", outcome.report)?;
        }
        Ok(status)
    }
}
