use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    ops::{Add, AddAssign},
};

use enum_map::EnumMap;
use serde::{Deserialize, Serialize};

use crate::Opcode;

/// An execution report.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// The number of steps taken. A folded run of opcodes is a single step.
    pub steps: u64,
    /// The opcode counts.
    pub opcode_counts: EnumMap<Opcode, u64>,
}

impl ExecutionReport {
    /// Compute the total number of instructions run during the execution.
    #[must_use]
    pub fn total_instruction_count(&self) -> u64 {
        self.opcode_counts.values().sum()
    }

    /// Record a step executing `count` repetitions of `opcode`.
    pub fn record(&mut self, opcode: Opcode, count: u64) {
        self.steps += 1;
        self.opcode_counts[opcode] += count;
    }
}

impl AddAssign for ExecutionReport {
    fn add_assign(&mut self, rhs: Self) {
        self.steps += rhs.steps;
        for (opcode, count) in rhs.opcode_counts {
            self.opcode_counts[opcode] += count;
        }
    }
}

impl Add for ExecutionReport {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self::Output {
        self += rhs;
        self
    }
}

impl Display for ExecutionReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        writeln!(
            f,
            "opcode counts ({} total instructions in {} steps):",
            self.total_instruction_count(),
            self.steps
        )?;
        let mut counts =
            self.opcode_counts.iter().filter(|(_, count)| **count > 0).collect::<Vec<_>>();
        counts.sort_by(|(a, a_count), (b, b_count)| b_count.cmp(a_count).then(a.cmp(b)));
        let width = counts.iter().map(|(_, count)| count.to_string().len()).max().unwrap_or(0);
        for (opcode, count) in counts {
            writeln!(f, "  {count:>width$} {opcode} ({})", opcode.byte() as char)?;
        }
        Ok(())
    }
}
