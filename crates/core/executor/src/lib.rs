//! An executor for ToyLanguage, a brainfuck superset with a networking extension.

#![warn(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::should_implement_trait)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::unreadable_literal)]
#![warn(missing_docs)]

mod error;
mod extension;
mod instructions;
mod memory;
pub mod network;
mod opcode;
mod opts;
mod program;
mod report;
mod utils;

pub use error::*;
pub use extension::*;
pub use instructions::*;
pub use memory::*;
pub use network::{ConnectionState, Network};
pub use opcode::*;
pub use opts::*;
pub use program::*;
pub use report::*;
pub use utils::*;
