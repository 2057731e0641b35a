pub mod commands;

/// The step budget of `toylang run` when no limit is given.
pub const DEFAULT_EXECUTION_LIMIT: usize = 1_000_000_000;

pub const TOYLANG_VERSION_MESSAGE: &str = concat!(env!("CARGO_PKG_VERSION"), " (extensions: net)");
