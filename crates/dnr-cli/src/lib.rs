pub mod cli;
pub mod manifest;

pub use cli::{Cli, Commands, FormatArg, RunArgs, StageArg};
