//! Crate implementing the CLI commands.

mod cli;
mod config;
mod inspect;
mod render;
mod repl;
mod run;

pub use self::cli::{CliAction, CliOpts};
pub use self::config::{RelicConfig, Values, parse_config};
pub use self::inspect::{evaluate_pids, evaluate_probe};
pub use self::render::{
    breakpoints_to_kdl, document_to_text, event_to_text, frames_to_kdl, memory_to_kdl,
    pause_to_kdl, registers_to_kdl,
};
pub use self::repl::{HELP, ReplCommand, ReplError};
pub use self::run::evaluate_run;
