//! CLI domain: parse, route, help and output only.
//! No domain orchestration; a single route table dispatches to the library.

mod help;
mod output;
mod parse;
mod route;

pub use help::command_name;
pub use output::map_error;
pub use parse::{Cli, Commands};
pub use route::RunContext;
