//! CLI command handlers.

mod generate;
mod status;

pub use generate::run_generate_command;
pub use status::run_status_command;
