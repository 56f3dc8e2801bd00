pub mod cli;
pub mod client;
pub mod load_config;
pub mod logging;

pub use cli::{run, Cli, Commands, CommandContext};
