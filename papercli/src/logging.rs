//! Logging setup for the CLI.
//!
//! The subscriber is returned as a [`Dispatch`] instead of being installed globally;
//! [`crate::cli::run`] executes commands under it.

use tracing::level_filters::LevelFilter;
use tracing::Dispatch;
use tracing_subscriber::EnvFilter;

/// Build a stderr logger. `RUST_LOG` directives, when set, refine `level`.
pub fn build_dispatch(level: LevelFilter) -> Dispatch {
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(filter)
        .finish();

    Dispatch::new(subscriber)
}
