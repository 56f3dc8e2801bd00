use std::process::ExitCode;

use clap::Parser;
use papercli::cli::{run, Cli, CommandContext};
use papercli::logging::build_dispatch;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let dispatch = build_dispatch(cli.log_level);
    let cancel = CancellationToken::new();

    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    tracing::dispatcher::with_default(&dispatch, || {
        tracing::debug!("CLI arguments parsed, invoking run");
    });

    match run(cli, CommandContext { dispatch, cancel }).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Fatal error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
