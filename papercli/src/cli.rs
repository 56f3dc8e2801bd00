//! # papercli CLI interface
//!
//! Command parsing, sub-command routing and the async entrypoint ([`run`]) shared by
//! `main` and the integration tests. All workflow logic lives in `papercli-core`; this
//! module only turns arguments into an [`UploadRequest`] and a configured client.

use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use papercli_core::upload::{self, UploadOutcome, UploadRequest};
use regex::Regex;
use tokio::fs::File;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::level_filters::LevelFilter;
use tracing::Dispatch;

use crate::client::PaperlessClient;
use crate::load_config::load_settings;

/// Command line client for Paperless-ngx.
#[derive(Debug, Parser)]
#[clap(name = "papercli", version, about = "Command line client for Paperless-ngx.")]
pub struct Cli {
    /// Log level for stderr.
    #[clap(long = "log_level", default_value = "info", global = true)]
    pub log_level: LevelFilter,

    #[clap(flatten)]
    pub server: ServerArgs,

    #[clap(subcommand)]
    pub command: Commands,
}

/// Connection settings; each flag may also come from the environment.
#[derive(Debug, Clone, Default, Args)]
pub struct ServerArgs {
    /// Base URL of the Paperless-ngx server.
    #[clap(long = "paperless_url", env = "PAPERLESS_URL", global = true)]
    pub url: Option<String>,

    /// API token.
    #[clap(
        long = "paperless_auth_token",
        env = "PAPERLESS_AUTH_TOKEN",
        hide_env_values = true,
        global = true
    )]
    pub auth_token: Option<String>,

    /// Username for HTTP basic authentication.
    #[clap(long = "paperless_auth_username", env = "PAPERLESS_AUTH_USERNAME", global = true)]
    pub auth_username: Option<String>,

    /// Password for HTTP basic authentication.
    #[clap(
        long = "paperless_auth_password",
        env = "PAPERLESS_AUTH_PASSWORD",
        hide_env_values = true,
        global = true
    )]
    pub auth_password: Option<String>,

    /// Timeout for individual HTTP requests.
    #[clap(long = "paperless_timeout", value_parser = parse_duration, global = true)]
    pub timeout: Option<Duration>,

    /// YAML file with server settings.
    #[clap(long = "paperless_config", env = "PAPERLESS_CONFIG", global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Work with documents
    Document {
        #[clap(subcommand)]
        command: DocumentCommands,
    },
}

#[derive(Debug, Subcommand)]
pub enum DocumentCommands {
    /// Upload a document for consumption.
    Upload(UploadArgs),
}

#[derive(Debug, Clone, Args)]
pub struct UploadArgs {
    /// Path to input file.
    pub path: PathBuf,

    /// Override provided filename.
    #[clap(long)]
    pub filename: Option<String>,

    /// Apply a pre-existing tag to the document.
    #[clap(long = "tag")]
    pub tags: Vec<String>,

    /// Wait for document to be consumed.
    #[clap(
        long,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_value_t = true,
        default_missing_value = "true",
        overrides_with = "no_wait"
    )]
    pub wait: bool,

    #[clap(long = "no-wait", hide = true, overrides_with = "wait")]
    pub no_wait: bool,

    /// Maximum amount of time to wait.
    #[clap(long = "wait_duration", value_parser = parse_duration, default_value = "1h")]
    pub wait_duration: Duration,

    /// Suppress error status for duplicated documents.
    #[clap(
        long = "ignore_duplicate",
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_value_t = true,
        default_missing_value = "true",
        overrides_with = "no_ignore_duplicate"
    )]
    pub ignore_duplicate: bool,

    #[clap(long = "no-ignore_duplicate", hide = true, overrides_with = "ignore_duplicate")]
    pub no_ignore_duplicate: bool,
}

impl From<UploadArgs> for UploadRequest {
    fn from(args: UploadArgs) -> Self {
        UploadRequest {
            path: args.path,
            filename: args.filename,
            tag_names: args.tags,
            wait: args.wait && !args.no_wait,
            wait_duration: args.wait_duration,
            ignore_duplicate: args.ignore_duplicate && !args.no_ignore_duplicate,
        }
    }
}

static DURATION_COMPONENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+(?:\.\d*)?|\.\d+)(ns|us|µs|ms|s|m|h)").expect("duration pattern is valid")
});

/// Parse a duration such as `90s`, `15m`, `1h30m`, `1.5h` or `500ms`.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total = 0f64;
    let mut consumed = 0;

    for caps in DURATION_COMPONENT.captures_iter(input) {
        let whole = caps.get(0).map(|m| (m.start(), m.end()));
        let Some((start, end)) = whole else { continue };
        if start != consumed {
            break;
        }

        let value: f64 = caps[1]
            .parse()
            .map_err(|_| format!("invalid number in duration {input:?}"))?;
        let unit_secs = match &caps[2] {
            "ns" => 1e-9,
            "us" | "µs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            _ => 3600.0,
        };
        total += value * unit_secs;
        consumed = end;
    }

    if consumed == 0 || consumed != input.len() {
        return Err(format!("invalid duration {input:?}"));
    }

    Duration::try_from_secs_f64(total).map_err(|e| format!("invalid duration {input:?}: {e}"))
}

/// Capabilities handed to a command: where to log and when to stop.
#[derive(Clone)]
pub struct CommandContext {
    pub dispatch: Dispatch,
    pub cancel: CancellationToken,
}

async fn document_upload(
    server: &crate::load_config::ClientSettings,
    args: UploadArgs,
    cancel: &CancellationToken,
) -> Result<()> {
    let client = PaperlessClient::new(server.clone()).context("building client")?;
    let request = UploadRequest::from(args);

    match upload::run(&request, &client, cancel).await? {
        UploadOutcome::Submitted { task_id } => {
            tracing::info!(
                command = "document upload",
                %task_id,
                "Not waiting for consumption"
            );
        }
        UploadOutcome::Consumed(task) => {
            tracing::info!(
                command = "document upload",
                task_id = %task.task_id,
                "Upload complete"
            );
        }
        UploadOutcome::DuplicateSuppressed(err) => {
            tracing::info!(
                command = "document upload",
                task_id = %err.task_id,
                "Upload complete (duplicate ignored)"
            );
        }
    }

    Ok(())
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli, ctx: CommandContext) -> Result<()> {
    let CommandContext { dispatch, cancel } = ctx;

    async move {
        match cli.command {
            Commands::Document {
                command: DocumentCommands::Upload(args),
            } => {
                // A missing input is reported before any server configuration problem.
                File::open(&args.path)
                    .await
                    .with_context(|| format!("opening {}", args.path.display()))?;

                let settings = load_settings(&cli.server)?;
                document_upload(&settings, args, &cancel).await
            }
        }
    }
    .with_subscriber(dispatch)
    .await
}
