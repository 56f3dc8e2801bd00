//! `load_config` module: merges an optional YAML file with command-line flags and
//! environment variables into the [`ClientSettings`] used to reach the server.
//!
//! # Responsibilities
//! - Parse the optional, secret-free YAML file into typed structs
//! - Let flags and environment variables (resolved by clap) override file values
//! - Require a server URL and one complete set of credentials
//!
//! # Errors
//! All errors use `anyhow::Error` and name the offending input; they surface at the CLI
//! boundary as a single fatal message.
//!
//! Accepted YAML:
//!
//! ```yaml
//! server:
//!   url: https://paperless.example.com/
//!   timeout: 30s
//!   auth_username: alice
//! ```

use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::Url;
use serde::Deserialize;
use tracing::{error, info};

use crate::cli::{parse_duration, ServerArgs};

/// Per-request timeout when neither flag nor file sets one.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    server: ServerSection,
}

#[derive(Debug, Default, Deserialize)]
struct ServerSection {
    url: Option<String>,
    timeout: Option<String>,
    auth_username: Option<String>,
}

/// Credentials for the server.
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    Token(String),
    Basic { username: String, password: String },
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::Token(_) => f.write_str("Token(<redacted>)"),
            Auth::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

/// Everything needed to construct a [`crate::client::PaperlessClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    /// Server base URL, always ending in `/`.
    pub url: Url,
    pub auth: Auth,
    pub timeout: Duration,
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    info!(config_path = ?path, "Loading configuration from file");

    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path, "Failed to read config file");
            return Err(e).with_context(|| format!("Failed to read config file {:?}", path));
        }
    };

    if content.trim().is_empty() {
        info!(config_path = ?path, "Config file is empty");
        return Ok(FileConfig::default());
    }

    match serde_yaml::from_str::<Option<FileConfig>>(&content) {
        Ok(conf) => {
            info!(config_path = ?path, "Parsed config YAML successfully");
            Ok(conf.unwrap_or_default())
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path, "Failed to parse config YAML");
            Err(anyhow::anyhow!("Failed to parse config YAML {:?}: {e}", path))
        }
    }
}

/// Parse a server URL, making sure relative API paths join below it.
pub fn parse_base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw.trim()).with_context(|| format!("Invalid server URL {raw:?}"))?;

    if url.cannot_be_a_base() {
        bail!("Invalid server URL {raw:?}: not a base URL");
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

/// Build client settings from flags/environment, falling back to the YAML file.
pub fn load_settings(args: &ServerArgs) -> Result<ClientSettings> {
    let file = match &args.config {
        Some(path) => read_file_config(path)?,
        None => FileConfig::default(),
    };

    let raw_url = args
        .url
        .clone()
        .or(file.server.url)
        .filter(|url| !url.trim().is_empty());

    let Some(raw_url) = raw_url else {
        error!("Server URL not configured");
        bail!("Paperless URL not configured; set --paperless_url or PAPERLESS_URL");
    };

    let url = parse_base_url(&raw_url)?;

    let timeout = match (args.timeout, file.server.timeout.as_deref()) {
        (Some(timeout), _) => timeout,
        (None, Some(raw)) => parse_duration(raw)
            .map_err(|e| anyhow::anyhow!("Invalid server timeout {raw:?}: {e}"))?,
        (None, None) => DEFAULT_REQUEST_TIMEOUT,
    };

    let username = args.auth_username.clone().or(file.server.auth_username);

    let auth = match (&args.auth_token, username, &args.auth_password) {
        (Some(token), _, _) if !token.is_empty() => Auth::Token(token.clone()),
        (_, Some(username), Some(password)) => Auth::Basic {
            username,
            password: password.clone(),
        },
        (_, Some(_), None) => {
            bail!(
                "Password missing for basic authentication; \
                 set --paperless_auth_password or PAPERLESS_AUTH_PASSWORD"
            )
        }
        _ => {
            bail!("No credentials configured; set --paperless_auth_token or PAPERLESS_AUTH_TOKEN")
        }
    };

    info!(
        url = %url,
        auth = ?auth,
        timeout = ?timeout,
        "Client settings loaded"
    );

    Ok(ClientSettings { url, auth, timeout })
}
