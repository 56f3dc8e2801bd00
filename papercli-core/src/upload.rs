//! Upload workflow: open input → resolve tags → submit → wait → classify.
//!
//! This module provides the orchestration for uploading a single document and,
//! optionally, waiting for the service's consumption task to finish. It:
//!   - Opens the input file and keeps it exclusively owned until submission
//!   - Resolves every requested tag name to exactly one tag identifier (fail-fast)
//!   - Submits the document through an [`UploadClient`]
//!   - Waits for the resulting task, bounded by a maximum duration and a cancellation token
//!   - Turns a recognised duplicate failure into success when configured to do so
//!
//! # Major Types
//! - [`UploadRequest`]: what to upload and how to wait
//! - [`UploadOutcome`]: how a successful run ended
//! - [`UploadError`] / [`TagError`]: everything else
//!
//! # Error Handling
//! Nothing is retried here. Every error carries the operation that failed and, where
//! relevant, the tag name or the underlying [`ClientError`].

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::fs::File;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::contract::{
    ClientError, DocumentUploadOptions, ListTagsOptions, Task, TaskError, UploadClient,
    WaitForTaskOptions,
};
use crate::duplicate::is_suppressible_duplicate;

/// Default bound for waiting on the consumption task.
pub const DEFAULT_WAIT_DURATION: Duration = Duration::from_secs(60 * 60);

/// A single document upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    /// Path of the file to upload.
    pub path: PathBuf,
    /// Overrides the file name reported to the service.
    pub filename: Option<String>,
    /// Names of pre-existing tags to apply, in order.
    pub tag_names: Vec<String>,
    /// Wait for the consumption task to finish.
    pub wait: bool,
    /// Maximum time to wait for the consumption task.
    pub wait_duration: Duration,
    /// Report success when the task failed because the document already exists.
    pub ignore_duplicate: bool,
}

impl UploadRequest {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            filename: None,
            tag_names: Vec::new(),
            wait: true,
            wait_duration: DEFAULT_WAIT_DURATION,
            ignore_duplicate: true,
        }
    }

    /// File name reported to the service: the override if set, else the base name of
    /// the source path.
    pub fn effective_filename(&self) -> String {
        match self.filename.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => base_name(&self.path),
        }
    }
}

fn base_name(path: &Path) -> String {
    match path.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => path.to_string_lossy().into_owned(),
    }
}

/// How a successful upload ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Waiting was disabled; the task was started but not observed.
    Submitted { task_id: String },
    /// The task finished successfully.
    Consumed(Task),
    /// The task failed as a duplicate and duplicates are ignored.
    DuplicateSuppressed(TaskError),
}

#[derive(Debug, Error)]
pub enum TagError {
    #[error("tag {name:?} not found")]
    NotFound { name: String },

    #[error("tag {name:?}: received {count} items, expected exactly one")]
    Ambiguous { name: String, count: usize },

    #[error("tag {name:?}")]
    Lookup {
        name: String,
        #[source]
        source: ClientError,
    },
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("opening {}", .path.display())]
    Input {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("resolving tags")]
    ResolveTags(#[from] TagError),

    #[error("uploading document failed")]
    Submit(#[source] ClientError),

    #[error("waiting for document consumption")]
    Wait(#[source] ClientError),
}

impl UploadError {
    /// The failed task, if the run ended because the consumption task failed.
    pub fn task_error(&self) -> Option<&TaskError> {
        match self {
            Self::Wait(ClientError::Task(err)) => Some(err),
            _ => None,
        }
    }

    /// Whether the run was interrupted by its cancellation token.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Submit(ClientError::Cancelled)
                | Self::Wait(ClientError::Cancelled)
                | Self::ResolveTags(TagError::Lookup {
                    source: ClientError::Cancelled,
                    ..
                })
        )
    }
}

async fn until_cancelled<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, ClientError>
where
    F: Future<Output = Result<T, ClientError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ClientError::Cancelled),
        res = fut => res,
    }
}

/// Resolve tag names to identifiers, one lookup per name, preserving order.
pub async fn resolve_tags<C>(
    client: &C,
    names: &[String],
    cancel: &CancellationToken,
) -> Result<Vec<i64>, TagError>
where
    C: UploadClient + ?Sized,
{
    let mut ids = Vec::with_capacity(names.len());

    for name in names {
        let opts = ListTagsOptions {
            name_equals_ignoring_case: Some(name.clone()),
        };

        let items = until_cancelled(cancel, client.list_tags(opts))
            .await
            .map_err(|source| TagError::Lookup {
                name: name.clone(),
                source,
            })?;

        match items.as_slice() {
            [] => return Err(TagError::NotFound { name: name.clone() }),
            [tag] => {
                debug!(tag = %name, tag_id = tag.id, "Resolved tag");
                ids.push(tag.id);
            }
            _ => {
                return Err(TagError::Ambiguous {
                    name: name.clone(),
                    count: items.len(),
                })
            }
        }
    }

    Ok(ids)
}

/// Upload one document and, if requested, wait for it to be consumed.
#[tracing::instrument(name = "upload", skip_all, fields(path = %request.path.display()))]
pub async fn run<C>(
    request: &UploadRequest,
    client: &C,
    cancel: &CancellationToken,
) -> Result<UploadOutcome, UploadError>
where
    C: UploadClient + ?Sized,
{
    let file = File::open(&request.path)
        .await
        .map_err(|source| UploadError::Input {
            path: request.path.clone(),
            source,
        })?;

    let tags = resolve_tags(client, &request.tag_names, cancel).await?;

    let opts = DocumentUploadOptions {
        filename: request.effective_filename(),
        tags,
    };
    debug!(filename = %opts.filename, tags = ?opts.tags, "Submitting document");

    let upload = until_cancelled(cancel, client.upload_document(Box::new(file), opts))
        .await
        .map_err(UploadError::Submit)?;

    info!(task_id = %upload.task_id, "Document uploaded successfully");

    if !request.wait {
        return Ok(UploadOutcome::Submitted {
            task_id: upload.task_id,
        });
    }

    let wait_opts = WaitForTaskOptions {
        max_elapsed_time: request.wait_duration,
        cancel: cancel.clone(),
    };

    match client.wait_for_task(upload.task_id, wait_opts).await {
        Ok(task) => {
            info!(task = ?task, "Document consumed successfully");
            Ok(UploadOutcome::Consumed(task))
        }
        Err(ClientError::Task(err))
            if request.ignore_duplicate && is_suppressible_duplicate(&err) =>
        {
            error!(error = %err, "Document is a duplicate");
            Ok(UploadOutcome::DuplicateSuppressed(err))
        }
        Err(err) => Err(UploadError::Wait(err)),
    }
}
