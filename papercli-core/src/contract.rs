//! # contract: capabilities consumed by the upload workflow
//!
//! This module defines a single trait ([`UploadClient`]) and the plain data types it
//! exchanges with a Paperless-ngx style document service: tag lookup, document
//! submission and waiting for the asynchronous consumption task.
//!
//! ## Interface & Extensibility
//! - Implement [`UploadClient`] to talk to a concrete backend (the CLI crate ships a
//!   `reqwest` based one).
//! - All methods are async and return [`ClientError`].
//! - Authentication, pagination, polling intervals and transport retries are the
//!   implementor's business; the workflow never retries.
//!
//! ## Mocking & Testing
//! - The trait is annotated for `mockall`; `MockUploadClient` is exported with the
//!   `test-export-mocks` feature.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

/// A tag as returned by the service. Only `id` and `name` are consumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

/// Filter for [`UploadClient::list_tags`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListTagsOptions {
    /// Match tags whose name equals this value, ignoring case.
    pub name_equals_ignoring_case: Option<String>,
}

/// Readable document body handed to [`UploadClient::upload_document`].
pub type DocumentContent = Box<dyn AsyncRead + Send + Sync + Unpin>;

/// Metadata sent along with an uploaded document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentUploadOptions {
    /// File name reported to the service.
    pub filename: String,
    /// Identifiers of pre-existing tags to apply.
    pub tags: Vec<i64>,
}

/// Result of a successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentUpload {
    /// Identifier of the consumption task started by the upload.
    pub task_id: String,
}

/// Status of an asynchronous server-side task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Started,
    Retry,
    Success,
    Failure,
    Revoked,
    #[serde(other)]
    Unknown,
}

impl TaskStatus {
    /// Whether the task will not change state anymore.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure | Self::Revoked)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Started => "STARTED",
            Self::Retry => "RETRY",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::Revoked => "REVOKED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a task as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub task_id: String,
    #[serde(default)]
    pub task_file_name: Option<String>,
    pub status: TaskStatus,
    /// Human-readable outcome; the service calls this field `result`.
    #[serde(default, rename = "result")]
    pub message: Option<String>,
    #[serde(default)]
    pub date_created: Option<String>,
    #[serde(default)]
    pub date_done: Option<String>,
}

/// A task reached a failed terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("task {task_id} finished with status {status}: {message}")]
pub struct TaskError {
    pub task_id: String,
    pub status: TaskStatus,
    pub message: String,
}

impl From<&Task> for TaskError {
    fn from(task: &Task) -> Self {
        TaskError {
            task_id: task.task_id.clone(),
            status: task.status.clone(),
            message: task.message.clone().unwrap_or_default(),
        }
    }
}

/// Bounds for [`UploadClient::wait_for_task`].
#[derive(Debug, Clone)]
pub struct WaitForTaskOptions {
    /// Give up with [`ClientError::Timeout`] once this much time has passed.
    pub max_elapsed_time: Duration,
    /// Return [`ClientError::Cancelled`] as soon as this token is cancelled.
    pub cancel: CancellationToken,
}

/// Errors surfaced by an [`UploadClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Task(#[from] TaskError),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("transport error")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("decoding response failed: {0}")]
    Decode(String),

    #[error("task {task_id} did not finish within {after:?}")]
    Timeout { task_id: String, after: Duration },

    #[error("operation cancelled")]
    Cancelled,
}

impl ClientError {
    /// Errors worth retrying while polling: transport failures, throttling and 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Capabilities the upload workflow needs from the document service.
///
/// The trait is implemented by the real HTTP client and by test mocks.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait UploadClient: Send + Sync {
    /// List tags matching the given filter.
    async fn list_tags(&self, opts: ListTagsOptions) -> Result<Vec<Tag>, ClientError>;

    /// Submit a document for consumption and return the id of the started task.
    async fn upload_document(
        &self,
        content: DocumentContent,
        opts: DocumentUploadOptions,
    ) -> Result<DocumentUpload, ClientError>;

    /// Suspend until the task reaches a terminal state.
    ///
    /// A failed task is reported as [`ClientError::Task`]. Implementors must honour both
    /// bounds in `opts`.
    async fn wait_for_task(
        &self,
        task_id: String,
        opts: WaitForTaskOptions,
    ) -> Result<Task, ClientError>;
}
