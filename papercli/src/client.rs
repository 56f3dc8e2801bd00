#![doc = "Paperless-ngx HTTP client implementing the upload workflow's `UploadClient` contract."]
//
//! # Paperless client (CLI <-> Core)
//!
//! This module wires the [`UploadClient`] trait from `papercli-core` to the Paperless-ngx
//! REST API using `reqwest`:
//!
//! - `GET api/tags/?name__iexact=…` for tag lookup, following pagination
//! - `POST api/documents/post_document/` (multipart, streamed) for submission
//! - `GET api/tasks/?task_id=…`, polled with exponential backoff, for waiting
//!
//! Construct [`PaperlessClient`] from [`ClientSettings`] (see `load_config`).

use std::time::Duration;

use async_trait::async_trait;
use papercli_core::contract::{
    ClientError, DocumentContent, DocumentUpload, DocumentUploadOptions, ListTagsOptions, Tag,
    Task, TaskError, TaskStatus, UploadClient, WaitForTaskOptions,
};
use reqwest::multipart::{Form, Part};
use reqwest::{header, Body, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use crate::load_config::{Auth, ClientSettings};

/// Backoff between task status requests.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    pub initial_interval: Duration,
    pub multiplier: f64,
    pub max_interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            multiplier: 1.5,
            max_interval: Duration::from_secs(10),
        }
    }
}

impl PollPolicy {
    fn next_interval(&self, current: Duration) -> Duration {
        current.mul_f64(self.multiplier).min(self.max_interval)
    }
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default)]
    next: Option<String>,
    results: Vec<T>,
}

pub struct PaperlessClient {
    http: reqwest::Client,
    base_url: Url,
    auth: Auth,
    request_timeout: Duration,
    poll: PollPolicy,
}

fn transport(err: reqwest::Error) -> ClientError {
    ClientError::Transport(Box::new(err))
}

impl PaperlessClient {
    pub fn new(settings: ClientSettings) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .connect_timeout(settings.timeout)
            .user_agent(concat!("papercli/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(transport)?;

        info!(url = %settings.url, "Initialized Paperless client");

        Ok(Self {
            http,
            base_url: settings.url,
            auth: settings.auth,
            request_timeout: settings.timeout,
            poll: PollPolicy::default(),
        })
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(path)
            .map_err(|e| ClientError::Transport(Box::new(e)))
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder.header(header::ACCEPT, "application/json");
        match &self.auth {
            Auth::Token(token) => builder.header(header::AUTHORIZATION, format!("Token {token}")),
            Auth::Basic { username, password } => builder.basic_auth(username, Some(password)),
        }
    }

    async fn check(resp: Response) -> Result<Response, ClientError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let message = resp.text().await.unwrap_or_default();
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ClientError> {
        let resp = self
            .authorize(self.http.get(url))
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(transport)?;

        Self::check(resp)
            .await?
            .json::<T>()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn get_task(&self, task_id: &str) -> Result<Option<Task>, ClientError> {
        let mut url = self.endpoint("api/tasks/")?;
        url.query_pairs_mut().append_pair("task_id", task_id);

        let tasks: Vec<Task> = self.get_json(url).await?;
        Ok(tasks.into_iter().find(|task| task.task_id == task_id))
    }

    async fn poll_task(&self, task_id: &str) -> Result<Task, ClientError> {
        let mut interval = self.poll.initial_interval;

        loop {
            match self.get_task(task_id).await {
                Ok(Some(task)) => match task.status {
                    TaskStatus::Success => return Ok(task),
                    TaskStatus::Failure | TaskStatus::Revoked => {
                        return Err(TaskError::from(&task).into())
                    }
                    ref status => debug!(task_id, %status, "Task still in progress"),
                },
                Ok(None) => debug!(task_id, "Task not registered yet"),
                Err(e) if e.is_transient() => {
                    warn!(task_id, error = %e, "Transient error while polling task")
                }
                Err(e) => return Err(e),
            }

            tokio::time::sleep(interval).await;
            interval = self.poll.next_interval(interval);
        }
    }
}

#[async_trait]
impl UploadClient for PaperlessClient {
    async fn list_tags(&self, opts: ListTagsOptions) -> Result<Vec<Tag>, ClientError> {
        let mut url = self.endpoint("api/tags/")?;
        if let Some(name) = &opts.name_equals_ignoring_case {
            url.query_pairs_mut().append_pair("name__iexact", name);
        }

        let mut tags = Vec::new();
        let mut next = Some(url);

        while let Some(url) = next.take() {
            let page: Page<Tag> = self.get_json(url).await?;
            tags.extend(page.results);

            next = page
                .next
                .map(|raw| Url::parse(&raw))
                .transpose()
                .map_err(|e| ClientError::Decode(format!("invalid next page URL: {e}")))?;
        }

        debug!(filter = ?opts, count = tags.len(), "Listed tags");
        Ok(tags)
    }

    async fn upload_document(
        &self,
        content: DocumentContent,
        opts: DocumentUploadOptions,
    ) -> Result<DocumentUpload, ClientError> {
        let url = self.endpoint("api/documents/post_document/")?;

        info!(filename = %opts.filename, tags = ?opts.tags, "Uploading document");

        let document = Part::stream(Body::wrap_stream(ReaderStream::new(content)))
            .file_name(opts.filename.clone());

        let mut form = Form::new().part("document", document);
        for tag in &opts.tags {
            form = form.text("tags", tag.to_string());
        }

        // No total timeout: the body streams for as long as the file takes to send.
        let resp = self
            .authorize(self.http.post(url))
            .multipart(form)
            .send()
            .await
            .map_err(transport)?;

        let task_id = Self::check(resp)
            .await?
            .json::<String>()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))?;

        Ok(DocumentUpload { task_id })
    }

    async fn wait_for_task(
        &self,
        task_id: String,
        opts: WaitForTaskOptions,
    ) -> Result<Task, ClientError> {
        debug!(%task_id, max_elapsed_time = ?opts.max_elapsed_time, "Waiting for task");

        tokio::select! {
            biased;
            _ = opts.cancel.cancelled() => Err(ClientError::Cancelled),
            res = tokio::time::timeout(opts.max_elapsed_time, self.poll_task(&task_id)) => {
                match res {
                    Ok(res) => res,
                    Err(_) => Err(ClientError::Timeout {
                        task_id: task_id.clone(),
                        after: opts.max_elapsed_time,
                    }),
                }
            }
        }
    }
}
