use std::io::{ErrorKind, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use papercli_core::contract::{
    ClientError, DocumentUpload, MockUploadClient, Tag, Task, TaskError, TaskStatus,
};
use papercli_core::upload::{run, resolve_tags, TagError, UploadError, UploadOutcome, UploadRequest};
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::{Layer, Registry};

const DUPLICATE_MESSAGE: &str =
    "Not consuming xyz.pdf: It is a duplicate of Name of another document (#1234)";

fn input_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Creating temp input file failed");
    file.write_all(b"%PDF-1.4 test").expect("Writing temp input failed");
    file
}

fn tag(id: i64, name: &str) -> Tag {
    Tag {
        id,
        name: name.to_string(),
    }
}

fn finished_task() -> Task {
    Task {
        id: 1,
        task_id: "wait-for-task-result".to_string(),
        task_file_name: Some("input.pdf".to_string()),
        status: TaskStatus::Success,
        message: Some("Success. New document id 12 created".to_string()),
        date_created: None,
        date_done: None,
    }
}

fn failed_task(message: &str) -> ClientError {
    ClientError::Task(TaskError {
        task_id: "upload-document-result".to_string(),
        status: TaskStatus::Failure,
        message: message.to_string(),
    })
}

/// Mock that accepts any upload and answers `wait_for_task` with the given result.
fn client_with_wait<F>(wait: F) -> MockUploadClient
where
    F: FnMut(String, papercli_core::contract::WaitForTaskOptions) -> Result<Task, ClientError>
        + Send
        + 'static,
{
    let mut client = MockUploadClient::new();
    client.expect_upload_document().times(1).returning(|_, _| {
        Ok(DocumentUpload {
            task_id: "upload-document-result".to_string(),
        })
    });
    client.expect_wait_for_task().times(1).returning(wait);
    client
}

#[tokio::test]
async fn missing_file_is_not_found_and_contacts_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut request = UploadRequest::new(dir.path().join("missing"));
    request.tag_names = vec!["inbox".to_string()];

    // No expectations: any call on the mock panics.
    let client = MockUploadClient::new();

    let err = run(&request, &client, &CancellationToken::new())
        .await
        .expect_err("missing input must fail");

    match err {
        UploadError::Input { source, .. } => assert_eq!(source.kind(), ErrorKind::NotFound),
        other => panic!("expected input error, got {other:?}"),
    }
}

#[tokio::test]
async fn upload_and_wait_succeeds() {
    let input = input_file();
    let request = UploadRequest::new(input.path());

    let mut client = MockUploadClient::new();
    client.expect_list_tags().never();
    client.expect_upload_document().times(1).returning(|_, _| {
        Ok(DocumentUpload {
            task_id: "upload-document-result".to_string(),
        })
    });
    client
        .expect_wait_for_task()
        .withf(|task_id, opts| {
            task_id == "upload-document-result"
                && opts.max_elapsed_time == Duration::from_secs(3600)
        })
        .times(1)
        .returning(|_, _| Ok(finished_task()));

    let outcome = run(&request, &client, &CancellationToken::new())
        .await
        .expect("upload should succeed");

    assert_eq!(outcome, UploadOutcome::Consumed(finished_task()));
}

#[tokio::test]
async fn filename_defaults_to_base_name() {
    let input = input_file();
    let expected = input
        .path()
        .file_name()
        .unwrap()
        .to_string_lossy()
        .into_owned();
    let mut request = UploadRequest::new(input.path());
    request.wait = false;

    let mut client = MockUploadClient::new();
    client
        .expect_upload_document()
        .withf(move |_, opts| opts.filename == expected && opts.tags.is_empty())
        .times(1)
        .returning(|_, _| {
            Ok(DocumentUpload {
                task_id: "t".to_string(),
            })
        });

    run(&request, &client, &CancellationToken::new())
        .await
        .expect("upload should succeed");
}

#[tokio::test]
async fn filename_override_wins() {
    let input = input_file();
    let mut request = UploadRequest::new(input.path());
    request.filename = Some("Invoice March.pdf".to_string());
    request.wait = false;

    let mut client = MockUploadClient::new();
    client
        .expect_upload_document()
        .withf(|_, opts| opts.filename == "Invoice March.pdf")
        .times(1)
        .returning(|_, _| {
            Ok(DocumentUpload {
                task_id: "t".to_string(),
            })
        });

    run(&request, &client, &CancellationToken::new())
        .await
        .expect("upload should succeed");
}

#[tokio::test]
async fn tags_resolve_in_request_order() {
    let input = input_file();
    let mut request = UploadRequest::new(input.path());
    request.tag_names = vec!["inbox".into(), "Finance".into(), "INBOX".into()];
    request.wait = false;

    let mut client = MockUploadClient::new();
    client.expect_list_tags().times(3).returning(|opts| {
        let name = opts.name_equals_ignoring_case.unwrap_or_default();
        match name.to_lowercase().as_str() {
            "inbox" => Ok(vec![tag(7, "Inbox")]),
            "finance" => Ok(vec![tag(2, "finance")]),
            other => panic!("unexpected lookup for {other}"),
        }
    });
    client
        .expect_upload_document()
        .withf(|_, opts| opts.tags == vec![7, 2, 7])
        .times(1)
        .returning(|_, _| {
            Ok(DocumentUpload {
                task_id: "t".to_string(),
            })
        });

    let outcome = run(&request, &client, &CancellationToken::new())
        .await
        .expect("upload should succeed");

    assert_eq!(
        outcome,
        UploadOutcome::Submitted {
            task_id: "t".to_string()
        }
    );
}

#[tokio::test]
async fn unknown_tag_aborts_before_submission() {
    let input = input_file();
    let mut request = UploadRequest::new(input.path());
    request.tag_names = vec!["a".into()];

    let mut client = MockUploadClient::new();
    client.expect_list_tags().times(1).returning(|_| Ok(vec![]));
    client.expect_upload_document().never();
    client.expect_wait_for_task().never();

    let err = run(&request, &client, &CancellationToken::new())
        .await
        .expect_err("unknown tag must fail");

    assert!(
        matches!(err, UploadError::ResolveTags(TagError::NotFound { ref name }) if name == "a"),
        "unexpected error: {err:?}"
    );
}

#[tokio::test]
async fn ambiguous_tag_aborts_before_submission() {
    let input = input_file();
    let mut request = UploadRequest::new(input.path());
    request.tag_names = vec!["tax".into()];

    let mut client = MockUploadClient::new();
    client
        .expect_list_tags()
        .times(1)
        .returning(|_| Ok(vec![tag(1, "Tax"), tag(2, "tax")]));
    client.expect_upload_document().never();

    let err = run(&request, &client, &CancellationToken::new())
        .await
        .expect_err("ambiguous tag must fail");

    assert!(
        matches!(err, UploadError::ResolveTags(TagError::Ambiguous { count: 2, .. })),
        "unexpected error: {err:?}"
    );
    let source = std::error::Error::source(&err).expect("tag error is the source");
    assert_eq!(
        source.to_string(),
        "tag \"tax\": received 2 items, expected exactly one"
    );
}

#[tokio::test]
async fn tag_lookup_error_stops_remaining_lookups() {
    let names = vec!["a".to_string(), "b".to_string()];

    let mut client = MockUploadClient::new();
    client.expect_list_tags().times(1).returning(|_| {
        Err(ClientError::Api {
            status: 500,
            message: "test error".to_string(),
        })
    });

    let err = resolve_tags(&client, &names, &CancellationToken::new())
        .await
        .expect_err("lookup error must fail");

    match err {
        TagError::Lookup { name, source } => {
            assert_eq!(name, "a");
            assert!(matches!(source, ClientError::Api { status: 500, .. }));
        }
        other => panic!("expected lookup error, got {other:?}"),
    }
}

#[tokio::test]
async fn wait_disabled_never_consults_wait() {
    let input = input_file();
    let mut request = UploadRequest::new(input.path());
    request.wait = false;

    let mut client = MockUploadClient::new();
    client.expect_upload_document().times(1).returning(|_, _| {
        Ok(DocumentUpload {
            task_id: "upload-document-result".to_string(),
        })
    });
    client.expect_wait_for_task().never();

    let outcome = run(&request, &client, &CancellationToken::new())
        .await
        .expect("upload should succeed");

    assert_eq!(
        outcome,
        UploadOutcome::Submitted {
            task_id: "upload-document-result".to_string()
        }
    );
}

#[tokio::test]
async fn upload_error_is_wrapped_and_skips_wait() {
    let input = input_file();
    let request = UploadRequest::new(input.path());

    let mut client = MockUploadClient::new();
    client.expect_upload_document().times(1).returning(|_, _| {
        Err(ClientError::Api {
            status: 400,
            message: "bad request".to_string(),
        })
    });
    client.expect_wait_for_task().never();

    let err = run(&request, &client, &CancellationToken::new())
        .await
        .expect_err("upload error must fail");

    assert!(matches!(err, UploadError::Submit(ClientError::Api { status: 400, .. })));
}

#[tokio::test]
async fn wait_error_propagates() {
    let input = input_file();
    let request = UploadRequest::new(input.path());

    let client = client_with_wait(|task_id, opts| {
        Err(ClientError::Timeout {
            task_id,
            after: opts.max_elapsed_time,
        })
    });

    let err = run(&request, &client, &CancellationToken::new())
        .await
        .expect_err("wait error must fail");

    assert!(matches!(err, UploadError::Wait(ClientError::Timeout { .. })));
    assert!(err.task_error().is_none());
}

#[tokio::test]
async fn duplicate_is_suppressed() {
    for message in [DUPLICATE_MESSAGE.to_string(), format!("{DUPLICATE_MESSAGE}.")] {
        let input = input_file();
        let request = UploadRequest::new(input.path());

        let returned = message.clone();
        let client = client_with_wait(move |_, _| Err(failed_task(&returned)));

        let outcome = run(&request, &client, &CancellationToken::new())
            .await
            .expect("duplicate should be suppressed");

        match outcome {
            UploadOutcome::DuplicateSuppressed(err) => assert_eq!(err.message, message),
            other => panic!("expected suppressed duplicate, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn duplicate_in_trash_still_fails() {
    let input = input_file();
    let request = UploadRequest::new(input.path());
    let message = format!("{DUPLICATE_MESSAGE}. Note: existing document is in the trash.");

    let returned = message.clone();
    let client = client_with_wait(move |_, _| Err(failed_task(&returned)));

    let err = run(&request, &client, &CancellationToken::new())
        .await
        .expect_err("duplicate in trash must fail");

    let task_err = err.task_error().expect("task error is preserved");
    assert_eq!(task_err.status, TaskStatus::Failure);
    assert_eq!(task_err.message, message);
}

#[tokio::test]
async fn duplicate_fails_when_not_ignored() {
    let input = input_file();
    let mut request = UploadRequest::new(input.path());
    request.ignore_duplicate = false;

    let client = client_with_wait(|_, _| Err(failed_task(DUPLICATE_MESSAGE)));

    let err = run(&request, &client, &CancellationToken::new())
        .await
        .expect_err("duplicate must fail when not ignored");

    assert_eq!(
        err.task_error().map(|e| e.message.as_str()),
        Some(DUPLICATE_MESSAGE)
    );
}

#[tokio::test]
async fn cancellation_token_reaches_wait() {
    let input = input_file();
    let request = UploadRequest::new(input.path());
    let cancel = CancellationToken::new();

    let probe = cancel.clone();
    let client = client_with_wait(move |_, opts| {
        // Shutdown arrives while the document is being consumed.
        probe.cancel();
        if opts.cancel.is_cancelled() {
            Err(ClientError::Cancelled)
        } else {
            Ok(finished_task())
        }
    });

    let err = run(&request, &client, &cancel)
        .await
        .expect_err("cancelled run must fail");

    assert!(matches!(err, UploadError::Wait(ClientError::Cancelled)));
    assert!(err.is_cancelled());
}

#[tokio::test]
async fn cancelled_run_does_not_submit() {
    let input = input_file();
    let mut request = UploadRequest::new(input.path());
    request.tag_names = vec!["inbox".into()];
    let cancel = CancellationToken::new();
    cancel.cancel();

    let mut client = MockUploadClient::new();
    client
        .expect_list_tags()
        .times(0..=1)
        .returning(|_| Ok(vec![tag(7, "Inbox")]));
    client.expect_upload_document().never();
    client.expect_wait_for_task().never();

    let err = run(&request, &client, &cancel)
        .await
        .expect_err("cancelled run must fail");

    assert!(err.is_cancelled(), "unexpected error: {err:?}");
}

/// Collects emitted events together with their level.
struct EventCollector {
    events: Arc<Mutex<Vec<(Level, String)>>>,
}

impl<S> Layer<S> for EventCollector
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let msg = format!("{:?}", event);
        self.events
            .lock()
            .unwrap()
            .push((*event.metadata().level(), msg));
    }
}

#[tokio::test]
async fn suppressed_duplicate_is_logged_as_error() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let collector = EventCollector {
        events: events.clone(),
    };
    let subscriber = Registry::default().with(collector);
    let _guard = tracing::subscriber::set_default(subscriber);

    let input = input_file();
    let request = UploadRequest::new(input.path());
    let client = client_with_wait(|_, _| Err(failed_task(DUPLICATE_MESSAGE)));

    run(&request, &client, &CancellationToken::new())
        .await
        .expect("duplicate should be suppressed");

    let events = events.lock().unwrap();
    assert!(
        events.iter().any(|(level, msg)| {
            *level == Level::INFO && msg.contains("Document uploaded successfully")
        }),
        "Expected an upload event, got: {:?}",
        events
    );
    assert!(
        events
            .iter()
            .any(|(level, msg)| *level == Level::ERROR
                && msg.contains("Document is a duplicate")
                && msg.contains("#1234")),
        "Expected a duplicate error event, got: {:?}",
        events
    );
}
