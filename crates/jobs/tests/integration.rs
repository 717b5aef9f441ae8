// crates/jobs/tests/integration.rs
//! End-to-end polling behavior against a stubbed bridge.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pretty_assertions::assert_eq;

use forgeview_bridge::{BridgeClient, BridgeConfig};
use forgeview_jobs::{JobCallbacks, JobManager, PollConfig, PollHooks, PollScheduler};
use forgeview_types::JobStatus;

/// Tight timing for tests: first check immediate, then a few ms apart.
fn fast_poll(max_retries: u32) -> PollConfig {
    PollConfig {
        base_delay: Duration::from_millis(10),
        backoff_multiplier: 1.2,
        max_delay: Duration::from_millis(40),
        max_retries,
    }
}

fn client_for(server: &mockito::Server) -> BridgeClient {
    BridgeClient::new(&BridgeConfig {
        base_url: server.url(),
        request_timeout: Duration::from_secs(5),
    })
    .unwrap()
}

/// Collects callback firings in order, for sequence assertions.
#[derive(Clone, Default)]
struct Recorder {
    events: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    fn push(&self, event: impl Into<String>) {
        self.events.lock().unwrap().push(event.into());
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn hooks(&self) -> PollHooks {
        let updates = self.clone();
        let completions = self.clone();
        let errors = self.clone();
        PollHooks {
            on_update: Arc::new(move |job| {
                match job.progress {
                    Some(progress) => updates.push(format!("update:{}({progress})", job.status)),
                    None => updates.push(format!("update:{}", job.status)),
                }
            }),
            on_complete: Arc::new(move |job| {
                completions.push(format!("complete:{}", job.status));
            }),
            on_error: Arc::new(move |message| {
                errors.push(format!("error:{message}"));
            }),
        }
    }

    fn callbacks(&self) -> JobCallbacks {
        let created = self.clone();
        let updated = self.clone();
        let completed = self.clone();
        let failed = self.clone();
        let errors = self.clone();
        JobCallbacks {
            on_job_created: Some(Arc::new(move |job| {
                created.push(format!("created:{}", job.status));
            })),
            on_job_updated: Some(Arc::new(move |job| {
                match job.progress {
                    Some(progress) => updated.push(format!("updated:{}({progress})", job.status)),
                    None => updated.push(format!("updated:{}", job.status)),
                }
            })),
            on_job_completed: Some(Arc::new(move |job| {
                let filename = job
                    .result
                    .as_ref()
                    .and_then(|result| result.filename.as_deref())
                    .unwrap_or("-");
                completed.push(format!("completed:{filename}"));
            })),
            on_job_failed: Some(Arc::new(move |job| {
                failed.push(format!(
                    "failed:{}",
                    job.error.as_deref().unwrap_or("no error reported")
                ));
            })),
            on_error: Some(Arc::new(move |message| {
                errors.push(format!("error:{message}"));
            })),
        }
    }
}

fn status_body(job_id: &str, status: &str, progress: Option<u8>, result: Option<&str>) -> String {
    let mut job = serde_json::json!({
        "job_id": job_id,
        "job_type": "screenshot",
        "status": status,
        "created_at": "2026-08-01T10:00:00Z",
        "updated_at": "2026-08-01T10:00:01Z",
    });
    if let Some(progress) = progress {
        job["progress"] = progress.into();
    }
    if let Some(filename) = result {
        job["result"] = serde_json::json!({
            "filename": filename,
            "download_url": format!("/files/{filename}"),
        });
    }
    serde_json::json!({"success": true, "job": job}).to_string()
}

#[tokio::test]
async fn terminal_on_first_check_fires_once_and_deregisters() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/jobs/status/job-1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(status_body("job-1", "completed", None, Some("shot.png")))
        .create_async()
        .await;

    let scheduler = Arc::new(PollScheduler::new(client_for(&server), fast_poll(30)));
    let recorder = Recorder::default();
    scheduler.start_polling("job-1", recorder.hooks());

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(
        recorder.events(),
        vec!["update:completed".to_string(), "complete:completed".to_string()]
    );
    assert!(!scheduler.is_polling("job-1"));
    assert_eq!(scheduler.active_poll_count(), 0);
}

#[tokio::test]
async fn manager_drives_job_from_pending_to_completed() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/jobs/start")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"success": true, "job_id": "job-1"}"#)
        .create_async()
        .await;

    // First check sees the job mid-render, every later one sees it done.
    let checks = Arc::new(AtomicUsize::new(0));
    let _status_mock = server
        .mock("GET", "/jobs/status/job-1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body_from_request(move |_| {
            if checks.fetch_add(1, Ordering::SeqCst) == 0 {
                status_body("job-1", "processing", Some(40), None).into_bytes()
            } else {
                status_body("job-1", "completed", None, Some("a.png")).into_bytes()
            }
        })
        .expect_at_least(2)
        .create_async()
        .await;

    let manager = JobManager::with_client(client_for(&server), fast_poll(30));
    let recorder = Recorder::default();
    manager.set_callbacks(recorder.callbacks());

    let job = manager
        .start_job("screenshot", serde_json::json!({}))
        .await
        .expect("submission should succeed");
    assert_eq!(job.job_id, "job-1");
    assert_eq!(job.status, JobStatus::Pending);

    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(
        recorder.events(),
        vec![
            "created:pending".to_string(),
            "updated:processing(40)".to_string(),
            "updated:completed".to_string(),
            "completed:a.png".to_string(),
        ]
    );
    assert_eq!(manager.active_poll_count(), 0);
}

#[tokio::test]
async fn backend_reported_failure_routes_to_on_job_failed() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/jobs/start")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"success": true, "job_id": "job-9"}"#)
        .create_async()
        .await;
    let _status_mock = server
        .mock("GET", "/jobs/status/job-9")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            serde_json::json!({
                "success": true,
                "job": {
                    "job_id": "job-9",
                    "job_type": "screenshot",
                    "status": "failed",
                    "error": "viewport not available",
                    "created_at": "2026-08-01T10:00:00Z",
                    "updated_at": "2026-08-01T10:00:01Z",
                }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let manager = JobManager::with_client(client_for(&server), fast_poll(30));
    let recorder = Recorder::default();
    manager.set_callbacks(recorder.callbacks());

    manager
        .start_job("screenshot", serde_json::json!({}))
        .await
        .expect("submission should succeed");

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(
        recorder.events(),
        vec![
            "created:pending".to_string(),
            "updated:failed".to_string(),
            "failed:viewport not available".to_string(),
        ]
    );
    assert_eq!(manager.active_poll_count(), 0);
}

#[tokio::test]
async fn transport_failures_exhaust_retries_with_single_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/jobs/status/job-1")
        .with_status(502)
        .expect_at_least(3)
        .create_async()
        .await;

    let scheduler = Arc::new(PollScheduler::new(client_for(&server), fast_poll(3)));
    let recorder = Recorder::default();
    scheduler.start_polling("job-1", recorder.hooks());

    tokio::time::sleep(Duration::from_millis(500)).await;

    let events = recorder.events();
    assert_eq!(events.len(), 1, "retry noise must not leak: {events:?}");
    assert!(events[0].starts_with("error:"));
    assert!(events[0].contains("exceeded maximum retries (3)"));
    assert_eq!(scheduler.active_poll_count(), 0);
}

#[tokio::test]
async fn backend_error_payload_retries_until_exhaustion() {
    let mut server = mockito::Server::new_async().await;
    // Well-formed payload reporting failure in-band: retried like a
    // transport failure, surfaced only once the budget is spent.
    let _mock = server
        .mock("GET", "/jobs/status/job-1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"success": false, "error": "scene not loaded"}"#)
        .expect_at_least(2)
        .create_async()
        .await;

    let scheduler = Arc::new(PollScheduler::new(client_for(&server), fast_poll(2)));
    let recorder = Recorder::default();
    scheduler.start_polling("job-1", recorder.hooks());

    tokio::time::sleep(Duration::from_millis(300)).await;

    let events = recorder.events();
    assert_eq!(events.len(), 1);
    assert!(events[0].contains("exceeded maximum retries (2)"));
}

#[tokio::test]
async fn restart_replaces_registration_without_duplicating() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/jobs/status/job-1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(status_body("job-1", "processing", Some(10), None))
        .create_async()
        .await;

    let scheduler = Arc::new(PollScheduler::new(client_for(&server), fast_poll(30)));
    let recorder = Recorder::default();
    scheduler.start_polling("job-1", recorder.hooks());
    scheduler.start_polling("job-1", recorder.hooks());

    assert_eq!(scheduler.active_poll_count(), 1);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(scheduler.active_poll_count(), 1);

    scheduler.stop_polling("job-1");
    assert_eq!(scheduler.active_poll_count(), 0);
}

#[tokio::test]
async fn cancel_while_fetch_in_flight_discards_the_result() {
    let mut server = mockito::Server::new_async().await;
    // The status endpoint stalls long enough for the cancel to land first.
    let _mock = server
        .mock("GET", "/jobs/status/job-1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body_from_request(move |_| {
            std::thread::sleep(Duration::from_millis(200));
            status_body("job-1", "completed", None, Some("late.png")).into_bytes()
        })
        .create_async()
        .await;
    let _cancel_mock = server
        .mock("POST", "/jobs/cancel/job-1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"success": true}"#)
        .create_async()
        .await;

    let manager = JobManager::with_client(client_for(&server), fast_poll(30));
    let recorder = Recorder::default();
    manager.set_callbacks(recorder.callbacks());
    manager.watch_job("job-1");

    // Let the first fetch get in flight, then cancel underneath it.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(manager.is_polling("job-1"));
    assert!(manager.cancel_job("job-1").await);

    tokio::time::sleep(Duration::from_millis(400)).await;

    // The late fetch result must neither fire callbacks nor reschedule.
    assert_eq!(recorder.events(), Vec::<String>::new());
    assert!(!manager.is_polling("job-1"));
    assert_eq!(manager.active_poll_count(), 0);
}

#[tokio::test]
async fn submission_failure_reports_error_and_never_polls() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/jobs/start")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"success": false, "error": "engine busy"}"#)
        .create_async()
        .await;

    let manager = JobManager::with_client(client_for(&server), fast_poll(30));
    let recorder = Recorder::default();
    manager.set_callbacks(recorder.callbacks());

    let job = manager.start_job("screenshot", serde_json::json!({})).await;
    assert!(job.is_none());

    tokio::time::sleep(Duration::from_millis(100)).await;

    let events = recorder.events();
    assert_eq!(events.len(), 1);
    assert!(events[0].starts_with("error:"));
    assert!(events[0].contains("engine busy"));
    assert_eq!(manager.active_poll_count(), 0);
}

#[tokio::test]
async fn manual_check_leaves_active_polling_untouched() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/jobs/status/job-1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(status_body("job-1", "processing", Some(25), None))
        .create_async()
        .await;

    let manager = JobManager::with_client(client_for(&server), fast_poll(30));
    manager.watch_job("job-1");
    assert_eq!(manager.active_poll_count(), 1);

    let job = manager.get_job_status("job-1").await.expect("status fetch");
    assert_eq!(job.status, JobStatus::Processing);
    assert_eq!(job.progress, Some(25));

    // The one-shot check must not have registered or torn anything down.
    assert_eq!(manager.active_poll_count(), 1);
    manager.shutdown();
}

#[tokio::test]
async fn download_result_fetches_completed_payload() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/jobs/status/job-1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(status_body("job-1", "completed", None, Some("shot.png")))
        .create_async()
        .await;
    let _file_mock = server
        .mock("GET", "/files/shot.png")
        .with_status(200)
        .with_body(b"fake png bytes".as_slice())
        .create_async()
        .await;

    let manager = JobManager::with_client(client_for(&server), fast_poll(30));
    let job = manager.get_job_status("job-1").await.expect("status fetch");

    assert_eq!(manager.result_url(&job), Some("/files/shot.png"));
    let bytes = manager.download_result(&job).await.expect("download");
    assert_eq!(&bytes[..], b"fake png bytes");
}
