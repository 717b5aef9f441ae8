// crates/jobs/src/manager.rs
//! The orchestration facade the panel talks to.
//!
//! Composes the bridge client and the poll scheduler. Holds no job table of
//! its own — the caller keeps whatever `Job` snapshots it cares about, the
//! scheduler keeps the transient registrations, and the bridge stays the
//! source of truth.

use std::sync::{Arc, RwLock};

use bytes::Bytes;
use tracing::{error, info, warn};

use forgeview_bridge::{BridgeClient, BridgeConfig, BridgeError};
use forgeview_types::{Job, JobStatus};

use crate::backoff::PollConfig;
use crate::scheduler::{ErrorHook, JobHook, PollHooks, PollScheduler};

/// Lifecycle hooks a caller registers with the manager.
///
/// All fields are optional; a partial set passed to
/// [`JobManager::set_callbacks`] replaces only the fields that are `Some`,
/// leaving the rest untouched, and takes effect for polling loops that are
/// already running.
#[derive(Clone, Default)]
pub struct JobCallbacks {
    /// A submission succeeded and the initial `pending` job exists.
    pub on_job_created: Option<JobHook>,
    /// A status fetch succeeded; carries the bridge's latest view.
    pub on_job_updated: Option<JobHook>,
    /// The job reached `completed`.
    pub on_job_completed: Option<JobHook>,
    /// The job reached a terminal state other than `completed`.
    pub on_job_failed: Option<JobHook>,
    /// A submission failed, polling gave up, or a download failed.
    pub on_error: Option<ErrorHook>,
}

/// Public-facing job orchestrator.
pub struct JobManager {
    client: BridgeClient,
    scheduler: Arc<PollScheduler>,
    callbacks: Arc<RwLock<JobCallbacks>>,
}

impl JobManager {
    pub fn new(bridge: &BridgeConfig, poll: PollConfig) -> Result<Self, BridgeError> {
        Ok(Self::with_client(BridgeClient::new(bridge)?, poll))
    }

    pub fn with_client(client: BridgeClient, poll: PollConfig) -> Self {
        let scheduler = Arc::new(PollScheduler::new(client.clone(), poll));
        Self {
            client,
            scheduler,
            callbacks: Arc::new(RwLock::new(JobCallbacks::default())),
        }
    }

    /// Replace the callbacks whose fields are `Some`; active polling loops
    /// pick the change up without re-registering.
    pub fn set_callbacks(&self, update: JobCallbacks) {
        match self.callbacks.write() {
            Ok(mut callbacks) => {
                if update.on_job_created.is_some() {
                    callbacks.on_job_created = update.on_job_created;
                }
                if update.on_job_updated.is_some() {
                    callbacks.on_job_updated = update.on_job_updated;
                }
                if update.on_job_completed.is_some() {
                    callbacks.on_job_completed = update.on_job_completed;
                }
                if update.on_job_failed.is_some() {
                    callbacks.on_job_failed = update.on_job_failed;
                }
                if update.on_error.is_some() {
                    callbacks.on_error = update.on_error;
                }
            }
            Err(e) => error!("RwLock poisoned replacing callbacks: {e}"),
        }
    }

    /// Submit a job and start tracking it.
    ///
    /// On success the returned `Job` is the initial `pending` record (the
    /// same one `on_job_created` saw) and a polling loop is running for it.
    /// On submission failure `on_error` fires, `None` is returned, and no
    /// polling is ever started.
    pub async fn start_job(&self, job_type: &str, parameters: serde_json::Value) -> Option<Job> {
        self.start_job_in_session(job_type, parameters, None).await
    }

    /// [`Self::start_job`], tagged with the originating panel session.
    pub async fn start_job_in_session(
        &self,
        job_type: &str,
        parameters: serde_json::Value,
        session_id: Option<&str>,
    ) -> Option<Job> {
        let job_id = match self
            .client
            .start_job(job_type, &parameters, session_id)
            .await
        {
            Ok(job_id) => job_id,
            Err(err) => {
                warn!(%job_type, "job submission failed: {err}");
                self.emit_error(&format!("failed to start {job_type} job: {err}"));
                return None;
            }
        };

        info!(%job_id, %job_type, "job submitted");
        let mut job = Job::pending(&job_id, job_type, parameters);
        if let Some(session) = session_id {
            job = job.with_session(session);
        }

        if let Some(hook) = self.hook(|callbacks| callbacks.on_job_created.clone()) {
            hook(&job);
        }
        self.scheduler.start_polling(&job_id, self.poll_hooks());
        Some(job)
    }

    /// Attach a polling loop to a job id that already exists on the bridge,
    /// e.g. to re-synchronize after a panel reload.
    pub fn watch_job(&self, job_id: &str) {
        self.scheduler.start_polling(job_id, self.poll_hooks());
    }

    /// Stop tracking the job locally and ask the bridge to cancel it.
    ///
    /// Local polling stops unconditionally — bookkeeping must not depend on
    /// the bridge's acknowledgement, or a rejected cancel would leak a
    /// timer. The return value reports whether the bridge confirmed.
    pub async fn cancel_job(&self, job_id: &str) -> bool {
        self.scheduler.stop_polling(job_id);
        match self.client.cancel_job(job_id).await {
            Ok(confirmed) => {
                if confirmed {
                    info!(%job_id, "job cancelled");
                } else {
                    warn!(%job_id, "bridge declined cancellation; local polling stopped anyway");
                }
                confirmed
            }
            Err(err) => {
                warn!(%job_id, "cancel request failed: {err}");
                false
            }
        }
    }

    /// One-shot status check, independent of any active polling loop.
    pub async fn get_job_status(&self, job_id: &str) -> Option<Job> {
        match self.scheduler.check_job_status(job_id).await {
            Ok(job) => Some(job),
            Err(err) => {
                warn!(%job_id, "manual status check failed: {err}");
                None
            }
        }
    }

    /// Download reference of a completed job; `None` for any other state.
    pub fn result_url<'a>(&self, job: &'a Job) -> Option<&'a str> {
        job.download_url()
    }

    /// Fetch the completed job's result payload. `None` (never a panic) for
    /// a job in the wrong state or without a download reference.
    pub async fn download_result(&self, job: &Job) -> Option<Bytes> {
        let url = job.download_url()?;
        match self.client.download(url).await {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                warn!(job_id = %job.job_id, "result download failed: {err}");
                self.emit_error(&format!(
                    "failed to download result for job {}: {err}",
                    job.job_id
                ));
                None
            }
        }
    }

    pub fn is_polling(&self, job_id: &str) -> bool {
        self.scheduler.is_polling(job_id)
    }

    pub fn active_poll_count(&self) -> usize {
        self.scheduler.active_poll_count()
    }

    /// Direct access to the scheduler, mostly for introspection in tests.
    pub fn scheduler(&self) -> &Arc<PollScheduler> {
        &self.scheduler
    }

    /// Stop every polling loop and refuse new ones.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }

    /// Wire the scheduler's three hooks to this manager's callback set.
    /// Hooks read the callbacks at fire time, so `set_callbacks` applies to
    /// loops that are already running.
    fn poll_hooks(&self) -> PollHooks {
        let on_update: JobHook = {
            let callbacks = Arc::clone(&self.callbacks);
            Arc::new(move |job: &Job| {
                if let Some(hook) = read_hook(&callbacks, |c| c.on_job_updated.clone()) {
                    hook(job);
                }
            })
        };

        let on_complete: JobHook = {
            let callbacks = Arc::clone(&self.callbacks);
            Arc::new(move |job: &Job| {
                let hook = if job.status == JobStatus::Completed {
                    read_hook(&callbacks, |c| c.on_job_completed.clone())
                } else {
                    read_hook(&callbacks, |c| c.on_job_failed.clone())
                };
                if let Some(hook) = hook {
                    hook(job);
                }
            })
        };

        let on_error: ErrorHook = {
            let callbacks = Arc::clone(&self.callbacks);
            Arc::new(move |message: &str| {
                if let Some(hook) = read_hook(&callbacks, |c| c.on_error.clone()) {
                    hook(message);
                }
            })
        };

        PollHooks {
            on_update,
            on_complete,
            on_error,
        }
    }

    fn hook<T>(&self, pick: impl Fn(&JobCallbacks) -> Option<T>) -> Option<T> {
        read_hook(&self.callbacks, pick)
    }

    fn emit_error(&self, message: &str) {
        if let Some(hook) = self.hook(|callbacks| callbacks.on_error.clone()) {
            hook(message);
        }
    }
}

fn read_hook<T>(
    callbacks: &RwLock<JobCallbacks>,
    pick: impl Fn(&JobCallbacks) -> Option<T>,
) -> Option<T> {
    match callbacks.read() {
        Ok(callbacks) => pick(&callbacks),
        Err(e) => {
            error!("RwLock poisoned reading callbacks: {e}");
            None
        }
    }
}
