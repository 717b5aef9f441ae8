// crates/jobs/src/scheduler.rs
//! Per-job polling loops over the bridge status endpoint.
//!
//! One registration per tracked job id, held in a single table owned by the
//! scheduler; one cancellable tokio task per registration. Tasks never touch
//! each other's state, and every task re-checks its own registration (by id
//! and generation) after each await so a result that arrives after
//! `stop_polling` is silently discarded instead of reviving the loop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use forgeview_bridge::{BridgeClient, BridgeError};
use forgeview_types::Job;

use crate::backoff::PollConfig;

/// Callback invoked with the latest view of a job.
pub type JobHook = Arc<dyn Fn(&Job) + Send + Sync>;
/// Callback invoked with a human-readable give-up message.
pub type ErrorHook = Arc<dyn Fn(&str) + Send + Sync>;

/// The three callbacks supplied when a job is registered for polling.
///
/// `on_update` fires on every successful status fetch. `on_complete` fires
/// exactly once, when the job reaches a terminal state — the callback tells
/// success from failure by inspecting `job.status`. `on_error` fires exactly
/// once if the scheduler gives up after exhausting its retry budget; a job
/// never produces both `on_complete` and `on_error`.
#[derive(Clone)]
pub struct PollHooks {
    pub on_update: JobHook,
    pub on_complete: JobHook,
    pub on_error: ErrorHook,
}

/// Bookkeeping for one actively tracked job. Owned exclusively by the
/// scheduler's table; the polling task only holds the id + generation pair
/// it was spawned with and a clone of the cancel token.
struct PollRegistration {
    generation: u64,
    cancel: CancellationToken,
}

/// Runs zero or more independent polling loops, one per job id.
///
/// Constructible and disposable: tests create as many instances as they
/// like, and [`PollScheduler::shutdown`] ends the lifecycle explicitly.
/// There is no process-wide singleton.
pub struct PollScheduler {
    client: BridgeClient,
    config: PollConfig,
    registrations: RwLock<HashMap<String, PollRegistration>>,
    next_generation: AtomicU64,
    closed: AtomicBool,
}

impl PollScheduler {
    pub fn new(client: BridgeClient, config: PollConfig) -> Self {
        Self {
            client,
            config,
            registrations: RwLock::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Begin tracking `job_id`. An existing registration for the same id is
    /// torn down first — restarting is idempotent, never duplicate polling.
    /// The first status check fires immediately.
    pub fn start_polling(self: &Arc<Self>, job_id: impl Into<String>, hooks: PollHooks) {
        let job_id = job_id.into();
        if self.closed.load(Ordering::SeqCst) {
            warn!(%job_id, "scheduler is shut down; ignoring start_polling");
            return;
        }

        self.stop_polling(&job_id);

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        match self.registrations.write() {
            Ok(mut registrations) => {
                registrations.insert(
                    job_id.clone(),
                    PollRegistration {
                        generation,
                        cancel: cancel.clone(),
                    },
                );
            }
            Err(e) => {
                error!("RwLock poisoned inserting registration: {e}");
                return;
            }
        }

        debug!(%job_id, generation, "started polling");
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            scheduler.poll_loop(job_id, generation, cancel, hooks).await;
        });
    }

    /// Cancel the pending check and drop the registration. No-op (and no
    /// panic) on an id that is not being tracked.
    pub fn stop_polling(&self, job_id: &str) {
        let removed = match self.registrations.write() {
            Ok(mut registrations) => registrations.remove(job_id),
            Err(e) => {
                error!("RwLock poisoned removing registration: {e}");
                None
            }
        };
        if let Some(registration) = removed {
            registration.cancel.cancel();
            debug!(%job_id, "stopped polling");
        }
    }

    /// Tear down every active registration.
    pub fn stop_all_polling(&self) {
        let drained: Vec<(String, PollRegistration)> = match self.registrations.write() {
            Ok(mut registrations) => registrations.drain().collect(),
            Err(e) => {
                error!("RwLock poisoned draining registrations: {e}");
                Vec::new()
            }
        };
        if !drained.is_empty() {
            info!(count = drained.len(), "stopped all polling");
        }
        for (_, registration) in drained {
            registration.cancel.cancel();
        }
    }

    /// End the scheduler's lifecycle: stop everything and refuse new
    /// registrations from now on.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.stop_all_polling();
    }

    pub fn is_polling(&self, job_id: &str) -> bool {
        match self.registrations.read() {
            Ok(registrations) => registrations.contains_key(job_id),
            Err(e) => {
                error!("RwLock poisoned reading registrations: {e}");
                false
            }
        }
    }

    pub fn active_poll_count(&self) -> usize {
        match self.registrations.read() {
            Ok(registrations) => registrations.len(),
            Err(e) => {
                error!("RwLock poisoned reading registrations: {e}");
                0
            }
        }
    }

    /// Manual one-shot status fetch. Never touches the registration table,
    /// so an active loop for the same id is unaffected.
    pub async fn check_job_status(&self, job_id: &str) -> Result<Job, BridgeError> {
        self.client.job_status(job_id).await
    }

    async fn poll_loop(
        self: Arc<Self>,
        job_id: String,
        generation: u64,
        cancel: CancellationToken,
        hooks: PollHooks,
    ) {
        let mut checks_done: u32 = 0;
        loop {
            let delay = self.config.delay_for(checks_done);
            if !delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            let fetched = tokio::select! {
                _ = cancel.cancelled() => return,
                result = self.client.job_status(&job_id) => result,
            };

            // The registration may have been torn down (or replaced by a
            // fresh tracking session) while the fetch was in flight. A stale
            // result must neither fire callbacks nor reschedule.
            if !self.is_current(&job_id, generation) {
                return;
            }

            checks_done += 1;
            match fetched {
                Ok(job) => {
                    (hooks.on_update)(&job);
                    if job.status.is_terminal() {
                        self.deregister(&job_id, generation);
                        info!(%job_id, status = %job.status, checks = checks_done, "job finished");
                        (hooks.on_complete)(&job);
                        return;
                    }
                    debug!(%job_id, status = %job.status, progress = ?job.progress, "job still running");
                }
                Err(err) => {
                    debug!(%job_id, attempt = checks_done, "status check failed: {err}");
                }
            }

            // Errors and not-yet-terminal successes share one retry budget,
            // so this bound also covers a job that never leaves processing.
            if checks_done >= self.config.max_retries {
                self.deregister(&job_id, generation);
                warn!(%job_id, checks = checks_done, "giving up on job");
                (hooks.on_error)(&format!(
                    "status polling for job {job_id} exceeded maximum retries ({})",
                    self.config.max_retries
                ));
                return;
            }
        }
    }

    fn is_current(&self, job_id: &str, generation: u64) -> bool {
        match self.registrations.read() {
            Ok(registrations) => registrations
                .get(job_id)
                .is_some_and(|registration| registration.generation == generation),
            Err(e) => {
                error!("RwLock poisoned reading registrations: {e}");
                false
            }
        }
    }

    /// Remove the registration, but only if it still belongs to this task.
    fn deregister(&self, job_id: &str, generation: u64) {
        match self.registrations.write() {
            Ok(mut registrations) => {
                if registrations
                    .get(job_id)
                    .is_some_and(|registration| registration.generation == generation)
                {
                    registrations.remove(job_id);
                }
            }
            Err(e) => error!("RwLock poisoned removing registration: {e}"),
        }
    }
}
