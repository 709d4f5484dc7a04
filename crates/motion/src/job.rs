//! The job / idle state machine.
//!
//! A [`JobServer`] runs one externally supplied [`Job`] at a time. The job
//! drives the robot through the [`MoveIface`] execution template and is only
//! interrupted at explicit [`JobContext::checkpoint`] calls.
//!
//! ```text
//!            run_job_action             job returns (any non-critical outcome)
//!   Idle ─────────────────────▶ Running ─────────────────────────────────────▶ Idle
//!    ▲                             │ idle_action: cancel, force Idle
//!    │ reset                       │ critical failure
//!    └──────────── Aborted ◀───────┘
//! ```
//!
//! The server state is derived rather than stored: `Aborted` is exactly the
//! execution template's "not allowed to move" flag, so a critical failure
//! anywhere (a job step, an idle motion, a direct service call) aborts the
//! server too, and only [`JobServer::reset`] clears it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{info, instrument, warn};

use crate::{ErrorCode, ErrorKind, MoveError, MoveIface, MoveResult, RequestId, Timestamp};

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Cooperative cancellation flag shared between the server and one job run.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Creates an un-cancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// States and records
// ---------------------------------------------------------------------------

/// State of the job server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerState {
    /// No job owns the robot.
    Idle,
    /// A job is driving the robot.
    Running,
    /// A critical failure occurred; refused until reset.
    Aborted,
}

/// Status of one job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Cancelled by an idle request.
    Idle,
    /// Still executing.
    Running,
    /// Ended with a critical failure.
    Aborted,
    /// Returned without a critical failure.
    Completed,
    /// Never started: the server was busy or aborted.
    Rejected,
}

/// Record of one accepted job run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobTask {
    /// Request that started the run.
    pub request_id: RequestId,
    /// Current status.
    pub status: JobStatus,
    /// When the run was accepted.
    pub started_at: Timestamp,
    /// When the run returned.
    pub finished_at: Option<Timestamp>,
}

/// A request to run the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobGoal {
    /// Correlates the run with its result and logs.
    pub request_id: RequestId,
}

impl JobGoal {
    /// Creates a goal with a fresh request id.
    pub fn new() -> Self {
        Self {
            request_id: RequestId::new_random(),
        }
    }
}

impl Default for JobGoal {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of [`JobServer::run_job_action`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    /// Request the result answers.
    pub request_id: RequestId,
    /// Final status of the run.
    pub status: JobStatus,
    /// Outcome code of the job logic.
    pub error_code: ErrorCode,
    /// Failure description (empty on success).
    pub message: String,
}

impl JobResult {
    fn new(request_id: RequestId, status: JobStatus, result: &MoveResult) -> Self {
        Self {
            request_id,
            status,
            error_code: ErrorCode::of(result),
            message: result
                .as_ref()
                .err()
                .map(|e| e.message().to_string())
                .unwrap_or_default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Job logic
// ---------------------------------------------------------------------------

/// Externally supplied job logic.
#[async_trait]
pub trait Job: Send + Sync {
    /// Runs the job. Implementations call [`JobContext::checkpoint`] between
    /// motions and return its error unchanged.
    async fn run(&self, ctx: &JobContext) -> MoveResult;
}

/// What a running job can see and use.
pub struct JobContext {
    iface: Arc<MoveIface>,
    cancel: CancelToken,
    request_id: RequestId,
}

impl JobContext {
    /// The execution template to issue motions through.
    pub fn iface(&self) -> &MoveIface {
        &self.iface
    }

    /// The request that started this run.
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns `true` once an idle request cancelled this run.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// A safe point to stop at.
    ///
    /// Fails `cancelled` (recoverable) once cancellation was requested and
    /// `not_allowed_to_move` (critical) once the process aborted.
    pub fn checkpoint(&self) -> MoveResult {
        if !self.iface.is_allowed_to_move() {
            return Err(MoveError::critical(
                ErrorKind::NotAllowedToMove,
                "motion disabled after a critical failure",
            ));
        }
        if self.cancel.is_cancelled() {
            return Err(MoveError::new(ErrorKind::Cancelled, "job cancelled by idle request"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Inner {
    current: Option<(JobTask, CancelToken)>,
    last: Option<JobTask>,
}

/// Runs one job at a time and switches the robot to idle on request.
pub struct JobServer {
    iface: Arc<MoveIface>,
    job: Arc<dyn Job>,
    inner: Mutex<Inner>,
    finished: Notify,
}

impl JobServer {
    /// Creates a server in the `Idle` state.
    pub fn new(iface: Arc<MoveIface>, job: Arc<dyn Job>) -> Self {
        Self {
            iface,
            job,
            inner: Mutex::new(Inner::default()),
            finished: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The execution template jobs run through.
    pub fn iface(&self) -> &Arc<MoveIface> {
        &self.iface
    }

    /// Current server state.
    pub fn state(&self) -> ServerState {
        if !self.iface.is_allowed_to_move() {
            return ServerState::Aborted;
        }
        match &self.lock().current {
            Some((_, cancel)) if !cancel.is_cancelled() => ServerState::Running,
            _ => ServerState::Idle,
        }
    }

    /// The run in flight, if any (including a cancelled one still winding down).
    pub fn current_task(&self) -> Option<JobTask> {
        self.lock().current.as_ref().map(|(task, _)| task.clone())
    }

    /// The most recently finished run.
    pub fn last_task(&self) -> Option<JobTask> {
        self.lock().last.clone()
    }

    /// Clears an abort. The external operator reset.
    pub fn reset(&self) {
        self.iface.reset();
    }

    /// Runs the job to completion, cancellation, or abort.
    #[instrument(name = "run_job", skip_all, fields(request_id = %goal.request_id))]
    pub async fn run_job_action(&self, goal: JobGoal) -> JobResult {
        let request_id = goal.request_id;
        let cancel = {
            let mut inner = self.lock();
            let refused = if !self.iface.is_allowed_to_move() {
                Some(MoveError::critical(
                    ErrorKind::NotAllowedToMove,
                    "job refused: motion disabled after a critical failure",
                ))
            } else if inner.current.is_some() {
                Some(MoveError::new(ErrorKind::Busy, "job refused: a job is already running"))
            } else {
                None
            };
            if let Some(error) = refused {
                warn!(kind = %error.kind(), "Job rejected");
                return JobResult::new(request_id, JobStatus::Rejected, &Err(error));
            }

            let cancel = CancelToken::new();
            let task = JobTask {
                request_id,
                status: JobStatus::Running,
                started_at: Timestamp::now(),
                finished_at: None,
            };
            inner.current = Some((task, cancel.clone()));
            cancel
        };
        info!("Job started");

        let ctx = JobContext {
            iface: self.iface.clone(),
            cancel: cancel.clone(),
            request_id,
        };
        let result = self.job.run(&ctx).await;

        let status = match &result {
            Err(e) if e.is_critical() => {
                self.iface.abort_due_to_critical_failure(e);
                JobStatus::Aborted
            }
            _ if cancel.is_cancelled() => JobStatus::Idle,
            _ => JobStatus::Completed,
        };
        {
            let mut inner = self.lock();
            if let Some((mut task, _)) = inner.current.take() {
                task.status = status;
                task.finished_at = Some(Timestamp::now());
                inner.last = Some(task);
            }
        }
        self.finished.notify_waiters();
        info!(?status, code = %ErrorCode::of(&result), "Job finished");
        JobResult::new(request_id, status, &result)
    }

    /// Cancels any running job, waits for it to stop, and runs the idle motion.
    ///
    /// Refused while aborted. Fails `busy` if the job does not reach a
    /// checkpoint within the configured cancel timeout.
    #[instrument(name = "idle", skip_all)]
    pub async fn idle_action(&self) -> MoveResult {
        if !self.iface.is_allowed_to_move() {
            return Err(MoveError::critical(
                ErrorKind::NotAllowedToMove,
                "idle refused: motion disabled after a critical failure",
            ));
        }
        if let Some((task, cancel)) = &self.lock().current {
            info!(request_id = %task.request_id, "Cancelling running job");
            cancel.cancel();
        }

        let timeout = self.iface.config().job.cancel_timeout();
        tokio::time::timeout(timeout, self.wait_for_job())
            .await
            .map_err(|_| {
                MoveError::new(
                    ErrorKind::Busy,
                    format!("job did not reach a checkpoint within {timeout:?}"),
                )
            })?;

        self.iface.idle().await
    }

    async fn wait_for_job(&self) {
        loop {
            let finished = self.finished.notified();
            if self.lock().current.is_none() {
                return;
            }
            finished.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::testing::Rig;
    use crate::Severity;

    /// Loops on checkpoints until stopped.
    #[derive(Default)]
    struct Looping {
        rounds: AtomicUsize,
    }

    #[async_trait]
    impl Job for Looping {
        async fn run(&self, ctx: &JobContext) -> MoveResult {
            loop {
                ctx.checkpoint()?;
                self.rounds.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }
    }

    struct Failing(MoveError);

    #[async_trait]
    impl Job for Failing {
        async fn run(&self, _ctx: &JobContext) -> MoveResult {
            Err(self.0.clone())
        }
    }

    async fn wait_until_running(server: &JobServer) {
        for _ in 0..200 {
            if server.state() == ServerState::Running {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job never started");
    }

    #[tokio::test]
    async fn idle_cancels_running_job_at_next_checkpoint() {
        let rig = Rig::new();
        let job = Arc::new(Looping::default());
        let server = Arc::new(JobServer::new(rig.iface.clone(), job.clone()));

        let running = tokio::spawn({
            let server = server.clone();
            async move { server.run_job_action(JobGoal::new()).await }
        });
        wait_until_running(&server).await;

        server.idle_action().await.unwrap();
        assert_eq!(server.state(), ServerState::Idle);

        let result = running.await.unwrap();
        assert_eq!(result.status, JobStatus::Idle);
        assert_eq!(result.error_code.kind(), Some(ErrorKind::Cancelled));
        assert_eq!(server.last_task().unwrap().status, JobStatus::Idle);
        assert!(server.current_task().is_none());
        // Home is zeros and the robot never moved, so idle only opened the gripper.
        assert_eq!(rig.backend.open_calls.load(Ordering::SeqCst), 1);
        assert_eq!(rig.executions(), 0);
    }

    #[tokio::test]
    async fn second_job_is_rejected_busy() {
        let rig = Rig::new();
        let server = Arc::new(JobServer::new(rig.iface.clone(), Arc::new(Looping::default())));
        let running = tokio::spawn({
            let server = server.clone();
            async move { server.run_job_action(JobGoal::new()).await }
        });
        wait_until_running(&server).await;

        let second = server.run_job_action(JobGoal::new()).await;
        assert_eq!(second.status, JobStatus::Rejected);
        assert_eq!(second.error_code.kind(), Some(ErrorKind::Busy));
        assert_eq!(second.error_code.severity(), Some(Severity::Recoverable));

        server.idle_action().await.unwrap();
        running.await.unwrap();
    }

    #[tokio::test]
    async fn recoverable_failure_completes_and_stays_idle() {
        let rig = Rig::new();
        let failure = MoveError::new(ErrorKind::PlanningFailed, "no path");
        let server = JobServer::new(rig.iface.clone(), Arc::new(Failing(failure)));

        let result = server.run_job_action(JobGoal::new()).await;
        assert_eq!(result.status, JobStatus::Completed);
        assert_eq!(result.error_code.kind(), Some(ErrorKind::PlanningFailed));
        assert_eq!(server.state(), ServerState::Idle);
    }

    #[tokio::test]
    async fn critical_failure_aborts_until_reset() {
        let rig = Rig::new();
        let failure = MoveError::new(ErrorKind::ExecutionFailed, "controller fault");
        let server = JobServer::new(rig.iface.clone(), Arc::new(Failing(failure)));

        let result = server.run_job_action(JobGoal::new()).await;
        assert_eq!(result.status, JobStatus::Aborted);
        assert_eq!(server.state(), ServerState::Aborted);

        let err = server.idle_action().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotAllowedToMove);
        assert!(err.is_critical());

        let rejected = server.run_job_action(JobGoal::new()).await;
        assert_eq!(rejected.status, JobStatus::Rejected);
        assert_eq!(rejected.error_code.kind(), Some(ErrorKind::NotAllowedToMove));

        server.reset();
        assert_eq!(server.state(), ServerState::Idle);
        server.idle_action().await.unwrap();
    }

    #[tokio::test]
    async fn idle_times_out_when_job_ignores_cancellation() {
        struct Stubborn;

        #[async_trait]
        impl Job for Stubborn {
            async fn run(&self, _ctx: &JobContext) -> MoveResult {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            }
        }

        let mut config = Rig::config();
        config.job.cancel_timeout_ms = 30;
        let rig = Rig::with_config(config);
        let server = Arc::new(JobServer::new(rig.iface.clone(), Arc::new(Stubborn)));
        let running = tokio::spawn({
            let server = server.clone();
            async move { server.run_job_action(JobGoal::new()).await }
        });
        for _ in 0..200 {
            if server.current_task().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let err = server.idle_action().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Busy);
        // Cancelled runs count as idle even before they return.
        assert_eq!(server.state(), ServerState::Idle);
        running.abort();
    }
}
