//! Invocation of user-supplied scoring implementations.
//!
//! Implementations are untrusted in both behavior and runtime cost. Every
//! call is guarded against panics, and when a timeout is configured the call
//! runs on a [`Watchdog`] helper thread while the caller waits on a channel.
//! A call that outlives its timeout is reported as
//! [`ExecutionFailure::TimedOut`] and its eventual result is discarded.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ExecutionFailure;
use crate::function::ScoreFn;
use crate::item::Item;

/// What [`crate::Algorithm::rank_batch`] does when an item fails to score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Drop the failing item from the ranking, report it alongside the
    /// successful records, and keep going.
    #[default]
    Isolate,
    /// Fail the whole batch with the error of the lowest-indexed failing item.
    FailFast,
}

/// Execution knobs for batch ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOptions {
    /// Size of the worker pool. `1` scores items inline on the calling thread.
    pub workers: usize,
    /// Upper bound on a single function invocation.
    pub timeout: Option<Duration>,
    pub policy: FailurePolicy,
    /// Item field holding the identifier recorded in each score record.
    pub id_field: String,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            timeout: None,
            policy: FailurePolicy::default(),
            id_field: "id".to_string(),
        }
    }
}

impl ExecutionOptions {
    #[must_use]
    pub const fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_id_field(mut self, id_field: impl Into<String>) -> Self {
        self.id_field = id_field.into();
        self
    }

    pub(crate) fn effective_workers(&self) -> usize {
        self.workers.max(1)
    }
}

/// Run `func` on the current thread, converting errors and panics.
pub(crate) fn call_guarded(func: &ScoreFn, item: &Item) -> Result<f64, ExecutionFailure> {
    match panic::catch_unwind(AssertUnwindSafe(|| func(item))) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(ExecutionFailure::Failed(err)),
        Err(payload) => Err(ExecutionFailure::Panicked(panic_message(payload.as_ref()))),
    }
}

const PENDING: u8 = 0;
const DONE: u8 = 1;
const ABANDONED: u8 = 2;

/// Timeout enforcement for one batch.
///
/// Bounded calls run on a fixed helper pool. A call that outlives the timeout
/// is abandoned but keeps its helper thread until it returns. At most
/// `workers * functions` threads may be pinned that way; once that many are,
/// further calls fail with [`ExecutionFailure::TimedOut`] without being
/// dispatched until an abandoned call finishes.
pub(crate) struct Watchdog {
    pool: rayon::ThreadPool,
    timeout: Duration,
    stuck: Arc<AtomicUsize>,
    stuck_limit: usize,
}

impl Watchdog {
    /// Helper pool for `workers` concurrent scorers of `functions` functions.
    pub(crate) fn new(
        timeout: Duration,
        workers: usize,
        functions: usize,
    ) -> Result<Self, rayon::ThreadPoolBuildError> {
        let workers = workers.max(1);
        let stuck_limit = workers * functions.max(1);
        // The extra `workers` threads keep live calls from queueing behind
        // abandoned ones.
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(stuck_limit + workers)
            .thread_name(|index| format!("feedrank-score-{index}"))
            .build()?;

        Ok(Self {
            pool,
            timeout,
            stuck: Arc::new(AtomicUsize::new(0)),
            stuck_limit,
        })
    }

    /// Helper threads still running an abandoned call.
    pub(crate) fn stuck(&self) -> usize {
        self.stuck.load(Ordering::Acquire)
    }

    /// Run `func` on the helper pool and wait at most the timeout for it.
    pub(crate) fn call(
        &self,
        func: &Arc<ScoreFn>,
        item: &Arc<Item>,
    ) -> Result<f64, ExecutionFailure> {
        if self.stuck() >= self.stuck_limit {
            return Err(ExecutionFailure::TimedOut(self.timeout));
        }

        let (tx, rx) = mpsc::sync_channel(1);
        let state = Arc::new(AtomicU8::new(PENDING));
        let func = Arc::clone(func);
        let item = Arc::clone(item);
        let job_state = Arc::clone(&state);
        let stuck = Arc::clone(&self.stuck);
        self.pool.spawn(move || {
            // The receiver is gone once the caller has timed out.
            let _ = tx.send(call_guarded(func.as_ref(), &item));
            if job_state.swap(DONE, Ordering::AcqRel) == ABANDONED {
                stuck.fetch_sub(1, Ordering::AcqRel);
            }
        });

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                self.stuck.fetch_add(1, Ordering::AcqRel);
                if state
                    .compare_exchange(PENDING, ABANDONED, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    // Finished between the timeout and now.
                    self.stuck.fetch_sub(1, Ordering::AcqRel);
                }
                Err(ExecutionFailure::TimedOut(self.timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(ExecutionFailure::Panicked(
                "scoring thread exited without a result".to_string(),
            )),
        }
    }
}

impl std::fmt::Debug for Watchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watchdog")
            .field("timeout", &self.timeout)
            .field("threads", &self.pool.current_num_threads())
            .field("stuck_limit", &self.stuck_limit)
            .finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
