use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::debug;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::error::{DeployLensError, Result};

/// Named category of fetch. At most one request per class is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryClass {
    Projects,
    Releases,
    YamlPipelines,
    UserApprovals,
    YamlApprovals,
    Pipelines,
    ReleaseOverview,
    Approvals,
    WorkItems,
    TestPlan,
    ReleasePlan,
    PipelineRuns,
    Environments,
    ReleaseWorkItems,
    YamlBuilds,
}

impl fmt::Display for QueryClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Projects => "projects",
            Self::Releases => "releases",
            Self::YamlPipelines => "yaml-pipelines",
            Self::UserApprovals => "user-approvals",
            Self::YamlApprovals => "yaml-approvals",
            Self::Pipelines => "pipelines",
            Self::ReleaseOverview => "release-overview",
            Self::Approvals => "approvals",
            Self::WorkItems => "work-items",
            Self::TestPlan => "test-plan",
            Self::ReleasePlan => "release-plan",
            Self::PipelineRuns => "pipeline-runs",
            Self::Environments => "environments",
            Self::ReleaseWorkItems => "release-work-items",
            Self::YamlBuilds => "yaml-builds",
        };
        f.write_str(name)
    }
}

/// Shared cancellation signal checked by a running fetch.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called.
    pub async fn cancelled(&self) {
        loop {
            // Register before checking the flag so a concurrent cancel is not lost.
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// How a fetch ended. `Aborted` is not a failure: the request was superseded
/// or torn down and its result must never reach visible state.
#[derive(Debug)]
pub enum FetchOutcome<T> {
    Completed(T),
    Failed(DeployLensError),
    Aborted,
}

/// Handle to one issued request.
pub struct FetchHandle<T> {
    class: QueryClass,
    request_id: u64,
    token: CancelToken,
    task: JoinHandle<FetchOutcome<T>>,
}

impl<T> FetchHandle<T> {
    pub fn class(&self) -> QueryClass {
        self.class
    }

    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Waits for the request to settle.
    pub async fn outcome(self) -> FetchOutcome<T> {
        match self.task.await {
            Ok(outcome) => outcome,
            // The runtime dropped the task, which only happens on shutdown.
            Err(_) => FetchOutcome::Aborted,
        }
    }
}

struct InFlight {
    request_id: u64,
    token: CancelToken,
}

/// Tracks the in-flight request of every query class.
#[derive(Default)]
pub struct FetchRegistry {
    in_flight: HashMap<QueryClass, InFlight>,
    next_id: u64,
}

impl FetchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues `fetch` under `class`, cancelling whatever was in flight for
    /// that class first.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn issue<T, F>(&mut self, class: QueryClass, fetch: F) -> FetchHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
    {
        self.cancel(class);

        self.next_id += 1;
        let request_id = self.next_id;
        let token = CancelToken::new();
        self.in_flight.insert(
            class,
            InFlight {
                request_id,
                token: token.clone(),
            },
        );

        debug!("Issuing {class} request #{request_id}");

        let task_token = token.clone();
        let task = tokio::spawn(async move {
            tokio::select! {
                biased;
                () = task_token.cancelled() => FetchOutcome::Aborted,
                result = fetch => {
                    if task_token.is_cancelled() {
                        FetchOutcome::Aborted
                    } else {
                        match result {
                            Ok(value) => FetchOutcome::Completed(value),
                            Err(e) => FetchOutcome::Failed(e),
                        }
                    }
                }
            }
        });

        FetchHandle {
            class,
            request_id,
            token,
            task,
        }
    }

    /// Cancels the in-flight request of `class`. Returns whether one existed.
    pub fn cancel(&mut self, class: QueryClass) -> bool {
        match self.in_flight.remove(&class) {
            Some(previous) => {
                debug!("Cancelling {class} request #{}", previous.request_id);
                previous.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        for (class, in_flight) in self.in_flight.drain() {
            debug!("Cancelling {class} request #{}", in_flight.request_id);
            in_flight.token.cancel();
        }
    }

    /// Releases the slot of `class` once `request_id` has settled. A stale id
    /// leaves a newer registration untouched.
    pub fn settle(&mut self, class: QueryClass, request_id: u64) {
        if self.in_flight(class) == Some(request_id) {
            self.in_flight.remove(&class);
        }
    }

    pub fn in_flight(&self, class: QueryClass) -> Option<u64> {
        self.in_flight.get(&class).map(|entry| entry.request_id)
    }
}
