//! Single-flight credential renewal
//!
//! The coordinator is either `Idle` or `Refreshing`. The first expired
//! request moves it to `Refreshing` and becomes the trigger of one renewal
//! call; every expiry observed while that call is outstanding is parked as a
//! `PendingWaiter` instead of starting another. When the renewal settles the
//! state returns to `Idle` and every parked caller is resolved exactly once:
//! replayed with the new credential on success, rejected with the renewal
//! error on failure.
//!
//! State transitions, queue append and queue drain all happen under one
//! mutex, so correctness does not depend on a single-threaded runtime.
//!
//! The renewal runs in its own task. A caller that drops its future only
//! discards its own result; the renewal still settles and the other waiters
//! are still resolved. If that task panics, the coordinator is put back to
//! `Idle` and everyone still parked is rejected.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::join_all;
use session_auth::{AccessCredential, REFRESH_PATH};
use tokio::sync::{Mutex, oneshot};
use tracing::{debug, error, info, warn};

use crate::descriptor::RequestDescriptor;
use crate::dispatcher::RequestDispatcher;
use crate::error::{Error, Result};
use crate::metrics;
use crate::transport::Response;

const RENEWAL_ABANDONED: &str = "renewal abandoned";

/// A caller parked until the in-flight renewal settles.
///
/// `descriptor` is already the replay (`retry_count == 1`).
struct PendingWaiter {
    descriptor: RequestDescriptor,
    completion: oneshot::Sender<Result<Response>>,
}

enum CoordinatorState {
    Idle,
    /// Queued callers in arrival order. The trigger is not in here; the
    /// renewal task owns it.
    Refreshing { waiters: VecDeque<PendingWaiter> },
}

/// Snapshot of the renewal state for assertions.
#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CoordinatorStatus {
    Idle,
    /// A renewal is outstanding with `queued` callers parked behind it,
    /// not counting the one that triggered it.
    Refreshing { queued: usize },
}

pub(crate) struct RefreshCoordinator {
    state: Mutex<CoordinatorState>,
    refresh_timeout: Option<Duration>,
}

impl RefreshCoordinator {
    pub(crate) fn new(refresh_timeout: Option<Duration>) -> Self {
        Self {
            state: Mutex::new(CoordinatorState::Idle),
            refresh_timeout,
        }
    }

    #[cfg(test)]
    pub(crate) async fn status(&self) -> CoordinatorStatus {
        match &*self.state.lock().await {
            CoordinatorState::Idle => CoordinatorStatus::Idle,
            CoordinatorState::Refreshing { waiters } => CoordinatorStatus::Refreshing {
                queued: waiters.len(),
            },
        }
    }

    /// Resolve a first-attempt 401 for `descriptor`.
    ///
    /// Starts a renewal if none is outstanding, otherwise queues behind the
    /// current one. Returns the outcome of the replay, or the renewal error.
    pub(crate) async fn handle_expiry(
        &self,
        dispatcher: &RequestDispatcher,
        descriptor: RequestDescriptor,
    ) -> Result<Response> {
        let (completion, outcome) = oneshot::channel();
        let waiter = PendingWaiter {
            descriptor: descriptor.replay(),
            completion,
        };

        {
            let mut state = self.state.lock().await;
            let trigger = match &mut *state {
                CoordinatorState::Refreshing { waiters } => {
                    waiters.push_back(waiter);
                    metrics::record_waiter_queued();
                    debug!(
                        request_id = descriptor.request_id(),
                        queued = waiters.len(),
                        "renewal in flight, request queued"
                    );
                    None
                }
                CoordinatorState::Idle => Some(waiter),
            };

            if let Some(trigger) = trigger {
                *state = CoordinatorState::Refreshing {
                    waiters: VecDeque::new(),
                };
                info!(
                    request_id = descriptor.request_id(),
                    "access credential expired, starting renewal"
                );
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move {
                    let coordinator = dispatcher.coordinator();
                    let renewal = coordinator.run_renewal(&dispatcher, trigger);
                    if AssertUnwindSafe(renewal).catch_unwind().await.is_err() {
                        coordinator.abandon(&dispatcher).await;
                    }
                });
            }
        }

        // The sender is only dropped unsent if the renewal task panicked
        outcome
            .await
            .unwrap_or_else(|_| Err(Error::Refresh(RENEWAL_ABANDONED.into())))
    }

    async fn run_renewal(&self, dispatcher: &RequestDispatcher, trigger: PendingWaiter) {
        match self.renew(dispatcher).await {
            Ok(credential) => {
                let waiters = {
                    let mut state = self.state.lock().await;
                    if let Err(e) = dispatcher.credential_store().set(credential).await {
                        warn!(error = %e, "failed to persist renewed credential");
                    }
                    take_waiters(&mut state)
                };
                metrics::record_refresh("success");
                info!(queued = waiters.len(), "access credential renewed");

                replay(dispatcher, trigger).await;

                // Dispatched in arrival order; each resolves its own caller
                // as soon as its response lands
                join_all(waiters.into_iter().map(|waiter| replay(dispatcher, waiter))).await;
            }
            Err(error) => {
                let waiters = {
                    let mut state = self.state.lock().await;
                    if let Err(e) = dispatcher.credential_store().clear().await {
                        warn!(error = %e, "failed to persist cleared session");
                    }
                    take_waiters(&mut state)
                };
                metrics::record_refresh("failure");
                warn!(
                    error = %error,
                    queued = waiters.len(),
                    "access credential renewal failed, session cleared"
                );

                let _ = trigger.completion.send(Err(error.clone()));
                for waiter in waiters {
                    let _ = waiter.completion.send(Err(error.clone()));
                }
            }
        }
    }

    /// Recover from a renewal task that panicked before settling.
    ///
    /// Treated as a failed renewal: the session is cleared and every parked
    /// caller is rejected. The trigger already saw its sender dropped.
    async fn abandon(&self, dispatcher: &RequestDispatcher) {
        let waiters = {
            let mut state = self.state.lock().await;
            if matches!(*state, CoordinatorState::Idle) {
                return;
            }
            if let Err(e) = dispatcher.credential_store().clear().await {
                warn!(error = %e, "failed to persist cleared session");
            }
            take_waiters(&mut state)
        };
        metrics::record_refresh("failure");
        error!(
            queued = waiters.len(),
            "renewal task panicked, session cleared"
        );

        let abandoned = Error::Refresh(RENEWAL_ABANDONED.into());
        for waiter in waiters {
            let _ = waiter.completion.send(Err(abandoned.clone()));
        }
    }

    /// One unauthenticated call to the renewal endpoint.
    ///
    /// The endpoint authenticates with the refresh cookie the transport
    /// carries, never with the expired bearer credential.
    async fn renew(&self, dispatcher: &RequestDispatcher) -> Result<AccessCredential> {
        let descriptor = RequestDescriptor::post(REFRESH_PATH);
        let call = dispatcher.send_public(&descriptor);

        let response = match self.refresh_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| Error::Refresh(format!("renewal timed out after {limit:?}")))?,
            None => call.await,
        };

        let response = response.map_err(|e| match e {
            Error::HttpStatus {
                message: Some(message),
                ..
            } => Error::Refresh(message),
            Error::HttpStatus {
                status,
                message: None,
            } => Error::Refresh(format!("refresh endpoint returned {status}")),
            other => Error::Refresh(other.to_string()),
        })?;

        session_auth::parse_token_envelope(response.body()).map_err(|e| match e {
            session_auth::Error::Rejected(message) => Error::Refresh(message),
            other => Error::Refresh(other.to_string()),
        })
    }
}

/// Switch to `Idle` and hand back the queued callers in arrival order.
fn take_waiters(state: &mut CoordinatorState) -> VecDeque<PendingWaiter> {
    match std::mem::replace(state, CoordinatorState::Idle) {
        CoordinatorState::Refreshing { waiters } => waiters,
        CoordinatorState::Idle => VecDeque::new(),
    }
}

/// Replay a parked request with the current credential and resolve its caller.
async fn replay(dispatcher: &RequestDispatcher, waiter: PendingWaiter) {
    if waiter.completion.is_closed() {
        debug!(
            request_id = waiter.descriptor.request_id(),
            "caller went away, skipping replay"
        );
        return;
    }
    metrics::record_replay();
    let outcome = dispatcher.execute(&waiter.descriptor).await;
    let _ = waiter.completion.send(outcome);
}
