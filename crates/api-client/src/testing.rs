//! Scripted in-process backend for dispatcher and coordinator tests
//!
//! Protected paths answer 200 (body = path) only for the currently valid
//! credential and 401 otherwise. The renewal endpoint blocks until
//! `release_refresh()` is called, so tests can park any number of requests
//! behind one in-flight renewal before letting it settle.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use session_auth::{AccessCredential, CredentialStore, REFRESH_PATH};
use tokio::sync::watch;

use crate::descriptor::RequestDescriptor;
use crate::dispatcher::RequestDispatcher;
use crate::error::{Error, Result};
use crate::transport::{Response, Transport};

/// A request as the backend saw it.
#[derive(Debug, Clone)]
pub(crate) struct Call {
    pub path: String,
    pub authorization: Option<String>,
    pub retry_count: u8,
}

enum RefreshOutcome {
    Renew(String),
    Reject { status: u16, message: Option<String> },
    /// The connection drops before any response arrives.
    Disconnect,
    /// The handler panics, taking the renewal task down with it.
    Crash,
}

struct Inner {
    valid_token: Mutex<String>,
    refresh_outcome: Mutex<RefreshOutcome>,
    open_paths: Mutex<HashSet<String>>,
    bodies: Mutex<HashMap<String, String>>,
    calls: Mutex<Vec<Call>>,
    refresh_authorization: Mutex<Vec<Option<String>>>,
    refresh_calls: AtomicUsize,
    refresh_gate: watch::Sender<bool>,
}

#[derive(Clone)]
pub(crate) struct MockBackend {
    inner: Arc<Inner>,
}

impl MockBackend {
    /// Backend whose renewal will issue `renewed_token`.
    ///
    /// Until a renewal happens no credential is valid, so any stored
    /// credential other than `renewed_token` draws a 401.
    pub fn new(renewed_token: &str) -> Self {
        let (refresh_gate, _) = watch::channel(false);
        let backend = Self {
            inner: Arc::new(Inner {
                valid_token: Mutex::new(String::new()),
                refresh_outcome: Mutex::new(RefreshOutcome::Renew(renewed_token.to_string())),
                open_paths: Mutex::new(HashSet::new()),
                bodies: Mutex::new(HashMap::new()),
                calls: Mutex::new(Vec::new()),
                refresh_authorization: Mutex::new(Vec::new()),
                refresh_calls: AtomicUsize::new(0),
                refresh_gate,
            }),
        };
        backend.accept_token(renewed_token);
        backend
    }

    /// Make `token` the credential protected paths accept.
    pub fn accept_token(&self, token: &str) {
        *self.inner.valid_token.lock().unwrap() = token.to_string();
    }

    /// Make renewal fail with `status`, with or without an envelope `message`.
    pub fn reject_refresh(&self, status: u16, message: Option<&str>) {
        *self.inner.refresh_outcome.lock().unwrap() = RefreshOutcome::Reject {
            status,
            message: message.map(str::to_string),
        };
    }

    /// Make renewal fail below HTTP, as a reset connection.
    pub fn disconnect_refresh(&self) {
        *self.inner.refresh_outcome.lock().unwrap() = RefreshOutcome::Disconnect;
    }

    /// Make the renewal call panic inside the transport.
    pub fn crash_refresh(&self) {
        *self.inner.refresh_outcome.lock().unwrap() = RefreshOutcome::Crash;
    }

    /// Serve `path` without checking credentials.
    pub fn open_path(&self, path: &str) {
        self.inner.open_paths.lock().unwrap().insert(path.to_string());
    }

    /// Answer `path` with `body` instead of echoing the path.
    pub fn respond_with(&self, path: &str, body: serde_json::Value) {
        self.inner
            .bodies
            .lock()
            .unwrap()
            .insert(path.to_string(), body.to_string());
    }

    /// Let the current and all future renewals complete.
    pub fn release_refresh(&self) {
        self.inner.refresh_gate.send_replace(true);
    }

    pub fn refresh_calls(&self) -> usize {
        self.inner.refresh_calls.load(Ordering::SeqCst)
    }

    /// Authorization headers seen by the renewal endpoint.
    pub fn refresh_authorization(&self) -> Vec<Option<String>> {
        self.inner.refresh_authorization.lock().unwrap().clone()
    }

    /// Non-renewal requests in arrival order.
    pub fn calls(&self) -> Vec<Call> {
        self.inner.calls.lock().unwrap().clone()
    }

    /// Replayed requests in arrival order.
    pub fn replays(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.retry_count > 0)
            .collect()
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::new(self.clone())
    }

    /// Dispatcher over this backend with an in-memory store holding `token`.
    /// Renewals never time out.
    pub async fn dispatcher(&self, token: Option<&str>) -> RequestDispatcher {
        self.dispatcher_with_timeout(token, None).await
    }

    pub async fn dispatcher_with_timeout(
        &self,
        token: Option<&str>,
        refresh_timeout: Option<Duration>,
    ) -> RequestDispatcher {
        let store = Arc::new(CredentialStore::in_memory());
        if let Some(token) = token {
            store.set(AccessCredential::new(token)).await.unwrap();
        }
        RequestDispatcher::with_refresh_timeout(self.transport(), store, refresh_timeout)
    }

    async fn answer(&self, request: &RequestDescriptor) -> Result<Response> {
        let authorization = request
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let path = request.path().to_string();

        // Let concurrent callers interleave like real network round trips
        tokio::task::yield_now().await;

        if path == REFRESH_PATH {
            return self.answer_refresh(authorization).await;
        }

        self.inner.calls.lock().unwrap().push(Call {
            path: path.clone(),
            authorization: authorization.clone(),
            retry_count: request.retry_count(),
        });

        if path == "/network-down" {
            return Err(Error::Transport("connection reset by peer".into()));
        }
        if let Some(status) = path.strip_prefix("/status/") {
            return Err(Error::HttpStatus {
                status: status.parse().unwrap(),
                message: None,
            });
        }

        let open = self.inner.open_paths.lock().unwrap().contains(&path);
        let expected = format!("Bearer {}", self.inner.valid_token.lock().unwrap());
        if path == "/always-401" || (!open && authorization.as_deref() != Some(&expected)) {
            return Err(Error::HttpStatus {
                status: 401,
                message: Some("token expired".into()),
            });
        }

        let body = self
            .inner
            .bodies
            .lock()
            .unwrap()
            .get(&path)
            .cloned()
            .unwrap_or(path);
        Ok(Response::new(StatusCode::OK, HeaderMap::new(), Bytes::from(body)))
    }

    async fn answer_refresh(&self, authorization: Option<String>) -> Result<Response> {
        self.inner.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.inner
            .refresh_authorization
            .lock()
            .unwrap()
            .push(authorization);

        let mut gate = self.inner.refresh_gate.subscribe();
        gate.wait_for(|open| *open).await.unwrap();

        let outcome = match &*self.inner.refresh_outcome.lock().unwrap() {
            RefreshOutcome::Renew(token) => Ok(Some(token.clone())),
            RefreshOutcome::Reject { status, message } => Err(Error::HttpStatus {
                status: *status,
                message: message.clone(),
            }),
            RefreshOutcome::Disconnect => {
                Err(Error::Transport("connection reset by peer".into()))
            }
            RefreshOutcome::Crash => Ok(None),
        };
        // The outcome lock is released above, so the panic cannot poison it
        let Some(token) = outcome? else {
            panic!("refresh handler crashed");
        };
        self.accept_token(&token);
        let body = serde_json::json!({
            "success": true,
            "data": { "accessToken": token }
        });
        Ok(Response::new(
            StatusCode::OK,
            HeaderMap::new(),
            Bytes::from(body.to_string()),
        ))
    }
}

impl Transport for MockBackend {
    fn execute<'a>(
        &'a self,
        request: &'a RequestDescriptor,
    ) -> Pin<Box<dyn Future<Output = Result<Response>> + Send + 'a>> {
        Box::pin(self.answer(request))
    }
}

/// Yield until `condition` holds, failing the test after a generous bound.
///
/// The bound is large enough for multi-threaded runtimes, where the tasks
/// being waited on make progress on other workers.
pub(crate) async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..1_000_000 {
        if condition().await {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}
