//! Authenticated request dispatch
//!
//! Every outgoing call reads the current credential from the store and
//! attaches it as `Authorization: Bearer <credential>`. A 401 on a first
//! attempt is handed to the refresh coordinator instead of being returned;
//! a 401 on a replay, and every other outcome, goes straight back to the
//! caller.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use session_auth::CredentialStore;
use tracing::debug;

use crate::descriptor::RequestDescriptor;
use crate::error::Result;
use crate::refresh::RefreshCoordinator;
use crate::transport::{Response, Transport};

/// Renewal timeout applied unless configured otherwise.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

/// Entry point for all backend calls.
///
/// Cheap to clone; clones share the transport, the credential store and the
/// single refresh coordinator.
#[derive(Clone)]
pub struct RequestDispatcher {
    transport: Arc<dyn Transport>,
    store: Arc<CredentialStore>,
    coordinator: Arc<RefreshCoordinator>,
}

impl RequestDispatcher {
    pub fn new(transport: Arc<dyn Transport>, store: Arc<CredentialStore>) -> Self {
        Self::with_refresh_timeout(transport, store, Some(DEFAULT_REFRESH_TIMEOUT))
    }

    /// `None` lets a renewal wait on the endpoint indefinitely.
    pub fn with_refresh_timeout(
        transport: Arc<dyn Transport>,
        store: Arc<CredentialStore>,
        refresh_timeout: Option<Duration>,
    ) -> Self {
        Self {
            transport,
            store,
            coordinator: Arc::new(RefreshCoordinator::new(refresh_timeout)),
        }
    }

    pub fn credential_store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    #[cfg(test)]
    pub(crate) async fn refresh_status(&self) -> crate::refresh::CoordinatorStatus {
        self.coordinator.status().await
    }

    /// Send an authenticated request.
    ///
    /// An expired credential is renewed and the request replayed once,
    /// transparently to the caller.
    pub async fn send(&self, descriptor: RequestDescriptor) -> Result<Response> {
        match self.execute(&descriptor).await {
            Err(e) if e.is_unauthorized() && !descriptor.is_replay() => {
                debug!(
                    request_id = descriptor.request_id(),
                    path = descriptor.path(),
                    "credential rejected, handing to refresh coordinator"
                );
                self.coordinator.handle_expiry(self, descriptor).await
            }
            outcome => outcome,
        }
    }

    /// Send without a bearer credential and without renewal handling.
    ///
    /// Used for login, signup and the renewal call itself.
    pub async fn send_public(&self, descriptor: &RequestDescriptor) -> Result<Response> {
        self.transport.execute(descriptor).await
    }

    pub(crate) fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    /// Attach the current credential (if any) and perform one exchange.
    pub(crate) async fn execute(&self, descriptor: &RequestDescriptor) -> Result<Response> {
        match self.store.get().await {
            Some(credential) => {
                let authorized = descriptor
                    .clone()
                    .with_header(AUTHORIZATION.as_str(), &credential.bearer())?;
                self.transport.execute(&authorized).await
            }
            None => self.transport.execute(descriptor).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::testing::MockBackend;
    use session_auth::AccessCredential;

    #[tokio::test]
    async fn attaches_bearer_when_credential_present() {
        let backend = MockBackend::new("at_1");
        let dispatcher = backend.dispatcher(Some("at_1")).await;

        dispatcher
            .send(RequestDescriptor::get("/api/v1/boards"))
            .await
            .unwrap();

        let calls = backend.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].authorization.as_deref(), Some("Bearer at_1"));
    }

    #[tokio::test]
    async fn omits_authorization_when_store_empty() {
        let backend = MockBackend::new("at_1");
        backend.open_path("/api/v1/boards");
        let dispatcher = backend.dispatcher(None).await;

        dispatcher
            .send(RequestDescriptor::get("/api/v1/boards"))
            .await
            .unwrap();

        assert_eq!(backend.calls()[0].authorization, None);
    }

    #[tokio::test]
    async fn credential_overrides_caller_authorization_header() {
        let backend = MockBackend::new("at_1");
        let dispatcher = backend.dispatcher(Some("at_1")).await;

        let descriptor = RequestDescriptor::get("/api/v1/boards")
            .with_header("authorization", "Bearer stale")
            .unwrap();
        dispatcher.send(descriptor).await.unwrap();

        assert_eq!(
            backend.calls()[0].authorization.as_deref(),
            Some("Bearer at_1")
        );
    }

    #[tokio::test]
    async fn non_401_failures_pass_through_without_renewal() {
        let backend = MockBackend::new("at_1");
        let dispatcher = backend.dispatcher(Some("at_1")).await;

        let err = dispatcher
            .send(RequestDescriptor::get("/status/500"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(500));

        let err = dispatcher
            .send(RequestDescriptor::get("/status/403"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(403));

        assert_eq!(backend.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn transport_errors_pass_through_without_renewal() {
        let backend = MockBackend::new("at_1");
        let dispatcher = backend.dispatcher(Some("at_1")).await;

        let err = dispatcher
            .send(RequestDescriptor::get("/network-down"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(backend.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn replayed_descriptor_401_is_surfaced_verbatim() {
        let backend = MockBackend::new("at_2");
        let dispatcher = backend.dispatcher(Some("at_1")).await;

        let err = dispatcher
            .send(RequestDescriptor::get("/api/v1/boards").replay())
            .await
            .unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(backend.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn send_public_never_attaches_credential() {
        let backend = MockBackend::new("at_1");
        backend.open_path("/api/v1/auth/login");
        let dispatcher = backend.dispatcher(Some("at_1")).await;

        dispatcher
            .send_public(&RequestDescriptor::post("/api/v1/auth/login"))
            .await
            .unwrap();
        assert_eq!(backend.calls()[0].authorization, None);
    }

    #[tokio::test]
    async fn expired_credential_is_renewed_transparently() {
        let backend = MockBackend::new("at_2");
        backend.release_refresh();
        let dispatcher = backend.dispatcher(Some("at_1")).await;

        let response = dispatcher
            .send(RequestDescriptor::get("/api/v1/boards"))
            .await
            .unwrap();

        assert_eq!(response.text(), "/api/v1/boards");
        assert_eq!(backend.refresh_calls(), 1);
        assert_eq!(
            dispatcher.credential_store().get().await,
            Some(AccessCredential::new("at_2"))
        );
    }
}
