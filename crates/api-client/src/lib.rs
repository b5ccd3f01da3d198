//! Authenticated HTTP client for the board backend
//!
//! Callers build a `RequestDescriptor` and hand it to
//! `RequestDispatcher::send`. The dispatcher attaches the stored access
//! credential; when the backend answers 401 the `RefreshCoordinator` renews
//! the credential once for every concurrently expired request and replays
//! each of them. Callers only ever see the final outcome.
//!
//! ```text
//! caller -> RequestDispatcher::send -> Transport -> backend
//!                 |  401, first attempt
//!                 v
//!           RefreshCoordinator (Idle | Refreshing + FIFO waiters)
//!                 |  one POST /api/v1/auth/refresh
//!                 v
//!           CredentialStore::set / clear, then replay or reject
//! ```

pub mod cookies;
pub mod descriptor;
pub mod dispatcher;
pub mod error;
pub mod metrics;
mod refresh;
pub mod session;
pub mod transport;

#[cfg(test)]
mod testing;

pub use cookies::SessionCookies;
pub use descriptor::RequestDescriptor;
pub use dispatcher::{DEFAULT_REFRESH_TIMEOUT, RequestDispatcher};
pub use error::{DEFAULT_ERROR_MESSAGE, Error, Result};
pub use transport::{ReqwestTransport, Response, Transport};
