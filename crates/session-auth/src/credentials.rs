//! Session credential storage
//!
//! Holds the current access credential and the signed-in user's profile. A
//! tokio Mutex serializes writes from the login flow and the refresh
//! coordinator, the only two writers. When backed by a file, every write is
//! persisted with atomic temp-file + rename.
//!
//! A persistent store starts not-ready: until `hydrate()` has restored the
//! previous session, an empty credential means "unknown", not "signed out".

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use common::Secret;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info};

use crate::constants::{AUTH_STORAGE_KEY, STORAGE_VERSION};
use crate::error::{Error, Result};

/// Short-lived bearer token. Redacted in Debug/Display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessCredential(Secret<String>);

impl AccessCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Secret::new(token.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.expose()
    }

    /// `Authorization` header value for this credential.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.expose())
    }
}

impl std::fmt::Display for AccessCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Default)]
struct SessionState {
    access_token: Option<AccessCredential>,
    user: Option<serde_json::Value>,
}

/// On-disk session layout: `{"state":{"accessToken":..,"user":..},"version":0}`
#[derive(Serialize, Deserialize)]
struct PersistedSession {
    state: PersistedState,
    #[serde(default)]
    version: u32,
}

#[derive(Serialize, Deserialize)]
struct PersistedState {
    #[serde(rename = "accessToken", default)]
    access_token: Option<String>,
    #[serde(default)]
    user: Option<serde_json::Value>,
}

/// Shared holder of the session credential.
///
/// Reads clone the credential out under the lock and never hold it across a
/// network call. `subscribe()` exposes an "authenticated" flag that flips to
/// `false` on `clear()`, which is how a forced logout reaches the UI.
pub struct CredentialStore {
    path: Option<PathBuf>,
    state: Mutex<SessionState>,
    initialized: AtomicBool,
    authenticated: watch::Sender<bool>,
}

impl CredentialStore {
    /// Store with no persistence. Ready immediately.
    pub fn in_memory() -> Self {
        Self::build(None, true)
    }

    /// File-backed store. Not ready until `hydrate()` completes.
    pub fn persistent(path: PathBuf) -> Self {
        Self::build(Some(path), false)
    }

    /// File-backed store, hydrated before returning.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let store = Self::persistent(path);
        store.hydrate().await?;
        Ok(store)
    }

    fn build(path: Option<PathBuf>, initialized: bool) -> Self {
        let (authenticated, _) = watch::channel(false);
        Self {
            path,
            state: Mutex::new(SessionState::default()),
            initialized: AtomicBool::new(initialized),
            authenticated,
        }
    }

    /// Restore the persisted session, if any, and mark the store ready.
    ///
    /// A missing file is a cold start with no session. Unparseable contents
    /// are an error and leave the store not-ready.
    pub async fn hydrate(&self) -> Result<()> {
        let Some(path) = &self.path else {
            self.initialized.store(true, Ordering::Release);
            return Ok(());
        };

        if path.exists() {
            let contents = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| Error::Io(format!("reading session file: {e}")))?;
            let persisted: PersistedSession = serde_json::from_str(&contents)
                .map_err(|e| Error::CredentialParse(format!("parsing session file: {e}")))?;

            let mut state = self.state.lock().await;
            state.access_token = persisted
                .state
                .access_token
                .filter(|t| !t.is_empty())
                .map(AccessCredential::new);
            state.user = persisted.state.user;
            self.authenticated.send_replace(state.access_token.is_some());
            info!(
                path = %path.display(),
                has_session = state.access_token.is_some(),
                "restored session"
            );
        } else {
            info!(path = %path.display(), "session file not found, starting signed out");
        }

        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    /// Whether the previous session has been restored (or there was none).
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Current access credential, if signed in.
    pub async fn get(&self) -> Option<AccessCredential> {
        self.state.lock().await.access_token.clone()
    }

    /// Replace the access credential and persist.
    ///
    /// The in-memory value is updated even when persisting fails.
    pub async fn set(&self, credential: AccessCredential) -> Result<()> {
        let mut state = self.state.lock().await;
        state.access_token = Some(credential);
        self.authenticated.send_replace(true);
        debug!("stored access credential");
        self.persist(&state).await
    }

    /// Drop the credential and user profile (logout) and persist.
    pub async fn clear(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.access_token = None;
        state.user = None;
        self.authenticated.send_replace(false);
        debug!("cleared session");
        self.persist(&state).await
    }

    /// Signed-in user's profile as returned by the backend.
    pub async fn user(&self) -> Option<serde_json::Value> {
        self.state.lock().await.user.clone()
    }

    pub async fn set_user(&self, user: Option<serde_json::Value>) -> Result<()> {
        let mut state = self.state.lock().await;
        state.user = user;
        self.persist(&state).await
    }

    /// Watch the authenticated flag. Receives `false` on every `clear()`.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.authenticated.subscribe()
    }

    async fn persist(&self, state: &SessionState) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let session = PersistedSession {
            state: PersistedState {
                access_token: state.access_token.as_ref().map(|t| t.expose().to_string()),
                user: state.user.clone(),
            },
            version: STORAGE_VERSION,
        };
        write_atomic(path, &session).await
    }
}

/// Write the session file atomically with owner-only permissions.
async fn write_atomic(path: &Path, session: &PersistedSession) -> Result<()> {
    let json = serde_json::to_string_pretty(session)
        .map_err(|e| Error::CredentialParse(format!("serializing session: {e}")))?;
    write_private_file(path, json.as_bytes()).await?;
    debug!(path = %path.display(), "persisted session");
    Ok(())
}

/// Replace `path` with `contents` via temp file + rename, mode 0600 on unix.
///
/// Shared by everything that keeps session material on disk.
pub async fn write_private_file(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| Error::Io(format!("{} has no parent directory", path.display())))?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(AUTH_STORAGE_KEY);

    let tmp_path = dir.join(format!(".{name}.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, contents)
        .await
        .map_err(|e| Error::Io(format!("writing temp file for {}: {e}", path.display())))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting permissions on {}: {e}", path.display())))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp file to {}: {e}", path.display())))?;
    Ok(())
}
