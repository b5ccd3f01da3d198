//! Refresh cookie jar that outlives the process
//!
//! Login answers with `Set-Cookie: refreshToken=...`; the renewal call only
//! works if that cookie comes back. reqwest's `Jar` holds it in memory. With
//! a cookie file configured, the cookies the jar would send to the renewal
//! endpoint are snapshotted there after every response that sets cookies,
//! and seeded back into a fresh jar on startup. Restored cookies keep the
//! renewal endpoint's directory as their scope; other attributes (expiry,
//! `Secure`) are left to the backend to re-issue on the next renewal.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::Url;
use reqwest::cookie::{CookieStore, Jar};
use serde::{Deserialize, Serialize};
use session_auth::REFRESH_PATH;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Error, Result};

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedCookies {
    /// `name=value` pairs, as they appear in a `Cookie` header.
    cookies: Vec<String>,
}

/// Cookie jar for one backend, optionally mirrored to a file.
pub struct SessionCookies {
    jar: Arc<Jar>,
    refresh_url: Url,
    path: Option<PathBuf>,
    /// Serializes snapshots so concurrent responses cannot interleave writes.
    write_lock: Mutex<()>,
}

impl SessionCookies {
    /// Cookies that live only as long as the process.
    pub fn in_memory(base_url: &str) -> Result<Self> {
        Ok(Self::with_jar(Jar::default(), refresh_url(base_url)?, None))
    }

    /// Seed the jar from `path` if it exists and mirror later changes there.
    pub async fn load(base_url: &str, path: PathBuf) -> Result<Self> {
        let refresh_url = refresh_url(base_url)?;
        let jar = Jar::default();

        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let persisted: PersistedCookies = serde_json::from_slice(&bytes).map_err(|e| {
                    Error::Session(format!("parsing cookie file {}: {e}", path.display()))
                })?;
                for pair in &persisted.cookies {
                    jar.add_cookie_str(pair, &refresh_url);
                }
                debug!(
                    path = %path.display(),
                    count = persisted.cookies.len(),
                    "restored session cookies"
                );
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no cookie file, starting empty");
            }
            Err(e) => {
                return Err(Error::Session(format!(
                    "reading cookie file {}: {e}",
                    path.display()
                )));
            }
        }

        Ok(Self::with_jar(jar, refresh_url, Some(path)))
    }

    fn with_jar(jar: Jar, refresh_url: Url, path: Option<PathBuf>) -> Self {
        Self {
            jar: Arc::new(jar),
            refresh_url,
            path,
            write_lock: Mutex::new(()),
        }
    }

    /// The jar to hand to `reqwest::ClientBuilder::cookie_provider`.
    pub(crate) fn provider(&self) -> Arc<Jar> {
        Arc::clone(&self.jar)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// `name=value` pairs the renewal call would carry right now.
    pub fn renewal_cookies(&self) -> Vec<String> {
        self.jar
            .cookies(&self.refresh_url)
            .and_then(|header| header.to_str().ok().map(str::to_string))
            .map(|header| {
                header
                    .split(';')
                    .map(str::trim)
                    .filter(|pair| !pair.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Write the current snapshot to the cookie file, if there is one.
    pub async fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let _guard = self.write_lock.lock().await;

        let persisted = PersistedCookies {
            cookies: self.renewal_cookies(),
        };
        let json = serde_json::to_vec_pretty(&persisted)
            .map_err(|e| Error::Session(format!("serializing cookies: {e}")))?;
        session_auth::write_private_file(path, &json).await?;

        debug!(
            path = %path.display(),
            count = persisted.cookies.len(),
            "persisted session cookies"
        );
        Ok(())
    }
}

/// Absolute URL of the renewal endpoint under `base_url`.
fn refresh_url(base_url: &str) -> Result<Url> {
    let joined = format!("{}{REFRESH_PATH}", base_url.trim_end_matches('/'));
    Url::parse(&joined).map_err(|e| Error::InvalidRequest(format!("invalid base URL {base_url:?}: {e}")))
}
