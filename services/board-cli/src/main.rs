//! Board CLI
//!
//! Thin command-line front end for the board backend:
//! 1. Loads configuration and restores the persisted session and refresh cookie
//! 2. Runs one command through the authenticated request dispatcher
//! 3. Prints the result to stdout, or a user-facing error to stderr

mod cli;
mod config;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use api_client::{
    DEFAULT_ERROR_MESSAGE, ReqwestTransport, RequestDescriptor, RequestDispatcher,
    SessionCookies, session,
};
use clap::Parser;
use session_auth::{CredentialStore, LoginRequest, SignupRequest};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Command};
use crate::config::Config;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    match run().await {
        Ok(output) => {
            if !output.is_empty() {
                println!("{output}");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {}", describe(&e));
            ExitCode::FAILURE
        }
    }
}

/// Initialize tracing on stderr with LOG_LEVEL / RUST_LOG support.
///
/// `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Error text for the terminal. Request failures show the backend's message.
fn describe(error: &anyhow::Error) -> String {
    match error.downcast_ref::<api_client::Error>() {
        Some(e) => e.user_message(DEFAULT_ERROR_MESSAGE),
        None => format!("{error:#}"),
    }
}

async fn run() -> Result<String> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::load_default().context("failed to load default config")?,
    };
    debug!(
        base_url = %config.api.base_url,
        timeout_secs = config.api.timeout_secs,
        refresh_timeout_secs = config.api.refresh_timeout_secs,
        "configuration loaded"
    );

    let store = match &config.session.storage_path {
        Some(path) => CredentialStore::load(path.clone())
            .await
            .with_context(|| format!("failed to restore session from {}", path.display()))?,
        None => CredentialStore::in_memory(),
    };

    let cookies = match config.session.cookie_file() {
        Some(path) => SessionCookies::load(&config.api.base_url, path.clone())
            .await
            .with_context(|| format!("failed to restore cookies from {}", path.display()))?,
        None => SessionCookies::in_memory(&config.api.base_url)?,
    };
    let transport = ReqwestTransport::with_cookies(
        config.api.base_url.clone(),
        config.request_timeout(),
        cookies,
    )?;
    let dispatcher = RequestDispatcher::with_refresh_timeout(
        Arc::new(transport),
        Arc::new(store),
        config.refresh_timeout(),
    );

    execute(&dispatcher, cli.command).await
}

/// Run one command and render its output.
async fn execute(dispatcher: &RequestDispatcher, command: Command) -> Result<String> {
    match command {
        Command::Login { username, password } => {
            let user = session::login(dispatcher, &LoginRequest { username, password }).await?;
            Ok(serde_json::to_string_pretty(&user)?)
        }
        Command::Signup {
            username,
            password,
            email,
            nickname,
        } => {
            let request = SignupRequest::local(username, password, email, nickname);
            let message = session::signup(dispatcher, &request).await?;
            Ok(message.unwrap_or_else(|| "account created".into()))
        }
        Command::Logout => {
            session::logout(dispatcher).await?;
            Ok("signed out".into())
        }
        Command::Me => {
            let user = session::fetch_me(dispatcher).await?;
            dispatcher
                .credential_store()
                .set_user(Some(user.clone()))
                .await
                .map_err(api_client::Error::from)?;
            Ok(serde_json::to_string_pretty(&user)?)
        }
        Command::Status => Ok(status_report(dispatcher).await),
        Command::Request { method, path, body } => {
            let mut descriptor = RequestDescriptor::new(method, path);
            if let Some(body) = body {
                descriptor = descriptor.with_json(body);
            }
            info!(request_id = descriptor.request_id(), "sending request");
            let response = dispatcher.send(descriptor).await?;
            Ok(pretty_body(&response.text()))
        }
    }
}

async fn status_report(dispatcher: &RequestDispatcher) -> String {
    let store = dispatcher.credential_store();
    let signed_in = store.get().await.is_some();
    match (signed_in, store.user().await) {
        (false, _) => "signed out".to_string(),
        (true, Some(user)) => {
            let name = user
                .get("nickname")
                .or_else(|| user.get("username"))
                .and_then(|v| v.as_str())
                .unwrap_or("unknown user");
            format!("signed in as {name}")
        }
        (true, None) => "signed in".to_string(),
    }
}

/// Pretty-print JSON bodies, pass anything else through.
fn pretty_body(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| serde_json::to_string_pretty(&v).ok())
        .unwrap_or_else(|| body.to_string())
}
