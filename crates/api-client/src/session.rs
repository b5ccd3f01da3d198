//! Account calls that create, read or end a session
//!
//! Login and signup go out without a bearer credential. Everything else goes
//! through `RequestDispatcher::send` like any other protected call.

use serde_json::Value;
use session_auth::{ApiEnvelope, LOGIN_PATH, LoginRequest, ME_PATH, SIGNUP_PATH, SignupRequest};
use tracing::info;

use crate::descriptor::RequestDescriptor;
use crate::dispatcher::RequestDispatcher;
use crate::error::{Error, Result};

/// Sign in and load the user's profile.
///
/// Stores the issued access credential, then fetches the profile with it and
/// stores that too. The transport keeps the refresh cookie the backend sets.
/// If the profile fetch fails the credential stays stored.
pub async fn login(dispatcher: &RequestDispatcher, request: &LoginRequest) -> Result<Value> {
    let descriptor = RequestDescriptor::post(LOGIN_PATH).with_body(request)?;
    let response = dispatcher.send_public(&descriptor).await?;
    let credential = session_auth::parse_token_envelope(response.body())?;

    let store = dispatcher.credential_store();
    store.set(credential).await?;

    let user = fetch_me(dispatcher).await?;
    store.set_user(Some(user.clone())).await?;
    info!(username = %request.username, "signed in");
    Ok(user)
}

/// Register a local account. Does not sign in.
///
/// Returns the backend's message, if it sent one.
pub async fn signup(
    dispatcher: &RequestDispatcher,
    request: &SignupRequest,
) -> Result<Option<String>> {
    let descriptor = RequestDescriptor::post(SIGNUP_PATH).with_body(request)?;
    let response = dispatcher.send_public(&descriptor).await?;
    let envelope: ApiEnvelope<Value> = response.json()?;
    if !envelope.success {
        return Err(Error::InvalidResponse(
            envelope
                .message
                .unwrap_or_else(|| "signup was not accepted".into()),
        ));
    }
    info!(username = %request.username, "account registered");
    Ok(envelope.message)
}

/// Current user's profile.
pub async fn fetch_me(dispatcher: &RequestDispatcher) -> Result<Value> {
    dispatcher.send(RequestDescriptor::get(ME_PATH)).await?.data()
}

/// Drop the local session.
pub async fn logout(dispatcher: &RequestDispatcher) -> Result<()> {
    dispatcher.credential_store().clear().await?;
    info!("signed out");
    Ok(())
}
