//! Client-side counters for the renewal path
//!
//! Recorded through the `metrics` facade. Without an installed recorder
//! every call is a no-op.
//!
//! - `client_token_refresh_total` (counter): label `outcome`
//! - `client_refresh_waiters_total` (counter)
//! - `client_requests_replayed_total` (counter)

/// Record a settled renewal, `outcome` is `success` or `failure`.
pub fn record_refresh(outcome: &'static str) {
    metrics::counter!("client_token_refresh_total", "outcome" => outcome).increment(1);
}

/// Record a request parked behind an in-flight renewal.
pub fn record_waiter_queued() {
    metrics::counter!("client_refresh_waiters_total").increment(1);
}

/// Record a request replayed with a renewed credential.
pub fn record_replay() {
    metrics::counter!("client_requests_replayed_total").increment(1);
}
