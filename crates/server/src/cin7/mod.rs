//! Cin7-facing pieces: the Omni and Core API clients plus response
//! inspection helpers shared by the handlers.

mod core;
mod omni;

pub use self::core::CoreClient;
pub use self::omni::OmniClient;

use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::dispatch::DispatchTicket;

/// Errors from the Cin7 API clients.
#[derive(Debug, Error)]
pub enum Cin7Error {
    /// The request could not be sent.
    #[error("Request failed: {0}")]
    Request(String),

    /// The response could not be parsed.
    #[error("Invalid response: {0}")]
    Response(String),

    /// Cin7 returned a non-success status.
    #[error("Cin7 API error ({status}): {message}")]
    Api { status: u16, message: String },
}

/// Whether a creation response body reports success.
///
/// Omni answers with a JSON array carrying one result per submitted
/// document, each with a `success` boolean; Core answers with an object. A
/// 2xx status with an explicit `success: false` is a permanent rejection
/// that must not be retried.
#[must_use]
pub fn body_reports_success(body: &Value) -> bool {
    first_result(body)
        .get("success")
        .and_then(Value::as_bool)
        .unwrap_or(true)
}

/// The created document id from a creation response body, when present.
#[must_use]
pub fn created_id(body: &Value) -> Option<i64> {
    first_result(body).get("id").and_then(Value::as_i64)
}

fn first_result(body: &Value) -> &Value {
    match body {
        Value::Array(items) => items.first().unwrap_or(&Value::Null),
        other => other,
    }
}

/// Log a dispatch outcome out of band.
///
/// Webhook handlers ack before the dispatch completes, so terminal states
/// land in the log instead of the HTTP response: the sender already got its
/// 2xx and retrying toward it would only cause re-delivery storms.
pub fn log_outcome_detached(ticket: DispatchTicket) {
    tokio::spawn(async move {
        let label = ticket.label().to_owned();
        match ticket.outcome().await {
            // Dry runs log the payload at dispatch time.
            Ok(outcome) if outcome.attempts == 0 => {}
            Ok(outcome) => {
                if body_reports_success(&outcome.body) {
                    info!(
                        label,
                        status = outcome.status,
                        attempts = outcome.attempts,
                        "downstream accepted document"
                    );
                } else {
                    warn!(
                        label,
                        response = %outcome.body,
                        "downstream reported failure"
                    );
                }
            }
            Err(err) => error!(label, error = %err, "dispatch failed"),
        }
    });
}
