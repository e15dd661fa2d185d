//! HTTP outcome classification.
//!
//! | status                    | outcome                                     |
//! |---------------------------|---------------------------------------------|
//! | endpoint success (200)    | `Success(T)`; undecodable body is transport |
//! | 404                       | `Empty`, whatever the body says             |
//! | endpoint override matches | whatever the override returns               |
//! | 403                       | `ScopeDenied(message?)`                     |
//! | anything else             | `Failure(status, message?)`                 |
//!
//! Errors never get swallowed: every status outside the first two rows ends as
//! an observable `WeebError`.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::endpoint::ResponseSpec;
use crate::error::WeebError;
use crate::types::{DenialReason, User};

/// Classified result of one call.
#[derive(Debug)]
pub enum Outcome<T> {
    Success(T),
    /// The resource does not exist (404).
    Empty,
    Failed(WeebError),
}

impl<T> Outcome<T> {
    pub fn into_result(self) -> Result<Option<T>, WeebError> {
        match self {
            Outcome::Success(value) => Ok(Some(value)),
            Outcome::Empty => Ok(None),
            Outcome::Failed(err) => Err(err),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Success(value) => Outcome::Success(f(value)),
            Outcome::Empty => Outcome::Empty,
            Outcome::Failed(err) => Outcome::Failed(err),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}

fn parse_object(body: &[u8]) -> Option<Value> {
    serde_json::from_slice::<Value>(body)
        .ok()
        .filter(Value::is_object)
}

fn message_of(body: Option<&Value>) -> Option<String> {
    body?
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_owned)
}

/// Classify a JSON endpoint's response.
pub fn classify_json<T: DeserializeOwned>(spec: &ResponseSpec, status: u16, body: &[u8]) -> Outcome<T> {
    if status == spec.success_status {
        return match serde_json::from_slice(body) {
            Ok(value) => Outcome::Success(value),
            Err(e) => {
                warn!(status, error = %e, "undecodable success body");
                Outcome::Failed(WeebError::transport(format!("invalid response body: {e}")))
            }
        };
    }
    classify_failure(spec, status, body)
}

/// Classify a status that is not the endpoint's success status.
pub fn classify_failure<T>(spec: &ResponseSpec, status: u16, body: &[u8]) -> Outcome<T> {
    if status == 404 {
        return Outcome::Empty;
    }
    let json = parse_object(body);
    if let Some(error_override) = spec.error_override {
        if let Some(err) = error_override(status, json.as_ref()) {
            return Outcome::Failed(err);
        }
    }
    let message = message_of(json.as_ref());
    let err = if status == 403 {
        WeebError::ScopeDenied { message }
    } else {
        WeebError::Failure { status, message }
    };
    Outcome::Failed(err)
}

/// Nothing interpretable came back.
pub fn classify_transport<T>(reason: impl std::fmt::Display) -> Outcome<T> {
    Outcome::Failed(WeebError::transport(reason))
}

/// Reputation give: a 403 carrying `code` 1..=3 and a `user` snapshot is a
/// refused transfer rather than a missing scope.
pub fn reputation_transfer_override(status: u16, body: Option<&Value>) -> Option<WeebError> {
    if status != 403 {
        return None;
    }
    let body = body?;
    let reason = body.get("code").and_then(Value::as_i64).and_then(DenialReason::from_code)?;
    let user: User = serde_json::from_value(body.get("user")?.clone()).ok()?;
    Some(WeebError::TransferDenied {
        reason,
        message: message_of(Some(body)),
        user: Box::new(user),
    })
}
