//! Error taxonomy for calls to the script endpoint.

use std::time::Duration;
use thiserror::Error;

/// Failure of a remote call.
///
/// The variant is decided by the layer that detects the condition (transport
/// for HTTP-level problems, the normalizer for backend error text). The retry
/// orchestrator only ever matches on the variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
  /// Network failure or non-2xx status.
  #[error("{0}")]
  Transport(String),

  #[error("Request timed out after {}s", .0.as_secs())]
  Timeout(Duration),

  /// Body was not JSON, or JSON of a shape we cannot interpret.
  #[error("Malformed response: {0}")]
  Malformed(String),

  /// The endpoint answered with markup or a non-JSON content type, which
  /// means the script is not deployed (or not deployed as a web app).
  #[error(
    "Backend not accessible - HTML response received instead of JSON ({0}). \
     Check that the Apps Script web app is deployed correctly."
  )]
  Deployment(String),

  #[error("Authentication failed: {0}")]
  Auth(String),

  /// Backend reported that the request body had already been read.
  #[error("Request body already consumed: {0}")]
  BodyConsumed(String),

  /// Well-formed response carrying an `error` field.
  #[error("{0}")]
  Domain(String),

  #[error("API call failed after {attempts} attempts: {last}")]
  Exhausted { attempts: u32, last: Box<ApiError> },

  /// The request could not be built (bad URL, unencodable payload).
  #[error("Invalid request: {0}")]
  Request(String),
}

/// Lowercase fragments of the script's authentication failures. "auth" alone
/// would also catch domain text such as "author".
const AUTH_PHRASES: &[&str] = &[
  "authenticat",
  "authoriz",
  "auth token",
  "auth required",
  "not signed in",
];

/// What the retry orchestrator does after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
  /// Try again if the budget allows.
  Retry,
  /// Stop the loop; the backend will not fix itself between attempts.
  Abort,
  /// Hand the error straight back to the caller.
  Propagate,
}

impl ApiError {
  /// Classify error text produced by the backend script.
  ///
  /// The script reports every failure as a free-form `error` string, so the
  /// phrases below are the only signal available. They are matched here, once,
  /// and never again further up the stack.
  pub fn from_backend_message(message: impl Into<String>) -> Self {
    let message = message.into();
    let lower = message.to_lowercase();

    if message.contains("Unexpected token")
      || message.contains("HTML instead of JSON")
      || message.contains("backend may not be deployed")
    {
      ApiError::Deployment(message)
    } else if AUTH_PHRASES.iter().any(|phrase| lower.contains(phrase)) {
      ApiError::Auth(message)
    } else if lower.contains("body stream already read") {
      ApiError::BodyConsumed(message)
    } else {
      ApiError::Domain(message)
    }
  }

  pub fn retry_class(&self) -> RetryClass {
    match self {
      ApiError::Deployment(_) => RetryClass::Abort,
      ApiError::Auth(_) | ApiError::BodyConsumed(_) | ApiError::Request(_) => RetryClass::Propagate,
      ApiError::Exhausted { .. } => RetryClass::Propagate,
      ApiError::Transport(_) | ApiError::Timeout(_) | ApiError::Malformed(_) | ApiError::Domain(_) => {
        RetryClass::Retry
      }
    }
  }

  /// The error that ended the call, looking through `Exhausted`.
  pub fn root(&self) -> &ApiError {
    match self {
      ApiError::Exhausted { last, .. } => last.root(),
      other => other,
    }
  }

  pub fn is_auth(&self) -> bool {
    matches!(self.root(), ApiError::Auth(_))
  }

  /// Short text suitable for a status bar or notification.
  pub fn user_message(&self) -> String {
    match self.root() {
      ApiError::Timeout(_) => {
        "Connection timeout. Please check your internet connection and try again.".to_string()
      }
      ApiError::Transport(_) => "Unable to reach the server. Please try again.".to_string(),
      ApiError::Auth(_) => "Authentication failed. Please sign in again.".to_string(),
      ApiError::Deployment(_) => {
        "Backend not accessible. The script may not be deployed correctly.".to_string()
      }
      ApiError::Malformed(_) | ApiError::BodyConsumed(_) => {
        "The server returned an unexpected response. Please try again.".to_string()
      }
      ApiError::Request(msg) => msg.clone(),
      ApiError::Domain(msg) => {
        let lower = msg.to_lowercase();
        if lower.contains("permission") {
          "You don't have permission to perform this action.".to_string()
        } else if lower.contains("not found") {
          "The requested data was not found.".to_string()
        } else {
          msg.clone()
        }
      }
      ApiError::Exhausted { .. } => "An error occurred. Please try again.".to_string(),
    }
  }
}
