//! Canonical result shape for every backend response.
//!
//! The script answers in several shapes depending on the handler:
//! `{success: true, data}`, `{error: "..."}`, or a bare JSON array. They are
//! folded into [`NormalizedResult`] right at the transport boundary, so callers
//! never inspect raw bodies.

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use serde_json::Value;

use super::error::ApiError;

const GENERIC_FAILURE: &str = "Request failed without an error message";

/// Outcome of one backend call in its canonical form.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedResult {
  Success { data: Option<Value> },
  /// Error text is never empty.
  Failure { error: String },
}

impl NormalizedResult {
  pub fn success(data: impl Into<Option<Value>>) -> Self {
    NormalizedResult::Success { data: data.into() }
  }

  /// Build a failure, substituting a generic message for empty text.
  pub fn failure(error: impl Into<String>) -> Self {
    let error = error.into();
    let error = if error.trim().is_empty() {
      GENERIC_FAILURE.to_string()
    } else {
      error
    };
    NormalizedResult::Failure { error }
  }

  pub fn is_success(&self) -> bool {
    matches!(self, NormalizedResult::Success { .. })
  }

  pub fn data(&self) -> Option<&Value> {
    match self {
      NormalizedResult::Success { data } => data.as_ref(),
      NormalizedResult::Failure { .. } => None,
    }
  }

  pub fn error(&self) -> Option<&str> {
    match self {
      NormalizedResult::Failure { error } => Some(error),
      NormalizedResult::Success { .. } => None,
    }
  }

  /// Turn a failure into the classified error the retry loop acts on.
  pub fn into_result(self) -> Result<NormalizedResult, ApiError> {
    match self {
      NormalizedResult::Failure { error } => Err(ApiError::from_backend_message(error)),
      success => Ok(success),
    }
  }

  /// Deserialize the `data` array of a success, or an empty list.
  pub fn list<T: serde::de::DeserializeOwned>(&self) -> Result<Vec<T>, ApiError> {
    match self.data() {
      Some(data @ Value::Array(_)) => {
        serde_json::from_value(data.clone()).map_err(|e| ApiError::Malformed(e.to_string()))
      }
      Some(Value::Null) | None => Ok(Vec::new()),
      Some(other) => Err(ApiError::Malformed(format!(
        "expected a list, got {}",
        kind_of(other)
      ))),
    }
  }
}

impl From<ApiError> for NormalizedResult {
  fn from(err: ApiError) -> Self {
    NormalizedResult::failure(err.to_string())
  }
}

impl Serialize for NormalizedResult {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    match self {
      NormalizedResult::Success { data } => {
        let mut s = serializer.serialize_struct("NormalizedResult", 2)?;
        s.serialize_field("success", &true)?;
        s.serialize_field("data", data)?;
        s.end()
      }
      NormalizedResult::Failure { error } => {
        let mut s = serializer.serialize_struct("NormalizedResult", 2)?;
        s.serialize_field("success", &false)?;
        s.serialize_field("error", error)?;
        s.end()
      }
    }
  }
}

/// Fold a decoded response body into a [`NormalizedResult`].
///
/// Rules, in order:
/// 1. object with `success: true` passes through with its `data`
/// 2. object with a truthy `error` fails with that text
/// 3. bare array becomes a success wrapping the array
/// 4. object with `success: false` fails with a generic message
/// 5. object with neither `success` nor `error` is a success; `data` if
///    present, otherwise the object itself
///
/// Any other body (scalar or null) is malformed.
pub fn normalize(body: Value) -> Result<NormalizedResult, ApiError> {
  match body {
    Value::Object(mut obj) => {
      let success = obj.get("success").and_then(Value::as_bool);

      if success == Some(true) {
        return Ok(NormalizedResult::success(obj.remove("data")));
      }

      if let Some(error) = obj.get("error").filter(|e| is_truthy(e)) {
        let text = match error {
          Value::String(s) => s.clone(),
          other => other.to_string(),
        };
        return Ok(NormalizedResult::failure(text));
      }

      match success {
        Some(false) => {
          let message = obj
            .get("message")
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_default();
          Ok(NormalizedResult::failure(message))
        }
        _ => match obj.remove("data") {
          Some(data) => Ok(NormalizedResult::success(data)),
          None => Ok(NormalizedResult::success(Value::Object(obj))),
        },
      }
    }
    Value::Array(items) => Ok(NormalizedResult::success(Value::Array(items))),
    other => Err(ApiError::Malformed(format!(
      "unexpected {} response body",
      kind_of(&other)
    ))),
  }
}

fn is_truthy(value: &Value) -> bool {
  match value {
    Value::Null => false,
    Value::Bool(b) => *b,
    Value::String(s) => !s.is_empty(),
    Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
    Value::Array(_) | Value::Object(_) => true,
  }
}

fn kind_of(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "boolean",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  }
}
