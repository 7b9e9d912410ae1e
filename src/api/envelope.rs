//! Request envelope sent to the script endpoint.

use serde::Serialize;
use serde_json::{Map, Value};

use super::action::Action;

/// Flat key/value payload of a request.
pub type Payload = Map<String, Value>;

/// Caller identity attached to outgoing requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserCredentials {
  pub email: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub token: Option<String>,
}

/// Everything a single attempt sends: `{action, data, user}`.
#[derive(Debug, Clone, Serialize)]
pub struct RequestEnvelope {
  pub action: Action,
  pub data: Payload,
  pub user: Option<UserCredentials>,
}

impl RequestEnvelope {
  pub fn new(action: Action, data: Payload, user: Option<UserCredentials>) -> Self {
    Self { action, data, user }
  }

  /// Query parameters for the GET transport.
  ///
  /// `action` comes first, then each non-null payload field, then the user's
  /// email and token when present. Strings are sent verbatim, other scalars in
  /// their JSON text form.
  pub fn query_pairs(&self) -> Vec<(String, String)> {
    let mut pairs = vec![("action".to_string(), self.action.as_str().to_string())];

    for (key, value) in &self.data {
      let text = match value {
        Value::Null => continue,
        Value::String(s) => s.clone(),
        other => other.to_string(),
      };
      pairs.push((key.clone(), text));
    }

    if let Some(user) = &self.user {
      pairs.push(("userEmail".to_string(), user.email.clone()));
      if let Some(token) = &user.token {
        pairs.push(("userToken".to_string(), token.clone()));
      }
    }

    pairs
  }
}

/// Build a payload from `(key, value)` pairs.
pub fn payload<K, V, I>(fields: I) -> Payload
where
  K: Into<String>,
  V: Into<Value>,
  I: IntoIterator<Item = (K, V)>,
{
  fields
    .into_iter()
    .map(|(k, v)| (k.into(), v.into()))
    .collect()
}

/// Prepend an identifier field to `data`, the shape every update call uses.
///
/// The identifier wins over a same-named field already in `data`.
pub fn with_id(id_field: &str, id: &str, data: Payload) -> Payload {
  let mut shaped = Payload::new();
  shaped.insert(id_field.to_string(), Value::String(id.to_string()));
  for (key, value) in data {
    if key != id_field {
      shaped.insert(key, value);
    }
  }
  shaped
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn user() -> Option<UserCredentials> {
    Some(UserCredentials {
      email: "ana@example.com".to_string(),
      token: Some("tok".to_string()),
    })
  }

  #[test]
  fn test_query_pairs_flatten_payload() {
    let data = payload([
      ("email", json!("ana@example.com")),
      ("limit", json!(10)),
      ("active", json!(true)),
      ("skip", Value::Null),
    ]);
    let envelope = RequestEnvelope::new(Action::GetEmployeeByEmail, data, user());

    let pairs = envelope.query_pairs();

    assert_eq!(pairs[0], ("action".into(), "getEmployeeByEmail".into()));
    assert!(pairs.contains(&("email".into(), "ana@example.com".into())));
    assert!(pairs.contains(&("limit".into(), "10".into())));
    assert!(pairs.contains(&("active".into(), "true".into())));
    assert!(!pairs.iter().any(|(k, _)| k == "skip"));
    assert!(pairs.contains(&("userEmail".into(), "ana@example.com".into())));
    assert!(pairs.contains(&("userToken".into(), "tok".into())));
  }

  #[test]
  fn test_query_pairs_without_token() {
    let envelope = RequestEnvelope::new(
      Action::GetTasks,
      Payload::new(),
      Some(UserCredentials {
        email: "ana@example.com".to_string(),
        token: None,
      }),
    );

    let pairs = envelope.query_pairs();
    assert_eq!(pairs.len(), 2);
    assert_eq!(pairs[1], ("userEmail".into(), "ana@example.com".into()));
  }

  #[test]
  fn test_envelope_json_shape() {
    let envelope = RequestEnvelope::new(
      Action::DeleteTask,
      payload([("taskId", "T1")]),
      None,
    );

    let body = serde_json::to_value(&envelope).unwrap();
    assert_eq!(
      body,
      json!({"action": "deleteTask", "data": {"taskId": "T1"}, "user": null})
    );
  }

  #[test]
  fn test_with_id_merges_identifier() {
    let data = payload([("progress", json!(80)), ("taskId", json!("stale"))]);
    let shaped = with_id("taskId", "T1", data);

    assert_eq!(
      Value::Object(shaped),
      json!({"taskId": "T1", "progress": 80})
    );
  }
}
