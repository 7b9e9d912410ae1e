//! Typed rows returned by the spreadsheet backend.
//!
//! Sheet cells come back loosely typed: numbers sometimes arrive as strings
//! and optional columns are simply missing, so every field is defaulted.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Employee {
  #[serde(default, deserialize_with = "lenient_string")]
  pub id: String,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub email: String,
  #[serde(default)]
  pub role: String,
  pub supervisor_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
  #[serde(default, deserialize_with = "lenient_string")]
  pub id: String,
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub description: String,
  #[serde(default, deserialize_with = "lenient_string")]
  pub employee_id: String,
  pub employee_name: Option<String>,
  pub supervisor_id: Option<String>,
  #[serde(default)]
  pub status: String,
  pub priority: Option<String>,
  #[serde(default, deserialize_with = "lenient_number")]
  pub progress: f64,
  pub due_date: Option<String>,
  pub created_at: Option<String>,
  pub updated_at: Option<String>,
  /// Older sheets use this column instead of `updatedAt`.
  pub last_update: Option<String>,
}

impl Task {
  /// Short label for lists: the title, or the description for untitled rows.
  pub fn label(&self) -> &str {
    if self.title.trim().is_empty() {
      &self.description
    } else {
      &self.title
    }
  }

  pub fn updated(&self) -> Option<&str> {
    self.updated_at.as_deref().or(self.last_update.as_deref())
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEntry {
  #[serde(default, deserialize_with = "lenient_string")]
  pub id: String,
  #[serde(default, deserialize_with = "lenient_string")]
  pub task_id: String,
  #[serde(default, deserialize_with = "lenient_string")]
  pub employee_id: String,
  #[serde(default, deserialize_with = "lenient_number")]
  pub progress: f64,
  pub status: Option<String>,
  pub notes: Option<String>,
  pub created_at: Option<String>,
  pub updated_at: Option<String>,
}

impl ProgressEntry {
  pub fn recorded(&self) -> Option<&str> {
    self.updated_at.as_deref().or(self.created_at.as_deref())
  }
}

/// Accept a string or a number, e.g. an id column the sheet auto-typed.
fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
  Ok(match Value::deserialize(deserializer)? {
    Value::String(s) => s,
    Value::Null => String::new(),
    other => other.to_string(),
  })
}

/// Accept a number or a numeric string; blanks read as zero.
fn lenient_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
  match Value::deserialize(deserializer)? {
    Value::Number(n) => Ok(n.as_f64().unwrap_or_default()),
    Value::String(s) if s.trim().is_empty() => Ok(0.0),
    Value::String(s) => s
      .trim()
      .parse()
      .map_err(|_| serde::de::Error::custom(format!("not a number: {}", s))),
    Value::Null => Ok(0.0),
    other => Err(serde::de::Error::custom(format!("not a number: {}", other))),
  }
}
