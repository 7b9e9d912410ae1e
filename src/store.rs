//! Reads and writes shared by the dashboard and the one-shot commands.
//!
//! Reads are scoped to what the signed-in role may see and go through the
//! response cache. Writes validate their input, call the backend and then drop
//! the cached reads they made stale.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use tracing::{info, warn};

use crate::api::{payload, ApiClient, ApiError, Employee, NormalizedResult, Payload, Task};
use crate::auth::Role;
use crate::kpi;
use crate::notify::{safe_call, Notifier};

/// Task states the backend accepts, in workflow order.
pub const TASK_STATUSES: [&str; 3] = ["not_started", "in_progress", "completed"];

/// Smallest progress change that earns a history entry on its own.
const SIGNIFICANT_PROGRESS: f64 = 5.0;

/// Prefix shared by every cached task list.
pub const TASKS_KEY: &str = "tasks";
pub const EMPLOYEES_KEY: &str = "employees:all";
/// Prefix shared by every cached progress history.
pub const PROGRESS_KEY: &str = "progress:";

pub const MISSING_EMPLOYEE_ID: &str = "Unable to determine your employee ID. Please contact support.";

pub fn progress_key(task_id: &str) -> String {
  format!("{}{}", PROGRESS_KEY, task_id)
}

fn invalid(message: impl Into<String>) -> ApiError {
  ApiError::Request(message.into())
}

fn timestamp(now: DateTime<Utc>) -> String {
  now.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Which tasks a viewer gets to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskScope {
  All,
  Supervisor(String),
  Employee(String),
}

impl TaskScope {
  /// Admins and anonymous sessions see every task. Supervisors and employees
  /// are scoped by their backend id and get nothing without one.
  pub fn for_viewer(role: Role, user_id: Option<&str>, signed_in: bool) -> Result<Self, ApiError> {
    let user_id = user_id.map(str::trim).filter(|id| !id.is_empty());
    match (role, user_id) {
      (Role::Admin, _) => Ok(TaskScope::All),
      _ if !signed_in => Ok(TaskScope::All),
      (Role::Supervisor, Some(id)) => Ok(TaskScope::Supervisor(id.to_string())),
      (Role::Employee, Some(id)) => Ok(TaskScope::Employee(id.to_string())),
      (_, None) => Err(invalid(MISSING_EMPLOYEE_ID)),
    }
  }

  pub fn cache_key(&self) -> String {
    match self {
      TaskScope::All => "tasks:all".to_string(),
      TaskScope::Supervisor(id) => format!("tasks:supervisor:{}", id),
      TaskScope::Employee(id) => format!("tasks:employee:{}", id),
    }
  }
}

/// The signed-in user's role and backend id, from `getUserRole`. A failed
/// lookup leaves the least privileged role and no id.
pub async fn resolve_role(
  client: &ApiClient,
  notifier: &dyn Notifier,
  email: &str,
) -> (Role, Option<String>) {
  let result = safe_call(notifier, "role", client.auth().get_user_role(email)).await;
  let data = result.as_ref().and_then(NormalizedResult::data);
  let role = Role::from_role_data(data);
  let user_id = data
    .and_then(|d| d.get("userId"))
    .and_then(|id| match id {
      Value::String(s) => Some(s.clone()),
      Value::Number(n) => Some(n.to_string()),
      _ => None,
    })
    .filter(|id| !id.is_empty());
  (role, user_id)
}

/// Tasks for `scope`, cached per scope.
///
/// Supervisors whose team lookup fails fall back to the full list, which the
/// backend still filters by permission.
pub async fn fetch_tasks(client: &ApiClient, scope: &TaskScope) -> Result<NormalizedResult, ApiError> {
  client
    .cached(&scope.cache_key(), || async {
      match scope {
        TaskScope::All => client.tasks().get_all().await,
        TaskScope::Supervisor(id) => match client.tasks().get_by_supervisor(id).await {
          Err(err) if !err.is_auth() => {
            warn!(supervisor = %id, error = %err, "team tasks unavailable, loading all tasks");
            client.tasks().get_all().await
          }
          other => other,
        },
        TaskScope::Employee(id) => client.tasks().get_by_employee(id).await,
      }
    })
    .await
}

pub async fn fetch_employees(client: &ApiClient) -> Result<NormalizedResult, ApiError> {
  client
    .cached(EMPLOYEES_KEY, || client.employees().get_all())
    .await
}

pub async fn fetch_progress(client: &ApiClient, task_id: &str) -> Result<NormalizedResult, ApiError> {
  client
    .cached(&progress_key(task_id), || client.progress().get_by_task(task_id))
    .await
}

/// Canonical form of a task status; accepts dashes and any case.
pub fn parse_status(raw: &str) -> Result<&'static str, ApiError> {
  let wanted = raw.trim().to_lowercase().replace('-', "_");
  TASK_STATUSES
    .iter()
    .copied()
    .find(|status| *status == wanted)
    .ok_or_else(|| invalid(format!("Unknown task status: {}", raw.trim())))
}

/// Status of an existing task, reading legacy values such as `pending` as not
/// started.
pub fn status_of(task: &Task) -> &'static str {
  parse_status(&task.status).unwrap_or(TASK_STATUSES[0])
}

/// The status after `current` in workflow order, wrapping around.
pub fn next_status(current: &str) -> &'static str {
  let position = TASK_STATUSES.iter().position(|s| *s == current);
  match position {
    Some(i) => TASK_STATUSES[(i + 1) % TASK_STATUSES.len()],
    None => TASK_STATUSES[0],
  }
}

/// Whether `task` passes a status filter; `None` passes everything.
pub fn matches_status(task: &Task, status: Option<&str>) -> bool {
  status.map_or(true, |wanted| status_of(task) == wanted)
}

/// Fields of a new task, as typed by an admin.
#[derive(Debug, Clone, Default)]
pub struct TaskDraft {
  pub description: String,
  pub due_date: String,
  pub employee_id: String,
}

fn check_description(description: &str) -> Result<(), ApiError> {
  if description.trim().is_empty() {
    return Err(invalid("Task description is required"));
  }
  Ok(())
}

fn check_due_date(due_date: &str) -> Result<(), ApiError> {
  if due_date.trim().is_empty() {
    return Err(invalid("Due date is required"));
  }
  if kpi::parse_date(due_date).is_none() {
    return Err(invalid(format!("Invalid due date: {}", due_date.trim())));
  }
  Ok(())
}

fn check_assignee(employee_id: &str) -> Result<(), ApiError> {
  if employee_id.trim().is_empty() {
    return Err(invalid("Please select an employee"));
  }
  Ok(())
}

pub async fn add_task(
  client: &ApiClient,
  draft: &TaskDraft,
  created_by: Option<&str>,
  now: DateTime<Utc>,
) -> Result<NormalizedResult, ApiError> {
  check_description(&draft.description)?;
  check_due_date(&draft.due_date)?;
  check_assignee(&draft.employee_id)?;

  let mut data = payload([
    ("description", draft.description.trim()),
    ("dueDate", draft.due_date.trim()),
    ("employeeId", draft.employee_id.trim()),
    ("status", TASK_STATUSES[0]),
  ]);
  data.insert("progress".to_string(), Value::from(0));
  if let Some(id) = created_by {
    data.insert("createdBy".to_string(), Value::from(id));
  }
  data.insert("createdAt".to_string(), Value::from(timestamp(now)));

  let result = client.tasks().add(data).await?;
  client.invalidate(Some(TASKS_KEY));
  info!(employee = %draft.employee_id.trim(), "task added");
  Ok(result)
}

/// Fields an admin may change on an existing task; `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct TaskChanges {
  pub description: Option<String>,
  pub due_date: Option<String>,
  pub employee_id: Option<String>,
}

pub async fn update_task(
  client: &ApiClient,
  task_id: &str,
  changes: &TaskChanges,
  now: DateTime<Utc>,
) -> Result<NormalizedResult, ApiError> {
  let mut data = Payload::new();
  if let Some(description) = &changes.description {
    check_description(description)?;
    data.insert("description".to_string(), Value::from(description.trim()));
  }
  if let Some(due_date) = &changes.due_date {
    check_due_date(due_date)?;
    data.insert("dueDate".to_string(), Value::from(due_date.trim()));
  }
  if let Some(employee_id) = &changes.employee_id {
    check_assignee(employee_id)?;
    data.insert("employeeId".to_string(), Value::from(employee_id.trim()));
  }
  if data.is_empty() {
    return Err(invalid("Nothing to update"));
  }
  data.insert("updatedAt".to_string(), Value::from(timestamp(now)));

  let result = client.tasks().update(task_id, data).await?;
  client.invalidate(Some(TASKS_KEY));
  info!(task = %task_id, "task updated");
  Ok(result)
}

pub async fn delete_task(client: &ApiClient, task_id: &str) -> Result<NormalizedResult, ApiError> {
  let result = client.tasks().delete(task_id).await?;
  client.invalidate(Some(TASKS_KEY));
  client.invalidate(Some(&progress_key(task_id)));
  info!(task = %task_id, "task deleted");
  Ok(result)
}

/// Employee record as entered by an admin.
#[derive(Debug, Clone, Default)]
pub struct EmployeeDraft {
  pub name: String,
  pub email: String,
  pub role: String,
}

/// `local@domain.tld` with no whitespace and a single `@`.
pub fn is_valid_email(email: &str) -> bool {
  if email.chars().any(char::is_whitespace) {
    return false;
  }
  let Some((local, domain)) = email.split_once('@') else {
    return false;
  };
  !local.is_empty()
    && !domain.contains('@')
    && domain
      .char_indices()
      .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
}

impl EmployeeDraft {
  fn validate(&self) -> Result<Role, ApiError> {
    if self.name.trim().is_empty() {
      return Err(invalid("Employee name is required"));
    }
    if self.email.trim().is_empty() {
      return Err(invalid("Employee email is required"));
    }
    if !is_valid_email(self.email.trim()) {
      return Err(invalid("Please enter a valid email address"));
    }
    match self.role.trim().to_lowercase().as_str() {
      "admin" | "supervisor" | "employee" => Ok(Role::parse(&self.role)),
      other => Err(invalid(format!("Unknown role: {}", other))),
    }
  }

  fn payload(&self, role: Role) -> Payload {
    payload([
      ("name", self.name.trim().to_string()),
      ("email", self.email.trim().to_string()),
      ("role", role.to_string()),
    ])
  }
}

pub async fn add_employee(
  client: &ApiClient,
  draft: &EmployeeDraft,
  now: DateTime<Utc>,
) -> Result<NormalizedResult, ApiError> {
  let role = draft.validate()?;

  let existing: Vec<Employee> = fetch_employees(client).await?.list()?;
  let email = draft.email.trim();
  if existing.iter().any(|e| e.email.eq_ignore_ascii_case(email)) {
    return Err(invalid("An employee with this email already exists"));
  }

  let mut data = draft.payload(role);
  data.insert("createdAt".to_string(), Value::from(timestamp(now)));

  let result = client.employees().add(data).await?;
  client.invalidate(Some("employees"));
  info!(email, "employee added");
  Ok(result)
}

pub async fn update_employee(
  client: &ApiClient,
  employee_id: &str,
  draft: &EmployeeDraft,
  now: DateTime<Utc>,
) -> Result<NormalizedResult, ApiError> {
  let role = draft.validate()?;

  let mut data = draft.payload(role);
  data.insert("updatedAt".to_string(), Value::from(timestamp(now)));

  let result = client.employees().update(employee_id, data).await?;
  client.invalidate(Some("employees"));
  info!(employee = %employee_id, "employee updated");
  Ok(result)
}

pub async fn delete_employee(client: &ApiClient, employee_id: &str) -> Result<NormalizedResult, ApiError> {
  let result = client.employees().delete(employee_id).await?;
  client.invalidate(Some("employees"));
  info!(employee = %employee_id, "employee deleted");
  Ok(result)
}

/// A progress report on one task.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
  pub progress: f64,
  pub status: String,
  pub notes: String,
}

impl ProgressUpdate {
  /// Keep the task's current values; callers change what the user edited.
  pub fn from_task(task: &Task) -> Self {
    Self {
      progress: task.progress,
      status: status_of(task).to_string(),
      notes: String::new(),
    }
  }

  fn is_significant(&self, task: &Task, status: &str) -> bool {
    (task.progress - self.progress).abs() >= SIGNIFICANT_PROGRESS
      || !self.notes.trim().is_empty()
      || status_of(task) != status
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SavedProgress {
  pub progress: f64,
  pub status: &'static str,
  /// False when the change was too small for the history or the history
  /// write failed; the task itself was updated either way.
  pub entry_added: bool,
}

/// Update a task's progress and status, then record the change in its
/// progress history when it is large enough or carries notes.
pub async fn save_progress(
  client: &ApiClient,
  task: &Task,
  update: &ProgressUpdate,
  employee_id: Option<&str>,
  now: DateTime<Utc>,
) -> Result<SavedProgress, ApiError> {
  if !(0.0..=100.0).contains(&update.progress) {
    return Err(invalid("Progress must be between 0 and 100"));
  }
  let status = parse_status(&update.status)?;
  let progress = update.progress.round();
  let stamp = timestamp(now);

  let data = payload([
    ("progress", Value::from(progress as i64)),
    ("status", Value::from(status)),
    ("lastUpdate", Value::from(stamp.as_str())),
  ]);
  client.tasks().update_progress(&task.id, data).await?;

  let mut entry_added = false;
  if update.is_significant(task, status) {
    let mut entry = payload([
      ("taskId", Value::from(task.id.as_str())),
      ("progress", Value::from(progress as i64)),
      ("notes", Value::from(update.notes.trim())),
      ("status", Value::from(status)),
      ("createdAt", Value::from(stamp)),
    ]);
    if let Some(id) = employee_id {
      entry.insert("employeeId".to_string(), Value::from(id));
    }
    match client.progress().add(entry).await {
      Ok(_) => entry_added = true,
      Err(err) => warn!(task = %task.id, error = %err, "progress entry not recorded"),
    }
  }

  client.invalidate(Some(TASKS_KEY));
  client.invalidate(Some(&progress_key(&task.id)));
  info!(task = %task.id, progress, status, entry_added, "progress saved");
  Ok(SavedProgress {
    progress,
    status,
    entry_added,
  })
}

/// Correct a recorded progress entry; `None` leaves a field alone.
pub async fn update_progress_entry(
  client: &ApiClient,
  entry_id: &str,
  progress: Option<f64>,
  notes: Option<&str>,
  now: DateTime<Utc>,
) -> Result<NormalizedResult, ApiError> {
  let mut data = Payload::new();
  if let Some(progress) = progress {
    if !(0.0..=100.0).contains(&progress) {
      return Err(invalid("Progress must be between 0 and 100"));
    }
    data.insert("progress".to_string(), Value::from(progress.round() as i64));
  }
  if let Some(notes) = notes {
    data.insert("notes".to_string(), Value::from(notes.trim()));
  }
  if data.is_empty() {
    return Err(invalid("Nothing to update"));
  }
  data.insert("updatedAt".to_string(), Value::from(timestamp(now)));

  let result = client.progress().update(entry_id, data).await?;
  client.invalidate(Some(PROGRESS_KEY));
  Ok(result)
}

pub async fn delete_progress_entry(client: &ApiClient, entry_id: &str) -> Result<NormalizedResult, ApiError> {
  let result = client.progress().delete(entry_id).await?;
  client.invalidate(Some(PROGRESS_KEY));
  Ok(result)
}
